//! Desktop capability adapters.
//!
//! Platform adapters (X11/XTest, Quartz, SendInput) implement
//! [`deskctl_core::DesktopCapability`] outside this crate.  The server ships
//! with [`VirtualDesktop`], an in-memory adapter that tests and local
//! development drive instead of the real machine.

pub mod virtual_desktop;

pub use virtual_desktop::{DesktopEvent, VirtualDesktop, INJECTED_FAILURE};
