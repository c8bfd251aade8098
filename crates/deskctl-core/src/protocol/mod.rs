//! Protocol module containing the inbound action requests and the outbound
//! response envelope.

pub mod request;
pub mod response;

pub use request::{
    decode_request, ActionRequest, Category, KeyboardAction, MouseAction, ProtocolError,
    SystemAction, TextAction,
};
pub use response::{ResponseEnvelope, Status};
