//! In-memory desktop used by the shipped binary and by tests.
//!
//! # Why a virtual desktop?
//!
//! Real input injection needs a logged-in graphical session and moves the
//! operator's actual cursor.  `VirtualDesktop` models just enough of a
//! machine for every protocol operation to have an observable effect:
//!
//! - a screen of fixed size with a cursor clamped to it,
//! - a clipboard,
//! - one focused text field that typing appends to, and that the
//!   select-all / copy / paste shortcuts act on,
//! - a synthetic frame buffer for captures.
//!
//! Every injected event is recorded in order so tests can assert on exactly
//! what reached the "OS".
//!
//! # Failure mode
//!
//! [`VirtualDesktop::set_failing`] makes every call return
//! [`CapabilityError::Platform`], for exercising error envelopes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use deskctl_core::{CapabilityError, DesktopCapability, MouseButton, Point};
use image::{Rgb, RgbImage};

/// Message carried by errors in failure mode.
pub const INJECTED_FAILURE: &str = "virtual desktop: injected failure";

/// One event that reached the virtual desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesktopEvent {
    Move(Point),
    Click { button: MouseButton, count: u32 },
    Drag { from: Point, to: Point, duration: Duration },
    Scroll(i32),
    Chord(Vec<String>),
    Key(String),
    Type(String),
    ClipboardWrite(String),
    Capture,
}

#[derive(Debug, Default)]
struct State {
    cursor: Point,
    clipboard: String,
    field: String,
    field_selected: bool,
    scroll_offset: i64,
    events: Vec<DesktopEvent>,
}

impl State {
    /// Inserts text at the caret, replacing the field if it is selected.
    fn insert(&mut self, text: &str) {
        if self.field_selected {
            self.field.clear();
            self.field_selected = false;
        }
        self.field.push_str(text);
    }
}

/// Recording desktop with a clipboard and one text field.
#[derive(Debug)]
pub struct VirtualDesktop {
    width: u32,
    height: u32,
    modifier: String,
    failing: AtomicBool,
    state: Mutex<State>,
}

impl VirtualDesktop {
    /// Creates a desktop of `width` x `height` whose shortcuts use
    /// `modifier` (e.g. `"ctrl"`).  The cursor starts at the centre.
    pub fn new(width: u32, height: u32, modifier: impl Into<String>) -> Self {
        let state = State {
            cursor: Point::new((width / 2) as i32, (height / 2) as i32),
            ..State::default()
        };
        Self {
            width,
            height,
            modifier: modifier.into().to_ascii_lowercase(),
            failing: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }

    /// Switches failure mode on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Returns every event recorded so far, oldest first.
    pub fn events(&self) -> Vec<DesktopEvent> {
        self.lock().events.clone()
    }

    /// Current contents of the focused text field.
    pub fn field_text(&self) -> String {
        self.lock().field.clone()
    }

    /// Net scroll distance since creation; positive is up.
    pub fn scroll_offset(&self) -> i64 {
        self.lock().scroll_offset
    }

    // A panic while holding the lock cannot leave State half-updated in a way
    // that matters for a simulation, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<MutexGuard<'_, State>, CapabilityError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(CapabilityError::Platform(INJECTED_FAILURE.to_string()));
        }
        Ok(self.lock())
    }

    fn clamp(&self, p: Point) -> Point {
        let max_x = i32::try_from(self.width.saturating_sub(1)).unwrap_or(i32::MAX);
        let max_y = i32::try_from(self.height.saturating_sub(1)).unwrap_or(i32::MAX);
        Point::new(p.x.clamp(0, max_x), p.y.clamp(0, max_y))
    }

    /// Returns the letter of a `<modifier>+<letter>` chord, if `keys` is one.
    fn shortcut<'k>(&self, keys: &'k [String]) -> Option<&'k str> {
        match keys {
            [modifier, letter] if modifier.eq_ignore_ascii_case(&self.modifier) => {
                Some(letter.as_str())
            }
            _ => None,
        }
    }

    fn render_frame(&self, cursor: Point) -> RgbImage {
        let mut frame = RgbImage::from_fn(self.width, self.height, |x, y| {
            // Title bar, side panel, and a textured content area.
            if y < self.height / 20 {
                Rgb([52, 56, 64])
            } else if x < self.width / 8 {
                Rgb([236, 238, 240])
            } else {
                let h = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
                Rgb([(x % 256) as u8, (y % 256) as u8, (h >> 24) as u8])
            }
        });
        let (cx, cy) = (cursor.x as u32, cursor.y as u32);
        for y in cy.saturating_sub(4)..(cy + 5).min(self.height) {
            for x in cx.saturating_sub(4)..(cx + 5).min(self.width) {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        frame
    }
}

impl DesktopCapability for VirtualDesktop {
    fn capture_frame(&self) -> Result<RgbImage, CapabilityError> {
        let cursor = {
            let mut state = self.check()?;
            state.events.push(DesktopEvent::Capture);
            state.cursor
        };
        Ok(self.render_frame(cursor))
    }

    fn screen_size(&self) -> Result<(u32, u32), CapabilityError> {
        self.check()?;
        Ok((self.width, self.height))
    }

    fn cursor_position(&self) -> Result<Point, CapabilityError> {
        Ok(self.check()?.cursor)
    }

    fn move_cursor(&self, to: Point) -> Result<(), CapabilityError> {
        let mut state = self.check()?;
        state.cursor = self.clamp(to);
        state.events.push(DesktopEvent::Move(to));
        Ok(())
    }

    fn click(&self, button: MouseButton, count: u32) -> Result<(), CapabilityError> {
        self.check()?
            .events
            .push(DesktopEvent::Click { button, count });
        Ok(())
    }

    fn drag(&self, from: Point, to: Point, duration: Duration) -> Result<(), CapabilityError> {
        let mut state = self.check()?;
        state.cursor = self.clamp(to);
        state.events.push(DesktopEvent::Drag { from, to, duration });
        Ok(())
    }

    fn scroll(&self, amount: i32) -> Result<(), CapabilityError> {
        let mut state = self.check()?;
        state.scroll_offset += i64::from(amount);
        state.events.push(DesktopEvent::Scroll(amount));
        Ok(())
    }

    fn press_keys(&self, keys: &[String]) -> Result<(), CapabilityError> {
        let mut state = self.check()?;
        match self.shortcut(keys).map(str::to_ascii_lowercase).as_deref() {
            Some("a") => state.field_selected = true,
            Some("c") if state.field_selected => state.clipboard = state.field.clone(),
            Some("v") => {
                let pasted = state.clipboard.clone();
                state.insert(&pasted);
            }
            _ => {}
        }
        state.events.push(DesktopEvent::Chord(keys.to_vec()));
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<(), CapabilityError> {
        let mut state = self.check()?;
        match key.to_ascii_lowercase().as_str() {
            "backspace" => {
                if state.field_selected {
                    state.field.clear();
                    state.field_selected = false;
                } else {
                    state.field.pop();
                }
            }
            "enter" | "return" => state.insert("\n"),
            "tab" => state.insert("\t"),
            "space" => state.insert(" "),
            _ => {}
        }
        state.events.push(DesktopEvent::Key(key.to_string()));
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), CapabilityError> {
        let mut state = self.check()?;
        state.insert(text);
        state.events.push(DesktopEvent::Type(text.to_string()));
        Ok(())
    }

    fn read_clipboard(&self) -> Result<String, CapabilityError> {
        Ok(self.check()?.clipboard.clone())
    }

    fn write_clipboard(&self, text: &str) -> Result<(), CapabilityError> {
        let mut state = self.check()?;
        state.clipboard = text.to_string();
        state.events.push(DesktopEvent::ClipboardWrite(text.to_string()));
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop() -> VirtualDesktop {
        VirtualDesktop::new(800, 600, "ctrl")
    }

    fn chord(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_cursor_starts_at_screen_centre() {
        assert_eq!(desktop().cursor_position().unwrap(), Point::new(400, 300));
    }

    #[test]
    fn test_move_cursor_on_oversized_desktop_does_not_panic() {
        // Arrange: a side wider than i32::MAX must not wrap the clamp bounds.
        let d = VirtualDesktop::new(3_000_000_000, 600, "ctrl");

        // Act
        d.move_cursor(Point::new(5, 5)).unwrap();
        d.drag(Point::new(0, 0), Point::new(-7, 9_000), Duration::ZERO)
            .unwrap();

        // Assert
        assert_eq!(d.cursor_position().unwrap(), Point::new(0, 599));
    }

    #[test]
    fn test_move_cursor_is_clamped_to_screen() {
        // Arrange
        let d = desktop();

        // Act
        d.move_cursor(Point::new(5_000, -20)).unwrap();

        // Assert
        assert_eq!(d.cursor_position().unwrap(), Point::new(799, 0));
        // The event keeps the requested position.
        assert_eq!(d.events(), vec![DesktopEvent::Move(Point::new(5_000, -20))]);
    }

    #[test]
    fn test_drag_leaves_cursor_at_end_point() {
        let d = desktop();
        d.drag(Point::new(1, 1), Point::new(50, 60), Duration::from_millis(500))
            .unwrap();
        assert_eq!(d.cursor_position().unwrap(), Point::new(50, 60));
    }

    #[test]
    fn test_typing_appends_to_field() {
        let d = desktop();
        d.type_text("ab").unwrap();
        d.type_text("c").unwrap();
        assert_eq!(d.field_text(), "abc");
    }

    #[test]
    fn test_select_all_then_copy_fills_clipboard() {
        // Arrange
        let d = desktop();
        d.type_text("hello").unwrap();

        // Act
        d.press_keys(&chord(&["ctrl", "a"])).unwrap();
        d.press_keys(&chord(&["ctrl", "c"])).unwrap();

        // Assert
        assert_eq!(d.read_clipboard().unwrap(), "hello");
    }

    #[test]
    fn test_copy_without_selection_keeps_clipboard() {
        let d = desktop();
        d.write_clipboard("old").unwrap();
        d.type_text("new").unwrap();
        d.press_keys(&chord(&["ctrl", "c"])).unwrap();
        assert_eq!(d.read_clipboard().unwrap(), "old");
    }

    #[test]
    fn test_paste_replaces_selected_field() {
        let d = desktop();
        d.type_text("before").unwrap();
        d.write_clipboard("after").unwrap();
        d.press_keys(&chord(&["ctrl", "a"])).unwrap();
        d.press_keys(&chord(&["ctrl", "v"])).unwrap();
        assert_eq!(d.field_text(), "after");
    }

    #[test]
    fn test_shortcuts_only_fire_with_configured_modifier() {
        // Arrange: a macOS-style desktop ignores ctrl shortcuts.
        let d = VirtualDesktop::new(800, 600, "command");
        d.type_text("x").unwrap();

        // Act
        d.press_keys(&chord(&["ctrl", "a"])).unwrap();
        d.press_keys(&chord(&["ctrl", "c"])).unwrap();
        d.press_keys(&chord(&["Command", "A"])).unwrap();
        d.press_keys(&chord(&["command", "c"])).unwrap();

        // Assert
        assert_eq!(d.read_clipboard().unwrap(), "x");
    }

    #[test]
    fn test_backspace_clears_selection_or_deletes_last_char() {
        let d = desktop();
        d.type_text("abc").unwrap();
        d.press_key("backspace").unwrap();
        assert_eq!(d.field_text(), "ab");
        d.press_keys(&chord(&["ctrl", "a"])).unwrap();
        d.press_key("backspace").unwrap();
        assert_eq!(d.field_text(), "");
    }

    #[test]
    fn test_chord_is_recorded_in_given_order() {
        let d = desktop();
        d.press_keys(&chord(&["ctrl", "shift", "t"])).unwrap();
        assert_eq!(
            d.events(),
            vec![DesktopEvent::Chord(chord(&["ctrl", "shift", "t"]))]
        );
    }

    #[test]
    fn test_scroll_accumulates_offset() {
        let d = desktop();
        d.scroll(5).unwrap();
        d.scroll(-2).unwrap();
        assert_eq!(d.scroll_offset(), 3);
    }

    #[test]
    fn test_capture_frame_has_screen_dimensions() {
        let d = VirtualDesktop::new(320, 200, "ctrl");
        let frame = d.capture_frame().unwrap();
        assert_eq!(frame.dimensions(), (320, 200));
        assert_eq!(d.events(), vec![DesktopEvent::Capture]);
    }

    #[test]
    fn test_failure_mode_fails_every_call_and_records_nothing() {
        // Arrange
        let d = desktop();
        d.set_failing(true);

        // Act
        let err = d.move_cursor(Point::new(1, 1)).unwrap_err();

        // Assert
        assert_eq!(err.to_string(), INJECTED_FAILURE);
        assert!(d.read_clipboard().is_err());
        assert!(d.capture_frame().is_err());
        assert!(d.events().is_empty());

        d.set_failing(false);
        assert!(d.screen_size().is_ok());
    }
}
