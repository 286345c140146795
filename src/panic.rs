//! Helpers for turning panic payloads into log-friendly text.
//!
//! Connection tasks, request tasks, the report guard and the scenario suite
//! all catch panics; these helpers give them one way to describe the payload.

use std::{any::Any, fmt};

/// Borrowed view of a panic payload that formats as its message.
///
/// `String` and `&'static str` payloads print verbatim; anything else falls
/// back to a placeholder naming the payload as opaque.
///
/// ```
/// use ssetrace::panic::format_panic;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(payload.as_ref()).to_string(), "boom");
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
/// assert_eq!(format_panic(payload.as_ref()).to_string(), "<opaque panic payload>");
/// ```
#[derive(Clone, Copy)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl PanicMessage<'_> {
    /// The payload text, if the payload was a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("<opaque panic payload>"))
    }
}

impl fmt::Debug for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicMessage").field(&self.to_string()).finish()
    }
}

/// Wrap a panic payload for display.
pub fn format_panic(payload: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(payload) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_string_payload_is_printed() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(format_panic(payload.as_ref()).as_str(), Some("kaboom"));
    }

    #[test]
    fn caught_panic_is_formatted() {
        let payload = std::panic::catch_unwind(|| panic!("request {} failed", 3))
            .expect_err("closure should panic");
        assert_eq!(format_panic(payload.as_ref()).to_string(), "request 3 failed");
    }
}
