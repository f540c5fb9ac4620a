//! Small formatting helpers shared by the data model's `Debug` impls.

use std::fmt;

/// Wraps a `Display` value so it can be used in a `#[derive(Debug)]`-style
/// `debug_struct` field without writing a second, duplicate `Display` impl.
pub struct DisplayToDebug<T>(pub T);

impl<T: fmt::Display> fmt::Debug for DisplayToDebug<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
