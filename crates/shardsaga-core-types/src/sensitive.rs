//! Sensitive data marker for automatic redaction
//!
//! Bound SQL parameters and before-images routinely carry user data. Wrapping
//! them in `Sensitive<T>` keeps them out of Debug/Display output, so they can
//! be passed to `tracing` fields without leaking row contents.

use std::fmt;

/// Wrapper that redacts itself in Debug and Display
///
/// # Example
///
/// ```
/// use shardsaga_core_types::Sensitive;
///
/// let params = Sensitive::new(vec!["alice@example.com", "init"]);
/// assert_eq!(format!("{:?}", params), "***REDACTED***");
/// assert_eq!(params.expose().len(), 2);
/// ```
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the underlying value
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper and return the inner value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T: Clone> Clone for Sensitive<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
