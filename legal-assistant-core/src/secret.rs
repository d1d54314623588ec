use std::fmt;

/// A wrapper for credentials such as API keys
///
/// `Secret<T>` hides the inner value in `Debug` and `Display` output so that a
/// config struct can be logged with `?config` without leaking keys.
///
/// # Examples
///
/// ```
/// use legal_assistant_core::Secret;
///
/// let api_key = Secret::new("sk-test");
/// assert_eq!(format!("{api_key}"), "••••••");
/// assert_eq!(api_key.expose(), &"sk-test");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("••••••")
    }
}

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Secret(value)
    }

    /// Gets a reference to the inner value
    ///
    /// Only call this where the value is placed on the wire.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Formats the value as an HTTP bearer credential
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Secret(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug() {
        let secret = Secret::new("tvly-123");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
    }

    #[test]
    fn test_secret_display() {
        let secret = Secret::new("tvly-123");
        assert_eq!(format!("{}", secret), "••••••");
    }

    #[test]
    fn test_bearer() {
        let secret = Secret::from("sk-abc");
        assert_eq!(secret.bearer(), "Bearer sk-abc");
    }
}
