//! Password container with automatic memory zeroing.
//!
//! The connection password is wrapped in `Zeroizing` so it is cleared from
//! memory when the configuration is dropped, and it is redacted from debug
//! output.

use zeroize::{Zeroize, Zeroizing};

/// A connection password that is never printed and is zeroed on drop.
///
/// # Example
///
/// ```rust
/// use pgsurvey_core::security::Password;
///
/// let password = Password::new("secret".to_string());
/// assert!(password.is_set());
/// assert!(!format!("{:?}", password).contains("secret"));
/// ```
#[derive(Clone, Default, Zeroize)]
#[zeroize(drop)]
pub struct Password(Zeroizing<String>);

impl Password {
    /// Wraps a password.
    pub fn new(password: String) -> Self {
        Self(Zeroizing::new(password))
    }

    /// Whether a non-empty password is present.
    pub fn is_set(&self) -> bool {
        !self.0.is_empty()
    }

    /// Exposes the password for handing to the database driver.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_set() {
            f.write_str("Password(****)")
        } else {
            f.write_str("Password(<none>)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("hunter2".to_string());
        let debug = format!("{:?}", password);
        assert!(!debug.contains("hunter2"));
        assert_eq!(debug, "Password(****)");
        assert_eq!(password.expose(), "hunter2");
    }

    #[test]
    fn test_password_default_is_unset() {
        let password = Password::default();
        assert!(!password.is_set());
        assert_eq!(format!("{:?}", password), "Password(<none>)");
    }
}
