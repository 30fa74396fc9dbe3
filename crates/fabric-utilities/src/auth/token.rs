use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

/// A bearer token issued by an identity provider.
///
/// The token is handed to the caller as soon as it is acquired and is never
/// stored by this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expiry: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expiry,
        }
    }

    /// Creates a token that expires `expires_in` seconds from now.
    pub fn expiring_in(token: impl Into<String>, expires_in: u64) -> Self {
        let expiry = i64::try_from(expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| Utc::now().checked_add_signed(delta));
        Self::new(token, expiry)
    }

    /// The raw bearer token.
    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= Utc::now())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::new("super-secret", None);
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_expiry() {
        let token = AccessToken::expiring_in("t", 3600);
        assert!(!token.is_expired());
        assert!(token.expiry().is_some());

        let expired = AccessToken::new("t", Some(Utc::now() - TimeDelta::seconds(1)));
        assert!(expired.is_expired());

        let unbounded = AccessToken::new("t", None);
        assert!(!unbounded.is_expired());
    }
}
