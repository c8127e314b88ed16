//! Data handed over by the authentication collaborator.
//!
//! Email one-time codes and passkey ceremonies happen outside this crate.
//! What crosses the boundary is the authenticated user record, or a
//! [`VerificationError`] when the collaborator rejected the attempt.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A user record as returned by the session API after sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// Opaque user identifier.
    pub id: String,
    /// Email address used to sign in.
    pub email: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the email address was confirmed with a one-time code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Account creation time as reported by the session API (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl AuthenticatedUser {
    /// Returns the display name, falling back to the email address.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

/// The authentication collaborator rejected a sign-in or registration.
#[derive(Debug, Clone)]
pub struct VerificationError {
    /// Machine-readable reason for the error.
    pub reason: String,
    /// Human-readable message for the error.
    pub message: Option<String>,
}

impl VerificationError {
    /// Creates a new verification error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: None,
        }
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = &self.message {
            write!(f, "{}: {}", self.reason, msg)
        } else {
            write!(f, "{}", self.reason)
        }
    }
}

impl std::error::Error for VerificationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserialize_session_payload() {
        let user: AuthenticatedUser = serde_json::from_str(
            r#"{"id":"u_1","email":"buyer@example.com","displayName":null,"emailVerified":true}"#,
        )
        .unwrap();
        assert_eq!(user.id, "u_1");
        assert_eq!(user.email_verified, Some(true));
        assert_eq!(user.label(), "buyer@example.com");
    }

    #[test]
    fn test_user_label_prefers_display_name() {
        let user = AuthenticatedUser {
            id: "u_2".into(),
            email: "a@example.com".into(),
            display_name: Some("Ada".into()),
            email_verified: None,
            created_at: None,
        };
        assert_eq!(user.label(), "Ada");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["displayName"], "Ada");
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn test_verification_error_display() {
        let err = VerificationError::new("invalid_code");
        assert_eq!(err.to_string(), "invalid_code");
        let err = err.with_message("the code has expired");
        assert_eq!(err.to_string(), "invalid_code: the code has expired");
    }
}
