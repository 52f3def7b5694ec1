//! Session errors and their user-facing rendering.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::gateway::GatewayError;
use super::translate_binding::TranslationError;

/// Message shown after the one-shot reopen also failed.
pub const DISCONNECTED_MESSAGE: &str = "device disconnected; please reconnect";

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A gateway call failed.
    #[error("{operation} failed: {source}")]
    DeviceCall {
        operation: &'static str,
        #[source]
        source: GatewayError,
    },

    /// Status refresh failed, the reopen attempt failed too, and the session
    /// was torn down.
    #[error("device disconnected; please reconnect")]
    DeviceDisconnected {
        #[source]
        source: Box<SessionError>,
    },

    /// A binding could not be translated for a direct-keymap device.
    #[error("cannot translate binding for {target_id}: {source}")]
    Translation {
        target_id: String,
        #[source]
        source: TranslationError,
    },

    /// The device (or preview session) does not accept this operation.
    #[error("{0}")]
    Unsupported(String),

    /// The bundle's raw layout produced no usable layout.
    #[error("layout descriptor is unusable: {0}")]
    LayoutUnusable(String),

    #[error("no devices available")]
    NoDevices,
}

impl SessionError {
    pub(crate) fn device_call(operation: &'static str) -> impl FnOnce(GatewayError) -> Self {
        move |source| Self::DeviceCall { operation, source }
    }

    /// Whether repeating the same operation may succeed.
    pub fn retryable(&self) -> bool {
        match self {
            Self::DeviceCall { source, .. } => source.retryable,
            Self::NoDevices => true,
            Self::DeviceDisconnected { .. }
            | Self::Translation { .. }
            | Self::Unsupported(_)
            | Self::LayoutUnusable(_) => false,
        }
    }

    pub fn code(&self) -> String {
        match self {
            Self::DeviceCall { source, .. } => source.code.clone(),
            Self::DeviceDisconnected { .. } => "DEVICE_DISCONNECTED".into(),
            Self::Translation { .. } => "TRANSLATION_FAILED".into(),
            Self::Unsupported(_) => "UNSUPPORTED".into(),
            Self::LayoutUnusable(_) => "LAYOUT_UNUSABLE".into(),
            Self::NoDevices => "NO_DEVICES".into(),
        }
    }

    /// Renders the error for display; fatal device errors get a ` (fatal)`
    /// suffix.
    pub fn to_user_error(&self) -> UserError {
        let message = match self {
            Self::DeviceCall { source, .. } if !source.retryable => {
                format!("{} (fatal)", source.message)
            }
            Self::DeviceCall { source, .. } => source.message.clone(),
            other => other.to_string(),
        };
        UserError {
            code: self.code(),
            message,
            retryable: self.retryable(),
        }
    }
}

/// What the UI shows for a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_device_error_is_suffixed() {
        // Arrange
        let err = SessionError::DeviceCall {
            operation: "commit",
            source: GatewayError::fatal("E_FLASH", "flash write rejected"),
        };

        // Act
        let user = err.to_user_error();

        // Assert
        assert_eq!(user.message, "flash write rejected (fatal)");
        assert_eq!(user.code, "E_FLASH");
        assert!(!user.retryable);
    }

    #[test]
    fn test_retryable_device_error_keeps_message() {
        let err = SessionError::DeviceCall {
            operation: "apply_to_ram",
            source: GatewayError::retryable("E_IO", "timeout"),
        };
        let user = err.to_user_error();
        assert_eq!(user.message, "timeout");
        assert!(user.retryable);
    }

    #[test]
    fn test_disconnected_message() {
        let err = SessionError::DeviceDisconnected {
            source: Box::new(SessionError::NoDevices),
        };
        assert_eq!(err.to_user_error().message, DISCONNECTED_MESSAGE);
        assert!(!err.retryable());
    }

    #[test]
    fn test_translation_error_names_target() {
        let err = SessionError::Translation {
            target_id: "key:0,0".into(),
            source: TranslationError::UnsupportedOp("SPIN".into()),
        };
        assert!(err.to_user_error().message.contains("key:0,0"));
        assert_eq!(err.code(), "TRANSLATION_FAILED");
    }
}
