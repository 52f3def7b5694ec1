//! The device gateway seam.
//!
//! [`DeviceGateway`] is everything the session needs from a device backend.
//! The real backend talks HID; tests and the headless runner use
//! [`InMemoryGateway`](crate::infrastructure::gateway::InMemoryGateway).
//!
//! # Why a trait? (for beginners)
//!
//! The session state machine only ever holds an `Arc<dyn DeviceGateway>`.
//! Swapping the hardware backend for an in-memory one changes nothing in
//! the session code, which is what makes the retry and busy rules testable
//! without a keyboard on the desk.

use async_trait::async_trait;
use keystudio_core::layout::NormalizedLayout;
use keystudio_core::profile::{
    BindingEntry, DeviceInfo, ProfileBundle, StatusSnapshot, ViaProbe, ViaState,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by any gateway call.
///
/// `retryable = false` marks a condition that needs user action (re-plugging
/// or re-pairing the device) before it can succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct GatewayError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl GatewayError {
    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

/// Async operations a device backend provides.
///
/// Session ids come from [`open_session`](Self::open_session) or
/// [`import_via_bundle`](Self::import_via_bundle); device ids from
/// [`list_devices`](Self::list_devices).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, GatewayError>;

    async fn inspect_device(&self, device_id: &str) -> Result<DeviceInfo, GatewayError>;

    /// Opens a session and returns everything needed to hydrate it.
    async fn open_session(&self, device_id: &str) -> Result<ProfileBundle, GatewayError>;

    async fn close_session(&self, session_id: &str) -> Result<(), GatewayError>;

    /// Writes one binding into the device's staged buffer.
    async fn set_binding(&self, session_id: &str, entry: &BindingEntry)
        -> Result<(), GatewayError>;

    async fn set_layout(
        &self,
        session_id: &str,
        layout: &NormalizedLayout,
    ) -> Result<(), GatewayError>;

    /// Builds a preview session from an exported VIA bundle.
    async fn import_via_bundle(&self, content: &str) -> Result<ProfileBundle, GatewayError>;

    /// Loads staged bindings into volatile RAM.
    async fn apply_to_ram(&self, session_id: &str) -> Result<(), GatewayError>;

    /// Restores RAM (and the staged buffer) from flash.
    async fn revert_ram(&self, session_id: &str) -> Result<(), GatewayError>;

    /// Writes RAM contents to flash.
    async fn commit(&self, session_id: &str) -> Result<(), GatewayError>;

    async fn run(&self, session_id: &str, sequence_id: &str) -> Result<(), GatewayError>;

    async fn stop_all(&self, session_id: &str) -> Result<(), GatewayError>;

    /// Lightweight re-read of the three state snapshots.
    async fn get_status(&self, session_id: &str) -> Result<StatusSnapshot, GatewayError>;

    async fn probe_via(&self, device_id: &str) -> Result<ViaProbe, GatewayError>;

    async fn via_read_state(&self, device_id: &str) -> Result<ViaState, GatewayError>;

    async fn via_set_keycode(
        &self,
        device_id: &str,
        layer: u8,
        row: u32,
        col: u32,
        keycode: u16,
    ) -> Result<(), GatewayError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
