//! DeviceSession: the device connection state machine.
//!
//! Owns the one live session with a keyboard and drives it through
//! `Disconnected → Connecting → Connected`, with short `Busy` sub-phases for
//! every mutating device call.
//!
//! # Rules
//!
//! - Mutating operations are serialized by a busy flag.  A call made while
//!   another is in flight is skipped (`Ok(false)`), never queued.
//!   `stop_all` is exempt.
//! - Checksums are never advanced on trust: every successful apply, revert,
//!   commit, or binding push is followed by a status re-read.
//! - A failed status re-read gets exactly one full reopen.  If that fails
//!   too the session is torn down.
//! - Session state is replaced wholesale (`Arc<SessionState>`), never
//!   patched in place, so readers always see a consistent snapshot.
//!
//! The internal mutex is never held across an `.await`.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use keystudio_core::keycode::{CatalogRegistry, KeycodeLabel};
use keystudio_core::layout::{normalize_via_layout, NormalizedLayout};
use keystudio_core::profile::{
    profile_checksum, Binding, BindingEntry, Capabilities, DeviceInfo, DeviceMode, Profile,
    ProfileBundle, Sequence, StateSnapshot, StatusSnapshot, SyncState, ViaProbe, ViaState,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::device_list::reconcile_devices;
use super::error::{SessionError, UserError};
use super::gateway::DeviceGateway;
use super::interaction::InteractionMonitor;
use super::translate_binding::translate_for_via;

/// Prefix of session ids created from an imported bundle.
pub const PREVIEW_SESSION_PREFIX: &str = "preview-";

// ── Phases ────────────────────────────────────────────────────────────────────

/// Which mutating call holds the busy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BusyOp {
    Applying,
    Reverting,
    Committing,
    PushingBinding,
    Importing,
    WritingKeycode,
}

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Busy(BusyOp),
}

// ── Session state ─────────────────────────────────────────────────────────────

/// Everything known about the open session.  Replaced, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub session_id: String,
    pub device: DeviceInfo,
    pub capabilities: Capabilities,
    pub profile: Profile,
    pub layout: Option<NormalizedLayout>,
    pub targets: Vec<String>,
    pub sequences: Vec<Sequence>,
    pub sync: SyncState,
    /// Sequence currently running on the device.
    pub running: Option<String>,
    pub ram_loaded: bool,
    pub via_state: Option<ViaState>,
}

impl SessionState {
    pub fn mode(&self) -> DeviceMode {
        self.capabilities.mode()
    }

    pub fn is_preview(&self) -> bool {
        self.session_id.starts_with(PREVIEW_SESSION_PREFIX)
    }

    pub fn has_target(&self, target_id: &str) -> bool {
        self.targets.iter().any(|t| t == target_id)
    }

    fn with_status(&self, status: &StatusSnapshot) -> Self {
        Self {
            sync: self.sync.merged_with(status),
            running: status.running.clone(),
            ram_loaded: status.ram_loaded,
            ..self.clone()
        }
    }

    /// Stores a VIA keymap read; in direct-keymap mode the profile grows to
    /// the device's layer count.
    fn with_via_state(&self, via: ViaState) -> Self {
        let profile = if self.mode() == DeviceMode::ViaDirect && via.layer_count > 0 {
            self.profile.with_layer_count(u32::from(via.layer_count))
        } else {
            self.profile.clone()
        };
        Self {
            profile,
            via_state: Some(via),
            ..self.clone()
        }
    }
}

/// Sync information for the status bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub committed: Option<StateSnapshot>,
    pub applied: Option<StateSnapshot>,
    pub staged: Option<StateSnapshot>,
    pub dirty: bool,
    pub ram_loaded: bool,
    pub running: Option<String>,
}

/// Builds session state from a bundle.
///
/// The layout comes from the bundle or is normalized from its raw
/// descriptor.  Bindings addressed to targets that no longer exist are
/// dropped and logged at `debug`.
///
/// # Errors
///
/// Returns [`SessionError::LayoutUnusable`] when a raw descriptor is present
/// but yields no layout.
pub fn hydrate_bundle(bundle: ProfileBundle) -> Result<SessionState, SessionError> {
    let layout = match (bundle.layout, bundle.raw_layout) {
        (Some(layout), _) => Some(layout),
        (None, Some(raw)) => {
            let result = normalize_via_layout(&raw);
            for diagnostic in result.warnings() {
                debug!(path = ?diagnostic.path, "{}", diagnostic.message);
            }
            let reason = result
                .diagnostics
                .last()
                .map(|d| d.message.clone())
                .unwrap_or_default();
            Some(result.layout.ok_or(SessionError::LayoutUnusable(reason))?)
        }
        (None, None) => None,
    };

    let targets = match &layout {
        Some(layout) => layout.targets(),
        None => bundle.targets,
    };

    let mut profile = bundle.profile.into_profile();
    for entry in bundle.bindings {
        profile = profile.with_binding(entry.layer_id.unwrap_or(0), &entry.target_id, entry.binding);
    }

    // Without a layout or a target list there is nothing to validate against.
    if !targets.is_empty() {
        let known: HashSet<String> = targets.iter().cloned().collect();
        let (kept, stale) = profile.retain_targets(&known);
        for binding in &stale {
            debug!(
                layer = binding.layer_id,
                target = %binding.target_id,
                "dropping binding for vanished target"
            );
        }
        profile = kept;
    }

    Ok(SessionState {
        session_id: bundle.session_id,
        device: bundle.device,
        capabilities: bundle.capabilities,
        profile,
        layout,
        targets,
        sequences: bundle.sequences,
        ram_loaded: bundle.applied_state.is_some(),
        sync: SyncState {
            committed: bundle.committed_state,
            applied: bundle.applied_state,
            staged: bundle.staged_state,
        },
        running: None,
        via_state: None,
    })
}

// ── DeviceSession ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Inner {
    phase: Phase,
    state: Option<Arc<SessionState>>,
    /// Device of the open session (or the last one while reconnecting).
    device_id: Option<String>,
    /// Device tried when `connect` is called without an id.
    preferred_device_id: Option<String>,
    devices: Vec<DeviceInfo>,
    last_error: Option<UserError>,
    last_success: Option<String>,
}

impl Inner {
    fn settled_phase(&self) -> Phase {
        if self.state.is_some() {
            Phase::Connected
        } else {
            Phase::Disconnected
        }
    }
}

/// Releases the busy flag and settles the phase when dropped.
struct BusyGuard<'a> {
    session: &'a DeviceSession,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.session.lock();
        inner.phase = inner.settled_phase();
        self.session.busy.store(false, Ordering::SeqCst);
    }
}

/// The live device session.
pub struct DeviceSession {
    gateway: Arc<dyn DeviceGateway>,
    catalogs: Arc<CatalogRegistry>,
    inner: Mutex<Inner>,
    busy: AtomicBool,
    polling: AtomicBool,
}

impl DeviceSession {
    pub fn new(gateway: Arc<dyn DeviceGateway>, catalogs: Arc<CatalogRegistry>) -> Self {
        Self {
            gateway,
            catalogs,
            inner: Mutex::new(Inner {
                phase: Phase::Disconnected,
                state: None,
                device_id: None,
                preferred_device_id: None,
                devices: Vec::new(),
                last_error: None,
                last_success: None,
            }),
            busy: AtomicBool::new(false),
            polling: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_begin(&self, phase: Phase) -> Option<BusyGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(?phase, "session busy; skipping");
            return None;
        }
        self.lock().phase = phase;
        Some(BusyGuard { session: self })
    }

    fn record_error(&self, err: SessionError) -> SessionError {
        self.lock().last_error = Some(err.to_user_error());
        err
    }

    fn record_success(&self, message: &str) {
        let mut inner = self.lock();
        inner.last_error = None;
        inner.last_success = Some(message.to_string());
    }

    /// Installs `state` and returns the id of the session it replaced, if any.
    fn install(&self, state: SessionState) -> Option<String> {
        let mut inner = self.lock();
        inner.device_id = Some(state.device.id.clone());
        inner
            .state
            .replace(Arc::new(state))
            .map(|previous| previous.session_id.clone())
    }

    /// Best-effort close of a session the device may still hold open.
    async fn close_quietly(&self, session_id: &str) {
        if let Err(err) = self.gateway.close_session(session_id).await {
            debug!(session = %session_id, error = %err, "close_session failed");
        }
    }

    /// Replaces the state only if the same session is still open.
    fn replace_state(&self, session_id: &str, update: impl FnOnce(&SessionState) -> SessionState) {
        let mut inner = self.lock();
        if let Some(current) = inner.state.as_ref().filter(|s| s.session_id == session_id) {
            let next = update(current);
            inner.state = Some(Arc::new(next));
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn state(&self) -> Option<Arc<SessionState>> {
        self.lock().state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.lock().state.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Staged differs from applied (or committed).  Recomputed on every call.
    pub fn is_dirty(&self) -> bool {
        self.state().is_some_and(|s| s.sync.is_dirty())
    }

    pub fn sync_status(&self) -> SyncStatus {
        match self.state() {
            Some(state) => SyncStatus {
                committed: state.sync.committed.clone(),
                applied: state.sync.applied.clone(),
                staged: state.sync.staged.clone(),
                dirty: state.sync.is_dirty(),
                ram_loaded: state.ram_loaded,
                running: state.running.clone(),
            },
            None => SyncStatus::default(),
        }
    }

    pub fn device_mode(&self) -> Option<DeviceMode> {
        self.state().map(|s| s.mode())
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.lock().devices.clone()
    }

    pub fn last_error(&self) -> Option<UserError> {
        self.lock().last_error.clone()
    }

    pub fn last_success(&self) -> Option<String> {
        self.lock().last_success.clone()
    }

    pub fn set_preferred_device(&self, device_id: Option<String>) {
        self.lock().preferred_device_id = device_id;
    }

    pub fn preferred_device(&self) -> Option<String> {
        self.lock().preferred_device_id.clone()
    }

    // ── Connection ────────────────────────────────────────────────────────────

    /// Opens a session on `device_id`.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn open_session(&self, device_id: &str) -> Result<bool, SessionError> {
        self.connect(Some(device_id)).await
    }

    /// Connects to `device_id`, else the last device, else the preferred one.
    ///
    /// Returns `Ok(false)` if another operation is in flight or a session is
    /// already open; call [`disconnect`](Self::disconnect) first to switch
    /// devices.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoDevices`] if there is nothing to connect to, or the
    /// gateway / hydration error.  The session stays disconnected.
    pub async fn connect(&self, device_id: Option<&str>) -> Result<bool, SessionError> {
        if self.is_connected() {
            debug!(device = ?device_id, "already connected; connect skipped");
            return Ok(false);
        }
        let Some(_guard) = self.try_begin(Phase::Connecting) else {
            return Ok(false);
        };
        if self.is_connected() {
            debug!(device = ?device_id, "already connected; connect skipped");
            return Ok(false);
        }

        match self.connect_inner(device_id).await {
            Ok(chosen) => {
                info!(device = %chosen, "connected");
                self.lock().preferred_device_id = Some(chosen);
                self.record_success("Connected");
                Ok(true)
            }
            Err(err) => {
                warn!(error = %err, "connect failed");
                Err(self.record_error(err))
            }
        }
    }

    async fn connect_inner(&self, requested: Option<&str>) -> Result<String, SessionError> {
        let known_devices = !self.lock().devices.is_empty();
        if !known_devices {
            let listed = self
                .gateway
                .list_devices()
                .await
                .map_err(SessionError::device_call("list_devices"))?;
            let mut inner = self.lock();
            inner.devices = reconcile_devices(listed, &[], None, false).devices;
        }

        let chosen = {
            let inner = self.lock();
            requested
                .map(str::to_string)
                .or_else(|| inner.device_id.clone())
                .or_else(|| inner.preferred_device_id.clone())
        }
        .ok_or(SessionError::NoDevices)?;

        match self.gateway.inspect_device(&chosen).await {
            Ok(info) => debug!(device = %info.id, firmware = ?info.firmware_version, "inspected device"),
            Err(err) => debug!(device = %chosen, error = %err, "inspect failed"),
        }

        self.fetch_and_hydrate(&chosen).await?;
        Ok(chosen)
    }

    /// Opens a session on the gateway and installs the hydrated state.
    async fn fetch_and_hydrate(&self, device_id: &str) -> Result<(), SessionError> {
        let bundle = self
            .gateway
            .open_session(device_id)
            .await
            .map_err(SessionError::device_call("open_session"))?;
        let state = hydrate_bundle(bundle)?;
        let read_via = state.device.has_via_interface() && state.mode() == DeviceMode::ViaDirect;
        let session_id = state.session_id.clone();
        if let Some(replaced) = self.install(state).filter(|id| *id != session_id) {
            self.close_quietly(&replaced).await;
        }

        if read_via {
            match self.gateway.via_read_state(device_id).await {
                Ok(via) => self.replace_state(&session_id, |s| s.with_via_state(via)),
                Err(err) => warn!(device = %device_id, error = %err, "VIA state read failed"),
            }
        }
        Ok(())
    }

    /// Closes the session.  Skipped while busy.
    pub async fn disconnect(&self) -> bool {
        if self.is_busy() {
            debug!("session busy; disconnect skipped");
            return false;
        }
        self.teardown().await;
        true
    }

    /// Forgets the session; closing it on the device is best-effort.
    async fn teardown(&self) {
        let session_id = {
            let mut inner = self.lock();
            let session_id = inner.state.take().map(|s| s.session_id.clone());
            inner.device_id = None;
            if !self.busy.load(Ordering::SeqCst) {
                inner.phase = Phase::Disconnected;
            }
            session_id
        };

        if let Some(session_id) = session_id {
            self.close_quietly(&session_id).await;
            info!(session = %session_id, "disconnected");
        }
    }

    /// Re-reads the three snapshots from the device.
    ///
    /// A retryable failure triggers one full reopen of the last device; the
    /// stale session is closed once the new one is installed.  If the reopen
    /// fails too, the session is torn down.
    ///
    /// # Errors
    ///
    /// Non-retryable status failures propagate unchanged without a retry;
    /// a failed reopen yields [`SessionError::DeviceDisconnected`].
    pub async fn refresh_session(&self) -> Result<(), SessionError> {
        let ids = {
            let inner = self.lock();
            inner
                .state
                .as_ref()
                .map(|s| s.session_id.clone())
                .zip(inner.device_id.clone())
        };
        let Some((session_id, device_id)) = ids else {
            return Ok(());
        };

        let err = match self.gateway.get_status(&session_id).await {
            Ok(status) => {
                self.replace_state(&session_id, |s| s.with_status(&status));
                return Ok(());
            }
            Err(err) if !err.retryable => {
                return Err(self.record_error(SessionError::DeviceCall {
                    operation: "get_status",
                    source: err,
                }));
            }
            Err(err) => err,
        };

        warn!(device = %device_id, error = %err, "status refresh failed; reopening session");
        match self.fetch_and_hydrate(&device_id).await {
            Ok(()) => {
                self.lock().last_error = None;
                Ok(())
            }
            Err(reopen) => {
                warn!(device = %device_id, error = %reopen, "reopen failed; disconnecting");
                self.teardown().await;
                Err(self.record_error(SessionError::DeviceDisconnected {
                    source: Box::new(reopen),
                }))
            }
        }
    }

    // ── Editing ───────────────────────────────────────────────────────────────

    /// Stages `binding` on `(layer_id, target_id)`.
    ///
    /// Unknown targets are a no-op (`Ok(false)`), as is a call while busy.
    /// On direct-keymap devices the binding is translated first; a failed
    /// translation leaves the previous binding in place.
    ///
    /// # Errors
    ///
    /// [`SessionError::Unsupported`] when the device has no keymap editing,
    /// [`SessionError::Translation`], or the gateway error.
    pub async fn stage_binding(
        &self,
        layer_id: u32,
        target_id: &str,
        binding: Binding,
    ) -> Result<bool, SessionError> {
        let Some(state) = self.state() else {
            return Ok(false);
        };
        if !state.has_target(target_id) {
            debug!(target = %target_id, "stage_binding for unknown target ignored");
            return Ok(false);
        }
        if !state.capabilities.keymap {
            let message = if state.is_preview() {
                "keymap editing unsupported: this is a preview session; connect a device to edit bindings"
            } else {
                "keymap editing unsupported by this device"
            };
            return Err(self.record_error(SessionError::Unsupported(message.into())));
        }

        let Some(_guard) = self.try_begin(Phase::Busy(BusyOp::PushingBinding)) else {
            return Ok(false);
        };

        let native = if state.mode() == DeviceMode::ViaDirect {
            translate_for_via(&binding, &self.catalogs.codec(), &state.sequences).map_err(
                |source| {
                    self.record_error(SessionError::Translation {
                        target_id: target_id.to_string(),
                        source,
                    })
                },
            )?
        } else {
            binding.clone()
        };

        let entry = BindingEntry {
            target_id: target_id.to_string(),
            layer_id: Some(layer_id),
            binding: native,
        };
        self.gateway
            .set_binding(&state.session_id, &entry)
            .await
            .map_err(|e| self.record_error(SessionError::device_call("set_binding")(e)))?;

        self.replace_state(&state.session_id, |s| {
            let profile = s.profile.with_binding(layer_id, target_id, binding);
            let checksum = profile_checksum(&profile, &s.sequences);
            SessionState {
                sync: s.sync.with_staged_checksum(&profile.id, checksum),
                profile,
                ..s.clone()
            }
        });
        debug!(layer = layer_id, target = %target_id, "binding staged");

        self.refresh_session().await?;
        self.record_success("Binding updated");
        Ok(true)
    }

    /// Loads staged bindings into RAM.  Skipped when disconnected or busy.
    ///
    /// # Errors
    ///
    /// The gateway error; local state is unchanged.
    pub async fn apply_to_ram(&self) -> Result<bool, SessionError> {
        self.device_op(BusyOp::Applying).await
    }

    /// Restores RAM from flash.  Skipped when disconnected or busy.
    ///
    /// # Errors
    ///
    /// The gateway error; local state is unchanged.
    pub async fn revert_ram(&self) -> Result<bool, SessionError> {
        self.device_op(BusyOp::Reverting).await
    }

    /// Writes RAM to flash.  Skipped when disconnected or busy.
    ///
    /// # Errors
    ///
    /// The gateway error; local state is unchanged.
    pub async fn commit(&self) -> Result<bool, SessionError> {
        self.device_op(BusyOp::Committing).await
    }

    async fn device_op(&self, op: BusyOp) -> Result<bool, SessionError> {
        let Some(session_id) = self.state().map(|s| s.session_id.clone()) else {
            return Ok(false);
        };
        let Some(_guard) = self.try_begin(Phase::Busy(op)) else {
            return Ok(false);
        };

        let (operation, success, result) = match op {
            BusyOp::Applying => (
                "apply_to_ram",
                "Applied to RAM",
                self.gateway.apply_to_ram(&session_id).await,
            ),
            BusyOp::Reverting => (
                "revert_ram",
                "Reverted RAM",
                self.gateway.revert_ram(&session_id).await,
            ),
            _ => (
                "commit",
                "Committed to flash",
                self.gateway.commit(&session_id).await,
            ),
        };
        result.map_err(|e| self.record_error(SessionError::device_call(operation)(e)))?;

        info!(session = %session_id, operation, "device operation complete");
        self.refresh_session().await?;
        self.record_success(success);
        Ok(true)
    }

    /// Starts a sequence on the device without waiting for it.
    ///
    /// Returns `None` when disconnected.  Failures are logged.
    pub fn run(&self, sequence_id: &str) -> Option<JoinHandle<()>> {
        let session_id = self.state()?.session_id.clone();
        let gateway = Arc::clone(&self.gateway);
        let sequence_id = sequence_id.to_string();
        Some(tokio::spawn(async move {
            if let Err(err) = gateway.run(&session_id, &sequence_id).await {
                warn!(sequence = %sequence_id, error = %err, "run failed");
            }
        }))
    }

    /// Stops everything running on the device.  Runs even while busy.
    ///
    /// Returns `None` when disconnected.  Failures are logged.
    pub fn stop_all(&self) -> Option<JoinHandle<()>> {
        let session_id = self.state()?.session_id.clone();
        let gateway = Arc::clone(&self.gateway);
        Some(tokio::spawn(async move {
            if let Err(err) = gateway.stop_all(&session_id).await {
                warn!(error = %err, "stop_all failed");
            }
        }))
    }

    /// Builds a read-only preview session from an exported VIA bundle.
    ///
    /// # Errors
    ///
    /// The gateway or hydration error.
    pub async fn import_via_bundle(&self, content: &str) -> Result<bool, SessionError> {
        let Some(_guard) = self.try_begin(Phase::Busy(BusyOp::Importing)) else {
            return Ok(false);
        };

        let bundle = self
            .gateway
            .import_via_bundle(content)
            .await
            .map_err(|e| self.record_error(SessionError::device_call("import_via_bundle")(e)))?;
        let state = hydrate_bundle(bundle).map_err(|e| self.record_error(e))?;
        info!(session = %state.session_id, targets = state.targets.len(), "imported bundle");
        if let Some(replaced) = self.install(state) {
            self.close_quietly(&replaced).await;
        }
        self.record_success("Imported layout");
        Ok(true)
    }

    // ── VIA ───────────────────────────────────────────────────────────────────

    /// Probes `device_id` for VIA's raw-HID interface.
    ///
    /// # Errors
    ///
    /// The gateway error.
    pub async fn probe_via(&self, device_id: &str) -> Result<ViaProbe, SessionError> {
        self.gateway
            .probe_via(device_id)
            .await
            .map_err(|e| self.record_error(SessionError::device_call("probe_via")(e)))
    }

    /// Re-reads the VIA keymap of the connected device.
    ///
    /// # Errors
    ///
    /// The gateway error.
    pub async fn read_via_state(&self) -> Result<Option<ViaState>, SessionError> {
        let Some(state) = self.state() else {
            return Ok(None);
        };
        let via = self
            .gateway
            .via_read_state(&state.device.id)
            .await
            .map_err(|e| self.record_error(SessionError::device_call("via_read_state")(e)))?;
        self.replace_state(&state.session_id, |s| s.with_via_state(via.clone()));
        Ok(Some(via))
    }

    /// Writes one keycode over VIA, then re-reads the keymap.
    ///
    /// # Errors
    ///
    /// The gateway error.
    pub async fn write_via_keycode(
        &self,
        layer: u8,
        row: u32,
        col: u32,
        keycode: u16,
    ) -> Result<bool, SessionError> {
        let Some(state) = self.state() else {
            return Ok(false);
        };
        let Some(_guard) = self.try_begin(Phase::Busy(BusyOp::WritingKeycode)) else {
            return Ok(false);
        };

        debug!(device = %state.device.id, layer, row, col, keycode, "VIA set keycode");
        self.gateway
            .via_set_keycode(&state.device.id, layer, row, col, keycode)
            .await
            .map_err(|e| self.record_error(SessionError::device_call("via_set_keycode")(e)))?;
        self.read_via_state().await?;
        self.record_success("Keycode updated");
        Ok(true)
    }

    /// Decoded labels of every key on `layer`, keyed by target id.
    pub fn keycode_labels(&self, layer: u8) -> BTreeMap<String, KeycodeLabel> {
        let Some(state) = self.state() else {
            return BTreeMap::new();
        };
        let (Some(layout), Some(via)) = (&state.layout, &state.via_state) else {
            return BTreeMap::new();
        };
        let codec = self.catalogs.codec();
        layout
            .keys
            .iter()
            .filter_map(|key| {
                let code = via.keycode(layer, key.row, key.col)?;
                Some((key.element_id.clone(), codec.decode_label(code)))
            })
            .collect()
    }

    // ── Layout ────────────────────────────────────────────────────────────────

    /// Moves one element by `(dx, dy)`, producing a new layout.
    pub fn offset_layout_element(&self, element_id: &str, dx: f64, dy: f64) -> bool {
        let Some(state) = self.state() else {
            return false;
        };
        let Some(moved) = state
            .layout
            .as_ref()
            .and_then(|l| l.with_element_offset(element_id, dx, dy))
        else {
            return false;
        };
        self.replace_state(&state.session_id, |s| SessionState {
            layout: Some(moved),
            ..s.clone()
        });
        true
    }

    /// Saves the current layout to a device that stores layouts.
    ///
    /// # Errors
    ///
    /// The gateway error.
    pub async fn persist_layout(&self) -> Result<bool, SessionError> {
        let Some(state) = self.state() else {
            return Ok(false);
        };
        let Some(layout) = state.layout.as_ref().filter(|_| state.capabilities.layouts) else {
            return Ok(false);
        };
        self.gateway
            .set_layout(&state.session_id, layout)
            .await
            .map_err(|e| self.record_error(SessionError::device_call("set_layout")(e)))?;
        self.record_success("Layout saved");
        Ok(true)
    }

    // ── Device list ───────────────────────────────────────────────────────────

    /// Re-lists devices and merges them into the stable ordering.
    ///
    /// Forces a disconnect if the connected device has vanished.
    ///
    /// # Errors
    ///
    /// The `list_devices` gateway error.
    pub async fn refresh_devices(&self) -> Result<(), SessionError> {
        let listed = self
            .gateway
            .list_devices()
            .await
            .map_err(|e| self.record_error(SessionError::device_call("list_devices")(e)))?;

        let (vanished, selected) = {
            let mut inner = self.lock();
            let selected = inner
                .device_id
                .clone()
                .or_else(|| inner.preferred_device_id.clone());
            let update = reconcile_devices(
                listed,
                &inner.devices,
                selected.as_deref(),
                inner.state.is_some(),
            );
            inner.devices = update.devices;
            (update.connected_device_vanished, selected)
        };

        if vanished {
            warn!(device = ?selected, "connected device missing; disconnecting");
            self.teardown().await;
        }
        Ok(())
    }

    /// One poll tick.  Skipped while busy or dragging, and when a poll is
    /// already running.
    ///
    /// Returns whether the device list was refreshed.
    pub async fn poll_devices(&self, monitor: &InteractionMonitor) -> bool {
        if self.is_busy() || monitor.is_dragging() {
            return false;
        }
        if self.polling.swap(true, Ordering::SeqCst) {
            return false;
        }
        let result = self.refresh_devices().await;
        self.polling.store(false, Ordering::SeqCst);

        if let Err(err) = result {
            warn!(error = %err, "device poll failed");
            return false;
        }
        true
    }
}

/// Polls the device list every `interval` until `running` is cleared.
pub fn spawn_device_poller(
    session: Arc<DeviceSession>,
    monitor: Arc<InteractionMonitor>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            session.poll_devices(&monitor).await;
        }
        debug!("device poller stopped");
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
