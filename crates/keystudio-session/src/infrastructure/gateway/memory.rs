//! In-memory device backend.
//!
//! Simulates keyboards with a flash slot, a RAM slot, and an edit buffer,
//! each tracked as a full [`Profile`] so the reported checksums behave the
//! way real firmware's do.  Used by the headless runner and by the
//! integration tests, which can inject failures and unplug devices.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use keystudio_core::layout::NormalizedLayout;
use keystudio_core::profile::device::{VIA_USAGE, VIA_USAGE_PAGE};
use keystudio_core::profile::{
    profile_checksum, Binding, BindingEntry, Capabilities, DeviceInfo, HidInterface, Profile,
    ProfileBundle, Sequence, StateSnapshot, StatusSnapshot, ViaProbe, ViaState, WireProfile,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::application::gateway::{DeviceGateway, GatewayError};
use crate::application::session::PREVIEW_SESSION_PREFIX;

const VIA_PROTOCOL_VERSION: u16 = 12;

/// A simulated keyboard.
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    pub device: DeviceInfo,
    pub capabilities: Capabilities,
    /// What flash holds when the device is first opened.
    pub profile: Profile,
    pub raw_layout: Option<Value>,
    pub sequences: Vec<Sequence>,
    /// Present when the device speaks VIA.
    pub via: Option<ViaState>,
}

impl DeviceFixture {
    /// A device using the full staged/applied/committed flow.
    pub fn studio(id: &str, name: &str, raw_layout: Value) -> Self {
        Self {
            device: DeviceInfo::new(id, name, "hid"),
            capabilities: Capabilities {
                volatile_apply: true,
                commit: true,
                layouts: true,
                keymap: true,
                sequences: true,
            },
            profile: Profile::new(format!("{id}-profile"), name),
            raw_layout: Some(raw_layout),
            sequences: Vec::new(),
            via: None,
        }
    }

    /// A stock VIA keyboard: direct keycode writes, `layers` layers of
    /// `rows × cols` transparent keys.
    pub fn via(id: &str, name: &str, raw_layout: Value, layers: u8, rows: usize, cols: usize) -> Self {
        let mut device = DeviceInfo::new(id, name, "hid");
        device.interfaces.push(HidInterface {
            usage_page: VIA_USAGE_PAGE,
            usage: VIA_USAGE,
            interface_number: Some(1),
            label: Some("raw".into()),
        });
        Self {
            device,
            capabilities: Capabilities {
                keymap: true,
                ..Capabilities::default()
            },
            profile: Profile::new(format!("{id}-profile"), name),
            raw_layout: Some(raw_layout),
            sequences: Vec::new(),
            via: Some(ViaState {
                layer_count: layers,
                keymap: vec![vec![vec![0x0001; cols]; rows]; usize::from(layers)],
            }),
        }
    }
}

/// One slot's profile and revision.
#[derive(Debug, Clone)]
struct Slot {
    profile: Profile,
    revision: u32,
}

#[derive(Debug)]
struct OpenSession {
    device_id: String,
    sequences: Vec<Sequence>,
    committed: Option<Slot>,
    applied: Option<Slot>,
    staged: Option<Slot>,
    running: Option<String>,
}

impl OpenSession {
    fn snapshot(&self, slot: &Option<Slot>) -> Option<StateSnapshot> {
        slot.as_ref().map(|s| {
            StateSnapshot::new(
                s.profile.id.clone(),
                profile_checksum(&s.profile, &self.sequences),
                s.revision,
            )
        })
    }

    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.running.clone(),
            ram_loaded: self.applied.is_some(),
            committed_state: self.snapshot(&self.committed),
            applied_state: self.snapshot(&self.applied),
            staged_state: self.snapshot(&self.staged),
        }
    }
}

#[derive(Debug, Default)]
struct Devices {
    fixtures: Vec<DeviceFixture>,
    /// Flash contents per device, surviving across sessions.
    flash: HashMap<String, Slot>,
    sessions: HashMap<String, OpenSession>,
    layouts: HashMap<String, NormalizedLayout>,
    failures: HashMap<String, VecDeque<GatewayError>>,
    calls: HashMap<String, usize>,
}

impl Devices {
    fn fixture(&self, device_id: &str) -> Result<&DeviceFixture, GatewayError> {
        self.fixtures
            .iter()
            .find(|f| f.device.id == device_id)
            .ok_or_else(|| not_found(device_id))
    }

    fn fixture_mut(&mut self, device_id: &str) -> Result<&mut DeviceFixture, GatewayError> {
        self.fixtures
            .iter_mut()
            .find(|f| f.device.id == device_id)
            .ok_or_else(|| not_found(device_id))
    }

    /// Session whose device is still plugged in.
    fn session_mut(&mut self, session_id: &str) -> Result<&mut OpenSession, GatewayError> {
        let device_id = self
            .sessions
            .get(session_id)
            .map(|s| s.device_id.clone())
            .ok_or_else(|| GatewayError::fatal("E_SESSION", format!("unknown session {session_id}")))?;
        if !session_id.starts_with(PREVIEW_SESSION_PREFIX) {
            self.fixture(&device_id)
                .map_err(|_| GatewayError::retryable("E_IO", format!("{device_id} not responding")))?;
        }
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| GatewayError::fatal("E_SESSION", format!("unknown session {session_id}")))
    }
}

fn not_found(device_id: &str) -> GatewayError {
    GatewayError::retryable("E_NOT_FOUND", format!("device {device_id} not found"))
}

/// [`DeviceGateway`] backed by simulated devices.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    devices: Mutex<Devices>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway with one studio macropad attached.
    pub fn with_demo_device() -> Self {
        let gateway = Self::new();
        gateway.add_device(DeviceFixture::studio("demo-pad", "Demo Macropad", demo_layout()));
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, Devices> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plugs in a device.
    pub fn add_device(&self, fixture: DeviceFixture) {
        let mut devices = self.lock();
        devices.fixtures.retain(|f| f.device.id != fixture.device.id);
        devices.fixtures.push(fixture);
    }

    /// Unplugs a device; its open sessions start failing with retryable errors.
    pub fn unplug(&self, device_id: &str) {
        self.lock().fixtures.retain(|f| f.device.id != device_id);
        debug!(device = %device_id, "unplugged");
    }

    /// Makes the next call to `operation` fail with `error`.  Repeated calls
    /// queue further failures.
    pub fn fail_next(&self, operation: &str, error: GatewayError) {
        self.lock()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// How many times `operation` has been called.
    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Sessions the device currently holds open.
    pub fn open_session_count(&self, device_id: &str) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.device_id == device_id)
            .count()
    }

    /// What the device's open session holds in its edit buffer for one key.
    pub fn staged_binding(&self, device_id: &str, layer_id: u32, target_id: &str) -> Option<Binding> {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.device_id == device_id)
            .find_map(|s| s.staged.as_ref()?.profile.binding(layer_id, target_id).cloned())
    }

    /// Current keycode at one VIA matrix position.
    pub fn via_keycode(&self, device_id: &str, layer: u8, row: u32, col: u32) -> Option<u16> {
        let devices = self.lock();
        let via = devices.fixture(device_id).ok()?.via.as_ref()?;
        via.keycode(layer, row, col)
    }

    /// Counts the call and pops an injected failure, if any.
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, Devices>, GatewayError> {
        let mut devices = self.lock();
        *devices.calls.entry(operation.to_string()).or_default() += 1;
        let failure = devices
            .failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(error) => Err(error),
            None => Ok(devices),
        }
    }
}

/// A small macropad: two key rows, a wide key, and one rotary encoder.
pub fn demo_layout() -> Value {
    json!({
        "name": "Demo Macropad",
        "matrix": { "rows": 3, "cols": 3 },
        "layouts": {
            "keymap": [
                ["0,0", "0,1", "0,2", { "x": 0.5 }, "2,0\ne", "2,1\ne"],
                ["1,0", "1,1", "1,2"],
                [{ "w": 2 }, "2,2"]
            ]
        }
    })
}

#[async_trait]
impl DeviceGateway for InMemoryGateway {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, GatewayError> {
        let devices = self.enter("list_devices")?;
        Ok(devices.fixtures.iter().map(|f| f.device.clone()).collect())
    }

    async fn inspect_device(&self, device_id: &str) -> Result<DeviceInfo, GatewayError> {
        let devices = self.enter("inspect_device")?;
        Ok(devices.fixture(device_id)?.device.clone())
    }

    async fn open_session(&self, device_id: &str) -> Result<ProfileBundle, GatewayError> {
        tokio::task::yield_now().await;
        let mut devices = self.enter("open_session")?;
        let fixture = devices.fixture(device_id)?.clone();

        let flash = devices
            .flash
            .entry(device_id.to_string())
            .or_insert_with(|| Slot {
                profile: fixture.profile.clone(),
                revision: 1,
            })
            .clone();
        let session = OpenSession {
            device_id: device_id.to_string(),
            sequences: fixture.sequences.clone(),
            committed: Some(flash.clone()),
            applied: None,
            staged: Some(flash.clone()),
            running: None,
        };
        let session_id = Uuid::new_v4().to_string();
        let status = session.status();
        devices.sessions.insert(session_id.clone(), session);
        let layout = devices.layouts.get(device_id).cloned();
        debug!(device = %device_id, session = %session_id, "session opened");

        Ok(ProfileBundle {
            session_id,
            device: fixture.device,
            capabilities: fixture.capabilities,
            profile: WireProfile::from_profile(&flash.profile),
            raw_layout: if layout.is_some() { None } else { fixture.raw_layout },
            layout,
            targets: Vec::new(),
            sequences: fixture.sequences,
            committed_state: status.committed_state,
            applied_state: status.applied_state,
            staged_state: status.staged_state,
            bindings: Vec::new(),
        })
    }

    async fn close_session(&self, session_id: &str) -> Result<(), GatewayError> {
        let mut devices = self.enter("close_session")?;
        devices.sessions.remove(session_id);
        Ok(())
    }

    async fn set_binding(
        &self,
        session_id: &str,
        entry: &BindingEntry,
    ) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        let mut devices = self.enter("set_binding")?;
        let session = devices.session_mut(session_id)?;
        let staged = session
            .staged
            .clone()
            .ok_or_else(|| GatewayError::fatal("E_STATE", "no staged buffer"))?;
        session.staged = Some(Slot {
            profile: staged.profile.with_binding(
                entry.layer_id.unwrap_or(0),
                &entry.target_id,
                entry.binding.clone(),
            ),
            revision: staged.revision,
        });
        Ok(())
    }

    async fn set_layout(
        &self,
        session_id: &str,
        layout: &NormalizedLayout,
    ) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        let mut devices = self.enter("set_layout")?;
        let device_id = devices.session_mut(session_id)?.device_id.clone();
        devices.layouts.insert(device_id, layout.clone());
        Ok(())
    }

    async fn import_via_bundle(&self, content: &str) -> Result<ProfileBundle, GatewayError> {
        tokio::task::yield_now().await;
        let mut devices = self.enter("import_via_bundle")?;
        let raw: Value = serde_json::from_str(content)
            .map_err(|e| GatewayError::fatal("E_BAD_BUNDLE", format!("invalid VIA bundle: {e}")))?;
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Imported layout")
            .to_string();

        let session_id = format!("{PREVIEW_SESSION_PREFIX}{}", Uuid::new_v4());
        let device = DeviceInfo::new(session_id.clone(), name.clone(), "file");
        devices.sessions.insert(
            session_id.clone(),
            OpenSession {
                device_id: device.id.clone(),
                sequences: Vec::new(),
                committed: None,
                applied: None,
                staged: None,
                running: None,
            },
        );

        Ok(ProfileBundle {
            session_id,
            device,
            capabilities: Capabilities::default(),
            profile: WireProfile {
                id: "preview".into(),
                name,
                layers: Vec::new(),
            },
            layout: None,
            raw_layout: Some(raw),
            targets: Vec::new(),
            sequences: Vec::new(),
            committed_state: None,
            applied_state: None,
            staged_state: None,
            bindings: Vec::new(),
        })
    }

    async fn apply_to_ram(&self, session_id: &str) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        let mut devices = self.enter("apply_to_ram")?;
        let session = devices.session_mut(session_id)?;
        session.applied = session.staged.clone();
        Ok(())
    }

    async fn revert_ram(&self, session_id: &str) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        let mut devices = self.enter("revert_ram")?;
        let session = devices.session_mut(session_id)?;
        session.applied = session.committed.clone();
        session.staged = session.committed.clone();
        Ok(())
    }

    async fn commit(&self, session_id: &str) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        let mut devices = self.enter("commit")?;
        let session = devices.session_mut(session_id)?;
        let source = session
            .applied
            .clone()
            .or_else(|| session.staged.clone())
            .ok_or_else(|| GatewayError::fatal("E_STATE", "nothing to commit"))?;
        let revision = session.committed.as_ref().map_or(0, |s| s.revision) + 1;
        let slot = Slot {
            profile: source.profile,
            revision,
        };
        session.committed = Some(slot.clone());
        session.applied = Some(slot.clone());
        session.staged = Some(slot.clone());
        let device_id = session.device_id.clone();
        devices.flash.insert(device_id, slot);
        Ok(())
    }

    async fn run(&self, session_id: &str, sequence_id: &str) -> Result<(), GatewayError> {
        let mut devices = self.enter("run")?;
        let session = devices.session_mut(session_id)?;
        if !session.sequences.iter().any(|s| s.id == sequence_id) {
            return Err(GatewayError::fatal(
                "E_NO_SEQUENCE",
                format!("sequence {sequence_id} not found"),
            ));
        }
        session.running = Some(sequence_id.to_string());
        Ok(())
    }

    async fn stop_all(&self, session_id: &str) -> Result<(), GatewayError> {
        let mut devices = self.enter("stop_all")?;
        devices.session_mut(session_id)?.running = None;
        Ok(())
    }

    async fn get_status(&self, session_id: &str) -> Result<StatusSnapshot, GatewayError> {
        let mut devices = self.enter("get_status")?;
        Ok(devices.session_mut(session_id)?.status())
    }

    async fn probe_via(&self, device_id: &str) -> Result<ViaProbe, GatewayError> {
        let devices = self.enter("probe_via")?;
        let detected = devices.fixture(device_id)?.via.is_some();
        Ok(ViaProbe {
            via_detected: detected,
            via_protocol_version: detected.then_some(VIA_PROTOCOL_VERSION),
            write_len: detected.then_some(32),
            read_len: detected.then_some(32),
            timeout_ms: Some(500),
            first_bytes: None,
        })
    }

    async fn via_read_state(&self, device_id: &str) -> Result<ViaState, GatewayError> {
        let devices = self.enter("via_read_state")?;
        devices
            .fixture(device_id)?
            .via
            .clone()
            .ok_or_else(|| GatewayError::fatal("E_NO_VIA", format!("{device_id} does not speak VIA")))
    }

    async fn via_set_keycode(
        &self,
        device_id: &str,
        layer: u8,
        row: u32,
        col: u32,
        keycode: u16,
    ) -> Result<(), GatewayError> {
        tokio::task::yield_now().await;
        let mut devices = self.enter("via_set_keycode")?;
        let slot = devices
            .fixture_mut(device_id)?
            .via
            .as_mut()
            .and_then(|via| via.keymap.get_mut(usize::from(layer)))
            .and_then(|rows| rows.get_mut(row as usize))
            .and_then(|cols| cols.get_mut(col as usize))
            .ok_or_else(|| {
                GatewayError::fatal(
                    "E_RANGE",
                    format!("no key at layer {layer} row {row} col {col}"),
                )
            })?;
        *slot = keycode;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
