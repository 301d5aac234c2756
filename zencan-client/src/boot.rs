//! NMT master boot-slave coordinator
//!
//! Drives the boot-slave procedure used to bring a known set of slave nodes from an unknown
//! on-bus state into a startable one: checking that each configured slave is present, verifying
//! its identity against the locally configured expectations, and waiting for it to prove
//! liveness via heartbeat and node guarding before the network is started.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use snafu::{ResultExt, Snafu};
use tokio::sync::Mutex as TokioMutex;
use tokio::time::timeout;

use zencan_common::{
    constants::{nmt_slave_assignment_bits, object_ids},
    messages::{NmtState, ZencanMessage, HEARTBEAT_ID},
    traits::{AsyncCanReceiver, AsyncCanSender},
    CanId, CanMessage,
};

use crate::bus_manager::{SharedReceiver, SharedReceiverChannel, SharedSender};
use crate::nmt_master::NmtMaster;
use crate::sdo_client::{SdoClient, SdoClientError};

/// Outcome of [`BootMaster::boot_slave`], using the single-letter boot-status convention common
/// to CANopen master stacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootStatus {
    /// Boot completed; the slave is ready to be started
    Ok,
    /// 'A' - the slave is not marked present in the network list
    NotPresent,
    /// 'B' - failed to upload the device type object (0x1000)
    DeviceTypeUploadFailed,
    /// 'C' - the device type does not match the expected value (0x1F84)
    DeviceTypeMismatch,
    /// 'D' - the identity vendor id does not match the expected value (0x1F85)
    VendorIdMismatch,
    /// 'E' - timed out waiting for a heartbeat from the slave
    HeartbeatTimeout,
    /// 'F' - timed out waiting for a node guard response from the slave
    GuardTimeout,
    /// 'J' - a configuration callback reported an error
    ConfigError,
    /// 'K' - the heartbeat was lost while starting error control
    HeartbeatLostDuringStart,
    /// 'L' - the slave was unexpectedly already Operational at boot start
    AlreadyOperational,
    /// 'M' - the identity product code does not match the expected value (0x1F86)
    ProductCodeMismatch,
    /// 'N' - the identity revision does not match the expected value (0x1F87)
    RevisionMismatch,
    /// 'O' - the identity serial number does not match the expected value (0x1F88)
    SerialMismatch,
}

impl BootStatus {
    /// The single-letter boot status code this outcome corresponds to, or `None` for success
    pub fn letter(&self) -> Option<char> {
        use BootStatus::*;
        match self {
            Ok => None,
            NotPresent => Some('A'),
            DeviceTypeUploadFailed => Some('B'),
            DeviceTypeMismatch => Some('C'),
            VendorIdMismatch => Some('D'),
            HeartbeatTimeout => Some('E'),
            GuardTimeout => Some('F'),
            ConfigError => Some('J'),
            HeartbeatLostDuringStart => Some('K'),
            AlreadyOperational => Some('L'),
            ProductCodeMismatch => Some('M'),
            RevisionMismatch => Some('N'),
            SerialMismatch => Some('O'),
        }
    }
}

/// Error returned by [`BootMaster`] for failures not covered by a documented boot status letter
#[derive(Debug, Clone, Snafu)]
pub enum BootError {
    /// An SDO transfer failed in a way not covered by a specific boot status
    #[snafu(display("SDO error booting node {node_id}: {source}"))]
    Sdo {
        /// The node being booted when the error occurred
        node_id: u8,
        /// The underlying SDO client error
        source: SdoClientError,
    },
}

/// Governs how the master reacts locally to a hard boot/heartbeat/guard failure, mirroring
/// object 0x1029 ("error behaviour") semantics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorBehaviour {
    /// Enter pre-operational on any hard failure
    #[default]
    PreOperational,
    /// Leave the master's own state unchanged
    NoChange,
    /// Enter stopped on any hard failure
    Stopped,
}

/// Static boot configuration for a single slave, corresponding to its entries in the
/// 0x1F81/0x1F84-0x1F88 arrays
#[derive(Clone, Debug, Default)]
pub struct SlaveConfig {
    /// Whether the slave is present in the network list (0x1F81 bit 0)
    pub present: bool,
    /// Whether the network-wide start should wait for this slave (0x1F81 bit 3)
    pub mandatory: bool,
    /// Whether the slave's communication parameters should be reset during boot (0x1F81 bit 2)
    pub reset_communication: bool,
    /// Expected device type (0x1F84), checked against the slave's 0x1000
    pub expected_device_type: Option<u32>,
    /// Expected vendor id (0x1F85), checked against the slave's 0x1018 sub 1
    pub expected_vendor_id: Option<u32>,
    /// Expected product code (0x1F86), checked against the slave's 0x1018 sub 2
    pub expected_product_code: Option<u32>,
    /// Expected revision (0x1F87), checked against the slave's 0x1018 sub 3
    pub expected_revision: Option<u32>,
    /// Expected serial number (0x1F88), checked against the slave's 0x1018 sub 4
    pub expected_serial: Option<u32>,
}

impl SlaveConfig {
    /// The raw assignment flags, as they would be packed into 0x1F81:id
    pub fn assignment_flags(&self) -> u32 {
        let mut flags = 0;
        if self.present {
            flags |= nmt_slave_assignment_bits::IS_SLAVE;
        }
        if self.reset_communication {
            flags |= nmt_slave_assignment_bits::RESET_COMMUNICATION;
        }
        if self.mandatory {
            flags |= nmt_slave_assignment_bits::MANDATORY;
        }
        flags
    }
}

/// Configuration for a [`BootMaster`]
#[derive(Clone, Debug)]
pub struct BootConfig {
    /// Time allowed for a single slave's heartbeat and node guard liveness checks, in
    /// milliseconds
    pub boot_timeout_ms: u64,
    /// How the master reacts to a hard boot/heartbeat/guard failure
    pub error_behaviour: ErrorBehaviour,
    /// Data size threshold above which SDO transfers use block transfer
    pub block_threshold: usize,
    /// Per-slave boot configuration, keyed by node id
    pub slaves: HashMap<u8, SlaveConfig>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            boot_timeout_ms: 1000,
            error_behaviour: ErrorBehaviour::default(),
            block_threshold: 64,
            slaves: HashMap::new(),
        }
    }
}

/// Host hook invoked during boot's "update configuration" step, for a given node id
///
/// The callback reports success or failure; a failure is surfaced to the caller of
/// [`BootMaster::boot_slave`] as [`BootStatus::ConfigError`] ('J').
pub type ConfigCallback = Box<dyn Fn(u8) -> BoxFuture<'static, Result<(), ()>> + Send + Sync>;

/// Host hook invoked on a change in liveness for a node id that has already completed booting
///
/// The `bool` is `true` when the node's heartbeat or node-guard deadline has elapsed without a
/// message (liveness lost), and `false` when a message arrives again after a prior loss
/// (liveness recovered).
pub type LivenessCallback = Box<dyn Fn(u8, bool) + Send + Sync>;

/// Per-slave state tracked across the boot procedure, keyed by node id inside [`BootMaster`]
#[derive(Clone, Debug)]
struct NmtSlaveContext {
    boot_status: Option<BootStatus>,
    heartbeat_deadline: Option<Instant>,
    guard_deadline: Option<Instant>,
    heartbeat_lost: bool,
    guard_lost: bool,
    config: SlaveConfig,
}

impl NmtSlaveContext {
    fn new(config: SlaveConfig) -> Self {
        Self {
            boot_status: None,
            heartbeat_deadline: None,
            guard_deadline: None,
            heartbeat_lost: false,
            guard_lost: false,
            config,
        }
    }
}

/// Drives the NMT master boot-slave procedure: verifying a slave's identity, waiting for
/// liveness, and bringing it to a startable state before the network-wide start is issued.
#[derive(Debug)]
pub struct BootMaster<S: AsyncCanSender + Send + Sync + 'static> {
    sender: SharedSender<S>,
    receiver: SharedReceiver,
    nmt: NmtMaster<SharedSender<S>, SharedReceiverChannel>,
    config: BootConfig,
    contexts: HashMap<u8, NmtSlaveContext>,
    on_config: Option<ConfigCallback>,
    on_heartbeat: Option<LivenessCallback>,
    on_node_guarding: Option<LivenessCallback>,
    /// The master's own NMT-like state, driven by [`BootConfig::error_behaviour`] on a hard
    /// boot/heartbeat/guard failure
    own_state: NmtState,
}

impl<S: AsyncCanSender + Send + Sync + 'static> BootMaster<S> {
    /// Create a new BootMaster
    ///
    /// # Arguments
    /// - `sender`: An object which implements [`AsyncCanSender`] to be used for sending messages
    ///   to the bus
    /// - `receiver`: An object which implements [`AsyncCanReceiver`] to be used for receiving
    ///   messages from the bus
    /// - `config`: The set of slaves this master is responsible for booting
    pub fn new(sender: S, receiver: impl AsyncCanReceiver + Send + 'static, config: BootConfig) -> Self {
        let mut receiver = SharedReceiver::new(receiver);
        let sender = SharedSender::new(Arc::new(TokioMutex::new(sender)));
        let nmt = NmtMaster::new(sender.clone(), receiver.create_rx());

        let contexts = config
            .slaves
            .iter()
            .map(|(id, cfg)| (*id, NmtSlaveContext::new(cfg.clone())))
            .collect();

        Self {
            sender,
            receiver,
            nmt,
            config,
            contexts,
            on_config: None,
            on_heartbeat: None,
            on_node_guarding: None,
            own_state: NmtState::Operational,
        }
    }

    /// Register the "update configuration" hook called during each slave's boot procedure
    pub fn with_on_config(mut self, cb: ConfigCallback) -> Self {
        self.on_config = Some(cb);
        self
    }

    /// Register the hook called on heartbeat loss/recovery for an already-booted slave
    pub fn with_on_heartbeat(mut self, cb: LivenessCallback) -> Self {
        self.on_heartbeat = Some(cb);
        self
    }

    /// Register the hook called on node-guard loss/recovery for an already-booted slave
    pub fn with_on_node_guarding(mut self, cb: LivenessCallback) -> Self {
        self.on_node_guarding = Some(cb);
        self
    }

    /// Get the last recorded boot status for a slave, if it has been booted
    pub fn boot_status(&self, id: u8) -> Option<BootStatus> {
        self.contexts.get(&id).and_then(|ctx| ctx.boot_status)
    }

    /// Get the master's own NMT-like state, as driven by [`BootConfig::error_behaviour`]
    pub fn own_state(&self) -> NmtState {
        self.own_state
    }

    /// Apply [`BootConfig::error_behaviour`] to the master's own state following a hard
    /// boot/heartbeat/guard failure
    fn apply_error_behaviour(&mut self) {
        match self.config.error_behaviour {
            ErrorBehaviour::PreOperational => self.own_state = NmtState::PreOperational,
            ErrorBehaviour::NoChange => {}
            ErrorBehaviour::Stopped => self.own_state = NmtState::Stopped,
        }
    }

    /// Wait for a single incoming heartbeat or node-guard response, up to `timeout_duration`,
    /// and check every booted slave's liveness deadline
    ///
    /// A slave's heartbeat/guard deadline is refreshed whenever a matching message arrives; if a
    /// deadline elapses without one, the corresponding liveness callback fires with `true` (loss)
    /// and [`BootConfig::error_behaviour`] is applied to the master's own state. Recovery, once a
    /// message arrives again, fires the callback with `false`.
    ///
    /// Events are only tracked for node ids whose [`BootMaster::boot_slave`] has already
    /// returned [`BootStatus::Ok`] — this is what keeps liveness monitoring from starting before
    /// a slave has actually finished booting.
    pub async fn poll_liveness(&mut self, timeout_duration: Duration) {
        let mut rx = self.receiver.create_rx();
        if let Ok(Ok(msg)) = timeout(timeout_duration, rx.recv()).await {
            if let CanId::Std(raw) = msg.id() {
                if raw & !0x7f == HEARTBEAT_ID {
                    let id = (raw & 0x7f) as u8;
                    self.note_liveness(id, msg.is_rtr());
                }
            }
        }

        self.check_liveness_deadlines();
    }

    /// Refresh a booted slave's deadline on an observed heartbeat or node-guard message,
    /// reporting recovery if it had previously been marked lost
    fn note_liveness(&mut self, id: u8, is_guard: bool) {
        let liveness_timeout = Duration::from_millis(self.config.boot_timeout_ms);
        let Some(ctx) = self.contexts.get_mut(&id) else {
            return;
        };
        if ctx.boot_status != Some(BootStatus::Ok) {
            return;
        }

        let deadline = Instant::now() + liveness_timeout;
        if is_guard {
            ctx.guard_deadline = Some(deadline);
            if ctx.guard_lost {
                ctx.guard_lost = false;
                if let Some(cb) = &self.on_node_guarding {
                    cb(id, false);
                }
            }
        } else {
            ctx.heartbeat_deadline = Some(deadline);
            if ctx.heartbeat_lost {
                ctx.heartbeat_lost = false;
                if let Some(cb) = &self.on_heartbeat {
                    cb(id, false);
                }
            }
        }
    }

    /// Check every booted slave's heartbeat/guard deadline, reporting loss on first expiry
    fn check_liveness_deadlines(&mut self) {
        let now = Instant::now();
        let mut lost_heartbeat = Vec::new();
        let mut lost_guard = Vec::new();

        for (&id, ctx) in self.contexts.iter_mut() {
            if ctx.boot_status != Some(BootStatus::Ok) {
                continue;
            }
            if !ctx.heartbeat_lost && ctx.heartbeat_deadline.is_some_and(|d| now >= d) {
                ctx.heartbeat_lost = true;
                lost_heartbeat.push(id);
            }
            if !ctx.guard_lost && ctx.guard_deadline.is_some_and(|d| now >= d) {
                ctx.guard_lost = true;
                lost_guard.push(id);
            }
        }

        for id in lost_heartbeat {
            if let Some(cb) = &self.on_heartbeat {
                cb(id, true);
            }
            self.apply_error_behaviour();
        }
        for id in lost_guard {
            if let Some(cb) = &self.on_node_guarding {
                cb(id, true);
            }
            self.apply_error_behaviour();
        }
    }

    /// Boot a single slave by node id, running the identity check and liveness procedure
    ///
    /// Returns the resulting [`BootStatus`]; only transport-level failures outside the
    /// documented status letters are returned as `Err`.
    pub async fn boot_slave(&mut self, id: u8) -> Result<BootStatus, BootError> {
        let slave_config = self
            .contexts
            .get(&id)
            .map(|ctx| ctx.config.clone())
            .unwrap_or_default();

        // A: the slave is not in the network list
        if !slave_config.present {
            return Ok(self.finish(id, BootStatus::NotPresent));
        }

        // L: the slave may already be up from a previous session
        self.nmt.process_rx().ok();
        if self
            .nmt
            .get_nodes()
            .iter()
            .any(|n| n.id == id && n.state == NmtState::Operational)
        {
            return Ok(self.finish(id, BootStatus::AlreadyOperational));
        }

        let mut sdo = SdoClient::new_std(id, self.sender.clone(), self.receiver.create_rx());

        // B/C: device type
        let device_type = match sdo.upload_u32(object_ids::DEVICE_TYPE, 0).await {
            Ok(v) => v,
            Err(_) => return Ok(self.finish(id, BootStatus::DeviceTypeUploadFailed)),
        };
        if let Some(expected) = slave_config.expected_device_type {
            if device_type != expected {
                return Ok(self.finish(id, BootStatus::DeviceTypeMismatch));
            }
        }

        // D/M/N/O: identity
        if let Some(status) = self.check_identity(&mut sdo, id, &slave_config).await? {
            return Ok(self.finish(id, status));
        }

        // 5/J: halt and call on-config(id, done); nonzero ec -> ConfigError
        if let Some(on_config) = &self.on_config {
            if on_config(id).await.is_err() {
                return Ok(self.finish(id, BootStatus::ConfigError));
            }
        }

        let boot_timeout = Duration::from_millis(self.config.boot_timeout_ms);

        // E: wait for a heartbeat proving liveness
        if timeout(boot_timeout, self.wait_for_heartbeat(id)).await.is_err() {
            return Ok(self.finish(id, BootStatus::HeartbeatTimeout));
        }

        // K: the heartbeat should keep flowing at its declared period while error control is
        // being started; a node that goes quiet here never reaches node guarding cleanly
        let heartbeat_period_ms = sdo
            .upload_u16(object_ids::HEARTBEAT_PRODUCER_TIME, 0)
            .await
            .unwrap_or(0);
        if heartbeat_period_ms > 0 {
            let liveness_window = Duration::from_millis(heartbeat_period_ms as u64 * 2);
            if timeout(liveness_window, self.wait_for_heartbeat(id))
                .await
                .is_err()
            {
                return Ok(self.finish(id, BootStatus::HeartbeatLostDuringStart));
            }
        }

        // F: confirm via node guarding
        if timeout(boot_timeout, self.check_node_guard(id)).await.is_err() {
            return Ok(self.finish(id, BootStatus::GuardTimeout));
        }

        if slave_config.reset_communication {
            self.nmt.nmt_reset_comms(id).await.ok();
        }

        Ok(self.finish(id, BootStatus::Ok))
    }

    /// Boot every slave with 0x1F81 bit 0 set, then issue the network-wide NMT start once every
    /// mandatory slave (0x1F81 bit 3) has reached a non-error terminal status
    pub async fn boot_all(&mut self) -> HashMap<u8, BootStatus> {
        let ids: Vec<u8> = self
            .config
            .slaves
            .iter()
            .filter(|(_, cfg)| cfg.present)
            .map(|(id, _)| *id)
            .collect();

        let mut results = HashMap::with_capacity(ids.len());
        for id in ids {
            match self.boot_slave(id).await {
                Ok(status) => {
                    results.insert(id, status);
                }
                Err(e) => log::error!("Error booting node {id}: {e}"),
            }
        }

        let mandatory_ok = self
            .config
            .slaves
            .iter()
            .filter(|(_, cfg)| cfg.mandatory)
            .all(|(id, _)| results.get(id) == Some(&BootStatus::Ok));

        if mandatory_ok {
            self.nmt.nmt_start(0).await.ok();
        } else {
            log::warn!(
                "Not all mandatory slaves booted successfully; network start withheld ({:?})",
                self.config.error_behaviour
            );
            self.apply_error_behaviour();
        }

        results
    }

    async fn check_identity(
        &mut self,
        sdo: &mut SdoClient<SharedSender<S>, SharedReceiverChannel>,
        id: u8,
        cfg: &SlaveConfig,
    ) -> Result<Option<BootStatus>, BootError> {
        let vendor_id = sdo
            .upload_u32(object_ids::IDENTITY, 1)
            .await
            .context(SdoSnafu { node_id: id })?;
        if cfg.expected_vendor_id.is_some_and(|v| v != vendor_id) {
            return Ok(Some(BootStatus::VendorIdMismatch));
        }

        let product_code = sdo
            .upload_u32(object_ids::IDENTITY, 2)
            .await
            .context(SdoSnafu { node_id: id })?;
        if cfg.expected_product_code.is_some_and(|v| v != product_code) {
            return Ok(Some(BootStatus::ProductCodeMismatch));
        }

        let revision = sdo
            .upload_u32(object_ids::IDENTITY, 3)
            .await
            .context(SdoSnafu { node_id: id })?;
        if cfg.expected_revision.is_some_and(|v| v != revision) {
            return Ok(Some(BootStatus::RevisionMismatch));
        }

        let serial = sdo
            .upload_u32(object_ids::IDENTITY, 4)
            .await
            .context(SdoSnafu { node_id: id })?;
        if cfg.expected_serial.is_some_and(|v| v != serial) {
            return Ok(Some(BootStatus::SerialMismatch));
        }

        Ok(None)
    }

    async fn wait_for_heartbeat(&mut self, id: u8) {
        let mut rx = self.receiver.create_rx();
        loop {
            if let Ok(msg) = rx.recv().await {
                if let Ok(ZencanMessage::Heartbeat(hb)) = ZencanMessage::try_from(msg) {
                    if hb.node == id {
                        return;
                    }
                }
            }
        }
    }

    async fn check_node_guard(&mut self, id: u8) {
        let mut rx = self.receiver.create_rx();
        let cob_id = CanId::Std(HEARTBEAT_ID | id as u16);

        let mut sender = self.sender.clone();
        let _ = sender.send(CanMessage::new_rtr(cob_id)).await;

        loop {
            if let Ok(msg) = rx.recv().await {
                if msg.id() == cob_id && !msg.is_rtr() {
                    return;
                }
            }
        }
    }

    fn finish(&mut self, id: u8, status: BootStatus) -> BootStatus {
        let ctx = self
            .contexts
            .entry(id)
            .or_insert_with(|| NmtSlaveContext::new(SlaveConfig::default()));
        ctx.boot_status = Some(status);
        if status == BootStatus::Ok {
            let deadline = Instant::now() + Duration::from_millis(self.config.boot_timeout_ms);
            ctx.heartbeat_deadline = Some(deadline);
            ctx.guard_deadline = Some(deadline);
            ctx.heartbeat_lost = false;
            ctx.guard_lost = false;
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_status_letters_match_master_hpp_convention() {
        assert_eq!(BootStatus::Ok.letter(), None);
        assert_eq!(BootStatus::NotPresent.letter(), Some('A'));
        assert_eq!(BootStatus::DeviceTypeUploadFailed.letter(), Some('B'));
        assert_eq!(BootStatus::DeviceTypeMismatch.letter(), Some('C'));
        assert_eq!(BootStatus::VendorIdMismatch.letter(), Some('D'));
        assert_eq!(BootStatus::HeartbeatTimeout.letter(), Some('E'));
        assert_eq!(BootStatus::GuardTimeout.letter(), Some('F'));
        assert_eq!(BootStatus::ConfigError.letter(), Some('J'));
        assert_eq!(BootStatus::HeartbeatLostDuringStart.letter(), Some('K'));
        assert_eq!(BootStatus::AlreadyOperational.letter(), Some('L'));
        assert_eq!(BootStatus::ProductCodeMismatch.letter(), Some('M'));
        assert_eq!(BootStatus::RevisionMismatch.letter(), Some('N'));
        assert_eq!(BootStatus::SerialMismatch.letter(), Some('O'));
    }

    #[test]
    fn slave_config_assignment_flags_pack_expected_bits() {
        let cfg = SlaveConfig {
            present: true,
            mandatory: true,
            reset_communication: false,
            ..Default::default()
        };
        let flags = cfg.assignment_flags();
        assert_eq!(flags & nmt_slave_assignment_bits::IS_SLAVE, nmt_slave_assignment_bits::IS_SLAVE);
        assert_eq!(flags & nmt_slave_assignment_bits::MANDATORY, nmt_slave_assignment_bits::MANDATORY);
        assert_eq!(flags & nmt_slave_assignment_bits::RESET_COMMUNICATION, 0);
    }

    #[test]
    fn boot_config_default_has_no_slaves() {
        let config = BootConfig::default();
        assert!(config.slaves.is_empty());
        assert_eq!(config.error_behaviour, ErrorBehaviour::PreOperational);
    }
}
