//! Implements the slave side of the LSS (Layer Setting Services) protocol
//!
//! The bulk of the protocol (message parsing, command specifiers) lives in
//! [`zencan_common::lss`]. This module wraps that with the node-local state machine: tracking
//! whether the device has been switched into *Configuring* mode, validating requested node IDs,
//! and surfacing [`LssEvent`]s that the owning [`crate::node::Node`] must act on (persisting
//! config, activating a new bit rate).
use zencan_common::{
    lss::{
        LssConfigureError, LssIdentity, LssRequest, LssResponse, LssState, LSS_FASTSCAN_CONFIRM,
    },
    messages::MessageError,
    node_id::{ConfiguredId, NodeId},
    AtomicCell,
};

/// Configuration needed to drive the LSS slave state machine
#[derive(Debug, Clone, Copy)]
pub struct LssConfig {
    /// The device's vendor/product/revision/serial identity, used for identity-based switching
    pub identity: LssIdentity,
    /// The device's current node ID
    pub node_id: NodeId,
    /// Whether the device is able to persist its LSS-assigned configuration
    pub store_supported: bool,
}

/// A side effect of processing an LSS request which the owning node must act on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LssEvent {
    /// The master commanded that the current LSS configuration (node ID, bit timing) be saved
    /// persistently
    StoreConfiguration,
    /// The master commanded a new bit timing be activated
    ActivateBitTiming {
        /// Bit timing table to select from
        table: u8,
        /// Index into the selected table
        index: u8,
        /// Delay, in ms, before switching over
        delay: u16,
    },
    /// The master assigned a new node ID
    ConfigureNodeId {
        /// The newly assigned node ID
        node_id: NodeId,
    },
}

/// Implements the LSS slave protocol state machine
#[allow(missing_debug_implementations)]
pub struct LssSlave {
    state: LssState,
    config: LssConfig,
    fast_scan_sub: u8,
    switch_vendor: Option<u32>,
    switch_product: Option<u32>,
    switch_revision: Option<u32>,
    pending_bit_timing: Option<(u8, u8)>,
    pending_event: Option<LssEvent>,
}

impl LssSlave {
    /// Create a new LssSlave, in the `Waiting` state
    pub fn new(config: LssConfig) -> Self {
        Self {
            state: LssState::Waiting,
            config,
            fast_scan_sub: 0,
            switch_vendor: None,
            switch_product: None,
            switch_revision: None,
            pending_bit_timing: None,
            pending_event: None,
        }
    }

    /// Replace the configuration used for identity matching and node ID reporting
    ///
    /// This should be called any time the node's identity or node ID changes, e.g. after a boot
    /// or a NMT communication reset.
    pub fn update_config(&mut self, config: LssConfig) {
        self.config = config;
    }

    /// Process any pending request buffered in `receiver`
    ///
    /// Returns a response to transmit, if the request warrants one. Use [`Self::pending_event`]
    /// after calling this to check for any side effects that must be handled by the caller.
    pub fn process(
        &mut self,
        receiver: &LssReceiver,
    ) -> Result<Option<LssResponse>, MessageError> {
        let Some(request) = receiver.take() else {
            return Ok(None);
        };
        self.process_request(request)
    }

    /// Take any event raised by the most recent call to [`Self::process`]
    pub fn pending_event(&mut self) -> Option<LssEvent> {
        self.pending_event.take()
    }

    fn process_request(
        &mut self,
        request: LssRequest,
    ) -> Result<Option<LssResponse>, MessageError> {
        match request {
            LssRequest::SwitchModeGlobal { mode } => {
                self.state = LssState::from_byte(mode)?;
                self.reset_switch_state();
                Ok(None)
            }
            LssRequest::SwitchStateVendor { vendor_id } => {
                self.switch_vendor = Some(vendor_id);
                self.switch_product = None;
                self.switch_revision = None;
                Ok(None)
            }
            LssRequest::SwitchStateProduct { product_code } => {
                if self.switch_vendor.is_some() {
                    self.switch_product = Some(product_code);
                }
                Ok(None)
            }
            LssRequest::SwitchStateRevision { revision } => {
                if self.switch_product.is_some() {
                    self.switch_revision = Some(revision);
                }
                Ok(None)
            }
            LssRequest::SwitchStateSerial { serial } => {
                let matched = self.switch_vendor == Some(self.config.identity.vendor_id)
                    && self.switch_product == Some(self.config.identity.product_code)
                    && self.switch_revision == Some(self.config.identity.revision)
                    && serial == self.config.identity.serial;
                self.reset_switch_state();
                if matched {
                    self.state = LssState::Configuring;
                    Ok(Some(LssResponse::SwitchStateResponse))
                } else {
                    Ok(None)
                }
            }
            LssRequest::FastScan {
                id,
                bit_check,
                sub,
                next,
            } => {
                if self.state != LssState::Waiting {
                    return Ok(None);
                }
                if bit_check == LSS_FASTSCAN_CONFIRM {
                    self.fast_scan_sub = 0;
                    return Ok(Some(LssResponse::IdentifySlave));
                }
                if self.fast_scan_sub != sub {
                    return Ok(None);
                }
                let mask = 0xFFFF_FFFFu32 << bit_check;
                if self.config.identity.by_addr(sub) & mask != id & mask {
                    return Ok(None);
                }
                self.fast_scan_sub = next;
                if bit_check == 0 && next < sub {
                    self.state = LssState::Configuring;
                }
                Ok(Some(LssResponse::IdentifySlave))
            }
            LssRequest::ConfigureNodeId { node_id } => {
                if self.state != LssState::Configuring {
                    return Ok(None);
                }
                match ConfiguredId::new(node_id) {
                    Ok(_) => {
                        self.pending_event = Some(LssEvent::ConfigureNodeId {
                            node_id: NodeId::new(node_id).unwrap_or(NodeId::Unconfigured),
                        });
                        Ok(Some(LssResponse::ConfigureNodeIdAck {
                            error: LssConfigureError::Ok as u8,
                            spec_error: 0,
                        }))
                    }
                    Err(_) => Ok(Some(LssResponse::ConfigureNodeIdAck {
                        error: LssConfigureError::NodeIdOutOfRange as u8,
                        spec_error: 0,
                    })),
                }
            }
            LssRequest::ConfigureBitTiming { table, index } => {
                if self.state != LssState::Configuring {
                    return Ok(None);
                }
                self.pending_bit_timing = Some((table, index));
                Ok(Some(LssResponse::ConfigureBitTimingAck {
                    error: LssConfigureError::Ok as u8,
                    spec_error: 0,
                }))
            }
            LssRequest::ActivateBitTiming { delay } => {
                if self.state != LssState::Configuring {
                    return Ok(None);
                }
                let (table, index) = self.pending_bit_timing.take().unwrap_or((0, 0));
                self.pending_event = Some(LssEvent::ActivateBitTiming {
                    table,
                    index,
                    delay,
                });
                Ok(None)
            }
            LssRequest::StoreConfiguration => {
                if self.state != LssState::Configuring {
                    return Ok(None);
                }
                if self.config.store_supported {
                    self.pending_event = Some(LssEvent::StoreConfiguration);
                    Ok(Some(LssResponse::StoreConfigurationAck {
                        error: LssConfigureError::Ok as u8,
                        spec_error: 0,
                    }))
                } else {
                    Ok(Some(LssResponse::StoreConfigurationAck {
                        error: LssConfigureError::Manufacturer as u8,
                        spec_error: 0,
                    }))
                }
            }
            LssRequest::InquireVendor => self.inquire(|id| LssResponse::InquireVendorAck {
                vendor_id: id.vendor_id,
            }),
            LssRequest::InquireProduct => self.inquire(|id| LssResponse::InquireProductAck {
                product_code: id.product_code,
            }),
            LssRequest::InquireRev => self.inquire(|id| LssResponse::InquireRevAck {
                revision: id.revision,
            }),
            LssRequest::InquireSerial => self.inquire(|id| LssResponse::InquireSerialAck {
                serial_number: id.serial,
            }),
            LssRequest::InquireNodeId => {
                if self.state != LssState::Configuring {
                    return Ok(None);
                }
                Ok(Some(LssResponse::InquireNodeIdAck {
                    node_id: self.config.node_id.raw(),
                }))
            }
        }
    }

    fn inquire(
        &mut self,
        f: impl FnOnce(&LssIdentity) -> LssResponse,
    ) -> Result<Option<LssResponse>, MessageError> {
        if self.state != LssState::Configuring {
            return Ok(None);
        }
        Ok(Some(f(&self.config.identity)))
    }

    fn reset_switch_state(&mut self) {
        self.switch_vendor = None;
        self.switch_product = None;
        self.switch_revision = None;
    }
}

/// A mailbox for buffering a single incoming LSS request between a receiving context (e.g. a CAN
/// IRQ) and [`LssSlave::process`]
pub struct LssReceiver {
    request: AtomicCell<Option<LssRequest>>,
}

impl LssReceiver {
    /// Create a new, empty LssReceiver
    pub const fn new() -> Self {
        Self {
            request: AtomicCell::new(None),
        }
    }

    /// Store a received request, to be processed on the next call to [`LssSlave::process`]
    ///
    /// Returns true, indicating the node's process function should be called soon.
    pub fn handle_req(&self, request: LssRequest) -> bool {
        self.request.store(Some(request));
        true
    }

    fn take(&self) -> Option<LssRequest> {
        self.request.take()
    }
}

impl Default for LssReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: LssIdentity = LssIdentity {
        vendor_id: 0x0,
        product_code: 0x1,
        revision: 0x2,
        serial: 0x3,
    };

    fn slave() -> LssSlave {
        LssSlave::new(LssConfig {
            identity: IDENTITY,
            node_id: NodeId::Unconfigured,
            store_supported: true,
        })
    }

    #[test]
    fn test_fast_scan_simple() {
        let mut slave = slave();

        assert_eq!(
            slave
                .process_request(LssRequest::FastScan {
                    id: 0,
                    bit_check: LSS_FASTSCAN_CONFIRM,
                    sub: 0,
                    next: 1,
                })
                .unwrap(),
            Some(LssResponse::IdentifySlave)
        );

        assert_eq!(
            slave
                .process_request(LssRequest::FastScan {
                    id: 0,
                    bit_check: 31,
                    sub: 0,
                    next: 1,
                })
                .unwrap(),
            Some(LssResponse::IdentifySlave)
        );

        assert_eq!(
            slave
                .process_request(LssRequest::FastScan {
                    id: 1,
                    bit_check: 31,
                    sub: 0,
                    next: 1,
                })
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_switch_state_by_identity() {
        let mut slave = slave();

        assert_eq!(
            slave
                .process_request(LssRequest::SwitchStateVendor { vendor_id: 0 })
                .unwrap(),
            None
        );
        assert_eq!(
            slave
                .process_request(LssRequest::SwitchStateProduct { product_code: 1 })
                .unwrap(),
            None
        );
        assert_eq!(
            slave
                .process_request(LssRequest::SwitchStateRevision { revision: 2 })
                .unwrap(),
            None
        );
        assert_eq!(
            slave
                .process_request(LssRequest::SwitchStateSerial { serial: 3 })
                .unwrap(),
            Some(LssResponse::SwitchStateResponse)
        );
        assert_eq!(slave.state, LssState::Configuring);
    }

    #[test]
    fn test_configure_node_id() {
        let mut slave = slave();
        slave.state = LssState::Configuring;

        let resp = slave
            .process_request(LssRequest::ConfigureNodeId { node_id: 5 })
            .unwrap();
        assert_eq!(
            resp,
            Some(LssResponse::ConfigureNodeIdAck {
                error: LssConfigureError::Ok as u8,
                spec_error: 0
            })
        );

        assert_eq!(
            slave.pending_event(),
            Some(LssEvent::ConfigureNodeId {
                node_id: NodeId::new(5).unwrap()
            })
        );
    }

    #[test]
    fn test_configure_node_id_out_of_range() {
        let mut slave = slave();
        slave.state = LssState::Configuring;

        let resp = slave
            .process_request(LssRequest::ConfigureNodeId { node_id: 200 })
            .unwrap();
        assert_eq!(
            resp,
            Some(LssResponse::ConfigureNodeIdAck {
                error: LssConfigureError::NodeIdOutOfRange as u8,
                spec_error: 0
            })
        );
    }
}
