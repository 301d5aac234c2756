//! Object-dictionary records for SDO connection parameters
//!
//! Implements the server parameter record (0x1200, `ServiceParameters` per CiA 301) backing the
//! node's default SDO server, and the client parameter record (0x1280) describing a connection
//! this node could use to act as an SDO client against some other server. Both gate COB-ID sub
//! writes through [`validate_cobid_write`].

use crate::object_dict::{ConstField, ProvidesSubObjects, SubObjectAccess};
use zencan_common::{
    objects::{validate_cobid_write, ObjectCode, SubInfo},
    sdo::AbortCode,
    AtomicCell, CanId,
};

/// COB-IDs backing a node's default SDO server (object 0x1200)
#[allow(missing_debug_implementations)]
pub struct SdoServerCobs {
    rx: AtomicCell<CanId>,
    tx: AtomicCell<CanId>,
}

impl SdoServerCobs {
    pub const fn new() -> Self {
        Self {
            rx: AtomicCell::new(CanId::Std(0x600)),
            tx: AtomicCell::new(CanId::Std(0x580)),
        }
    }

    /// COB-ID the server receives SDO requests on
    pub fn rx(&self) -> CanId {
        self.rx.load()
    }

    /// COB-ID the server transmits SDO responses on
    pub fn tx(&self) -> CanId {
        self.tx.load()
    }

    pub fn set_rx(&self, id: CanId) {
        self.rx.store(id);
    }

    pub fn set_tx(&self, id: CanId) {
        self.tx.store(id);
    }
}

impl Default for SdoServerCobs {
    fn default() -> Self {
        Self::new()
    }
}

/// COB-IDs and target node backing a client SDO connection (object 0x1280)
#[allow(missing_debug_implementations)]
pub struct SdoClientCobs {
    /// COB-ID this node transmits SDO requests on, acting as client
    tx: AtomicCell<CanId>,
    /// COB-ID this node receives SDO responses on, acting as client
    rx: AtomicCell<CanId>,
    server_node_id: AtomicCell<u8>,
}

impl SdoClientCobs {
    pub const fn new() -> Self {
        Self {
            tx: AtomicCell::new(CanId::Std(0x600)),
            rx: AtomicCell::new(CanId::Std(0x580)),
            server_node_id: AtomicCell::new(0),
        }
    }

    pub fn tx(&self) -> CanId {
        self.tx.load()
    }

    pub fn rx(&self) -> CanId {
        self.rx.load()
    }

    pub fn set_tx(&self, id: CanId) {
        self.tx.store(id);
    }

    pub fn set_rx(&self, id: CanId) {
        self.rx.store(id);
    }

    pub fn server_node_id(&self) -> u8 {
        self.server_node_id.load()
    }

    pub fn set_server_node_id(&self, id: u8) {
        self.server_node_id.store(id);
    }
}

impl Default for SdoClientCobs {
    fn default() -> Self {
        Self::new()
    }
}

fn read_cob_id_bytes(id: CanId, offset: usize, buf: &mut [u8]) -> usize {
    let mut value = id.raw();
    if id.is_extended() {
        value |= 1 << 29;
    }
    let bytes = value.to_le_bytes();
    if offset >= bytes.len() {
        return 0;
    }
    let read_len = buf.len().min(bytes.len() - offset);
    buf[..read_len].copy_from_slice(&bytes[offset..offset + read_len]);
    read_len
}

fn parse_cob_id_write(data: &[u8]) -> Result<CanId, AbortCode> {
    if data.len() < 4 {
        return Err(AbortCode::DataTypeMismatchLengthLow);
    } else if data.len() > 4 {
        return Err(AbortCode::DataTypeMismatchLengthHigh);
    }
    let value = u32::from_le_bytes(data.try_into().unwrap());
    let extended = (value & (1 << 29)) != 0;
    validate_cobid_write(value, extended)?;
    Ok(if extended {
        CanId::Extended(value & 0x1FFF_FFFF)
    } else {
        CanId::Std((value & 0x7FF) as u16)
    })
}

struct ServerCobSubObject {
    cobs: &'static SdoServerCobs,
    is_tx: bool,
}

impl SubObjectAccess for ServerCobSubObject {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let id = if self.is_tx { self.cobs.tx() } else { self.cobs.rx() };
        Ok(read_cob_id_bytes(id, offset, buf))
    }

    fn read_size(&self) -> usize {
        4
    }

    fn write(&self, data: &[u8]) -> Result<(), AbortCode> {
        let id = parse_cob_id_write(data)?;
        if self.is_tx {
            self.cobs.set_tx(id);
        } else {
            self.cobs.set_rx(id);
        }
        Ok(())
    }
}

/// Server parameter record (0x1200-0x127F)
#[allow(missing_debug_implementations)]
pub struct SdoServerParamsObject {
    rx: ServerCobSubObject,
    tx: ServerCobSubObject,
}

impl SdoServerParamsObject {
    pub const fn new(cobs: &'static SdoServerCobs) -> Self {
        Self {
            rx: ServerCobSubObject { cobs, is_tx: false },
            tx: ServerCobSubObject { cobs, is_tx: true },
        }
    }
}

impl ProvidesSubObjects for SdoServerParamsObject {
    fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
        match sub {
            0 => Some((
                SubInfo::MAX_SUB_NUMBER,
                const { &ConstField::new(2u8.to_le_bytes()) },
            )),
            1 => Some((SubInfo::new_u32().rw_access(), &self.rx)),
            2 => Some((SubInfo::new_u32().rw_access(), &self.tx)),
            _ => None,
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }
}

enum ClientSub {
    Tx,
    Rx,
}

struct ClientCobSubObject {
    cobs: &'static SdoClientCobs,
    which: ClientSub,
}

impl SubObjectAccess for ClientCobSubObject {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let id = match self.which {
            ClientSub::Tx => self.cobs.tx(),
            ClientSub::Rx => self.cobs.rx(),
        };
        Ok(read_cob_id_bytes(id, offset, buf))
    }

    fn read_size(&self) -> usize {
        4
    }

    fn write(&self, data: &[u8]) -> Result<(), AbortCode> {
        let id = parse_cob_id_write(data)?;
        match self.which {
            ClientSub::Tx => self.cobs.set_tx(id),
            ClientSub::Rx => self.cobs.set_rx(id),
        }
        Ok(())
    }
}

struct ClientNodeIdSubObject {
    cobs: &'static SdoClientCobs,
}

impl SubObjectAccess for ClientNodeIdSubObject {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        if offset > 0 || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.cobs.server_node_id();
        Ok(1)
    }

    fn read_size(&self) -> usize {
        1
    }

    fn write(&self, data: &[u8]) -> Result<(), AbortCode> {
        if data.is_empty() {
            return Err(AbortCode::DataTypeMismatchLengthLow);
        }
        self.cobs.set_server_node_id(data[0]);
        Ok(())
    }
}

/// Client parameter record (0x1280-0x12FF)
#[allow(missing_debug_implementations)]
pub struct SdoClientParamsObject {
    tx: ClientCobSubObject,
    rx: ClientCobSubObject,
    node_id: ClientNodeIdSubObject,
}

impl SdoClientParamsObject {
    pub const fn new(cobs: &'static SdoClientCobs) -> Self {
        Self {
            tx: ClientCobSubObject {
                cobs,
                which: ClientSub::Tx,
            },
            rx: ClientCobSubObject {
                cobs,
                which: ClientSub::Rx,
            },
            node_id: ClientNodeIdSubObject { cobs },
        }
    }
}

impl ProvidesSubObjects for SdoClientParamsObject {
    fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
        match sub {
            0 => Some((
                SubInfo::MAX_SUB_NUMBER,
                const { &ConstField::new(3u8.to_le_bytes()) },
            )),
            1 => Some((SubInfo::new_u32().rw_access(), &self.tx)),
            2 => Some((SubInfo::new_u32().rw_access(), &self.rx)),
            3 => Some((SubInfo::new_u8().rw_access(), &self.node_id)),
            _ => None,
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }
}
