//! Constants defining standard object and special values
//!
//!

/// Object indices for standard objects
pub mod object_ids {
    /// The Device Type object index
    pub const DEVICE_TYPE: u16 = 0x1000;
    /// The Error Register object index
    pub const ERROR_REGISTER: u16 = 0x1001;
    /// The Device Name object index
    pub const DEVICE_NAME: u16 = 0x1008;
    /// The hardware version object index
    pub const HARDWARE_VERSION: u16 = 0x1009;
    /// Save objects command object index
    pub const SAVE_OBJECTS: u16 = 0x1010;
    /// The software version object index
    pub const SOFTWARE_VERSION: u16 = 0x100A;
    /// The guard time object index, in ms
    pub const GUARD_TIME: u16 = 0x100C;
    /// The life time factor object index
    pub const LIFE_TIME_FACTOR: u16 = 0x100D;
    /// The heartbeat producer time object index
    pub const HEARTBEAT_PRODUCER_TIME: u16 = 0x1017;
    /// The identity object index
    pub const IDENTITY: u16 = 0x1018;
    /// The error behaviour object index
    pub const ERROR_BEHAVIOUR: u16 = 0x1029;
    /// Base index of the SDO server parameter records (0x1200-0x127F)
    pub const SDO_SERVER_PARAM_BASE: u16 = 0x1200;
    /// Base index of the SDO client parameter records (0x1280-0x12FF)
    pub const SDO_CLIENT_PARAM_BASE: u16 = 0x1280;
    /// The auto start object index
    pub const AUTO_START: u16 = 0x5000;

    /// Base index of the NMT startup object (0x1F80)
    pub const NMT_STARTUP: u16 = 0x1F80;
    /// Base index of the "slave assignment" array (0x1F81:id), one sub per possible node id
    pub const NMT_SLAVE_ASSIGNMENT: u16 = 0x1F81;
    /// Base index of the expected device type array (0x1F84:id)
    pub const NMT_DEVICE_TYPE_IDENT: u16 = 0x1F84;
    /// Base index of the expected vendor id array (0x1F85:id)
    pub const NMT_VENDOR_ID_IDENT: u16 = 0x1F85;
    /// Base index of the expected product code array (0x1F86:id)
    pub const NMT_PRODUCT_CODE_IDENT: u16 = 0x1F86;
    /// Base index of the expected revision array (0x1F87:id)
    pub const NMT_REVISION_IDENT: u16 = 0x1F87;
    /// Base index of the expected serial number array (0x1F88:id)
    pub const NMT_SERIAL_IDENT: u16 = 0x1F88;
}

/// Bits of the 0x1F81:id "slave assignment" sub object
pub mod nmt_slave_assignment_bits {
    /// Bit 0: the slave is present in the network list and should be booted
    pub const IS_SLAVE: u32 = 1 << 0;
    /// Bit 2: reset the slave's communication parameters during boot
    pub const RESET_COMMUNICATION: u32 = 1 << 2;
    /// Bit 3: the slave is mandatory for the network-wide NMT start to proceed
    pub const MANDATORY: u32 = 1 << 3;
}

/// Special values used to access standard objects
pub mod values {
    /// Magic value used to trigger object storage by writing to object 0x1010
    pub const SAVE_CMD: u32 = 0x73617665;
}
