//! Foundational types describing objects in a CANopen object dictionary
//!
//! The actual traits used to implement objects (`ObjectAccess`, `ProvidesSubObjects`,
//! `CallbackObject`, etc.) live in `zencan_node::object_dict`, since they depend on the
//! `critical_section`-based storage types used there. This module only contains the plain data
//! describing an object's shape, which is shared by both `zencan-common` (config parsing,
//! codegen) and `zencan-node` (runtime access).

use crate::sdo::AbortCode;

pub use crate::device_config::PdoMapping;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectCode {
    Null = 0,
    Domain = 2,
    DefType = 5,
    DefStruct = 6,
    #[default]
    Var = 7,
    Array = 8,
    Record = 9,
}

impl TryFrom<u8> for ObjectCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ObjectCode::Null),
            2 => Ok(ObjectCode::Domain),
            5 => Ok(ObjectCode::DefType),
            6 => Ok(ObjectCode::DefStruct),
            7 => Ok(ObjectCode::Var),
            8 => Ok(ObjectCode::Array),
            9 => Ok(ObjectCode::Record),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AccessType {
    /// Read-only
    #[default]
    Ro,
    /// Write-only
    Wo,
    /// Read-write
    Rw,
    /// Read-only, and also will never be changed, even internally by the device
    Const,
}

impl AccessType {
    /// Returns true if this access type permits reading
    pub fn is_readable(&self) -> bool {
        !matches!(self, AccessType::Wo)
    }

    /// Returns true if this access type permits writing
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessType::Wo | AccessType::Rw)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u16)]
pub enum DataType {
    Boolean = 1,
    #[default]
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    Real32 = 8,
    VisibleString = 9,
    OctetString = 0xa,
    UnicodeString = 0xb,
    TimeOfDay = 0xc,
    TimeDifference = 0xd,
    Domain = 0xf,
    Other(u16),
}

impl From<u16> for DataType {
    fn from(value: u16) -> Self {
        use DataType::*;
        match value {
            1 => Boolean,
            2 => Int8,
            3 => Int16,
            4 => Int32,
            5 => UInt8,
            6 => UInt16,
            7 => UInt32,
            8 => Real32,
            9 => VisibleString,
            0xa => OctetString,
            0xb => UnicodeString,
            0xc => TimeOfDay,
            0xd => TimeDifference,
            0xf => Domain,
            _ => Other(value),
        }
    }
}

impl DataType {
    /// Returns true if data type is one of the string types
    pub fn is_str(&self) -> bool {
        matches!(
            self,
            Self::VisibleString | Self::OctetString | Self::UnicodeString
        )
    }
}

/// Get the number of bytes used to store a single element of a scalar data type
pub fn element_storage_size(dt: DataType) -> usize {
    match dt {
        DataType::Boolean => 1,
        DataType::Int8 | DataType::UInt8 => 1,
        DataType::Int16 | DataType::UInt16 => 2,
        DataType::Int32 | DataType::UInt32 | DataType::Real32 => 4,
        _ => 0,
    }
}

/// Metadata describing a sub object
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubInfo {
    /// The size (or max size) of this sub object, in bytes
    pub size: usize,
    /// The data type of this sub object
    pub data_type: DataType,
    /// Indicates what accesses (i.e. read/write) are allowed on this sub object
    pub access_type: AccessType,
    /// Indicates which kind of PDO, if any, this sub object may be mapped to
    pub pdo_mapping: PdoMapping,
    /// Indicates if this sub object should be saved when the save command is sent
    pub persist: bool,
}

impl SubInfo {
    /// SubInfo for the conventional `sub0` "highest sub-index supported" field of an array or
    /// record object
    pub const MAX_SUB_NUMBER: SubInfo = SubInfo {
        size: 1,
        data_type: DataType::UInt8,
        access_type: AccessType::Const,
        pdo_mapping: PdoMapping::None,
        persist: false,
    };

    const fn base(data_type: DataType, size: usize) -> Self {
        Self {
            size,
            data_type,
            access_type: AccessType::Ro,
            pdo_mapping: PdoMapping::None,
            persist: false,
        }
    }

    /// Create a SubInfo describing a bool sub object
    pub const fn new_bool() -> Self {
        Self::base(DataType::Boolean, 1)
    }

    /// Create a SubInfo describing a u32 sub object
    pub const fn new_u32() -> Self {
        Self::base(DataType::UInt32, 4)
    }

    /// Create a SubInfo describing a u16 sub object
    pub const fn new_u16() -> Self {
        Self::base(DataType::UInt16, 2)
    }

    /// Create a SubInfo describing a u8 sub object
    pub const fn new_u8() -> Self {
        Self::base(DataType::UInt8, 1)
    }

    /// Create a SubInfo describing an i32 sub object
    pub const fn new_i32() -> Self {
        Self::base(DataType::Int32, 4)
    }

    /// Create a SubInfo describing an i16 sub object
    pub const fn new_i16() -> Self {
        Self::base(DataType::Int16, 2)
    }

    /// Create a SubInfo describing an i8 sub object
    pub const fn new_i8() -> Self {
        Self::base(DataType::Int8, 1)
    }

    /// Create a SubInfo describing an f32 sub object
    pub const fn new_f32() -> Self {
        Self::base(DataType::Real32, 4)
    }

    /// Create a SubInfo describing a visible string sub object of the given length
    pub const fn new_visibile_str(len: usize) -> Self {
        Self::base(DataType::VisibleString, len)
    }

    /// Set access type to read-only
    pub const fn ro_access(mut self) -> Self {
        self.access_type = AccessType::Ro;
        self
    }

    /// Set access type to write-only
    pub const fn wo_access(mut self) -> Self {
        self.access_type = AccessType::Wo;
        self
    }

    /// Set access type to read-write
    pub const fn rw_access(mut self) -> Self {
        self.access_type = AccessType::Rw;
        self
    }

    /// Set whether this sub object should be persisted on a save command
    pub const fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Set which kind of PDO this sub object may be mapped to
    pub const fn pdo_mapping(mut self, mapping: PdoMapping) -> Self {
        self.pdo_mapping = mapping;
        self
    }
}

/// Identifies a single sub object within the object dictionary
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ObjectId {
    /// The object index
    pub index: u16,
    /// The sub index
    pub sub: u8,
}

/// Checks whether a value written to a COB-ID sub object (e.g. SDO/PDO communication parameters)
/// represents a valid 11-bit or 29-bit CAN identifier
///
/// Returns [`AbortCode::InvalidValue`] if bits are set outside of the valid ranges for either a
/// standard or extended identifier.
pub fn validate_cobid_write(value: u32, extended: bool) -> Result<(), AbortCode> {
    let id = value & 0x1FFF_FFFF;
    if extended {
        if id > 0x1FFF_FFFF {
            return Err(AbortCode::InvalidValue);
        }
    } else if id > 0x7FF {
        return Err(AbortCode::InvalidValue);
    }
    Ok(())
}
