//! Loading of concise DCF byte streams into an object dictionary
//!
//! A concise DCF is a flat binary encoding of a set of object values, used to apply a full
//! configuration to a node in one shot (e.g. from a master during boot-up, or from a stored
//! configuration blob). The format is a `u32` entry count, followed by that many records of
//! `{u16 index, u8 sub, u32 size, size bytes of data}`, all little-endian.

use snafu::Snafu;

use crate::object_dict::{find_object, ODEntry};
use zencan_common::sdo::AbortCode;

/// Error applying a concise DCF stream to an object dictionary
#[derive(Clone, Copy, Debug, PartialEq, Snafu)]
pub enum DcfError {
    /// The stream ended in the middle of a record header or its data
    UnexpectedEof,
    /// Writing an entry failed
    #[snafu(display("Write to 0x{index:04X}sub{sub} failed: {abort_code:?}"))]
    WriteFailed {
        /// Index of the entry that failed to apply
        index: u16,
        /// Sub index of the entry that failed to apply
        sub: u8,
        /// The abort code returned by the object dictionary
        abort_code: AbortCode,
    },
}

/// Apply a concise DCF byte stream to the object dictionary
///
/// Entries are applied in order. On the first failure, the failing `(index, sub)` and reason are
/// returned; entries after the failing one are not applied.
pub fn apply_dcf(od: &[ODEntry], data: &[u8]) -> Result<(), DcfError> {
    let mut pos = 0;

    let count = read_u32(data, &mut pos)?;

    for _ in 0..count {
        let index = read_u16(data, &mut pos)?;
        let sub = read_u8(data, &mut pos)?;
        let size = read_u32(data, &mut pos)? as usize;
        let value = read_bytes(data, &mut pos, size)?;

        let object = find_object(od, index).ok_or(AbortCode::NoSuchObject);
        let result = match object {
            Ok(object) => object.write(sub, value),
            Err(abort_code) => Err(abort_code),
        };

        if let Err(abort_code) = result {
            return WriteFailedSnafu {
                index,
                sub,
                abort_code,
            }
            .fail();
        }
    }

    Ok(())
}

fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8, DcfError> {
    let b = *data.get(*pos).ok_or(UnexpectedEofSnafu.build())?;
    *pos += 1;
    Ok(b)
}

fn read_u16(data: &[u8], pos: &mut usize) -> Result<u16, DcfError> {
    let bytes = read_bytes(data, pos, 2)?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32, DcfError> {
    let bytes = read_bytes(data, pos, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_bytes<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], DcfError> {
    let end = pos.checked_add(len).ok_or(UnexpectedEofSnafu.build())?;
    let slice = data.get(*pos..end).ok_or(UnexpectedEofSnafu.build())?;
    *pos = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_dict::{ObjectAccess, ScalarField};
    use zencan_common::objects::{AccessType, DataType, ObjectCode, SubInfo};

    struct TestVar(ScalarField<u32>);

    impl ObjectAccess for TestVar {
        fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
            if sub == 0 {
                Ok(SubInfo {
                    size: 4,
                    data_type: DataType::UInt32,
                    access_type: AccessType::Rw,
                    ..Default::default()
                })
            } else {
                Err(AbortCode::NoSuchSubIndex)
            }
        }

        fn read_size(&self, sub: u8) -> Result<usize, AbortCode> {
            Ok(self.sub_info(sub)?.size)
        }

        fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
            if sub != 0 {
                return Err(AbortCode::NoSuchSubIndex);
            }
            self.0.read(offset, buf)
        }

        fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
            if sub != 0 {
                return Err(AbortCode::NoSuchSubIndex);
            }
            self.0.write(data)
        }

        fn object_code(&self) -> ObjectCode {
            ObjectCode::Var
        }
    }

    fn write_record(buf: &mut [u8], pos: &mut usize, index: u16, sub: u8, value: u32) {
        buf[*pos..*pos + 2].copy_from_slice(&index.to_le_bytes());
        *pos += 2;
        buf[*pos] = sub;
        *pos += 1;
        buf[*pos..*pos + 4].copy_from_slice(&4u32.to_le_bytes());
        *pos += 4;
        buf[*pos..*pos + 4].copy_from_slice(&value.to_le_bytes());
        *pos += 4;
    }

    #[test]
    fn applies_entries_in_order() {
        let obj1000 = TestVar(ScalarField::new(0));
        let obj1001 = TestVar(ScalarField::new(0));
        let od = [
            ODEntry {
                index: 0x1000,
                data: &obj1000,
            },
            ODEntry {
                index: 0x1001,
                data: &obj1001,
            },
        ];

        let mut stream = [0u8; 4 + 2 * 11];
        stream[0..4].copy_from_slice(&2u32.to_le_bytes());
        let mut pos = 4;
        write_record(&mut stream, &mut pos, 0x1000, 0, 42);
        write_record(&mut stream, &mut pos, 0x1001, 0, 7);

        apply_dcf(&od, &stream).unwrap();
        assert_eq!(obj1000.0.load(), 42);
        assert_eq!(obj1001.0.load(), 7);
    }

    #[test]
    fn stops_on_first_failure() {
        let obj1000 = TestVar(ScalarField::new(0));
        let od = [ODEntry {
            index: 0x1000,
            data: &obj1000,
        }];

        let mut stream = [0u8; 4 + 2 * 11];
        stream[0..4].copy_from_slice(&2u32.to_le_bytes());
        let mut pos = 4;
        write_record(&mut stream, &mut pos, 0x2000, 0, 1);
        write_record(&mut stream, &mut pos, 0x1000, 0, 99);

        let err = apply_dcf(&od, &stream).unwrap_err();
        assert_eq!(
            err,
            DcfError::WriteFailed {
                index: 0x2000,
                sub: 0,
                abort_code: AbortCode::NoSuchObject,
            }
        );
        // The second entry, after the failing one, must not have been applied
        assert_eq!(obj1000.0.load(), 0);
    }

    #[test]
    fn truncated_stream_is_unexpected_eof() {
        let od: [ODEntry; 0] = [];
        let stream = 1u32.to_le_bytes();
        assert_eq!(apply_dcf(&od, &stream), Err(DcfError::UnexpectedEof));
    }
}
