//! Compiling concise DCF byte streams from text configuration files
//!
//! A concise DCF is normally generated by a configuration tool from a device's EDS plus a set of
//! applied values. This crate reads a small ini-style text format describing the same
//! `{index, sub, value}` records and compiles them into the binary stream consumed by
//! `zencan_node::dcf::apply_dcf`: a `u32` entry count followed by that many `{u16 index, u8 sub,
//! u32 size, size bytes}` records, little-endian.
//!
//! The text format groups entries under `[<index in hex>]` or `[<index in hex>sub<sub in hex>]`
//! sections, each with a single `Value` field holding a hex-encoded byte string. This mirrors the
//! section-naming convention of a real EDS/DCF file without pulling in the full object-dictionary
//! schema (`ParameterName`, `ObjectType`, `DataType`, ...) that `eds-parser` parses for code
//! generation; a concise DCF only needs the values to apply, not the shape of the objects they
//! apply to.

use std::{collections::HashMap, path::Path};

use configparser::ini::Ini;
use snafu::{OptionExt, ResultExt, Snafu};

/// Error compiling a concise DCF text file
#[derive(Debug, Snafu)]
pub enum CompileError {
    #[snafu(display("failed to read or parse ini file: {message}"))]
    IniFormat { message: String },
    #[snafu(display("section '{section}' is missing a Value field"))]
    MissingValue { section: String },
    #[snafu(display("section name '{section}' is not a valid <index> or <index>sub<sub>"))]
    BadSectionName { section: String },
    #[snafu(display("Value field in section '{section}' is not valid hex: {source}"))]
    BadHex {
        section: String,
        source: std::num::ParseIntError,
    },
    #[snafu(display("Value field in section '{section}' has an odd number of hex digits"))]
    OddHexLength { section: String },
}

/// One `{index, sub, value}` record parsed from the text file, in file order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DcfRecord {
    pub index: u16,
    pub sub: u8,
    pub value: Vec<u8>,
}

fn parse_section_name(name: &str) -> Result<(u16, u8), CompileError> {
    let lower = name.to_lowercase();
    if let Some((index_str, sub_str)) = lower.split_once("sub") {
        let index = u16::from_str_radix(index_str, 16).ok().context(BadSectionNameSnafu {
            section: name.to_string(),
        })?;
        let sub = u8::from_str_radix(sub_str, 16).ok().context(BadSectionNameSnafu {
            section: name.to_string(),
        })?;
        Ok((index, sub))
    } else {
        let index = u16::from_str_radix(&lower, 16).ok().context(BadSectionNameSnafu {
            section: name.to_string(),
        })?;
        Ok((index, 0))
    }
}

fn parse_hex_value(section: &str, s: &str) -> Result<Vec<u8>, CompileError> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return OddHexLengthSnafu {
            section: section.to_string(),
        }
        .fail();
    }
    let mut bytes = Vec::with_capacity(s.len() / 2);
    for chunk in s.as_bytes().chunks(2) {
        let byte_str = std::str::from_utf8(chunk).unwrap();
        let byte = u8::from_str_radix(byte_str, 16).context(BadHexSnafu {
            section: section.to_string(),
        })?;
        bytes.push(byte);
    }
    Ok(bytes)
}

/// Parse records out of an already-loaded ini config map, in ascending `(index, sub)` order
fn records_from_map(
    map: &HashMap<String, HashMap<String, Option<String>>>,
) -> Result<Vec<DcfRecord>, CompileError> {
    let mut records = Vec::new();
    for (section, fields) in map {
        // configparser reserves the implicit "default" section for keys with no header; skip it
        if section == "default" {
            continue;
        }
        let (index, sub) = parse_section_name(section)?;
        let value_str = fields
            .get("value")
            .and_then(|v| v.as_ref())
            .context(MissingValueSnafu {
                section: section.clone(),
            })?;
        let value = parse_hex_value(section, value_str)?;
        records.push(DcfRecord { index, sub, value });
    }
    records.sort_by_key(|r| (r.index, r.sub));
    Ok(records)
}

/// Serialize records into the binary concise-DCF stream `zencan_node::dcf::apply_dcf` expects
pub fn records_to_bytes(records: &[DcfRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for record in records {
        out.extend_from_slice(&record.index.to_le_bytes());
        out.push(record.sub);
        out.extend_from_slice(&(record.value.len() as u32).to_le_bytes());
        out.extend_from_slice(&record.value);
    }
    out
}

/// Compile a concise DCF text file at `path` into the binary stream format
pub fn compile_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, CompileError> {
    let mut config = Ini::new();
    let map = config
        .load(path)
        .map_err(|message| IniFormatSnafu { message }.build())?;
    let records = records_from_map(&map)?;
    Ok(records_to_bytes(&records))
}

/// Compile a concise DCF text string into the binary stream format
pub fn compile_str<S: Into<String>>(text: S) -> Result<Vec<u8>, CompileError> {
    let mut config = Ini::new();
    let map = config
        .read(text.into())
        .map_err(|message| IniFormatSnafu { message }.build())?;
    let records = records_from_map(&map)?;
    Ok(records_to_bytes(&records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_entries_sorted_by_index() {
        let text = "\
[1001]
Value = 07

[1000]
Value = 2a000000
";
        let bytes = compile_str(text).unwrap();

        // count
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        // first record, sorted: index 0x1000 sub 0, size 4, value 0x0000002a LE
        assert_eq!(&bytes[4..6], &0x1000u16.to_le_bytes());
        assert_eq!(bytes[6], 0);
        assert_eq!(&bytes[7..11], &4u32.to_le_bytes());
        assert_eq!(&bytes[11..15], &42u32.to_le_bytes());
        // second record: index 0x1001 sub 0, size 1, value 0x07
        assert_eq!(&bytes[15..17], &0x1001u16.to_le_bytes());
        assert_eq!(bytes[17], 0);
        assert_eq!(&bytes[18..22], &1u32.to_le_bytes());
        assert_eq!(bytes[22], 0x07);
    }

    #[test]
    fn parses_explicit_sub_index_sections() {
        let text = "\
[1018sub1]
Value = 11223344
";
        let records = records_from_map(&{
            let mut cfg = Ini::new();
            cfg.read(text.to_string()).unwrap()
        })
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].index, 0x1018);
        assert_eq!(records[0].sub, 1);
        assert_eq!(records[0].value, vec![0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn missing_value_field_is_reported() {
        let text = "[1000]\nParameterName = Device Type\n";
        let err = compile_str(text).unwrap_err();
        assert!(matches!(err, CompileError::MissingValue { .. }));
    }

    #[test]
    fn odd_length_hex_is_rejected() {
        let text = "[1000]\nValue = abc\n";
        let err = compile_str(text).unwrap_err();
        assert!(matches!(err, CompileError::OddHexLength { .. }));
    }
}
