//! Shared pieces of the binary asset formats: the four-character tag plus
//! version header every file starts with, and the fixed-length
//! null-terminated string buffers. Everything on disk is little-endian,
//! floats are IEEE-754 32-bit.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::AssetLoadError;

/// Length of the fixed string buffers (shader register names, vertex
/// attribute names).
pub const FIXED_STRING_LENGTH: usize = 32;

/// Reads and checks the `{format_type, format_version}` file header.
pub fn read_and_check_header(
    reader: &mut impl Read,
    expected_tag: &[u8; 4],
    expected_version: u32,
) -> Result<(), AssetLoadError> {
    let mut found_tag = [0u8; 4];
    reader.read_exact(&mut found_tag)?;
    let found_version = reader.read_u32::<LittleEndian>()?;
    if &found_tag != expected_tag || found_version != expected_version {
        return Err(AssetLoadError::UnsupportedFormat {
            expected_tag: String::from_utf8_lossy(expected_tag).into_owned(),
            expected_version,
            found_tag: String::from_utf8_lossy(&found_tag).into_owned(),
            found_version,
        });
    }
    Ok(())
}

pub fn write_header(
    writer: &mut impl Write,
    tag: &[u8; 4],
    version: u32,
) -> Result<(), AssetLoadError> {
    writer.write_all(tag)?;
    writer.write_u32::<LittleEndian>(version)?;
    Ok(())
}

/// Reads a null-terminated string out of a fixed-length buffer.
pub fn read_fixed_string(reader: &mut impl Read) -> Result<String, AssetLoadError> {
    let mut buffer = [0u8; FIXED_STRING_LENGTH];
    reader.read_exact(&mut buffer)?;
    let length = buffer.iter().position(|byte| *byte == 0).unwrap_or(buffer.len());
    String::from_utf8(buffer[..length].to_vec())
        .map_err(|_| AssetLoadError::Corrupt("fixed-length string is not valid UTF-8".into()))
}

/// Writes a string into a fixed-length buffer, null-terminated. Longer
/// strings are a corrupt-asset error; the compiler side enforces the limit.
pub fn write_fixed_string(writer: &mut impl Write, value: &str) -> Result<(), AssetLoadError> {
    let bytes = value.as_bytes();
    if bytes.len() >= FIXED_STRING_LENGTH {
        return Err(AssetLoadError::Corrupt(format!(
            "string '{value}' does not fit a {FIXED_STRING_LENGTH} byte buffer"
        )));
    }
    let mut buffer = [0u8; FIXED_STRING_LENGTH];
    buffer[..bytes.len()].copy_from_slice(bytes);
    writer.write_all(&buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_mismatch_reports_both_sides() {
        let mut bytes = Vec::new();
        write_header(&mut bytes, b"MSH1", 7).unwrap();
        let error = read_and_check_header(&mut bytes.as_slice(), b"MBR1", 2).unwrap_err();
        match error {
            AssetLoadError::UnsupportedFormat {
                expected_tag,
                found_tag,
                found_version,
                ..
            } => {
                assert_eq!(expected_tag, "MBR1");
                assert_eq!(found_tag, "MSH1");
                assert_eq!(found_version, 7);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn fixed_string_round_trip() {
        let mut bytes = Vec::new();
        write_fixed_string(&mut bytes, "AlbedoMap").unwrap();
        assert_eq!(bytes.len(), FIXED_STRING_LENGTH);
        assert_eq!(read_fixed_string(&mut bytes.as_slice()).unwrap(), "AlbedoMap");
    }

    #[test]
    fn oversized_fixed_string_is_rejected() {
        let mut bytes = Vec::new();
        let result = write_fixed_string(
            &mut bytes,
            "this_name_is_definitely_longer_than_thirty_two_bytes",
        );
        assert!(result.is_err());
    }
}
