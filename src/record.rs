//! Record codec
//!
//! A record is a `(key, type_tag, value)` triple encoded as a self-delimiting
//! frame: a `u32` total size followed by three length-prefixed UTF-8 fields,
//! in the order key, type, value. Every integer is little-endian.
//!
//! ```text
//! [ total_size : u32 LE ]
//! [ key_len    : u32 LE ][ key bytes    ]
//! [ type_len   : u32 LE ][ type bytes   ]
//! [ value_len  : u32 LE ][ value bytes  ]
//! ```

use std::io::Read;

use crate::error::{Error, Result};

const LEN_PREFIX: usize = 4;

/// One decoded record: key, type tag, value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value_type: String,
    pub value: String,
}

/// Encode `(key, value_type, value)` into a self-delimiting frame.
pub fn encode(key: &str, value_type: &str, value: &str) -> Vec<u8> {
    let total_size = LEN_PREFIX + LEN_PREFIX + key.len() + LEN_PREFIX + value_type.len() + LEN_PREFIX + value.len();

    let mut buf = Vec::with_capacity(total_size);
    buf.extend_from_slice(&(total_size as u32).to_le_bytes());
    write_field(&mut buf, key.as_bytes());
    write_field(&mut buf, value_type.as_bytes());
    write_field(&mut buf, value.as_bytes());
    buf
}

fn write_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_le_bytes());
    buf.extend_from_slice(field);
}

/// Decode a complete frame (exactly one record, no trailing bytes) into its
/// three fields.
pub fn decode(frame: &[u8]) -> Result<Record> {
    if frame.len() < LEN_PREFIX {
        return Err(Error::MalformedFrame("frame shorter than size prefix".into()));
    }

    let total_size = read_u32(frame, 0)? as usize;
    if total_size != frame.len() {
        return Err(Error::MalformedFrame(format!(
            "declared total_size {} does not match frame length {}",
            total_size,
            frame.len()
        )));
    }

    let mut pos = LEN_PREFIX;
    let key = read_field_str(frame, &mut pos)?;
    let value_type = read_field_str(frame, &mut pos)?;
    let value = read_field_str(frame, &mut pos)?;

    if pos != frame.len() {
        return Err(Error::MalformedFrame(format!(
            "{} trailing bytes after last field",
            frame.len() - pos
        )));
    }

    Ok(Record { key, value_type, value })
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32> {
    let end = at.checked_add(LEN_PREFIX).ok_or_else(|| Error::MalformedFrame("length overflow".into()))?;
    let bytes: [u8; LEN_PREFIX] = buf
        .get(at..end)
        .ok_or_else(|| Error::MalformedFrame("length prefix overruns frame".into()))?
        .try_into()
        .expect("slice of LEN_PREFIX bytes");
    Ok(u32::from_le_bytes(bytes))
}

fn read_field_str(buf: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_u32(buf, *pos)? as usize;
    let start = *pos + LEN_PREFIX;
    let end = start.checked_add(len).ok_or_else(|| Error::MalformedFrame("field length overflow".into()))?;
    let bytes = buf
        .get(start..end)
        .ok_or_else(|| Error::MalformedFrame("field overruns frame".into()))?;
    let s = std::str::from_utf8(bytes).map_err(|e| Error::MalformedFrame(format!("field is not valid UTF-8: {e}")))?;
    *pos = end;
    Ok(s.to_string())
}

/// Stream-read just the `total_size` prefix a reader is positioned at,
/// without consuming the rest of the frame.
fn read_total_size<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; LEN_PREFIX];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Stream-read one length-prefixed field, returning it as a `String`.
fn read_field<R: Read>(reader: &mut R) -> Result<String> {
    let mut len_buf = [0u8; LEN_PREFIX];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    String::from_utf8(data).map_err(|e| Error::MalformedFrame(format!("field is not valid UTF-8: {e}")))
}

/// Read a frame from a reader positioned at its first byte, returning only
/// the value field. Consumes exactly one frame's worth of bytes.
pub fn read_value<R: Read>(reader: &mut R) -> Result<String> {
    let _total_size = read_total_size(reader)?;
    let _key = read_field(reader)?;
    let _value_type = read_field(reader)?;
    read_field(reader)
}

/// Read a frame from a reader positioned at its first byte, returning only
/// the type tag field. Consumes exactly one frame's worth of bytes.
pub fn read_type<R: Read>(reader: &mut R) -> Result<String> {
    let _total_size = read_total_size(reader)?;
    let _key = read_field(reader)?;
    read_field(reader)
}

/// Read a whole frame from a reader positioned at its first byte, decoding
/// all three fields. Used by recovery and by reads that need both value and
/// type in one pass.
pub fn read_record<R: Read>(reader: &mut R) -> Result<(Record, usize)> {
    let total_size = read_total_size(reader)? as usize;
    let key = read_field(reader)?;
    let value_type = read_field(reader)?;
    let value = read_field(reader)?;
    Ok((Record { key, value_type, value }, total_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let frame = encode("key", "string", "value");
        let record = decode(&frame).unwrap();
        assert_eq!(record.key, "key");
        assert_eq!(record.value_type, "string");
        assert_eq!(record.value, "value");
    }

    #[test]
    fn read_value_matches_encoded_value() {
        let frame = encode("key", "string", "test-value");
        let mut cursor = std::io::Cursor::new(frame);
        let value = read_value(&mut cursor).unwrap();
        assert_eq!(value, "test-value");
    }

    #[test]
    fn read_type_matches_encoded_type() {
        let frame = encode("key", "int64", "42");
        let mut cursor = std::io::Cursor::new(frame);
        let value_type = read_type(&mut cursor).unwrap();
        assert_eq!(value_type, "int64");
    }

    #[test]
    fn decode_rejects_total_size_mismatch() {
        let mut frame = encode("key", "string", "value");
        let bad_len = (frame.len() as u32) + 1;
        frame[0..4].copy_from_slice(&bad_len.to_le_bytes());
        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn decode_rejects_field_overrun() {
        let mut frame = encode("key", "string", "value");
        // Blow up the key length so it claims more bytes than remain.
        frame[4..8].copy_from_slice(&9999u32.to_le_bytes());
        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn empty_fields_round_trip() {
        let frame = encode("", "", "");
        let record = decode(&frame).unwrap();
        assert_eq!(record.key, "");
        assert_eq!(record.value_type, "");
        assert_eq!(record.value, "");
    }
}
