//! Codec for symbol-table stream records and point annotations.
//!
//! Two wire formats live here, both little-endian:
//!
//! # Instruction records
//!
//! Each record on a symbol-table stream is a fixed 8-byte header followed by
//! an instruction-specific payload:
//!
//! ```text
//! | version (u16) | instruction (u8) | reserved (u8, zero) | sequence_num (u32) |
//! ```
//!
//! Payloads:
//!
//! - `Init` / `Update`: `count: u32`, then `count` × (`len: u16`, UTF-8 bytes)
//! - `AddAttribute`: `name_len: u16`, name bytes, `encoding: u16`,
//!   `count: u32`, `count` × `value_id: u64`
//! - `End`: no payload
//!
//! A full record may not exceed [`MAX_RECORD_SIZE`]; the cap mirrors the
//! annotation size limit of the underlying store and is enforced at encode
//! time.
//!
//! # Point annotations
//!
//! Every attribute-bearing data point carries:
//!
//! ```text
//! | version (u16) | header_len (u16) | header_len × local_index (u32) |
//! ```
//!
//! Local indices are signed 32-bit values stored in two's complement; `-1`
//! marks a header slot with no attribute value for the point.

use bytes::{Bytes, BytesMut};

use common::serde::{
    decode_u16, decode_u32, decode_u64, decode_utf8, encode_u16, encode_u32, encode_u64,
    encode_utf8,
};

use crate::error::{Error, Result};

/// Size of the fixed instruction record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Upper bound on a single encoded instruction record, header included.
pub const MAX_RECORD_SIZE: usize = 16 * 1024;

/// Size of the fixed point-annotation prefix in bytes.
pub const ANNOTATION_HEADER_SIZE: usize = 4;

/// Sequence number every init record is written with.
pub const INIT_SEQUENCE_NUM: u32 = 1;

/// Instruction kinds carried on a symbol-table stream.
///
/// `Nop` is reserved for signalling end-of-stream to callers and is never
/// encoded on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableInstruction {
    Init = 0,
    Update = 1,
    AddAttribute = 2,
    End = 3,
    Nop = 4,
}

impl TableInstruction {
    /// Returns the byte discriminator for this instruction.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Converts a wire byte to an instruction kind.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(TableInstruction::Init),
            1 => Ok(TableInstruction::Update),
            2 => Ok(TableInstruction::AddAttribute),
            3 => Ok(TableInstruction::End),
            _ => Err(Error::MalformedRecord(format!(
                "invalid instruction opcode: {}",
                byte
            ))),
        }
    }
}

/// Supported attribute encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeEncoding {
    /// Values are encoded as raw unsigned values. Reserved; no code path
    /// produces it yet.
    UnsignedNumeric = 0,
    /// Values index into the symbol table dictionary.
    DictionaryEncoded = 1,
}

impl AttributeEncoding {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(AttributeEncoding::UnsignedNumeric),
            1 => Ok(AttributeEncoding::DictionaryEncoded),
            _ => Err(Error::MalformedRecord(format!(
                "invalid attribute encoding: {}",
                value
            ))),
        }
    }
}

/// A decoded instruction together with its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Init {
        values: Vec<String>,
    },
    Update {
        values: Vec<String>,
    },
    AddAttribute {
        name: String,
        encoding: AttributeEncoding,
        value_ids: Vec<u64>,
    },
    End,
}

impl Instruction {
    /// Returns the wire kind of this instruction.
    pub fn kind(&self) -> TableInstruction {
        match self {
            Instruction::Init { .. } => TableInstruction::Init,
            Instruction::Update { .. } => TableInstruction::Update,
            Instruction::AddAttribute { .. } => TableInstruction::AddAttribute,
            Instruction::End => TableInstruction::End,
        }
    }
}

/// Encodes the fixed 8-byte record header. Writes exactly
/// [`RECORD_HEADER_SIZE`] bytes.
pub fn encode_record_header(
    buf: &mut BytesMut,
    version: u16,
    instruction: TableInstruction,
    sequence_num: u32,
) {
    encode_u16(version, buf);
    buf.extend_from_slice(&[instruction.as_byte(), 0]);
    encode_u32(sequence_num, buf);
}

/// Decodes the fixed 8-byte record header.
///
/// The reserved byte is ignored on decode.
pub fn decode_record_header(raw: &[u8]) -> Result<(u16, TableInstruction, u32)> {
    if raw.len() < RECORD_HEADER_SIZE {
        return Err(Error::MalformedRecord(format!(
            "record header needs {} bytes, have {}",
            RECORD_HEADER_SIZE,
            raw.len()
        )));
    }
    let mut cursor = raw;
    let version = decode_u16(&mut cursor)?;
    let instruction = TableInstruction::from_byte(cursor[0])?;
    cursor = &cursor[2..];
    let sequence_num = decode_u32(&mut cursor)?;
    Ok((version, instruction, sequence_num))
}

/// Encodes a count-prefixed, length-prefixed list of dictionary values.
///
/// Fails [`Error::RecordTooLarge`] before touching the buffer when the
/// encoded record would exceed [`MAX_RECORD_SIZE`] or a single value cannot
/// fit its u16 length prefix.
pub fn encode_values(buf: &mut BytesMut, values: &[String]) -> Result<()> {
    let mut needed = 4;
    for value in values {
        if value.len() > u16::MAX as usize {
            return Err(Error::RecordTooLarge(format!(
                "dictionary value of {} bytes cannot fit its length prefix",
                value.len()
            )));
        }
        needed += 2 + value.len();
    }
    check_record_capacity(buf.len(), needed)?;

    encode_u32(values.len() as u32, buf);
    for value in values {
        encode_utf8(value, buf)?;
    }
    Ok(())
}

/// Decodes a count-prefixed, length-prefixed list of dictionary values,
/// advancing the cursor.
pub fn decode_values(buf: &mut &[u8]) -> Result<Vec<String>> {
    let count = decode_u32(buf)?;
    let mut values = Vec::new();
    for _ in 0..count {
        values.push(decode_utf8(buf)?);
    }
    Ok(values)
}

/// Encodes an add-attribute payload.
///
/// Fails [`Error::RecordTooLarge`] before touching the buffer when the
/// encoded record would exceed [`MAX_RECORD_SIZE`].
pub fn encode_add_attribute(
    buf: &mut BytesMut,
    name: &str,
    encoding: AttributeEncoding,
    value_ids: &[u64],
) -> Result<()> {
    if name.len() > u16::MAX as usize {
        return Err(Error::RecordTooLarge(format!(
            "attribute name of {} bytes cannot fit its length prefix",
            name.len()
        )));
    }
    let needed = 2 + name.len() + 2 + 4 + 8 * value_ids.len();
    check_record_capacity(buf.len(), needed)?;

    encode_utf8(name, buf)?;
    encode_u16(encoding.as_u16(), buf);
    encode_u32(value_ids.len() as u32, buf);
    for id in value_ids {
        encode_u64(*id, buf);
    }
    Ok(())
}

/// Decodes an add-attribute payload, advancing the cursor.
pub fn decode_add_attribute(buf: &mut &[u8]) -> Result<(String, AttributeEncoding, Vec<u64>)> {
    let name = decode_utf8(buf)?;
    let encoding = AttributeEncoding::from_u16(decode_u16(buf)?)?;
    let count = decode_u32(buf)?;
    let mut value_ids = Vec::new();
    for _ in 0..count {
        value_ids.push(decode_u64(buf)?);
    }
    Ok((name, encoding, value_ids))
}

/// Encodes a complete `(version, sequence_num, instruction)` record.
pub fn encode_record(
    buf: &mut BytesMut,
    version: u16,
    sequence_num: u32,
    instruction: &Instruction,
) -> Result<()> {
    encode_record_header(buf, version, instruction.kind(), sequence_num);
    match instruction {
        Instruction::Init { values } | Instruction::Update { values } => {
            encode_values(buf, values)
        }
        Instruction::AddAttribute {
            name,
            encoding,
            value_ids,
        } => encode_add_attribute(buf, name, *encoding, value_ids),
        Instruction::End => Ok(()),
    }
}

/// Decodes a complete record back into `(version, sequence_num, instruction)`.
pub fn decode_record(raw: &[u8]) -> Result<(u16, u32, Instruction)> {
    let (version, kind, sequence_num) = decode_record_header(raw)?;
    let mut payload = &raw[RECORD_HEADER_SIZE..];
    let instruction = match kind {
        TableInstruction::Init => Instruction::Init {
            values: decode_values(&mut payload)?,
        },
        TableInstruction::Update => Instruction::Update {
            values: decode_values(&mut payload)?,
        },
        TableInstruction::AddAttribute => {
            let (name, encoding, value_ids) = decode_add_attribute(&mut payload)?;
            Instruction::AddAttribute {
                name,
                encoding,
                value_ids,
            }
        }
        TableInstruction::End => Instruction::End,
        TableInstruction::Nop => {
            return Err(Error::MalformedRecord(
                "nop instruction is never encoded".to_string(),
            ));
        }
    };
    Ok((version, sequence_num, instruction))
}

/// Encodes a point annotation from a symbol table version and an indexed
/// header.
pub fn encode_indexed_header(version: u16, header: &[i32]) -> Result<Bytes> {
    if header.len() > u16::MAX as usize {
        return Err(Error::RecordTooLarge(format!(
            "indexed header of {} slots cannot fit its length prefix",
            header.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(ANNOTATION_HEADER_SIZE + 4 * header.len());
    encode_u16(version, &mut buf);
    encode_u16(header.len() as u16, &mut buf);
    for index in header {
        encode_u32(*index as u32, &mut buf);
    }
    Ok(buf.freeze())
}

/// Decodes only the symbol table version prefix of a point annotation.
pub fn decode_annotation_version(raw: &[u8]) -> Result<u16> {
    let mut cursor = raw;
    Ok(decode_u16(&mut cursor)?)
}

/// Decodes a point annotation into its version and indexed header.
pub fn decode_indexed_header(raw: &[u8]) -> Result<(u16, Vec<i32>)> {
    let mut cursor = raw;
    let version = decode_u16(&mut cursor)?;
    let len = decode_u16(&mut cursor)? as usize;
    let mut header = Vec::with_capacity(len);
    for _ in 0..len {
        header.push(decode_u32(&mut cursor)? as i32);
    }
    Ok((version, header))
}

fn check_record_capacity(current: usize, needed: usize) -> Result<()> {
    if current + needed > MAX_RECORD_SIZE {
        return Err(Error::RecordTooLarge(format!(
            "encoded record would be {} bytes, cap is {}",
            current + needed,
            MAX_RECORD_SIZE
        )));
    }
    Ok(())
}
