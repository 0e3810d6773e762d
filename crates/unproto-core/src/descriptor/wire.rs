//! Low-level protobuf wire format reading.
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: SGROUP/EGROUP (deprecated groups)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! Every read is bounds checked; running off the end of the buffer is a
//! [`Error::MalformedSchema`], never a panic.

use crate::error::{Error, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::malformed_schema(
                0,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_VALID_NUMBER: u32 = 536_870_911;

/// Deepest nesting of embedded messages and groups accepted (prost's limit)
pub const RECURSION_LIMIT: usize = 100;

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. The error
/// offset is relative to `data`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::malformed_schema(i, "varint longer than 10 bytes"));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::malformed_schema(data.len(), "truncated varint"))
}

/// Undo zigzag encoding of a `sint32`
pub fn decode_zigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Undo zigzag encoding of a `sint64`
pub fn decode_zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Cursor over one length-delimited record.
///
/// Offsets reported in errors are absolute: a reader obtained from
/// [`WireReader::read_message`] remembers where its slice started.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
    depth: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over a complete buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
            depth: 0,
        }
    }

    /// Returns true once every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Absolute offset of the next byte
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn error(&self, details: impl Into<String>) -> Error {
        Error::malformed_schema(self.offset(), details)
    }

    /// Reads a raw varint
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = decode_varint(&self.data[self.pos..])
            .map_err(|_| self.error("truncated or overlong varint"))?;
        self.pos += len;
        Ok(value)
    }

    /// Reads a field tag, validating the field number and wire type
    pub fn read_tag(&mut self) -> Result<(u32, WireType)> {
        let start = self.offset();
        let tag = self.read_varint()?;
        let wire_type = WireType::try_from((tag & 0x07) as u8)
            .map_err(|_| Error::malformed_schema(start, format!("unknown wire type {}", tag & 0x07)))?;
        let field_number = tag >> 3;

        if field_number == 0 || field_number > MAX_VALID_NUMBER as u64 {
            return Err(Error::malformed_schema(
                start,
                format!(
                    "invalid field number {}: must be between 1 and {}",
                    field_number, MAX_VALID_NUMBER
                ),
            ));
        }

        Ok((field_number as u32, wire_type))
    }

    /// Reads a varint as a protobuf `int32` (negative values are sign extended)
    pub fn read_int32(&mut self) -> Result<i32> {
        Ok(self.read_varint()? as i64 as i32)
    }

    /// Reads a varint as a `bool`
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_varint()? != 0)
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.pos;
        if len > remaining {
            return Err(self.error(format!(
                "not enough bytes for {} (need {}, have {})",
                what, len, remaining
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads a little-endian `fixed32`
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let bytes = self.take(4, "I32")?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian `fixed64`
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let bytes = self.take(8, "I64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads the payload of a length-delimited field
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| self.error("length prefix overflows"))?;
        self.take(len, "LEN field")
    }

    /// Reads a length-delimited UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.offset();
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::malformed_schema(start, "string field is not valid UTF-8"))
    }

    /// Reads an embedded message and returns a reader scoped to it.
    ///
    /// Fails once messages nest deeper than [`RECURSION_LIMIT`].
    pub fn read_message(&mut self) -> Result<WireReader<'a>> {
        if self.depth >= RECURSION_LIMIT {
            return Err(self.error(format!(
                "messages nested deeper than {}",
                RECURSION_LIMIT
            )));
        }
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| self.error("length prefix overflows"))?;
        let base = self.offset();
        let data = self.take(len, "embedded message")?;
        Ok(WireReader {
            data,
            pos: 0,
            base,
            depth: self.depth + 1,
        })
    }

    /// Reads a repeated varint field that may be packed or unpacked
    pub fn read_packed_varints(&mut self, wire_type: WireType) -> Result<Vec<u64>> {
        match wire_type {
            WireType::Varint => Ok(vec![self.read_varint()?]),
            WireType::Len => {
                let mut packed = self.read_message()?;
                let mut values = Vec::new();
                while !packed.is_empty() {
                    values.push(packed.read_varint()?);
                }
                Ok(values)
            }
            other => Err(self.error(format!("wire type {:?} cannot hold varints", other))),
        }
    }

    /// Fails unless a known field arrived with the expected wire type
    pub fn expect(&self, field_number: u32, actual: WireType, expected: WireType) -> Result<()> {
        if actual == expected {
            Ok(())
        } else {
            Err(self.error(format!(
                "field {} has wire type {:?}, expected {:?}",
                field_number, actual, expected
            )))
        }
    }

    /// Skips the value of an unknown field by its wire-type-implied width.
    ///
    /// Groups are skipped with an explicit stack of open group numbers, so
    /// nesting costs no native stack; it is capped at [`RECURSION_LIMIT`].
    pub fn skip(&mut self, field_number: u32, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::I64 => {
                self.take(8, "I64")?;
            }
            WireType::Len => {
                self.read_bytes()?;
            }
            WireType::I32 => {
                self.take(4, "I32")?;
            }
            WireType::StartGroup => self.skip_group(field_number)?,
            WireType::EndGroup => {
                return Err(self.error(format!("unexpected end-group {}", field_number)));
            }
        }
        Ok(())
    }

    fn skip_group(&mut self, field_number: u32) -> Result<()> {
        let mut open = vec![field_number];

        while let Some(&innermost) = open.last() {
            if self.is_empty() {
                return Err(self.error(format!("unterminated group {}", innermost)));
            }
            let (number, wire_type) = self.read_tag()?;
            match wire_type {
                WireType::EndGroup if number == innermost => {
                    open.pop();
                }
                WireType::EndGroup => {
                    return Err(self.error(format!(
                        "group {} closed by end-group {}",
                        innermost, number
                    )));
                }
                WireType::StartGroup => {
                    if self.depth + open.len() >= RECURSION_LIMIT {
                        return Err(self.error(format!(
                            "groups nested deeper than {}",
                            RECURSION_LIMIT
                        )));
                    }
                    open.push(number);
                }
                other => self.skip(number, other)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_varint_single_byte() {
        let data = [0x08]; // Value 8
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 8);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let data = [0xAC, 0x02]; // Value 300
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_decode_varint_max() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(len, 10);
    }

    #[test]
    fn test_decode_varint_truncated() {
        assert!(decode_varint(&[0x80, 0x80]).is_err());
        assert!(decode_varint(&[]).is_err());
        assert!(decode_varint(&[0xFF; 11]).is_err());
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(decode_zigzag32(0), 0);
        assert_eq!(decode_zigzag32(1), -1);
        assert_eq!(decode_zigzag32(2), 1);
        assert_eq!(decode_zigzag32(u32::MAX), i32::MIN);
        assert_eq!(decode_zigzag64(3), -2);
        assert_eq!(decode_zigzag64(u64::MAX - 1), i64::MAX);
    }

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(1).unwrap(), WireType::I64);
        assert_eq!(WireType::try_from(2).unwrap(), WireType::Len);
        assert_eq!(WireType::try_from(5).unwrap(), WireType::I32);
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_read_tag_and_string() {
        // Field 1, wire type 2 (len), length 5, "hello"
        let data = [0x0A, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let mut reader = WireReader::new(&data);
        assert_eq!(reader.read_tag().unwrap(), (1, WireType::Len));
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_negative_int32() {
        // -1 as a ten byte varint
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert_eq!(WireReader::new(&data).read_int32().unwrap(), -1);
    }

    #[test]
    fn test_invalid_field_number() {
        let data = [0x00, 0x01];
        assert!(WireReader::new(&data).read_tag().is_err());
    }

    #[test]
    fn test_dangling_len_field() {
        let data = [0x0A, 0x05, b'h', b'i'];
        let mut reader = WireReader::new(&data);
        reader.read_tag().unwrap();
        let err = reader.read_bytes().unwrap_err();
        assert!(matches!(err, Error::MalformedSchema { .. }));
    }

    #[test]
    fn test_nested_offsets_are_absolute() {
        // Field 4 (len 2) containing a truncated varint
        let data = [0x22, 0x02, 0x08, 0x80];
        let mut reader = WireReader::new(&data);
        reader.read_tag().unwrap();
        let mut nested = reader.read_message().unwrap();
        assert_eq!(nested.offset(), 2);
        nested.read_tag().unwrap();
        match nested.read_varint().unwrap_err() {
            Error::MalformedSchema { offset, .. } => assert_eq!(offset, 3),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_packed_and_unpacked_varints() {
        let packed = [0x03, 0x01, 0x02, 0x03];
        let mut reader = WireReader::new(&packed);
        assert_eq!(reader.read_packed_varints(WireType::Len).unwrap(), vec![1, 2, 3]);

        let single = [0x07];
        let mut reader = WireReader::new(&single);
        assert_eq!(reader.read_packed_varints(WireType::Varint).unwrap(), vec![7]);
    }

    #[test]
    fn test_skip_every_wire_type() {
        // varint, i64, len, i32, then a group containing a varint
        let data = [
            0x08, 0x96, 0x01, //
            0x11, 1, 2, 3, 4, 5, 6, 7, 8, //
            0x1A, 0x01, 0xFF, //
            0x25, 1, 2, 3, 4, //
            0x2B, 0x08, 0x01, 0x2C,
        ];
        let mut reader = WireReader::new(&data);
        while !reader.is_empty() {
            let (number, wire_type) = reader.read_tag().unwrap();
            reader.skip(number, wire_type).unwrap();
        }
    }

    #[test]
    fn test_unterminated_group() {
        let data = [0x2B, 0x08, 0x01];
        let mut reader = WireReader::new(&data);
        let (number, wire_type) = reader.read_tag().unwrap();
        assert!(reader.skip(number, wire_type).is_err());
    }

    /// `depth` start-group tags for field 15, then the matching end-groups
    fn nested_groups(depth: usize) -> Vec<u8> {
        let mut data = vec![0x7B; depth];
        data.extend(std::iter::repeat(0x7C).take(depth));
        data
    }

    #[test]
    fn test_nested_groups_within_limit() {
        let data = nested_groups(RECURSION_LIMIT - 1);
        let mut reader = WireReader::new(&data);
        let (number, wire_type) = reader.read_tag().unwrap();
        reader.skip(number, wire_type).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn test_group_nesting_is_bounded() {
        let data = vec![0x7Bu8; 200_000];
        let mut reader = WireReader::new(&data);
        let (number, wire_type) = reader.read_tag().unwrap();
        let err = reader.skip(number, wire_type).unwrap_err();
        assert!(matches!(err, Error::MalformedSchema { .. }));
        assert!(err.to_string().contains("nested deeper"));
    }

    #[test]
    fn test_message_nesting_is_bounded() {
        // each level is field 1, LEN, wrapping the next
        let mut data: Vec<u8> = Vec::new();
        for _ in 0..RECURSION_LIMIT + 1 {
            let mut outer = vec![0x0A];
            let mut len = data.len();
            while len >= 0x80 {
                outer.push((len as u8 & 0x7F) | 0x80);
                len >>= 7;
            }
            outer.push(len as u8);
            outer.extend_from_slice(&data);
            data = outer;
        }

        let mut reader = WireReader::new(&data);
        let mut levels = 0;
        let err = loop {
            if reader.is_empty() {
                panic!("nesting ran out after {} levels", levels);
            }
            reader.read_tag().unwrap();
            match reader.read_message() {
                Ok(inner) => reader = inner,
                Err(e) => break e,
            }
            levels += 1;
        };
        assert_eq!(levels, RECURSION_LIMIT);
        assert!(matches!(err, Error::MalformedSchema { .. }));
    }
}
