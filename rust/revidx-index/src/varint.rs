//! Variable-length encoding of non-negative integers in 1 to 4 bytes.
//!
//! The two most significant bits of the leading byte hold the size class, which
//! determines the total number of bytes of the value:
//!
//! | class | bytes | max value      |
//! |-------|-------|----------------|
//! | 0     | 1     | 63             |
//! | 1     | 2     | 16383          |
//! | 2     | 3     | 4194303        |
//! | 3     | 4     | 2^30 - 1       |
//!
//! The remaining bits store the value in big-endian order.

use revidx_common::{Result, error::Error};

/// Largest encodable value.
pub const MAX_VALUE: u32 = (1 << 30) - 1;

/// Maximum encoded size of a single value.
pub const MAX_ENCODED_LEN: usize = 4;

const CLASS_LIMITS: [u32; 4] = [(1 << 6) - 1, (1 << 14) - 1, (1 << 22) - 1, MAX_VALUE];

/// Returns the number of bytes needed to encode `value`.
pub fn encoded_len(value: u32) -> Result<usize> {
    CLASS_LIMITS
        .iter()
        .position(|&limit| value <= limit)
        .map(|class| class + 1)
        .ok_or_else(|| Error::value_out_of_range(value as u64, MAX_VALUE as u64))
}

/// Appends the encoding of `value` to `out` and returns the number of bytes written.
pub fn encode_into(value: u32, out: &mut Vec<u8>) -> Result<usize> {
    let len = encoded_len(value)?;
    let class = (len - 1) as u32;
    let tagged = value | (class << (8 * len - 2));
    for i in (0..len).rev() {
        out.push((tagged >> (8 * i)) as u8);
    }
    Ok(len)
}

/// Decodes a single value from the start of `bytes`.
///
/// Returns the value together with the number of consumed bytes.
pub fn decode(bytes: &[u8]) -> Result<(u32, usize)> {
    let Some(&first) = bytes.first() else {
        return Err(Error::invalid_format("varint", "unexpected end of input"));
    };
    let len = (first >> 6) as usize + 1;
    if bytes.len() < len {
        return Err(Error::invalid_format(
            "varint",
            format!("expected {len} bytes, {} available", bytes.len()),
        ));
    }
    let mut value = (first & 0x3f) as u32;
    for &b in &bytes[1..len] {
        value = (value << 8) | b as u32;
    }
    Ok((value, len))
}

/// Sequential decoder over an encoded byte buffer.
pub struct VarIntReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> VarIntReader<'a> {
    pub fn new(data: &'a [u8]) -> VarIntReader<'a> {
        VarIntReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read(&mut self) -> Result<u32> {
        let (value, len) = decode(&self.data[self.pos..])?;
        self.pos += len;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revidx_common::error::ErrorKind;

    fn encode(value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        encode_into(value, &mut out).unwrap();
        out
    }

    #[test]
    fn test_class_boundaries() {
        let cases = [
            (0, 1),
            (63, 1),
            (64, 2),
            (16383, 2),
            (16384, 3),
            (4194303, 3),
            (4194304, 4),
            (MAX_VALUE, 4),
        ];
        for (value, len) in cases {
            let bytes = encode(value);
            assert_eq!(bytes.len(), len, "value {value}");
            assert_eq!((bytes[0] >> 6) as usize, len - 1, "value {value}");
            assert_eq!(decode(&bytes).unwrap(), (value, len));
        }
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode(5), vec![0x05]);
        assert_eq!(encode(300), vec![0x41, 0x2c]);
        assert_eq!(encode(MAX_VALUE), vec![0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_out_of_range() {
        let mut out = Vec::new();
        let err = encode_into(MAX_VALUE + 1, &mut out).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ValueOutOfRange { .. }));
        assert!(out.is_empty());
        assert!(encoded_len(u32::MAX).is_err());
    }

    #[test]
    fn test_truncated_input() {
        let bytes = encode(100_000);
        assert!(decode(&bytes[..2]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_reader_sequence() {
        fastrand::seed(7);
        let values = (0..2000)
            .map(|_| match fastrand::u8(0..4) {
                0 => fastrand::u32(0..=63),
                1 => fastrand::u32(64..=16383),
                2 => fastrand::u32(16384..=4194303),
                _ => fastrand::u32(4194304..=MAX_VALUE),
            })
            .collect::<Vec<_>>();

        let mut buf = Vec::new();
        for &v in &values {
            encode_into(v, &mut buf).unwrap();
        }

        let mut reader = VarIntReader::new(&buf);
        let decoded = (0..values.len())
            .map(|_| reader.read().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(decoded, values);
        assert!(reader.is_empty());
        assert_eq!(reader.position(), buf.len());
        assert!(reader.read().is_err());
    }
}
