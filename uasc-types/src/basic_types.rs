use std::io::{Read, Write};

use chrono::{DateTime as ChronoDateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::encoding::{
    read_f32, read_f64, read_i16, read_i32, read_i64, read_u16, read_u32, read_u64, read_u8,
    write_f32, write_f64, write_i16, write_i32, write_i64, write_u16, write_u32, write_u64,
    write_u8, DecodingOptions, EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable,
};

macro_rules! simple_primitive {
    ($t:ty, $write_fn:path, $read_fn:path, $size:expr) => {
        impl SimpleBinaryEncodable for $t {
            fn byte_len(&self) -> usize {
                $size
            }

            fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
                $write_fn(stream, *self)
            }
        }

        impl SimpleBinaryDecodable for $t {
            fn decode<S: Read + ?Sized>(
                stream: &mut S,
                _decoding_options: &DecodingOptions,
            ) -> EncodingResult<Self> {
                $read_fn(stream)
            }
        }
    };
}

simple_primitive!(u8, write_u8, read_u8, 1);
simple_primitive!(u16, write_u16, read_u16, 2);
simple_primitive!(i16, write_i16, read_i16, 2);
simple_primitive!(u32, write_u32, read_u32, 4);
simple_primitive!(i32, write_i32, read_i32, 4);
simple_primitive!(u64, write_u64, read_u64, 8);
simple_primitive!(i64, write_i64, read_i64, 8);
simple_primitive!(f32, write_f32, read_f32, 4);
simple_primitive!(f64, write_f64, read_f64, 8);

impl SimpleBinaryEncodable for i8 {
    fn byte_len(&self) -> usize {
        1
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_u8(stream, *self as u8)
    }
}

impl SimpleBinaryDecodable for i8 {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(read_u8(stream)? as i8)
    }
}

impl SimpleBinaryEncodable for bool {
    fn byte_len(&self) -> usize {
        1
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_u8(stream, if *self { 1 } else { 0 })
    }
}

impl SimpleBinaryDecodable for bool {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(read_u8(stream)? != 0)
    }
}

/// Number of 100ns ticks between the Windows/OPC UA epoch (1601-01-01) and
/// the Unix epoch (1970-01-01).
const EPOCH_OFFSET_TICKS: i64 = 116_444_736_000_000_000;

/// UTC timestamp encoded as 100ns ticks since 1601-01-01, per the OPC UA
/// binary encoding of `DateTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcTime(i64);

impl UtcTime {
    pub fn now() -> Self {
        Self::from_chrono(Utc::now())
    }

    pub fn from_ticks(ticks: i64) -> Self {
        UtcTime(ticks)
    }

    pub fn ticks(self) -> i64 {
        self.0
    }

    pub fn from_chrono(dt: ChronoDateTime<Utc>) -> Self {
        let micros = dt.timestamp_micros();
        UtcTime(micros.saturating_mul(10).saturating_add(EPOCH_OFFSET_TICKS))
    }

    pub fn to_chrono(self) -> ChronoDateTime<Utc> {
        let micros = (self.0 - EPOCH_OFFSET_TICKS) / 10;
        Utc.timestamp_micros(micros).single().unwrap_or_else(Utc::now)
    }

    pub fn null() -> Self {
        UtcTime(0)
    }
}

impl Default for UtcTime {
    fn default() -> Self {
        UtcTime::null()
    }
}

impl crate::encoding::UaNullable for UtcTime {}

impl SimpleBinaryEncodable for UtcTime {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_i64(stream, self.0)
    }
}

impl SimpleBinaryDecodable for UtcTime {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(UtcTime(read_i64(stream)?))
    }
}

/// 16-byte RFC 4122 GUID, encoded per the OPC UA `Guid` wire layout
/// (little-endian Data1/Data2/Data3, raw Data4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid(Uuid);

impl Guid {
    pub fn new() -> Self {
        Guid(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Guid(Uuid::nil())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for Guid {
    fn default() -> Self {
        Guid::nil()
    }
}

impl From<[u8; 16]> for Guid {
    fn from(bytes: [u8; 16]) -> Self {
        Guid(Uuid::from_bytes(bytes))
    }
}

impl crate::encoding::UaNullable for Guid {}

impl SimpleBinaryEncodable for Guid {
    fn byte_len(&self) -> usize {
        16
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let (d1, d2, d3, d4) = self.0.as_fields();
        let mut size = 0;
        size += write_u32(stream, d1)?;
        size += write_u16(stream, d2)?;
        size += write_u16(stream, d3)?;
        crate::encoding::write_bytes(stream, d4)?;
        size += d4.len();
        Ok(size)
    }
}

impl SimpleBinaryDecodable for Guid {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let d1 = read_u32(stream)?;
        let d2 = read_u16(stream)?;
        let d3 = read_u16(stream)?;
        let mut d4 = [0u8; 8];
        stream
            .read_exact(&mut d4)
            .map_err(crate::encoding::Error::from)?;
        Ok(Guid(Uuid::from_fields(d1, d2, d3, &d4)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_time_round_trips_through_ticks() {
        let now = UtcTime::now();
        let back = UtcTime::from_ticks(now.ticks());
        assert_eq!(now, back);
    }

    #[test]
    fn guid_round_trip() {
        let guid = Guid::new();
        let mut buf = Vec::new();
        guid.encode(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = Guid::decode(&mut cursor, &DecodingOptions::default()).unwrap();
        assert_eq!(guid, decoded);
    }
}
