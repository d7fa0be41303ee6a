use std::error::Error as StdError;
use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::error;

use crate::status_code::StatusCode;

pub type EncodingResult<T> = Result<T, Error>;

/// Wraps a [`StatusCode`] with enough context to explain where and why an
/// encode/decode operation failed, and (for decode errors that surface in a
/// response) which request the failure should be reported against.
pub struct Error {
    status: StatusCode,
    request_id: Option<u32>,
    request_handle: Option<u32>,
    context: Box<dyn StdError + Send + Sync>,
}

impl Error {
    pub fn new(status: StatusCode, context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            status,
            request_id: None,
            request_handle: None,
            context: context.into(),
        }
    }

    pub fn decoding(context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(StatusCode::BadDecodingError, context)
    }

    pub fn encoding(context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(StatusCode::BadEncodingError, context)
    }

    pub fn with_context(mut self, context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_request_id(mut self, request_id: u32) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_request_handle(mut self, request_handle: u32) -> Self {
        self.request_handle = Some(request_handle);
        self
    }

    pub fn maybe_with_request_handle(mut self, request_handle: Option<u32>) -> Self {
        if let Some(h) = request_handle {
            self.request_handle = Some(h);
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn request_id(&self) -> Option<u32> {
        self.request_id
    }

    pub fn request_handle(&self) -> Option<u32> {
        self.request_handle
    }

    pub fn full_context(&self) -> String {
        format!("{}: {}", self.status, self.context)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("status", &self.status)
            .field("request_id", &self.request_id)
            .field("request_handle", &self.request_handle)
            .field("context", &self.context.to_string())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_context())
    }
}

impl StdError for Error {}

impl From<Error> for StatusCode {
    fn from(e: Error) -> Self {
        error!("{}", e.full_context());
        e.status
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.full_context())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::decoding(e)
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Error::new(status, status.to_string())
    }
}

/// Recursion guard shared by every decode call within a single message.
///
/// Mirrors the nested-ExtensionObject/Variant recursion limits of the wire
/// format: without a shared counter, a maliciously deep payload could blow
/// the stack before any size limit is ever consulted.
#[derive(Debug)]
pub struct DepthGauge {
    current_depth: AtomicU64,
    max_depth: u64,
}

impl DepthGauge {
    pub fn new(max_depth: u64) -> Self {
        Self {
            current_depth: AtomicU64::new(0),
            max_depth,
        }
    }

    pub fn obtain(self: &Arc<Self>) -> EncodingResult<DepthLock> {
        let depth = self.current_depth.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > self.max_depth {
            self.current_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::new(
                StatusCode::BadDecodingError,
                "maximum nesting depth exceeded",
            ));
        }
        Ok(DepthLock {
            gauge: self.clone(),
        })
    }
}

pub struct DepthLock {
    gauge: Arc<DepthGauge>,
}

impl Drop for DepthLock {
    fn drop(&mut self) {
        self.gauge.current_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decoding limits applied uniformly by every array/string/byte-string
/// decoder, so a single config object bounds the memory a peer can force us
/// to allocate while parsing an untrusted chunk stream.
#[derive(Debug, Clone)]
pub struct DecodingOptions {
    pub max_message_size: usize,
    pub max_chunk_count: usize,
    pub max_string_length: usize,
    pub max_byte_string_length: usize,
    pub max_array_length: usize,
    pub decoding_depth_gauge: Arc<DepthGauge>,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024,
            max_chunk_count: 5_000,
            max_string_length: 128 * 1024,
            max_byte_string_length: 128 * 1024 * 1024,
            max_array_length: 1_000_000,
            decoding_depth_gauge: Arc::new(DepthGauge::new(100)),
        }
    }
}

impl DecodingOptions {
    /// Tight limits suitable for parsing an untrusted HELLO/handshake
    /// before any negotiation has taken place.
    pub fn minimal() -> Self {
        Self {
            max_message_size: 64 * 1024,
            max_chunk_count: 1,
            max_string_length: 4096,
            max_byte_string_length: 4096,
            max_array_length: 1000,
            decoding_depth_gauge: Arc::new(DepthGauge::new(10)),
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self::default()
    }

    pub fn depth_lock(&self) -> EncodingResult<DepthLock> {
        self.decoding_depth_gauge.obtain()
    }
}

/// Types which have a distinguished "null" representation on the wire,
/// distinct from their default value (e.g. a null vs. empty array).
pub trait UaNullable {
    fn is_ua_null(&self) -> bool {
        false
    }
}

impl<T> UaNullable for Option<T> {
    fn is_ua_null(&self) -> bool {
        self.is_none()
    }
}

impl<T> UaNullable for Vec<T> {}
impl<T: UaNullable> UaNullable for Box<T> {
    fn is_ua_null(&self) -> bool {
        (**self).is_ua_null()
    }
}

macro_rules! is_null_const {
    ($($t:ty),*) => {
        $(impl UaNullable for $t {})*
    };
}

is_null_const!(bool, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Types with no dependency on the encoding context (no embedded
/// ExtensionObject/Variant) can be encoded and decoded without one. Every
/// `SimpleBinaryEncodable` is also a `BinaryEncodable` via the blanket impl
/// below, so callers never need to pick between the two by hand.
pub trait SimpleBinaryEncodable: UaNullable {
    fn byte_len(&self) -> usize;
    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize>;
}

pub trait SimpleBinaryDecodable: Sized {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self>;
}

pub trait BinaryEncodable: UaNullable {
    fn byte_len(&self, ctx: &DecodingOptions) -> usize;
    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &DecodingOptions) -> EncodingResult<usize>;
}

pub trait BinaryDecodable: Sized {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self>;
}

impl<T: SimpleBinaryEncodable> BinaryEncodable for T {
    fn byte_len(&self, _ctx: &DecodingOptions) -> usize {
        SimpleBinaryEncodable::byte_len(self)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, _ctx: &DecodingOptions) -> EncodingResult<usize> {
        SimpleBinaryEncodable::encode(self, stream)
    }
}

impl<T: SimpleBinaryDecodable> BinaryDecodable for T {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        SimpleBinaryDecodable::decode(stream, decoding_options)
    }
}

pub fn process_encode_io_result(result: std::io::Result<()>, size: usize) -> EncodingResult<usize> {
    result.map(|_| size).map_err(Error::from)
}

pub fn process_decode_io_result<T>(result: std::io::Result<T>) -> EncodingResult<T> {
    result.map_err(Error::from)
}

macro_rules! primitive_rw {
    ($write_fn:ident, $read_fn:ident, $t:ty, $write_method:ident, $read_method:ident) => {
        pub fn $write_fn<S: Write + ?Sized>(stream: &mut S, value: $t) -> EncodingResult<usize> {
            process_encode_io_result(
                stream.$write_method::<LittleEndian>(value),
                std::mem::size_of::<$t>(),
            )
        }

        pub fn $read_fn<S: Read + ?Sized>(stream: &mut S) -> EncodingResult<$t> {
            process_decode_io_result(stream.$read_method::<LittleEndian>())
        }
    };
}

pub fn write_u8<S: Write + ?Sized>(stream: &mut S, value: u8) -> EncodingResult<usize> {
    process_encode_io_result(stream.write_u8(value), 1)
}

pub fn read_u8<S: Read + ?Sized>(stream: &mut S) -> EncodingResult<u8> {
    process_decode_io_result(stream.read_u8())
}

primitive_rw!(write_i16, read_i16, i16, write_i16, read_i16);
primitive_rw!(write_u16, read_u16, u16, write_u16, read_u16);
primitive_rw!(write_i32, read_i32, i32, write_i32, read_i32);
primitive_rw!(write_u32, read_u32, u32, write_u32, read_u32);
primitive_rw!(write_i64, read_i64, i64, write_i64, read_i64);
primitive_rw!(write_u64, read_u64, u64, write_u64, read_u64);
primitive_rw!(write_f32, read_f32, f32, write_f32, read_f32);
primitive_rw!(write_f64, read_f64, f64, write_f64, read_f64);

pub fn write_bytes<S: Write + ?Sized>(stream: &mut S, value: &[u8]) -> EncodingResult<usize> {
    process_encode_io_result(stream.write_all(value), value.len())
}

pub fn skip_bytes<S: Read + ?Sized>(stream: &mut S, n: usize) -> EncodingResult<()> {
    let mut buf = vec![0u8; n];
    process_decode_io_result(stream.read_exact(&mut buf))
}

pub fn byte_len_array<T: SimpleBinaryEncodable>(values: &Option<Vec<T>>) -> usize {
    4 + values
        .as_ref()
        .map(|v| v.iter().map(|i| i.byte_len()).sum())
        .unwrap_or(0)
}

impl<T: SimpleBinaryEncodable> SimpleBinaryEncodable for Option<Vec<T>> {
    fn byte_len(&self) -> usize {
        byte_len_array(self)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = 0;
        match self {
            None => size += write_i32(stream, -1)?,
            Some(values) => {
                size += write_i32(stream, values.len() as i32)?;
                for v in values {
                    size += v.encode(stream)?;
                }
            }
        }
        Ok(size)
    }
}

impl<T: SimpleBinaryDecodable> SimpleBinaryDecodable for Option<Vec<T>> {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            Ok(None)
        } else if len < -1 {
            Err(Error::decoding("negative array length"))
        } else if len as usize > decoding_options.max_array_length {
            Err(Error::decoding("array length exceeds configured maximum"))
        } else {
            let mut values = Vec::with_capacity((len as usize).min(4096));
            for _ in 0..len {
                values.push(T::decode(stream, decoding_options)?);
            }
            Ok(Some(values))
        }
    }
}
