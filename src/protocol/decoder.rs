//! # Record Decoder
//!
//! Accumulate-until-decode framing for JSON records sent without a length
//! prefix or delimiter.
//!
//! Bytes from every read are appended to a per-connection buffer and a
//! decode is attempted after each read. An incomplete record is not an
//! error: the bytes stay buffered until the rest arrives.
//!
//! Bytes that trail a decoded record are kept and decoded as the start of
//! the next record, so several records coalesced into one read are all
//! delivered.

use bytes::{Buf, BytesMut};
use serde::de::{DeserializeOwned, Error as _};
use serde_json::{Deserializer, Value};
use std::marker::PhantomData;

use crate::error::Result;

/// Size hint for a single socket read
pub const READ_CHUNK_SIZE: usize = 4096;

/// Largest incomplete record kept in the buffer before it is discarded
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024;

/// Incremental decoder for one stream of `T` records
#[derive(Debug)]
pub struct RecordDecoder<T> {
    buf: BytesMut,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Default for RecordDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> RecordDecoder<T> {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            _record: PhantomData,
        }
    }

    /// Receive buffer, for reading directly into
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        self.buf.reserve(READ_CHUNK_SIZE);
        &mut self.buf
    }

    /// Append bytes received from the peer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for the rest of a record
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Try to decode the next record from the buffer
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - a record was decoded and its bytes consumed
    /// * `Ok(None)` - the buffer holds no complete record yet
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if:
    /// - A complete JSON value does not match `T` (the value is skipped,
    ///   following bytes are kept)
    /// - The buffer is not valid JSON (the whole buffer is discarded)
    /// - An incomplete record grows beyond `MAX_BUFFERED_BYTES`
    pub fn decode_next(&mut self) -> Result<Option<T>> {
        let (outcome, consumed) = {
            let mut stream = Deserializer::from_slice(&self.buf).into_iter::<Value>();
            let outcome = stream.next();
            (outcome, stream.byte_offset())
        };

        match outcome {
            None => {
                // Only whitespace left
                self.buf.clear();
                Ok(None)
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buf.len() > MAX_BUFFERED_BYTES {
                    let len = self.buf.len();
                    self.buf.clear();
                    return Err(serde_json::Error::custom(format!(
                        "incomplete record exceeds {} bytes ({} buffered)",
                        MAX_BUFFERED_BYTES, len
                    ))
                    .into());
                }
                Ok(None)
            }
            Some(Err(e)) => {
                self.buf.clear();
                Err(e.into())
            }
            Some(Ok(value)) => {
                self.buf.advance(consumed);
                let record = serde_json::from_value(value)?;
                Ok(Some(record))
            }
        }
    }
}
