//! Transport wrapper that ships a configuration object to remote workers.
//!
//! The distribution channel only has a well defined failure path for I/O
//! errors, so every failure while encoding or decoding is logged and surfaced
//! as a [`std::io::Error`]. Errors that already are I/O errors keep their kind;
//! anything else is wrapped with [`std::io::Error::other`].
//!
//! Frame layout:
//!
//! | bytes | content |
//! |-------|---------|
//! | 4     | magic `SPBC` |
//! | 1     | frame version |
//! | 32    | SHA-256 of the payload |
//! | rest  | payload written by [`Writable::write_fields`] |

use std::fmt;
use std::io::{self, Read};

use log::error;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::config::{JobConf, Writable};
use crate::error::{SparserError, SparserResult};

const MAGIC: &[u8; 4] = b"SPBC";
const VERSION: u8 = 1;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 1 + DIGEST_LEN;

/// A configuration value that is read-only once it has been distributed.
///
/// The driver builds one instance per query; each worker holds its own copy,
/// decoded into a freshly constructed `C`.
#[derive(Clone, Debug)]
pub struct BroadcastConfig<C = JobConf> {
    value: C,
}

impl<C: Writable + Default> BroadcastConfig<C> {
    pub fn new(value: C) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &C {
        &self.value
    }

    pub fn into_inner(self) -> C {
        self.value
    }

    /// Encode the wrapped configuration into a self-verifying frame.
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        try_or_io_error("serializing", || self.encode())
    }

    /// Decode a frame produced by [`BroadcastConfig::serialize`].
    pub fn deserialize(bytes: &[u8]) -> io::Result<Self> {
        try_or_io_error("deserializing", || Self::decode(bytes))
    }

    fn encode(&self) -> SparserResult<Vec<u8>> {
        let mut payload = Vec::new();
        self.value.write_fields(&mut payload)?;
        let digest = Sha256::digest(&payload);

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(MAGIC);
        frame.push(VERSION);
        frame.extend_from_slice(&digest);
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    fn decode(bytes: &[u8]) -> SparserResult<Self> {
        let mut input = bytes;
        let mut header = [0u8; HEADER_LEN];
        input.read_exact(&mut header)?;

        if header[..MAGIC.len()] != MAGIC[..] {
            return Err(SparserError::corrupt("bad magic"));
        }
        let version = header[MAGIC.len()];
        if version != VERSION {
            return Err(SparserError::corrupt(format!(
                "unsupported frame version {version}"
            )));
        }
        if Sha256::digest(input).as_slice() != &header[MAGIC.len() + 1..] {
            return Err(SparserError::corrupt("payload digest mismatch"));
        }

        let mut value = C::default();
        value.read_fields(&mut input)?;
        if !input.is_empty() {
            return Err(SparserError::corrupt(format!(
                "{} trailing bytes after payload",
                input.len()
            )));
        }
        Ok(Self { value })
    }
}

/// Run `f`, logging any failure once and converting it into an I/O error.
fn try_or_io_error<T>(action: &str, f: impl FnOnce() -> SparserResult<T>) -> io::Result<T> {
    f().map_err(|e| match e {
        SparserError::Io(e) => {
            error!("I/O failure while {action} broadcast configuration: {e}");
            e
        }
        other => {
            error!("Failure while {action} broadcast configuration: {other}");
            io::Error::other(other)
        }
    })
}

impl<C: Writable + Default> Serialize for BroadcastConfig<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let frame = try_or_io_error("serializing", || self.encode())
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_bytes(&frame)
    }
}

impl<'de, C: Writable + Default> Deserialize<'de> for BroadcastConfig<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let frame = deserializer.deserialize_byte_buf(FrameVisitor)?;
        try_or_io_error("deserializing", || Self::decode(&frame)).map_err(de::Error::custom)
    }
}

struct FrameVisitor;

impl<'de> Visitor<'de> for FrameVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a broadcast configuration frame")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut frame = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            frame.push(byte);
        }
        Ok(frame)
    }
}
