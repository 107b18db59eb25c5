//! Job-wide configuration object.
//!
//! [`JobConf`] is the mutable key/value configuration the host hands to
//! `prepare_write` and `build_reader`. It is shipped to workers through
//! [`crate::broadcast::BroadcastConfig`], which relies on the [`Writable`]
//! contract to move its fields across the wire.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::error::{SparserError, SparserResult};

/// Configuration keys understood by this crate.
pub mod keys {
    /// `"true"` when output files are compressed.
    pub const OUTPUT_COMPRESS: &str = "sparser.output.compress";
    /// Canonical name of the output compression codec.
    pub const OUTPUT_COMPRESSION_CODEC: &str = "sparser.output.compress.codec";
    /// Buffer size of the reader placed over each input range.
    pub const READ_BUFFER_SIZE: &str = "sparser.read.buffer.size";
    /// Records longer than this fail the read task.
    pub const MAX_RECORD_BYTES: &str = "sparser.read.max.record.bytes";
    /// Port of the parser engine, copied from the `port` option.
    pub const ENGINE_PORT: &str = "sparser.engine.port";
}

/// Serialize and restore an object's fields through a byte stream.
pub trait Writable {
    fn write_fields(&self, out: &mut dyn Write) -> SparserResult<()>;

    /// Replace this object's fields with the ones read from `input`.
    fn read_fields(&mut self, input: &mut dyn Read) -> SparserResult<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobConf {
    entries: BTreeMap<String, String>,
}

impl JobConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parse the value stored under `key`.
    ///
    /// # Errors
    /// Returns [`SparserError::InvalidOption`] if the value does not parse as `T`.
    pub fn get_parsed<T>(&self, key: &str) -> SparserResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| SparserError::invalid(format!("{key}={raw:?}: {e}")))
            })
            .transpose()
    }

    pub fn get_bool(&self, key: &str) -> SparserResult<bool> {
        Ok(self.get_parsed::<bool>(key)?.unwrap_or(false))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.entries.insert(key.into(), value.to_string());
    }

    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JobConf {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// Fields are written as a little-endian u32 length followed by the postcard
// encoding of the entry map.
impl Writable for JobConf {
    fn write_fields(&self, out: &mut dyn Write) -> SparserResult<()> {
        let encoded = postcard::to_allocvec(&self.entries)?;
        let len = u32::try_from(encoded.len())
            .map_err(|_| SparserError::internal("configuration exceeds 4 GiB"))?;
        out.write_all(&len.to_le_bytes())?;
        out.write_all(&encoded)?;
        Ok(())
    }

    fn read_fields(&mut self, input: &mut dyn Read) -> SparserResult<()> {
        let mut len = [0u8; 4];
        input.read_exact(&mut len)?;
        let mut encoded = vec![0u8; u32::from_le_bytes(len) as usize];
        input.read_exact(&mut encoded)?;
        self.entries = postcard::from_bytes(&encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_parsed() {
        let mut conf = JobConf::new();
        conf.set(keys::READ_BUFFER_SIZE, 4096);
        conf.set(keys::OUTPUT_COMPRESS, "true");
        conf.set(keys::ENGINE_PORT, "abc");

        assert_eq!(conf.get_parsed::<usize>(keys::READ_BUFFER_SIZE).unwrap(), Some(4096));
        assert_eq!(conf.get_parsed::<usize>(keys::MAX_RECORD_BYTES).unwrap(), None);
        assert!(conf.get_bool(keys::OUTPUT_COMPRESS).unwrap());
        assert!(matches!(
            conf.get_parsed::<u16>(keys::ENGINE_PORT),
            Err(SparserError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_fields_round_trip() {
        let conf: JobConf = [("a", "1"), ("b", ""), ("ü", "ß")].into_iter().collect();
        let mut buf = Vec::new();
        conf.write_fields(&mut buf).unwrap();

        let mut restored = JobConf::new();
        restored.set("stale", "x");
        restored.read_fields(&mut buf.as_slice()).unwrap();
        assert_eq!(restored, conf);
        assert!(!restored.contains("stale"));
    }

    #[test]
    fn test_truncated_fields_are_io_errors() {
        let conf: JobConf = [("key", "value")].into_iter().collect();
        let mut buf = Vec::new();
        conf.write_fields(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);

        let err = JobConf::new().read_fields(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SparserError::Io(_)));
    }
}
