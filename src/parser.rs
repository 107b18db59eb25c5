//! Adapter between a byte range of an input file and the structural parser.
//!
//! [`ParserEngineClient::parse`] opens the range through
//! [`crate::io::split::SplitReader`], hands every owned record to a
//! [`ParserEngine`], and exposes the result as a lazy, single-pass
//! [`RowIterator`]. The parser engine is pluggable; [`JsonLineEngine`] is the
//! built-in one.
//!
//! # Stream release
//!
//! The iterator owns the open file. It is released exactly once, on the first
//! of:
//! - exhaustion,
//! - the first error (the iterator is fused afterwards),
//! - [`RowIterator::close`] or drop,
//! - [`ReleaseHandle::release`], which the read path registers as a task
//!   completion listener so an abandoned task still frees its stream.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::debug;
use serde::de::IgnoredAny;

use crate::config::{JobConf, keys};
use crate::error::{SparserError, SparserResult};
use crate::io::split::SplitReader;
use crate::row::Row;

/// What the engine knows about the record it is asked to parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseContext {
    pub path: PathBuf,
    /// Byte offset of the record within the file.
    pub offset: u64,
    /// Filter expression pushed down by the planner, verbatim.
    pub filters: String,
    /// Projection list pushed down by the planner, verbatim.
    pub projections: String,
    pub engine_port: Option<u16>,
}

impl ParseContext {
    pub fn parse_error(&self, message: impl fmt::Display) -> SparserError {
        SparserError::Parse {
            path: self.path.clone(),
            offset: self.offset,
            message: message.to_string(),
        }
    }
}

/// A structural parser turning one raw record into a row.
///
/// Returning `Ok(None)` drops the record, which is how an engine applies the
/// pushed-down filter. Malformed input must be reported as an error; the read
/// task fails on the first one.
pub trait ParserEngine: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn parse_record(&self, record: &[u8], ctx: &ParseContext) -> SparserResult<Option<Row>>;
}

/// Validates each record as exactly one JSON value and emits its raw text.
///
/// Pushdown strings are not interpreted.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLineEngine;

impl ParserEngine for JsonLineEngine {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn parse_record(&self, record: &[u8], ctx: &ParseContext) -> SparserResult<Option<Row>> {
        let text = std::str::from_utf8(record).map_err(|e| ctx.parse_error(e))?;
        serde_json::from_str::<IgnoredAny>(text).map_err(|e| ctx.parse_error(e))?;
        Ok(Some(Row::text(text)))
    }
}

/// Reader settings taken from the broadcast job configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadSettings {
    pub buffer_size: usize,
    pub max_record_bytes: usize,
    pub engine_port: Option<u16>,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            max_record_bytes: 64 * 1024 * 1024,
            engine_port: None,
        }
    }
}

impl ReadSettings {
    /// # Errors
    /// Returns [`SparserError::InvalidOption`] for malformed or zero sizes.
    pub fn from_conf(conf: &JobConf) -> SparserResult<Self> {
        let defaults = Self::default();
        let buffer_size = conf
            .get_parsed::<usize>(keys::READ_BUFFER_SIZE)?
            .unwrap_or(defaults.buffer_size);
        let max_record_bytes = conf
            .get_parsed::<usize>(keys::MAX_RECORD_BYTES)?
            .unwrap_or(defaults.max_record_bytes);
        if buffer_size == 0 {
            return Err(SparserError::invalid(format!(
                "{} must be positive",
                keys::READ_BUFFER_SIZE
            )));
        }
        if max_record_bytes == 0 {
            return Err(SparserError::invalid(format!(
                "{} must be positive",
                keys::MAX_RECORD_BYTES
            )));
        }
        Ok(Self {
            buffer_size,
            max_record_bytes,
            engine_port: conf.get_parsed::<u16>(keys::ENGINE_PORT)?,
        })
    }
}

/// Invokes a [`ParserEngine`] over byte ranges of input files.
#[derive(Clone, Debug)]
pub struct ParserEngineClient {
    engine: Arc<dyn ParserEngine>,
    settings: ReadSettings,
    filters: String,
    projections: String,
}

impl ParserEngineClient {
    pub fn new(
        engine: Arc<dyn ParserEngine>,
        conf: &JobConf,
        filters: impl Into<String>,
        projections: impl Into<String>,
    ) -> SparserResult<Self> {
        Ok(Self {
            engine,
            settings: ReadSettings::from_conf(conf)?,
            filters: filters.into(),
            projections: projections.into(),
        })
    }

    pub fn settings(&self) -> &ReadSettings {
        &self.settings
    }

    /// Parse the records owned by `[offset, offset + length)` of `path`.
    ///
    /// The file is opened eagerly, so a missing file or an unsplittable range
    /// fails here rather than on the first row.
    pub fn parse(&self, path: &Path, offset: u64, length: u64) -> SparserResult<RowIterator> {
        let reader = SplitReader::open(
            path,
            offset,
            length,
            self.settings.buffer_size,
            self.settings.max_record_bytes,
        )?;
        debug!(
            "Parsing {} bytes {offset}..{} with engine {}",
            path.display(),
            offset.saturating_add(length),
            self.engine.name()
        );
        let ctx = ParseContext {
            path: path.to_path_buf(),
            offset,
            filters: self.filters.clone(),
            projections: self.projections.clone(),
            engine_port: self.settings.engine_port,
        };
        Ok(RowIterator {
            source: Arc::new(Mutex::new(Some(reader))),
            engine: Arc::clone(&self.engine),
            ctx,
            drop_columns: false,
            rows: 0,
        })
    }
}

/// Lazy, single-pass sequence of rows parsed from one byte range.
pub struct RowIterator {
    source: Arc<Mutex<Option<SplitReader>>>,
    engine: Arc<dyn ParserEngine>,
    ctx: ParseContext,
    drop_columns: bool,
    rows: u64,
}

impl RowIterator {
    /// Emit column-less rows, for hosts that need no columns (e.g. `count(*)`).
    /// Records are still parsed and validated.
    pub fn without_columns(mut self) -> Self {
        self.drop_columns = true;
        self
    }

    /// A handle that releases the underlying stream from outside the iterator.
    pub fn release_handle(&self) -> ReleaseHandle {
        ReleaseHandle(Arc::downgrade(&self.source))
    }

    /// Release the underlying stream. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        let released = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if released {
            debug!(
                "Released {} after {} rows",
                self.ctx.path.display(),
                self.rows
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn next_row(&mut self) -> SparserResult<Option<Row>> {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(reader) = source.as_mut() else {
            return Ok(None);
        };
        while let Some((offset, record)) = reader.next_record()? {
            if record.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.ctx.offset = offset;
            if let Some(row) = self.engine.parse_record(record, &self.ctx)? {
                self.rows += 1;
                return Ok(Some(if self.drop_columns { Row::empty() } else { row }));
            }
        }
        Ok(None)
    }
}

impl Iterator for RowIterator {
    type Item = SparserResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.close();
                None
            }
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

impl fmt::Debug for RowIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowIterator")
            .field("path", &self.ctx.path)
            .field("engine", &self.engine.name())
            .field("rows", &self.rows)
            .finish()
    }
}

/// Releases the stream of a [`RowIterator`] without owning the iterator.
#[derive(Clone, Debug)]
pub struct ReleaseHandle(Weak<Mutex<Option<SplitReader>>>);

impl ReleaseHandle {
    /// Returns `true` if this call released the stream.
    pub fn release(&self) -> bool {
        self.0.upgrade().is_some_and(|source| {
            source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .is_some()
        })
    }
}
