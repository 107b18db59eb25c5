//! Partition-local record splitting over a byte range of one file.
//!
//! Records are `\n`-terminated lines (a trailing `\r` is dropped). A record
//! belongs to the range that contains its first byte:
//!
//! - a reader starting at `offset > 0` discards everything up to and including
//!   the first `\n` at or after `offset - 1`, since that record started in the
//!   previous range;
//! - records are emitted while their first byte lies before `offset + length`,
//!   so the last one may run past the end of the range.
//!
//! Reading `[0, a)`, `[a, b)` and `[b, len)` of the same file therefore yields
//! every record exactly once.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{SparserError, SparserResult};
use crate::io::compression::codec_for_path;

/// Forward-only reader over the records owned by one byte range.
pub struct SplitReader {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    pos: u64,
    end: u64,
    max_record_bytes: usize,
    buf: Vec<u8>,
}

impl SplitReader {
    /// Open `[offset, offset + length)` of `path`.
    ///
    /// Files with a registered compression extension are decompressed and
    /// read whole; they can only be opened at offset 0, and a zero `length`
    /// yields no records.
    ///
    /// # Errors
    /// Returns [`SparserError::NotSupported`] for a compressed file opened at a
    /// non-zero offset, or an I/O error if the file cannot be opened.
    pub fn open(
        path: &Path,
        offset: u64,
        length: u64,
        buffer_size: usize,
        max_record_bytes: usize,
    ) -> SparserResult<Self> {
        let mut file = File::open(path)?;

        if let Some(codec) = codec_for_path(path) {
            if offset != 0 {
                return Err(SparserError::unsupported(format!(
                    "{} is {}-compressed and cannot be read from byte {offset}",
                    path.display(),
                    codec.name()
                )));
            }
            debug!("Reading {} through the {} codec", path.display(), codec.name());
            let reader = codec.wrap_reader(Box::new(file))?;
            return Ok(Self {
                path: path.to_path_buf(),
                reader: Box::new(BufReader::with_capacity(buffer_size, reader)),
                pos: 0,
                // An empty range owns no records; any other range owns the whole stream.
                end: if length == 0 { 0 } else { u64::MAX },
                max_record_bytes,
                buf: Vec::new(),
            });
        }

        let start = offset.saturating_sub(1);
        if start > 0 {
            file.seek(SeekFrom::Start(start))?;
        }
        let mut reader = BufReader::with_capacity(buffer_size, file);
        let mut pos = start;
        if offset > 0 {
            pos += reader.skip_until(b'\n')? as u64;
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader: Box::new(reader),
            pos,
            end: offset.saturating_add(length),
            max_record_bytes,
            buf: Vec::new(),
        })
    }

    /// Byte position of the next unread record in the (decompressed) file.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read the next owned record, returning its byte offset and contents
    /// without the line terminator.
    ///
    /// # Errors
    /// Returns [`SparserError::Parse`] for a record longer than the configured
    /// maximum, or any I/O error raised by the underlying stream.
    pub fn next_record(&mut self) -> SparserResult<Option<(u64, &[u8])>> {
        if self.pos >= self.end {
            return Ok(None);
        }
        self.buf.clear();
        // Room for the record, `\r` and `\n`.
        let limit = (self.max_record_bytes as u64).saturating_add(2);
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Ok(None);
        }

        let offset = self.pos;
        self.pos += read as u64;

        let terminated = self.buf.last() == Some(&b'\n');
        if terminated {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        if self.buf.len() > self.max_record_bytes || (!terminated && read as u64 == limit) {
            return Err(SparserError::Parse {
                path: self.path.clone(),
                offset,
                message: format!("record exceeds {} bytes", self.max_record_bytes),
            });
        }
        Ok(Some((offset, self.buf.as_slice())))
    }
}
