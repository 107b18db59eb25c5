//! Line-oriented text output for write jobs.
//!
//! Every row becomes one line holding the UTF-8 text of its first column
//! (nothing for null) followed by `\n`. Output is compressed when the job
//! configuration prepared by `prepare_write` asks for it.

use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::config::{JobConf, keys};
use crate::error::{SparserError, SparserResult};
use crate::host::{OutputWriter, OutputWriterFactory};
use crate::io::compression::{CompressionCodec, FinishWrite, Uncompressed, codec_for_name};
use crate::row::Row;
use crate::schema::Schema;

/// Extension of every output file, before any codec suffix.
pub const TEXT_EXTENSION: &str = ".txt";

/// The codec requested by `conf`, if output compression is on.
fn output_codec(conf: &JobConf) -> SparserResult<Option<Arc<dyn CompressionCodec>>> {
    if !conf.get_bool(keys::OUTPUT_COMPRESS)? {
        return Ok(None);
    }
    let name = conf
        .get(keys::OUTPUT_COMPRESSION_CODEC)
        .ok_or_else(|| SparserError::missing(keys::OUTPUT_COMPRESSION_CODEC))?;
    codec_for_name(name)
}

/// Writes the rows of one output partition to a single file.
pub struct TextOutputWriter {
    path: PathBuf,
    out: Box<dyn FinishWrite>,
    rows: u64,
}

impl TextOutputWriter {
    /// Create `path`, along with any missing parent directories.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown or missing codec, or an
    /// I/O error if the file cannot be created.
    pub fn new(path: impl AsRef<Path>, conf: &JobConf) -> SparserResult<Self> {
        let path = path.as_ref();
        let codec = output_codec(conf)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(path)?);
        let out: Box<dyn FinishWrite> = match &codec {
            Some(codec) => codec.wrap_writer(Box::new(file))?,
            None => Box::new(Uncompressed(file)),
        };
        debug!(
            "Writing {} ({})",
            path.display(),
            codec.as_ref().map_or("uncompressed", |c| c.name())
        );
        Ok(Self {
            path: path.to_path_buf(),
            out,
            rows: 0,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }
}

impl OutputWriter for TextOutputWriter {
    fn write(&mut self, row: &Row) -> SparserResult<()> {
        if let Some(value) = row.get_str(0) {
            self.out.write_all(value.as_bytes())?;
        }
        self.out.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> SparserResult<()> {
        let Self { path, out, rows } = *self;
        out.finish()?;
        debug!("Closed {} after {rows} rows", path.display());
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Factory returned by `prepare_write`; creates one writer per output partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextOutputWriterFactory;

impl OutputWriterFactory for TextOutputWriterFactory {
    fn file_extension(&self, conf: &JobConf) -> SparserResult<String> {
        let suffix = output_codec(conf)?
            .map(|codec| codec.default_extension().to_string())
            .unwrap_or_default();
        Ok(format!("{TEXT_EXTENSION}{suffix}"))
    }

    fn new_instance(
        &self,
        path: &Path,
        _data_schema: &Schema,
        conf: &JobConf,
    ) -> SparserResult<Box<dyn OutputWriter>> {
        Ok(Box::new(TextOutputWriter::new(path, conf)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_without_compression() {
        let factory = TextOutputWriterFactory;
        assert_eq!(factory.file_extension(&JobConf::new()).unwrap(), ".txt");

        let mut conf = JobConf::new();
        conf.set(keys::OUTPUT_COMPRESS, false);
        conf.set(keys::OUTPUT_COMPRESSION_CODEC, "gzip");
        assert_eq!(factory.file_extension(&conf).unwrap(), ".txt");
    }

    #[test]
    fn test_compression_without_codec_is_rejected() {
        let mut conf = JobConf::new();
        conf.set(keys::OUTPUT_COMPRESS, true);
        let err = TextOutputWriterFactory.file_extension(&conf).unwrap_err();
        assert!(matches!(err, SparserError::MissingOption(_)));
    }
}
