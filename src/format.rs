//! The `sparser` file format as registered with the host.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::broadcast::BroadcastConfig;
use crate::config::{JobConf, keys};
use crate::error::{SparserError, SparserResult};
use crate::host::{FileFormat, FileStatus, OutputWriterFactory, ReadFunction, ReaderArgs};
use crate::io::compression::{codec_for_name, codec_for_path};
use crate::options::{CaseInsensitiveMap, FormatOptions};
use crate::parser::{JsonLineEngine, ParserEngine};
use crate::read::ReadTaskFactory;
use crate::schema::{Schema, value_schema};
use crate::writer::TextOutputWriterFactory;

/// Reads records through a [`ParserEngine`] and writes rows as text lines.
///
/// Every instance behaves the same regardless of the engine it carries, so
/// any two instances compare equal.
#[derive(Clone, Debug)]
pub struct SparserFileFormat {
    engine: Arc<dyn ParserEngine>,
}

impl SparserFileFormat {
    pub const SHORT_NAME: &'static str = "sparser";

    pub fn new(engine: Arc<dyn ParserEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn ParserEngine> {
        &self.engine
    }
}

impl Default for SparserFileFormat {
    fn default() -> Self {
        Self::new(Arc::new(JsonLineEngine))
    }
}

impl PartialEq for SparserFileFormat {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for SparserFileFormat {}

impl FileFormat for SparserFileFormat {
    fn short_name(&self) -> &'static str {
        Self::SHORT_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn format_eq(&self, other: &dyn FileFormat) -> bool {
        other.as_any().is::<SparserFileFormat>()
    }

    fn infer_schema(
        &self,
        _options: &CaseInsensitiveMap,
        _files: &[FileStatus],
    ) -> SparserResult<Option<Schema>> {
        Ok(Some(value_schema()))
    }

    fn prepare_write(
        &self,
        job: &mut JobConf,
        options: &CaseInsensitiveMap,
        data_schema: &Schema,
    ) -> SparserResult<Arc<dyn OutputWriterFactory>> {
        if data_schema.is_empty() {
            return Err(SparserError::invalid(
                "the sparser format writes one column and needs a non-empty schema",
            ));
        }
        let codec = match FormatOptions::new(options).compression_codec {
            Some(name) => codec_for_name(&name)?,
            None => None,
        };
        match codec {
            Some(codec) => {
                job.set(keys::OUTPUT_COMPRESS, true);
                job.set(keys::OUTPUT_COMPRESSION_CODEC, codec.name());
            }
            None => {
                job.set(keys::OUTPUT_COMPRESS, false);
                job.unset(keys::OUTPUT_COMPRESSION_CODEC);
            }
        }
        debug!("Prepared write of {data_schema}");
        Ok(Arc::new(TextOutputWriterFactory))
    }

    fn build_reader(&self, args: ReaderArgs<'_>) -> SparserResult<ReadFunction> {
        let mut conf = args.conf.clone();
        if let Some(port) = FormatOptions::new(args.options).port {
            conf.set(keys::ENGINE_PORT, port);
        }
        debug!(
            "Building reader for {} (partition columns: {}, required: {})",
            args.data_schema,
            args.partition_schema.len(),
            args.required_schema
        );
        let broadcast = Arc::new(BroadcastConfig::new(conf));
        Ok(ReadTaskFactory::new(broadcast, args.options.clone(), Arc::clone(&self.engine))
            .with_required_columns(args.required_schema.len())
            .build())
    }

    fn is_splittable(&self, _options: &CaseInsensitiveMap, path: &Path) -> bool {
        codec_for_path(path).is_none()
    }
}
