//! # Sparser
//!
//! A **pluggable file format** that lets a distributed query engine read
//! line-oriented raw data through an external structural parser and write rows
//! back out as (optionally compressed) text.
//!
//! ## Key Features
//!
//! - **Byte-range reads** - each task parses exactly the records whose first byte
//!   falls inside its range, so the splits of a file cover every record once
//! - **Pluggable parser engine** - implement [`ParserEngine`]; [`JsonLineEngine`] is built in
//! - **Verbatim pushdown** - filter and projection strings are forwarded to the engine untouched
//! - **Compressed I/O** - gzip, deflate, zstd, bzip2 and xz (all optional via feature flags)
//! - **Configuration broadcast** - [`BroadcastConfig`] ships the job configuration to
//!   workers as a self-verifying frame
//! - **Guaranteed release** - open streams are released on exhaustion, on error, on drop,
//!   or when the host completes the task
//!
//! ## Quick Start
//!
//! ```no_run
//! use sparser::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let format = SparserFileFormat::default();
//! let options: CaseInsensitiveMap =
//!     [("filters", "status = 200"), ("projections", "path")].into_iter().collect();
//! let schema = value_schema();
//!
//! let read = format.build_reader(ReaderArgs {
//!     data_schema: &schema,
//!     partition_schema: &Schema::empty(),
//!     required_schema: &schema,
//!     options: &options,
//!     conf: &JobConf::new(),
//! })?;
//!
//! let task = TaskContext::new(0, 0);
//! for row in read(&PartitionedFile::new("logs/part-00000.jsonl", 0, 4096), &task)? {
//!     println!("{:?}", row?.get_str(0));
//! }
//! task.mark_task_completed();
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### The host contract
//!
//! The [`host`] module holds the traits and types a query engine and a file
//! format share: [`FileFormat`], [`OutputWriterFactory`], [`OutputWriter`],
//! [`PartitionedFile`] and [`TaskContext`]. [`SparserFileFormat`] implements
//! [`FileFormat`] under the short name `sparser`.
//!
//! ### Reading
//!
//! [`FileFormat::build_reader`] runs once per query. It copies the job
//! configuration into a [`BroadcastConfig`] and returns a [`ReadFunction`] that
//! the host calls once per partitioned file. Each call yields a lazy
//! [`RowIterator`] with one `value` column holding the raw record text.
//!
//! ### Writing
//!
//! [`FileFormat::prepare_write`] records the output codec in the [`JobConf`]
//! and returns a [`TextOutputWriterFactory`]. Every row becomes one line; output
//! files are named `.txt` plus the codec extension (e.g. `.txt.gz`).
//!
//! ## Options
//!
//! Option keys are case-insensitive:
//!
//! | key           | meaning                                              |
//! |---------------|------------------------------------------------------|
//! | `compression` | output codec (`gzip`, `deflate`, `zstd`, ... or `none`) |
//! | `filters`     | filter expression forwarded to the parser (required for reads) |
//! | `projections` | projection list forwarded to the parser (required for reads) |
//! | `port`        | parser engine port                                   |
//!
//! ## Feature Flags
//!
//! - `parallel-io` (default) - parallel read and write tasks in [`testing::LocalSession`]
//! - `compression-gzip`, `compression-deflate`, `compression-zstd`,
//!   `compression-bzip2`, `compression-xz` (all default) - output and input codecs
//!
//! ## Testing
//!
//! [`testing::LocalSession`] is a small in-process host that lists, splits,
//! reads and writes files through any [`FileFormat`].

pub mod broadcast;
pub mod config;
pub mod error;
pub mod format;
pub mod host;
pub mod io;
pub mod options;
pub mod parser;
pub mod read;
pub mod row;
pub mod schema;
pub mod testing;
pub mod writer;

// General re-exports
pub use broadcast::BroadcastConfig;
pub use config::{JobConf, Writable};
pub use error::{SparserError, SparserResult};
pub use format::SparserFileFormat;
pub use host::{
    FileFormat, FileStatus, OutputWriter, OutputWriterFactory, PartitionedFile, ReadFunction,
    ReaderArgs, TaskContext,
};
pub use options::{CaseInsensitiveMap, FormatOptions};
pub use parser::{
    JsonLineEngine, ParseContext, ParserEngine, ParserEngineClient, ReadSettings, ReleaseHandle,
    RowIterator,
};
pub use read::ReadTaskFactory;
pub use row::Row;
pub use schema::{DataType, Field, Schema, value_schema};
pub use writer::{TextOutputWriter, TextOutputWriterFactory};
