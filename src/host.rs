//! The contract between a file format and the query engine that hosts it.
//!
//! The host lists and partitions input files, schedules one read task per
//! [`PartitionedFile`] and one write task per output partition, and owns
//! retries. A format plugs in by implementing [`FileFormat`]; the host calls:
//!
//! - [`FileFormat::infer_schema`] while planning a scan,
//! - [`FileFormat::build_reader`] once per query, then the returned
//!   [`ReadFunction`] once per partitioned file on some worker,
//! - [`FileFormat::prepare_write`] once per write job, then
//!   [`OutputWriterFactory::new_instance`] once per output partition.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::JobConf;
use crate::error::SparserResult;
use crate::options::CaseInsensitiveMap;
use crate::parser::RowIterator;
use crate::row::Row;
use crate::schema::Schema;

/// A contiguous byte range of one file, read by exactly one task.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PartitionedFile {
    pub file_path: PathBuf,
    pub start: u64,
    pub length: u64,
}

impl PartitionedFile {
    pub fn new(file_path: impl Into<PathBuf>, start: u64, length: u64) -> Self {
        Self {
            file_path: file_path.into(),
            start,
            length,
        }
    }
}

impl fmt::Display for PartitionedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, range: {}-{}",
            self.file_path.display(),
            self.start,
            self.start.saturating_add(self.length)
        )
    }
}

/// A listed input file, as handed to schema inference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub len: u64,
}

type CompletionListener = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ListenerState {
    completed: bool,
    listeners: Vec<CompletionListener>,
}

/// Per-task state owned by the host.
///
/// Completion listeners run exactly once, in reverse registration order, when
/// the host marks the task completed (successfully or not). A context dropped
/// without being marked, e.g. after a speculative attempt is killed, runs them
/// on drop.
pub struct TaskContext {
    partition_id: usize,
    attempt_number: u32,
    state: Mutex<ListenerState>,
}

impl TaskContext {
    pub fn new(partition_id: usize, attempt_number: u32) -> Self {
        Self {
            partition_id,
            attempt_number,
            state: Mutex::new(ListenerState::default()),
        }
    }

    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    /// Register `listener` to run when the task completes. A listener added to
    /// an already completed task runs immediately.
    pub fn add_task_completion_listener<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.completed {
            drop(state);
            listener();
        } else {
            state.listeners.push(Box::new(listener));
        }
    }

    pub fn mark_task_completed(&self) {
        let listeners = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.completed {
                return;
            }
            state.completed = true;
            std::mem::take(&mut state.listeners)
        };
        for listener in listeners.into_iter().rev() {
            listener();
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        self.mark_task_completed();
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("partition_id", &self.partition_id)
            .field("attempt_number", &self.attempt_number)
            .finish()
    }
}

/// Per-file read function returned by [`FileFormat::build_reader`].
pub type ReadFunction =
    Arc<dyn Fn(&PartitionedFile, &TaskContext) -> SparserResult<RowIterator> + Send + Sync>;

/// Arguments of [`FileFormat::build_reader`].
#[derive(Clone, Copy, Debug)]
pub struct ReaderArgs<'a> {
    pub data_schema: &'a Schema,
    pub partition_schema: &'a Schema,
    /// Columns the host actually needs; may be empty (e.g. for `count(*)`).
    pub required_schema: &'a Schema,
    pub options: &'a CaseInsensitiveMap,
    pub conf: &'a JobConf,
}

/// Sink for the rows of one output partition.
pub trait OutputWriter: Send {
    fn write(&mut self, row: &Row) -> SparserResult<()>;

    /// Flush and release the output stream. Consuming `self` makes a second
    /// close impossible.
    fn close(self: Box<Self>) -> SparserResult<()>;

    fn path(&self) -> &Path;
}

pub trait OutputWriterFactory: Send + Sync {
    /// Extension, leading dot included, appended to every output file name.
    fn file_extension(&self, conf: &JobConf) -> SparserResult<String>;

    fn new_instance(
        &self,
        path: &Path,
        data_schema: &Schema,
        conf: &JobConf,
    ) -> SparserResult<Box<dyn OutputWriter>>;
}

/// A file format the host can read and write.
pub trait FileFormat: Send + Sync + fmt::Debug {
    /// Stable name the format is registered under.
    fn short_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Whether `other` behaves identically to `self`.
    fn format_eq(&self, other: &dyn FileFormat) -> bool;

    fn infer_schema(
        &self,
        options: &CaseInsensitiveMap,
        files: &[FileStatus],
    ) -> SparserResult<Option<Schema>>;

    fn prepare_write(
        &self,
        job: &mut JobConf,
        options: &CaseInsensitiveMap,
        data_schema: &Schema,
    ) -> SparserResult<Arc<dyn OutputWriterFactory>>;

    fn build_reader(&self, args: ReaderArgs<'_>) -> SparserResult<ReadFunction>;

    /// Whether the host may split `path` into several partitioned files.
    fn is_splittable(&self, _options: &CaseInsensitiveMap, _path: &Path) -> bool {
        false
    }
}

impl PartialEq for dyn FileFormat {
    fn eq(&self, other: &Self) -> bool {
        self.format_eq(other)
    }
}
