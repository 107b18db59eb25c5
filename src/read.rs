//! Per-file read function handed to the host by `build_reader`.

use std::sync::Arc;

use log::debug;

use crate::broadcast::BroadcastConfig;
use crate::error::{SparserError, SparserResult};
use crate::host::{PartitionedFile, ReadFunction, TaskContext};
use crate::options::{CaseInsensitiveMap, FILTERS, PROJECTIONS};
use crate::parser::{ParserEngine, ParserEngineClient, RowIterator};

/// Builds the closure that parses one [`PartitionedFile`] on a worker.
///
/// The closure captures the broadcast configuration and the raw option map;
/// the pushdown strings are read from the map on every invocation and passed
/// to the engine untouched.
#[derive(Clone, Debug)]
pub struct ReadTaskFactory {
    broadcast: Arc<BroadcastConfig>,
    options: CaseInsensitiveMap,
    engine: Arc<dyn ParserEngine>,
    required_columns: Option<usize>,
}

impl ReadTaskFactory {
    pub fn new(
        broadcast: Arc<BroadcastConfig>,
        options: CaseInsensitiveMap,
        engine: Arc<dyn ParserEngine>,
    ) -> Self {
        Self {
            broadcast,
            options,
            engine,
            required_columns: None,
        }
    }

    /// Number of columns the host needs. Zero makes every row column-less.
    pub fn with_required_columns(mut self, columns: usize) -> Self {
        self.required_columns = Some(columns);
        self
    }

    /// Read one partitioned file within `task`.
    ///
    /// # Errors
    /// Returns [`SparserError::MissingOption`] when `filters` or `projections`
    /// is absent, and any error raised while opening the range.
    pub fn read(&self, file: &PartitionedFile, task: &TaskContext) -> SparserResult<RowIterator> {
        let filters = self
            .options
            .get(FILTERS)
            .ok_or_else(|| SparserError::missing(FILTERS))?;
        let projections = self
            .options
            .get(PROJECTIONS)
            .ok_or_else(|| SparserError::missing(PROJECTIONS))?;

        debug!(
            "Task {} (attempt {}) reading {file}",
            task.partition_id(),
            task.attempt_number()
        );
        let client = ParserEngineClient::new(
            Arc::clone(&self.engine),
            self.broadcast.value(),
            filters,
            projections,
        )?;
        let mut rows = client.parse(&file.file_path, file.start, file.length)?;
        if self.required_columns == Some(0) {
            rows = rows.without_columns();
        }

        let handle = rows.release_handle();
        task.add_task_completion_listener(move || {
            handle.release();
        });
        Ok(rows)
    }

    pub fn build(self) -> ReadFunction {
        Arc::new(move |file: &PartitionedFile, task: &TaskContext| self.read(file, task))
    }
}
