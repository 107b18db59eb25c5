//! A small in-process host for exercising file formats end to end.
//!
//! [`LocalSession`] plays the part of the query engine: it lists input files,
//! splits them into [`PartitionedFile`]s, runs one read task per split and one
//! write task per output partition, and drives the [`TaskContext`] lifecycle
//! the way a cluster scheduler would.
//!
//! # Quick Start
//!
//! ```no_run
//! use sparser::testing::LocalSession;
//! use sparser::{CaseInsensitiveMap, SparserFileFormat};
//!
//! # fn main() -> anyhow::Result<()> {
//! let session = LocalSession::new().with_max_split_bytes(1 << 20);
//! let format = SparserFileFormat::default();
//! let options: CaseInsensitiveMap = [("filters", ""), ("projections", "")].into_iter().collect();
//!
//! let rows = session.read(&format, "logs/*.jsonl", &options)?;
//! let written = session.write(&format, "out", &options, vec![rows])?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use crate::config::JobConf;
use crate::error::SparserResult;
use crate::host::{
    FileFormat, FileStatus, OutputWriterFactory, PartitionedFile, ReadFunction, ReaderArgs,
    TaskContext,
};
use crate::options::CaseInsensitiveMap;
use crate::row::Row;
use crate::schema::{Schema, value_schema};

/// In-process stand-in for a query engine.
#[derive(Clone, Debug)]
pub struct LocalSession {
    /// Job configuration handed to `build_reader` and copied by `prepare_write`.
    pub conf: JobConf,
    /// Upper bound on the length of one split of a splittable file.
    pub max_split_bytes: u64,
    /// Number of output partitions [`LocalSession::repartition`] produces by default.
    pub parallelism: usize,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self {
            conf: JobConf::new(),
            max_split_bytes: 128 * 1024 * 1024,
            parallelism: 2 * num_cpus::get().max(2),
        }
    }
}

impl LocalSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conf(mut self, conf: JobConf) -> Self {
        self.conf = conf;
        self
    }

    pub fn with_max_split_bytes(mut self, max_split_bytes: u64) -> Self {
        self.max_split_bytes = max_split_bytes.max(1);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Files matching `pattern`, sorted by path. Directories are skipped.
    ///
    /// # Errors
    /// Returns an error for an invalid pattern or an unreadable entry.
    pub fn list_files(&self, pattern: &str) -> Result<Vec<FileStatus>> {
        let entries =
            glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.with_context(|| format!("error reading glob entry for {pattern}"))?;
            let meta = std::fs::metadata(&path)
                .with_context(|| format!("stat {}", path.display()))?;
            if meta.is_file() {
                files.push(FileStatus {
                    path,
                    len: meta.len(),
                });
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Cut `files` into contiguous, non-overlapping byte ranges of at most
    /// `max_split_bytes`. Files the format cannot split become one range each.
    pub fn plan_splits(
        &self,
        format: &dyn FileFormat,
        options: &CaseInsensitiveMap,
        files: &[FileStatus],
    ) -> Vec<PartitionedFile> {
        let mut splits = Vec::new();
        for file in files {
            if !format.is_splittable(options, &file.path) {
                splits.push(PartitionedFile::new(&file.path, 0, file.len));
                continue;
            }
            let mut start = 0;
            while start < file.len {
                let length = self.max_split_bytes.min(file.len - start);
                splits.push(PartitionedFile::new(&file.path, start, length));
                start += length;
            }
        }
        splits
    }

    /// Read every file matching `pattern` with all columns.
    ///
    /// Rows come back in file order, then split order, then record order.
    pub fn read(
        &self,
        format: &dyn FileFormat,
        pattern: &str,
        options: &CaseInsensitiveMap,
    ) -> Result<Vec<Row>> {
        let files = self.list_files(pattern)?;
        let schema = format.infer_schema(options, &files)?.unwrap_or_else(value_schema);
        self.scan(format, &files, options, &schema, &schema)
    }

    /// Count the records of every file matching `pattern` without
    /// materialising any column.
    pub fn count(
        &self,
        format: &dyn FileFormat,
        pattern: &str,
        options: &CaseInsensitiveMap,
    ) -> Result<usize> {
        let files = self.list_files(pattern)?;
        let schema = format.infer_schema(options, &files)?.unwrap_or_else(value_schema);
        Ok(self
            .scan(format, &files, options, &schema, &Schema::empty())?
            .len())
    }

    fn scan(
        &self,
        format: &dyn FileFormat,
        files: &[FileStatus],
        options: &CaseInsensitiveMap,
        data_schema: &Schema,
        required_schema: &Schema,
    ) -> Result<Vec<Row>> {
        let read = format.build_reader(ReaderArgs {
            data_schema,
            partition_schema: &Schema::empty(),
            required_schema,
            options,
            conf: &self.conf,
        })?;
        let splits = self.plan_splits(format, options, files);
        debug!("Scanning {} files in {} splits", files.len(), splits.len());

        #[cfg(feature = "parallel-io")]
        let partitions = {
            use rayon::prelude::*;
            splits
                .par_iter()
                .enumerate()
                .map(|(i, split)| read_split(&read, i, split))
                .collect::<Result<Vec<_>>>()?
        };
        #[cfg(not(feature = "parallel-io"))]
        let partitions = splits
            .iter()
            .enumerate()
            .map(|(i, split)| read_split(&read, i, split))
            .collect::<Result<Vec<_>>>()?;

        Ok(partitions.into_iter().flatten().collect())
    }

    /// Spread `rows` round-robin over `parallelism` partitions.
    pub fn repartition(&self, rows: Vec<Row>) -> Vec<Vec<Row>> {
        let mut partitions = vec![Vec::new(); self.parallelism];
        for (i, row) in rows.into_iter().enumerate() {
            partitions[i % self.parallelism].push(row);
        }
        partitions
    }

    /// Write each partition to `dir/part-{i:05}{ext}` with the `value` schema.
    ///
    /// Returns the paths written, in partition order.
    pub fn write(
        &self,
        format: &dyn FileFormat,
        dir: impl AsRef<Path>,
        options: &CaseInsensitiveMap,
        partitions: Vec<Vec<Row>>,
    ) -> Result<Vec<PathBuf>> {
        self.write_with_schema(format, dir, options, &value_schema(), partitions)
    }

    pub fn write_with_schema(
        &self,
        format: &dyn FileFormat,
        dir: impl AsRef<Path>,
        options: &CaseInsensitiveMap,
        schema: &Schema,
        partitions: Vec<Vec<Row>>,
    ) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut job = self.conf.clone();
        let factory = format.prepare_write(&mut job, options, schema)?;
        let extension = factory.file_extension(&job)?;
        let paths: Vec<PathBuf> = (0..partitions.len())
            .map(|i| dir.join(format!("part-{i:05}{extension}")))
            .collect();

        let write = |(i, rows): (usize, &Vec<Row>)| -> Result<()> {
            let task = TaskContext::new(i, 0);
            let result = write_partition(factory.as_ref(), &paths[i], schema, &job, rows);
            task.mark_task_completed();
            result
        };

        #[cfg(feature = "parallel-io")]
        {
            use rayon::prelude::*;
            partitions.par_iter().enumerate().try_for_each(write)?;
        }
        #[cfg(not(feature = "parallel-io"))]
        partitions.iter().enumerate().try_for_each(write)?;

        Ok(paths)
    }
}

fn read_split(read: &ReadFunction, partition_id: usize, split: &PartitionedFile) -> Result<Vec<Row>> {
    let task = TaskContext::new(partition_id, 0);
    let rows = read(split, &task).with_context(|| format!("open {split}"))?;
    let result = rows
        .collect::<SparserResult<Vec<_>>>()
        .with_context(|| format!("read {split}"));
    task.mark_task_completed();
    result
}

// The writer is closed even when a row fails, so the file handle never leaks.
fn write_partition(
    factory: &dyn OutputWriterFactory,
    path: &Path,
    schema: &Schema,
    job: &JobConf,
    rows: &[Row],
) -> Result<()> {
    let mut writer = factory
        .new_instance(path, schema, job)
        .with_context(|| format!("create {}", path.display()))?;
    let written = rows.iter().try_for_each(|row| writer.write(row));
    let closed = writer.close();
    written.with_context(|| format!("write {}", path.display()))?;
    closed.with_context(|| format!("close {}", path.display()))?;
    Ok(())
}
