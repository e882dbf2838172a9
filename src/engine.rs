//! Engine
//!
//! An ordered collection of segments (oldest to newest). The last segment
//! is always the active, writable one; everything before it is frozen and
//! read-only from the engine's perspective. `put` routes to the active
//! segment, rolling over when it grows past the configured threshold and
//! triggering compaction once enough frozen segments have piled up. `get`
//! scans newest to oldest so the most recent write for a key always wins.

use std::path::PathBuf;

use crate::compactor;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::segment::Segment;

/// A durable, append-only key-value storage engine.
pub struct Engine {
    dir: PathBuf,
    prefix: String,
    segment_size_threshold: u64,
    compaction_threshold: usize,
    fsync: bool,
    next_segment_number: u64,
    segments: Vec<Segment>,
}

impl Engine {
    /// Open (or create) an engine rooted at `config.dir`.
    ///
    /// If the directory is empty, a fresh segment numbered 1 is created. If
    /// it already contains files, every name is validated against
    /// `<prefix><n>`; any non-matching file aborts open with
    /// [`Error::UnknownFile`]. Matching files are opened in lexicographic
    /// filename order, replaying each one's contents to rebuild its index.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.dir)?;

        let mut names: Vec<String> = std::fs::read_dir(&config.dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();

        let mut segments = Vec::new();
        let mut next_segment_number: u64 = 0;

        if names.is_empty() {
            next_segment_number = 1;
            let path = config.dir.join(format!("{}{}", config.prefix, next_segment_number));
            segments.push(Segment::open(path, config.fsync).await?);
        } else {
            for name in &names {
                let n = parse_segment_number(name, &config.prefix).ok_or_else(|| Error::UnknownFile(name.clone()))?;
                segments.push(Segment::open(config.dir.join(name), config.fsync).await?);
                next_segment_number = next_segment_number.max(n);
            }
        }

        Ok(Self {
            dir: config.dir,
            prefix: config.prefix,
            segment_size_threshold: config.segment_size_threshold,
            compaction_threshold: config.compaction_threshold,
            fsync: config.fsync,
            next_segment_number,
            segments,
        })
    }

    /// Store `value` under `key` with the `"string"` type tag.
    pub async fn put(&mut self, key: &str, value: &str) -> Result<()> {
        self.put_typed(key, "string", value).await
    }

    /// Store `value` under `key` with the `"int64"` type tag (base-10 text).
    pub async fn put_int64(&mut self, key: &str, value: i64) -> Result<()> {
        self.put_typed(key, "int64", &value.to_string()).await
    }

    /// Fetch the value stored under `key`, requiring it to carry the
    /// `"string"` type tag.
    pub async fn get(&self, key: &str) -> Result<String> {
        let (value, value_type) = self.get_typed(key).await?;
        if value_type != "string" {
            return Err(Error::TypeMismatch);
        }
        Ok(value)
    }

    /// Fetch the value stored under `key`, requiring it to carry the
    /// `"int64"` type tag, and parse it back into an `i64`.
    pub async fn get_int64(&self, key: &str) -> Result<i64> {
        let (value, value_type) = self.get_typed(key).await?;
        if value_type != "int64" {
            return Err(Error::TypeMismatch);
        }
        value.parse::<i64>().map_err(|_| Error::TypeMismatch)
    }

    /// Fetch the raw value and type tag stored under `key`, scanning
    /// segments from newest to oldest.
    pub async fn get_typed(&self, key: &str) -> Result<(String, String)> {
        for segment in self.segments.iter().rev() {
            match segment.get(key).await {
                Ok(hit) => return Ok(hit),
                Err(Error::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::NotFound)
    }

    /// Close every segment's writer task and file handle.
    pub async fn close(&self) -> Result<()> {
        for segment in &self.segments {
            segment.close().await?;
        }
        Ok(())
    }

    /// Number of segment files currently tracked by the engine.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// `(path, size)` for every segment, oldest to newest, for operational
    /// visibility (used by the CLI's `stats` command).
    pub fn segment_sizes(&self) -> Result<Vec<(PathBuf, u64)>> {
        self.segments.iter().map(|s| Ok((s.path.clone(), s.size()?))).collect()
    }

    async fn put_typed(&mut self, key: &str, value_type: &str, value: &str) -> Result<()> {
        let current_size = {
            let active = self.segments.last().expect("engine always has an active segment");
            active.size()?
        };

        if current_size <= self.segment_size_threshold {
            let active = self.segments.last().expect("engine always has an active segment");
            active.put(key, value_type, value).await?;
            return Ok(());
        }

        self.roll_over().await?;
        {
            let active = self.segments.last().expect("engine always has an active segment");
            active.put(key, value_type, value).await?;
        }

        let frozen_count = self.segments.len() - 1;
        if frozen_count >= self.compaction_threshold {
            self.compact_prefix(frozen_count).await?;
        }

        Ok(())
    }

    async fn roll_over(&mut self) -> Result<()> {
        self.next_segment_number += 1;
        let path = self.dir.join(format!("{}{}", self.prefix, self.next_segment_number));
        let segment = Segment::open(path, self.fsync).await?;
        tracing::debug!(segment_number = self.next_segment_number, "rolled over to new active segment");
        self.segments.push(segment);
        Ok(())
    }

    /// Merge the first `frozen_count` segments into one, named `<prefix>0`
    /// so it sorts before any roll-over-generated name. A compaction
    /// failure is surfaced unchanged and leaves the frozen segments
    /// untouched.
    async fn compact_prefix(&mut self, frozen_count: usize) -> Result<()> {
        let scratch_name = format!("{}-temp", self.segments[0].path.file_name().expect("segment path has a file name").to_string_lossy());
        let scratch_path = self.dir.join(scratch_name);

        let output = compactor::compact(&self.segments[0..frozen_count], scratch_path.clone(), self.fsync)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "compaction failed, frozen segments left untouched"))?;

        output.close().await?;

        // Close and delete the merged inputs before renaming the scratch
        // file into place. `<prefix>0` is a fixed name, and a prior
        // compaction's output can itself be one of these inputs on a later
        // round, so the old file must be gone first rather than asserted
        // absent, or the rename would collide with a file this same
        // segment is about to delete.
        let remaining = self.segments.split_off(frozen_count);
        let old_frozen = std::mem::replace(&mut self.segments, remaining);
        for segment in &old_frozen {
            segment.close().await?;
            segment.delete()?;
        }

        let final_path = self.dir.join(format!("{}0", self.prefix));
        std::fs::rename(&scratch_path, &final_path)?;
        let merged = Segment::open(final_path, self.fsync).await?;
        self.segments.insert(0, merged);

        tracing::debug!(merged_segments = frozen_count, "compacted frozen segments");
        Ok(())
    }
}

/// Parse `<prefix><digits>` into the trailing decimal number, rejecting
/// anything else (including a leading sign or non-digit characters).
fn parse_segment_number(name: &str, prefix: &str) -> Option<u64> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse::<u64>().ok()
}
