//! Segment management
//!
//! One append-only file plus its in-memory key -> offset index. A single
//! writer task owns the file's write end; callers reach it by sending an
//! encoded frame over an unbuffered channel and awaiting the result, which
//! serializes writers naturally and lets the caller update the index only
//! after the write is durable (modulo the OS page cache).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::record;

struct WriteRequest {
    frame: Vec<u8>,
    respond_to: oneshot::Sender<std::io::Result<usize>>,
}

struct IndexState {
    index: HashMap<String, u64>,
    write_offset: u64,
}

/// One append-only segment file and its in-memory index.
pub struct Segment {
    pub path: PathBuf,
    state: RwLock<IndexState>,
    write_tx: mpsc::Sender<WriteRequest>,
    cancel: Arc<Notify>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    fsync: bool,
}

impl Segment {
    /// Open an existing segment file or create it if missing, then replay
    /// its contents to rebuild the index.
    pub async fn open(path: PathBuf, fsync: bool) -> Result<Self> {
        create_if_missing(&path)?;

        let (index, write_offset) = recover(&path)?;

        let append_file = open_append(&path)?;
        let cancel = Arc::new(Notify::new());
        let (write_tx, write_rx) = mpsc::channel(1);

        let writer_task = tokio::spawn(writer_loop(append_file, write_rx, Arc::clone(&cancel), fsync));

        Ok(Self {
            path,
            state: RwLock::new(IndexState { index, write_offset }),
            write_tx,
            cancel,
            writer_task: Mutex::new(Some(writer_task)),
            fsync,
        })
    }

    /// Look up `key`, returning its value and type tag.
    pub async fn get(&self, key: &str) -> Result<(String, String)> {
        let offset = {
            let state = self.state.read().await;
            *state.index.get(key).ok_or(Error::NotFound)?
        };

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let (record, _len) = record::read_record(&mut file)?;
        Ok((record.value, record.value_type))
    }

    /// Append a new record, updating the index only once the write result
    /// is known. Holds the exclusive lock across send/await/update so the
    /// index never observes a write that hasn't actually landed.
    pub async fn put(&self, key: &str, value_type: &str, value: &str) -> Result<()> {
        let frame = record::encode(key, value_type, value);

        let mut state = self.state.write().await;

        let (tx, rx) = oneshot::channel();
        self.write_tx
            .send(WriteRequest { frame, respond_to: tx })
            .await
            .map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "segment writer task terminated")))?;

        let written = rx
            .await
            .map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "segment write cancelled")))??;

        let offset = state.write_offset;
        state.index.insert(key.to_string(), offset);
        state.write_offset = offset + written as u64;
        Ok(())
    }

    /// Current file size in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Snapshot of every key currently in this segment's index.
    pub async fn keys(&self) -> Vec<String> {
        self.state.read().await.index.keys().cloned().collect()
    }

    /// Cancel the writer task and close the file.
    pub async fn close(&self) -> Result<()> {
        self.cancel.notify_one();
        let handle = self.writer_task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Remove the underlying file. Caller guarantees no concurrent readers.
    pub fn delete(&self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

fn create_if_missing(path: &Path) -> Result<()> {
    if !path.exists() {
        open_append(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn open_append(path: &Path) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .map_err(Error::from)
}

#[cfg(not(unix))]
fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new().create(true).append(true).open(path).map_err(Error::from)
}

/// Replay a segment file sequentially from offset 0, rebuilding its index.
/// Keys repeated in the file end up mapped to their last-written offset,
/// since later entries simply overwrite earlier index entries during the
/// scan.
fn recover(path: &Path) -> Result<(HashMap<String, u64>, u64)> {
    let file_len = std::fs::metadata(path)?.len();
    let mut file = File::open(path)?;

    let mut index = HashMap::new();
    let mut offset: u64 = 0;

    while offset < file_len {
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf).map_err(|e| corrupted(path, e.to_string()))?;
        let total_size = u32::from_le_bytes(len_buf) as u64;

        if total_size < 4 || offset + total_size > file_len {
            return Err(corrupted(path, "declared frame size exceeds remaining bytes".into()));
        }

        let mut rest = vec![0u8; (total_size - 4) as usize];
        file.read_exact(&mut rest).map_err(|e| corrupted(path, e.to_string()))?;

        let mut frame = Vec::with_capacity(total_size as usize);
        frame.extend_from_slice(&len_buf);
        frame.extend_from_slice(&rest);
        let record = record::decode(&frame)?;

        index.insert(record.key, offset);
        offset += total_size;
    }

    Ok((index, offset))
}

fn corrupted(path: &Path, reason: String) -> Error {
    Error::CorruptedSegment { path: path.display().to_string(), reason }
}

async fn writer_loop(mut file: File, mut rx: mpsc::Receiver<WriteRequest>, cancel: Arc<Notify>, fsync: bool) {
    loop {
        tokio::select! {
            _ = cancel.notified() => {
                return;
            }
            maybe_req = rx.recv() => {
                let Some(req) = maybe_req else { return };
                let result = file.write_all(&req.frame).map(|_| req.frame.len());
                if result.is_ok() && fsync {
                    if let Err(e) = file.sync_all() {
                        // The frame is already appended to the file, so the
                        // caller's write_offset bookkeeping can no longer be
                        // trusted to match the file's real length. Stop the
                        // writer task instead of resuming with a desynced
                        // offset; subsequent puts see a closed channel and
                        // fail with a clear I/O error rather than silently
                        // corrupting the index.
                        let _ = req.respond_to.send(Err(e));
                        return;
                    }
                }
                let _ = req.respond_to.send(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let segment = Segment::open(dir.path().join("segment-1"), false).await.unwrap();

        segment.put("key1", "string", "value1").await.unwrap();
        let (value, value_type) = segment.get("key1").await.unwrap();
        assert_eq!(value, "value1");
        assert_eq!(value_type, "string");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let segment = Segment::open(dir.path().join("segment-1"), false).await.unwrap();
        let err = segment.get("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn later_put_for_same_key_overwrites_index() {
        let dir = tempdir().unwrap();
        let segment = Segment::open(dir.path().join("segment-1"), false).await.unwrap();

        segment.put("key1", "string", "v1").await.unwrap();
        segment.put("key1", "string", "v2").await.unwrap();
        let (value, _) = segment.get("key1").await.unwrap();
        assert_eq!(value, "v2");
    }

    #[tokio::test]
    async fn recovery_replays_existing_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment-1");

        {
            let segment = Segment::open(path.clone(), false).await.unwrap();
            segment.put("a", "string", "1").await.unwrap();
            segment.put("b", "string", "2").await.unwrap();
            segment.close().await.unwrap();
        }

        let reopened = Segment::open(path, false).await.unwrap();
        let (value, _) = reopened.get("b").await.unwrap();
        assert_eq!(value, "2");
    }

    #[tokio::test]
    async fn size_reflects_written_bytes() {
        let dir = tempdir().unwrap();
        let segment = Segment::open(dir.path().join("segment-1"), false).await.unwrap();
        assert_eq!(segment.size().unwrap(), 0);
        segment.put("a", "string", "1").await.unwrap();
        assert!(segment.size().unwrap() > 0);
    }

    #[tokio::test]
    async fn corrupted_segment_is_rejected_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment-1");

        {
            let segment = Segment::open(path.clone(), false).await.unwrap();
            segment.put("a", "string", "1").await.unwrap();
            segment.close().await.unwrap();
        }

        // Truncate the file mid-frame to simulate a crash during append.
        let full_len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - 1).unwrap();

        let err = Segment::open(path, false).await.unwrap_err();
        assert!(matches!(err, Error::CorruptedSegment { .. }));
    }
}
