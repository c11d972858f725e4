//! JSONL Record Store
//!
//! Append-only file of classified messages, one JSON object per line, in
//! arrival order:
//!
//! ```text
//! {"seq":1,"received_at":"2025-01-01T00:00:00.000Z","message":{"event_type":"book",...}}
//! {"seq":2,"received_at":"2025-01-01T00:00:00.004Z","message":{"event_type":"unknown","reason":"invalid_json","raw":"..."}}
//! ```
//!
//! Each line is serialized in memory and handed to the buffered writer with a
//! single `write_all`. A crash can therefore only tear the final line; on
//! open, such a torn tail is cut back to the last complete line.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

use crate::application::ports::{RecordSink, SinkError};
use crate::infrastructure::clob::messages::InboundMessage;
use crate::infrastructure::metrics;

const TAIL_SCAN_CHUNK: u64 = 8 * 1024;

/// Buffered, append-only JSONL sink.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    flush_every: usize,
    pending: usize,
    written: u64,
}

impl JsonlSink {
    /// Open (or create) the record file for appending.
    ///
    /// Parent directories are created as needed. A partial trailing line is
    /// truncated before the first append.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, repaired, or opened.
    pub async fn open(path: impl AsRef<Path>, flush_every: usize) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let truncated = repair_torn_tail(&path).await?;
        if truncated > 0 {
            tracing::warn!(
                path = %path.display(),
                bytes = truncated,
                "Truncated partial trailing record"
            );
        }

        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        tracing::info!(path = %path.display(), "Record store opened");

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            flush_every: flush_every.max(1),
            pending: 0,
            written: 0,
        })
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this sink.
    #[must_use]
    pub const fn records_written(&self) -> u64 {
        self.written
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, SinkError> {
        self.writer.as_mut().ok_or(SinkError::Closed)
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn append(&mut self, record: &InboundMessage) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        self.writer()?.write_all(&line).await?;
        self.written += 1;
        self.pending += 1;
        metrics::record_persisted();

        if self.pending >= self.flush_every {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        if self.pending == 0 {
            return Ok(());
        }
        self.writer()?.flush().await?;
        self.pending = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        self.pending = 0;

        tracing::info!(
            path = %self.path.display(),
            records = self.written,
            "Record store closed"
        );
        Ok(())
    }
}

/// Cut the file back to its last newline. Returns the number of bytes removed.
async fn repair_torn_tail(path: &Path) -> Result<u64, SinkError> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut end = len;
    let mut buf = Vec::new();
    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let size = usize::try_from(end - start).unwrap_or(0);
        buf.resize(size, 0);
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut buf).await?;

        if let Some(pos) = buf.iter().rposition(|b| *b == b'\n') {
            let keep = start + pos as u64 + 1;
            if keep < len {
                file.set_len(keep).await?;
                file.sync_all().await?;
            }
            return Ok(len - keep);
        }
        end = start;
    }

    file.set_len(0).await?;
    file.sync_all().await?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clob::messages::ClassifiedMessage;
    use chrono::Utc;
    use serde_json::Value;

    fn record(seq: u64, text: &str) -> InboundMessage {
        InboundMessage {
            seq,
            received_at: Utc::now(),
            message: ClassifiedMessage::from_text(text),
        }
    }

    const BOOK: &str =
        r#"{"event_type":"book","asset_id":"A","market":"M","timestamp":"1","bids":[],"asks":[]}"#;

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/stream.jsonl");

        let mut sink = JsonlSink::open(&path, 64).await.unwrap();
        sink.append(&record(1, BOOK)).await.unwrap();
        sink.append(&record(2, "not json")).await.unwrap();
        sink.close().await.unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["seq"], 1);
        assert_eq!(lines[0]["message"]["event_type"], "book");
        assert_eq!(lines[1]["message"]["event_type"], "unknown");
        assert_eq!(lines[1]["message"]["reason"], "invalid_json");
        assert_eq!(lines[1]["message"]["raw"], "not json");
        assert_eq!(sink.records_written(), 2);
    }

    #[tokio::test]
    async fn flushes_every_n_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.jsonl");

        let mut sink = JsonlSink::open(&path, 2).await.unwrap();
        sink.append(&record(1, BOOK)).await.unwrap();
        sink.append(&record(2, BOOK)).await.unwrap();
        assert_eq!(read_lines(&path).len(), 2);

        sink.append(&record(3, BOOK)).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(read_lines(&path).len(), 3);
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.jsonl");

        let mut first = JsonlSink::open(&path, 64).await.unwrap();
        first.append(&record(1, BOOK)).await.unwrap();
        first.close().await.unwrap();

        let mut second = JsonlSink::open(&path, 64).await.unwrap();
        second.append(&record(1, BOOK)).await.unwrap();
        second.close().await.unwrap();

        assert_eq!(read_lines(&path).len(), 2);
    }

    #[tokio::test]
    async fn torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.jsonl");
        std::fs::write(&path, "{\"seq\":1}\n{\"seq\":2}\n{\"seq\":3,\"mess").unwrap();

        let mut sink = JsonlSink::open(&path, 64).await.unwrap();
        sink.append(&record(4, BOOK)).await.unwrap();
        sink.close().await.unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["seq"], 2);
        assert_eq!(lines[2]["seq"], 4);
    }

    #[tokio::test]
    async fn file_without_newline_is_emptied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.jsonl");
        std::fs::write(&path, "{\"seq\":1").unwrap();

        assert_eq!(repair_torn_tail(&path).await.unwrap(), 8);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn complete_file_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.jsonl");
        std::fs::write(&path, "{}\n{}\n").unwrap();

        assert_eq!(repair_torn_tail(&path).await.unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n{}\n");
    }

    #[tokio::test]
    async fn append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::open(dir.path().join("s.jsonl"), 1).await.unwrap();
        sink.close().await.unwrap();

        assert!(matches!(sink.append(&record(1, BOOK)).await, Err(SinkError::Closed)));
        sink.close().await.unwrap();
    }
}
