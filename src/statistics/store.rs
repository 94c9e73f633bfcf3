use crate::error::{BlinkTrackerError, Result, StatisticsError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Blink count for one completed measuring period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub blinks: u32,
    pub date: DateTime<Utc>,
}

/// Append-only history of per-period blink counts
#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    async fn insert(&self, count: u32, date: DateTime<Utc>) -> Result<()>;

    /// Watch the full history in insertion order
    fn observe(&self) -> watch::Receiver<Vec<StatRecord>>;
}

/// Append target for statistics lines
#[async_trait]
trait RecordLog: AsyncWrite + Unpin + Send {
    async fn size(&mut self) -> io::Result<u64>;

    /// Cut the log back to `len` bytes
    async fn truncate(&mut self, len: u64) -> io::Result<()>;

    async fn sync(&mut self) -> io::Result<()>;
}

#[async_trait]
impl RecordLog for File {
    async fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len).await
    }

    async fn sync(&mut self) -> io::Result<()> {
        self.sync_data().await
    }
}

/// Append one complete line. A failed write is cut back off so the next
/// record starts on a clean line.
async fn append_line(log: &mut dyn RecordLog, line: &[u8]) -> io::Result<()> {
    let length = log.size().await?;

    let written = async {
        log.write_all(line).await?;
        log.flush().await
    }
    .await;

    if let Err(e) = written {
        if let Err(rollback) = log.truncate(length).await {
            warn!("Could not remove partial statistics record: {}", rollback);
        }
        return Err(e);
    }

    log.sync().await
}

/// Statistics kept in memory and optionally appended to a JSON-lines file
pub struct StatisticsStore {
    path: Option<PathBuf>,
    file: Mutex<Option<Box<dyn RecordLog>>>,
    records: watch::Sender<Vec<StatRecord>>,
}

impl StatisticsStore {
    pub fn in_memory() -> Self {
        let (records, _) = watch::channel(Vec::new());
        Self {
            path: None,
            file: Mutex::new(None),
            records,
        }
    }

    /// Open (or create) the statistics file and load its history
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| open_error(&path, e))?;
        }

        let history = if fs::try_exists(&path).await? {
            let contents = fs::read_to_string(&path)
                .await
                .map_err(|e| open_error(&path, e))?;
            parse_history(&contents)
        } else {
            Vec::new()
        };

        info!(
            "Statistics store at {} holds {} records",
            path.display(),
            history.len()
        );

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| open_error(&path, e))?;

        let (records, _) = watch::channel(history);
        Ok(Self {
            path: Some(path),
            file: Mutex::new(Some(Box::new(file))),
            records,
        })
    }

    #[cfg(test)]
    fn with_log(log: Box<dyn RecordLog>) -> Self {
        let (records, _) = watch::channel(Vec::new());
        Self {
            path: None,
            file: Mutex::new(Some(log)),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn open_error(path: &Path, e: std::io::Error) -> BlinkTrackerError {
    StatisticsError::Open {
        details: format!("{}: {}", path.display(), e),
    }
    .into()
}

/// Parse stored lines, skipping (and logging) anything unreadable
fn parse_history(contents: &str) -> Vec<StatRecord> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str::<StatRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                let error = StatisticsError::CorruptRecord {
                    line: index + 1,
                    details: e.to_string(),
                };
                warn!("Ignoring statistics record: {}", error);
                None
            }
        })
        .collect()
}

#[async_trait]
impl StatisticsRepository for StatisticsStore {
    async fn insert(&self, count: u32, date: DateTime<Utc>) -> Result<()> {
        let record = StatRecord {
            blinks: count,
            date,
        };

        {
            let mut file = self.file.lock().await;
            if let Some(file) = file.as_mut() {
                let mut line = serde_json::to_string(&record)?;
                line.push('\n');

                let append_error = |e: std::io::Error| {
                    BlinkTrackerError::from(StatisticsError::Append {
                        details: e.to_string(),
                    })
                };
                append_line(&mut **file, line.as_bytes())
                    .await
                    .map_err(append_error)?;
            }
        }

        debug!("Stored statistics record: {} blinks at {}", record.blinks, record.date);
        self.records.send_modify(|records| records.push(record));
        Ok(())
    }

    fn observe(&self) -> watch::Receiver<Vec<StatRecord>> {
        self.records.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::task::{Context, Poll};

    /// In-memory log that accepts `budget` more bytes, then fails
    struct ShortLog {
        contents: Arc<StdMutex<Vec<u8>>>,
        budget: usize,
    }

    impl AsyncWrite for ShortLog {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.budget == 0 {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")));
            }
            let accepted = buf.len().min(self.budget);
            self.budget -= accepted;
            self.contents.lock().unwrap().extend_from_slice(&buf[..accepted]);
            Poll::Ready(Ok(accepted))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[async_trait]
    impl RecordLog for ShortLog {
        async fn size(&mut self) -> io::Result<u64> {
            Ok(self.contents.lock().unwrap().len() as u64)
        }

        async fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.contents.lock().unwrap().truncate(len as usize);
            // Space freed by the rollback
            self.budget = usize::MAX;
            Ok(())
        }

        async fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_insert_keeps_insertion_order() {
        let store = StatisticsStore::in_memory();
        let mut history = store.observe();

        store.insert(12, at(1)).await.unwrap();
        store.insert(4, at(2)).await.unwrap();
        store.insert(20, at(3)).await.unwrap();

        assert!(history.has_changed().unwrap());
        let records = history.borrow_and_update().clone();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.blinks).collect::<Vec<_>>(),
            vec![12, 4, 20]
        );
        assert_eq!(records[2].date, at(3));
    }

    #[tokio::test]
    async fn test_records_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.jsonl");

        {
            let store = StatisticsStore::open(&path).await.unwrap();
            assert!(store.is_empty());
            store.insert(7, at(10)).await.unwrap();
            store.insert(9, at(11)).await.unwrap();
        }

        let reopened = StatisticsStore::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 2);
        reopened.insert(3, at(12)).await.unwrap();

        let records = reopened.observe().borrow().clone();
        assert_eq!(
            records.iter().map(|r| r.blinks).collect::<Vec<_>>(),
            vec![7, 9, 3]
        );

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_failed_append_leaves_no_fragment() {
        let contents = Arc::new(StdMutex::new(Vec::new()));
        let first_line = serde_json::to_string(&StatRecord {
            blinks: 7,
            date: at(1),
        })
        .unwrap();

        // Room for the first record and half of the second
        let store = StatisticsStore::with_log(Box::new(ShortLog {
            contents: Arc::clone(&contents),
            budget: first_line.len() + 1 + first_line.len() / 2,
        }));

        store.insert(7, at(1)).await.unwrap();
        let error = store.insert(8, at(2)).await.unwrap_err();
        assert!(matches!(
            error,
            BlinkTrackerError::Statistics(StatisticsError::Append { .. })
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(
            String::from_utf8(contents.lock().unwrap().clone()).unwrap(),
            format!("{}\n", first_line)
        );

        store.insert(9, at(3)).await.unwrap();
        let written = String::from_utf8(contents.lock().unwrap().clone()).unwrap();
        let records = parse_history(&written);
        assert_eq!(
            records.iter().map(|r| r.blinks).collect::<Vec<_>>(),
            vec![7, 9]
        );
        assert_eq!(written.lines().count(), 2);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let good = serde_json::to_string(&StatRecord {
            blinks: 5,
            date: at(0),
        })
        .unwrap();
        let contents = format!("{}\n{{broken\n\n{}\n", good, good);

        let records = parse_history(&contents);
        assert_eq!(records.len(), 2);
    }
}
