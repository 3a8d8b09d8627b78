use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::models::{PackingRecord, RawPackingRecord};
use crate::services::error::StoreError;

/// Append-only queue of user feedback, stored as JSON Lines
///
/// Each submission is a single appended line, so one submitter can never
/// overwrite another. All file access goes through one mutex; a drain and
/// an append never interleave.
#[derive(Debug)]
pub struct FeedbackStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one record to the end of the log
    pub fn append(&self, record: &PackingRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.guard();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        self.discard_torn_tail(&mut file)?;
        file.write_all(&line)?;
        file.sync_data()?;

        tracing::debug!(
            "Appended feedback for {}/{} ({} items)",
            record.profile.travel_type,
            record.profile.climate,
            record.items.len()
        );
        Ok(())
    }

    /// Cut an interrupted write off the end of the log
    ///
    /// Without this the next record would be glued onto the fragment and
    /// the combined line could never be parsed again.
    fn discard_torn_tail(&self, file: &mut File) -> Result<(), StoreError> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let content = fs::read(&self.path)?;
        let keep = content.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1) as u64;
        tracing::warn!(
            "Discarding {} bytes of an interrupted write in {}",
            len - keep,
            self.path.display()
        );
        file.set_len(keep)?;
        Ok(())
    }

    /// All queued records, oldest first
    pub fn snapshot(&self) -> Result<Vec<PackingRecord>, StoreError> {
        let _guard = self.guard();
        self.read_records()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Take every queued record and leave the queue empty
    pub fn drain(&self) -> Result<Vec<PackingRecord>, StoreError> {
        let _guard = self.guard();
        let records = self.read_records()?;
        if self.path.exists() {
            File::create(&self.path)?;
        }
        Ok(records)
    }

    /// Remove exactly the records a training cycle consumed
    ///
    /// `consumed` must be the snapshot taken at the start of the cycle.
    /// Records appended since then stay queued for the next cycle.
    pub fn drain_consumed(&self, consumed: &[PackingRecord]) -> Result<usize, StoreError> {
        if consumed.is_empty() {
            return Ok(0);
        }

        let _guard = self.guard();
        let lines = self.read_lines()?;
        if lines.len() < consumed.len() {
            return Err(StoreError::QueueChanged(format!(
                "expected at least {} records, found {}",
                consumed.len(),
                lines.len()
            )));
        }
        for (idx, expected) in consumed.iter().enumerate() {
            let (line_no, line) = &lines[idx];
            if &parse_line(*line_no, line)? != expected {
                return Err(StoreError::QueueChanged(format!(
                    "record at line {} differs from the consumed snapshot",
                    line_no
                )));
            }
        }

        let mut remaining = Vec::new();
        for (_, line) in &lines[consumed.len()..] {
            remaining.extend_from_slice(line.as_bytes());
            remaining.push(b'\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&remaining)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        Ok(consumed.len())
    }

    fn read_records(&self) -> Result<Vec<PackingRecord>, StoreError> {
        self.read_lines()?
            .iter()
            .map(|(line_no, line)| parse_line(*line_no, line))
            .collect()
    }

    /// Complete, non-blank lines with their 1-based line numbers
    ///
    /// A trailing fragment without a newline is an interrupted write and
    /// is skipped.
    fn read_lines(&self) -> Result<Vec<(usize, String)>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut segments: Vec<&str> = content.split('\n').collect();
        if let Some(tail) = segments.pop() {
            if !tail.trim().is_empty() {
                tracing::warn!(
                    "Ignoring incomplete trailing line in {}",
                    self.path.display()
                );
            }
        }

        Ok(segments
            .into_iter()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| (idx + 1, line.to_string()))
            .collect())
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<PackingRecord, StoreError> {
    let raw: RawPackingRecord = serde_json::from_str(line).map_err(|e| StoreError::CorruptFeedback {
        line: line_no,
        reason: e.to_string(),
    })?;
    raw.into_record(line_no).map_err(|e| StoreError::CorruptFeedback {
        line: line_no,
        reason: e.to_string(),
    })
}

/// Immutable, time-stamped archives of consumed feedback
#[derive(Debug, Clone)]
pub struct BackupSet {
    dir: PathBuf,
}

impl BackupSet {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a new backup file; existing backups are never overwritten
    pub fn write(&self, records: &[PackingRecord]) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir)?;

        let mut body = Vec::new();
        for record in records {
            serde_json::to_writer(&mut body, record)?;
            body.push(b'\n');
        }

        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("feedback_backup_{}.jsonl", stamp)
            } else {
                format!("feedback_backup_{}_{}.jsonl", stamp, attempt)
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&body)?;
                    file.sync_all()?;
                    tracing::info!("Backed up {} feedback records to {}", records.len(), path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Backup files in chronological order
    pub fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_backup = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("feedback_backup_") && n.ends_with(".jsonl"));
            if is_backup {
                backups.push(path);
            }
        }
        backups.sort();
        Ok(backups)
    }

    /// Remove a backup whose records went back to the queue
    pub fn discard(&self, path: &Path) -> Result<(), StoreError> {
        fs::remove_file(path)?;
        tracing::info!("Discarded backup {}", path.display());
        Ok(())
    }

    /// Read the records archived in one backup file
    pub fn read(&self, path: &Path) -> Result<Vec<PackingRecord>, StoreError> {
        FeedbackStore::new(path).snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TripProfile;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(travel_type: &str, items: &[&str]) -> PackingRecord {
        PackingRecord::new(TripProfile::new(travel_type, "cold", 3), items.iter().copied())
    }

    #[test]
    fn test_missing_file_is_empty_queue() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::new(dir.path().join("feedback.jsonl"));

        assert!(store.snapshot().unwrap().is_empty());
        assert!(store.drain().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_drain() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::new(dir.path().join("feedback.jsonl"));
        let submitted = record("city", &["coat", "map"]);

        store.append(&submitted).unwrap();
        assert_eq!(store.drain().unwrap(), vec![submitted]);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_corrupt_line_is_hard_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let store = FeedbackStore::new(&path);
        store.append(&record("city", &["coat"])).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{not json}\n").unwrap();

        match store.snapshot() {
            Err(StoreError::CorruptFeedback { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt feedback, got {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_trailing_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let store = FeedbackStore::new(&path);
        store.append(&record("city", &["coat"])).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"travel_type": "bea"#).unwrap();

        assert_eq!(store.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn test_append_after_interrupted_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let store = FeedbackStore::new(&path);
        let first = record("city", &["coat"]);
        let second = record("beach", &["towel"]);
        store.append(&first).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"travel_type": "bea"#).unwrap();
        assert_eq!(store.snapshot().unwrap().len(), 1);

        store.append(&second).unwrap();
        assert_eq!(store.snapshot().unwrap(), vec![first, second]);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_append_after_torn_first_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");
        fs::write(&path, br#"{"travel_type": "ci"#).unwrap();
        let store = FeedbackStore::new(&path);

        store.append(&record("city", &["coat"])).unwrap();
        assert_eq!(store.snapshot().unwrap(), vec![record("city", &["coat"])]);
    }

    #[test]
    fn test_legacy_lines_are_translated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.jsonl");
        fs::write(
            &path,
            "{\"type_voyage\": \"ville\", \"climat\": \"froid\", \"duree\": 3, \"objets_recommandes\": [\"manteau\"]}\n",
        )
        .unwrap();

        let records = FeedbackStore::new(&path).snapshot().unwrap();
        assert_eq!(records[0].profile, TripProfile::new("ville", "froid", 3));
    }

    #[test]
    fn test_drain_consumed_keeps_late_records() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::new(dir.path().join("feedback.jsonl"));
        store.append(&record("city", &["coat"])).unwrap();
        store.append(&record("beach", &["towel"])).unwrap();

        let snapshot = store.snapshot().unwrap();
        let late = record("mountain", &["boots"]);
        store.append(&late).unwrap();

        assert_eq!(store.drain_consumed(&snapshot).unwrap(), 2);
        assert_eq!(store.snapshot().unwrap(), vec![late]);
    }

    #[test]
    fn test_drain_consumed_detects_changed_queue() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::new(dir.path().join("feedback.jsonl"));
        store.append(&record("city", &["coat"])).unwrap();
        let snapshot = store.snapshot().unwrap();
        store.drain().unwrap();
        store.append(&record("beach", &["towel"])).unwrap();

        assert!(matches!(
            store.drain_consumed(&snapshot),
            Err(StoreError::QueueChanged(_))
        ));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FeedbackStore::new(dir.path().join("feedback.jsonl")));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let item = format!("item-{}-{}", t, i);
                        store.append(&record("city", &[item.as_str()])).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len().unwrap(), 80);
    }

    #[test]
    fn test_backups_are_unique_and_ordered() {
        let dir = TempDir::new().unwrap();
        let backups = BackupSet::new(dir.path().join("backups"));
        let first = backups.write(&[record("city", &["coat"])]).unwrap();
        let second = backups.write(&[record("beach", &["towel"])]).unwrap();

        assert_ne!(first, second);
        assert_eq!(backups.list().unwrap(), vec![first.clone(), second]);
        assert_eq!(backups.read(&first).unwrap(), vec![record("city", &["coat"])]);
    }
}
