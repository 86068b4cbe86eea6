use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const WAL_NAME_LEN: usize = 24;
const WAL_PAGE_SIZE: usize = 8192;

pub fn is_wal_filename(name: &str) -> bool {
    name.len() == WAL_NAME_LEN && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F'))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub segment: String,
    pub timeline: u32,
    pub log_id: u32,
    pub segment_no: u32,
    pub bytes_read: u64,
    pub pages: u64,
    pub non_zero_pages: u64,
}

impl DeltaRecord {
    fn parse(name: &str) -> Result<Self> {
        if !is_wal_filename(name) {
            return Err(BackupError::Upload(format!("{} is not a WAL segment name", name)));
        }
        let field = |range: std::ops::Range<usize>| {
            u32::from_str_radix(&name[range], 16).map_err(|e| BackupError::Upload(e.to_string()))
        };
        let timeline = field(0..8)?;
        if timeline == 0 {
            return Err(BackupError::Upload(format!("{} has timeline 0", name)));
        }
        Ok(Self {
            segment: name.to_string(),
            timeline,
            log_id: field(8..16)?,
            segment_no: field(16..24)?,
            bytes_read: 0,
            pages: 0,
            non_zero_pages: 0,
        })
    }
}

pub struct DeltaFileManager {
    directory: PathBuf,
    records: Mutex<BTreeMap<String, DeltaRecord>>,
}

impl DeltaFileManager {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn records(&self) -> Vec<DeltaRecord> {
        self.lock().values().cloned().collect()
    }

    pub fn record(&self, record: DeltaRecord) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(format!("{}_delta.json", record.segment));
        fs::write(&path, serde_json::to_vec(&record)?)?;
        debug!("Wrote delta record {}", path.display());
        self.lock().insert(record.segment.clone(), record);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DeltaRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct DeltaState {
    record: DeltaRecord,
    page_fill: usize,
    page_non_zero: bool,
}

impl DeltaState {
    fn observe(&mut self, mut bytes: &[u8]) {
        self.record.bytes_read += bytes.len() as u64;
        while !bytes.is_empty() {
            let take = (WAL_PAGE_SIZE - self.page_fill).min(bytes.len());
            self.page_non_zero |= bytes[..take].iter().any(|b| *b != 0);
            self.page_fill += take;
            bytes = &bytes[take..];
            if self.page_fill == WAL_PAGE_SIZE {
                self.end_page();
            }
        }
    }

    fn end_page(&mut self) {
        if self.page_fill == 0 {
            return;
        }
        self.record.pages += 1;
        if self.page_non_zero {
            self.record.non_zero_pages += 1;
        }
        self.page_fill = 0;
        self.page_non_zero = false;
    }
}

fn lock_state(state: &Mutex<DeltaState>) -> MutexGuard<'_, DeltaState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct WalDeltaRecordingReader<R> {
    inner: R,
    state: Arc<Mutex<DeltaState>>,
}

impl<R: Read> Read for WalDeltaRecordingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        lock_state(&self.state).observe(&buf[..n]);
        Ok(n)
    }
}

pub struct DeltaRecorder {
    state: Arc<Mutex<DeltaState>>,
    manager: Arc<DeltaFileManager>,
}

impl DeltaRecorder {
    pub fn try_new(name: &str, manager: Arc<DeltaFileManager>) -> Result<Self> {
        let state = DeltaState {
            record: DeltaRecord::parse(name)?,
            page_fill: 0,
            page_non_zero: false,
        };
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            manager,
        })
    }

    pub fn wrap<R: Read>(&self, inner: R) -> WalDeltaRecordingReader<R> {
        WalDeltaRecordingReader {
            inner,
            state: self.state.clone(),
        }
    }

    pub fn close(self) -> Result<()> {
        let record = {
            let mut state = lock_state(&self.state);
            state.end_page();
            state.record.clone()
        };
        self.manager.record(record)
    }
}
