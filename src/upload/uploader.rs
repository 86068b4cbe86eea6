use super::archive::archive_directory;
use super::chain::{compress_and_encrypt, sanitize_path, CancellableReader, NamedReader};
use super::wal_delta::{is_wal_filename, DeltaFileManager, DeltaRecorder};
use crate::compression::{BoxedReader, Compressor};
use crate::crypto::Crypter;
use crate::error::{BackupError, Result};
use crate::storage::Folder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub struct Uploader {
    uploading_folder: Arc<dyn Folder>,
    compressor: Arc<dyn Compressor>,
    crypter: Option<Arc<dyn Crypter>>,
    delta_file_manager: Option<Arc<DeltaFileManager>>,
    tracker: TaskTracker,
    // Shared by every clone, never cleared.
    failed: Arc<AtomicBool>,
    token: CancellationToken,
    temp_dir: Option<PathBuf>,
}

impl Uploader {
    pub fn new(
        compressor: Arc<dyn Compressor>,
        uploading_folder: Arc<dyn Folder>,
        delta_file_manager: Option<Arc<DeltaFileManager>>,
    ) -> Self {
        Self {
            uploading_folder,
            compressor,
            crypter: None,
            delta_file_manager,
            tracker: TaskTracker::new(),
            failed: Arc::new(AtomicBool::new(false)),
            token: CancellationToken::new(),
            temp_dir: None,
        }
    }

    pub fn with_crypter(mut self, crypter: Option<Arc<dyn Crypter>>) -> Self {
        self.crypter = crypter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = Some(temp_dir);
        self
    }

    pub fn into_sub_folder(mut self, name: &str) -> Self {
        self.uploading_folder = self.uploading_folder.sub_folder(name);
        self
    }

    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn record_failure(&self, path: &str, err: BackupError) -> BackupError {
        self.failed.store(true, Ordering::SeqCst);
        error!(path = %path, error = %err, "Upload failed");
        err
    }

    pub async fn upload(&self, path: &str, content: BoxedReader) -> Result<()> {
        let content: BoxedReader = Box::new(CancellableReader::new(content, self.token.clone()));
        let result = tokio::select! {
            result = self.uploading_folder.put_object(path, content) => result,
            _ = self.token.cancelled() => Err(BackupError::Cancelled),
        };
        result.map_err(|e| self.record_failure(path, e))
    }

    pub async fn upload_file(&self, file: NamedReader) -> Result<()> {
        let (name, reader) = file.into_parts();
        let sanitized = sanitize_path(base_name(&name));
        self.upload_file_with_sanitized_name(NamedReader::from_boxed(sanitized, reader))
            .await
    }

    pub async fn upload_file_with_sanitized_name(&self, file: NamedReader) -> Result<()> {
        let (name, reader) = file.into_parts();
        let dst_path = format!("{}.{}", name, self.compressor.file_extension());
        let chain = compress_and_encrypt(reader, self.compressor.as_ref(), self.crypter.as_deref())
            .map_err(|e| self.record_failure(&dst_path, e.into()))?;
        self.upload(&dst_path, chain).await?;
        info!(path = %dst_path, folder = %self.uploading_folder.path(), "Uploaded object");
        Ok(())
    }

    pub async fn upload_directory(&self, path: &Path, name: &str) -> Result<()> {
        let source = path.to_path_buf();
        let temp_dir = self.temp_dir.clone();
        let token = self.token.clone();
        let archived = tokio::task::spawn_blocking(move || {
            archive_directory(&source, temp_dir.as_deref(), &token)
        })
        .await
        .map_err(BackupError::from)
        .and_then(|r| r);

        let archive = archived.map_err(|e| {
            self.record_failure(
                name,
                match e {
                    BackupError::Cancelled => BackupError::Cancelled,
                    other => BackupError::Compression(format!(
                        "could not archive {}: {}",
                        path.display(),
                        other
                    )),
                },
            )
        })?;
        debug!("Archived {} into {}", path.display(), archive.path().display());

        let file = archive.reopen().map_err(|e| self.record_failure(name, e.into()))?;
        let result = self
            .upload_file_with_sanitized_name(NamedReader::new(sanitize_path(name), file))
            .await;
        drop(archive);
        result
    }

    pub async fn upload_wal_file(&self, file: NamedReader) -> Result<()> {
        let filename = base_name(file.name()).to_string();
        let recorder = match &self.delta_file_manager {
            Some(manager) if is_wal_filename(&filename) => {
                match DeltaRecorder::try_new(&filename, manager.clone()) {
                    Ok(recorder) => Some(recorder),
                    Err(e) => {
                        debug!("Delta recording unavailable for {}: {}", filename, e);
                        None
                    }
                }
            }
            _ => None,
        };

        let Some(recorder) = recorder else {
            return self.upload_file(file).await;
        };

        let (name, reader) = file.into_parts();
        let recording: BoxedReader = Box::new(recorder.wrap(reader));
        let result = self.upload_file(NamedReader::from_boxed(name, recording)).await;
        let closed = tokio::task::spawn_blocking(move || recorder.close())
            .await
            .map_err(BackupError::from)
            .and_then(|r| r);
        if let Err(e) = closed {
            warn!("Could not record WAL delta for {}: {}", filename, e);
        }
        result
    }

    pub fn spawn_upload_file(&self, file: NamedReader) {
        let uploader = self.clone();
        self.tracker.spawn(async move {
            let _ = uploader.upload_file(file).await;
        });
    }

    pub fn spawn_upload_directory(&self, path: PathBuf, name: String) {
        let uploader = self.clone();
        self.tracker.spawn(async move {
            let _ = uploader.upload_directory(&path, &name).await;
        });
    }

    pub async fn finish(&self) -> Result<()> {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
        if self.failed() {
            error!("Could not complete upload");
            return Err(BackupError::Upload(
                "one or more objects failed to upload".to_string(),
            ));
        }
        Ok(())
    }
}

impl Clone for Uploader {
    fn clone(&self) -> Self {
        Self {
            uploading_folder: self.uploading_folder.clone(),
            compressor: self.compressor.clone(),
            crypter: self.crypter.clone(),
            delta_file_manager: self.delta_file_manager.clone(),
            tracker: TaskTracker::new(),
            failed: self.failed.clone(),
            token: self.token.clone(),
            temp_dir: self.temp_dir.clone(),
        }
    }
}

fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::ZstdCompressor;
    use crate::crypto::StreamCrypter;
    use crate::storage::MemoryFolder;
    use async_trait::async_trait;
    use std::fs;
    use std::io::{Cursor, Read};
    use std::time::Duration;
    use tempfile::tempdir;
    use zip::ZipArchive;

    struct PickyFolder {
        inner: MemoryFolder,
        poison: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl Folder for PickyFolder {
        async fn put_object(&self, path: &str, content: BoxedReader) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            if path.contains(self.poison) {
                return Err(BackupError::Storage(format!("rejected {}", path)));
            }
            self.inner.put_object(path, content).await
        }

        fn sub_folder(&self, _name: &str) -> Arc<dyn Folder> {
            unimplemented!("not used in tests")
        }

        fn path(&self) -> &str {
            ""
        }
    }

    fn memory_uploader(store: &MemoryFolder) -> Uploader {
        Uploader::new(Arc::new(ZstdCompressor::new(None)), Arc::new(store.clone()), None)
    }

    fn picky_uploader(store: &MemoryFolder, poison: &'static str) -> Uploader {
        let folder = PickyFolder {
            inner: store.clone(),
            poison,
            delay: Duration::from_millis(5),
        };
        Uploader::new(Arc::new(ZstdCompressor::new(None)), Arc::new(folder), None)
    }

    fn open(bytes: Vec<u8>, crypter: Option<&StreamCrypter>) -> Vec<u8> {
        let compressor = ZstdCompressor::new(None);
        let mut reader: BoxedReader = Box::new(Cursor::new(bytes));
        if let Some(crypter) = crypter {
            reader = crypter.decrypt(reader).unwrap();
        }
        let mut out = Vec::new();
        compressor.decompress(reader).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn test_upload_directory_produces_single_zip_object() {
        let data = tempdir().unwrap();
        fs::write(data.path().join("a.txt"), "hello").unwrap();
        fs::create_dir_all(data.path().join("sub")).unwrap();
        fs::write(data.path().join("sub/b.txt"), "world").unwrap();

        let store = MemoryFolder::new();
        let crypter = StreamCrypter::new([5u8; 32]);
        let uploader = memory_uploader(&store).with_crypter(Some(Arc::new(StreamCrypter::new([5u8; 32]))));

        uploader.upload_directory(data.path(), "run1/shadow").await.unwrap();

        assert_eq!(store.keys(), vec!["run1/shadow.zst".to_string()]);
        let zipped = open(store.get("run1/shadow.zst").unwrap(), Some(&crypter));
        let mut archive = ZipArchive::new(Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive.by_name("a.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
        content.clear();
        archive.by_name("sub/b.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "world");
    }

    #[tokio::test]
    async fn test_upload_file_sanitizes_basename() {
        let store = MemoryFolder::new();
        let uploader = memory_uploader(&store);

        uploader
            .upload_file(NamedReader::new("/var/lib/clickhouse/my table?.bin", Cursor::new(b"rows".to_vec())))
            .await
            .unwrap();

        assert_eq!(store.keys(), vec!["my_table_.bin.zst".to_string()]);
        assert_eq!(open(store.get("my_table_.bin.zst").unwrap(), None), b"rows");
    }

    #[tokio::test]
    async fn test_failure_is_sticky_across_clones() {
        let store = MemoryFolder::new();
        let uploader = picky_uploader(&store, "bad");
        let workers: Vec<Uploader> = (0..4).map(|_| uploader.clone()).collect();

        for (i, worker) in workers.iter().enumerate() {
            for j in 0..5 {
                let name = if i == 2 && j == 3 { format!("bad-{}", j) } else { format!("ok-{}-{}", i, j) };
                worker.spawn_upload_file(NamedReader::new(name, Cursor::new(vec![i as u8; 128])));
            }
        }
        for worker in &workers {
            let _ = worker.finish().await;
        }

        assert!(uploader.failed());
        assert!(workers.iter().all(|w| w.failed()));
        assert_eq!(store.keys().len(), 19);

        uploader
            .upload_file(NamedReader::new("late-success", Cursor::new(Vec::new())))
            .await
            .unwrap();
        assert!(uploader.failed());
        assert!(matches!(uploader.finish().await, Err(BackupError::Upload(_))));
    }

    #[tokio::test]
    async fn test_finish_without_failures() {
        let store = MemoryFolder::new();
        let uploader = memory_uploader(&store);
        for i in 0..8 {
            uploader.spawn_upload_file(NamedReader::new(format!("part-{}", i), Cursor::new(vec![0u8; 10])));
        }
        uploader.finish().await.unwrap();
        assert_eq!(store.keys().len(), 8);
        assert!(!uploader.failed());
    }

    #[tokio::test]
    async fn test_clone_has_independent_barrier() {
        let slow_store = MemoryFolder::new();
        let slow = Uploader::new(
            Arc::new(ZstdCompressor::new(None)),
            Arc::new(PickyFolder {
                inner: slow_store.clone(),
                poison: "never-matches",
                delay: Duration::from_millis(300),
            }),
            None,
        );

        slow.spawn_upload_file(NamedReader::new("slow", Cursor::new(vec![1u8])));
        let clone = slow.clone();
        clone.finish().await.unwrap();
        assert!(slow_store.keys().is_empty());

        slow.finish().await.unwrap();
        assert_eq!(slow_store.keys(), vec!["slow.zst".to_string()]);
    }

    #[tokio::test]
    async fn test_temp_archive_removed_on_success_and_failure() {
        let data = tempdir().unwrap();
        fs::write(data.path().join("f"), "x").unwrap();
        let scratch = tempdir().unwrap();
        let store = MemoryFolder::new();

        let ok = memory_uploader(&store).with_temp_dir(scratch.path().to_path_buf());
        ok.upload_directory(data.path(), "run/shadow").await.unwrap();
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);

        let failing = picky_uploader(&store, "shadow").with_temp_dir(scratch.path().to_path_buf());
        assert!(failing.upload_directory(data.path(), "run/shadow").await.is_err());
        assert!(failing.failed());
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);

        let missing = memory_uploader(&store).with_temp_dir(scratch.path().to_path_buf());
        assert!(missing.upload_directory(&data.path().join("absent"), "run/meta").await.is_err());
        assert!(missing.failed());
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_wal_file_recorded_and_uploaded() {
        let deltas = tempdir().unwrap();
        let manager = Arc::new(DeltaFileManager::new(deltas.path().to_path_buf()));
        let store = MemoryFolder::new();
        let uploader = Uploader::new(Arc::new(ZstdCompressor::new(None)), Arc::new(store.clone()), Some(manager.clone()));

        let segment = "pg_wal/000000010000000000000003";
        uploader
            .upload_wal_file(NamedReader::new(segment, Cursor::new(vec![7u8; 20_000])))
            .await
            .unwrap();

        assert_eq!(store.keys(), vec!["000000010000000000000003.zst".to_string()]);
        let records = manager.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bytes_read, 20_000);

        uploader
            .upload_wal_file(NamedReader::new("pg_wal/00000001.history", Cursor::new(b"1\t0/0".to_vec())))
            .await
            .unwrap();
        assert_eq!(manager.records().len(), 1);
        assert!(store.get("00000001.history.zst").is_some());
    }

    #[tokio::test]
    async fn test_wal_recorder_closed_when_upload_fails() {
        let deltas = tempdir().unwrap();
        let manager = Arc::new(DeltaFileManager::new(deltas.path().to_path_buf()));
        let store = MemoryFolder::new();
        let folder = PickyFolder {
            inner: store.clone(),
            poison: "0000",
            delay: Duration::ZERO,
        };
        let uploader = Uploader::new(Arc::new(ZstdCompressor::new(None)), Arc::new(folder), Some(manager.clone()));

        let result = uploader
            .upload_wal_file(NamedReader::new("000000010000000000000004", Cursor::new(vec![0u8; 100])))
            .await;

        assert!(result.is_err());
        assert!(uploader.failed());
        assert_eq!(manager.records().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unwritable_delta_directory_does_not_fail_upload() {
        let scratch = tempdir().unwrap();
        let blocker = scratch.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();
        let manager = Arc::new(DeltaFileManager::new(blocker.join("deltas")));
        let store = MemoryFolder::new();
        let uploader = Uploader::new(Arc::new(ZstdCompressor::new(None)), Arc::new(store.clone()), Some(manager.clone()));

        uploader
            .upload_wal_file(NamedReader::new("000000010000000000000005", Cursor::new(vec![3u8; 9000])))
            .await
            .unwrap();

        assert!(!uploader.failed());
        assert!(manager.records().is_empty());
        assert_eq!(store.keys(), vec!["000000010000000000000005.zst".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_upload_marks_failure() {
        let store = MemoryFolder::new();
        let token = CancellationToken::new();
        let uploader = memory_uploader(&store).with_cancellation(token.clone());
        token.cancel();

        let result = uploader
            .upload_file(NamedReader::new("late", Cursor::new(vec![1u8; 1024])))
            .await;

        assert!(result.is_err());
        assert!(uploader.failed());
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/b/c.bin"), "c.bin");
        assert_eq!(base_name("c.bin"), "c.bin");
        assert_eq!(base_name("dir/"), "dir");
    }
}
