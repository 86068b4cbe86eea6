use super::sentinel::{upload_sentinel, StreamSentinelDto};
use crate::config::BackupConfig;
use crate::database::SnapshotSource;
use crate::error::{BackupError, Result};
use crate::upload::Uploader;
use chrono::{DateTime, FixedOffset, Local, Utc};
use std::io;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

pub const SHADOW_DIR: &str = "shadow";
pub const METADATA_DIR: &str = "metadata";

#[derive(Debug)]
pub struct BackupReport {
    pub backup_name: String,
    pub start_local_time: DateTime<FixedOffset>,
    pub tables: usize,
    pub upload_failed: bool,
    pub duration_secs: u64,
}

pub fn backup_name(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

pub struct BackupPush {
    source: Box<dyn SnapshotSource>,
    uploader: Uploader,
    config: BackupConfig,
}

impl BackupPush {
    pub fn new(source: Box<dyn SnapshotSource>, uploader: Uploader, config: BackupConfig) -> Self {
        Self {
            source,
            uploader,
            config,
        }
    }

    pub async fn run(mut self) -> Result<BackupReport> {
        let start = Instant::now();
        let start_local_time: DateTime<FixedOffset> = Local::now().into();
        let name = backup_name(Utc::now());
        info!(backup = %name, engine = %self.source.engine_name(), "Starting backup");

        self.source.connect().await?;
        let result = self.run_connected(&name, start_local_time, start).await;
        if let Err(e) = self.source.close().await {
            warn!("Failed to close {} connection: {}", self.source.engine_name(), e);
        }

        if let Err(e) = &result {
            error!(backup = %name, "Backup failed: {}", e);
        }
        result
    }

    async fn run_connected(
        &self,
        name: &str,
        start_local_time: DateTime<FixedOffset>,
        start: Instant,
    ) -> Result<BackupReport> {
        let data_root = self.source.data_root().await?;
        let shadow = data_root.join(SHADOW_DIR);
        clear_shadow(&shadow).await?;

        let tables = self.source.list_backup_targets().await?;
        info!("Freezing {} tables", tables.len());
        self.source.snapshot(&tables).await?;
        tokio::fs::create_dir_all(&shadow).await?;

        let uploads = self.uploader.clone();
        uploads.spawn_upload_directory(shadow, format!("{}/{}", name, SHADOW_DIR));
        uploads.spawn_upload_directory(
            data_root.join(METADATA_DIR),
            format!("{}/{}", name, METADATA_DIR),
        );
        let upload_failed = uploads.finish().await.is_err();

        if upload_failed {
            if !self.config.tolerate_upload_failures {
                return Err(BackupError::Upload(format!(
                    "backup {} is incomplete, sentinel not written",
                    name
                )));
            }
            warn!(backup = %name, "Some uploads failed; writing sentinel anyway");
        }

        let sentinel = StreamSentinelDto { start_local_time };
        let sentinel_name = format!("{}{}", name, self.config.sentinel_suffix);
        upload_sentinel(&sentinel, &self.uploader, &sentinel_name).await?;

        let duration_secs = start.elapsed().as_secs();
        info!(
            backup = %name,
            tables = tables.len(),
            "Backup completed in {} seconds",
            duration_secs
        );
        Ok(BackupReport {
            backup_name: name.to_string(),
            start_local_time,
            tables: tables.len(),
            upload_failed,
            duration_secs,
        })
    }
}

async fn clear_shadow(shadow: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(shadow).await {
        Ok(()) => {
            info!("Removed stale snapshot data at {}", shadow.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
