use crate::error::Result;
use crate::upload::Uploader;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSentinelDto {
    #[serde(rename = "StartLocalTime")]
    pub start_local_time: DateTime<FixedOffset>,
}

// Stored raw, without compression or encryption.
pub async fn upload_sentinel(sentinel: &StreamSentinelDto, uploader: &Uploader, name: &str) -> Result<()> {
    let body = serde_json::to_vec(sentinel)?;
    uploader
        .upload(name, Box::new(Cursor::new(body)))
        .await
        .map_err(|e| {
            error!("Could not upload sentinel '{}'", name);
            e
        })
}
