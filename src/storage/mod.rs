mod fs;
#[cfg(test)]
mod memory;

pub use self::fs::FsFolder;
#[cfg(test)]
pub use memory::MemoryFolder;

use crate::compression::BoxedReader;
use crate::config::{StorageConfig, StorageKind};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Folder: Send + Sync {
    async fn put_object(&self, path: &str, content: BoxedReader) -> Result<()>;
    fn sub_folder(&self, name: &str) -> Arc<dyn Folder>;
    fn path(&self) -> &str;
}

pub fn create_folder(config: &StorageConfig) -> Arc<dyn Folder> {
    match &config.kind {
        StorageKind::Filesystem { root } => Arc::new(FsFolder::new(root.clone())),
    }
}

pub(crate) fn join_key(base: &str, name: &str) -> String {
    let name = name.trim_matches('/');
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}
