use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub database: String,
    pub name: String,
    pub data_path: String,
    pub metadata_path: String,
    pub is_temporary: bool,
}

impl Table {
    pub fn is_backup_target(&self) -> bool {
        !self.is_temporary && !self.data_path.is_empty()
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
    async fn list_backup_targets(&self) -> Result<Vec<Table>>;
    async fn snapshot(&self, tables: &[Table]) -> Result<()>;
    async fn data_root(&self) -> Result<PathBuf>;
    fn engine_name(&self) -> &'static str;
}
