use super::source::{SnapshotSource, Table};
use crate::config::DatabaseConfig;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use clickhouse::sql::Identifier;
use clickhouse::{Client, Row};
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, info};

const TABLES_QUERY: &str = "SELECT database, name, is_temporary, data_path, metadata_path \
     FROM system.tables WHERE data_path != '' AND is_temporary = 0";
const DATA_ROOT_QUERY: &str =
    "SELECT metadata_path FROM system.tables WHERE database = 'system' LIMIT 1";

#[derive(Debug, Row, Deserialize)]
struct TableRow {
    database: String,
    name: String,
    is_temporary: u8,
    data_path: String,
    metadata_path: String,
}

impl From<TableRow> for Table {
    fn from(row: TableRow) -> Self {
        Table {
            database: row.database,
            name: row.name,
            data_path: row.data_path,
            metadata_path: row.metadata_path,
            is_temporary: row.is_temporary != 0,
        }
    }
}

#[derive(Debug, Row, Deserialize)]
struct MetadataPathRow {
    metadata_path: String,
}

pub struct ClickHouseSource {
    config: DatabaseConfig,
    client: Option<Client>,
}

impl ClickHouseSource {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            config: config.clone(),
            client: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| BackupError::Database("not connected to ClickHouse".to_string()))
    }

    fn build_client(config: &DatabaseConfig) -> Client {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_user(&config.username)
            .with_password(&config.password);
        if let Some(database) = &config.database {
            client = client.with_database(database);
        }
        client
    }

    async fn freeze_table(client: &Client, table: &Table) -> Result<()> {
        client
            .query("ALTER TABLE ?.? FREEZE")
            .bind(Identifier(&table.database))
            .bind(Identifier(&table.name))
            .execute()
            .await?;
        Ok(())
    }
}

pub fn strip_path_segments(path: &str, count: usize) -> Option<PathBuf> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= count {
        return None;
    }
    let mut root = PathBuf::from("/");
    root.extend(&segments[..segments.len() - count]);
    Some(root)
}

pub(crate) async fn freeze_each<'a, F, Fut>(tables: &'a [Table], mut freeze: F) -> Result<()>
where
    F: FnMut(&'a Table) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    for table in tables {
        debug!("Freezing {}", table.qualified_name());
        freeze(table).await.map_err(|e| {
            BackupError::Snapshot(format!("freeze of {} failed: {}", table.qualified_name(), e))
        })?;
    }
    Ok(())
}

#[async_trait]
impl SnapshotSource for ClickHouseSource {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to ClickHouse at {}", self.config.url);
        let client = Self::build_client(&self.config);
        client.query("SELECT 1").execute().await?;
        self.client = Some(client);
        info!("ClickHouse connection successful");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            debug!("Closed ClickHouse client");
        }
        Ok(())
    }

    async fn list_backup_targets(&self) -> Result<Vec<Table>> {
        let rows = self.client()?.query(TABLES_QUERY).fetch_all::<TableRow>().await?;
        let tables: Vec<Table> = rows
            .into_iter()
            .map(Table::from)
            .filter(Table::is_backup_target)
            .collect();
        debug!("Found {} tables to back up", tables.len());
        Ok(tables)
    }

    async fn snapshot(&self, tables: &[Table]) -> Result<()> {
        let client = self.client()?;
        freeze_each(tables, |table| Self::freeze_table(client, table)).await?;
        info!("Froze {} tables", tables.len());
        Ok(())
    }

    async fn data_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.config.data_root {
            return Ok(root.clone());
        }
        let row = self
            .client()?
            .query(DATA_ROOT_QUERY)
            .fetch_optional::<MetadataPathRow>()
            .await?
            .ok_or_else(|| BackupError::Database("no system tables reported a metadata path".to_string()))?;

        strip_path_segments(&row.metadata_path, self.config.data_root_strip_segments).ok_or_else(|| {
            BackupError::Config(format!(
                "cannot strip {} segments from metadata path {}; set database.data_root",
                self.config.data_root_strip_segments, row.metadata_path
            ))
        })
    }

    fn engine_name(&self) -> &'static str {
        "ClickHouse"
    }
}
