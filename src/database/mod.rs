mod clickhouse;
mod source;

pub use self::clickhouse::{strip_path_segments, ClickHouseSource};
pub use source::{SnapshotSource, Table};

use crate::config::{DatabaseConfig, DatabaseEngine};

pub fn create_source(config: &DatabaseConfig) -> Box<dyn SnapshotSource> {
    match config.engine {
        DatabaseEngine::ClickHouse => Box::new(ClickHouseSource::new(config)),
    }
}
