pub mod push;
pub mod sentinel;

pub use push::{backup_name, BackupPush, BackupReport};
pub use sentinel::{upload_sentinel, StreamSentinelDto};
