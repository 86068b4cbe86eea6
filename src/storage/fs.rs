use super::{join_key, Folder};
use crate::compression::BoxedReader;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

// Objects are written to a `.part` sibling and renamed into place.
pub struct FsFolder {
    root: PathBuf,
    prefix: String,
}

impl FsFolder {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            prefix: String::new(),
        }
    }

    fn object_path(&self, path: &str) -> Result<PathBuf> {
        let key = join_key(&self.prefix, path);
        let relative = Path::new(&key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(BackupError::Storage(format!("refusing object key {:?}", key)));
        }
        Ok(self.root.join(relative))
    }
}

fn write_object(target: &Path, mut content: BoxedReader) -> io::Result<u64> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut part_name = target.as_os_str().to_owned();
    part_name.push(".part");
    let part = PathBuf::from(part_name);

    let result: io::Result<u64> = (|| {
        let mut writer = BufWriter::new(File::create(&part)?);
        let written = io::copy(&mut content, &mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(written)
    })();

    match result {
        Ok(written) => {
            fs::rename(&part, target)?;
            Ok(written)
        }
        Err(e) => {
            let _ = fs::remove_file(&part);
            Err(e)
        }
    }
}

#[async_trait]
impl Folder for FsFolder {
    async fn put_object(&self, path: &str, content: BoxedReader) -> Result<()> {
        let target = self.object_path(path)?;
        let shown = target.clone();
        let written = tokio::task::spawn_blocking(move || write_object(&target, content)).await??;
        debug!("Stored {} bytes at {}", written, shown.display());
        Ok(())
    }

    fn sub_folder(&self, name: &str) -> Arc<dyn Folder> {
        Arc::new(FsFolder {
            root: self.root.clone(),
            prefix: join_key(&self.prefix, name),
        })
    }

    fn path(&self) -> &str {
        &self.prefix
    }
}
