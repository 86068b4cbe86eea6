use super::{join_key, Folder};
use crate::compression::BoxedReader;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Objects {
    data: HashMap<String, Vec<u8>>,
    order: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryFolder {
    objects: Arc<Mutex<Objects>>,
    prefix: String,
}

impl MemoryFolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().data.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().data.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn write_order(&self) -> Vec<String> {
        self.lock().order.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Folder for MemoryFolder {
    async fn put_object(&self, path: &str, mut content: BoxedReader) -> Result<()> {
        let bytes = tokio::task::spawn_blocking(move || {
            let mut buf = Vec::new();
            content.read_to_end(&mut buf).map(|_| buf)
        })
        .await??;

        let key = join_key(&self.prefix, path);
        let mut objects = self.lock();
        objects.order.push(key.clone());
        objects.data.insert(key, bytes);
        Ok(())
    }

    fn sub_folder(&self, name: &str) -> Arc<dyn Folder> {
        Arc::new(MemoryFolder {
            objects: self.objects.clone(),
            prefix: join_key(&self.prefix, name),
        })
    }

    fn path(&self) -> &str {
        &self.prefix
    }
}
