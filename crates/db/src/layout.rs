use std::path::{Path, PathBuf};

const STORE_PREFIX: &str = "usage_history_";
const STORE_EXTENSION: &str = "sqlite";
const REGISTRY_FILE_NAME: &str = "machines.sqlite";

/// Where each machine's store lives under the storage directory.
/// Machines never share a store.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    storage_dir: PathBuf,
}

impl StoreLayout {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn store_path(&self, machine_name: &str) -> PathBuf {
        self.storage_dir.join(format!(
            "{}{}.{}",
            STORE_PREFIX,
            sanitize(machine_name),
            STORE_EXTENSION
        ))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.storage_dir.join(REGISTRY_FILE_NAME)
    }
}

fn sanitize(machine_name: &str) -> String {
    machine_name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}
