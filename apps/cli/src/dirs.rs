use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".claude";
const DATA_DIR_NAME: &str = "usage";
const STORE_PREFIX: &str = "usage_history_";

#[derive(Debug, Clone)]
pub struct DirResolution {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    /// The data dir already holds at least one machine store.
    pub matched_existing: bool,
}

pub fn resolve_dirs() -> Result<DirResolution, String> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|err| format!("resolve HOME: {}", err))?;
    let config_dir = PathBuf::from(home).join(BASE_DIR_NAME);
    let data_dir = config_dir.join(DATA_DIR_NAME);
    let matched_existing = has_store(&data_dir.join("stores"));
    Ok(DirResolution {
        config_dir,
        data_dir,
        matched_existing,
    })
}

fn has_store(dir: &std::path::Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry
            .file_name()
            .to_string_lossy()
            .starts_with(STORE_PREFIX)
    })
}
