use std::fs;
use std::path::{Path, PathBuf};

use usage_app::SyncConfig;

const CONFIG_FILE_NAME: &str = "usage_sync.toml";

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: SyncConfig,
    pub paths: ConfigPaths,
    pub created: bool,
}

pub fn load_or_create(dir: &Path) -> Result<ConfigLoad, String> {
    fs::create_dir_all(dir)
        .map_err(|err| format!("create config dir {}: {}", dir.display(), err))?;
    let file = dir.join(CONFIG_FILE_NAME);
    let paths = ConfigPaths { file };

    if paths.file.exists() {
        let contents = fs::read_to_string(&paths.file)
            .map_err(|err| format!("read config {}: {}", paths.file.display(), err))?;
        let config: SyncConfig = toml::from_str(&contents)
            .map_err(|err| format!("parse config {}: {}", paths.file.display(), err))?;
        return Ok(ConfigLoad {
            config,
            paths,
            created: false,
        });
    }

    let config = SyncConfig::default();
    let contents =
        toml::to_string_pretty(&config).map_err(|err| format!("serialize config: {}", err))?;
    fs::write(&paths.file, contents)
        .map_err(|err| format!("write config {}: {}", paths.file.display(), err))?;

    Ok(ConfigLoad {
        config,
        paths,
        created: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_defaults_then_reads_them_back() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = temp.path().join("config");

        let first = load_or_create(&dir).expect("create config");
        assert!(first.created);
        assert_eq!(first.config, SyncConfig::default());

        fs::write(
            &first.paths.file,
            "machine_name = \"laptop\"\ncreate_backup = true\n",
        )
        .expect("edit config");
        let second = load_or_create(&dir).expect("load config");
        assert!(!second.created);
        assert_eq!(second.config.machine_name.as_deref(), Some("laptop"));
        assert!(second.config.create_backup);
        assert_eq!(second.config.backup_retention_days, 30);
    }
}
