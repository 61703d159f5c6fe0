use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        let config_path = env::var("DOCQA_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("config.yml"));
        Self::with_data_dir(data_dir, config_path)
    }

    /// Builds paths rooted at `data_dir`, creating the log directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let log_dir = data_dir.join("logs");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            config_path: config_path.into(),
        }
    }

    /// Resolves a configured path relative to the data directory.
    pub fn resolve(&self, raw: &Path) -> PathBuf {
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.data_dir.join(raw)
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOCQA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_under_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_data_dir(tmp.path(), tmp.path().join("config.yml"));

        assert!(paths.log_dir.is_dir());
        assert_eq!(paths.resolve(Path::new("index_db")), tmp.path().join("index_db"));
        assert_eq!(paths.resolve(Path::new("/srv/index")), PathBuf::from("/srv/index"));
    }
}
