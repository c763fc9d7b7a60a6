use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub export_dir: PathBuf,
    pub db_path: PathBuf,
    pub rag_db_path: PathBuf,
    pub config_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = env::var("HELPDESK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let log_dir = env::var("HELPDESK_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        let mut paths = Self::layout(&data_dir, log_dir);
        if let Ok(config_path) = env::var("HELPDESK_CONFIG_PATH") {
            paths.config_path = PathBuf::from(config_path);
        }
        paths
    }

    /// Every path rooted in one directory; used by tests and embedded setups.
    pub fn under(root: &Path) -> Self {
        let paths = Self::layout(root, root.join("logs"));
        if let Err(err) = paths.ensure_dirs() {
            tracing::warn!("Failed to create directories under {}: {}", root.display(), err);
        }
        paths
    }

    fn layout(data_dir: &Path, log_dir: PathBuf) -> Self {
        AppPaths {
            data_dir: data_dir.to_path_buf(),
            log_dir,
            export_dir: data_dir.join("exports"),
            db_path: data_dir.join("helpdesk.db"),
            rag_db_path: data_dir.join("rag.db"),
            config_path: data_dir.join("config.yml"),
            secrets_path: data_dir.join("secrets.yaml"),
        }
    }

    /// Creates the data, log and export directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.data_dir, &self.log_dir, &self.export_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
