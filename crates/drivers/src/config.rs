use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// Root of the served files; exports land in `processed/<project id>/`.
    pub public_path: PathBuf,
    pub uploads_path: PathBuf,
    pub exports_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db/development.sqlite3"),
            public_path: PathBuf::from("public"),
            uploads_path: PathBuf::from("uploads"),
            exports_path: PathBuf::from("exports"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path = |key: &str, fallback: PathBuf| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(fallback)
        };
        Self {
            database_path: path("DB_PATH", defaults.database_path),
            public_path: path("PUBLIC_PATH", defaults.public_path),
            uploads_path: path("UPLOADS_PATH", defaults.uploads_path),
            exports_path: path("EXPORTS_PATH", defaults.exports_path),
        }
    }

    pub fn ensure_directories(&self) -> io::Result<()> {
        let processed = self.public_path.join("processed");
        let mut dirs: Vec<&Path> = vec![
            &self.public_path,
            &processed,
            &self.uploads_path,
            &self.exports_path,
        ];
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent);
            }
        }
        for dir in dirs {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [("DB_PATH", "/data/app.sqlite3"), ("PUBLIC_PATH", "  ")]
            .into_iter()
            .collect();

        let config = AppConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()));

        assert_eq!(config.database_path, PathBuf::from("/data/app.sqlite3"));
        assert_eq!(config.public_path, PathBuf::from("public"));
        assert_eq!(config.uploads_path, PathBuf::from("uploads"));
    }

    #[test]
    fn ensure_directories_creates_layout() {
        let dir = TempDir::new().expect("tempdir");
        let config = AppConfig {
            database_path: dir.path().join("db").join("test.sqlite3"),
            public_path: dir.path().join("public"),
            uploads_path: dir.path().join("uploads"),
            exports_path: dir.path().join("exports"),
        };

        config.ensure_directories().expect("directories");

        assert!(dir.path().join("public").join("processed").is_dir());
        assert!(dir.path().join("uploads").is_dir());
        assert!(dir.path().join("exports").is_dir());
        assert!(dir.path().join("db").is_dir());
    }
}
