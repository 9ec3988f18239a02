use crate::hasher::{HashAlgorithm, DEFAULT_CHUNK_SIZE};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub hash_algorithm: HashAlgorithm,
    pub chunk_size: usize,
    /// 0 means one worker per hardware thread.
    pub hash_workers: usize,
    pub follow_symlinks: bool,
    pub deterministic: bool,
    pub crawl_workers: usize,
    pub ignore_patterns: Vec<String>,
    pub plan_dir: Option<PathBuf>,
    pub journal_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            hash_workers: 0,
            follow_symlinks: false,
            deterministic: true,
            crawl_workers: 1,
            ignore_patterns: Vec::new(),
            plan_dir: None,
            journal_path: None,
        }
    }
}

impl AppConfig {
    /// `plan_dir` if set, otherwise `<user cache dir>/unduper/dedup`.
    pub fn plan_dir(&self) -> PathBuf {
        self.plan_dir.clone().unwrap_or_else(default_plan_dir)
    }
}

pub fn default_plan_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("unduper")
        .join("dedup")
}

/// `Config.toml` in the working directory (optional), then `UNDUPER_*`
/// environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_from("Config")
}

pub fn load_from(name: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(name).required(false))
        .add_source(Environment::with_prefix("UNDUPER").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempdir().unwrap();
        let config = load_from(tmp.path().join("absent").to_str().unwrap()).unwrap();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Xxh3);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.deterministic);
        assert!(!config.follow_symlinks);
        assert!(config.journal_path.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let tmp = tempdir().unwrap();
        let base = tmp.path().join("Custom");
        fs::write(
            base.with_extension("toml"),
            r#"
hash_algorithm = "blake3"
hash_workers = 3
ignore_patterns = ["**/.git"]
plan_dir = "/tmp/plans"
"#,
        )
        .unwrap();

        let config = load_from(base.to_str().unwrap()).unwrap();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.hash_workers, 3);
        assert_eq!(config.ignore_patterns, vec!["**/.git".to_string()]);
        assert_eq!(config.plan_dir(), PathBuf::from("/tmp/plans"));
        // untouched fields keep their defaults
        assert_eq!(config.crawl_workers, 1);
    }

    #[test]
    fn renders_as_toml() {
        let rendered = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(rendered.contains("hash_algorithm = \"xxh3\""));
    }
}
