use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

#[derive(Debug, Clone)]
pub struct Config {
    pub tokenizer_url: String,
    pub dictionary_url: String,
    pub timeout: Duration,
    pub storage_dir: Option<String>,
    pub sync_quota_bytes: Option<usize>,
    pub sync_quota_bytes_per_item: Option<usize>,
    pub root_selector: String,
    pub skip_non_japanese: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tokenizer_url: "http://localhost:8000/".to_string(),
            dictionary_url: "https://jisho.org/".to_string(),
            timeout: Duration::from_secs(30),
            storage_dir: None,
            sync_quota_bytes: Some(102_400),
            sync_quota_bytes_per_item: Some(8_192),
            root_selector: "main".to_string(),
            skip_non_japanese: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    services: Option<ServicesSection>,
    storage: Option<StorageSection>,
    extract: Option<ExtractSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicesSection {
    tokenizer_url: Option<String>,
    dictionary_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSection {
    directory: Option<String>,
    sync_quota_bytes: Option<usize>,
    sync_quota_bytes_per_item: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractSection {
    root_selector: Option<String>,
    skip_non_japanese: Option<bool>,
}

// Loads the embedded defaults, then every config file that exists, in order:
// `./furigana.toml`, `./furigana.local.toml`, `<base>/config.toml`, `extra_path`.
pub fn load_config(extra_path: Option<&Path>) -> Result<Config> {
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("config file not found: {}", extra.display()));
        }
    }
    ensure_home_config_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("furigana.toml"),
        PathBuf::from("furigana.local.toml"),
        paths::base_dir().join("config.toml"),
    ];
    if let Some(extra) = extra_path {
        ordered_paths.push(extra.to_path_buf());
    }

    load_config_from(&ordered_paths)
}

pub(crate) fn load_config_from(paths: &[PathBuf]) -> Result<Config> {
    let mut config = Config::default();
    let defaults: ConfigFile =
        toml::from_str(DEFAULT_CONFIG_TOML).with_context(|| "failed to parse embedded config")?;
    config.merge(defaults);

    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let parsed: ConfigFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            config.merge(parsed);
        }
    }

    Ok(config)
}

impl Config {
    fn merge(&mut self, incoming: ConfigFile) {
        if let Some(services) = incoming.services {
            if let Some(url) = services.tokenizer_url {
                if !url.trim().is_empty() {
                    self.tokenizer_url = url;
                }
            }
            if let Some(url) = services.dictionary_url {
                if !url.trim().is_empty() {
                    self.dictionary_url = url;
                }
            }
            if let Some(secs) = services.timeout_secs {
                if secs > 0 {
                    self.timeout = Duration::from_secs(secs);
                }
            }
        }
        if let Some(storage) = incoming.storage {
            if let Some(directory) = storage.directory {
                self.storage_dir = if directory.trim().is_empty() {
                    None
                } else {
                    Some(directory)
                };
            }
            if let Some(quota) = storage.sync_quota_bytes {
                self.sync_quota_bytes = (quota > 0).then_some(quota);
            }
            if let Some(quota) = storage.sync_quota_bytes_per_item {
                self.sync_quota_bytes_per_item = (quota > 0).then_some(quota);
            }
        }
        if let Some(extract) = incoming.extract {
            if let Some(selector) = extract.root_selector {
                if !selector.trim().is_empty() {
                    self.root_selector = selector;
                }
            }
            if let Some(skip) = extract.skip_non_japanese {
                self.skip_non_japanese = skip;
            }
        }
    }
}

fn ensure_home_config_file() -> Result<()> {
    let dir = paths::base_dir();
    if std::env::var("HOME").is_err() && std::env::var("FURIGANA_ANNOTATOR_DIR").is_err() {
        return Ok(());
    }
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory: {}", dir.display()))?;
    let path = dir.join("config.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("failed to write config: {}", path.display()))?;
    }
    Ok(())
}
