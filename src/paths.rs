use std::path::{Path, PathBuf};

const BASE_DIR_ENV: &str = "FURIGANA_ANNOTATOR_DIR";
const DEFAULT_DIR_NAME: &str = ".furigana-annotator";

pub(crate) fn base_dir() -> PathBuf {
    if let Some(dir) = base_dir_override() {
        return dir;
    }
    home_join(DEFAULT_DIR_NAME).unwrap_or_else(|| PathBuf::from(DEFAULT_DIR_NAME))
}

pub(crate) fn storage_dir(configured: Option<&str>) -> PathBuf {
    configured
        .and_then(normalize_dir)
        .unwrap_or_else(|| base_dir().join("storage"))
}

pub(crate) fn sync_store_path(dir: &Path) -> PathBuf {
    dir.join("sync.json")
}

pub(crate) fn local_store_path(dir: &Path) -> PathBuf {
    dir.join("local.json")
}

fn base_dir_override() -> Option<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn home_join(suffix: &str) -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(suffix))
        }
    })
}

fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_tilde(trimmed);
    Some(normalize_path(PathBuf::from(expanded)))
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        normalized.push(component.as_os_str());
    }
    normalized
}

fn expand_tilde(value: &str) -> String {
    if value == "~" || value.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let home = home.trim();
            if home.is_empty() {
                return value.to_string();
            }
            if value == "~" {
                return home.to_string();
            }
            return format!("{}{}", home, &value[1..]);
        }
    }
    value.to_string()
}
