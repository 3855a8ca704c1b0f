use anyhow::{Result, anyhow};
use serde_json::{Map, Value};
use std::path::Path;

pub mod align;
pub mod background;
pub mod coloring;
pub mod config;
pub mod dom;
pub mod extract;
pub mod filters;
pub mod hover;
pub mod kana;
pub mod logging;
pub mod manager;
pub mod messages;
mod paths;
pub mod reading;
pub mod server;
pub mod services;
pub mod settings;
pub mod storage;
pub mod token;
pub mod wrap;

#[cfg(test)]
mod test_util;

pub use config::{Config, load_config};
pub use kana::ReadingMode;
pub use manager::{LinguisticsManager, ManagerOptions};
pub use messages::{Request, Response};
pub use services::Services;
pub use storage::Stores;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub settings_path: Option<String>,
    pub tokenizer_url: Option<String>,
    pub readings: bool,
    pub colors: bool,
    pub reading_type: Option<ReadingMode>,
    pub dark: Option<bool>,
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub clear_excluded: bool,
    pub show_excluded: bool,
}

impl RunOptions {
    fn edits_word_list(&self) -> bool {
        self.clear_excluded || !self.exclude.is_empty() || !self.include.is_empty()
    }
}

pub fn resolve_config(options: &RunOptions) -> Result<Config> {
    let settings_path = options.settings_path.as_deref().map(Path::new);
    let mut config = load_config(settings_path)?;
    if let Some(url) = options.tokenizer_url.as_deref() {
        config.tokenizer_url = url.trim().to_string();
    }
    Ok(config)
}

pub async fn run(options: RunOptions, input: Option<String>) -> Result<String> {
    let config = resolve_config(&options)?;
    let stores = Stores::from_config(&config);
    let services = Services::from_config(&config)?;
    let html = input.unwrap_or_default();
    annotate(&html, &options, &stores, services, ManagerOptions::from(&config)).await
}

pub async fn run_server(options: RunOptions, addr: String) -> Result<()> {
    let config = resolve_config(&options)?;
    server::run_server(config, addr).await
}

pub async fn annotate(
    html: &str,
    options: &RunOptions,
    stores: &Stores,
    services: Services,
    manager_options: ManagerOptions,
) -> Result<String> {
    let document = dom::parse_document(html);
    let mut manager =
        LinguisticsManager::initialize(document, stores, services, manager_options).await?;

    if options.clear_excluded {
        manager.clear_excluded_tokens().await?;
    }
    for surface in &options.include {
        manager.include_token(surface).await?;
    }
    for surface in &options.exclude {
        manager.exclude_token(surface).await?;
    }
    if options.show_excluded {
        return Ok(manager.filter().surfaces().join("\n"));
    }
    if html.trim().is_empty() {
        if options.edits_word_list() {
            return Ok(String::new());
        }
        return Err(anyhow!("stdin is empty"));
    }

    let mut updates = Map::new();
    if let Some(mode) = options.reading_type {
        updates.insert("readingType".to_string(), Value::from(mode.as_str()));
    }
    if let Some(dark) = options.dark {
        updates.insert("darkMode".to_string(), Value::Bool(dark));
    }
    if !updates.is_empty() {
        manager.update_settings(&updates).await?;
    }

    let both = !options.readings && !options.colors;
    if options.readings || both {
        manager.add_readings().await?;
        if !options.colors && !both {
            manager.remove_pos_annotations();
        }
    } else {
        manager.add_pos_annotations().await?;
    }
    Ok(manager.html())
}
