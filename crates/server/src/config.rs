use std::{fs, path::Path};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub max_page_size: u32,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/hiring.db".into(),
            max_page_size: server_api::DEFAULT_MAX_PAGE_SIZE,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

/// Optional keys of `server.toml`.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    database_url: Option<String>,
    max_page_size: Option<u32>,
    body_limit_bytes: Option<usize>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    match read_file_settings(Path::new("server.toml")) {
        Ok(Some(file_cfg)) => apply_file_settings(&mut settings, file_cfg),
        Ok(None) => {}
        Err(error) => warn!(%error, "ignoring unreadable server.toml"),
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn read_file_settings(path: &Path) -> anyhow::Result<Option<FileSettings>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let parsed = toml::from_str(&raw)
        .with_context(|| format!("failed to parse '{}'", path.display()))?;
    Ok(Some(parsed))
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.max_page_size {
        settings.max_page_size = v;
    }
    if let Some(v) = file_cfg.body_limit_bytes {
        settings.body_limit_bytes = v;
    }
}

/// Later keys win: `APP__*` overrides the short legacy names.
fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = lookup("APP__MAX_PAGE_SIZE") {
        match v.parse::<u32>() {
            Ok(parsed) if parsed > 0 => settings.max_page_size = parsed,
            _ => warn!(value = %v, "ignoring invalid APP__MAX_PAGE_SIZE"),
        }
    }
    if let Some(v) = lookup("APP__BODY_LIMIT_BYTES") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.body_limit_bytes = parsed,
            Err(_) => warn!(value = %v, "ignoring invalid APP__BODY_LIMIT_BYTES"),
        }
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> String {
    if raw_database_url.trim().is_empty() {
        return Settings::default().database_url;
    }
    storage::normalize_database_url(raw_database_url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
