use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

use crate::budget::DEFAULT_POST_LIMIT;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub catalog_url: String,
    pub catalog_token: Option<String>,
    pub render_url: String,
    pub platform_url: String,
    pub platform_token: String,
    pub budget_path: String,
    pub budget_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_url: "./data/pending_games.json".into(),
            catalog_token: None,
            render_url: "http://127.0.0.1:8601/render".into(),
            platform_url: "http://127.0.0.1:8602/threads".into(),
            platform_token: "devtoken".into(),
            budget_path: "./data/post_budget.json".into(),
            budget_limit: DEFAULT_POST_LIMIT,
        }
    }
}

pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();

    let path = config_path.unwrap_or_else(|| Path::new("worker.toml"));
    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("catalog_url") {
                settings.catalog_url = v.clone();
            }
            if let Some(v) = file_cfg.get("catalog_token") {
                settings.catalog_token = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("render_url") {
                settings.render_url = v.clone();
            }
            if let Some(v) = file_cfg.get("platform_url") {
                settings.platform_url = v.clone();
            }
            if let Some(v) = file_cfg.get("platform_token") {
                settings.platform_token = v.clone();
            }
            if let Some(v) = file_cfg.get("budget_path") {
                settings.budget_path = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("CATALOG_URL") {
        settings.catalog_url = v;
    }
    if let Ok(v) = std::env::var("WORKER__CATALOG_URL") {
        settings.catalog_url = v;
    }

    if let Ok(v) = std::env::var("CATALOG_TOKEN") {
        settings.catalog_token = Some(v);
    }
    if let Ok(v) = std::env::var("WORKER__CATALOG_TOKEN") {
        settings.catalog_token = Some(v);
    }

    if let Ok(v) = std::env::var("RENDER_URL") {
        settings.render_url = v;
    }
    if let Ok(v) = std::env::var("WORKER__RENDER_URL") {
        settings.render_url = v;
    }

    if let Ok(v) = std::env::var("PLATFORM_URL") {
        settings.platform_url = v;
    }
    if let Ok(v) = std::env::var("WORKER__PLATFORM_URL") {
        settings.platform_url = v;
    }

    if let Ok(v) = std::env::var("PLATFORM_TOKEN") {
        settings.platform_token = v;
    }
    if let Ok(v) = std::env::var("WORKER__PLATFORM_TOKEN") {
        settings.platform_token = v;
    }

    if let Ok(v) = std::env::var("WORKER__BUDGET_PATH") {
        settings.budget_path = v;
    }

    if let Ok(v) = std::env::var("WORKER__BUDGET_LIMIT") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.budget_limit = parsed;
        }
    }

    settings
}

/// Catalog locations are URLs for the hosted store and bare paths for the
/// JSON file store.
pub fn is_remote_catalog(catalog_url: &str) -> bool {
    catalog_url.starts_with("http://") || catalog_url.starts_with("https://")
}
