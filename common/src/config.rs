use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub database_path: String,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    pub fn init(env_path: &str) -> &'static Self {
        dotenvy::from_filename(env_path).ok();

        CONFIG.get_or_init(|| {
            let project_name =
                env::var("PROJECT_NAME").unwrap_or_else(|_| "cycle-ledger".into());
            let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".into());
            let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "logs/ledger.log".into());
            let database_path = env::var("DATABASE_PATH").expect("DATABASE_PATH must be set");

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                fs::create_dir_all(parent).expect("Failed to create log directory");
            }

            Config {
                project_name,
                log_level,
                log_file,
                database_path,
            }
        })
    }

    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config not initialized")
    }
}

/// Database path resolution that works without a fully initialized `Config`,
/// used by `db::connect` and the migration runner.
pub fn database_path() -> String {
    if let Some(cfg) = CONFIG.get() {
        return cfg.database_path.clone();
    }
    dotenvy::dotenv().ok();
    env::var("DATABASE_PATH").expect("DATABASE_PATH must be set")
}
