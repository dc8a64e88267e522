pub mod models;
pub mod test_utils;

use common::config;
use sea_orm::{Database, DatabaseConnection};
use std::path::Path;

fn is_dsn(value: &str) -> bool {
    value.starts_with("sqlite:") || value.contains("://")
}

/// Open the configured database. A bare path is treated as a SQLite file;
/// the parent directory is created on demand since SQLite will not.
pub async fn connect() -> DatabaseConnection {
    let configured = config::database_path();
    let url = if is_dsn(&configured) {
        configured
    } else {
        if let Some(parent) = Path::new(&configured).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        format!("sqlite://{configured}?mode=rwc")
    };

    Database::connect(&url)
        .await
        .expect("Failed to connect to database")
}
