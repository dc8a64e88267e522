use chrono::Local;
use colored::{ColoredString, Colorize};
use fern::Dispatch;
use log::{Level, LevelFilter};
use std::fs::{OpenOptions, create_dir_all};
use std::path::Path;
use std::str::FromStr;

fn paint_level(level: Level) -> ColoredString {
    match level {
        Level::Error => "ERROR".red(),
        Level::Warn => "WARN".yellow(),
        Level::Info => "INFO".green(),
        Level::Debug => "DEBUG".cyan(),
        Level::Trace => "TRACE".normal(),
    }
}

/// Wire up the global logger: colored stdout plus an append-only log file.
/// Unknown level strings fall back to `info`.
pub fn init_logger(log_level: &str, log_file_path: &str) {
    if let Some(parent) = Path::new(log_file_path).parent() {
        if !parent.exists() {
            create_dir_all(parent).expect("Failed to create log directory");
        }
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .expect("Cannot open log file");

    let level = LevelFilter::from_str(log_level).unwrap_or(LevelFilter::Info);

    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:>5} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                paint_level(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .expect("Failed to initialize logger");
}
