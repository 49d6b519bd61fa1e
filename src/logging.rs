use anyhow::{Context, Result};
use log::{error, info, warn};
use std::fs;
use std::path::Path;

/// Routes `log` records to stdout and `log_file`.
pub fn setup_logging(log_file: &Path, level: log::LevelFilter) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .chain(
            fern::log_file(log_file)
                .with_context(|| format!("Failed to open log file {}", log_file.display()))?,
        )
        .apply()
        .context("Logger already initialized")?;
    Ok(())
}

/// Keeps only the last `max_lines` lines of the log file.
pub fn trim_log(log_file: &Path, max_lines: usize) {
    let content = match fs::read_to_string(log_file) {
        Ok(content) => content,
        Err(_) => {
            warn!("Log file not found for trimming");
            return;
        }
    };
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= max_lines {
        return;
    }
    let start = lines.len() - max_lines;
    let trimmed = lines[start..].join("\n");
    if fs::write(log_file, trimmed + "\n").is_ok() {
        info!("Trimmed log file to {} lines", max_lines);
    } else {
        error!("Failed to trim log file");
    }
}
