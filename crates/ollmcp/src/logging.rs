//! Logging setup.
//!
//! Logs go to a file so the interactive prompt stays clean.

use std::path::PathBuf;

/// Initialize file logging. Returns the log file path, or `None` if the
/// file could not be opened.
pub fn init_logging(verbose: bool) -> Option<PathBuf> {
    let filter = if verbose {
        "ollmcp=debug,ollmcp_core=debug,ollmcp_mcp=debug,ollmcp_provider=debug"
    } else {
        "ollmcp=info,ollmcp_core=info,ollmcp_mcp=info,ollmcp_provider=info"
    };

    let log_dir = get_log_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {e}");
        return None;
    }

    let log_file = log_dir.join("ollmcp.log");
    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            return None;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(file)
        .init();

    Some(log_file)
}

/// Log directory for the platform.
fn get_log_dir() -> PathBuf {
    // macOS: ~/Library/Logs/ollmcp
    // Linux: ~/.local/state/ollmcp/logs
    // Windows: %LOCALAPPDATA%/ollmcp/logs

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            return home.join("Library/Logs/ollmcp");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(state_dir) = dirs::state_dir() {
            return state_dir.join("ollmcp/logs");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".local/state/ollmcp/logs");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(local_app) = dirs::data_local_dir() {
            return local_app.join("ollmcp/logs");
        }
    }

    PathBuf::from(".ollmcp/logs")
}
