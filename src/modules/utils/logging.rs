use env_logger::{Builder, Env, WriteStyle};
use log::{info, log, Level, LevelFilter, SetLoggerError};
use std::fs::OpenOptions;
use std::path::Path;

/// Initialize logging to an append-only file
pub fn initialize_logging(path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
    // Create or append to log file
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Initialize logging to stderr, honouring `RUST_LOG` (default `warn`)
pub fn init_console_logging() -> Result<(), SetLoggerError> {
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .write_style(WriteStyle::Auto)
        .try_init()
}

/// Mask an identifier so logs never carry it in full
pub(crate) fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

fn event_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Add structured logging for authentication events
pub fn log_auth_event(event_type: &str, account: &str, success: bool, details: Option<&str>) {
    let level = if success { Level::Info } else { Level::Warn };
    log!(
        level,
        "Auth event: type={}, user={}, success={}, timestamp={}, details={:?}",
        event_type,
        format_sensitive(account),
        success,
        event_timestamp(),
        details
    );
}

/// Add structured logging for data operations
pub fn log_data_operation(
    operation: &str,
    user: &str,
    resource: &str,
    success: bool,
    details: Option<&str>,
) {
    let level = if success { Level::Info } else { Level::Error };
    log!(
        level,
        "Data operation: op={}, user={}, resource={}, success={}, timestamp={}, details={:?}",
        operation,
        format_sensitive(user),
        resource,
        success,
        event_timestamp(),
        details
    );
}
