//! Log level parsing and subscriber setup.

use tracing::Level;

/// `TRACE`, `DEBUG`, `INFO`, `WARNING` (or `WARN`), `ERROR`, any case.
pub fn parse_level(text: &str) -> Option<Level> {
    match text.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARNING" | "WARN" => Some(Level::WARN),
        "ERROR" => Some(Level::ERROR),
        _ => None,
    }
}

/// Installs the global fmt subscriber on stderr. Unknown levels fall back to
/// INFO with a notice.
pub fn init(level: &str) {
    let parsed = parse_level(level);
    let installed = tracing_subscriber::fmt()
        .with_max_level(parsed.unwrap_or(Level::INFO))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    if installed.is_err() {
        return;
    }
    if parsed.is_none() {
        tracing::info!("Unknown log level {:?}, using INFO", level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_case_insensitive() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" Warning "), Some(Level::WARN));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("verbose"), None);
    }
}
