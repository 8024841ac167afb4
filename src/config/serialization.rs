//! TOML output for the config file template and `config --show`

use super::Config;

impl Config {
    /// Serialize config to TOML string (single source of truth for format)
    pub fn to_toml(&self) -> String {
        format!(
            r#"# cerberus configuration

# Scan server base URL (CERBERUS_API_URL overrides)
api_url = "{api_url}"

# Directory for event journals (CERBERUS_LOG_DIR overrides)
log_dir = "{log_dir}"

# Toast notifications
[notifications]
duration_ms = {toast_ms}

# HTTP client timeouts (never applied to the scan stream itself)
[http]
request_timeout_secs = {request_timeout}
connect_timeout_secs = {connect_timeout}

# Feature flags
[features]
journal = {journal}
refresh_on_complete = {refresh}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# File logging (in addition to the shell buffer or stderr)
file_enabled = {log_file_enabled}
file_dir = "{log_file_dir}"
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"
"#,
            api_url = self.api_url,
            log_dir = self.log_dir.display(),
            toast_ms = self.notifications.duration.as_millis(),
            request_timeout = self.http.request_timeout.as_secs(),
            connect_timeout = self.http.connect_timeout.as_secs(),
            journal = self.features.journal,
            refresh = self.features.refresh_on_complete,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = self.logging.file_dir.display(),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = self.logging.file_prefix,
        )
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = Self::config_path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config path",
            ));
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, self.to_toml())
    }
}
