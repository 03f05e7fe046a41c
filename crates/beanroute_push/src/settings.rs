use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::PushError;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_APP_NAME: &str = "BeanRoute";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_STATUS_POLL_INTERVAL_MS: u64 = 30_000;
const DEFAULT_CONFIRMATION_DELAY_MS: u64 = 1_000;
const DEFAULT_WORKER_TAKEOVER_DELAY_MS: u64 = 1_000;

/// Tunables for the push controller.
///
/// Every field has a default so a partial JSON file is fine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Upper bound for every network call and the permission prompt.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
    /// Pause between an optimistic subscribe and the confirming status check.
    #[serde(default = "default_confirmation_delay_ms")]
    pub confirmation_delay_ms: u64,
    /// Pause after asking a waiting worker to take control.
    #[serde(default = "default_worker_takeover_delay_ms")]
    pub worker_takeover_delay_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_status_poll_interval_ms() -> u64 {
    DEFAULT_STATUS_POLL_INTERVAL_MS
}

fn default_confirmation_delay_ms() -> u64 {
    DEFAULT_CONFIRMATION_DELAY_MS
}

fn default_worker_takeover_delay_ms() -> u64 {
    DEFAULT_WORKER_TAKEOVER_DELAY_MS
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            app_name: default_app_name(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            status_poll_interval_ms: DEFAULT_STATUS_POLL_INTERVAL_MS,
            confirmation_delay_ms: DEFAULT_CONFIRMATION_DELAY_MS,
            worker_takeover_delay_ms: DEFAULT_WORKER_TAKEOVER_DELAY_MS,
        }
    }
}

impl PushSettings {
    /// Load settings from a JSON file. A missing file gives the defaults,
    /// a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PushError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(PushError::Config(format!(
                    "could not read {}: {err}",
                    path.display()
                )))
            }
        };

        let settings: PushSettings = serde_json::from_str(&contents)
            .map_err(|e| PushError::Config(format!("invalid settings {}: {e}", path.display())))?;
        settings.base()?;

        info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// The parsed backend base url.
    pub fn base(&self) -> Result<Url, PushError> {
        Url::parse(&self.base_url)
            .map_err(|e| PushError::Config(format!("invalid base url '{}': {e}", self.base_url)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn confirmation_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation_delay_ms)
    }

    pub fn worker_takeover_delay(&self) -> Duration {
        Duration::from_millis(self.worker_takeover_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = PushSettings::load(dir.path().join("push.json")).expect("defaults");
        assert_eq!(settings, PushSettings::default());
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.status_poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{ "base_url": "https://beans.example.com", "status_poll_interval_ms": 5000 }}"#
        )
        .expect("write");

        let settings = PushSettings::load(file.path()).expect("settings");
        assert_eq!(settings.base_url, "https://beans.example.com");
        assert_eq!(settings.status_poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.confirmation_delay(), Duration::from_secs(1));
        assert_eq!(settings.app_name, "BeanRoute");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "{{ not json").expect("write");
        assert!(matches!(
            PushSettings::load(file.path()),
            Err(PushError::Config(_))
        ));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{ "base_url": "not a url" }}"#).expect("write");
        assert!(matches!(
            PushSettings::load(file.path()),
            Err(PushError::Config(_))
        ));
    }
}
