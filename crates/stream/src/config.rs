use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one camera-stream connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// STUN server URLs used for candidate discovery on every attempt
    /// (default: Google's public STUN servers)
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
    /// Upper bound on local candidate discovery, in seconds. Discovery
    /// on some networks never reports complete, so negotiation
    /// proceeds with whatever was gathered when this elapses.
    #[serde(default = "default_gather_timeout")]
    pub gather_timeout_secs: u64,
    /// Timeout for the signaling HTTP exchange, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// First reconnection delay, in seconds
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_secs: u64,
    /// Reconnection delay cap, in seconds
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_secs: u64,
    /// How long to keep the session alive after the last viewer
    /// unsubscribes, in seconds. Camera tiles remount quickly on
    /// layout changes; tearing down eagerly would renegotiate for
    /// nothing. 0 = never tear down on idle.
    #[serde(default = "default_idle_linger")]
    pub idle_linger_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stun_urls: default_stun_urls(),
            gather_timeout_secs: default_gather_timeout(),
            request_timeout_secs: default_request_timeout(),
            base_retry_delay_secs: default_base_retry_delay(),
            max_retry_delay_secs: default_max_retry_delay(),
            idle_linger_secs: default_idle_linger(),
        }
    }
}

impl StreamConfig {
    pub fn gather_timeout(&self) -> Duration {
        Duration::from_secs(self.gather_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_secs(self.base_retry_delay_secs)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }

    /// Validate the configuration, returning a list of issues found.
    ///
    /// Issues are prefixed with "ERROR:" (fatal) or "WARNING:"
    /// (advisory, the manager can run but the config is likely wrong).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        for url in &self.stun_urls {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                issues.push(format!(
                    "ERROR: STUN URL '{}' must start with 'stun:' or 'stuns:'. \
                     Example: stun:stun.l.google.com:19302",
                    url
                ));
            }
        }

        if self.gather_timeout_secs == 0 {
            issues.push(
                "ERROR: gather_timeout_secs must be >= 1. \
                 Candidate discovery needs at least a moment to produce anything."
                    .to_string(),
            );
        }

        if self.request_timeout_secs == 0 {
            issues.push("ERROR: request_timeout_secs must be >= 1.".to_string());
        }

        if self.base_retry_delay_secs == 0 {
            issues.push(
                "ERROR: base_retry_delay_secs must be >= 1. \
                 A zero base delay hammers the endpoint on every failure."
                    .to_string(),
            );
        }

        if self.max_retry_delay_secs < self.base_retry_delay_secs {
            issues.push(format!(
                "ERROR: max_retry_delay_secs ({}) must be >= base_retry_delay_secs ({}).",
                self.max_retry_delay_secs, self.base_retry_delay_secs
            ));
        }

        if self.max_retry_delay_secs > 600 {
            issues.push(format!(
                "WARNING: max_retry_delay_secs is {} — a camera coming back online \
                 will not be noticed for up to that long. Typical values: 30-120.",
                self.max_retry_delay_secs
            ));
        }

        if self.idle_linger_secs > 0 && self.idle_linger_secs < 5 {
            issues.push(format!(
                "WARNING: idle_linger_secs is {} — viewer tiles remounting on layout \
                 changes will miss the window and renegotiate. Use 0 (never tear down) \
                 or at least 5.",
                self.idle_linger_secs
            ));
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

fn default_stun_urls() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun1.l.google.com:19302".to_string(),
    ]
}
fn default_gather_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    10
}
fn default_base_retry_delay() -> u64 {
    2
}
fn default_max_retry_delay() -> u64 {
    30
}
fn default_idle_linger() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_from_empty_string() {
        let config: StreamConfig =
            toml::from_str("").expect("empty string should deserialize to default config");

        assert_eq!(
            config.stun_urls,
            vec![
                "stun:stun.l.google.com:19302",
                "stun:stun1.l.google.com:19302",
            ]
        );
        assert_eq!(config.gather_timeout_secs, 5);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.base_retry_delay_secs, 2);
        assert_eq!(config.max_retry_delay_secs, 30);
        assert_eq!(config.idle_linger_secs, 30);
    }

    #[test]
    fn partial_config_keeps_remaining_defaults() {
        let toml_str = r#"
gather_timeout_secs = 3
idle_linger_secs = 0
"#;
        let config: StreamConfig =
            toml::from_str(toml_str).expect("partial config should deserialize");

        assert_eq!(config.gather_timeout_secs, 3);
        assert_eq!(config.idle_linger_secs, 0);
        assert_eq!(config.base_retry_delay_secs, 2);
        assert_eq!(config.max_retry_delay_secs, 30);
        assert_eq!(config.stun_urls.len(), 2);
    }

    #[test]
    fn default_trait_matches_empty_toml() {
        let from_toml: StreamConfig = toml::from_str("").expect("default config");
        let default = StreamConfig::default();
        assert_eq!(default.stun_urls, from_toml.stun_urls);
        assert_eq!(default.gather_timeout_secs, from_toml.gather_timeout_secs);
        assert_eq!(default.request_timeout_secs, from_toml.request_timeout_secs);
        assert_eq!(default.base_retry_delay_secs, from_toml.base_retry_delay_secs);
        assert_eq!(default.max_retry_delay_secs, from_toml.max_retry_delay_secs);
        assert_eq!(default.idle_linger_secs, from_toml.idle_linger_secs);
    }

    #[test]
    fn duration_accessors_convert_seconds() {
        let config = StreamConfig::default();
        assert_eq!(config.gather_timeout(), Duration::from_secs(5));
        assert_eq!(config.base_retry_delay(), Duration::from_secs(2));
        assert_eq!(config.max_retry_delay(), Duration::from_secs(30));
    }

    // --- Validation tests ---

    fn validate_issues(config: &StreamConfig) -> Vec<String> {
        match config.validate() {
            Ok(()) => vec![],
            Err(issues) => issues,
        }
    }

    fn has_error(issues: &[String], substring: &str) -> bool {
        issues
            .iter()
            .any(|i| i.starts_with("ERROR:") && i.contains(substring))
    }

    fn has_warning(issues: &[String], substring: &str) -> bool {
        issues
            .iter()
            .any(|i| i.starts_with("WARNING:") && i.contains(substring))
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(StreamConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_bad_stun_prefix_is_error() {
        let mut config = StreamConfig::default();
        config.stun_urls = vec!["http://stun.example.com:3478".to_string()];
        let issues = validate_issues(&config);
        assert!(has_error(&issues, "STUN URL"));
    }

    #[test]
    fn validate_stuns_prefix_is_ok() {
        let mut config = StreamConfig::default();
        config.stun_urls = vec!["stuns:stun.example.com:5349".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_zero_base_delay_is_error() {
        let mut config = StreamConfig::default();
        config.base_retry_delay_secs = 0;
        let issues = validate_issues(&config);
        assert!(has_error(&issues, "base_retry_delay_secs"));
    }

    #[test]
    fn validate_max_below_base_is_error() {
        let mut config = StreamConfig::default();
        config.base_retry_delay_secs = 10;
        config.max_retry_delay_secs = 5;
        let issues = validate_issues(&config);
        assert!(has_error(&issues, "max_retry_delay_secs"));
    }

    #[test]
    fn validate_zero_gather_timeout_is_error() {
        let mut config = StreamConfig::default();
        config.gather_timeout_secs = 0;
        let issues = validate_issues(&config);
        assert!(has_error(&issues, "gather_timeout_secs"));
    }

    #[test]
    fn validate_zero_request_timeout_is_error() {
        let mut config = StreamConfig::default();
        config.request_timeout_secs = 0;
        let issues = validate_issues(&config);
        assert!(has_error(&issues, "request_timeout_secs"));
    }

    #[test]
    fn validate_huge_max_delay_is_warning() {
        let mut config = StreamConfig::default();
        config.max_retry_delay_secs = 601;
        let issues = validate_issues(&config);
        assert!(has_warning(&issues, "max_retry_delay_secs"));
        assert!(!has_error(&issues, "max_retry_delay_secs"));
    }

    #[test]
    fn validate_tiny_linger_is_warning() {
        let mut config = StreamConfig::default();
        config.idle_linger_secs = 2;
        let issues = validate_issues(&config);
        assert!(has_warning(&issues, "idle_linger_secs"));
    }

    #[test]
    fn validate_zero_linger_is_ok() {
        let mut config = StreamConfig::default();
        config.idle_linger_secs = 0;
        assert!(config.validate().is_ok(), "0 means never tear down");
    }

    #[test]
    fn validate_multiple_errors_collected() {
        let mut config = StreamConfig::default();
        config.base_retry_delay_secs = 0;
        config.request_timeout_secs = 0;
        config.stun_urls = vec!["bogus".to_string()];
        let issues = validate_issues(&config);
        assert!(
            issues.len() >= 3,
            "expected at least 3 errors, got {}: {:?}",
            issues.len(),
            issues
        );
    }
}
