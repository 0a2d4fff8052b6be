use anyhow::{Context, Result, anyhow};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/";
pub const DEFAULT_RESOURCE_PATH: &str = "api/personas/";
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(500);

/// What a uniqueness probe resolves to when the store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeFailurePolicy {
    /// Resolve to `Available`; a real duplicate surfaces at submission.
    #[default]
    FailOpen,
    /// Resolve to `CheckFailed`; still permissive, but the form tells the user.
    Surface,
}

impl FromStr for ProbeFailurePolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "fail-open" | "fail_open" | "open" => Ok(Self::FailOpen),
            "surface" | "report" => Ok(Self::Surface),
            _ => Err(format!(
                "unknown probe failure policy '{raw}' (expected fail-open or surface)"
            )),
        }
    }
}

impl fmt::Display for ProbeFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailOpen => f.write_str("fail-open"),
            Self::Surface => f.write_str("surface"),
        }
    }
}

/// Client configuration
///
/// Built with chained setters or read from `PERSONA_*` environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the persona API, with trailing slash
    pub endpoint: String,

    /// Resource path below the endpoint, with trailing slash
    pub resource_path: String,

    /// Debounce window of the identifier uniqueness check
    pub quiescence: Duration,

    /// Outcome of a probe that fails for reasons other than "not found"
    pub probe_failure: ProbeFailurePolicy,

    /// Per-request timeout. None means requests may stay pending indefinitely.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            resource_path: DEFAULT_RESOURCE_PATH.to_string(),
            quiescence: DEFAULT_QUIESCENCE,
            probe_failure: ProbeFailurePolicy::default(),
            request_timeout: None,
        }
    }

    /// Set the resource path
    pub fn resource_path(mut self, path: &str) -> Self {
        self.resource_path = path.to_string();
        self
    }

    /// Set the debounce window
    pub fn quiescence(mut self, window: Duration) -> Self {
        self.quiescence = window;
        self
    }

    /// Set the probe failure policy
    pub fn probe_failure(mut self, policy: ProbeFailurePolicy) -> Self {
        self.probe_failure = policy;
        self
    }

    /// Set a per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Full URL of the collection resource.
    pub fn resource_url(&self) -> String {
        let endpoint = if self.endpoint.ends_with('/') {
            self.endpoint.clone()
        } else {
            format!("{}/", self.endpoint)
        };
        format!("{}{}", endpoint, self.resource_path.trim_start_matches('/'))
    }

    /// Reads `PERSONA_*` variables, honouring a `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("PERSONA_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let mut config = Self::new(&endpoint);

        if let Some(path) = lookup("PERSONA_RESOURCE_PATH") {
            config.resource_path = path;
        }

        if let Some(raw) = lookup("PERSONA_DEBOUNCE_MS") {
            let millis = raw
                .parse::<u64>()
                .context("PERSONA_DEBOUNCE_MS must be a valid u64")?;
            config.quiescence = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("PERSONA_PROBE_FAILURE") {
            config.probe_failure = raw.parse::<ProbeFailurePolicy>().map_err(|e| anyhow!(e))?;
        }

        if let Some(raw) = lookup("PERSONA_TIMEOUT_MS") {
            let millis = raw
                .parse::<u64>()
                .context("PERSONA_TIMEOUT_MS must be a valid u64")?;
            config.request_timeout = Some(Duration::from_millis(millis));
        }

        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("endpoint cannot be empty".to_string());
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err("endpoint must start with http:// or https://".to_string());
        }

        if !self.resource_path.ends_with('/') {
            return Err("resource_path must end with '/'".to_string());
        }

        if self.quiescence.is_zero() {
            return Err("quiescence window must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "http://localhost:3000/");
        assert_eq!(config.quiescence, Duration::from_millis(500));
        assert_eq!(config.probe_failure, ProbeFailurePolicy::FailOpen);
        assert!(config.request_timeout.is_none());
        assert_eq!(config.resource_url(), "http://localhost:3000/api/personas/");
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::new("https://api.example.com")
            .resource_path("/v2/people/")
            .quiescence(Duration::from_millis(250))
            .probe_failure(ProbeFailurePolicy::Surface)
            .request_timeout(Duration::from_secs(5));

        assert_eq!(config.resource_url(), "https://api.example.com/v2/people/");
        assert_eq!(config.quiescence, Duration::from_millis(250));
        assert_eq!(config.probe_failure, ProbeFailurePolicy::Surface);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("PERSONA_ENDPOINT", "http://10.0.0.5:8080/"),
            ("PERSONA_DEBOUNCE_MS", "300"),
            ("PERSONA_PROBE_FAILURE", "surface"),
            ("PERSONA_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint, "http://10.0.0.5:8080/");
        assert_eq!(config.quiescence, Duration::from_millis(300));
        assert_eq!(config.probe_failure, ProbeFailurePolicy::Surface);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(ClientConfig::from_lookup(lookup(&[("PERSONA_DEBOUNCE_MS", "soon")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("PERSONA_PROBE_FAILURE", "retry")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("PERSONA_ENDPOINT", "ftp://x/")])).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::default()
            .quiescence(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ClientConfig::default()
            .resource_path("api/personas")
            .validate()
            .is_err());
    }
}
