use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:1188";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_WORKERS: usize = 5;
pub const DEFAULT_MAX_SEGMENT_LEN: usize = 4096;
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HEALTH_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_LOG_BUFFER_LINES: usize = 1000;
pub const ENV_ENDPOINTS: &str = "TRANSLATE_BALANCER_ENDPOINTS";
pub const ENV_LISTEN_ADDR: &str = "TRANSLATE_BALANCER_LISTEN";

/// Validated, de-duplicated list of backend endpoint URLs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<String>")]
pub struct EndpointList(Vec<String>);

impl EndpointList {
    pub fn new<I, S>(addresses: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for address in addresses {
            let address: String = address.into();
            let address = address.trim().to_owned();
            if address.is_empty() {
                continue;
            }
            let parsed = Url::parse(&address)
                .map_err(|e| ConfigError::InvalidEndpoint(address.clone(), e.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidEndpoint(
                    address,
                    format!("unsupported scheme {}", parsed.scheme()),
                ));
            }
            if !out.contains(&address) {
                out.push(address);
            }
        }
        if out.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(Self(out))
    }

    /// Parses a comma or whitespace separated list.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::new(raw.split(|c: char| c == ',' || c.is_whitespace()))
    }

    /// Parses the contents of an endpoints file: one URL per line, `#` starts a comment.
    pub fn parse_lines(contents: &str) -> Result<Self, ConfigError> {
        Self::new(
            contents
                .lines()
                .map(|line| line.split('#').next().unwrap_or_default()),
        )
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl TryFrom<Vec<String>> for EndpointList {
    type Error = ConfigError;

    fn try_from(addresses: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(addresses)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Deadline shared by every worker of one attempt.
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    /// Upper bound on concurrent workers per attempt, further capped by the endpoint count.
    pub max_workers: usize,
}

impl DispatchConfig {
    pub fn new(
        attempt_timeout: Duration,
        max_attempts: u32,
        max_workers: usize,
    ) -> Result<Self, ConfigError> {
        if attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("attempt timeout"));
        }
        if max_attempts == 0 {
            return Err(ConfigError::ZeroCount("max attempts"));
        }
        if max_workers == 0 {
            return Err(ConfigError::ZeroCount("max workers"));
        }
        Ok(Self {
            attempt_timeout,
            max_attempts,
            max_workers,
        })
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthConfig {
    pub interval: Duration,
    pub probe_timeout: Duration,
    /// Consecutive probe failures after which an endpoint is evicted.
    pub failure_threshold: u32,
}

impl HealthConfig {
    pub fn new(
        interval: Duration,
        probe_timeout: Duration,
        failure_threshold: u32,
    ) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroDuration("health interval"));
        }
        if probe_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("probe timeout"));
        }
        if failure_threshold == 0 {
            return Err(ConfigError::ZeroCount("failure threshold"));
        }
        Ok(Self {
            interval,
            probe_timeout,
            failure_threshold,
        })
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_HEALTH_INTERVAL_SECS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            failure_threshold: DEFAULT_HEALTH_FAILURE_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalancerConfig {
    pub endpoints: EndpointList,
    /// Per-call HTTP timeout for translate requests.
    pub request_timeout: Duration,
    pub max_segment_len: usize,
    pub dispatch: DispatchConfig,
    pub health: HealthConfig,
}

impl BalancerConfig {
    pub fn new(endpoints: EndpointList) -> Self {
        Self {
            endpoints,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_segment_len: DEFAULT_MAX_SEGMENT_LEN,
            dispatch: DispatchConfig::default(),
            health: HealthConfig::default(),
        }
    }

    pub fn with_max_segment_len(mut self, max_segment_len: usize) -> Result<Self, ConfigError> {
        if max_segment_len == 0 {
            return Err(ConfigError::ZeroCount("max segment length"));
        }
        self.max_segment_len = max_segment_len;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        self.request_timeout = timeout;
        Ok(self)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one backend endpoint is required")]
    NoEndpoints,
    #[error("invalid endpoint {0}: {1}")]
    InvalidEndpoint(String, String),
    #[error("{0} must be > 0")]
    ZeroDuration(&'static str),
    #[error("{0} must be > 0")]
    ZeroCount(&'static str),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// CLI addresses win; otherwise the environment variable is parsed as a separated list.
pub fn resolve_endpoints(
    cli_values: Vec<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<EndpointList, ConfigError> {
    if !cli_values.is_empty() {
        return EndpointList::new(cli_values);
    }
    match env.var(env_key) {
        Some(raw) => EndpointList::parse(&raw),
        None => Err(ConfigError::NoEndpoints),
    }
}
