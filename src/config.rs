use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// What happens to a unit once its sibling exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RedirectPolicy {
    /// The sibling is provisioned ahead of time and the unit stays open.
    /// Clients holding a cached route keep writing to it; fresh routes see the
    /// sibling.
    #[default]
    Deferred,
    /// The unit closes for writes as soon as the sibling exists.
    Immediate,
}

impl FromStr for RedirectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" | "lazy" => Ok(RedirectPolicy::Deferred),
            "immediate" | "eager" => Ok(RedirectPolicy::Immediate),
            other => Err(format!("unknown redirect policy: {}", other)),
        }
    }
}

/// Autoscaling behaviour of storage units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingConfig {
    /// Size at which a unit asks for a sibling (default: 3)
    pub threshold: u64,

    /// Redirect policy applied after scaling (default: deferred)
    pub redirect: RedirectPolicy,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            redirect: RedirectPolicy::Deferred,
        }
    }
}

impl ScalingConfig {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn redirect(mut self, policy: RedirectPolicy) -> Self {
        self.redirect = policy;
        self
    }

    /// Reads `SCALE_THRESHOLD` and `SCALE_REDIRECT`, keeping defaults for unset
    /// or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(threshold) = parse_var(&lookup, "SCALE_THRESHOLD") {
            config.threshold = threshold;
        }
        if let Some(policy) = parse_var(&lookup, "SCALE_REDIRECT") {
            config.redirect = policy;
        }
        config
    }
}

/// Routing client settings
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Cache PK -> partition lookups between calls (default: true)
    pub cache_routes: bool,

    /// Per-partition deadline for fan-out queries (default: 2s)
    pub query_timeout: Duration,

    /// Re-resolve attempts after a stale or closed write target (default: 8)
    pub max_reroutes: usize,

    /// Attempts for a call that fails with an unreachable partition (default: 3)
    pub max_attempts: usize,

    /// First backoff delay between unreachable retries, doubled each time (default: 150ms)
    pub retry_backoff: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_routes: true,
            query_timeout: Duration::from_secs(2),
            max_reroutes: 8,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(150),
        }
    }
}

impl RouterConfig {
    pub fn cache_routes(mut self, enabled: bool) -> Self {
        self.cache_routes = enabled;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn max_reroutes(mut self, reroutes: usize) -> Self {
        self.max_reroutes = reroutes;
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Reads `ROUTER_QUERY_TIMEOUT_MS`, `ROUTER_MAX_RETRIES` and `ROUTER_CACHE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_var::<u64>(&lookup, "ROUTER_QUERY_TIMEOUT_MS") {
            config.query_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = parse_var(&lookup, "ROUTER_MAX_RETRIES") {
            config.max_reroutes = retries;
        }
        if let Some(cache) = parse_var(&lookup, "ROUTER_CACHE") {
            config.cache_routes = cache;
        }
        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}
