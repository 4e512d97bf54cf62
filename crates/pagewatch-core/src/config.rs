//! Monitor configuration parser.
//!
//! The configuration is a TOML document with four parts: the polling
//! frequency, the request and expectations applied to every endpoint, the
//! status page credentials, and the component list produced by discovery.
//! A handful of keys can be overridden from the environment.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ComponentId, LatencyUnit, MetricId};

/// Environment variables that override file values.
pub const ENV_TOKEN: &str = "STATUSPAGE_TOKEN";
pub const ENV_API_URL: &str = "STATUSPAGE_API_URL";
pub const ENV_METRIC_ID: &str = "STATUSPAGE_METRIC_ID";
pub const ENV_PUBLIC_INCIDENTS: &str = "STATUSPAGE_PUBLIC_INCIDENTS";
pub const ENV_LATENCY_UNIT: &str = "LATENCY_UNIT";
pub const ENV_METHOD: &str = "ENDPOINT_METHOD";
pub const ENV_TIMEOUT: &str = "ENDPOINT_TIMEOUT";
pub const ENV_ALLOWED_FAILS: &str = "ALLOWED_FAILS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between polling cycles.
    pub frequency: u64,
    pub endpoint: EndpointConfig,
    pub status_page: StatusPageConfig,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

/// How every endpoint is requested and judged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub method: String,
    /// Request timeout in seconds.
    pub timeout: f64,
    /// Consecutive non-operational cycles absorbed before pushing.
    #[serde(default)]
    pub allowed_fails: u32,
    pub expectation: Vec<ExpectationConfig>,
}

/// One expectation descriptor, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExpectationConfig {
    #[serde(rename = "HTTP_STATUS")]
    HttpStatus { status_range: StatusRangeSpec },
    #[serde(rename = "LATENCY")]
    Latency { threshold: f64 },
    #[serde(rename = "REGEX")]
    Regex { regex: String },
}

/// A status range as written in the file: `"200-300"`, `"204"` or `204`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusRangeSpec {
    Code(u16),
    Text(String),
}

impl StatusRangeSpec {
    /// Half-open `[min, max)` bounds. A single code `v` becomes `[v, v + 1)`.
    pub fn bounds(&self) -> ConfigResult<(u16, u16)> {
        let field = "endpoint.expectation.status_range";
        let (min, max) = match self {
            StatusRangeSpec::Code(code) => (*code, code.saturating_add(1)),
            StatusRangeSpec::Text(text) => {
                let parse = |part: &str| {
                    part.trim().parse::<u16>().map_err(|_| {
                        ConfigError::invalid(field, format!("{text:?} is not a status code range"))
                    })
                };
                match text.split_once('-') {
                    Some((lo, hi)) => (parse(lo)?, parse(hi)?),
                    None => {
                        let code = parse(text)?;
                        (code, code.saturating_add(1))
                    }
                }
            }
        };
        if min >= max {
            return Err(ConfigError::invalid(
                field,
                format!("range [{min}, {max}) is empty"),
            ));
        }
        Ok((min, max))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPageConfig {
    pub api_url: String,
    pub token: String,
    pub metric_id: Option<MetricId>,
    #[serde(default)]
    pub latency_unit: LatencyUnit,
    #[serde(default = "default_public_incidents")]
    pub public_incidents: bool,
}

fn default_public_incidents() -> bool {
    true
}

/// A monitored endpoint joined to its status page component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub id: ComponentId,
    pub url: String,
    pub version_url: Option<String>,
}

impl MonitorConfig {
    /// Load, apply environment overrides, normalize and validate.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Parse without overrides or validation.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replace file values with any overrides `lookup` returns.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_TOKEN) {
            self.status_page.token = token;
        }
        if let Some(url) = lookup(ENV_API_URL) {
            self.status_page.api_url = url;
        }
        if let Some(id) = lookup(ENV_METRIC_ID) {
            self.status_page.metric_id = Some(parse_env(ENV_METRIC_ID, &id)?);
        }
        if let Some(public) = lookup(ENV_PUBLIC_INCIDENTS) {
            self.status_page.public_incidents = parse_flag(ENV_PUBLIC_INCIDENTS, &public)?;
        }
        if let Some(unit) = lookup(ENV_LATENCY_UNIT) {
            self.status_page.latency_unit = LatencyUnit::from_str(&unit)?;
        }
        if let Some(method) = lookup(ENV_METHOD) {
            self.endpoint.method = method;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT) {
            self.endpoint.timeout = parse_env(ENV_TIMEOUT, &timeout)?;
        }
        if let Some(fails) = lookup(ENV_ALLOWED_FAILS) {
            self.endpoint.allowed_fails = parse_env(ENV_ALLOWED_FAILS, &fails)?;
        }
        Ok(())
    }

    /// Canonicalize URLs and the request method.
    pub fn normalize(&mut self) {
        self.endpoint.method = self.endpoint.method.trim().to_ascii_uppercase();
        self.status_page.api_url = normalize_url(&self.status_page.api_url)
            .trim_end_matches('/')
            .to_string();
        for component in &mut self.components {
            component.url = normalize_url(&component.url);
            component.version_url = component
                .version_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(normalize_url);
        }
    }

    /// Check every constraint that would otherwise fail mid-cycle.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.frequency == 0 {
            return Err(ConfigError::invalid("frequency", "must be greater than zero"));
        }
        if http::Method::from_bytes(self.endpoint.method.as_bytes()).is_err()
            || self.endpoint.method.is_empty()
        {
            return Err(ConfigError::invalid(
                "endpoint.method",
                format!("{:?} is not an HTTP method", self.endpoint.method),
            ));
        }
        if !(self.endpoint.timeout.is_finite() && self.endpoint.timeout > 0.0) {
            return Err(ConfigError::invalid("endpoint.timeout", "must be a positive number of seconds"));
        }
        if self.endpoint.expectation.is_empty() {
            return Err(ConfigError::Missing("endpoint.expectation".to_string()));
        }
        for expectation in &self.endpoint.expectation {
            match expectation {
                ExpectationConfig::HttpStatus { status_range } => {
                    status_range.bounds()?;
                }
                ExpectationConfig::Latency { threshold } => {
                    if !(threshold.is_finite() && *threshold >= 0.0) {
                        return Err(ConfigError::invalid(
                            "endpoint.expectation.threshold",
                            "must be a non-negative number of seconds",
                        ));
                    }
                }
                ExpectationConfig::Regex { regex } => {
                    if regex.is_empty() {
                        return Err(ConfigError::Missing("endpoint.expectation.regex".to_string()));
                    }
                }
            }
        }
        if self.status_page.token.is_empty() {
            return Err(ConfigError::Missing("status_page.token".to_string()));
        }
        check_url("status_page.api_url", &self.status_page.api_url)?;
        if self.components.is_empty() {
            return Err(ConfigError::Missing("components".to_string()));
        }
        let mut seen = HashSet::new();
        for component in &self.components {
            if !seen.insert(component.id) {
                return Err(ConfigError::invalid(
                    "components.id",
                    format!("component {} is listed twice", component.id),
                ));
            }
            check_url("components.url", &component.url)?;
            if let Some(version_url) = &component.version_url {
                check_url("components.version_url", version_url)?;
            }
        }
        Ok(())
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.endpoint.timeout)
    }

    /// Interval between polling cycles.
    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency)
    }

    /// Render as TOML with the access token masked, for logging.
    pub fn redacted(&self) -> ConfigResult<String> {
        let mut copy = self.clone();
        copy.status_page.token = "********".to_string();
        Ok(toml::to_string_pretty(&copy)?)
    }
}

/// Prefix `http://` to URLs that carry no scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.to_ascii_lowercase().starts_with("http") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

fn check_url(field: &str, url: &str) -> ConfigResult<()> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e| ConfigError::invalid(field, format!("{url:?}: {e}")))?;
    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => {
            return Err(ConfigError::invalid(
                field,
                format!("{url:?}: scheme {other:?} is not supported, only plain http"),
            ));
        }
        None => return Err(ConfigError::invalid(field, format!("{url:?} has no scheme"))),
    }
    if uri.host().is_none() {
        return Err(ConfigError::invalid(field, format!("{url:?} has no host")));
    }
    Ok(())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("cannot parse {value:?}")))
}

fn parse_flag(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::invalid(key, format!("cannot parse {value:?} as a flag"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
frequency = 30

[endpoint]
method = "get"
timeout = 0.5
allowed_fails = 2

[[endpoint.expectation]]
type = "HTTP_STATUS"
status_range = "200-300"

[[endpoint.expectation]]
type = "LATENCY"
threshold = 1.5

[[endpoint.expectation]]
type = "REGEX"
regex = ".*ok.*"

[status_page]
api_url = "status.example.com/api/v1/"
token = "secret-token"
metric_id = 7
latency_unit = "ms"

[[components]]
id = 1
url = "svc-a.internal/health"
version_url = "http://svc-a.internal/version.txt"

[[components]]
id = 2
url = "http://svc-b.internal/health"
version_url = ""
"#;

    fn sample() -> MonitorConfig {
        let mut config = MonitorConfig::parse(SAMPLE).unwrap();
        config.normalize();
        config
    }

    #[test]
    fn parse_full_config() {
        let config = sample();
        config.validate().unwrap();

        assert_eq!(config.frequency(), Duration::from_secs(30));
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.endpoint.method, "GET");
        assert_eq!(config.endpoint.allowed_fails, 2);
        assert_eq!(config.endpoint.expectation.len(), 3);
        assert_eq!(
            config.endpoint.expectation[1],
            ExpectationConfig::Latency { threshold: 1.5 }
        );
        assert_eq!(config.status_page.api_url, "http://status.example.com/api/v1");
        assert_eq!(config.status_page.latency_unit, LatencyUnit::Milliseconds);
        assert!(config.status_page.public_incidents);
        assert_eq!(config.components[0].url, "http://svc-a.internal/health");
        assert_eq!(config.components[1].version_url, None);
    }

    #[test]
    fn defaults_apply() {
        let toml_str = r#"
frequency = 10
[endpoint]
method = "GET"
timeout = 1
expectation = [{ type = "HTTP_STATUS", status_range = 200 }]
[status_page]
api_url = "http://status.local"
token = "t"
[[components]]
id = 3
url = "http://a.local"
"#;
        let config = MonitorConfig::parse(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.endpoint.allowed_fails, 0);
        assert_eq!(config.status_page.latency_unit, LatencyUnit::Seconds);
        assert_eq!(config.status_page.metric_id, None);
        assert!(config.status_page.public_incidents);
    }

    #[test]
    fn missing_mandatory_section_fails_to_parse() {
        let toml_str = r#"
frequency = 10
[status_page]
api_url = "http://status.local"
token = "t"
"#;
        assert!(matches!(
            MonitorConfig::parse(toml_str),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn status_range_bounds() {
        assert_eq!(StatusRangeSpec::Text("200-300".into()).bounds().unwrap(), (200, 300));
        assert_eq!(StatusRangeSpec::Text("204".into()).bounds().unwrap(), (204, 205));
        assert_eq!(StatusRangeSpec::Code(404).bounds().unwrap(), (404, 405));
        assert!(StatusRangeSpec::Text("300-200".into()).bounds().is_err());
        assert!(StatusRangeSpec::Text("200-200".into()).bounds().is_err());
        assert!(StatusRangeSpec::Text("two hundred".into()).bounds().is_err());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = sample();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_TOKEN, "from-env"),
            (ENV_ALLOWED_FAILS, "5"),
            (ENV_TIMEOUT, "2.5"),
            (ENV_LATENCY_UNIT, "s"),
            (ENV_PUBLIC_INCIDENTS, "0"),
            (ENV_METRIC_ID, "11"),
        ]);
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.status_page.token, "from-env");
        assert_eq!(config.endpoint.allowed_fails, 5);
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.status_page.latency_unit, LatencyUnit::Seconds);
        assert!(!config.status_page.public_incidents);
        assert_eq!(config.status_page.metric_id, Some(11));
    }

    #[test]
    fn bad_env_override_is_rejected() {
        let mut config = sample();
        let result = config.apply_overrides(|key| {
            (key == ENV_ALLOWED_FAILS).then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = sample();
        config.endpoint.timeout = 0.0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.endpoint.expectation.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

        let mut config = sample();
        config.endpoint.method = "NOT A METHOD".to_string();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.components[1].id = 1;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.components[0].url = "https://secure.internal/health".to_string();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.components.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn redacted_hides_token() {
        let rendered = sample().redacted().unwrap();
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("********"));
        assert!(rendered.contains("api_url"));
    }

    #[test]
    fn normalize_url_adds_scheme() {
        assert_eq!(normalize_url("example.com"), "http://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("HTTP://example.com"), "HTTP://example.com");
    }

    #[test]
    fn from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = MonitorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.components.len(), 2);

        let missing = MonitorConfig::from_file(Path::new("/nonexistent/pagewatch.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
