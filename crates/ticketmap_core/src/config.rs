use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_USER_AGENT: &str = "ticketmap/0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_OUTPUT_PATH: &str = "_build/comments.json";
pub const DEFAULT_CONFIG_PATH: &str = ".ticketmap/config.toml";

/// Environment variables consulted for the tracker token, in order.
pub const CREDENTIAL_VARS: [&str; 2] = ["SRHT_TOKEN", "srauth"];

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TicketmapConfig {
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TrackerSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct OutputSection {
    pub path: Option<PathBuf>,
    pub pretty: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

/// Values given on the command line; they win over env and config.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub api_url: Option<String>,
    pub output_path: Option<PathBuf>,
    pub pretty: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub api_url: Url,
    pub api_url_source: ValueSource,
    pub user_agent: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub path: PathBuf,
    pub path_source: ValueSource,
    pub pretty: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub tracker: TrackerSettings,
    pub output: OutputSettings,
}

impl ResolvedSettings {
    pub fn diagnostics(&self) -> String {
        format!(
            "api_url={} ({})\nuser_agent={}\ntimeout_ms={}\noutput_path={} ({})\npretty={}",
            self.tracker.api_url,
            self.tracker.api_url_source.as_str(),
            self.tracker.user_agent,
            self.tracker.timeout_ms,
            self.output.path.to_string_lossy().replace('\\', "/"),
            self.output.path_source.as_str(),
            self.output.pretty,
        )
    }
}

/// Secret used for the `Authorization: token ...` header. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    var: &'static str,
}

impl AccessToken {
    /// Name of the variable the token was read from.
    pub fn source_var(&self) -> &'static str {
        self.var
    }

    pub fn authorization_header(&self) -> String {
        format!("token {}", self.value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("var", &self.var)
            .finish()
    }
}

/// Load and parse a config file. Returns default if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<TicketmapConfig, ConfigError> {
    if !config_path.exists() {
        return Ok(TicketmapConfig::default());
    }
    let content = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: config_path.to_path_buf(),
        source,
    })
}

pub fn resolve_settings(
    config: &TicketmapConfig,
    overrides: &SettingsOverrides,
) -> Result<ResolvedSettings, ConfigError> {
    resolve_settings_with(config, overrides, |key| env::var(key).ok())
}

/// Resolve every setting: flag > env > config > default.
pub fn resolve_settings_with<F>(
    config: &TicketmapConfig,
    overrides: &SettingsOverrides,
    lookup: F,
) -> Result<ResolvedSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_value = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let (raw_api_url, api_url_source) = if let Some(value) = non_empty(overrides.api_url.as_deref())
    {
        (value, ValueSource::Flag)
    } else if let Some(value) = env_value("TICKETMAP_API_URL") {
        (value, ValueSource::Env)
    } else if let Some(value) = non_empty(config.tracker.api_url.as_deref()) {
        (value, ValueSource::Config)
    } else {
        return Err(ConfigError::MissingApiUrl);
    };
    let api_url = parse_api_url(&raw_api_url)?;

    let user_agent = env_value("TICKETMAP_USER_AGENT")
        .or_else(|| non_empty(config.tracker.user_agent.as_deref()))
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    let timeout_ms = match env_value("TICKETMAP_HTTP_TIMEOUT_MS") {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "TICKETMAP_HTTP_TIMEOUT_MS",
                value,
            })?,
        None => config.tracker.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
    };
    if timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: "timeout_ms",
            value: "0".to_string(),
        });
    }

    let (path, path_source) = if let Some(path) = &overrides.output_path {
        (path.clone(), ValueSource::Flag)
    } else if let Some(value) = env_value("TICKETMAP_OUTPUT") {
        (PathBuf::from(value), ValueSource::Env)
    } else if let Some(path) = &config.output.path {
        (path.clone(), ValueSource::Config)
    } else {
        (PathBuf::from(DEFAULT_OUTPUT_PATH), ValueSource::Default)
    };
    let pretty = overrides
        .pretty
        .or(config.output.pretty)
        .unwrap_or(false);

    Ok(ResolvedSettings {
        tracker: TrackerSettings {
            api_url,
            api_url_source,
            user_agent,
            timeout_ms,
        },
        output: OutputSettings {
            path,
            path_source,
            pretty,
        },
    })
}

pub fn resolve_credential() -> Result<AccessToken, ConfigError> {
    resolve_credential_with(|key| env::var(key).ok())
}

/// Read the tracker token from the first non-empty credential variable.
pub fn resolve_credential_with<F>(lookup: F) -> Result<AccessToken, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for var in CREDENTIAL_VARS {
        let Some(value) = lookup(var) else {
            continue;
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        let token = AccessToken { value, var };
        if reqwest::header::HeaderValue::from_str(&token.authorization_header()).is_err() {
            return Err(ConfigError::InvalidCredential { var });
        }
        return Ok(token);
    }
    Err(ConfigError::MissingCredential {
        vars: CREDENTIAL_VARS.to_vec(),
    })
}

fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|error| ConfigError::InvalidApiUrl {
        value: value.to_string(),
        reason: error.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::InvalidApiUrl {
            value: value.to_string(),
            reason: "expected an http(s) base URL".to_string(),
        });
    }
    if url.query().is_some() {
        return Err(ConfigError::InvalidApiUrl {
            value: value.to_string(),
            reason: "base URL must not carry a query string".to_string(),
        });
    }
    Ok(url)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use tempfile::tempdir;

    const TRACKER: &str = "https://todo.sr.ht/api/user/~shakna/trackers/shatterealm";

    fn lookup_from(pairs: &[(&str, &str)]) -> Box<dyn Fn(&str) -> Option<String>> {
        let map = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<BTreeMap<_, _>>();
        Box::new(move |key| map.get(key).cloned())
    }

    fn config_with_url() -> TicketmapConfig {
        TicketmapConfig {
            tracker: TrackerSection {
                api_url: Some(TRACKER.to_string()),
                ..TrackerSection::default()
            },
            ..TicketmapConfig::default()
        }
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, TicketmapConfig::default());
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[tracker]
api_url = "https://todo.sr.ht/api/user/~shakna/trackers/shatterealm"
user_agent = "test-agent/1.0"
timeout_ms = 5000

[output]
path = "site/comments.json"
pretty = true
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.tracker.api_url.as_deref(), Some(TRACKER));
        assert_eq!(config.tracker.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.tracker.timeout_ms, Some(5000));
        assert_eq!(
            config.output.path.as_deref(),
            Some(Path::new("site/comments.json"))
        );
        assert_eq!(config.output.pretty, Some(true));
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[tracker\napi_url = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn settings_use_defaults_when_only_url_is_configured() {
        let settings = resolve_settings_with(
            &config_with_url(),
            &SettingsOverrides::default(),
            lookup_from(&[]),
        )
        .expect("resolve");
        assert_eq!(settings.tracker.api_url.as_str(), TRACKER);
        assert_eq!(settings.tracker.api_url_source, ValueSource::Config);
        assert_eq!(settings.tracker.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(settings.tracker.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(settings.output.path, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert_eq!(settings.output.path_source, ValueSource::Default);
        assert!(!settings.output.pretty);
    }

    #[test]
    fn flag_beats_env_beats_config() {
        let lookup = lookup_from(&[
            ("TICKETMAP_API_URL", "https://env.example/api"),
            ("TICKETMAP_OUTPUT", "env/out.json"),
        ]);
        let from_env =
            resolve_settings_with(&config_with_url(), &SettingsOverrides::default(), &lookup)
                .expect("resolve");
        assert_eq!(from_env.tracker.api_url.as_str(), "https://env.example/api");
        assert_eq!(from_env.tracker.api_url_source, ValueSource::Env);
        assert_eq!(from_env.output.path, PathBuf::from("env/out.json"));

        let overrides = SettingsOverrides {
            api_url: Some("https://flag.example/api".to_string()),
            output_path: Some(PathBuf::from("flag.json")),
            pretty: Some(true),
        };
        let from_flag =
            resolve_settings_with(&config_with_url(), &overrides, &lookup).expect("resolve");
        assert_eq!(from_flag.tracker.api_url.as_str(), "https://flag.example/api");
        assert_eq!(from_flag.tracker.api_url_source, ValueSource::Flag);
        assert_eq!(from_flag.output.path_source, ValueSource::Flag);
        assert!(from_flag.output.pretty);
    }

    #[test]
    fn missing_api_url_is_a_config_error() {
        let error = resolve_settings_with(
            &TicketmapConfig::default(),
            &SettingsOverrides::default(),
            lookup_from(&[("TICKETMAP_API_URL", "   ")]),
        )
        .expect_err("must fail");
        assert!(matches!(error, ConfigError::MissingApiUrl));
    }

    #[test]
    fn non_http_api_url_is_rejected() {
        let overrides = SettingsOverrides {
            api_url: Some("mailto:someone@example.org".to_string()),
            ..SettingsOverrides::default()
        };
        let error = resolve_settings_with(&TicketmapConfig::default(), &overrides, lookup_from(&[]))
            .expect_err("must fail");
        assert!(matches!(error, ConfigError::InvalidApiUrl { .. }));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let error = resolve_settings_with(
            &config_with_url(),
            &SettingsOverrides::default(),
            lookup_from(&[("TICKETMAP_HTTP_TIMEOUT_MS", "soon")]),
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("TICKETMAP_HTTP_TIMEOUT_MS"));
    }

    #[test]
    fn credential_prefers_srht_token_and_falls_back_to_legacy_var() {
        let token = resolve_credential_with(lookup_from(&[
            ("SRHT_TOKEN", "primary"),
            ("srauth", "legacy"),
        ]))
        .expect("token");
        assert_eq!(token.authorization_header(), "token primary");
        assert_eq!(token.source_var(), "SRHT_TOKEN");

        let token = resolve_credential_with(lookup_from(&[("SRHT_TOKEN", ""), ("srauth", " legacy ")]))
            .expect("token");
        assert_eq!(token.authorization_header(), "token legacy");
    }

    #[test]
    fn missing_credential_is_a_config_error() {
        let error = resolve_credential_with(lookup_from(&[])).expect_err("must fail");
        assert!(matches!(error, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn credential_with_control_characters_is_rejected() {
        let error =
            resolve_credential_with(lookup_from(&[("SRHT_TOKEN", "abc\ndef")])).expect_err("fail");
        assert!(matches!(
            error,
            ConfigError::InvalidCredential { var: "SRHT_TOKEN" }
        ));
    }

    #[test]
    fn access_token_debug_is_redacted() {
        let token = resolve_credential_with(lookup_from(&[("SRHT_TOKEN", "s3cret")])).expect("token");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
