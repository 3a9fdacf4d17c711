//! Environment-driven configuration.
//!
//! Required for live model access: OPENROUTER_API_KEY
//! Optional: OPENROUTER_MODEL (default: "x-ai/grok-4-fast:free"), OPENROUTER_BASE_URL
//! Optional fallback: VERCEL_AI_GATEWAY_API_KEY, VERCEL_AI_GATEWAY_MODEL
//! Transport settings: CHLOE_API_CALL_DELAY_SECS (>= 1), CHLOE_MAX_RETRIES (0 for unlimited)
//! Tools: CHLOE_TOOL_COMMAND, CHLOE_TOOL_TIMEOUT_MS

use std::time::Duration;
use thiserror::Error;

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const VERCEL_AI_GATEWAY_URL: &str = "https://ai-gateway.vercel.sh/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "x-ai/grok-4-fast:free";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

/// One chat-completions endpoint the session may talk to
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub name: String,
}

/// Transport retry settings.
///
/// Values are clamped rather than rejected: the delay is at least one second
/// and a retry count of zero means retry without limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiSettings {
    pub api_call_delay: Duration,
    pub max_retries: u32,
}

impl AiSettings {
    pub fn new(api_call_delay_secs: i64, max_retries: i64) -> Self {
        Self {
            api_call_delay: Duration::from_secs(api_call_delay_secs.max(1) as u64),
            max_retries: max_retries.clamp(0, u32::MAX as i64) as u32,
        }
    }

    /// Build from raw user input; unparsable values fall back to the minimum.
    pub fn parse(api_call_delay: &str, max_retries: &str) -> Self {
        Self::new(
            leading_int(api_call_delay).filter(|v| *v != 0).unwrap_or(1),
            leading_int(max_retries).unwrap_or(0),
        )
    }

    /// Whether another attempt is allowed after `attempts` retries
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_retries == 0 || attempts < self.max_retries
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_call_delay: Duration::from_secs(1),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Parse an optional sign and leading digits, ignoring whatever follows ("2.5s" -> 2)
fn leading_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Providers in the order they are tried
    pub providers: Vec<ProviderConfig>,
    pub settings: AiSettings,
    /// Program and arguments for the external tool bridge
    pub tool_command: Option<Vec<String>>,
    pub tool_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut providers = Vec::new();

        if let Some(api_key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty()) {
            providers.push(ProviderConfig {
                base_url: lookup("OPENROUTER_BASE_URL").unwrap_or_else(|| OPENROUTER_URL.to_string()),
                api_key,
                model: lookup("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                name: "OpenRouter".to_string(),
            });
        }

        if let (Some(api_key), Some(model)) = (
            lookup("VERCEL_AI_GATEWAY_API_KEY"),
            lookup("VERCEL_AI_GATEWAY_MODEL"),
        ) {
            providers.push(ProviderConfig {
                base_url: VERCEL_AI_GATEWAY_URL.to_string(),
                api_key,
                model,
                name: "Vercel AI Gateway".to_string(),
            });
        }

        let defaults = AiSettings::default();
        let settings = AiSettings::parse(
            &lookup("CHLOE_API_CALL_DELAY_SECS").unwrap_or_else(|| defaults.api_call_delay.as_secs().to_string()),
            &lookup("CHLOE_MAX_RETRIES").unwrap_or_else(|| defaults.max_retries.to_string()),
        );

        let tool_command = lookup("CHLOE_TOOL_COMMAND")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());

        let tool_timeout = match lookup("CHLOE_TOOL_TIMEOUT_MS") {
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                    key: "CHLOE_TOOL_TIMEOUT_MS".to_string(),
                    value: raw.clone(),
                })?;
                Duration::from_millis(ms)
            }
            None => Duration::from_millis(DEFAULT_TOOL_TIMEOUT_MS),
        };

        Ok(Self {
            providers,
            settings,
            tool_command,
            tool_timeout,
        })
    }

    pub fn has_provider(&self) -> bool {
        !self.providers.is_empty()
    }
}

/// Errors that can occur while reading configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();

        assert!(!config.has_provider());
        assert_eq!(config.settings, AiSettings::default());
        assert_eq!(config.tool_command, None);
        assert_eq!(config.tool_timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_providers_in_fallback_order() {
        let config = config_from(&[
            ("OPENROUTER_API_KEY", "or-key"),
            ("VERCEL_AI_GATEWAY_API_KEY", "v-key"),
            ("VERCEL_AI_GATEWAY_MODEL", "openai/gpt-4o-mini"),
        ])
        .unwrap();

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].name, "OpenRouter");
        assert_eq!(config.providers[0].model, DEFAULT_MODEL);
        assert_eq!(config.providers[0].base_url, OPENROUTER_URL);
        assert_eq!(config.providers[1].model, "openai/gpt-4o-mini");
    }

    #[test]
    fn test_fallback_requires_key_and_model() {
        let config = config_from(&[("VERCEL_AI_GATEWAY_API_KEY", "v-key")]).unwrap();
        assert!(!config.has_provider());
    }

    #[test]
    fn test_settings_are_clamped() {
        assert_eq!(AiSettings::new(0, -4), AiSettings::new(1, 0));
        assert_eq!(AiSettings::parse("abc", "xyz"), AiSettings::new(1, 0));
        assert_eq!(AiSettings::parse("0", "2"), AiSettings::new(1, 2));
        assert_eq!(AiSettings::parse("2.5", "5 times"), AiSettings::new(2, 5));
        assert_eq!(AiSettings::parse("-3", "-1"), AiSettings::new(1, 0));
    }

    #[test]
    fn test_zero_retries_means_unlimited() {
        let unlimited = AiSettings::new(1, 0);
        assert!(unlimited.allows_retry(10_000));

        let bounded = AiSettings::new(1, 2);
        assert!(bounded.allows_retry(1));
        assert!(!bounded.allows_retry(2));
    }

    #[test]
    fn test_tool_command_and_timeout() {
        let config = config_from(&[
            ("CHLOE_TOOL_COMMAND", "  node tools/bridge.js  "),
            ("CHLOE_TOOL_TIMEOUT_MS", "1500"),
        ])
        .unwrap();

        assert_eq!(
            config.tool_command,
            Some(vec!["node".to_string(), "tools/bridge.js".to_string()])
        );
        assert_eq!(config.tool_timeout, Duration::from_millis(1500));

        let blank = config_from(&[("CHLOE_TOOL_COMMAND", "   ")]).unwrap();
        assert_eq!(blank.tool_command, None);
    }

    #[test]
    fn test_invalid_tool_timeout() {
        let err = config_from(&[("CHLOE_TOOL_TIMEOUT_MS", "soon")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "CHLOE_TOOL_TIMEOUT_MS".to_string(),
                value: "soon".to_string()
            }
        );
    }
}
