//! Bot configuration from environment variables.

use std::path::PathBuf;

use anyhow::{bail, Context};
use distodo_client::{GatewayConfig, ReconnectConfig, Token};
use distodo_shared::{API_URL, GATEWAY_URL};

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: Token,
    pub gateway_url: String,
    pub api_url: String,
    /// Restarts after the gateway stops (0 = unlimited).
    pub max_restarts: u32,
}

impl BotConfig {
    /// Load configuration from the environment.
    ///
    /// Environment variables:
    /// - `DISTODO_TOKEN`: bot token. Takes precedence over the token file.
    /// - `DISTODO_TOKEN_FILE`: file holding the token (default: ".token")
    /// - `DISTODO_GATEWAY_URL`: gateway base URL (default: "wss://gateway.discord.gg")
    /// - `DISTODO_API_URL`: REST base URL (default: "https://discord.com/api/v10")
    /// - `DISTODO_MAX_RESTARTS`: restart budget (default: 10, 0 = unlimited)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let token = match var("DISTODO_TOKEN") {
            Some(token) => token,
            None => {
                let path = PathBuf::from(
                    var("DISTODO_TOKEN_FILE").unwrap_or_else(|| ".token".to_string()),
                );
                std::fs::read_to_string(&path)
                    .with_context(|| format!("reading token file {}", path.display()))?
            }
        };
        let token = token.trim();
        if token.is_empty() {
            bail!("bot token is empty");
        }

        let max_restarts = match var("DISTODO_MAX_RESTARTS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DISTODO_MAX_RESTARTS must be a number, got {raw:?}"))?,
            None => ReconnectConfig::default().max_attempts,
        };

        Ok(Self {
            token: Token::new(token),
            gateway_url: var("DISTODO_GATEWAY_URL").unwrap_or_else(|| GATEWAY_URL.to_string()),
            api_url: var("DISTODO_API_URL").unwrap_or_else(|| API_URL.to_string()),
            max_restarts,
        })
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            url: self.gateway_url.clone(),
            ..GatewayConfig::default()
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_restarts,
            ..ReconnectConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn token_from_env_with_defaults() {
        let config = BotConfig::from_lookup(lookup(&[("DISTODO_TOKEN", " abc \n")])).unwrap();
        assert_eq!(config.token.expose(), "abc");
        assert_eq!(config.gateway_url, GATEWAY_URL);
        assert_eq!(config.api_url, API_URL);
        assert_eq!(config.max_restarts, 10);
    }

    #[test]
    fn token_from_file() {
        let path = std::env::temp_dir().join(format!("distodo-token-{}", std::process::id()));
        std::fs::write(&path, "filetoken\n").unwrap();
        let config = BotConfig::from_lookup(lookup(&[(
            "DISTODO_TOKEN_FILE",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.token.expose(), "filetoken");
    }

    #[test]
    fn missing_token_file_is_an_error() {
        let err = BotConfig::from_lookup(lookup(&[(
            "DISTODO_TOKEN_FILE",
            "/nonexistent/distodo/.token",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("reading token file"));
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(BotConfig::from_lookup(lookup(&[("DISTODO_TOKEN", "   ")])).is_err());
    }

    #[test]
    fn overrides_are_applied() {
        let config = BotConfig::from_lookup(lookup(&[
            ("DISTODO_TOKEN", "t"),
            ("DISTODO_GATEWAY_URL", "ws://localhost:9000"),
            ("DISTODO_API_URL", "http://localhost:9001"),
            ("DISTODO_MAX_RESTARTS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.gateway_config().url, "ws://localhost:9000");
        assert_eq!(config.api_url, "http://localhost:9001");
        assert_eq!(config.reconnect_config().max_attempts, 0);
    }

    #[test]
    fn bad_restart_count_is_rejected() {
        assert!(BotConfig::from_lookup(lookup(&[
            ("DISTODO_TOKEN", "t"),
            ("DISTODO_MAX_RESTARTS", "many"),
        ]))
        .is_err());
    }
}
