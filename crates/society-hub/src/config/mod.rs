use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::actors::{Actor, ActorRole};
use crate::polls::{OrderTieBreak, PollPolicy};
use crate::registry::ResidentId;

const DEFAULT_FEED_CAPACITY: usize = 256;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
    pub polls: PollConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let actor_tokens = match env::var("APP_ACTOR_TOKENS") {
            Ok(raw) => parse_actor_tokens(&raw)?,
            Err(_) => Vec::new(),
        };

        let tie_break = match env::var("POLL_TIE_BREAK") {
            Ok(raw) => OrderTieBreak::parse(&raw)
                .ok_or(ConfigError::InvalidTieBreak { value: raw })?,
            Err(_) => OrderTieBreak::default(),
        };

        let archived_visible_to_residents = match env::var("POLL_ARCHIVED_VISIBLE") {
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidFlag {
                name: "POLL_ARCHIVED_VISIBLE",
                value: raw,
            })?,
            Err(_) => false,
        };

        let feed_capacity = match env::var("POLL_FEED_CAPACITY") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or(ConfigError::InvalidFeedCapacity)?,
            Err(_) => DEFAULT_FEED_CAPACITY,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            auth: AuthConfig { actor_tokens },
            polls: PollConfig {
                policy: PollPolicy {
                    tie_break,
                    archived_visible_to_residents,
                },
                feed_capacity,
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Static bearer tokens standing in for the hosted auth service.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub actor_tokens: Vec<ActorToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorToken {
    pub token: String,
    pub actor: Actor,
}

/// Poll workflow knobs.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub policy: PollPolicy,
    pub feed_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            policy: PollPolicy::default(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

/// Parse `token:resident-id:role` entries separated by commas.
pub fn parse_actor_tokens(raw: &str) -> Result<Vec<ActorToken>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || ConfigError::InvalidActorToken {
                entry: entry.to_string(),
            };
            let mut parts = entry.split(':');
            let token = parts.next().map(str::trim).filter(|s| !s.is_empty());
            let resident = parts.next().map(str::trim).filter(|s| !s.is_empty());
            let role = parts.next().and_then(ActorRole::parse);
            match (token, resident, role, parts.next()) {
                (Some(token), Some(resident), Some(role), None) => Ok(ActorToken {
                    token: token.to_string(),
                    actor: Actor {
                        resident_id: ResidentId(resident.to_string()),
                        role,
                    },
                }),
                _ => Err(invalid()),
            }
        })
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidActorToken { entry: String },
    InvalidTieBreak { value: String },
    InvalidFlag { name: &'static str, value: String },
    InvalidFeedCapacity,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidActorToken { entry } => write!(
                f,
                "APP_ACTOR_TOKENS entry '{entry}' must look like token:resident-id:admin|resident"
            ),
            ConfigError::InvalidTieBreak { value } => {
                write!(f, "POLL_TIE_BREAK '{value}' must be 'insertion' or 'label'")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} '{value}' must be a boolean")
            }
            ConfigError::InvalidFeedCapacity => {
                write!(f, "POLL_FEED_CAPACITY must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_ACTOR_TOKENS",
            "POLL_TIE_BREAK",
            "POLL_ARCHIVED_VISIBLE",
            "POLL_FEED_CAPACITY",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.auth.actor_tokens.is_empty());
        assert_eq!(config.polls.policy.tie_break, OrderTieBreak::Insertion);
        assert!(!config.polls.policy.archived_visible_to_residents);
        assert_eq!(config.polls.feed_capacity, DEFAULT_FEED_CAPACITY);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn poll_policy_reads_env_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("POLL_TIE_BREAK", "label");
        env::set_var("POLL_ARCHIVED_VISIBLE", "yes");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.polls.policy.tie_break, OrderTieBreak::Label);
        assert!(config.polls.policy.archived_visible_to_residents);

        env::set_var("POLL_TIE_BREAK", "random");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidTieBreak { .. })
        ));
        reset_env();
    }

    #[test]
    fn actor_tokens_parse_and_reject_malformed_entries() {
        let tokens = parse_actor_tokens("abc:res-1:admin, def:res-2:resident").expect("parses");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].actor.role, ActorRole::Admin);
        assert_eq!(tokens[1].actor.resident_id, ResidentId("res-2".to_string()));

        assert!(matches!(
            parse_actor_tokens("abc:res-1"),
            Err(ConfigError::InvalidActorToken { .. })
        ));
        assert!(matches!(
            parse_actor_tokens("abc:res-1:owner"),
            Err(ConfigError::InvalidActorToken { .. })
        ));
    }
}
