use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use society_hub::actors::{Actor, ActorDirectory, DirectoryError};
use society_hub::config::{AuthConfig, PollConfig};
use society_hub::polls::{AudienceAuthorizer, ChangeFeed, InMemoryPollStore, PollService};
use society_hub::registry::RegistryService;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type HubPollService = PollService<InMemoryPollStore, AudienceAuthorizer<InMemoryPollStore>>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Bearer tokens configured through `APP_ACTOR_TOKENS`.
#[derive(Default, Clone)]
pub(crate) struct StaticTokenDirectory {
    actors: HashMap<String, Actor>,
}

impl StaticTokenDirectory {
    pub(crate) fn from_config(config: &AuthConfig) -> Self {
        let actors = config
            .actor_tokens
            .iter()
            .map(|entry| (entry.token.clone(), entry.actor.clone()))
            .collect();
        Self { actors }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

impl ActorDirectory for StaticTokenDirectory {
    fn resolve(&self, credential: &str) -> Result<Option<Actor>, DirectoryError> {
        Ok(self.actors.get(credential).cloned())
    }
}

/// In-process services behind the HTTP surface.
#[derive(Clone)]
pub(crate) struct Backend {
    pub(crate) registry: Arc<RegistryService>,
    pub(crate) polls: Arc<HubPollService>,
}

impl Backend {
    pub(crate) fn in_memory(config: &PollConfig) -> Self {
        let registry = Arc::new(RegistryService::in_memory());
        let store = Arc::new(InMemoryPollStore::default());
        let stores = registry.stores();
        let authorizer =
            AudienceAuthorizer::new(store.clone(), stores.societies.clone(), stores.residents.clone());
        let polls = Arc::new(PollService::with_feed(
            store,
            Arc::new(authorizer),
            config.policy.clone(),
            ChangeFeed::new(config.feed_capacity),
        ));
        Self { registry, polls }
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use society_hub::actors::ActorRole;
    use society_hub::config::parse_actor_tokens;

    #[test]
    fn directory_resolves_configured_tokens_only() {
        let config = AuthConfig {
            actor_tokens: parse_actor_tokens("t-admin:res-admin:admin,t-u1:res-u1:resident")
                .expect("tokens parse"),
        };
        let directory = StaticTokenDirectory::from_config(&config);
        assert!(!directory.is_empty());

        let admin = directory
            .resolve("t-admin")
            .expect("directory available")
            .expect("admin token known");
        assert_eq!(admin.role, ActorRole::Admin);
        assert!(directory.resolve("t-unknown").expect("available").is_none());
    }

    #[test]
    fn timestamps_are_normalized_to_utc() {
        let parsed = parse_timestamp("2026-05-01T14:30:00+05:30").expect("parses");
        assert_eq!(parsed.to_rfc3339(), "2026-05-01T09:00:00+00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
