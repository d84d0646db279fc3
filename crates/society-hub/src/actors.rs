//! Authenticated actor identity.
//!
//! Identity is resolved by an [`ActorDirectory`] at the HTTP edge and handed to
//! services as an explicit [`ActorContext`].

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

use crate::registry::ResidentId;

/// Role of an authenticated actor inside a society.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Resident,
}

impl ActorRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "resident" => Some(Self::Resident),
            _ => None,
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub resident_id: ResidentId,
    pub role: ActorRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

/// Per-request identity; anonymous when no credential resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    actor: Option<Actor>,
}

impl ActorContext {
    pub fn anonymous() -> Self {
        Self { actor: None }
    }

    pub fn authenticated(actor: Actor) -> Self {
        Self { actor: Some(actor) }
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }
}

/// Source of actor identity (the hosted auth service in production).
pub trait ActorDirectory: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<Option<Actor>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("actor directory unavailable: {0}")]
    Unavailable(String),
}

/// Resolve the `Authorization: Bearer <token>` header into an [`ActorContext`].
///
/// A missing or unknown token yields an anonymous context; each operation
/// decides whether it needs authentication.
pub fn context_from_headers(
    directory: &dyn ActorDirectory,
    headers: &HeaderMap,
) -> Result<ActorContext, DirectoryError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let Some(token) = token else {
        return Ok(ActorContext::anonymous());
    };

    Ok(match directory.resolve(token)? {
        Some(actor) => ActorContext::authenticated(actor),
        None => ActorContext::anonymous(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    struct SingleToken;

    impl ActorDirectory for SingleToken {
        fn resolve(&self, credential: &str) -> Result<Option<Actor>, DirectoryError> {
            Ok((credential == "secret").then(|| Actor {
                resident_id: ResidentId("res-1".to_string()),
                role: ActorRole::Resident,
            }))
        }
    }

    #[test]
    fn bearer_token_resolves_actor() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer secret"),
        );
        let ctx = context_from_headers(&SingleToken, &headers).expect("directory available");
        assert_eq!(
            ctx.actor().map(|actor| actor.resident_id.0.as_str()),
            Some("res-1")
        );
    }

    #[test]
    fn missing_or_unknown_token_is_anonymous() {
        let ctx = context_from_headers(&SingleToken, &HeaderMap::new()).expect("ok");
        assert!(ctx.actor().is_none());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        let ctx = context_from_headers(&SingleToken, &headers).expect("ok");
        assert!(ctx.actor().is_none());
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(ActorRole::parse(" Admin "), Some(ActorRole::Admin));
        assert_eq!(ActorRole::parse("resident"), Some(ActorRole::Resident));
        assert_eq!(ActorRole::parse("guest"), None);
    }
}
