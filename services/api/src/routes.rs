use crate::infra::{AppState, Backend};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Extension;
use axum::Json;
use serde_json::json;
use society_hub::actors::ActorDirectory;
use society_hub::polls::poll_router;
use society_hub::registry::registry_router;
use std::sync::Arc;

pub(crate) fn with_api_routes(backend: &Backend, directory: Arc<dyn ActorDirectory>) -> axum::Router {
    poll_router(backend.polls.clone(), directory.clone())
        .merge(registry_router(backend.registry.clone(), directory))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::StaticTokenDirectory;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use society_hub::config::{parse_actor_tokens, AuthConfig, PollConfig};
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    const ADMIN: &str = "admin-token";
    const RESIDENT: &str = "u1-token";

    fn app(ready: bool) -> axum::Router {
        app_with_tokens(ready, &format!("{ADMIN}:res-admin:admin"))
    }

    fn app_with_tokens(ready: bool, tokens: &str) -> axum::Router {
        let backend = Backend::in_memory(&PollConfig::default());
        let directory = StaticTokenDirectory::from_config(&AuthConfig {
            actor_tokens: parse_actor_tokens(tokens).expect("tokens parse"),
        });
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_api_routes(&backend, Arc::new(directory)).layer(Extension(state))
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        request.expect("request builds")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request builds")
    }

    #[tokio::test]
    async fn health_and_readiness_report_state() {
        let (status, body) = send(app(false), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(app(false), get_request("/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "initializing");

        let (status, body) = send(app(true), get_request("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn metrics_are_plain_text() {
        let response = app(true)
            .oneshot(get_request("/metrics"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn poll_and_registry_routes_share_one_router() {
        let app = app(true);
        let create = Request::builder()
            .method("POST")
            .uri("/api/v1/societies")
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "name": "Cedar Heights", "address": "4 Hill Road" }).to_string(),
            ))
            .expect("request builds");
        let (status, society) = send(app.clone(), create).await;
        assert_eq!(status, StatusCode::CREATED);
        let society_id = society["id"].as_str().expect("society id").to_string();

        let list = Request::builder()
            .uri(format!("/api/v1/societies/{society_id}/polls"))
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN}"))
            .body(Body::empty())
            .expect("request builds");
        let (status, polls) = send(app.clone(), list).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(polls, json!([]));

        let (status, _) = send(app, get_request(&format!("/api/v1/societies/{society_id}/residents"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn configured_resident_token_can_vote_end_to_end() {
        let app = app_with_tokens(
            true,
            &format!("{ADMIN}:res-admin:admin,{RESIDENT}:res-u1:resident"),
        );

        let (status, society) = send(
            app.clone(),
            authed(
                "POST",
                "/api/v1/societies",
                ADMIN,
                Some(json!({ "name": "Lakeview Towers", "address": "9 Shore Lane" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let society_id = society["id"].as_str().expect("society id").to_string();

        let (status, resident) = send(
            app.clone(),
            authed(
                "POST",
                &format!("/api/v1/societies/{society_id}/residents"),
                ADMIN,
                Some(json!({
                    "id": "res-u1",
                    "name": "Uma Iyer",
                    "email": "uma@lakeview.example",
                    "unit_number": "c-12",
                    "resident_type": "owner"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(resident["id"], json!("res-u1"));

        let end_date = (chrono::Utc::now() + chrono::Duration::days(7)).to_rfc3339();
        let (status, poll) = send(
            app.clone(),
            authed(
                "POST",
                &format!("/api/v1/societies/{society_id}/polls"),
                ADMIN,
                Some(json!({
                    "title": "Repaint the lobby?",
                    "kind": "poll",
                    "end_date": end_date,
                    "options": [{ "text": "Yes" }, { "text": "No" }]
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let poll_id = poll["poll"]["id"].as_str().expect("poll id").to_string();
        let yes = poll["options"][0]["id"].clone();

        let (status, record) = send(
            app.clone(),
            authed(
                "POST",
                &format!("/api/v1/polls/{poll_id}/votes"),
                RESIDENT,
                Some(json!({ "option_id": yes })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "vote rejected: {record}");
        assert_eq!(record["resident_id"], json!("res-u1"));

        let (status, polls) = send(
            app,
            authed(
                "GET",
                &format!("/api/v1/societies/{society_id}/polls"),
                RESIDENT,
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(polls[0]["user_has_voted"], json!(true));
        assert_eq!(polls[0]["total_responses"], json!(1));
        assert_eq!(polls[0]["results"][0]["percentage"], json!(100.0));
    }
}
