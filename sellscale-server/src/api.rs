//! HTTP API.
//!
//! Every endpoint except `/health`, `/help` and `/statuses` requires
//! `Authorization: Bearer <token>` resolving to an SDR. Errors are returned
//! as `{"message": "..."}` with the status code from [`ApiError`].

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use sellscale_core::bump::{BumpFramework, BumpFrameworkUpdate, NewBumpFramework};
use sellscale_core::model::{ArchetypeId, BumpFrameworkId, ClientSdr, HiddenReason, ProspectId};
use sellscale_core::{
    ProspectEmailOutreachStatus, ProspectOverallStatus, ProspectStatus, TransitionRequest,
};

use crate::error::ApiError;
use crate::state_machine::repository::BumpFrameworkFilter;
use crate::state_machine::CreateProspect;
use crate::status::StatusTables;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Build the application router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .route("/statuses", get(statuses_handler))
        .route("/pipeline", get(pipeline_handler))
        .route("/prospect", post(create_prospect_handler))
        .route("/prospect/:id", get(get_prospect_handler))
        .route("/prospect/:id/email", post(create_email_record_handler))
        .route("/prospect/:id/status", patch(linkedin_status_handler))
        .route("/prospect/:id/email_status", patch(email_status_handler))
        .route("/prospect/:id/next_statuses", get(next_statuses_handler))
        .route("/prospect/:id/history", get(history_handler))
        .route(
            "/prospect/:id/purgatory",
            post(send_to_purgatory_handler).delete(remove_from_purgatory_handler),
        )
        .route("/prospect/:id/archetype", patch(reassign_archetype_handler))
        .route("/prospect/:id/bump", get(select_bump_handler))
        .route("/archetype", post(create_archetype_handler))
        .route("/archetype/:id/deactivate", post(deactivate_archetype_handler))
        .route(
            "/bump",
            post(create_bump_handler).get(list_bump_handler),
        )
        .route("/bump/:id", patch(update_bump_handler))
        .route("/bump/:id/default", post(set_default_bump_handler))
        .route("/bump/:id/active", post(set_bump_active_handler))
        .with_state(state)
}

/// Resolve the bearer token in `headers` to its SDR.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<ClientSdr> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header {
        Some(value) if value.starts_with("Bearer ") => value[7..].trim(),
        Some(_) => {
            return Err(ApiError::Unauthorized(
                "Invalid Authorization header format. Expected: Bearer <token>".to_string(),
            ))
        }
        None => {
            return Err(ApiError::Unauthorized(
                "Missing Authorization header. Expected: Bearer <token>".to_string(),
            ))
        }
    };
    if token.is_empty() {
        return Err(ApiError::Unauthorized("Invalid token".to_string()));
    }

    state
        .store
        .authenticate(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid token".to_string()))
}

/// Unwrap a JSON body, reporting malformed input as a 400.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

// =============================================================================
// Service endpoints
// =============================================================================

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "sellscale"
    }))
}

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/health", "Health check"),
    ("GET", "/help", "API documentation and service information"),
    ("GET", "/statuses", "Status descriptors and transition tables"),
    ("GET", "/pipeline", "Prospect counts per status for the caller"),
    ("POST", "/prospect", "Create a prospect in PROSPECTED"),
    ("GET", "/prospect/:id", "Prospect record"),
    ("POST", "/prospect/:id/email", "Attach an email record"),
    ("PATCH", "/prospect/:id/status", "LinkedIn status transition"),
    ("PATCH", "/prospect/:id/email_status", "Email status transition"),
    ("GET", "/prospect/:id/next_statuses", "Legal next statuses on both channels"),
    ("GET", "/prospect/:id/history", "Status audit logs"),
    ("POST", "/prospect/:id/purgatory", "Hide the prospect for some days"),
    ("DELETE", "/prospect/:id/purgatory", "Make the prospect visible again"),
    ("PATCH", "/prospect/:id/archetype", "Move the prospect to another persona"),
    ("GET", "/prospect/:id/bump", "Bump framework for the prospect's next bump"),
    ("POST", "/archetype", "Create a persona"),
    ("POST", "/archetype/:id/deactivate", "Deactivate a persona (soft or hard)"),
    ("POST", "/bump", "Create a bump framework"),
    ("GET", "/bump", "List bump frameworks"),
    ("PATCH", "/bump/:id", "Edit a bump framework"),
    ("POST", "/bump/:id/default", "Make a bump framework the default of its group"),
    ("POST", "/bump/:id/active", "Activate or deactivate a bump framework"),
];

fn authentication_for(path: &str) -> &'static str {
    match path {
        "/health" | "/help" | "/statuses" => "None",
        _ => "Bearer <SDR token>",
    }
}

async fn help_handler(headers: HeaderMap) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");

    if accept.to_lowercase().contains("text/html") {
        return Html(generate_help_html()).into_response();
    }

    let endpoints: Vec<serde_json::Value> = ENDPOINTS
        .iter()
        .map(|(method, path, description)| {
            json!({
                "path": path,
                "method": method,
                "description": description,
                "authentication": authentication_for(path),
            })
        })
        .collect();

    Json(json!({
        "service": "sellscale",
        "version": crate::get_version(),
        "description": "Prospect outreach status state machine",
        "endpoints": endpoints,
        "configuration": {
            "optional_env_vars": [
                "APP_SETTINGS (default: development)",
                "DATABASE_URL (default: sqlite://sellscale.db)",
                "PORT (default: 5000)",
                "APP_BASE_URL (default: https://app.sellscale.com)",
                "SLACK_PIPELINE_WEBHOOK_URLS",
                "SLACK_DEMOS_WEBHOOK_URLS (required in production)",
                "SLACK_DETECTION_WEBHOOK_URLS",
                "BUMP_PURGATORY_DAYS (default: 2)",
                "OUTBOX_POLL_INTERVAL_SECS (default: 30)",
                "OUTBOX_MAX_ATTEMPTS (default: 3)",
                "OUTBOX_BACKOFF_BASE_SECS (default: 60)"
            ]
        }
    }))
    .into_response()
}

fn generate_help_html() -> String {
    let rows: String = ENDPOINTS
        .iter()
        .map(|(method, path, description)| {
            format!(
                "<tr><td><code>{}</code></td><td><code>{}</code></td><td>{}</td><td>{}</td></tr>",
                method,
                path,
                description,
                authentication_for(path)
            )
        })
        .collect();
    format!(
        "<!DOCTYPE html><html><head><title>SellScale API</title></head><body>\
         <h1>SellScale API</h1><p>Version {}</p>\
         <table><thead><tr><th>Method</th><th>Path</th><th>Description</th><th>Auth</th></tr></thead>\
         <tbody>{}</tbody></table></body></html>",
        crate::get_version(),
        rows
    )
}

async fn statuses_handler() -> Json<StatusTables> {
    Json(StatusTables::build())
}

async fn pipeline_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let summary = state.store.pipeline_summary(sdr.id).await?;
    Ok(Json(summary).into_response())
}

// =============================================================================
// Prospects
// =============================================================================

async fn create_prospect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateProspect>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let prospect = state.store.create_prospect(sdr.id, request).await?;
    Ok((StatusCode::CREATED, Json(prospect)).into_response())
}

async fn get_prospect_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let prospect = state.store.get_prospect(sdr.id, ProspectId(id)).await?;
    Ok(Json(prospect).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct CreateEmailRecord {
    #[serde(default)]
    outreach_status: Option<ProspectEmailOutreachStatus>,
}

async fn create_email_record_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<CreateEmailRecord>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let email = state
        .store
        .create_email_record(sdr.id, ProspectId(id), request.outreach_status)
        .await?;
    Ok((StatusCode::CREATED, Json(email)).into_response())
}

async fn linkedin_status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<TransitionRequest<ProspectStatus>>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let applied = state
        .store
        .update_linkedin_status(sdr.id, ProspectId(id), &request)
        .await?;
    Ok(Json(applied).into_response())
}

async fn email_status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<TransitionRequest<ProspectEmailOutreachStatus>>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let applied = state
        .store
        .update_email_status(sdr.id, ProspectId(id), &request)
        .await?;
    Ok(Json(applied).into_response())
}

async fn next_statuses_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let next = state
        .store
        .valid_next_statuses(sdr.id, ProspectId(id))
        .await?;
    Ok(Json(next).into_response())
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let history = state.store.status_history(sdr.id, ProspectId(id)).await?;
    Ok(Json(history).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct PurgatoryRequest {
    /// Defaults to the configured bump purgatory length.
    #[serde(default)]
    days: Option<i64>,
    #[serde(default)]
    reason: Option<HiddenReason>,
}

async fn send_to_purgatory_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<PurgatoryRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let days = request
        .days
        .unwrap_or(state.store.settings().planner.bump_purgatory_days);
    let prospect = state
        .store
        .send_to_purgatory(
            sdr.id,
            ProspectId(id),
            days,
            request.reason.unwrap_or(HiddenReason::Manual),
        )
        .await?;
    Ok(Json(prospect).into_response())
}

async fn remove_from_purgatory_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let prospect = state
        .store
        .remove_from_purgatory(sdr.id, ProspectId(id))
        .await?;
    Ok(Json(prospect).into_response())
}

#[derive(Debug, Deserialize)]
struct ReassignArchetype {
    archetype_id: Option<ArchetypeId>,
}

async fn reassign_archetype_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<ReassignArchetype>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let prospect = state
        .store
        .reassign_archetype(sdr.id, ProspectId(id), request.archetype_id)
        .await?;
    Ok(Json(prospect).into_response())
}

#[derive(Debug, Serialize)]
struct BumpSelection {
    bump_framework: Option<BumpFramework>,
}

async fn select_bump_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let bump_framework = state
        .store
        .select_bump_framework(sdr.id, ProspectId(id))
        .await?;
    Ok(Json(BumpSelection { bump_framework }).into_response())
}

// =============================================================================
// Personas
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateArchetype {
    name: String,
}

async fn create_archetype_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateArchetype>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let archetype = state.store.create_archetype(sdr.id, &request.name).await?;
    Ok((StatusCode::CREATED, Json(archetype)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct DeactivateArchetype {
    #[serde(default)]
    hard: bool,
}

async fn deactivate_archetype_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<DeactivateArchetype>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let outcome = state
        .store
        .deactivate_archetype(sdr.id, ArchetypeId(id), request.hard)
        .await?;
    Ok(Json(outcome).into_response())
}

// =============================================================================
// Bump frameworks
// =============================================================================

async fn create_bump_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<NewBumpFramework>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let new = body(payload)?;
    let framework = state.store.create_bump_framework(sdr.id, new).await?;
    Ok((StatusCode::CREATED, Json(framework)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct BumpQuery {
    overall_status: Option<ProspectOverallStatus>,
    archetype_id: Option<i64>,
    active: Option<bool>,
}

async fn list_bump_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BumpQuery>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let frameworks = state
        .store
        .list_bump_frameworks(
            sdr.id,
            BumpFrameworkFilter {
                client_sdr_id: None,
                overall_status: query.overall_status,
                archetype_id: query.archetype_id.map(ArchetypeId),
                active: query.active,
            },
        )
        .await?;
    Ok(Json(frameworks).into_response())
}

async fn update_bump_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<BumpFrameworkUpdate>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let update = body(payload)?;
    let framework = state
        .store
        .update_bump_framework(sdr.id, BumpFrameworkId(id), &update)
        .await?;
    Ok(Json(framework).into_response())
}

async fn set_default_bump_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let framework = state
        .store
        .set_default_bump_framework(sdr.id, BumpFrameworkId(id))
        .await?;
    Ok(Json(framework).into_response())
}

#[derive(Debug, Deserialize)]
struct SetActive {
    active: bool,
}

async fn set_bump_active_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<SetActive>, JsonRejection>,
) -> ApiResult<Response> {
    let sdr = authenticate(&state, &headers).await?;
    let request = body(payload)?;
    let framework = state
        .store
        .set_bump_framework_active(sdr.id, BumpFrameworkId(id), request.active)
        .await?;
    Ok(Json(framework).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::slack::fake::RecordingNotifier;
    use crate::state_machine::{
        InMemoryRepository, ProspectRepository, ProspectStore, StoreSettings,
    };

    const TOKEN: &str = "sdr-token";

    struct TestApp {
        router: Router,
        notifier: RecordingNotifier,
        repository: Arc<dyn ProspectRepository>,
    }

    async fn app() -> TestApp {
        let repository: Arc<dyn ProspectRepository> = Arc::new(InMemoryRepository::new());
        repository.create_client_sdr("Sam", TOKEN).await.unwrap();
        repository
            .create_client_sdr("Other", "other-token")
            .await
            .unwrap();
        let notifier = RecordingNotifier::new();
        let store = ProspectStore::new(
            repository.clone(),
            Arc::new(notifier.clone()),
            "https://app.example.com",
            StoreSettings::default(),
        );
        let state = Arc::new(AppState {
            store: Arc::new(store),
        });
        TestApp {
            router: router(state),
            notifier,
            repository,
        }
    }

    impl TestApp {
        async fn call(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            payload: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match payload {
                Some(payload) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }

        async fn create_prospect(&self) -> i64 {
            let (status, body) = self
                .call(
                    "POST",
                    "/prospect",
                    Some(TOKEN),
                    Some(json!({ "full_name": "Ada Lovelace", "company": "Engines" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["status"], "PROSPECTED");
            body["id"].as_i64().unwrap()
        }
    }

    #[tokio::test]
    async fn test_health_and_help_are_public() {
        let app = app().await;
        let (status, body) = app.call("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = app.call("GET", "/help", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["path"] == "/prospect/:id/status"));
    }

    #[tokio::test]
    async fn test_statuses_lists_tables() {
        let app = app().await;
        let (status, body) = app.call("GET", "/statuses", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["linkedin"].as_array().unwrap().len(), 24);
        assert_eq!(body["overall"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_token_is_unauthorized() {
        let app = app().await;
        let (status, body) = app.call("GET", "/pipeline", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("Missing Authorization header"));

        let (status, _) = app.call("GET", "/pipeline", Some("wrong"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_linkedin_transition_round_trip() {
        let app = app().await;
        let id = app.create_prospect().await;

        let (status, body) = app
            .call(
                "PATCH",
                &format!("/prospect/{}/status", id),
                Some(TOKEN),
                Some(json!({ "new_status": "SENT_OUTREACH" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["from_status"], "PROSPECTED");
        assert_eq!(body["prospect"]["overall_status"], "SENT_OUTREACH");

        let (status, body) = app
            .call(
                "PATCH",
                &format!("/prospect/{}/status", id),
                Some(TOKEN),
                Some(json!({ "new_status": "DEMO_WON" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("Invalid status transition"));

        let (status, body) = app
            .call("GET", &format!("/prospect/{}/history", id), Some(TOKEN), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["linkedin"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_status_is_bad_request() {
        let app = app().await;
        let id = app.create_prospect().await;
        let (status, body) = app
            .call(
                "PATCH",
                &format!("/prospect/{}/status", id),
                Some(TOKEN),
                Some(json!({ "new_status": "TELEPORTED" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_other_sdr_gets_forbidden_and_unknown_id_not_found() {
        let app = app().await;
        let id = app.create_prospect().await;

        let (status, _) = app
            .call(
                "GET",
                &format!("/prospect/{}", id),
                Some("other-token"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call("GET", "/prospect/9999", Some(TOKEN), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "prospect 9999 not found");
    }

    #[tokio::test]
    async fn test_email_transition_needs_record() {
        let app = app().await;
        let id = app.create_prospect().await;
        let uri = format!("/prospect/{}/email_status", id);

        let (status, _) = app
            .call(
                "PATCH",
                &uri,
                Some(TOKEN),
                Some(json!({ "new_status": "SENT_OUTREACH" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call(
                "POST",
                &format!("/prospect/{}/email", id),
                Some(TOKEN),
                Some(json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .call(
                "PATCH",
                &uri,
                Some(TOKEN),
                Some(json!({ "new_status": "SENT_OUTREACH" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"]["outreach_status"], "SENT_OUTREACH");

        let (_, next) = app
            .call(
                "GET",
                &format!("/prospect/{}/next_statuses", id),
                Some(TOKEN),
                None,
            )
            .await;
        assert!(next["email"].is_array());
    }

    #[tokio::test]
    async fn test_handoff_demo_posts_to_demos_channel() {
        let app = app().await;
        let id = app.create_prospect().await;
        let uri = format!("/prospect/{}/status", id);
        app.call(
            "PATCH",
            &uri,
            Some(TOKEN),
            Some(json!({ "new_status": "SENT_OUTREACH" })),
        )
        .await;

        let (status, body) = app
            .call(
                "PATCH",
                &uri,
                Some(TOKEN),
                Some(json!({ "new_status": "DEMO_SET", "demo_set_type": "HANDOFF" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dispatch"]["delivered"], 1);
        assert_eq!(app.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_purgatory_endpoints() {
        let app = app().await;
        let id = app.create_prospect().await;
        let uri = format!("/prospect/{}/purgatory", id);

        let (status, body) = app
            .call("POST", &uri, Some(TOKEN), Some(json!({ "days": 3 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hidden_reason"], "MANUAL");
        assert!(body["hidden_until"].is_string());

        let (status, body) = app.call("DELETE", &uri, Some(TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["hidden_until"].is_null());

        let (status, _) = app
            .call("POST", &uri, Some(TOKEN), Some(json!({ "days": -2 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_archetype_and_bump_endpoints() {
        let app = app().await;
        let (status, archetype) = app
            .call(
                "POST",
                "/archetype",
                Some(TOKEN),
                Some(json!({ "name": "CFOs" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let archetype_id = archetype["id"].as_i64().unwrap();

        let id = app.create_prospect().await;
        let (status, body) = app
            .call(
                "PATCH",
                &format!("/prospect/{}/archetype", id),
                Some(TOKEN),
                Some(json!({ "archetype_id": archetype_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["archetype_id"], archetype_id);

        let (status, framework) = app
            .call(
                "POST",
                "/bump",
                Some(TOKEN),
                Some(json!({
                    "title": "Gentle nudge",
                    "overall_status": "PROSPECTED",
                    "default": true
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let framework_id = framework["id"].as_i64().unwrap();

        let (status, body) = app
            .call("GET", "/bump?overall_status=PROSPECTED", Some(TOKEN), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, selection) = app
            .call("GET", &format!("/prospect/{}/bump", id), Some(TOKEN), None)
            .await;
        assert_eq!(selection["bump_framework"]["id"], framework_id);

        let (status, body) = app
            .call(
                "POST",
                &format!("/bump/{}/active", framework_id),
                Some(TOKEN),
                Some(json!({ "active": false })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);

        let (status, _) = app
            .call(
                "PATCH",
                &format!("/bump/{}", framework_id),
                Some("other-token"),
                Some(json!({ "title": "Mine now" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(
                "POST",
                &format!("/archetype/{}/deactivate", archetype_id),
                Some(TOKEN),
                Some(json!({ "hard": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared_prospects"], json!([id]));
    }

    #[tokio::test]
    async fn test_pipeline_counts_callers_prospects() {
        let app = app().await;
        app.create_prospect().await;
        app.create_prospect().await;
        let other = app
            .repository
            .client_sdr_by_token("other-token")
            .await
            .unwrap()
            .unwrap();
        app.repository
            .create_prospect(&sellscale_core::model::NewProspect {
                client_sdr_id: other.id,
                archetype_id: None,
                full_name: "Not mine".to_string(),
                title: None,
                company: None,
            })
            .await
            .unwrap();

        let (status, body) = app.call("GET", "/pipeline", Some(TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_prospects"], 2);
        assert_eq!(body["overall"]["PROSPECTED"], 2);
    }
}
