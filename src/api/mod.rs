//! HTTP API for submissions, health checks and tracker status

use crate::config::ApiConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::rpc::{NetworkClient, ResultPayload};
use crate::tx::{ConfirmationOutcome, SubmissionTracker, UnsignedEnvelope};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<SubmissionTracker>,
    pub network: Arc<dyn NetworkClient>,
    /// Held for the duration of a submission; enforces one in-flight `submit()`
    submit_lock: Arc<Mutex<()>>,
    last_outcome: Arc<RwLock<Option<OutcomeResponse>>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(tracker: Arc<SubmissionTracker>, network: Arc<dyn NetworkClient>) -> Self {
        Self {
            tracker,
            network,
            submit_lock: Arc::new(Mutex::new(())),
            last_outcome: Arc::new(RwLock::new(None)),
            started_at: Utc::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .route("/transactions", post(submit_transaction))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> TrackerResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TrackerError::Config(format!("Cannot bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| TrackerError::Internal(e.to_string()))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - the RPC endpoint must report itself healthy
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let (ready, latest_ledger, detail) = match state.network.health().await {
        Ok(health) => (health.is_healthy(), health.latest_ledger, health.status),
        Err(e) => (false, None, e.to_string()),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            latest_ledger,
            rpc: detail,
        }),
    )
}

/// Get tracker status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = Utc::now().signed_duration_since(state.started_at);

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        busy: state.tracker.is_busy(),
        poll_budget_seconds: state.tracker.polling().budget().as_secs(),
        last_outcome: state.last_outcome.read().await.clone(),
    })
}

/// Sign, submit and confirm one unsigned envelope.
///
/// The submission runs on its own task so a client that disconnects or
/// times out cannot cancel it mid-flight; the outcome is still recorded.
async fn submit_transaction(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    if request.xdr.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "xdr must not be empty");
    }

    let permit = match state.submit_lock.clone().try_lock_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!("Rejecting submission: another transaction is in flight");
            return error_response(
                StatusCode::CONFLICT,
                "a transaction is already being submitted",
            );
        }
    };

    let tracker = state.tracker.clone();
    let last_outcome = state.last_outcome.clone();
    let envelope = UnsignedEnvelope::new(request.xdr);

    let submission = tokio::spawn(async move {
        let outcome = tracker.submit(&envelope).await;
        let response = OutcomeResponse::from(&outcome);
        *last_outcome.write().await = Some(response.clone());
        drop(permit);
        (outcome, response)
    });

    let (outcome, response) = match submission.await {
        Ok(done) => done,
        Err(e) => {
            error!("Submission task failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "submission task failed");
        }
    };

    let status = match outcome {
        ConfirmationOutcome::Success(_) => StatusCode::OK,
        ConfirmationOutcome::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ConfirmationOutcome::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        ConfirmationOutcome::SubmitError(_) => StatusCode::BAD_GATEWAY,
    };

    (status, Json(response)).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

// Request and response types

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub xdr: String,
}

/// JSON view of a terminal outcome
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl From<&ConfirmationOutcome> for OutcomeResponse {
    fn from(outcome: &ConfirmationOutcome) -> Self {
        let cause = outcome.error();
        let hash = match outcome {
            ConfirmationOutcome::Failed { hash, .. } | ConfirmationOutcome::TimedOut { hash, .. } => {
                Some(hash.to_string())
            }
            _ => cause
                .as_ref()
                .and_then(|e| e.transaction_hash())
                .map(str::to_string),
        };
        let result = match outcome {
            ConfirmationOutcome::Success(payload) => payload.clone(),
            _ => None,
        };

        Self {
            outcome: outcome.kind(),
            hash,
            result,
            error_kind: cause.as_ref().map(TrackerError::kind),
            error: cause.map(|e| e.to_string()),
            completed_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    latest_ledger: Option<u64>,
    rpc: String,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    busy: bool,
    poll_budget_seconds: u64,
    last_outcome: Option<OutcomeResponse>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueryError, SignerError};
    use crate::rpc::{HealthStatus, MockNetworkClient, SendStatus, SendTransactionResponse};
    use crate::tx::{MockSigner, PollingConfig};

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    const HASH: &str = "d1a5b9f23e0a0b7c6c1e4f2a9b8d7c6e5f4a3b2c1d0e9f8a7b6c5d4e3f2a1b0c";

    fn state(signer: MockSigner, network: MockNetworkClient) -> AppState {
        let network: Arc<dyn NetworkClient> = Arc::new(network);
        let tracker = SubmissionTracker::new(
            Arc::new(signer),
            network.clone(),
            PollingConfig::default(),
        );
        AppState::new(Arc::new(tracker), network)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_transaction(xdr: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/transactions")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "xdr": xdr }).to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state(MockSigner::new(), MockNetworkClient::new()));
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_follows_rpc_health() {
        let mut network = MockNetworkClient::new();
        network.expect_health().times(1).returning(|| {
            Ok(HealthStatus {
                status: "healthy".to_string(),
                latest_ledger: Some(42),
            })
        });
        let app = router(state(MockSigner::new(), network));
        let response = app.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["latest_ledger"], 42);

        let mut network = MockNetworkClient::new();
        network
            .expect_health()
            .returning(|| Err(QueryError::Transport("connection refused".to_string())));
        let app = router(state(MockSigner::new(), network));
        let response = app.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_submit_reports_outcome_and_status() {
        let mut signer = MockSigner::new();
        signer
            .expect_sign()
            .times(1)
            .returning(|_| Err(SignerError::Rejected("user declined".to_string())));
        let state = state(signer, MockNetworkClient::new());
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(post_transaction("AAAAAQAAAAA="))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "submit_error");
        assert_eq!(body["error_kind"], "signer_rejected");

        let status = body_json(app.oneshot(get("/status")).await.unwrap()).await;
        assert_eq!(status["busy"], false);
        assert_eq!(status["poll_budget_seconds"], 60);
        assert_eq!(status["last_outcome"]["outcome"], "submit_error");
    }

    #[tokio::test]
    async fn test_second_submission_conflicts() {
        let state = state(MockSigner::new(), MockNetworkClient::new());
        let _in_flight = state.submit_lock.clone().try_lock_owned().unwrap();

        let response = router(state)
            .oneshot(post_transaction("AAAAAQAAAAA="))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_client_does_not_cancel_submission() {
        let mut signer = MockSigner::new();
        signer
            .expect_sign()
            .times(1)
            .returning(|_| Ok("AAAAAgAAAAA=".to_string()));

        let mut network = MockNetworkClient::new();
        network.expect_send_transaction().times(1).returning(|_| {
            Ok(SendTransactionResponse {
                status: SendStatus::Pending,
                hash: HASH.to_string(),
                latest_ledger: None,
                error_result_xdr: None,
            })
        });
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        network.expect_get_transaction().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(QueryError::NotFound {
                code: -32602,
                message: "transaction not found".to_string(),
            })
        });

        let errors = Arc::new(AtomicUsize::new(0));
        let error_count = errors.clone();
        let network: Arc<dyn NetworkClient> = Arc::new(network);
        let tracker = SubmissionTracker::new(
            Arc::new(signer),
            network.clone(),
            PollingConfig {
                max_attempts: 10,
                interval: Duration::from_millis(100),
            },
        )
        .on_error(move |_| {
            error_count.fetch_add(1, Ordering::SeqCst);
        });
        let state = AppState::new(Arc::new(tracker), network);

        // The client gives up long before the polling budget runs out
        let request = router(state.clone()).oneshot(post_transaction("AAAAAQAAAAA="));
        assert!(tokio::time::timeout(Duration::from_millis(250), request)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(polls.load(Ordering::SeqCst), 10);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!state.tracker.is_busy());
        assert!(state.submit_lock.try_lock().is_ok());
        let last = state.last_outcome.read().await.clone().unwrap();
        assert_eq!(last.outcome, "timed_out");
        assert_eq!(last.hash.as_deref(), Some(HASH));
    }

    #[tokio::test]
    async fn test_empty_xdr_rejected() {
        let app = router(state(MockSigner::new(), MockNetworkClient::new()));
        let response = app.oneshot(post_transaction("  ")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
