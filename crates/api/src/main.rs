use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use outlook_core::config::{AnalysisOptions, Settings};
use outlook_core::error::OutlookError;
use outlook_core::service::{AnalysisRequest, OutlookService};

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let options = AnalysisOptions::from_env();
    let service = match OutlookService::from_settings(&settings, options, false) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "outlook service not configured; starting API in degraded mode");
            None
        }
    };

    let state = AppState { service };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/analyze", post(analyze))
        .with_state(state)
        .layer(cors_layer(&settings))
        .layer(TraceLayer::new_for_http());

    let port = settings.port.unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    service: Option<Arc<OutlookService>>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    ticker: String,
    #[serde(default)]
    company_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    request_id: Uuid,
}

struct ApiError {
    status: StatusCode,
    message: String,
    request_id: Uuid,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            request_id: self.request_id,
        };
        (self.status, Json(body)).into_response()
    }
}

fn status_for(err: &OutlookError) -> StatusCode {
    match err {
        OutlookError::InvalidTicker(_) => StatusCode::BAD_REQUEST,
        OutlookError::DataUnavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let Some(service) = &state.service else {
        return Err(ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "outlook service is not configured".into(),
            request_id,
        });
    };

    let span = tracing::info_span!("analyze", %request_id, ticker = %body.ticker);
    let request = AnalysisRequest {
        ticker: body.ticker,
        company_name: body.company_name,
        as_of_date: None,
    };

    match service.analyze(request).instrument(span).await {
        Ok(report) => {
            let mut response = Json(report).into_response();
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert("x-request-id", value);
            }
            Ok(response)
        }
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                let report = anyhow::Error::new(err.clone()).context(format!("request {request_id}"));
                sentry_anyhow::capture_anyhow(&report);
                tracing::error!(%request_id, error = %err, "analysis failed");
            } else {
                tracing::info!(%request_id, error = %err, "analysis rejected");
            }
            Err(ApiError {
                status,
                message: err.to_string(),
                request_id,
            })
        }
    }
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let raw = settings
        .cors_allowed_origins
        .as_deref()
        .unwrap_or(DEFAULT_CORS_ORIGINS);
    let origins: Vec<HeaderValue> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match HeaderValue::from_str(s) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = s, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
