//! HTTP route handlers for the query server.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{Method, StatusCode};
use axum::{Form, Json};

use super::error::ApiError;
use super::request::{EvaluateParams, EvaluateRequest, QueryParams, SeriesRequest, parse_settings};
use super::response::{ApiResponse, ConfigData, EvaluateData, InfoData, SeriesData, to_values};
use crate::apm::MetricsApm;
use crate::error::Error;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub apm: Arc<MetricsApm>,
}

/// Handle GET /api/v1/query
pub async fn handle_query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<ApiResponse<SeriesData>>, ApiError> {
    let request = SeriesRequest::try_from(params)?;
    let range = state.apm.time_range(request.start, request.end);
    let series = state.apm.query(&request.key, &range)?;
    Ok(Json(ApiResponse::success(SeriesData {
        key: request.key,
        values: to_values(&series),
    })))
}

/// Handle GET /api/v1/query_multiple
pub async fn handle_query_multiple(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<ApiResponse<Vec<SeriesData>>>, ApiError> {
    let request = SeriesRequest::try_from(params)?;
    let range = state.apm.time_range(request.start, request.end);
    let streams = state
        .apm
        .query_multiple(&request.key, &range)
        .iter()
        .map(|series| SeriesData {
            key: request.key.clone(),
            values: to_values(series),
        })
        .collect();
    Ok(Json(ApiResponse::success(streams)))
}

/// Handle /api/v1/evaluate
///
/// Parameters come from the query string for GET and from a form body for POST.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<ApiResponse<EvaluateData>>, ApiError> {
    let method = request.method().clone();

    let evaluate_request: EvaluateRequest = match method {
        Method::GET => {
            let Query(params) = Query::<EvaluateParams>::from_request(request, &state)
                .await
                .map_err(|e| {
                    Error::InvalidInput(format!("Failed to parse query parameters: {}", e))
                })?;
            params.try_into()?
        }
        Method::POST => {
            let Form(params) = Form::<EvaluateParams>::from_request(request, &state)
                .await
                .map_err(|e| Error::InvalidInput(format!("Failed to parse form body: {}", e)))?;
            params.try_into()?
        }
        _ => {
            return Err(ApiError(Error::InvalidInput(
                "Only GET and POST methods are supported".to_string(),
            )));
        }
    };

    let range = state
        .apm
        .time_range(evaluate_request.start, evaluate_request.end);
    let series = state.apm.evaluate(&evaluate_request.expr, &range)?;
    Ok(Json(ApiResponse::success(EvaluateData {
        expr: evaluate_request.expr,
        values: to_values(&series),
    })))
}

/// Handle PUT /api/v1/config
///
/// Applies a new configuration. The body is a JSON object of string settings.
pub async fn handle_put_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse<ConfigData>>, ApiError> {
    let settings = parse_settings(&body)?;
    state.apm.configure(&settings).await?;
    let config = state
        .apm
        .config()
        .ok_or_else(|| Error::Config("configuration was not retained".to_string()))?;
    Ok(Json(ApiResponse::success(ConfigData::from(&config))))
}

/// Handle GET /api/v1/config
pub async fn handle_get_config(
    State(state): State<AppState>,
) -> Json<ApiResponse<Option<ConfigData>>> {
    Json(ApiResponse::success(
        state.apm.config().as_ref().map(ConfigData::from),
    ))
}

/// Handle GET /api/v1/info
pub async fn handle_info(State(state): State<AppState>) -> Json<ApiResponse<InfoData>> {
    Json(ApiResponse::success(InfoData {
        plugin: state.apm.plugin_info(),
        polling: state.apm.is_polling().await,
        series: state.apm.store().len(),
    }))
}

/// Handle /metrics endpoint - returns Prometheus text format
pub async fn handle_metrics(State(state): State<AppState>) -> String {
    state.apm.metrics().encode()
}

/// Handle /-/healthy endpoint - returns 200 OK if service is running
pub async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Handle /-/ready endpoint - ready once a configuration has been applied
pub async fn handle_ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.apm.config().is_some() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not configured")
    }
}
