//! HTTP gateway to the charger registers.
//!
//! | Method | Path            | Success                      |
//! |--------|-----------------|------------------------------|
//! | GET    | `/api/list`     | `{"ports": [..]}`            |
//! | GET    | `/api/registers`| `{"registers": [{name, address}]}` |
//! | GET    | `/api/read`     | `{"registers": [..]}`        |
//! | POST   | `/api/submit`   | `{"data": {"values": [..]}}` |
//!
//! `read` and `submit` take the serial device as `?port=`. Invalid input is
//! answered with `400`, connection and transaction failures with `500`, both
//! with an `{"error": ".."}` body.
//!
//! Each request runs its session on the blocking pool. The session finishes
//! and closes its port even if the HTTP client goes away. Sessions against the
//! same device are serialized.

use crate::protocol::{self as proto, RegisterMap};
use crate::session;
use crate::tokio_common::{self, ConnectionParameters, DEFAULT_TIMEOUT};
use crate::transport::Connector;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::*;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Shared state of the gateway.
pub struct AppState<C> {
    pub connector: C,
    pub map: RegisterMap,
    pub baud_rate: proto::BaudRate,
    pub slave: proto::SlaveId,
    pub timeout: Duration,
    locks: DeviceLocks,
}

impl<C> AppState<C> {
    pub fn new(connector: C, map: RegisterMap) -> Self {
        Self {
            connector,
            map,
            baud_rate: proto::BaudRate::default(),
            slave: proto::SlaveId::default(),
            timeout: DEFAULT_TIMEOUT,
            locks: DeviceLocks::default(),
        }
    }

    pub fn with_serial(mut self, baud_rate: proto::BaudRate, slave: proto::SlaveId) -> Self {
        self.baud_rate = baud_rate;
        self.slave = slave;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn serial_params(&self, port: Option<String>) -> Result<ConnectionParameters, ApiError> {
        let params = ConnectionParameters::serial(
            port.unwrap_or_default(),
            self.baud_rate,
            self.slave,
        )?;
        Ok(params.with_timeout(self.timeout))
    }
}

/// One mutex per device, so two requests never share a line.
#[derive(Debug, Default)]
struct DeviceLocks(Mutex<HashMap<String, Arc<Mutex<()>>>>);

impl DeviceLocks {
    fn get(&self, target: &str) -> Arc<Mutex<()>> {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(target.to_owned()).or_default().clone()
    }

    /// Hands back a lock taken with [`DeviceLocks::get`]. The entry goes away
    /// once no other request holds or waits for it.
    fn release(&self, target: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(target)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(target);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Error answer of the gateway.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<tokio_common::Error> for ApiError {
    fn from(err: tokio_common::Error) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<proto::Error> for ApiError {
    fn from(err: proto::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PortQuery {
    pub port: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(alias = "numbers", deserialize_with = "deserialize_register_values")]
    pub values: Vec<u16>,
}

/// Register values as JSON numbers or decimal strings (`10` or `"10"`).
fn deserialize_register_values<'de, D>(deserializer: D) -> Result<Vec<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        String(String),
        Int(u16),
    }

    Vec::<StringOrInt>::deserialize(deserializer)?
        .into_iter()
        .map(|value| match value {
            StringOrInt::Int(i) => Ok(i),
            StringOrInt::String(s) => s
                .trim()
                .parse::<u16>()
                .map_err(|_| D::Error::custom(format!("invalid register value: {s:?}"))),
        })
        .collect()
}

/// Builds the gateway routes.
pub fn router<C>(state: AppState<C>) -> Router
where
    C: Connector + Send + Sync + 'static,
{
    Router::new()
        .route("/api/list", get(list_ports::<C>))
        .route("/api/registers", get(list_registers::<C>))
        .route("/api/read", get(read_registers::<C>))
        .route("/api/submit", post(submit_registers::<C>))
        .with_state(Arc::new(state))
}

/// Runs `f` on the blocking pool while holding the lock of `target`.
async fn run_locked<C, T, F>(
    state: Arc<AppState<C>>,
    target: String,
    f: F,
) -> Result<T, ApiError>
where
    C: Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&AppState<C>) -> tokio_common::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let lock = state.locks.get(&target);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f(&state)
        };
        state.locks.release(&target, lock);
        result
    })
    .await
    .map_err(|err| ApiError::Internal(format!("Session task failed: {err}")))?
    .map_err(ApiError::from)
}

async fn list_ports<C>(State(state): State<Arc<AppState<C>>>) -> Result<Response, ApiError>
where
    C: Connector + Send + Sync + 'static,
{
    let ports = tokio::task::spawn_blocking(move || state.connector.available_ports())
        .await
        .map_err(|err| ApiError::Internal(format!("Port enumeration failed: {err}")))?
        .map_err(|err| ApiError::Internal(format!("Cannot list serial ports: {err}")))?;
    if ports.is_empty() {
        return Err(ApiError::Internal("No serial ports found".to_string()));
    }
    debug!("Found serial ports: {ports:?}");
    Ok(Json(json!({ "ports": ports })).into_response())
}

async fn list_registers<C>(State(state): State<Arc<AppState<C>>>) -> Response
where
    C: Connector + Send + Sync + 'static,
{
    Json(json!({ "registers": state.map })).into_response()
}

async fn read_registers<C>(
    State(state): State<Arc<AppState<C>>>,
    Query(query): Query<PortQuery>,
) -> Result<Response, ApiError>
where
    C: Connector + Send + Sync + 'static,
{
    let params = state.serial_params(query.port)?;
    info!("Reading registers from {params}");
    let values = run_locked(state, params.target(), move |state| {
        session::read_registers(&state.connector, &params, &state.map)
    })
    .await
    .inspect_err(|err| warn!("Read failed: {err:?}"))?;
    Ok(Json(json!({ "registers": values })).into_response())
}

async fn submit_registers<C>(
    State(state): State<Arc<AppState<C>>>,
    Query(query): Query<PortQuery>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Response, ApiError>
where
    C: Connector + Send + Sync + 'static,
{
    let params = state.serial_params(query.port)?;
    let Json(request) = payload.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    state.map.check_values(&request.values)?;
    info!("Writing {} registers to {params}", request.values.len());
    let values = request.values;
    let values = run_locked(state, params.target(), move |state| {
        session::write_registers(&state.connector, &params, &state.map, &values)?;
        Ok(values)
    })
    .await
    .inspect_err(|err| warn!("Write failed: {err:?}"))?;
    Ok(Json(json!({ "data": { "values": values } })).into_response())
}
