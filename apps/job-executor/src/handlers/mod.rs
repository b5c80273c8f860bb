// [apps/job-executor/src/handlers/mod.rs]
/*!
 * =================================================================
 * APARATO: API HANDLER COMMONS
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: DISCIPLINA UNIFORME DE RESPUESTAS DEL API
 *
 * # Logic:
 * Cada handler sigue el mismo camino: parsear JSON → validar campos
 * requeridos (400) → resolver servidor (404) → resolver credenciales
 * (400) → invocar la primitiva → construir respuesta → rastro de
 * actividad. Las excepciones se convierten en 500 con
 * {success:false, error}.
 * =================================================================
 */

pub mod health;
pub mod instant;
pub mod preflight_stream;
pub mod replication_api;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use infrasync_domain_models::server::ServerRecord;
use infrasync_infra_idrac::IdracSession;
use serde_json::{json, Value};

use crate::state::AppState;

/// Respuesta de error uniforme del API instantáneo.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

pub fn api_ok(payload: Value) -> Response {
    (StatusCode::OK, Json(payload)).into_response()
}

/// Campo requerido del cuerpo JSON, o 400.
pub fn required_field<'a>(body: &'a Value, field: &str) -> Result<&'a str, Response> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("{} is required", field)))
}

/// Resuelve servidor (404) y credenciales (400) en un solo paso.
pub async fn resolve_server_session(
    state: &AppState,
    server_id: &str,
) -> Result<(ServerRecord, IdracSession), Response> {
    let server = match state.servers.by_id(server_id).await {
        Ok(Some(server)) => server,
        Ok(None) => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("server {} not found", server_id),
            ))
        }
        Err(lookup_fault) => {
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, lookup_fault.to_string()))
        }
    };

    let resolved = state.resolver.resolve_for_server(&server).await;
    if !resolved.is_usable() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "no usable credentials for server {} (source: {})",
                server_id,
                resolved.source.as_str()
            ),
        ));
    }

    let session = IdracSession::new(
        &server.ip_address,
        resolved.username.as_deref().unwrap_or_default(),
        resolved.password.as_deref().unwrap_or_default(),
    );

    Ok((server, session))
}
