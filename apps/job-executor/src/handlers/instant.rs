// [apps/job-executor/src/handlers/instant.rs]
/*!
 * =================================================================
 * APARATO: INSTANT OPERATION HANDLERS
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: OPERACIONES SÍNCRONAS QUE NO PASAN POR LA COLA
 * =================================================================
 */

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use infrasync_infra_idrac::Correlation;
use serde_json::{json, Value};

use crate::handlers::{api_error, api_ok, required_field, resolve_server_session};
use crate::state::AppState;

/// Acciones de energía aceptadas por el proveedor.
const POWER_ACTIONS: [&str; 7] = [
    "On",
    "ForceOff",
    "GracefulShutdown",
    "ForceRestart",
    "GracefulRestart",
    "PowerCycle",
    "Nmi",
];

/// POST /api/console-launch
pub async fn console_launch(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .kvm_launch_info(&session, &Correlation::for_server(&server_id))
        .await
    {
        Ok(launch_info) => api_ok(json!({ "success": true, "console": launch_info })),
        Err(launch_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, launch_fault.to_string()),
    }
}

/// POST /api/power-control
pub async fn power_control(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };
    let action = match required_field(&body, "action") {
        Ok(action) => action.to_string(),
        Err(rejection) => return rejection,
    };

    if !POWER_ACTIONS.contains(&action.as_str()) {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid action '{}' (expected one of {:?})", action, POWER_ACTIONS),
        );
    }

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .set_power_state(&session, &action, &Correlation::for_server(&server_id))
        .await
    {
        Ok(outcome) => api_ok(outcome),
        Err(power_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, power_fault.to_string()),
    }
}

/// POST /api/connectivity-test
pub async fn connectivity_test(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };

    let (server, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    let tcp = state
        .idrac
        .tcp_probe(&server.ip_address, std::time::Duration::from_secs(10))
        .await;

    if !tcp.reachable {
        return api_ok(json!({
            "success": false,
            "reachable": false,
            "response_time_ms": tcp.response_time_ms,
            "error": tcp.error,
        }));
    }

    match state
        .idrac
        .authenticate_probe(&session, &Correlation::for_server(&server_id))
        .await
    {
        Ok(probe) => api_ok(json!({
            "success": true,
            "reachable": true,
            "authenticated": true,
            "response_time_ms": tcp.response_time_ms,
            "product": probe.get("product"),
        })),
        Err(auth_fault) if auth_fault.is_auth() => api_ok(json!({
            "success": false,
            "reachable": true,
            "authenticated": false,
            "error": "authentication failed",
        })),
        Err(other) => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// POST /api/browse-datastore
pub async fn browse_datastore(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let vcenter_id = match required_field(&body, "vcenter_id") {
        Ok(vcenter_id) => vcenter_id.to_string(),
        Err(rejection) => return rejection,
    };
    let datastore = match required_field(&body, "datastore") {
        Ok(datastore) => datastore.to_string(),
        Err(rejection) => return rejection,
    };
    let folder_path = body
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or("/")
        .to_string();

    let settings = match state.settings.vcenter_by_id(&vcenter_id).await {
        Ok(Some(settings)) => settings,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "vCenter not found"),
        Err(lookup_fault) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, lookup_fault.to_string())
        }
    };

    let session = match state.vcenter_sessions.connect(&settings).await {
        Ok(session) => session,
        Err(connect_fault) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, connect_fault.to_string())
        }
    };

    match state
        .vcenter_ops
        .browse_datastore(&session, &datastore, &folder_path)
        .await
    {
        Ok(entries) => api_ok(json!({
            "success": true,
            "datastore": datastore,
            "path": folder_path,
            "entries": entries,
        })),
        Err(browse_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, browse_fault.to_string()),
    }
}

/// POST /api/idm-authenticate
pub async fn idm_authenticate(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let username = match required_field(&body, "username") {
        Ok(username) => username.to_string(),
        Err(rejection) => return rejection,
    };
    let password = match required_field(&body, "password") {
        Ok(password) => password.to_string(),
        Err(rejection) => return rejection,
    };

    let Some(idm) = state.idm.clone() else {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "IDM authentication is not configured",
        );
    };

    match idm.authenticate(&username, &password).await {
        Ok(outcome) => api_ok(json!({ "success": true, "identity": outcome })),
        Err(infrasync_infra_idm::IdmError::BindRejected(_)) => api_ok(json!({
            "success": false,
            "error": "invalid credentials",
        })),
        Err(other) => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// POST /api/network-config-read
pub async fn network_config_read(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .network_settings(&session, &Correlation::for_server(&server_id))
        .await
    {
        Ok(settings) => api_ok(json!({ "success": true, "network": settings })),
        Err(read_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, read_fault.to_string()),
    }
}

/// POST /api/network-config-write
pub async fn network_config_write(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };
    let Some(attributes) = body.get("attributes").filter(|value| value.is_object()) else {
        return api_error(StatusCode::BAD_REQUEST, "attributes object is required");
    };

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .set_network_settings(&session, attributes, &Correlation::for_server(&server_id))
        .await
    {
        Ok(outcome) => api_ok(outcome),
        Err(write_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, write_fault.to_string()),
    }
}

/// POST /api/health-check
pub async fn health_check(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .system_info(&session, &Correlation::for_server(&server_id))
        .await
    {
        Ok(info) => api_ok(json!({ "success": true, "health": info })),
        Err(health_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, health_fault.to_string()),
    }
}

/// POST /api/event-logs
pub async fn event_logs(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };
    let log_type = body
        .get("log_type")
        .and_then(Value::as_str)
        .unwrap_or("sel")
        .to_string();

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .event_logs(&session, &log_type, &Correlation::for_server(&server_id))
        .await
    {
        Ok(entries) => api_ok(json!({
            "success": true,
            "log_type": log_type,
            "entry_count": entries.len(),
            "entries": entries,
        })),
        Err(log_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, log_fault.to_string()),
    }
}

/// POST /api/boot-config-read
pub async fn boot_config_read(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .boot_config(&session, &Correlation::for_server(&server_id))
        .await
    {
        Ok(boot) => api_ok(json!({ "success": true, "boot": boot })),
        Err(boot_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, boot_fault.to_string()),
    }
}

/// POST /api/bios-config-read
pub async fn bios_config_read(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .bios_attributes(&session, &Correlation::for_server(&server_id))
        .await
    {
        Ok(bios) => api_ok(json!({ "success": true, "bios": bios })),
        Err(bios_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, bios_fault.to_string()),
    }
}

/// POST /api/firmware-inventory
pub async fn firmware_inventory(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .firmware_inventory(&session, &Correlation::for_server(&server_id))
        .await
    {
        Ok(inventory) => api_ok(json!({
            "success": true,
            "component_count": inventory.len(),
            "components": inventory,
        })),
        Err(inventory_fault) => {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, inventory_fault.to_string())
        }
    }
}

/// POST /api/idrac-jobs
pub async fn idrac_jobs(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_id = match required_field(&body, "server_id") {
        Ok(server_id) => server_id.to_string(),
        Err(rejection) => return rejection,
    };

    let (_, session) = match resolve_server_session(&state, &server_id).await {
        Ok(pair) => pair,
        Err(rejection) => return rejection,
    };

    match state
        .idrac
        .job_queue(&session, &Correlation::for_server(&server_id))
        .await
    {
        Ok(jobs) => api_ok(json!({
            "success": true,
            "job_count": jobs.len(),
            "jobs": jobs,
        })),
        Err(queue_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, queue_fault.to_string()),
    }
}

/// POST /api/preflight-check (modo lote).
pub async fn preflight_check(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let server_ids: Vec<String> = body
        .get("server_ids")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if server_ids.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "server_ids is required");
    }

    let firmware_source = body
        .get("firmware_source")
        .and_then(Value::as_str)
        .unwrap_or("local_repository")
        .to_string();

    let aggregate =
        crate::services::preflight::run_preflight(&state, server_ids, &firmware_source, None).await;
    api_ok(aggregate)
}
