// [apps/job-executor/src/services/preflight.rs]
/*!
 * =================================================================
 * APARATO: PREFLIGHT ENGINE
 * CLASIFICACIÓN: EXECUTION LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: CHEQUEO PARALELO DE FLOTA PREVIO A ACTUALIZACIONES
 *
 * # Logic:
 * Seis chequeos por host: conectividad, autenticación (un solo
 * get_system_info prueba ambas), Lifecycle Controller Ready, cero
 * trabajos Redfish pendientes, estado de energía y salud global.
 * Máximo 4 hosts en vuelo. Modo streaming: eventos 'progress',
 * 'server_result' y un 'done' final; modo lote: el agregado al final.
 * El contador de progreso se agrega bajo mutex con un solo emisor.
 * =================================================================
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use infrasync_infra_idrac::{Correlation, IdracSession};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::state::AppState;

/// Tope de hosts en vuelo durante el preflight.
const MAX_IN_FLIGHT: usize = 4;

/// Estados de trabajo iDRAC que bloquean una actualización.
const BLOCKING_JOB_STATES: [&str; 4] = ["Scheduled", "Running", "Waiting", "New"];

/// Evento del modo streaming.
#[derive(Debug, Clone)]
pub enum PreflightEvent {
    Progress(Value),
    ServerResult(Value),
    Done(Value),
    Error(Value),
}

impl PreflightEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::ServerResult(_) => "server_result",
            Self::Done(_) => "done",
            Self::Error(_) => "error",
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            Self::Progress(payload)
            | Self::ServerResult(payload)
            | Self::Done(payload)
            | Self::Error(payload) => payload,
        }
    }
}

struct ProgressState {
    completed: usize,
    passed: usize,
    failed: usize,
}

async fn emit(emitter: &Option<mpsc::Sender<PreflightEvent>>, event: PreflightEvent) {
    if let Some(sender) = emitter {
        let _ = sender.send(event).await;
    }
}

/// Chequeo completo de un servidor.
async fn check_single_server(state: &AppState, server_id: &str) -> Value {
    let mut result = json!({
        "server_id": server_id,
        "hostname": Value::Null,
        "ip_address": Value::Null,
        "ready": true,
        "checks": {
            "connectivity": {"passed": false, "message": "Not checked"},
            "auth": {"passed": false, "message": "Not checked"},
            "lifecycle_controller": {"passed": false, "status": "Unknown"},
            "pending_jobs": {"passed": false, "count": Value::Null},
            "power_state": {"passed": false, "state": "Unknown"},
            "system_health": {"passed": false, "overall": "Unknown"},
        },
        "blockers": [],
        "warnings": [],
    });

    let push_blocker = |result: &mut Value, blocker_type: &str, message: String| {
        result["ready"] = json!(false);
        if let Some(blockers) = result["blockers"].as_array_mut() {
            blockers.push(json!({ "type": blocker_type, "message": message }));
        }
    };
    let push_warning = |result: &mut Value, message: String| {
        if let Some(warnings) = result["warnings"].as_array_mut() {
            warnings.push(json!(message));
        }
    };

    // Resolución del servidor.
    let server = match state.servers.by_id(server_id).await {
        Ok(Some(server)) => server,
        _ => {
            push_blocker(&mut result, "server_not_found", "Server not found in database".to_string());
            return result;
        }
    };
    result["hostname"] = json!(server.hostname.clone().unwrap_or_else(|| "Unknown".to_string()));
    result["ip_address"] = json!(server.ip_address.clone());

    // Chequeo 1: conectividad TCP.
    let tcp = state
        .idrac
        .tcp_probe(&server.ip_address, Duration::from_secs(10))
        .await;
    if tcp.reachable {
        result["checks"]["connectivity"] = json!({
            "passed": true,
            "message": format!("Reachable ({}ms)", tcp.response_time_ms),
        });
    } else {
        result["checks"]["connectivity"] = json!({"passed": false, "message": "iDRAC not reachable"});
        push_blocker(&mut result, "connectivity", "iDRAC not reachable".to_string());
        return result;
    }

    // Chequeo 2: credenciales + autenticación en una sola llamada.
    let resolved = state.resolver.resolve_for_server(&server).await;
    if !resolved.is_usable() {
        result["checks"]["auth"] = json!({"passed": false, "message": "No credentials configured"});
        push_blocker(&mut result, "auth", "No credentials configured for server".to_string());
        return result;
    }

    let session = IdracSession::new(
        &server.ip_address,
        resolved.username.as_deref().unwrap_or_default(),
        resolved.password.as_deref().unwrap_or_default(),
    );
    let correlation = Correlation::for_server(server_id);

    let system_info = match state.idrac.system_info(&session, &correlation).await {
        Ok(info) => {
            result["checks"]["auth"] = json!({"passed": true, "message": "Authentication successful"});
            info
        }
        Err(auth_fault) => {
            result["checks"]["auth"] = json!({"passed": false, "message": auth_fault.to_string()});
            push_blocker(
                &mut result,
                "auth",
                format!("Authentication failed: {}", auth_fault),
            );
            return result;
        }
    };

    // Chequeo 3: Lifecycle Controller Ready.
    match state.idrac.lifecycle_controller_status(&session, &correlation).await {
        Ok(lc_status) => {
            let lc_state = lc_status.get("status").and_then(Value::as_str).unwrap_or("Unknown");
            let server_state = lc_status
                .get("server_status")
                .and_then(Value::as_str)
                .unwrap_or("Unknown");
            let passed = lc_state == "Ready";
            result["checks"]["lifecycle_controller"] = json!({
                "passed": passed,
                "status": lc_state,
                "server_status": server_state,
            });
            if !passed {
                push_blocker(
                    &mut result,
                    "lifecycle_controller",
                    format!(
                        "Lifecycle Controller not ready: {} (Server: {})",
                        lc_state, server_state
                    ),
                );
            }
        }
        Err(lc_fault) => {
            // iDRACs antiguos sin la acción OEM: advertencia, no bloqueo.
            result["checks"]["lifecycle_controller"] =
                json!({"passed": false, "status": format!("Error: {}", lc_fault)});
            push_warning(&mut result, format!("Could not check LC status: {}", lc_fault));
        }
    }

    // Chequeo 4: trabajos Redfish pendientes.
    match state.idrac.job_queue(&session, &correlation).await {
        Ok(all_jobs) => {
            let pending: Vec<Value> = all_jobs
                .into_iter()
                .filter(|job| {
                    job.get("job_state")
                        .and_then(Value::as_str)
                        .map(|job_state| BLOCKING_JOB_STATES.contains(&job_state))
                        .unwrap_or(false)
                })
                .collect();
            let count = pending.len();

            if count == 0 {
                result["checks"]["pending_jobs"] = json!({"passed": true, "count": 0, "jobs": []});
            } else {
                let sample: Vec<Value> = pending.iter().take(5).cloned().collect();
                result["checks"]["pending_jobs"] =
                    json!({"passed": false, "count": count, "jobs": sample});
                push_blocker(
                    &mut result,
                    "pending_jobs",
                    format!("{} pending iDRAC job(s) must be cleared first", count),
                );
            }
        }
        Err(queue_fault) => {
            result["checks"]["pending_jobs"] =
                json!({"passed": false, "count": Value::Null, "jobs": [], "message": queue_fault.to_string()});
            push_warning(&mut result, format!("Could not check iDRAC jobs: {}", queue_fault));
        }
    }

    // Chequeo 5: estado de energía.
    let power_state = system_info
        .pointer("/system/power_state")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    result["checks"]["power_state"] = json!({"passed": true, "state": power_state});
    if power_state == "Off" {
        push_warning(
            &mut result,
            "Server is powered off - will need to be powered on for updates".to_string(),
        );
    }

    // Chequeo 6: salud global (advertencia, nunca bloqueo).
    let health = system_info
        .pointer("/system/health")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    result["checks"]["system_health"] = json!({
        "passed": health == "OK" || health == "Warning",
        "overall": health,
    });
    if health == "Critical" {
        push_warning(&mut result, "System health is Critical - review before updating".to_string());
    } else if health == "Warning" {
        push_warning(&mut result, "System health shows warnings".to_string());
    }

    result
}

/// Corre el preflight sobre la flota. Con 'emitter' presente se emite
/// el ciclo SSE completo; el agregado se devuelve siempre.
pub async fn run_preflight(
    state: &AppState,
    server_ids: Vec<String>,
    firmware_source: &str,
    emitter: Option<mpsc::Sender<PreflightEvent>>,
) -> Value {
    let started = Instant::now();
    let total_servers = server_ids.len();

    info!(
        "🛫 [PREFLIGHT]: Checking {} server(s), firmware_source={}.",
        total_servers, firmware_source
    );

    emit(
        &emitter,
        PreflightEvent::Progress(json!({
            "current": 0,
            "total": total_servers,
            "percent": 0,
            "current_hostname": "Starting...",
            "passed": 0,
            "failed": 0,
        })),
    )
    .await;

    let progress = Arc::new(Mutex::new(ProgressState {
        completed: 0,
        passed: 0,
        failed: 0,
    }));
    let permits = Arc::new(Semaphore::new(MAX_IN_FLIGHT.min(total_servers.max(1))));

    let mut join_set: JoinSet<(usize, Value)> = JoinSet::new();
    for (index, server_id) in server_ids.iter().cloned().enumerate() {
        let state = state.clone();
        let permits = permits.clone();
        join_set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let result = check_single_server(&state, &server_id).await;
            (index, result)
        });
    }

    let mut ordered_results: Vec<(usize, Value)> = Vec::with_capacity(total_servers);

    while let Some(joined) = join_set.join_next().await {
        let Ok((index, server_result)) = joined else { continue };
        let ready = server_result["ready"].as_bool().unwrap_or(false);

        let (completed, passed, failed) = {
            let mut progress = progress.lock().await;
            progress.completed += 1;
            if ready {
                progress.passed += 1;
            } else {
                progress.failed += 1;
            }
            (progress.completed, progress.passed, progress.failed)
        };

        emit(
            &emitter,
            PreflightEvent::Progress(json!({
                "current": completed,
                "total": total_servers,
                "percent": if total_servers > 0 { completed * 100 / total_servers } else { 100 },
                "current_hostname": server_result["hostname"],
                "passed": passed,
                "failed": failed,
                "status": "completed",
            })),
        )
        .await;

        emit(
            &emitter,
            PreflightEvent::ServerResult(json!({
                "server_id": server_result["server_id"],
                "hostname": server_result["hostname"],
                "ready": ready,
                "index": completed,
            })),
        )
        .await;

        ordered_results.push((index, server_result));
    }

    // Reordenar al orden de entrada y agregar.
    ordered_results.sort_by_key(|(index, _)| *index);

    let mut aggregate = json!({
        "servers": [],
        "firmware_source_checks": {},
        "overall_ready": true,
        "blockers": [],
        "warnings": [],
    });

    fn append_to(aggregate: &mut Value, key: &str, entry: Value) {
        if let Some(entries) = aggregate[key].as_array_mut() {
            entries.push(entry);
        }
    }

    let mut first_authenticated: Option<String> = None;
    for (_, server_result) in &ordered_results {
        if !server_result["ready"].as_bool().unwrap_or(false) {
            aggregate["overall_ready"] = json!(false);
            if let Some(blockers) = server_result["blockers"].as_array() {
                for blocker in blockers {
                    let mut entry = blocker.clone();
                    entry["server_id"] = server_result["server_id"].clone();
                    entry["hostname"] = server_result["hostname"].clone();
                    append_to(&mut aggregate, "blockers", entry);
                }
            }
        }

        if let Some(warnings) = server_result["warnings"].as_array() {
            for warning in warnings {
                let entry = json!({
                    "server_id": server_result["server_id"],
                    "hostname": server_result["hostname"],
                    "message": warning,
                });
                append_to(&mut aggregate, "warnings", entry);
            }
        }

        if first_authenticated.is_none()
            && server_result
                .pointer("/checks/auth/passed")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        {
            first_authenticated = server_result["server_id"].as_str().map(str::to_string);
        }

        append_to(&mut aggregate, "servers", server_result.clone());
    }

    // Chequeo del catálogo online de Dell (DNS + alcance del repo).
    if firmware_source == "dell_online_catalog" {
        if let Some(probe_server_id) = first_authenticated {
            let repo_checks = check_dell_repo_access(state, &probe_server_id).await;

            if !repo_checks.get("dell_reachable").and_then(Value::as_bool).unwrap_or(false) {
                aggregate["overall_ready"] = json!(false);
                append_to(&mut aggregate, "blockers", json!({
                    "type": "dell_repo_unreachable",
                    "message": "iDRAC cannot reach Dell repository (downloads.dell.com)",
                    "suggestion": "Configure gateway/DNS in iDRAC Network Settings, or switch to Local Repository",
                }));
            }
            if !repo_checks.get("dns_configured").and_then(Value::as_bool).unwrap_or(false) {
                append_to(&mut aggregate, "warnings", json!({
                    "server_id": probe_server_id,
                    "message": "DNS may not be configured - online catalog updates may fail",
                }));
            }
            aggregate["firmware_source_checks"] = repo_checks;
        }
    }

    let response_time_ms = started.elapsed().as_millis() as u64;
    let mut done_payload = json!({
        "success": true,
        "response_time_ms": response_time_ms,
    });
    if let (Some(done), Some(results)) = (done_payload.as_object_mut(), aggregate.as_object()) {
        for (key, value) in results {
            done.insert(key.clone(), value.clone());
        }
    }

    emit(&emitter, PreflightEvent::Done(done_payload.clone())).await;
    done_payload
}

/// Alcance del repositorio Dell desde un iDRAC ya autenticado.
async fn check_dell_repo_access(state: &AppState, server_id: &str) -> Value {
    let Ok(Some(server)) = state.servers.by_id(server_id).await else {
        return json!({ "dell_reachable": false, "dns_configured": false });
    };

    let resolved = state.resolver.resolve_for_server(&server).await;
    if !resolved.is_usable() {
        return json!({ "dell_reachable": false, "dns_configured": false });
    }

    let session = IdracSession::new(
        &server.ip_address,
        resolved.username.as_deref().unwrap_or_default(),
        resolved.password.as_deref().unwrap_or_default(),
    );

    match state
        .idrac
        .test_repo_reachability(&session, "downloads.dell.com", &Correlation::for_server(server_id))
        .await
    {
        Ok(checks) => checks,
        Err(repo_fault) => {
            warn!("⚠️ [PREFLIGHT]: Dell repo check degraded: {}", repo_fault);
            json!({ "dell_reachable": false, "dns_configured": false })
        }
    }
}
