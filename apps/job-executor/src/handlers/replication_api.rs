// [apps/job-executor/src/handlers/replication_api.rs]
/*!
 * =================================================================
 * APARATO: REPLICATION API SURFACE
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: CRUD DE LA CAPA DE DR Y ENDPOINTS DE ASISTENTE
 *
 * # Logic:
 * Targets, grupos de protección, VMs protegidas y bitácora de
 * corridas, más los endpoints de asistente (protection-plan,
 * dr-shell-plan, move-to-protection-datastore, create-dr-shell) y el
 * vMotion de almacenamiento en lote. Respuestas {success, ...} con
 * 400/404/500 según el contrato.
 * =================================================================
 */

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use infrasync_domain_models::job::JobType;
use serde_json::{json, Value};

use crate::handlers::{api_error, api_ok, required_field};
use crate::services::replication;
use crate::state::AppState;

// --- TARGETS ---

pub async fn list_targets(State(state): State<AppState>) -> Response {
    match state.replication_rows.targets().await {
        Ok(targets) => api_ok(json!({ "success": true, "targets": targets })),
        Err(list_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, list_fault.to_string()),
    }
}

pub async fn get_target(State(state): State<AppState>, Path(target_id): Path<String>) -> Response {
    match state.replication_rows.target_by_id(&target_id).await {
        Ok(Some(target)) => api_ok(json!({ "success": true, "target": target })),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "Target not found"),
        Err(lookup_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, lookup_fault.to_string()),
    }
}

pub async fn create_target(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    if required_field(&body, "hostname").is_err() && body.get("hosting_vm_id").is_none() {
        return api_error(StatusCode::BAD_REQUEST, "hostname or hosting_vm_id is required");
    }

    match state.replication_rows.create_target(&body).await {
        Ok(created) => api_ok(json!({ "success": true, "target": created })),
        Err(create_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, create_fault.to_string()),
    }
}

pub async fn update_target(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    match state.replication_rows.update_target(&target_id, &body).await {
        Ok(()) => api_ok(json!({ "success": true })),
        Err(update_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, update_fault.to_string()),
    }
}

pub async fn delete_target(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> Response {
    match state.replication_rows.delete_target(&target_id).await {
        Ok(()) => api_ok(json!({ "success": true })),
        Err(delete_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, delete_fault.to_string()),
    }
}

/// POST /api/replication/targets/:id/test: salud del pool vía SSH.
pub async fn test_target(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> Response {
    let target = match state.replication_rows.target_by_id(&target_id).await {
        Ok(Some(target)) => target,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "Target not found"),
        Err(lookup_fault) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, lookup_fault.to_string())
        }
    };

    let Some(credentials) = state
        .ssh_credentials
        .credentials_for_target(&target, None)
        .await
    else {
        return api_error(StatusCode::BAD_REQUEST, "no SSH credentials available for target");
    };

    let pool = target.zfs_pool.clone().unwrap_or_else(|| "dr-pool".to_string());
    match state.zfs.target_health(&credentials, &pool).await {
        Ok(health) => api_ok(json!({ "success": true, "health": health })),
        Err(health_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, health_fault.to_string()),
    }
}

// --- GRUPOS DE PROTECCIÓN ---

pub async fn list_groups(State(state): State<AppState>) -> Response {
    match state.replication_rows.protection_groups().await {
        Ok(groups) => api_ok(json!({ "success": true, "protection_groups": groups })),
        Err(list_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, list_fault.to_string()),
    }
}

pub async fn get_group(State(state): State<AppState>, Path(group_id): Path<String>) -> Response {
    match state.replication_rows.group_by_id(&group_id).await {
        Ok(Some(group)) => api_ok(json!({ "success": true, "protection_group": group })),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "Protection group not found"),
        Err(lookup_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, lookup_fault.to_string()),
    }
}

pub async fn create_group(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    if required_field(&body, "name").is_err() {
        return api_error(StatusCode::BAD_REQUEST, "name is required");
    }
    match state.replication_rows.create_group(&body).await {
        Ok(created) => api_ok(json!({ "success": true, "protection_group": created })),
        Err(create_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, create_fault.to_string()),
    }
}

pub async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    match state.replication_rows.update_group(&group_id, &body).await {
        Ok(()) => api_ok(json!({ "success": true })),
        Err(update_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, update_fault.to_string()),
    }
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Response {
    match state.replication_rows.delete_group(&group_id).await {
        Ok(()) => api_ok(json!({ "success": true })),
        Err(delete_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, delete_fault.to_string()),
    }
}

// --- VMS PROTEGIDAS ---

pub async fn list_protected_vms(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Response {
    match state
        .replication_rows
        .protected_vms_for_group(&group_id, false)
        .await
    {
        Ok(vms) => api_ok(json!({ "success": true, "protected_vms": vms })),
        Err(list_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, list_fault.to_string()),
    }
}

pub async fn add_protected_vm(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(mut body): Json<Value>,
) -> Response {
    if required_field(&body, "vm_name").is_err() {
        return api_error(StatusCode::BAD_REQUEST, "vm_name is required");
    }
    body["protection_group_id"] = json!(group_id);
    if body.get("replication_status").is_none() {
        body["replication_status"] = json!("active");
    }

    match state.replication_rows.add_protected_vm(&body).await {
        Ok(created) => api_ok(json!({ "success": true, "protected_vm": created })),
        Err(create_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, create_fault.to_string()),
    }
}

pub async fn delete_protected_vm(
    State(state): State<AppState>,
    Path(protected_vm_id): Path<String>,
) -> Response {
    match state
        .replication_rows
        .delete_protected_vm(&protected_vm_id)
        .await
    {
        Ok(()) => api_ok(json!({ "success": true })),
        Err(delete_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, delete_fault.to_string()),
    }
}

// --- BITÁCORA Y RUN-NOW ---

pub async fn list_replication_jobs(State(state): State<AppState>) -> Response {
    match state.replication_rows.replication_jobs(100).await {
        Ok(jobs) => api_ok(json!({ "success": true, "jobs": jobs })),
        Err(list_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, list_fault.to_string()),
    }
}

/// POST /api/replication/protection-groups/:id/run: replicación inmediata.
pub async fn run_replication_now(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Response {
    match replication::run_group_replication(&state, &group_id, "manual", None).await {
        Ok(results) => {
            let summary: Vec<Value> = results
                .iter()
                .map(|result| {
                    json!({
                        "protected_vm_id": result.protected_vm_id,
                        "vm_name": result.vm_name,
                        "success": result.success,
                    })
                })
                .collect();
            api_ok(json!({
                "success": true,
                "message": format!("Replication triggered for {} VMs", results.len()),
                "results": summary,
            }))
        }
        Err(run_fault) => {
            if run_fault.contains("not found") {
                api_error(StatusCode::NOT_FOUND, run_fault)
            } else {
                api_error(StatusCode::INTERNAL_SERVER_ERROR, run_fault)
            }
        }
    }
}

// --- INTEGRACIÓN VCENTER ---

pub async fn list_vcenters(State(state): State<AppState>) -> Response {
    match state.settings.all_vcenters().await {
        Ok(mut vcenters) => {
            // El material de credenciales jamás sale por el API.
            for vcenter in &mut vcenters {
                vcenter.password = None;
                vcenter.password_encrypted = None;
            }
            api_ok(json!({ "success": true, "vcenters": vcenters }))
        }
        Err(list_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, list_fault.to_string()),
    }
}

pub async fn list_vcenter_vms(
    State(state): State<AppState>,
    Path(vcenter_id): Path<String>,
) -> Response {
    match state.vcenter_rows.vms_for_vcenter(&vcenter_id).await {
        Ok(vms) => api_ok(json!({ "success": true, "vms": vms })),
        Err(list_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, list_fault.to_string()),
    }
}

/// POST /api/replication/vcenters/:id/sync: encola una sincronización.
pub async fn sync_vcenter(
    State(state): State<AppState>,
    Path(vcenter_id): Path<String>,
) -> Response {
    match state.settings.vcenter_by_id(&vcenter_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "vCenter not found"),
        Err(lookup_fault) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, lookup_fault.to_string())
        }
    }

    match state
        .jobs
        .insert(
            JobType::VcenterSync,
            &json!({ "vcenter_id": vcenter_id }),
            &json!({ "triggered_by": "api" }),
            None,
            None,
        )
        .await
    {
        Ok(job_id) => api_ok(json!({ "success": true, "job_id": job_id })),
        Err(insert_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, insert_fault.to_string()),
    }
}

// --- ENDPOINTS DE ASISTENTE ---

pub async fn protection_plan(
    State(state): State<AppState>,
    Path(protected_vm_id): Path<String>,
) -> Response {
    match replication::protection_plan(&state, &protected_vm_id).await {
        Ok(plan) => api_ok(plan),
        Err(plan_fault) if plan_fault.contains("not found") => {
            api_error(StatusCode::NOT_FOUND, plan_fault)
        }
        Err(plan_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, plan_fault),
    }
}

pub async fn dr_shell_plan(
    State(state): State<AppState>,
    Path(protected_vm_id): Path<String>,
) -> Response {
    match replication::dr_shell_plan(&state, &protected_vm_id).await {
        Ok(plan) => api_ok(plan),
        Err(plan_fault) if plan_fault.contains("not found") => {
            api_error(StatusCode::NOT_FOUND, plan_fault)
        }
        Err(plan_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, plan_fault),
    }
}

pub async fn move_to_protection_datastore(
    State(state): State<AppState>,
    Path(protected_vm_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let datastore = match required_field(&body, "datastore") {
        Ok(datastore) => datastore.to_string(),
        Err(rejection) => return rejection,
    };

    match replication::move_to_protection_datastore(&state, &protected_vm_id, &datastore).await {
        Ok(outcome) => api_ok(outcome),
        Err(move_fault) if move_fault.contains("not found") => {
            api_error(StatusCode::NOT_FOUND, move_fault)
        }
        Err(move_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, move_fault),
    }
}

pub async fn create_dr_shell(
    State(state): State<AppState>,
    Path(protected_vm_id): Path<String>,
) -> Response {
    match replication::create_dr_shell(&state, &protected_vm_id).await {
        Ok(outcome) => api_ok(outcome),
        Err(shell_fault) if shell_fault.contains("not found") => {
            api_error(StatusCode::NOT_FOUND, shell_fault)
        }
        Err(shell_fault) => api_error(StatusCode::INTERNAL_SERVER_ERROR, shell_fault),
    }
}

/// POST /api/zerfaux/batch-storage-vmotion: vMotion de almacenamiento
/// para un lote de VMs protegidas.
pub async fn batch_storage_vmotion(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let datastore = match required_field(&body, "datastore") {
        Ok(datastore) => datastore.to_string(),
        Err(rejection) => return rejection,
    };
    let protected_vm_ids: Vec<String> = body
        .get("protected_vm_ids")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if protected_vm_ids.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "protected_vm_ids is required");
    }

    let mut results: Vec<Value> = Vec::new();
    let mut failed_count = 0usize;

    for protected_vm_id in &protected_vm_ids {
        match replication::move_to_protection_datastore(&state, protected_vm_id, &datastore).await {
            Ok(outcome) => results.push(outcome),
            Err(move_fault) => {
                failed_count += 1;
                results.push(json!({
                    "success": false,
                    "protected_vm_id": protected_vm_id,
                    "error": move_fault,
                }));
            }
        }
    }

    api_ok(json!({
        "success": failed_count == 0,
        "moved": protected_vm_ids.len() - failed_count,
        "failed_count": failed_count,
        "results": results,
    }))
}
