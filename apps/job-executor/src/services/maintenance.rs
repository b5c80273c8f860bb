// [apps/job-executor/src/services/maintenance.rs]
/*!
 * =================================================================
 * APARATO: MAINTENANCE DRIVER
 * CLASIFICACIÓN: EXECUTION LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: EVACUACIÓN DE HOSTS CON MONITOR DE DOBLE RELOJ
 *
 * # Logic:
 * El driver muestrea vCenter cada intervalo (VMs encendidas,
 * migraciones activas, bandera de mantenimiento) y alimenta al monitor
 * puro del dominio. Cada sueño del bucle va precedido de un chequeo de
 * cancelación. 'NotAuthenticated' se reintenta hasta 2 veces
 * revalidando la sesión. Ante estancamiento se captura el payload
 * estructurado de bloqueadores antes de fallar.
 * =================================================================
 */

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use infrasync_domain_maintenance::{
    analyze_blockers, EvacuationMonitor, EvacuationObservation, EvacuationTunables,
    EvacuationVerdict, VmFacts,
};
use infrasync_domain_models::inventory::{VcenterHostRecord, VcenterSettingsRecord};
use infrasync_domain_models::job::JobStatus;
use infrasync_infra_vcenter::{VcError, VcSession};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::services::job_context::JobContext;
use crate::state::AppState;

/// Reintentos máximos por expiración de sesión.
const MAX_SESSION_RETRIES: u32 = 2;

/// Resuelve la fila del host y la fila de settings de su vCenter.
async fn resolve_host_and_settings(
    state: &AppState,
    host_id: &str,
) -> Result<(VcenterHostRecord, VcenterSettingsRecord), String> {
    let host = state
        .vcenter_rows
        .host_by_id(host_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "Host not found in database".to_string())?;

    let settings = state
        .settings
        .vcenter_by_id(&host.source_vcenter_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| {
            format!(
                "vCenter settings not found for ID {}",
                host.source_vcenter_id
            )
        })?;

    Ok((host, settings))
}

/// Muestra de evacuación con reintento de sesión.
async fn sample_host(
    state: &AppState,
    settings: &VcenterSettingsRecord,
    session: &mut VcSession,
    host_moid: &str,
) -> Result<EvacuationObservation, VcError> {
    let mut retries = 0u32;

    loop {
        let attempt = async {
            let runtime = state.vcenter_ops.host_runtime(session, host_moid).await?;
            let in_maintenance = runtime
                .get("in_maintenance")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let vms = state
                .vcenter_ops
                .powered_on_vms_on_host(session, host_moid)
                .await?;
            let vm_moids: HashSet<String> = vms.iter().map(|vm| vm.moid.clone()).collect();

            let migrations = state
                .vcenter_ops
                .active_migration_tasks(session, host_moid, &vm_moids)
                .await?;

            Ok::<EvacuationObservation, VcError>(EvacuationObservation {
                powered_on_vms: vms.len() as u32,
                active_migrations: migrations,
                in_maintenance,
            })
        }
        .await;

        match attempt {
            Ok(observation) => return Ok(observation),
            Err(sample_fault) if sample_fault.is_session_expired() && retries < MAX_SESSION_RETRIES => {
                retries += 1;
                warn!(
                    "♻️ [MAINTENANCE]: Session expired, revalidating (retry {}/{}).",
                    retries, MAX_SESSION_RETRIES
                );
                *session = state.vcenter_sessions.ensure_session(settings).await?;
            }
            Err(other) => return Err(other),
        }
    }
}

/// Payload estructurado de bloqueadores para el fallo por estancamiento.
async fn capture_evacuation_blockers(
    state: &AppState,
    session: &VcSession,
    host_moid: &str,
) -> Value {
    let local_datastores = state
        .vcenter_ops
        .local_datastores_for_host(session, host_moid)
        .await
        .unwrap_or_default();

    let vms = state
        .vcenter_ops
        .powered_on_vms_on_host(session, host_moid)
        .await
        .unwrap_or_default();

    let mut facts: Vec<VmFacts> = Vec::new();
    let mut vms_remaining: Vec<Value> = Vec::new();

    for vm in &vms {
        match state
            .vcenter_ops
            .vm_facts(session, &vm.moid, &local_datastores)
            .await
        {
            Ok(vm_facts) => {
                vms_remaining.push(json!({
                    "name": vm_facts.name,
                    "power_state": "poweredOn",
                    "reason": vm_facts.stall_reason(),
                }));
                facts.push(vm_facts);
            }
            Err(facts_fault) => {
                warn!("⚠️ [MAINTENANCE]: VM {} analysis degraded: {}", vm.name, facts_fault);
                vms_remaining.push(json!({
                    "name": vm.name,
                    "power_state": "unknown",
                    "reason": "could not analyze",
                }));
            }
        }
    }

    let analysis = analyze_blockers(&facts);

    json!({
        "vms_remaining": vms_remaining,
        "total_vms": vms_remaining.len(),
        "can_enter_maintenance": analysis.can_enter_maintenance,
        "blockers": serde_json::to_value(&analysis.blockers).unwrap_or(json!([])),
        "reason": format!(
            "DRS could not evacuate {} VM(s) within the timeout period",
            vms_remaining.len()
        ),
    })
}

/// Handler del trabajo 'enter_maintenance'.
pub async fn execute_enter_maintenance(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();
    let Some(host_id) = scope.host_id else {
        context.finish_failed("host_id is required").await;
        return Ok(());
    };

    let (host, settings) = match resolve_host_and_settings(state, &host_id).await {
        Ok(pair) => pair,
        Err(resolve_fault) => {
            context.finish_failed(resolve_fault).await;
            return Ok(());
        }
    };

    let host_moid = host.vcenter_id.clone();
    let host_name = host.name.clone();

    let mut session = match state.vcenter_sessions.ensure_session(&settings).await {
        Ok(session) => session,
        Err(connect_fault) => {
            context
                .finish_failed(format!("Failed to connect to vCenter: {}", connect_fault))
                .await;
            return Ok(());
        }
    };

    // Tunables: el timeout absoluto puede venir en details.
    let absolute_timeout_seconds = context
        .job
        .details
        .get("timeout")
        .and_then(Value::as_i64)
        .unwrap_or(1800);
    let tunables = EvacuationTunables {
        absolute_timeout: chrono::Duration::seconds(absolute_timeout_seconds),
        ..Default::default()
    };

    // Muestra inicial.
    let initial = match sample_host(state, &settings, &mut session, &host_moid).await {
        Ok(observation) => observation,
        Err(sample_fault) => {
            context
                .finish_failed(format!("Initial host sampling failed: {}", sample_fault))
                .await;
            return Ok(());
        }
    };

    if initial.in_maintenance {
        info!("✅ [MAINTENANCE]: Host {} already in maintenance mode.", host_name);
        context
            .finish(
                JobStatus::Completed,
                json!({
                    "success": true,
                    "in_maintenance": true,
                    "vms_evacuated": 0,
                    "time_taken_seconds": 0,
                }),
            )
            .await;
        return Ok(());
    }

    let vms_before = initial.powered_on_vms;
    info!(
        "🏗️ [MAINTENANCE]: Host {} has {} running VMs to evacuate.",
        host_name, vms_before
    );

    // Disparo de la acción de mantenimiento.
    if let Err(action_fault) = state.vcenter_ops.enter_maintenance(&session, &host_moid).await {
        context
            .finish_failed(format!("Enter maintenance action failed: {}", action_fault))
            .await;
        return Ok(());
    }

    let mut monitor = EvacuationMonitor::new(tunables, vms_before, Utc::now());
    let check_interval = Duration::from_secs(30);

    loop {
        // Cancelación cooperativa antes de cada sueño del bucle.
        if context.is_cancelled().await {
            context.finish_cancelled().await;
            return Ok(());
        }

        tokio::time::sleep(check_interval).await;

        let observation = match sample_host(state, &settings, &mut session, &host_moid).await {
            Ok(observation) => observation,
            Err(sample_fault) => {
                warn!("⚠️ [MAINTENANCE]: Sampling degraded, continuing: {}", sample_fault);
                continue;
            }
        };

        match monitor.observe(Utc::now(), &observation) {
            EvacuationVerdict::Continue {
                vms_remaining,
                vms_evacuated,
                progress_pct,
                active_migrations,
                elapsed_seconds,
                timeout_extended,
            } => {
                if timeout_extended {
                    info!(
                        "⏳ [MAINTENANCE]: Timeout extended, {} VMs still migrating.",
                        vms_remaining
                    );
                }
                context
                    .update_progress(json!({
                        "current_step": format!(
                            "Evacuating {} ({} VMs remaining, {} migrations active)",
                            host_name, vms_remaining, active_migrations
                        ),
                        "vms_before": vms_before,
                        "vms_remaining": vms_remaining,
                        "vms_evacuated": vms_evacuated,
                        "progress_pct": progress_pct,
                        "active_migrations": active_migrations,
                        "elapsed_seconds": elapsed_seconds,
                    }))
                    .await;
            }
            EvacuationVerdict::Success {
                vms_evacuated,
                time_taken_seconds,
            } => {
                info!(
                    "✅ [MAINTENANCE]: Maintenance mode active on {} ({} VMs evacuated in {}s).",
                    host_name, vms_evacuated, time_taken_seconds
                );
                let _ = state
                    .vcenter_rows
                    .patch_host(
                        &host_id,
                        &json!({ "maintenance_mode": true, "updated_at": Utc::now().to_rfc3339() }),
                    )
                    .await;

                context
                    .finish(
                        JobStatus::Completed,
                        json!({
                            "success": true,
                            "in_maintenance": true,
                            "vms_evacuated": vms_evacuated,
                            "time_taken_seconds": time_taken_seconds,
                        }),
                    )
                    .await;
                return Ok(());
            }
            EvacuationVerdict::Stalled {
                vms_remaining,
                vms_evacuated,
                stall_duration_seconds,
                total_elapsed_seconds,
            } => {
                let error_message = format!(
                    "VM evacuation stalled: No progress for {}s with {} VMs remaining and no active migrations",
                    stall_duration_seconds, vms_remaining
                );
                error!("❌ [MAINTENANCE]: {}", error_message);

                let evacuation_blockers =
                    capture_evacuation_blockers(state, &session, &host_moid).await;

                context
                    .finish(
                        JobStatus::Failed,
                        json!({
                            "success": false,
                            "error": error_message,
                            "evacuation_blockers": evacuation_blockers,
                            "vms_evacuated": vms_evacuated,
                            "vms_remaining": vms_remaining,
                            "stall_duration_seconds": stall_duration_seconds,
                            "total_elapsed_seconds": total_elapsed_seconds,
                        }),
                    )
                    .await;
                return Ok(());
            }
            EvacuationVerdict::TimedOut {
                vms_remaining,
                vms_evacuated,
                total_elapsed_seconds,
            } => {
                let error_message =
                    format!("Maintenance mode timeout after {}s", total_elapsed_seconds);
                error!("❌ [MAINTENANCE]: {}", error_message);

                let evacuation_blockers =
                    capture_evacuation_blockers(state, &session, &host_moid).await;

                context
                    .finish(
                        JobStatus::Failed,
                        json!({
                            "success": false,
                            "error": error_message,
                            "evacuation_blockers": evacuation_blockers,
                            "vms_evacuated": vms_evacuated,
                            "vms_remaining": vms_remaining,
                            "total_elapsed_seconds": total_elapsed_seconds,
                        }),
                    )
                    .await;
                return Ok(());
            }
        }
    }
}

/// Handler del trabajo 'exit_maintenance': espera simple de tarea con
/// la misma política de reintento de sesión.
pub async fn execute_exit_maintenance(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();
    let Some(host_id) = scope.host_id else {
        context.finish_failed("host_id is required").await;
        return Ok(());
    };

    let (host, settings) = match resolve_host_and_settings(state, &host_id).await {
        Ok(pair) => pair,
        Err(resolve_fault) => {
            context.finish_failed(resolve_fault).await;
            return Ok(());
        }
    };

    let host_moid = host.vcenter_id.clone();
    let mut retries = 0u32;

    loop {
        let session = match state.vcenter_sessions.ensure_session(&settings).await {
            Ok(session) => session,
            Err(connect_fault) => {
                context
                    .finish_failed(format!("Failed to connect to vCenter: {}", connect_fault))
                    .await;
                return Ok(());
            }
        };

        let attempt = async {
            let task_id = state.vcenter_ops.exit_maintenance(&session, &host_moid).await?;
            if !task_id.is_empty() {
                state
                    .vcenter_ops
                    .wait_for_task(
                        &session,
                        &task_id,
                        Duration::from_secs(300),
                        Duration::from_secs(2),
                    )
                    .await?;
            }
            Ok::<(), VcError>(())
        }
        .await;

        match attempt {
            Ok(()) => {
                let _ = state
                    .vcenter_rows
                    .patch_host(
                        &host_id,
                        &json!({ "maintenance_mode": false, "updated_at": Utc::now().to_rfc3339() }),
                    )
                    .await;

                context
                    .finish(
                        JobStatus::Completed,
                        json!({ "success": true, "in_maintenance": false }),
                    )
                    .await;
                return Ok(());
            }
            Err(exit_fault) if exit_fault.is_session_expired() && retries < MAX_SESSION_RETRIES => {
                retries += 1;
                warn!(
                    "♻️ [MAINTENANCE]: Session expired on exit, retry {}/{}.",
                    retries, MAX_SESSION_RETRIES
                );
                continue;
            }
            Err(exit_fault) => {
                context
                    .finish_failed(format!("Exit maintenance failed: {}", exit_fault))
                    .await;
                return Ok(());
            }
        }
    }
}
