// [apps/job-executor/src/services/replication.rs]
/*!
 * =================================================================
 * APARATO: REPLICATION DRIVER
 * CLASIFICACIÓN: EXECUTION LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: CORRIDAS DE REPLICACIÓN Y SHELL-VMS DE DR
 *
 * # Logic:
 * Por VM protegida: snapshot → estimación de tamaño → send/receive →
 * verificación en el target → contabilidad. La base incremental
 * preferente es el último snapshot usado; si falta en algún lado se
 * recupera con el snapshot común más reciente; sin snapshot común, el
 * target se re-siembra (borrado de snapshots huérfanos) y se envía
 * completo. Trabajo de orquestación: cualquier VM fallida marca el
 * trabajo como fallido.
 * =================================================================
 */

use std::sync::Arc;

use chrono::Utc;
use infrasync_domain_models::credential::SshCredentials;
use infrasync_domain_models::job::JobStatus;
use infrasync_domain_models::replication::{ProtectionGroupRecord, ReplicationTargetRecord};
use infrasync_domain_models::task::TaskStatus;
use infrasync_domain_replication::{generate_snapshot_name, select_incremental_base};
use infrasync_infra_zfs::ZfsEndpoint;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::services::job_context::JobContext;
use crate::state::AppState;

/// Prefijo por convención de los snapshots de replicación.
const SNAPSHOT_PREFIX: &str = "zerfaux";

/// Prefijos por defecto de los datasets.
const DEFAULT_SOURCE_PREFIX: &str = "vmfs";
const DEFAULT_TARGET_PREFIX: &str = "dr-pool";

/// Resultado por VM de una corrida de grupo.
#[derive(Debug, Clone)]
pub struct VmReplicationResult {
    pub protected_vm_id: String,
    pub vm_name: String,
    pub success: bool,
    pub detail: Value,
}

/// Resuelve los endpoints de origen y destino de un grupo.
async fn resolve_endpoints(
    state: &AppState,
    group: &ProtectionGroupRecord,
    target: &ReplicationTargetRecord,
) -> Result<(ZfsEndpoint, SshCredentials), String> {
    let target_credentials = state
        .ssh_credentials
        .credentials_for_target(target, None)
        .await
        .ok_or_else(|| {
            format!(
                "no SSH credentials for replication target {:?}",
                target.name
            )
        })?;

    let source_endpoint = match group.source_target_id.as_deref() {
        None => ZfsEndpoint::Local,
        Some(source_target_id) => {
            let source_target = state
                .replication_rows
                .target_by_id(source_target_id)
                .await
                .map_err(|fetch_fault| fetch_fault.to_string())?
                .ok_or_else(|| format!("source target {} not found", source_target_id))?;
            let source_credentials = state
                .ssh_credentials
                .credentials_for_target(&source_target, None)
                .await
                .ok_or_else(|| {
                    format!("no SSH credentials for source target {}", source_target_id)
                })?;
            ZfsEndpoint::Remote(source_credentials)
        }
    };

    Ok((source_endpoint, target_credentials))
}

/// Replica una VM protegida. Núcleo compartido entre el trabajo de
/// cola y el endpoint run-now del API.
async fn replicate_protected_vm(
    state: &AppState,
    group: &ProtectionGroupRecord,
    source_endpoint: &ZfsEndpoint,
    target_credentials: &SshCredentials,
    target: &ReplicationTargetRecord,
    protected_vm_id: &str,
) -> VmReplicationResult {
    let vm_row = match state.replication_rows.protected_vm_by_id(protected_vm_id).await {
        Ok(Some(row)) => row,
        _ => {
            return VmReplicationResult {
                protected_vm_id: protected_vm_id.to_string(),
                vm_name: "unknown".to_string(),
                success: false,
                detail: json!({ "error": "protected VM not found" }),
            }
        }
    };

    let vm_name = vm_row.vm_name.clone().unwrap_or_else(|| "unknown".to_string());
    let source_prefix = group
        .source_dataset_prefix
        .clone()
        .unwrap_or_else(|| DEFAULT_SOURCE_PREFIX.to_string());
    let target_prefix = target
        .zfs_pool
        .clone()
        .unwrap_or_else(|| DEFAULT_TARGET_PREFIX.to_string());

    let source_dataset = format!("{}/{}", source_prefix, vm_name);
    let target_dataset = format!("{}/{}", target_prefix, vm_name);
    let target_endpoint = ZfsEndpoint::Remote(target_credentials.clone());

    let run = async {
        // 1. Snapshot nuevo en el origen.
        let snapshot_name = generate_snapshot_name(SNAPSHOT_PREFIX, Utc::now());
        state
            .zfs
            .create_snapshot(source_endpoint, &source_dataset, &snapshot_name)
            .await
            .map_err(|snapshot_fault| format!("snapshot failed: {}", snapshot_fault))?;

        // 2. Base incremental: preferida → común → re-siembra.
        let source_names: Vec<String> = state
            .zfs
            .list_snapshots(source_endpoint, &source_dataset)
            .await
            .map_err(|list_fault| list_fault.to_string())?
            .into_iter()
            .map(|snapshot| snapshot.name)
            .collect();
        let target_names: Vec<String> = state
            .zfs
            .list_snapshots(&target_endpoint, &target_dataset)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|snapshot| snapshot.name)
            .collect();

        let mut incremental_base = select_incremental_base(
            vm_row.last_snapshot.as_deref(),
            &source_names,
            &target_names,
        );

        if let (Some(base), Some(last)) = (incremental_base.as_deref(), vm_row.last_snapshot.as_deref())
        {
            if base != last {
                info!(
                    "🔗 [REPLICATION]: {} recovering via common snapshot @{} (last used @{} missing).",
                    vm_name, base, last
                );
            }
        }

        if incremental_base.is_none() && !target_names.is_empty() {
            // Sin snapshot común: los snapshots huérfanos del target
            // impiden recibir un stream completo.
            warn!(
                "🧹 [REPLICATION]: {} has no common snapshot; reseeding target dataset.",
                vm_name
            );
            let (deleted, delete_errors) = state
                .zfs
                .delete_all_snapshots(&target_endpoint, &target_dataset)
                .await
                .map_err(|delete_fault| delete_fault.to_string())?;
            info!(
                "🧹 [REPLICATION]: Reseed deleted {} snapshots ({} errors).",
                deleted,
                delete_errors.len()
            );
            incremental_base = None;
        }

        // 3. Estimación de tamaño (consultiva; 0 si no se pudo).
        let expected_bytes = state
            .zfs
            .send_size(
                source_endpoint,
                &source_dataset,
                &snapshot_name,
                incremental_base.as_deref(),
            )
            .await
            .map(|estimate| estimate.bytes)
            .unwrap_or(0);

        // 4. Tubería send/receive.
        let outcome = state
            .zfs
            .replicate(
                source_endpoint,
                &source_dataset,
                &snapshot_name,
                target_credentials,
                &target_dataset,
                incremental_base.as_deref(),
                expected_bytes,
            )
            .await
            .map_err(|transfer_fault| format!("replication failed: {}", transfer_fault))?;

        // 5. Verificación en el target.
        let verification = state
            .zfs
            .verify_on_target(
                target_credentials,
                &target_dataset,
                &snapshot_name,
                expected_bytes,
            )
            .await
            .map_err(|verify_fault| format!("verification failed: {}", verify_fault))?;

        if !verification.snapshot_exists {
            return Err(format!(
                "snapshot {} not present on target after transfer",
                snapshot_name
            ));
        }
        if !verification.size_match {
            warn!(
                "⚠️ [REPLICATION]: {} size mismatch (target {} vs expected {}).",
                vm_name, verification.target_bytes, verification.expected_bytes
            );
        }

        Ok::<(String, Value), String>((
            snapshot_name.clone(),
            json!({
                "success": true,
                "replication": outcome,
                "verification": verification,
                "expected_bytes": expected_bytes,
            }),
        ))
    }
    .await;

    match run {
        Ok((snapshot_name, detail)) => {
            let _ = state
                .replication_rows
                .update_protected_vm(
                    protected_vm_id,
                    &json!({
                        "last_snapshot": snapshot_name,
                        "last_replication_at": Utc::now().to_rfc3339(),
                        "replication_status": "active",
                        "status_message": detail
                            .pointer("/replication/message")
                            .cloned()
                            .unwrap_or(Value::Null),
                    }),
                )
                .await;

            VmReplicationResult {
                protected_vm_id: protected_vm_id.to_string(),
                vm_name,
                success: true,
                detail,
            }
        }
        Err(failure) => {
            error!("❌ [REPLICATION]: {} failed: {}", vm_name, failure);
            let _ = state
                .replication_rows
                .update_protected_vm(
                    protected_vm_id,
                    &json!({
                        "replication_status": "error",
                        "status_message": failure,
                    }),
                )
                .await;

            VmReplicationResult {
                protected_vm_id: protected_vm_id.to_string(),
                vm_name,
                success: false,
                detail: json!({ "success": false, "error": failure }),
            }
        }
    }
}

/// Corre la replicación de un grupo completo; registra una fila de
/// bitácora por VM. Compartido por el trabajo de cola y el API.
pub async fn run_group_replication(
    state: &AppState,
    group_id: &str,
    trigger: &str,
    progress: Option<&Arc<JobContext>>,
) -> Result<Vec<VmReplicationResult>, String> {
    let group = state
        .replication_rows
        .group_by_id(group_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "Protection group not found".to_string())?;

    let target_id = group
        .target_id
        .clone()
        .ok_or_else(|| "protection group has no replication target".to_string())?;
    let target = state
        .replication_rows
        .target_by_id(&target_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| format!("replication target {} not found", target_id))?;

    let (source_endpoint, target_credentials) = resolve_endpoints(state, &group, &target).await?;

    let protected_vms = state
        .replication_rows
        .protected_vms_for_group(group_id, true)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?;

    let total = protected_vms.len();
    let mut results = Vec::with_capacity(total);

    for (index, vm_row) in protected_vms.iter().enumerate() {
        if let Some(context) = progress {
            if context.is_cancelled().await {
                break;
            }
            context
                .update_progress(json!({
                    "current_step": format!(
                        "Replicating {} ({}/{})",
                        vm_row.vm_name.clone().unwrap_or_default(),
                        index + 1,
                        total
                    ),
                    "current_index": index,
                    "total": total,
                }))
                .await;
        }

        let Some(vm_id) = vm_row.id.as_deref() else { continue };
        let result = replicate_protected_vm(
            state,
            &group,
            &source_endpoint,
            &target_credentials,
            &target,
            vm_id,
        )
        .await;

        let _ = state
            .replication_rows
            .insert_replication_job(&json!({
                "protection_group_id": group_id,
                "protected_vm_id": vm_id,
                "job_type": trigger,
                "status": if result.success { "completed" } else { "failed" },
                "started_at": result.detail.pointer("/replication/started_at"),
                "completed_at": result.detail.pointer("/replication/completed_at"),
                "bytes_transferred": result
                    .detail
                    .pointer("/replication/bytes_transferred")
                    .cloned()
                    .unwrap_or(json!(0)),
                "source_snapshot": result.detail.pointer("/replication/source_snapshot"),
                "details": result.detail.clone(),
            }))
            .await;

        results.push(result);
    }

    let _ = state.replication_rows.touch_group_replication(group_id).await;
    Ok(results)
}

/// Handler del trabajo 'replication_run'.
pub async fn execute_replication_run(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();
    let Some(group_id) = scope.protection_group_id else {
        context.finish_failed("protection_group_id is required").await;
        return Ok(());
    };

    match run_group_replication(state, &group_id, "scheduled", Some(context)).await {
        Err(setup_fault) => {
            context.finish_failed(setup_fault).await;
        }
        Ok(results) => {
            if context.is_cancelled().await {
                context.finish_cancelled().await;
                return Ok(());
            }

            let failed: Vec<&VmReplicationResult> =
                results.iter().filter(|result| !result.success).collect();
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

            // Trabajo de orquestación: cualquier fallo terminal marca
            // el trabajo como fallido.
            let status = if failed.is_empty() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            context
                .finish(
                    status,
                    json!({
                        "replicated": results.iter().filter(|result| result.success).count(),
                        "failed_count": failed.len(),
                        "total": results.len(),
                        "results": summary,
                    }),
                )
                .await;
        }
    }

    Ok(())
}

/// Plan de protección: qué falta para proteger la VM (datastore actual
/// contra datastore del target, Storage vMotion necesario, tamaño).
pub async fn protection_plan(state: &AppState, protected_vm_id: &str) -> Result<Value, String> {
    let vm_row = state
        .replication_rows
        .protected_vm_by_id(protected_vm_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "Protected VM not found".to_string())?;

    let group_id = vm_row
        .protection_group_id
        .clone()
        .ok_or_else(|| "protected VM has no group".to_string())?;
    let group = state
        .replication_rows
        .group_by_id(&group_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "protection group not found".to_string())?;

    let target = match group.target_id.as_deref() {
        Some(target_id) => state
            .replication_rows
            .target_by_id(target_id)
            .await
            .map_err(|fetch_fault| fetch_fault.to_string())?,
        None => None,
    };

    let required_datastore = target.as_ref().and_then(|target| target.datastore_name.clone());
    let current_datastore = vm_row.current_datastore.clone();
    let needs_storage_vmotion = match (&current_datastore, &required_datastore) {
        (Some(current), Some(required)) => current != required,
        _ => required_datastore.is_some(),
    };

    // Tamaño estimado desde el inventario de la VM.
    let estimated_bytes = match vm_row.vcenter_vm_id.as_deref() {
        Some(vm_id) => state
            .vcenter_rows
            .vm_by_id(vm_id)
            .await
            .ok()
            .flatten()
            .and_then(|vm| vm.memory_mb)
            .map(|memory_mb| memory_mb * 1024 * 1024)
            .unwrap_or(0),
        None => 0,
    };

    Ok(json!({
        "success": true,
        "protected_vm_id": protected_vm_id,
        "vm_name": vm_row.vm_name,
        "current_datastore": current_datastore,
        "required_datastore": required_datastore,
        "needs_storage_vmotion": needs_storage_vmotion,
        "estimated_bytes": estimated_bytes,
        "dr_shell_created": vm_row.dr_shell_created.unwrap_or(false),
    }))
}

/// Plan de shell de DR: descubre los VMDK replicados en el datastore
/// del sitio B.
pub async fn dr_shell_plan(state: &AppState, protected_vm_id: &str) -> Result<Value, String> {
    let vm_row = state
        .replication_rows
        .protected_vm_by_id(protected_vm_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "Protected VM not found".to_string())?;
    let vm_name = vm_row.vm_name.clone().unwrap_or_default();

    let group_id = vm_row
        .protection_group_id
        .clone()
        .ok_or_else(|| "protected VM has no group".to_string())?;
    let group = state
        .replication_rows
        .group_by_id(&group_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "protection group not found".to_string())?;
    let target = state
        .replication_rows
        .target_by_id(&group.target_id.clone().unwrap_or_default())
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "replication target not found".to_string())?;

    let dr_vcenter_id = target
        .dr_vcenter_id
        .clone()
        .ok_or_else(|| "target has no DR vCenter".to_string())?;
    let datastore_name = target
        .datastore_name
        .clone()
        .ok_or_else(|| "target has no datastore".to_string())?;

    let settings = state
        .settings
        .vcenter_by_id(&dr_vcenter_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "DR vCenter settings not found".to_string())?;
    let session = state
        .vcenter_sessions
        .connect(&settings)
        .await
        .map_err(|connect_fault| connect_fault.to_string())?;

    let folder_listing = state
        .vcenter_ops
        .browse_datastore(&session, &datastore_name, &format!("/{}", vm_name))
        .await
        .map_err(|browse_fault| browse_fault.to_string())?;

    let vmdks: Vec<Value> = folder_listing
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| {
                    entry
                        .get("name")
                        .and_then(Value::as_str)
                        .map(|name| name.ends_with(".vmdk") && !name.ends_with("-flat.vmdk"))
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let ready_for_shell = !vmdks.is_empty();
    Ok(json!({
        "success": true,
        "protected_vm_id": protected_vm_id,
        "vm_name": vm_name,
        "datastore": datastore_name,
        "dr_vcenter_id": dr_vcenter_id,
        "replicated_vmdks": vmdks,
        "ready_for_shell": ready_for_shell,
    }))
}

/// Materializa la shell-VM de DR adjuntando los VMDK existentes.
///
/// Antes de crear: una shell encendida con el nombre objetivo aborta;
/// las VMs apagadas que retienen locks del folder se des-registran;
/// una copia de origen encendida genera advertencia y se continúa.
pub async fn create_dr_shell(state: &AppState, protected_vm_id: &str) -> Result<Value, String> {
    let plan = dr_shell_plan(state, protected_vm_id).await?;
    let vm_name = plan["vm_name"].as_str().unwrap_or_default().to_string();
    let shell_name = format!("{}-drshell", vm_name);
    let datastore_name = plan["datastore"].as_str().unwrap_or_default().to_string();
    let dr_vcenter_id = plan["dr_vcenter_id"].as_str().unwrap_or_default().to_string();

    let vmdks = plan["replicated_vmdks"].as_array().cloned().unwrap_or_default();
    if vmdks.is_empty() {
        return Err("no replicated VMDKs found on the target datastore".to_string());
    }

    let settings = state
        .settings
        .vcenter_by_id(&dr_vcenter_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "DR vCenter settings not found".to_string())?;
    let session = state
        .vcenter_sessions
        .connect(&settings)
        .await
        .map_err(|connect_fault| connect_fault.to_string())?;

    let mut warnings: Vec<String> = Vec::new();

    // Conflictos de registro sobre el folder replicado.
    let registered = state
        .vcenter_rows
        .vms_for_vcenter(&dr_vcenter_id)
        .await
        .unwrap_or_default();

    for existing in registered
        .iter()
        .filter(|vm| vm.name == shell_name || vm.name == vm_name)
    {
        let powered_on = existing
            .power_state
            .as_deref()
            .map(|power_state| power_state.eq_ignore_ascii_case("POWERED_ON") || power_state == "poweredOn")
            .unwrap_or(false);

        if powered_on && existing.name == shell_name {
            return Err(format!(
                "a powered-on DR shell named '{}' already exists; aborting",
                shell_name
            ));
        }
        if powered_on {
            warnings.push(format!(
                "powered-on source copy '{}' present at DR site; continuing",
                existing.name
            ));
            continue;
        }

        info!(
            "🧹 [DR_SHELL]: Unregistering powered-off '{}' holding file locks.",
            existing.name
        );
        if let Err(unregister_fault) =
            state.vcenter_ops.unregister_vm(&session, &existing.vcenter_id).await
        {
            warnings.push(format!(
                "could not unregister '{}': {}",
                existing.name, unregister_fault
            ));
        }
    }

    // Especificación de la shell con discos existentes adjuntos por ruta.
    let disks: Vec<Value> = vmdks
        .iter()
        .filter_map(|entry| entry.get("name").and_then(Value::as_str))
        .map(|vmdk_name| {
            json!({
                "type": "SCSI",
                "backing": {
                    "type": "VMDK_FILE",
                    "vmdk_file": format!("[{}] {}/{}", datastore_name, vm_name, vmdk_name),
                }
            })
        })
        .collect();

    let disks_attached = disks.len();
    let spec = json!({
        "name": shell_name.clone(),
        "guest_OS": "OTHER_64",
        "placement": { "datastore": datastore_name },
        "disks": disks,
    });

    let shell_moid = state
        .vcenter_ops
        .create_vm(&session, &spec)
        .await
        .map_err(|create_fault| create_fault.to_string())?;

    let _ = state
        .replication_rows
        .update_protected_vm(protected_vm_id, &json!({ "dr_shell_created": true }))
        .await;

    info!("🏗️ [DR_SHELL]: Shell '{}' created ({}).", shell_name, shell_moid);

    Ok(json!({
        "success": true,
        "shell_name": shell_name,
        "shell_vm_id": shell_moid,
        "disks_attached": disks_attached,
        "warnings": warnings,
    }))
}

/// Storage vMotion hacia el datastore de protección.
pub async fn move_to_protection_datastore(
    state: &AppState,
    protected_vm_id: &str,
    datastore_moid: &str,
) -> Result<Value, String> {
    let vm_row = state
        .replication_rows
        .protected_vm_by_id(protected_vm_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "Protected VM not found".to_string())?;

    let vcenter_vm_id = vm_row
        .vcenter_vm_id
        .clone()
        .ok_or_else(|| "protected VM has no vCenter identity".to_string())?;

    let vm_inventory = state
        .vcenter_rows
        .vm_by_id(&vcenter_vm_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "VM not present in inventory".to_string())?;

    let settings = state
        .settings
        .vcenter_by_id(&vm_inventory.source_vcenter_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| "vCenter settings not found".to_string())?;
    let session = state
        .vcenter_sessions
        .connect(&settings)
        .await
        .map_err(|connect_fault| connect_fault.to_string())?;

    let task_id = state
        .vcenter_ops
        .relocate_vm(&session, &vm_inventory.vcenter_id, datastore_moid)
        .await
        .map_err(|relocate_fault| relocate_fault.to_string())?;

    if !task_id.is_empty() {
        state
            .vcenter_ops
            .wait_for_task(
                &session,
                &task_id,
                std::time::Duration::from_secs(3600),
                std::time::Duration::from_secs(5),
            )
            .await
            .map_err(|task_fault| task_fault.to_string())?;
    }

    let _ = state
        .replication_rows
        .update_protected_vm(
            protected_vm_id,
            &json!({ "current_datastore": datastore_moid }),
        )
        .await;

    Ok(json!({
        "success": true,
        "protected_vm_id": protected_vm_id,
        "moved_to": datastore_moid,
    }))
}
