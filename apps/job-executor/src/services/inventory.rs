// [apps/job-executor/src/services/inventory.rs]
/*!
 * =================================================================
 * APARATO: VCENTER SYNC & INVENTORY UPSERTER
 * CLASIFICACIÓN: EXECUTION LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: SINCRONIZACIÓN PERIÓDICA DEL INVENTARIO VCENTER
 *
 * # Logic:
 * Por cada vCenter: conectar (sesión cacheada), recolectar en pasada
 * única, upsert en lote por tipo con mapas pre-cargados para evitar
 * N+1 (lotes de VMs ≤ 50). Tras los hosts, auto-enlace bidireccional
 * host ↔ servidor por service_tag == serial_number. El trabajo se
 * auto-reprograma insertando una fila 'pending' con
 * 'schedule_at = ahora + intervalo' incluso si esta corrida falló.
 * =================================================================
 */

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use infrasync_domain_models::inventory::{
    host_status_from_connection_state, VcenterClusterRecord, VcenterDatastoreRecord,
    VcenterHostRecord, VcenterNetworkRecord, VcenterVmRecord,
};
use infrasync_domain_models::job::{JobStatus, JobType};
use infrasync_domain_models::task::TaskStatus;
use infrasync_infra_vcenter::collector::CollectedInventory;
use infrasync_infra_vcenter::InventoryCollector;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::services::job_context::JobContext;
use crate::state::AppState;

/// Tamaño máximo de lote para el upsert de VMs.
const VM_BATCH_SIZE: usize = 50;

/// Intervalo por defecto de auto-reprogramación.
const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 60;

/// Handler del trabajo 'vcenter_sync'.
pub async fn execute_vcenter_sync(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();

    let vcenters = match scope.vcenter_id.as_deref() {
        Some(vcenter_id) => state
            .settings
            .vcenter_by_id(vcenter_id)
            .await?
            .into_iter()
            .collect(),
        None => state.settings.all_vcenters().await.unwrap_or_default(),
    };

    if vcenters.is_empty() {
        reschedule_sync(state, &scope.vcenter_id, DEFAULT_SYNC_INTERVAL_MINUTES).await;
        context.finish_failed("no vcenters registered").await;
        return Ok(());
    }

    let total_vcenters = vcenters.len();
    let mut sync_errors: Vec<String> = Vec::new();
    let mut synced_vcenters = 0usize;
    let mut summaries: Vec<Value> = Vec::new();
    let mut min_interval = DEFAULT_SYNC_INTERVAL_MINUTES;

    for (vcenter_index, vcenter) in vcenters.iter().enumerate() {
        if context.is_cancelled().await {
            reschedule_sync(state, &scope.vcenter_id, min_interval).await;
            context.finish_cancelled().await;
            return Ok(());
        }

        min_interval = vcenter
            .sync_interval_minutes
            .unwrap_or(DEFAULT_SYNC_INTERVAL_MINUTES)
            .min(min_interval.max(1));

        let vcenter_name = vcenter
            .name
            .clone()
            .or_else(|| vcenter.host.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let source_vcenter_id = vcenter.id.clone().unwrap_or_default();

        context
            .update_progress(json!({
                "current_step": format!("Connecting to {}...", vcenter_name),
                "total_vcenters": total_vcenters,
                "current_vcenter_index": vcenter_index,
                "current_vcenter_name": vcenter_name,
                "sync_mode": "bulk_collector",
            }))
            .await;

        let connect_task = context.create_task(None).await;

        let session = match state.vcenter_sessions.connect(vcenter).await {
            Ok(session) => {
                if let Some(task_id) = &connect_task {
                    context
                        .update_task(
                            task_id,
                            TaskStatus::Completed,
                            Some(100),
                            Some(&format!("Connected to {}", vcenter_name)),
                        )
                        .await;
                }
                session
            }
            Err(connect_fault) => {
                let message = format!("{}: {}", vcenter_name, connect_fault);
                error!("❌ [VC_SYNC]: Connection failed: {}", message);
                sync_errors.push(message);
                if let Some(task_id) = &connect_task {
                    context
                        .update_task(task_id, TaskStatus::Failed, None, Some(&connect_fault.to_string()))
                        .await;
                }
                continue;
            }
        };

        let inventory_task = context.create_task(None).await;
        if let Some(task_id) = &inventory_task {
            context
                .update_task(
                    task_id,
                    TaskStatus::Running,
                    Some(0),
                    Some("Fetching inventory in bulk..."),
                )
                .await;
        }

        let collector =
            InventoryCollector::new(&state.vcenter_sessions, state.config.deep_relationships);
        let inventory = match collector.collect(&session).await {
            Ok(inventory) => inventory,
            Err(collect_fault) => {
                let message = format!("{}: {}", vcenter_name, collect_fault);
                error!("❌ [VC_SYNC]: Inventory fetch failed: {}", message);
                sync_errors.push(message);
                if let Some(task_id) = &inventory_task {
                    context
                        .update_task(task_id, TaskStatus::Failed, None, Some(&collect_fault.to_string()))
                        .await;
                }
                continue;
            }
        };

        for collector_error in &inventory.errors {
            sync_errors.push(format!("{}: {}", vcenter_name, collector_error));
        }

        if let Some(task_id) = &inventory_task {
            context
                .update_task(
                    task_id,
                    TaskStatus::Running,
                    Some(50),
                    Some(&format!(
                        "Upserting {} objects to database...",
                        inventory.total_objects()
                    )),
                )
                .await;
        }

        if context.is_cancelled().await {
            reschedule_sync(state, &scope.vcenter_id, min_interval).await;
            context.finish_cancelled().await;
            return Ok(());
        }

        let upsert_summary =
            upsert_inventory(state, &inventory, &source_vcenter_id, &vcenter_name).await;

        // Detección de datastores desaparecidos entre sincronizaciones.
        let disappearance = detect_datastore_changes(state, &source_vcenter_id, &inventory).await;
        for critical in disappearance.iter().filter(|entry| {
            entry.get("critical").and_then(Value::as_bool).unwrap_or(false)
        }) {
            let alert = format!(
                "CRITICAL: Replication datastore '{}' disappeared from vCenter {}",
                critical.get("name").and_then(Value::as_str).unwrap_or("?"),
                vcenter_name
            );
            error!("🚨 [VC_SYNC]: {}", alert);
            sync_errors.push(alert);
        }

        if let Some(task_id) = &inventory_task {
            context
                .update_task(
                    task_id,
                    TaskStatus::Completed,
                    Some(100),
                    Some(&format!(
                        "Synced {} objects (fetch: {} ms)",
                        inventory.total_objects(),
                        inventory.fetch_time_ms
                    )),
                )
                .await;
        }

        synced_vcenters += 1;
        summaries.push(json!({
            "vcenter_name": vcenter_name,
            "results": upsert_summary,
            "datastore_changes": disappearance,
            "fetch_time_ms": inventory.fetch_time_ms,
        }));

        context
            .update_progress(json!({
                "current_step": format!("Completed {}", vcenter_name),
                "synced_vcenters": synced_vcenters,
                "sync_errors": sync_errors.clone(),
            }))
            .await;
    }

    // Auto-reprogramación: SIEMPRE, incluso en fallo.
    reschedule_sync(state, &scope.vcenter_id, min_interval).await;

    let status = if synced_vcenters == 0 {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    };
    context
        .finish(
            status,
            json!({
                "synced_vcenters": synced_vcenters,
                "total_vcenters": total_vcenters,
                "sync_errors": sync_errors,
                "summaries": summaries,
            }),
        )
        .await;

    Ok(())
}

/// Inserta la siguiente corrida 'pending' con 'schedule_at' futuro.
async fn reschedule_sync(state: &AppState, vcenter_id: &Option<String>, interval_minutes: u64) {
    let mut target_scope = json!({});
    if let Some(vcenter_id) = vcenter_id {
        target_scope["vcenter_id"] = json!(vcenter_id);
    }

    let schedule_at = Utc::now() + ChronoDuration::minutes(interval_minutes as i64);
    match state
        .jobs
        .insert(
            JobType::VcenterSync,
            &target_scope,
            &json!({ "self_scheduled": true }),
            Some(schedule_at),
            None,
        )
        .await
    {
        Ok(_) => info!(
            "🔁 [VC_SYNC]: Next sync self-scheduled at {}.",
            schedule_at.to_rfc3339()
        ),
        Err(schedule_fault) => {
            warn!("⚠️ [VC_SYNC]: Self-reschedule failed: {}", schedule_fault)
        }
    }
}

/// Upsert en lote del inventario recolectado. Mapas pre-cargados,
/// un lote por tipo, VMs en lotes de ≤ 50.
pub async fn upsert_inventory(
    state: &AppState,
    inventory: &CollectedInventory,
    source_vcenter_id: &str,
    vcenter_name: &str,
) -> Value {
    let now = Utc::now().to_rfc3339();
    let mut summary = json!({
        "clusters": {"synced": 0, "total": inventory.clusters.len()},
        "hosts": {"synced": 0, "total": inventory.hosts.len(), "auto_linked": 0},
        "vms": {"synced": 0, "total": inventory.vms.len()},
        "datastores": {"synced": 0, "total": inventory.datastores.len()},
        "networks": {"synced": 0, "total": inventory.networks.len() + inventory.dvpgs.len()},
        "errors": [],
    });

    let push_error = |summary: &mut Value, message: String| {
        warn!("⚠️ [VC_UPSERT]: {}", message);
        if let Some(errors) = summary["errors"].as_array_mut() {
            errors.push(json!(message));
        }
    };

    // 1. Clusters.
    let cluster_rows: Vec<VcenterClusterRecord> = inventory
        .clusters
        .iter()
        .map(|cluster| VcenterClusterRecord {
            id: None,
            name: cluster.name.clone(),
            vcenter_id: cluster.moid.clone(),
            source_vcenter_id: source_vcenter_id.to_string(),
            host_count: Some(cluster.host_count),
            drs_enabled: cluster.drs_enabled,
            ha_enabled: cluster.ha_enabled,
            last_sync: Some(now.clone()),
        })
        .collect();
    match state.vcenter_rows.upsert_clusters(&cluster_rows).await {
        Ok(synced) => summary["clusters"]["synced"] = json!(synced),
        Err(upsert_fault) => push_error(
            &mut summary,
            format!("[{}] cluster upsert: {}", vcenter_name, upsert_fault),
        ),
    }

    // 2. Hosts con auto-enlace. Pre-carga del mapa de servidores sin
    //    enlazar para evitar el N+1 por fila.
    let server_by_service_tag: HashMap<String, String> = state
        .servers
        .unlinked_with_service_tag()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter_map(|server| server.service_tag.clone().map(|tag| (tag, server.id)))
        .collect();

    let host_rows: Vec<VcenterHostRecord> = inventory
        .hosts
        .iter()
        .map(|host| VcenterHostRecord {
            id: None,
            name: host.name.clone(),
            vcenter_id: host.moid.clone(),
            source_vcenter_id: source_vcenter_id.to_string(),
            cluster: host.cluster_name.clone(),
            serial_number: host.serial_number.clone(),
            status: Some(host_status_from_connection_state(&host.connection_state).to_string()),
            maintenance_mode: None,
            server_id: None,
            last_sync: Some(now.clone()),
        })
        .collect();

    match state.vcenter_rows.upsert_hosts_returning(&host_rows).await {
        Ok(upserted_hosts) => {
            summary["hosts"]["synced"] = json!(upserted_hosts.len());

            let mut auto_linked = 0usize;
            for host in &upserted_hosts {
                let (Some(host_id), Some(serial)) = (host.id.as_deref(), host.serial_number.as_deref())
                else {
                    continue;
                };
                if let Some(server_id) = server_by_service_tag.get(serial) {
                    match state.vcenter_rows.link_host_to_server(host_id, server_id).await {
                        Ok(()) => {
                            auto_linked += 1;
                            info!(
                                "🔗 [VC_UPSERT]: Auto-linked {} to host {}.",
                                serial, host.name
                            );
                        }
                        Err(link_fault) => push_error(
                            &mut summary,
                            format!("[{}] auto-link {}: {}", vcenter_name, serial, link_fault),
                        ),
                    }
                }
            }
            summary["hosts"]["auto_linked"] = json!(auto_linked);
        }
        Err(upsert_fault) => push_error(
            &mut summary,
            format!("[{}] host upsert: {}", vcenter_name, upsert_fault),
        ),
    }

    // 3. Datastores.
    let datastore_rows: Vec<VcenterDatastoreRecord> = inventory
        .datastores
        .iter()
        .map(|datastore| VcenterDatastoreRecord {
            id: None,
            name: datastore.name.clone(),
            vcenter_id: datastore.moid.clone(),
            source_vcenter_id: source_vcenter_id.to_string(),
            datastore_type: datastore.datastore_type.clone(),
            capacity_bytes: datastore.capacity_bytes,
            free_bytes: datastore.free_bytes,
            accessible: Some(datastore.accessible),
            last_sync: Some(now.clone()),
        })
        .collect();
    match state.vcenter_rows.upsert_datastores(&datastore_rows).await {
        Ok(synced) => summary["datastores"]["synced"] = json!(synced),
        Err(upsert_fault) => push_error(
            &mut summary,
            format!("[{}] datastore upsert: {}", vcenter_name, upsert_fault),
        ),
    }

    // 4. Redes (estándar + portgroups distribuidos, un solo lote).
    let network_rows: Vec<VcenterNetworkRecord> = inventory
        .networks
        .iter()
        .chain(inventory.dvpgs.iter())
        .map(|network| VcenterNetworkRecord {
            id: None,
            name: network.name.clone(),
            vcenter_id: network.moid.clone(),
            source_vcenter_id: source_vcenter_id.to_string(),
            network_type: Some(network.network_type.clone()),
            vlan_id: network.vlan_id,
            vlan_type: network.vlan_type.clone(),
            vlan_range: network.vlan_range.clone(),
            parent_switch_name: network.parent_switch_name.clone(),
            parent_switch_id: network.parent_switch_id.clone(),
            uplink_port_group: Some(network.uplink_port_group),
            accessible: Some(network.accessible),
            host_count: Some(network.host_count),
            vm_count: Some(network.vm_count),
            last_sync: Some(now.clone()),
        })
        .collect();

    if network_rows.is_empty() && !inventory.hosts.is_empty() {
        push_error(
            &mut summary,
            format!(
                "[{}] zero networks returned with {} hosts",
                vcenter_name,
                inventory.hosts.len()
            ),
        );
    } else {
        match state.vcenter_rows.upsert_networks(&network_rows).await {
            Ok(synced) => summary["networks"]["synced"] = json!(synced),
            Err(upsert_fault) => push_error(
                &mut summary,
                format!("[{}] network upsert: {}", vcenter_name, upsert_fault),
            ),
        }
    }

    // 5. VMs en lotes de ≤ 50.
    let vm_rows: Vec<VcenterVmRecord> = inventory
        .vms
        .iter()
        .map(|vm| VcenterVmRecord {
            id: None,
            name: vm.name.clone(),
            vcenter_id: vm.moid.clone(),
            source_vcenter_id: source_vcenter_id.to_string(),
            power_state: Some(vm.power_state.clone()),
            guest_os: vm.guest_os.clone(),
            ip_address: vm.ip_address.clone(),
            host_name: vm.host_name.clone(),
            cluster_name: vm.cluster_name.clone(),
            datastores: Some(vm.datastores.clone()),
            cpu_count: vm.cpu_count,
            memory_mb: vm.memory_mb,
            last_sync: Some(now.clone()),
        })
        .collect();

    let mut vms_synced = 0usize;
    for batch in vm_rows.chunks(VM_BATCH_SIZE) {
        match state.vcenter_rows.upsert_vms(batch).await {
            Ok(synced) => vms_synced += synced,
            Err(upsert_fault) => push_error(
                &mut summary,
                format!("[{}] vm batch upsert: {}", vcenter_name, upsert_fault),
            ),
        }
    }
    summary["vms"]["synced"] = json!(vms_synced);

    info!(
        "📊 [VC_UPSERT]: [{}] {} clusters, {} hosts, {} datastores, {} networks, {} VMs.",
        vcenter_name,
        summary["clusters"]["synced"],
        summary["hosts"]["synced"],
        summary["datastores"]["synced"],
        summary["networks"]["synced"],
        vms_synced
    );

    summary
}

/// Datastores presentes en la base pero ausentes del inventario
/// recién recolectado. Los referenciados por un target de replicación
/// se marcan como críticos.
async fn detect_datastore_changes(
    state: &AppState,
    source_vcenter_id: &str,
    inventory: &CollectedInventory,
) -> Vec<Value> {
    let known_rows = state
        .vcenter_rows
        .datastores_for(source_vcenter_id)
        .await
        .unwrap_or_default();

    let collected_names: Vec<&str> = inventory
        .datastores
        .iter()
        .map(|datastore| datastore.name.as_str())
        .collect();

    let replication_datastores: Vec<String> = state
        .replication_rows
        .targets()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter_map(|target| target.datastore_name)
        .collect();

    known_rows
        .into_iter()
        .filter(|row| !collected_names.contains(&row.name.as_str()))
        .map(|row| {
            let critical = replication_datastores.contains(&row.name);
            json!({
                "name": row.name,
                "id": row.id,
                "critical": critical,
            })
        })
        .collect()
}
