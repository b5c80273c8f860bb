// [libs/infra/vcenter/src/ops.rs]
/*!
 * =================================================================
 * APARATO: VCENTER OPERATIONS
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: OPERACIONES DE HOST/CLUSTER/VM SOBRE LA SESIÓN
 *
 * # Logic:
 * Disciplina uniforme de tareas: disparar la acción del proveedor,
 * esperar el task con sondeo (el API de objetos gestionados es
 * inherentemente poll-based), dormir entre iteraciones. Los sitios de
 * llamada largos reintentan 'SessionExpired' hasta 2 veces vía el
 * gestor de sesiones.
 * =================================================================
 */

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use infrasync_domain_maintenance::monitor::{is_migration_task, MigrationActivity};
use infrasync_domain_maintenance::VmFacts;
use infrasync_domain_models::activity::{ActivityRecord, ActivitySink, OperationType};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::endpoints;
use crate::error::VcError;
use crate::session::{VcSession, VcSessionManager};

/// Estados terminales de una tarea del proveedor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Running,
    Succeeded,
    Failed,
}

/// Resumen mínimo de VM para el muestreo de evacuación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSummary {
    pub moid: String,
    pub name: String,
    pub power_state: String,
}

pub struct VcOps {
    manager: Arc<VcSessionManager>,
    activity: Arc<dyn ActivitySink>,
}

impl VcOps {
    pub fn new(manager: Arc<VcSessionManager>, activity: Arc<dyn ActivitySink>) -> Self {
        Self { manager, activity }
    }

    pub fn manager(&self) -> &Arc<VcSessionManager> {
        &self.manager
    }

    async fn log_operation(&self, operation: &str, endpoint: &str, success: bool, error: Option<String>) {
        let mut record =
            ActivityRecord::operation(operation, endpoint, OperationType::VcenterApi, success);
        if let Some(error) = error {
            record = record.with_error(error);
        }
        self.activity.record(record).await;
    }

    /// VMs encendidas actualmente sobre un host.
    pub async fn powered_on_vms_on_host(
        &self,
        session: &VcSession,
        host_moid: &str,
    ) -> Result<Vec<VmSummary>, VcError> {
        let path = format!(
            "{}?hosts={}&power_states=POWERED_ON",
            endpoints::VMS,
            host_moid
        );
        let body = self.manager.request(session, Method::GET, &path, None).await?;

        let vms = body
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| VmSummary {
                        moid: entry.get("vm").and_then(Value::as_str).unwrap_or("").to_string(),
                        name: entry.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                        power_state: entry
                            .get("power_state")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(vms)
    }

    /// Estado de runtime del host: conexión + bandera de mantenimiento.
    pub async fn host_runtime(
        &self,
        session: &VcSession,
        host_moid: &str,
    ) -> Result<Value, VcError> {
        let body = self
            .manager
            .request(session, Method::GET, &endpoints::host_detail(host_moid), None)
            .await?;

        Ok(json!({
            "connection_state": body.get("connection_state"),
            "in_maintenance": body
                .get("in_maintenance_mode")
                .or_else(|| body.get("maintenance_mode"))
                .cloned()
                .unwrap_or(json!(false)),
            "name": body.get("name"),
        }))
    }

    /// Tareas de migración activas que involucran VMs del host.
    ///
    /// Filtro: nombre contiene relocate|migrate|drs|vmotion, estado
    /// running|queued, y la entidad es una VM del host o una tarea cuyo
    /// host de runtime es este host.
    pub async fn active_migration_tasks(
        &self,
        session: &VcSession,
        host_moid: &str,
        host_vm_moids: &HashSet<String>,
    ) -> Result<Vec<MigrationActivity>, VcError> {
        let path = format!("{}?filter.status=RUNNING,QUEUED", endpoints::TASKS);
        let body = match self.manager.request(session, Method::GET, &path, None).await {
            Ok(body) => body,
            Err(VcError::SessionExpired(host)) => return Err(VcError::SessionExpired(host)),
            Err(sample_fault) => {
                // El muestreo de tareas es consultivo: sin él, el monitor
                // solo pierde la señal (b) y sigue operando.
                debug!("[VC_OPS]: Migration task sampling degraded: {}", sample_fault);
                return Ok(Vec::new());
            }
        };

        let entries: Vec<Value> = match body {
            Value::Array(entries) => entries,
            Value::Object(map) => map.into_iter().map(|(_, task)| task).collect(),
            _ => Vec::new(),
        };

        let mut migrations = Vec::new();
        for task in entries {
            let task_name = task
                .get("description_id")
                .or_else(|| task.get("operation"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_lowercase();
            let task_state = task
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_lowercase();

            if !is_migration_task(&task_name, &task_state) {
                continue;
            }

            let entity_moid = task
                .pointer("/target/id")
                .and_then(Value::as_str)
                .unwrap_or("");
            let entity_host = task
                .pointer("/target/host")
                .and_then(Value::as_str)
                .unwrap_or("");

            if host_vm_moids.contains(entity_moid) || entity_host == host_moid {
                migrations.push(MigrationActivity {
                    vm_name: task
                        .pointer("/target/name")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown VM")
                        .to_string(),
                    task_name,
                    state: task_state,
                    progress: task
                        .pointer("/progress/completed")
                        .and_then(Value::as_u64)
                        .map(|progress| progress.min(100) as u8),
                });
            }
        }

        Ok(migrations)
    }

    /// Dispara la entrada en mantenimiento; devuelve el id de tarea.
    pub async fn enter_maintenance(
        &self,
        session: &VcSession,
        host_moid: &str,
    ) -> Result<String, VcError> {
        let path = endpoints::host_maintenance_action(host_moid, "enter-maintenance");
        let outcome = self
            .manager
            .request(
                session,
                Method::POST,
                &path,
                Some(&json!({ "evacuate_powered_off_vms": false, "timeout": 0 })),
            )
            .await;

        match outcome {
            Ok(body) => {
                self.log_operation("enter_maintenance_mode", host_moid, true, None).await;
                Ok(body.as_str().unwrap_or_default().to_string())
            }
            Err(action_fault) => {
                self.log_operation(
                    "enter_maintenance_mode",
                    host_moid,
                    false,
                    Some(action_fault.to_string()),
                )
                .await;
                Err(action_fault)
            }
        }
    }

    /// Dispara la salida de mantenimiento; devuelve el id de tarea.
    pub async fn exit_maintenance(
        &self,
        session: &VcSession,
        host_moid: &str,
    ) -> Result<String, VcError> {
        let path = endpoints::host_maintenance_action(host_moid, "exit-maintenance");
        let outcome = self
            .manager
            .request(session, Method::POST, &path, Some(&json!({})))
            .await;

        match outcome {
            Ok(body) => {
                self.log_operation("exit_maintenance_mode", host_moid, true, None).await;
                Ok(body.as_str().unwrap_or_default().to_string())
            }
            Err(action_fault) => {
                self.log_operation(
                    "exit_maintenance_mode",
                    host_moid,
                    false,
                    Some(action_fault.to_string()),
                )
                .await;
                Err(action_fault)
            }
        }
    }

    /// Estado actual de una tarea del proveedor.
    pub async fn task_state(
        &self,
        session: &VcSession,
        task_id: &str,
    ) -> Result<(TaskState, Option<String>), VcError> {
        let body = self
            .manager
            .request(session, Method::GET, &endpoints::task_detail(task_id), None)
            .await?;

        let status = body.get("status").and_then(Value::as_str).unwrap_or("RUNNING");
        let state = match status {
            "SUCCEEDED" => TaskState::Succeeded,
            "FAILED" => TaskState::Failed,
            _ => TaskState::Running,
        };
        let error = body
            .pointer("/error/message")
            .or_else(|| body.get("error"))
            .map(|error| error.to_string());

        Ok((state, error))
    }

    /// Espera simple de tarea: sondeo con sueños cortos y chequeo de
    /// cancelación delegado al llamador entre iteraciones.
    pub async fn wait_for_task(
        &self,
        session: &VcSession,
        task_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), VcError> {
        let started = std::time::Instant::now();

        loop {
            match self.task_state(session, task_id).await? {
                (TaskState::Succeeded, _) => return Ok(()),
                (TaskState::Failed, error) => {
                    return Err(VcError::TaskFailed(
                        error.unwrap_or_else(|| "unknown task error".to_string()),
                    ))
                }
                (TaskState::Running, _) => {}
            }

            if started.elapsed() > timeout {
                return Err(VcError::TaskTimeout(timeout.as_secs()));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Hechos de una VM para la clasificación de bloqueadores.
    ///
    /// 'local_datastores' son los datastores visibles solo desde el
    /// host (almacenamiento local).
    pub async fn vm_facts(
        &self,
        session: &VcSession,
        vm_moid: &str,
        local_datastores: &HashSet<String>,
    ) -> Result<VmFacts, VcError> {
        let body = self
            .manager
            .request(session, Method::GET, &endpoints::vm_detail(vm_moid), None)
            .await?;

        let name = body.get("name").and_then(Value::as_str).unwrap_or("").to_string();
        let guest_os = body
            .get("guest_OS")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let powered_on = body
            .pointer("/power_state")
            .and_then(Value::as_str)
            .map(|state| state == "POWERED_ON")
            .unwrap_or(false);

        let uses_local_storage = body
            .pointer("/disks")
            .and_then(Value::as_object)
            .map(|disks| {
                disks.values().any(|disk| {
                    disk.pointer("/backing/datastore_name")
                        .or_else(|| disk.pointer("/backing/datastore"))
                        .and_then(Value::as_str)
                        .map(|datastore| local_datastores.contains(datastore))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        let has_passthrough = body
            .pointer("/pci_devices")
            .and_then(Value::as_object)
            .map(|devices| !devices.is_empty())
            .unwrap_or(false);

        let has_client_connected_media = body
            .pointer("/cdroms")
            .and_then(Value::as_object)
            .map(|cdroms| {
                cdroms.values().any(|cdrom| {
                    let client_backed = cdrom
                        .pointer("/backing/type")
                        .and_then(Value::as_str)
                        .map(|backing| backing == "CLIENT_DEVICE")
                        .unwrap_or(false);
                    let connected = cdrom
                        .pointer("/state")
                        .and_then(Value::as_str)
                        .map(|state| state == "CONNECTED")
                        .unwrap_or(false);
                    client_backed && connected
                })
            })
            .unwrap_or(false);

        let has_cpu_affinity = body
            .pointer("/hardware/cpu/affinity")
            .and_then(Value::as_array)
            .map(|affinity| !affinity.is_empty())
            .unwrap_or(false);

        Ok(VmFacts {
            name,
            guest_os,
            powered_on,
            uses_local_storage,
            has_passthrough,
            has_client_connected_media,
            has_cpu_affinity,
            anti_affinity_blocked: false,
            insufficient_headroom: false,
        })
    }

    /// Datastores locales de un host: visibles desde exactamente un host.
    pub async fn local_datastores_for_host(
        &self,
        session: &VcSession,
        host_moid: &str,
    ) -> Result<HashSet<String>, VcError> {
        let path = format!("{}?hosts={}", endpoints::DATASTORES, host_moid);
        let body = self.manager.request(session, Method::GET, &path, None).await?;

        let mut local = HashSet::new();
        if let Some(entries) = body.as_array() {
            for entry in entries {
                let is_vmfs = entry
                    .get("type")
                    .and_then(Value::as_str)
                    .map(|datastore_type| datastore_type == "VMFS")
                    .unwrap_or(false);
                let host_count = entry
                    .get("host_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(u64::MAX);
                if is_vmfs && host_count == 1 {
                    if let Some(name) = entry.get("name").and_then(Value::as_str) {
                        local.insert(name.to_string());
                    }
                }
            }
        }
        Ok(local)
    }

    /// Estados de Fault Tolerance de las VMs de un cluster.
    pub async fn cluster_ft_states(
        &self,
        session: &VcSession,
        cluster_moid: &str,
    ) -> Result<Vec<(String, String)>, VcError> {
        let path = format!("{}?clusters={}", endpoints::VMS, cluster_moid);
        let body = self.manager.request(session, Method::GET, &path, None).await?;

        let states = body
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| {
                        (
                            entry.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                            entry
                                .get("fault_tolerance_state")
                                .and_then(Value::as_str)
                                .unwrap_or("notConfigured")
                                .to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(states)
    }

    /// Reconfigura HA del cluster (disciplina reconfigure + wait-task).
    ///
    /// Deshabilitar HA se rechaza si alguna VM del cluster tiene Fault
    /// Tolerance en un estado distinto de notConfigured|disabled.
    pub async fn set_cluster_ha(
        &self,
        session: &VcSession,
        cluster_moid: &str,
        enabled: bool,
    ) -> Result<(), VcError> {
        if !enabled {
            let ft_states = self.cluster_ft_states(session, cluster_moid).await?;
            let protected: Vec<&(String, String)> = ft_states
                .iter()
                .filter(|(_, ft_state)| {
                    !matches!(ft_state.as_str(), "notConfigured" | "disabled")
                })
                .collect();
            if !protected.is_empty() {
                let names: Vec<&str> =
                    protected.iter().map(|(name, _)| name.as_str()).collect();
                self.log_operation(
                    "disable_cluster_ha",
                    cluster_moid,
                    false,
                    Some(format!("fault tolerance active on: {}", names.join(", "))),
                )
                .await;
                return Err(VcError::Protocol(format!(
                    "cannot disable HA: Fault Tolerance active on {}",
                    names.join(", ")
                )));
            }
        }

        let path = endpoints::cluster_reconfigure(cluster_moid);
        let body = json!({ "ha_enabled": enabled });

        let task_id = self
            .manager
            .request(session, Method::POST, &path, Some(&body))
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();

        let operation = if enabled { "enable_cluster_ha" } else { "disable_cluster_ha" };
        let outcome = if task_id.is_empty() {
            Ok(())
        } else {
            self.wait_for_task(
                session,
                &task_id,
                Duration::from_secs(300),
                Duration::from_secs(2),
            )
            .await
        };

        match &outcome {
            Ok(()) => {
                info!("✅ [VC_OPS]: {} on {} completed.", operation, cluster_moid);
                self.log_operation(operation, cluster_moid, true, None).await;
            }
            Err(reconfigure_fault) => {
                self.log_operation(operation, cluster_moid, false, Some(reconfigure_fault.to_string()))
                    .await;
            }
        }
        outcome
    }

    /// Habilita/deshabilita el monitoreo de hosts del cluster.
    pub async fn set_host_monitoring(
        &self,
        session: &VcSession,
        cluster_moid: &str,
        enabled: bool,
    ) -> Result<(), VcError> {
        let path = endpoints::cluster_reconfigure(cluster_moid);
        let body = json!({
            "host_monitoring": if enabled { "enabled" } else { "disabled" }
        });

        let task_id = self
            .manager
            .request(session, Method::POST, &path, Some(&body))
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();

        let operation = if enabled {
            "enable_host_monitoring"
        } else {
            "disable_host_monitoring"
        };

        let outcome = if task_id.is_empty() {
            Ok(())
        } else {
            self.wait_for_task(
                session,
                &task_id,
                Duration::from_secs(300),
                Duration::from_secs(2),
            )
            .await
        };

        match &outcome {
            Ok(()) => self.log_operation(operation, cluster_moid, true, None).await,
            Err(reconfigure_fault) => {
                self.log_operation(operation, cluster_moid, false, Some(reconfigure_fault.to_string()))
                    .await
            }
        }
        outcome
    }

    /// Storage vMotion: reubica el almacenamiento de una VM.
    pub async fn relocate_vm(
        &self,
        session: &VcSession,
        vm_moid: &str,
        datastore_moid: &str,
    ) -> Result<String, VcError> {
        let path = endpoints::vm_relocate(vm_moid);
        let body = json!({ "placement": { "datastore": datastore_moid } });

        let outcome = self
            .manager
            .request(session, Method::POST, &path, Some(&body))
            .await;

        match outcome {
            Ok(reply) => {
                self.log_operation("storage_vmotion", vm_moid, true, None).await;
                Ok(reply.as_str().unwrap_or_default().to_string())
            }
            Err(relocate_fault) => {
                self.log_operation("storage_vmotion", vm_moid, false, Some(relocate_fault.to_string()))
                    .await;
                Err(relocate_fault)
            }
        }
    }

    /// Apagado de VM: graceful (guest) con degradación a forzado.
    pub async fn power_off_vm(
        &self,
        session: &VcSession,
        vm_moid: &str,
        graceful: bool,
    ) -> Result<(), VcError> {
        if graceful {
            let shutdown = self
                .manager
                .request(
                    session,
                    Method::POST,
                    &endpoints::vm_power_action(vm_moid, "shutdown"),
                    None,
                )
                .await;
            if shutdown.is_ok() {
                return Ok(());
            }
            warn!("⚠️ [VC_OPS]: Guest shutdown failed for {}, forcing off.", vm_moid);
        }

        self.manager
            .request(
                session,
                Method::POST,
                &endpoints::vm_power_action(vm_moid, "stop"),
                None,
            )
            .await
            .map(|_| ())
    }

    /// Elimina el registro de una VM (sin tocar sus discos).
    pub async fn unregister_vm(&self, session: &VcSession, vm_moid: &str) -> Result<(), VcError> {
        let outcome = self
            .manager
            .request(session, Method::POST, &endpoints::vm_unregister(vm_moid), None)
            .await
            .map(|_| ());

        match &outcome {
            Ok(()) => self.log_operation("unregister_vm", vm_moid, true, None).await,
            Err(unregister_fault) => {
                self.log_operation("unregister_vm", vm_moid, false, Some(unregister_fault.to_string()))
                    .await
            }
        }
        outcome
    }

    /// Crea una VM con la especificación dada (shell de DR incluida).
    pub async fn create_vm(&self, session: &VcSession, spec: &Value) -> Result<String, VcError> {
        let outcome = self
            .manager
            .request(session, Method::POST, endpoints::VMS, Some(spec))
            .await;

        match outcome {
            Ok(reply) => {
                let vm_moid = reply.as_str().unwrap_or_default().to_string();
                self.log_operation("create_vm", &vm_moid, true, None).await;
                Ok(vm_moid)
            }
            Err(create_fault) => {
                self.log_operation("create_vm", "-", false, Some(create_fault.to_string())).await;
                Err(create_fault)
            }
        }
    }

    /// Lista el contenido de una carpeta de datastore.
    pub async fn browse_datastore(
        &self,
        session: &VcSession,
        datastore_moid: &str,
        folder_path: &str,
    ) -> Result<Value, VcError> {
        let path = format!(
            "{}?path={}",
            endpoints::datastore_browse(datastore_moid),
            folder_path
        );
        self.manager.request(session, Method::GET, &path, None).await
    }

    /// Espera a que el host reconecte tras un reinicio.
    pub async fn wait_for_host_connected(
        &self,
        session: &VcSession,
        host_moid: &str,
        timeout: Duration,
    ) -> Result<bool, VcError> {
        let started = std::time::Instant::now();
        let mut delay = Duration::from_secs(1);

        loop {
            if let Ok(runtime) = self.host_runtime(session, host_moid).await {
                let connected = runtime
                    .get("connection_state")
                    .and_then(Value::as_str)
                    .map(|state| state.eq_ignore_ascii_case("connected"))
                    .unwrap_or(false);
                if connected {
                    return Ok(true);
                }
            }

            if started.elapsed() > timeout {
                return Ok(false);
            }

            // Backoff adaptativo: arranca en 1 s y crece hasta 5 s.
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(5));
        }
    }
}
