// [apps/job-executor/src/services/discovery.rs]
/*!
 * =================================================================
 * APARATO: DISCOVERY ENGINE
 * CLASIFICACIÓN: EXECUTION LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: ESCANEO DE FLOTA EN TRES ETAPAS
 *
 * # Logic:
 * Etapa 1: puerto 443 abierto. Etapa 2: raíz Redfish sin autenticar.
 * Etapa 3: autenticación contra cada set de credenciales en orden de
 * prioridad hasta acertar o agotar en 401/403. Pool de workers
 * acotado (default 5, configurable en activity_settings), arranque
 * escalonado con jitter de 50-200 ms tras los primeros 10 envíos,
 * presupuesto de 30 s por IP y advertencia si >30 % de los sondeos
 * expiran. El progreso se publica cada 5 IPs y en cada evento de
 * etapa 3.
 * =================================================================
 */

use std::sync::Arc;
use std::time::Duration;

use infrasync_domain_credentials::ip_range::expand_ip_spec;
use infrasync_domain_models::credential::CredentialSetRecord;
use infrasync_domain_models::job::JobStatus;
use infrasync_domain_models::task::TaskStatus;
use infrasync_infra_idrac::{Correlation, IdracError, IdracSession};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::services::job_context::JobContext;
use crate::state::AppState;

/// Presupuesto total por IP (las tres etapas).
const PER_IP_BUDGET: Duration = Duration::from_secs(30);

/// Resultado de un sondeo de IP individual.
#[derive(Debug, Clone, Default)]
struct IpProbeOutcome {
    ip: String,
    port_open: bool,
    idrac_detected: bool,
    auth_failed: bool,
    success: bool,
    timed_out: bool,
    model: Option<String>,
    service_tag: Option<String>,
    hostname: Option<String>,
    credential_set_name: Option<String>,
    credential_set_id: Option<String>,
    error: Option<String>,
}

impl IpProbeOutcome {
    fn server_result(&self) -> Value {
        if self.success {
            json!({
                "ip": self.ip,
                "status": "synced",
                "model": self.model,
                "service_tag": self.service_tag,
                "credential_set": self.credential_set_name,
            })
        } else if self.auth_failed {
            json!({ "ip": self.ip, "status": "auth_failed" })
        } else if self.timed_out {
            json!({ "ip": self.ip, "status": "filtered", "filter_reason": "timeout" })
        } else if !self.port_open {
            json!({ "ip": self.ip, "status": "filtered", "filter_reason": "port_closed" })
        } else if !self.idrac_detected {
            json!({ "ip": self.ip, "status": "filtered", "filter_reason": "not_idrac" })
        } else {
            json!({
                "ip": self.ip,
                "status": "filtered",
                "filter_reason": self.error.clone().unwrap_or_else(|| "unknown".to_string()),
            })
        }
    }
}

/// Sondeo completo de una IP: las tres etapas bajo un presupuesto.
async fn discover_single_ip(
    state: &AppState,
    ip: String,
    credential_sets: Arc<Vec<CredentialSetRecord>>,
) -> IpProbeOutcome {
    let mut outcome = IpProbeOutcome {
        ip: ip.clone(),
        ..Default::default()
    };

    let probe = async {
        // Etapa 1: TCP 443.
        let tcp = state.idrac.tcp_probe(&ip, Duration::from_secs(5)).await;
        outcome.port_open = tcp.reachable;
        if !tcp.reachable {
            return outcome;
        }

        // Etapa 2: detección Redfish sin autenticar.
        let detection = state.idrac.probe_redfish_root(&ip).await;
        outcome.idrac_detected = detection.detected;
        if !detection.detected {
            return outcome;
        }

        // Etapa 3: autenticación por prioridad.
        for set in credential_sets.iter() {
            let Some(username) = set.username.clone() else { continue };
            let password = match set.password.clone() {
                Some(plain) => Some(plain),
                None => match set.password_encrypted.as_deref() {
                    Some(encrypted) => state.resolver.decrypt(encrypted).await,
                    None => None,
                },
            };
            let Some(password) = password else { continue };

            let session = IdracSession::new(&ip, &username, &password);
            match state
                .idrac
                .system_info(&session, &Correlation::default())
                .await
            {
                Ok(info) => {
                    outcome.success = true;
                    outcome.auth_failed = false;
                    outcome.model = info
                        .pointer("/system/model")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    outcome.service_tag = info
                        .pointer("/system/service_tag")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    outcome.hostname = info
                        .pointer("/system/hostname")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    outcome.credential_set_name = set.name.clone();
                    outcome.credential_set_id = set.id.clone();
                    return outcome;
                }
                Err(IdracError::Auth { .. }) => {
                    outcome.auth_failed = true;
                    continue;
                }
                Err(other) => {
                    outcome.error = Some(other.to_string());
                    return outcome;
                }
            }
        }

        outcome
    };

    match tokio::time::timeout(PER_IP_BUDGET, probe).await {
        Ok(outcome) => outcome,
        Err(_) => IpProbeOutcome {
            ip,
            timed_out: true,
            ..Default::default()
        },
    }
}

/// Handler del trabajo 'discovery_scan'.
pub async fn execute_discovery_scan(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();

    // Refresh dirigido de servidores existentes.
    if let Some(server_ids) = scope.server_ids.clone().filter(|ids| !ids.is_empty()) {
        let refreshed = refresh_existing_servers(state, context, &server_ids).await;
        context
            .finish(
                JobStatus::Completed,
                json!({ "refreshed_count": refreshed, "total": server_ids.len() }),
            )
            .await;
        return Ok(());
    }

    // Expansión de IPs: ValidationError antes de arrancar workers.
    let ips_to_scan = match expand_ip_spec(
        scope.ip_range.as_deref(),
        scope.ip_list.as_deref(),
    ) {
        Ok(targets) => targets,
        Err(expansion_fault) => {
            context.finish_failed(expansion_fault.to_string()).await;
            return Ok(());
        }
    };

    // Sets de credenciales; defaults de entorno como último recurso.
    let requested_sets = context.job.credential_sets();
    let mut credential_sets = state.resolver.credential_sets(&requested_sets).await;
    if credential_sets.is_empty() {
        if state.config.idrac_default_user.is_empty()
            || state.config.idrac_default_password.is_empty()
        {
            context
                .finish_failed("no credential sets configured and no environment defaults")
                .await;
            return Ok(());
        }
        credential_sets.push(CredentialSetRecord {
            id: None,
            name: Some("Environment Default".to_string()),
            username: Some(state.config.idrac_default_user.clone()),
            password: Some(state.config.idrac_default_password.clone()),
            priority: Some(999),
            ..Default::default()
        });
    }

    let settings = state.settings.activity_settings().await;
    let max_threads = settings.discovery_max_threads.unwrap_or(5).max(1);

    info!(
        "🔭 [DISCOVERY]: Scanning {} IPs with {} worker(s), {} credential set(s).",
        ips_to_scan.len(),
        max_threads,
        credential_sets.len()
    );

    let credential_sets = Arc::new(credential_sets);
    let worker_permits = Arc::new(Semaphore::new(max_threads));
    let total_ips = ips_to_scan.len();

    let mut join_set: JoinSet<IpProbeOutcome> = JoinSet::new();
    for (index, ip) in ips_to_scan.iter().cloned().enumerate() {
        // Arranque escalonado tras los primeros 10 envíos.
        if index > 0 && total_ips > 10 {
            let jitter_ms = rand::thread_rng().gen_range(50..=200);
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        }

        let state = state.clone();
        let credential_sets = credential_sets.clone();
        let worker_permits = worker_permits.clone();
        join_set.spawn(async move {
            let _permit = worker_permits.acquire_owned().await;
            discover_single_ip(&state, ip, credential_sets).await
        });
    }

    let mut discovered: Vec<IpProbeOutcome> = Vec::new();
    let mut auth_failure_ips: Vec<String> = Vec::new();
    let mut server_results: Vec<Value> = Vec::new();
    let mut stage1_passed = 0usize;
    let mut stage1_filtered = 0usize;
    let mut stage2_passed = 0usize;
    let mut stage2_filtered = 0usize;
    let mut timeout_count = 0usize;
    let mut ips_processed = 0usize;
    let mut cancelled = false;

    while let Some(joined) = join_set.join_next().await {
        let Ok(outcome) = joined else { continue };
        ips_processed += 1;

        if outcome.timed_out {
            timeout_count += 1;
            if timeout_count as f64 / total_ips as f64 > 0.3 {
                warn!(
                    "⚠️ [DISCOVERY]: Multiple timeouts detected - iDRACs may be overloaded. Consider reducing discovery_max_threads."
                );
            }
        } else if outcome.port_open {
            stage1_passed += 1;
            if outcome.idrac_detected {
                stage2_passed += 1;
            } else {
                stage2_filtered += 1;
            }
        } else {
            stage1_filtered += 1;
        }

        let is_stage3_event = outcome.success || outcome.auth_failed;
        if outcome.success {
            info!(
                "✅ [DISCOVERY]: Found iDRAC at {} ({:?}, set {:?}).",
                outcome.ip, outcome.model, outcome.credential_set_name
            );
            discovered.push(outcome.clone());
        } else if outcome.auth_failed && outcome.idrac_detected {
            auth_failure_ips.push(outcome.ip.clone());
        }

        server_results.push(outcome.server_result());

        if ips_processed % 5 == 0 || is_stage3_event {
            if context.is_cancelled().await {
                cancelled = true;
                join_set.abort_all();
                break;
            }

            let recent: Vec<Value> =
                server_results.iter().rev().take(20).rev().cloned().collect();
            context
                .update_progress(json!({
                    "current_ip": outcome.ip,
                    "current_stage": "authenticating",
                    "ips_processed": ips_processed,
                    "ips_total": total_ips,
                    "stage1_passed": stage1_passed,
                    "stage1_filtered": stage1_filtered,
                    "stage2_passed": stage2_passed,
                    "stage2_filtered": stage2_filtered,
                    "discovered_count": discovered.len(),
                    "auth_failures": auth_failure_ips.len(),
                    "server_results": recent,
                }))
                .await;
        }
    }

    if cancelled {
        context.finish_cancelled().await;
        return Ok(());
    }

    info!(
        "🔭 [DISCOVERY]: Complete - {} authenticated, {} need credentials, {} port-closed, {} not-idrac.",
        discovered.len(),
        auth_failure_ips.len(),
        stage1_filtered,
        stage2_filtered
    );

    // Alta de los servidores descubiertos.
    for probe in &discovered {
        if let Err(insert_fault) = state
            .servers
            .upsert_discovered(
                &probe.ip,
                probe.hostname.as_deref(),
                probe.model.as_deref(),
                probe.service_tag.as_deref(),
                probe.credential_set_id.as_deref(),
            )
            .await
        {
            warn!("⚠️ [DISCOVERY]: Insert for {} failed: {}", probe.ip, insert_fault);
        }
    }

    // Refresh completo automático de los recién descubiertos.
    let mut auto_refresh_triggered = false;
    if !discovered.is_empty() {
        let discovered_ips: Vec<String> =
            discovered.iter().map(|probe| probe.ip.clone()).collect();
        match state.servers.by_ips(&discovered_ips).await {
            Ok(rows) => {
                let server_ids: Vec<String> = rows.into_iter().map(|row| row.id).collect();
                if !server_ids.is_empty() {
                    refresh_existing_servers(state, context, &server_ids).await;
                    auto_refresh_triggered = true;
                }
            }
            Err(lookup_fault) => {
                warn!("⚠️ [DISCOVERY]: Auto-refresh lookup failed: {}", lookup_fault)
            }
        }
    }

    context
        .finish(
            JobStatus::Completed,
            json!({
                "discovered_count": discovered.len(),
                "auth_failures": auth_failure_ips.len(),
                "scanned_ips": total_ips,
                "auth_failure_ips": auth_failure_ips,
                "auto_refresh_triggered": auto_refresh_triggered,
                "stage1_passed": stage1_passed,
                "stage1_filtered": stage1_filtered,
                "stage2_passed": stage2_passed,
                "stage2_filtered": stage2_filtered,
                "stage3_passed": discovered.len(),
                "stage3_failed": auth_failure_ips.len(),
                "optimization_enabled": true,
                "server_results": server_results,
            }),
        )
        .await;

    Ok(())
}

/// Refresh dirigido: credenciales resueltas + system_info + parche de fila.
async fn refresh_existing_servers(
    state: &AppState,
    context: &Arc<JobContext>,
    server_ids: &[String],
) -> usize {
    let servers = state.servers.by_ids(server_ids).await.unwrap_or_default();
    let mut refreshed = 0usize;

    for server in servers {
        if context.is_cancelled().await {
            break;
        }

        let task_id = context.create_task(Some(&server.id)).await;
        if let Some(task_id) = &task_id {
            context
                .update_task(task_id, TaskStatus::Running, Some(10), Some("Refreshing server info..."))
                .await;
        }

        let resolved = state.resolver.resolve_for_server(&server).await;
        if !resolved.is_usable() {
            if let Some(task_id) = &task_id {
                context
                    .update_task(task_id, TaskStatus::Failed, None, Some("No credentials available"))
                    .await;
            }
            continue;
        }

        let session = IdracSession::new(
            &server.ip_address,
            resolved.username.as_deref().unwrap_or_default(),
            resolved.password.as_deref().unwrap_or_default(),
        );
        let correlation = Correlation::for_server(&server.id)
            .with_job(&context.job_id().to_string());

        match state.idrac.system_info(&session, &correlation).await {
            Ok(info) => {
                let patch = json!({
                    "hostname": info.pointer("/system/hostname"),
                    "model": info.pointer("/system/model"),
                    "service_tag": info.pointer("/system/service_tag"),
                });
                if state.servers.patch(&server.id, &patch).await.is_ok() {
                    refreshed += 1;
                }
                if let Some(task_id) = &task_id {
                    context
                        .update_task(task_id, TaskStatus::Completed, Some(100), Some("Server info refreshed"))
                        .await;
                }
            }
            Err(refresh_fault) => {
                if let Some(task_id) = &task_id {
                    context
                        .update_task(
                            task_id,
                            TaskStatus::Failed,
                            None,
                            Some(&refresh_fault.to_string()),
                        )
                        .await;
                }
            }
        }
    }

    refreshed
}

/// Handler del trabajo 'test_credentials': GET ligero a la raíz Redfish.
pub async fn execute_test_credentials(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();
    let Some(ip_address) = scope.ip_address else {
        context.finish_failed("ip_address is required").await;
        return Ok(());
    };

    // Credenciales: set explícito o credenciales manuales en details.
    let requested_sets = context.job.credential_sets();
    let (username, password) = if let Some(set) = state
        .resolver
        .credential_sets(&requested_sets)
        .await
        .into_iter()
        .next()
    {
        let password = match set.password.clone() {
            Some(plain) => Some(plain),
            None => match set.password_encrypted.as_deref() {
                Some(encrypted) => state.resolver.decrypt(encrypted).await,
                None => None,
            },
        };
        (set.username, password)
    } else {
        (
            context.job.details.get("username").and_then(Value::as_str).map(str::to_string),
            context.job.details.get("password").and_then(Value::as_str).map(str::to_string),
        )
    };

    let (Some(username), Some(password)) = (username, password) else {
        context.finish_failed("no credentials provided").await;
        return Ok(());
    };

    let session = IdracSession::new(&ip_address, &username, &password);
    let correlation = Correlation::default().with_job(&context.job_id().to_string());

    match state.idrac.authenticate_probe(&session, &correlation).await {
        Ok(probe) => {
            context
                .finish(
                    JobStatus::Completed,
                    json!({
                        "success": true,
                        "message": "Connection successful",
                        "idrac_version": probe.get("redfish_version"),
                        "product": probe.get("product"),
                        "vendor": probe.get("vendor"),
                    }),
                )
                .await;
        }
        Err(IdracError::Auth { .. }) => {
            context
                .finish(
                    JobStatus::Failed,
                    json!({
                        "success": false,
                        "message": "Authentication failed - invalid credentials",
                    }),
                )
                .await;
        }
        Err(other) => {
            context
                .finish(
                    JobStatus::Failed,
                    json!({ "success": false, "message": other.to_string() }),
                )
                .await;
        }
    }

    Ok(())
}

/// Handler del trabajo 'health_check': chequeo por servidor con tareas.
pub async fn execute_health_check(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();

    let servers = if scope.scope_type.as_deref() == Some("specific") {
        state
            .servers
            .by_ids(&scope.server_ids.unwrap_or_default())
            .await
            .unwrap_or_default()
    } else {
        state.servers.all().await.unwrap_or_default()
    };

    let total_servers = servers.len();
    let mut success_count = 0usize;
    let mut failed_count = 0usize;
    let mut failed_servers: Vec<Value> = Vec::new();

    for (index, server) in servers.iter().enumerate() {
        if context.is_cancelled().await {
            context.finish_cancelled().await;
            return Ok(());
        }

        context
            .update_progress(json!({
                "current_server_index": index,
                "total_servers": total_servers,
                "success_count": success_count,
                "failed_count": failed_count,
                "total": total_servers,
                "current_step": format!(
                    "Checking {} ({}/{})",
                    server.ip_address,
                    index + 1,
                    total_servers
                ),
            }))
            .await;

        let task_id = context.create_task(Some(&server.id)).await;
        if let Some(task_id) = &task_id {
            context
                .update_task(task_id, TaskStatus::Running, Some(0), Some("Starting health check..."))
                .await;
        }

        let resolved = state.resolver.resolve_for_server(server).await;
        if !resolved.is_usable() {
            failed_count += 1;
            failed_servers.push(json!({
                "ip_address": server.ip_address,
                "hostname": server.hostname,
                "server_id": server.id,
                "error": format!("No credentials configured for {}", server.ip_address),
            }));
            if let Some(task_id) = &task_id {
                context
                    .update_task(task_id, TaskStatus::Failed, None, Some("No credentials configured"))
                    .await;
            }
            continue;
        }

        let session = IdracSession::new(
            &server.ip_address,
            resolved.username.as_deref().unwrap_or_default(),
            resolved.password.as_deref().unwrap_or_default(),
        );
        let correlation = Correlation::for_server(&server.id)
            .with_job(&context.job_id().to_string());

        match state.idrac.health(&session, &correlation).await {
            Ok(_) => {
                success_count += 1;
                if let Some(task_id) = &task_id {
                    context
                        .update_task(
                            task_id,
                            TaskStatus::Completed,
                            Some(100),
                            Some(&format!("Health check completed for {}", server.ip_address)),
                        )
                        .await;
                }
            }
            Err(health_fault) => {
                failed_count += 1;
                failed_servers.push(json!({
                    "ip_address": server.ip_address,
                    "hostname": server.hostname,
                    "server_id": server.id,
                    "error": health_fault.to_string(),
                }));
                if let Some(task_id) = &task_id {
                    context
                        .update_task(task_id, TaskStatus::Failed, None, Some(&health_fault.to_string()))
                        .await;
                }
            }
        }
    }

    let status = if failed_count == 0 {
        JobStatus::Completed
    } else {
        JobStatus::Failed
    };
    context
        .finish(
            status,
            json!({
                "success_count": success_count,
                "failed_count": failed_count,
                "total": total_servers,
                "failed_servers": failed_servers,
            }),
        )
        .await;

    Ok(())
}

/// Handler del trabajo 'fetch_event_logs'.
pub async fn execute_fetch_event_logs(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();
    let servers = state
        .servers
        .by_ids(&scope.server_ids.unwrap_or_default())
        .await
        .unwrap_or_default();

    let log_type = context
        .job
        .details
        .get("log_type")
        .and_then(Value::as_str)
        .unwrap_or("sel")
        .to_string();

    let mut results: Vec<Value> = Vec::new();
    let mut failed_count = 0usize;

    for server in &servers {
        if context.is_cancelled().await {
            context.finish_cancelled().await;
            return Ok(());
        }

        let resolved = state.resolver.resolve_for_server(server).await;
        if !resolved.is_usable() {
            failed_count += 1;
            results.push(json!({
                "server_id": server.id,
                "success": false,
                "error": "no credentials available",
            }));
            continue;
        }

        let session = IdracSession::new(
            &server.ip_address,
            resolved.username.as_deref().unwrap_or_default(),
            resolved.password.as_deref().unwrap_or_default(),
        );
        let correlation = Correlation::for_server(&server.id)
            .with_job(&context.job_id().to_string());

        match state.idrac.event_logs(&session, &log_type, &correlation).await {
            Ok(entries) => results.push(json!({
                "server_id": server.id,
                "success": true,
                "entry_count": entries.len(),
                "entries": entries.into_iter().take(100).collect::<Vec<_>>(),
            })),
            Err(log_fault) => {
                failed_count += 1;
                results.push(json!({
                    "server_id": server.id,
                    "success": false,
                    "error": log_fault.to_string(),
                }));
            }
        }
    }

    // Trabajo tipo descubrimiento: los fallos por-servidor son normales
    // y no enmascaran el estado del resto.
    context
        .finish(
            JobStatus::Completed,
            json!({
                "results": results,
                "failed_count": failed_count,
                "log_type": log_type,
                "total": servers.len(),
            }),
        )
        .await;

    Ok(())
}
