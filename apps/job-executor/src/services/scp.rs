// [apps/job-executor/src/services/scp.rs]
/*!
 * =================================================================
 * APARATO: SCP EXPORT/IMPORT DRIVER
 * CLASIFICACIÓN: EXECUTION LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: RESPALDO/RESTAURACIÓN DE PERFILES DE CONFIGURACIÓN
 *
 * # Logic:
 * Orden de transportes del export: Local (contenido en el monitor de
 * tarea) → HTTP Push (servidor HTTP efímero local de un solo PUT/POST,
 * puerto aleatorio, 300 s) → CIFS → NFS. Cada intento de transporte
 * queda en la bitácora con su resultado para que la elección sea
 * auditable. Una tarea "completada" sin contenido es ProtocolError y
 * dispara el siguiente transporte.
 * =================================================================
 */

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use base64::Engine;
use chrono::Utc;
use infrasync_domain_models::job::JobStatus;
use infrasync_domain_models::task::TaskStatus;
use infrasync_infra_idrac::{supports_local_export, Correlation, IdracSession};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::services::job_context::JobContext;
use crate::state::AppState;

/// Presupuesto del sondeo del monitor de tarea SCP.
const TASK_POLL_BUDGET: Duration = Duration::from_secs(600);
const TASK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Ventana del receptor HTTP efímero.
const HTTP_PUSH_TIMEOUT: Duration = Duration::from_secs(300);

/// Estados terminales del monitor de tarea del proveedor.
fn task_state_of(body: &Value) -> Option<String> {
    body.get("TaskState")
        .or_else(|| body.get("TaskStatus"))
        .or_else(|| body.pointer("/Oem/Dell/JobState"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn is_task_success(state: &str) -> bool {
    matches!(state, "Completed" | "CompletedWithErrors" | "OK")
}

fn is_task_failure(state: &str) -> bool {
    matches!(state, "Failed" | "Exception" | "Killed" | "Warning")
}

/// Extrae el contenido SCP de un cuerpo de tarea coaccionado.
fn extract_scp_content(body: &Value) -> Option<String> {
    // Mensajes con el XML embebido (export Local clásico).
    if let Some(messages) = body.get("Messages").and_then(Value::as_array) {
        for message in messages {
            if let Some(text) = message.get("Message").and_then(Value::as_str) {
                if text.trim_start().starts_with("<SystemConfiguration") {
                    return Some(text.to_string());
                }
            }
        }
    }

    // Export JSON: objeto SystemConfiguration completo.
    if let Some(configuration) = body.get("SystemConfiguration") {
        return serde_json::to_string_pretty(configuration).ok();
    }

    // Respuesta cruda preservada por la coacción.
    if let Some(raw) = body.get("_raw_response").and_then(Value::as_str) {
        if raw.trim_start().starts_with("<SystemConfiguration") {
            return Some(raw.to_string());
        }
    }

    None
}

/// ¿El contenido es un perfil plausible y no vacío?
fn is_valid_scp_content(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.len() > 100
        && (trimmed.starts_with("<SystemConfiguration") || trimmed.starts_with('{'))
}

/// IP local alcanzable desde la red de gestión.
fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|address| address.ip().to_string())
}

/// Sondea el monitor de tarea hasta estado terminal; devuelve el
/// cuerpo final.
async fn wait_for_scp_task(
    state: &AppState,
    session: &IdracSession,
    task_path: &str,
    correlation: &Correlation,
) -> Result<Value, String> {
    let started = std::time::Instant::now();

    loop {
        let reply = state
            .idrac
            .task_monitor(session, task_path, correlation)
            .await
            .map_err(|poll_fault| poll_fault.to_string())?;

        let body = reply.body;
        if let Some(task_state) = task_state_of(&body) {
            if is_task_success(&task_state) {
                return Ok(body);
            }
            if is_task_failure(&task_state) {
                let messages: Vec<String> = body
                    .get("Messages")
                    .and_then(Value::as_array)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|entry| entry.get("Message").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                return Err(format!(
                    "task ended in state {} ({})",
                    task_state,
                    messages.join("; ")
                ));
            }
        }

        if started.elapsed() > TASK_POLL_BUDGET {
            return Err(format!(
                "task did not complete within {}s",
                TASK_POLL_BUDGET.as_secs()
            ));
        }
        tokio::time::sleep(TASK_POLL_INTERVAL).await;
    }
}

/// Transporte Local: el contenido llega en el monitor de tarea.
async fn export_via_local(
    state: &AppState,
    session: &IdracSession,
    targets: &str,
    details: &Value,
    correlation: &Correlation,
) -> Result<(String, &'static str), String> {
    let payload = json!({
        "ExportFormat": "XML",
        "ShareParameters": { "Target": targets },
        "ExportUse": details.get("export_use").and_then(Value::as_str).unwrap_or("Clone"),
        "IncludeInExport": details
            .get("include_in_export")
            .and_then(Value::as_str)
            .unwrap_or("Default"),
    });

    let reply = state
        .idrac
        .export_system_configuration(session, &payload, correlation)
        .await
        .map_err(|export_fault| export_fault.to_string())?;

    if !(200..300).contains(&reply.status) {
        return Err(format!("export rejected: HTTP {}", reply.status));
    }

    let final_body = if reply.status == 202 {
        let Some(location) = reply.location.clone() else {
            return Err("202 accepted without task location".to_string());
        };
        wait_for_scp_task(state, session, &location, correlation).await?
    } else {
        reply.body
    };

    match extract_scp_content(&final_body) {
        Some(content) if is_valid_scp_content(&content) => Ok((content, "local")),
        _ => Err("task completed with no content".to_string()),
    }
}

/// Transporte HTTP Push: servidor efímero de un solo PUT/POST.
async fn export_via_http_push(
    state: &AppState,
    session: &IdracSession,
    targets: &str,
    correlation: &Correlation,
) -> Result<(String, &'static str), String> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", 0))
        .await
        .map_err(|bind_fault| format!("ephemeral bind failed: {}", bind_fault))?;
    let push_port = listener
        .local_addr()
        .map_err(|address_fault| address_fault.to_string())?
        .port();
    let push_ip = local_ip().ok_or_else(|| "could not determine local IP".to_string())?;

    info!(
        "📥 [SCP_EXPORT]: Ephemeral HTTP receiver on {}:{} (single PUT/POST, {}s window).",
        push_ip,
        push_port,
        HTTP_PUSH_TIMEOUT.as_secs()
    );

    let (content_sender, mut content_receiver) = mpsc::channel::<String>(1);
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let shutdown_for_handler = shutdown.clone();

    // Cualquier método y cualquier ruta: el iDRAC decide el path del PUT.
    let receiver_app = Router::new().fallback(move |body: String| {
        let content_sender = content_sender.clone();
        let shutdown = shutdown_for_handler.clone();
        async move {
            let _ = content_sender.send(body).await;
            shutdown.notify_one();
            "OK"
        }
    });

    let shutdown_for_server = shutdown.clone();
    let server_task = tokio::spawn(async move {
        let _ = axum::serve(listener, receiver_app)
            .with_graceful_shutdown(async move { shutdown_for_server.notified().await })
            .await;
    });

    let payload = json!({
        "ExportFormat": "XML",
        "ShareParameters": {
            "Target": targets,
            "ShareType": "HTTP",
            "IPAddress": push_ip,
            "ShareName": "/",
            "FileName": "scp-export.xml",
            "PortNumber": push_port.to_string(),
        },
        "ExportUse": "Clone",
    });

    let trigger = state
        .idrac
        .export_system_configuration(session, &payload, correlation)
        .await;

    if let Err(trigger_fault) = trigger {
        shutdown.notify_one();
        let _ = server_task.await;
        return Err(format!("http push trigger failed: {}", trigger_fault));
    }

    let received = tokio::time::timeout(HTTP_PUSH_TIMEOUT, content_receiver.recv()).await;
    shutdown.notify_one();
    let _ = server_task.await;

    match received {
        Ok(Some(content)) if is_valid_scp_content(&content) => Ok((content, "http_push")),
        Ok(Some(_)) => Err("http push delivered invalid content".to_string()),
        _ => Err(format!(
            "no push received within {}s",
            HTTP_PUSH_TIMEOUT.as_secs()
        )),
    }
}

/// Transporte de share de red (CIFS o NFS).
async fn export_via_share(
    state: &AppState,
    session: &IdracSession,
    targets: &str,
    details: &Value,
    share_type: &'static str,
    correlation: &Correlation,
) -> Result<(String, &'static str), String> {
    let share_address = details
        .get("share_address")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{} transport requires share_address", share_type))?;
    let share_name = details
        .get("share_name")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{} transport requires share_name", share_type))?;

    let file_name = format!(
        "scp-{}-{}.xml",
        session.ip.replace('.', "-"),
        Utc::now().format("%Y%m%d-%H%M%S")
    );

    let mut share_parameters = json!({
        "Target": targets,
        "ShareType": share_type,
        "IPAddress": share_address,
        "ShareName": share_name,
        "FileName": file_name.clone(),
    });
    if share_type == "CIFS" {
        if let Some(username) = details.get("share_username").and_then(Value::as_str) {
            share_parameters["UserName"] = json!(username);
        }
        if let Some(password) = details.get("share_password").and_then(Value::as_str) {
            share_parameters["Password"] = json!(password);
        }
    }

    let payload = json!({
        "ExportFormat": "XML",
        "ShareParameters": share_parameters,
        "ExportUse": "Clone",
    });

    let reply = state
        .idrac
        .export_system_configuration(session, &payload, correlation)
        .await
        .map_err(|export_fault| export_fault.to_string())?;

    if reply.status == 202 {
        let Some(location) = reply.location.clone() else {
            return Err("202 accepted without task location".to_string());
        };
        wait_for_scp_task(state, session, &location, correlation).await?;
    } else if !(200..300).contains(&reply.status) {
        return Err(format!("export rejected: HTTP {}", reply.status));
    }

    // El contenido queda en el share; se registra la ubicación.
    let location_note = format!("//{}/{}/{}", share_address, share_name, file_name);
    Ok((
        location_note,
        if share_type == "CIFS" { "cifs" } else { "nfs" },
    ))
}

/// Handler del trabajo 'scp_export'.
pub async fn execute_scp_export(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();
    let server_ids = scope.server_ids.unwrap_or_default();
    if server_ids.is_empty() {
        context.finish_failed("no target servers specified").await;
        return Ok(());
    }

    let details = context.job.details.clone();
    let backup_name = details
        .get("backup_name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("backup-{}", Utc::now().format("%Y%m%d-%H%M%S")));

    let mut targets: Vec<&str> = Vec::new();
    let include = |key: &str| details.get(key).and_then(Value::as_bool).unwrap_or(true);
    if include("include_bios") {
        targets.push("BIOS");
    }
    if include("include_idrac") {
        targets.push("IDRAC");
    }
    if include("include_nic") {
        targets.push("NIC");
    }
    if include("include_raid") {
        targets.push("RAID");
    }
    let targets = targets.join(",");

    let mut success_count = 0usize;
    let mut failed_count = 0usize;
    let mut results: Vec<Value> = Vec::new();

    for server_id in &server_ids {
        if context.is_cancelled().await {
            context.finish_cancelled().await;
            return Ok(());
        }

        let task_id = context.create_task(Some(server_id)).await;
        if let Some(task_id) = &task_id {
            context
                .update_task(task_id, TaskStatus::Running, Some(5), Some("Exporting profile..."))
                .await;
        }

        let outcome = export_single_server(state, context, server_id, &targets, &details).await;

        match outcome {
            Ok((transport, backup_id)) => {
                success_count += 1;
                results.push(json!({
                    "server_id": server_id,
                    "success": true,
                    "transport": transport,
                    "backup_id": backup_id,
                    "backup_name": backup_name,
                }));
                if let Some(task_id) = &task_id {
                    context
                        .update_task(
                            task_id,
                            TaskStatus::Completed,
                            Some(100),
                            Some(&format!("Profile exported via {}", transport)),
                        )
                        .await;
                }
            }
            Err(export_fault) => {
                failed_count += 1;
                results.push(json!({
                    "server_id": server_id,
                    "success": false,
                    "error": export_fault,
                }));
                if let Some(task_id) = &task_id {
                    context
                        .update_task(task_id, TaskStatus::Failed, None, Some(&export_fault))
                        .await;
                }
            }
        }

        context
            .update_progress(json!({
                "success_count": success_count,
                "failed_count": failed_count,
                "total": server_ids.len(),
                "results": results.clone(),
            }))
            .await;
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
                "backup_name": backup_name,
                "success_count": success_count,
                "failed_count": failed_count,
                "total": server_ids.len(),
                "results": results,
            }),
        )
        .await;

    Ok(())
}

/// Export de un servidor con la cascada de transportes.
async fn export_single_server(
    state: &AppState,
    context: &Arc<JobContext>,
    server_id: &str,
    targets: &str,
    details: &Value,
) -> Result<(&'static str, Value), String> {
    let server = state
        .servers
        .by_id(server_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| format!("server not found: {}", server_id))?;

    let resolved = state.resolver.resolve_for_server(&server).await;
    if !resolved.is_usable() {
        return Err("no valid credentials available for server".to_string());
    }

    let session = IdracSession::new(
        &server.ip_address,
        resolved.username.as_deref().unwrap_or_default(),
        resolved.password.as_deref().unwrap_or_default(),
    );
    let correlation =
        Correlation::for_server(server_id).with_job(&context.job_id().to_string());

    // Capacidad de export Local según firmware del manager.
    let firmware = state
        .idrac
        .manager_info(&session, &correlation)
        .await
        .ok()
        .and_then(|info| {
            info.get("firmware_version")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();
    let local_supported = supports_local_export(&firmware);
    if !local_supported {
        info!(
            "ℹ️ [SCP_EXPORT]: iDRAC {} firmware {} - Local export unsupported, starting at HTTP Push.",
            server.ip_address, firmware
        );
    }

    let mut transport_log: Vec<String> = Vec::new();

    // 1) Local.
    if local_supported {
        match export_via_local(state, &session, targets, details, &correlation).await {
            Ok((content, transport)) => {
                let backup_id = store_backup(state, context, server_id, &content, transport).await?;
                return Ok((transport, backup_id));
            }
            Err(local_fault) => {
                warn!("⚠️ [SCP_EXPORT]: Local transport failed: {}", local_fault);
                transport_log.push(format!("local: {}", local_fault));
            }
        }
    }

    // 2) HTTP Push.
    match export_via_http_push(state, &session, targets, &correlation).await {
        Ok((content, transport)) => {
            let backup_id = store_backup(state, context, server_id, &content, transport).await?;
            return Ok((transport, backup_id));
        }
        Err(push_fault) => {
            warn!("⚠️ [SCP_EXPORT]: HTTP Push transport failed: {}", push_fault);
            transport_log.push(format!("http_push: {}", push_fault));
        }
    }

    // 3) CIFS y 4) NFS, solo con parámetros de share presentes.
    for share_type in ["CIFS", "NFS"] {
        match export_via_share(state, &session, targets, details, share_type, &correlation).await {
            Ok((location, transport)) => {
                let backup_id = store_backup(state, context, server_id, &location, transport).await?;
                return Ok((transport, backup_id));
            }
            Err(share_fault) => {
                warn!(
                    "⚠️ [SCP_EXPORT]: {} transport failed: {}",
                    share_type, share_fault
                );
                transport_log.push(format!("{}: {}", share_type.to_lowercase(), share_fault));
            }
        }
    }

    Err(format!("all transports failed [{}]", transport_log.join(" | ")))
}

/// Persiste el respaldo (contenido en base64) y devuelve el id.
async fn store_backup(
    state: &AppState,
    context: &Arc<JobContext>,
    server_id: &str,
    content: &str,
    transport: &str,
) -> Result<Value, String> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    let created = state
        .replication_rows
        .insert_scp_backup(&json!({
            "server_id": server_id,
            "job_id": context.job_id(),
            "transport": transport,
            "content_base64": encoded,
            "created_at": Utc::now().to_rfc3339(),
        }))
        .await
        .map_err(|store_fault| store_fault.to_string())?;

    Ok(created
        .as_array()
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("id"))
        .cloned()
        .unwrap_or(Value::Null))
}

/// Handler del trabajo 'scp_import'.
pub async fn execute_scp_import(
    state: &AppState,
    context: &Arc<JobContext>,
) -> anyhow::Result<()> {
    let scope = context.job.scope();
    let server_ids = scope.server_ids.unwrap_or_default();
    let details = context.job.details.clone();

    let Some(backup_id) = details.get("backup_id").and_then(Value::as_str) else {
        context.finish_failed("backup_id is required").await;
        return Ok(());
    };

    let backup = match state.replication_rows.scp_backup_by_id(backup_id).await {
        Ok(Some(backup)) => backup,
        _ => {
            context.finish_failed(format!("backup {} not found", backup_id)).await;
            return Ok(());
        }
    };

    let content = backup
        .get("content_base64")
        .and_then(Value::as_str)
        .and_then(|encoded| base64::engine::general_purpose::STANDARD.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default();

    if !is_valid_scp_content(&content) {
        context.finish_failed("backup content is empty or invalid").await;
        return Ok(());
    }

    let shutdown_type = details
        .get("shutdown_type")
        .and_then(Value::as_str)
        .unwrap_or("Graceful");

    let mut results: Vec<Value> = Vec::new();
    let mut failed_count = 0usize;

    for server_id in &server_ids {
        if context.is_cancelled().await {
            context.finish_cancelled().await;
            return Ok(());
        }

        let outcome = import_single_server(state, context, server_id, &content, shutdown_type).await;
        match outcome {
            Ok(()) => results.push(json!({ "server_id": server_id, "success": true })),
            Err(import_fault) => {
                failed_count += 1;
                results.push(json!({
                    "server_id": server_id,
                    "success": false,
                    "error": import_fault,
                }));
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
                "failed_count": failed_count,
                "total": server_ids.len(),
                "results": results,
            }),
        )
        .await;

    Ok(())
}

async fn import_single_server(
    state: &AppState,
    context: &Arc<JobContext>,
    server_id: &str,
    content: &str,
    shutdown_type: &str,
) -> Result<(), String> {
    let server = state
        .servers
        .by_id(server_id)
        .await
        .map_err(|fetch_fault| fetch_fault.to_string())?
        .ok_or_else(|| format!("server not found: {}", server_id))?;

    let resolved = state.resolver.resolve_for_server(&server).await;
    if !resolved.is_usable() {
        return Err("no valid credentials available for server".to_string());
    }

    let session = IdracSession::new(
        &server.ip_address,
        resolved.username.as_deref().unwrap_or_default(),
        resolved.password.as_deref().unwrap_or_default(),
    );
    let correlation =
        Correlation::for_server(server_id).with_job(&context.job_id().to_string());

    let payload = json!({
        "ImportBuffer": content,
        "ShareParameters": { "Target": "ALL" },
        "ShutdownType": shutdown_type,
        "HostPowerState": "On",
    });

    let reply = state
        .idrac
        .import_system_configuration(&session, &payload, &correlation)
        .await
        .map_err(|import_fault| import_fault.to_string())?;

    if reply.status == 202 {
        let Some(location) = reply.location.clone() else {
            return Err("202 accepted without task location".to_string());
        };
        wait_for_scp_task(state, &session, &location, &correlation).await?;
    } else if !(200..300).contains(&reply.status) {
        return Err(format!("import rejected: HTTP {}", reply.status));
    }

    Ok(())
}
