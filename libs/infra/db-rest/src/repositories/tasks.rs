// [libs/infra/db-rest/src/repositories/tasks.rs]
//! Tabla 'job_tasks': sub-pasos visibles de un trabajo. Consultivos
//! para la UI; sus fallos de escritura se degradan a warning.

use std::sync::Arc;

use chrono::Utc;
use infrasync_domain_models::task::TaskStatus;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::errors::DbError;
use crate::gateway::DsmGateway;

const TASKS_TABLE: &str = "job_tasks";

pub struct TaskRepository {
    gateway: Arc<DsmGateway>,
}

impl TaskRepository {
    pub fn new(gateway: Arc<DsmGateway>) -> Self {
        Self { gateway }
    }

    /// Crea una tarea y devuelve su id, o None si la inserción falla
    /// (las tareas nunca bloquean al trabajo).
    pub async fn create(&self, job_id: Uuid, server_id: Option<&str>) -> Option<String> {
        let mut row = json!({
            "job_id": job_id,
            "status": TaskStatus::Pending.as_str(),
            "progress": 0,
        });
        if let Some(server_id) = server_id {
            row["server_id"] = json!(server_id);
        }

        match self.gateway.insert(TASKS_TABLE, &row, true).await {
            Ok(created) => created
                .as_array()
                .and_then(|rows| rows.first())
                .and_then(|row| row.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(create_fault) => {
                warn!("⚠️ [TASKS]: Task creation swallowed: {}", create_fault);
                None
            }
        }
    }

    /// Actualiza estado/progreso/última línea. Terminal ⇒ 'completed_at'.
    pub async fn update(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: Option<u8>,
        log: Option<&str>,
    ) {
        let mut row = json!({ "status": status.as_str() });
        if let Some(progress) = progress {
            row["progress"] = json!(progress.min(100));
        }
        if let Some(log) = log {
            row["log"] = json!(log);
        }
        if matches!(
            status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        ) {
            row["completed_at"] = json!(Utc::now().to_rfc3339());
        }

        if let Err(update_fault) = self
            .gateway
            .patch(TASKS_TABLE, &[("id", format!("eq.{}", task_id))], &row)
            .await
        {
            warn!("⚠️ [TASKS]: Task update swallowed: {}", update_fault);
        }
    }

    /// Marca como canceladas todas las tareas corriendo de un trabajo,
    /// con una línea terminal de bitácora.
    pub async fn cancel_running(&self, job_id: Uuid, log_line: &str) -> Result<(), DbError> {
        self.gateway
            .patch(
                TASKS_TABLE,
                &[
                    ("job_id", format!("eq.{}", job_id)),
                    ("status", "in.(pending,running)".to_string()),
                ],
                &json!({
                    "status": TaskStatus::Cancelled.as_str(),
                    "log": log_line,
                    "completed_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
    }
}
