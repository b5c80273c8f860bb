// [libs/domain/models/src/task.rs]
//! Sub-pasos visibles de un trabajo. Las tareas informan a la UI y
//! nunca condicionan la corrección a nivel de trabajo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Fila 'job_tasks'.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    #[serde(default)]
    pub server_id: Option<String>,
    pub status: TaskStatus,
    /// Progreso 0–100.
    #[serde(default)]
    pub progress: Option<u8>,
    /// Última línea de registro visible.
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
