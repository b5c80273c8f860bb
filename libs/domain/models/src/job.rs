// [libs/domain/models/src/job.rs]
/*!
 * =================================================================
 * APARATO: JOB DOMAIN CONTRACTS
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: CICLO DE VIDA DEL TRABAJO Y SU ESPEJO DE PROGRESO
 *
 * # Logic:
 * Un Job es una fila-cola: 'pending' → 'running' → terminal. Las
 * transiciones son monótonas; un estado terminal nunca vuelve a
 * ejecutarse. 'schedule_at' habilita los trabajos auto-reprogramados
 * (sincronización periódica de vCenter).
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Estado de ciclo de vida de un trabajo. Terminal = completed | failed | cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

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

/// Tipos de trabajo despachables por el planificador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DiscoveryScan,
    TestCredentials,
    HealthCheck,
    FetchEventLogs,
    VcenterSync,
    EnterMaintenance,
    ExitMaintenance,
    ScpExport,
    ScpImport,
    ReplicationRun,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiscoveryScan => "discovery_scan",
            Self::TestCredentials => "test_credentials",
            Self::HealthCheck => "health_check",
            Self::FetchEventLogs => "fetch_event_logs",
            Self::VcenterSync => "vcenter_sync",
            Self::EnterMaintenance => "enter_maintenance",
            Self::ExitMaintenance => "exit_maintenance",
            Self::ScpExport => "scp_export",
            Self::ScpImport => "scp_import",
            Self::ReplicationRun => "replication_run",
        }
    }
}

/// Alcance de objetivos de un trabajo. Los campos son opcionales porque
/// cada tipo de trabajo consume un subconjunto distinto.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcenter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_group_id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub scope_type: Option<String>,
}

/// Fila 'jobs' tal como la entrega el proxy de base de datos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(default)]
    pub target_scope: Value,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub credential_set_ids: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub schedule_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Decodifica el alcance estructurado desde la bolsa cruda.
    pub fn scope(&self) -> TargetScope {
        serde_json::from_value(self.target_scope.clone()).unwrap_or_default()
    }

    /// Identificadores de sets de credenciales, vacío si no hay.
    pub fn credential_sets(&self) -> Vec<String> {
        self.credential_set_ids.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_exactly_three() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn job_type_round_trips_snake_case() {
        let encoded = serde_json::to_string(&JobType::DiscoveryScan).unwrap();
        assert_eq!(encoded, "\"discovery_scan\"");
        let decoded: JobType = serde_json::from_str("\"enter_maintenance\"").unwrap();
        assert_eq!(decoded, JobType::EnterMaintenance);
    }

    #[test]
    fn scope_tolerates_unknown_payloads() {
        let row = JobRecord {
            id: Uuid::new_v4(),
            job_type: JobType::HealthCheck,
            status: JobStatus::Pending,
            target_scope: serde_json::json!({"unexpected": true}),
            details: Value::Null,
            credential_set_ids: None,
            created_at: None,
            started_at: None,
            completed_at: None,
            schedule_at: None,
            claimed_by: None,
            claimed_at: None,
        };
        assert!(row.scope().server_ids.is_none());
    }
}
