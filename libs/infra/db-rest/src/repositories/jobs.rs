// [libs/infra/db-rest/src/repositories/jobs.rs]
/*!
 * =================================================================
 * APARATO: JOB QUEUE REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: LA TABLA 'jobs' COMO COLA DE TRABAJO
 *
 * # Logic:
 * El reclamo es consultivo: un PATCH condicionado a
 * 'claimed_by=is.null' con representación. Cero filas devueltas
 * significa que otro ejecutor ganó la fila y el trabajo se salta.
 * Las escrituras a una fila de job las linealiza la base de datos
 * (last-writer-wins por columna).
 * =================================================================
 */

use std::sync::Arc;

use chrono::{DateTime, Utc};
use infrasync_domain_models::job::{JobRecord, JobStatus, JobType};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::DbError;
use crate::gateway::DsmGateway;

const JOBS_TABLE: &str = "jobs";

pub struct JobRepository {
    gateway: Arc<DsmGateway>,
}

impl JobRepository {
    pub fn new(gateway: Arc<DsmGateway>) -> Self {
        Self { gateway }
    }

    /// Trabajos pendientes elegibles: sin 'schedule_at' o ya vencido.
    pub async fn fetch_claimable(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, DbError> {
        self.gateway
            .select_rows(
                JOBS_TABLE,
                &[
                    ("status", "eq.pending".to_string()),
                    (
                        "or",
                        format!("(schedule_at.is.null,schedule_at.lte.{})", now.to_rfc3339()),
                    ),
                    ("order", "created_at.asc".to_string()),
                    ("limit", "10".to_string()),
                ],
            )
            .await
    }

    /// Reclamo consultivo. true = este ejecutor ganó la fila.
    pub async fn claim(&self, job_id: Uuid, executor_identity: &str) -> Result<bool, DbError> {
        let claimed = self
            .gateway
            .patch_returning(
                JOBS_TABLE,
                &[
                    ("id", format!("eq.{}", job_id)),
                    ("status", "eq.pending".to_string()),
                    ("claimed_by", "is.null".to_string()),
                ],
                &json!({
                    "claimed_by": executor_identity,
                    "claimed_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        if claimed.is_empty() {
            debug!("[JOB_QUEUE]: Job {} already claimed elsewhere.", job_id);
            Ok(false)
        } else {
            info!("🎫 [JOB_QUEUE]: Job {} claimed by {}.", job_id, executor_identity);
            Ok(true)
        }
    }

    /// pending → running con 'started_at'.
    pub async fn mark_running(&self, job_id: Uuid) -> Result<(), DbError> {
        self.gateway
            .patch(
                JOBS_TABLE,
                &[("id", format!("eq.{}", job_id))],
                &json!({
                    "status": JobStatus::Running.as_str(),
                    "started_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
    }

    /// Actualiza la bolsa de progreso sin tocar el estado.
    pub async fn update_details(&self, job_id: Uuid, details: &Value) -> Result<(), DbError> {
        self.gateway
            .patch(
                JOBS_TABLE,
                &[("id", format!("eq.{}", job_id))],
                &json!({ "details": details }),
            )
            .await
    }

    /// Escribe la fila terminal con 'completed_at'.
    pub async fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        details: &Value,
    ) -> Result<(), DbError> {
        if !status.is_terminal() {
            return Err(DbError::MappingError(format!(
                "non-terminal status {} on finish",
                status.as_str()
            )));
        }

        self.gateway
            .patch(
                JOBS_TABLE,
                &[("id", format!("eq.{}", job_id))],
                &json!({
                    "status": status.as_str(),
                    "completed_at": Utc::now().to_rfc3339(),
                    "details": details,
                }),
            )
            .await
    }

    /// Chequeo cooperativo de cancelación: ¿la fila transicionó a
    /// 'cancelled' externamente?
    pub async fn is_cancelled(&self, job_id: Uuid) -> bool {
        let rows: Result<Vec<Value>, _> = self
            .gateway
            .select_rows(
                JOBS_TABLE,
                &[
                    ("id", format!("eq.{}", job_id)),
                    ("select", "status".to_string()),
                ],
            )
            .await;

        match rows {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.get("status"))
                .and_then(Value::as_str)
                .map(|status| status == "cancelled")
                .unwrap_or(false),
            Err(check_fault) => {
                warn!("⚠️ [JOB_QUEUE]: Cancellation check failed: {}", check_fault);
                false
            }
        }
    }

    /// Inserta un trabajo nuevo (auto-reprogramación incluida).
    pub async fn insert(
        &self,
        job_type: JobType,
        target_scope: &Value,
        details: &Value,
        schedule_at: Option<DateTime<Utc>>,
        credential_set_ids: Option<&[String]>,
    ) -> Result<Option<Uuid>, DbError> {
        let mut row = json!({
            "job_type": job_type.as_str(),
            "status": JobStatus::Pending.as_str(),
            "target_scope": target_scope,
            "details": details,
            "created_at": Utc::now().to_rfc3339(),
        });

        if let Some(schedule_at) = schedule_at {
            row["schedule_at"] = json!(schedule_at.to_rfc3339());
        }
        if let Some(ids) = credential_set_ids {
            row["credential_set_ids"] = json!(ids);
        }

        let created = self.gateway.insert(JOBS_TABLE, &row, true).await?;
        Ok(created
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("id"))
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok()))
    }

    pub async fn job_by_id(&self, job_id: Uuid) -> Result<Option<JobRecord>, DbError> {
        let rows: Vec<JobRecord> = self
            .gateway
            .select_rows(JOBS_TABLE, &[("id", format!("eq.{}", job_id))])
            .await?;
        Ok(rows.into_iter().next())
    }
}
