// [apps/job-executor/src/services/job_context.rs]
/*!
 * =================================================================
 * APARATO: JOB EXECUTION CONTEXT
 * CLASIFICACIÓN: EXECUTION LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: ESPEJO DE PROGRESO, TAREAS Y CANCELACIÓN
 *
 * # Logic:
 * Un contexto por trabajo en vuelo. El espejo de progreso se fusiona
 * clave a clave sobre la bolsa 'details' para que la UI vea avance al
 * menos cada ~5 s en operaciones largas. La cancelación es
 * cooperativa: los handlers consultan 'is_cancelled' entre sub-pasos
 * y como mínimo antes de cada llamada remota costosa.
 * =================================================================
 */

use std::sync::Arc;

use infrasync_domain_models::job::{JobRecord, JobStatus};
use infrasync_domain_models::task::TaskStatus;
use infrasync_infra_db::repositories::{JobRepository, TaskRepository};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub struct JobContext {
    pub job: JobRecord,
    jobs: Arc<JobRepository>,
    tasks: Arc<TaskRepository>,
    details_mirror: Mutex<Map<String, Value>>,
}

impl JobContext {
    pub fn new(job: JobRecord, jobs: Arc<JobRepository>, tasks: Arc<TaskRepository>) -> Self {
        let seed = job.details.as_object().cloned().unwrap_or_default();
        Self {
            job,
            jobs,
            tasks,
            details_mirror: Mutex::new(seed),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Fusiona claves en la bolsa y la persiste.
    pub async fn update_progress(&self, patch: Value) {
        let snapshot = {
            let mut mirror = self.details_mirror.lock().await;
            if let Some(entries) = patch.as_object() {
                for (key, value) in entries {
                    mirror.insert(key.clone(), value.clone());
                }
            }
            Value::Object(mirror.clone())
        };

        if let Err(progress_fault) = self.jobs.update_details(self.job.id, &snapshot).await {
            warn!("⚠️ [JOB_CONTEXT]: Progress write swallowed: {}", progress_fault);
        }
    }

    /// Bolsa acumulada actual.
    pub async fn details_snapshot(&self) -> Value {
        Value::Object(self.details_mirror.lock().await.clone())
    }

    /// Chequeo cooperativo de cancelación.
    pub async fn is_cancelled(&self) -> bool {
        self.jobs.is_cancelled(self.job.id).await
    }

    /// Cierre por cancelación: marca tareas vivas y la fila terminal.
    pub async fn finish_cancelled(&self) {
        info!("🛑 [JOB_CONTEXT]: Job {} observed cancellation.", self.job.id);
        if let Err(task_fault) = self
            .tasks
            .cancel_running(self.job.id, "Cancelled by user")
            .await
        {
            warn!("⚠️ [JOB_CONTEXT]: Task cancellation sweep failed: {}", task_fault);
        }

        let details = self.details_snapshot().await;
        if let Err(finish_fault) = self
            .jobs
            .finish(self.job.id, JobStatus::Cancelled, &details)
            .await
        {
            warn!("⚠️ [JOB_CONTEXT]: Terminal write failed: {}", finish_fault);
        }
    }

    /// Cierre terminal con fusión final de detalles.
    pub async fn finish(&self, status: JobStatus, final_details: Value) {
        self.update_progress(final_details).await;
        let details = self.details_snapshot().await;
        if let Err(finish_fault) = self.jobs.finish(self.job.id, status, &details).await {
            warn!("⚠️ [JOB_CONTEXT]: Terminal write failed: {}", finish_fault);
        }
    }

    pub async fn finish_failed(&self, error: impl Into<String>) {
        let error = error.into();
        self.finish(JobStatus::Failed, json!({ "error": error })).await;
    }

    /// Alta de una tarea visible para un servidor.
    pub async fn create_task(&self, server_id: Option<&str>) -> Option<String> {
        self.tasks.create(self.job.id, server_id).await
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: Option<u8>,
        log: Option<&str>,
    ) {
        self.tasks.update(task_id, status, progress, log).await;
    }
}
