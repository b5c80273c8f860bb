// [apps/job-executor/src/services/scheduler.rs]
/*!
 * =================================================================
 * APARATO: JOB SCHEDULER
 * CLASIFICACIÓN: EXECUTION LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: SONDEO DE LA COLA, RECLAMO Y DESPACHO POR TIPO
 *
 * # Logic:
 * Un solo bucle de sondeo; los handlers corren en tareas de Tokio
 * acotadas por un semáforo. Cada fila elegible se reclama con el
 * parche consultivo ('claimed_by' condicionado a nulo) para que
 * múltiples procesos ejecutores coexistan sin pisarse. El handler es
 * dueño único de su fila: transición a running, progreso y fila
 * terminal son responsabilidad suya vía el JobContext.
 * =================================================================
 */

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use infrasync_domain_models::job::{JobStatus, JobType};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::services::job_context::JobContext;
use crate::services::{discovery, inventory, maintenance, replication, scp};
use crate::state::AppState;

pub struct JobScheduler {
    state: AppState,
    worker_permits: Arc<Semaphore>,
}

impl JobScheduler {
    pub fn new(state: AppState) -> Self {
        let worker_permits = Arc::new(Semaphore::new(state.config.max_parallel_jobs));
        Self {
            state,
            worker_permits,
        }
    }

    /// Bucle perpetuo de sondeo. Se lanza con tokio::spawn desde la
    /// ignición y convive con el servidor HTTP.
    pub async fn run(self) {
        let poll_interval = Duration::from_secs(self.state.config.poll_interval_seconds);
        info!(
            "🛰️ [SCHEDULER]: Queue polling started (every {:?}, {} parallel slots).",
            poll_interval, self.state.config.max_parallel_jobs
        );

        loop {
            match self.state.jobs.fetch_claimable(Utc::now()).await {
                Err(poll_fault) => {
                    warn!("⚠️ [SCHEDULER]: Queue poll failed: {}", poll_fault);
                }
                Ok(pending_jobs) => {
                    for job in pending_jobs {
                        let claim = self
                            .state
                            .jobs
                            .claim(job.id, &self.state.config.executor_identity)
                            .await;

                        match claim {
                            Ok(true) => self.dispatch(job).await,
                            Ok(false) => {}
                            Err(claim_fault) => {
                                warn!("⚠️ [SCHEDULER]: Claim on {} failed: {}", job.id, claim_fault)
                            }
                        }
                    }
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Despacha un trabajo reclamado a su handler en un worker.
    async fn dispatch(&self, job: infrasync_domain_models::job::JobRecord) {
        let permit = match self.worker_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let state = self.state.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let job_id = job.id;
            let job_type = job.job_type;

            info!("🚀 [SCHEDULER]: Job {} ({}) dispatched.", job_id, job_type.as_str());

            if let Err(running_fault) = state.jobs.mark_running(job_id).await {
                error!(
                    "❌ [SCHEDULER]: Could not mark {} running: {}",
                    job_id, running_fault
                );
                return;
            }

            let context = Arc::new(JobContext::new(job, state.jobs.clone(), state.tasks.clone()));

            let outcome = match job_type {
                JobType::DiscoveryScan => discovery::execute_discovery_scan(&state, &context).await,
                JobType::TestCredentials => discovery::execute_test_credentials(&state, &context).await,
                JobType::HealthCheck => discovery::execute_health_check(&state, &context).await,
                JobType::FetchEventLogs => discovery::execute_fetch_event_logs(&state, &context).await,
                JobType::VcenterSync => inventory::execute_vcenter_sync(&state, &context).await,
                JobType::EnterMaintenance => maintenance::execute_enter_maintenance(&state, &context).await,
                JobType::ExitMaintenance => maintenance::execute_exit_maintenance(&state, &context).await,
                JobType::ScpExport => scp::execute_scp_export(&state, &context).await,
                JobType::ScpImport => scp::execute_scp_import(&state, &context).await,
                JobType::ReplicationRun => replication::execute_replication_run(&state, &context).await,
            };

            // Red de seguridad: un handler que escapa con error y dejó
            // la fila sin estado terminal la marca como fallida.
            if let Err(handler_fault) = outcome {
                error!("❌ [SCHEDULER]: Job {} handler failed: {}", job_id, handler_fault);
                if let Ok(Some(row)) = state.jobs.job_by_id(job_id).await {
                    if !row.status.is_terminal() {
                        context.finish_failed(handler_fault.to_string()).await;
                    }
                }
            } else {
                // Invariante del contrato: el handler dejó exactamente
                // un estado terminal.
                if let Ok(Some(row)) = state.jobs.job_by_id(job_id).await {
                    if !row.status.is_terminal() {
                        warn!(
                            "⚠️ [SCHEDULER]: Job {} returned without terminal state, forcing failed.",
                            job_id
                        );
                        context
                            .finish(JobStatus::Failed, serde_json::json!({
                                "error": "handler returned without terminal state"
                            }))
                            .await;
                    }
                }
            }
        });
    }
}
