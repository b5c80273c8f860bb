// [apps/job-executor/src/lib.rs]
/*!
 * =================================================================
 * APARATO: JOB EXECUTOR LIBRARY ROOT
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: EXPOSICIÓN DE MÓDULOS DEL EJECUTOR
 * =================================================================
 */

pub mod config;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod state;

pub mod prelude {
    pub use crate::config::ExecutorConfig;
    pub use crate::routes::build_router;
    pub use crate::services::scheduler::JobScheduler;
    pub use crate::state::AppState;
}
