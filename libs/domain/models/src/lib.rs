// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN MODELS
 * CLASIFICACIÓN: DOMAIN CONTRACTS (ESTRATO L2)
 * RESPONSABILIDAD: DEFINICIÓN DE CONTRATOS SERDE DEL PLANO DE CONTROL
 *
 * # Logic:
 * Todas las filas que el ejecutor lee o escribe contra el proxy de
 * base de datos viven aquí como structs serde, junto con la taxonomía
 * de estados de trabajo y el contrato de capacidad 'ActivitySink' que
 * consumen los adaptadores de protocolo (iDRAC, vCenter, IDM).
 * =================================================================
 */

pub mod activity;
pub mod credential;
pub mod inventory;
pub mod job;
pub mod replication;
pub mod server;
pub mod task;
pub mod wire;

pub use activity::{ActivityRecord, ActivitySink, OperationType, REDACTED_CREDENTIAL};
pub use job::{JobRecord, JobStatus, JobType, TargetScope};
pub use server::ServerRecord;
pub use task::{TaskRecord, TaskStatus};
