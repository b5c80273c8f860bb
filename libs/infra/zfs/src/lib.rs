// [libs/infra/zfs/src/lib.rs]
/*!
 * =================================================================
 * APARATO: ZFS REPLICATION ENGINE
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PRIMITIVAS EJECUTABLES DE REPLICACIÓN
 *
 * # Logic:
 * Todas las primitivas corren por SSH (o ejecución local cuando el
 * ejecutor vive en el propio host ZFS). La tubería de envío corre EN
 * el host de origen: 'zfs send | ssh target zfs receive -Fu'. Un
 * envío incremental contra un dataset inexistente en el target se
 * degrada en silencio a envío completo. El modo stub simula los
 * resultados sin tocar ningún host.
 * =================================================================
 */

pub mod engine;
pub mod error;

pub use engine::{
    ReplicationOutcome, SendSizeEstimate, TargetHealth, VerifyOutcome, ZfsEndpoint, ZfsEngine,
};
pub use error::ZfsError;
