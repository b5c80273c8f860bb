// [libs/domain/maintenance/src/lib.rs]
/*!
 * =================================================================
 * APARATO: MAINTENANCE DOMAIN CORE
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: EVACUACIÓN DE HOSTS SIN I/O
 *
 * # Logic:
 * El monitor consume observaciones muestreadas por el driver (conteo
 * de VMs encendidas, migraciones activas, bandera de mantenimiento) y
 * emite veredictos puros. Dos relojes: el absoluto se extiende mientras
 * haya progreso; el de estancamiento dispara solo sin migraciones
 * activas. La clasificación de bloqueadores opera sobre hechos ya
 * extraídos de cada VM.
 * =================================================================
 */

pub mod blockers;
pub mod monitor;

pub use blockers::{
    analyze_blockers, classify_vm, Blocker, BlockerAnalysis, BlockerSeverity, VmFacts,
};
pub use monitor::{
    is_migration_task, EvacuationMonitor, EvacuationObservation, EvacuationTunables,
    EvacuationVerdict, MigrationActivity, MIGRATION_TASK_PATTERNS,
};
