// [libs/domain/maintenance/src/monitor.rs]
/*!
 * =================================================================
 * APARATO: EVACUATION MONITOR
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: VEREDICTOS DE PROGRESO/ESTANCAMIENTO DE EVACUACIÓN
 *
 * # Logic:
 * Se registra progreso si: (a) el conteo de VMs encendidas bajó,
 * (b) existe al menos una migración activa, o (c) el host entró en
 * mantenimiento. El caso (c) corta a éxito sin importar los relojes.
 * Estancamiento: sin progreso por más de 'stall_timeout' Y sin
 * migraciones activas Y con VMs restantes. El timeout absoluto se
 * extiende mientras el reloj de estancamiento siga dentro de ventana.
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Patrones de nombre de tarea que cuentan como actividad de migración.
pub const MIGRATION_TASK_PATTERNS: [&str; 4] = ["relocate", "migrate", "drs", "vmotion"];

/// Estados de tarea vCenter que cuentan como migración en curso.
pub const ACTIVE_TASK_STATES: [&str; 2] = ["running", "queued"];

/// ¿La tarea (nombre + estado) cuenta como migración activa?
pub fn is_migration_task(task_name: &str, task_state: &str) -> bool {
    let name = task_name.to_lowercase();
    let state = task_state.to_lowercase();
    ACTIVE_TASK_STATES.contains(&state.as_str())
        && MIGRATION_TASK_PATTERNS.iter().any(|pattern| name.contains(pattern))
}

/// Migración activa observada sobre el host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationActivity {
    pub vm_name: String,
    pub task_name: String,
    pub state: String,
    #[serde(default)]
    pub progress: Option<u8>,
}

/// Ajustes del monitor. Valores por defecto del plano de control.
#[derive(Debug, Clone, Copy)]
pub struct EvacuationTunables {
    /// Cadencia de muestreo de VMs y migraciones (30 s).
    pub progress_check_interval: Duration,
    /// Sin progreso durante esta ventana = estancamiento (5 min).
    pub stall_timeout: Duration,
    /// Espera de operador tras un estancamiento recuperable (15 min).
    pub operator_wait_timeout: Duration,
    /// Techo absoluto; se extiende mientras haya progreso (30 min).
    pub absolute_timeout: Duration,
}

impl Default for EvacuationTunables {
    fn default() -> Self {
        Self {
            progress_check_interval: Duration::seconds(30),
            stall_timeout: Duration::seconds(300),
            operator_wait_timeout: Duration::seconds(900),
            absolute_timeout: Duration::seconds(1800),
        }
    }
}

/// Muestra tomada del host en un instante.
#[derive(Debug, Clone)]
pub struct EvacuationObservation {
    pub powered_on_vms: u32,
    pub active_migrations: Vec<MigrationActivity>,
    pub in_maintenance: bool,
}

/// Veredicto puro por observación.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum EvacuationVerdict {
    /// Seguir esperando; incluye el espejo de progreso para la UI.
    Continue {
        vms_remaining: u32,
        vms_evacuated: u32,
        progress_pct: u8,
        active_migrations: usize,
        elapsed_seconds: i64,
        /// true cuando el techo absoluto se extendió por progreso vivo.
        timeout_extended: bool,
    },
    /// El host entró en mantenimiento.
    Success {
        vms_evacuated: u32,
        time_taken_seconds: i64,
    },
    /// Sin progreso dentro de la ventana de estancamiento.
    Stalled {
        vms_remaining: u32,
        vms_evacuated: u32,
        stall_duration_seconds: i64,
        total_elapsed_seconds: i64,
    },
    /// Techo absoluto agotado sin progreso vivo.
    TimedOut {
        vms_remaining: u32,
        vms_evacuated: u32,
        total_elapsed_seconds: i64,
    },
}

/// Monitor de evacuación de doble reloj.
#[derive(Debug, Clone)]
pub struct EvacuationMonitor {
    tunables: EvacuationTunables,
    started_at: DateTime<Utc>,
    vms_before: u32,
    last_vm_count: u32,
    last_progress_time: DateTime<Utc>,
}

impl EvacuationMonitor {
    pub fn new(tunables: EvacuationTunables, vms_before: u32, now: DateTime<Utc>) -> Self {
        Self {
            tunables,
            started_at: now,
            vms_before,
            last_vm_count: vms_before,
            last_progress_time: now,
        }
    }

    pub fn vms_before(&self) -> u32 {
        self.vms_before
    }

    pub fn last_vm_count(&self) -> u32 {
        self.last_vm_count
    }

    /// Procesa una observación y emite el veredicto.
    pub fn observe(
        &mut self,
        now: DateTime<Utc>,
        observation: &EvacuationObservation,
    ) -> EvacuationVerdict {
        let elapsed = now - self.started_at;

        // (c) El host ya está en mantenimiento: éxito inmediato, los
        // contadores de estancamiento dejan de importar.
        if observation.in_maintenance {
            return EvacuationVerdict::Success {
                vms_evacuated: self.vms_before.saturating_sub(observation.powered_on_vms),
                time_taken_seconds: elapsed.num_seconds(),
            };
        }

        let current_vms = observation.powered_on_vms;
        let active_migrations = observation.active_migrations.len();

        // (a) Bajó el conteo de VMs.
        if current_vms < self.last_vm_count {
            self.last_vm_count = current_vms;
            self.last_progress_time = now;
        } else if active_migrations > 0 {
            // (b) El conteo no cambió pero DRS sigue moviendo lotes.
            self.last_progress_time = now;
        }

        let stall_duration = now - self.last_progress_time;
        let stalled_window_exceeded = stall_duration > self.tunables.stall_timeout;

        if stalled_window_exceeded && active_migrations == 0 && self.last_vm_count > 0 {
            return EvacuationVerdict::Stalled {
                vms_remaining: self.last_vm_count,
                vms_evacuated: self.vms_before.saturating_sub(self.last_vm_count),
                stall_duration_seconds: stall_duration.num_seconds(),
                total_elapsed_seconds: elapsed.num_seconds(),
            };
        }

        let mut timeout_extended = false;
        if elapsed > self.tunables.absolute_timeout {
            if stall_duration < self.tunables.stall_timeout && self.last_vm_count > 0 {
                // Progreso vivo: el techo se extiende.
                timeout_extended = true;
            } else {
                return EvacuationVerdict::TimedOut {
                    vms_remaining: self.last_vm_count,
                    vms_evacuated: self.vms_before.saturating_sub(self.last_vm_count),
                    total_elapsed_seconds: elapsed.num_seconds(),
                };
            }
        }

        let vms_evacuated = self.vms_before.saturating_sub(current_vms);
        let progress_pct = if self.vms_before > 0 {
            ((vms_evacuated as f64 / self.vms_before as f64) * 100.0) as u8
        } else {
            100
        };

        EvacuationVerdict::Continue {
            vms_remaining: current_vms,
            vms_evacuated,
            progress_pct,
            active_migrations,
            elapsed_seconds: elapsed.num_seconds(),
            timeout_extended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn migration(vm: &str, state: &str) -> MigrationActivity {
        MigrationActivity {
            vm_name: vm.to_string(),
            task_name: "drm.executevmotionlro".to_string(),
            state: state.to_string(),
            progress: Some(40),
        }
    }

    fn observation(vms: u32, migrations: Vec<MigrationActivity>) -> EvacuationObservation {
        EvacuationObservation {
            powered_on_vms: vms,
            active_migrations: migrations,
            in_maintenance: false,
        }
    }

    #[test]
    fn migration_task_filter_matches_patterns_and_states() {
        assert!(is_migration_task("VirtualMachine.relocate", "running"));
        assert!(is_migration_task("Drm.ExecuteVMotionLRO", "queued"));
        assert!(!is_migration_task("VirtualMachine.relocate", "success"));
        assert!(!is_migration_task("VirtualMachine.powerOn", "running"));
    }

    #[test]
    fn batched_evacuation_with_plateaus_never_stalls() {
        // Escenario: T=0 vms=10; T=30 vms=10 con 2 migraciones; T=60 vms=8;
        // T=90 vms=5 con 1 en cola; T=120 vms=0 y mantenimiento activo.
        let mut monitor = EvacuationMonitor::new(EvacuationTunables::default(), 10, at(0));

        let verdict = monitor.observe(
            at(30),
            &observation(10, vec![migration("vmA", "running"), migration("vmB", "running")]),
        );
        assert!(matches!(verdict, EvacuationVerdict::Continue { .. }));

        let verdict = monitor.observe(at(60), &observation(8, vec![]));
        assert!(matches!(verdict, EvacuationVerdict::Continue { .. }));

        let verdict = monitor.observe(at(90), &observation(5, vec![migration("vmC", "queued")]));
        assert!(matches!(verdict, EvacuationVerdict::Continue { .. }));

        let verdict = monitor.observe(
            at(120),
            &EvacuationObservation {
                powered_on_vms: 0,
                active_migrations: vec![],
                in_maintenance: true,
            },
        );
        match verdict {
            EvacuationVerdict::Success { vms_evacuated, .. } => assert_eq!(vms_evacuated, 10),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn no_activity_past_stall_window_is_stalled_with_full_count() {
        let mut monitor = EvacuationMonitor::new(EvacuationTunables::default(), 3, at(0));

        let verdict = monitor.observe(at(30), &observation(3, vec![]));
        assert!(matches!(verdict, EvacuationVerdict::Continue { .. }));

        let verdict = monitor.observe(at(301), &observation(3, vec![]));
        match verdict {
            EvacuationVerdict::Stalled { vms_remaining, .. } => assert_eq!(vms_remaining, 3),
            other => panic!("expected stall, got {:?}", other),
        }
    }

    #[test]
    fn maintenance_flag_wins_even_after_stall_window() {
        let mut monitor = EvacuationMonitor::new(EvacuationTunables::default(), 4, at(0));
        let _ = monitor.observe(at(30), &observation(4, vec![]));

        let verdict = monitor.observe(
            at(400),
            &EvacuationObservation {
                powered_on_vms: 4,
                active_migrations: vec![],
                in_maintenance: true,
            },
        );
        assert!(matches!(verdict, EvacuationVerdict::Success { .. }));
    }

    #[test]
    fn active_migrations_reset_the_stall_clock() {
        let mut monitor = EvacuationMonitor::new(EvacuationTunables::default(), 6, at(0));

        // Plateau largo, pero siempre con migraciones vivas.
        for step in 1..=12 {
            let verdict = monitor.observe(
                at(step * 60),
                &observation(6, vec![migration("vmA", "running")]),
            );
            assert!(
                matches!(verdict, EvacuationVerdict::Continue { .. }),
                "step {} produced {:?}",
                step,
                verdict
            );
        }
    }

    #[test]
    fn absolute_timeout_extends_only_with_live_progress() {
        let tunables = EvacuationTunables {
            absolute_timeout: Duration::seconds(120),
            ..Default::default()
        };
        let mut monitor = EvacuationMonitor::new(tunables, 5, at(0));

        // Progreso continuo: el techo se extiende.
        let verdict = monitor.observe(at(130), &observation(4, vec![]));
        match verdict {
            EvacuationVerdict::Continue { timeout_extended, .. } => assert!(timeout_extended),
            other => panic!("expected extension, got {:?}", other),
        }

        // Muerto el progreso y agotada la ventana de estancamiento, el
        // veredicto de estancamiento precede al timeout.
        let verdict = monitor.observe(at(460), &observation(4, vec![]));
        assert!(matches!(verdict, EvacuationVerdict::Stalled { .. }));
    }
}
