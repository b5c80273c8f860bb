// [libs/domain/maintenance/src/blockers.rs]
/*!
 * =================================================================
 * APARATO: EVACUATION BLOCKER CLASSIFIER
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: DIAGNÓSTICO DE VMS QUE IMPIDEN EL MANTENIMIENTO
 *
 * # Logic:
 * Opera sobre hechos ya extraídos por el driver de vCenter. Solo las
 * VMs encendidas se analizan (son las que deben migrar). Una vCSA
 * (nombre vcsa|vcenter|vcs o guest OS photon) es crítica: gestiona el
 * propio vMotion y no puede auto-migrarse.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Patrones de nombre que identifican una vCSA.
const VCSA_PATTERNS: [&str; 3] = ["vcsa", "vcenter", "vcs"];

/// Infraestructura crítica no-vCSA: migrable pero con cuidado.
const CRITICAL_INFRA_PATTERNS: [&str; 7] =
    ["nsx", "vra", "vrops", "vrealize", "vrni", "log-insight", "srm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerSeverity {
    Critical,
    Warning,
}

/// Hechos de una VM, extraídos por el driver desde el inventario.
#[derive(Debug, Clone, Default)]
pub struct VmFacts {
    pub name: String,
    pub guest_os: String,
    pub powered_on: bool,
    pub uses_local_storage: bool,
    pub has_passthrough: bool,
    pub has_client_connected_media: bool,
    pub has_cpu_affinity: bool,
    pub anti_affinity_blocked: bool,
    pub insufficient_headroom: bool,
}

impl VmFacts {
    pub fn is_vcsa(&self) -> bool {
        let name = self.name.to_lowercase();
        VCSA_PATTERNS.iter().any(|pattern| name.contains(pattern))
            || self.guest_os.to_lowercase().contains("photon")
    }

    fn is_critical_infra(&self) -> bool {
        let name = self.name.to_lowercase();
        CRITICAL_INFRA_PATTERNS.iter().any(|pattern| name.contains(pattern))
    }

    /// Razón corta para el payload de estancamiento.
    pub fn stall_reason(&self) -> &'static str {
        if self.is_vcsa() {
            "vcsa"
        } else if self.uses_local_storage {
            "local_storage"
        } else if self.has_passthrough {
            "passthrough"
        } else if self.has_cpu_affinity {
            "affinity"
        } else if self.anti_affinity_blocked {
            "anti_affinity"
        } else if self.insufficient_headroom {
            "insufficient_headroom"
        } else {
            "drs_no_destination"
        }
    }
}

/// Bloqueador diagnosticado sobre una VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocker {
    pub vm_name: String,
    pub reason: String,
    pub severity: BlockerSeverity,
    pub details: String,
    pub remediation: String,
    pub auto_fixable: bool,
}

/// Resultado agregado del análisis previo al mantenimiento.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockerAnalysis {
    pub can_enter_maintenance: bool,
    pub blockers: Vec<Blocker>,
    pub warnings: Vec<String>,
    pub total_powered_on_vms: u32,
    pub migratable_vms: u32,
    pub blocked_vms: u32,
    /// Estimación burda: 30 s por VM migrable.
    pub estimated_evacuation_seconds: u64,
}

fn blocker(
    facts: &VmFacts,
    reason: &str,
    severity: BlockerSeverity,
    details: &str,
    remediation: &str,
    auto_fixable: bool,
) -> Blocker {
    Blocker {
        vm_name: facts.name.clone(),
        reason: reason.to_string(),
        severity,
        details: details.to_string(),
        remediation: remediation.to_string(),
        auto_fixable,
    }
}

/// Clasifica una sola VM encendida.
pub fn classify_vm(facts: &VmFacts) -> Vec<Blocker> {
    let mut found = Vec::new();

    if facts.is_vcsa() {
        found.push(blocker(
            facts,
            "vcsa",
            BlockerSeverity::Critical,
            "vCenter Server Appliance - manages vMotion, cannot self-migrate",
            "Manually migrate the VCSA to another host before maintenance, or update this host last",
            false,
        ));
    } else if facts.is_critical_infra() {
        found.push(blocker(
            facts,
            "critical_infra",
            BlockerSeverity::Warning,
            "Critical infrastructure VM - ensure safe to migrate",
            "Verify this VM can migrate safely; consider manual migration first",
            false,
        ));
    }

    if facts.uses_local_storage {
        found.push(blocker(
            facts,
            "local_storage",
            BlockerSeverity::Critical,
            "VM uses local storage - cannot vMotion",
            "Power off this VM, or migrate storage to a shared datastore first",
            false,
        ));
    }

    if facts.has_passthrough {
        found.push(blocker(
            facts,
            "passthrough",
            BlockerSeverity::Critical,
            "VM has passthrough devices (USB/PCI) - cannot vMotion",
            "Remove passthrough devices or power off this VM",
            false,
        ));
    }

    if facts.has_client_connected_media {
        found.push(blocker(
            facts,
            "connected_media",
            BlockerSeverity::Warning,
            "VM has client-connected CD/DVD - may block vMotion",
            "Disconnect the CD/DVD from the VM console",
            true,
        ));
    }

    if facts.has_cpu_affinity {
        found.push(blocker(
            facts,
            "affinity",
            BlockerSeverity::Warning,
            "VM has CPU/memory affinity rules - may restrict migration",
            "Remove affinity rules or acknowledge that migration may fail",
            false,
        ));
    }

    if facts.anti_affinity_blocked {
        found.push(blocker(
            facts,
            "anti_affinity",
            BlockerSeverity::Critical,
            "DRS anti-affinity rules block every remaining host",
            "Relax the anti-affinity rule or free a compatible host",
            false,
        ));
    }

    if facts.insufficient_headroom {
        found.push(blocker(
            facts,
            "insufficient_headroom",
            BlockerSeverity::Warning,
            "Cluster may lack CPU/memory headroom for this VM",
            "Free capacity in the cluster or migrate workloads first",
            false,
        ));
    }

    found
}

/// Analiza todas las VMs del host. Solo las encendidas cuentan.
pub fn analyze_blockers(vms: &[VmFacts]) -> BlockerAnalysis {
    let mut analysis = BlockerAnalysis {
        can_enter_maintenance: true,
        ..Default::default()
    };

    for facts in vms.iter().filter(|facts| facts.powered_on) {
        analysis.total_powered_on_vms += 1;

        let vm_blockers = classify_vm(facts);
        if vm_blockers.is_empty() {
            analysis.migratable_vms += 1;
        } else {
            analysis.blocked_vms += 1;
            if vm_blockers
                .iter()
                .any(|entry| entry.severity == BlockerSeverity::Critical)
            {
                analysis.can_enter_maintenance = false;
            }
            analysis.blockers.extend(vm_blockers);
        }
    }

    analysis.estimated_evacuation_seconds = analysis.migratable_vms as u64 * 30;

    let critical_count = analysis
        .blockers
        .iter()
        .filter(|entry| entry.severity == BlockerSeverity::Critical)
        .count();
    if critical_count > 0 {
        analysis.warnings.push(format!(
            "{} VM(s) have critical issues that will block maintenance mode",
            critical_count
        ));
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered_on(name: &str) -> VmFacts {
        VmFacts {
            name: name.to_string(),
            powered_on: true,
            ..Default::default()
        }
    }

    #[test]
    fn photon_guest_marks_vcsa_even_without_name_hint() {
        let facts = VmFacts {
            name: "vc-prd-01".to_string(),
            guest_os: "VMware Photon OS (64-bit)".to_string(),
            powered_on: true,
            ..Default::default()
        };
        assert!(facts.is_vcsa());
        assert_eq!(facts.stall_reason(), "vcsa");

        let analysis = analyze_blockers(&[facts]);
        assert!(!analysis.can_enter_maintenance);
        assert_eq!(analysis.blockers[0].reason, "vcsa");
    }

    #[test]
    fn clean_vms_are_migratable() {
        let analysis = analyze_blockers(&[powered_on("web-01"), powered_on("web-02")]);
        assert!(analysis.can_enter_maintenance);
        assert_eq!(analysis.migratable_vms, 2);
        assert_eq!(analysis.blocked_vms, 0);
        assert_eq!(analysis.estimated_evacuation_seconds, 60);
    }

    #[test]
    fn powered_off_vms_are_ignored() {
        let mut off = powered_on("db-01");
        off.powered_on = false;
        let analysis = analyze_blockers(&[off]);
        assert_eq!(analysis.total_powered_on_vms, 0);
    }

    #[test]
    fn local_storage_is_critical_and_media_is_auto_fixable() {
        let mut facts = powered_on("app-01");
        facts.uses_local_storage = true;
        facts.has_client_connected_media = true;

        let blockers = classify_vm(&facts);
        assert_eq!(blockers.len(), 2);
        assert_eq!(blockers[0].reason, "local_storage");
        assert_eq!(blockers[0].severity, BlockerSeverity::Critical);
        assert!(blockers[1].auto_fixable);
    }

    #[test]
    fn critical_infra_is_warning_only() {
        let analysis = analyze_blockers(&[powered_on("nsx-manager-01")]);
        assert!(analysis.can_enter_maintenance);
        assert_eq!(analysis.blockers[0].severity, BlockerSeverity::Warning);
    }
}
