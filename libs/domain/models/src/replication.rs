// [libs/domain/models/src/replication.rs]
/*!
 * =================================================================
 * APARATO: REPLICATION DOMAIN CONTRACTS
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: FILAS DE LA CAPA DE DR (TARGETS, GRUPOS, VMS, JOBS)
 *
 * # Logic:
 * Un target nombra un pool ZFS remoto alcanzable por SSH; un grupo de
 * protección enlaza un target con un conjunto de VMs y un horario; una
 * protected_vm rastrea el último snapshot replicado, su datastore actual
 * y si la shell-VM de DR ya fue materializada. Los snapshots de
 * replicación forman una cadena ordenada por dataset y el último usado
 * en el target es la base incremental canónica.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fila 'replication_targets'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationTargetRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub ssh_username: Option<String>,
    #[serde(default)]
    pub ssh_key_encrypted: Option<String>,
    #[serde(default)]
    pub ssh_key_id: Option<String>,
    /// VM de vCenter que hospeda el appliance ZFS (se prefiere su IP para SSH).
    #[serde(default)]
    pub hosting_vm_id: Option<String>,
    #[serde(default)]
    pub hosting_vm_name: Option<String>,
    #[serde(default)]
    pub source_template_id: Option<String>,
    #[serde(default)]
    pub zfs_pool: Option<String>,
    #[serde(default)]
    pub dr_vcenter_id: Option<String>,
    #[serde(default)]
    pub datastore_name: Option<String>,
}

/// Fila 'protection_groups'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtectionGroupRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    /// Target que actúa como lado A (appliance ZFS de origen). Ausente
    /// cuando el ejecutor corre sobre el propio host ZFS de origen.
    #[serde(default)]
    pub source_target_id: Option<String>,
    /// Prefijo del dataset de origen ("vmfs" por convención).
    #[serde(default)]
    pub source_dataset_prefix: Option<String>,
    #[serde(default)]
    pub schedule_minutes: Option<u64>,
    #[serde(default)]
    pub last_replication_at: Option<DateTime<Utc>>,
}

/// Fila 'protected_vms'. Pertenece exactamente a un grupo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtectedVmRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub protection_group_id: Option<String>,
    #[serde(default)]
    pub vm_name: Option<String>,
    #[serde(default)]
    pub vcenter_vm_id: Option<String>,
    /// Último snapshot replicado con éxito (base incremental preferente).
    #[serde(default)]
    pub last_snapshot: Option<String>,
    #[serde(default)]
    pub current_datastore: Option<String>,
    #[serde(default)]
    pub dr_shell_created: Option<bool>,
    #[serde(default)]
    pub replication_status: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub last_replication_at: Option<DateTime<Utc>>,
}

/// Fila 'replication_jobs': bitácora por corrida y por VM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationJobRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub protection_group_id: Option<String>,
    #[serde(default)]
    pub protected_vm_id: Option<String>,
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub bytes_transferred: Option<u64>,
    #[serde(default)]
    pub source_snapshot: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// Fila 'ssh_keys'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshKeyRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub private_key_encrypted: Option<String>,
    /// active | pending | deployed | retired
    #[serde(default)]
    pub status: Option<String>,
}

/// Fila 'ssh_key_deployments'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshKeyDeploymentRecord {
    #[serde(default)]
    pub ssh_key_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub replication_target_id: Option<String>,
    #[serde(default)]
    pub hosting_vm_id: Option<String>,
}

/// Fila 'zfs_target_templates': plantilla de appliance con su llave SSH.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZfsTargetTemplateRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Nombre de la VM plantilla en vCenter.
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub vcenter_id: Option<String>,
    #[serde(default)]
    pub ssh_key_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Snapshot ZFS listado desde 'zfs list -t snapshot'.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Nombre corto (tras '@').
    pub name: String,
    /// 'pool/dataset@nombre'.
    pub full_name: String,
    pub created_at: String,
    pub used_bytes: u64,
    pub referenced_bytes: u64,
}
