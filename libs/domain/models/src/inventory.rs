// [libs/domain/models/src/inventory.rs]
/*!
 * =================================================================
 * APARATO: VCENTER INVENTORY CONTRACTS
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: FILAS DERIVADAS DEL INVENTARIO VCENTER
 *
 * # Logic:
 * Cada fila lleva el id de objeto gestionado del proveedor ('vcenter_id')
 * y un id local estable; los upserts se apoyan en el id gestionado
 * acotado por el vCenter de origen ('source_vcenter_id').
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Fila 'vcenter_settings': un vCenter registrado.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcenterSettingsRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_encrypted: Option<String>,
    #[serde(default)]
    pub verify_ssl: Option<bool>,
    #[serde(default)]
    pub sync_interval_minutes: Option<u64>,
}

/// Fila 'vcenter_clusters'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcenterClusterRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// Id de objeto gestionado del proveedor.
    pub vcenter_id: String,
    pub source_vcenter_id: String,
    #[serde(default)]
    pub host_count: Option<u32>,
    #[serde(default)]
    pub drs_enabled: Option<bool>,
    #[serde(default)]
    pub ha_enabled: Option<bool>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// Fila 'vcenter_hosts'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcenterHostRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub vcenter_id: String,
    pub source_vcenter_id: String,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    /// online | offline | unreachable | unknown
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub maintenance_mode: Option<bool>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// Fila 'vcenter_vms'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcenterVmRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub vcenter_id: String,
    pub source_vcenter_id: String,
    #[serde(default)]
    pub power_state: Option<String>,
    #[serde(default)]
    pub guest_os: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub datastores: Option<Vec<String>>,
    #[serde(default)]
    pub cpu_count: Option<u32>,
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// Fila 'vcenter_datastores'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcenterDatastoreRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub vcenter_id: String,
    pub source_vcenter_id: String,
    #[serde(default, rename = "type")]
    pub datastore_type: Option<String>,
    #[serde(default)]
    pub capacity_bytes: Option<u64>,
    #[serde(default)]
    pub free_bytes: Option<u64>,
    #[serde(default)]
    pub accessible: Option<bool>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// Fila 'vcenter_networks' (estándar + portgroup distribuido).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcenterNetworkRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub vcenter_id: String,
    pub source_vcenter_id: String,
    /// StandardNetwork | DistributedVirtualPortgroup
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub vlan_id: Option<i32>,
    #[serde(default)]
    pub vlan_type: Option<String>,
    #[serde(default)]
    pub vlan_range: Option<String>,
    #[serde(default)]
    pub parent_switch_name: Option<String>,
    #[serde(default)]
    pub parent_switch_id: Option<String>,
    #[serde(default)]
    pub uplink_port_group: Option<bool>,
    #[serde(default)]
    pub accessible: Option<bool>,
    #[serde(default)]
    pub host_count: Option<u32>,
    #[serde(default)]
    pub vm_count: Option<u32>,
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// Mapea el estado de conexión del proveedor al estado local del host.
pub fn host_status_from_connection_state(connection_state: &str) -> &'static str {
    let normalized = connection_state.to_lowercase();
    if normalized.contains("notresponding") {
        "unreachable"
    } else if normalized.contains("disconnected") {
        "offline"
    } else if normalized.contains("connected") {
        "online"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_mapping_covers_vendor_values() {
        assert_eq!(host_status_from_connection_state("CONNECTED"), "online");
        assert_eq!(host_status_from_connection_state("disconnected"), "offline");
        assert_eq!(host_status_from_connection_state("notResponding"), "unreachable");
        assert_eq!(host_status_from_connection_state("weird"), "unknown");
    }
}
