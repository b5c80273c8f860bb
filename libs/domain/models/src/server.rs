// [libs/domain/models/src/server.rs]
//! Fila 'servers': un iDRAC descubierto o registrado manualmente.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub ip_address: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub service_tag: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Set explícito asignado por el operador (prioridad 1 de resolución).
    #[serde(default)]
    pub credential_set_id: Option<String>,
    /// Set que autenticó al servidor durante el descubrimiento (prioridad 3).
    #[serde(default)]
    pub discovered_by_credential_set_id: Option<String>,
    /// Credenciales inline por-servidor (prioridad 2).
    #[serde(default)]
    pub idrac_username: Option<String>,
    #[serde(default)]
    pub idrac_password_encrypted: Option<String>,
    /// Enlace bidireccional hacia 'vcenter_hosts'.
    #[serde(default)]
    pub vcenter_host_id: Option<String>,
}
