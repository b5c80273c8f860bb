// [libs/domain/models/src/credential.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL DOMAIN CONTRACTS
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: FILAS DE CREDENCIALES Y AJUSTES DE ACTIVIDAD
 * =================================================================
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fila 'credential_sets'. El campo 'password' plano solo existe para
/// los defaults de entorno inyectados en memoria; las filas reales
/// llevan 'password_encrypted'.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialSetRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_encrypted: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    /// Tipo de objetivo: "idrac", "esxi", ...
    #[serde(default)]
    pub credential_type: Option<String>,
    #[serde(default)]
    pub is_default: Option<bool>,
    /// Enlace por-host para credenciales ESXi.
    #[serde(default)]
    pub vcenter_host_id: Option<String>,
}

/// Fila 'credential_ip_ranges' con su set embebido (select=*,credential_sets(*)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialIpRangeRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub ip_range: String,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub credential_sets: Option<CredentialSetRecord>,
}

/// Fila única 'activity_settings': umbrales de ejecución y secretos globales.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivitySettingsRecord {
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub discovery_max_threads: Option<usize>,
    #[serde(default)]
    pub ssh_private_key_encrypted: Option<String>,
    #[serde(default)]
    pub ssh_private_key_path: Option<String>,
    #[serde(default)]
    pub ssh_password_encrypted: Option<String>,
}

/// Resultado de la cadena de resolución de credenciales iDRAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    CredentialSetId,
    ServerSpecific,
    DiscoveredByCredentialSetId,
    IpRange,
    Defaults,
    /// Había material cifrado pero el descifrado falló: señal dura,
    /// la cadena NO continúa.
    DecryptFailed,
    None,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialSetId => "credential_set_id",
            Self::ServerSpecific => "server_specific",
            Self::DiscoveredByCredentialSetId => "discovered_by_credential_set_id",
            Self::IpRange => "ip_range",
            Self::Defaults => "defaults",
            Self::DecryptFailed => "decrypt_failed",
            Self::None => "none",
        }
    }
}

/// Credenciales resueltas para un servidor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub source: CredentialSource,
    pub used_credential_set_id: Option<String>,
}

impl ResolvedCredentials {
    pub fn none() -> Self {
        Self {
            username: None,
            password: None,
            source: CredentialSource::None,
            used_credential_set_id: None,
        }
    }

    pub fn decrypt_failed() -> Self {
        Self {
            username: None,
            password: None,
            source: CredentialSource::DecryptFailed,
            used_credential_set_id: None,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.username.is_some()
            && self.password.is_some()
            && !matches!(
                self.source,
                CredentialSource::DecryptFailed | CredentialSource::None
            )
    }
}

/// Capacidad de descifrado de secretos, inyectada en los adaptadores
/// que leen filas con material cifrado (sesiones vCenter). None =
/// material que no descifra; señal dura para el llamador.
#[async_trait]
pub trait SecretDecryptor: Send + Sync {
    async fn decrypt_secret(&self, encrypted: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_failed_never_carries_credentials() {
        let resolved = ResolvedCredentials::decrypt_failed();
        assert!(resolved.username.is_none());
        assert!(resolved.password.is_none());
        assert!(!resolved.is_usable());
    }

    #[test]
    fn usable_requires_both_halves_and_a_real_source() {
        let mut resolved = ResolvedCredentials {
            username: Some("root".to_string()),
            password: Some("calvin".to_string()),
            source: CredentialSource::IpRange,
            used_credential_set_id: Some("set-1".to_string()),
        };
        assert!(resolved.is_usable());

        resolved.password = None;
        assert!(!resolved.is_usable());
    }

    #[test]
    fn sources_serialize_to_their_wire_names() {
        assert_eq!(CredentialSource::DecryptFailed.as_str(), "decrypt_failed");
        assert_eq!(
            serde_json::to_string(&CredentialSource::DiscoveredByCredentialSetId).unwrap(),
            "\"discovered_by_credential_set_id\""
        );
    }
}

/// Credenciales SSH resueltas para un objetivo ZFS. Exactamente uno de
/// 'key_data' | 'key_path' | 'password' queda poblado.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshCredentials {
    pub hostname: String,
    /// IP del share NFS/ZFS original (puede diferir del host SSH).
    #[serde(default)]
    pub nfs_hostname: Option<String>,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub key_data: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Procedencia del secreto, para auditoría.
    #[serde(default)]
    pub key_source: Option<String>,
}
