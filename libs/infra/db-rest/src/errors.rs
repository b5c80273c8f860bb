// [libs/infra/db-rest/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 * =================================================================
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Fallo de red o TLS hacia el proxy de base de datos.
    #[error("[L3_DSM_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Variables de entorno vacías o malformadas.
    #[error("[L3_DSM_CONFIG_FAULT]: STRATEGIC_ENV_VOID -> {0}")]
    ConfigurationError(String),

    /// El proxy rechazó la credencial de rol de servicio (401/403).
    #[error("[L3_DSM_AUTH_FAULT]: SERVICE_ROLE_REJECTED while {0}")]
    ServiceAuthRejected(String),

    /// El proxy devolvió un estado inesperado.
    #[error("[L3_DSM_QUERY_FAULT]: HTTP {status} on {table} -> {detail}")]
    QueryRejected {
        table: String,
        status: u16,
        detail: String,
    },

    /// Transformación de tipos fila ↔ dominio fallida.
    #[error("[L3_DSM_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// La función remota de descifrado devolvió nulo o falló.
    #[error("[L3_DSM_CRYPTO_FAULT]: DECRYPT_REJECTED")]
    DecryptFailed,

    /// No hay llave de cifrado disponible en 'activity_settings'.
    #[error("[L3_DSM_CRYPTO_FAULT]: ENCRYPTION_KEY_UNAVAILABLE")]
    EncryptionKeyUnavailable,

    /// La fila solicitada no existe.
    #[error("[L3_DSM_FAULT]: ROW_NOT_FOUND in {0}")]
    RowNotFound(String),
}

impl DbError {
    pub fn from_reqwest(table: &str, fault: reqwest::Error) -> Self {
        if fault.is_timeout() || fault.is_connect() {
            Self::ConnectionError(format!("{}: {}", table, fault))
        } else {
            Self::QueryRejected {
                table: table.to_string(),
                status: fault.status().map(|status| status.as_u16()).unwrap_or(0),
                detail: fault.to_string(),
            }
        }
    }
}
