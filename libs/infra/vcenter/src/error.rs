// [libs/infra/vcenter/src/error.rs]
//! Catálogo de fallos vCenter. 'SessionExpired' es recuperable: el
//! sitio de llamada reintenta hasta 2 veces vía 'ensure_session'.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcError {
    /// Credenciales rechazadas en el login.
    #[error("[L3_VC_AUTH_FAULT]: LOGIN_REJECTED by {0}")]
    Auth(String),

    /// La sesión cacheada dejó de ser válida (NotAuthenticated).
    #[error("[L3_VC_SESSION_FAULT]: SESSION_EXPIRED on {0}")]
    SessionExpired(String),

    /// TCP/TLS/DNS/timeout hacia el vCenter.
    #[error("[L3_VC_NET_FAULT]: UNREACHABLE {host} -> {detail}")]
    Connectivity { host: String, detail: String },

    /// Estado HTTP inesperado.
    #[error("[L3_VC_HTTP_FAULT]: HTTP {status} from {host} -> {detail}")]
    Http {
        host: String,
        status: u16,
        detail: String,
    },

    /// Respuesta bien formada que viola el contrato esperado.
    #[error("[L3_VC_PROTOCOL_FAULT]: {0}")]
    Protocol(String),

    /// El material cifrado de la fila de settings no descifra.
    #[error("[L3_VC_CRYPTO_FAULT]: VCENTER_PASSWORD_DECRYPT_FAILED")]
    DecryptFailed,

    /// Fila de settings incompleta.
    #[error("[L3_VC_CONFIG_FAULT]: {0}")]
    Configuration(String),

    /// Tarea del proveedor terminó en error.
    #[error("[L3_VC_TASK_FAULT]: {0}")]
    TaskFailed(String),

    /// Tarea del proveedor no terminó dentro del presupuesto.
    #[error("[L3_VC_TASK_FAULT]: TASK_TIMEOUT after {0}s")]
    TaskTimeout(u64),
}

impl VcError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}
