// [libs/infra/idrac/src/error.rs]
//! Catálogo de fallos del adaptador iDRAC. La separación
//! autenticación/conectividad es contrato: las UIs guían distinto.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdracError {
    /// 401/403 del objetivo: credenciales inválidas o expiradas.
    #[error("[L3_IDRAC_AUTH_FAULT]: AUTH_REJECTED by {ip} (HTTP {status})")]
    Auth { ip: String, status: u16 },

    /// TCP/TLS/DNS/timeout: el objetivo no respondió.
    #[error("[L3_IDRAC_NET_FAULT]: UNREACHABLE {ip} -> {detail}")]
    Connectivity { ip: String, detail: String },

    /// Estado HTTP inesperado con respuesta bien formada.
    #[error("[L3_IDRAC_HTTP_FAULT]: HTTP {status} from {ip} -> {detail}")]
    Http {
        ip: String,
        status: u16,
        detail: String,
    },

    /// Respuesta bien formada que viola la expectativa del contrato.
    #[error("[L3_IDRAC_PROTOCOL_FAULT]: {ip} -> {detail}")]
    Protocol { ip: String, detail: String },
}

impl IdracError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}
