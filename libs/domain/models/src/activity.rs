// [libs/domain/models/src/activity.rs]
/*!
 * =================================================================
 * APARATO: ACTIVITY TRAIL CONTRACTS
 * CLASIFICACIÓN: DOMAIN CAPABILITY (ESTRATO L2)
 * RESPONSABILIDAD: RASTRO FORENSE DE LLAMADAS EXTERNAS
 *
 * # Logic:
 * Una fila por llamada externa observable (iDRAC, vCenter, IDM). Los
 * adaptadores de protocolo dependen del contrato 'ActivitySink', no de
 * la crate de persistencia; los fallos de registro se tragan en la
 * implementación y jamás se propagan al llamador.
 * =================================================================
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marcador que los emisores colocan en lugar de credenciales crudas.
pub const REDACTED_CREDENTIAL: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    IdracApi,
    VcenterApi,
    IdmApi,
    VcenterSync,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdracApi => "idrac_api",
            Self::VcenterApi => "vcenter_api",
            Self::IdmApi => "idm_api",
            Self::VcenterSync => "vcenter_sync",
        }
    }
}

/// Fila 'idrac_commands'.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub endpoint: String,
    pub command_type: String,
    #[serde(default)]
    pub full_url: Option<String>,
    #[serde(default)]
    pub request_headers: Option<Value>,
    #[serde(default)]
    pub request_body: Option<Value>,
    #[serde(default)]
    pub response_body: Option<Value>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    pub operation_type: OperationType,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
}

impl ActivityRecord {
    /// Registro mínimo para una operación nombrada (estilo vCenter).
    pub fn operation(
        operation: &str,
        endpoint: &str,
        operation_type: OperationType,
        success: bool,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            command_type: operation.to_string(),
            full_url: None,
            request_headers: None,
            request_body: None,
            response_body: None,
            status_code: None,
            response_time_ms: None,
            operation_type,
            success,
            error_message: None,
            server_id: None,
            job_id: None,
            task_id: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn with_timing(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_correlation(
        mut self,
        server_id: Option<&str>,
        job_id: Option<&str>,
        task_id: Option<&str>,
    ) -> Self {
        self.server_id = server_id.map(str::to_string);
        self.job_id = job_id.map(str::to_string);
        self.task_id = task_id.map(str::to_string);
        self
    }
}

/// Capacidad de registro de actividad inyectada en los adaptadores.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Persiste el registro. Las implementaciones absorben sus propios
    /// fallos: este método no puede fallar hacia el llamador.
    async fn record(&self, entry: ActivityRecord);
}

/// Sumidero nulo para pruebas y modos stub.
pub struct NullActivitySink;

#[async_trait]
impl ActivitySink for NullActivitySink {
    async fn record(&self, _entry: ActivityRecord) {}
}
