// [libs/infra/idrac/src/lib.rs]
/*!
 * =================================================================
 * APARATO: IDRAC REDFISH CLIENT
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: OPERACIONES REDFISH CONTRA LA FLOTA DELL
 *
 * # Logic:
 * HTTPS con basic auth y TLS sin verificar por defecto (los iDRAC
 * llevan certificados autofirmados). Cada operación registra una fila
 * de actividad con 'operation_type=idrac_api' y credenciales
 * redactadas. Un 401/403 se reclasifica como fallo de autenticación,
 * distinto de un fallo de conectividad.
 * =================================================================
 */

pub mod client;
pub mod endpoints;
pub mod error;
pub mod ops;

pub use client::{Correlation, IdracClient, IdracSession, RawRedfishReply};
pub use error::IdracError;
pub use ops::{supports_local_export, ConnectivityProbe, RedfishDetection};
