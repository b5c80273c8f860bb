// [libs/infra/db-rest/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DSM PERSISTENCE LAYER
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ACCESO ÚNICO AL PROXY DE BASE DE DATOS
 *
 * # Logic:
 * Todo el tráfico de persistencia del ejecutor pasa por la pasarela
 * REST (dialecto PostgREST) con la credencial de rol de servicio. Los
 * repositorios encapsulan las tablas; el resolver y el gestor SSH
 * implementan las cadenas de credenciales sobre ellos; la bitácora de
 * actividad implementa el contrato 'ActivitySink' del dominio.
 * =================================================================
 */

pub mod activity;
pub mod errors;
pub mod gateway;
pub mod repositories;
pub mod resolver;
pub mod ssh_credentials;

pub use activity::ActivityLogger;
pub use errors::DbError;
pub use gateway::DsmGateway;
pub use resolver::{CredentialResolver, EsxiCredentials};
pub use ssh_credentials::SshCredentialManager;
