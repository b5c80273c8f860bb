// [apps/job-executor/src/config.rs]
/*!
 * =================================================================
 * APARATO: EXECUTOR CONFIGURATION
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA TIPADA DEL ENTORNO DEL PROCESO
 *
 * # Logic:
 * Las variables requeridas faltantes son fatales en el arranque
 * (salida con código distinto de cero). Los umbrales de runtime
 * (hilos de descubrimiento, llave de cifrado) viven en la fila
 * 'activity_settings' y se leen en caliente, no aquí.
 * =================================================================
 */

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("[L1_CONFIG_FAULT]: REQUIRED_ENV_MISSING -> {0}")]
    MissingRequired(&'static str),

    #[error("[L1_CONFIG_FAULT]: MALFORMED_ENV -> {name}: {detail}")]
    Malformed { name: &'static str, detail: String },
}

/// Configuración inmutable del proceso ejecutor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// URL del proxy de base de datos.
    pub dsm_url: String,
    /// Credencial de rol de servicio para el proxy.
    pub service_role_key: String,
    /// Verificación TLS hacia el proxy.
    pub verify_ssl: bool,
    /// Defaults de credenciales iDRAC (último eslabón de la cadena).
    pub idrac_default_user: String,
    pub idrac_default_password: String,
    /// vCenter por defecto; las filas de settings lo sobreescriben.
    pub vcenter_host: Option<String>,
    /// Puerto del API instantáneo.
    pub api_port: u16,
    /// TLS del API instantáneo (degrada a texto plano si faltan archivos).
    pub api_ssl_enabled: bool,
    pub api_ssl_cert: Option<String>,
    pub api_ssl_key: Option<String>,
    /// Modo stub del motor de replicación.
    pub use_stubs: bool,
    /// Enriquecimiento profundo del inventario de VMs.
    pub deep_relationships: bool,
    /// Cadencia del sondeo de la cola de trabajos.
    pub poll_interval_seconds: u64,
    /// Tope de trabajos en paralelo.
    pub max_parallel_jobs: usize,
    /// Identidad de este ejecutor para los reclamos consultivos.
    pub executor_identity: String,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingRequired(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn boolean(name: &str, default: bool) -> bool {
    optional(name)
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl ExecutorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_port = optional("API_SERVER_PORT")
            .map(|value| {
                value.parse::<u16>().map_err(|parse_fault| ConfigError::Malformed {
                    name: "API_SERVER_PORT",
                    detail: parse_fault.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(8745);

        let poll_interval_seconds = optional("JOB_POLL_INTERVAL_SECONDS")
            .and_then(|value| value.parse().ok())
            .unwrap_or(5);

        let max_parallel_jobs = optional("MAX_PARALLEL_JOBS")
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(|| num_cpus::get().clamp(2, 8));

        let hostname = optional("HOSTNAME").unwrap_or_else(|| "executor".to_string());
        let executor_identity = format!("{}-{}", hostname, &uuid::Uuid::new_v4().to_string()[..8]);

        let verify_ssl_raw = required("VERIFY_SSL")?;
        let verify_ssl = matches!(
            verify_ssl_raw.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );

        Ok(Self {
            dsm_url: required("DSM_URL")?,
            service_role_key: required("SERVICE_ROLE_KEY")?,
            verify_ssl,
            idrac_default_user: required("IDRAC_DEFAULT_USER")?,
            idrac_default_password: required("IDRAC_DEFAULT_PASSWORD")?,
            vcenter_host: optional("VCENTER_HOST"),
            api_port,
            api_ssl_enabled: boolean("API_SERVER_SSL_ENABLED", false),
            api_ssl_cert: optional("API_SERVER_SSL_CERT"),
            api_ssl_key: optional("API_SERVER_SSL_KEY"),
            use_stubs: boolean("ZERFAUX_USE_STUBS", false),
            deep_relationships: boolean("ENABLE_DEEP_RELATIONSHIPS", false),
            poll_interval_seconds,
            max_parallel_jobs,
            executor_identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_parsing_accepts_common_truthy_forms() {
        std::env::set_var("CONFIG_TEST_FLAG", "TRUE");
        assert!(boolean("CONFIG_TEST_FLAG", false));
        std::env::set_var("CONFIG_TEST_FLAG", "0");
        assert!(!boolean("CONFIG_TEST_FLAG", true));
        std::env::remove_var("CONFIG_TEST_FLAG");
        assert!(boolean("CONFIG_TEST_FLAG", true));
    }
}
