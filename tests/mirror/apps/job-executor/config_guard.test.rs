// [tests/mirror/apps/job-executor/config_guard.test.rs]
/*!
 * =================================================================
 * APARATO: CONFIG GUARD TEST
 * CLASIFICACIÓN: INTEGRATION / STARTUP CONTRACT
 * RESPONSABILIDAD: CERTIFICACIÓN DEL CONTRATO DE ARRANQUE
 *
 * # Logic:
 * Las variables requeridas faltantes deben producir un fallo de
 * configuración (el binario sale con código distinto de cero); un
 * entorno completo produce la configuración tipada con sus defaults.
 * Mutar el entorno del proceso exige serializar los casos en un solo
 * test.
 * =================================================================
 */

#[cfg(test)]
mod tests {
    use infrasync_executor::config::{ConfigError, ExecutorConfig};

    const REQUIRED_VARS: [&str; 5] = [
        "DSM_URL",
        "SERVICE_ROLE_KEY",
        "VERIFY_SSL",
        "IDRAC_DEFAULT_USER",
        "IDRAC_DEFAULT_PASSWORD",
    ];

    fn clear_environment() {
        for name in REQUIRED_VARS {
            std::env::remove_var(name);
        }
        std::env::remove_var("API_SERVER_PORT");
        std::env::remove_var("MAX_PARALLEL_JOBS");
    }

    fn seed_full_environment() {
        std::env::set_var("DSM_URL", "https://dsm.test.local");
        std::env::set_var("SERVICE_ROLE_KEY", "config-guard-key");
        std::env::set_var("VERIFY_SSL", "false");
        std::env::set_var("IDRAC_DEFAULT_USER", "root");
        std::env::set_var("IDRAC_DEFAULT_PASSWORD", "calvin");
    }

    #[test]
    fn startup_contract_over_environment() {
        // Caso 1: entorno vacío → fallo de variable requerida.
        clear_environment();
        match ExecutorConfig::from_env() {
            Err(ConfigError::MissingRequired(name)) => {
                assert!(REQUIRED_VARS.contains(&name));
            }
            other => panic!("expected missing-required fault, got {:?}", other.map(|_| ())),
        }

        // Caso 2: entorno completo → defaults razonables.
        seed_full_environment();
        let config = ExecutorConfig::from_env().expect("full environment must parse");
        assert_eq!(config.dsm_url, "https://dsm.test.local");
        assert!(!config.verify_ssl);
        assert_eq!(config.api_port, 8745);
        assert!(config.poll_interval_seconds >= 1);
        assert!(config.max_parallel_jobs >= 2);
        assert!(config.executor_identity.contains('-'));

        // Caso 3: puerto malformado → fallo tipado, no pánico.
        std::env::set_var("API_SERVER_PORT", "not-a-port");
        assert!(matches!(
            ExecutorConfig::from_env(),
            Err(ConfigError::Malformed { name: "API_SERVER_PORT", .. })
        ));
        std::env::remove_var("API_SERVER_PORT");

        clear_environment();
    }
}
