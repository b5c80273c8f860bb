// [apps/job-executor/src/main.rs]
/*!
 * =================================================================
 * APARATO: JOB EXECUTOR MAIN ENTRY POINT
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: IGNICIÓN DEL PROCESO Y APERTURA DEL SOCKET
 *
 * # Logic:
 * Secuencia de ignición: entorno → observabilidad → configuración
 * tipada (fatal si falta algo requerido) → estado compartido →
 * planificador en segundo plano → servidor HTTP (TLS opcional con
 * degradación a texto plano si faltan los archivos). Código de salida
 * distinto de cero en cualquier fallo fatal de arranque.
 * =================================================================
 */

use std::net::SocketAddr;

use axum_server::tls_rustls::RustlsConfig;
use dotenvy::dotenv;
use infrasync_executor::prelude::*;
use infrasync_shared_sentinel::init_tracing;
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO
    dotenv().ok();

    // 2. OBSERVABILIDAD
    init_tracing("infrasync_executor");

    // 3. CONFIGURACIÓN TIPADA (fatal si falta algo requerido)
    let config = match ExecutorConfig::from_env() {
        Ok(config) => config,
        Err(config_fault) => {
            eprintln!("FATAL: {}", config_fault);
            std::process::exit(1);
        }
    };

    // 4. RUNTIME MULTIHILO
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        info!("🛰️ [IGNITION]: Infrasync job executor starting...");

        let api_port = config.api_port;
        let ssl_enabled = config.api_ssl_enabled;
        let ssl_cert = config.api_ssl_cert.clone();
        let ssl_key = config.api_ssl_key.clone();

        // 5. ESTADO COMPARTIDO
        let state = match AppState::ignite(config) {
            Ok(state) => state,
            Err(ignition_fault) => {
                error!("❌ [IGNITION]: State assembly failed: {}", ignition_fault);
                std::process::exit(1);
            }
        };

        // 6. PLANIFICADOR EN SEGUNDO PLANO
        let scheduler = JobScheduler::new(state.clone());
        tokio::spawn(scheduler.run());

        // 7. SERVIDOR HTTP (TLS opcional con degradación)
        let router = build_router(state);
        let bind_address = SocketAddr::from(([0, 0, 0, 0], api_port));

        let tls_configuration = if ssl_enabled {
            match (ssl_cert, ssl_key) {
                (Some(cert_path), Some(key_path)) => {
                    match RustlsConfig::from_pem_file(&cert_path, &key_path).await {
                        Ok(tls) => Some(tls),
                        Err(tls_fault) => {
                            warn!(
                                "⚠️ [API_SERVER]: TLS material unusable ({}), falling back to plaintext.",
                                tls_fault
                            );
                            None
                        }
                    }
                }
                _ => {
                    warn!("⚠️ [API_SERVER]: TLS enabled but cert/key paths missing, falling back to plaintext.");
                    None
                }
            }
        } else {
            None
        };

        let serve_outcome = match tls_configuration {
            Some(tls) => {
                info!("🔐 [API_SERVER]: Listening with TLS on {}.", bind_address);
                axum_server::bind_rustls(bind_address, tls)
                    .serve(router.into_make_service())
                    .await
            }
            None => {
                info!("📡 [API_SERVER]: Listening on {}.", bind_address);
                axum_server::bind(bind_address)
                    .serve(router.into_make_service())
                    .await
            }
        };

        if let Err(bind_fault) = serve_outcome {
            error!("❌ [API_SERVER]: Bind/serve failed: {}", bind_fault);
            std::process::exit(1);
        }
    });

    Ok(())
}
