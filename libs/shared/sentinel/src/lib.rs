// [libs/shared/sentinel/src/lib.rs]
/*!
 * =================================================================
 * APARATO: SENTINEL OBSERVER
 * CLASIFICACIÓN: SHARED UTILITY (ESTRATO L4)
 * RESPONSABILIDAD: GESTIÓN DE TELEMETRÍA, TRAZADO Y CAPTURA DE PÁNICOS
 *
 * # Logic:
 * Arquitectura de suscripción dual: logs compactos en desarrollo,
 * tramas JSON planas en producción. El hook global de pánico captura
 * colapsos en hilos secundarios (workers de descubrimiento, pipelines
 * de replicación) antes de la defunción del proceso.
 * =================================================================
 */

use std::panic;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as formatting_layer, EnvFilter};

/// Inicializa el sistema de trazas del ejecutor con captura de pánicos.
///
/// # Comportamiento:
/// - Desarrollo: logs interactivos compactos con nivel `debug`.
/// - Producción: JSON plano con nivel `info`, listo para ingesta.
///
/// El filtro prioriza los estratos propios y silencia el ruido de
/// infraestructura (tower, hyper, rustls).
pub fn init_tracing(service_nominal_identifier: &str) {
    // 1. CONFIGURACIÓN DEL FILTRO DINÁMICO
    let environmental_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}={level},infrasync={level},tower_http=warn,hyper=warn,rustls=warn",
            service_nominal_identifier,
            level = if cfg!(debug_assertions) { "debug" } else { "info" }
        )
        .into()
    });

    let is_production_strata = !cfg!(debug_assertions);

    // 2. CONSTRUCCIÓN DE LA ARQUITECTURA DE SUSCRIPCIÓN (Dual Mode)
    if is_production_strata {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().compact().with_target(false))
            .init();
    }

    // 3. HOOK GLOBAL DE PÁNICO
    // Cualquier colapso en tareas de Tokio queda registrado con sus
    // coordenadas de archivo antes de que el runtime lo absorba.
    let service_id_snapshot = service_nominal_identifier.to_string();

    panic::set_hook(Box::new(move |panic_metadata| {
        let panic_location = panic_metadata
            .location()
            .map(|location| format!("{}:{}:{}", location.file(), location.line(), location.column()))
            .unwrap_or_else(|| "UNKNOWN_STRATA_COORDINATES".to_string());

        let panic_payload_message = panic_metadata
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_metadata
                    .payload()
                    .downcast_ref::<String>()
                    .map(|message| message.as_str())
            })
            .unwrap_or("UNDEFINED_PANIC_PAYLOAD");

        error!(
            target: "panic_monitor",
            service = %service_id_snapshot,
            estrato = %panic_location,
            "🔥 [CRITICAL_PANIC]: Thread terminated abruptly. Analysis: {}",
            panic_payload_message
        );
    }));

    info!(
        "👁️  [SENTINEL_ONLINE]: Observability strata levelized for [{}].",
        service_nominal_identifier
    );
}
