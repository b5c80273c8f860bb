// [apps/job-executor/src/routes.rs]
/*!
 * =================================================================
 * APARATO: INSTANT API ROUTER
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: TABLA DE RUTAS Y CORS DEL API INSTANTÁNEO
 *
 * # Logic:
 * CORS abierto (cualquier origen, GET/POST/OPTIONS, cabeceras
 * Content-Type/Authorization). Las operaciones instantáneas comparten
 * las mismas primitivas que los handlers de cola pero nunca pasan por
 * ella.
 * =================================================================
 */

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{health, instant, preflight_stream, replication_api};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        // --- SALUD Y STREAMING ---
        .route("/api/health", get(health::health))
        .route(
            "/api/preflight-check-stream",
            get(preflight_stream::preflight_check_stream),
        )
        // --- OPERACIONES INSTANTÁNEAS ---
        .route("/api/console-launch", post(instant::console_launch))
        .route("/api/power-control", post(instant::power_control))
        .route("/api/connectivity-test", post(instant::connectivity_test))
        .route("/api/browse-datastore", post(instant::browse_datastore))
        .route("/api/idm-authenticate", post(instant::idm_authenticate))
        .route("/api/network-config-read", post(instant::network_config_read))
        .route("/api/network-config-write", post(instant::network_config_write))
        .route("/api/health-check", post(instant::health_check))
        .route("/api/event-logs", post(instant::event_logs))
        .route("/api/boot-config-read", post(instant::boot_config_read))
        .route("/api/bios-config-read", post(instant::bios_config_read))
        .route("/api/firmware-inventory", post(instant::firmware_inventory))
        .route("/api/idrac-jobs", post(instant::idrac_jobs))
        .route("/api/preflight-check", post(instant::preflight_check))
        // --- SUPERFICIE DE REPLICACIÓN ---
        .route(
            "/api/replication/targets",
            get(replication_api::list_targets).post(replication_api::create_target),
        )
        .route(
            "/api/replication/targets/:id",
            get(replication_api::get_target)
                .put(replication_api::update_target)
                .delete(replication_api::delete_target),
        )
        .route(
            "/api/replication/targets/:id/test",
            post(replication_api::test_target),
        )
        .route(
            "/api/replication/protection-groups",
            get(replication_api::list_groups).post(replication_api::create_group),
        )
        .route(
            "/api/replication/protection-groups/:id",
            get(replication_api::get_group)
                .put(replication_api::update_group)
                .delete(replication_api::delete_group),
        )
        .route(
            "/api/replication/protection-groups/:id/vms",
            get(replication_api::list_protected_vms).post(replication_api::add_protected_vm),
        )
        .route(
            "/api/replication/protection-groups/:id/run",
            post(replication_api::run_replication_now),
        )
        .route(
            "/api/replication/protected-vms/:id",
            delete(replication_api::delete_protected_vm),
        )
        .route(
            "/api/replication/protected-vms/:id/protection-plan",
            get(replication_api::protection_plan),
        )
        .route(
            "/api/replication/protected-vms/:id/dr-shell-plan",
            get(replication_api::dr_shell_plan),
        )
        .route(
            "/api/replication/protected-vms/:id/move-to-protection-datastore",
            post(replication_api::move_to_protection_datastore),
        )
        .route(
            "/api/replication/protected-vms/:id/create-dr-shell",
            post(replication_api::create_dr_shell),
        )
        .route("/api/replication/jobs", get(replication_api::list_replication_jobs))
        .route("/api/replication/vcenters", get(replication_api::list_vcenters))
        .route(
            "/api/replication/vcenters/:id/vms",
            get(replication_api::list_vcenter_vms),
        )
        .route(
            "/api/replication/vcenters/:id/sync",
            post(replication_api::sync_vcenter),
        )
        .route(
            "/api/zerfaux/batch-storage-vmotion",
            post(replication_api::batch_storage_vmotion),
        )
        .layer(cors_layer)
        .with_state(state)
}
