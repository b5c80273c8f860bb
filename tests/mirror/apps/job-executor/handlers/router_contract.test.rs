// [tests/mirror/apps/job-executor/handlers/router_contract.test.rs]
/*!
 * =================================================================
 * APARATO: ROUTER CONTRACT TEST
 * CLASIFICACIÓN: INTEGRATION / API SURFACE
 * RESPONSABILIDAD: CERTIFICACIÓN DE CONTRATOS HTTP DEL API
 *
 * # Logic:
 * Sin red: la pasarela se construye pero jamás se invoca en estos
 * caminos. Certifica: latido 200 con versión, validación 400 en
 * campos faltantes, 503 cuando IDM no está configurado y preflujo de
 * CORS respondido.
 * =================================================================
 */

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use infrasync_executor::config::ExecutorConfig;
    use infrasync_executor::routes::build_router;
    use infrasync_executor::state::AppState;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_config() -> ExecutorConfig {
        ExecutorConfig {
            dsm_url: "https://dsm.test.local".to_string(),
            service_role_key: "router-contract-test-key".to_string(),
            verify_ssl: false,
            idrac_default_user: "root".to_string(),
            idrac_default_password: "calvin".to_string(),
            vcenter_host: None,
            api_port: 0,
            api_ssl_enabled: false,
            api_ssl_cert: None,
            api_ssl_key: None,
            use_stubs: true,
            deep_relationships: false,
            poll_interval_seconds: 5,
            max_parallel_jobs: 2,
            executor_identity: "test-executor".to_string(),
        }
    }

    fn test_router() -> axum::Router {
        let state = AppState::ignite(test_config()).expect("state assembly must not need network");
        build_router(state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok_and_version() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["status"], "ok");
        assert!(payload["version"].as_str().is_some());
    }

    #[tokio::test]
    async fn power_control_requires_server_id() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/power-control")
                    .header("Content-Type", "application/json")
                    .body(Body::from("{\"action\": \"On\"}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = body_json(response).await;
        assert_eq!(payload["success"], false);
        assert!(payload["error"].as_str().unwrap().contains("server_id"));
    }

    #[tokio::test]
    async fn power_control_rejects_unknown_action_before_any_lookup() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/power-control")
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        "{\"server_id\": \"srv-1\", \"action\": \"Explode\"}",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = body_json(response).await;
        assert!(payload["error"].as_str().unwrap().contains("invalid action"));
    }

    #[tokio::test]
    async fn preflight_batch_requires_server_ids() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/preflight-check")
                    .header("Content-Type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn idm_authenticate_without_directory_is_unavailable() {
        // Sin IDM_SERVER_HOST en el entorno el autenticador queda apagado.
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/idm-authenticate")
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        "{\"username\": \"jsmith\", \"password\": \"secret\"}",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn batch_storage_vmotion_validates_input() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/zerfaux/batch-storage-vmotion")
                    .header("Content-Type", "application/json")
                    .body(Body::from("{\"datastore\": \"DR-DS-01\"}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = body_json(response).await;
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("protected_vm_ids"));
    }
}
