// [libs/infra/idrac/src/client.rs]
/*!
 * =================================================================
 * APARATO: REDFISH TRANSPORT CORE
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: TRANSPORTE HTTPS + RASTRO DE ACTIVIDAD
 *
 * # Logic:
 * Un solo camino de petición: basic auth, timeout explícito, registro
 * de actividad con credenciales redactadas, coacción del cuerpo a
 * JSON utilizable. La clasificación 401/403 → AuthError ocurre aquí
 * para que ninguna operación la reimplemente.
 * =================================================================
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use infrasync_domain_models::activity::{
    ActivityRecord, ActivitySink, OperationType, REDACTED_CREDENTIAL,
};
use infrasync_domain_models::wire::coerce_json;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::IdracError;

/// Presupuesto por defecto de una operación Redfish.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Sesión lógica contra un iDRAC (basic auth por petición; el token lo
/// gestiona el propio iDRAC vía la cabecera de sesión cuando aplica).
#[derive(Debug, Clone)]
pub struct IdracSession {
    pub ip: String,
    pub username: String,
    pub password: String,
}

impl IdracSession {
    pub fn new(ip: &str, username: &str, password: &str) -> Self {
        Self {
            ip: ip.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

/// Identificadores de correlación para el rastro de actividad.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub server_id: Option<String>,
    pub job_id: Option<String>,
    pub task_id: Option<String>,
}

impl Correlation {
    pub fn for_server(server_id: &str) -> Self {
        Self {
            server_id: Some(server_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_job(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }
}

/// Respuesta cruda: estado + Location (monitores de tarea) + cuerpo.
#[derive(Debug, Clone)]
pub struct RawRedfishReply {
    pub status: u16,
    pub location: Option<String>,
    pub body: Value,
}

pub struct IdracClient {
    http_client: reqwest::Client,
    activity: Arc<dyn ActivitySink>,
}

impl IdracClient {
    /// TLS sin verificar por defecto (certificados autofirmados de fábrica).
    pub fn new(activity: Arc<dyn ActivitySink>) -> Result<Self, IdracError> {
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|build_fault| IdracError::Connectivity {
                ip: "-".to_string(),
                detail: build_fault.to_string(),
            })?;

        Ok(Self {
            http_client,
            activity,
        })
    }

    fn full_url(ip: &str, endpoint_path: &str) -> String {
        format!("https://{}{}", ip, endpoint_path)
    }

    /// Petición cruda con rastro de actividad. No clasifica estados.
    #[allow(clippy::too_many_arguments)]
    pub async fn request_raw(
        &self,
        method: Method,
        session: &IdracSession,
        endpoint_path: &str,
        request_body: Option<&Value>,
        correlation: &Correlation,
        timeout: Duration,
        authenticated: bool,
    ) -> Result<RawRedfishReply, IdracError> {
        let url = Self::full_url(&session.ip, endpoint_path);
        let started = Instant::now();

        let mut request = self
            .http_client
            .request(method.clone(), &url)
            .timeout(timeout);

        if authenticated {
            request = request.basic_auth(&session.username, Some(&session.password));
        }
        if let Some(body) = request_body {
            request = request.json(body);
        }

        let outcome = request.send().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Err(transport_fault) => {
                self.activity
                    .record(
                        ActivityRecord {
                            endpoint: endpoint_path.to_string(),
                            command_type: method.to_string(),
                            full_url: Some(url),
                            request_headers: Some(json!({
                                "Authorization": format!("Basic {}:{}", session.username, REDACTED_CREDENTIAL)
                            })),
                            request_body: request_body.cloned(),
                            response_body: None,
                            status_code: None,
                            response_time_ms: Some(elapsed_ms),
                            operation_type: OperationType::IdracApi,
                            success: false,
                            error_message: Some(transport_fault.to_string()),
                            server_id: correlation.server_id.clone(),
                            job_id: correlation.job_id.clone(),
                            task_id: correlation.task_id.clone(),
                        },
                    )
                    .await;

                Err(IdracError::Connectivity {
                    ip: session.ip.clone(),
                    detail: transport_fault.to_string(),
                })
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let location = response
                    .headers()
                    .get("Location")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let raw_body = response.text().await.unwrap_or_default();
                let body = if raw_body.trim().is_empty() {
                    Value::Null
                } else {
                    coerce_json(&raw_body)
                };

                let success = (200..300).contains(&status);
                self.activity
                    .record(
                        ActivityRecord {
                            endpoint: endpoint_path.to_string(),
                            command_type: method.to_string(),
                            full_url: Some(url),
                            request_headers: Some(json!({
                                "Authorization": format!("Basic {}:{}", session.username, REDACTED_CREDENTIAL)
                            })),
                            request_body: request_body.cloned(),
                            response_body: Some(body.clone()),
                            status_code: Some(status),
                            response_time_ms: Some(elapsed_ms),
                            operation_type: OperationType::IdracApi,
                            success,
                            error_message: if success {
                                None
                            } else {
                                Some(format!("HTTP {}", status))
                            },
                            server_id: correlation.server_id.clone(),
                            job_id: correlation.job_id.clone(),
                            task_id: correlation.task_id.clone(),
                        },
                    )
                    .await;

                debug!(
                    "[IDRAC_LINK]: {} {} -> {} ({} ms)",
                    method, endpoint_path, status, elapsed_ms
                );

                Ok(RawRedfishReply {
                    status,
                    location,
                    body,
                })
            }
        }
    }

    /// Petición clasificada: 2xx → cuerpo; 401/403 → Auth; resto → Http.
    pub async fn request(
        &self,
        method: Method,
        session: &IdracSession,
        endpoint_path: &str,
        request_body: Option<&Value>,
        correlation: &Correlation,
        timeout: Duration,
    ) -> Result<Value, IdracError> {
        let reply = self
            .request_raw(
                method,
                session,
                endpoint_path,
                request_body,
                correlation,
                timeout,
                true,
            )
            .await?;

        match reply.status {
            200..=299 => Ok(reply.body),
            401 | 403 => Err(IdracError::Auth {
                ip: session.ip.clone(),
                status: reply.status,
            }),
            other => Err(IdracError::Http {
                ip: session.ip.clone(),
                status: other,
                detail: reply
                    .body
                    .get("error")
                    .map(|error| error.to_string())
                    .unwrap_or_else(|| reply.body.to_string()),
            }),
        }
    }
}
