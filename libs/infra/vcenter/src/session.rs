// [libs/infra/vcenter/src/session.rs]
/*!
 * =================================================================
 * APARATO: VCENTER SESSION MANAGER
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: A LO SUMO UNA SESIÓN VIVA POR HOST DE VCENTER
 *
 * # Logic:
 * Lectura: si la sesión cacheada responde al chequeo de vida, se usa.
 * Mutación bajo candado: login fresco cuando no hay sesión o expiró.
 * 'ensure_session' se invoca antes de operaciones con brechas largas
 * (reinicios, firmware) para adelantarse a 'NotAuthenticated'. La
 * contraseña llega plana en la fila de settings o se descifra vía la
 * capacidad inyectada; un descifrado fallido es error duro.
 * =================================================================
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use infrasync_domain_models::activity::{ActivityRecord, ActivitySink, OperationType};
use infrasync_domain_models::credential::SecretDecryptor;
use infrasync_domain_models::inventory::VcenterSettingsRecord;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::endpoints;
use crate::error::VcError;

const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Sesión viva contra un vCenter.
#[derive(Debug, Clone)]
pub struct VcSession {
    pub host: String,
    pub token: String,
    pub verify_ssl: bool,
}

pub struct VcSessionManager {
    http_verify: reqwest::Client,
    http_no_verify: reqwest::Client,
    sessions: Mutex<HashMap<String, VcSession>>,
    decryptor: Arc<dyn SecretDecryptor>,
    activity: Arc<dyn ActivitySink>,
}

impl VcSessionManager {
    pub fn new(
        decryptor: Arc<dyn SecretDecryptor>,
        activity: Arc<dyn ActivitySink>,
    ) -> Result<Self, VcError> {
        let build = |verify: bool| {
            reqwest::Client::builder()
                .danger_accept_invalid_certs(!verify)
                .timeout(SESSION_TIMEOUT)
                .build()
                .map_err(|fault| VcError::Connectivity {
                    host: "-".to_string(),
                    detail: fault.to_string(),
                })
        };

        Ok(Self {
            http_verify: build(true)?,
            http_no_verify: build(false)?,
            sessions: Mutex::new(HashMap::new()),
            decryptor,
            activity,
        })
    }

    pub fn http_for(&self, verify_ssl: bool) -> &reqwest::Client {
        if verify_ssl {
            &self.http_verify
        } else {
            &self.http_no_verify
        }
    }

    fn base_url(host: &str) -> String {
        format!("https://{}", host)
    }

    /// Resuelve la contraseña de la fila de settings: plana primero,
    /// luego el blob cifrado (fallo de descifrado = error duro).
    async fn resolve_password(&self, settings: &VcenterSettingsRecord) -> Result<String, VcError> {
        if let Some(plain) = settings.password.clone().filter(|password| !password.is_empty()) {
            return Ok(plain);
        }
        if let Some(encrypted) = settings
            .password_encrypted
            .as_deref()
            .filter(|blob| !blob.is_empty())
        {
            info!("🔑 [VC_SESSION]: Decrypting vCenter password...");
            return self
                .decryptor
                .decrypt_secret(encrypted)
                .await
                .ok_or(VcError::DecryptFailed);
        }
        Err(VcError::Configuration(
            "vcenter settings row has no password material".to_string(),
        ))
    }

    /// ¿Sigue viva la sesión? (GET /api/session con el token).
    async fn session_is_alive(&self, session: &VcSession) -> bool {
        let url = format!("{}{}", Self::base_url(&session.host), endpoints::SESSION);
        let outcome = self
            .http_for(session.verify_ssl)
            .get(url)
            .header("vmware-api-session-id", &session.token)
            .send()
            .await;

        matches!(outcome, Ok(response) if response.status().is_success())
    }

    /// Login fresco contra /api/session (basic auth → token).
    async fn login(&self, settings: &VcenterSettingsRecord) -> Result<VcSession, VcError> {
        let host = settings
            .host
            .clone()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| VcError::Configuration("vcenter host missing".to_string()))?;
        let username = settings
            .username
            .clone()
            .filter(|username| !username.is_empty())
            .ok_or_else(|| VcError::Configuration("vcenter username missing".to_string()))?;
        let password = self.resolve_password(settings).await?;
        let verify_ssl = settings.verify_ssl.unwrap_or(false);

        info!("🔌 [VC_SESSION]: Attempting to connect to vCenter at {}...", host);

        let url = format!("{}{}", Self::base_url(&host), endpoints::SESSION);
        let outcome = self
            .http_for(verify_ssl)
            .post(url)
            .basic_auth(&username, Some(&password))
            .send()
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(transport_fault) => {
                self.activity
                    .record(
                        ActivityRecord::operation(
                            "connect_vcenter",
                            &host,
                            OperationType::VcenterApi,
                            false,
                        )
                        .with_error(transport_fault.to_string()),
                    )
                    .await;
                return Err(VcError::Connectivity {
                    host,
                    detail: transport_fault.to_string(),
                });
            }
        };

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            self.activity
                .record(
                    ActivityRecord::operation(
                        "connect_vcenter",
                        &host,
                        OperationType::VcenterApi,
                        false,
                    )
                    .with_error(format!("HTTP {}", status.as_u16())),
                )
                .await;
            return Err(VcError::Auth(host));
        }
        if !status.is_success() {
            return Err(VcError::Http {
                host,
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }

        // El proveedor responde el token como cadena JSON.
        let token: String = match response.json::<Value>().await {
            Ok(Value::String(token)) => token,
            Ok(other) => other
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| VcError::Protocol(format!("unexpected session reply: {}", other)))?,
            Err(parse_fault) => return Err(VcError::Protocol(parse_fault.to_string())),
        };

        info!("✅ [VC_SESSION]: Connected to vCenter at {}.", host);
        self.activity
            .record(ActivityRecord::operation(
                "connect_vcenter",
                &host,
                OperationType::VcenterApi,
                true,
            ))
            .await;

        Ok(VcSession {
            host,
            token,
            verify_ssl,
        })
    }

    /// Devuelve la sesión cacheada si sigue viva; si no, reconecta.
    pub async fn connect(&self, settings: &VcenterSettingsRecord) -> Result<VcSession, VcError> {
        let host_key = settings.host.clone().unwrap_or_default();

        {
            let sessions = self.sessions.lock().await;
            if let Some(cached) = sessions.get(&host_key) {
                if self.session_is_alive(cached).await {
                    return Ok(cached.clone());
                }
                warn!("⚠️ [VC_SESSION]: Session for {} expired, reconnecting...", host_key);
            }
        }

        let fresh = self.login(settings).await?;
        self.sessions
            .lock()
            .await
            .insert(host_key, fresh.clone());
        Ok(fresh)
    }

    /// Revalidación previa a operaciones con brechas largas.
    pub async fn ensure_session(
        &self,
        settings: &VcenterSettingsRecord,
    ) -> Result<VcSession, VcError> {
        self.connect(settings).await
    }

    /// Fuerza el descarte de la sesión cacheada del host.
    pub async fn invalidate(&self, host: &str) {
        if self.sessions.lock().await.remove(host).is_some() {
            warn!("♻️ [VC_SESSION]: Session for {} invalidated.", host);
        }
    }

    /// Petición autenticada con detección de expiración de sesión.
    pub async fn request(
        &self,
        session: &VcSession,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, VcError> {
        let url = format!("{}{}", Self::base_url(&session.host), path);

        let mut request = self
            .http_for(session.verify_ssl)
            .request(method, url)
            .header("vmware-api-session-id", &session.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|transport_fault| {
            VcError::Connectivity {
                host: session.host.clone(),
                detail: transport_fault.to_string(),
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        match status {
            200..=299 => {
                if text.trim().is_empty() {
                    Ok(Value::Null)
                } else {
                    serde_json::from_str(&text)
                        .map_err(|parse_fault| VcError::Protocol(parse_fault.to_string()))
                }
            }
            401 => {
                self.invalidate(&session.host).await;
                Err(VcError::SessionExpired(session.host.clone()))
            }
            other => Err(VcError::Http {
                host: session.host.clone(),
                status: other,
                detail: text.chars().take(300).collect(),
            }),
        }
    }
}
