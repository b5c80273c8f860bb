// [libs/infra/db-rest/src/resolver.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL RESOLVER
 * CLASIFICACIÓN: INFRASTRUCTURE SERVICE (ESTRATO L3)
 * RESPONSABILIDAD: CADENA DE PRIORIDAD DE CREDENCIALES IDRAC/ESXI
 *
 * # Logic:
 * Cadena exacta para iDRAC:
 *   1) server.credential_set_id explícito
 *   2) credenciales inline del servidor (idrac_username + blob cifrado)
 *   3) server.discovered_by_credential_set_id
 *   4) primer set mapeado por rango IP (prioridad ascendente)
 *   5) defaults de entorno del proceso
 * Un blob cifrado que no descifra CORTA la cadena con
 * 'decrypt_failed' y no devuelve credenciales: es señal dura de llave
 * mal configurada, no un caso de fallback.
 *
 * La llave de cifrado se lee una vez de 'activity_settings' y se
 * cachea (escritura única, lectura mayoritaria).
 * =================================================================
 */

use std::sync::Arc;

use infrasync_domain_credentials::ip_range::ip_in_range;
use infrasync_domain_models::credential::{
    ActivitySettingsRecord, CredentialIpRangeRecord, CredentialSetRecord, CredentialSource,
    ResolvedCredentials,
};
use async_trait::async_trait;
use infrasync_domain_models::credential::SecretDecryptor;
use infrasync_domain_models::server::ServerRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::errors::DbError;
use crate::gateway::DsmGateway;

/// Credenciales ESXi resueltas para un host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsxiCredentials {
    pub username: String,
    pub password: String,
    /// credential_set_id | vcenter_host_id | ip_range | default
    pub source: String,
}

/// Set mapeado por rango IP, ya descifrado.
#[derive(Debug, Clone)]
struct MatchedIpRangeSet {
    id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    priority: i64,
    decrypt_failed: bool,
}

pub struct CredentialResolver {
    gateway: Arc<DsmGateway>,
    encryption_key: RwLock<Option<String>>,
    default_username: Option<String>,
    default_password: Option<String>,
}

impl CredentialResolver {
    pub fn new(
        gateway: Arc<DsmGateway>,
        default_username: Option<String>,
        default_password: Option<String>,
    ) -> Self {
        Self {
            gateway,
            encryption_key: RwLock::new(None),
            default_username,
            default_password,
        }
    }

    /// Llave de cifrado desde 'activity_settings', cacheada tras el
    /// primer acierto.
    pub async fn encryption_key(&self) -> Option<String> {
        if let Some(cached) = self.encryption_key.read().await.clone() {
            return Some(cached);
        }

        let rows: Vec<ActivitySettingsRecord> = match self
            .gateway
            .select_rows(
                "activity_settings",
                &[("select", "encryption_key".to_string()), ("limit", "1".to_string())],
            )
            .await
        {
            Ok(rows) => rows,
            Err(fetch_fault) => {
                error!("❌ [CRED_RESOLVER]: Encryption key fetch failed: {}", fetch_fault);
                return None;
            }
        };

        let key = rows.into_iter().next().and_then(|row| row.encryption_key);
        match key {
            Some(key) if !key.is_empty() => {
                info!("🔑 [CRED_RESOLVER]: Encryption key loaded and cached.");
                *self.encryption_key.write().await = Some(key.clone());
                Some(key)
            }
            _ => {
                warn!("⚠️ [CRED_RESOLVER]: No encryption key present in activity_settings.");
                None
            }
        }
    }

    /// Descifra vía la RPC remota. None = material que no descifra.
    pub async fn decrypt(&self, encrypted: &str) -> Option<String> {
        if encrypted.is_empty() {
            return None;
        }

        let Some(key) = self.encryption_key().await else {
            error!("❌ [CRED_RESOLVER]: Cannot decrypt, encryption key unavailable.");
            return None;
        };

        match self.gateway.rpc_decrypt(encrypted, &key).await {
            Ok(Some(plaintext)) => Some(plaintext),
            Ok(None) => {
                warn!("⚠️ [CRED_RESOLVER]: Decryption returned null (corrupted material?).");
                None
            }
            Err(rpc_fault) => {
                error!("❌ [CRED_RESOLVER]: Decrypt RPC failed: {}", rpc_fault);
                None
            }
        }
    }

    /// Variante dura: para llamadores que no pueden continuar sin el
    /// secreto (p.ej. login de vCenter).
    pub async fn decrypt_required(&self, encrypted: &str) -> Result<String, DbError> {
        self.decrypt(encrypted).await.ok_or(DbError::DecryptFailed)
    }

    /// Sets por id, ordenados por prioridad ascendente.
    pub async fn credential_sets(&self, ids: &[String]) -> Vec<CredentialSetRecord> {
        if ids.is_empty() {
            return Vec::new();
        }

        self.gateway
            .select_rows(
                "credential_sets",
                &[
                    ("id", format!("in.({})", ids.join(","))),
                    ("order", "priority.asc".to_string()),
                ],
            )
            .await
            .unwrap_or_else(|fetch_fault| {
                error!("❌ [CRED_RESOLVER]: credential_sets fetch failed: {}", fetch_fault);
                Vec::new()
            })
    }

    /// Sets cuyo rango contiene la IP, descifrados y ordenados por prioridad.
    async fn ip_range_sets(&self, ip_address: &str, type_filter: Option<&str>) -> Vec<MatchedIpRangeSet> {
        let rows: Vec<CredentialIpRangeRecord> = match self
            .gateway
            .select_rows(
                "credential_ip_ranges",
                &[("select", "*,credential_sets(*)".to_string())],
            )
            .await
        {
            Ok(rows) => rows,
            Err(fetch_fault) => {
                warn!("⚠️ [CRED_RESOLVER]: IP range fetch failed: {}", fetch_fault);
                return Vec::new();
            }
        };

        let mut matched = Vec::new();
        for entry in rows {
            let Some(set) = entry.credential_sets else { continue };

            if let Some(required_type) = type_filter {
                if set.credential_type.as_deref() != Some(required_type) {
                    continue;
                }
            }

            if !ip_in_range(ip_address, &entry.ip_range) {
                continue;
            }

            let mut password = set.password.clone();
            let mut decrypt_failed = false;
            if password.is_none() {
                if let Some(encrypted) = set.password_encrypted.as_deref() {
                    password = self.decrypt(encrypted).await;
                    decrypt_failed = password.is_none();
                }
            }

            matched.push(MatchedIpRangeSet {
                id: set.id,
                username: set.username,
                password,
                priority: entry.priority.unwrap_or(i64::MAX),
                decrypt_failed,
            });
        }

        matched.sort_by_key(|entry| entry.priority);
        if !matched.is_empty() {
            info!(
                "🔎 [CRED_RESOLVER]: {} credential set(s) matched IP {}.",
                matched.len(),
                ip_address
            );
        }
        matched
    }

    /// Resuelve un set individual a (username, password), cortando la
    /// cadena con 'decrypt_failed' cuando el blob no descifra.
    async fn materialize_set(
        &self,
        set: &CredentialSetRecord,
    ) -> Result<Option<(String, String)>, ()> {
        let Some(username) = set.username.clone().filter(|name| !name.is_empty()) else {
            return Ok(None);
        };

        if let Some(plaintext) = set.password.clone().filter(|password| !password.is_empty()) {
            return Ok(Some((username, plaintext)));
        }

        if let Some(encrypted) = set.password_encrypted.as_deref().filter(|blob| !blob.is_empty()) {
            return match self.decrypt(encrypted).await {
                Some(plaintext) => Ok(Some((username, plaintext))),
                None => Err(()),
            };
        }

        Ok(None)
    }

    /// Cadena de prioridad completa para un servidor iDRAC.
    pub async fn resolve_for_server(&self, server: &ServerRecord) -> ResolvedCredentials {
        let server_ip = server.ip_address.as_str();

        // 1) Set explícito.
        if let Some(set_id) = server.credential_set_id.as_deref() {
            let sets = self.credential_sets(&[set_id.to_string()]).await;
            if let Some(set) = sets.first() {
                match self.materialize_set(set).await {
                    Err(()) => {
                        error!(
                            "❌ [CRED_RESOLVER]: {} -> decrypt_failed (credential_set_id)",
                            server_ip
                        );
                        return ResolvedCredentials::decrypt_failed();
                    }
                    Ok(Some((username, password))) => {
                        debug!("[CRED_RESOLVER]: {} -> credential_set_id", server_ip);
                        return ResolvedCredentials {
                            username: Some(username),
                            password: Some(password),
                            source: CredentialSource::CredentialSetId,
                            used_credential_set_id: Some(set_id.to_string()),
                        };
                    }
                    Ok(None) => {}
                }
            }
        }

        // 2) Credenciales inline del servidor.
        if let (Some(username), Some(encrypted)) = (
            server.idrac_username.as_deref().filter(|name| !name.is_empty()),
            server
                .idrac_password_encrypted
                .as_deref()
                .filter(|blob| !blob.is_empty()),
        ) {
            return match self.decrypt(encrypted).await {
                Some(password) => {
                    debug!("[CRED_RESOLVER]: {} -> server_specific", server_ip);
                    ResolvedCredentials {
                        username: Some(username.to_string()),
                        password: Some(password),
                        source: CredentialSource::ServerSpecific,
                        used_credential_set_id: None,
                    }
                }
                None => {
                    error!(
                        "❌ [CRED_RESOLVER]: {} -> decrypt_failed (server_specific)",
                        server_ip
                    );
                    ResolvedCredentials::decrypt_failed()
                }
            };
        }

        // 3) Set que autenticó el descubrimiento.
        if let Some(set_id) = server.discovered_by_credential_set_id.as_deref() {
            let sets = self.credential_sets(&[set_id.to_string()]).await;
            if let Some(set) = sets.first() {
                match self.materialize_set(set).await {
                    Err(()) => {
                        error!(
                            "❌ [CRED_RESOLVER]: {} -> decrypt_failed (discovered_by)",
                            server_ip
                        );
                        return ResolvedCredentials::decrypt_failed();
                    }
                    Ok(Some((username, password))) => {
                        debug!(
                            "[CRED_RESOLVER]: {} -> discovered_by_credential_set_id",
                            server_ip
                        );
                        return ResolvedCredentials {
                            username: Some(username),
                            password: Some(password),
                            source: CredentialSource::DiscoveredByCredentialSetId,
                            used_credential_set_id: Some(set_id.to_string()),
                        };
                    }
                    Ok(None) => {}
                }
            }
        }

        // 4) Rango IP mapeado.
        let matched = self.ip_range_sets(server_ip, None).await;
        if let Some(best) = matched.first() {
            if best.decrypt_failed {
                error!("❌ [CRED_RESOLVER]: {} -> decrypt_failed (ip_range)", server_ip);
                return ResolvedCredentials::decrypt_failed();
            }
            if let (Some(username), Some(password)) = (best.username.clone(), best.password.clone())
            {
                debug!("[CRED_RESOLVER]: {} -> ip_range", server_ip);
                return ResolvedCredentials {
                    username: Some(username),
                    password: Some(password),
                    source: CredentialSource::IpRange,
                    used_credential_set_id: best.id.clone(),
                };
            }
        }

        // 5) Defaults de entorno.
        if let (Some(username), Some(password)) =
            (self.default_username.clone(), self.default_password.clone())
        {
            if !username.is_empty() && !password.is_empty() {
                debug!("[CRED_RESOLVER]: {} -> environment defaults", server_ip);
                return ResolvedCredentials {
                    username: Some(username),
                    password: Some(password),
                    source: CredentialSource::Defaults,
                    used_credential_set_id: None,
                };
            }
        }

        warn!("⚠️ [CRED_RESOLVER]: {} -> no credentials available.", server_ip);
        ResolvedCredentials::none()
    }

    /// Cadena ESXi: set explícito tipado → set por-host → rango IP
    /// tipado → set default tipado.
    pub async fn esxi_credentials_for_host(
        &self,
        host_id: &str,
        host_ip: &str,
        explicit_set_id: Option<&str>,
    ) -> Option<EsxiCredentials> {
        // 1) Set explícito de tipo esxi.
        if let Some(set_id) = explicit_set_id {
            let rows: Vec<CredentialSetRecord> = self
                .gateway
                .select_rows(
                    "credential_sets",
                    &[
                        ("id", format!("eq.{}", set_id)),
                        ("credential_type", "eq.esxi".to_string()),
                    ],
                )
                .await
                .unwrap_or_default();
            if let Some(set) = rows.first() {
                if let Ok(Some((username, password))) = self.materialize_set(set).await {
                    debug!("[CRED_RESOLVER]: ESXi {} -> explicit set", host_ip);
                    return Some(EsxiCredentials {
                        username,
                        password,
                        source: "credential_set_id".to_string(),
                    });
                }
            }
        }

        // 2) Set enlazado al host.
        let rows: Vec<CredentialSetRecord> = self
            .gateway
            .select_rows(
                "credential_sets",
                &[
                    ("vcenter_host_id", format!("eq.{}", host_id)),
                    ("credential_type", "eq.esxi".to_string()),
                ],
            )
            .await
            .unwrap_or_default();
        if let Some(set) = rows.first() {
            if let Ok(Some((username, password))) = self.materialize_set(set).await {
                debug!("[CRED_RESOLVER]: ESXi {} -> per-host set", host_ip);
                return Some(EsxiCredentials {
                    username,
                    password,
                    source: "vcenter_host_id".to_string(),
                });
            }
        }

        // 3) Rango IP con tipo esxi.
        let matched = self.ip_range_sets(host_ip, Some("esxi")).await;
        if let Some(best) = matched.iter().find(|entry| !entry.decrypt_failed) {
            if let (Some(username), Some(password)) = (best.username.clone(), best.password.clone())
            {
                debug!("[CRED_RESOLVER]: ESXi {} -> ip_range set", host_ip);
                return Some(EsxiCredentials {
                    username,
                    password,
                    source: "ip_range".to_string(),
                });
            }
        }

        // 4) Default tipado.
        let rows: Vec<CredentialSetRecord> = self
            .gateway
            .select_rows(
                "credential_sets",
                &[
                    ("credential_type", "eq.esxi".to_string()),
                    ("is_default", "eq.true".to_string()),
                ],
            )
            .await
            .unwrap_or_default();
        if let Some(set) = rows.first() {
            if let Ok(Some((username, password))) = self.materialize_set(set).await {
                debug!("[CRED_RESOLVER]: ESXi {} -> default set", host_ip);
                return Some(EsxiCredentials {
                    username,
                    password,
                    source: "default".to_string(),
                });
            }
        }

        warn!(
            "⚠️ [CRED_RESOLVER]: No ESXi credentials for host {} (id {}).",
            host_ip, host_id
        );
        None
    }
}

#[async_trait]
impl SecretDecryptor for CredentialResolver {
    async fn decrypt_secret(&self, encrypted: &str) -> Option<String> {
        self.decrypt(encrypted).await
    }
}
