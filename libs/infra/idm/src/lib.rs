// [libs/infra/idm/src/lib.rs]
/*!
 * =================================================================
 * APARATO: IDM AUTHENTICATOR
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: AUTENTICACIÓN LDAP/LDAPS Y BÚSQUEDA DE GRUPOS
 *
 * # Logic:
 * La identidad se normaliza primero (C1). Los usuarios del directorio
 * nativo hacen bind con su DN de cuenta; los usuarios de bosques AD de
 * confianza pasan por el DC de AD cuando está configurado, o por el
 * subárbol compat del directorio. La búsqueda de grupos usa la cuenta
 * de servicio cuando existe. Un bind rechazado es AuthError, distinto
 * de un fallo de conectividad.
 * =================================================================
 */

use std::sync::Arc;
use std::time::Instant;

use infrasync_domain_identity::{IdentityNormalizer, NormalizedIdentity};
use infrasync_domain_models::activity::{ActivityRecord, ActivitySink, OperationType};
use ldap3::{LdapConnAsync, Scope, SearchEntry};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IdmError {
    /// Bind rechazado: credenciales inválidas.
    #[error("[L3_IDM_AUTH_FAULT]: BIND_REJECTED for {0}")]
    BindRejected(String),

    /// El directorio no respondió.
    #[error("[L3_IDM_NET_FAULT]: DIRECTORY_UNREACHABLE {host} -> {detail}")]
    Connectivity { host: String, detail: String },

    /// Configuración incompleta.
    #[error("[L3_IDM_CONFIG_FAULT]: {0}")]
    Configuration(String),
}

/// Configuración del autenticador.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdmConfig {
    pub server_host: String,
    pub base_dn: String,
    #[serde(default = "default_true")]
    pub use_ldaps: bool,
    #[serde(default = "default_user_base")]
    pub user_search_base: String,
    #[serde(default = "default_group_base")]
    pub group_search_base: String,
    #[serde(default)]
    pub service_account_dn: Option<String>,
    #[serde(default)]
    pub service_account_password: Option<String>,
    /// DC de AD para el pass-through de usuarios de confianza.
    #[serde(default)]
    pub ad_dc_host: Option<String>,
    #[serde(default)]
    pub trusted_domains: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_user_base() -> String {
    "cn=users,cn=accounts".to_string()
}
fn default_group_base() -> String {
    "cn=groups,cn=accounts".to_string()
}

/// Resultado de una autenticación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub success: bool,
    pub canonical_principal: String,
    pub username: String,
    pub realm: String,
    pub is_ad_trust: bool,
    pub groups: Vec<String>,
    /// native_bind | compat_bind | ad_dc_passthrough
    pub method: String,
}

pub struct IdmAuthenticator {
    config: IdmConfig,
    normalizer: IdentityNormalizer,
    activity: Arc<dyn ActivitySink>,
}

impl IdmAuthenticator {
    pub fn new(
        config: IdmConfig,
        normalizer: IdentityNormalizer,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            config,
            normalizer,
            activity,
        }
    }

    pub fn normalizer(&self) -> &IdentityNormalizer {
        &self.normalizer
    }

    fn directory_url(&self, host: &str) -> String {
        if self.config.use_ldaps {
            format!("ldaps://{}:636", host)
        } else {
            format!("ldap://{}:389", host)
        }
    }

    /// DN de cuenta nativa: uid=<user>,<user_search_base>,<base_dn>.
    fn native_user_dn(&self, username: &str) -> String {
        format!(
            "uid={},{},{}",
            ldap_escape(username),
            self.config.user_search_base,
            self.config.base_dn
        )
    }

    /// DN del subárbol compat para usuarios de confianza sin DC.
    fn compat_user_dn(&self, username: &str) -> String {
        format!("uid={},cn=users,cn=compat,{}", ldap_escape(username), self.config.base_dn)
    }

    async fn bind(&self, host: &str, bind_dn: &str, password: &str) -> Result<(), IdmError> {
        let url = self.directory_url(host);
        let (connection, mut ldap) =
            LdapConnAsync::new(&url)
                .await
                .map_err(|connect_fault| IdmError::Connectivity {
                    host: host.to_string(),
                    detail: connect_fault.to_string(),
                })?;
        ldap3::drive!(connection);

        let bind_outcome = ldap
            .simple_bind(bind_dn, password)
            .await
            .map_err(|bind_fault| IdmError::Connectivity {
                host: host.to_string(),
                detail: bind_fault.to_string(),
            })?;

        let result = bind_outcome.success();
        let _ = ldap.unbind().await;

        match result {
            Ok(_) => Ok(()),
            Err(_) => Err(IdmError::BindRejected(bind_dn.to_string())),
        }
    }

    /// Autentica y devuelve la identidad canónica con sus grupos.
    pub async fn authenticate(
        &self,
        raw_identity: &str,
        password: &str,
    ) -> Result<AuthOutcome, IdmError> {
        if self.config.server_host.is_empty() {
            return Err(IdmError::Configuration("IDM server host missing".to_string()));
        }

        let started = Instant::now();
        let identity = self.normalizer.normalize(raw_identity);

        let attempt = self.authenticate_normalized(&identity, password).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (success, error) = match &attempt {
            Ok(_) => (true, None),
            Err(auth_fault) => (false, Some(auth_fault.to_string())),
        };

        let mut record = ActivityRecord::operation(
            "idm_authenticate",
            &self.config.server_host,
            OperationType::IdmApi,
            success,
        )
        .with_timing(elapsed_ms);
        if let Some(error) = error {
            record = record.with_error(error);
        }
        self.activity.record(record).await;

        attempt
    }

    async fn authenticate_normalized(
        &self,
        identity: &NormalizedIdentity,
        password: &str,
    ) -> Result<AuthOutcome, IdmError> {
        // Usuarios de confianza: pass-through al DC cuando existe.
        if identity.is_ad_trust {
            if let Some(ad_dc_host) = self.config.ad_dc_host.clone() {
                info!(
                    "🛂 [IDM_AUTH]: AD trust user {}, binding through DC {}.",
                    identity.canonical_principal, ad_dc_host
                );
                self.bind(&ad_dc_host, &identity.canonical_principal.to_lowercase(), password)
                    .await?;

                let groups = self.lookup_groups(&identity.username).await;
                return Ok(AuthOutcome {
                    success: true,
                    canonical_principal: identity.canonical_principal.clone(),
                    username: identity.username.clone(),
                    realm: identity.realm.clone(),
                    is_ad_trust: true,
                    groups,
                    method: "ad_dc_passthrough".to_string(),
                });
            }

            // Sin DC: el subárbol compat expone los usuarios de
            // confianza para binds POSIX.
            debug!(
                "[IDM_AUTH]: AD trust user {} via compat tree.",
                identity.canonical_principal
            );
            self.bind(
                &self.config.server_host,
                &self.compat_user_dn(&identity.username),
                password,
            )
            .await?;

            let groups = self.lookup_groups(&identity.username).await;
            return Ok(AuthOutcome {
                success: true,
                canonical_principal: identity.canonical_principal.clone(),
                username: identity.username.clone(),
                realm: identity.realm.clone(),
                is_ad_trust: true,
                groups,
                method: "compat_bind".to_string(),
            });
        }

        // Usuario nativo: bind directo con su DN de cuenta.
        self.bind(
            &self.config.server_host,
            &self.native_user_dn(&identity.username),
            password,
        )
        .await?;

        let groups = self.lookup_groups(&identity.username).await;
        Ok(AuthOutcome {
            success: true,
            canonical_principal: identity.canonical_principal.clone(),
            username: identity.username.clone(),
            realm: identity.realm.clone(),
            is_ad_trust: false,
            groups,
            method: "native_bind".to_string(),
        })
    }

    /// Grupos del usuario vía la cuenta de servicio. Sin cuenta de
    /// servicio la lista queda vacía (consultiva, no bloquea el login).
    async fn lookup_groups(&self, username: &str) -> Vec<String> {
        let (Some(service_dn), Some(service_password)) = (
            self.config.service_account_dn.clone(),
            self.config.service_account_password.clone(),
        ) else {
            return Vec::new();
        };

        let url = self.directory_url(&self.config.server_host);
        let connection_attempt = LdapConnAsync::new(&url).await;
        let (connection, mut ldap) = match connection_attempt {
            Ok(pair) => pair,
            Err(connect_fault) => {
                warn!("⚠️ [IDM_AUTH]: Group lookup connection failed: {}", connect_fault);
                return Vec::new();
            }
        };
        ldap3::drive!(connection);

        if ldap
            .simple_bind(&service_dn, &service_password)
            .await
            .and_then(|outcome| outcome.success())
            .is_err()
        {
            warn!("⚠️ [IDM_AUTH]: Service account bind failed, skipping group lookup.");
            let _ = ldap.unbind().await;
            return Vec::new();
        }

        let search_base = format!("{},{}", self.config.group_search_base, self.config.base_dn);
        let filter = format!("(member=uid={},*)", ldap_escape(username));
        let fallback_filter = format!("(memberUid={})", ldap_escape(username));

        let mut groups = Vec::new();
        for candidate_filter in [filter, fallback_filter] {
            match ldap
                .search(&search_base, Scope::Subtree, &candidate_filter, vec!["cn"])
                .await
                .and_then(|outcome| outcome.success())
            {
                Ok((entries, _)) => {
                    for entry in entries {
                        let entry = SearchEntry::construct(entry);
                        if let Some(names) = entry.attrs.get("cn") {
                            for name in names {
                                if !groups.contains(name) {
                                    groups.push(name.clone());
                                }
                            }
                        }
                    }
                    if !groups.is_empty() {
                        break;
                    }
                }
                Err(search_fault) => {
                    debug!("[IDM_AUTH]: Group search degraded: {}", search_fault);
                }
            }
        }

        let _ = ldap.unbind().await;
        groups
    }

    /// Prueba de conexión con un bind arbitrario.
    pub async fn test_connection(&self, bind_dn: &str, password: &str) -> Result<(), IdmError> {
        self.bind(&self.config.server_host, bind_dn, password).await
    }
}

/// Escapado de valores en filtros LDAP (RFC 4515).
fn ldap_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_values_are_escaped() {
        assert_eq!(ldap_escape("j*smith"), "j\\2asmith");
        assert_eq!(ldap_escape("a(b)c"), "a\\28b\\29c");
        assert_eq!(ldap_escape("plain"), "plain");
    }

    #[test]
    fn config_defaults_cover_ipa_layout() {
        let config: IdmConfig = serde_json::from_str(
            "{\"server_host\": \"idm01.site.local\", \"base_dn\": \"dc=idm,dc=site,dc=local\"}",
        )
        .unwrap();
        assert!(config.use_ldaps);
        assert_eq!(config.user_search_base, "cn=users,cn=accounts");
        assert_eq!(config.group_search_base, "cn=groups,cn=accounts");
    }
}
