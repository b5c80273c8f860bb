// [apps/job-executor/src/state.rs]
/*!
 * =================================================================
 * APARATO: APPLICATION SHARED STATE
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: COMPOSICIÓN DE CAPACIDADES DEL EJECUTOR
 *
 * # Logic:
 * Sin estado global: cada componente recibe exactamente los
 * colaboradores que necesita. El estado compartido entre handlers se
 * limita a los cachés documentados (sesiones vCenter, llave de
 * cifrado) que viven dentro de sus propios componentes.
 * =================================================================
 */

use std::sync::Arc;

use infrasync_domain_identity::IdentityNormalizer;
use infrasync_domain_models::activity::ActivitySink;
use infrasync_infra_db::repositories::{
    JobRepository, ReplicationRepository, ServerRepository, SettingsRepository, TaskRepository,
    VcenterRepository,
};
use infrasync_infra_db::{ActivityLogger, CredentialResolver, DsmGateway, SshCredentialManager};
use infrasync_infra_idm::{IdmAuthenticator, IdmConfig};
use infrasync_infra_idrac::IdracClient;
use infrasync_infra_vcenter::{VcOps, VcSessionManager};
use infrasync_infra_zfs::ZfsEngine;
use tracing::{info, warn};

use crate::config::ExecutorConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ExecutorConfig>,
    pub gateway: Arc<DsmGateway>,
    pub activity: Arc<dyn ActivitySink>,
    pub resolver: Arc<CredentialResolver>,
    pub ssh_credentials: Arc<SshCredentialManager>,
    pub idrac: Arc<IdracClient>,
    pub vcenter_sessions: Arc<VcSessionManager>,
    pub vcenter_ops: Arc<VcOps>,
    pub zfs: Arc<ZfsEngine>,
    pub jobs: Arc<JobRepository>,
    pub tasks: Arc<TaskRepository>,
    pub servers: Arc<ServerRepository>,
    pub settings: Arc<SettingsRepository>,
    pub vcenter_rows: Arc<VcenterRepository>,
    pub replication_rows: Arc<ReplicationRepository>,
    pub idm: Option<Arc<IdmAuthenticator>>,
}

impl AppState {
    /// Secuencia de ignición: pasarela → bitácora → resolver →
    /// adaptadores de protocolo → repositorios.
    pub fn ignite(config: ExecutorConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let gateway = Arc::new(DsmGateway::new(
            &config.dsm_url,
            &config.service_role_key,
            config.verify_ssl,
        )?);

        let activity: Arc<dyn ActivitySink> = Arc::new(ActivityLogger::new(gateway.clone()));

        let resolver = Arc::new(CredentialResolver::new(
            gateway.clone(),
            Some(config.idrac_default_user.clone()),
            Some(config.idrac_default_password.clone()),
        ));

        let ssh_credentials = Arc::new(SshCredentialManager::new(
            gateway.clone(),
            resolver.clone(),
        ));

        let idrac = Arc::new(IdracClient::new(activity.clone())?);

        let vcenter_sessions = Arc::new(VcSessionManager::new(
            resolver.clone(),
            activity.clone(),
        )?);
        let vcenter_ops = Arc::new(VcOps::new(vcenter_sessions.clone(), activity.clone()));

        let zfs = Arc::new(ZfsEngine::new(config.use_stubs));
        if config.use_stubs {
            warn!("⚠️ [IGNITION]: ZFS engine running in STUB mode (ZERFAUX_USE_STUBS).");
        }

        let idm = Self::build_idm(activity.clone());

        info!(
            "🧩 [IGNITION]: State assembled (executor identity: {}).",
            config.executor_identity
        );

        Ok(Self {
            jobs: Arc::new(JobRepository::new(gateway.clone())),
            tasks: Arc::new(TaskRepository::new(gateway.clone())),
            servers: Arc::new(ServerRepository::new(gateway.clone())),
            settings: Arc::new(SettingsRepository::new(gateway.clone())),
            vcenter_rows: Arc::new(VcenterRepository::new(gateway.clone())),
            replication_rows: Arc::new(ReplicationRepository::new(gateway.clone())),
            config,
            gateway,
            activity,
            resolver,
            ssh_credentials,
            idrac,
            vcenter_sessions,
            vcenter_ops,
            zfs,
            idm,
        })
    }

    /// El autenticador IDM es opcional: sin host configurado, el
    /// endpoint de autenticación responde 503.
    fn build_idm(activity: Arc<dyn ActivitySink>) -> Option<Arc<IdmAuthenticator>> {
        let server_host = std::env::var("IDM_SERVER_HOST").ok()?;
        let base_dn = std::env::var("IDM_BASE_DN").ok()?;

        let trusted_domains: Vec<String> = std::env::var("IDM_TRUSTED_DOMAINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|domain| domain.trim().to_string())
                    .filter(|domain| !domain.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let ipa_domain = std::env::var("IDM_DOMAIN")
            .unwrap_or_else(|_| base_dn.replace("dc=", "").replace(',', "."));
        let ipa_realm = ipa_domain.to_uppercase();

        let normalizer = IdentityNormalizer::new(
            &ipa_realm,
            &ipa_domain,
            trusted_domains.clone(),
            None,
        );

        let idm_config = IdmConfig {
            server_host,
            base_dn,
            use_ldaps: true,
            user_search_base: "cn=users,cn=accounts".to_string(),
            group_search_base: "cn=groups,cn=accounts".to_string(),
            service_account_dn: std::env::var("IDM_SERVICE_ACCOUNT_DN").ok(),
            service_account_password: std::env::var("IDM_SERVICE_ACCOUNT_PASSWORD").ok(),
            ad_dc_host: std::env::var("IDM_AD_DC_HOST").ok(),
            trusted_domains,
        };

        info!("🛂 [IGNITION]: IDM authenticator configured for {}.", idm_config.server_host);
        Some(Arc::new(IdmAuthenticator::new(idm_config, normalizer, activity)))
    }
}
