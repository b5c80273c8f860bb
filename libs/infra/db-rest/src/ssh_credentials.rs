// [libs/infra/db-rest/src/ssh_credentials.rs]
/*!
 * =================================================================
 * APARATO: SSH CREDENTIAL MANAGER
 * CLASIFICACIÓN: INFRASTRUCTURE SERVICE (ESTRATO L3)
 * RESPONSABILIDAD: BÚSQUEDA MULTI-FUENTE DE SECRETOS SSH
 *
 * # Logic:
 * Orden de búsqueda del secreto para un target de replicación:
 *   1) llave cifrada propia del target
 *   2) target.ssh_key_id → tabla ssh_keys (active|pending|deployed)
 *   3) hosting_vm_id → VM → plantilla emparejada por reglas difusas
 *   4) source_template_id → plantilla → llave
 *   5) cualquier despliegue de llave para este target
 *   6) configuración SSH global (llave, ruta o contraseña)
 *   7) contraseña provista por el llamador
 * El hostname SSH prefiere la IP de la VM hospedante (siempre
 * alcanzable) sobre la IP del share NFS.
 * =================================================================
 */

use std::sync::Arc;

use infrasync_domain_credentials::fuzzy::{
    extract_site_prefix, is_replication_appliance, template_base_name,
};
use infrasync_domain_models::credential::SshCredentials;
use infrasync_domain_models::inventory::VcenterVmRecord;
use infrasync_domain_models::replication::{
    ReplicationTargetRecord, SshKeyDeploymentRecord, SshKeyRecord, ZfsTargetTemplateRecord,
};
use tracing::{debug, info, warn};

use crate::gateway::DsmGateway;
use crate::resolver::CredentialResolver;

/// Estados de llave aceptables para intentar autenticación.
const USABLE_KEY_STATUSES: [&str; 3] = ["active", "pending", "deployed"];

pub struct SshCredentialManager {
    gateway: Arc<DsmGateway>,
    resolver: Arc<CredentialResolver>,
}

impl SshCredentialManager {
    pub fn new(gateway: Arc<DsmGateway>, resolver: Arc<CredentialResolver>) -> Self {
        Self { gateway, resolver }
    }

    /// Resuelve las credenciales SSH de un target de replicación.
    pub async fn credentials_for_target(
        &self,
        target: &ReplicationTargetRecord,
        fallback_password: Option<&str>,
    ) -> Option<SshCredentials> {
        let nfs_hostname = target.hostname.clone();
        let port = target.port.unwrap_or(22);
        let username = target
            .ssh_username
            .clone()
            .unwrap_or_else(|| "root".to_string());

        // Preferencia de hostname: IP de la VM hospedante.
        let mut ssh_hostname = nfs_hostname.clone();
        if let Some(hosting_vm_id) = target.hosting_vm_id.as_deref() {
            if let Some(vm_hostname) = self.hosting_vm_hostname(hosting_vm_id).await {
                info!(
                    "🔐 [SSH_LOOKUP]: Using hosting VM '{}' instead of NFS IP '{:?}'.",
                    vm_hostname, nfs_hostname
                );
                ssh_hostname = Some(vm_hostname);
            }
        }

        let Some(hostname) = ssh_hostname.filter(|name| !name.is_empty()) else {
            warn!("⚠️ [SSH_LOOKUP]: Target has no hostname or hosting VM.");
            return None;
        };

        let base = SshCredentials {
            hostname,
            nfs_hostname,
            port,
            username,
            key_data: None,
            key_path: None,
            password: None,
            key_source: None,
        };

        // 1) Llave cifrada propia del target.
        if let Some(encrypted) = target.ssh_key_encrypted.as_deref() {
            if let Some(key_data) = self.resolver.decrypt(encrypted).await {
                info!("🔐 [SSH_LOOKUP]: Using target-specific SSH key for {}.", base.hostname);
                return Some(SshCredentials {
                    key_data: Some(key_data),
                    key_source: Some("target_ssh_key_encrypted".to_string()),
                    ..base
                });
            }
        }

        // 2) Referencia directa a la tabla de llaves.
        if let Some(key_id) = target.ssh_key_id.as_deref() {
            if let Some(key_data) = self.fetch_key_by_id(key_id).await {
                return Some(SshCredentials {
                    key_data: Some(key_data),
                    key_source: Some(format!("ssh_key_id:{}", key_id)),
                    ..base
                });
            }
        }

        // 3) Cadena hosting_vm → plantilla difusa → llave.
        if let Some(hosting_vm_id) = target.hosting_vm_id.as_deref() {
            if let Some(key_data) = self.fetch_key_via_hosting_vm(hosting_vm_id).await {
                return Some(SshCredentials {
                    key_data: Some(key_data),
                    key_source: Some(format!("hosting_vm:{}", hosting_vm_id)),
                    ..base
                });
            }
        }

        // 4) Plantilla de origen.
        if let Some(template_id) = target.source_template_id.as_deref() {
            if let Some(key_data) = self.fetch_key_via_template(template_id).await {
                return Some(SshCredentials {
                    key_data: Some(key_data),
                    key_source: Some(format!("source_template:{}", template_id)),
                    ..base
                });
            }
        }

        // 5) Despliegues de llave hacia este target (cualquier estado).
        if let Some(target_id) = target.id.as_deref() {
            if let Some(key_data) = self.fetch_key_via_deployment(target_id).await {
                return Some(SshCredentials {
                    key_data: Some(key_data),
                    key_source: Some(format!("deployment:target:{}", target_id)),
                    ..base
                });
            }
        }

        // 6) Configuración SSH global.
        let (key_data, key_path, settings_password) = self.key_material_from_settings().await;
        if let Some(key_data) = key_data {
            info!("🔐 [SSH_LOOKUP]: Using global SSH key for {}.", base.hostname);
            return Some(SshCredentials {
                key_data: Some(key_data),
                key_source: Some("activity_settings:key_data".to_string()),
                ..base
            });
        }
        if let Some(key_path) = key_path {
            info!("🔐 [SSH_LOOKUP]: Using SSH key path for {}.", base.hostname);
            return Some(SshCredentials {
                key_path: Some(key_path),
                key_source: Some("activity_settings:key_path".to_string()),
                ..base
            });
        }
        if let Some(password) = settings_password {
            info!("🔐 [SSH_LOOKUP]: Using SSH password from settings for {}.", base.hostname);
            return Some(SshCredentials {
                password: Some(password),
                key_source: Some("activity_settings:password".to_string()),
                ..base
            });
        }

        // 7) Contraseña provista por el llamador.
        if let Some(password) = fallback_password.filter(|password| !password.is_empty()) {
            info!("🔐 [SSH_LOOKUP]: Using provided password for {}.", base.hostname);
            return Some(SshCredentials {
                password: Some(password.to_string()),
                key_source: Some("provided_password".to_string()),
                ..base
            });
        }

        warn!(
            "⚠️ [SSH_LOOKUP]: No credentials available for {}. Assign an SSH key or run SSH Key Exchange.",
            base.hostname
        );
        None
    }

    /// IP (preferida) o nombre de la VM hospedante.
    async fn hosting_vm_hostname(&self, hosting_vm_id: &str) -> Option<String> {
        let rows: Vec<VcenterVmRecord> = self
            .gateway
            .select_rows(
                "vcenter_vms",
                &[
                    ("id", format!("eq.{}", hosting_vm_id)),
                    ("select", "name,ip_address,vcenter_id,source_vcenter_id".to_string()),
                ],
            )
            .await
            .ok()?;

        let vm = rows.into_iter().next()?;
        if let Some(ip_address) = vm.ip_address.filter(|ip| !ip.is_empty()) {
            debug!("[SSH_LOOKUP]: Resolved hosting VM '{}' to IP {}.", vm.name, ip_address);
            return Some(ip_address);
        }
        if !vm.name.is_empty() {
            debug!("[SSH_LOOKUP]: Using VM name (no IP available): {}.", vm.name);
            return Some(vm.name);
        }
        None
    }

    /// Llave por id si su estado es utilizable, descifrada.
    async fn fetch_key_by_id(&self, ssh_key_id: &str) -> Option<String> {
        let rows: Vec<SshKeyRecord> = self
            .gateway
            .select_rows(
                "ssh_keys",
                &[
                    ("id", format!("eq.{}", ssh_key_id)),
                    ("select", "id,name,private_key_encrypted,status".to_string()),
                ],
            )
            .await
            .ok()?;

        let key = rows.into_iter().next()?;
        let status = key.status.clone().unwrap_or_default();
        if !USABLE_KEY_STATUSES.contains(&status.as_str()) {
            debug!("[SSH_LOOKUP]: Key {} has status '{}', skipping.", ssh_key_id, status);
            return None;
        }

        let encrypted = key.private_key_encrypted?;
        let key_data = self.resolver.decrypt(&encrypted).await?;
        info!(
            "🔐 [SSH_LOOKUP]: Using SSH key '{}'.",
            key.name.unwrap_or_else(|| ssh_key_id.to_string())
        );
        Some(key_data)
    }

    /// Cadena hosting_vm → vcenter_vms → zfs_target_templates con
    /// emparejado difuso; último recurso: despliegues sobre la VM.
    async fn fetch_key_via_hosting_vm(&self, hosting_vm_id: &str) -> Option<String> {
        debug!("[SSH_LOOKUP]: Starting key search for hosting_vm_id={}.", hosting_vm_id);

        let vms: Vec<VcenterVmRecord> = self
            .gateway
            .select_rows(
                "vcenter_vms",
                &[
                    ("id", format!("eq.{}", hosting_vm_id)),
                    ("select", "id,name,vcenter_id,source_vcenter_id".to_string()),
                ],
            )
            .await
            .ok()?;
        let vm = vms.into_iter().next()?;
        let vm_name = vm.name.clone();
        let vm_vcenter = vm.source_vcenter_id.clone();

        let templates: Vec<ZfsTargetTemplateRecord> = self
            .gateway
            .select_rows(
                "zfs_target_templates",
                &[
                    ("is_active", "eq.true".to_string()),
                    ("select", "id,name,ssh_key_id,template_name,vcenter_id".to_string()),
                ],
            )
            .await
            .unwrap_or_default();

        if templates.is_empty() {
            warn!("⚠️ [SSH_LOOKUP]: No active templates in zfs_target_templates.");
        }

        let vm_site = extract_site_prefix(&vm_name);
        let vm_is_appliance = is_replication_appliance(&vm_name);
        debug!(
            "[SSH_LOOKUP]: VM analysis: site={:?}, is_repl={}.",
            vm_site, vm_is_appliance
        );

        let mut same_vcenter_fallback: Option<&ZfsTargetTemplateRecord> = None;

        for template in &templates {
            let Some(key_id) = template.ssh_key_id.as_deref() else { continue };
            let template_name = template.name.clone().unwrap_or_default();

            // Candidato a fallback: mismo vCenter y con llave.
            if template.vcenter_id.as_deref() == Some(vm_vcenter.as_str())
                && same_vcenter_fallback.is_none()
            {
                same_vcenter_fallback = Some(template);
            }

            // Prefijo exacto por nombre de plantilla.
            let name_base = template_base_name(&template_name);
            if !name_base.is_empty() && vm_name.starts_with(&name_base) {
                info!(
                    "✅ [SSH_LOOKUP]: Name prefix match: template '{}' for VM '{}'.",
                    template_name, vm_name
                );
                return self.fetch_key_by_id(key_id).await;
            }

            // Prefijo exacto por nombre de la VM plantilla.
            if let Some(template_vm_name) = template.template_name.as_deref() {
                let template_vm_base = template_base_name(template_vm_name);
                if !template_vm_base.is_empty() && vm_name.starts_with(&template_vm_base) {
                    info!(
                        "✅ [SSH_LOOKUP]: Template VM name match: '{}' via template_name field.",
                        template_name
                    );
                    return self.fetch_key_by_id(key_id).await;
                }
            }

            // Sitio + appliance de replicación.
            let template_site = extract_site_prefix(&template_name);
            if let (Some(vm_site), Some(template_site)) = (vm_site.as_deref(), template_site.as_deref())
            {
                if vm_site == template_site
                    && vm_is_appliance
                    && is_replication_appliance(&template_name)
                {
                    info!(
                        "✅ [SSH_LOOKUP]: Site + replication pattern match: template '{}' to VM '{}'.",
                        template_name, vm_name
                    );
                    return self.fetch_key_by_id(key_id).await;
                }
            }
        }

        if let Some(fallback) = same_vcenter_fallback {
            info!(
                "⚡ [SSH_LOOKUP]: vCenter fallback: using template '{}' (same vCenter).",
                fallback.name.clone().unwrap_or_default()
            );
            if let Some(key_id) = fallback.ssh_key_id.as_deref() {
                return self.fetch_key_by_id(key_id).await;
            }
        }

        warn!(
            "⚠️ [SSH_LOOKUP]: No template matched VM '{}' by name patterns.",
            vm_name
        );

        // Despliegues de llave sobre la VM hospedante.
        let deployments: Vec<SshKeyDeploymentRecord> = self
            .gateway
            .select_rows(
                "ssh_key_deployments",
                &[
                    ("hosting_vm_id", format!("eq.{}", hosting_vm_id)),
                    ("status", "in.(deployed,active,pending)".to_string()),
                    ("select", "ssh_key_id".to_string()),
                ],
            )
            .await
            .unwrap_or_default();

        if let Some(deployment) = deployments.first() {
            info!("✅ [SSH_LOOKUP]: Found SSH key deployment for hosting VM '{}'.", vm_name);
            if let Some(key_id) = deployment.ssh_key_id.as_deref() {
                return self.fetch_key_by_id(key_id).await;
            }
        }

        warn!("⚠️ [SSH_LOOKUP]: No SSH key found via hosting VM.");
        None
    }

    /// source_template_id → plantilla → llave.
    async fn fetch_key_via_template(&self, template_id: &str) -> Option<String> {
        let templates: Vec<ZfsTargetTemplateRecord> = self
            .gateway
            .select_rows(
                "zfs_target_templates",
                &[
                    ("id", format!("eq.{}", template_id)),
                    ("select", "id,name,ssh_key_id".to_string()),
                ],
            )
            .await
            .ok()?;

        let template = templates.into_iter().next()?;
        let key_id = template.ssh_key_id?;
        info!(
            "🔐 [SSH_LOOKUP]: Found SSH key via source template '{}'.",
            template.name.unwrap_or_else(|| template_id.to_string())
        );
        self.fetch_key_by_id(&key_id).await
    }

    /// Despliegues hacia un target; se prefiere estado 'deployed' pero
    /// cualquier llave desplegada vale la pena intentarse.
    async fn fetch_key_via_deployment(&self, target_id: &str) -> Option<String> {
        let deployments: Vec<SshKeyDeploymentRecord> = self
            .gateway
            .select_rows(
                "ssh_key_deployments",
                &[
                    ("replication_target_id", format!("eq.{}", target_id)),
                    ("select", "ssh_key_id,status".to_string()),
                ],
            )
            .await
            .unwrap_or_default();

        if deployments.is_empty() {
            return None;
        }

        let chosen = deployments
            .iter()
            .find(|deployment| deployment.status.as_deref() == Some("deployed"))
            .or_else(|| deployments.first())?;

        info!(
            "🔐 [SSH_LOOKUP]: Found deployed key (status: {:?}) for target {}.",
            chosen.status, target_id
        );
        self.fetch_key_by_id(chosen.ssh_key_id.as_deref()?).await
    }

    /// Material global de 'activity_settings': (key_data, key_path, password).
    async fn key_material_from_settings(&self) -> (Option<String>, Option<String>, Option<String>) {
        let rows: Vec<infrasync_domain_models::credential::ActivitySettingsRecord> = match self
            .gateway
            .select_rows(
                "activity_settings",
                &[("select", "*".to_string()), ("limit", "1".to_string())],
            )
            .await
        {
            Ok(rows) => rows,
            Err(fetch_fault) => {
                warn!("⚠️ [SSH_LOOKUP]: activity_settings fetch failed: {}", fetch_fault);
                return (None, None, None);
            }
        };

        let Some(settings) = rows.into_iter().next() else {
            return (None, None, None);
        };

        if let Some(encrypted) = settings.ssh_private_key_encrypted.as_deref() {
            if let Some(key_data) = self.resolver.decrypt(encrypted).await {
                return (Some(key_data), None, None);
            }
        }

        if let Some(key_path) = settings.ssh_private_key_path.filter(|path| !path.is_empty()) {
            return (None, Some(key_path), None);
        }

        if let Some(encrypted) = settings.ssh_password_encrypted.as_deref() {
            if let Some(password) = self.resolver.decrypt(encrypted).await {
                return (None, None, Some(password));
            }
        }

        (None, None, None)
    }
}
