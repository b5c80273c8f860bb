// [libs/infra/db-rest/src/repositories/settings.rs]
//! Tablas 'activity_settings' y 'vcenter_settings'.

use std::sync::Arc;

use infrasync_domain_models::credential::ActivitySettingsRecord;
use infrasync_domain_models::inventory::VcenterSettingsRecord;

use crate::errors::DbError;
use crate::gateway::DsmGateway;

pub struct SettingsRepository {
    gateway: Arc<DsmGateway>,
}

impl SettingsRepository {
    pub fn new(gateway: Arc<DsmGateway>) -> Self {
        Self { gateway }
    }

    /// Fila única de umbrales de ejecución. Ausente ⇒ defaults.
    pub async fn activity_settings(&self) -> ActivitySettingsRecord {
        self.gateway
            .select_rows::<ActivitySettingsRecord>(
                "activity_settings",
                &[("select", "*".to_string()), ("limit", "1".to_string())],
            )
            .await
            .ok()
            .and_then(|rows| rows.into_iter().next())
            .unwrap_or_default()
    }

    pub async fn vcenter_by_id(
        &self,
        vcenter_id: &str,
    ) -> Result<Option<VcenterSettingsRecord>, DbError> {
        let rows: Vec<VcenterSettingsRecord> = self
            .gateway
            .select_rows("vcenter_settings", &[("id", format!("eq.{}", vcenter_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn all_vcenters(&self) -> Result<Vec<VcenterSettingsRecord>, DbError> {
        self.gateway
            .select_rows("vcenter_settings", &[("order", "host".to_string())])
            .await
    }
}
