// [libs/infra/db-rest/src/repositories/replication.rs]
/*!
 * =================================================================
 * APARATO: REPLICATION REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CRUD DE LA CAPA DE DR (TARGETS, GRUPOS, VMS, JOBS)
 * =================================================================
 */

use std::sync::Arc;

use chrono::Utc;
use infrasync_domain_models::replication::{
    ProtectedVmRecord, ProtectionGroupRecord, ReplicationJobRecord, ReplicationTargetRecord,
};
use serde_json::{json, Value};

use crate::errors::DbError;
use crate::gateway::DsmGateway;

pub struct ReplicationRepository {
    gateway: Arc<DsmGateway>,
}

impl ReplicationRepository {
    pub fn new(gateway: Arc<DsmGateway>) -> Self {
        Self { gateway }
    }

    // --- TARGETS ---

    pub async fn targets(&self) -> Result<Vec<ReplicationTargetRecord>, DbError> {
        self.gateway
            .select_rows("replication_targets", &[("order", "name".to_string())])
            .await
    }

    pub async fn target_by_id(
        &self,
        target_id: &str,
    ) -> Result<Option<ReplicationTargetRecord>, DbError> {
        let rows: Vec<ReplicationTargetRecord> = self
            .gateway
            .select_rows("replication_targets", &[("id", format!("eq.{}", target_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_target(&self, payload: &Value) -> Result<Value, DbError> {
        self.gateway.insert("replication_targets", payload, true).await
    }

    pub async fn update_target(&self, target_id: &str, payload: &Value) -> Result<(), DbError> {
        self.gateway
            .patch(
                "replication_targets",
                &[("id", format!("eq.{}", target_id))],
                payload,
            )
            .await
    }

    pub async fn delete_target(&self, target_id: &str) -> Result<(), DbError> {
        self.gateway
            .delete("replication_targets", &[("id", format!("eq.{}", target_id))])
            .await
    }

    // --- GRUPOS DE PROTECCIÓN ---

    pub async fn protection_groups(&self) -> Result<Vec<ProtectionGroupRecord>, DbError> {
        self.gateway
            .select_rows("protection_groups", &[("order", "name".to_string())])
            .await
    }

    pub async fn group_by_id(
        &self,
        group_id: &str,
    ) -> Result<Option<ProtectionGroupRecord>, DbError> {
        let rows: Vec<ProtectionGroupRecord> = self
            .gateway
            .select_rows("protection_groups", &[("id", format!("eq.{}", group_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_group(&self, payload: &Value) -> Result<Value, DbError> {
        self.gateway.insert("protection_groups", payload, true).await
    }

    pub async fn update_group(&self, group_id: &str, payload: &Value) -> Result<(), DbError> {
        self.gateway
            .patch(
                "protection_groups",
                &[("id", format!("eq.{}", group_id))],
                payload,
            )
            .await
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<(), DbError> {
        self.gateway
            .delete("protection_groups", &[("id", format!("eq.{}", group_id))])
            .await
    }

    pub async fn touch_group_replication(&self, group_id: &str) -> Result<(), DbError> {
        self.update_group(
            group_id,
            &json!({ "last_replication_at": Utc::now().to_rfc3339() }),
        )
        .await
    }

    // --- VMS PROTEGIDAS ---

    pub async fn protected_vms_for_group(
        &self,
        group_id: &str,
        only_active: bool,
    ) -> Result<Vec<ProtectedVmRecord>, DbError> {
        let mut query = vec![("protection_group_id", format!("eq.{}", group_id))];
        if only_active {
            query.push(("replication_status", "eq.active".to_string()));
        }
        self.gateway.select_rows("protected_vms", &query).await
    }

    pub async fn protected_vm_by_id(
        &self,
        protected_vm_id: &str,
    ) -> Result<Option<ProtectedVmRecord>, DbError> {
        let rows: Vec<ProtectedVmRecord> = self
            .gateway
            .select_rows("protected_vms", &[("id", format!("eq.{}", protected_vm_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn add_protected_vm(&self, payload: &Value) -> Result<Value, DbError> {
        self.gateway.insert("protected_vms", payload, true).await
    }

    pub async fn update_protected_vm(
        &self,
        protected_vm_id: &str,
        payload: &Value,
    ) -> Result<(), DbError> {
        self.gateway
            .patch(
                "protected_vms",
                &[("id", format!("eq.{}", protected_vm_id))],
                payload,
            )
            .await
    }

    pub async fn delete_protected_vm(&self, protected_vm_id: &str) -> Result<(), DbError> {
        self.gateway
            .delete("protected_vms", &[("id", format!("eq.{}", protected_vm_id))])
            .await
    }

    // --- BITÁCORA DE CORRIDAS ---

    pub async fn replication_jobs(&self, limit: usize) -> Result<Vec<ReplicationJobRecord>, DbError> {
        self.gateway
            .select_rows(
                "replication_jobs",
                &[
                    ("order", "started_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await
    }

    pub async fn insert_replication_job(&self, payload: &Value) -> Result<Value, DbError> {
        self.gateway.insert("replication_jobs", payload, true).await
    }

    // --- RESPALDOS SCP ---

    pub async fn insert_scp_backup(&self, payload: &Value) -> Result<Value, DbError> {
        self.gateway.insert("scp_backups", payload, true).await
    }

    pub async fn scp_backup_by_id(&self, backup_id: &str) -> Result<Option<Value>, DbError> {
        let rows: Vec<Value> = self
            .gateway
            .select_rows("scp_backups", &[("id", format!("eq.{}", backup_id))])
            .await?;
        Ok(rows.into_iter().next())
    }
}
