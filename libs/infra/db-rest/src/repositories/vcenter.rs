// [libs/infra/db-rest/src/repositories/vcenter.rs]
/*!
 * =================================================================
 * APARATO: VCENTER INVENTORY REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: UPSERTS EN LOTE DEL INVENTARIO DERIVADO
 *
 * # Logic:
 * Clave natural de cada upsert: (vcenter_id, source_vcenter_id), el id
 * de objeto gestionado acotado por el vCenter de origen. Los lotes se
 * emiten completos por tipo; el upserter (app) decide los tamaños.
 * =================================================================
 */

use std::sync::Arc;

use infrasync_domain_models::inventory::{
    VcenterClusterRecord, VcenterDatastoreRecord, VcenterHostRecord, VcenterNetworkRecord,
    VcenterVmRecord,
};
use serde_json::{json, Value};

use crate::errors::DbError;
use crate::gateway::DsmGateway;

const UPSERT_CONFLICT_KEY: &str = "vcenter_id,source_vcenter_id";

pub struct VcenterRepository {
    gateway: Arc<DsmGateway>,
}

impl VcenterRepository {
    pub fn new(gateway: Arc<DsmGateway>) -> Self {
        Self { gateway }
    }

    pub async fn host_by_id(&self, host_id: &str) -> Result<Option<VcenterHostRecord>, DbError> {
        let rows: Vec<VcenterHostRecord> = self
            .gateway
            .select_rows("vcenter_hosts", &[("id", format!("eq.{}", host_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn patch_host(&self, host_id: &str, payload: &Value) -> Result<(), DbError> {
        self.gateway
            .patch("vcenter_hosts", &[("id", format!("eq.{}", host_id))], payload)
            .await
    }

    pub async fn upsert_clusters(
        &self,
        clusters: &[VcenterClusterRecord],
    ) -> Result<usize, DbError> {
        if clusters.is_empty() {
            return Ok(0);
        }
        let payload = serde_json::to_value(clusters)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;
        self.gateway
            .upsert("vcenter_clusters", &payload, UPSERT_CONFLICT_KEY, false)
            .await?;
        Ok(clusters.len())
    }

    /// Upsert de hosts con representación: el auto-enlace necesita los
    /// ids locales recién asignados.
    pub async fn upsert_hosts_returning(
        &self,
        hosts: &[VcenterHostRecord],
    ) -> Result<Vec<VcenterHostRecord>, DbError> {
        if hosts.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::to_value(hosts)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;
        let returned = self
            .gateway
            .upsert("vcenter_hosts", &payload, UPSERT_CONFLICT_KEY, true)
            .await?;

        match returned {
            Value::Array(rows) => rows
                .into_iter()
                .map(|row| {
                    serde_json::from_value(row)
                        .map_err(|fault| DbError::MappingError(fault.to_string()))
                })
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn upsert_datastores(
        &self,
        datastores: &[VcenterDatastoreRecord],
    ) -> Result<usize, DbError> {
        if datastores.is_empty() {
            return Ok(0);
        }
        let payload = serde_json::to_value(datastores)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;
        self.gateway
            .upsert("vcenter_datastores", &payload, UPSERT_CONFLICT_KEY, false)
            .await?;
        Ok(datastores.len())
    }

    pub async fn upsert_networks(
        &self,
        networks: &[VcenterNetworkRecord],
    ) -> Result<usize, DbError> {
        if networks.is_empty() {
            return Ok(0);
        }
        let payload = serde_json::to_value(networks)
            .map_err(|fault| DbError::MappingError(fault.to_string()))?;
        self.gateway
            .upsert("vcenter_networks", &payload, UPSERT_CONFLICT_KEY, false)
            .await?;
        Ok(networks.len())
    }

    pub async fn upsert_vms(&self, vms: &[VcenterVmRecord]) -> Result<usize, DbError> {
        if vms.is_empty() {
            return Ok(0);
        }
        let payload =
            serde_json::to_value(vms).map_err(|fault| DbError::MappingError(fault.to_string()))?;
        self.gateway
            .upsert("vcenter_vms", &payload, UPSERT_CONFLICT_KEY, false)
            .await?;
        Ok(vms.len())
    }

    pub async fn vms_for_vcenter(
        &self,
        source_vcenter_id: &str,
    ) -> Result<Vec<VcenterVmRecord>, DbError> {
        self.gateway
            .select_rows(
                "vcenter_vms",
                &[
                    ("source_vcenter_id", format!("eq.{}", source_vcenter_id)),
                    ("order", "name".to_string()),
                ],
            )
            .await
    }

    pub async fn vm_by_id(&self, vm_id: &str) -> Result<Option<VcenterVmRecord>, DbError> {
        let rows: Vec<VcenterVmRecord> = self
            .gateway
            .select_rows("vcenter_vms", &[("id", format!("eq.{}", vm_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Datastores registrados para un vCenter, para la detección de
    /// desapariciones entre sincronizaciones.
    pub async fn datastores_for(
        &self,
        source_vcenter_id: &str,
    ) -> Result<Vec<VcenterDatastoreRecord>, DbError> {
        self.gateway
            .select_rows(
                "vcenter_datastores",
                &[("source_vcenter_id", format!("eq.{}", source_vcenter_id))],
            )
            .await
    }

    /// Enlaza host ↔ servidor en ambas direcciones.
    pub async fn link_host_to_server(
        &self,
        host_id: &str,
        server_id: &str,
    ) -> Result<(), DbError> {
        self.gateway
            .patch(
                "servers",
                &[("id", format!("eq.{}", server_id))],
                &json!({ "vcenter_host_id": host_id }),
            )
            .await?;
        self.gateway
            .patch(
                "vcenter_hosts",
                &[("id", format!("eq.{}", host_id))],
                &json!({ "server_id": server_id }),
            )
            .await
    }
}
