// [libs/infra/db-rest/src/repositories/servers.rs]
//! Tabla 'servers': iDRACs descubiertos y registrados.

use std::sync::Arc;

use infrasync_domain_models::server::ServerRecord;
use serde_json::{json, Value};

use crate::errors::DbError;
use crate::gateway::DsmGateway;

const SERVERS_TABLE: &str = "servers";

pub struct ServerRepository {
    gateway: Arc<DsmGateway>,
}

impl ServerRepository {
    pub fn new(gateway: Arc<DsmGateway>) -> Self {
        Self { gateway }
    }

    pub async fn by_id(&self, server_id: &str) -> Result<Option<ServerRecord>, DbError> {
        let rows: Vec<ServerRecord> = self
            .gateway
            .select_rows(SERVERS_TABLE, &[("id", format!("eq.{}", server_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn by_ids(&self, server_ids: &[String]) -> Result<Vec<ServerRecord>, DbError> {
        if server_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.gateway
            .select_rows(
                SERVERS_TABLE,
                &[("id", format!("in.({})", server_ids.join(",")))],
            )
            .await
    }

    pub async fn all(&self) -> Result<Vec<ServerRecord>, DbError> {
        self.gateway.select_rows(SERVERS_TABLE, &[]).await
    }

    pub async fn by_ips(&self, ip_addresses: &[String]) -> Result<Vec<ServerRecord>, DbError> {
        if ip_addresses.is_empty() {
            return Ok(Vec::new());
        }
        self.gateway
            .select_rows(
                SERVERS_TABLE,
                &[
                    ("ip_address", format!("in.({})", ip_addresses.join(","))),
                    ("select", "id,ip_address,hostname,service_tag".to_string()),
                ],
            )
            .await
    }

    /// Alta/actualización de un servidor descubierto, clave natural: IP.
    pub async fn upsert_discovered(
        &self,
        ip_address: &str,
        hostname: Option<&str>,
        model: Option<&str>,
        service_tag: Option<&str>,
        discovered_by_credential_set_id: Option<&str>,
    ) -> Result<(), DbError> {
        let row = json!([{
            "ip_address": ip_address,
            "hostname": hostname,
            "model": model,
            "service_tag": service_tag,
            "discovered_by_credential_set_id": discovered_by_credential_set_id,
        }]);

        self.gateway
            .upsert(SERVERS_TABLE, &row, "ip_address", false)
            .await
            .map(|_| ())
    }

    pub async fn patch(&self, server_id: &str, payload: &Value) -> Result<(), DbError> {
        self.gateway
            .patch(SERVERS_TABLE, &[("id", format!("eq.{}", server_id))], payload)
            .await
    }

    /// Servidores con service_tag y sin enlace a host vCenter, para el
    /// auto-enlace posterior al upsert de hosts.
    pub async fn unlinked_with_service_tag(&self) -> Result<Vec<ServerRecord>, DbError> {
        self.gateway
            .select_rows(
                SERVERS_TABLE,
                &[
                    ("select", "id,ip_address,hostname,service_tag".to_string()),
                    ("vcenter_host_id", "is.null".to_string()),
                    ("service_tag", "not.is.null".to_string()),
                ],
            )
            .await
    }
}
