// [libs/infra/db-rest/src/activity.rs]
/*!
 * =================================================================
 * APARATO: ACTIVITY TRAIL LOGGER
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DEL RASTRO DE LLAMADAS EXTERNAS
 *
 * # Logic:
 * Una fila en 'idrac_commands' por llamada observable. Este es el
 * único punto del sistema donde los fallos se tragan: un rastro
 * perdido jamás tumba la operación que lo originó.
 * =================================================================
 */

use std::sync::Arc;

use async_trait::async_trait;
use infrasync_domain_models::activity::{ActivityRecord, ActivitySink};
use tracing::debug;

use crate::gateway::DsmGateway;

const ACTIVITY_TABLE: &str = "idrac_commands";

pub struct ActivityLogger {
    gateway: Arc<DsmGateway>,
}

impl ActivityLogger {
    pub fn new(gateway: Arc<DsmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ActivitySink for ActivityLogger {
    async fn record(&self, entry: ActivityRecord) {
        let payload = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(serialization_fault) => {
                debug!(
                    "[ACTIVITY_TRAIL]: Entry serialization swallowed: {}",
                    serialization_fault
                );
                return;
            }
        };

        if let Err(persistence_fault) = self.gateway.insert(ACTIVITY_TABLE, &payload, false).await {
            debug!(
                "[ACTIVITY_TRAIL]: Persistence failure swallowed: {}",
                persistence_fault
            );
        }
    }
}
