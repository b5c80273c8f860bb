// [libs/infra/db-rest/src/gateway.rs]
/*!
 * =================================================================
 * APARATO: DSM PERSISTENCE GATEWAY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: TODO EL TRÁFICO HACIA EL PROXY DE BASE DE DATOS
 *
 * # Logic:
 * Dialecto PostgREST: filtros 'eq./in./is./lte.' en query params,
 * upserts vía 'Prefer: resolution=merge-duplicates' + 'on_conflict',
 * cabeceras 'apikey' y 'Authorization: Bearer' en cada llamada. Las
 * respuestas no-JSON se coaccionan a una forma con '_raw_response'
 * reconocible para que ningún parser aguas abajo reviente; los cuerpos
 * que comienzan con '<SystemConfiguration' se sintetizan como tarea
 * completada (peculiaridad de los exports SCP de Dell).
 * =================================================================
 */

use std::time::Duration;

use infrasync_domain_models::wire::{coerce_json, RAW_RESPONSE_CAP};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::errors::DbError;

/// Presupuesto por defecto para llamadas al proxy.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct DsmGateway {
    http_client: reqwest::Client,
    base_url: String,
    service_role_key: String,
}

impl DsmGateway {
    pub fn new(base_url: &str, service_role_key: &str, verify_ssl: bool) -> Result<Self, DbError> {
        if base_url.trim().is_empty() {
            return Err(DbError::ConfigurationError("DSM_URL undefined".to_string()));
        }
        if service_role_key.trim().is_empty() {
            return Err(DbError::ConfigurationError(
                "SERVICE_ROLE_KEY undefined".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|build_fault| DbError::ConnectionError(build_fault.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn service_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.service_role_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.service_role_key)) {
            headers.insert("Authorization", value);
        }
        headers
    }

    /// Coacciona un cuerpo arbitrario a JSON utilizable.
    pub fn safe_json(raw_body: &str) -> Value {
        coerce_json(raw_body)
    }

    fn guard_service_auth(status: StatusCode, context: &str) -> Result<(), DbError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            error!(
                "🛑 [DSM_AUTH]: Service role rejected while {} (HTTP {}).",
                context,
                status.as_u16()
            );
            return Err(DbError::ServiceAuthRejected(context.to_string()));
        }
        Ok(())
    }

    /// GET /rest/v1/{table}?{query} → JSON (normalmente un arreglo de filas).
    pub async fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Value, DbError> {
        let response = self
            .http_client
            .get(self.table_url(table))
            .headers(self.service_headers())
            .query(query)
            .send()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        let status = response.status();
        Self::guard_service_auth(status, &format!("selecting from {}", table))?;

        let body = response
            .text()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        if !status.is_success() {
            return Err(DbError::QueryRejected {
                table: table.to_string(),
                status: status.as_u16(),
                detail: body.chars().take(RAW_RESPONSE_CAP).collect(),
            });
        }

        Ok(Self::safe_json(&body))
    }

    /// SELECT tipado: deserializa el arreglo de filas al contrato dado.
    pub async fn select_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, DbError> {
        let value = self.select(table, query).await?;
        match value {
            Value::Array(rows) => rows
                .into_iter()
                .map(|row| {
                    serde_json::from_value(row)
                        .map_err(|fault| DbError::MappingError(format!("{}: {}", table, fault)))
                })
                .collect(),
            other => {
                debug!(
                    "[DSM_GATEWAY]: Non-array reply from {} coerced to empty set: {}",
                    table, other
                );
                Ok(Vec::new())
            }
        }
    }

    /// POST /rest/v1/{table}. Con representación devuelve las filas creadas.
    pub async fn insert(
        &self,
        table: &str,
        payload: &Value,
        return_representation: bool,
    ) -> Result<Value, DbError> {
        let prefer = if return_representation {
            "return=representation"
        } else {
            "return=minimal"
        };

        let response = self
            .http_client
            .post(self.table_url(table))
            .headers(self.service_headers())
            .header("Prefer", prefer)
            .json(payload)
            .send()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        let status = response.status();
        Self::guard_service_auth(status, &format!("inserting into {}", table))?;

        let body = response
            .text()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        if !status.is_success() {
            return Err(DbError::QueryRejected {
                table: table.to_string(),
                status: status.as_u16(),
                detail: body.chars().take(RAW_RESPONSE_CAP).collect(),
            });
        }

        if body.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Self::safe_json(&body))
        }
    }

    /// Upsert en lote: merge-duplicates sobre las columnas de conflicto.
    pub async fn upsert(
        &self,
        table: &str,
        rows: &Value,
        on_conflict: &str,
        return_representation: bool,
    ) -> Result<Value, DbError> {
        let prefer = if return_representation {
            "resolution=merge-duplicates,return=representation"
        } else {
            "resolution=merge-duplicates,return=minimal"
        };

        let response = self
            .http_client
            .post(self.table_url(table))
            .headers(self.service_headers())
            .query(&[("on_conflict", on_conflict.to_string())])
            .header("Prefer", prefer)
            .json(rows)
            .send()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        let status = response.status();
        Self::guard_service_auth(status, &format!("upserting into {}", table))?;

        let body = response
            .text()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        if !status.is_success() {
            return Err(DbError::QueryRejected {
                table: table.to_string(),
                status: status.as_u16(),
                detail: body.chars().take(RAW_RESPONSE_CAP).collect(),
            });
        }

        if body.trim().is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Self::safe_json(&body))
        }
    }

    /// PATCH con representación: devuelve las filas afectadas, lo que
    /// permite a los reclamos consultivos saber si ganaron la fila.
    pub async fn patch_returning(
        &self,
        table: &str,
        query: &[(&str, String)],
        payload: &Value,
    ) -> Result<Vec<Value>, DbError> {
        let response = self
            .http_client
            .patch(self.table_url(table))
            .headers(self.service_headers())
            .query(query)
            .header("Prefer", "return=representation")
            .json(payload)
            .send()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        let status = response.status();
        Self::guard_service_auth(status, &format!("patching {}", table))?;

        let body = response
            .text()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        if !status.is_success() {
            return Err(DbError::QueryRejected {
                table: table.to_string(),
                status: status.as_u16(),
                detail: body.chars().take(RAW_RESPONSE_CAP).collect(),
            });
        }

        match Self::safe_json(&body) {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    /// PATCH sin representación.
    pub async fn patch(
        &self,
        table: &str,
        query: &[(&str, String)],
        payload: &Value,
    ) -> Result<(), DbError> {
        let response = self
            .http_client
            .patch(self.table_url(table))
            .headers(self.service_headers())
            .query(query)
            .header("Prefer", "return=minimal")
            .json(payload)
            .send()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        let status = response.status();
        Self::guard_service_auth(status, &format!("patching {}", table))?;

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::QueryRejected {
                table: table.to_string(),
                status: status.as_u16(),
                detail: body.chars().take(RAW_RESPONSE_CAP).collect(),
            });
        }
        Ok(())
    }

    /// DELETE /rest/v1/{table}?{query}.
    pub async fn delete(&self, table: &str, query: &[(&str, String)]) -> Result<(), DbError> {
        let response = self
            .http_client
            .delete(self.table_url(table))
            .headers(self.service_headers())
            .query(query)
            .send()
            .await
            .map_err(|fault| DbError::from_reqwest(table, fault))?;

        let status = response.status();
        Self::guard_service_auth(status, &format!("deleting from {}", table))?;

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::QueryRejected {
                table: table.to_string(),
                status: status.as_u16(),
                detail: body.chars().take(RAW_RESPONSE_CAP).collect(),
            });
        }
        Ok(())
    }

    /// RPC de descifrado: POST /rest/v1/rpc/decrypt_password.
    /// Devuelve None cuando la función remota responde nulo (material
    /// corrupto) y Err en fallos de transporte o autorización.
    pub async fn rpc_decrypt(
        &self,
        encrypted: &str,
        encryption_key: &str,
    ) -> Result<Option<String>, DbError> {
        let url = format!("{}/rest/v1/rpc/decrypt_password", self.base_url);

        let response = self
            .http_client
            .post(url)
            .headers(self.service_headers())
            .json(&json!({ "encrypted": encrypted, "key": encryption_key }))
            .send()
            .await
            .map_err(|fault| DbError::from_reqwest("rpc/decrypt_password", fault))?;

        let status = response.status();
        Self::guard_service_auth(status, "decrypting password")?;

        if !status.is_success() {
            return Err(DbError::DecryptFailed);
        }

        let body = response
            .text()
            .await
            .map_err(|fault| DbError::from_reqwest("rpc/decrypt_password", fault))?;

        // La RPC devuelve el texto plano como cadena JSON.
        match Self::safe_json(&body) {
            Value::String(decrypted) if !decrypted.is_empty() => Ok(Some(decrypted)),
            Value::Null => Ok(None),
            other => {
                if other.get("_parse_error").is_some() {
                    Ok(None)
                } else {
                    Ok(other.as_str().map(str::to_string))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_json_passes_valid_payloads_through() {
        let value = DsmGateway::safe_json("[{\"id\": 1}]");
        assert!(value.is_array());
    }

    #[test]
    fn safe_json_wraps_garbage_with_raw_response() {
        let value = DsmGateway::safe_json("<html>dead</html>");
        assert_eq!(value["_parse_error"], "Not valid JSON");
        assert!(value["_raw_response"].as_str().unwrap().contains("dead"));
    }

    #[test]
    fn scp_xml_is_synthesized_as_completed_task() {
        let value = DsmGateway::safe_json("<SystemConfiguration Model=\"PowerEdge R740\">...");
        assert_eq!(value["TaskState"], "Completed");
        assert_eq!(value["PercentComplete"], 100);
        assert!(value["Messages"][0]["Message"]
            .as_str()
            .unwrap()
            .starts_with("<SystemConfiguration"));
    }

    #[test]
    fn empty_configuration_is_rejected_at_build() {
        assert!(DsmGateway::new("", "key", true).is_err());
        assert!(DsmGateway::new("https://dsm.local", " ", true).is_err());
        assert!(DsmGateway::new("https://dsm.local/", "key", false).is_ok());
    }
}
