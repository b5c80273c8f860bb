// [libs/infra/idrac/src/ops.rs]
/*!
 * =================================================================
 * APARATO: IDRAC TYPED OPERATIONS
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: OPERACIONES DE CAPACIDAD SOBRE EL TRANSPORTE
 *
 * # Logic:
 * Cada operación devuelve un diccionario estructurado listo para la
 * bolsa 'details' de un trabajo o para la respuesta del API síncrono.
 * Las sondas de descubrimiento (TCP, raíz Redfish sin autenticar) NO
 * cuentan un 401 como fallo: un iDRAC que exige credenciales es un
 * iDRAC detectado.
 * =================================================================
 */

use std::time::{Duration, Instant};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;

use crate::client::{Correlation, IdracClient, IdracSession, RawRedfishReply};
use crate::endpoints;
use crate::error::IdracError;

/// Presupuesto corto de las sondas de descubrimiento.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Resultado de la sonda TCP (etapa 1 del descubrimiento).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityProbe {
    pub reachable: bool,
    pub response_time_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Resultado de la sonda Redfish sin autenticar (etapa 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedfishDetection {
    pub detected: bool,
    #[serde(default)]
    pub status: Option<u16>,
}

impl IdracClient {
    /// Etapa 1: ¿responde el puerto 443?
    pub async fn tcp_probe(&self, ip: &str, timeout: Duration) -> ConnectivityProbe {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect((ip, 443u16))).await {
            Ok(Ok(_stream)) => ConnectivityProbe {
                reachable: true,
                response_time_ms: started.elapsed().as_millis() as u64,
                error: None,
            },
            Ok(Err(connect_fault)) => ConnectivityProbe {
                reachable: false,
                response_time_ms: started.elapsed().as_millis() as u64,
                error: Some(connect_fault.to_string()),
            },
            Err(_) => ConnectivityProbe {
                reachable: false,
                response_time_ms: timeout.as_millis() as u64,
                error: Some("tcp connect timeout".to_string()),
            },
        }
    }

    /// Etapa 2: raíz Redfish sin autenticar. Un 401/403 también cuenta
    /// como detección: el servicio existe y exige credenciales.
    pub async fn probe_redfish_root(&self, ip: &str) -> RedfishDetection {
        let session = IdracSession::new(ip, "", "");
        let reply = self
            .request_raw(
                Method::GET,
                &session,
                endpoints::REDFISH_ROOT,
                None,
                &Correlation::default(),
                PROBE_TIMEOUT,
                false,
            )
            .await;

        match reply {
            Err(_) => RedfishDetection {
                detected: false,
                status: None,
            },
            Ok(RawRedfishReply { status, body, .. }) => {
                let looks_like_redfish = body
                    .get("RedfishVersion")
                    .or_else(|| body.get("Product"))
                    .is_some()
                    || body.to_string().contains("Redfish");
                RedfishDetection {
                    detected: matches!(status, 401 | 403) || (status == 200 && looks_like_redfish),
                    status: Some(status),
                }
            }
        }
    }

    /// Etapa 3 / prueba de credenciales: raíz Redfish autenticada.
    pub async fn authenticate_probe(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let body = self
            .request(
                Method::GET,
                session,
                endpoints::REDFISH_ROOT,
                None,
                correlation,
                PROBE_TIMEOUT,
            )
            .await?;

        Ok(json!({
            "success": true,
            "redfish_version": body.get("RedfishVersion"),
            "product": body.get("Product"),
            "vendor": body.get("Vendor"),
        }))
    }

    /// Información de sistema: modelo, service tag, energía, salud.
    pub async fn system_info(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let body = self
            .request(
                Method::GET,
                session,
                endpoints::SYSTEM,
                None,
                correlation,
                super::client::DEFAULT_OPERATION_TIMEOUT,
            )
            .await?;

        Ok(json!({
            "system": {
                "model": body.get("Model"),
                "manufacturer": body.get("Manufacturer"),
                "service_tag": body.get("SKU"),
                "serial_number": body.get("SerialNumber"),
                "hostname": body.get("HostName"),
                "bios_version": body.get("BiosVersion"),
                "power_state": body.get("PowerState"),
                "health": body.pointer("/Status/Health"),
                "memory_gib": body.pointer("/MemorySummary/TotalSystemMemoryGiB"),
                "cpu_count": body.pointer("/ProcessorSummary/Count"),
                "cpu_model": body.pointer("/ProcessorSummary/Model"),
            }
        }))
    }

    /// Salud agregada (subconjunto de system_info).
    pub async fn health(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let info = self.system_info(session, correlation).await?;
        Ok(json!({
            "overall": info.pointer("/system/health"),
            "power_state": info.pointer("/system/power_state"),
            "model": info.pointer("/system/model"),
        }))
    }

    /// Estado del Lifecycle Controller vía la acción OEM de Dell.
    pub async fn lifecycle_controller_status(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let body = self
            .request(
                Method::POST,
                session,
                endpoints::LC_STATUS_ACTION,
                Some(&json!({})),
                correlation,
                super::client::DEFAULT_OPERATION_TIMEOUT,
            )
            .await?;

        Ok(json!({
            "status": body.get("LCStatus").cloned().unwrap_or(json!("Unknown")),
            "server_status": body.get("ServerStatus").cloned().unwrap_or(json!("Unknown")),
            "message": body.pointer("/Status").cloned().unwrap_or(Value::Null),
        }))
    }

    /// Cola de trabajos del iDRAC, con estado por entrada.
    pub async fn job_queue(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Vec<Value>, IdracError> {
        let body = self
            .request(
                Method::GET,
                session,
                endpoints::JOB_QUEUE,
                None,
                correlation,
                super::client::DEFAULT_OPERATION_TIMEOUT,
            )
            .await?;

        let jobs = body
            .get("Members")
            .and_then(Value::as_array)
            .map(|members| {
                members
                    .iter()
                    .map(|member| {
                        json!({
                            "id": member.get("Id"),
                            "name": member.get("Name"),
                            "job_state": member.get("JobState"),
                            "job_type": member.get("JobType"),
                            "percent_complete": member.get("PercentComplete"),
                            "message": member.get("Message"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(jobs)
    }

    /// Cambio de estado de energía (On, ForceOff, GracefulShutdown,
    /// ForceRestart, GracefulRestart, PowerCycle, Nmi).
    pub async fn set_power_state(
        &self,
        session: &IdracSession,
        reset_type: &str,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        self.request(
            Method::POST,
            session,
            endpoints::POWER_ACTION,
            Some(&json!({ "ResetType": reset_type })),
            correlation,
            super::client::DEFAULT_OPERATION_TIMEOUT,
        )
        .await?;

        Ok(json!({ "success": true, "action": reset_type }))
    }

    /// Lectura de la configuración de red del iDRAC (atributos IPv4/NIC/DNS).
    pub async fn network_settings(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let body = self
            .request(
                Method::GET,
                session,
                endpoints::MANAGER_ATTRIBUTES,
                None,
                correlation,
                super::client::DEFAULT_OPERATION_TIMEOUT,
            )
            .await?;

        let attributes = body.get("Attributes").cloned().unwrap_or(json!({}));
        let pick = |key: &str| attributes.get(key).cloned().unwrap_or(Value::Null);

        Ok(json!({
            "ipv4": {
                "address": pick("IPv4.1.Address"),
                "gateway": pick("IPv4.1.Gateway"),
                "netmask": pick("IPv4.1.Netmask"),
                "dhcp_enable": pick("IPv4.1.DHCPEnable"),
            },
            "dns": {
                "dns1": pick("IPv4.1.DNS1"),
                "dns2": pick("IPv4.1.DNS2"),
                "dns_from_dhcp": pick("IPv4.1.DNSFromDHCP"),
                "dns_domain_name": pick("NIC.1.DNSDomainName"),
                "dns_rac_name": pick("NIC.1.DNSRacName"),
            },
            "nic": {
                "enable": pick("NIC.1.Enable"),
                "selection": pick("NIC.1.Selection"),
                "vlan_enable": pick("NIC.1.VLanEnable"),
                "vlan_id": pick("NIC.1.VLanID"),
            },
        }))
    }

    /// Escritura parcial de atributos de red. El llamador arma el mapa
    /// 'Attributes' con las claves del proveedor.
    pub async fn set_network_settings(
        &self,
        session: &IdracSession,
        attributes: &Value,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        self.request(
            Method::PATCH,
            session,
            endpoints::MANAGER_ATTRIBUTES,
            Some(&json!({ "Attributes": attributes })),
            correlation,
            super::client::DEFAULT_OPERATION_TIMEOUT,
        )
        .await?;

        Ok(json!({ "success": true, "applied": attributes }))
    }

    /// Atributos BIOS completos.
    pub async fn bios_attributes(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let body = self
            .request(
                Method::GET,
                session,
                endpoints::BIOS,
                None,
                correlation,
                super::client::DEFAULT_OPERATION_TIMEOUT,
            )
            .await?;

        Ok(json!({
            "attributes": body.get("Attributes").cloned().unwrap_or(json!({})),
        }))
    }

    /// Inventario de firmware instalado.
    pub async fn firmware_inventory(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Vec<Value>, IdracError> {
        let body = self
            .request(
                Method::GET,
                session,
                endpoints::FIRMWARE_INVENTORY,
                None,
                correlation,
                Duration::from_secs(60),
            )
            .await?;

        let inventory = body
            .get("Members")
            .and_then(Value::as_array)
            .map(|members| {
                members
                    .iter()
                    .filter(|member| {
                        member
                            .get("Id")
                            .and_then(Value::as_str)
                            .map(|id| id.starts_with("Installed"))
                            .unwrap_or(true)
                    })
                    .map(|member| {
                        json!({
                            "id": member.get("Id"),
                            "name": member.get("Name"),
                            "version": member.get("Version"),
                            "updateable": member.get("Updateable"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(inventory)
    }

    /// Modo de arranque + orden de arranque actual.
    pub async fn boot_config(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let bios = self.bios_attributes(session, correlation).await?;
        let boot_mode = bios
            .pointer("/attributes/BootMode")
            .cloned()
            .unwrap_or(Value::Null);

        let options = self
            .request(
                Method::GET,
                session,
                endpoints::BOOT_OPTIONS,
                None,
                correlation,
                super::client::DEFAULT_OPERATION_TIMEOUT,
            )
            .await?;

        let boot_order: Vec<Value> = options
            .get("Members")
            .and_then(Value::as_array)
            .map(|members| {
                members
                    .iter()
                    .map(|member| {
                        json!({
                            "id": member.get("Id"),
                            "display_name": member.get("DisplayName"),
                            "enabled": member.get("BootOptionEnabled"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({ "boot_mode": boot_mode, "boot_order": boot_order }))
    }

    /// Información para lanzar la consola virtual: sesión KVM temporal
    /// si el firmware la expone, URL de login como respaldo.
    pub async fn kvm_launch_info(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let kvm_session = self
            .request(
                Method::POST,
                session,
                endpoints::KVM_SESSION_ACTION,
                Some(&json!({ "SessionTypeName": "Virtual Console" })),
                correlation,
                super::client::DEFAULT_OPERATION_TIMEOUT,
            )
            .await;

        match kvm_session {
            Ok(body) => Ok(json!({
                "console_url": format!("https://{}/console", session.ip),
                "temp_username": body.get("TempUsername"),
                "temp_password": body.get("TempPassword"),
            })),
            // Firmware sin la acción OEM: respaldo a la página de login.
            Err(IdracError::Http { .. }) => Ok(json!({
                "console_url": format!("https://{}/", session.ip),
                "temp_username": Value::Null,
                "temp_password": Value::Null,
            })),
            Err(other) => Err(other),
        }
    }

    /// Bitácoras de eventos: SEL o Lifecycle.
    pub async fn event_logs(
        &self,
        session: &IdracSession,
        log_type: &str,
        correlation: &Correlation,
    ) -> Result<Vec<Value>, IdracError> {
        let endpoint = if log_type.eq_ignore_ascii_case("lifecycle") {
            endpoints::LC_LOG
        } else {
            endpoints::SEL_LOG
        };

        let body = self
            .request(
                Method::GET,
                session,
                endpoint,
                None,
                correlation,
                Duration::from_secs(60),
            )
            .await?;

        let entries = body
            .get("Members")
            .and_then(Value::as_array)
            .map(|members| {
                members
                    .iter()
                    .map(|member| {
                        json!({
                            "id": member.get("Id"),
                            "created": member.get("Created"),
                            "severity": member.get("Severity"),
                            "message": member.get("Message"),
                            "message_id": member.get("MessageId"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(entries)
    }

    /// Versión de firmware y modelo del manager.
    pub async fn manager_info(
        &self,
        session: &IdracSession,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let body = self
            .request(
                Method::GET,
                session,
                endpoints::MANAGER,
                None,
                correlation,
                super::client::DEFAULT_OPERATION_TIMEOUT,
            )
            .await?;

        Ok(json!({
            "firmware_version": body.get("FirmwareVersion"),
            "model": body.get("Model"),
        }))
    }

    /// ¿Puede el iDRAC alcanzar el repositorio de Dell? (catálogo online).
    pub async fn test_repo_reachability(
        &self,
        session: &IdracSession,
        repository_host: &str,
        correlation: &Correlation,
    ) -> Result<Value, IdracError> {
        let outcome = self
            .request(
                Method::POST,
                session,
                endpoints::TEST_NETWORK_SHARE_ACTION,
                Some(&json!({
                    "ShareType": "HTTPS",
                    "IPAddress": repository_host,
                    "ShareName": "/",
                })),
                correlation,
                Duration::from_secs(60),
            )
            .await;

        let network = self.network_settings(session, correlation).await;
        let dns_configured = network
            .as_ref()
            .ok()
            .and_then(|settings| settings.pointer("/dns/dns1"))
            .and_then(Value::as_str)
            .map(|dns| !dns.is_empty() && dns != "0.0.0.0")
            .unwrap_or(false);

        Ok(json!({
            "dell_reachable": outcome.is_ok(),
            "dns_configured": dns_configured,
            "repository_host": repository_host,
        }))
    }

    /// Dispara el export SCP; devuelve la respuesta cruda (202 +
    /// Location del monitor de tarea, o contenido directo).
    pub async fn export_system_configuration(
        &self,
        session: &IdracSession,
        payload: &Value,
        correlation: &Correlation,
    ) -> Result<RawRedfishReply, IdracError> {
        self.request_raw(
            Method::POST,
            session,
            endpoints::SCP_EXPORT_ACTION,
            Some(payload),
            correlation,
            super::client::DEFAULT_OPERATION_TIMEOUT,
            true,
        )
        .await
    }

    /// Dispara el import SCP.
    pub async fn import_system_configuration(
        &self,
        session: &IdracSession,
        payload: &Value,
        correlation: &Correlation,
    ) -> Result<RawRedfishReply, IdracError> {
        self.request_raw(
            Method::POST,
            session,
            endpoints::SCP_IMPORT_ACTION,
            Some(payload),
            correlation,
            super::client::DEFAULT_OPERATION_TIMEOUT,
            true,
        )
        .await
    }

    /// Lee un monitor de tarea. El cuerpo llega ya coaccionado: un
    /// export Local que responde XML se ve como tarea completada.
    pub async fn task_monitor(
        &self,
        session: &IdracSession,
        task_path: &str,
        correlation: &Correlation,
    ) -> Result<RawRedfishReply, IdracError> {
        self.request_raw(
            Method::GET,
            session,
            task_path,
            None,
            correlation,
            super::client::DEFAULT_OPERATION_TIMEOUT,
            true,
        )
        .await
    }
}

/// Heurística de soporte de export Local: iDRAC9 (firmware 3.x en
/// adelante) lo soporta; 7/8 con firmware 2.x requieren HTTP Push o share.
pub fn supports_local_export(firmware_version: &str) -> bool {
    firmware_version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .map(|major| major >= 3)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_export_support_by_firmware_major() {
        assert!(supports_local_export("3.36.0.0"));
        assert!(supports_local_export("7.00.00.172"));
        assert!(!supports_local_export("2.82.82.82"));
        assert!(supports_local_export("garbage"));
    }
}
