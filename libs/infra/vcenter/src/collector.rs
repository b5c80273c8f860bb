// [libs/infra/vcenter/src/collector.rs]
/*!
 * =================================================================
 * APARATO: INVENTORY COLLECTOR
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: RECOLECCIÓN DE INVENTARIO EN PASADA ÚNICA
 *
 * # Logic:
 * Una petición en lote por tipo de entidad por sincronización
 * (clusters, hosts, VMs, datastores, redes). Cada entidad sale con su
 * id de objeto gestionado, nombre y punteros relacionales a los padres
 * (cluster_name, host_name) más el conjunto mínimo de atributos que el
 * upserter necesita. El recolector JAMÁS escribe a la base de datos.
 * El enriquecimiento profundo de VMs (guest OS, IPs, datastores) es
 * opcional: multiplica las llamadas por VM.
 * =================================================================
 */

use std::collections::HashMap;
use std::time::Instant;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::endpoints;
use crate::error::VcError;
use crate::session::{VcSession, VcSessionManager};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedCluster {
    pub moid: String,
    pub name: String,
    pub drs_enabled: Option<bool>,
    pub ha_enabled: Option<bool>,
    pub host_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedHost {
    pub moid: String,
    pub name: String,
    pub connection_state: String,
    pub cluster_name: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedVm {
    pub moid: String,
    pub name: String,
    pub power_state: String,
    pub guest_os: Option<String>,
    pub ip_address: Option<String>,
    pub host_name: Option<String>,
    pub cluster_name: Option<String>,
    pub datastores: Vec<String>,
    pub cpu_count: Option<u32>,
    pub memory_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedDatastore {
    pub moid: String,
    pub name: String,
    pub datastore_type: Option<String>,
    pub capacity_bytes: Option<u64>,
    pub free_bytes: Option<u64>,
    pub accessible: bool,
    pub host_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedNetwork {
    pub moid: String,
    pub name: String,
    /// StandardNetwork | DistributedVirtualPortgroup
    pub network_type: String,
    pub vlan_id: Option<i32>,
    pub vlan_type: Option<String>,
    pub vlan_range: Option<String>,
    pub parent_switch_name: Option<String>,
    pub parent_switch_id: Option<String>,
    pub uplink_port_group: bool,
    pub accessible: bool,
    pub host_count: u32,
    pub vm_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedDvSwitch {
    pub moid: String,
    pub name: String,
}

/// Árbol en memoria de una pasada de inventario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedInventory {
    pub clusters: Vec<CollectedCluster>,
    pub hosts: Vec<CollectedHost>,
    pub vms: Vec<CollectedVm>,
    pub datastores: Vec<CollectedDatastore>,
    pub networks: Vec<CollectedNetwork>,
    pub dvpgs: Vec<CollectedNetwork>,
    pub dvswitches: Vec<CollectedDvSwitch>,
    pub fetch_time_ms: u64,
    pub errors: Vec<String>,
}

impl CollectedInventory {
    pub fn total_objects(&self) -> usize {
        self.clusters.len()
            + self.hosts.len()
            + self.vms.len()
            + self.datastores.len()
            + self.networks.len()
            + self.dvpgs.len()
    }
}

pub struct InventoryCollector<'a> {
    manager: &'a VcSessionManager,
    /// Enriquecimiento por-VM (guest OS, IP, datastores). Multiplica
    /// las llamadas: apagado por defecto.
    deep_relationships: bool,
}

impl<'a> InventoryCollector<'a> {
    pub fn new(manager: &'a VcSessionManager, deep_relationships: bool) -> Self {
        Self {
            manager,
            deep_relationships,
        }
    }

    async fn list(&self, session: &VcSession, path: &str) -> Result<Vec<Value>, VcError> {
        let body = self.manager.request(session, Method::GET, path, None).await?;
        Ok(body.as_array().cloned().unwrap_or_default())
    }

    /// Pasada completa de inventario.
    pub async fn collect(&self, session: &VcSession) -> Result<CollectedInventory, VcError> {
        let started = Instant::now();
        let mut inventory = CollectedInventory::default();

        // 1. CLUSTERS (lote único).
        let cluster_entries = self.list(session, endpoints::CLUSTERS).await?;
        let mut cluster_name_by_moid: HashMap<String, String> = HashMap::new();
        for entry in &cluster_entries {
            let moid = text(entry, "cluster");
            let name = text(entry, "name");
            cluster_name_by_moid.insert(moid.clone(), name.clone());
            inventory.clusters.push(CollectedCluster {
                moid,
                name,
                drs_enabled: entry.get("drs_enabled").and_then(Value::as_bool),
                ha_enabled: entry.get("ha_enabled").and_then(Value::as_bool),
                host_count: 0,
            });
        }

        // 2. HOSTS: lote global + membresía por cluster para el puntero
        //    relacional. El número de serie viene del detalle por host
        //    (los hosts son pocos; las VMs son las que escalan).
        let mut host_cluster: HashMap<String, String> = HashMap::new();
        for cluster in &inventory.clusters {
            let path = format!("{}?clusters={}", endpoints::HOSTS, cluster.moid);
            match self.list(session, &path).await {
                Ok(members) => {
                    for member in members {
                        host_cluster.insert(text(&member, "host"), cluster.name.clone());
                    }
                }
                Err(membership_fault) => inventory
                    .errors
                    .push(format!("cluster {} membership: {}", cluster.name, membership_fault)),
            }
        }

        let host_entries = self.list(session, endpoints::HOSTS).await?;
        let mut host_name_by_moid: HashMap<String, String> = HashMap::new();
        for entry in &host_entries {
            let moid = text(entry, "host");
            let name = text(entry, "name");
            host_name_by_moid.insert(moid.clone(), name.clone());

            let serial_number = match self
                .manager
                .request(session, Method::GET, &endpoints::host_detail(&moid), None)
                .await
            {
                Ok(detail) => detail
                    .pointer("/hardware/serial_number")
                    .or_else(|| detail.get("serial_number"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                Err(detail_fault) => {
                    debug!("[VC_COLLECTOR]: host {} detail degraded: {}", name, detail_fault);
                    None
                }
            };

            let cluster_name = host_cluster.get(&moid).cloned();
            if let Some(cluster_name) = &cluster_name {
                if let Some(cluster) = inventory
                    .clusters
                    .iter_mut()
                    .find(|cluster| &cluster.name == cluster_name)
                {
                    cluster.host_count += 1;
                }
            }

            inventory.hosts.push(CollectedHost {
                moid,
                name,
                connection_state: text(entry, "connection_state"),
                cluster_name,
                serial_number,
            });
        }

        // 3. VMS (lote único; enriquecimiento opcional).
        let vm_entries = self.list(session, endpoints::VMS).await?;
        for entry in &vm_entries {
            let moid = text(entry, "vm");
            let mut vm = CollectedVm {
                moid: moid.clone(),
                name: text(entry, "name"),
                power_state: text(entry, "power_state"),
                cpu_count: entry.get("cpu_count").and_then(Value::as_u64).map(|count| count as u32),
                memory_mb: entry.get("memory_size_MiB").and_then(Value::as_u64),
                ..Default::default()
            };

            if self.deep_relationships {
                match self
                    .manager
                    .request(session, Method::GET, &endpoints::vm_detail(&moid), None)
                    .await
                {
                    Ok(detail) => {
                        vm.guest_os = detail
                            .get("guest_OS")
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        vm.host_name = detail
                            .pointer("/placement/host")
                            .and_then(Value::as_str)
                            .and_then(|host_moid| host_name_by_moid.get(host_moid).cloned());
                        vm.cluster_name = detail
                            .pointer("/placement/cluster")
                            .and_then(Value::as_str)
                            .and_then(|cluster_moid| cluster_name_by_moid.get(cluster_moid).cloned());
                        if let Some(disks) = detail.get("disks").and_then(Value::as_object) {
                            for disk in disks.values() {
                                if let Some(datastore) = disk
                                    .pointer("/backing/datastore_name")
                                    .and_then(Value::as_str)
                                {
                                    if !vm.datastores.contains(&datastore.to_string()) {
                                        vm.datastores.push(datastore.to_string());
                                    }
                                }
                            }
                        }
                    }
                    Err(detail_fault) => {
                        inventory
                            .errors
                            .push(format!("vm {} detail: {}", vm.name, detail_fault));
                    }
                }

                if let Ok(identity) = self
                    .manager
                    .request(
                        session,
                        Method::GET,
                        &endpoints::vm_guest_identity(&moid),
                        None,
                    )
                    .await
                {
                    vm.ip_address = identity
                        .get("ip_address")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
            }

            inventory.vms.push(vm);
        }

        // 4. DATASTORES (lote único).
        let datastore_entries = self.list(session, endpoints::DATASTORES).await?;
        for entry in &datastore_entries {
            inventory.datastores.push(CollectedDatastore {
                moid: text(entry, "datastore"),
                name: text(entry, "name"),
                datastore_type: entry.get("type").and_then(Value::as_str).map(str::to_string),
                capacity_bytes: entry.get("capacity").and_then(Value::as_u64),
                free_bytes: entry.get("free_space").and_then(Value::as_u64),
                accessible: entry.get("accessible").and_then(Value::as_bool).unwrap_or(true),
                host_count: entry.get("host_count").and_then(Value::as_u64).map(|count| count as u32),
            });
        }

        // 5. REDES: estándar y portgroups distribuidos en el mismo lote.
        let network_entries = self.list(session, endpoints::NETWORKS).await?;
        for entry in &network_entries {
            let vendor_type = text(entry, "type");
            let is_distributed = vendor_type == "DISTRIBUTED_PORTGROUP";
            let network = CollectedNetwork {
                moid: text(entry, "network"),
                name: text(entry, "name"),
                network_type: if is_distributed {
                    "DistributedVirtualPortgroup".to_string()
                } else {
                    "StandardNetwork".to_string()
                },
                vlan_id: entry
                    .get("vlan_id")
                    .and_then(Value::as_i64)
                    .map(|vlan| vlan as i32),
                vlan_type: entry.get("vlan_type").and_then(Value::as_str).map(str::to_string),
                vlan_range: entry.get("vlan_range").and_then(Value::as_str).map(str::to_string),
                parent_switch_name: entry
                    .get("parent_switch_name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                parent_switch_id: entry
                    .get("parent_switch")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                uplink_port_group: entry
                    .get("uplink_port_group")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                accessible: entry.get("accessible").and_then(Value::as_bool).unwrap_or(true),
                host_count: entry.get("host_count").and_then(Value::as_u64).unwrap_or(0) as u32,
                vm_count: entry.get("vm_count").and_then(Value::as_u64).unwrap_or(0) as u32,
            };

            if is_distributed {
                inventory.dvpgs.push(network);
            } else {
                inventory.networks.push(network);
            }
        }

        // 6. SWITCHES DISTRIBUIDOS (consultivo; puede no existir).
        match self.list(session, endpoints::DVSWITCHES).await {
            Ok(entries) => {
                for entry in entries {
                    inventory.dvswitches.push(CollectedDvSwitch {
                        moid: text(&entry, "distributed_switch"),
                        name: text(&entry, "name"),
                    });
                }
            }
            Err(switch_fault) => {
                debug!("[VC_COLLECTOR]: dvswitch listing degraded: {}", switch_fault);
            }
        }

        // Contrato de advertencia: cero redes con hosts presentes es un
        // resultado sospechoso que el upserter debe reportar.
        if inventory.networks.is_empty()
            && inventory.dvpgs.is_empty()
            && !inventory.hosts.is_empty()
        {
            warn!(
                "⚠️ [VC_COLLECTOR]: Zero networks with {} hosts on {}.",
                inventory.hosts.len(),
                session.host
            );
            inventory
                .errors
                .push("zero networks returned with non-zero hosts".to_string());
        }

        inventory.fetch_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "📦 [VC_COLLECTOR]: Fetched {} objects from {} in {} ms.",
            inventory.total_objects(),
            session.host,
            inventory.fetch_time_ms
        );

        Ok(inventory)
    }
}

fn text(entry: &Value, key: &str) -> String {
    entry.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}
