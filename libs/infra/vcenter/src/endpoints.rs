// [libs/infra/vcenter/src/endpoints.rs]
//! Contratos de ruta del proveedor (superficie JSON de vCenter).
//! Se consumen tal cual; los tipos de objeto gestionado son del vendor.

pub const SESSION: &str = "/api/session";
pub const CLUSTERS: &str = "/api/vcenter/cluster";
pub const HOSTS: &str = "/api/vcenter/host";
pub const VMS: &str = "/api/vcenter/vm";
pub const DATASTORES: &str = "/api/vcenter/datastore";
pub const NETWORKS: &str = "/api/vcenter/network";
pub const DVSWITCHES: &str = "/api/vcenter/network/distributed-switch";
pub const TASKS: &str = "/api/cis/tasks";

pub fn vm_detail(vm_moid: &str) -> String {
    format!("/api/vcenter/vm/{}", vm_moid)
}

pub fn vm_guest_identity(vm_moid: &str) -> String {
    format!("/api/vcenter/vm/{}/guest/identity", vm_moid)
}

pub fn vm_power_action(vm_moid: &str, action: &str) -> String {
    format!("/api/vcenter/vm/{}/power?action={}", vm_moid, action)
}

pub fn vm_relocate(vm_moid: &str) -> String {
    format!("/api/vcenter/vm/{}?action=relocate&vmw-task=true", vm_moid)
}

pub fn vm_unregister(vm_moid: &str) -> String {
    format!("/api/vcenter/vm/{}?action=unregister", vm_moid)
}

pub fn host_detail(host_moid: &str) -> String {
    format!("/api/vcenter/host/{}", host_moid)
}

pub fn host_maintenance_action(host_moid: &str, action: &str) -> String {
    format!("/api/vcenter/host/{}?action={}&vmw-task=true", host_moid, action)
}

pub fn cluster_detail(cluster_moid: &str) -> String {
    format!("/api/vcenter/cluster/{}", cluster_moid)
}

pub fn cluster_reconfigure(cluster_moid: &str) -> String {
    format!("/api/vcenter/cluster/{}?action=reconfigure&vmw-task=true", cluster_moid)
}

pub fn datastore_browse(datastore_moid: &str) -> String {
    format!("/api/vcenter/datastore/{}/browse", datastore_moid)
}

pub fn task_detail(task_id: &str) -> String {
    format!("/api/cis/tasks/{}", task_id)
}
