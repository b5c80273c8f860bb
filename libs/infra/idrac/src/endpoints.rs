// [libs/infra/idrac/src/endpoints.rs]
//! Contratos de ruta del proveedor (Redfish estándar + extensiones OEM
//! de Dell). Se consumen tal cual; el catálogo no se interpreta.

pub const REDFISH_ROOT: &str = "/redfish/v1/";
pub const SYSTEM: &str = "/redfish/v1/Systems/System.Embedded.1";
pub const MANAGER: &str = "/redfish/v1/Managers/iDRAC.Embedded.1";
pub const MANAGER_ATTRIBUTES: &str = "/redfish/v1/Managers/iDRAC.Embedded.1/Attributes";
pub const BIOS: &str = "/redfish/v1/Systems/System.Embedded.1/Bios";
pub const BOOT_OPTIONS: &str =
    "/redfish/v1/Systems/System.Embedded.1/BootOptions?$expand=*($levels=1)";
pub const JOB_QUEUE: &str = "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs?$expand=*($levels=1)";
pub const FIRMWARE_INVENTORY: &str =
    "/redfish/v1/UpdateService/FirmwareInventory?$expand=*($levels=1)";
pub const POWER_ACTION: &str =
    "/redfish/v1/Systems/System.Embedded.1/Actions/ComputerSystem.Reset";
pub const SEL_LOG: &str = "/redfish/v1/Managers/iDRAC.Embedded.1/LogServices/Sel/Entries";
pub const LC_LOG: &str = "/redfish/v1/Managers/iDRAC.Embedded.1/LogServices/Lclog/Entries";
pub const LC_STATUS_ACTION: &str =
    "/redfish/v1/Dell/Managers/iDRAC.Embedded.1/DellLCService/Actions/DellLCService.GetRemoteServicesAPIStatus";
pub const KVM_SESSION_ACTION: &str =
    "/redfish/v1/Managers/iDRAC.Embedded.1/Oem/Dell/DelliDRACCardService/Actions/DelliDRACCardService.GetKVMSession";
pub const TEST_NETWORK_SHARE_ACTION: &str =
    "/redfish/v1/Dell/Managers/iDRAC.Embedded.1/DellLCService/Actions/DellLCService.TestNetworkShare";
pub const SCP_EXPORT_ACTION: &str =
    "/redfish/v1/Managers/iDRAC.Embedded.1/Actions/Oem/EID_674_Manager.ExportSystemConfiguration";
pub const SCP_IMPORT_ACTION: &str =
    "/redfish/v1/Managers/iDRAC.Embedded.1/Actions/Oem/EID_674_Manager.ImportSystemConfiguration";
