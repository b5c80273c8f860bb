// [libs/infra/vcenter/src/lib.rs]
/*!
 * =================================================================
 * APARATO: VCENTER ADAPTER
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: SESIONES, INVENTARIO Y OPERACIONES VCENTER
 *
 * # Logic:
 * La superficie JSON del proveedor se consume tal cual detrás de
 * clientes tipados. El gestor de sesiones mantiene a lo sumo una
 * sesión viva por host de vCenter (mapa bajo mutex); el recolector
 * preserva el contrato de "una pasada en lote por tipo de entidad";
 * las operaciones largas revalidan la sesión antes de cada brecha.
 * =================================================================
 */

pub mod collector;
pub mod endpoints;
pub mod error;
pub mod ops;
pub mod session;

pub use collector::{CollectedInventory, InventoryCollector};
pub use error::VcError;
pub use ops::{TaskState, VcOps, VmSummary};
pub use session::{VcSession, VcSessionManager};
