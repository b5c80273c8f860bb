// [libs/domain/replication/src/lib.rs]
/*!
 * =================================================================
 * APARATO: REPLICATION DOMAIN CORE
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: CÁLCULO PURO DE LA TUBERÍA DE REPLICACIÓN
 *
 * # Logic:
 * Sin I/O. El motor ejecutor (libs/infra/zfs) delega aquí todo lo que
 * se puede computar sin tocar un host: parseo de las salidas de
 * 'zfs send' en sus múltiples dialectos, selección de la base
 * incremental común y las ventanas de timeout dinámicas por tamaño
 * esperado de transferencia.
 * =================================================================
 */

pub mod chain;
pub mod sizes;

pub use chain::{
    generate_snapshot_name, newest_common_snapshot, parse_snapshot_list, select_incremental_base,
};
pub use sizes::{
    parse_send_size_output, parse_transfer_size, parse_zfs_size_to_bytes, transfer_timeout_for,
};
