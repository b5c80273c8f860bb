// [libs/infra/zfs/src/error.rs]
//! Catálogo de fallos del motor ZFS.

use infrasync_infra_ssh::SshError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZfsError {
    #[error("[L3_ZFS_SSH_FAULT]: {0}")]
    Ssh(#[from] SshError),

    #[error("[L3_ZFS_CMD_FAULT]: COMMAND_REJECTED '{command}' -> {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// El snapshot ya existe: crear de nuevo es un error del llamador.
    #[error("[L3_ZFS_FAULT]: SNAPSHOT_ALREADY_EXISTS {0}")]
    SnapshotExists(String),

    #[error("[L3_ZFS_FAULT]: TRANSFER_TIMEOUT after {0}s (expected {1} bytes)")]
    TransferTimeout(u64, u64),

    /// Salida bien formada que no se pudo interpretar.
    #[error("[L3_ZFS_PROTOCOL_FAULT]: {0}")]
    Protocol(String),
}
