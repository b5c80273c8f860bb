// [libs/infra/zfs/src/engine.rs]
/*!
 * =================================================================
 * APARATO: ZFS ENGINE CORE
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: EJECUCIÓN DE LAS PRIMITIVAS SOBRE LOS HOSTS ZFS
 * =================================================================
 */

use std::time::{Duration, Instant};

use chrono::Utc;
use infrasync_domain_models::credential::SshCredentials;
use infrasync_domain_models::replication::SnapshotInfo;
use infrasync_domain_replication::{
    newest_common_snapshot, parse_send_size_output, parse_snapshot_list, parse_transfer_size,
    transfer_timeout_for,
};
use infrasync_infra_ssh::{CommandOutput, SshExecutor};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ZfsError;

/// Presupuesto de las operaciones administrativas (no transferencias).
const ADMIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Opciones SSH de la tubería send|receive (el receptor es efímero,
/// sin verificación de llave de host).
const PIPELINE_SSH_OPTIONS: &str =
    "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -o BatchMode=yes";

/// Dónde ejecutar un comando ZFS: host remoto o el propio ejecutor.
#[derive(Debug, Clone)]
pub enum ZfsEndpoint {
    Remote(SshCredentials),
    Local,
}

impl ZfsEndpoint {
    pub fn hostname(&self) -> &str {
        match self {
            Self::Remote(credentials) => &credentials.hostname,
            Self::Local => "localhost",
        }
    }
}

/// Estimación de 'zfs send -nP'.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendSizeEstimate {
    pub bytes: u64,
    pub incremental: bool,
    pub incremental_from: Option<String>,
}

/// Resultado de una transferencia.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationOutcome {
    pub success: bool,
    pub source_dataset: String,
    pub source_snapshot: String,
    pub target_host: String,
    pub target_dataset: String,
    pub incremental: bool,
    pub incremental_from: Option<String>,
    pub bytes_transferred: u64,
    pub transfer_rate_mbps: f64,
    pub started_at: String,
    pub completed_at: String,
    pub elapsed_seconds: f64,
    pub message: String,
}

/// Resultado de la verificación en el target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub verified: bool,
    pub snapshot_exists: bool,
    pub target_bytes: u64,
    pub expected_bytes: u64,
    pub size_match: bool,
}

/// Salud del pool en el target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetHealth {
    pub healthy: bool,
    pub pool_state: String,
    pub capacity_percent: Option<u8>,
}

pub struct ZfsEngine {
    ssh: SshExecutor,
    /// Modo stub: simula resultados sin tocar hosts (paridad con
    /// ZERFAUX_USE_STUBS).
    stub_mode: bool,
}

impl ZfsEngine {
    pub fn new(stub_mode: bool) -> Self {
        Self {
            ssh: SshExecutor::new(),
            stub_mode,
        }
    }

    async fn exec(
        &self,
        endpoint: &ZfsEndpoint,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ZfsError> {
        match endpoint {
            ZfsEndpoint::Remote(credentials) => {
                Ok(self.ssh.execute(credentials, command, timeout).await?)
            }
            ZfsEndpoint::Local => Ok(self.ssh.execute_local(command, timeout).await?),
        }
    }

    /// ¿Existe el dataset en el endpoint?
    pub async fn dataset_exists(
        &self,
        endpoint: &ZfsEndpoint,
        dataset: &str,
    ) -> Result<bool, ZfsError> {
        if self.stub_mode {
            return Ok(true);
        }

        let command = format!("zfs list -H -o name {}", dataset);
        let output = self.exec(endpoint, &command, ADMIN_TIMEOUT).await?;
        Ok(output.success() && output.stdout.contains(dataset))
    }

    /// Crea un snapshot; falla si ya existe.
    pub async fn create_snapshot(
        &self,
        endpoint: &ZfsEndpoint,
        dataset: &str,
        snapshot_name: &str,
    ) -> Result<String, ZfsError> {
        let full_snapshot = format!("{}@{}", dataset, snapshot_name);

        if self.stub_mode {
            return Ok(full_snapshot);
        }

        info!("📸 [ZFS_ENGINE]: Creating snapshot {}.", full_snapshot);
        let command = format!("zfs snapshot {}", full_snapshot);
        let output = self.exec(endpoint, &command, ADMIN_TIMEOUT).await?;

        if output.success() {
            Ok(full_snapshot)
        } else if output.stderr.contains("dataset already exists") {
            Err(ZfsError::SnapshotExists(full_snapshot))
        } else {
            Err(ZfsError::CommandFailed {
                command,
                stderr: output.stderr,
            })
        }
    }

    /// ¿Existe el snapshot con ese nombre?
    pub async fn snapshot_exists(
        &self,
        endpoint: &ZfsEndpoint,
        dataset: &str,
        snapshot_name: &str,
    ) -> Result<bool, ZfsError> {
        if self.stub_mode {
            return Ok(true);
        }

        let clean_name = snapshot_name.trim_start_matches('@');
        let full_snapshot = format!("{}@{}", dataset, clean_name);
        let command = format!(
            "zfs list -t snapshot -H -o name {} 2>/dev/null",
            full_snapshot
        );
        let output = self.exec(endpoint, &command, Duration::from_secs(30)).await?;
        Ok(output.success() && output.stdout.contains(&full_snapshot))
    }

    /// Lista ordenada de snapshots del dataset.
    pub async fn list_snapshots(
        &self,
        endpoint: &ZfsEndpoint,
        dataset: &str,
    ) -> Result<Vec<SnapshotInfo>, ZfsError> {
        if self.stub_mode {
            return Ok(Vec::new());
        }

        let command = format!(
            "zfs list -t snapshot -H -o name,creation,used,referenced {}",
            dataset
        );
        let output = self.exec(endpoint, &command, ADMIN_TIMEOUT).await?;

        if !output.success() {
            warn!(
                "⚠️ [ZFS_ENGINE]: Snapshot list failed on {}: {}",
                endpoint.hostname(),
                output.stderr.trim()
            );
            return Ok(Vec::new());
        }

        Ok(parse_snapshot_list(&output.stdout))
    }

    /// Estimación exacta con 'zfs send -nP'.
    pub async fn send_size(
        &self,
        endpoint: &ZfsEndpoint,
        dataset: &str,
        snapshot: &str,
        incremental_from: Option<&str>,
    ) -> Result<SendSizeEstimate, ZfsError> {
        if self.stub_mode {
            return Ok(SendSizeEstimate {
                bytes: 64 * 1024 * 1024,
                incremental: incremental_from.is_some(),
                incremental_from: incremental_from.map(str::to_string),
            });
        }

        let command = match incremental_from {
            Some(base) => format!("zfs send -nP -i @{} {}@{}", base, dataset, snapshot),
            None => format!("zfs send -nP {}@{}", dataset, snapshot),
        };

        info!("📐 [ZFS_ENGINE]: Sizing {}@{} ({}).", dataset, snapshot, command);
        let output = self.exec(endpoint, &command, ADMIN_TIMEOUT).await?;

        if !output.success() {
            return Err(ZfsError::CommandFailed {
                command,
                stderr: output.stderr,
            });
        }

        // -nP escribe el plan por stdout o stderr según versión.
        let combined = format!("{}\n{}", output.stdout, output.stderr);
        match parse_send_size_output(&combined) {
            Some(bytes) => Ok(SendSizeEstimate {
                bytes,
                incremental: incremental_from.is_some(),
                incremental_from: incremental_from.map(str::to_string),
            }),
            None => Err(ZfsError::Protocol(format!(
                "could not parse send size from: {}",
                combined.chars().take(300).collect::<String>()
            ))),
        }
    }

    /// Tubería de replicación, ejecutada EN el host de origen.
    ///
    /// Si 'incremental_from' viene pero el dataset no existe en el
    /// target, se degrada a envío completo en silencio. El timeout es
    /// dinámico por tamaño esperado: <1 MB → 120 s, <1 GB → 600 s,
    /// resto → 3600 s.
    #[allow(clippy::too_many_arguments)]
    pub async fn replicate(
        &self,
        source: &ZfsEndpoint,
        source_dataset: &str,
        source_snapshot: &str,
        target_credentials: &SshCredentials,
        target_dataset: &str,
        incremental_from: Option<&str>,
        expected_bytes: u64,
    ) -> Result<ReplicationOutcome, ZfsError> {
        let started = Instant::now();
        let started_at = Utc::now();

        if self.stub_mode {
            return Ok(ReplicationOutcome {
                success: true,
                source_dataset: source_dataset.to_string(),
                source_snapshot: source_snapshot.to_string(),
                target_host: target_credentials.hostname.clone(),
                target_dataset: target_dataset.to_string(),
                incremental: incremental_from.is_some(),
                incremental_from: incremental_from.map(str::to_string),
                bytes_transferred: expected_bytes.max(1024),
                transfer_rate_mbps: 100.0,
                started_at: started_at.to_rfc3339(),
                completed_at: Utc::now().to_rfc3339(),
                elapsed_seconds: 0.1,
                message: "stubbed replication".to_string(),
            });
        }

        // Existencia del dataset destino, con la llave del lado B.
        let target_endpoint = ZfsEndpoint::Remote(target_credentials.clone());
        let destination_exists = self.dataset_exists(&target_endpoint, target_dataset).await?;

        let mut effective_incremental = incremental_from;
        if incremental_from.is_some() && !destination_exists {
            warn!(
                "⚠️ [ZFS_ENGINE]: Destination {} missing on {}, switching to full send.",
                target_dataset, target_credentials.hostname
            );
            effective_incremental = None;
        }

        let timeout = transfer_timeout_for(expected_bytes);
        info!(
            "🚚 [ZFS_ENGINE]: Transfer timeout {}s for expected {} bytes.",
            timeout.as_secs(),
            expected_bytes
        );

        let send_command = match effective_incremental {
            Some(base) => format!("zfs send -v -i @{} {}@{}", base, source_dataset, source_snapshot),
            None => format!("zfs send -v {}@{}", source_dataset, source_snapshot),
        };

        // Recepción con -Fu (rollback forzado, sin montar) y montaje
        // explícito tras un envío completo, evitando "dataset is busy"
        // del NFS compartido.
        let receive_command = if effective_incremental.is_some() {
            format!("zfs receive -Fu {}", target_dataset)
        } else {
            format!(
                "zfs receive -Fu {} && (zfs mount {} 2>/dev/null || true)",
                target_dataset, target_dataset
            )
        };

        let pipeline = format!(
            "{} | ssh {} -p {} {}@{} '{}'",
            send_command,
            PIPELINE_SSH_OPTIONS,
            target_credentials.port,
            target_credentials.username,
            target_credentials.hostname,
            receive_command
        );

        info!(
            "🚀 [ZFS_ENGINE]: Replicating {}@{} -> {}:{} (incremental: {}).",
            source_dataset,
            source_snapshot,
            target_credentials.hostname,
            target_dataset,
            effective_incremental.is_some()
        );

        let output = match self.exec(source, &pipeline, timeout).await {
            Ok(output) => output,
            Err(ZfsError::Ssh(infrasync_infra_ssh::SshError::CommandTimeout(_))) => {
                return Err(ZfsError::TransferTimeout(timeout.as_secs(), expected_bytes));
            }
            Err(other) => return Err(other),
        };

        let elapsed = started.elapsed().as_secs_f64();

        if !output.success() {
            return Err(ZfsError::CommandFailed {
                command: pipeline,
                stderr: output.stderr,
            });
        }

        let combined = format!("{}\n{}", output.stdout, output.stderr);
        let bytes_transferred = parse_transfer_size(&combined);

        Ok(ReplicationOutcome {
            success: true,
            source_dataset: source_dataset.to_string(),
            source_snapshot: source_snapshot.to_string(),
            target_host: target_credentials.hostname.clone(),
            target_dataset: target_dataset.to_string(),
            incremental: effective_incremental.is_some(),
            incremental_from: effective_incremental.map(str::to_string),
            bytes_transferred,
            transfer_rate_mbps: (bytes_transferred as f64 / 1_000_000.0 / elapsed.max(1.0) * 100.0)
                .round()
                / 100.0,
            started_at: started_at.to_rfc3339(),
            completed_at: Utc::now().to_rfc3339(),
            elapsed_seconds: (elapsed * 100.0).round() / 100.0,
            message: format!(
                "Replicated {:.2} MB in {:.2}s",
                bytes_transferred as f64 / 1_000_000.0,
                elapsed
            ),
        })
    }

    /// Verifica el snapshot en el target: existencia + 'referenced'
    /// dentro del 5 % del esperado. Con reintentos: el lado B puede
    /// tardar tras un reinicio o I/O pesado.
    pub async fn verify_on_target(
        &self,
        target_credentials: &SshCredentials,
        target_dataset: &str,
        snapshot_name: &str,
        expected_bytes: u64,
    ) -> Result<VerifyOutcome, ZfsError> {
        if self.stub_mode {
            return Ok(VerifyOutcome {
                verified: true,
                snapshot_exists: true,
                target_bytes: expected_bytes,
                expected_bytes,
                size_match: true,
            });
        }

        let full_snapshot = format!("{}@{}", target_dataset, snapshot_name);

        let exists_command = format!("zfs list -t snapshot {}", full_snapshot);
        let exists_output = self
            .ssh
            .execute_with_retry(
                target_credentials,
                &exists_command,
                ADMIN_TIMEOUT,
                3,
                Duration::from_secs(5),
            )
            .await?;

        if !exists_output.success() {
            return Ok(VerifyOutcome {
                verified: false,
                snapshot_exists: false,
                target_bytes: 0,
                expected_bytes,
                size_match: false,
            });
        }

        let size_command = format!("zfs list -Hp -o referenced {}", full_snapshot);
        let size_output = self
            .ssh
            .execute(target_credentials, &size_command, ADMIN_TIMEOUT)
            .await?;

        let target_bytes = size_output.stdout.trim().parse::<u64>().unwrap_or(0);
        let size_match = if expected_bytes > 0 {
            (target_bytes as i64 - expected_bytes as i64).unsigned_abs()
                < (expected_bytes as f64 * 0.05) as u64
        } else {
            true
        };

        Ok(VerifyOutcome {
            verified: true,
            snapshot_exists: true,
            target_bytes,
            expected_bytes,
            size_match,
        })
    }

    /// Snapshot común más reciente entre origen y target.
    pub async fn find_common_snapshot(
        &self,
        source: &ZfsEndpoint,
        source_dataset: &str,
        target: &ZfsEndpoint,
        target_dataset: &str,
    ) -> Result<Option<String>, ZfsError> {
        let source_snapshots = self.list_snapshots(source, source_dataset).await?;
        let target_snapshots = self.list_snapshots(target, target_dataset).await?;

        let source_names: Vec<String> =
            source_snapshots.iter().map(|snapshot| snapshot.name.clone()).collect();
        let target_names: Vec<String> =
            target_snapshots.iter().map(|snapshot| snapshot.name.clone()).collect();

        let common = newest_common_snapshot(&source_names, &target_names);
        match &common {
            Some(name) => info!("🔗 [ZFS_ENGINE]: Found common snapshot @{}.", name),
            None => info!("🔗 [ZFS_ENGINE]: No common snapshots between source and target."),
        }
        Ok(common)
    }

    /// Borra un snapshot puntual.
    pub async fn delete_snapshot(
        &self,
        endpoint: &ZfsEndpoint,
        dataset: &str,
        snapshot_name: &str,
    ) -> Result<(), ZfsError> {
        if self.stub_mode {
            return Ok(());
        }

        let command = format!("zfs destroy {}@{}", dataset, snapshot_name);
        let output = self.exec(endpoint, &command, ADMIN_TIMEOUT).await?;
        if output.success() {
            Ok(())
        } else {
            Err(ZfsError::CommandFailed {
                command,
                stderr: output.stderr,
            })
        }
    }

    /// Borra TODOS los snapshots del dataset: preparación del target
    /// para re-sembrar con un envío completo cuando no hay snapshot
    /// común. Devuelve (borrados, errores).
    pub async fn delete_all_snapshots(
        &self,
        endpoint: &ZfsEndpoint,
        dataset: &str,
    ) -> Result<(usize, Vec<String>), ZfsError> {
        if self.stub_mode {
            return Ok((0, Vec::new()));
        }

        let snapshots = self.list_snapshots(endpoint, dataset).await?;
        if snapshots.is_empty() {
            return Ok((0, Vec::new()));
        }

        let mut deleted = 0usize;
        let mut errors = Vec::new();

        for snapshot in &snapshots {
            match self.delete_snapshot(endpoint, dataset, &snapshot.name).await {
                Ok(()) => {
                    deleted += 1;
                    info!("🗑️ [ZFS_ENGINE]: Deleted snapshot {}.", snapshot.full_name);
                }
                Err(delete_fault) => {
                    warn!(
                        "⚠️ [ZFS_ENGINE]: Failed to delete {}: {}",
                        snapshot.full_name, delete_fault
                    );
                    errors.push(format!("{}: {}", snapshot.name, delete_fault));
                }
            }
        }

        info!(
            "🗑️ [ZFS_ENGINE]: Deleted {}/{} snapshots, {} errors.",
            deleted,
            snapshots.len(),
            errors.len()
        );
        Ok((deleted, errors))
    }

    /// Salud del pool en el target: estado + capacidad.
    pub async fn target_health(
        &self,
        target_credentials: &SshCredentials,
        pool: &str,
    ) -> Result<TargetHealth, ZfsError> {
        if self.stub_mode {
            return Ok(TargetHealth {
                healthy: true,
                pool_state: "ONLINE".to_string(),
                capacity_percent: Some(12),
            });
        }

        let command = format!("zpool list -H -o health,capacity {}", pool);
        let output = self
            .ssh
            .execute(target_credentials, &command, ADMIN_TIMEOUT)
            .await?;

        if !output.success() {
            return Ok(TargetHealth {
                healthy: false,
                pool_state: format!("UNKNOWN ({})", output.stderr.trim()),
                capacity_percent: None,
            });
        }

        let mut fields = output.stdout.split_whitespace();
        let pool_state = fields.next().unwrap_or("UNKNOWN").to_string();
        let capacity_percent = fields
            .next()
            .and_then(|capacity| capacity.trim_end_matches('%').parse::<u8>().ok());

        Ok(TargetHealth {
            healthy: pool_state == "ONLINE",
            pool_state,
            capacity_percent,
        })
    }
}
