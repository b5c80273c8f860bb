// [libs/infra/ssh/src/lib.rs]
/*!
 * =================================================================
 * APARATO: SSH EXECUTION ADAPTER
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: EJECUCIÓN REMOTA/LOCAL DE COMANDOS DE FLOTA
 *
 * # Logic:
 * Una sesión por secuencia de comandos, jamás cacheada, siempre
 * cerrada en disciplina de liberación garantizada. La verificación de
 * llave de host está deshabilitada (appliances ZFS efímeros). La
 * autenticación prefiere llave (dato en memoria o ruta) y cae a
 * contraseña. Cuando el ejecutor corre sobre el propio host ZFS, los
 * comandos se ejecutan localmente vía shell.
 * =================================================================
 */

use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use infrasync_domain_models::credential::SshCredentials;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SshError {
    #[error("[L3_SSH_FAULT]: CONNECTION_FAILED to {host} -> {detail}")]
    ConnectionFailed { host: String, detail: String },

    #[error("[L3_SSH_FAULT]: NO_SECRET_MATERIAL for {0}")]
    NoSecretMaterial(String),

    #[error("[L3_SSH_FAULT]: COMMAND_TIMEOUT after {0:?}")]
    CommandTimeout(Duration),

    #[error("[L3_SSH_FAULT]: EXEC_CHANNEL_FAILED -> {0}")]
    ExecFailed(String),

    #[error("[L3_SSH_FAULT]: LOCAL_EXEC_FAILED -> {0}")]
    LocalExecFailed(String),
}

/// Salida de un comando, remoto o local.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: u32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Ejecutor SSH sin estado. Las credenciales llegan resueltas.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor;

impl SshExecutor {
    pub fn new() -> Self {
        Self
    }

    fn auth_method(credentials: &SshCredentials) -> Result<AuthMethod, SshError> {
        if let Some(key_data) = credentials.key_data.as_deref() {
            return Ok(AuthMethod::with_key(key_data, None));
        }
        if let Some(key_path) = credentials.key_path.as_deref() {
            if !key_path.trim().is_empty() {
                return Ok(AuthMethod::with_key_file(key_path, None));
            }
        }
        if let Some(password) = credentials.password.as_deref() {
            return Ok(AuthMethod::with_password(password));
        }
        Err(SshError::NoSecretMaterial(credentials.hostname.clone()))
    }

    async fn connect(&self, credentials: &SshCredentials) -> Result<Client, SshError> {
        let auth = Self::auth_method(credentials)?;
        let address = (credentials.hostname.as_str(), credentials.port);

        debug!(
            "🔐 [SSH_LINK]: Opening session to {}@{}:{}",
            credentials.username, credentials.hostname, credentials.port
        );

        Client::connect(address, &credentials.username, auth, ServerCheckMethod::NoCheck)
            .await
            .map_err(|connection_fault| SshError::ConnectionFailed {
                host: credentials.hostname.clone(),
                detail: connection_fault.to_string(),
            })
    }

    /// Ejecuta un comando remoto con timeout explícito. La sesión se
    /// cierra pase lo que pase.
    pub async fn execute(
        &self,
        credentials: &SshCredentials,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, SshError> {
        let client = self.connect(credentials).await?;

        let execution = tokio::time::timeout(timeout, client.execute(command)).await;

        let result = match execution {
            Err(_) => Err(SshError::CommandTimeout(timeout)),
            Ok(Err(exec_fault)) => Err(SshError::ExecFailed(exec_fault.to_string())),
            Ok(Ok(executed)) => Ok(CommandOutput {
                stdout: executed.stdout,
                stderr: executed.stderr,
                exit_status: executed.exit_status,
            }),
        };

        if let Err(disconnect_fault) = client.disconnect().await {
            debug!("[SSH_LINK]: disconnect noise ignored: {}", disconnect_fault);
        }

        result
    }

    /// Reintentos con retraso creciente; el target puede tardar en
    /// responder tras un reinicio o I/O pesado.
    pub async fn execute_with_retry(
        &self,
        credentials: &SshCredentials,
        command: &str,
        timeout: Duration,
        max_retries: u32,
        initial_delay: Duration,
    ) -> Result<CommandOutput, SshError> {
        let mut delay = initial_delay;
        let mut last_fault = None;

        for attempt in 0..=max_retries {
            match self.execute(credentials, command, timeout).await {
                Ok(output) => return Ok(output),
                Err(fault) => {
                    warn!(
                        "⚠️ [SSH_RETRY]: Attempt {}/{} against {} failed: {}",
                        attempt + 1,
                        max_retries + 1,
                        credentials.hostname,
                        fault
                    );
                    last_fault = Some(fault);
                    if attempt < max_retries {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_fault.unwrap_or_else(|| SshError::ConnectionFailed {
            host: credentials.hostname.clone(),
            detail: "retries exhausted".to_string(),
        }))
    }

    /// Ejecuta un comando en el propio host del ejecutor vía shell.
    pub async fn execute_local(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, SshError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output();

        match tokio::time::timeout(timeout, child).await {
            Err(_) => Err(SshError::CommandTimeout(timeout)),
            Ok(Err(spawn_fault)) => Err(SshError::LocalExecFailed(spawn_fault.to_string())),
            Ok(Ok(output)) => Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_status: output.status.code().unwrap_or(-1) as u32,
            }),
        }
    }

    /// Prueba de conexión: 'echo ok' con presupuesto corto.
    pub async fn test_connection(
        &self,
        credentials: &SshCredentials,
        timeout: Duration,
    ) -> Result<(), SshError> {
        let output = self.execute(credentials, "echo ok", timeout).await?;
        if output.stdout.trim() == "ok" {
            Ok(())
        } else {
            Err(SshError::ExecFailed(
                "test command did not return expected output".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials_with(
        key_data: Option<&str>,
        key_path: Option<&str>,
        password: Option<&str>,
    ) -> SshCredentials {
        SshCredentials {
            hostname: "10.0.0.10".to_string(),
            nfs_hostname: None,
            port: 22,
            username: "root".to_string(),
            key_data: key_data.map(str::to_string),
            key_path: key_path.map(str::to_string),
            password: password.map(str::to_string),
            key_source: None,
        }
    }

    #[test]
    fn auth_prefers_key_data_over_everything() {
        let credentials = credentials_with(Some("KEY"), Some("/path"), Some("pw"));
        assert!(SshExecutor::auth_method(&credentials).is_ok());
    }

    #[test]
    fn blank_key_path_falls_through_to_password() {
        let credentials = credentials_with(None, Some("   "), Some("pw"));
        assert!(SshExecutor::auth_method(&credentials).is_ok());
    }

    #[test]
    fn no_material_is_an_error() {
        let credentials = credentials_with(None, None, None);
        assert!(matches!(
            SshExecutor::auth_method(&credentials),
            Err(SshError::NoSecretMaterial(_))
        ));
    }

    #[tokio::test]
    async fn local_execution_captures_output() {
        let executor = SshExecutor::new();
        let output = executor
            .execute_local("echo hello", Duration::from_secs(5))
            .await
            .expect("local echo should run");
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }
}
