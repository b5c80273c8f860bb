// [libs/infra/db-rest/src/repositories/mod.rs]
//! Repositorios de autoridad única por agregado del plano de control.

pub mod jobs;
pub mod replication;
pub mod servers;
pub mod settings;
pub mod tasks;
pub mod vcenter;

pub use jobs::JobRepository;
pub use replication::ReplicationRepository;
pub use servers::ServerRepository;
pub use settings::SettingsRepository;
pub use tasks::TaskRepository;
pub use vcenter::VcenterRepository;
