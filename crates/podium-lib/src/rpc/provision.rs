//! Installing and removing the agent on remote hosts

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// Installs or removes the agent service on a host
#[async_trait]
pub trait HostProvisioner: Send + Sync {
    async fn prep_node(&self, host: &str, username: &str, password: &str) -> Result<()>;

    async fn cleanup_node(
        &self,
        host: &str,
        username: &str,
        password: &str,
        remove_db: bool,
    ) -> Result<()>;
}

/// Provisioner for fleets whose agents are installed out of band
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvisioner;

#[async_trait]
impl HostProvisioner for NoopProvisioner {
    async fn prep_node(&self, host: &str, _username: &str, _password: &str) -> Result<()> {
        debug!(host = %host, "Agent assumed pre-installed");
        Ok(())
    }

    async fn cleanup_node(
        &self,
        host: &str,
        _username: &str,
        _password: &str,
        remove_db: bool,
    ) -> Result<()> {
        debug!(host = %host, remove_db = remove_db, "Skipping agent cleanup");
        Ok(())
    }
}
