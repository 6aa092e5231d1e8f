//! Command implementations.

pub mod config;
pub mod fetch;
pub mod remote;
pub mod status;
pub mod sync;

use anyhow::{Context as _, Result};
use lean_core::SyncSession;
use lean_core::config::LeanConfig;
use lean_core::host::{self, HostIntegration};

use crate::ui::Output;

/// State shared by the commands that talk to the remote.
#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) config: LeanConfig,
    pub(crate) session: SyncSession,
    pub(crate) output: Output,
}

impl Context {
    /// Load the configuration and connect to the remote.
    pub(crate) async fn open(quiet: bool) -> Result<Self> {
        let config = LeanConfig::load()?;
        let output = Output::new(quiet);
        let session = SyncSession::connect(&config)
            .await
            .context("Cannot open the remote repository")?;
        Ok(Self {
            config,
            session,
            output,
        })
    }

    pub(crate) fn host(&self) -> Box<dyn HostIntegration> {
        host::system_host(&self.config)
    }
}
