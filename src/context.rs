//! Per-invocation context.
//!
//! Built once when the scheduler starts vmtend and owned by the orchestrator
//! for that run. Nothing in here outlives the process.

use crate::clock::{Clock, SystemClock};
use crate::command_runner::{CommandRunner, ShellRunner};
use crate::config::MaintConfig;
use crate::distro::Distro;
use crate::error::{Result, VmTendError};
use crate::resolver::{DeviceResolver, LiveResolver};

/// Collaborators and settings shared by both orchestrators.
pub struct Context {
    runner: Box<dyn CommandRunner>,
    resolver: Box<dyn DeviceResolver>,
    clock: Box<dyn Clock>,
    config: MaintConfig,
    distro: Distro,
}

impl Context {
    pub fn new(
        runner: Box<dyn CommandRunner>,
        resolver: Box<dyn DeviceResolver>,
        clock: Box<dyn Clock>,
        config: MaintConfig,
        distro: Distro,
    ) -> Self {
        Self {
            runner,
            resolver,
            clock,
            config,
            distro,
        }
    }

    /// Context wired to the running system.
    pub fn live(config: MaintConfig, distro: Distro, dry_run: bool) -> Self {
        let runner = if dry_run {
            ShellRunner::dry_run()
        } else {
            ShellRunner::new()
        };
        Self::new(
            Box::new(runner),
            Box::new(LiveResolver::default()),
            Box::new(SystemClock),
            config,
            distro,
        )
    }

    /// Live context for `config`, detecting the distro when it is not configured.
    pub fn from_config(config: MaintConfig, dry_run: bool) -> Result<Self> {
        let distro = match config.distro {
            Some(distro) => distro,
            None => Distro::detect().ok_or_else(|| {
                VmTendError::config("distro is not configured and could not be detected")
            })?,
        };
        Ok(Self::live(config, distro, dry_run))
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn resolver(&self) -> &dyn DeviceResolver {
        self.resolver.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &MaintConfig {
        &self.config
    }

    pub fn distro(&self) -> Distro {
        self.distro
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("distro", &self.distro)
            .finish_non_exhaustive()
    }
}
