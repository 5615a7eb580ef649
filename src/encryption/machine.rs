//! Ordered runner for the configured encryption states.
//!
//! Each tick walks the states in order. Completed states are skipped by
//! marker; the first state whose command fails stops the walk without being
//! exited, so the next tick starts from it again.

use std::collections::HashSet;
use tracing::{error, info, warn};

use super::{OsEncryptionState, StateSpec};
use crate::context::Context;
use crate::error::Result;
use crate::step::MarkerStore;

/// What one tick of the machine did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineReport {
    /// States run to completion in this tick
    pub completed: Vec<String>,
    /// States skipped because their marker already existed
    pub skipped: Vec<String>,
    /// The state whose command failed, if any
    pub failed: Option<String>,
}

impl MachineReport {
    /// Every configured state has a marker.
    pub fn is_finished(&self) -> bool {
        self.failed.is_none()
    }
}

/// Completion of one configured state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStatus {
    pub name: String,
    pub completed: bool,
}

pub struct EncryptionStateMachine {
    ctx: Context,
    states: Vec<StateSpec>,
}

impl EncryptionStateMachine {
    /// Machine over the states listed in the context's configuration.
    pub fn new(ctx: Context) -> Self {
        let states = ctx.config().encryption_states.clone();
        Self::with_states(ctx, states)
    }

    pub fn with_states(ctx: Context, states: Vec<StateSpec>) -> Self {
        Self { ctx, states }
    }

    pub fn states(&self) -> &[StateSpec] {
        &self.states
    }

    pub fn run(&self) -> MachineReport {
        let mut report = MachineReport::default();
        let dry_run = self.ctx.runner().is_dry_run();

        for spec in &self.states {
            let mut state = OsEncryptionState::new(&spec.name, &self.ctx);

            if !state.should_enter() {
                report.skipped.push(spec.name.clone());
                continue;
            }

            info!("Entering encryption state {}", spec.name);
            let env = state.layout().env();
            let succeeded = match self.ctx.runner().run_capture_with_env(&spec.command, &env) {
                Ok(output) if output.success() => true,
                Ok(output) => {
                    error!(
                        "Encryption state {} failed with exit code {}: {}",
                        spec.name,
                        output.exit_code,
                        output.text.trim()
                    );
                    false
                }
                Err(e) => {
                    error!("Encryption state {} failed: {}", spec.name, e);
                    false
                }
            };

            if !succeeded {
                report.failed = Some(spec.name.clone());
                break;
            }

            if dry_run {
                info!("[DRY RUN] not marking state {} complete", spec.name);
            } else {
                state.should_exit();
            }
            report.completed.push(spec.name.clone());
        }

        info!(
            "Encryption tick: {} completed, {} skipped, failed: {:?}",
            report.completed.len(),
            report.skipped.len(),
            report.failed
        );
        report
    }

    /// Marker state of every configured state, in order.
    ///
    /// Markers with no matching configured state are logged.
    pub fn status(&self) -> Result<Vec<StateStatus>> {
        let store = MarkerStore::new(&self.ctx.config().markers_dir);
        let present: HashSet<String> = store.completed()?.into_iter().collect();

        let configured: HashSet<&str> = self.states.iter().map(|s| s.name.as_str()).collect();
        for name in present.iter().filter(|name| !configured.contains(name.as_str())) {
            warn!("Marker {} does not belong to any configured state", name);
        }

        Ok(self
            .states
            .iter()
            .map(|spec| StateStatus {
                name: spec.name.clone(),
                completed: present.contains(&spec.name),
            })
            .collect())
    }
}

impl std::fmt::Debug for EncryptionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionStateMachine")
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}
