//! vmtend library
//!
//! Resumable host maintenance for Linux virtual machines: a time-boxed
//! package patch cycle and a marker-guarded OS-volume encryption sequence.
//! Both survive restarts by keeping their progress on disk.

pub mod cli;
pub mod clock;
pub mod command_runner;
pub mod config;
pub mod context;
pub mod distro;
pub mod encryption;
pub mod error;
pub mod patching;
pub mod process_guard;
pub mod progress;
pub mod resolver;
pub mod step;

pub use clock::{Clock, CycleBudget, SystemClock};
pub use command_runner::{CommandOutput, CommandRunner, ShellRunner};
pub use config::{Category, MaintConfig};
pub use context::Context;
pub use distro::{DeviceDefaults, Distro, PackageFamily};
pub use encryption::{
    BlockLayout, EncryptionStateMachine, MachineReport, OsEncryptionState, StateSpec, StateStatus,
};
pub use error::VmTendError;
pub use patching::{CheckOutcome, CycleMode, CycleOutcome, PatchCommands, PatchController, PatchReport};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use progress::ProgressList;
pub use resolver::{DeviceResolver, LiveResolver, MountEntry, SystemPaths};
pub use step::{MarkerStore, StepMarker};

#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
#[cfg(any(test, feature = "test-util"))]
pub use command_runner::{MockRunner, RecordedCommand};
