//! OS-volume encryption as a sequence of marker-guarded states.

pub mod layout;
mod machine;
mod state;

pub use layout::BlockLayout;
pub use machine::{EncryptionStateMachine, MachineReport, StateStatus};
pub use state::OsEncryptionState;

use serde::{Deserialize, Serialize};

/// A configured encryption state: its marker name and the command it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSpec {
    pub name: String,
    pub command: String,
}
