use tracing::debug;

use super::layout::BlockLayout;
use crate::context::Context;
use crate::step::StepMarker;

/// One named step of OS-volume encryption.
///
/// The block layout is resolved when the state is built, so every state
/// sees the devices as they are at that point of the sequence.
#[derive(Debug, Clone)]
pub struct OsEncryptionState {
    marker: StepMarker,
    layout: BlockLayout,
}

impl OsEncryptionState {
    pub fn new(name: &str, ctx: &Context) -> Self {
        debug!("Building encryption state {}", name);
        Self {
            marker: StepMarker::new(name, &ctx.config().markers_dir),
            layout: BlockLayout::resolve(ctx.resolver(), ctx.distro()),
        }
    }

    pub fn name(&self) -> &str {
        self.marker.name()
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    pub fn marker(&self) -> &StepMarker {
        &self.marker
    }

    pub fn should_enter(&self) -> bool {
        self.marker.should_enter()
    }

    pub fn should_exit(&mut self) -> bool {
        self.marker.should_exit()
    }
}
