pub mod backend;
pub mod crossing;
pub mod link;
pub mod rig;
pub mod settings;
pub mod tracking;

use postern_core::frame::FrameLoop;
use postern_math::rigid::RigidTransform;

use crate::backend::RenderBackend;
use crate::crossing::CrossingStage;
use crate::rig::StereoRig;
use crate::tracking::{EyeTracker, TrackingSnapshot, TrackingStage};

/// Mutable world the stages share within a frame. The observer is the
/// rig-root transform that portal crossings teleport; the snapshot is
/// rewritten by the tracking stage at the top of every frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub observer: RigidTransform,
    pub tracking: TrackingSnapshot,
}

impl FrameContext {
    pub fn new(observer: RigidTransform) -> Self {
        Self {
            observer,
            tracking: TrackingSnapshot::default(),
        }
    }
}

pub type PortalFrameLoop = FrameLoop<FrameContext>;

/// Assembles the standard stage order. Tracking refreshes the snapshot
/// before anything reads it, crossing settles the observer, and the rig
/// renders last from the settled state.
pub fn standard_pipeline<T, B>(
    tracking: TrackingStage<T>,
    crossing: CrossingStage,
    rig: StereoRig<B>,
) -> PortalFrameLoop
where
    T: EyeTracker + 'static,
    B: RenderBackend + 'static,
{
    let mut frame_loop = FrameLoop::new();
    frame_loop.add_stage(tracking);
    frame_loop.add_stage(crossing);
    frame_loop.add_stage(rig);
    frame_loop
}
