use glam::Mat4;
use tracing::debug;

use postern_core::frame::Stage;
use postern_math::projection::Perspective;
use postern_math::rigid::RigidTransform;

use crate::FrameContext;

/// Left/right viewpoint selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// One eye reading in rig-local tracking space.
#[derive(Debug, Clone, Copy)]
pub struct EyeSample {
    pub pose: RigidTransform,
    /// Device projection for this eye, `None` when the runtime does not
    /// supply one and the reference perspective should stand in.
    pub projection: Option<Mat4>,
}

/// Source of per-eye tracking data. `sample` returning `None` means the
/// device lost tracking this frame; consumers hold the last good reading
/// rather than interpolating. A tracker that is not stereo reports the
/// head for either eye.
pub trait EyeTracker {
    fn is_stereo(&self) -> bool;
    fn sample(&mut self, eye: Eye) -> Option<EyeSample>;
}

/// Derives eye poses from a head pose plus an inter-pupillary distance, for
/// trackers that only report the head. Index 0 is the left eye.
pub fn eyes_from_head(head: &RigidTransform, ipd: f32) -> [RigidTransform; 2] {
    let half = head.right() * (ipd * 0.5);
    [
        RigidTransform {
            position: head.position - half,
            rotation: head.rotation,
        },
        RigidTransform {
            position: head.position + half,
            rotation: head.rotation,
        },
    ]
}

/// World-space viewpoints for one frame. The tracking stage writes this
/// before anything else runs; later stages treat it as read-only except for
/// the crossing stage, which remaps the poses when a teleport lands
/// mid-frame.
#[derive(Debug, Clone, Copy)]
pub struct TrackingSnapshot {
    pub head: RigidTransform,
    pub eyes: [RigidTransform; 2],
    pub projections: [Mat4; 2],
    /// False means the source is mono and both eye slots carry the head.
    pub stereo: bool,
}

impl Default for TrackingSnapshot {
    fn default() -> Self {
        let projection = Perspective::default().matrix();
        Self {
            head: RigidTransform::IDENTITY,
            eyes: [RigidTransform::IDENTITY; 2],
            projections: [projection; 2],
            stereo: false,
        }
    }
}

/// Stage that polls the tracker and publishes the composed world-space
/// snapshot. Registered ahead of every stage that reads tracking.
pub struct TrackingStage<T: EyeTracker> {
    tracker: T,
    fallback: Perspective,
    held: [EyeSample; 2],
}

impl<T: EyeTracker> TrackingStage<T> {
    pub fn new(tracker: T, fallback: Perspective) -> Self {
        let held = [EyeSample {
            pose: RigidTransform::IDENTITY,
            projection: None,
        }; 2];
        Self {
            tracker,
            fallback,
            held,
        }
    }

    fn refresh(&mut self) -> bool {
        let stereo = self.tracker.is_stereo();
        if stereo {
            for eye in Eye::BOTH {
                match self.tracker.sample(eye) {
                    Some(sample) => self.held[eye.index()] = sample,
                    None => debug!("no {eye:?} eye reading, holding last pose"),
                }
            }
        } else {
            match self.tracker.sample(Eye::Left) {
                Some(sample) => self.held = [sample; 2],
                None => debug!("no head reading, holding last pose"),
            }
        }
        stereo
    }
}

impl<T: EyeTracker> Stage<FrameContext> for TrackingStage<T> {
    fn name(&self) -> &'static str {
        "tracking"
    }

    fn tick(&mut self, ctx: &mut FrameContext, _dt: f32) {
        let stereo = self.refresh();
        let fallback = self.fallback.matrix();

        let mut eyes = [RigidTransform::IDENTITY; 2];
        let mut projections = [fallback; 2];
        for eye in Eye::BOTH {
            let held = &self.held[eye.index()];
            eyes[eye.index()] = ctx.observer.compose(&held.pose);
            if let Some(projection) = held.projection {
                projections[eye.index()] = projection;
            }
        }

        let head = RigidTransform {
            position: (eyes[0].position + eyes[1].position) * 0.5,
            rotation: eyes[0].rotation.slerp(eyes[1].rotation, 0.5).normalize(),
        };

        ctx.tracking = TrackingSnapshot {
            head,
            eyes,
            projections,
            stereo,
        };
    }
}

/// Tracker with a directly scripted head pose. Drives tests and the probe
/// tool, where no real device exists.
pub struct ScriptedTracker {
    head: RigidTransform,
    ipd: f32,
    stereo: bool,
}

impl ScriptedTracker {
    pub fn new(ipd: f32, stereo: bool) -> Self {
        Self {
            head: RigidTransform::IDENTITY,
            ipd,
            stereo,
        }
    }

    pub fn set_head(&mut self, head: RigidTransform) {
        self.head = head;
    }
}

impl EyeTracker for ScriptedTracker {
    fn is_stereo(&self) -> bool {
        self.stereo
    }

    fn sample(&mut self, eye: Eye) -> Option<EyeSample> {
        if !self.stereo {
            return Some(EyeSample {
                pose: self.head,
                projection: None,
            });
        }
        let eyes = eyes_from_head(&self.head, self.ipd);
        Some(EyeSample {
            pose: eyes[eye.index()],
            projection: None,
        })
    }
}
