use glam::Vec3;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use postern_core::events::{EventSender, PortalEvent};
use postern_core::frame::Stage;
use postern_math::rigid::RigidTransform;

use crate::link::PortalLink;
use crate::FrameContext;

/// Depth at which a probe point counts as having reached the surface.
const CROSS_EPS: f32 = 0.001;
/// How far past the destination surface a crossing observer is placed.
const EXIT_OFFSET: f32 = 1.0;
/// Larger clearance when the destination is the scaled-up world.
const SCALED_EXIT_OFFSET: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u32);

/// The single head-tracked observer driven by the standard pipeline.
pub const PRIMARY_OBSERVER: ObserverId = ObserverId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrossingState {
    Outside,
    /// Crossed; stays guarded until the observer fully leaves the exit
    /// portal's influence volume.
    InsideGuarded { exit_portal: usize },
}

#[derive(Debug, Clone, Copy)]
struct ObserverTrack {
    prev_probe: Vec3,
    state: CrossingState,
}

/// Result of a witnessed crossing: the subject's remapped pose plus which
/// portal it went through.
#[derive(Debug, Clone, Copy)]
pub struct TeleportOutcome {
    pub subject: RigidTransform,
    pub portal: usize,
    pub exit_offset: f32,
}

/// The one authority on surface crossings. Polls observer probe points once
/// per frame against every portal surface; a crossing is only ever the
/// witnessed transition of a probe from the approach side to the far side,
/// so an observer that merely starts a frame behind a surface never
/// teleports.
pub struct CrossingDetector {
    portals: Vec<PortalLink>,
    observers: FxHashMap<ObserverId, ObserverTrack>,
    events: EventSender<PortalEvent>,
    pub exit_offset: f32,
    pub scaled_exit_offset: f32,
}

impl CrossingDetector {
    pub fn new(portals: Vec<PortalLink>, events: EventSender<PortalEvent>) -> Self {
        Self {
            portals,
            observers: FxHashMap::default(),
            events,
            exit_offset: EXIT_OFFSET,
            scaled_exit_offset: SCALED_EXIT_OFFSET,
        }
    }

    pub fn portal(&self, index: usize) -> Option<&PortalLink> {
        self.portals.get(index)
    }

    /// Polls one observer. `probe` is the tracked point whose plane
    /// crossing counts (the head), `subject` the transform that actually
    /// teleports (the rig root carrying the probe). Observers are only
    /// tracked while inside some portal's influence volume.
    pub fn update_observer(
        &mut self,
        id: ObserverId,
        probe: Vec3,
        subject: &RigidTransform,
    ) -> Option<TeleportOutcome> {
        let Some(track) = self.observers.get(&id).copied() else {
            if self.in_any_influence_volume(probe) {
                self.observers.insert(
                    id,
                    ObserverTrack {
                        prev_probe: probe,
                        state: CrossingState::Outside,
                    },
                );
            }
            return None;
        };

        let state = match track.state {
            CrossingState::InsideGuarded { exit_portal } => {
                let still_inside = self
                    .portals
                    .get(exit_portal)
                    .is_some_and(|portal| portal.exit_volume_contains(probe));
                if still_inside {
                    CrossingState::InsideGuarded { exit_portal }
                } else {
                    CrossingState::Outside
                }
            }
            CrossingState::Outside => CrossingState::Outside,
        };

        let mut outcome = None;
        let mut new_state = state;
        let mut new_prev = probe;

        if state == CrossingState::Outside {
            for (index, portal) in self.portals.iter().enumerate() {
                if !witnessed_crossing(portal, track.prev_probe, probe) {
                    continue;
                }
                let exit_offset = if portal.is_scaling_up {
                    self.scaled_exit_offset
                } else {
                    self.exit_offset
                };
                new_prev = portal.teleport_point(probe, exit_offset);
                new_state = CrossingState::InsideGuarded { exit_portal: index };
                outcome = Some(TeleportOutcome {
                    subject: portal.teleport_pose(subject, exit_offset),
                    portal: index,
                    exit_offset,
                });
                info!("observer {} crossed portal {index}", id.0);
                break;
            }
        }

        if outcome.is_none()
            && new_state == CrossingState::Outside
            && !self.in_any_influence_volume(probe)
        {
            self.observers.remove(&id);
        } else {
            self.observers.insert(
                id,
                ObserverTrack {
                    prev_probe: new_prev,
                    state: new_state,
                },
            );
        }

        if let Some(outcome) = &outcome {
            self.announce(outcome.portal);
        }
        outcome
    }

    fn in_any_influence_volume(&self, probe: Vec3) -> bool {
        self.portals
            .iter()
            .any(|portal| portal.entry_volume_contains(probe) || portal.exit_volume_contains(probe))
    }

    fn announce(&self, portal: usize) {
        let Some(link) = self.portals.get(portal) else {
            return;
        };
        if !link.is_scaling_portal {
            return;
        }
        if link.is_scaling_up {
            self.emit(PortalEvent::EnteredScaledWorld);
        } else {
            self.emit(PortalEvent::LeftScaledWorld);
            self.emit(PortalEvent::RemoveBlockade);
        }
    }

    fn emit(&self, event: PortalEvent) {
        if self.events.send(event).is_err() {
            debug!("dropping {event:?}, no consumer attached");
        }
    }
}

/// True when the probe moved from the approach side to the far side this
/// frame and the interpolated hit point lies within the opening.
fn witnessed_crossing(portal: &PortalLink, prev_probe: Vec3, probe: Vec3) -> bool {
    let prev_depth = portal.entry_depth(prev_probe);
    let depth = portal.entry_depth(probe);
    if !(prev_depth > CROSS_EPS && depth <= CROSS_EPS) {
        return false;
    }
    let span = prev_depth - depth;
    if span <= f32::EPSILON {
        return false;
    }
    let t = (prev_depth / span).clamp(0.0, 1.0);
    portal.opening_contains(prev_probe.lerp(probe, t))
}

/// Stage gluing the detector to the frame: probes with the tracked head,
/// teleports the observer root, and remaps this frame's snapshot so later
/// stages see a coherent post-teleport world.
pub struct CrossingStage {
    detector: CrossingDetector,
}

impl CrossingStage {
    pub fn new(detector: CrossingDetector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &CrossingDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut CrossingDetector {
        &mut self.detector
    }
}

impl Stage<FrameContext> for CrossingStage {
    fn name(&self) -> &'static str {
        "crossing"
    }

    fn tick(&mut self, ctx: &mut FrameContext, _dt: f32) {
        let probe = ctx.tracking.head.position;
        let Some(outcome) = self
            .detector
            .update_observer(PRIMARY_OBSERVER, probe, &ctx.observer)
        else {
            return;
        };
        let Some(link) = self.detector.portal(outcome.portal).copied() else {
            return;
        };

        ctx.observer = outcome.subject;
        ctx.tracking.head = link.teleport_pose(&ctx.tracking.head, outcome.exit_offset);
        for eye in ctx.tracking.eyes.iter_mut() {
            *eye = link.teleport_pose(eye, outcome.exit_offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use glam::{Quat, Vec3};

    use postern_core::events::{channel, EventReceiver, PortalEvent};
    use postern_core::frame::Stage;
    use postern_math::rigid::RigidTransform;

    use crate::link::PortalLink;
    use crate::FrameContext;

    use super::{CrossingDetector, CrossingStage, ObserverId, PRIMARY_OBSERVER};

    fn detector_with(portals: Vec<PortalLink>) -> (CrossingDetector, EventReceiver<PortalEvent>) {
        let (tx, rx) = channel();
        (CrossingDetector::new(portals, tx), rx)
    }

    /// Entrance and destination at the same spot, so probes stay in the
    /// influence volume across a crossing.
    fn folded_link() -> PortalLink {
        PortalLink::new(RigidTransform::IDENTITY, RigidTransform::IDENTITY)
    }

    fn separated_link() -> PortalLink {
        PortalLink::new(
            RigidTransform::IDENTITY,
            RigidTransform::new(Vec3::new(10.0, 0.0, 0.0), Quat::from_rotation_y(PI)),
        )
    }

    fn poll(detector: &mut CrossingDetector, id: ObserverId, z: f32) -> bool {
        let probe = Vec3::new(0.0, 0.0, z);
        detector
            .update_observer(id, probe, &RigidTransform::from_position(probe))
            .is_some()
    }

    #[test]
    fn crossing_fires_exactly_once_for_a_monotonic_approach() {
        let (mut detector, _rx) = detector_with(vec![folded_link()]);

        let results: Vec<bool> = [0.5, 0.2, -0.1, -0.2, -0.3]
            .into_iter()
            .map(|z| poll(&mut detector, PRIMARY_OBSERVER, z))
            .collect();

        assert_eq!(results, vec![false, false, true, false, false]);
    }

    #[test]
    fn guard_rearms_only_after_leaving_the_exit_volume() {
        let (mut detector, _rx) = detector_with(vec![folded_link()]);

        assert!(!poll(&mut detector, PRIMARY_OBSERVER, 0.5));
        assert!(poll(&mut detector, PRIMARY_OBSERVER, -0.1));

        // Straddling the surface while guarded must not retrigger.
        assert!(!poll(&mut detector, PRIMARY_OBSERVER, 0.4));
        assert!(!poll(&mut detector, PRIMARY_OBSERVER, -0.2));

        // Leave the volume entirely, then approach again from the front.
        assert!(!poll(&mut detector, PRIMARY_OBSERVER, -5.0));
        assert!(!poll(&mut detector, PRIMARY_OBSERVER, 0.8));
        assert!(poll(&mut detector, PRIMARY_OBSERVER, -0.1));
    }

    #[test]
    fn teleport_lands_offset_from_the_far_surface() {
        let (mut detector, _rx) = detector_with(vec![separated_link()]);
        detector.exit_offset = 2.0;

        let start = RigidTransform::from_position(Vec3::new(0.0, 0.0, 1.0));
        assert!(detector
            .update_observer(PRIMARY_OBSERVER, start.position, &start)
            .is_none());

        let crossed = RigidTransform::from_position(Vec3::new(0.0, 0.0, -1.0));
        let outcome = detector
            .update_observer(PRIMARY_OBSERVER, crossed.position, &crossed)
            .unwrap();

        assert!((outcome.subject.position - Vec3::new(10.0, 0.0, 1.0)).length() < 1e-4);
        assert!(outcome.subject.rotation.angle_between(Quat::IDENTITY) < 1e-3);
        assert_eq!(outcome.portal, 0);
    }

    #[test]
    fn scaling_up_crossing_announces_the_scaled_world() {
        let mut link = separated_link();
        link.is_scaling_portal = true;
        link.is_scaling_up = true;
        let (mut detector, rx) = detector_with(vec![link]);

        poll(&mut detector, PRIMARY_OBSERVER, 0.5);
        assert!(poll(&mut detector, PRIMARY_OBSERVER, -0.1));

        let events: Vec<PortalEvent> = rx.try_iter().collect();
        assert_eq!(events, vec![PortalEvent::EnteredScaledWorld]);
    }

    #[test]
    fn scaling_down_crossing_also_clears_the_blockade() {
        let mut link = separated_link();
        link.is_scaling_portal = true;
        link.is_scaling_up = false;
        let (mut detector, rx) = detector_with(vec![link]);

        poll(&mut detector, PRIMARY_OBSERVER, 0.5);
        assert!(poll(&mut detector, PRIMARY_OBSERVER, -0.1));

        let events: Vec<PortalEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![PortalEvent::LeftScaledWorld, PortalEvent::RemoveBlockade]
        );
    }

    #[test]
    fn plain_crossings_emit_no_events() {
        let (mut detector, rx) = detector_with(vec![separated_link()]);

        poll(&mut detector, PRIMARY_OBSERVER, 0.5);
        assert!(poll(&mut detector, PRIMARY_OBSERVER, -0.1));

        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn crossing_counts_only_through_the_opening_rectangle() {
        let (mut detector, _rx) = detector_with(vec![folded_link()]);

        // Seeded near the lateral edge, then a diagonal step whose plane
        // hit point falls outside the opening.
        let a = Vec3::new(0.7, 0.0, 0.3);
        let b = Vec3::new(2.0, 0.0, -0.3);
        detector.update_observer(PRIMARY_OBSERVER, a, &RigidTransform::from_position(a));
        assert!(detector
            .update_observer(PRIMARY_OBSERVER, b, &RigidTransform::from_position(b))
            .is_none());
    }

    #[test]
    fn observers_are_tracked_independently() {
        let (mut detector, _rx) = detector_with(vec![folded_link()]);
        let other = ObserverId(7);

        assert!(!poll(&mut detector, PRIMARY_OBSERVER, 0.5));
        assert!(!poll(&mut detector, other, 0.9));

        // The first observer crosses and is guarded; the second still gets
        // its own crossing.
        assert!(poll(&mut detector, PRIMARY_OBSERVER, -0.1));
        assert!(!poll(&mut detector, PRIMARY_OBSERVER, -0.2));
        assert!(poll(&mut detector, other, -0.1));
    }

    #[test]
    fn stage_remaps_the_observer_and_this_frames_snapshot() {
        let (detector, _rx) = detector_with(vec![separated_link()]);
        let mut stage = CrossingStage::new(detector);
        stage.detector_mut().exit_offset = 2.0;

        let mut ctx = FrameContext::new(RigidTransform::from_position(Vec3::new(0.0, 0.0, 1.0)));
        ctx.tracking.head = ctx.observer;
        ctx.tracking.eyes = [ctx.observer; 2];
        stage.tick(&mut ctx, 0.016);

        ctx.observer = RigidTransform::from_position(Vec3::new(0.0, 0.0, -1.0));
        ctx.tracking.head = ctx.observer;
        ctx.tracking.eyes = [ctx.observer; 2];
        stage.tick(&mut ctx, 0.016);

        assert!((ctx.observer.position - Vec3::new(10.0, 0.0, 1.0)).length() < 1e-4);
        assert!((ctx.tracking.head.position - ctx.observer.position).length() < 1e-4);
        assert!((ctx.tracking.eyes[0].position - ctx.observer.position).length() < 1e-4);
    }
}
