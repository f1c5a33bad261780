use std::f32::consts::PI;
use std::fs;
use std::io;
use std::path::Path;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use postern_core::frame::Stage;
use postern_engine::link::PortalLink;
use postern_engine::rig::ReferenceCamera;
use postern_engine::FrameContext;
use postern_math::rigid::RigidTransform;

/// Everything the probe needs to stand up a world: the portal set, where
/// the observer starts, the host camera to copy, and the walk script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default = "default_portals")]
    pub portals: Vec<PortalLink>,
    #[serde(default = "default_observer_start")]
    pub observer_start: RigidTransform,
    #[serde(default)]
    pub reference: ReferenceCamera,
    #[serde(default = "default_script")]
    pub script: Vec<ScriptPhase>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            portals: default_portals(),
            observer_start: default_observer_start(),
            reference: ReferenceCamera::default(),
            script: default_script(),
        }
    }
}

impl SceneConfig {
    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str::<Self>(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to deserialize scene: {e}"),
            )
        })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let serialized = toml::to_string_pretty(self).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to serialize scene: {e}"),
            )
        })?;
        fs::write(path, serialized)
    }
}

pub fn load_or_create(path: &Path) -> SceneConfig {
    match SceneConfig::load(path) {
        Ok(scene) => scene,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let scene = SceneConfig::default();
            if let Err(save_err) = scene.save(path) {
                warn!(
                    "Failed to create default scene at {}: {save_err}",
                    path.display()
                );
            }
            scene
        }
        Err(err) => {
            warn!("Failed to load scene from {}: {err}", path.display());
            SceneConfig::default()
        }
    }
}

/// A pair of scaling portals facing each other across the world: walking
/// into the near one puts you in the scaled world ten units out, walking
/// back through the far one returns you.
fn default_portals() -> Vec<PortalLink> {
    let near = RigidTransform::IDENTITY;
    let far = RigidTransform::new(Vec3::new(10.0, 0.0, 0.0), Quat::from_rotation_y(PI));

    let mut outbound = PortalLink::new(near, far);
    outbound.is_scaling_portal = true;
    outbound.is_scaling_up = true;

    let mut inbound = PortalLink::new(far, near);
    inbound.is_scaling_portal = true;
    inbound.is_scaling_up = false;

    vec![outbound, inbound]
}

fn default_observer_start() -> RigidTransform {
    RigidTransform::new(Vec3::new(0.0, 0.0, 3.0), Quat::from_rotation_y(PI))
}

fn default_script() -> Vec<ScriptPhase> {
    vec![
        ScriptPhase::Walk {
            seconds: 12.0,
            speed: 1.5,
        },
        ScriptPhase::TurnAround,
        ScriptPhase::Walk {
            seconds: 8.0,
            speed: 1.5,
        },
    ]
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ScriptPhase {
    /// Walk along the observer's own forward axis.
    Walk { seconds: f32, speed: f32 },
    /// Turn in place by half a revolution.
    TurnAround,
}

/// Drives the observer through the script, one phase at a time. Registered
/// after the render stage so movement lands at the end of a frame and the
/// next frame's tracking sees it.
pub struct WalkStage {
    phases: Vec<ScriptPhase>,
    current: usize,
    elapsed: f32,
}

impl WalkStage {
    pub fn new(phases: Vec<ScriptPhase>) -> Self {
        Self {
            phases,
            current: 0,
            elapsed: 0.0,
        }
    }

    fn advance(&mut self) {
        self.current += 1;
        self.elapsed = 0.0;
    }
}

impl Stage<FrameContext> for WalkStage {
    fn name(&self) -> &'static str {
        "walk script"
    }

    fn tick(&mut self, ctx: &mut FrameContext, dt: f32) {
        let Some(phase) = self.phases.get(self.current).copied() else {
            return;
        };
        match phase {
            ScriptPhase::Walk { seconds, speed } => {
                ctx.observer.position += ctx.observer.forward() * speed * dt;
                self.elapsed += dt;
                if self.elapsed >= seconds {
                    self.advance();
                }
            }
            ScriptPhase::TurnAround => {
                ctx.observer.rotation =
                    (Quat::from_rotation_y(PI) * ctx.observer.rotation).normalize();
                self.advance();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use postern_core::frame::Stage;
    use postern_engine::FrameContext;
    use postern_math::rigid::RigidTransform;

    use super::{SceneConfig, ScriptPhase, WalkStage};

    #[test]
    fn default_scene_round_trips_through_toml() {
        let scene = SceneConfig::default();
        let text = toml::to_string_pretty(&scene).unwrap();
        let parsed: SceneConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed.portals.len(), scene.portals.len());
        assert_eq!(parsed.script.len(), scene.script.len());
    }

    #[test]
    fn walk_stage_moves_along_the_observers_own_forward_axis() {
        let mut stage = WalkStage::new(vec![ScriptPhase::Walk {
            seconds: 1.0,
            speed: 2.0,
        }]);
        let mut ctx = FrameContext::new(SceneConfig::default().observer_start);
        let start = ctx.observer.position;

        for _ in 0..10 {
            stage.tick(&mut ctx, 0.1);
        }

        let moved = ctx.observer.position - start;
        assert!((moved.length() - 2.0).abs() < 1e-3);
        assert!(moved.z < 0.0);
    }

    #[test]
    fn turn_phase_flips_the_facing_and_consumes_one_tick() {
        let mut stage = WalkStage::new(vec![
            ScriptPhase::TurnAround,
            ScriptPhase::Walk {
                seconds: 1.0,
                speed: 1.0,
            },
        ]);
        let mut ctx = FrameContext::new(RigidTransform::IDENTITY);
        let before = ctx.observer.forward();

        stage.tick(&mut ctx, 0.1);

        assert!((ctx.observer.forward() + before).length() < 1e-4);
        assert_eq!(ctx.observer.position, RigidTransform::IDENTITY.position);
    }
}
