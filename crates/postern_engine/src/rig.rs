use glam::{Mat4, UVec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use postern_core::frame::Stage;
use postern_math::frustum::{extract_frustum_planes, sphere_in_frustum, FrustumPlanes};
use postern_math::plane;
use postern_math::projection::{apply_oblique_clip, Perspective};

use crate::backend::{RenderBackend, TargetDesc, TargetId, ViewUniform};
use crate::link::PortalLink;
use crate::settings::{LayerMask, PortalSettings};
use crate::tracking::{Eye, TrackingSnapshot};
use crate::FrameContext;

const MIN_VISIBILITY_RADIUS: f32 = 0.5;

/// Host camera the portal eye cameras copy their intrinsics from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceCamera {
    pub perspective: Perspective,
    pub resolution: UVec2,
    pub layers: LayerMask,
    pub tag: String,
}

impl Default for ReferenceCamera {
    fn default() -> Self {
        Self {
            perspective: Perspective::default(),
            resolution: UVec2::new(1920, 1080),
            layers: LayerMask::ALL,
            tag: "MainCamera".to_string(),
        }
    }
}

/// Per-eye render state owned by the rig.
#[derive(Debug, Clone, Copy)]
pub struct PortalCameraState {
    pub target: TargetId,
    /// Last projection used for this eye, oblique term included.
    pub projection: Mat4,
}

/// Renders the two offscreen eye views of one portal. Runs last in the
/// frame so it sees the settled observer and tracking state, and submits
/// both portal views before the host draws its main view.
pub struct StereoRig<B: RenderBackend> {
    backend: B,
    link: Option<PortalLink>,
    reference: ReferenceCamera,
    settings: PortalSettings,
    cameras: Option<[PortalCameraState; 2]>,
    target_size: UVec2,
    enabled: bool,
    stereo_bound: Option<bool>,
}

impl<B: RenderBackend> StereoRig<B> {
    pub fn new(
        backend: B,
        link: Option<PortalLink>,
        reference: ReferenceCamera,
        settings: PortalSettings,
    ) -> Self {
        Self {
            backend,
            link,
            reference,
            settings: settings.sanitize(),
            cameras: None,
            target_size: UVec2::ZERO,
            enabled: true,
            stereo_bound: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn camera(&self, eye: Eye) -> Option<PortalCameraState> {
        self.cameras.map(|cameras| cameras[eye.index()])
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.release_targets();
        } else if self.link.is_some() && self.cameras.is_none() {
            self.create_targets();
        }
    }

    /// The reference camera's output size changed. Recreates the eye
    /// targets only when the scaled dimensions actually differ.
    pub fn resize_reference(&mut self, resolution: UVec2) {
        self.reference.resolution = resolution;
        if !self.enabled || self.cameras.is_none() {
            return;
        }
        if self.scaled_target_size() == self.target_size {
            return;
        }
        self.release_targets();
        self.create_targets();
    }

    /// Swaps in new settings, recreating the eye targets when the
    /// resolution multiplier moved them to a different size.
    pub fn apply_settings(&mut self, settings: PortalSettings) {
        self.settings = settings.sanitize();
        if self.enabled
            && self.cameras.is_some()
            && self.scaled_target_size() != self.target_size
        {
            self.release_targets();
            self.create_targets();
        }
    }

    /// Renders both eye views with the portal-to-portal mapping iterated
    /// `depth` extra times, up to the configured recursion limit. Depth 0
    /// is the plain single-portal view.
    ///
    /// Only the viewpoint is chained. Each frame draws one pass per eye at
    /// the deepest virtual pose and the nested opening shows that pass's
    /// image, so level `n` displays imagery rendered for level `n + 1`
    /// rather than a freshly rendered view of its own.
    pub fn render_at_depth(&mut self, snapshot: &TrackingSnapshot, depth: u32) {
        if !self.enabled {
            return;
        }
        let Some(link) = self.link else {
            return;
        };
        let Some(cameras) = self.cameras.as_mut() else {
            return;
        };

        if self.stereo_bound != Some(snapshot.stereo) {
            self.backend.set_stereo_compositing(snapshot.stereo);
            self.stereo_bound = Some(snapshot.stereo);
        }

        let head_view_proj = snapshot.projections[0] * snapshot.head.view_matrix();
        let frustum = extract_frustum_planes(head_view_proj);
        if !portal_is_visible(&link, snapshot.head.position, &frustum) {
            return;
        }

        let depth = depth.min(self.settings.max_recursion_depth.saturating_sub(1));
        let layers = self.reference.layers & self.settings.culling_mask;
        // The virtual eyes always land on the destination surface's front
        // side, so a clip plane through the surface facing front culls
        // exactly the geometry between each eye and the opening.
        let plane_world = plane::from_normal_point(link.remote.forward(), link.remote.position);

        for eye in Eye::BOTH {
            let index = eye.index();
            let virtual_pose = link.chain_pose(&snapshot.eyes[index], depth);
            let view = virtual_pose.view_matrix();
            let plane_camera = plane::to_camera_space(view, plane_world);
            let projection = apply_oblique_clip(snapshot.projections[index], plane_camera);
            cameras[index].projection = projection;

            let uniform = ViewUniform {
                view_proj: (projection * view).to_cols_array_2d(),
                position: virtual_pose.position.to_array(),
                _padding: 0.0,
            };
            self.backend
                .submit_view(cameras[index].target, &uniform, layers);
        }
    }

    fn scaled_target_size(&self) -> UVec2 {
        UVec2::new(
            scaled_dimension(self.reference.resolution.x, self.settings.resolution_multiplier),
            scaled_dimension(self.reference.resolution.y, self.settings.resolution_multiplier),
        )
    }

    fn create_targets(&mut self) {
        let size = self.scaled_target_size();
        let left = self.backend.create_target(&TargetDesc {
            width: size.x,
            height: size.y,
            label: "portal left eye",
        });
        let right = self.backend.create_target(&TargetDesc {
            width: size.x,
            height: size.y,
            label: "portal right eye",
        });
        let projection = self.reference.perspective.matrix();
        self.cameras = Some([
            PortalCameraState {
                target: left,
                projection,
            },
            PortalCameraState {
                target: right,
                projection,
            },
        ]);
        self.target_size = size;
        self.backend.bind_surface_textures(left, right);
        debug!("created portal eye targets at {}x{}", size.x, size.y);
    }

    fn release_targets(&mut self) {
        let Some(cameras) = self.cameras.take() else {
            return;
        };
        for camera in cameras {
            self.backend.release_target(camera.target);
        }
        self.stereo_bound = None;
        debug!("released portal eye targets");
    }
}

impl<B: RenderBackend> Stage<FrameContext> for StereoRig<B> {
    fn name(&self) -> &'static str {
        "portal rig"
    }

    fn init(&mut self, _ctx: &mut FrameContext) {
        let Some(link) = self.link else {
            error!("portal link anchors are not set, portal rendering disabled");
            self.enabled = false;
            return;
        };
        if !link_is_finite(&link) {
            error!("portal link anchors are not finite, portal rendering disabled");
            self.enabled = false;
            return;
        }
        self.backend.disable_post_processing();
        self.backend.disable_antialiasing();
        self.create_targets();
        info!(
            "portal rig initialized from '{}', targets {}x{}",
            self.reference.tag, self.target_size.x, self.target_size.y
        );
    }

    fn tick(&mut self, ctx: &mut FrameContext, _dt: f32) {
        if !self.enabled {
            return;
        }
        let snapshot = ctx.tracking;
        self.render_at_depth(&snapshot, self.settings.max_recursion_depth.saturating_sub(1));
    }

    fn shutdown(&mut self) {
        self.release_targets();
    }
}

/// An observer behind the entrance surface, or with the opening outside its
/// view frustum, sees nothing through the portal and the whole render can
/// be skipped.
fn portal_is_visible(link: &PortalLink, head_position: Vec3, frustum: &FrustumPlanes) -> bool {
    let normal = link.local.forward();
    if (head_position - link.local.position).dot(normal) <= 0.0 {
        return false;
    }
    let radius = link.half_extents.length().max(MIN_VISIBILITY_RADIUS);
    sphere_in_frustum(frustum, link.local.position, radius)
}

fn link_is_finite(link: &PortalLink) -> bool {
    link.local.position.is_finite()
        && link.local.rotation.is_finite()
        && link.remote.position.is_finite()
        && link.remote.rotation.is_finite()
}

fn scaled_dimension(dimension: u32, multiplier: f32) -> u32 {
    ((dimension.max(1) as f32) * multiplier).round().max(1.0) as u32
}
