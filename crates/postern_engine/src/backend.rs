use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::settings::LayerMask;

/// Handle to a backend-owned offscreen render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u32);

/// Everything needed to allocate one portal eye target.
#[derive(Debug, Clone, Copy)]
pub struct TargetDesc<'a> {
    pub width: u32,
    pub height: u32,
    pub label: &'a str,
}

/// One portal eye view, laid out for direct upload into a GPU uniform
/// buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewUniform {
    pub view_proj: [[f32; 4]; 4],
    pub position: [f32; 3],
    pub _padding: f32,
}

/// Host rendering services the portal engine drives. Implementations own
/// the actual textures and draw submission; the engine only ever refers to
/// targets by id.
pub trait RenderBackend {
    fn create_target(&mut self, desc: &TargetDesc<'_>) -> TargetId;

    fn release_target(&mut self, target: TargetId);

    /// Renders one portal eye view into `target`. Calls arrive in the order
    /// the images must be ready, ahead of the host's own main view.
    fn submit_view(&mut self, target: TargetId, uniform: &ViewUniform, layers: LayerMask);

    /// Hands both eye images to the portal surface material.
    fn bind_surface_textures(&mut self, left: TargetId, right: TargetId);

    /// Stereo compositing off means the surface shows the left image to
    /// both eyes.
    fn set_stereo_compositing(&mut self, enabled: bool);

    fn disable_post_processing(&mut self);

    fn disable_antialiasing(&mut self);
}

#[derive(Debug, Clone)]
pub struct HeadlessTarget {
    pub width: u32,
    pub height: u32,
    pub label: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SubmittedView {
    pub target: TargetId,
    pub uniform: ViewUniform,
    pub layers: LayerMask,
}

/// Backend that tracks allocations and records submissions without touching
/// a GPU. Stands in for the real thing in tests and the probe tool.
pub struct HeadlessBackend {
    targets: FxHashMap<TargetId, HeadlessTarget>,
    next_target: u32,
    submissions: Vec<SubmittedView>,
    bound_surface: Option<(TargetId, TargetId)>,
    stereo_compositing: bool,
    post_processing: bool,
    antialiasing: bool,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self {
            targets: FxHashMap::default(),
            next_target: 0,
            submissions: Vec::new(),
            bound_surface: None,
            stereo_compositing: true,
            post_processing: true,
            antialiasing: true,
        }
    }
}

impl HeadlessBackend {
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn target(&self, id: TargetId) -> Option<&HeadlessTarget> {
        self.targets.get(&id)
    }

    pub fn submissions(&self) -> &[SubmittedView] {
        &self.submissions
    }

    pub fn clear_submissions(&mut self) {
        self.submissions.clear();
    }

    pub fn bound_surface(&self) -> Option<(TargetId, TargetId)> {
        self.bound_surface
    }

    pub fn stereo_compositing(&self) -> bool {
        self.stereo_compositing
    }

    pub fn post_processing(&self) -> bool {
        self.post_processing
    }

    pub fn antialiasing(&self) -> bool {
        self.antialiasing
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_target(&mut self, desc: &TargetDesc<'_>) -> TargetId {
        let id = TargetId(self.next_target);
        self.next_target += 1;
        debug!(
            "created target {:?} '{}' at {}x{}",
            id, desc.label, desc.width, desc.height
        );
        self.targets.insert(
            id,
            HeadlessTarget {
                width: desc.width,
                height: desc.height,
                label: desc.label.to_string(),
            },
        );
        id
    }

    fn release_target(&mut self, target: TargetId) {
        if self.targets.remove(&target).is_none() {
            debug!("released unknown target {target:?}");
        }
    }

    fn submit_view(&mut self, target: TargetId, uniform: &ViewUniform, layers: LayerMask) {
        self.submissions.push(SubmittedView {
            target,
            uniform: *uniform,
            layers,
        });
    }

    fn bind_surface_textures(&mut self, left: TargetId, right: TargetId) {
        self.bound_surface = Some((left, right));
    }

    fn set_stereo_compositing(&mut self, enabled: bool) {
        self.stereo_compositing = enabled;
    }

    fn disable_post_processing(&mut self) {
        self.post_processing = false;
    }

    fn disable_antialiasing(&mut self) {
        self.antialiasing = false;
    }
}

#[cfg(test)]
mod tests {
    use crate::settings::LayerMask;

    use super::{HeadlessBackend, RenderBackend, TargetDesc, ViewUniform};

    fn test_uniform() -> ViewUniform {
        ViewUniform {
            view_proj: [[0.0; 4]; 4],
            position: [1.0, 2.0, 3.0],
            _padding: 0.0,
        }
    }

    #[test]
    fn created_targets_get_distinct_ids_and_keep_their_labels() {
        let mut backend = HeadlessBackend::default();
        let a = backend.create_target(&TargetDesc {
            width: 640,
            height: 480,
            label: "left",
        });
        let b = backend.create_target(&TargetDesc {
            width: 640,
            height: 480,
            label: "right",
        });

        assert_ne!(a, b);
        assert_eq!(backend.target_count(), 2);
        assert_eq!(backend.target(a).unwrap().label, "left");
        assert_eq!(backend.target(b).unwrap().label, "right");
    }

    #[test]
    fn releasing_a_target_frees_its_slot() {
        let mut backend = HeadlessBackend::default();
        let id = backend.create_target(&TargetDesc {
            width: 64,
            height: 64,
            label: "scratch",
        });

        backend.release_target(id);

        assert_eq!(backend.target_count(), 0);
        assert!(backend.target(id).is_none());
    }

    #[test]
    fn submissions_are_recorded_in_order() {
        let mut backend = HeadlessBackend::default();
        let a = backend.create_target(&TargetDesc {
            width: 64,
            height: 64,
            label: "a",
        });
        let b = backend.create_target(&TargetDesc {
            width: 64,
            height: 64,
            label: "b",
        });

        backend.submit_view(a, &test_uniform(), LayerMask::ALL);
        backend.submit_view(b, &test_uniform(), LayerMask::ALL);

        let submitted: Vec<_> = backend.submissions().iter().map(|s| s.target).collect();
        assert_eq!(submitted, vec![a, b]);
    }

    #[test]
    fn pipeline_toggles_start_on_and_latch_off() {
        let mut backend = HeadlessBackend::default();
        assert!(backend.post_processing());
        assert!(backend.antialiasing());

        backend.disable_post_processing();
        backend.disable_antialiasing();
        backend.set_stereo_compositing(false);

        assert!(!backend.post_processing());
        assert!(!backend.antialiasing());
        assert!(!backend.stereo_compositing());
    }
}
