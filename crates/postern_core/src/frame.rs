use tracing::debug;

/// A unit of per-frame work scheduled by a [`FrameLoop`].
///
/// Stages tick in registration order every frame, so a stage that writes
/// shared context state must be registered ahead of every stage that reads
/// it. `init` runs once before the first frame; `shutdown` runs once, in
/// reverse registration order, when the loop is torn down.
pub trait Stage<C> {
    fn name(&self) -> &'static str;

    fn init(&mut self, _ctx: &mut C) {}

    fn tick(&mut self, ctx: &mut C, dt: f32);

    fn shutdown(&mut self) {}
}

/// Owns the registered stages and drives them frame by frame.
pub struct FrameLoop<C> {
    stages: Vec<Box<dyn Stage<C>>>,
    frame: u64,
}

impl<C> FrameLoop<C> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            frame: 0,
        }
    }

    pub fn add_stage(&mut self, stage: impl Stage<C> + 'static) {
        self.stages.push(Box::new(stage));
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn init(&mut self, ctx: &mut C) {
        for stage in &mut self.stages {
            debug!("initializing stage {}", stage.name());
            stage.init(ctx);
        }
    }

    pub fn run_frame(&mut self, ctx: &mut C, dt: f32) {
        for stage in &mut self.stages {
            stage.tick(ctx, dt);
        }
        self.frame += 1;
    }

    pub fn shutdown(&mut self) {
        for stage in self.stages.iter_mut().rev() {
            debug!("shutting down stage {}", stage.name());
            stage.shutdown();
        }
    }
}

impl<C> Default for FrameLoop<C> {
    fn default() -> Self {
        Self::new()
    }
}
