mod scene;

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use postern_core::events;
use postern_engine::backend::HeadlessBackend;
use postern_engine::crossing::{CrossingDetector, CrossingStage};
use postern_engine::rig::StereoRig;
use postern_engine::settings;
use postern_engine::tracking::{ScriptedTracker, TrackingStage};
use postern_engine::{standard_pipeline, FrameContext};
use postern_math::projection::Perspective;

const FRAME_DT: f32 = 1.0 / 90.0;
const DEFAULT_FRAMES: u64 = 2400;
const DEFAULT_IPD: f32 = 0.064;

fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    let mut scene_path = PathBuf::from("scene.toml");
    let mut settings_path = PathBuf::from("postern.toml");
    let mut frames = DEFAULT_FRAMES;
    let mut mono = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--scene" => {
                let Some(value) = args.next() else {
                    eprintln!("--scene expects a path argument");
                    std::process::exit(2);
                };
                scene_path = PathBuf::from(value);
            }
            "--settings" => {
                let Some(value) = args.next() else {
                    eprintln!("--settings expects a path argument");
                    std::process::exit(2);
                };
                settings_path = PathBuf::from(value);
            }
            "--frames" => {
                let Some(value) = args.next() else {
                    eprintln!("--frames expects a numeric argument");
                    std::process::exit(2);
                };
                match value.parse::<u64>() {
                    Ok(parsed) => frames = parsed,
                    Err(err) => {
                        eprintln!("invalid frame count '{value}': {err}");
                        std::process::exit(2);
                    }
                }
            }
            "--mono" => mono = true,
            "--help" | "-h" => {
                println!(
                    "Usage: portal_probe [--scene <path>] [--settings <path>] [--frames <u64>] [--mono]"
                );
                return;
            }
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(2);
            }
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing up...");
        r.store(false, Ordering::SeqCst);
    })
    .expect("failed to set Ctrl+C handler");

    let settings = settings::load_or_create(&settings_path);
    let scene = scene::load_or_create(&scene_path);
    info!(
        "probe starting: {} portals, up to {frames} frames{}",
        scene.portals.len(),
        if mono { ", mono fallback" } else { "" }
    );

    let (events_tx, events_rx) = events::channel();

    let fallback = Perspective {
        near: settings.near_clip,
        far: settings.far_clip,
        ..scene.reference.perspective
    };
    let tracking = TrackingStage::new(ScriptedTracker::new(DEFAULT_IPD, !mono), fallback);
    let crossing = CrossingStage::new(CrossingDetector::new(scene.portals.clone(), events_tx));
    let rig = StereoRig::new(
        HeadlessBackend::default(),
        scene.portals.first().copied(),
        scene.reference.clone(),
        settings,
    );

    let mut frame_loop = standard_pipeline(tracking, crossing, rig);
    frame_loop.add_stage(scene::WalkStage::new(scene.script.clone()));

    let mut ctx = FrameContext::new(scene.observer_start);
    frame_loop.init(&mut ctx);

    while running.load(Ordering::SeqCst) && frame_loop.frame() < frames {
        frame_loop.run_frame(&mut ctx, FRAME_DT);
        for event in events_rx.try_iter() {
            info!("portal event: {event:?}");
        }
    }

    frame_loop.shutdown();
    info!(
        "probe finished after {} frames, observer at {:.2} {:.2} {:.2}",
        frame_loop.frame(),
        ctx.observer.position.x,
        ctx.observer.position.y,
        ctx.observer.position.z
    );
}
