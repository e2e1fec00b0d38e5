//! Terrain Flyover
//!
//! Run with: `cargo run --release --bin terrain_flyover [config.json]`
//!
//! Generates an fBm height field, flies a camera on a circuit over it and
//! logs what the mesh does every frame. Set `RUST_LOG=debug` for per-frame
//! detail, `RUST_LOG=trace` for individual splits and merges.
//!
//! The optional argument is a JSON `MeshConfig`; missing fields take their
//! defaults.

use std::time::Instant;

use glam::Vec3;
use roam_terrain_engine::camera::ViewFrustum;
use roam_terrain_engine::terrain::{fbm_field, FbmParams, MeshConfig, Result, TileMeshManager};

// ============================================================================
// FLIGHT
// ============================================================================

const TILES: usize = 8;
const FRAMES: usize = 240;
const ALTITUDE: f32 = 25.0;

/// Camera pose on a circle around the field centre at frame `frame`.
fn flight_pose(frame: usize, extent: f32) -> (Vec3, Vec3) {
    let angle = frame as f32 / FRAMES as f32 * std::f32::consts::TAU;
    let centre = extent * 0.5;
    let radius = extent * 0.3;
    let eye = Vec3::new(centre + radius * angle.cos(), ALTITUDE, centre + radius * angle.sin());
    let forward = Vec3::new(-angle.sin(), -0.25, angle.cos());
    (eye, forward)
}

fn load_config() -> Result<MeshConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let config = MeshConfig::from_json_file(&path)?;
            log::info!("Loaded config from {}", path);
            Ok(config)
        }
        None => Ok(MeshConfig::default()),
    }
}

fn run() -> Result<()> {
    let config = load_config()?;
    let samples = TILES * config.tile_size as usize + 1;
    let extent = (samples - 1) as f32;
    let far = config.far_clip;

    let started = Instant::now();
    let field = fbm_field(samples, samples, &FbmParams::default());
    let mut mesh = TileMeshManager::new(field, config)?;
    log::info!("Terrain ready in {:.1?}", started.elapsed());

    let mut total_splits = 0u64;
    let mut total_merges = 0u64;
    let flight = Instant::now();
    for frame in 0..FRAMES {
        let (eye, forward) = flight_pose(frame, extent);
        let eye = Vec3::new(eye.x, eye.y + mesh.height(eye.x, eye.z).unwrap_or(0.0), eye.z);
        let frustum = ViewFrustum::perspective(eye, forward, Vec3::Y, 60f32.to_radians(), 16.0 / 9.0, 1.0, far);

        let report = mesh.calculate(&frustum);
        total_splits += report.splits as u64;
        total_merges += report.merges as u64;

        if frame % 30 == 0 {
            let batch = mesh.vertex_batch(true);
            log::info!(
                "Frame {:3}: {} visible / {} active, {} vertices, {} splits, {} merges",
                frame,
                report.visible,
                report.active,
                batch.vertices.len(),
                report.splits,
                report.merges
            );
        }
        if report.iteration_cap_hit || report.detail_limit_hit {
            log::warn!("Frame {}: budget not reached ({:?})", frame, report);
        }
    }

    let elapsed = flight.elapsed();
    log::info!(
        "{} frames in {:.1?} ({:.2?} per frame), {} splits, {} merges",
        FRAMES,
        elapsed,
        elapsed / FRAMES as u32,
        total_splits,
        total_merges
    );
    match serde_json::to_string(mesh.stats()) {
        Ok(json) => log::info!("Stats: {}", json),
        Err(err) => log::warn!("Could not serialize stats: {}", err),
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
