use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clothsim::Simulation;
use clothsim::config::Params;
use clothsim::render;

/// clothsim [seed] [frames] [out_dir] [config.json]
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let seed: Option<u64> = args.get(1).and_then(|s| s.parse().ok());
    let frames: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(120);
    let out_dir: PathBuf = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("artifacts"));

    let mut params = match args.get(4) {
        Some(path) => Params::from_json_file(Path::new(path))
            .with_context(|| format!("loading config {}", path))?,
        None => Params::default(),
    };
    if let Some(seed) = seed {
        params.seed = seed;
    }

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    log::info!(
        "Simulating {}x{} cloth for {} frames, seed={}, backend={:?}, relax={:?}",
        params.grid_size,
        params.grid_size,
        frames,
        params.seed,
        params.backend,
        params.relax_mode
    );

    let (w, h) = (params.canvas_width, params.canvas_height);
    let mut sim = Simulation::new(params).context("initializing simulation")?;

    let mut totals: Vec<(&'static str, f64)> = Vec::new();
    for _ in 0..frames {
        let timings = sim.step_frame().context("stepping frame")?;
        for t in timings {
            match totals.iter_mut().find(|(name, _)| *name == t.name) {
                Some((_, ms)) => *ms += t.ms,
                None => totals.push((t.name, t.ms)),
            }
        }
    }

    log::info!("Timings ({} frames, mean per frame):", frames);
    for (name, ms) in &totals {
        log::info!("  {:12} {:8.3} ms", name, ms / frames.max(1) as f64);
    }
    log::info!("wind drift now {:.4}", sim.drift());

    let rgba = render::render_cloth(sim.layout(), w, h);
    let path = out_dir.join("cloth.png");
    image::save_buffer(&path, &rgba, w as u32, h as u32, image::ColorType::Rgba8)
        .with_context(|| format!("saving {}", path.display()))?;
    log::info!("Saved {}", path.display());

    Ok(())
}
