use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use base64::Engine;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use clothsim::Simulation;
use clothsim::config::{Backend, Params, RelaxMode};
use clothsim::render;

const MAX_FRAMES: u64 = 2000;

#[derive(Deserialize)]
struct SimulateRequest {
    seed: Option<u64>,
    frames: Option<u64>,
    grid_size: Option<usize>,
    backend: Option<Backend>,
    relax_mode: Option<RelaxMode>,
    lanes: Option<usize>,
    // Forces
    gravity: Option<f32>,
    wind_threshold: Option<f32>,
    wind_drift_step: Option<f32>,
}

#[derive(Serialize)]
struct SimulateResponse {
    data_url: String,
    timings: Vec<TimingEntry>,
    frames: u64,
    drift: f32,
    width: usize,
    height: usize,
}

#[derive(Serialize)]
struct TimingEntry {
    name: String,
    ms: f64,
}

type ApiError = (StatusCode, String);

fn encode_png(rgba: &[u8], w: usize, h: usize) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(&mut buf);
    encoder.write_image(rgba, w as u32, h as u32, image::ExtendedColorType::Rgba8)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
    Ok(format!("data:image/png;base64,{}", b64))
}

fn simulate(req: SimulateRequest) -> Result<SimulateResponse, ApiError> {
    let defaults = Params::default();
    let params = Params {
        seed: req.seed.unwrap_or(defaults.seed),
        grid_size: req.grid_size.unwrap_or(defaults.grid_size),
        backend: req.backend.unwrap_or(defaults.backend),
        relax_mode: req.relax_mode.unwrap_or(defaults.relax_mode),
        lanes: req.lanes.unwrap_or(defaults.lanes),
        gravity: req.gravity.unwrap_or(defaults.gravity),
        wind_threshold: req.wind_threshold.unwrap_or(defaults.wind_threshold),
        wind_drift_step: req.wind_drift_step.unwrap_or(defaults.wind_drift_step),
        ..defaults
    };
    let frames = req.frames.unwrap_or(60).min(MAX_FRAMES);
    let (width, height) = (params.canvas_width, params.canvas_height);

    let bad_request = |e: clothsim::error::SimError| (StatusCode::BAD_REQUEST, e.to_string());
    let internal = |e: String| (StatusCode::INTERNAL_SERVER_ERROR, e);

    let mut sim = Simulation::new(params).map_err(bad_request)?;
    let mut timings: Vec<TimingEntry> = Vec::new();
    for _ in 0..frames {
        for t in sim.step_frame().map_err(|e| internal(e.to_string()))? {
            match timings.iter_mut().find(|e| e.name == t.name) {
                Some(entry) => entry.ms += t.ms,
                None => timings.push(TimingEntry {
                    name: t.name.to_string(),
                    ms: t.ms,
                }),
            }
        }
    }

    let rgba = render::render_cloth(sim.layout(), width, height);
    let data_url = encode_png(&rgba, width, height).map_err(|e| internal(e.to_string()))?;

    Ok(SimulateResponse {
        data_url,
        timings,
        frames,
        drift: sim.drift(),
        width,
        height,
    })
}

async fn simulate_handler(
    Json(req): Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, ApiError> {
    let response = tokio::task::spawn_blocking(move || simulate(req))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;
    Ok(Json(response))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = Router::new()
        .route("/api/simulate", post(simulate_handler))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    log::info!("clothsim server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
