//! food_lensd - camera daemon for Food Lens
//!
//! This daemon:
//! 1. Opens the food log in the configured data directory
//! 2. Serves the HTTP API
//! 3. Runs one detection session on the configured camera
//!
//! The API keeps serving after the camera stream ends, until Ctrl-C.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use food_lens::{
    api::{ApiConfig, ApiServer},
    open_source, BackendRegistry, CalorieTable, DetectionSession, FoodLensConfig, FoodLog,
    FoodTracker, PendingBoard, Stabilizer,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = FoodLensConfig::load()?;
    log::info!(
        "food_lensd {} data_dir={} camera={} backend={}",
        env!("CARGO_PKG_VERSION"),
        config.data_dir.display(),
        config.camera.url,
        config.detection.backend
    );

    let log = FoodLog::open_dir(&config.data_dir)?;
    let tracker = FoodTracker::shared(CalorieTable::with_overrides(&config.foods), log);
    let board = PendingBoard::new();

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
    };
    let api_handle = ApiServer::new(api_config, Arc::clone(&tracker), board.clone()).spawn()?;
    log::info!("api listening on {}", api_handle.addr);

    let detector = BackendRegistry::from_settings(&config.detection);
    log::info!(
        "detector backends {:?}, default {:?}",
        detector.list(),
        detector.default_name()
    );
    let stabilizer = Stabilizer::from_settings(&config.detection);
    let mut session = DetectionSession::new(stabilizer, detector, board);
    let mut source = open_source(&config.camera)?;
    let target_fps = config.camera.target_fps;

    let shutdown = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let session_shutdown = Arc::clone(&shutdown);
    let worker = std::thread::spawn(move || {
        let result = session.run(source.as_mut(), &session_shutdown, target_fps);
        if let Ok(stats) = &result {
            log::info!("camera stream finished ({:?}), api stays up", stats.ended_by);
        }
        result
    });

    log::info!("food_lensd running, waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("stopping detection session and API server...");
    shutdown.store(true, Ordering::SeqCst);

    let session_result = worker
        .join()
        .map_err(|_| anyhow!("detection session thread panicked"))?;
    match session_result {
        Ok(stats) => log::info!(
            "session ended ({:?}) after {} frames",
            stats.ended_by,
            stats.frames_processed
        ),
        Err(e) => log::error!("detection session failed: {:#}", e),
    }
    api_handle.stop()?;

    Ok(())
}
