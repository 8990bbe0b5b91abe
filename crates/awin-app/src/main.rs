mod config;

use std::path::PathBuf;
use std::rc::Rc;

use awin::{init_platform, Event, Platform, WindowId};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::AppConfig;

fn init_logging(config_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_event(window: WindowId, event: &Event) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{} {json}", window.0),
        Err(e) => warn!(%e, "unprintable event"),
    }
}

fn run(config: AppConfig) -> awin::Result<()> {
    let mut platform = init_platform(&config.platform)?;
    platform.registry().subscribe_all(Rc::new(print_event));

    let mut windows = Vec::with_capacity(config.windows.len());
    for window in &config.windows {
        windows.push(platform.create_window(window)?);
    }
    info!(backend = ?platform.backend_kind(), windows = windows.len(), "running");

    while !windows.is_empty() {
        platform.wait_events();
        close_requested(&mut platform, &mut windows)?;
    }
    platform.terminate();
    Ok(())
}

/// Destroys the windows whose close was requested.
fn close_requested(platform: &mut Platform, windows: &mut Vec<WindowId>) -> awin::Result<()> {
    let (closing, open): (Vec<_>, Vec<_>) =
        windows.iter().copied().partition(|&id| platform.window(id).should_close());
    *windows = open;
    for id in closing {
        info!(window = id.0, "closing");
        platform.destroy_window(id)?;
    }
    Ok(())
}

fn main() {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("awin.toml"));
    let config = AppConfig::load(&path);
    init_logging(config.as_ref().ok().and_then(|c| c.platform.log_filter.as_deref()));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(%e, "config rejected");
            std::process::exit(1);
        }
    };
    info!(path = %path.display(), "awin starting");
    if let Err(e) = run(config) {
        error!(%e, "awin failed");
        std::process::exit(1);
    }
}
