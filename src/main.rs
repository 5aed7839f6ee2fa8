use log::info;
use std::io::{self, BufRead};
use std::sync::Arc;

use robothead::{AppConfig, GpioResolver};

fn main() -> io::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ROBOTHEAD_CONFIG").ok())
        .unwrap_or_else(|| "config.json".to_string());
    let config = Arc::new(
        AppConfig::load_from_file(&config_path)
            .unwrap_or_else(|e| panic!("Failed to load config: {e}")),
    );

    let resolver = GpioResolver::new(config.clone());
    let pin = config.trigger_pin();
    resolver
        .configure_input_with_callback(Arc::new(move || info!("Trigger on pin {pin} fired")))
        .map_err(io::Error::other)?;

    info!(
        "Watching pin {pin} with the {} provider, press Enter to exit...",
        resolver.provider().kind()
    );
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    // a cleanup warning has already been logged by the provider
    let _ = resolver.release_resources();
    Ok(())
}
