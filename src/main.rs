use anyhow::{Context, Result};
use mars_bootstrap::{AshDriver, Config, Engine};
use std::process::ExitCode;

fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(()) => {
            wait_for_keypress();
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();
    builder.init();
}

fn run() -> Result<()> {
    let config = Config::load();
    let engine_config = config
        .engine_config()
        .context("Invalid engine configuration")?;
    log::info!(
        "Starting {} (diagnostics {:?})",
        engine_config.app_name,
        engine_config.diagnostics
    );

    let driver = AshDriver::load().context("Failed to load the Vulkan library")?;
    let engine = Engine::start(driver, &engine_config)?;
    engine.stop().context("Engine teardown failed")?;
    Ok(())
}

fn wait_for_keypress() {
    let mut line = String::new();
    if let Err(err) = std::io::stdin().read_line(&mut line) {
        log::debug!("stdin closed: {}", err);
    }
}
