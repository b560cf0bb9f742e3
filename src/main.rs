use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod cli;
mod ui;

use cli::Cli;
use pulsefield::{
    CaptureBackend, Config, CpalBackend, SpectralAnalyzer, ToneBackend, list_input_devices,
    load_config,
};
use ui::{App, draw_ui, handle_events, init_terminal, restore_terminal};

const TONE_AMPLITUDE: f32 = 0.8;

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    if cli.list_devices {
        for name in list_input_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = resolve_config(&cli)?;
    let backend: Arc<dyn CaptureBackend> = match config.capture.tone_hz {
        Some(hz) => Arc::new(ToneBackend::new(hz, TONE_AMPLITUDE)),
        None => Arc::new(CpalBackend::new(config.capture.device.clone())),
    };

    let mut analyzer = SpectralAnalyzer::with_backend(config.analyzer, backend)
        .context("invalid analyzer configuration")?;

    let mut app = App::new(&analyzer);
    if let Err(e) = analyzer.start() {
        // Keep going with all-zero metrics; `r` retries.
        app.device_error = Some(e.to_string());
    }

    let mut terminal = init_terminal()?;

    ctrlc::set_handler(|| {
        let _ = restore_terminal();
        std::process::exit(0);
    })
    .context("failed to set Ctrl-C handler")?;

    let frame_duration = Duration::from_secs_f64(1.0 / cli.fps.max(1) as f64);

    loop {
        let frame_start = Instant::now();

        analyzer.update();
        app.refresh(&analyzer);

        handle_events(&mut app, &mut analyzer)?;

        if app.should_quit {
            break;
        }

        terminal.draw(|f| draw_ui(f, &app))?;

        if let Some(rest) = frame_duration.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    analyzer.stop();
    restore_terminal()?;
    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<(), anyhow::Error> {
    // The terminal UI owns stdout/stderr, so only warnings go there by default.
    let mut builder = match log_file {
        Some(_) => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")),
        None => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")),
    };
    builder.format_timestamp_millis();

    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// Config file values, overridden by any flag given on the command line.
fn resolve_config(cli: &Cli) -> Result<Config, anyhow::Error> {
    let path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("pulsefield.toml");
        local.exists().then_some(local)
    });

    let mut config = match path {
        Some(ref path) => {
            let config = load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            config
        }
        None => Config::default(),
    };

    if let Some(device) = &cli.device {
        config.capture.device = Some(device.clone());
    }
    if let Some(tone) = cli.tone {
        config.capture.tone_hz = Some(tone);
    }
    if let Some(sample_rate) = cli.sample_rate {
        config.analyzer.sample_rate = sample_rate;
    }
    if let Some(fft_size) = cli.fft_size {
        config.analyzer.fft_size = fft_size;
    }
    if let Some(smoothing) = cli.smoothing {
        config.analyzer.smoothing = smoothing;
    }

    Ok(config)
}
