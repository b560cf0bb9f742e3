use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pulsefield", about = "Live microphone band-energy and beat meter")]
pub struct Cli {
    /// Config file (TOML). Defaults to ./pulsefield.toml when present.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input device name (see --list-devices)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Analyze a generated sine at this frequency instead of a device
    #[arg(long)]
    pub tone: Option<f32>,

    /// Capture sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<f32>,

    /// FFT size (power of two)
    #[arg(long)]
    pub fft_size: Option<usize>,

    /// Smoothing coefficient for all metrics, exclusive of 0 and 1
    #[arg(long)]
    pub smoothing: Option<f32>,

    /// Analyzer updates per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Write log output to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// List input devices and exit
    #[arg(long)]
    pub list_devices: bool,
}
