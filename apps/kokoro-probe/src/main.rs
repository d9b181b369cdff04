//! Kokoro GPU probe
//!
//! Opens a window, bootstraps a GPU context against it, builds a small set of
//! resources and logs what the device layer selected.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p kokoro-probe -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod probe;

use tracing_subscriber::EnvFilter;
use winit::event_loop::{ControlFlow, EventLoop};

use crate::probe::Probe;

/// Command line options.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub validation: bool,
    /// SPIR-V vertex shader for the sample pipeline.
    pub vertex_shader: Option<String>,
    /// SPIR-V fragment shader for the sample pipeline.
    pub fragment_shader: Option<String>,
    /// Close the window once probing is done.
    pub exit_after: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            title: "Kokoro Probe".to_string(),
            width: 1280,
            height: 720,
            validation: cfg!(debug_assertions),
            vertex_shader: None,
            fragment_shader: None,
            exit_after: false,
        }
    }
}

impl ProbeConfig {
    /// Parse options from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--width" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        config.width = v;
                        i += 1;
                    }
                }
                "--height" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        config.height = v;
                        i += 1;
                    }
                }
                "--title" => {
                    if let Some(v) = value {
                        config.title.clone_from(v);
                        i += 1;
                    }
                }
                "--vertex" => {
                    if let Some(v) = value {
                        config.vertex_shader = Some(v.clone());
                        i += 1;
                    }
                }
                "--fragment" => {
                    if let Some(v) = value {
                        config.fragment_shader = Some(v.clone());
                        i += 1;
                    }
                }
                "--validation" => config.validation = true,
                "--no-validation" => config.validation = false,
                "--exit-after" => config.exit_after = true,
                other => tracing::warn!("Ignoring unknown argument {other}"),
            }
            i += 1;
        }

        config
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ProbeConfig::from_args();
    tracing::info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut probe = Probe::new(config);
    event_loop.run_app(&mut probe)?;

    probe.into_result()
}

fn print_help() {
    eprintln!(
        "Kokoro GPU probe

USAGE:
    cargo run -p kokoro-probe -- [OPTIONS]

OPTIONS:
    --width <N>          Window width (default: 1280)
    --height <N>         Window height (default: 720)
    --title <TITLE>      Window title
    --validation         Enable validation layers
    --no-validation      Disable validation layers
    --vertex <PATH>      SPIR-V vertex shader for the sample pipeline
    --fragment <PATH>    SPIR-V fragment shader for the sample pipeline
    --exit-after         Close once the resources are built
    -h, --help           Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG             Set log level (e.g., info, debug, trace)"
    );
}
