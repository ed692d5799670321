//! cloudproj - point cloud projection renderer
//!
//! Renders one frame of a dataset to PNG from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cloudproj::app::{self, RunOptions};
use cloudproj::config::AppConfig;

#[derive(Parser)]
#[command(name = "cloudproj")]
#[command(about = "Project a point cloud to an image")]
#[command(version)]
struct Cli {
    /// Dataset path without extension (tries .bin, .ply, .las, .laz)
    stem: PathBuf,

    /// Output image
    #[arg(short, long, default_value = "frame.png")]
    output: PathBuf,

    /// Directory holding default.toml and user.toml
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,

    /// Also export the loaded cloud as PLY
    #[arg(short, long)]
    export: bool,

    /// Write the height filter's heightmap to this path
    #[arg(long)]
    heightmap: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is configured by the config file, so a broken file can only
    // be reported on stderr
    let config = AppConfig::load_from(&cli.config_dir).unwrap_or_else(|e| {
        eprintln!("{}. Using defaults.", e);
        AppConfig::default()
    });

    // RUST_LOG takes precedence over debug.log_level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.debug.log_level)).init();
    log::info!("Starting cloudproj");

    let options = RunOptions {
        stem: cli.stem,
        output: cli.output,
        export: cli.export,
        heightmap: cli.heightmap,
    };

    match app::run(&config, &options) {
        Ok(summary) => {
            log::info!(
                "Rendered {} of {} points ({:?} source, {:?} backend) to {}",
                summary.points_uploaded,
                summary.points_loaded,
                summary.source,
                summary.backend,
                summary.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
