//! bottomspeed CLI - patch first-layer and bottom-infill speeds in G-code
//!
//! Usage:
//!   bottomspeed patch <input.gcode>... [-o <output>] [--config speeds.toml] [--enable]
//!   bottomspeed definitions

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bottomspeed::{BottomSpeedPlugin, BottomSpeedSettings, ProfileStack};
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};

mod chunks;
mod scene;

use scene::FileScene;

/// Force first-layer and bottom-infill speeds in sliced G-code
#[derive(Parser, Debug)]
#[command(name = "bottomspeed")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rewrite feed rates of first-layer and bottom-layer sections
    Patch {
        /// Input G-code files, one per build plate
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Output file, or directory when patching several inputs (default: stdout)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Overwrite the input files
        #[arg(long, conflicts_with = "output")]
        in_place: bool,

        /// Settings file (TOML)
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Turn patching on regardless of the settings file
        #[arg(long)]
        enable: bool,

        /// Initial layer skin speed in mm/s (<= 0 disables)
        #[arg(long, allow_negative_numbers = true)]
        first_layer_infill_speed: Option<f64>,

        /// Initial layer wall speed in mm/s (<= 0 disables)
        #[arg(long, allow_negative_numbers = true)]
        first_layer_wall_speed: Option<f64>,

        /// Bottom layer skin speed in mm/s (<= 0 disables)
        #[arg(long, allow_negative_numbers = true)]
        bottom_infill_speed: Option<f64>,
    },
    /// Print the host option definitions as JSON
    Definitions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Patch {
            inputs,
            output,
            in_place,
            config,
            enable,
            first_layer_infill_speed,
            first_layer_wall_speed,
            bottom_infill_speed,
        } => {
            let mut settings = match &config {
                Some(path) => BottomSpeedSettings::load(path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => BottomSpeedSettings::default(),
            };
            settings.enabled |= enable;
            if let Some(speed) = first_layer_infill_speed {
                settings.first_layer_infill_speed = speed;
            }
            if let Some(speed) = first_layer_wall_speed {
                settings.first_layer_wall_speed = speed;
            }
            if let Some(speed) = bottom_infill_speed {
                settings.bottom_infill_speed = speed;
            }
            settings.validate()?;
            cmd_patch(&inputs, output, in_place, &settings)
        }
        Commands::Definitions => cmd_definitions(),
    }
}

fn cmd_patch(
    inputs: &[PathBuf],
    output: Option<PathBuf>,
    in_place: bool,
    settings: &BottomSpeedSettings,
) -> Result<()> {
    if !settings.enabled {
        warn!("bottom-speed patching is disabled; output is unchanged (use --enable)");
    }

    let mut scene = FileScene::load(inputs)?;
    let stack = ProfileStack::from_settings(settings);
    let outcome = BottomSpeedPlugin::new().on_write_started(Some(&stack), &mut scene);
    info!(
        "patched {} of {} plates, {} feed rates rewritten",
        outcome.patched.len(),
        inputs.len(),
        outcome.rewritten_lines
    );

    if in_place {
        for (path, text) in scene.plates() {
            write_file(path, &text)?;
        }
        return Ok(());
    }

    match output {
        Some(path) if inputs.len() == 1 => {
            for (_, text) in scene.plates() {
                write_file(&path, &text)?;
            }
        }
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            for (source, text) in scene.plates() {
                let Some(name) = source.file_name() else {
                    bail!("input {} has no file name", source.display());
                };
                write_file(&dir.join(name), &text)?;
            }
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            for (_, text) in scene.plates() {
                stdout.write_all(text.as_bytes())?;
            }
        }
    }

    Ok(())
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn cmd_definitions() -> Result<()> {
    let json = serde_json::to_string_pretty(&bottomspeed::settings::definitions_json())?;
    println!("{json}");
    Ok(())
}
