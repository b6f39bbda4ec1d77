//! Command-line frontend for oscilloscope screenshot capture.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scope_capture::config::{BackgroundColor, Settings};
use scope_capture::instrument::mock::MockScope;
use scope_capture::instrument::ScopeLink;
use scope_capture::{CaptureBackend, CaptureMetadataBuilder};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scope-capture", version, about)]
struct Cli {
    /// Settings file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in mock scope instead of VISA hardware.
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List attached supported oscilloscopes.
    Scan,
    /// Capture a screenshot and save it under the configured naming policy.
    Capture {
        /// Record a metadata sidecar field, e.g. --field part_number=IC123.
        /// May be given multiple times; any field implies a sidecar.
        #[arg(long = "field", value_parser = parse_key_val)]
        fields: Vec<(String, String)>,
    },
    /// Print the path the next capture would be written to.
    Preview,
    /// Inspect or change settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings as TOML.
    Show,
    /// Change the save directory.
    SetDirectory { directory: PathBuf },
    /// Change the base filename (no extension).
    SetFilename { filename: String },
    /// Select the naming mode.
    SetMode { mode: ModeArg },
    /// Select the screenshot background color.
    SetBackground { color: ColorArg },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Fixed,
    AutoIncrement,
    Datestamp,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorArg {
    White,
    Black,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("'{s}' is not in key=value form"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(Settings::default_config_path);
    let settings = Settings::load_from(&config_path)
        .with_context(|| format!("Failed to load settings from '{}'", config_path.display()))?;

    match cli.command {
        Command::Config { action } => run_config(action, settings, &config_path),
        command => {
            if cli.mock {
                run_instrument_command(command, MockScope::new(), settings, &config_path)
            } else {
                run_hardware_command(command, settings, &config_path)
            }
        }
    }
}

#[cfg(feature = "instrument_visa")]
fn run_hardware_command(
    command: Command,
    settings: Settings,
    config_path: &std::path::Path,
) -> Result<()> {
    run_instrument_command(
        command,
        scope_capture::instrument::visa::VisaLink::new(),
        settings,
        config_path,
    )
}

#[cfg(not(feature = "instrument_visa"))]
fn run_hardware_command(
    _command: Command,
    _settings: Settings,
    _config_path: &std::path::Path,
) -> Result<()> {
    Err(scope_capture::ScopeError::FeatureNotEnabled("instrument_visa".to_string()).into())
}

fn run_instrument_command<L: ScopeLink>(
    command: Command,
    link: L,
    settings: Settings,
    config_path: &std::path::Path,
) -> Result<()> {
    let mut backend = CaptureBackend::new(link, settings).with_settings_path(config_path);

    match command {
        Command::Scan => {
            let devices = backend.scan()?;
            if devices.is_empty() {
                println!("No supported oscilloscopes found.");
            }
            for device in &devices {
                println!("{device}");
            }
            if backend.state().is_connected() {
                println!("Auto-connected.");
            }
            Ok(())
        }
        Command::Capture { fields } => {
            let devices = backend.scan()?;
            if !backend.state().is_connected() {
                match devices.len() {
                    0 => bail!("No supported oscilloscopes found."),
                    _ => bail!(
                        "Found {} scopes; cannot auto-connect. Connect one device at a time.",
                        devices.len()
                    ),
                }
            }
            let outcome = if fields.is_empty() {
                backend.capture()?
            } else {
                backend.capture_annotated(CaptureMetadataBuilder::new().fields(fields))?
            };
            println!("Saved {} bytes to {}", outcome.bytes_written, outcome.path.display());
            Ok(())
        }
        Command::Preview => {
            println!("{}", backend.preview_path()?.display());
            Ok(())
        }
        Command::Config { .. } => unreachable!("handled in main"),
    }
}

fn run_config(
    action: ConfigAction,
    mut settings: Settings,
    config_path: &std::path::Path,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(&settings)?);
            return Ok(());
        }
        ConfigAction::SetDirectory { directory } => settings.set_save_directory(directory),
        ConfigAction::SetFilename { filename } => settings.default_filename = filename,
        ConfigAction::SetMode { mode } => match mode {
            ModeArg::Fixed => {
                settings.set_auto_increment(false);
                settings.set_datestamp(false);
            }
            ModeArg::AutoIncrement => settings.set_auto_increment(true),
            ModeArg::Datestamp => settings.set_datestamp(true),
        },
        ConfigAction::SetBackground { color } => {
            settings.background_color = match color {
                ColorArg::White => BackgroundColor::White,
                ColorArg::Black => BackgroundColor::Black,
            };
        }
    }
    settings.validate()?;
    settings.save_to(config_path)?;
    println!("Settings saved to {}", config_path.display());
    Ok(())
}
