//! Command-line front end for the LML installer

mod settings;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use lml_installer::{
    ConsoleProgressReporter, HandlingPresets, InstallRequest, Installer, InstallerConfig,
    IntoProgressCallback, PackageKind,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "lml-install", version, about = "Install vehicle and DLC packages for Lenny's Mod Loader")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install a package from a folder, .zip, .rpf, URL or protocol link
    Install {
        source: String,

        /// Metadata archive URL for a DLC binary
        #[arg(long)]
        metadata: Option<String>,

        /// Spawn name or package name to use when the package does not set one
        #[arg(long)]
        name: Option<String>,

        /// Game directory (overrides the saved one)
        #[arg(long, env = "LML_GAME_DIR")]
        game_dir: Option<PathBuf>,

        /// Folder of extra handling presets (*.meta)
        #[arg(long)]
        presets: Option<PathBuf>,

        /// Attempts per download
        #[arg(long, default_value_t = 3)]
        attempts: usize,

        /// Seconds between download attempts
        #[arg(long, default_value_t = 2)]
        retry_delay: u64,
    },
    /// Save the game directory used by later installs
    SetGameDir { path: PathBuf },
    /// Print the saved settings
    ShowSettings,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn settings_path(cli: &Cli) -> Result<PathBuf> {
    cli.settings
        .clone()
        .or_else(Settings::default_path)
        .context("No configuration directory available; pass --settings")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings_path = settings_path(&cli)?;
    let mut settings = Settings::load(&settings_path)?;
    debug!("Loaded settings from {}", settings_path.display());

    match cli.command {
        Command::SetGameDir { path } => {
            if !InstallerConfig::is_game_dir(&path) {
                bail!("{} does not contain GTA5.exe", path.display());
            }
            settings.game_dir = Some(path.clone());
            settings.save(&settings_path)?;
            println!("Game directory set to {}", path.display());
        }
        Command::ShowSettings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Install {
            source,
            metadata,
            name,
            game_dir,
            presets,
            attempts,
            retry_delay,
        } => {
            let Some(game_dir) = game_dir.or(settings.game_dir) else {
                bail!("No game directory configured; pass --game-dir or run set-game-dir");
            };
            if !InstallerConfig::is_game_dir(&game_dir) {
                warn!("{} does not contain GTA5.exe", game_dir.display());
            }

            let config = InstallerConfig::builder(&game_dir)
                .max_attempts(attempts)
                .retry_delay(Duration::from_secs(retry_delay))
                .build();

            let mut handling_presets = HandlingPresets::builtin();
            if let Some(dir) = presets {
                handling_presets.load_dir(&dir).await?;
            }

            let installer = Installer::new(config)?
                .with_presets(handling_presets)
                .with_progress_callback(ConsoleProgressReporter::new(cli.verbose > 0).into_callback());

            let mut request = InstallRequest::parse(&source, metadata.as_deref())?;
            if let Some(name) = name {
                request = request.with_identifier(name);
            }

            let outcome = installer.install(&request).await?;
            println!();
            let kind = match outcome.package.kind {
                PackageKind::Vehicle => "vehicle",
                PackageKind::Dlc => "DLC",
            };
            println!(
                "Installed {} package {} to {}",
                kind,
                outcome.package.folder,
                outcome.package.root.display()
            );
            for file in &outcome.lighting {
                println!("Lighting definition: {}", file.display());
            }
        }
    }

    Ok(())
}
