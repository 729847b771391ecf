//! Example installing a vehicle folder into a scratch game directory
//!
//! Run this example with:
//! ```
//! cargo run --example install_example -- <asset-folder> [spawn-name]
//! ```

use lml_installer::{
    ConsoleProgressReporter, InstallRequest, Installer, InstallerConfig, IntoProgressCallback,
};
use tempfile::tempdir;

#[tokio::main]
async fn main() -> lml_installer::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(folder) = args.next() else {
        eprintln!("usage: install_example <asset-folder> [spawn-name]");
        return Ok(());
    };
    let spawn_name = args.next();

    let game_dir = tempdir().map_err(|e| {
        lml_installer::InstallError::fs(std::env::temp_dir(), lml_installer::FileOperation::CreateDir, e)
    })?;
    println!("Game directory: {}", game_dir.path().display());

    let installer = Installer::new(InstallerConfig::new(game_dir.path()))?
        .with_progress_callback(ConsoleProgressReporter::new(true).into_callback());

    let mut request = InstallRequest::parse(&folder, None)?;
    if let Some(name) = spawn_name {
        request = request.with_identifier(name);
    }

    let outcome = installer.install(&request).await?;
    println!("\nInstalled {} at {}", outcome.package.folder, outcome.package.root.display());

    let manifest = std::fs::read_to_string(installer.config().manifest_path())
        .map_err(|e| lml_installer::InstallError::fs(installer.config().manifest_path(), lml_installer::FileOperation::Read, e))?;
    println!("{}", manifest);
    Ok(())
}
