use clap::Parser;
use mes_check::cli::{Cli, Commands};
use mes_check::commands;

fn main() -> anyhow::Result<()> {
    // Initialize tracing (RUST_LOG controls the filter)
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            path,
            verbose,
            format,
        } => {
            commands::inspect(&path, verbose, &format)?;
        }
        Commands::Pixscale { path, hdu, arcsec } => {
            commands::pixscale(&path, hdu, arcsec)?;
        }
    }

    Ok(())
}
