use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mes-check")]
#[command(about = "Inspect FITS files: locate the data-bearing HDU and report the pixel scale", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect a FITS file or a directory of FITS files
    Inspect {
        /// FITS file or directory to inspect
        path: String,

        /// Show all header keywords for every HDU
        #[arg(short, long)]
        verbose: bool,

        /// Output format (json, csv, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Print the pixel scale of a single FITS file
    Pixscale {
        /// FITS file to read
        path: String,

        /// HDU index to take the header from (defaults to the data-bearing HDU)
        #[arg(long)]
        hdu: Option<usize>,

        /// Report arcseconds per pixel instead of degrees per pixel
        #[arg(long)]
        arcsec: bool,
    },
}
