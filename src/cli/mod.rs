mod bin;
mod segment;
mod shared;
mod utils;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use simple_error::{SimpleResult, bail};

use self::bin::validate_and_fix_bin_settings;
pub use self::bin::{BinSettings, write_bin_settings};
use self::segment::validate_and_fix_segment_settings;
pub use self::segment::{SegmentSettings, write_segment_settings};
pub use self::shared::SharedSettings;
use self::shared::validate_and_fix_shared_settings;

#[derive(Subcommand)]
pub enum Commands {
    /// Map genes to genome positions and group them into equal-size bins along each chromosome
    Bin(BinSettings),

    /// Find copy number breakpoints and segments for each tumor clone, given bin command results
    /// and per-cell gene copy number estimates
    Segment(SegmentSettings),
}

#[derive(Parser)]
#[command(
    version,
    about,
    help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(propagate_version = true, rename_all = "kebab_case")]
pub struct Settings {
    #[command(flatten)]
    pub shared: SharedSettings,

    #[command(subcommand)]
    pub command: Commands,
}

impl Settings {
    pub fn get_output_dir(&self) -> &Utf8Path {
        match &self.command {
            Commands::Bin(x) => &x.output_dir,
            Commands::Segment(x) => &x.output_dir,
        }
    }
}

/// Checks if a directory does not exist
///
pub fn check_novel_dirname(dirname: &Utf8Path, label: &str) -> SimpleResult<()> {
    if dirname.exists() {
        bail!("{label} already exists: \"{dirname}\"");
    }
    Ok(())
}

/// Validate settings and update parameters that can't be processed by clap
///
fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.shared = validate_and_fix_shared_settings(settings.shared)?;

    settings.command = match settings.command {
        Commands::Bin(x) => Commands::Bin(validate_and_fix_bin_settings(x)?),
        Commands::Segment(x) => Commands::Segment(validate_and_fix_segment_settings(x)?),
    };

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Any validation failure exits the program with a usage error
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}
