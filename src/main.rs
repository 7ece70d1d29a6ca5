use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "image-translator-rust",
    version,
    about = "Replace the text in a folder of images with its translation"
)]
struct Cli {
    /// Directory containing the .jpg/.jpeg/.png images to translate
    input_dir: PathBuf,

    /// Directory receiving <name>_translated.<ext> files
    output_dir: PathBuf,

    /// Target language (default: en)
    #[arg(short = 'l', long = "lang", default_value = "en")]
    lang: String,

    /// Pixel tolerance for merging neighbouring OCR fragments
    #[arg(short = 't', long = "threshold")]
    threshold: Option<i32>,

    /// Google Cloud API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Number of images processed in parallel
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<usize>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    image_translator_rust::logging::init(cli.verbose)?;

    let report = image_translator_rust::run(image_translator_rust::Config {
        input_dir: cli.input_dir,
        output_dir: cli.output_dir,
        lang: cli.lang,
        merge_threshold: cli.threshold,
        key: cli.key,
        settings_path: cli.read_settings,
        jobs: cli.jobs,
    })
    .await?;

    for file in &report.succeeded {
        println!("{}\t{}", file.input.display(), file.output.display());
    }
    for failure in &report.failed {
        eprintln!("failed\t{}\t{}", failure.input.display(), failure.error);
    }
    if !report.failed.is_empty() {
        bail!(
            "{} of {} image(s) failed",
            report.failed.len(),
            report.total()
        );
    }
    Ok(())
}
