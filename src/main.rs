use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use xmlwalk::{
    ensure_input_readable, is_non_empty_file, memory, remove_if_present, CsvRowWriter,
    RemoveOutcome, Schema, Session, SessionConfig, TagFilter,
};

#[derive(Parser, Debug)]
#[command(name = "xmlwalk", version)]
#[command(about = "Stream matching XML elements into CSV rows.", long_about = None)]
struct Cli {
    /// Element to turn into rows: `local`, `{uri}local`, `{*}local` or `*`.
    /// Repeat to match several tags.
    #[arg(short, long, value_name = "TAG")]
    tag: Vec<String>,

    /// XML input file
    #[arg(short, long)]
    input: PathBuf,

    /// CSV output file, replaced on every run
    #[arg(short, long)]
    output: PathBuf,

    /// XSD file; ignored when missing or empty
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Validate against the document's DTD
    #[arg(long)]
    dtd: bool,

    /// Keep whitespace-only text
    #[arg(long)]
    keep_blank_text: bool,

    /// Child path logged at debug level for every row, e.g. `ns:c1`
    #[arg(long, value_name = "PATH")]
    probe: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match try_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            match err.downcast_ref::<xmlwalk::Error>() {
                Some(xmlwalk::Error::InputUnavailable { .. }) => ExitCode::from(1),
                _ => ExitCode::from(2),
            }
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn try_main(cli: Cli) -> Result<()> {
    let mut config = SessionConfig::new(&cli.input)
        .dtd_validation(cli.dtd)
        .keep_blank_text(cli.keep_blank_text);
    if !cli.tag.is_empty() {
        config = config.tag(TagFilter::from_patterns(&cli.tag)?);
    }
    if let Some(path) = cli.schema.as_ref().filter(|p| is_non_empty_file(p)) {
        let schema = Schema::from_file(path).with_context(|| format!("loading schema {}", path.display()))?;
        config = config.schema(schema);
    }

    if let RemoveOutcome::Removed = remove_if_present(&cli.output) {
        println!("File deleted: {}.", cli.output.display());
    }

    println!("Processing: {}.", cli.input.display());
    // No output file for an input that cannot be processed
    ensure_input_readable(&cli.input)?;
    let mut writer = CsvRowWriter::append(&cli.output)
        .with_context(|| format!("opening output {}", cli.output.display()))?;
    if let Some(probe) = &cli.probe {
        writer = writer.with_probe(probe);
    }
    let stats = Session::run(&config, writer)?;
    debug!(
        rows = stats.elements_dispatched,
        peak_live_nodes = stats.peak_live_nodes,
        heap_bytes = memory::current(),
        heap_peak_bytes = memory::peak(),
        "run complete"
    );
    println!("Done!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_repeated_tags() {
        let cli = Cli::try_parse_from(["xmlwalk", "-t", "r", "--tag", "{urn:a}s", "-i", "in.xml", "-o", "out.csv", "-vv"])
            .unwrap();
        assert_eq!(cli.tag, vec!["r", "{urn:a}s"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.schema.is_none());
    }

    #[test]
    fn test_input_and_output_required() {
        assert!(Cli::try_parse_from(["xmlwalk", "-i", "in.xml"]).is_err());
        assert!(Cli::try_parse_from(["xmlwalk", "-o", "out.csv"]).is_err());
    }
}
