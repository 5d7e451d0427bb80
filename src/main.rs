use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init(); // RUST_LOG controls verbosity

    let args = abmerge::cli::Args::parse();
    let summary = abmerge::cli::run(&args)?;

    eprintln!(
        "{} contacts in, {} out ({} merged away, {} clusters skipped)",
        summary.input_records, summary.output_contacts, summary.merged_away, summary.skipped_clusters
    );
    Ok(())
}
