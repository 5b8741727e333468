use anyhow::Context;
use clap::{Parser, Subcommand};
use pamphlet::capability::BuiltinModuleSource;
use pamphlet::{
    DependencyLoader, DirectorySink, ExportConfig, ExportOutcome, ExportableRecord, Exporter,
    Color, HttpImageLoader, RenderTarget, StagingMode,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(version, about = "Export a roster as a one-page PDF or a one-slide deck", long_about = None)]
struct Cli {
    #[command(subcommand)]
    format: Format,
}

#[derive(Subcommand, Debug)]
enum Format {
    /// Single landscape page
    Pdf(ExportArgs),
    /// Single widescreen slide
    Pptx(ExportArgs),
}

#[derive(clap::Args, Debug)]
struct ExportArgs {
    /// Roster JSON (array, or object with `data`/`results`)
    #[arg(long)]
    roster: PathBuf,
    /// File name to save as
    #[arg(long)]
    out: String,
    /// Heading drawn above the cards
    #[arg(long)]
    heading: Option<String>,
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Card background, `#rgb` or `#rrggbb`
    #[arg(long, value_parser = parse_color)]
    background: Option<Color>,
    /// Resolve capabilities in-process instead of from the CDN
    #[arg(long, default_value_t = false)]
    offline: bool,
}

fn parse_color(s: &str) -> Result<Color, String> {
    Color::parse_hex(s).ok_or_else(|| format!("`{}` is not a hex color", s))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (args, pdf) = match cli.format {
        Format::Pdf(args) => (args, true),
        Format::Pptx(args) => (args, false),
    };

    let raw = tokio::fs::read_to_string(&args.roster)
        .await
        .with_context(|| format!("reading {}", args.roster.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("roster is not valid JSON")?;
    let records = ExportableRecord::from_roster(value)?;

    let config = ExportConfig {
        output_dir: args.output_dir,
        ..Default::default()
    };
    let loader = if args.offline {
        Arc::new(DependencyLoader::new(Arc::new(BuiltinModuleSource)))
    } else {
        DependencyLoader::shared(&config)?
    };
    let images = Arc::new(HttpImageLoader::new(&config)?);
    let target = RenderTarget::stage(records, args.heading.as_deref(), StagingMode::OffScreen, &config, images)?;
    if let Some(color) = args.background {
        target.set_background(color);
    }
    let exporter = Exporter::with_parts(loader, Arc::new(DirectorySink::new(config.output_dir.clone())), &config);

    let outcome = if pdf {
        exporter.export_as_pdf(&target, &args.out).await
    } else {
        exporter.export_as_slides(&target, &args.out).await
    };
    match outcome {
        Ok(ExportOutcome::Saved { path }) => println!("{}", path.display()),
        Ok(ExportOutcome::NothingToExport) => println!("Nothing to export"),
        Ok(ExportOutcome::Busy) => println!("An export is already running"),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
