mod aggregate;
mod config;
mod error;
mod extract;
mod interpret;
mod llm_extract;
mod normalize;
mod ocr;
mod pipeline;
mod prompt;
mod record;
mod session;

use clap::{Parser, Subcommand};
use config::Config;
use extract::{PdfTextExtractor, TextSource};
use llm_extract::{ChatClient, ModelClient};
use ocr::TesseractOcr;
use pipeline::{Pipeline, discover_pdfs};
use record::BillFields;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "bill_parser", version, about = "Extract electricity billing fields from PDF invoices")]
struct Cli {
    /// TOML config file (optional)
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse bills and write the CSV
    Run {
        /// Explicit PDF files; when omitted the input directory is scanned
        files: Vec<PathBuf>,

        #[arg(long)]
        input_dir: Option<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,

        /// Keep polling the input directory and re-run when its contents change
        #[arg(long, conflicts_with = "files")]
        watch: bool,

        /// Seconds between polls in watch mode
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
    /// Show every stage for a single PDF
    Inspect {
        pdf: PathBuf,

        /// Stop after text extraction and prompt building
        #[arg(long)]
        no_model: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Run {
            files,
            input_dir,
            output,
            watch,
            interval,
        } => {
            let input_dir = input_dir.unwrap_or_else(|| PathBuf::from(&cfg.input_dir));
            let output = output.unwrap_or_else(|| PathBuf::from(&cfg.output_path));
            let pipeline = build_pipeline(&cfg)?;

            if watch {
                watch_dir(&pipeline, &input_dir, &output, Duration::from_secs(interval)).await;
            } else {
                let paths = if files.is_empty() {
                    discover_pdfs(&input_dir)?
                } else {
                    files
                };
                run_once(&pipeline, &paths, &output).await?;
            }
        }
        Command::Inspect { pdf, no_model } => inspect(&cfg, &pdf, no_model).await?,
    }

    Ok(())
}

type BillPipeline = Pipeline<PdfTextExtractor<TesseractOcr>, ChatClient>;

fn build_pipeline(cfg: &Config) -> Result<BillPipeline, Box<dyn std::error::Error>> {
    let ocr = TesseractOcr::new(&cfg.ocr);
    if !ocr.is_available() {
        warn!("pdftoppm/tesseract not found; scanned PDFs will fail extraction");
    }
    let client = ChatClient::from_env(&cfg.llm)?;
    Ok(Pipeline::new(PdfTextExtractor::new(ocr), client))
}

async fn run_once(
    pipeline: &BillPipeline,
    paths: &[PathBuf],
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if paths.is_empty() {
        warn!("No PDF files to process");
        return Ok(());
    }

    let results = pipeline.process_batch(paths).await;
    print!("{}", results.render_table());
    results.write_csv_file(output)?;

    let (ok, failed) = results.counts();
    println!(
        "\nExported {} bills to {} ({ok} parsed, {failed} failed)",
        results.len(),
        output.display()
    );
    Ok(())
}

async fn watch_dir(pipeline: &BillPipeline, input_dir: &Path, output: &Path, interval: Duration) {
    info!("Ctrl-C to stop watching");
    // spawned so the handler is installed before the first batch
    let stop = tokio::spawn(tokio::signal::ctrl_c());
    pipeline
        .watch(input_dir, output, interval, stop, |results| {
            print!("{}", results.render_table())
        })
        .await;
}

/// Walk one PDF through every stage and print what each produced.
async fn inspect(cfg: &Config, pdf: &Path, no_model: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!(pdf = %pdf.display(), "Inspecting single bill");
    let extractor = PdfTextExtractor::new(TesseractOcr::new(&cfg.ocr));

    let text = match extractor.extract(pdf) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Text extraction failed");
            println!("\n✗ Error: {e}\n");
            return Ok(());
        }
    };

    println!("\n--- Extracted Text (first 2000 chars) ---");
    println!("{}", text.chars().take(2000).collect::<String>());
    println!("--- End ({} chars) ---\n", text.chars().count());

    let prompt = prompt::build_prompt(&text);
    println!("Prompt: {} chars", prompt.chars().count());

    if no_model {
        return Ok(());
    }

    let client = ChatClient::from_env(&cfg.llm)?;
    println!("--- Model Reply ({}) ---", client.model());
    let reply = match client.complete(&prompt).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "Model call failed");
            println!("✗ {e}\n");
            return Ok(());
        }
    };
    println!("{reply}");
    println!("--- End Reply ---\n");

    let filename = session::display_name(pdf);
    match interpret::interpret(&reply, &filename) {
        Ok(map) => {
            let fields = BillFields::from_map(&map);
            let (filled, total) = fields.coverage();
            println!("--- Interpreted Fields ---");
            println!("{}", serde_json::to_string_pretty(&fields)?);
            println!("--- End Fields ({filled}/{total} fields) ---\n");
        }
        Err(e) => {
            error!(error = %e, "Could not interpret reply");
            println!("✗ {e}\n");
        }
    }

    Ok(())
}
