//! Adaptive Extract CLI
//!
//! Command-line front-end for the adaptive extraction engine: runs dataset
//! batches, inspects learned knowledge, and clears labels.

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("This binary requires the 'cli' feature to be enabled.");
    eprintln!("Install with: cargo install adaptive-extract --features cli");
    std::process::exit(1);
}

#[cfg(feature = "cli")]
mod cli {
    use adaptive_extract::{
        factory, BatchPipeline, CommandTextSource, DocumentRequest, EngineConfig, ItemReport,
        ParserRepository, PlainTextSource, ProviderConfig, ProviderType, TextSource,
    };
    use anyhow::{bail, Context, Result};
    use clap::{Args, Parser, Subcommand};
    use colored::Colorize;
    use indicatif::{ProgressBar, ProgressStyle};
    use serde::Deserialize;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    /// Extract structured fields from PDF batches, learning per-label parsers as it goes
    #[derive(Parser)]
    #[command(name = "ax-rs")]
    #[command(about = "Adaptive hybrid extraction of structured fields from PDF documents")]
    #[command(version, long_about = None)]
    pub struct Cli {
        #[command(subcommand)]
        pub command: Commands,

        /// Enable verbose output
        #[arg(short, long, global = true)]
        pub verbose: bool,
    }

    #[derive(Subcommand)]
    pub enum Commands {
        /// Run a batch described by a dataset file
        Run(RunArgs),
        /// Show the live knowledge version for a label
        Show(LabelArgs),
        /// Forget everything learned about a label
        Clear(LabelArgs),
    }

    #[derive(Args)]
    pub struct RunArgs {
        /// Dataset descriptor (JSON list of {label, schema, pdf_path})
        #[arg(value_name = "DATASET")]
        pub dataset: PathBuf,

        /// Write the full reports as JSON to this path
        #[arg(short, long)]
        pub output: Option<PathBuf>,

        /// Repository root (overrides config/environment)
        #[arg(long)]
        pub repo: Option<PathBuf>,

        /// Model identifier
        #[arg(short, long)]
        pub model: Option<String>,

        /// Provider type
        #[arg(long, value_enum)]
        pub provider: Option<ProviderType>,

        /// Provider base URL
        #[arg(long)]
        pub base_url: Option<String>,

        /// Treat dataset inputs as plain text instead of converting PDFs
        #[arg(long)]
        pub plain_text: bool,
    }

    #[derive(Args)]
    pub struct LabelArgs {
        /// Document class label
        #[arg(value_name = "LABEL")]
        pub label: String,

        /// Repository root (overrides config/environment)
        #[arg(long)]
        pub repo: Option<PathBuf>,
    }

    /// One record of the dataset descriptor file
    #[derive(Deserialize)]
    struct DatasetItem {
        label: String,
        schema: serde_json::Value,
        pdf_path: PathBuf,
    }

    pub async fn run() -> Result<()> {
        let cli = Cli::parse();

        env_logger::Builder::from_env(
            env_logger::Env::default()
                .default_filter_or(if cli.verbose { "debug" } else { "warn" }),
        )
        .init();

        match cli.command {
            Commands::Run(args) => run_batch_command(args).await,
            Commands::Show(args) => show_command(args),
            Commands::Clear(args) => clear_command(args),
        }
    }

    async fn run_batch_command(args: RunArgs) -> Result<()> {
        let mut config = EngineConfig::from_env()?;
        if let Some(repo) = args.repo {
            config.repository_root = repo;
        }
        if let Some(provider_type) = args.provider {
            let model = config.provider.model.clone();
            let api_key = config.provider.api_key.clone();
            config.provider = match provider_type {
                ProviderType::OpenAI => ProviderConfig::openai(&model, api_key),
                ProviderType::Ollama => ProviderConfig::ollama(&model, None),
                ProviderType::Custom => match &args.base_url {
                    Some(url) => ProviderConfig::custom(url, &model),
                    None => bail!("--base-url is required for the custom provider"),
                },
            };
        }
        if let Some(base_url) = &args.base_url {
            config.provider.base_url = base_url.clone();
        }
        if let Some(model) = &args.model {
            config.provider.model = model.clone();
        }

        let items = load_dataset(&args.dataset)?;
        println!(
            "{} {} items from {}",
            "Loaded".green().bold(),
            items.len(),
            args.dataset.display()
        );

        let repository = Arc::new(ParserRepository::open(&config.repository_root)?);
        let provider = factory::create_provider(&config)?;
        let text_source: Box<dyn TextSource> = if args.plain_text {
            Box::new(PlainTextSource)
        } else {
            Box::new(CommandTextSource::pdftotext())
        };
        let pipeline = BatchPipeline::new(config, repository, provider, text_source);

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .expect("static template"),
        );
        spinner.set_message("processing batch...");
        spinner.enable_steady_tick(Duration::from_millis(120));

        let reports = pipeline.run(&items).await;
        spinner.set_message("waiting for background learning...");
        pipeline.orchestrator().jobs().wait_idle().await;
        spinner.finish_and_clear();

        print_reports(&reports);

        if let Some(output) = args.output {
            std::fs::write(&output, serde_json::to_string_pretty(&reports)?)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("{} reports to {}", "Wrote".green().bold(), output.display());
        }
        Ok(())
    }

    fn load_dataset(path: &PathBuf) -> Result<Vec<DocumentRequest>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading dataset {}", path.display()))?;
        let dataset: Vec<DatasetItem> =
            serde_json::from_str(&raw).context("dataset is not a JSON list of items")?;

        let mut items = Vec::with_capacity(dataset.len());
        for (index, item) in dataset.into_iter().enumerate() {
            let pdf_bytes = std::fs::read(&item.pdf_path)
                .with_context(|| format!("reading document {}", item.pdf_path.display()))?;
            items.push(DocumentRequest {
                label: item.label,
                schema: schema_pairs(item.schema)?,
                pdf_bytes,
                item_index: index,
            });
        }
        Ok(items)
    }

    /// Accept both `{"field": "description"}` objects and `[["field",
    /// "description"], ...]` pair lists; the engine validates the rest
    fn schema_pairs(value: serde_json::Value) -> Result<Vec<(String, String)>> {
        match value {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, v.as_str().unwrap_or_default().to_string()))
                .collect()),
            serde_json::Value::Array(entries) => entries
                .into_iter()
                .map(|entry| {
                    let pair = entry
                        .as_array()
                        .filter(|p| p.len() == 2)
                        .context("schema pair is not a two-element array")?;
                    Ok((
                        pair[0].as_str().unwrap_or_default().to_string(),
                        pair[1].as_str().unwrap_or_default().to_string(),
                    ))
                })
                .collect(),
            _ => bail!("schema must be an object or a list of pairs"),
        }
    }

    fn print_reports(reports: &[ItemReport]) {
        let mut total_cost = 0.0;
        for report in reports {
            total_cost += report.estimated_cost;
            match &report.failure {
                Some(message) => {
                    println!(
                        "{} item {} ({}): {}",
                        "FAIL".red().bold(),
                        report.item_index,
                        report.label,
                        message
                    );
                }
                None => {
                    let path = report
                        .path
                        .map(|p| p.number().to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let cache = if report.cache_hit { "hit" } else { "miss" };
                    let filled = report.record.values().filter(|v| v.is_some()).count();
                    println!(
                        "{} item {} ({}): path {}, cache {}, confidence {:.2}, {}/{} fields, {:.2}s, ${:.3}{}",
                        "OK".green().bold(),
                        report.item_index,
                        report.label,
                        path,
                        cache,
                        report.confidence,
                        filled,
                        report.record.len(),
                        report.elapsed_s,
                        report.estimated_cost,
                        if report.degraded {
                            " (degraded)".yellow().to_string()
                        } else {
                            String::new()
                        }
                    );
                }
            }
        }
        println!(
            "{}: {} items, estimated cost ${:.3}",
            "Batch done".bold(),
            reports.len(),
            total_cost
        );
    }

    fn show_command(args: LabelArgs) -> Result<()> {
        let repository = ParserRepository::open(repo_root(args.repo)?)?;
        match repository.get(&args.label)? {
            Some(entry) => {
                println!(
                    "{} '{}' at v{} (created {})",
                    "Knowledge".green().bold(),
                    entry.label,
                    entry.version,
                    entry.created_at
                );
                for (field, pattern) in &entry.parser.patterns {
                    println!("  {}: {}", field.bold(), pattern);
                }
                for (field, rule) in &entry.validation.rules {
                    println!("  {} {:?}", format!("{}?", field).bold(), rule);
                }
            }
            None => println!("No knowledge stored for '{}'", args.label),
        }
        Ok(())
    }

    fn clear_command(args: LabelArgs) -> Result<()> {
        let repository = ParserRepository::open(repo_root(args.repo)?)?;
        repository.clear(&args.label)?;
        println!("{} knowledge for '{}'", "Cleared".green().bold(), args.label);
        Ok(())
    }

    fn repo_root(override_path: Option<PathBuf>) -> Result<PathBuf> {
        match override_path {
            Some(path) => Ok(path),
            None => Ok(EngineConfig::from_env()?.repository_root),
        }
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
