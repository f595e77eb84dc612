//! # Adaptive Extract
//!
//! An adaptive hybrid engine for extracting structured field values from PDF
//! documents. Each request names a document class (`label`) and a `schema`
//! of fields to extract; the engine routes it through the cheapest path the
//! current state allows and learns a reusable pattern-based parser for the
//! label in the background, so repeated documents of the same class become
//! nearly free.
//!
//! ## How a request is served
//!
//! - **Cached, high confidence** - the stored parser pack handles the whole
//!   document; no provider call.
//! - **Cached, low confidence** - one `extract_missing` call fills the gaps
//!   and a refinement job upgrades the stored knowledge.
//! - **Cold, heuristics sufficient** - regex heuristics answer immediately
//!   while a background job learns version 1.
//! - **Cold, heuristics insufficient** - one synchronous `extract_all` call
//!   under the batch watchdog deadline.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use adaptive_extract::{run_batch, DocumentRequest, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let items = vec![DocumentRequest {
//!         label: "procuracao".to_string(),
//!         schema: vec![
//!             ("nome".to_string(), "Nome completo do outorgante".to_string()),
//!             ("cpf".to_string(), "CPF do outorgante".to_string()),
//!         ],
//!         pdf_bytes: std::fs::read("procuracao.pdf")?,
//!         item_index: 0,
//!     }];
//!
//!     let reports = run_batch(&items, EngineConfig::from_env()?).await?;
//!     for report in &reports {
//!         println!("item {}: path {:?}, confidence {:.2}",
//!             report.item_index, report.path, report.confidence);
//!     }
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod data;
pub mod exceptions;

// Extraction stages
pub mod confidence;
pub mod executor;
pub mod heuristic;
pub mod parser_gen;
pub mod validation_gen;

// Provider modules
pub mod factory;
pub mod inference;
pub mod prompting;
pub mod providers;

// Runtime modules
pub mod jobs;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod repository;
pub mod textsource;
pub mod watchdog;

// Re-export key types for convenience
pub use config::EngineConfig;
pub use data::{
    DocumentRequest, FieldRecord, ItemReport, KnowledgeEntry, ParserPack, PathTaken,
    PredicateSpec, Schema, ValidationPack,
};
pub use exceptions::{ExtractError, ExtractResult};
pub use inference::FieldExtractor;
pub use orchestrator::Orchestrator;
pub use pipeline::BatchPipeline;
pub use providers::{ProviderConfig, ProviderType, UniversalProvider};
pub use repository::ParserRepository;
pub use textsource::{CommandTextSource, PlainTextSource, TextSource};

use std::sync::Arc;

/// Run a batch end to end with the configured provider and a `pdftotext`
/// text source, waiting for background learning jobs before returning.
///
/// Library embedders that need a custom text source or want jobs to outlive
/// the batch should assemble a [`BatchPipeline`] directly.
pub async fn run_batch(
    items: &[DocumentRequest],
    config: EngineConfig,
) -> ExtractResult<Vec<ItemReport>> {
    let repository = Arc::new(ParserRepository::open(&config.repository_root)?);
    let provider = factory::create_provider(&config)?;
    let pipeline = BatchPipeline::new(
        config,
        repository,
        provider,
        Box::new(CommandTextSource::pdftotext()),
    );
    let reports = pipeline.run(items).await;
    pipeline.orchestrator().jobs().wait_idle().await;
    Ok(reports)
}
