//! Batch driver: runs the orchestrator over a dataset under one watchdog.
//!
//! Items are processed sequentially; only schema validation and text
//! conversion failures surface per item, and they never abort the batch.
//! Background learning jobs overlap with subsequent items but the batch loop
//! never waits on them.

use crate::config::EngineConfig;
use crate::data::{DocumentRequest, ItemReport, Schema};
use crate::inference::FieldExtractor;
use crate::logging::{report_progress, ProgressEvent};
use crate::orchestrator::Orchestrator;
use crate::repository::ParserRepository;
use crate::textsource::TextSource;
use crate::watchdog::BudgetWatchdog;
use std::sync::Arc;
use std::time::Instant;

/// Sequential batch executor around one orchestrator instance
pub struct BatchPipeline {
    config: EngineConfig,
    orchestrator: Orchestrator,
    text_source: Box<dyn TextSource>,
}

impl BatchPipeline {
    pub fn new(
        config: EngineConfig,
        repository: Arc<ParserRepository>,
        provider: Arc<dyn FieldExtractor>,
        text_source: Box<dyn TextSource>,
    ) -> Self {
        let orchestrator = Orchestrator::new(config.clone(), repository, provider);
        Self {
            config,
            orchestrator,
            text_source,
        }
    }

    /// The underlying orchestrator, exposed so callers can drain background
    /// jobs before shutdown
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Process every item in order, returning one annotated report per item.
    ///
    /// No error escapes to the caller: fatal per-item conditions become
    /// failure reports and the batch continues.
    pub async fn run(&self, items: &[DocumentRequest]) -> Vec<ItemReport> {
        let mut watchdog = BudgetWatchdog::new(
            items.len(),
            self.config.per_item_budget_s,
            self.config.slack,
        );
        let mut reports = Vec::with_capacity(items.len());

        for item in items {
            let started = Instant::now();
            report_progress(ProgressEvent::ItemStarted {
                item_index: item.item_index,
                label: item.label.clone(),
            });

            let schema = match Schema::new(item.schema.clone()) {
                Ok(schema) => schema,
                Err(e) => {
                    reports.push(self.fail_item(item, &mut watchdog, started, e.to_string()));
                    continue;
                }
            };
            let text = match self.text_source.pdf_to_text(&item.pdf_bytes) {
                Ok(text) => text,
                Err(e) => {
                    reports.push(self.fail_item(item, &mut watchdog, started, e.to_string()));
                    continue;
                }
            };

            let deadline = watchdog.begin_item();
            let outcome = self
                .orchestrator
                .process_item(&item.label, &schema, &text, deadline)
                .await;
            let elapsed = started.elapsed();
            watchdog.end_item(elapsed);

            report_progress(ProgressEvent::PathTaken {
                item_index: item.item_index,
                path: outcome.path,
                cache_hit: outcome.cache_hit,
                confidence: outcome.confidence,
            });
            reports.push(ItemReport {
                item_index: item.item_index,
                label: item.label.clone(),
                record: outcome.record,
                path: Some(outcome.path),
                elapsed_s: elapsed.as_secs_f64(),
                cache_hit: outcome.cache_hit,
                confidence: outcome.confidence,
                estimated_cost: outcome.llm_calls as f64 * self.config.cost_per_call,
                degraded: outcome.degraded,
                failure: None,
            });
        }

        reports
    }

    fn fail_item(
        &self,
        item: &DocumentRequest,
        watchdog: &mut BudgetWatchdog,
        started: Instant,
        message: String,
    ) -> ItemReport {
        let elapsed = started.elapsed();
        watchdog.end_item(elapsed);
        report_progress(ProgressEvent::Error {
            operation: format!("item {}", item.item_index),
            error: message.clone(),
        });
        ItemReport::failed(
            item.item_index,
            item.label.clone(),
            elapsed.as_secs_f64(),
            message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PathTaken;
    use crate::inference::testing::MockProvider;
    use crate::textsource::PlainTextSource;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    const TEXT: &str = "\
PROCURACAO\n\
Nome: Ana Clara Souza\n\
CPF: 123.456.789-09\n\
Cargo: ADVOGADA\n\
Data de emissao: 15/03/2024";

    fn schema_pairs() -> Vec<(String, String)> {
        vec![
            ("nome".to_string(), "Nome completo do outorgante".to_string()),
            ("cpf".to_string(), "CPF do outorgante".to_string()),
            (
                "cargo".to_string(),
                "Cargo (ADVOGADO, ADVOGADA, ESTAGIARIO)".to_string(),
            ),
            ("data_emissao".to_string(), "Data de emissao".to_string()),
        ]
    }

    fn truth() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("nome".to_string(), "Ana Clara Souza".to_string()),
            ("cpf".to_string(), "123.456.789-09".to_string()),
            ("cargo".to_string(), "ADVOGADA".to_string()),
            ("data_emissao".to_string(), "15/03/2024".to_string()),
        ])
    }

    fn request(index: usize) -> DocumentRequest {
        DocumentRequest {
            label: "procuracao".to_string(),
            schema: schema_pairs(),
            pdf_bytes: TEXT.as_bytes().to_vec(),
            item_index: index,
        }
    }

    fn pipeline_with(provider: Arc<MockProvider>, dir: &TempDir) -> BatchPipeline {
        let mut config = EngineConfig::default();
        config.repository_root = dir.path().to_path_buf();
        let repository = Arc::new(ParserRepository::open(dir.path()).unwrap());
        BatchPipeline::new(config, repository, provider, Box::new(PlainTextSource))
    }

    #[tokio::test]
    async fn test_cold_warm_up_reaches_the_fast_path() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::returning(truth()));
        let pipeline = pipeline_with(Arc::clone(&provider), &dir);

        let first = pipeline.run(&[request(0)]).await;
        assert_eq!(first[0].path, Some(PathTaken::ColdHeuristic));
        assert_eq!(first[0].estimated_cost, 0.0);
        // Let learning land, as it would while later items run
        pipeline.orchestrator().jobs().wait_idle().await;

        let rest = pipeline.run(&[request(1), request(2)]).await;
        for report in &rest {
            assert_eq!(report.path, Some(PathTaken::CachedHighConfidence));
            assert!(report.cache_hit);
            assert_eq!(report.estimated_cost, 0.0);
            assert!(report.confidence >= 0.80);
            assert_eq!(
                report.record["cpf"],
                Some("123.456.789-09".to_string())
            );
        }
        // Exactly one learning call for the whole sequence
        assert_eq!(provider.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_schema_fails_item_but_not_batch() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::returning(truth()));
        let pipeline = pipeline_with(provider, &dir);

        let mut bad = request(0);
        bad.schema.push(("cpf".to_string(), "duplicated".to_string()));
        let reports = pipeline.run(&[bad, request(1)]).await;

        assert!(!reports[0].is_ok());
        assert!(reports[0].failure.as_deref().unwrap().contains("cpf"));
        assert!(reports[0].path.is_none());

        assert!(reports[1].is_ok());
        assert_eq!(reports[1].path, Some(PathTaken::ColdHeuristic));
    }

    #[tokio::test]
    async fn test_unreadable_document_fails_item_but_not_batch() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::returning(truth()));
        let pipeline = pipeline_with(provider, &dir);

        let mut broken = request(0);
        broken.pdf_bytes = vec![0xff, 0xfe, 0x00, 0x01];
        let reports = pipeline.run(&[broken, request(1)]).await;

        assert!(!reports[0].is_ok());
        assert!(reports[1].is_ok());
    }

    #[tokio::test]
    async fn test_budget_exhaustion_degrades_late_items() {
        let dir = TempDir::new().unwrap();
        // Opaque field names force the synchronous path; the provider is
        // slower than the whole batch budget
        let provider = Arc::new(
            MockProvider::returning(BTreeMap::new())
                .with_delay(Duration::from_millis(300)),
        );
        let mut config = EngineConfig::default();
        config.repository_root = dir.path().to_path_buf();
        config.per_item_budget_s = 0.05;
        let repository = Arc::new(ParserRepository::open(dir.path()).unwrap());
        let pipeline = BatchPipeline::new(
            config,
            repository,
            Arc::clone(&provider) as Arc<dyn FieldExtractor>,
            Box::new(PlainTextSource),
        );

        let items: Vec<DocumentRequest> = (0..2)
            .map(|i| DocumentRequest {
                label: "opaco".to_string(),
                schema: vec![
                    ("campo_um".to_string(), "primeiro campo".to_string()),
                    ("campo_dois".to_string(), "segundo campo".to_string()),
                ],
                pdf_bytes: b"conteudo opaco sem tokens reconheciveis".to_vec(),
                item_index: i,
            })
            .collect();

        let reports = pipeline.run(&items).await;
        // First item burns the amortized budget; the second gets a zero (or
        // near-zero) deadline and degrades without waiting on the provider
        assert_eq!(reports[0].path, Some(PathTaken::ColdLlm));
        assert!(reports[0].degraded);
        assert!(reports[1].degraded);
        assert!(reports[1].confidence < 0.80);
        assert!(reports[1].elapsed_s < 0.25);
    }

    #[tokio::test]
    async fn test_reports_keep_batch_order_and_indices() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::returning(truth()));
        let pipeline = pipeline_with(provider, &dir);

        let reports = pipeline.run(&[request(0), request(1), request(2)]).await;
        let indices: Vec<usize> = reports.iter().map(|r| r.item_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
