//! The four-path routing core.
//!
//! Every request probes the repository and is routed by cache state and
//! confidence: cached-and-confident returns instantly, cached-but-weak fills
//! the gaps with one `extract_missing` call and schedules a refinement,
//! cold-with-good-heuristics returns heuristic values while learning happens
//! in the background, and cold-with-bad-heuristics pays for a synchronous
//! `extract_all`. The synchronous response is always produced before any
//! repository write the request may have spawned.

use crate::config::EngineConfig;
use crate::confidence::ConfidenceCalculator;
use crate::data::{
    empty_record, filled_count, FailingFields, FieldRecord, KnowledgeEntry, ParserPack, PathTaken,
    Schema, ValidationPack,
};
use crate::exceptions::ExtractResult;
use crate::executor::ParserExecutor;
use crate::heuristic::HeuristicExtractor;
use crate::inference::FieldExtractor;
use crate::jobs::{retry_with_backoff, JobKind, JobRunner};
use crate::logging::{report_progress, ProgressEvent};
use crate::parser_gen::ParserGenerator;
use crate::repository::ParserRepository;
use crate::validation_gen::ValidationGenerator;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Background-job retry budget for the provider call inside `generate_v1`
const JOB_MAX_RETRIES: usize = 3;
const JOB_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// What the orchestrator hands back for one routed request
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub record: FieldRecord,
    pub path: PathTaken,
    pub cache_hit: bool,
    /// Confidence of the returned record against the live validation pack
    /// (non-null fraction when the label is cold)
    pub confidence: f64,
    /// Synchronous provider invocations, including the in-deadline retry
    pub llm_calls: usize,
    /// True when the provider call was cancelled or failed and the item
    /// degraded to partial data
    pub degraded: bool,
}

/// Routes requests through the decision tree and spawns learning jobs
pub struct Orchestrator {
    config: EngineConfig,
    repository: Arc<ParserRepository>,
    provider: Arc<dyn FieldExtractor>,
    jobs: JobRunner,
    heuristic: HeuristicExtractor,
    executor: ParserExecutor,
    scorer: ConfidenceCalculator,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        repository: Arc<ParserRepository>,
        provider: Arc<dyn FieldExtractor>,
    ) -> Self {
        Self {
            config,
            repository,
            provider,
            jobs: JobRunner::new(),
            heuristic: HeuristicExtractor::new(),
            executor: ParserExecutor::new(),
            scorer: ConfidenceCalculator::new(),
        }
    }

    /// The background job runner, exposed so callers can drain it on shutdown
    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    /// Route one document. `deadline` bounds only the synchronous LLM
    /// dispatch; every other stage is compute-bound.
    pub async fn process_item(
        &self,
        label: &str,
        schema: &Schema,
        text: &str,
        deadline: Duration,
    ) -> ItemOutcome {
        let entry = match self.repository.get(label) {
            Ok(entry) => entry,
            Err(e) => {
                report_progress(ProgressEvent::Error {
                    operation: "repository get".to_string(),
                    error: e.to_string(),
                });
                None
            }
        };

        match entry {
            Some(entry) => self.process_cached(label, schema, text, deadline, entry).await,
            None => self.process_cold(label, schema, text, deadline).await,
        }
    }

    /// Paths 2 and 3: knowledge exists for the label
    async fn process_cached(
        &self,
        label: &str,
        schema: &Schema,
        text: &str,
        deadline: Duration,
        entry: KnowledgeEntry,
    ) -> ItemOutcome {
        let record = self.executor.execute(schema, &entry.parser, text);
        let confidence = self.scorer.score(schema, &record, &entry.validation);

        if confidence.accepted(self.config.accept_threshold) {
            return ItemOutcome {
                record,
                path: PathTaken::CachedHighConfidence,
                cache_hit: true,
                confidence: confidence.score,
                llm_calls: 0,
                degraded: false,
            };
        }

        // Path 3: ask the provider for the failing fields only
        let mut partial = record.clone();
        for field in &confidence.failing {
            partial.insert(field.clone(), None);
        }
        report_progress(ProgressEvent::ModelCall {
            operation: "extract_missing",
            field_count: confidence.failing.len(),
            deadline_s: deadline.as_secs_f64(),
        });
        let (llm_record, degraded, llm_calls) = self
            .dispatch(deadline, || {
                self.provider.extract_missing(schema, text, &partial)
            })
            .await;

        let merged = merge_refinement(&record, &llm_record, &confidence.failing, &entry.validation);
        let merged_confidence = self.scorer.score(schema, &merged, &entry.validation);

        // Refine only when the provider actually contributed; a degraded
        // call would relearn the same knowledge under a new version
        if filled_count(&llm_record) > 0 {
            self.spawn_refine(label, schema, text, merged.clone(), entry.version + 1);
        }

        ItemOutcome {
            record: merged,
            path: PathTaken::CachedRefinement,
            cache_hit: true,
            confidence: merged_confidence.score,
            llm_calls,
            degraded,
        }
    }

    /// Paths 1 and 4: the label is cold
    async fn process_cold(
        &self,
        label: &str,
        schema: &Schema,
        text: &str,
        deadline: Duration,
    ) -> ItemOutcome {
        let heuristic_record = self.heuristic.extract(schema, text);
        let failure_rate = HeuristicExtractor::failure_rate(&heuristic_record);

        if failure_rate < self.config.heuristic_failure_threshold {
            // Path 1: good enough to return; learn in the background
            let confidence = filled_fraction(schema, &heuristic_record);
            self.spawn_generate_v1(label, schema, text, None);
            return ItemOutcome {
                record: heuristic_record,
                path: PathTaken::ColdHeuristic,
                cache_hit: false,
                confidence,
                llm_calls: 0,
                degraded: false,
            };
        }

        // Path 4: synchronous extraction under the watchdog deadline
        report_progress(ProgressEvent::ModelCall {
            operation: "extract_all",
            field_count: schema.len(),
            deadline_s: deadline.as_secs_f64(),
        });
        let (llm_record, degraded, llm_calls) = self
            .dispatch(deadline, || self.provider.extract_all(schema, text))
            .await;

        let merged = merge_cold(schema, &heuristic_record, &llm_record);
        // The provider result seeds learning; after a degraded call the
        // background job re-extracts on its own, free of the batch deadline
        let gabarito = (!degraded && filled_count(&llm_record) > 0).then(|| merged.clone());
        self.spawn_generate_v1(label, schema, text, gabarito);

        let confidence = filled_fraction(schema, &merged);
        ItemOutcome {
            record: merged,
            path: PathTaken::ColdLlm,
            cache_hit: false,
            confidence,
            llm_calls,
            degraded,
        }
    }

    /// Run one provider call under `deadline`, retrying once on a transient
    /// failure if time remains. Cancellation and malformed output both
    /// degrade to an empty record; the caller keeps its partial data.
    async fn dispatch<F, Fut>(&self, deadline: Duration, call: F) -> (FieldRecord, bool, usize)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ExtractResult<FieldRecord>>,
    {
        if deadline.is_zero() {
            report_progress(ProgressEvent::ModelResponse {
                success: false,
                degraded: true,
            });
            return (FieldRecord::new(), true, 0);
        }

        let started = Instant::now();
        let first = tokio::time::timeout(deadline, call()).await;
        match first {
            Ok(Ok(record)) => {
                report_progress(ProgressEvent::ModelResponse {
                    success: true,
                    degraded: false,
                });
                (record, false, 1)
            }
            Ok(Err(e)) if e.is_transient() => {
                let remaining = deadline.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    report_progress(ProgressEvent::ModelResponse {
                        success: false,
                        degraded: true,
                    });
                    return (FieldRecord::new(), true, 1);
                }
                log::warn!("provider call failed transiently, retrying once: {}", e);
                match tokio::time::timeout(remaining, call()).await {
                    Ok(Ok(record)) => {
                        report_progress(ProgressEvent::ModelResponse {
                            success: true,
                            degraded: false,
                        });
                        (record, false, 2)
                    }
                    _ => {
                        report_progress(ProgressEvent::ModelResponse {
                            success: false,
                            degraded: true,
                        });
                        (FieldRecord::new(), true, 2)
                    }
                }
            }
            Ok(Err(e)) => {
                // Malformed output is deadline-equivalent on this path
                report_progress(ProgressEvent::Error {
                    operation: "provider call".to_string(),
                    error: e.to_string(),
                });
                (FieldRecord::new(), true, 1)
            }
            Err(_) => {
                report_progress(ProgressEvent::ModelResponse {
                    success: false,
                    degraded: true,
                });
                (FieldRecord::new(), true, 1)
            }
        }
    }

    /// Learn v1 for a cold label. With a precomputed gabarito the job only
    /// generates and publishes; otherwise it calls `extract_all` itself,
    /// outside any user-facing deadline.
    fn spawn_generate_v1(
        &self,
        label: &str,
        schema: &Schema,
        text: &str,
        gabarito: Option<FieldRecord>,
    ) {
        let repository = Arc::clone(&self.repository);
        let provider = Arc::clone(&self.provider);
        let label_owned = label.to_string();
        let schema = schema.clone();
        let text = text.to_string();

        self.jobs.spawn(label, JobKind::GenerateV1, async move {
            let gabarito = match gabarito {
                Some(g) => g,
                None => {
                    let result = retry_with_backoff(
                        || provider.extract_all(&schema, &text),
                        "generate_v1 extract_all",
                        JOB_MAX_RETRIES,
                        JOB_RETRY_BASE_DELAY,
                    )
                    .await;
                    match result {
                        Ok(record) => record,
                        Err(e) => {
                            log::warn!("generate_v1 for '{}' abandoned: {}", label_owned, e);
                            return None;
                        }
                    }
                }
            };
            if filled_count(&gabarito) == 0 {
                log::warn!("generate_v1 for '{}' abandoned: empty gabarito", label_owned);
                return None;
            }
            publish(&repository, &label_owned, &schema, &text, &gabarito, 1)
        });
    }

    /// Upgrade a label's knowledge from a corrected gabarito
    fn spawn_refine(
        &self,
        label: &str,
        schema: &Schema,
        text: &str,
        corrected: FieldRecord,
        next_version: u32,
    ) {
        let repository = Arc::clone(&self.repository);
        let label_owned = label.to_string();
        let schema = schema.clone();
        let text = text.to_string();

        self.jobs.spawn(label, JobKind::Refine, async move {
            publish(
                &repository,
                &label_owned,
                &schema,
                &text,
                &corrected,
                next_version,
            )
        });
    }
}

/// Generate both packs from a gabarito and publish them. Write failures are
/// dropped silently; the knowledge regenerates on a later request.
fn publish(
    repository: &ParserRepository,
    label: &str,
    schema: &Schema,
    text: &str,
    gabarito: &FieldRecord,
    version: u32,
) -> Option<u32> {
    let parser: ParserPack = ParserGenerator::new().generate(text, gabarito);
    let validation: ValidationPack = ValidationGenerator::new().generate(schema, gabarito);
    let entry = KnowledgeEntry::new(label, version, parser, validation, gabarito);
    match repository.put(&entry) {
        Ok(true) => Some(version),
        Ok(false) => None,
        Err(e) => {
            log::warn!("dropping knowledge write for '{}': {}", label, e);
            None
        }
    }
}

/// Path 3 merge: fields the parser produced and that passed validation are
/// preserved; the provider wins only on the failing fields, and a value
/// that fails its predicate loses to one that passes. When neither passes
/// the field stays null.
fn merge_refinement(
    parser_record: &FieldRecord,
    llm_record: &FieldRecord,
    failing: &FailingFields,
    validation: &ValidationPack,
) -> FieldRecord {
    let mut merged = parser_record.clone();
    for field in failing {
        let llm_value = llm_record.get(field).cloned().flatten();
        let parser_value = parser_record.get(field).cloned().flatten();
        let chosen = [llm_value, parser_value].into_iter().flatten().find(|value| {
            validation
                .rule(field)
                .map(|rule| rule.accepts(value))
                .unwrap_or(true)
        });
        merged.insert(field.clone(), chosen);
    }
    merged
}

/// Path 4 merge: the provider wins wherever it produced a value; heuristic
/// values persist only for fields the provider returned null on.
fn merge_cold(schema: &Schema, heuristic: &FieldRecord, llm: &FieldRecord) -> FieldRecord {
    let mut merged = empty_record(schema);
    for (field, slot) in merged.iter_mut() {
        *slot = llm
            .get(field)
            .cloned()
            .flatten()
            .or_else(|| heuristic.get(field).cloned().flatten());
    }
    merged
}

/// Non-null fraction, the confidence annotation used before a validation
/// pack exists for the label
fn filled_fraction(schema: &Schema, record: &FieldRecord) -> f64 {
    filled_count(record) as f64 / schema.len().max(1) as f64
}
