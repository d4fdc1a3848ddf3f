//! One paper in, one record per configured arm out.
//!
//! Model failures never abort a run. A failed generation produces a stub
//! record with an audit note, a failed judge falls back to the default score,
//! and a record that does not validate is still returned with `qc_failed:<n>`
//! in its notes so the batch QC pass can surface it.

use crate::error::{ReviewError, Result};
use crate::hashing::paper_id_from_title;
use crate::io::{append_jsonl, load_extracted_content};
use crate::judge::{Judge, JudgeModel};
use crate::prompts::{build_review_prompt, expansion_request, JudgeInput, PromptBundle};
use crate::retry::RetryPolicy;
use crate::schema::{Arm, ExtractedContent, PaperMetadata, RecordDefaults, ReviewRecord};
use crate::text::{
    enforce_window, missing_sections, parse_overall_confidence, word_count, MAX_REVIEW_WORDS,
    MIN_REVIEW_WORDS,
};
use crate::validation::RecordSchema;
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use std::path::Path;

#[async_trait]
pub trait ReviewModel: Send + Sync {
    /// Returns the raw review text for one prompt bundle.
    async fn review(&self, bundle: &PromptBundle) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub min_words: usize,
    pub max_words: usize,
    pub arms: Vec<Arm>,
    pub defaults: RecordDefaults,
    /// Follow-up turns allowed for a draft that comes back under `min_words`.
    pub expansion_turns: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_words: MIN_REVIEW_WORDS,
            max_words: MAX_REVIEW_WORDS,
            arms: Arm::ALL.to_vec(),
            defaults: RecordDefaults::default(),
            expansion_turns: 1,
        }
    }
}

pub struct Orchestrator<R, J> {
    reviewer: R,
    judge: Judge<J>,
    schema: RecordSchema,
    config: OrchestratorConfig,
    review_policy: RetryPolicy,
}

impl<R: ReviewModel, J: JudgeModel> Orchestrator<R, J> {
    pub fn new(reviewer: R, judge: Judge<J>, schema: RecordSchema, config: OrchestratorConfig) -> Self {
        Self {
            reviewer,
            judge,
            schema,
            config,
            review_policy: RetryPolicy::default(),
        }
    }

    pub fn with_review_policy(mut self, policy: RetryPolicy) -> Self {
        self.review_policy = policy;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Reviews `paper` once per configured arm. Arms run concurrently; the
    /// returned records are in arm order and share `paper_id` and `run_id`.
    pub async fn run_paper(
        &self,
        paper: &PaperMetadata,
        content: &ExtractedContent,
        run_id: &str,
    ) -> Result<Vec<ReviewRecord>> {
        if paper.paper_title.trim().is_empty() {
            return Err(ReviewError::InvalidInput("paper_title is empty".to_string()));
        }
        if run_id.trim().is_empty() {
            return Err(ReviewError::InvalidInput("run_id is empty".to_string()));
        }

        let paper_id = paper_id_from_title(&paper.paper_title);
        info!(
            "Reviewing '{}' ({}) with {} arm(s)",
            paper.paper_title,
            paper_id,
            self.config.arms.len()
        );

        let records = join_all(
            self.config
                .arms
                .iter()
                .map(|arm| self.run_arm(*arm, paper, &paper_id, content, run_id)),
        )
        .await;

        Ok(records)
    }

    /// [`Self::run_paper`] followed by an append of every record to `out`.
    pub async fn run_and_append(
        &self,
        paper: &PaperMetadata,
        content: &ExtractedContent,
        run_id: &str,
        out: &Path,
    ) -> Result<Vec<ReviewRecord>> {
        let records = self.run_paper(paper, content, run_id).await?;
        for record in &records {
            append_jsonl(out, record)?;
        }
        Ok(records)
    }

    /// Runs every paper in turn, loading `<paper_id>.json` from `content_dir`
    /// and appending to `out`. A paper that fails is logged and recorded in
    /// the summary; the remaining papers still run.
    pub async fn run_batch(
        &self,
        papers: &[PaperMetadata],
        content_dir: &Path,
        run_id: &str,
        out: &Path,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for paper in papers {
            let paper_id = paper_id_from_title(&paper.paper_title);
            let result = match load_extracted_content(content_dir, &paper_id) {
                Ok(content) => self.run_and_append(paper, &content, run_id, out).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(records) => {
                    info!("{}: appended {} record(s)", paper_id, records.len());
                    summary.papers_ok += 1;
                    summary.records_written += records.len();
                }
                Err(e) => {
                    warn!("{} ('{}') failed: {}", paper_id, paper.paper_title, e);
                    summary.failures.push(PaperFailure {
                        paper_id,
                        paper_title: paper.paper_title.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        summary
    }

    async fn run_arm(
        &self,
        arm: Arm,
        paper: &PaperMetadata,
        paper_id: &str,
        content: &ExtractedContent,
        run_id: &str,
    ) -> ReviewRecord {
        let mut record = ReviewRecord::stub(paper, paper_id, arm, run_id, &self.config.defaults);
        let bundle = build_review_prompt(arm, paper, content);

        let reviewer = &self.reviewer;
        let prompt = &bundle;
        let draft = match self
            .review_policy
            .run(move |_| reviewer.review(prompt))
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("[{}] generation failed for {}: {}", arm, paper_id, e);
                record.append_note("generation_failed");
                return self.finish(record);
            }
        };

        let text = self.expand_if_short(&bundle, draft, &mut record).await;
        if text.is_empty() {
            record.append_note("empty_review");
            return self.finish(record);
        }

        let (min, max) = (self.config.min_words, self.config.max_words);
        let before = word_count(&text);
        let enforced = enforce_window(&text, min, max);
        let after = word_count(&enforced);
        if after < before {
            record.append_note(format!("truncated:{}->{}", before, after));
        }
        if after < min {
            record.append_note(format!("under_length:{}", after));
        }

        let missing = missing_sections(&enforced);
        if !missing.is_empty() {
            record.append_note(format!("missing_sections:{}", missing.join("|")));
        }
        let (overall, confidence) = parse_overall_confidence(&enforced);
        if let Some(overall) = overall {
            record.append_note(format!("overall:{}", overall));
        }
        if let Some(confidence) = confidence {
            record.append_note(format!("confidence:{}", confidence));
        }

        record.set_review(enforced);

        let input = JudgeInput {
            paper_title: paper.paper_title.clone(),
            paper_abstract: if content.abstract_text.is_empty() {
                paper.abstract_text.clone()
            } else {
                content.abstract_text.clone()
            },
            review_text: record.review_text.clone(),
        };
        let scores = self.judge.score_all(&input).await;
        record.set_scores(
            Some(scores.helpfulness.score),
            Some(scores.toxicity.score),
            Some(scores.harshness.score),
        );
        for metric in scores.degraded_metrics() {
            record.append_note(format!("judge_default:{}", metric));
        }

        self.finish(record)
    }

    async fn expand_if_short(
        &self,
        bundle: &PromptBundle,
        mut text: String,
        record: &mut ReviewRecord,
    ) -> String {
        let (min, max) = (self.config.min_words, self.config.max_words);
        for turn in 1..=self.config.expansion_turns {
            let words = word_count(&text);
            if words == 0 || words >= min {
                break;
            }
            debug!("[{}] draft has {} words, expansion turn {}", bundle.arm, words, turn);
            let request = expansion_request(bundle, &text, words, min, max);
            match self.reviewer.review(&request).await {
                Ok(longer) if !longer.trim().is_empty() => {
                    text = longer.trim().to_string();
                    record.append_note(format!("expanded:{}->{}", words, word_count(&text)));
                }
                Ok(_) => break,
                Err(e) => {
                    warn!("[{}] expansion turn {} failed: {}", bundle.arm, turn, e);
                    record.append_note("expansion_failed");
                    break;
                }
            }
        }
        text
    }

    fn finish(&self, mut record: ReviewRecord) -> ReviewRecord {
        let errors = record.validate(&self.schema);
        if !errors.is_empty() {
            warn!(
                "[{}] record for {} failed {} check(s): {}",
                record.arm,
                record.paper_id,
                errors.len(),
                errors.join("; ")
            );
            record.append_note(format!("qc_failed:{}", errors.len()));
        }
        record
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperFailure {
    pub paper_id: String,
    pub paper_title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub papers_ok: usize,
    pub records_written: usize,
    pub failures: Vec<PaperFailure>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Metadata-only records, one per arm, with empty review and null scores.
pub fn stub_records(
    paper: &PaperMetadata,
    run_id: &str,
    arms: &[Arm],
    defaults: &RecordDefaults,
) -> Vec<ReviewRecord> {
    let paper_id = paper_id_from_title(&paper.paper_title);
    arms.iter()
        .map(|arm| ReviewRecord::stub(paper, &paper_id, *arm, run_id, defaults))
        .collect()
}
