//! # reviewer2
//!
//! Post-processing and validation core for persona-driven automated paper
//! reviews.
//!
//! A reviewer model writes a review of a paper under one of three personas
//! (`praise`, `neutral`, `harsh`). This crate turns that raw text into a
//! validated FULL-20 record:
//!
//! - **Word window**: reviews are cut back to 600-800 words at sentence boundaries
//! - **Structure**: the six ICLR/OpenReview section markers must be present
//! - **Scores**: a judge model rates helpfulness, toxicity and harshness on 1-7;
//!   unparseable replies are retried and then default to 4
//! - **Records**: every output line is checked against a fixed JSON Schema plus
//!   the cross-field rules (toxicity flag, word count)
//!
//! ## Example
//!
//! ```rust,ignore
//! use reviewer2::*;
//!
//! let paper = PaperMetadata::new("Gaussian Widgets", "https://example.org/p.pdf", "your-library");
//! let schema = RecordSchema::full20()?;
//!
//! let orchestrator = Orchestrator::new(
//!     my_reviewer,
//!     Judge::new(my_judge, RetryPolicy::default()),
//!     schema,
//!     OrchestratorConfig::default(),
//! );
//! let records = orchestrator
//!     .run_and_append(&paper, &content, "pilot001", Path::new("out/reviews.jsonl"))
//!     .await?;
//! ```
//!
//! Model access sits behind the [`ReviewModel`] and [`JudgeModel`] traits. The
//! `llm` feature provides an OpenRouter-compatible implementation of both.

pub mod error;
pub mod hashing;
pub mod io;
pub mod judge;
pub mod orchestrator;
pub mod prompts;
pub mod qc;
pub mod retry;
pub mod schema;
pub mod scoring;
pub mod text;
pub mod validation;

#[cfg(feature = "llm")]
pub mod llm;

pub use error::{ReviewError, Result};
pub use hashing::paper_id_from_title;
pub use judge::{Judge, JudgeModel, JudgeOutcome, JudgeScores};
pub use orchestrator::{
    stub_records, BatchSummary, Orchestrator, OrchestratorConfig, PaperFailure, ReviewModel,
};
pub use prompts::{
    build_review_prompt, build_review_prompt_for, judge_prompt, package_figures, persona_line,
    ChatMessage, FigureAttachment, JudgeInput, MessageRole, PromptBundle,
};
pub use qc::{arm_means, validate_jsonl, ArmMeans, QcReport};
pub use retry::RetryPolicy;
pub use schema::*;
pub use scoring::{
    parse_harshness, parse_helpfulness, parse_score, parse_toxicity, toxicity_flag, Metric,
    ParsedScore,
};
pub use text::{
    enforce_window, normalize_whitespace, validate_structure, word_count, MAX_REVIEW_WORDS,
    MIN_REVIEW_WORDS, REQUIRED_SECTIONS,
};
pub use validation::{check_business_rules, validate_record, RecordSchema};
