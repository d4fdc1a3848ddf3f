//! Judge-side scoring policy.
//!
//! A judge model is asked for one metric at a time. Replies without a
//! parseable `metric: N` line are retried with a stricter instruction; once the
//! retry budget is spent the neutral default is substituted and the
//! degradation is logged. Scoring never fails the caller.

use crate::error::{ReviewError, Result};
use crate::prompts::{judge_prompt, ChatMessage, JudgeInput};
use crate::retry::RetryPolicy;
use crate::scoring::{parse_score, Metric, DEFAULT_SCORE};
use async_trait::async_trait;
use log::{debug, warn};

#[async_trait]
pub trait JudgeModel: Send + Sync {
    /// Returns the judge's raw reply text.
    async fn judge(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeOutcome {
    pub metric: Metric,
    pub score: u8,
    pub rationale: String,
    pub attempts: usize,
    /// True when `score` is the fallback rather than a parsed reply.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeScores {
    pub helpfulness: JudgeOutcome,
    pub toxicity: JudgeOutcome,
    pub harshness: JudgeOutcome,
}

impl JudgeScores {
    pub fn degraded_metrics(&self) -> Vec<Metric> {
        [&self.helpfulness, &self.toxicity, &self.harshness]
            .into_iter()
            .filter(|o| o.degraded)
            .map(|o| o.metric)
            .collect()
    }
}

pub struct Judge<M> {
    model: M,
    policy: RetryPolicy,
}

impl<M: JudgeModel> Judge<M> {
    pub fn new(model: M, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn score(&self, metric: Metric, input: &JudgeInput) -> JudgeOutcome {
        let model = &self.model;
        let result = self
            .policy
            .run(|attempt| async move {
                let messages = judge_prompt(metric, input, attempt > 1);
                let reply = model.judge(&messages).await?;
                let parsed = parse_score(metric, &reply);
                match parsed.score {
                    Some(score) => Ok((score, parsed.rationale, attempt)),
                    None => Err(ReviewError::Model(format!(
                        "judge reply had no valid {} score",
                        metric
                    ))),
                }
            })
            .await;

        match result {
            Ok((score, rationale, attempts)) => {
                debug!("{} scored {} after {} attempt(s)", metric, score, attempts);
                JudgeOutcome {
                    metric,
                    score,
                    rationale,
                    attempts,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(
                    "Falling back to default {} score {}: {}",
                    metric, DEFAULT_SCORE, e
                );
                JudgeOutcome {
                    metric,
                    score: DEFAULT_SCORE,
                    rationale: String::new(),
                    attempts: self.policy.max_attempts.max(1),
                    degraded: true,
                }
            }
        }
    }

    pub async fn score_all(&self, input: &JudgeInput) -> JudgeScores {
        let (helpfulness, toxicity, harshness) = futures::join!(
            self.score(Metric::Helpfulness, input),
            self.score(Metric::Toxicity, input),
            self.score(Metric::Harshness, input),
        );
        JudgeScores {
            helpfulness,
            toxicity,
            harshness,
        }
    }
}
