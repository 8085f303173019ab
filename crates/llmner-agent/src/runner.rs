//! # Batch Runner
//!
//! Drives annotation over the first `limit` rows of a dataset and attaches
//! the validated predictions as the `pred_ner_tags` column.
//!
//! Rows are processed one at a time by default. With a concurrency above 1
//! a bounded pool of tokio tasks is used instead; results are put back in
//! row order either way. A row whose request fails for good is not fatal:
//! it gets the all-`O` prediction and a `Failed` status.

use std::fmt;
use std::sync::Arc;

use llmner_core::{
    NerDataset, Rejection, TokenSanitizer, build_prompt, get_label_mapping, validate_response,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::annotate::NerAgent;
use crate::error::Result;

/// How one row's prediction was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    /// The model reply was used unchanged.
    Valid,
    /// The reply was rejected and replaced by all `O`.
    Fallback { reason: Rejection },
    /// No usable reply was received; the prediction is all `O`.
    Failed { error: String },
}

impl RowStatus {
    /// Short name used in export columns.
    pub fn label(&self) -> &'static str {
        match self {
            RowStatus::Valid => "valid",
            RowStatus::Fallback { .. } => "fallback",
            RowStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RowStatus::Valid)
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowStatus::Valid => write!(f, "valid"),
            RowStatus::Fallback { reason } => write!(f, "fallback: {reason}"),
            RowStatus::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Row counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub rows: usize,
    pub valid: usize,
    pub fallback: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_statuses(statuses: &[RowStatus]) -> Self {
        statuses.iter().fold(
            Self {
                rows: statuses.len(),
                ..Self::default()
            },
            |mut acc, s| {
                match s {
                    RowStatus::Valid => acc.valid += 1,
                    RowStatus::Fallback { .. } => acc.fallback += 1,
                    RowStatus::Failed { .. } => acc.failed += 1,
                }
                acc
            },
        )
    }
}

/// Result of a batch run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The processed rows, each carrying `pred_ner_tags`.
    pub dataset: NerDataset,
    /// One status per row, in row order.
    pub statuses: Vec<RowStatus>,
    pub summary: RunSummary,
}

struct RowOutcome {
    prediction: Vec<usize>,
    status: RowStatus,
}

/// Runs a [`NerAgent`] over a dataset.
pub struct BatchRunner {
    agent: Arc<NerAgent>,
    concurrency: usize,
    max_concurrency: usize,
    sanitizer: Option<TokenSanitizer>,
}

impl BatchRunner {
    pub fn new(agent: NerAgent) -> Self {
        Self {
            agent: Arc::new(agent),
            concurrency: 1,
            max_concurrency: 8,
            sanitizer: None,
        }
    }

    /// Requested number of in-flight requests. 1 keeps the run sequential.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Hard cap applied to [`BatchRunner::with_concurrency`].
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Normalize tokens before prompting. Rows where normalization would
    /// change the token count are prompted with their raw tokens.
    pub fn with_sanitizer(mut self, sanitizer: TokenSanitizer) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    fn workers(&self) -> usize {
        self.concurrency.clamp(1, self.max_concurrency.max(1))
    }

    /// Annotate the first `min(limit, len)` rows of `dataset`.
    ///
    /// Row `i` of the output is row `i` of the input. Only configuration
    /// problems and worker panics are errors; per-row failures are recorded
    /// in the statuses.
    pub async fn run_dataset(&self, dataset: NerDataset, limit: usize) -> Result<RunOutput> {
        let (label_names, _) = get_label_mapping(&dataset);
        let label_names: Arc<[String]> = label_names.into();

        let n = limit.min(dataset.len());
        let dataset = dataset.select(n);
        let workers = self.workers();
        info!(
            rows = n,
            labels = label_names.len(),
            workers,
            model = self.agent.model_name(),
            "beginning inference"
        );

        let outcomes = if workers <= 1 {
            let mut outcomes = Vec::with_capacity(n);
            for (i, row) in dataset.rows().iter().enumerate() {
                outcomes.push(
                    annotate_row(
                        &self.agent,
                        self.sanitizer.as_ref(),
                        i,
                        &row.tokens,
                        &label_names,
                    )
                    .await,
                );
            }
            outcomes
        } else {
            self.run_pool(&dataset, &label_names, workers).await?
        };

        let (predictions, statuses): (Vec<_>, Vec<_>) = outcomes
            .into_iter()
            .map(|o| (o.prediction, o.status))
            .unzip();
        let dataset = dataset.with_predictions(predictions)?;
        let summary = RunSummary::from_statuses(&statuses);
        info!(
            rows = summary.rows,
            valid = summary.valid,
            fallback = summary.fallback,
            failed = summary.failed,
            "inference complete"
        );

        Ok(RunOutput {
            dataset,
            statuses,
            summary,
        })
    }

    async fn run_pool(
        &self,
        dataset: &NerDataset,
        label_names: &Arc<[String]>,
        workers: usize,
    ) -> Result<Vec<RowOutcome>> {
        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for (i, row) in dataset.rows().iter().enumerate() {
            let agent = Arc::clone(&self.agent);
            let sanitizer = self.sanitizer.clone();
            let label_names = Arc::clone(label_names);
            let tokens = row.tokens.clone();
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let outcome =
                    annotate_row(&agent, sanitizer.as_ref(), i, &tokens, &label_names).await;
                (i, outcome)
            });
        }

        let mut slots: Vec<Option<RowOutcome>> = Vec::new();
        slots.resize_with(dataset.len(), || None);
        while let Some(joined) = tasks.join_next().await {
            let (i, outcome) = joined?;
            slots[i] = Some(outcome);
        }

        Ok(slots
            .into_iter()
            .zip(dataset.rows())
            .map(|(slot, row)| {
                slot.unwrap_or_else(|| RowOutcome {
                    prediction: vec![0; row.tokens.len()],
                    status: RowStatus::Failed {
                        error: "worker produced no result".into(),
                    },
                })
            })
            .collect())
    }
}

async fn annotate_row(
    agent: &NerAgent,
    sanitizer: Option<&TokenSanitizer>,
    index: usize,
    tokens: &[String],
    label_names: &[String],
) -> RowOutcome {
    let n = tokens.len();
    let cleaned;
    let prompt_tokens = match sanitizer {
        Some(s) => {
            cleaned = s.sanitize(tokens);
            if cleaned.len() == n {
                cleaned.as_slice()
            } else {
                debug!(row = index, "sanitizing would drop tokens, using raw tokens");
                tokens
            }
        }
        None => tokens,
    };

    debug!(row = index, tokens = n, "annotating row");
    let prompt = build_prompt(prompt_tokens, label_names);

    match agent.annotate(&prompt).await {
        Ok(text) => {
            let validation = validate_response(&text, n, label_names.len());
            let status = match validation.rejection {
                None => RowStatus::Valid,
                Some(reason) => {
                    warn!(row = index, %reason, "invalid model output, falling back to O");
                    RowStatus::Fallback { reason }
                }
            };
            debug!(row = index, len = validation.prediction.len(), "prediction ready");
            RowOutcome {
                prediction: validation.prediction,
                status,
            }
        }
        Err(e) => {
            warn!(row = index, error = %e, "annotation request failed");
            RowOutcome {
                prediction: vec![0; n],
                status: RowStatus::Failed {
                    error: e.to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::testing::{CapitalizedModel, Reply, ScriptedModel};
    use llmner_core::{LabelSchema, NerRow};
    use std::time::Duration;

    fn dataset(rows: &[(&str, Vec<usize>)]) -> NerDataset {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, (text, tags))| {
                let tokens = text.split(' ').map(String::from).collect();
                NerRow::new(i.to_string(), tokens, tags.clone())
            })
            .collect();
        NerDataset::new(LabelSchema::conll2003(), rows)
    }

    fn runner(model: Arc<dyn crate::provider::ChatModel>) -> BatchRunner {
        BatchRunner::new(NerAgent::new(model, &LabelSchema::conll2003()))
    }

    #[tokio::test]
    async fn test_valid_reply_is_attached() {
        let ds = dataset(&[("John lives in Berlin", vec![1, 0, 5, 6])]);
        let model = Arc::new(ScriptedModel::new(vec![Reply::text("[1,0,5,6]")]));

        let out = runner(model).run_dataset(ds, 10).await.unwrap();
        assert_eq!(out.dataset.len(), 1);
        assert_eq!(
            out.dataset.rows()[0].pred_ner_tags.as_deref(),
            Some(&[1, 0, 5, 6][..])
        );
        assert_eq!(out.statuses, vec![RowStatus::Valid]);
        assert_eq!(out.summary.valid, 1);
    }

    #[tokio::test]
    async fn test_short_reply_falls_back() {
        let ds = dataset(&[("John lives in Berlin", vec![1, 0, 5, 6])]);
        let model = Arc::new(ScriptedModel::new(vec![Reply::text("[1,0,5]")]));

        let out = runner(model).run_dataset(ds, 10).await.unwrap();
        assert_eq!(
            out.dataset.rows()[0].pred_ner_tags.as_deref(),
            Some(&[0, 0, 0, 0][..])
        );
        assert_eq!(out.statuses[0].label(), "fallback");
        assert_eq!(out.summary.fallback, 1);
    }

    #[tokio::test]
    async fn test_blank_reply_falls_back_as_malformed() {
        let ds = dataset(&[("Hello world", vec![0, 0])]);
        let model = Arc::new(ScriptedModel::new(vec![Reply::text("   ")]));

        let out = runner(model).run_dataset(ds, 1).await.unwrap();
        assert!(matches!(
            &out.statuses[0],
            RowStatus::Fallback {
                reason: Rejection::Malformed { .. }
            }
        ));
        assert_eq!(
            out.dataset.rows()[0].pred_ner_tags.as_deref(),
            Some(&[0, 0][..])
        );
        assert_eq!(out.summary.fallback, 1);
        assert_eq!(out.summary.failed, 0);
    }

    #[tokio::test]
    async fn test_limit_truncates_in_order() {
        let ds = dataset(&[
            ("a", vec![0]),
            ("b c", vec![0, 0]),
            ("d e f", vec![0, 0, 0]),
        ]);
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::text("[0]"),
            Reply::text("[0,0]"),
        ]));

        let out = runner(model.clone()).run_dataset(ds, 2).await.unwrap();
        assert_eq!(out.dataset.len(), 2);
        assert_eq!(out.dataset.rows()[1].tokens, vec!["b", "c"]);
        assert_eq!(model.calls(), 2);
        assert!(out.dataset.column(llmner_core::PRED_COLUMN).is_some());
    }

    #[tokio::test]
    async fn test_limit_larger_than_dataset() {
        let ds = dataset(&[("a", vec![0])]);
        let model = Arc::new(ScriptedModel::new(vec![Reply::text("[0]")]));
        let out = runner(model).run_dataset(ds, 100).await.unwrap();
        assert_eq!(out.summary.rows, 1);
    }

    #[tokio::test]
    async fn test_remote_failure_marks_row_and_continues() {
        let ds = dataset(&[("a", vec![0]), ("Bob", vec![1])]);
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::Status(401),
            Reply::text("[1]"),
        ]));
        let agent = NerAgent::new(model, &LabelSchema::conll2003()).with_retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        });

        let out = BatchRunner::new(agent).run_dataset(ds, 10).await.unwrap();
        assert_eq!(out.statuses[0].label(), "failed");
        assert_eq!(out.dataset.rows()[0].pred_ner_tags.as_deref(), Some(&[0][..]));
        assert_eq!(out.statuses[1], RowStatus::Valid);
        assert_eq!(
            out.summary,
            RunSummary {
                rows: 2,
                valid: 1,
                fallback: 0,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_pool_preserves_row_order() {
        let texts: Vec<String> = (0..20)
            .map(|i| {
                (0..=(i % 5))
                    .map(|j| if (i + j) % 2 == 0 { "Name" } else { "word" })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        let rows: Vec<(&str, Vec<usize>)> = texts
            .iter()
            .map(|t| (t.as_str(), vec![0; t.split(' ').count()]))
            .collect();
        let ds = dataset(&rows);

        let out = runner(Arc::new(CapitalizedModel))
            .with_concurrency(4)
            .run_dataset(ds, 20)
            .await
            .unwrap();

        assert_eq!(out.dataset.len(), 20);
        assert_eq!(out.summary.valid, 20);
        for row in out.dataset.rows() {
            let expected: Vec<usize> = row
                .tokens
                .iter()
                .map(|t| usize::from(t == "Name"))
                .collect();
            assert_eq!(row.pred_ner_tags.as_ref(), Some(&expected), "row {}", row.id);
        }
    }

    #[tokio::test]
    async fn test_sanitizer_keeps_alignment() {
        let tokens = vec!["New\u{200b}".to_string(), " ".to_string(), "York".to_string()];
        let ds = NerDataset::new(
            LabelSchema::conll2003(),
            vec![NerRow::new("0", tokens, vec![5, 0, 6])],
        );
        let model = Arc::new(ScriptedModel::new(vec![Reply::text("[5,0,6]")]));
        let out = runner(model.clone())
            .with_sanitizer(TokenSanitizer::new().unwrap())
            .run_dataset(ds, 1)
            .await
            .unwrap();

        // Sanitizing would drop the blank token, so the raw tokens are sent.
        let requests = model.requests.lock().unwrap();
        let prompt = requests[0].messages[1].content.clone().unwrap();
        assert!(prompt.starts_with("Tokens: New\u{200b}   York\n"));
        assert_eq!(out.statuses[0], RowStatus::Valid);
    }

    #[tokio::test]
    async fn test_sanitizer_applied_when_count_unchanged() {
        let tokens = vec!["New\u{200b}".to_string(), " York ".to_string()];
        let ds = NerDataset::new(
            LabelSchema::conll2003(),
            vec![NerRow::new("0", tokens.clone(), vec![5, 6])],
        );
        let model = Arc::new(ScriptedModel::new(vec![Reply::text("[5,6]")]));
        let out = runner(model.clone())
            .with_sanitizer(TokenSanitizer::new().unwrap())
            .run_dataset(ds, 1)
            .await
            .unwrap();

        let requests = model.requests.lock().unwrap();
        let prompt = requests[0].messages[1].content.clone().unwrap();
        assert!(prompt.starts_with("Tokens: New York\n"));
        assert_eq!(out.statuses[0], RowStatus::Valid);
        // The stored row keeps its original tokens.
        assert_eq!(out.dataset.rows()[0].tokens, tokens);
    }

    #[test]
    fn test_workers_capped() {
        let model: Arc<dyn crate::provider::ChatModel> = Arc::new(CapitalizedModel);
        assert_eq!(runner(model.clone()).workers(), 1);
        assert_eq!(runner(model.clone()).with_concurrency(32).workers(), 8);
        assert_eq!(
            runner(model)
                .with_concurrency(32)
                .with_max_concurrency(0)
                .workers(),
            1
        );
    }

    #[test]
    fn test_status_serialization() {
        let s = RowStatus::Fallback {
            reason: Rejection::WrongLength {
                expected: 4,
                actual: 3,
            },
        };
        assert_eq!(s.to_string(), "fallback: expected 4 labels, got 3");
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["status"], "fallback");
        assert_eq!(v["reason"]["kind"], "wrong_length");
    }
}
