//! Run artifacts: predictions as JSON lines, CSV, Parquet and an Excel
//! sheet, the evaluation report as JSON, and an optional webhook
//! notification.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, ListBuilder, StringBuilder, UInt64Builder};
use arrow::record_batch::RecordBatch;
use llmner_core::{EvaluationReport, NerDataset, NerRow, OverallScores};
use parquet::arrow::ArrowWriter;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::runner::{RowStatus, RunOutput, RunSummary};

pub const PREDICTIONS_JSONL: &str = "predictions.jsonl";
pub const PREDICTIONS_CSV: &str = "predictions.csv";
pub const PREDICTIONS_PARQUET: &str = "predictions.parquet";
pub const PREDICTIONS_XLSX: &str = "predictions.xlsx";
pub const REPORT_JSON: &str = "report.json";

const CSV_HEADER: [&str; 5] = ["id", "tokens", "ner_tags", "pred_ner_tags", "pred_status"];

/// Files written by [`export_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub jsonl: PathBuf,
    pub csv: PathBuf,
    pub parquet: PathBuf,
    pub xlsx: PathBuf,
    pub report: PathBuf,
}

#[derive(Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    tokens: &'a [String],
    ner_tags: &'a [usize],
    pred_ner_tags: Option<&'a [usize]>,
    pred_status: &'a str,
}

impl<'a> ExportRow<'a> {
    fn new(row: &'a NerRow, status: Option<&RowStatus>) -> Self {
        Self {
            id: &row.id,
            tokens: &row.tokens,
            ner_tags: &row.ner_tags,
            pred_ner_tags: row.pred_ner_tags.as_deref(),
            pred_status: status.map_or("", RowStatus::label),
        }
    }
}

fn export_rows<'a>(
    dataset: &'a NerDataset,
    statuses: &'a [RowStatus],
) -> impl Iterator<Item = ExportRow<'a>> {
    dataset
        .rows()
        .iter()
        .enumerate()
        .map(move |(i, row)| ExportRow::new(row, statuses.get(i)))
}

/// Write one JSON object per row. The file loads back with
/// [`NerDataset::load_jsonl`].
pub fn write_jsonl(path: &Path, dataset: &NerDataset, statuses: &[RowStatus]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in export_rows(dataset, statuses) {
        serde_json::to_writer(&mut out, &row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// One row as text cells, list cells JSON-encoded.
fn text_cells(row: &ExportRow<'_>) -> Result<[String; 5]> {
    let pred = match row.pred_ner_tags {
        Some(p) => serde_json::to_string(p)?,
        None => String::new(),
    };
    Ok([
        row.id.to_string(),
        serde_json::to_string(row.tokens)?,
        serde_json::to_string(row.ner_tags)?,
        pred,
        row.pred_status.to_string(),
    ])
}

/// Write a CSV with list cells JSON-encoded.
pub fn write_csv(path: &Path, dataset: &NerDataset, statuses: &[RowStatus]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for row in export_rows(dataset, statuses) {
        writer.write_record(text_cells(&row)?)?;
    }
    writer.flush()?;
    Ok(())
}

fn append_ids(builder: &mut ListBuilder<UInt64Builder>, ids: &[usize]) {
    for &id in ids {
        builder.values().append_value(id as u64);
    }
    builder.append(true);
}

/// The export rows as one Arrow batch. Tokens and tag sequences become list
/// columns; rows never annotated have a null `pred_ner_tags`.
fn record_batch(dataset: &NerDataset, statuses: &[RowStatus]) -> Result<RecordBatch> {
    let mut ids = StringBuilder::new();
    let mut tokens = ListBuilder::new(StringBuilder::new());
    let mut ner_tags = ListBuilder::new(UInt64Builder::new());
    let mut pred_ner_tags = ListBuilder::new(UInt64Builder::new());
    let mut pred_status = StringBuilder::new();

    for row in export_rows(dataset, statuses) {
        ids.append_value(row.id);
        for token in row.tokens {
            tokens.values().append_value(token);
        }
        tokens.append(true);
        append_ids(&mut ner_tags, row.ner_tags);
        match row.pred_ner_tags {
            Some(pred) => append_ids(&mut pred_ner_tags, pred),
            None => pred_ner_tags.append_null(),
        }
        pred_status.append_value(row.pred_status);
    }

    let batch = RecordBatch::try_from_iter([
        ("id", Arc::new(ids.finish()) as ArrayRef),
        ("tokens", Arc::new(tokens.finish()) as ArrayRef),
        ("ner_tags", Arc::new(ner_tags.finish()) as ArrayRef),
        ("pred_ner_tags", Arc::new(pred_ner_tags.finish()) as ArrayRef),
        ("pred_status", Arc::new(pred_status.finish()) as ArrayRef),
    ])?;
    Ok(batch)
}

/// Write a Parquet file with the same columns as the CSV.
pub fn write_parquet(path: &Path, dataset: &NerDataset, statuses: &[RowStatus]) -> Result<()> {
    let batch = record_batch(dataset, statuses)?;
    let mut writer = ArrowWriter::try_new(File::create(path)?, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Write a single-sheet workbook laid out like the CSV.
pub fn write_xlsx(path: &Path, dataset: &NerDataset, statuses: &[RowStatus]) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet().set_name("predictions")?;

    for (col, name) in (0u16..).zip(CSV_HEADER) {
        sheet.write_string_with_format(0, col, name, &bold)?;
    }
    for (r, row) in (1u32..).zip(export_rows(dataset, statuses)) {
        for (col, cell) in (0u16..).zip(text_cells(&row)?) {
            sheet.write_string(r, col, &cell)?;
        }
    }
    workbook.save(path)?;
    Ok(())
}

#[derive(Serialize)]
struct RunReport<'a> {
    summary: &'a RunSummary,
    #[serde(flatten)]
    evaluation: &'a EvaluationReport,
}

/// Write the run summary and evaluation report as pretty JSON.
pub fn write_report(path: &Path, summary: &RunSummary, report: &EvaluationReport) -> Result<()> {
    let doc = RunReport {
        summary,
        evaluation: report,
    };
    fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    Ok(())
}

/// Write all artifacts of a run into `output_dir`, creating it if needed.
pub fn export_run(
    output_dir: &Path,
    run: &RunOutput,
    report: &EvaluationReport,
) -> Result<ExportPaths> {
    fs::create_dir_all(output_dir)?;
    let paths = ExportPaths {
        jsonl: output_dir.join(PREDICTIONS_JSONL),
        csv: output_dir.join(PREDICTIONS_CSV),
        parquet: output_dir.join(PREDICTIONS_PARQUET),
        xlsx: output_dir.join(PREDICTIONS_XLSX),
        report: output_dir.join(REPORT_JSON),
    };

    write_jsonl(&paths.jsonl, &run.dataset, &run.statuses)?;
    write_csv(&paths.csv, &run.dataset, &run.statuses)?;
    write_parquet(&paths.parquet, &run.dataset, &run.statuses)?;
    write_xlsx(&paths.xlsx, &run.dataset, &run.statuses)?;
    write_report(&paths.report, &run.summary, report)?;

    info!(dir = %output_dir.display(), rows = run.dataset.len(), "exported predictions");
    Ok(paths)
}

#[derive(Debug, Clone, Serialize)]
struct WebhookPayload<'a> {
    model: &'a str,
    summary: &'a RunSummary,
    overall: &'a OverallScores,
}

/// POST the run summary and overall scores to `url`.
pub async fn post_webhook(
    client: &reqwest::Client,
    url: &str,
    model: &str,
    summary: &RunSummary,
    overall: &OverallScores,
) -> Result<()> {
    let payload = WebhookPayload {
        model,
        summary,
        overall,
    };
    let resp = client.post(url).json(&payload).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AgentError::Status {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(())
}

/// Like [`post_webhook`], but failures are only logged.
pub async fn notify_webhook(
    client: &reqwest::Client,
    url: &str,
    model: &str,
    summary: &RunSummary,
    overall: &OverallScores,
) {
    match post_webhook(client, url, model, summary, overall).await {
        Ok(()) => info!(url, "webhook notified"),
        Err(e) => warn!(url, error = %e, "webhook notification failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmner_core::{EvalOptions, LabelSchema, Rejection, evaluate_ner_predictions};

    fn run_output() -> RunOutput {
        let rows = vec![
            NerRow::new(
                "0",
                vec!["John".into(), "lives".into(), "in".into(), "Berlin".into()],
                vec![1, 0, 5, 6],
            ),
            NerRow::new("1", vec!["I".into(), "\"quote\"".into()], vec![0, 0]),
        ];
        let dataset = NerDataset::new(LabelSchema::conll2003(), rows)
            .with_predictions(vec![vec![1, 0, 5, 6], vec![0, 0]])
            .unwrap();
        let statuses = vec![
            RowStatus::Valid,
            RowStatus::Fallback {
                reason: Rejection::WrongLength {
                    expected: 2,
                    actual: 1,
                },
            },
        ];
        let summary = RunSummary::from_statuses(&statuses);
        RunOutput {
            dataset,
            statuses,
            summary,
        }
    }

    fn report(run: &RunOutput) -> EvaluationReport {
        evaluate_ner_predictions(
            &run.dataset,
            &LabelSchema::conll2003().id2label(),
            &EvalOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_export_run_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested").join("output");
        let run = run_output();
        let paths = export_run(&out_dir, &run, &report(&run)).unwrap();

        assert!(paths.jsonl.exists());
        assert!(paths.csv.exists());
        assert!(paths.parquet.exists());
        assert!(paths.xlsx.exists());
        assert!(paths.report.exists());
    }

    #[test]
    fn test_jsonl_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREDICTIONS_JSONL);
        let run = run_output();
        write_jsonl(&path, &run.dataset, &run.statuses).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["pred_status"], "valid");
        assert_eq!(first["pred_ner_tags"], serde_json::json!([1, 0, 5, 6]));

        let loaded = NerDataset::load_jsonl(&path, LabelSchema::conll2003()).unwrap();
        assert_eq!(loaded, run.dataset);
    }

    #[test]
    fn test_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREDICTIONS_CSV);
        let run = run_output();
        write_csv(&path, &run.dataset, &run.statuses).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER);

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1], r#"["John","lives","in","Berlin"]"#);
        assert_eq!(&records[0][3], "[1,0,5,6]");
        assert_eq!(&records[1][1], r#"["I","\"quote\""]"#);
        assert_eq!(&records[1][4], "fallback");
    }

    #[test]
    fn test_parquet_list_columns() {
        use arrow::array::{Array, ListArray, StringArray, UInt64Array};
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREDICTIONS_PARQUET);
        let run = run_output();
        write_parquet(&path, &run.dataset, &run.statuses).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);

        let names: Vec<_> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, CSV_HEADER);

        let tokens = batch
            .column_by_name("tokens")
            .unwrap()
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        let first = tokens.value(0);
        let first = first.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first.value(3), "Berlin");

        let preds = batch
            .column_by_name("pred_ner_tags")
            .unwrap()
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        let first = preds.value(0);
        let first = first.as_any().downcast_ref::<UInt64Array>().unwrap();
        assert_eq!(first.values().to_vec(), vec![1, 0, 5, 6]);

        let status = batch
            .column_by_name("pred_status")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(status.value(1), "fallback");
    }

    #[test]
    fn test_unannotated_rows_have_null_predictions() {
        use arrow::array::Array;

        let rows = vec![NerRow::new("0", vec!["x".into()], vec![0])];
        let dataset = NerDataset::new(LabelSchema::conll2003(), rows);
        let batch = record_batch(&dataset, &[]).unwrap();

        let preds = batch.column_by_name("pred_ner_tags").unwrap();
        assert!(preds.is_null(0));
    }

    #[test]
    fn test_xlsx_is_a_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREDICTIONS_XLSX);
        let run = run_output();
        write_xlsx(&path, &run.dataset, &run.statuses).unwrap();

        // xlsx files are zip archives.
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_report_contains_summary_and_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REPORT_JSON);
        let run = run_output();
        write_report(&path, &run.summary, &report(&run)).unwrap();

        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["summary"]["rows"], 2);
        assert_eq!(v["summary"]["fallback"], 1);
        assert_eq!(v["overall"]["f1"], 1.0);
        assert!(v["report_text"].as_str().unwrap().contains("micro avg"));
    }

    #[tokio::test]
    async fn test_webhook_failure_is_not_fatal() {
        let run = run_output();
        let client = reqwest::Client::new();
        // Nothing listens on port 9 of the loopback interface.
        notify_webhook(
            &client,
            "http://127.0.0.1:9/hook",
            "m",
            &run.summary,
            &report(&run).overall,
        )
        .await;
    }
}
