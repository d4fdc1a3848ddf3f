//! Batch quality control over a JSONL output log, plus the per-arm score
//! means used for the summary chart.

use crate::error::Result;
use crate::scoring::is_valid_score;
use crate::validation::{validate_record, RecordSchema};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFailure {
    /// 1-based line number in the source file.
    pub line: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QcReport {
    /// Non-blank lines examined.
    pub total: usize,
    pub failures: Vec<LineFailure>,
}

impl QcReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for QcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in &self.failures {
            writeln!(f, "Line {}:", failure.line)?;
            for error in &failure.errors {
                writeln!(f, "  - {}", error)?;
            }
        }
        if self.passed() {
            write!(f, "All {} lines passed.", self.total)
        } else {
            write!(f, "{}/{} lines failed.", self.failures.len(), self.total)
        }
    }
}

/// Validates every non-blank line of `path`. A line that is not UTF-8 or not
/// JSON is a failure on that line; it never stops the pass.
pub fn validate_jsonl(path: &Path, schema: &RecordSchema) -> Result<QcReport> {
    let reader = BufReader::new(File::open(path)?);
    let mut report = QcReport::default();

    for (idx, raw) in reader.split(b'\n').enumerate() {
        let mut raw = raw?;
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        report.total += 1;

        let errors = match String::from_utf8(raw) {
            Ok(line) => match serde_json::from_str::<Value>(&line) {
                Ok(record) => validate_record(&record, schema),
                Err(e) => vec![format!("invalid JSON: {}", e)],
            },
            Err(e) => vec![format!("invalid UTF-8: {}", e.utf8_error())],
        };
        if !errors.is_empty() {
            report.failures.push(LineFailure {
                line: idx + 1,
                errors,
            });
        }
    }

    if report.passed() {
        info!("QC passed: {} line(s) in {}", report.total, path.display());
    } else {
        warn!(
            "QC failed: {}/{} line(s) in {}",
            report.failures.len(),
            report.total,
            path.display()
        );
    }
    Ok(report)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArmMeans {
    pub arm: String,
    pub mean_helpfulness: f64,
    pub mean_toxicity: f64,
    pub mean_harshness: f64,
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    n: usize,
}

impl Accumulator {
    fn add(&mut self, value: Option<i64>) {
        if let Some(v) = value {
            self.sum += v as f64;
            self.n += 1;
        }
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }
}

/// Mean of each integer score per arm, arms in first-seen order. Null,
/// non-integer and out-of-range scores are left out of the mean; an arm with
/// none reports 0.
pub fn arm_means(records: &[Value]) -> Vec<ArmMeans> {
    let mut groups: Vec<(String, [Accumulator; 3])> = Vec::new();

    for record in records {
        let Some(arm) = record.get("arm").and_then(Value::as_str) else {
            continue;
        };
        let idx = match groups.iter().position(|(name, _)| name == arm) {
            Some(idx) => idx,
            None => {
                groups.push((arm.to_string(), Default::default()));
                groups.len() - 1
            }
        };
        let acc = &mut groups[idx].1;
        for (slot, key) in ["helpfulness_1to7", "toxicity_1to7", "harshness_1to7"]
            .iter()
            .enumerate()
        {
            let score = record
                .get(*key)
                .and_then(Value::as_i64)
                .filter(|v| is_valid_score(*v));
            acc[slot].add(score);
        }
    }

    groups
        .into_iter()
        .map(|(arm, acc)| ArmMeans {
            arm,
            mean_helpfulness: acc[0].mean(),
            mean_toxicity: acc[1].mean(),
            mean_harshness: acc[2].mean(),
        })
        .collect()
}

/// One CSV row; means are pre-formatted to three decimals.
#[derive(Serialize)]
struct MeansRow<'a> {
    arm: &'a str,
    mean_helpfulness: String,
    mean_toxicity: String,
    mean_harshness: String,
}

impl<'a> From<&'a ArmMeans> for MeansRow<'a> {
    fn from(means: &'a ArmMeans) -> Self {
        Self {
            arm: &means.arm,
            mean_helpfulness: format!("{:.3}", means.mean_helpfulness),
            mean_toxicity: format!("{:.3}", means.mean_toxicity),
            mean_harshness: format!("{:.3}", means.mean_harshness),
        }
    }
}

/// Writes `arm,mean_helpfulness,mean_toxicity,mean_harshness` plus one row
/// per arm. The header is written even when `means` is empty.
pub fn write_arm_means(path: &Path, means: &[ArmMeans]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(["arm", "mean_helpfulness", "mean_toxicity", "mean_harshness"])?;
    for row in means {
        writer.serialize(MeansRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_report_display() {
        let report = QcReport {
            total: 3,
            failures: vec![LineFailure {
                line: 2,
                errors: vec!["invalid JSON: eof".to_string()],
            }],
        };
        assert_eq!(
            report.to_string(),
            "Line 2:\n  - invalid JSON: eof\n1/3 lines failed."
        );
        assert_eq!(QcReport { total: 4, failures: vec![] }.to_string(), "All 4 lines passed.");
    }

    #[test]
    fn test_bad_json_does_not_abort() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        fs::write(&path, "not json\n\n[1]\n").unwrap();
        let report = validate_jsonl(&path, &RecordSchema::full20().unwrap()).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].line, 1);
        assert!(report.failures[0].errors[0].starts_with("invalid JSON"));
        assert_eq!(report.failures[1].line, 3);
    }

    #[test]
    fn test_non_utf8_line_is_reported_in_place() {
        let schema = RecordSchema::full20().unwrap();
        let good = crate::schema::ReviewRecord::stub(
            &crate::schema::PaperMetadata::new("Foo", "", "manual"),
            "ml_08d6cad8",
            crate::schema::Arm::Praise,
            "r1",
            &crate::schema::RecordDefaults::default(),
        );
        let good = serde_json::to_string(&good).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.jsonl");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(good.as_bytes());
        bytes.extend_from_slice(b"\n{\"paper_id\": \"\xff\xfe\"}\r\n");
        bytes.extend_from_slice(good.as_bytes());
        bytes.push(b'\n');
        fs::write(&path, bytes).unwrap();

        let report = validate_jsonl(&path, &schema).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].line, 2);
        assert!(report.failures[0].errors[0].starts_with("invalid UTF-8"));
        assert!(report.to_string().ends_with("1/3 lines failed."));
    }

    #[test]
    fn test_arm_means_skips_out_of_range_scores() {
        let records = vec![
            json!({"arm": "harsh", "helpfulness_1to7": 9, "toxicity_1to7": 0, "harshness_1to7": 7}),
            json!({"arm": "harsh", "helpfulness_1to7": 3, "toxicity_1to7": 2, "harshness_1to7": 5}),
        ];
        let means = arm_means(&records);
        assert_eq!(means[0].mean_helpfulness, 3.0);
        assert_eq!(means[0].mean_toxicity, 2.0);
        assert_eq!(means[0].mean_harshness, 6.0);
    }

    #[test]
    fn test_arm_means() {
        let records = vec![
            json!({"arm": "harsh", "helpfulness_1to7": 4, "toxicity_1to7": 2, "harshness_1to7": 6}),
            json!({"arm": "praise", "helpfulness_1to7": 6, "toxicity_1to7": 1, "harshness_1to7": 1}),
            json!({"arm": "harsh", "helpfulness_1to7": 5, "toxicity_1to7": null, "harshness_1to7": 7}),
            json!({"arm": "neutral", "helpfulness_1to7": "5"}),
            json!({"helpfulness_1to7": 7}),
        ];
        let means = arm_means(&records);
        let arms: Vec<_> = means.iter().map(|m| m.arm.as_str()).collect();
        assert_eq!(arms, vec!["harsh", "praise", "neutral"]);
        assert_eq!(means[0].mean_helpfulness, 4.5);
        assert_eq!(means[0].mean_toxicity, 2.0);
        assert_eq!(means[0].mean_harshness, 6.5);
        assert_eq!(means[2].mean_helpfulness, 0.0);
    }

    #[test]
    fn test_write_arm_means() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("means.csv");
        let means = vec![ArmMeans {
            arm: "neutral".to_string(),
            mean_helpfulness: 14.0 / 3.0,
            mean_toxicity: 1.0,
            mean_harshness: 0.0,
        }];
        write_arm_means(&path, &means).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "arm,mean_helpfulness,mean_toxicity,mean_harshness\nneutral,4.667,1.000,0.000\n"
        );
    }
}
