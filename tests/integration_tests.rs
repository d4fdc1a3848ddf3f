use async_trait::async_trait;
use reviewer2::io::{append_jsonl, read_records, read_values};
use reviewer2::qc::write_arm_means;
use reviewer2::*;
use serde_json::json;
use std::fs;
use std::io::Write;
use tempfile::tempdir;

fn gaussian_widgets() -> PaperMetadata {
    PaperMetadata::new(
        "Gaussian Widgets",
        "https://example.org/gaussian-widgets.pdf",
        "your-library",
    )
}

/// Builds a review with all six markers and roughly `sentences * 8` words.
fn persona_review(arm: Arm, sentences: usize) -> String {
    let mut text = format!(
        "Summary: a {} reading of the widget paper. Strengths: clear setup. Weaknesses: thin baselines. \
         Questions: why this kernel? Overall [6] Confidence [4].",
        arm
    );
    for i in 0..sentences {
        text.push_str(&format!(" Point {} concerns the ablation and its reported variance.", i));
    }
    text
}

struct PersonaReviewer;

#[async_trait]
impl ReviewModel for PersonaReviewer {
    async fn review(&self, bundle: &PromptBundle) -> Result<String> {
        Ok(persona_review(bundle.arm, 85))
    }
}

/// Scores harsher personas as harsher and slightly more toxic.
struct ToneJudge;

#[async_trait]
impl JudgeModel for ToneJudge {
    async fn judge(&self, messages: &[ChatMessage]) -> Result<String> {
        let system = &messages[0].content;
        let review = &messages[1].content;
        let harsh = review.contains("a harsh reading");
        let reply = if system.contains("`helpfulness: N`") {
            "Helpfulness: 5\nConcrete and actionable."
        } else if system.contains("`toxicity: N`") {
            if harsh { "toxicity: 3" } else { "toxicity: 1" }
        } else if harsh {
            "harshness: 6"
        } else {
            "harshness: 2"
        };
        Ok(reply.to_string())
    }
}

#[test]
fn test_paper_id_is_stable() {
    assert_eq!(paper_id_from_title("Gaussian Widgets"), "ml_fb515620");
    assert_eq!(paper_id_from_title("GAUSSIAN WIDGETS"), "ml_fb515620");
    assert_eq!(paper_id_from_title("Attention Is All You Need"), "ml_68809685");
}

#[tokio::test]
async fn test_full_pipeline_writes_valid_log() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out/reviews.jsonl");

    let orchestrator = Orchestrator::new(
        PersonaReviewer,
        Judge::new(ToneJudge, RetryPolicy::immediate(3)),
        RecordSchema::full20().unwrap(),
        OrchestratorConfig::default(),
    )
    .with_review_policy(RetryPolicy::immediate(1));

    let records = orchestrator
        .run_and_append(
            &gaussian_widgets(),
            &ExtractedContent::default(),
            "pilot001",
            &out,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    let arms: Vec<Arm> = records.iter().map(|r| r.arm).collect();
    assert_eq!(arms, vec![Arm::Praise, Arm::Neutral, Arm::Harsh]);
    assert!(records.iter().all(|r| r.paper_id == "ml_fb515620"));
    assert!(records.iter().all(|r| r.run_id == "pilot001"));
    assert!(records.iter().all(|r| validate_structure(&r.review_text)));

    let report = validate_jsonl(&out, &RecordSchema::full20().unwrap()).unwrap();
    assert!(report.passed(), "{}", report);
    assert_eq!(report.total, 3);

    let stored = read_records(&out).unwrap();
    assert_eq!(stored, records);

    let means = arm_means(&read_values(&out).unwrap());
    let harsh = means.iter().find(|m| m.arm == "harsh").unwrap();
    let praise = means.iter().find(|m| m.arm == "praise").unwrap();
    assert!(harsh.mean_harshness > praise.mean_harshness);
    assert_eq!(harsh.mean_helpfulness, 5.0);
}

#[test]
fn test_stub_log_passes_qc() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("stubs.jsonl");
    let papers = vec![
        gaussian_widgets(),
        PaperMetadata::new("Foo", "https://example.org/foo.pdf", "manual"),
    ];

    for paper in &papers {
        for record in stub_records(paper, "pilot001", &Arm::ALL, &RecordDefaults::default()) {
            append_jsonl(&out, &record).unwrap();
        }
    }

    let report = validate_jsonl(&out, &RecordSchema::full20().unwrap()).unwrap();
    assert_eq!(report.to_string(), "All 6 lines passed.");

    let records = read_records(&out).unwrap();
    assert_eq!(records[3].paper_id, "ml_08d6cad8");
    assert!(records.iter().all(|r| r.helpfulness_1to7.is_none() && !r.toxicity_flag_tau5));
}

#[test]
fn test_qc_reports_each_bad_line() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("mixed.jsonl");

    let good = ReviewRecord::stub(
        &gaussian_widgets(),
        "ml_fb515620",
        Arm::Neutral,
        "pilot001",
        &RecordDefaults::default(),
    );
    let mut bad_flag = good.to_value().unwrap();
    bad_flag["toxicity_1to7"] = json!(6);
    let mut bad_arm = good.to_value().unwrap();
    bad_arm["arm"] = json!("gentle");

    let mut file = fs::File::create(&out).unwrap();
    writeln!(file, "{}", serde_json::to_string(&good).unwrap()).unwrap();
    writeln!(file, "{}", bad_flag).unwrap();
    writeln!(file).unwrap();
    writeln!(file, "{{\"paper_id\": ").unwrap();
    writeln!(file, "{}", bad_arm).unwrap();
    drop(file);

    let report = validate_jsonl(&out, &RecordSchema::full20().unwrap()).unwrap();
    assert!(!report.passed());
    assert_eq!(report.total, 4);
    let lines: Vec<usize> = report.failures.iter().map(|f| f.line).collect();
    assert_eq!(lines, vec![2, 4, 5]);
    assert!(report.failures[0].errors.iter().any(|e| e.contains("toxicity_flag_tau5")));
    assert!(report.failures[1].errors[0].starts_with("invalid JSON"));
    assert!(report.to_string().ends_with("3/4 lines failed."));
}

#[test]
fn test_arm_means_csv() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("arm_means.csv");
    let records = vec![
        json!({"arm": "praise", "helpfulness_1to7": 6, "toxicity_1to7": 1, "harshness_1to7": 1}),
        json!({"arm": "harsh", "helpfulness_1to7": 4, "toxicity_1to7": 3, "harshness_1to7": 6}),
        json!({"arm": "praise", "helpfulness_1to7": 5, "toxicity_1to7": 2, "harshness_1to7": 2}),
        json!({"arm": "harsh", "helpfulness_1to7": null, "toxicity_1to7": null, "harshness_1to7": 7}),
    ];

    write_arm_means(&path, &arm_means(&records)).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "arm,mean_helpfulness,mean_toxicity,mean_harshness\n\
         praise,5.500,1.500,1.500\n\
         harsh,4.000,3.000,6.500\n"
    );
}

#[test]
fn test_unknown_arm_is_rejected_everywhere() {
    assert!(matches!("gentle".parse::<Arm>(), Err(ReviewError::UnknownArm(_))));
    assert!(build_review_prompt_for("gentle", &gaussian_widgets(), &ExtractedContent::default()).is_err());
    assert!(reviewer2::schema::parse_arm_list("praise,gentle").is_err());
}
