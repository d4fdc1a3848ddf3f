use crate::error::{ReviewError, Result};
use crate::scoring::toxicity_flag;
use crate::text::word_count;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamps are written in Asia/Tokyo time (UTC+9, no DST).
const TIMESTAMP_OFFSET_SECS: i32 = 9 * 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Arm {
    #[schemars(description = "Supportive mentor persona: strengths first, critiques phrased as suggestions")]
    Praise,

    #[schemars(description = "Impartial senior reviewer persona: balanced, evidence-first")]
    Neutral,

    #[schemars(description = "Tough, exacting reviewer persona: major flaws first, blunt but not insulting")]
    Harsh,
}

impl Arm {
    pub const ALL: [Arm; 3] = [Arm::Praise, Arm::Neutral, Arm::Harsh];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arm::Praise => "praise",
            Arm::Neutral => "neutral",
            Arm::Harsh => "harsh",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arm {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "praise" => Ok(Arm::Praise),
            "neutral" => Ok(Arm::Neutral),
            "harsh" => Ok(Arm::Harsh),
            other => Err(ReviewError::UnknownArm(other.to_string())),
        }
    }
}

/// Parses a comma-separated arm list such as `"praise,neutral,harsh"`.
/// Blank entries are skipped; any unknown name fails the whole list.
pub fn parse_arm_list(list: &str) -> Result<Vec<Arm>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Arm::from_str)
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Decoding {
    #[schemars(description = "Sampling temperature; always 0 for reproducible reviews")]
    pub temperature: u8,
    #[schemars(description = "Nucleus sampling mass; always 1")]
    pub top_p: u8,
}

impl Default for Decoding {
    fn default() -> Self {
        Self {
            temperature: 0,
            top_p: 1,
        }
    }
}

/// Configuration values stamped onto every record. The model identifiers are
/// opaque labels; nothing in the pipeline branches on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDefaults {
    pub model: String,
    pub judge_model: String,
    pub persona_version: String,
    pub content_scope: String,
    pub fig_mode: String,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-5".to_string(),
            judge_model: "Claude".to_string(),
            persona_version: "A".to_string(),
            content_scope: "FULL+FIG".to_string(),
            fig_mode: "VISION".to_string(),
        }
    }
}

/// One line of the output log (the FULL-20 layout).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReviewRecord {
    #[schemars(description = "ml_ + first 8 hex chars of blake2s(lowercase(title))")]
    pub paper_id: String,
    pub paper_title: String,
    pub arm: Arm,
    pub model: String,
    pub decoding: Decoding,
    pub persona_version: String,
    pub content_scope: String,
    #[schemars(description = "Normalized review; empty for stubs")]
    pub review_text: String,
    #[schemars(description = "Normalized word count; 600-800 whenever review_text is non-empty")]
    pub word_count: u32,
    #[schemars(range(min = 1, max = 7))]
    pub helpfulness_1to7: Option<u8>,
    #[schemars(range(min = 1, max = 7))]
    pub toxicity_1to7: Option<u8>,
    #[schemars(range(min = 1, max = 7))]
    pub harshness_1to7: Option<u8>,
    pub run_id: String,
    #[schemars(description = "RFC 3339 timestamp with a fixed +09:00 offset")]
    pub timestamp_iso: String,
    pub source_type: String,
    pub paper_url: String,
    pub fig_mode: String,
    pub judge_model: String,
    #[schemars(description = "True exactly when toxicity_1to7 >= 5")]
    pub toxicity_flag_tau5: bool,
    #[schemars(description = "Append-only audit trail, entries separated by ';'")]
    pub notes: String,
}

impl ReviewRecord {
    /// A record with metadata filled in and no review or scores yet.
    pub fn stub(
        paper: &PaperMetadata,
        paper_id: &str,
        arm: Arm,
        run_id: &str,
        defaults: &RecordDefaults,
    ) -> Self {
        Self {
            paper_id: paper_id.to_string(),
            paper_title: paper.paper_title.clone(),
            arm,
            model: defaults.model.clone(),
            decoding: Decoding::default(),
            persona_version: defaults.persona_version.clone(),
            content_scope: defaults.content_scope.clone(),
            review_text: String::new(),
            word_count: 0,
            helpfulness_1to7: None,
            toxicity_1to7: None,
            harshness_1to7: None,
            run_id: run_id.to_string(),
            timestamp_iso: now_timestamp_iso(),
            source_type: paper.source_type.clone(),
            paper_url: paper.paper_url.clone(),
            fig_mode: defaults.fig_mode.clone(),
            judge_model: defaults.judge_model.clone(),
            toxicity_flag_tau5: false,
            notes: String::new(),
        }
    }

    pub fn set_review(&mut self, text: impl Into<String>) {
        self.review_text = text.into();
        self.word_count = word_count(&self.review_text) as u32;
    }

    /// Stores judge scores and keeps the tau5 flag consistent with toxicity.
    pub fn set_scores(&mut self, helpfulness: Option<u8>, toxicity: Option<u8>, harshness: Option<u8>) {
        self.helpfulness_1to7 = helpfulness;
        self.toxicity_1to7 = toxicity;
        self.harshness_1to7 = harshness;
        self.toxicity_flag_tau5 = toxicity.map(toxicity_flag).unwrap_or(false);
    }

    /// Notes only ever grow; entries are joined with `;`.
    pub fn append_note(&mut self, note: impl AsRef<str>) {
        let note = note.as_ref().trim();
        if note.is_empty() {
            return;
        }
        if !self.notes.is_empty() {
            self.notes.push(';');
        }
        self.notes.push_str(note);
    }

    pub fn has_review(&self) -> bool {
        !self.review_text.trim().is_empty()
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReviewRecord)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}

pub fn now_timestamp_iso() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    // constant offset, always in range
    let offset = FixedOffset::east_opt(TIMESTAMP_OFFSET_SECS).unwrap();
    at.with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// A row from the paper list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaperMetadata {
    pub paper_title: String,
    #[serde(default)]
    pub paper_url: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
}

impl PaperMetadata {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            paper_title: title.into(),
            paper_url: url.into(),
            source_type: source_type.into(),
            abstract_text: String::new(),
        }
    }
}

/// Output of the extraction collaborator. Every key is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExtractedContent {
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub figures: Vec<Figure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Section {
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Figure {
    #[serde(default)]
    pub image_path: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub figure_id: Option<FigureId>,
    #[serde(default)]
    pub page_num: Option<u32>,
}

/// Extractors emit figure ids either as labels ("3a") or as bare numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(untagged)]
pub enum FigureId {
    Number(i64),
    Label(String),
}

impl fmt::Display for FigureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FigureId::Number(n) => write!(f, "{}", n),
            FigureId::Label(s) => f.write_str(s),
        }
    }
}
