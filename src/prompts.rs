//! Prompt assembly for the reviewer and judge models.

use crate::error::Result;
use crate::schema::{Arm, ExtractedContent, Figure, PaperMetadata};
use crate::scoring::Metric;
use serde::{Deserialize, Serialize};

/// Upper bound on the abridged main text sent to the reviewer, in characters.
pub const MAIN_TEXT_CHAR_BUDGET: usize = 20_000;

const STRUCTURE_INSTRUCTION: &str = "Use the ICLR/OpenReview structure: Summary; Strengths; Weaknesses; Questions; \
     Overall [1-10]; Confidence [1-5]. Keep the review to 600-800 words.";

const USER_CLOSING: &str = "Critique the paper's content; avoid personal remarks; keep non-toxic.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureAttachment {
    pub image_path: String,
    pub caption: String,
    pub figure_id: String,
}

/// Everything the reviewer model needs for one (paper, arm) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBundle {
    pub arm: Arm,
    pub messages: Vec<ChatMessage>,
    pub figures: Vec<FigureAttachment>,
}

pub fn persona_line(arm: Arm) -> &'static str {
    match arm {
        Arm::Praise => "Act as a supportive mentor reviewer. Start with strengths. Phrase critiques as suggestions. Be specific. No toxicity.",
        Arm::Neutral => "Act as an impartial senior reviewer. Balance strengths and weaknesses. Evidence-first. Professional tone.",
        Arm::Harsh => "Act as a tough, exacting reviewer. Lead with major flaws. Blunt and concise. No insults or slurs.",
    }
}

pub fn build_review_prompt(
    arm: Arm,
    paper: &PaperMetadata,
    content: &ExtractedContent,
) -> PromptBundle {
    let abstract_text = if content.abstract_text.is_empty() {
        paper.abstract_text.as_str()
    } else {
        content.abstract_text.as_str()
    };

    let main_text = abridge_main_text(content);

    let messages = vec![
        ChatMessage::system(format!("{} {}", persona_line(arm), STRUCTURE_INSTRUCTION)),
        ChatMessage::user(format!(
            "Title: {}\n\nAbstract: {}\n\nMain text (abridged):\n{}\n\n{}",
            paper.paper_title, abstract_text, main_text, USER_CLOSING
        )),
    ];

    PromptBundle {
        arm,
        messages,
        figures: package_figures(&content.figures),
    }
}

/// Same as [`build_review_prompt`] for callers holding an arm name from
/// configuration; an unrecognized name is an error, never a silent default.
pub fn build_review_prompt_for(
    arm: &str,
    paper: &PaperMetadata,
    content: &ExtractedContent,
) -> Result<PromptBundle> {
    let arm = arm.parse::<Arm>()?;
    Ok(build_review_prompt(arm, paper, content))
}

/// Follow-up turn asking the reviewer to lengthen a draft that came back
/// under `min_words`. The draft is replayed as the assistant's turn.
pub fn expansion_request(
    bundle: &PromptBundle,
    draft: &str,
    words: usize,
    min_words: usize,
    max_words: usize,
) -> PromptBundle {
    let mut expanded = bundle.clone();
    expanded
        .messages
        .push(ChatMessage::new(MessageRole::Assistant, draft));
    expanded.messages.push(ChatMessage::user(format!(
        "Your review has {} words. Rewrite it to between {} and {} words, keeping the same \
         persona and all six sections (Summary, Strengths, Weaknesses, Questions, Overall, \
         Confidence). Return only the review.",
        words, min_words, max_words
    )));
    expanded
}

fn abridge_main_text(content: &ExtractedContent) -> String {
    let joined = content
        .sections
        .iter()
        .map(|section| {
            if section.heading.is_empty() {
                section.text.clone()
            } else {
                format!("{}: {}", section.heading, section.text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    match joined.char_indices().nth(MAIN_TEXT_CHAR_BUDGET) {
        Some((cut, _)) => joined[..cut].to_string(),
        None => joined,
    }
}

pub fn package_figures(figures: &[Figure]) -> Vec<FigureAttachment> {
    figures
        .iter()
        .enumerate()
        .map(|(idx, figure)| {
            let position = idx + 1;
            let caption = figure
                .caption
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Figure {} (no caption extracted).", position));
            let figure_id = figure
                .figure_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| position.to_string());
            FigureAttachment {
                image_path: figure.image_path.clone(),
                caption,
                figure_id,
            }
        })
        .collect()
}

/// What a judge sees. Helpfulness is judged against the paper; toxicity and
/// harshness only look at the review itself.
#[derive(Debug, Clone, Default)]
pub struct JudgeInput {
    pub paper_title: String,
    pub paper_abstract: String,
    pub review_text: String,
}

fn rubric(metric: Metric) -> &'static str {
    match metric {
        Metric::Helpfulness => "Rate how helpful this peer review would be to the authors: specific, actionable, grounded in the paper. 1 = useless, 7 = exceptionally helpful.",
        Metric::Toxicity => "Rate the toxicity of this peer review: insults, personal attacks, demeaning language. 1 = not toxic at all, 7 = extremely toxic.",
        Metric::Harshness => "Rate the harshness of this peer review's tone, independent of correctness. 1 = very gentle, 7 = extremely harsh.",
    }
}

pub fn judge_prompt(metric: Metric, input: &JudgeInput, strict: bool) -> Vec<ChatMessage> {
    let mut system = format!(
        "You are an expert meta-reviewer. {} Reply with `{}: N` on the first line, \
         where N is an integer from 1 to 7, then a short rationale on the following lines.",
        rubric(metric),
        metric
    );
    if strict {
        system.push_str(&format!(
            " Your previous reply did not contain a valid score. The first line MUST be exactly \
             `{}: N` with N in 1-7 and nothing else.",
            metric
        ));
    }

    let user = match metric {
        Metric::Helpfulness => format!(
            "Paper title: {}\n\nPaper abstract: {}\n\nReview:\n{}",
            input.paper_title, input.paper_abstract, input.review_text
        ),
        Metric::Toxicity | Metric::Harshness => format!("Review:\n{}", input.review_text),
    };

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
