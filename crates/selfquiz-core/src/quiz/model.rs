use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Fewest choices a question may have, whatever the host asks for.
pub const DEFAULT_MIN_CHOICES: usize = 2;

/// Validation settings the host sends along with each upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    #[serde(default = "default_min_choices")]
    pub min_choices: usize,
}

fn default_min_choices() -> usize {
    DEFAULT_MIN_CHOICES
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_choices: DEFAULT_MIN_CHOICES,
        }
    }
}

impl ValidationConfig {
    pub fn with_min_choices(min_choices: usize) -> Self {
        Self { min_choices }
    }

    /// Minimum choice count actually enforced. Anything below two
    /// (including an unset `0`) falls back to the default.
    pub fn effective_min_choices(&self) -> usize {
        self.min_choices.max(DEFAULT_MIN_CHOICES)
    }
}

/// A single validated quiz question.
///
/// Fields are forwarded exactly as uploaded; trimming only applies to the
/// validation checks. Numbers keep their uploaded representation, so `30`
/// stays an integer and `2.0` stays a float. Unknown fields ride along in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_text: String,
    pub choices: Vec<String>,
    pub correct_answer: Number,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Number>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Question {
    /// `correctAnswer` as an index into `choices`.
    pub fn answer_index(&self) -> Option<usize> {
        index_from_number(&self.correct_answer)
    }

    pub fn correct_choice(&self) -> Option<&str> {
        self.answer_index()
            .and_then(|index| self.choices.get(index))
            .map(String::as_str)
    }

    /// Time limit in seconds.
    pub fn time_seconds(&self) -> Option<f64> {
        self.time.as_ref().and_then(Number::as_f64)
    }
}

/// Accept non-negative integral numbers, including `1.0` style floats.
pub(crate) fn index_from_number(number: &Number) -> Option<usize> {
    if let Some(index) = number.as_u64() {
        return usize::try_from(index).ok();
    }
    let index = number.as_f64()?;
    if index >= 0.0 && index.fract() == 0.0 && index <= usize::MAX as f64 {
        Some(index as usize)
    } else {
        None
    }
}

/// A fully validated upload: every top-level field except `questions` is
/// kept verbatim in `meta`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizDocument {
    pub meta: Map<String, Value>,
    pub questions: Vec<Question>,
}

impl QuizDocument {
    pub fn topic(&self) -> Option<&str> {
        self.meta.get("topic").and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Split into the metadata object and the question list.
    pub fn into_parts(self) -> (Map<String, Value>, Vec<Question>) {
        (self.meta, self.questions)
    }
}
