//! Structural and content rules for uploaded quizzes.
//!
//! Rules run in a fixed order and the first failure wins, so the message a
//! user sees always points at the earliest problem. Question numbers in
//! messages are 1-based.

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

use super::model::{index_from_number, Question, QuizDocument, ValidationConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid JSON: Data must be an object.")]
    NotAnObject,

    #[error("Invalid JSON: If \"topic\" is present, it must be a string.")]
    InvalidTopic,

    #[error("Invalid JSON: \"questions\" must be an array.")]
    QuestionsNotArray,

    #[error("Invalid JSON: \"questions\" array cannot be empty.")]
    NoQuestions,

    #[error("Question {number}: \"questionText\" must be a non-empty string.")]
    MissingQuestionText { number: usize },

    #[error("Question {number}: Duplicate question text detected.")]
    DuplicateQuestion { number: usize },

    #[error("Question {number}: Must have at least {min_choices} choices.")]
    TooFewChoices { number: usize, min_choices: usize },

    #[error("Question {number}: All choices must be non-empty strings.")]
    InvalidChoice { number: usize },

    #[error("Question {number}: Duplicate choices detected.")]
    DuplicateChoice { number: usize },

    #[error("Question {number}: \"correctAnswer\" index is invalid or out of bounds.")]
    InvalidCorrectAnswer { number: usize },

    #[error("Question {number}: \"explanation\" must be a non-empty string.")]
    MissingExplanation { number: usize },

    #[error("Question {number}: If \"time\" is present, it must be a positive number.")]
    InvalidTime { number: usize },
}

impl ValidationError {
    /// The 1-based question this error refers to, if any.
    pub fn question_number(&self) -> Option<usize> {
        match self {
            ValidationError::NotAnObject
            | ValidationError::InvalidTopic
            | ValidationError::QuestionsNotArray
            | ValidationError::NoQuestions => None,
            ValidationError::MissingQuestionText { number }
            | ValidationError::DuplicateQuestion { number }
            | ValidationError::TooFewChoices { number, .. }
            | ValidationError::InvalidChoice { number }
            | ValidationError::DuplicateChoice { number }
            | ValidationError::InvalidCorrectAnswer { number }
            | ValidationError::MissingExplanation { number }
            | ValidationError::InvalidTime { number } => Some(*number),
        }
    }
}

/// Validate a parsed upload and convert it into a [`QuizDocument`].
pub fn validate_document(
    value: Value,
    config: &ValidationConfig,
) -> Result<QuizDocument, ValidationError> {
    let Value::Object(mut meta) = value else {
        return Err(ValidationError::NotAnObject);
    };

    if meta.get("topic").is_some_and(|topic| !topic.is_string()) {
        return Err(ValidationError::InvalidTopic);
    }

    let raw_questions = match meta.remove("questions") {
        Some(Value::Array(questions)) => questions,
        _ => return Err(ValidationError::QuestionsNotArray),
    };
    if raw_questions.is_empty() {
        return Err(ValidationError::NoQuestions);
    }

    let min_choices = config.effective_min_choices();
    let mut seen_text: HashSet<String> = HashSet::with_capacity(raw_questions.len());
    let mut questions = Vec::with_capacity(raw_questions.len());

    for (index, raw) in raw_questions.into_iter().enumerate() {
        let question = validate_question(raw, index + 1, min_choices, &mut seen_text)?;
        questions.push(question);
    }

    Ok(QuizDocument { meta, questions })
}

fn validate_question(
    raw: Value,
    number: usize,
    min_choices: usize,
    seen_text: &mut HashSet<String>,
) -> Result<Question, ValidationError> {
    let Value::Object(mut fields) = raw else {
        return Err(ValidationError::MissingQuestionText { number });
    };

    let question_text = take_non_empty_string(&mut fields, "questionText")
        .ok_or(ValidationError::MissingQuestionText { number })?;

    // Case-sensitive, trim-only comparison
    if !seen_text.insert(question_text.trim().to_string()) {
        return Err(ValidationError::DuplicateQuestion { number });
    }

    let raw_choices = match fields.remove("choices") {
        Some(Value::Array(choices)) if choices.len() >= min_choices => choices,
        _ => return Err(ValidationError::TooFewChoices { number, min_choices }),
    };

    let mut unique_choices = HashSet::with_capacity(raw_choices.len());
    for choice in &raw_choices {
        let trimmed = choice
            .as_str()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or(ValidationError::InvalidChoice { number })?;
        if !unique_choices.insert(trimmed) {
            return Err(ValidationError::DuplicateChoice { number });
        }
    }
    let choices: Vec<String> = raw_choices
        .into_iter()
        .filter_map(|choice| match choice {
            Value::String(text) => Some(text),
            _ => None,
        })
        .collect();

    let correct_answer = match fields.remove("correctAnswer") {
        Some(Value::Number(answer))
            if index_from_number(&answer).is_some_and(|index| index < choices.len()) =>
        {
            answer
        }
        _ => return Err(ValidationError::InvalidCorrectAnswer { number }),
    };

    let explanation = take_non_empty_string(&mut fields, "explanation")
        .ok_or(ValidationError::MissingExplanation { number })?;

    let time = match fields.remove("time") {
        None => None,
        Some(Value::Number(seconds)) if seconds.as_f64().is_some_and(|s| s > 0.0) => Some(seconds),
        Some(_) => return Err(ValidationError::InvalidTime { number }),
    };

    Ok(Question {
        question_text,
        choices,
        correct_answer,
        explanation,
        time,
        extra: fields,
    })
}

/// Remove `key` and return it if it is a string with visible content.
fn take_non_empty_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
