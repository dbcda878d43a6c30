//! Quiz data model and validation.
//!
//! An uploaded quiz is a JSON object with a `questions` array and any number
//! of opaque metadata fields. [`validate_document`] turns a parsed JSON value
//! into a [`QuizDocument`] or reports the first rule it breaks.

pub mod model;
pub mod validation;

pub use model::{Question, QuizDocument, ValidationConfig, DEFAULT_MIN_CHOICES};
pub use validation::{validate_document, ValidationError};
