//! Visibility and validation rules for assessment answers.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
    condition::{Condition, ConditionError},
    domain::{AnswerValue, Answers, Assessment, Question, QuestionId, QuestionKind},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("This field is required")]
    Required,
    #[error("Must be a number")]
    NotANumber,
    #[error("Min {0}")]
    BelowMin(f64),
    #[error("Max {0}")]
    AboveMax(f64),
    #[error("Max length {0}")]
    TooLong(usize),
    #[error("Min {0} selections")]
    TooFewSelections(usize),
    #[error("Max {0} selections")]
    TooManySelections(usize),
    #[error("`{0}` is not one of the options")]
    NotAnOption(String),
    #[error("File type must be one of {0}")]
    FileType(String),
}

#[derive(Debug, Clone, Default, PartialEq, Error)]
#[error("{} question(s) failed validation", .0.len())]
pub struct ValidationErrors(pub BTreeMap<QuestionId, FieldError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: &QuestionId) -> Option<&FieldError> {
        self.0.get(id)
    }

    /// Flattens to `question id -> message` for the wire.
    pub fn messages(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(id, err)| (id.0.clone(), err.to_string()))
            .collect()
    }
}

/// Evaluates the question's `show_if` strictly, surfacing parse errors.
pub fn visibility(question: &Question, answers: &Answers) -> Result<bool, ConditionError> {
    match question.show_if.as_deref().map(str::trim) {
        None | Some("") => Ok(true),
        Some(source) => Ok(Condition::parse(source)?.evaluate(answers)),
    }
}

/// A question is visible when it has no condition, when the condition holds,
/// or when the condition cannot be evaluated.
pub fn is_visible(question: &Question, answers: &Answers) -> bool {
    visibility(question, answers).unwrap_or(true)
}

pub fn visible_questions<'a>(assessment: &'a Assessment, answers: &Answers) -> Vec<&'a Question> {
    assessment
        .questions()
        .filter(|question| is_visible(question, answers))
        .collect()
}

fn is_blank(value: Option<&AnswerValue>) -> bool {
    match value {
        None => true,
        Some(AnswerValue::Text(s)) => s.is_empty(),
        Some(AnswerValue::Selections(items)) => items.is_empty(),
        Some(AnswerValue::Number(_)) => false,
    }
}

fn as_text(value: &AnswerValue) -> String {
    match value {
        AnswerValue::Text(s) => s.clone(),
        AnswerValue::Number(n) => n.to_string(),
        AnswerValue::Selections(items) => items.iter().cloned().collect::<Vec<_>>().join(","),
    }
}

/// Checks one answer against its question, ignoring visibility.
pub fn validate_answer(question: &Question, value: Option<&AnswerValue>) -> Result<(), FieldError> {
    if question.required && is_blank(value) {
        return Err(FieldError::Required);
    }

    match &question.kind {
        QuestionKind::Numeric { min, max, .. } => {
            if is_blank(value) {
                return Ok(());
            }
            let number = match value {
                Some(AnswerValue::Number(n)) => *n,
                Some(AnswerValue::Text(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
                _ => f64::NAN,
            };
            if !number.is_finite() {
                return Err(FieldError::NotANumber);
            }
            if let Some(min) = min.filter(|min| number < *min) {
                return Err(FieldError::BelowMin(min));
            }
            if let Some(max) = max.filter(|max| number > *max) {
                return Err(FieldError::AboveMax(max));
            }
        }
        QuestionKind::ShortText { max_length, .. } | QuestionKind::LongText { max_length, .. } => {
            if let (Some(limit), Some(value)) = (max_length, value) {
                if as_text(value).chars().count() > *limit {
                    return Err(FieldError::TooLong(*limit));
                }
            }
        }
        QuestionKind::MultiChoice {
            options,
            min_selections,
            max_selections,
        } => {
            let selected: Vec<&String> = match value {
                Some(AnswerValue::Selections(items)) => items.iter().collect(),
                _ => Vec::new(),
            };
            if let Some(min) = min_selections.filter(|min| selected.len() < *min) {
                return Err(FieldError::TooFewSelections(min));
            }
            if let Some(max) = max_selections.filter(|max| selected.len() > *max) {
                return Err(FieldError::TooManySelections(max));
            }
            if !options.is_empty() {
                if let Some(stray) = selected.into_iter().find(|item| !options.contains(item)) {
                    return Err(FieldError::NotAnOption(stray.clone()));
                }
            }
        }
        QuestionKind::SingleChoice { options } => {
            if let Some(AnswerValue::Text(choice)) = value {
                if !choice.is_empty() && !options.is_empty() && !options.contains(choice) {
                    return Err(FieldError::NotAnOption(choice.clone()));
                }
            }
        }
        QuestionKind::FileUpload { accepted_types, .. } => {
            if let (false, Some(AnswerValue::Text(name))) = (accepted_types.is_empty(), value) {
                let name = name.to_lowercase();
                let accepted = name.is_empty()
                    || accepted_types.iter().any(|ext| {
                        let ext = ext.trim().trim_start_matches('.').to_lowercase();
                        name.ends_with(&format!(".{ext}"))
                    });
                if !accepted {
                    return Err(FieldError::FileType(accepted_types.join(", ")));
                }
            }
        }
    }

    Ok(())
}

/// Validates every currently visible question of `assessment`.
pub fn validate(assessment: &Assessment, answers: &Answers) -> Result<(), ValidationErrors> {
    let errors: BTreeMap<QuestionId, FieldError> = visible_questions(assessment, answers)
        .into_iter()
        .filter_map(|question| {
            validate_answer(question, answers.get(&question.id))
                .err()
                .map(|err| (question.id.clone(), err))
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

/// Checks that every `show_if` in the assessment parses.
pub fn check_conditions(assessment: &Assessment) -> Result<(), BTreeMap<QuestionId, ConditionError>> {
    let errors: BTreeMap<QuestionId, ConditionError> = assessment
        .questions()
        .filter_map(|question| {
            visibility(question, &Answers::new())
                .err()
                .map(|err| (question.id.clone(), err))
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
