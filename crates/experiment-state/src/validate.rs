//! Pre-submission checks for experiment drafts

use crate::error::ValidationError;
use crate::schema::ExperimentDraft;

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

/// Check that `draft` carries every required field.
///
/// `title`, `benchmark` and `period` must be non-empty, and at least one of
/// `primary_metric_of_interest` / `metric_of_interest` must be set. All gaps
/// are reported together; a missing metric is reported under the primary
/// field name.
pub fn validate(draft: &ExperimentDraft) -> Result<(), ValidationError> {
    let mut missing: Vec<String> = [
        ("title", &draft.title),
        ("benchmark", &draft.benchmark),
        ("period", &draft.period),
    ]
    .into_iter()
    .filter(|(_, value)| !filled(value))
    .map(|(name, _)| name.to_string())
    .collect();

    if !filled(&draft.primary_metric_of_interest) && !filled(&draft.metric_of_interest) {
        missing.push("primary_metric_of_interest".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { missing })
    }
}
