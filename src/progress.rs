//! Page progress over evaluated field states, used to lock navigation
//! until a page is complete. Hidden fields never count.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::orchestrator::EvaluatedFieldState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageProgress {
    /// Visible fields.
    pub total: usize,
    /// Visible required fields.
    pub required: usize,
    /// Visible required fields with a valid answer.
    pub completed: usize,
    /// Visible fields that are not valid, evaluation errors included.
    pub invalid: usize,
    /// Code of the first invalid field in element order.
    pub first_invalid: Option<String>,
}

impl PageProgress {
    pub fn is_complete(&self) -> bool {
        self.completed == self.required && self.invalid == 0
    }
}

pub fn summarize(states: &[EvaluatedFieldState]) -> PageProgress {
    let mut visible: Vec<&EvaluatedFieldState> = states.iter().filter(|s| s.is_visible).collect();
    visible.sort_by_key(|s| s.index);

    let mut progress = PageProgress {
        total: visible.len(),
        ..Default::default()
    };
    for state in visible {
        if state.is_required {
            progress.required += 1;
            if state.is_answered && state.is_valid() {
                progress.completed += 1;
            }
        }
        if !state.is_valid() {
            progress.invalid += 1;
            if progress.first_invalid.is_none() {
                progress.first_invalid = Some(state.code.clone());
            }
        }
    }
    progress
}

/// Progress per (section, page).
pub fn summarize_pages(states: &[EvaluatedFieldState]) -> BTreeMap<(u32, u32), PageProgress> {
    let mut pages: BTreeMap<(u32, u32), Vec<EvaluatedFieldState>> = BTreeMap::new();
    for state in states {
        pages.entry(state.index.page_key()).or_default().push(state.clone());
    }
    pages
        .into_iter()
        .map(|(key, states)| (key, summarize(&states)))
        .collect()
}

/// In strict mode every visible required field must also be answered.
pub fn is_page_valid(states: &[EvaluatedFieldState], strict: bool) -> bool {
    let progress = summarize(states);
    progress.invalid == 0 && (!strict || progress.completed == progress.required)
}
