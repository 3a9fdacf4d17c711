//! Selection context sent along with a prompt.

use serde::{Deserialize, Serialize};

/// A match card the user has highlighted in the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedMatch {
    pub final_name: String,
    pub columns: Vec<String>,
}

impl SelectedMatch {
    pub fn new(final_name: impl Into<String>, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            final_name: final_name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Text sent to the model for `prompt`, prefixed with a summary of the
/// highlighted matches when there are any.
pub fn augment(prompt: &str, selection: &[SelectedMatch]) -> String {
    if selection.is_empty() {
        return prompt.to_string();
    }

    let lines: Vec<String> = selection
        .iter()
        .map(|m| format!("- {}: [{}]", m.final_name, m.columns.join(", ")))
        .collect();

    format!(
        "The user has highlighted the following matches:\n{}\n\nUser's question: {}",
        lines.join("\n"),
        prompt
    )
}
