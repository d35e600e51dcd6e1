use std::fmt::Write;

use crate::completion::{Completion, CompletionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// ~75 words for leadership, no individual attribution.
    Executive,
    /// Markdown bullets grouped by project, for the weekly chat post.
    ChatDigest,
    /// Today's tagged updates grouped under bold project headers.
    DailyReport,
}

impl Style {
    fn instructions(&self) -> &'static str {
        match self {
            Style::Executive => {
                r#"
You are a Senior Engineering Manager.
Write an executive summary of this week's team updates for leadership.

Constraints:
- At most 3 sentences and roughly 75 words.
- Do not attribute work to individual people.
- Do not invent facts, numbers, or outcomes that are not in the updates.
- Keep a consistent, neutral tone.
"#
            }
            Style::ChatDigest => {
                r#"
You are a Senior Technical Program Manager writing a weekly team digest
for a chat channel.

Rules:
1. Group the updates by logical project or initiative; infer the names.
2. Use a bold project name followed by markdown bullet points.
3. Merge duplicate activities into one bullet.
4. Keep it skimmable: no preamble, no closing remarks.
"#
            }
            Style::DailyReport => {
                r#"
You are a Senior Technical Program Manager.
Summarize the following daily updates into a cohesive report.

Rules:
1. Group updates by the PROJECT NAME that appears in the brackets.
2. Format cleanly with bold headers for projects.
3. If multiple people worked on the same project, combine their updates.
"#
            }
        }
    }

    pub fn prompt(&self, updates: &[String]) -> String {
        let mut prompt = String::from(self.instructions());
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Updates:");
        for update in updates {
            let _ = writeln!(prompt, "- {update}");
        }
        prompt
    }
}

/// One completion call; the trimmed prose is returned as-is.
pub async fn summarize(
    completion: &dyn Completion,
    updates: &[String],
    style: Style,
) -> Result<String, CompletionError> {
    let text = completion.complete(&style.prompt(updates), None).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(CompletionError::Empty);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkLogRow;
    use crate::testing::ScriptedCompletion;

    #[test]
    fn executive_prompt_states_constraints() {
        let prompt = Style::Executive.prompt(&["Avery: Ingest retries (backoff)".to_string()]);
        assert!(prompt.contains("At most 3 sentences"));
        assert!(prompt.contains("Do not attribute work to individual people"));
        assert!(prompt.contains("- Avery: Ingest retries (backoff)\n"));
    }

    #[test]
    fn every_daily_line_gets_one_bullet() {
        let row = WorkLogRow {
            member: "Avery".to_string(),
            day: "Fri".to_string(),
            date: "10-Jan-2025".to_string(),
            task: "a".to_string(),
            notes: "b".to_string(),
            reference: String::new(),
        };
        let prompt = Style::DailyReport.prompt(&[row.daily_line("Data Platform")]);
        assert!(prompt.contains("\n- Avery [Data Platform]: a - b\n"));
        assert!(!prompt.contains("- - Avery"));
    }

    #[tokio::test]
    async fn summary_text_is_trimmed() {
        let completion = ScriptedCompletion::replying(|_| Ok("\n  Strong week.  \n".to_string()));
        let text = summarize(&completion, &["x".to_string()], Style::Executive)
            .await
            .unwrap();
        assert_eq!(text, "Strong week.");
    }

    #[tokio::test]
    async fn failures_propagate() {
        let completion = ScriptedCompletion::failing();
        let result = summarize(&completion, &["x".to_string()], Style::ChatDigest).await;
        assert!(result.is_err());
    }
}
