use std::fmt::{self, Write};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::warn;

use crate::completion::{Completion, CompletionError};
use crate::models::ProjectGroup;

/// Label used whenever single-row classification cannot produce one.
pub const UNCLASSIFIED: &str = "Unclassified";

const MAX_LABEL_WORDS: usize = 3;

#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("grouping call failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("grouping response is not a project listing: {source}\n  response: {body}")]
    Parse {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("grouping response contained no projects")]
    Empty,
}

pub struct RowSignals<'a> {
    pub task: &'a str,
    pub notes: &'a str,
    pub days_since_last_update: i64,
    pub date: &'a str,
}

pub fn label_prompt(signals: &RowSignals<'_>) -> String {
    format!(
        r#"
You are a Project Manager AI that assigns a SINGLE Project Name.

====================
RULES
====================

1. SAME INITIATIVE GROUPING
Different names referring to the same initiative must be grouped under
one umbrella name.

2. CONTEXTUAL SPLITTING
Research and partnership work should be grouped UNLESS the notes clearly
indicate different goals or outcomes.

3. TIME AWARENESS
If the same kind of work resumes after a long gap (>7 days), it may be a
new project rather than a continuation.

====================
SIGNALS
====================
Days since last related update: {days}

====================
INPUT
====================
Task: {task}
Notes: {notes}
Date: {date}

====================
OUTPUT
====================
Project Name (max 3 words, no explanation):
"#,
        days = signals.days_since_last_update,
        task = signals.task,
        notes = signals.notes,
        date = signals.date,
    )
}

/// Assigns a short project label to one entry. Never fails: any error
/// from the completion call yields [`UNCLASSIFIED`].
pub async fn classify_row(
    completion: &dyn Completion,
    signals: &RowSignals<'_>,
    temperature: f64,
) -> String {
    let prompt = label_prompt(signals);

    match completion.complete(&prompt, Some(temperature)).await {
        Ok(text) => match clean_label(&text) {
            Some(label) => label,
            None => {
                warn!(response = %text, "classifier returned no usable label");
                UNCLASSIFIED.to_string()
            }
        },
        Err(err) => {
            warn!(error = %err, "classification failed, using fallback label");
            UNCLASSIFIED.to_string()
        }
    }
}

/// First non-empty line of the response, stripped of decoration and cut to
/// three words.
pub fn clean_label(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = match line.split_once(':') {
        Some((prefix, rest)) if is_output_header(prefix) => rest,
        _ => line,
    };
    let line = line.trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`' || c.is_whitespace());

    let words: Vec<&str> = line.split_whitespace().take(MAX_LABEL_WORDS).collect();
    if words.is_empty() {
        return None;
    }
    Some(words.join(" ").trim_end_matches('.').to_string())
}

/// True for an echo of the prompt's `Project Name:` output header.
fn is_output_header(prefix: &str) -> bool {
    let prefix = prefix.trim().trim_matches(|c: char| c == '*' || c == '`' || c == '"');
    prefix.eq_ignore_ascii_case("project name") || prefix.eq_ignore_ascii_case("project")
}

/// Folds labels that are near-duplicates of earlier ones within a run.
#[derive(Debug, Clone)]
pub struct LabelCanonicalizer {
    threshold: f64,
    seen: Vec<String>,
}

impl LabelCanonicalizer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            seen: Vec::new(),
        }
    }

    pub fn canonicalize(&mut self, label: String) -> String {
        if label == UNCLASSIFIED {
            return label;
        }

        let key = label.to_lowercase();
        let best = self
            .seen
            .iter()
            .map(|seen| (seen, strsim::jaro_winkler(&key, &seen.to_lowercase())))
            .filter(|(_, score)| *score >= self.threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((seen, _)) => seen.clone(),
            None => {
                self.seen.push(label.clone());
                label
            }
        }
    }
}

pub fn grouping_prompt(updates: &[String]) -> String {
    let mut prompt = String::from(
        r#"
Group the following updates by logical project or initiative.
Infer project names yourself (max 3 words each).

Rules:
- Merge activities that are the same work into a single rephrased bullet point.
- Notes may mix several tasks; split them into the projects they belong to.
- Presentation or stakeholder-facing activities must never share a project
  with engineering or build activities, even when the topic is related.
- List only team members that appear in the updates for that project.

Return only JSON in this format:
{
  "Project Name": {
      "tasks": ["point 1", "point 2"],
      "team_members": ["Name", "Name"]
  }
}

Updates:
"#,
    );

    for update in updates {
        let _ = writeln!(prompt, "- {update}");
    }

    prompt
}

/// Calls the completion endpoint once and parses its project listing.
pub async fn group_updates(
    completion: &dyn Completion,
    updates: &[String],
) -> Result<Vec<ProjectGroup>, GroupingError> {
    let response = completion.complete(&grouping_prompt(updates), None).await?;
    parse_groups(&response)
}

/// Removes a surrounding Markdown code fence (with optional language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = rest.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    let tag_len = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    body[tag_len..].trim()
}

#[derive(Deserialize)]
struct GroupBody {
    tasks: Vec<String>,
    team_members: Members,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Members {
    List(Vec<String>),
    Text(String),
}

impl Members {
    fn into_names(self) -> Vec<String> {
        let raw = match self {
            Members::List(names) => names,
            Members::Text(text) => text
                .replace(" and ", ",")
                .replace('&', ",")
                .split(',')
                .map(str::to_string)
                .collect(),
        };

        let mut names: Vec<String> = Vec::with_capacity(raw.len());
        for name in raw {
            let name = name.trim().to_string();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Project listings in the order the model wrote them.
struct Listing(Vec<(String, GroupBody)>);

impl<'de> Deserialize<'de> for Listing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ListingVisitor;

        impl<'de> Visitor<'de> for ListingVisitor {
            type Value = Listing;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping project names to listings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Listing, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, GroupBody>()? {
                    entries.push(entry);
                }
                Ok(Listing(entries))
            }
        }

        deserializer.deserialize_map(ListingVisitor)
    }
}

/// Strict parse of a grouping response. Anything but a JSON object of
/// project listings is an error. Projects keep the response order; a
/// repeated project name is merged into its first occurrence.
pub fn parse_groups(text: &str) -> Result<Vec<ProjectGroup>, GroupingError> {
    let body = strip_code_fence(text);
    let Listing(entries) =
        serde_json::from_str::<Listing>(body).map_err(|source| GroupingError::Parse {
            source,
            body: body.to_string(),
        })?;

    if entries.is_empty() {
        return Err(GroupingError::Empty);
    }

    let mut groups: Vec<ProjectGroup> = Vec::with_capacity(entries.len());
    for (name, body) in entries {
        let name = name.trim().to_string();
        let tasks = body
            .tasks
            .into_iter()
            .map(|task| task.trim().to_string())
            .filter(|task| !task.is_empty());
        let members = body.team_members.into_names();

        match groups.iter_mut().find(|group| group.name == name) {
            Some(group) => {
                group.tasks.extend(tasks);
                for member in members {
                    if !group.team_members.contains(&member) {
                        group.team_members.push(member);
                    }
                }
            }
            None => groups.push(ProjectGroup {
                name,
                tasks: tasks.collect(),
                team_members: members,
            }),
        }
    }

    Ok(groups)
}
