use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLogRow {
    pub member: String,
    pub day: String,
    pub date: String,
    pub task: String,
    pub notes: String,
    pub reference: String,
}

impl WorkLogRow {
    pub fn new(member: &str, entry: &NewEntry) -> Self {
        Self {
            member: member.to_string(),
            day: entry.day.clone(),
            date: entry.date.clone(),
            task: entry.task.clone(),
            notes: entry.notes.clone(),
            reference: entry.docs.clone(),
        }
    }

    /// Line fed to the weekly prompts: `member: task (notes)`.
    pub fn weekly_line(&self) -> String {
        format!("{}: {} ({})", self.member, self.task, self.notes)
    }

    /// Line fed to the daily report prompt, tagged with its project label.
    pub fn daily_line(&self, label: &str) -> String {
        format!("{} [{}]: {} - {}", self.member, label, self.task, self.notes)
    }

    pub fn fields(&self) -> [&str; 5] {
        [
            self.day.as_str(),
            self.date.as_str(),
            self.task.as_str(),
            self.notes.as_str(),
            self.reference.as_str(),
        ]
    }
}

/// A single submission, before it is attached to a member's tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub day: String,
    pub date: String,
    pub task: String,
    pub notes: String,
    pub docs: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGroup {
    pub name: String,
    pub tasks: Vec<String>,
    pub team_members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Newsletter {
    pub subject: String,
    pub date_range: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct DailyDispatch {
    pub chat: ChatMessage,
    pub row_count: usize,
}

#[derive(Debug, Clone)]
pub struct WeeklyDispatch {
    pub newsletter: Newsletter,
    pub chat: ChatMessage,
    pub groups: Vec<ProjectGroup>,
    pub row_count: usize,
}
