use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, error, info};

use crate::classifier::{self, LabelCanonicalizer, RowSignals};
use crate::completion::Completion;
use crate::config::Settings;
use crate::dispatch::{ChatSink, MailSink};
use crate::models::{
    ChatMessage, DailyDispatch, NewEntry, Newsletter, WeeklyDispatch, WorkLogRow,
};
use crate::newsletter;
use crate::scheduler::{JobKind, JobRunner};
use crate::store::{self, AppendOutcome, RowStore, StoreError};
use crate::summarizer::{self, Style};
use crate::window::{self, format_log_date, Window};

/// Turns a store snapshot and a day into dispatch payloads. Sends nothing.
pub struct Pipeline<'a> {
    store: &'a dyn RowStore,
    completion: &'a dyn Completion,
    settings: &'a Settings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn RowStore,
        completion: &'a dyn Completion,
        settings: &'a Settings,
    ) -> Self {
        Self {
            store,
            completion,
            settings,
        }
    }

    pub async fn build_daily(&self, today: NaiveDate) -> anyhow::Result<Option<DailyDispatch>> {
        let team = store::fetch_team(self.store, &self.settings.roster).await;
        let mut canonicalizer = self.settings.label_match_threshold.map(LabelCanonicalizer::new);
        let mut lines = Vec::new();

        for member in &team {
            debug!(member = %member.member, rows = member.rows.len(), "scanning tab");
            for (idx, row) in member.rows.iter().enumerate() {
                if !Window::Today.contains(row, today) {
                    continue;
                }

                let signals = RowSignals {
                    task: &row.task,
                    notes: &row.notes,
                    days_since_last_update: window::days_since_last_update(
                        &member.rows[..idx],
                        today,
                    ),
                    date: &row.date,
                };
                let mut label = classifier::classify_row(
                    self.completion,
                    &signals,
                    self.settings.classifier_temperature,
                )
                .await;
                if let Some(canonicalizer) = canonicalizer.as_mut() {
                    label = canonicalizer.canonicalize(label);
                }
                lines.push(row.daily_line(&label));
            }
        }

        if lines.is_empty() {
            info!(job = "daily", "no updates found today");
            return Ok(None);
        }

        let report = summarizer::summarize(self.completion, &lines, Style::DailyReport)
            .await
            .context("failed to generate daily report")?;

        Ok(Some(DailyDispatch {
            chat: ChatMessage {
                text: format!(
                    "*Daily Team Dispatch - {}*\n\n{}",
                    format_log_date(today),
                    report
                ),
            },
            row_count: lines.len(),
        }))
    }

    pub async fn build_weekly(&self, today: NaiveDate) -> anyhow::Result<Option<WeeklyDispatch>> {
        let window = Window::Trailing(self.settings.weekly_window_days);
        let team = store::fetch_team(self.store, &self.settings.roster).await;
        let updates: Vec<String> = team
            .iter()
            .flat_map(|member| window.select(&member.rows, today))
            .map(|row| row.weekly_line())
            .collect();

        if updates.is_empty() {
            info!(
                job = "weekly",
                days = self.settings.weekly_window_days,
                "no updates found for this window"
            );
            return Ok(None);
        }

        info!(job = "weekly", rows = updates.len(), "generating weekly summaries");
        let executive_summary = summarizer::summarize(self.completion, &updates, Style::Executive)
            .await
            .context("failed to generate executive summary")?;
        let groups = classifier::group_updates(self.completion, &updates)
            .await
            .context("failed to group weekly updates")?;
        let digest = summarizer::summarize(self.completion, &updates, Style::ChatDigest)
            .await
            .context("failed to generate chat digest")?;

        let date_range = window.date_range(today);
        let html = newsletter::render(&date_range, &executive_summary, &groups);

        Ok(Some(WeeklyDispatch {
            newsletter: Newsletter {
                subject: newsletter::subject(today),
                date_range: date_range.clone(),
                html,
            },
            chat: ChatMessage {
                text: format!("*Weekly Team Digest - {date_range}*\n\n{digest}"),
            },
            groups,
            row_count: updates.len(),
        }))
    }
}

/// Posts a chat message. Failures are logged and swallowed.
pub async fn deliver_chat(sink: &dyn ChatSink, message: &ChatMessage, job: &str) -> bool {
    match sink.post(message).await {
        Ok(()) => true,
        Err(err) => {
            error!(job, error = %err, "failed to post chat message");
            false
        }
    }
}

/// Sends the newsletter. Failures are logged and swallowed.
pub async fn deliver_mail(sink: &dyn MailSink, newsletter: &Newsletter) -> bool {
    match sink.send(newsletter).await {
        Ok(()) => true,
        Err(err) => {
            error!(job = "weekly", error = %err, "failed to send newsletter");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEntry {
    pub label: String,
    pub outcome: AppendOutcome,
}

/// Labels one new entry and appends it to the member's tab. The label is
/// reported back, never stored.
pub async fn log_entry(
    store: &dyn RowStore,
    completion: &dyn Completion,
    settings: &Settings,
    member: &str,
    entry: &NewEntry,
    today: NaiveDate,
) -> anyhow::Result<LoggedEntry> {
    let member = member.trim();
    if !settings.is_member(member) {
        bail!("{member} is not on the team roster");
    }

    let previous = match store.fetch(member).await {
        Ok(rows) => rows,
        Err(StoreError::TabNotFound(_)) => Vec::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read tab for {member}"));
        }
    };

    let signals = RowSignals {
        task: &entry.task,
        notes: &entry.notes,
        days_since_last_update: window::days_since_last_update(&previous, today),
        date: &entry.date,
    };
    let label =
        classifier::classify_row(completion, &signals, settings.classifier_temperature).await;

    let row = WorkLogRow::new(member, entry);
    let outcome = store
        .append(member, &row)
        .await
        .with_context(|| format!("failed to append update for {member}"))?;

    info!(member, label = %label, created_tab = outcome == AppendOutcome::CreatedTab, "update logged");
    Ok(LoggedEntry { label, outcome })
}

/// Owns the collaborators the scheduled jobs need.
pub struct Jobs {
    pub settings: Settings,
    pub store: Box<dyn RowStore>,
    pub completion: Box<dyn Completion>,
    pub chat: Option<Box<dyn ChatSink>>,
    pub mail: Option<Box<dyn MailSink>>,
}

impl Jobs {
    pub fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(self.store.as_ref(), self.completion.as_ref(), &self.settings)
    }

    pub async fn run_daily(&self, today: NaiveDate) -> anyhow::Result<Option<DailyDispatch>> {
        let Some(chat) = self.chat.as_deref() else {
            bail!("GCHAT_WEBHOOK must be set for the daily job");
        };

        let Some(dispatch) = self.pipeline().build_daily(today).await? else {
            return Ok(None);
        };

        if deliver_chat(chat, &dispatch.chat, "daily").await {
            info!(job = "daily", rows = dispatch.row_count, "daily dispatch sent");
        }
        Ok(Some(dispatch))
    }

    pub async fn run_weekly(&self, today: NaiveDate) -> anyhow::Result<Option<WeeklyDispatch>> {
        let Some(mail) = self.mail.as_deref() else {
            bail!("SENDER_EMAIL, SENDER_PASSWORD and RECIPIENT_EMAILS must be set for the weekly job");
        };

        let Some(dispatch) = self.pipeline().build_weekly(today).await? else {
            return Ok(None);
        };

        if deliver_mail(mail, &dispatch.newsletter).await {
            info!(
                job = "weekly",
                rows = dispatch.row_count,
                projects = dispatch.groups.len(),
                "weekly newsletter sent"
            );
        }
        if let Some(chat) = self.chat.as_deref() {
            deliver_chat(chat, &dispatch.chat, "weekly").await;
        }
        Ok(Some(dispatch))
    }
}

#[async_trait]
impl JobRunner for Jobs {
    async fn run_job(&self, kind: JobKind, today: NaiveDate) -> anyhow::Result<()> {
        match kind {
            JobKind::Daily => self.run_daily(today).await.map(|_| ()),
            JobKind::Weekly => self.run_weekly(today).await.map(|_| ()),
        }
    }
}
