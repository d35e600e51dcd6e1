use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono_tz::Tz;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-120b";
pub const DEFAULT_STORE_NAME: &str = "Daily Tracker";
pub const DEFAULT_DAILY_CRON: &str = "35 14 * * *";
pub const DEFAULT_WEEKLY_CRON: &str = "25 17 * * Sun";
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";
pub const DEFAULT_WEEKLY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub sender: Option<String>,
    pub password: Option<String>,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub completion_api_key: Option<String>,
    pub completion_base_url: String,
    pub completion_model: String,
    pub completion_timeout: Duration,
    pub classifier_temperature: f64,
    pub label_match_threshold: Option<f64>,
    pub webhook_url: Option<String>,
    pub store_name: String,
    pub database_url: Option<String>,
    pub store_dir: Option<PathBuf>,
    pub smtp: SmtpSettings,
    pub roster: Vec<String>,
    pub weekly_window_days: i64,
    pub timezone: Tz,
    pub daily_cron: String,
    pub weekly_cron: String,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let roster = match (get("TEAM_ROSTER"), get("TEAM_ROSTER_FILE")) {
            (Some(list), _) => parse_list(&list),
            (None, Some(path)) => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read TEAM_ROSTER_FILE {path}"))?;
                parse_roster_file(&contents)
            }
            (None, None) => Vec::new(),
        };

        let timezone_name = get("SCHEDULE_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid SCHEDULE_TIMEZONE {timezone_name}"))?;

        let label_match_threshold = get("LABEL_MATCH_THRESHOLD")
            .map(|value| parse_number::<f64>("LABEL_MATCH_THRESHOLD", &value))
            .transpose()?;
        if let Some(threshold) = label_match_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                bail!("LABEL_MATCH_THRESHOLD must be between 0 and 1, got {threshold}");
            }
        }

        Ok(Self {
            completion_api_key: get("GROQ_API_KEY"),
            completion_base_url: get("COMPLETION_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            completion_model: get("COMPLETION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            completion_timeout: Duration::from_secs(
                get("COMPLETION_TIMEOUT_SECONDS")
                    .map(|value| parse_number::<u64>("COMPLETION_TIMEOUT_SECONDS", &value))
                    .transpose()?
                    .unwrap_or(120),
            ),
            classifier_temperature: get("CLASSIFIER_TEMPERATURE")
                .map(|value| parse_number::<f64>("CLASSIFIER_TEMPERATURE", &value))
                .transpose()?
                .unwrap_or(0.2),
            label_match_threshold,
            webhook_url: get("GCHAT_WEBHOOK"),
            store_name: get("SHEET_NAME").unwrap_or_else(|| DEFAULT_STORE_NAME.to_string()),
            database_url: get("DATABASE_URL"),
            store_dir: get("ROW_STORE_DIR").map(PathBuf::from),
            smtp: SmtpSettings {
                host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                port: get("SMTP_PORT")
                    .map(|value| parse_number::<u16>("SMTP_PORT", &value))
                    .transpose()?
                    .unwrap_or(465),
                sender: get("SENDER_EMAIL"),
                password: get("SENDER_PASSWORD"),
                recipients: get("RECIPIENT_EMAILS")
                    .map(|value| parse_list(&value))
                    .unwrap_or_default(),
            },
            roster,
            weekly_window_days: get("WEEKLY_WINDOW_DAYS")
                .map(|value| parse_number::<i64>("WEEKLY_WINDOW_DAYS", &value))
                .transpose()?
                .unwrap_or(DEFAULT_WEEKLY_WINDOW_DAYS)
                .max(1),
            timezone,
            daily_cron: get("DAILY_CRON").unwrap_or_else(|| DEFAULT_DAILY_CRON.to_string()),
            weekly_cron: get("WEEKLY_CRON").unwrap_or_else(|| DEFAULT_WEEKLY_CRON.to_string()),
        })
    }

    /// Commands that read or write member tabs need a non-empty roster.
    pub fn require_roster(&self) -> anyhow::Result<&[String]> {
        if self.roster.is_empty() {
            bail!("TEAM_ROSTER or TEAM_ROSTER_FILE must name at least one member");
        }
        Ok(&self.roster)
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.roster.iter().any(|member| member == name.trim())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} is not a valid number: {value}"))
}

/// Comma-separated list, trimmed, blanks dropped, first occurrence kept.
pub fn parse_list(value: &str) -> Vec<String> {
    dedupe(value.split(','))
}

/// One name per line; `#` starts a comment.
pub fn parse_roster_file(contents: &str) -> Vec<String> {
    dedupe(
        contents
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default()),
    )
}

fn dedupe<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items.map(str::trim).filter(|item| !item.is_empty()) {
        if !out.iter().any(|existing| existing == item) {
            out.push(item.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_roster_is_set() {
        let settings = settings(&[("TEAM_ROSTER", "Avery, Blake")]).unwrap();

        assert_eq!(settings.roster, vec!["Avery", "Blake"]);
        assert_eq!(settings.completion_model, DEFAULT_MODEL);
        assert_eq!(settings.store_name, "Daily Tracker");
        assert_eq!(settings.weekly_window_days, 7);
        assert_eq!(settings.smtp.port, 465);
        assert_eq!(settings.timezone, chrono_tz::Asia::Kolkata);
        assert!(settings.label_match_threshold.is_none());
        assert!(settings.smtp.recipients.is_empty());
    }

    #[test]
    fn roster_is_only_required_on_demand() {
        let bare = settings(&[]).unwrap();
        assert!(bare.roster.is_empty());
        assert!(bare.require_roster().is_err());
        assert!(settings(&[("TEAM_ROSTER", " , ,")]).unwrap().require_roster().is_err());

        let team = settings(&[("TEAM_ROSTER", "Avery")]).unwrap();
        assert_eq!(team.require_roster().unwrap(), ["Avery".to_string()]);
    }

    #[test]
    fn roster_file_is_read_when_list_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team.txt");
        std::fs::write(&path, "# core team\nAvery\n\nBlake  # on loan\nAvery\n").unwrap();

        let settings = settings(&[("TEAM_ROSTER_FILE", path.to_str().unwrap())]).unwrap();
        assert_eq!(settings.roster, vec!["Avery", "Blake"]);
    }

    #[test]
    fn recipients_ignore_blanks() {
        let settings = settings(&[
            ("TEAM_ROSTER", "Avery"),
            ("RECIPIENT_EMAILS", "lead@example.com, ,pm@example.com,"),
        ])
        .unwrap();
        assert_eq!(settings.smtp.recipients, vec!["lead@example.com", "pm@example.com"]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(settings(&[("TEAM_ROSTER", "Avery"), ("SMTP_PORT", "ssl")]).is_err());
        assert!(settings(&[("TEAM_ROSTER", "Avery"), ("SCHEDULE_TIMEZONE", "Mars/Base")]).is_err());
        assert!(settings(&[("TEAM_ROSTER", "Avery"), ("LABEL_MATCH_THRESHOLD", "1.5")]).is_err());
    }

    #[test]
    fn membership_check_trims_input() {
        let settings = settings(&[("TEAM_ROSTER", "Avery,Blake")]).unwrap();
        assert!(settings.is_member(" Blake "));
        assert!(!settings.is_member("blake"));
    }
}
