use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::ProjectGroup;
use crate::window::format_log_date;

pub fn subject(today: NaiveDate) -> String {
    format!("Weekly Team Digest - {}", format_log_date(today))
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the weekly newsletter body.
pub fn render(date_range: &str, executive_summary: &str, project_summaries: &[ProjectGroup]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "<!DOCTYPE html>");
    let _ = writeln!(output, "<html>");
    let _ = writeln!(output, "<head><meta charset=\"utf-8\"><title>Weekly Team Digest</title></head>");
    let _ = writeln!(
        output,
        "<body style=\"font-family: Arial, sans-serif; color: #222; max-width: 680px; margin: 0 auto;\">"
    );
    let _ = writeln!(output, "<h1 style=\"margin-bottom: 4px;\">Weekly Team Digest</h1>");
    let _ = writeln!(
        output,
        "<p style=\"color: #666; margin-top: 0;\">{}</p>",
        escape_html(date_range)
    );

    let _ = writeln!(output, "<h2>Executive Summary</h2>");
    for paragraph in executive_summary
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let _ = writeln!(output, "<p>{}</p>", escape_html(paragraph));
    }

    let _ = writeln!(output, "<h2>Projects</h2>");
    if project_summaries.is_empty() {
        let _ = writeln!(output, "<p>No project activity recorded for this window.</p>");
    }

    for project in project_summaries {
        let _ = writeln!(
            output,
            "<div style=\"border-left: 4px solid #3b6ea5; padding-left: 12px; margin-bottom: 18px;\">"
        );
        let _ = writeln!(output, "<h3 style=\"margin-bottom: 4px;\">{}</h3>", escape_html(&project.name));
        if !project.team_members.is_empty() {
            let _ = writeln!(
                output,
                "<p style=\"color: #666; margin-top: 0;\">Team: {}</p>",
                escape_html(&project.team_members.join(", "))
            );
        }
        let _ = writeln!(output, "<ul>");
        for task in &project.tasks {
            let _ = writeln!(output, "<li>{}</li>", escape_html(task));
        }
        let _ = writeln!(output, "</ul>");
        let _ = writeln!(output, "</div>");
    }

    let _ = writeln!(output, "</body>");
    let _ = writeln!(output, "</html>");

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups() -> Vec<ProjectGroup> {
        vec![
            ProjectGroup {
                name: "Data Platform".to_string(),
                tasks: vec!["Shipped ingest retries".to_string()],
                team_members: vec!["Avery".to_string(), "Casey".to_string()],
            },
            ProjectGroup {
                name: "R&D <Labs>".to_string(),
                tasks: vec!["Prototype \"fast path\"".to_string()],
                team_members: vec![],
            },
        ]
    }

    #[test]
    fn binds_range_summary_and_projects() {
        let html = render("03-Jan-2025 - 10-Jan-2025", "Good week.\n\nMore next week.", &groups());

        assert!(html.contains("03-Jan-2025 - 10-Jan-2025"));
        assert!(html.contains("<p>Good week.</p>"));
        assert!(html.contains("<p>More next week.</p>"));
        assert!(html.contains("<h3 style=\"margin-bottom: 4px;\">Data Platform</h3>"));
        assert!(html.contains("Team: Avery, Casey"));
        assert!(html.contains("<li>Shipped ingest retries</li>"));
    }

    #[test]
    fn model_text_is_escaped() {
        let html = render("range", "<script>alert(1)</script>", &groups());

        assert!(!html.contains("<script>"));
        assert!(html.contains("R&amp;D &lt;Labs&gt;"));
        assert!(html.contains("Prototype &quot;fast path&quot;"));
    }

    #[test]
    fn empty_projects_render_placeholder() {
        let html = render("range", "Quiet week.", &[]);
        assert!(html.contains("No project activity recorded"));
    }

    #[test]
    fn subject_includes_date() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(subject(today), "Weekly Team Digest - 10-Jan-2025");
    }
}
