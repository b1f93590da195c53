//! The report session: title, intro, issue date, and disclaimer that
//! head every report produced by one `Reporter::build` call, plus the
//! `<YYYYMMDD-HHMM-sanitized-title>-` filename prefix derived from them.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ReportSession {
    pub title: String,
    pub intro: Option<String>,
    pub issued: DateTime<Utc>,
    /// A playbook-relative path, `"none"`, or empty/absent to skip.
    pub disclaimer_template: Option<String>,
}

impl ReportSession {
    #[must_use]
    pub fn prefix(&self) -> String {
        format!("{}-{}-", self.issued.format("%Y%m%d-%H%M"), sanitize_title(&self.title))
    }

    #[must_use]
    pub fn header(&self, disclaimer_text: Option<&str>) -> String {
        let mut out = format!("# {}\n\n**Issued:** {}\n", self.title, self.issued.format("%Y-%m-%d"));
        if let Some(intro) = self.intro.as_deref().filter(|s| !s.is_empty()) {
            out.push('\n');
            out.push_str(intro);
            out.push('\n');
        }
        if let Some(disclaimer) = disclaimer_text.filter(|s| !s.is_empty()) {
            out.push('\n');
            out.push_str(disclaimer);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_was_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prefix_sanitizes_and_lowercases_the_title() {
        let session = ReportSession {
            title: "Q3 Security Review!!".to_string(),
            intro: None,
            issued: Utc.with_ymd_and_hms(2026, 7, 28, 14, 5, 0).unwrap(),
            disclaimer_template: None,
        };
        assert_eq!(session.prefix(), "20260728-1405-q3-security-review-");
    }

    #[test]
    fn header_includes_intro_and_disclaimer_when_present() {
        let session = ReportSession {
            title: "Nightly Run".to_string(),
            intro: Some("Automated summary.".to_string()),
            issued: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 0).unwrap(),
            disclaimer_template: None,
        };
        let header = session.header(Some("Not legal advice."));
        assert!(header.contains("# Nightly Run"));
        assert!(header.contains("**Issued:** 2026-01-02"));
        assert!(header.contains("Automated summary."));
        assert!(header.contains("Not legal advice."));
    }
}
