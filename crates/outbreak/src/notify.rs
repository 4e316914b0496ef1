use std::fmt::Display;
use std::future::Future;

use reqwest::{Client, RequestBuilder};

use crate::config::TelegramConfig;
use crate::types::AnnotatedRecord;

/// Telegram rejects messages longer than this.
pub const MESSAGE_LIMIT: usize = 4096;

const REGION_WIDTH: usize = 18;
const CHANGED_MARKER: &str = "• ";
const UNCHANGED_MARKER: &str = "  ";

/// Fixed column width per metric, so columns line up across messages as counts grow.
fn metric_width(name: &str) -> usize {
    match name {
        "cases" => 9,
        "death" | "cured" => 7,
        _ => 8,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Delivers rendered messages. Delivery is best-effort and never fails the caller.
pub trait Notifier {
    /// Sends `text` to the fault channel when `fault` is set, otherwise to the primary channel.
    fn send(&self, text: &str, fault: bool) -> impl Future<Output = ()> + Send;
}

/// One line per region: change marker, padded region, then each value with its direction suffix.
pub fn report_lines(records: &[AnnotatedRecord]) -> Vec<String> {
    records.iter().map(report_line).collect()
}

fn report_line(record: &AnnotatedRecord) -> String {
    let mut line = String::from(if record.changed {
        CHANGED_MARKER
    } else {
        UNCHANGED_MARKER
    });

    push_column(&mut line, &escape_html(&record.region), REGION_WIDTH);
    for metric in &record.metrics {
        push_column(&mut line, &metric.to_string(), metric_width(&metric.name));
    }

    line.truncate(line.trim_end().len());
    line
}

fn push_column(line: &mut String, cell: &str, width: usize) {
    line.push_str(&format!("{:<width$}", cell));
    if cell.chars().count() >= width {
        line.push(' ');
    }
}

/// The whole report as a single preformatted block.
pub fn render_report(records: &[AnnotatedRecord]) -> String {
    format!("<pre>{}</pre>", report_lines(records).join("\n"))
}

/// The report split into preformatted blocks of at most `limit` characters, breaking between lines.
pub fn render_pages(records: &[AnnotatedRecord], limit: usize) -> Vec<String> {
    const WRAPPER: usize = "<pre></pre>".len();

    let mut pages = Vec::new();
    let mut page: Vec<String> = Vec::new();
    let mut size = WRAPPER;

    for line in report_lines(records) {
        let len = line.chars().count() + 1;
        if !page.is_empty() && size + len > limit {
            pages.push(format!("<pre>{}</pre>", page.join("\n")));
            page.clear();
            size = WRAPPER;
        }
        size += len;
        page.push(line);
    }

    if !page.is_empty() {
        pages.push(format!("<pre>{}</pre>", page.join("\n")));
    }
    pages
}

pub fn render_fault(error: &impl Display) -> String {
    format!("<strong>Error: </strong>{}", escape_html(&error.to_string()))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Bot API client posting to a primary chat and a separate fault chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    group_chat: String,
    fault_chat: String,
    silent: bool,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            group_chat: config.group_chat.clone(),
            fault_chat: config.fault_chat.clone(),
            silent: config.silent,
        })
    }

    /// `sendMessage` as a form POST, so long reports stay out of the URL.
    fn send_message(&self, chat_id: &str, text: &str) -> RequestBuilder {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let silent = if self.silent { "true" } else { "false" };

        self.client.post(url).form(&[
            ("chat_id", chat_id),
            ("text", text),
            ("parse_mode", "HTML"),
            ("disable_notification", silent),
        ])
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str, fault: bool) {
        let (kind, chat_id) = if fault {
            ("fault", &self.fault_chat)
        } else {
            ("update", &self.group_chat)
        };

        let response = self
            .send_message(chat_id, text)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        // The URL carries the bot token, keep it out of the logs.
        match response {
            Ok(_) => log::info!("Sent {} message to chat {}", kind, chat_id),
            Err(e) => log::warn!("Failed to send {} message: {}", kind, e.without_url()),
        }
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, text: &str, fault: bool) {
        if fault {
            log::warn!("Fault report:\n{}", text);
        } else {
            log::info!("Update report:\n{}", text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::types::{Metrics, RegionRecord, Snapshot};
    use std::time::Duration;

    fn snapshot(records: &[(&str, u64, u64)]) -> Snapshot {
        Snapshot::new(
            records
                .iter()
                .map(|(r, c, d)| {
                    RegionRecord::new(
                        *r,
                        Metrics::from_iter([("cases", *c), ("death", *d)]),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_report_line_for_single_increase() {
        let previous = snapshot(&[("A", 10, 1)]);
        let current = snapshot(&[("A", 15, 1)]);

        let report = render_report(&diff(Some(&previous), &current));

        assert_eq!(report, "<pre>• A                 15+      1</pre>");
    }

    #[test]
    fn test_report_marks_only_changed_lines() {
        let previous = snapshot(&[("China", 14380, 304), ("Japan", 20, 0)]);
        let current = snapshot(&[("China", 14380, 300), ("Japan", 20, 0)]);

        let lines = report_lines(&diff(Some(&previous), &current));

        assert_eq!(lines[0], "• China             14380    300-");
        assert_eq!(lines[1], "  Japan             20       0");
    }

    #[test]
    fn test_columns_do_not_depend_on_values() {
        let current = snapshot(&[("China", 1_234_567, 5_000), ("Italy", 3, 0)]);
        let lines = report_lines(&diff(None, &current));

        let death_column =
            |line: &str| line.chars().skip(2 + REGION_WIDTH + 9).collect::<String>();
        assert_eq!(death_column(&lines[0]), "5000");
        assert_eq!(death_column(&lines[1]), "0");
    }

    #[test]
    fn test_overflowing_cells_stay_separated() {
        let current = snapshot(&[("United Arab Emirates", 123_456_789, 2)]);
        let lines = report_lines(&diff(None, &current));

        assert_eq!(lines[0], "• United Arab Emirates 123456789 2");
    }

    #[test]
    fn test_region_names_are_escaped() {
        let current = snapshot(&[("Trinidad & Tobago", 1, 0)]);
        let report = render_report(&diff(None, &current));
        assert!(report.contains("Trinidad &amp; Tobago"));
    }

    #[test]
    fn test_render_fault() {
        let message = render_fault(&"Only 3 region(s) extracted, expected at least 10");
        assert_eq!(
            message,
            "<strong>Error: </strong>Only 3 region(s) extracted, expected at least 10"
        );
        assert_eq!(
            render_fault(&"<tr> missing"),
            "<strong>Error: </strong>&lt;tr&gt; missing"
        );
    }

    #[test]
    fn test_pages_split_between_lines() {
        let regions: Vec<(String, u64, u64)> = (0..300)
            .map(|i| (format!("Region {}", i), 1000 - i, 0))
            .collect();
        let borrowed: Vec<(&str, u64, u64)> =
            regions.iter().map(|(r, c, d)| (r.as_str(), *c, *d)).collect();
        let annotated = diff(None, &snapshot(&borrowed));

        let pages = render_pages(&annotated, MESSAGE_LIMIT);

        assert!(pages.len() > 1);
        assert!(pages.iter().all(|p| p.chars().count() <= MESSAGE_LIMIT));
        assert!(pages.iter().all(|p| p.starts_with("<pre>") && p.ends_with("</pre>")));
        let total: usize = pages.iter().map(|p| p.lines().count()).sum();
        assert_eq!(total, 300);
    }

    #[test]
    fn test_small_report_is_one_page() {
        let annotated = diff(None, &snapshot(&[("A", 1, 0)]));
        assert_eq!(
            render_pages(&annotated, MESSAGE_LIMIT),
            vec![render_report(&annotated)]
        );
    }

    #[test]
    fn test_send_message_posts_form() {
        let notifier = TelegramNotifier::new(&TelegramConfig {
            token: "123:abc".to_string(),
            group_chat: "@outbreak".to_string(),
            fault_chat: "-100200".to_string(),
            silent: true,
            api_base: "https://api.telegram.org/".to_string(),
            timeout: Duration::from_secs(10),
        })
        .expect("client");

        let request = notifier
            .send_message("@outbreak", "<pre>A 1</pre>")
            .build()
            .expect("request");

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/bot123:abc/sendMessage");
        assert_eq!(request.url().query(), None);

        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .expect("form body");
        assert_eq!(
            std::str::from_utf8(body).expect("utf-8"),
            "chat_id=%40outbreak&text=%3Cpre%3EA+1%3C%2Fpre%3E&parse_mode=HTML&disable_notification=true"
        );
    }
}
