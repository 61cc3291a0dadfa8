//! Webhook notification after runs that found new vacancies.
//!
//! Delivery is best-effort: failures are logged and never fail the run.

use std::time::Duration;

use crate::scrape::ScrapeReport;

const NOTIFY_ITEM_CAP: usize = 5;
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Compose the message text for a run summary.
pub fn format_message(report: &ScrapeReport) -> String {
    let mut msg = format!("{} new vacancies\n", report.run.new_count);
    for v in report.new_vacancies.iter().take(NOTIFY_ITEM_CAP) {
        msg.push_str(&format!(
            "- {} - {} @ {} ({:.0} SEK)\n",
            v.title, v.profession, v.municipality, v.procured_amount
        ));
    }
    msg
}

/// POST `{"text": ...}` to the webhook. No-op when the run found nothing
/// new.
pub async fn send_run_notice(webhook_url: &str, report: &ScrapeReport) {
    if report.run.new_count == 0 {
        return;
    }

    let body = serde_json::json!({ "text": format_message(report) });
    let client = match reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build() {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(error = %err, "could not build webhook client");
            return;
        }
    };

    match client.post(webhook_url).json(&body).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!("webhook notification delivered");
        }
        Ok(resp) => {
            tracing::warn!(status = %resp.status(), "webhook rejected notification");
        }
        Err(err) => {
            tracing::warn!(error = %err, "webhook notification failed");
        }
    }
}
