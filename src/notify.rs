// src/notify.rs

//! Job-level notification emails.
//!
//! Success summaries go to `mail_to`; failure and cancel summaries go
//! to the union of `mail_to` and `mail_to_fail`. A notifier failure is
//! logged and never changes the job outcome.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::engine::JobOutcome;
use crate::exec::step_runner::split_recipients;
use crate::mail::{MailMessage, Mailer};
use crate::vars::VarEnv;

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    mail_to: String,
    mail_to_fail: String,
    mail_from: String,
    hostname: String,
    config_file: String,
    send_success: bool,
    send_start_notice: bool,
}

impl Notifier {
    pub fn from_env(
        mailer: Arc<dyn Mailer>,
        env: &VarEnv,
        config_file: &str,
        send_success: bool,
    ) -> Self {
        let send_start_notice = env
            .get("mail_start_notice")
            .map(is_truthy)
            .unwrap_or(false);

        Self {
            mailer,
            mail_to: env.get("mail_to").unwrap_or_default().to_string(),
            mail_to_fail: env.get("mail_to_fail").unwrap_or_default().to_string(),
            mail_from: env.get("mail_from").unwrap_or_default().to_string(),
            hostname: env.get("hostname").unwrap_or_default().to_string(),
            config_file: config_file.to_string(),
            send_success,
            send_start_notice,
        }
    }

    /// Optional start notice, gated on the `mail_start_notice` variable.
    pub async fn job_started(&self) {
        if !self.send_start_notice {
            return;
        }
        let subject = format!(
            "{} : Job {} started",
            self.hostname, self.config_file
        );
        let body = format!(
            "Job {} started on {} at {}",
            self.config_file,
            self.hostname,
            crate::summary::format_date(chrono::Local::now())
        );
        self.dispatch(split_recipients(&self.mail_to), subject, body)
            .await;
    }

    /// Final summary email per the outcome rules.
    pub async fn job_finished(&self, outcome: JobOutcome, report_text: &str) {
        if outcome == JobOutcome::Success && !self.send_success {
            debug!("success email suppressed");
            return;
        }

        let mut recipients = split_recipients(&self.mail_to);
        if outcome != JobOutcome::Success {
            for addr in split_recipients(&self.mail_to_fail) {
                if !recipients.contains(&addr) {
                    recipients.push(addr);
                }
            }
        }

        let subject = format!(
            "{} : Job {} completed with {}",
            self.hostname, self.config_file, outcome
        );
        self.dispatch(recipients, subject, report_text.to_string())
            .await;
    }

    async fn dispatch(&self, to: Vec<String>, subject: String, body: String) {
        if to.is_empty() {
            warn!("no recipients for notification email; skipping");
            return;
        }
        let message = MailMessage {
            to,
            from: self.mail_from.clone(),
            subject,
            body,
        };
        match self.mailer.send(message).await {
            Ok(()) => info!("notification email sent"),
            Err(err) => warn!(error = %err, "failed to send notification email"),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
