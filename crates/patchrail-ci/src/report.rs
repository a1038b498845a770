//! Run report rendering and mail composition.

use chrono::Utc;

use patchrail_core::{config::EmailConfig, Message, Series, StageStatus};

const PREAMBLE: &str = "\
This is an automated email and please do not reply to this email.

Dear submitter,

Thank you for submitting the patches to the mailing list.
This is the CI test results with your patch series:
PW Link: {link}

---Test result---

";

const CLOSING: &str = "\n---\nRegards,\nThe CI bot\n";

const DETAILS_SEPARATOR: &str = "##############################\n";

/// Render the summary table plus details blocks for non-passing stages.
///
/// Passing stages compact to one summary line; everything else also gets a
/// details block with description, duration and full output.
pub fn render_summary(statuses: &[StageStatus]) -> String {
    let mut summary = String::from("Test Summary:\n");
    let mut details = String::new();

    for status in statuses {
        summary.push_str(&format!(
            "{:<30}{:<10}{:.2} seconds\n",
            status.name(),
            status.verdict().name(),
            status.elapsed().as_secs_f64()
        ));

        if status.verdict().is_pass() {
            continue;
        }

        details.push_str(DETAILS_SEPARATOR);
        details.push_str(&format!(
            "Test: {} - {}\nDesc: {}\nOutput:\n{}\n",
            status.name(),
            status.verdict().name(),
            status.description(),
            status.output().unwrap_or_default()
        ));
    }

    if details.is_empty() {
        summary
    } else {
        format!("{summary}\nDetails\n{details}")
    }
}

/// Compose the report mail for a finished run.
pub fn compose_report(
    email: &EmailConfig,
    series: &Series,
    content: &str,
) -> Message {
    let mut message = Message {
        from: email.from.clone(),
        to: receivers(email, &series.submitter.email),
        subject: format!("RE: {}", series.name),
        headers: Default::default(),
        body: format!(
            "{}{}{}",
            PREAMBLE.replace("{link}", &series.web_url),
            content,
            CLOSING
        ),
    };

    if let Some(first) = series.first_patch() {
        message
            .headers
            .insert("In-Reply-To".to_string(), first.message_id.clone());
        message
            .headers
            .insert("References".to_string(), first.message_id.clone());
    }
    if !email.only_maintainers {
        message
            .headers
            .insert("Reply-To".to_string(), email.default_to.clone());
    }
    message
        .headers
        .insert("Date".to_string(), Utc::now().to_rfc2822());

    message
}

/// The report's recipients: the maintainers alone, or the list plus the
/// series submitter.
fn receivers(email: &EmailConfig, submitter: &str) -> Vec<String> {
    if email.only_maintainers {
        email.maintainers.clone()
    } else {
        vec![email.default_to.clone(), submitter.to_string()]
    }
}
