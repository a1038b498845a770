//! Outgoing mail collaborator contract.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use crate::error::{Error, Result};

/// A composed report mail, ready for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    /// Extra headers (In-Reply-To, References, Reply-To).
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Message {
    /// Render as an RFC-822 style text message.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("From: {}\n", self.from));
        out.push_str(&format!("To: {}\n", self.to.join(", ")));
        out.push_str(&format!("Subject: {}\n", self.subject));
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\n"));
        }
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

/// Delivery boundary. The pipeline composes the message; how it leaves the
/// machine is the implementation's business.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &Message) -> Result<()>;
}

/// Delivery through the local `sendmail` binary.
pub struct Sendmail {
    binary: String,
}

impl Sendmail {
    pub fn new() -> Self {
        Self {
            binary: "sendmail".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for Sendmail {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for Sendmail {
    async fn send(&self, message: &Message) -> Result<()> {
        info!(to = ?message.to, subject = %message.subject, "sending report mail");

        let mut child = Command::new(&self.binary)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Mail(format!("spawn {}: {e}", self.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Mail("sendmail stdin unavailable".to_string()))?;
        stdin
            .write_all(message.render().as_bytes())
            .await
            .map_err(|e| Error::Mail(format!("write to sendmail: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Mail(format!("wait for sendmail: {e}")))?;
        if !output.status.success() {
            return Err(Error::Mail(format!(
                "sendmail exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_places_headers_before_body() {
        let mut headers = BTreeMap::new();
        headers.insert("In-Reply-To".to_string(), "<m1@example>".to_string());

        let message = Message {
            from: "ci@example.org".to_string(),
            to: vec!["dev@example.org".to_string(), "list@example.org".to_string()],
            subject: "RE: series".to_string(),
            headers,
            body: "Test Summary:\n".to_string(),
        };

        let text = message.render();
        let (head, body) = text.split_once("\n\n").unwrap();
        assert!(head.contains("To: dev@example.org, list@example.org"));
        assert!(head.contains("In-Reply-To: <m1@example>"));
        assert_eq!(body, "Test Summary:\n");
    }
}
