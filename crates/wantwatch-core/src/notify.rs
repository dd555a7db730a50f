//! One consolidated message per run, sent to every configured channel.

use std::fmt::Write as _;
use std::io;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{error, info};

use crate::error::ErrorCode;
use crate::model::IncreasedItem;

/// A composed notification, usable as an e-mail (subject + body) or as a
/// single webhook text (body only; the body repeats the subject).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Build the message for `increased`, or `None` when nothing increased.
#[must_use]
pub fn compose(increased: &[IncreasedItem], now: DateTime<FixedOffset>) -> Option<Message> {
    if increased.is_empty() {
        return None;
    }

    let subject = format!(
        "{} New listings ({})",
        now.format("%Y-%m-%d %H:%M"),
        increased.len()
    );

    let mut body = subject.clone();
    body.push('\n');
    for (idx, entry) in increased.iter().enumerate() {
        if idx > 0 {
            body.push_str("\n\n");
        }
        let _ = write!(
            body,
            "{} - {}\n{}\nFor sale: {} (previous: {})",
            entry.item.artist_line(),
            entry.item.title,
            entry.item.url,
            entry.current,
            entry.previous
        );
    }

    Some(Message { subject, body })
}

/// Delivery failure of a single channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected with status {0}")]
    Rejected(u16),
    #[error("mail relay failed: {0}")]
    Relay(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ChannelError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ChannelFailure
    }
}

/// A notification sink (e-mail relay, chat webhook, ...).
pub trait Channel {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    fn send(&self, message: &Message) -> Result<(), ChannelError>;
}

/// Outcome of sending to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Delivery {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-channel results of one dispatch, in channel order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub deliveries: Vec<Delivery>,
}

impl DispatchReport {
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.delivered()
    }
}

/// Send `message` to every channel. A failing channel is logged and skipped;
/// it never prevents delivery to the others.
pub fn dispatch(message: &Message, channels: &[&dyn Channel]) -> DispatchReport {
    let mut report = DispatchReport::default();

    for channel in channels {
        let delivery = match channel.send(message) {
            Ok(()) => {
                info!(channel = channel.name(), "notification sent");
                Delivery {
                    channel: channel.name().to_string(),
                    error: None,
                }
            }
            Err(err) => {
                error!(
                    channel = channel.name(),
                    code = %err.code(),
                    error = %err,
                    "notification channel failed"
                );
                Delivery {
                    channel: channel.name().to_string(),
                    error: Some(err.to_string()),
                }
            }
        };
        report.deliveries.push(delivery);
    }

    report
}
