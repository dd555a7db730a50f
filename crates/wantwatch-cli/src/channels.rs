//! Notification transports: chat webhook, SMTP, and sendmail-compatible relay.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message as Email, SmtpTransport, Transport};
use serde_json::json;
use wantwatch_core::config::{EmailConfig, EmailTransport, WatchConfig};
use wantwatch_core::notify::{Channel, ChannelError, Message};

/// Discord rejects `content` longer than this many characters.
const WEBHOOK_CONTENT_LIMIT: usize = 2_000;
const TRUNCATION_MARKER: &str = "\n…";

/// Port on which SMTP relays expect implicit TLS.
const SMTPS_PORT: u16 = 465;

const RELAY_POLL: Duration = Duration::from_millis(20);
/// How long to wait for the relay's stderr once it has exited.
const STDERR_GRACE: Duration = Duration::from_millis(200);

/// Posts `{"content": body}` to a Discord-style webhook.
pub struct WebhookChannel {
    agent: ureq::Agent,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
        }
    }
}

fn truncate_content(body: &str) -> String {
    if body.chars().count() <= WEBHOOK_CONTENT_LIMIT {
        return body.to_string();
    }
    let keep = WEBHOOK_CONTENT_LIMIT - TRUNCATION_MARKER.chars().count();
    let mut out: String = body.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let payload = json!({ "content": truncate_content(&message.body) });
        match self.agent.post(&self.url).send_json(payload) {
            Ok(response) if (200..300).contains(&response.status()) => Ok(()),
            Ok(response) => Err(ChannelError::Rejected(response.status())),
            Err(ureq::Error::Status(code, _)) => Err(ChannelError::Rejected(code)),
            Err(ureq::Error::Transport(transport)) => {
                Err(ChannelError::Transport(transport.to_string()))
            }
        }
    }
}

/// Authenticated SMTP submission. Port 465 uses implicit TLS, any other port
/// upgrades with STARTTLS.
pub struct SmtpChannel {
    mailer: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpChannel {
    pub fn new(config: &EmailConfig, timeout: Duration) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid notify.email.from '{}'", config.from))?;
        let to: Mailbox = config
            .to
            .parse()
            .with_context(|| format!("invalid notify.email.to '{}'", config.to))?;

        let builder = if config.smtp_port == SMTPS_PORT {
            SmtpTransport::relay(&config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&config.smtp_host)
        }
        .with_context(|| format!("invalid notify.email.smtp_host '{}'", config.smtp_host))?;

        let mut builder = builder.port(config.smtp_port).timeout(Some(timeout));
        if let Some(password) = &config.password {
            builder = builder.credentials(Credentials::new(
                config.smtp_login().to_string(),
                password.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
            to,
        })
    }

    fn build_email(&self, message: &Message) -> Result<Email, ChannelError> {
        Email::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|err| ChannelError::Relay(format!("could not build message: {err}")))
    }
}

impl Channel for SmtpChannel {
    fn name(&self) -> &str {
        "smtp"
    }

    fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let email = self.build_email(message)?;
        self.mailer
            .send(&email)
            .map(|_| ())
            .map_err(|err| ChannelError::Relay(err.to_string()))
    }
}

/// Pipes an RFC 5322 message into a sendmail-compatible program
/// (`sendmail -t -i`, `msmtp -t`, ...). Relay credentials live in the
/// program's own configuration.
pub struct SendmailChannel {
    config: EmailConfig,
    timeout: Duration,
}

impl SendmailChannel {
    pub const fn new(config: EmailConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn render(&self, message: &Message) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=UTF-8\r\n\
             Content-Transfer-Encoding: 8bit\r\n\r\n{}\r\n",
            header_value(&self.config.from),
            header_value(&self.config.to),
            header_value(&message.subject),
            message.body.replace('\n', "\r\n")
        )
    }

    fn timed_out(&self) -> ChannelError {
        ChannelError::Relay(format!(
            "{} timed out after {:?}",
            self.config.command, self.timeout
        ))
    }
}

/// Header values must stay on one line.
fn header_value(raw: &str) -> String {
    raw.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

impl Channel for SendmailChannel {
    fn name(&self) -> &str {
        "sendmail"
    }

    fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let deadline = Instant::now() + self.timeout;
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        // Writer and stderr reader run detached so the deadline below bounds
        // the whole exchange. Dropping stdin at the end signals end of message.
        let (written_tx, written_rx) = mpsc::channel();
        if let Some(mut stdin) = child.stdin.take() {
            let payload = self.render(message).into_bytes();
            thread::spawn(move || {
                let _ = written_tx.send(stdin.write_all(&payload));
            });
        }

        let (stderr_tx, stderr_rx) = mpsc::channel();
        if let Some(mut pipe) = child.stderr.take() {
            thread::spawn(move || {
                let mut captured = String::new();
                let _ = pipe.read_to_string(&mut captured);
                let _ = stderr_tx.send(captured);
            });
        }

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.timed_out());
            }
            thread::sleep(RELAY_POLL);
        };

        if !status.success() {
            let stderr = stderr_rx.recv_timeout(STDERR_GRACE).unwrap_or_default();
            return Err(ChannelError::Relay(format!(
                "{} ({status}): {}",
                self.config.command,
                stderr.trim()
            )));
        }

        // A relay that exits 0 without taking the whole message did not send it.
        match written_rx.recv_timeout(STDERR_GRACE) {
            Ok(Err(err)) => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Channels configured in `config`: e-mail first, then the webhook.
pub fn from_config(config: &WatchConfig) -> Result<Vec<Box<dyn Channel>>> {
    let timeout = config.http_timeout();
    let mut channels: Vec<Box<dyn Channel>> = Vec::new();
    if let Some(email) = &config.notify.email {
        match email.transport {
            EmailTransport::Smtp => channels.push(Box::new(SmtpChannel::new(email, timeout)?)),
            EmailTransport::Sendmail => {
                channels.push(Box::new(SendmailChannel::new(email.clone(), timeout)));
            }
        }
    }
    if let Some(webhook) = &config.notify.webhook {
        channels.push(Box::new(WebhookChannel::new(webhook.url.clone(), timeout)));
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wantwatch_core::config::WebhookConfig;

    fn message() -> Message {
        Message {
            subject: "2026-10-19 07:30 New listings (1)".to_string(),
            body: "2026-10-19 07:30 New listings (1)\nA - B\nhttps://x/1\nFor sale: 2 (previous: 1)"
                .to_string(),
        }
    }

    fn email(command: &str, args: &[&str]) -> EmailConfig {
        EmailConfig {
            from: "bot@example.com".to_string(),
            to: "me@example.com".to_string(),
            transport: EmailTransport::Sendmail,
            command: command.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            ..EmailConfig::default()
        }
    }

    fn smtp(host: &str, port: u16) -> EmailConfig {
        EmailConfig {
            transport: EmailTransport::Smtp,
            smtp_host: host.to_string(),
            smtp_port: port,
            password: Some("app-password".to_string()),
            ..email("sendmail", &[])
        }
    }

    #[test]
    fn short_bodies_are_not_truncated() {
        assert_eq!(truncate_content("hello"), "hello");
    }

    #[test]
    fn long_bodies_are_cut_to_the_limit() {
        let long = "x".repeat(5_000);
        let cut = truncate_content(&long);
        assert_eq!(cut.chars().count(), WEBHOOK_CONTENT_LIMIT);
        assert!(cut.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn rendered_mail_has_headers_and_crlf_body() {
        let channel = SendmailChannel::new(email("sendmail", &[]), Duration::from_secs(1));
        let rendered = channel.render(&message());

        assert!(rendered.starts_with("From: bot@example.com\r\nTo: me@example.com\r\n"));
        assert!(rendered.contains("Subject: 2026-10-19 07:30 New listings (1)\r\n"));
        assert!(rendered.contains("\r\n\r\n2026-10-19 07:30 New listings (1)\r\nA - B\r\n"));
    }

    #[test]
    fn header_values_cannot_inject_lines() {
        assert_eq!(header_value("a\r\nBcc: evil@example.com"), "aBcc: evil@example.com");
    }

    #[cfg(unix)]
    #[test]
    fn relay_exit_status_decides_success() {
        let ok = SendmailChannel::new(email("sh", &["-c", "cat >/dev/null"]), Duration::from_secs(5));
        ok.send(&message()).expect("relay accepts");

        let failing = SendmailChannel::new(
            email("sh", &["-c", "cat >/dev/null; echo refused >&2; exit 3"]),
            Duration::from_secs(5),
        );
        let err = failing.send(&message()).expect_err("relay refuses");
        assert!(err.to_string().contains("refused"));
    }

    #[cfg(unix)]
    #[test]
    fn slow_relay_is_killed_after_timeout() {
        let slow = SendmailChannel::new(
            email("sh", &["-c", "cat >/dev/null; sleep 5"]),
            Duration::from_millis(100),
        );
        let err = slow.send(&message()).expect_err("timeout");
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn relay_that_never_reads_cannot_outlast_the_timeout() {
        let stuck = SendmailChannel::new(
            email("sh", &["-c", "sleep 20"]),
            Duration::from_millis(200),
        );
        let large = Message {
            subject: "big".to_string(),
            body: "x".repeat(1024 * 1024),
        };

        let started = Instant::now();
        let err = stuck.send(&large).expect_err("relay never consumes the body");

        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "send took {:?}",
            started.elapsed()
        );
    }

    #[cfg(unix)]
    #[test]
    fn chatty_relay_stderr_does_not_stall_delivery() {
        let chatty = SendmailChannel::new(
            email(
                "sh",
                &["-c", "cat >/dev/null; head -c 262144 /dev/zero >&2; exit 0"],
            ),
            Duration::from_secs(10),
        );
        chatty.send(&message()).expect("stderr is drained while waiting");
    }

    #[test]
    fn missing_relay_binary_is_a_channel_error() {
        let missing = SendmailChannel::new(
            email("/nonexistent/wantwatch-sendmail", &[]),
            Duration::from_secs(1),
        );
        assert!(missing.send(&message()).is_err());
    }

    #[test]
    fn smtp_message_carries_headers_and_body() {
        let channel = SmtpChannel::new(&smtp("smtp.example.com", 465), Duration::from_secs(5))
            .expect("channel");
        let formatted = String::from_utf8(channel.build_email(&message()).expect("email").formatted())
            .expect("utf8");

        assert!(formatted.contains("bot@example.com"));
        assert!(formatted.contains("me@example.com"));
        assert!(formatted.contains("New listings (1)"));
        assert!(formatted.contains("A - B"));
        assert!(formatted.contains("text/plain"));
    }

    #[test]
    fn smtp_rejects_invalid_addresses_up_front() {
        let mut config = smtp("smtp.example.com", 465);
        config.from = "not an address".to_string();
        assert!(SmtpChannel::new(&config, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn unreachable_smtp_relay_fails_within_timeout() {
        let channel = SmtpChannel::new(&smtp("localhost", 1), Duration::from_secs(2))
            .expect("channel");

        let started = Instant::now();
        let err = channel.send(&message()).expect_err("nothing listens on port 1");

        assert!(err.to_string().starts_with("mail relay failed"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn channels_follow_config() {
        let mut config = WatchConfig::default();
        assert!(from_config(&config).expect("channels").is_empty());

        config.notify.webhook = Some(WebhookConfig {
            url: "https://hooks.example/1".to_string(),
        });
        config.notify.email = Some(smtp("smtp.example.com", 587));
        let names: Vec<_> = from_config(&config)
            .expect("channels")
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["smtp", "webhook"]);

        config.notify.email = Some(email("sendmail", &["-t"]));
        let names: Vec<_> = from_config(&config)
            .expect("channels")
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["sendmail", "webhook"]);
    }

    #[test]
    fn email_from_environment_defaults_to_smtp() {
        let mut config = WatchConfig::default();
        config.apply_env_with(|key| match key {
            "EMAIL_FROM" => Some("bot@example.com".to_string()),
            "EMAIL_TO" => Some("me@example.com".to_string()),
            "EMAIL_PASS" => Some("app-password".to_string()),
            _ => None,
        });
        let names: Vec<_> = from_config(&config)
            .expect("channels")
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["smtp"]);
    }
}
