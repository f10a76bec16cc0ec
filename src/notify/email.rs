use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Notice, Notifier};

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSender {
    /// `Ok(None)` when SMTP is not configured at all; an error when it is
    /// only partly configured or invalid.
    pub fn from_env() -> Result<Option<Self>> {
        let keys = [
            "SMTP_HOST",
            "SMTP_USER",
            "SMTP_PASS",
            "NOTIFY_EMAIL_FROM",
            "NOTIFY_EMAIL_TO",
        ];
        let vals: Vec<Option<String>> = keys
            .iter()
            .map(|k| std::env::var(k).ok().filter(|v| !v.trim().is_empty()))
            .collect();
        if vals.iter().all(Option::is_none) {
            return Ok(None);
        }
        let get = |i: usize| {
            vals[i]
                .clone()
                .with_context(|| format!("{} missing", keys[i]))
        };
        let (host, user, pass, from_addr, to_addr) = (get(0)?, get(1)?, get(2)?, get(3)?, get(4)?);

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Some(Self { mailer, from, to }))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    async fn send(&self, notice: &Notice) -> Result<()> {
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(notice.headline())
            .header(header::ContentType::TEXT_PLAIN)
            .body(notice.lines().join("\n"))
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "email"
    }
}
