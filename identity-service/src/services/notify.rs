//! Outbound notifications. One-time tokens and operator-issued credentials
//! leave the system only through this channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};

use service_core::error::AppError;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reset_link(&self, to_email: &str, reset_token: &str) -> Result<(), AppError>;

    /// Deliver a freshly issued password (and PIN, for business principals)
    /// after a completed reset.
    async fn send_new_credentials(
        &self,
        to_email: &str,
        password: &str,
        pin: Option<&str>,
    ) -> Result<(), AppError>;

    async fn send_verification_link(
        &self,
        to_email: &str,
        verification_token: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from_email: String,
    base_url: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "SMTP notifier initialized");

        Ok(Self {
            mailer,
            from_email: config.from_email.clone(),
            base_url: config.base_url.clone(),
        })
    }

    async fn send_email(&self, to_email: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .to(to_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::InternalError(e.into()))?;

        // SmtpTransport is blocking; keep it off the async runtime
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_reset_link(&self, to_email: &str, reset_token: &str) -> Result<(), AppError> {
        let reset_link = format!(
            "{}/auth/password-reset/confirm?token={}",
            self.base_url, reset_token
        );
        let body = format!(
            "We received a request to reset your password. Visit the following \
             link to receive new credentials:\n\n{}\n\nThis link expires in 30 \
             minutes and can be used once. If you didn't request this, ignore \
             this email.",
            reset_link
        );
        self.send_email(to_email, "Reset Your Password", &body).await
    }

    async fn send_new_credentials(
        &self,
        to_email: &str,
        password: &str,
        pin: Option<&str>,
    ) -> Result<(), AppError> {
        let mut body = format!(
            "Your credentials have been reset.\n\nNew password: {}\n",
            password
        );
        if let Some(pin) = pin {
            body.push_str(&format!("New transaction PIN: {}\n", pin));
        }
        body.push_str("\nSign in and change these as soon as possible.");
        self.send_email(to_email, "Your New Credentials", &body).await
    }

    async fn send_verification_link(
        &self,
        to_email: &str,
        verification_token: &str,
    ) -> Result<(), AppError> {
        let link = format!(
            "{}/auth/verify-email?token={}",
            self.base_url, verification_token
        );
        let body = format!(
            "Please verify your email address by visiting the following \
             link:\n\n{}\n\nThis link expires in 24 hours.",
            link
        );
        self.send_email(to_email, "Verify Your Email Address", &body)
            .await
    }
}

/// What a mock notification captured, so tests can use the token or the
/// issued credentials.
#[derive(Debug, Clone)]
pub enum SentNotification {
    ResetLink {
        to: String,
        token: String,
    },
    NewCredentials {
        to: String,
        password: String,
        pin: Option<String>,
    },
    VerificationLink {
        to: String,
        token: String,
    },
}

#[derive(Default)]
pub struct MockNotifier {
    pub sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make every subsequent send fail, simulating an SMTP outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn deliver(&self, notification: SentNotification) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::EmailError("simulated delivery failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_reset_link(&self, to_email: &str, reset_token: &str) -> Result<(), AppError> {
        self.deliver(SentNotification::ResetLink {
            to: to_email.to_string(),
            token: reset_token.to_string(),
        })
    }

    async fn send_new_credentials(
        &self,
        to_email: &str,
        password: &str,
        pin: Option<&str>,
    ) -> Result<(), AppError> {
        self.deliver(SentNotification::NewCredentials {
            to: to_email.to_string(),
            password: password.to_string(),
            pin: pin.map(|s| s.to_string()),
        })
    }

    async fn send_verification_link(
        &self,
        to_email: &str,
        verification_token: &str,
    ) -> Result<(), AppError> {
        self.deliver(SentNotification::VerificationLink {
            to: to_email.to_string(),
            token: verification_token.to_string(),
        })
    }
}
