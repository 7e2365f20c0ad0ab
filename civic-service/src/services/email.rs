use async_trait::async_trait;
use civic_core::error::AppError;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::services::verification::OTP_TTL_MINUTES;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_otp(&self, to_email: &str, otp: &str, display_name: &str)
        -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpEmailProvider {
    mailer: SmtpTransport,
    from_address: String,
}

impl SmtpEmailProvider {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized with SMTP transport");

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send_otp(
        &self,
        to_email: &str,
        otp: &str,
        display_name: &str,
    ) -> Result<(), AppError> {
        let html_body = format!(
            r###"<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Email Verification</h2>
    <p>Hello {display_name},</p>
    <p>Thank you for signing up! Please use the following one-time password to verify your email address:</p>
    <div style="border: 2px dashed #667eea; border-radius: 8px; padding: 20px; text-align: center; margin: 20px 0;">
        <h1 style="font-size: 36px; letter-spacing: 8px; margin: 0;">{otp}</h1>
    </div>
    <p style="color: #666; font-size: 14px;">This code will expire in <strong>{ttl} minutes</strong>.</p>
    <p style="color: #666; font-size: 14px;">If you didn't create an account, please ignore this email.</p>
</body>
</html>
"###,
            display_name = display_name,
            otp = otp,
            ttl = OTP_TTL_MINUTES,
        );

        let plain_body = format!(
            "Hello {},\n\nYour email verification code is: {}\n\nThis code will expire in {} minutes. If you didn't create an account, please ignore this email.",
            display_name, otp, OTP_TTL_MINUTES,
        );

        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e: lettre::address::AddressError| {
                        AppError::InternalError(e.into())
                    })?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?)
            .subject("Verify Your Email Address")
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // Send on the blocking pool; lettre's sync transport would
        // otherwise stall the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, "Verification email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send verification email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

/// Development fallback: writes the OTP to the log instead of sending
/// mail, matching the local workflow where no SMTP relay exists.
pub struct LogEmailProvider;

#[async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send_otp(
        &self,
        to_email: &str,
        otp: &str,
        display_name: &str,
    ) -> Result<(), AppError> {
        tracing::info!(
            to = %to_email,
            name = %display_name,
            otp = %otp,
            "Development mode: verification OTP logged instead of emailed"
        );
        Ok(())
    }
}
