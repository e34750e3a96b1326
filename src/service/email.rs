use crate::config::EmailConfig;
use crate::error::app_error::AppError;
use lettre::message::header::ContentType;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Outbound mail delivery.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AppError>;
}

/// Sends and reports whether delivery succeeded. Failures are logged, never propagated:
/// none of the flows that mail something should fail because the mail did not go out.
pub async fn dispatch(mailer: &dyn Mailer, email: OutgoingEmail) -> bool {
    let subject = email.subject.clone();
    match mailer.send(email).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, detail = ?e, subject = %subject, "email delivery failed");
            false
        }
    }
}

pub fn verification_code_email(to: &str, code: &str, ttl_seconds: i64) -> OutgoingEmail {
    let text_body = format!(
        "Hallo,\n\nIhr Bestätigungscode lautet: {code}\n\nDer Code ist {ttl_seconds} Sekunden gültig.\n\nIhr Haustier-Service-Team\n"
    );
    let html_body = format!(
        "<p>Hallo,</p><p>Ihr Bestätigungscode lautet: <strong>{code}</strong></p><p>Der Code ist {ttl_seconds} Sekunden gültig.</p><p>Ihr Haustier-Service-Team</p>"
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Ihr Bestätigungscode".to_string(),
        text_body,
        html_body,
    }
}

pub fn email_verification_email(to: &str, link: &str) -> OutgoingEmail {
    let text_body = format!("Hallo,\n\nbitte bestätigen Sie Ihre E-Mail-Adresse über diesen Link:\n{link}\n\nDer Link ist 24 Stunden gültig.\n");
    let html_body = format!(
        "<p>Hallo,</p><p>bitte bestätigen Sie Ihre E-Mail-Adresse:</p><p><a href=\"{link}\">E-Mail-Adresse bestätigen</a></p><p>Der Link ist 24 Stunden gültig.</p>"
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Bitte bestätigen Sie Ihre E-Mail-Adresse".to_string(),
        text_body,
        html_body,
    }
}

pub fn password_reset_email(to: &str, link: &str) -> OutgoingEmail {
    let text_body = format!(
        "Hallo,\n\nSie haben das Zurücksetzen Ihres Passworts angefordert. Nutzen Sie diesen Link:\n{link}\n\nDer Link ist eine Stunde gültig. Falls Sie das nicht waren, ignorieren Sie diese E-Mail.\n"
    );
    let html_body = format!(
        "<p>Hallo,</p><p>Sie haben das Zurücksetzen Ihres Passworts angefordert.</p><p><a href=\"{link}\">Passwort zurücksetzen</a></p><p>Der Link ist eine Stunde gültig. Falls Sie das nicht waren, ignorieren Sie diese E-Mail.</p>"
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Passwort zurücksetzen".to_string(),
        text_body,
        html_body,
    }
}

pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, AppError> {
        Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_address)
                    .parse()
                    .map_err(|e| AppError::email(format!("Invalid from address: {}", e)))?,
            )
            .to(email.to.parse().map_err(|e| AppError::email(format!("Invalid to address: {}", e)))?)
            .subject(email.subject.as_str())
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(email.text_body.clone()))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(email.html_body.clone())),
            )
            .map_err(|e| AppError::email(format!("Failed to build email: {}", e)))
    }
}

#[async_trait::async_trait]
impl Mailer for EmailService {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!(to = %email.to, subject = %email.subject, "email service is disabled, message not sent");
            return Err(AppError::email("Email delivery is disabled"));
        }

        let message = self.build_message(&email)?;

        let creds = Credentials::new(self.config.smtp_username.clone(), self.config.smtp_password.clone());
        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| AppError::email(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(creds)
            .port(self.config.smtp_port)
            .build();

        // SmtpTransport blocks on network I/O
        let result = tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| AppError::email(format!("Failed to spawn email sending task: {}", e)))?;

        result.map_err(|e| AppError::email(format!("Failed to send email: {}", e)))?;

        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockMailer;

    #[test]
    fn code_email_contains_code() {
        let email = verification_code_email("owner@example.com", "123456", 60);
        assert_eq!(email.to, "owner@example.com");
        assert!(email.text_body.contains("123456"));
        assert!(email.html_body.contains("123456"));
    }

    #[test]
    fn reset_email_contains_link() {
        let link = "https://example.com/auth/reset-password?oobCode=abc";
        let email = password_reset_email("owner@example.com", link);
        assert!(email.text_body.contains(link));
        assert!(email.html_body.contains(link));
    }

    #[test]
    fn message_builds_with_valid_addresses() {
        let service = EmailService::new(EmailConfig::default());
        let email = email_verification_email("owner@example.com", "https://example.com/verify");
        assert!(service.build_message(&email).is_ok());

        let bad = OutgoingEmail {
            to: "not an address".to_string(),
            ..email
        };
        assert!(matches!(service.build_message(&bad), Err(AppError::Email { .. })));
    }

    #[tokio::test]
    async fn disabled_service_reports_failure() {
        let service = EmailService::new(EmailConfig::default());
        let delivered = dispatch(&service, verification_code_email("owner@example.com", "123456", 60)).await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn dispatch_reports_success_and_failure() {
        let mailer = MockMailer::default();
        assert!(dispatch(&mailer, verification_code_email("a@example.com", "111111", 60)).await);
        assert_eq!(mailer.sent().await.len(), 1);

        let failing = MockMailer::failing();
        assert!(!dispatch(&failing, verification_code_email("a@example.com", "111111", 60)).await);
    }
}
