use async_trait::async_trait;
use handlebars::Handlebars;
use lettre::{
    message::{header, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::AppConfig;

const POSTMARK_API_URL: &str = "https://api.postmarkapp.com/email";

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email configuration error: {0}")]
    Config(String),
    #[error("Template error: {0}")]
    Template(String),
    #[error("Failed to build email: {0}")]
    Build(String),
    #[error("Failed to send email: {0}")]
    Send(String),
}

pub type EmailResult<T> = Result<T, EmailError>;

/// Rendered email ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct EmailData {
    pub subject: String,
    pub html_content: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> EmailResult<()>;

    fn name(&self) -> &'static str;
}

fn sender_mailbox(from_email: &str, from_name: Option<&str>) -> EmailResult<Mailbox> {
    let address = from_email
        .parse()
        .map_err(|e| EmailError::Config(format!("Invalid from address: {}", e)))?;
    Ok(Mailbox::new(from_name.map(str::to_string), address))
}

/// SMTP relay with STARTTLS, or implicit TLS on port 465
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: Mailbox,
    ) -> EmailResult<Self> {
        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| EmailError::Config(format!("Invalid SMTP host: {}", e)))?
        .port(port);

        let builder = match (username, password) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.to_string(), pass.to_string()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> EmailResult<()> {
        let recipient: Mailbox = to
            .parse()
            .map_err(|e| EmailError::Build(format!("Invalid recipient email: {}", e)))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::Send(format!("SMTP error: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Postmark HTTP API
pub struct PostmarkMailer {
    client: reqwest::Client,
    server_token: String,
    from: String,
    endpoint: String,
}

impl PostmarkMailer {
    pub fn new(client: reqwest::Client, server_token: String, from: String) -> Self {
        Self {
            client,
            server_token,
            from,
            endpoint: POSTMARK_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for PostmarkMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> EmailResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Postmark-Server-Token", &self.server_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({
                "From": self.from,
                "To": to,
                "Subject": subject,
                "HtmlBody": html,
            }))
            .send()
            .await
            .map_err(|e| EmailError::Send(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Send(format!("Postmark returned {}: {}", status, body)));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postmark"
    }
}

/// Used when no transport is configured; messages are logged and dropped
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> EmailResult<()> {
        warn!(to, subject, "Email sending is not configured, dropping message");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Pick a transport: Postmark token first, then SMTP host, else disabled
pub fn build_mailer(config: &AppConfig, client: reqwest::Client) -> EmailResult<Arc<dyn Mailer>> {
    let email = &config.email;
    let Some(from_email) = email.from_email.as_deref() else {
        return Ok(Arc::new(DisabledMailer));
    };
    let from = sender_mailbox(
        from_email,
        email.from_name.as_deref().or(Some(&config.server.project_name)),
    )?;

    if let Some(token) = &email.smtp_token {
        return Ok(Arc::new(PostmarkMailer::new(
            client,
            token.clone(),
            from.to_string(),
        )));
    }
    if let Some(host) = &email.smtp_host {
        return Ok(Arc::new(SmtpMailer::new(
            host,
            email.smtp_port,
            email.smtp_user.as_deref(),
            email.smtp_password.as_deref(),
            from,
        )?));
    }
    Ok(Arc::new(DisabledMailer))
}

/// Handlebars templates for every transactional email
pub struct EmailTemplates {
    registry: Handlebars<'static>,
    project_name: String,
    frontend_host: String,
    server_host: String,
    api_prefix: String,
    reset_hours: i64,
    verification_hours: i64,
    magic_link_minutes: i64,
}

impl EmailTemplates {
    pub fn new(config: &AppConfig) -> EmailResult<Self> {
        let mut registry = Handlebars::new();
        for (name, source) in [
            ("reset_password", include_str!("../../templates/email/reset_password.hbs")),
            ("new_account", include_str!("../../templates/email/new_account.hbs")),
            (
                "email_verification",
                include_str!("../../templates/email/email_verification.hbs"),
            ),
            ("magic_link", include_str!("../../templates/email/magic_link.hbs")),
            ("test_email", include_str!("../../templates/email/test_email.hbs")),
        ] {
            registry
                .register_template_string(name, source)
                .map_err(|e| EmailError::Template(format!("Failed to register {}: {}", name, e)))?;
        }

        Ok(Self {
            registry,
            project_name: config.server.project_name.clone(),
            frontend_host: config.server.frontend_host.clone(),
            server_host: config.server.public_url.clone(),
            api_prefix: config.server.api_prefix.clone(),
            reset_hours: config.security.email_reset_token_expire_hours,
            verification_hours: config.security.email_verification_token_expire_hours,
            magic_link_minutes: config.security.access_token_expire_minutes,
        })
    }

    fn render(&self, template: &str, context: serde_json::Value) -> EmailResult<String> {
        self.registry
            .render(template, &context)
            .map_err(|e| EmailError::Template(e.to_string()))
    }

    pub fn test_email(&self, email_to: &str) -> EmailResult<EmailData> {
        Ok(EmailData {
            subject: format!("{} - Test email", self.project_name),
            html_content: self.render(
                "test_email",
                json!({"project_name": self.project_name, "email": email_to}),
            )?,
        })
    }

    pub fn reset_password_email(&self, email_to: &str, token: &str) -> EmailResult<EmailData> {
        let link = format!("{}/reset-password?token={}", self.frontend_host, urlencoding::encode(token));
        Ok(EmailData {
            subject: format!("{} - Password recovery for user {}", self.project_name, email_to),
            html_content: self.render(
                "reset_password",
                json!({
                    "project_name": self.project_name,
                    "username": email_to,
                    "email": email_to,
                    "valid_hours": self.reset_hours,
                    "link": link,
                }),
            )?,
        })
    }

    pub fn new_account_email(
        &self,
        email_to: &str,
        username: &str,
        password: &str,
    ) -> EmailResult<EmailData> {
        Ok(EmailData {
            subject: format!("{} - New account for user {}", self.project_name, username),
            html_content: self.render(
                "new_account",
                json!({
                    "project_name": self.project_name,
                    "username": username,
                    "password": password,
                    "email": email_to,
                    "link": self.frontend_host,
                }),
            )?,
        })
    }

    pub fn email_verification_email(
        &self,
        email_to: &str,
        username: &str,
        token: &str,
    ) -> EmailResult<EmailData> {
        let link = format!(
            "{}{}/users/verify-email?token={}",
            self.server_host,
            self.api_prefix,
            urlencoding::encode(token)
        );
        Ok(EmailData {
            subject: format!("{} - Verify your email", self.project_name),
            html_content: self.render(
                "email_verification",
                json!({
                    "project_name": self.project_name,
                    "username": username,
                    "email": email_to,
                    "valid_hours": self.verification_hours,
                    "link": link,
                }),
            )?,
        })
    }

    pub fn magic_link_email(&self, token: &str) -> EmailResult<EmailData> {
        let magic_link = format!("{}/auth/verify?token={}", self.frontend_host, urlencoding::encode(token));
        Ok(EmailData {
            subject: format!("{} - Login Link", self.project_name),
            html_content: self.render(
                "magic_link",
                json!({
                    "project_name": self.project_name,
                    "magic_link": magic_link,
                    "valid_minutes": self.magic_link_minutes,
                }),
            )?,
        })
    }
}

/// Templates plus transport; sends happen off the request path
#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    templates: Arc<EmailTemplates>,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, templates: EmailTemplates) -> Self {
        Self {
            mailer,
            templates: Arc::new(templates),
        }
    }

    pub fn templates(&self) -> &EmailTemplates {
        &self.templates
    }

    pub fn transport_name(&self) -> &'static str {
        self.mailer.name()
    }

    pub async fn send(&self, to: &str, email: &EmailData) -> EmailResult<()> {
        self.mailer.send(to, &email.subject, &email.html_content).await
    }

    /// Spawn the send; failures are logged only
    pub fn send_in_background(&self, to: String, email: EmailData) {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            match mailer.send(&to, &email.subject, &email.html_content).await {
                Ok(()) => info!(to = %to, transport = mailer.name(), "Email sent"),
                Err(e) => error!(to = %to, "Failed to send email: {}", e),
            }
        });
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every message instead of sending it
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, html: &str) -> EmailResult<()> {
            self.sent
                .lock()
                .await
                .push((to.to_string(), subject.to_string(), html.to_string()));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;
    use pretty_assertions::assert_eq;

    fn templates() -> EmailTemplates {
        EmailTemplates::new(&AppConfig::default()).unwrap()
    }

    #[test]
    fn test_reset_password_email() {
        let email = templates().reset_password_email("writer@example.com", "tok123").unwrap();
        assert_eq!(
            email.subject,
            "ContentGen - Password recovery for user writer@example.com"
        );
        assert!(email
            .html_content
            .contains("http://localhost:3000/reset-password?token=tok123"));
        assert!(email.html_content.contains("48 hours"));
    }

    #[test]
    fn test_verification_link_points_at_api() {
        let email = templates()
            .email_verification_email("writer@example.com", "Writer", "tok")
            .unwrap();
        assert!(email
            .html_content
            .contains("http://localhost:8000/api/v1/users/verify-email?token=tok"));
    }

    #[test]
    fn test_magic_link_and_test_email() {
        let magic = templates().magic_link_email("abc").unwrap();
        assert_eq!(magic.subject, "ContentGen - Login Link");
        assert!(magic.html_content.contains("http://localhost:3000/auth/verify?token=abc"));

        let test = templates().test_email("ops@example.com").unwrap();
        assert_eq!(test.subject, "ContentGen - Test email");
        assert!(test.html_content.contains("ops@example.com"));
    }

    #[test]
    fn test_mailer_selection() {
        let client = reqwest::Client::new();
        let mut config = AppConfig::default();
        assert_eq!(build_mailer(&config, client.clone()).unwrap().name(), "disabled");

        config.email.from_email = Some("noreply@example.com".to_string());
        config.email.smtp_host = Some("smtp.example.com".to_string());
        assert_eq!(build_mailer(&config, client.clone()).unwrap().name(), "smtp");

        config.email.smtp_token = Some("server-token".to_string());
        assert_eq!(build_mailer(&config, client.clone()).unwrap().name(), "postmark");

        config.email.from_email = Some("not an address".to_string());
        assert!(build_mailer(&config, client).is_err());
    }

    #[tokio::test]
    async fn test_send_through_service() {
        let mailer = Arc::new(RecordingMailer::default());
        let service = EmailService::new(mailer.clone(), templates());
        let email = service.templates().test_email("ops@example.com").unwrap();

        service.send("ops@example.com", &email).await.unwrap();

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ops@example.com");
        assert_eq!(sent[0].1, "ContentGen - Test email");
    }
}
