use std::time::Duration;

use anyhow::Context;

use reqwest::Client;

use serde::Serialize;

use secrecy::Secret;

use url::Url;

use crate::domain::EmailAddress;

const POSTMARK_TOKEN_HEADER: &str = "X-Postmark-Server-Token";

const WELCOME_SUBJECT: &str = "Welcome to the newsletter!";

/// The links a new subscriber needs: one to confirm, one to leave
#[derive(Debug, Clone)]
pub struct WelcomeLinks {
    pub confirm: Url,
    pub unsubscribe: Url,
}

/// Sends subscription mail through a Postmark-compatible REST API
#[derive(Debug)]
pub struct EmailClient {
    client: Client,
    sender: EmailAddress,

    send_email_url: Url,
    auth_token: Secret<String>,
}

impl EmailClient {
    pub fn new(
        sender: EmailAddress,
        api_timeout: Duration,
        api_base_url: Url,
        auth_token: Secret<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(api_timeout)
            .build()
            .context("Failed to build http client")?;

        let send_email_url = api_base_url
            .join("email")
            .context("Failed to create send email endpoint URL")?;

        Ok(Self {
            client,
            sender,
            send_email_url,
            auth_token,
        })
    }

    /// Greet a new or returning subscriber with their confirmation and unsubscribe links
    #[tracing::instrument(name = "Send welcome email", skip(self, links))]
    pub async fn send_welcome(
        &self,
        recipient: &EmailAddress,
        links: &WelcomeLinks,
    ) -> reqwest::Result<()> {
        let message = WelcomeMessage::new(links);
        self.post(&OutgoingEmail {
            from: self.sender.as_ref(),
            to: recipient.as_ref(),
            subject: WELCOME_SUBJECT,
            html_body: &message.html,
            text_body: &message.text,
        })
        .await
    }

    async fn post(&self, email: &OutgoingEmail<'_>) -> reqwest::Result<()> {
        use secrecy::ExposeSecret;

        self.client
            .post(self.send_email_url.clone())
            .header(POSTMARK_TOKEN_HEADER, self.auth_token.expose_secret())
            .json(email)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

struct WelcomeMessage {
    html: String,
    text: String,
}

impl WelcomeMessage {
    fn new(links: &WelcomeLinks) -> Self {
        let html = format!(
            "<h1>Welcome to our newsletter!</h1>\
             <p>Click <a href=\"{}\">here</a> to confirm your subscription.</p>\
             <p>Changed your mind? <a href=\"{}\">Unsubscribe</a>.</p>",
            links.confirm, links.unsubscribe
        );
        let text = format!(
            "Welcome to our newsletter!\n\n\
             To confirm your subscription, visit this web page: {}\n\n\
             To unsubscribe, visit: {}",
            links.confirm, links.unsubscribe
        );

        Self { html, text }
    }
}

/// Request body of the send-email API
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
}
