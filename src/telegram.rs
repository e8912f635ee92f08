use std::time::Duration;

use color_eyre::eyre::Context;
use color_eyre::Result;
use reqwest::blocking::Client;
use serde::Serialize;

use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Notifier {
    http: Client,
    base_url: String,
    token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

impl Notifier {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build telegram client")?;
        Ok(Self {
            http,
            base_url: config.telegram_base_url.trim_end_matches('/').to_string(),
            token: config.telegram_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        })
    }

    /// Deliver one message. Delivery itself is not idempotent; the seen
    /// store is what keeps repeats away.
    pub fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        self.http
            .post(&url)
            .json(&payload)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

/// Escape user-sourced text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
