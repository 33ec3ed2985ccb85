//! HTTP client for the REST API, authenticated with the bot token.

use std::time::Duration;

use distodo_shared::{
    try_error_message, ApiError, ApplicationCommand, Interaction, InteractionResponse, Message,
    MessagePayload, API_URL,
};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::gateway::Token;

/// Largest page the message history endpoint returns.
pub const MESSAGE_PAGE_LIMIT: usize = 100;

/// Upper bound on a rate-limit sleep.
const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

/// Status and decoded body of a REST call. Empty bodies decode to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    pub status: u16,
    pub content: Option<Value>,
}

impl JsonResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Map a non-2xx status to an error, otherwise deserialize the body.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        if self.status == 429 {
            return Err(ApiError::RateLimited {
                retry_after: retry_after(&self.content),
            });
        }
        if !self.is_success() {
            let body = self.content.map(|c| c.to_string()).unwrap_or_default();
            let body = try_error_message(&body).unwrap_or(body);
            return Err(ApiError::Http {
                status: self.status,
                body,
            });
        }
        serde_json::from_value(self.content.unwrap_or(Value::Null))
            .map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Like [`into_result`](Self::into_result) for calls whose body is ignored.
    pub fn into_empty(self) -> Result<(), ApiError> {
        self.into_result::<Value>().map(|_| ())
    }
}

fn retry_after(content: &Option<Value>) -> f64 {
    content
        .as_ref()
        .and_then(|c| c.get("retry_after"))
        .and_then(Value::as_f64)
        .unwrap_or(1.0)
}

/// HTTP client for the REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Token,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            client: Client::new(),
            base_url: API_URL.to_string(),
            token: token.into(),
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Issue a request. A 429 answer is retried exactly once after the
    /// server-specified delay; whatever the retry returns is the result.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<JsonResponse, ApiError> {
        let response = self.send_once(&method, path, headers, query, body).await?;
        if response.status != 429 {
            return Ok(response);
        }

        let delay = retry_after(&response.content);
        warn!(path = %path, retry_after = delay, "Rate limited, retrying once");
        tokio::time::sleep(Duration::from_secs_f64(delay.clamp(0.0, MAX_RETRY_DELAY_SECS))).await;
        self.send_once(&method, path, headers, query, body).await
    }

    /// [`call`](Self::call) without extra headers.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<JsonResponse, ApiError> {
        self.call(method, path, &[], query, body).await
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        headers: &[(&str, &str)],
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<JsonResponse, ApiError> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "REST request");

        let mut rb = self
            .client
            .request(method.clone(), &url)
            .header("Authorization", format!("Bot {}", self.token.expose()));
        for (name, value) in headers {
            rb = rb.header(*name, *value);
        }
        if !query.is_empty() {
            rb = rb.query(query);
        }
        if let Some(body) = body {
            rb = rb.json(body);
        }

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        let content = if text.is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))?)
        };
        debug!(status, url = %url, "REST response");
        Ok(JsonResponse { status, content })
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<JsonResponse, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        self.request(method, path, &[], Some(&body)).await
    }

    // --- Channels ---

    pub async fn get_channel(&self, channel_id: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, &format!("/channels/{channel_id}"), &[], None)
            .await?
            .into_result()
    }

    /// One page of history, newest first.
    pub async fn get_channel_messages(
        &self,
        channel_id: &str,
        limit: Option<usize>,
        before: Option<&str>,
    ) -> Result<Vec<Message>, ApiError> {
        let mut query = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }
        self.request(
            Method::GET,
            &format!("/channels/{channel_id}/messages"),
            &query,
            None,
        )
        .await?
        .into_result()
    }

    /// Walk the history backwards page by page until a short page.
    pub async fn get_all_channel_messages(
        &self,
        channel_id: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let mut messages = self
            .get_channel_messages(channel_id, Some(MESSAGE_PAGE_LIMIT), None)
            .await?;
        let mut last_page = messages.len();
        while last_page == MESSAGE_PAGE_LIMIT {
            let Some(oldest) = messages.last().map(|m| m.id.clone()) else {
                break;
            };
            let page = self
                .get_channel_messages(channel_id, Some(MESSAGE_PAGE_LIMIT), Some(&oldest))
                .await?;
            last_page = page.len();
            messages.extend(page);
        }
        debug!(channel_id = %channel_id, count = messages.len(), "Fetched channel history");
        Ok(messages)
    }

    pub async fn get_channel_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Message, ApiError> {
        self.request(
            Method::GET,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            &[],
            None,
        )
        .await?
        .into_result()
    }

    pub async fn create_message(
        &self,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message, ApiError> {
        self.send_json(Method::POST, &format!("/channels/{channel_id}/messages"), payload)
            .await?
            .into_result()
    }

    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message, ApiError> {
        self.send_json(
            Method::PATCH,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            payload,
        )
        .await?
        .into_result()
    }

    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), ApiError> {
        self.request(
            Method::DELETE,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            &[],
            None,
        )
        .await?
        .into_empty()
    }

    /// Delete 2 to 100 messages younger than two weeks in one call.
    pub async fn bulk_delete_messages(
        &self,
        channel_id: &str,
        message_ids: &[String],
    ) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            &format!("/channels/{channel_id}/messages/bulk-delete"),
            &json!({ "messages": message_ids }),
        )
        .await?
        .into_empty()
    }

    pub async fn pin_message(&self, channel_id: &str, message_id: &str) -> Result<(), ApiError> {
        self.request(
            Method::PUT,
            &format!("/channels/{channel_id}/pins/{message_id}"),
            &[],
            None,
        )
        .await?
        .into_empty()
    }

    pub async fn unpin_message(&self, channel_id: &str, message_id: &str) -> Result<(), ApiError> {
        self.request(
            Method::DELETE,
            &format!("/channels/{channel_id}/pins/{message_id}"),
            &[],
            None,
        )
        .await?
        .into_empty()
    }

    // --- Interactions ---

    pub async fn create_interaction_response(
        &self,
        interaction: &Interaction,
        response: &InteractionResponse,
    ) -> Result<(), ApiError> {
        let path = format!(
            "/interactions/{}/{}/callback",
            interaction.id, interaction.token
        );
        self.send_json(Method::POST, &path, response).await?.into_empty()
    }

    // --- Application commands ---

    pub async fn create_global_command(
        &self,
        application_id: &str,
        command: &ApplicationCommand,
    ) -> Result<ApplicationCommand, ApiError> {
        self.send_json(
            Method::POST,
            &format!("/applications/{application_id}/commands"),
            command,
        )
        .await?
        .into_result()
    }

    pub async fn get_global_commands(
        &self,
        application_id: &str,
    ) -> Result<Vec<ApplicationCommand>, ApiError> {
        self.request(
            Method::GET,
            &format!("/applications/{application_id}/commands"),
            &[],
            None,
        )
        .await?
        .into_result()
    }

    pub async fn delete_global_command(
        &self,
        application_id: &str,
        command_id: &str,
    ) -> Result<(), ApiError> {
        self.request(
            Method::DELETE,
            &format!("/applications/{application_id}/commands/{command_id}"),
            &[],
            None,
        )
        .await?
        .into_empty()
    }
}
