//! Typed HTTP client for the Sidechat backend.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    models::{
        ApiErrorBody, AskAiRequest, AskAiResponse, AuthLoginRequest, AuthResponse, ConversationId,
        ConversationKind, Group, Message, Thread,
    },
    read_tracking::{FetchError, MessageSource},
    streaming::{StreamError, StreamHandler, StreamResult, StreamSummary, consume_stream},
};
use tracing::{debug, warn};
use url::Url;

/// Client for one backend origin.
///
/// Conversation ids are opaque to the backend's message listing, which needs
/// to know whether an id names a group or a thread. Callers register each id
/// they discover with [`register`](Self::register).
#[derive(Debug)]
pub struct SidechatClient {
    http: Client,
    base: Url,
    request_timeout: Duration,
    kinds: RwLock<HashMap<ConversationId, ConversationKind>>,
}

impl SidechatClient {
    /// Builds a client for `base`, which must end with a slash.
    ///
    /// `request_timeout` bounds every request except the AI stream, which
    /// only gets it as a connect timeout.
    pub fn new(base: Url, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sidechat-cli/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base,
            request_timeout,
            kinds: RwLock::new(HashMap::new()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    /// Records whether `conversation` is listed as a group or a thread.
    pub fn register(&self, conversation: ConversationId, kind: ConversationKind) {
        self.kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation, kind);
    }

    #[must_use]
    pub fn kind_of(&self, conversation: &ConversationId) -> Option<ConversationKind> {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation)
            .copied()
    }

    /// Streams an AI answer into `handler`.
    ///
    /// A refused request (non-success status or no body) is reported once
    /// through `on_error` as `HTTP <status>: <body>` and the stream is never
    /// read. A connection that breaks mid-answer is also reported once; the
    /// deltas already delivered stay delivered and no final is synthesised.
    ///
    /// # Errors
    /// Returns the same failure that was reported to the handler.
    pub async fn ask_ai_stream<H>(
        &self,
        request: &AskAiRequest,
        handler: &mut H,
    ) -> StreamResult<StreamSummary>
    where
        H: StreamHandler + ?Sized,
    {
        let result = self.open_and_consume(request, handler).await;
        if let Err(err) = &result {
            warn!(error = %err, "AI stream failed");
            handler.on_error(&err.to_string());
        }
        result
    }

    async fn open_and_consume<H>(
        &self,
        request: &AskAiRequest,
        handler: &mut H,
    ) -> StreamResult<StreamSummary>
    where
        H: StreamHandler + ?Sized,
    {
        let url = self
            .endpoint("ask-ai-stream")
            .map_err(StreamError::transport)?;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(StreamError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::http(status.as_u16(), body.trim()));
        }
        if response.content_length() == Some(0) {
            return Err(StreamError::EmptyBody {
                status: status.as_u16(),
            });
        }

        debug!(status = status.as_u16(), "AI stream opened");
        consume_stream(response.bytes_stream(), handler).await
    }

    /// Asks for a complete answer in one response.
    pub async fn ask_ai(&self, request: &AskAiRequest) -> Result<AskAiResponse> {
        let response = self
            .http
            .post(self.endpoint("ask-ai")?)
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("failed to reach the AI endpoint")?;
        decode(response).await.context("AI request rejected")
    }

    /// Lists the messages of a conversation of a known kind.
    pub async fn list_messages_of(
        &self,
        conversation: &ConversationId,
        kind: ConversationKind,
    ) -> Result<Vec<Message>, FetchError> {
        let url = self
            .endpoint("messages")
            .map_err(|err| FetchError::transport(conversation, err))?;
        let response = self
            .http
            .get(url)
            .query(&[(kind.query_param(), conversation.as_str())])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| FetchError::transport(conversation, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                conversation: conversation.clone(),
                status: status.as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|err| FetchError::transport(conversation, err))
    }

    /// Groups and direct messages `user_id` belongs to.
    pub async fn list_groups(&self, user_id: &str) -> Result<Vec<Group>> {
        let response = self
            .http
            .get(self.endpoint("groups")?)
            .query(&[("user_id", user_id)])
            .timeout(self.request_timeout)
            .send()
            .await
            .context("failed to fetch groups")?;
        decode(response).await.context("group listing rejected")
    }

    /// Side threads of one group.
    pub async fn list_threads(&self, group_id: &ConversationId) -> Result<Vec<Thread>> {
        let response = self
            .http
            .get(self.endpoint("threads")?)
            .query(&[("group_id", group_id.as_str())])
            .timeout(self.request_timeout)
            .send()
            .await
            .context("failed to fetch threads")?;
        decode(response).await.context("thread listing rejected")
    }

    pub async fn login(&self, credentials: &AuthLoginRequest) -> Result<AuthResponse> {
        let response = self
            .http
            .post(self.endpoint("auth/login")?)
            .json(credentials)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("failed to reach the login endpoint")?;
        decode(response).await.context("login failed")
    }
}

#[async_trait]
impl MessageSource for SidechatClient {
    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, FetchError> {
        let Some(kind) = self.kind_of(conversation) else {
            return Err(FetchError::UnknownConversation(conversation.clone()));
        };
        self.list_messages_of(conversation, kind).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("HTTP {}: {}", status.as_u16(), ApiErrorBody::detail_or_body(&body));
    }
    response
        .json()
        .await
        .context("failed to decode response body")
}
