//! Typed bindings for the portal gateway endpoints.
//!
//! # Endpoints
//! - `POST /auth/register`, `POST /auth/login`, `POST /auth/logout`, `GET /auth/me`
//! - `GET /me/patient`, `PUT /me/patient`
//! - `POST /chat/send`, `GET /chat/events` (push stream)
//!
//! Authentication is cookie based: a successful login stores the session
//! cookie in the client's jar and every later call sends it.

pub mod models;

pub use models::{
    Ack, ChatMessage, Credentials, CurrentUser, PatientProfile, PatientUpdate, Sex, MIN_PASSWORD_LEN,
};

use serde_json::Value;

use crate::client::{ApiClient, ApiError, ErrorKind};
use crate::config::{ClientConfig, ConfigError};
use crate::stream::{StreamConnection, StreamConsumer};

pub const CHAT_EVENTS_PATH: &str = "/chat/events";

/// Gateway client: request/response calls plus the chat push stream, sharing
/// one cookie jar.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    api: ApiClient,
    streams: StreamConsumer,
}

impl GatewayClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_client(ApiClient::new(config)?))
    }

    pub fn from_client(api: ApiClient) -> Self {
        let streams = StreamConsumer::from_client(&api);
        Self { api, streams }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<Ack, ApiError> {
        const PATH: &str = "/auth/register";
        credentials
            .validate_for_registration()
            .map_err(|msg| self.rejected(PATH, msg))?;
        self.api.post(PATH, credentials).await
    }

    /// Sign in. On success the session cookie is kept for later calls.
    /// Bad credentials surface as a 401 client error (see
    /// [`ApiError::is_unauthorized`]).
    pub async fn login(&self, credentials: &Credentials) -> Result<CurrentUser, ApiError> {
        let user: CurrentUser = self.api.post("/auth/login", credentials).await?;
        tracing::info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    pub async fn logout(&self) -> Result<Ack, ApiError> {
        self.api.post("/auth/logout", &serde_json::json!({})).await
    }

    pub async fn me(&self) -> Result<CurrentUser, ApiError> {
        self.api.get("/auth/me").await
    }

    /// The linked patient profile, or `None` when the account has none.
    pub async fn patient_profile(&self) -> Result<Option<PatientProfile>, ApiError> {
        self.api.get("/me/patient").await
    }

    pub async fn update_patient(&self, update: &PatientUpdate) -> Result<Ack, ApiError> {
        const PATH: &str = "/me/patient";
        update.validate().map_err(|msg| self.rejected(PATH, msg))?;
        self.api.put(PATH, update).await
    }

    /// Send a chat turn. The assistant's reply shape is tool dependent.
    pub async fn send_chat(&self, message: &ChatMessage) -> Result<Value, ApiError> {
        self.api.post("/chat/send", message).await
    }

    /// Subscribe to chat events.
    pub fn chat_events<F>(&self, on_line: F) -> StreamConnection
    where
        F: FnMut(String) + Send + 'static,
    {
        self.streams.open(CHAT_EVENTS_PATH, on_line)
    }

    fn rejected(&self, path: &str, message: String) -> ApiError {
        ApiError::new(ErrorKind::ClientError, message, self.api.config().url_for(path))
    }
}
