//! HTTP client for the REST interface.

use crate::api::{ErrorBody, MoveRequest};
use crate::manager::MoveReply;
use crate::store::{GameId, GameView};
use crate::sync::SnapshotSource;
use async_trait::async_trait;
use derive_more::{Display, Error};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client-side failure.
#[derive(Debug, Clone, Display, Error)]
#[display("Client error: {}", message)]
pub struct ClientError {
    /// HTTP status, if the server answered.
    pub status: Option<u16>,
    /// Server or transport message.
    pub message: String,
}

impl ClientError {
    /// True if the server reported the game as missing.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: format!("HTTP error: {}", err),
        }
    }
}

/// Talks to a `strictly_chess_server serve` instance.
#[derive(Debug, Clone)]
pub struct RestGameClient {
    base_url: String,
    http: Client,
}

impl RestGameClient {
    /// Client for the server at `base_url`, e.g. `http://127.0.0.1:3000`.
    #[instrument(skip(base_url), fields(base_url = %base_url.as_ref()))]
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/sessions{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        debug!(%status, %message, "Server refused request");
        Err(ClientError {
            status: Some(status.as_u16()),
            message,
        })
    }

    /// Lists stored games.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<GameId>, ClientError> {
        self.send(self.http.get(self.url(""))).await
    }

    /// Opens a game, creating it if needed.
    #[instrument(skip(self))]
    pub async fn open(&self, game_id: &str) -> Result<GameView, ClientError> {
        self.send(self.http.post(self.url(&format!("/{}", game_id))))
            .await
    }

    /// Current view of a game.
    #[instrument(skip(self))]
    pub async fn game(&self, game_id: &str) -> Result<GameView, ClientError> {
        self.send(self.http.get(self.url(&format!("/{}/game", game_id))))
            .await
    }

    /// Long-polls until the version exceeds `since` or `wait` elapses.
    #[instrument(skip(self))]
    pub async fn wait_for_change(
        &self,
        game_id: &str,
        since: u64,
        wait: Duration,
    ) -> Result<GameView, ClientError> {
        let path = format!(
            "/{}/game?since={}&wait_ms={}",
            game_id,
            since,
            wait.as_millis()
        );
        self.send(self.http.get(self.url(&path))).await
    }

    /// Submits a raw move token.
    #[instrument(skip(self))]
    pub async fn submit_move(&self, game_id: &str, mv: &str) -> Result<MoveReply, ClientError> {
        let request = self
            .http
            .post(self.url(&format!("/{}/moves", game_id)))
            .json(&MoveRequest { mv: mv.to_string() });
        self.send(request).await
    }

    /// Resets a game to the starting position.
    #[instrument(skip(self))]
    pub async fn restart(&self, game_id: &str) -> Result<GameView, ClientError> {
        self.send(self.http.post(self.url(&format!("/{}/restart", game_id))))
            .await
    }

    /// Deletes a game.
    #[instrument(skip(self))]
    pub async fn remove(&self, game_id: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("/{}", game_id)))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError {
                status: Some(status.as_u16()),
                message: status.to_string(),
            })
        }
    }
}

#[async_trait]
impl SnapshotSource for RestGameClient {
    type Error = ClientError;

    async fn fetch(&self, game_id: &str) -> Result<GameView, ClientError> {
        self.game(game_id).await
    }
}
