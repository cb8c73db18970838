use super::{Backend, ChangeEvent, ChangeKind, Table, CHANGE_FEED_CAPACITY};
use crate::error::{KiadisaError, KiadisaResult};
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Signed-in session against the hosted auth service
#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Backend speaking the hosted service's REST surface
/// (`/rest/v1` for tables, `/auth/v1` for sessions)
///
/// There is no websocket subscription here: the change feed echoes this
/// client's own successful writes.
pub struct RestBackend {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
    session: RwLock<Option<Session>>,
    change_tx: broadcast::Sender<ChangeEvent>,
}

impl RestBackend {
    pub fn new(base_url: String, anon_key: String) -> KiadisaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KiadisaError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let (change_tx, _rx) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            client,
            session: RwLock::new(None),
            change_tx,
        })
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> KiadisaResult<AuthUser> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let token: TokenResponse = Self::decode(response).await?;
        tracing::info!("Signed in as {}", token.user.id);

        let user = token.user.clone();
        *self.session.write().await = Some(Session {
            access_token: token.access_token,
            user: token.user,
        });
        Ok(user)
    }

    /// Resume a session from a previously issued access token
    pub async fn with_access_token(&self, access_token: &str) -> KiadisaResult<AuthUser> {
        let claims = decode_jwt_claims(access_token)?;
        let user = AuthUser {
            id: claims.sub,
            email: claims.email,
        };
        *self.session.write().await = Some(Session {
            access_token: access_token.to_string(),
            user: user.clone(),
        });
        Ok(user)
    }

    pub async fn sign_out(&self) {
        *self.session.write().await = None;
    }

    async fn request(&self, method: Method, table: Table, query: &[(&str, String)]) -> RequestBuilder {
        let bearer = match &*self.session.read().await {
            Some(session) => session.access_token.clone(),
            None => self.anon_key.clone(),
        };
        let url = format!("{}/rest/v1/{}", self.base_url, table.name());
        self.client
            .request(method, url)
            .query(query)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: Table,
        filters: &[(&str, String)],
    ) -> KiadisaResult<Vec<T>> {
        let mut query = vec![("select", "*".to_string())];
        query.extend(filters.iter().cloned());
        let response = self.request(Method::GET, table, &query).await.send().await?;
        Self::decode(response).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: Table,
        filters: &[(&str, String)],
    ) -> KiadisaResult<Option<T>> {
        let mut filters = filters.to_vec();
        filters.push(("limit", "1".to_string()));
        Ok(self.select(table, &filters).await?.into_iter().next())
    }

    async fn insert<B: Serialize + Sync, T: DeserializeOwned + Serialize>(
        &self,
        table: Table,
        body: &B,
        query: &[(&str, String)],
        prefer: &str,
    ) -> KiadisaResult<T> {
        let response = self
            .request(Method::POST, table, query)
            .await
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await?;
        let row = Self::decode::<Vec<T>>(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KiadisaError::Decode(format!("{} insert returned no row", table.name())))?;

        self.echo(table, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn patch<B: Serialize + Sync>(
        &self,
        table: Table,
        filters: &[(&str, String)],
        body: &B,
    ) -> KiadisaResult<()> {
        let response = self
            .request(Method::PATCH, table, filters)
            .await
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = Self::decode(response).await?;
        for row in &rows {
            self.echo(table, ChangeKind::Update, row);
        }
        Ok(())
    }

    fn echo<T: Serialize>(&self, table: Table, kind: ChangeKind, row: &T) {
        let _ = self.change_tx.send(ChangeEvent::new(table, kind, row));
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> KiadisaResult<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| KiadisaError::Decode(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.message.or(b.error_description).or(b.msg))
            .unwrap_or_else(|| format!("{} {}", status, text));

        tracing::debug!("Backend returned {}: {}", status, message);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => KiadisaError::Unauthorized(message),
            _ => KiadisaError::from_backend_message(message),
        })
    }
}

/// `column=eq.value` filter
fn eq(column: &'static str, value: &str) -> (&'static str, String) {
    (column, format!("eq.{}", value))
}

/// `column=in.(a,b,c)` filter
fn any_of(column: &'static str, values: &[String]) -> (&'static str, String) {
    (column, format!("in.({})", values.join(",")))
}

/// Read the claims segment of an access token without verifying it
fn decode_jwt_claims(token: &str) -> KiadisaResult<JwtClaims> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| KiadisaError::Validation("Malformed access token".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| KiadisaError::Validation(format!("Malformed access token: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl Backend for RestBackend {
    async fn current_user(&self) -> KiadisaResult<Option<AuthUser>> {
        Ok(self.session.read().await.as_ref().map(|s| s.user.clone()))
    }

    async fn game_by_code(&self, code: &str) -> KiadisaResult<Option<Game>> {
        self.select_one(Table::Games, &[eq("code", code)]).await
    }

    async fn game_by_id(&self, game_id: &str) -> KiadisaResult<Option<Game>> {
        self.select_one(Table::Games, &[eq("id", game_id)]).await
    }

    async fn insert_game(&self, game: NewGame) -> KiadisaResult<Game> {
        self.insert(Table::Games, &game, &[], "return=representation")
            .await
    }

    async fn update_game(&self, game_id: &str, patch: GamePatch) -> KiadisaResult<()> {
        self.patch(Table::Games, &[eq("id", game_id)], &patch).await
    }

    async fn players_for_game(&self, game_id: &str) -> KiadisaResult<Vec<GamePlayer>> {
        self.select(Table::GamePlayers, &[eq("game_id", game_id)])
            .await
    }

    async fn player_in_game(
        &self,
        game_id: &str,
        user_id: &str,
    ) -> KiadisaResult<Option<GamePlayer>> {
        self.select_one(
            Table::GamePlayers,
            &[eq("game_id", game_id), eq("user_id", user_id)],
        )
        .await
    }

    async fn insert_player(&self, player: NewGamePlayer) -> KiadisaResult<GamePlayer> {
        self.insert(Table::GamePlayers, &player, &[], "return=representation")
            .await
    }

    async fn round_by_number(
        &self,
        game_id: &str,
        round_number: u32,
    ) -> KiadisaResult<Option<Round>> {
        self.select_one(
            Table::Rounds,
            &[
                eq("game_id", game_id),
                eq("round_number", &round_number.to_string()),
            ],
        )
        .await
    }

    async fn insert_answer(&self, answer: NewAnswer) -> KiadisaResult<Answer> {
        self.insert(Table::Answers, &answer, &[], "return=representation")
            .await
    }

    async fn answers_for_round(&self, round_id: &str) -> KiadisaResult<Vec<Answer>> {
        self.select(Table::Answers, &[eq("round_id", round_id)]).await
    }

    async fn upsert_vote(&self, vote: NewVote) -> KiadisaResult<Vote> {
        self.insert(
            Table::Votes,
            &vote,
            &[("on_conflict", "player_id,round_id".to_string())],
            "resolution=merge-duplicates,return=representation",
        )
        .await
    }

    async fn votes_for_round(&self, round_id: &str) -> KiadisaResult<Vec<Vote>> {
        self.select(Table::Votes, &[eq("round_id", round_id)]).await
    }

    async fn user_stats(&self, user_id: &str) -> KiadisaResult<Option<UserStats>> {
        self.select_one(Table::UserStats, &[eq("user_id", user_id)])
            .await
    }

    async fn insert_user_stats(&self, stats: UserStats) -> KiadisaResult<UserStats> {
        self.insert(Table::UserStats, &stats, &[], "return=representation")
            .await
    }

    async fn update_user_stats(&self, user_id: &str, patch: StatsPatch) -> KiadisaResult<()> {
        self.patch(Table::UserStats, &[eq("user_id", user_id)], &patch)
            .await
    }

    async fn profiles(&self, user_ids: &[UserId]) -> KiadisaResult<Vec<Profile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(Table::Profiles, &[any_of("id", user_ids)]).await
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.change_tx.subscribe()
    }

    fn name(&self) -> &str {
        "rest"
    }
}
