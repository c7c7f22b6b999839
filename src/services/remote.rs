use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
    models::{
        actor::{ActorRole, BankAccount, PaymentCard, Vehicle},
        pending::PendingProfileUpdate,
        trip::TripStatus,
    },
    services::session_store::SessionStore,
};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("backend unreachable: {0}")]
    Unavailable(String),
    #[error("backend rejected the session token")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("backend answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub credit_card_number: Option<String>,
    pub credit_card_expiry: Option<String>,
    #[serde(rename = "creditCardCVV")]
    pub credit_card_cvv: Option<String>,
    pub cab: Option<CabDto>,
    pub bank: Option<String>,
    pub bank_branch: Option<String>,
    pub bank_account_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CabDto {
    pub model: String,
    pub color: String,
    pub plate_number: String,
}

impl From<&Vehicle> for CabDto {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            model: vehicle.model.clone(),
            color: vehicle.color.clone(),
            plate_number: vehicle.plate_number.clone(),
        }
    }
}

fn bank_fields(account: Option<&BankAccount>) -> (Option<String>, Option<String>, Option<String>) {
    match account {
        Some(account) => (
            Some(account.bank.clone()),
            Some(account.branch.clone()),
            Some(account.account_number.clone()),
        ),
        None => (None, None, None),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteActor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub credit_card_number: Option<String>,
    pub credit_card_expiry: Option<String>,
    #[serde(rename = "creditCardCVV")]
    pub credit_card_cvv: Option<String>,
    pub cab: Option<CabDto>,
    pub bank: Option<String>,
    pub bank_branch: Option<String>,
    pub bank_account_number: Option<String>,
}

impl ProfileUpdateRequest {
    pub fn from_pending(update: &PendingProfileUpdate) -> Self {
        let card = update.payment_card.as_ref();
        let (bank, bank_branch, bank_account_number) =
            bank_fields(update.bank_account.as_ref());
        Self {
            name: update.name.clone(),
            email: update.email.clone(),
            password: update.password.clone(),
            credit_card_number: card.map(|c| c.number.clone()),
            credit_card_expiry: card.map(|c| c.expiry.clone()),
            credit_card_cvv: card.map(|c| c.cvv.clone()),
            cab: update.vehicle.as_ref().map(CabDto::from),
            bank,
            bank_branch,
            bank_account_number,
        }
    }
}

impl RegisterRequest {
    /// Registration body; drivers also send their cab and bank details.
    pub fn new(
        name: &str,
        email: &str,
        password: &str,
        card: Option<&PaymentCard>,
        vehicle: Option<&Vehicle>,
        bank_account: Option<&BankAccount>,
    ) -> Self {
        let (bank, bank_branch, bank_account_number) = bank_fields(bank_account);
        Self {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            credit_card_number: card.map(|c| c.number.clone()),
            credit_card_expiry: card.map(|c| c.expiry.clone()),
            credit_card_cvv: card.map(|c| c.cvv.clone()),
            cab: vehicle.map(CabDto::from),
            bank,
            bank_branch,
            bank_account_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingRecord {
    pub trip_id: Option<String>,
    pub rating: Option<u8>,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartyDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripDto {
    pub id: String,
    pub customer: PartyDto,
    pub driver: PartyDto,
    pub payment: PaymentDto,
    pub status: TripStatus,
    pub origin: String,
    pub destination: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    Accept,
    Start,
    Complete,
    Cancel,
}

impl TripAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripAction::Accept => "accept",
            TripAction::Start => "start",
            TripAction::Complete => "complete",
            TripAction::Cancel => "cancel",
        }
    }

    /// Status a trip ends up in once the action went through.
    pub fn target_status(&self) -> TripStatus {
        match self {
            TripAction::Accept | TripAction::Start => TripStatus::InProgress,
            TripAction::Complete => TripStatus::Completed,
            TripAction::Cancel => TripStatus::Cancelled,
        }
    }
}

/// The ride-hailing backend as seen from the device.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, RemoteError>;

    async fn register(
        &self,
        role: ActorRole,
        request: &RegisterRequest,
    ) -> Result<RemoteActor, RemoteError>;

    async fn trip_history(
        &self,
        role: ActorRole,
        page: u32,
        size: u32,
    ) -> Result<Page<TripDto>, RemoteError>;

    /// `Ok(None)` when the backend has no rating for the trip yet.
    async fn fetch_rating(&self, trip_id: &str) -> Result<Option<RatingRecord>, RemoteError>;

    async fn submit_rating(
        &self,
        trip_id: &str,
        rating: u8,
        feedback: &str,
    ) -> Result<(), RemoteError>;

    async fn update_profile(
        &self,
        role: ActorRole,
        request: &ProfileUpdateRequest,
    ) -> Result<(), RemoteError>;

    async fn trip_action(&self, trip_id: &str, action: TripAction) -> Result<(), RemoteError>;
}

/// JSON-over-HTTP client for the backend. The bearer token is read from the session
/// store on every call and dropped from it on a 401.
#[derive(Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: Url,
    store: SessionStore,
}

impl HttpRemote {
    pub fn new(base_url: Url, timeout: Duration, store: SessionStore) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, store))
    }

    pub fn with_client(client: reqwest::Client, base_url: Url, store: SessionStore) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url),
            store,
        }
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder, RemoteError> {
        let url = self.endpoint(segments)?;
        let mut builder = self.client.request(method, url);
        match self.store.auth_token().await {
            Ok(Some(token)) => builder = builder.bearer_auth(token),
            Ok(None) => {}
            Err(err) => warn!("could not read auth token: {err}"),
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED => {
                if let Err(err) = self.store.clear_auth_token().await {
                    warn!("could not drop rejected auth token: {err}");
                }
                Err(RemoteError::Unauthorized)
            }
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(RemoteError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = self.send(builder).await?;
        Ok(response.json::<T>().await?)
    }
}

fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, RemoteError> {
        let builder = self.request(Method::POST, &["auth", "login"]).await?.json(credentials);
        self.send_json(builder).await
    }

    async fn register(
        &self,
        role: ActorRole,
        request: &RegisterRequest,
    ) -> Result<RemoteActor, RemoteError> {
        let builder = self
            .request(Method::POST, &["auth", role.as_str(), "register"])
            .await?
            .json(request);
        self.send_json(builder).await
    }

    async fn trip_history(
        &self,
        role: ActorRole,
        page: u32,
        size: u32,
    ) -> Result<Page<TripDto>, RemoteError> {
        let builder = self
            .request(Method::GET, &[role.as_str(), "getTripsHistory"])
            .await?
            .query(&[("page", page), ("size", size)]);
        self.send_json(builder).await
    }

    async fn fetch_rating(&self, trip_id: &str) -> Result<Option<RatingRecord>, RemoteError> {
        let builder = self
            .request(Method::GET, &["rating", trip_id])
            .await?;
        match self.send_json::<RatingRecord>(builder).await {
            Ok(record) => Ok(Some(record)),
            Err(RemoteError::NotFound) => {
                debug!(trip_id, "no rating stored for trip");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn submit_rating(
        &self,
        trip_id: &str,
        rating: u8,
        feedback: &str,
    ) -> Result<(), RemoteError> {
        let body = RatingRecord {
            trip_id: Some(trip_id.to_string()),
            rating: Some(rating),
            feedback: feedback.to_string(),
        };
        let builder = self.request(Method::POST, &["rating"]).await?.json(&body);
        self.send(builder).await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        role: ActorRole,
        request: &ProfileUpdateRequest,
    ) -> Result<(), RemoteError> {
        let builder = self
            .request(Method::PUT, &[role.as_str()])
            .await?
            .json(request);
        self.send(builder).await?;
        Ok(())
    }

    async fn trip_action(&self, trip_id: &str, action: TripAction) -> Result<(), RemoteError> {
        let builder = self
            .request(Method::PATCH, &["trip", trip_id, action.as_str()])
            .await?;
        self.send(builder).await?;
        Ok(())
    }
}
