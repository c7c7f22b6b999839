use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;

use crate::models::trip::Trip;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ActorRole {
    #[default]
    #[serde(rename = "CUSTOMER")]
    Customer,
    #[serde(rename = "DRIVER")]
    Driver,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Customer => "customer",
            ActorRole::Driver => "driver",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer" | "rider" => Ok(ActorRole::Customer),
            "driver" => Ok(ActorRole::Driver),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PaymentCard {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vehicle {
    pub model: String,
    pub color: String,
    pub plate_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankAccount {
    pub bank: String,
    pub branch: String,
    pub account_number: String,
}

/// The single locally authenticated user of the device, customer or driver.
///
/// `trips` is the full ride history; entries are only ever appended or patched.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub email: String,
    /// argon2 PHC string, see [`crate::auth`].
    pub credential: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub role: ActorRole,
    pub payment_card: Option<PaymentCard>,
    pub vehicle: Option<Vehicle>,
    pub bank_account: Option<BankAccount>,
    #[serde(default)]
    pub trips: Vec<Trip>,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        credential: impl Into<String>,
        role: ActorRole,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            credential: credential.into(),
            created_at: Utc::now(),
            role,
            payment_card: None,
            vehicle: None,
            bank_account: None,
            trips: Vec::new(),
        }
    }

    pub fn find_trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.iter().find(|trip| trip.id == trip_id)
    }

    pub fn matches_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}
