use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{
    auth,
    error::AppError,
    models::actor::{Actor, BankAccount, PaymentCard, Vehicle},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingRating {
    pub trip_id: String,
    pub rating: u8,
    #[serde(default)]
    pub feedback: String,
    pub needs_sync: bool,
}

impl PendingRating {
    pub fn new(trip_id: impl Into<String>, rating: u8, feedback: impl Into<String>) -> Self {
        Self {
            trip_id: trip_id.into(),
            rating,
            feedback: feedback.into(),
            needs_sync: true,
        }
    }
}

/// Full replacement of the editable profile fields; the latest edit wins.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingProfileUpdate {
    pub name: String,
    pub email: String,
    /// New plain password to send; `None` keeps the current one.
    pub password: Option<String>,
    pub payment_card: Option<PaymentCard>,
    /// Driver only.
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
    /// Driver only.
    #[serde(default)]
    pub bank_account: Option<BankAccount>,
    pub needs_sync: bool,
}

impl PendingProfileUpdate {
    /// Writes the edited fields onto `actor`; a new password is stored hashed.
    pub fn apply_to(&self, actor: &mut Actor) -> Result<(), AppError> {
        actor.name = self.name.clone();
        actor.email = self.email.clone();
        if let Some(password) = self.password.as_deref() {
            actor.credential = auth::hash_credential(password)?;
        }
        if self.payment_card.is_some() {
            actor.payment_card = self.payment_card.clone();
        }
        if self.vehicle.is_some() {
            actor.vehicle = self.vehicle.clone();
        }
        if self.bank_account.is_some() {
            actor.bank_account = self.bank_account.clone();
        }
        Ok(())
    }
}
