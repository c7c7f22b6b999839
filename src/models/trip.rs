use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TripStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "CANCELLED", alias = "CANCELED")]
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => "PENDING",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// Status only moves forward; staying put is allowed so repeated actions are harmless.
    pub fn can_transition_to(&self, next: TripStatus) -> bool {
        use TripStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Pending, InProgress)
                    | (InProgress, Completed)
                    | (Pending, Cancelled)
                    | (InProgress, Cancelled)
            )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

/// The other party of a ride: the driver for a customer, the customer for a driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counterpart {
    pub id: String,
    pub name: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: String,
    pub counterpart: Counterpart,
    pub payment: Price,
    pub status: TripStatus,
    pub origin: String,
    pub destination: String,
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// A trip as requested locally, before the store fills in counterpart and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrip {
    pub id: String,
    pub payment: Price,
    pub status: TripStatus,
    pub origin: String,
    pub destination: String,
    pub rating: Option<u8>,
}

impl NewTrip {
    pub fn pending(
        id: impl Into<String>,
        payment: Price,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            payment,
            status: TripStatus::Pending,
            origin: origin.into(),
            destination: destination.into(),
            rating: None,
        }
    }
}

/// Partial update of one trip. Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripPatch {
    pub id: String,
    pub status: Option<TripStatus>,
    pub rating: Option<u8>,
    pub payment: Option<Price>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub counterpart: Option<Counterpart>,
}

impl TripPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: TripStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn payment(mut self, payment: Price) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn counterpart(mut self, counterpart: Counterpart) -> Self {
        self.counterpart = Some(counterpart);
        self
    }

    /// Shallow merge onto `trip`. The id is never rewritten.
    pub fn apply(&self, trip: &Trip) -> Trip {
        let mut merged = trip.clone();
        if let Some(status) = self.status {
            merged.status = status;
        }
        if let Some(rating) = self.rating {
            merged.rating = Some(rating);
        }
        if let Some(payment) = &self.payment {
            merged.payment = payment.clone();
        }
        if let Some(origin) = &self.origin {
            merged.origin = origin.clone();
        }
        if let Some(destination) = &self.destination {
            merged.destination = destination.clone();
        }
        if let Some(counterpart) = &self.counterpart {
            merged.counterpart = counterpart.clone();
        }
        merged
    }
}

/// Outcome of [`crate::services::session_store::SessionStore::update_trip`].
#[derive(Debug, Clone, PartialEq)]
pub enum TripUpdate {
    Applied(Trip),
    /// No trip carries the patch id; nothing was written.
    NotFound,
}

impl TripUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, TripUpdate::Applied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trip {
        Trip {
            id: "t1".into(),
            counterpart: Counterpart {
                id: "d1".into(),
                name: "Jane Driver".into(),
            },
            payment: Price {
                amount: 23.5,
                currency: "BRL".into(),
            },
            status: TripStatus::Pending,
            origin: "Rua A".into(),
            destination: "Rua B".into(),
            rating: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn patch_overwrites_only_present_fields() {
        let trip = sample();
        let patched = TripPatch::new("t1")
            .status(TripStatus::Completed)
            .rating(4)
            .apply(&trip);

        assert_eq!(patched.status, TripStatus::Completed);
        assert_eq!(patched.rating, Some(4));
        assert_eq!(patched.origin, trip.origin);
        assert_eq!(patched.payment, trip.payment);
        assert_eq!(patched.created_at, trip.created_at);
    }

    #[test]
    fn empty_patch_is_identity() {
        let trip = sample();
        assert_eq!(TripPatch::new("t1").apply(&trip), trip);
    }

    #[test]
    fn patch_never_changes_id() {
        let trip = sample();
        let patched = TripPatch::new("other").destination("Rua C").apply(&trip);
        assert_eq!(patched.id, "t1");
        assert_eq!(patched.destination, "Rua C");
    }

    #[test]
    fn terminal_states_do_not_reopen() {
        use TripStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Completed));
    }

    #[test]
    fn legacy_cancel_spelling_is_accepted() {
        let status: TripStatus = serde_json::from_str("\"CANCELED\"").expect("decode");
        assert_eq!(status, TripStatus::Cancelled);
        assert_eq!(
            serde_json::to_string(&status).expect("encode"),
            "\"CANCELLED\""
        );
    }
}
