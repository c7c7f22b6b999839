//! User-initiated flows. Each writes through the session store first where it can and
//! falls back to the deferred-sync queues when the backend cannot be reached.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{self, AuthenticatedActor},
    error::AppError,
    models::{
        actor::{Actor, ActorRole, BankAccount, PaymentCard, Vehicle},
        pending::{PendingProfileUpdate, PendingRating},
        trip::{NewTrip, Trip, TripPatch, TripStatus, TripUpdate},
    },
    services::{
        connectivity::Connectivity,
        pricing::FareTable,
        remote::{Credentials, ProfileUpdateRequest, RegisterRequest, RemoteApi, TripAction},
        session_store::SessionStore,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Stored locally and queued for the next reconciliation pass.
    Queued,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub role: ActorRole,
    pub name: String,
    pub email: String,
    pub password: String,
    pub payment_card: Option<PaymentCard>,
    /// Driver only.
    pub vehicle: Option<Vehicle>,
    /// Driver only.
    pub bank_account: Option<BankAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEdit {
    pub name: String,
    pub email: String,
    /// `None` keeps the current password.
    pub password: Option<String>,
    pub payment_card: Option<PaymentCard>,
    pub vehicle: Option<Vehicle>,
    pub bank_account: Option<BankAccount>,
}

#[derive(Clone)]
pub struct SessionActions {
    store: SessionStore,
    remote: Arc<dyn RemoteApi>,
    connectivity: Arc<dyn Connectivity>,
    fares: FareTable,
}

impl SessionActions {
    pub fn new(
        store: SessionStore,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn Connectivity>,
        fares: FareTable,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            fares,
        }
    }

    pub async fn register(&self, form: Registration) -> Result<Actor, AppError> {
        let request = RegisterRequest::new(
            &form.name,
            &form.email,
            &form.password,
            form.payment_card.as_ref(),
            form.vehicle.as_ref(),
            form.bank_account.as_ref(),
        );
        let created = self.remote.register(form.role, &request).await?;
        let login = self
            .remote
            .login(&Credentials {
                email: form.email.clone(),
                password: form.password.clone(),
            })
            .await?;

        let mut actor = Actor::new(
            created.id,
            created.name,
            created.email,
            auth::hash_credential(&form.password)?,
            form.role,
        );
        actor.created_at = created.created_at.unwrap_or_else(Utc::now);
        actor.payment_card = form.payment_card;
        actor.vehicle = form.vehicle;
        actor.bank_account = form.bank_account;

        self.store.set_auth_token(&login.token).await?;
        self.store.save_actor(&actor).await?;
        info!(actor_id = %actor.id, role = %actor.role, "registered");
        Ok(actor)
    }

    /// Logs in against the backend and stores the token. A stored actor with the
    /// same email gets its credential refreshed.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<Actor>, AppError> {
        let login = self
            .remote
            .login(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.store.set_auth_token(&login.token).await?;

        match self.store.get_actor().await? {
            Some(actor) if actor.matches_email(email) => {
                let credential = auth::hash_credential(password)?;
                let actor = self
                    .store
                    .modify_actor(move |actor| {
                        actor.credential = credential;
                        Ok(())
                    })
                    .await?;
                Ok(Some(actor))
            }
            _ => Ok(None),
        }
    }

    pub async fn login_offline(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedActor, AppError> {
        auth::authenticate_offline(&self.store, email, password).await
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        self.store.clear_actor().await?;
        self.store.clear_auth_token().await?;
        self.store.clear_pending_ratings().await?;
        info!("logged out");
        Ok(())
    }

    pub async fn request_trip(
        &self,
        origin: &str,
        destination: &str,
        distance_km: f64,
    ) -> Result<Trip, AppError> {
        let payment = self.fares.quote(distance_km)?;
        let trip = NewTrip::pending(Uuid::new_v4().to_string(), payment, origin, destination);
        self.store.add_trip(trip).await
    }

    /// Driver side: takes an incoming offer. The trip is stored with the offer's
    /// customer as counterpart and moves to IN_PROGRESS.
    pub async fn take_offer(&self, offer: Trip) -> Result<Trip, AppError> {
        self.settle_offer(offer, TripAction::Accept).await
    }

    /// Driver side: turns an offer down. It is kept in history as CANCELLED.
    pub async fn decline_offer(&self, offer: Trip) -> Result<Trip, AppError> {
        self.settle_offer(offer, TripAction::Cancel).await
    }

    pub async fn accept_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.advance(trip_id, TripAction::Accept).await
    }

    pub async fn start_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.advance(trip_id, TripAction::Start).await
    }

    pub async fn complete_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.advance(trip_id, TripAction::Complete).await
    }

    pub async fn cancel_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.advance(trip_id, TripAction::Cancel).await
    }

    /// Rates a trip. The local copy shows the rating right away; the backend gets it
    /// now or on the next reconciliation pass.
    pub async fn submit_rating(
        &self,
        trip_id: &str,
        rating: u8,
        feedback: &str,
    ) -> Result<Delivery, AppError> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::InvalidRating(rating));
        }

        match self
            .store
            .update_trip(&TripPatch::new(trip_id).rating(rating))
            .await
        {
            Ok(TripUpdate::Applied(_)) => {}
            Ok(TripUpdate::NotFound) | Err(AppError::NoTrips) => {
                warn!(trip_id, "rated trip is not in local history");
            }
            Err(err) => return Err(err),
        }

        if self.connectivity.is_connected().await {
            match self.remote.submit_rating(trip_id, rating, feedback).await {
                Ok(()) => return Ok(Delivery::Sent),
                Err(err) => warn!(trip_id, "rating not sent, queueing: {err}"),
            }
        }
        self.store
            .enqueue_rating(PendingRating::new(trip_id, rating, feedback))
            .await?;
        Ok(Delivery::Queued)
    }

    pub async fn save_profile(&self, edit: ProfileEdit) -> Result<Delivery, AppError> {
        let actor = self.store.get_actor().await?.ok_or(AppError::NoActor)?;
        let pending = PendingProfileUpdate {
            name: edit.name,
            email: edit.email,
            password: edit.password,
            payment_card: edit.payment_card.or(actor.payment_card.clone()),
            vehicle: edit.vehicle.or(actor.vehicle.clone()),
            bank_account: edit.bank_account.or(actor.bank_account.clone()),
            needs_sync: true,
        };

        let mut delivery = Delivery::Queued;
        if self.connectivity.is_connected().await {
            let request = ProfileUpdateRequest::from_pending(&pending);
            match self.remote.update_profile(actor.role, &request).await {
                Ok(()) => delivery = Delivery::Sent,
                Err(err) => warn!("profile update not sent, queueing: {err}"),
            }
        }

        self.store
            .modify_actor(|actor| pending.apply_to(actor))
            .await?;
        match delivery {
            Delivery::Sent => self.store.clear_pending_update().await?,
            Delivery::Queued => self.store.set_pending_update(&pending).await?,
        }
        Ok(delivery)
    }

    async fn settle_offer(&self, offer: Trip, action: TripAction) -> Result<Trip, AppError> {
        let target = action.target_status();
        if offer.status != TripStatus::Pending {
            return Err(AppError::InvalidTransition {
                from: offer.status,
                to: target,
            });
        }
        let actor = self.store.get_actor().await?.ok_or(AppError::NoActor)?;
        if actor.find_trip(&offer.id).is_some() {
            return Err(AppError::DuplicateTrip(offer.id));
        }

        if self.connectivity.is_connected().await {
            self.remote.trip_action(&offer.id, action).await?;
        } else {
            warn!(
                trip_id = %offer.id,
                action = action.as_str(),
                "offline, offer settled locally only"
            );
        }

        let trip = Trip {
            status: target,
            ..offer
        };
        let trip = self.store.add_received_trip(trip).await?;
        info!(
            trip_id = %trip.id,
            customer = %trip.counterpart.name,
            status = %trip.status,
            "offer settled"
        );
        Ok(trip)
    }

    async fn advance(&self, trip_id: &str, action: TripAction) -> Result<Trip, AppError> {
        let actor = self.store.get_actor().await?.ok_or(AppError::NoActor)?;
        let current = actor
            .find_trip(trip_id)
            .ok_or_else(|| AppError::TripNotFound(trip_id.to_string()))?;
        let target = action.target_status();
        if !current.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }

        if self.connectivity.is_connected().await {
            self.remote.trip_action(trip_id, action).await?;
        } else {
            warn!(trip_id, action = action.as_str(), "offline, trip updated locally only");
        }

        match self
            .store
            .update_trip(&TripPatch::new(trip_id).status(target))
            .await?
        {
            TripUpdate::Applied(trip) => Ok(trip),
            TripUpdate::NotFound => Err(AppError::TripNotFound(trip_id.to_string())),
        }
    }
}
