use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        actor::Actor,
        trip::{Counterpart, NewTrip, Trip, TripPatch, TripUpdate},
    },
    services::kv::KeyValueStore,
};

pub const ACTOR_KEY: &str = "current-actor";
pub const PENDING_RATINGS_KEY: &str = "pending-ratings";
pub const PENDING_UPDATE_KEY: &str = "pending-customer-update";
pub const AUTH_TOKEN_KEY: &str = "auth-token";

pub const DEFAULT_COUNTERPART_NAME: &str = "Jane Driver";

/// Owner of every persisted session key: the actor record with its trips, both sync
/// queues and the bearer token.
///
/// Read-modify-write sequences run under `write_lock`, so two tasks adding trips at
/// the same time both land.
#[derive(Clone)]
pub struct SessionStore {
    pub(crate) kv: Arc<dyn KeyValueStore>,
    pub(crate) write_lock: Arc<Mutex<()>>,
    actor_tx: Arc<watch::Sender<Option<Actor>>>,
    counterpart_name: Arc<str>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (actor_tx, _) = watch::channel(None);
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
            actor_tx: Arc::new(actor_tx),
            counterpart_name: Arc::from(DEFAULT_COUNTERPART_NAME),
        }
    }

    /// Name shown for the counterpart of a locally requested trip until the backend
    /// assigns the real one.
    pub fn with_counterpart_placeholder(mut self, name: impl Into<String>) -> Self {
        self.counterpart_name = Arc::from(name.into());
        self
    }

    /// Loads the persisted actor into the watch channel.
    pub async fn hydrate(&self) -> Result<Option<Actor>, AppError> {
        let actor = self.get_actor().await?;
        self.actor_tx.send_replace(actor.clone());
        Ok(actor)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Actor>> {
        self.actor_tx.subscribe()
    }

    /// Last actor written or loaded through this store.
    pub fn current(&self) -> Option<Actor> {
        self.actor_tx.borrow().clone()
    }

    pub async fn save_actor(&self, actor: &Actor) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.write_actor(actor).await
    }

    pub async fn get_actor(&self) -> Result<Option<Actor>, AppError> {
        self.read_json(ACTOR_KEY).await
    }

    /// Logs the actor out locally. The pending profile edit belongs to that actor and
    /// goes with it.
    pub async fn clear_actor(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(ACTOR_KEY).await?;
        self.kv.remove(PENDING_UPDATE_KEY).await?;
        self.actor_tx.send_replace(None);
        debug!("cleared local actor");
        Ok(())
    }

    /// Read-modify-write of the actor record under the store lock.
    pub async fn modify_actor<F>(&self, change: F) -> Result<Actor, AppError>
    where
        F: FnOnce(&mut Actor) -> Result<(), AppError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut actor = self.get_actor().await?.ok_or(AppError::NoActor)?;
        change(&mut actor)?;
        self.write_actor(&actor).await?;
        Ok(actor)
    }

    /// Appends a locally requested trip. The counterpart is a placeholder with a fresh
    /// id until the backend assigns the real one.
    pub async fn add_trip(&self, new_trip: NewTrip) -> Result<Trip, AppError> {
        let trip = Trip {
            id: new_trip.id,
            counterpart: Counterpart {
                id: Uuid::new_v4().to_string(),
                name: self.counterpart_name.to_string(),
            },
            payment: new_trip.payment,
            status: new_trip.status,
            origin: new_trip.origin,
            destination: new_trip.destination,
            rating: new_trip.rating,
            created_at: Utc::now(),
        };
        self.push_trip(trip).await
    }

    /// Appends a trip that already carries its counterpart, such as an offer a driver
    /// took.
    pub async fn add_received_trip(&self, trip: Trip) -> Result<Trip, AppError> {
        self.push_trip(trip).await
    }

    async fn push_trip(&self, trip: Trip) -> Result<Trip, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut actor = self.get_actor().await?.ok_or(AppError::NoActor)?;
        if actor.find_trip(&trip.id).is_some() {
            return Err(AppError::DuplicateTrip(trip.id));
        }

        actor.trips.push(trip.clone());
        self.write_actor(&actor).await?;
        debug!(trip_id = %trip.id, total = actor.trips.len(), "trip added");
        Ok(trip)
    }

    /// Patches the trip with `patch.id`. An unknown id writes nothing and reports
    /// [`TripUpdate::NotFound`].
    pub async fn update_trip(&self, patch: &TripPatch) -> Result<TripUpdate, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut actor = match self.get_actor().await? {
            Some(actor) if !actor.trips.is_empty() => actor,
            _ => return Err(AppError::NoTrips),
        };

        let Some(slot) = actor.trips.iter_mut().find(|trip| trip.id == patch.id) else {
            debug!(trip_id = %patch.id, "update for unknown trip ignored");
            return Ok(TripUpdate::NotFound);
        };
        *slot = patch.apply(slot);
        let updated = slot.clone();
        self.write_actor(&actor).await?;
        Ok(TripUpdate::Applied(updated))
    }

    /// Overwrites the trip collection. A repeated id keeps its first entry.
    pub async fn replace_trips(&self, trips: Vec<Trip>) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut actor = self.get_actor().await?.ok_or(AppError::NoActor)?;
        let mut seen = HashSet::with_capacity(trips.len());
        let total = trips.len();
        actor.trips = trips
            .into_iter()
            .filter(|trip| seen.insert(trip.id.clone()))
            .collect();
        if actor.trips.len() < total {
            warn!(
                dropped = total - actor.trips.len(),
                "duplicate trip ids dropped from history"
            );
        }
        self.write_actor(&actor).await
    }

    /// Never fails: an unreadable record is logged and reads as no trips.
    pub async fn list_trips(&self) -> Vec<Trip> {
        match self.get_actor().await {
            Ok(Some(actor)) => actor.trips,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("could not read local trips: {err}");
                Vec::new()
            }
        }
    }

    pub async fn set_auth_token(&self, token: &str) -> Result<(), AppError> {
        self.kv.set(AUTH_TOKEN_KEY, token).await
    }

    pub async fn auth_token(&self) -> Result<Option<String>, AppError> {
        Ok(self
            .kv
            .get(AUTH_TOKEN_KEY)
            .await?
            .filter(|token| !token.trim().is_empty()))
    }

    pub async fn clear_auth_token(&self) -> Result<(), AppError> {
        self.kv.remove(AUTH_TOKEN_KEY).await
    }

    /// Wipes every key on the device, not only the ones this store knows about.
    pub async fn reset(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.kv.clear().await?;
        self.actor_tx.send_replace(None);
        Ok(())
    }

    pub(crate) async fn write_actor(&self, actor: &Actor) -> Result<(), AppError> {
        self.write_json(ACTOR_KEY, actor).await?;
        self.actor_tx.send_replace(Some(actor.clone()));
        Ok(())
    }

    pub(crate) async fn read_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, AppError> {
        match self.kv.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), AppError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw).await
    }
}
