//! Bringing the device in line with the backend when a screen becomes active.
//!
//! Every pass is best effort: remote failures are logged and the caller gets whatever
//! the device last stored.

use std::{collections::HashMap, str::FromStr, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    models::{
        actor::ActorRole,
        pending::PendingRating,
        trip::{Counterpart, Price, Trip, TripStatus},
    },
    services::{
        connectivity::Connectivity,
        remote::{ProfileUpdateRequest, RemoteApi, RemoteError, TripDto},
        session_store::SessionStore,
    },
};

/// What happens to the rating queue after a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Clear everything once the pass is over, including entries that failed.
    #[default]
    ClearOnFullDrain,
    /// Keep the entries the backend did not accept for the next pass.
    ClearOnlySynced,
}

impl FromStr for DrainPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "clear-all" => Ok(DrainPolicy::ClearOnFullDrain),
            "clear-synced" => Ok(DrainPolicy::ClearOnlySynced),
            other => Err(format!("unknown drain policy {other:?}")),
        }
    }
}

/// Rating shown for a trip whose rating lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RatingFallback {
    #[default]
    Unrated,
    /// Whatever the local copy of the trip carried before the refresh.
    LocalCache,
}

impl FromStr for RatingFallback {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "unrated" => Ok(RatingFallback::Unrated),
            "local" => Ok(RatingFallback::LocalCache),
            other => Err(format!("unknown rating fallback {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Used when no actor is stored yet.
    pub role: ActorRole,
    pub history_page_size: u32,
    pub display_limit: usize,
    pub drain_policy: DrainPolicy,
    pub rating_fallback: RatingFallback,
    /// Currency for history entries whose payment carries none.
    pub currency: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            role: ActorRole::Customer,
            history_page_size: 100,
            display_limit: 3,
            drain_policy: DrainPolicy::default(),
            rating_fallback: RatingFallback::default(),
            currency: "BRL".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RatingLookup {
    Rated(u8),
    /// The backend confirmed there is no rating.
    Unrated,
    FetchFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripSource {
    Remote,
    /// Offline; served from the device.
    Cache,
    /// The remote pass failed; served from the device.
    Fallback { reason: String },
    /// Another pass was already running; served from what it stored.
    Joined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripsView {
    /// Newest first, at most `display_limit` entries.
    pub trips: Vec<Trip>,
    pub source: TripSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub offline: bool,
    pub sent: usize,
    pub failed: Vec<String>,
    pub cleared: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSync {
    Nothing,
    Synced,
    Deferred,
    Offline,
}

#[derive(Clone)]
pub struct Reconciler {
    store: SessionStore,
    remote: Arc<dyn RemoteApi>,
    connectivity: Arc<dyn Connectivity>,
    settings: SyncSettings,
    in_flight: Arc<Mutex<()>>,
}

impl Reconciler {
    pub fn new(
        store: SessionStore,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn Connectivity>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            settings,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Trip-history refresh. Never fails; at worst the view is stale.
    pub async fn refresh_trips(&self) -> TripsView {
        let _pass = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("trip refresh already running, waiting for it");
                let _finished = self.in_flight.lock().await;
                return self.view(self.store.list_trips().await, TripSource::Joined);
            }
        };

        if !self.connectivity.is_connected().await {
            debug!("offline, serving cached trips");
            return self.view(self.store.list_trips().await, TripSource::Cache);
        }

        match self.pull_history().await {
            Ok(trips) => self.view(trips, TripSource::Remote),
            Err(err) => {
                warn!("trip refresh failed, serving cached trips: {err}");
                self.view(
                    self.store.list_trips().await,
                    TripSource::Fallback {
                        reason: err.to_string(),
                    },
                )
            }
        }
    }

    pub async fn drain_ratings(&self) -> Result<DrainReport, AppError> {
        if !self.connectivity.is_connected().await {
            return Ok(DrainReport {
                offline: true,
                ..DrainReport::default()
            });
        }
        self.drain_connected().await
    }

    /// Sends the pending profile edit, if any, and folds it into the stored actor.
    pub async fn sync_profile(&self) -> Result<ProfileSync, AppError> {
        let Some(update) = self
            .store
            .get_pending_update()
            .await?
            .filter(|update| update.needs_sync)
        else {
            return Ok(ProfileSync::Nothing);
        };
        if !self.connectivity.is_connected().await {
            return Ok(ProfileSync::Offline);
        }

        let request = ProfileUpdateRequest::from_pending(&update);
        if let Err(err) = self.remote.update_profile(self.role().await, &request).await {
            warn!("pending profile update not synced: {err}");
            return Ok(ProfileSync::Deferred);
        }

        if self.store.settle_pending_update(&update).await? {
            info!("pending profile update synced");
        } else {
            info!("profile update synced; a newer edit stays queued");
        }
        Ok(ProfileSync::Synced)
    }

    pub async fn lookup_rating(&self, trip_id: &str) -> RatingLookup {
        match self.remote.fetch_rating(trip_id).await {
            Ok(Some(record)) => match record.rating {
                Some(rating @ 1..=5) => RatingLookup::Rated(rating),
                _ => RatingLookup::Unrated,
            },
            Ok(None) | Err(RemoteError::NotFound) => RatingLookup::Unrated,
            Err(err) => {
                warn!(trip_id, "rating lookup failed: {err}");
                RatingLookup::FetchFailed(err.to_string())
            }
        }
    }

    async fn pull_history(&self) -> Result<Vec<Trip>, AppError> {
        self.drain_connected().await?;

        let actor = self.store.get_actor().await?;
        let role = actor
            .as_ref()
            .map(|actor| actor.role)
            .unwrap_or(self.settings.role);
        let cached: HashMap<String, Option<u8>> = actor
            .as_ref()
            .map(|actor| {
                actor
                    .trips
                    .iter()
                    .map(|trip| (trip.id.clone(), trip.rating))
                    .collect()
            })
            .unwrap_or_default();

        let page = self
            .remote
            .trip_history(role, 0, self.settings.history_page_size)
            .await?;

        let mut trips = Vec::with_capacity(page.content.len());
        for dto in page.content {
            let lookup = if dto.status == TripStatus::Cancelled {
                RatingLookup::Unrated
            } else {
                self.lookup_rating(&dto.id).await
            };
            let rating = match lookup {
                RatingLookup::Rated(rating) => Some(rating),
                RatingLookup::Unrated => None,
                RatingLookup::FetchFailed(_) => match self.settings.rating_fallback {
                    RatingFallback::Unrated => None,
                    RatingFallback::LocalCache => cached.get(&dto.id).copied().flatten(),
                },
            };
            trips.push(trip_from_dto(dto, role, rating, &self.settings.currency));
        }

        if actor.is_some() {
            self.store.replace_trips(trips.clone()).await?;
        }
        info!(count = trips.len(), "trip history refreshed");
        Ok(trips)
    }

    async fn drain_connected(&self) -> Result<DrainReport, AppError> {
        let queue = self.store.list_pending_ratings().await?;
        if queue.is_empty() {
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport::default();
        let mut synced: Vec<PendingRating> = Vec::with_capacity(queue.len());
        for pending in &queue {
            if !pending.needs_sync {
                synced.push(pending.clone());
                continue;
            }
            match self
                .remote
                .submit_rating(&pending.trip_id, pending.rating, &pending.feedback)
                .await
            {
                Ok(()) => {
                    report.sent += 1;
                    synced.push(pending.clone());
                }
                Err(err) => {
                    warn!(trip_id = %pending.trip_id, "rating sync failed: {err}");
                    report.failed.push(pending.trip_id.clone());
                }
            }
        }

        // only entries read above are removed; ratings queued during the pass stay
        let handled = match self.settings.drain_policy {
            DrainPolicy::ClearOnFullDrain => &queue,
            DrainPolicy::ClearOnlySynced => &synced,
        };
        report.cleared = self.store.remove_pending_ratings(handled).await?;
        debug!(
            sent = report.sent,
            failed = report.failed.len(),
            cleared = report.cleared,
            "rating queue drained"
        );
        Ok(report)
    }

    async fn role(&self) -> ActorRole {
        match self.store.get_actor().await {
            Ok(Some(actor)) => actor.role,
            _ => self.settings.role,
        }
    }

    fn view(&self, mut trips: Vec<Trip>, source: TripSource) -> TripsView {
        // reversing first keeps later-appended trips ahead on equal timestamps
        trips.reverse();
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        trips.truncate(self.settings.display_limit);
        TripsView { trips, source }
    }
}

fn trip_from_dto(dto: TripDto, role: ActorRole, rating: Option<u8>, currency: &str) -> Trip {
    let party = match role {
        ActorRole::Customer => dto.driver,
        ActorRole::Driver => dto.customer,
    };
    Trip {
        id: dto.id,
        counterpart: Counterpart {
            id: party.id,
            name: party.name,
        },
        payment: Price {
            amount: dto.payment.amount,
            currency: dto.payment.currency.unwrap_or_else(|| currency.to_string()),
        },
        status: dto.status,
        origin: dto.origin,
        destination: dto.destination,
        rating,
        created_at: dto.created_at,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use url::Url;

    use super::*;
    use crate::{
        models::{actor::Actor, pending::PendingProfileUpdate},
        services::{
            connectivity::ManualConnectivity,
            kv::MemoryStore,
            remote::{
                Credentials, HttpRemote, LoginResponse, Page, RatingRecord, RegisterRequest,
                RemoteActor, TripAction,
            },
        },
    };

    /// Backend that writes to the device store while a send is in flight, the way a
    /// screen would when the user acts during a sync pass.
    struct BusyDeviceRemote {
        store: SessionStore,
        failing_trip: &'static str,
    }

    fn unused() -> RemoteError {
        RemoteError::Unavailable("not used here".into())
    }

    fn edit(name: &str) -> PendingProfileUpdate {
        PendingProfileUpdate {
            name: name.into(),
            email: "ana@example.com".into(),
            password: None,
            payment_card: None,
            vehicle: None,
            bank_account: None,
            needs_sync: true,
        }
    }

    #[async_trait]
    impl RemoteApi for BusyDeviceRemote {
        async fn login(&self, _: &Credentials) -> Result<LoginResponse, RemoteError> {
            Err(unused())
        }

        async fn register(
            &self,
            _: ActorRole,
            _: &RegisterRequest,
        ) -> Result<RemoteActor, RemoteError> {
            Err(unused())
        }

        async fn trip_history(
            &self,
            _: ActorRole,
            _: u32,
            _: u32,
        ) -> Result<Page<TripDto>, RemoteError> {
            Err(unused())
        }

        async fn fetch_rating(
            &self,
            _: &str,
        ) -> Result<Option<RatingRecord>, RemoteError> {
            Err(unused())
        }

        async fn submit_rating(&self, trip_id: &str, _: u8, _: &str) -> Result<(), RemoteError> {
            if trip_id == self.failing_trip {
                return Err(RemoteError::Unavailable("rating endpoint down".into()));
            }
            if trip_id == "t1" {
                self.store
                    .enqueue_rating(PendingRating::new("t3", 5, "late"))
                    .await
                    .expect("enqueue during drain");
            }
            Ok(())
        }

        async fn update_profile(
            &self,
            _: ActorRole,
            _: &ProfileUpdateRequest,
        ) -> Result<(), RemoteError> {
            self.store
                .set_pending_update(&edit("Ana Newer"))
                .await
                .expect("edit during sync");
            Ok(())
        }

        async fn trip_action(&self, _: &str, _: TripAction) -> Result<(), RemoteError> {
            Err(unused())
        }
    }

    fn busy_reconciler(store: &SessionStore, policy: DrainPolicy) -> Reconciler {
        let remote = BusyDeviceRemote {
            store: store.clone(),
            failing_trip: "t2",
        };
        Reconciler::new(
            store.clone(),
            Arc::new(remote),
            Arc::new(ManualConnectivity::new(true)),
            SyncSettings {
                drain_policy: policy,
                ..SyncSettings::default()
            },
        )
    }

    async fn queue_two(store: &SessionStore) {
        store
            .enqueue_rating(PendingRating::new("t1", 4, ""))
            .await
            .expect("enqueue");
        store
            .enqueue_rating(PendingRating::new("t2", 2, ""))
            .await
            .expect("enqueue");
    }

    fn queued_ids(queue: &[PendingRating]) -> Vec<&str> {
        queue.iter().map(|rating| rating.trip_id.as_str()).collect()
    }

    #[tokio::test]
    async fn rating_queued_during_a_drain_survives_clear_only_synced() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        queue_two(&store).await;

        let report = busy_reconciler(&store, DrainPolicy::ClearOnlySynced)
            .drain_ratings()
            .await
            .expect("drain");

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, vec!["t2".to_string()]);
        assert_eq!(report.cleared, 1);
        let remaining = store.list_pending_ratings().await.expect("list");
        assert_eq!(queued_ids(&remaining), vec!["t2", "t3"]);
    }

    #[tokio::test]
    async fn rating_queued_during_a_drain_survives_clear_all() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        queue_two(&store).await;

        let report = busy_reconciler(&store, DrainPolicy::ClearOnFullDrain)
            .drain_ratings()
            .await
            .expect("drain");

        assert_eq!(report.cleared, 2);
        let remaining = store.list_pending_ratings().await.expect("list");
        assert_eq!(queued_ids(&remaining), vec!["t3"]);
    }

    #[tokio::test]
    async fn profile_edit_saved_during_sync_stays_queued() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        let actor = Actor::new("c1", "Ana Newer", "ana@example.com", "hash", ActorRole::Customer);
        store.save_actor(&actor).await.expect("save");
        store.set_pending_update(&edit("Ana Older")).await.expect("queue");

        let outcome = busy_reconciler(&store, DrainPolicy::default())
            .sync_profile()
            .await
            .expect("sync");

        assert_eq!(outcome, ProfileSync::Synced);
        assert_eq!(
            store.get_pending_update().await.expect("get"),
            Some(edit("Ana Newer"))
        );
        let stored = store.get_actor().await.expect("get").expect("actor");
        assert_eq!(stored.name, "Ana Newer");
    }

    fn offline_reconciler(store: SessionStore) -> Reconciler {
        let remote = HttpRemote::new(
            Url::parse("http://127.0.0.1:9/api/").expect("url"),
            Duration::from_millis(200),
            store.clone(),
        )
        .expect("client");
        Reconciler::new(
            store,
            Arc::new(remote),
            Arc::new(ManualConnectivity::new(false)),
            SyncSettings::default(),
        )
    }

    fn trip(id: &str, created_at: chrono::DateTime<Utc>) -> Trip {
        Trip {
            id: id.into(),
            counterpart: Counterpart {
                id: "d1".into(),
                name: "Jane Driver".into(),
            },
            payment: Price {
                amount: 10.0,
                currency: "BRL".into(),
            },
            status: TripStatus::Completed,
            origin: "A".into(),
            destination: "B".into(),
            rating: None,
            created_at,
        }
    }

    #[test]
    fn policies_parse_from_config_values() {
        assert_eq!("clear-all".parse::<DrainPolicy>(), Ok(DrainPolicy::ClearOnFullDrain));
        assert_eq!("clear-synced".parse::<DrainPolicy>(), Ok(DrainPolicy::ClearOnlySynced));
        assert!("sometimes".parse::<DrainPolicy>().is_err());
        assert_eq!("local".parse::<RatingFallback>(), Ok(RatingFallback::LocalCache));
        assert_eq!(" unrated ".parse::<RatingFallback>(), Ok(RatingFallback::Unrated));
    }

    #[tokio::test]
    async fn offline_refresh_orders_ties_by_append_order() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store
            .save_actor(&Actor::new("c1", "Ana", "ana@example.com", "hash", ActorRole::Customer))
            .await
            .expect("save");
        let now = Utc::now();
        let older = now - chrono::Duration::minutes(5);
        store
            .replace_trips(vec![
                trip("a", older),
                trip("b", now),
                trip("c", now),
                trip("d", older),
            ])
            .await
            .expect("seed");

        let view = offline_reconciler(store).refresh_trips().await;
        assert_eq!(view.source, TripSource::Cache);
        let ids: Vec<&str> = view.trips.iter().map(|trip| trip.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
    }

    #[tokio::test]
    async fn offline_drain_keeps_the_queue() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store
            .enqueue_rating(PendingRating::new("t1", 4, ""))
            .await
            .expect("enqueue");

        let report = offline_reconciler(store.clone())
            .drain_ratings()
            .await
            .expect("drain");
        assert!(report.offline);
        assert_eq!(store.list_pending_ratings().await.expect("list").len(), 1);
    }
}
