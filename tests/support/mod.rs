use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridesync::{
    models::{actor::ActorRole, trip::TripStatus},
    services::remote::{
        Credentials, LoginResponse, Page, PartyDto, PaymentDto, ProfileUpdateRequest,
        RatingRecord, RegisterRequest, RemoteActor, RemoteApi, RemoteError, TripAction, TripDto,
    },
};

/// Backend double: records what the device sent and fails on demand.
#[derive(Debug, Default)]
pub struct FakeRemote {
    inner: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    history: Vec<TripDto>,
    history_fails: bool,
    history_calls: usize,
    ratings: HashMap<String, RatingRecord>,
    failing_lookups: HashSet<String>,
    failing_submissions: HashSet<String>,
    submitted: Vec<(String, u8, String)>,
    profile_updates: Vec<ProfileUpdateRequest>,
    profile_updates_fail: bool,
    registrations: Vec<RegisterRequest>,
    actions: Vec<(String, TripAction)>,
}

impl FakeRemote {
    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.inner.lock().expect("fake remote lock");
        f(&mut state)
    }

    pub fn add_history_trip(&self, id: &str, created_at: DateTime<Utc>) {
        self.with(|state| {
            let n = state.history.len() + 1;
            state.history.push(TripDto {
                id: id.to_string(),
                customer: PartyDto {
                    id: "c1".into(),
                    name: "Ana".into(),
                    email: None,
                },
                driver: PartyDto {
                    id: format!("d{n}"),
                    name: format!("Driver {n}"),
                    email: None,
                },
                payment: PaymentDto {
                    id: None,
                    method: Some("CARD".into()),
                    amount: 10.0 * n as f64,
                    currency: None,
                },
                status: TripStatus::Completed,
                origin: "Rua A".into(),
                destination: format!("Destino {n}"),
                created_at,
            });
        });
    }

    pub fn rate(&self, trip_id: &str, rating: u8) {
        self.with(|state| {
            state.ratings.insert(
                trip_id.to_string(),
                RatingRecord {
                    trip_id: Some(trip_id.to_string()),
                    rating: Some(rating),
                    feedback: String::new(),
                },
            );
        });
    }

    pub fn fail_history(&self) {
        self.with(|state| state.history_fails = true);
    }

    pub fn fail_lookups_for(&self, trip_id: &str) {
        self.with(|state| state.failing_lookups.insert(trip_id.to_string()));
    }

    pub fn fail_submissions_for(&self, trip_id: &str) {
        self.with(|state| state.failing_submissions.insert(trip_id.to_string()));
    }

    pub fn reject_profile_updates(&self) {
        self.with(|state| state.profile_updates_fail = true);
    }

    pub fn registrations(&self) -> Vec<RegisterRequest> {
        self.with(|state| state.registrations.clone())
    }

    pub fn submitted(&self) -> Vec<(String, u8, String)> {
        self.with(|state| state.submitted.clone())
    }

    pub fn history_calls(&self) -> usize {
        self.with(|state| state.history_calls)
    }

    pub fn profile_updates(&self) -> Vec<ProfileUpdateRequest> {
        self.with(|state| state.profile_updates.clone())
    }

    pub fn actions_for(&self, trip_id: &str) -> Vec<TripAction> {
        self.with(|state| {
            state
                .actions
                .iter()
                .filter(|(id, _)| id == trip_id)
                .map(|(_, action)| *action)
                .collect()
        })
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, RemoteError> {
        Ok(LoginResponse {
            token: format!("token-{}", credentials.email),
        })
    }

    async fn register(
        &self,
        _role: ActorRole,
        request: &RegisterRequest,
    ) -> Result<RemoteActor, RemoteError> {
        self.with(|state| state.registrations.push(request.clone()));
        Ok(RemoteActor {
            id: format!("id-{}", request.email),
            name: request.name.clone(),
            email: request.email.clone(),
            created_at: None,
        })
    }

    async fn trip_history(
        &self,
        _role: ActorRole,
        _page: u32,
        size: u32,
    ) -> Result<Page<TripDto>, RemoteError> {
        let fails = self.with(|state| {
            state.history_calls += 1;
            state.history_fails
        });
        // long enough for a second refresh to overlap this one
        tokio::time::sleep(Duration::from_millis(50)).await;
        if fails {
            return Err(RemoteError::Unavailable("history endpoint down".into()));
        }
        let content: Vec<TripDto> = self.with(|state| {
            state
                .history
                .iter()
                .take(size as usize)
                .cloned()
                .collect()
        });
        Ok(Page {
            total_elements: content.len() as u64,
            total_pages: 1,
            size,
            number: 0,
            content,
        })
    }

    async fn fetch_rating(&self, trip_id: &str) -> Result<Option<RatingRecord>, RemoteError> {
        self.with(|state| {
            if state.failing_lookups.contains(trip_id) {
                return Err(RemoteError::Status {
                    status: 500,
                    body: "rating service down".into(),
                });
            }
            Ok(state.ratings.get(trip_id).cloned())
        })
    }

    async fn submit_rating(
        &self,
        trip_id: &str,
        rating: u8,
        feedback: &str,
    ) -> Result<(), RemoteError> {
        self.with(|state| {
            if state.failing_submissions.contains(trip_id) {
                return Err(RemoteError::Unavailable("rating endpoint down".into()));
            }
            state
                .submitted
                .push((trip_id.to_string(), rating, feedback.to_string()));
            Ok(())
        })
    }

    async fn update_profile(
        &self,
        _role: ActorRole,
        request: &ProfileUpdateRequest,
    ) -> Result<(), RemoteError> {
        self.with(|state| {
            if state.profile_updates_fail {
                return Err(RemoteError::Status {
                    status: 422,
                    body: "profile rejected".into(),
                });
            }
            state.profile_updates.push(request.clone());
            Ok(())
        })
    }

    async fn trip_action(&self, trip_id: &str, action: TripAction) -> Result<(), RemoteError> {
        self.with(|state| state.actions.push((trip_id.to_string(), action)));
        Ok(())
    }
}
