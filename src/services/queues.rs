//! Deferred-sync queues: ratings and the single profile edit that could not reach the
//! backend yet. Both live next to the actor record and go through [`SessionStore`].

use crate::{
    error::AppError,
    models::pending::{PendingProfileUpdate, PendingRating},
    services::session_store::{SessionStore, PENDING_RATINGS_KEY, PENDING_UPDATE_KEY},
};

impl SessionStore {
    pub async fn enqueue_rating(&self, rating: PendingRating) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut queue: Vec<PendingRating> =
            self.read_json(PENDING_RATINGS_KEY).await?.unwrap_or_default();
        queue.push(rating);
        self.write_json(PENDING_RATINGS_KEY, &queue).await
    }

    pub async fn list_pending_ratings(&self) -> Result<Vec<PendingRating>, AppError> {
        Ok(self.read_json(PENDING_RATINGS_KEY).await?.unwrap_or_default())
    }

    pub async fn clear_pending_ratings(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(PENDING_RATINGS_KEY).await
    }

    /// Removes one queued entry per element of `handled`, matched by value, and keeps
    /// everything else, including ratings queued after `handled` was read. Returns how
    /// many entries were removed. The key is dropped once the queue is empty.
    pub async fn remove_pending_ratings(
        &self,
        handled: &[PendingRating],
    ) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut queue: Vec<PendingRating> =
            self.read_json(PENDING_RATINGS_KEY).await?.unwrap_or_default();

        let mut removed = 0;
        for entry in handled {
            if let Some(index) = queue.iter().position(|queued| queued == entry) {
                queue.remove(index);
                removed += 1;
            }
        }

        if queue.is_empty() {
            self.kv.remove(PENDING_RATINGS_KEY).await?;
        } else {
            self.write_json(PENDING_RATINGS_KEY, &queue).await?;
        }
        Ok(removed)
    }

    pub async fn set_pending_update(&self, update: &PendingProfileUpdate) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.write_json(PENDING_UPDATE_KEY, update).await
    }

    pub async fn get_pending_update(&self) -> Result<Option<PendingProfileUpdate>, AppError> {
        self.read_json(PENDING_UPDATE_KEY).await
    }

    pub async fn clear_pending_update(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(PENDING_UPDATE_KEY).await
    }

    /// Folds a delivered profile edit into the stored actor and empties the slot, but
    /// only while the slot still holds `sent`. A newer edit saved meanwhile stays
    /// queued and the actor keeps it. Returns whether the slot was settled.
    pub async fn settle_pending_update(
        &self,
        sent: &PendingProfileUpdate,
    ) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let current: Option<PendingProfileUpdate> = self.read_json(PENDING_UPDATE_KEY).await?;
        if current.as_ref() != Some(sent) {
            return Ok(false);
        }

        if let Some(mut actor) = self.get_actor().await? {
            sent.apply_to(&mut actor)?;
            self.write_actor(&actor).await?;
        }
        self.kv.remove(PENDING_UPDATE_KEY).await?;
        Ok(true)
    }
}
