//! # Meal Votes
//!
//! Per user, meal and day a vote goes `NotVoted -> Voted` exactly once. The
//! only ways back are a new day key or an admin reset of today.
//!
//! Each operation resolves the day key once and uses it for every store call
//! it makes, so a request straddling midnight never touches two days.
//!
//! Views are always rebuilt from a fresh store read after a mutation, never
//! patched from the previous view.
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    day::{DayKey, DayKeyResolver},
    identity::{Identity, Role},
    ledger::{LedgerStore, Meal, MealCounts, OwnVotes, StoreError, VoteLedger},
};

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("Invalid meal type: {0}")]
    InvalidInput(String),

    #[error("You have already voted for {0}.")]
    AlreadyVoted(Meal),

    #[error("Access denied. Requires {required} role.")]
    PermissionDenied { required: Role },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, VoteError::Store(e) if e.is_retryable())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoteSummary {
    pub counts: MealCounts,
    #[serde(rename = "userVotes")]
    pub own_votes: OwnVotes,
}

impl VoteSummary {
    fn of(ledger: &VoteLedger, identity: &Identity) -> Self {
        Self {
            counts: ledger.counts(),
            own_votes: ledger.own_votes(&identity.id),
        }
    }
}

pub struct VoteService<S> {
    store: S,
    days: DayKeyResolver,
}

impl<S: LedgerStore> VoteService<S> {
    pub fn new(store: S, days: DayKeyResolver) -> Self {
        Self { store, days }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn today(&self) -> DayKey {
        self.days.today_key()
    }

    #[instrument(skip_all, fields(user = %identity.id))]
    pub async fn status(&self, identity: &Identity) -> Result<VoteSummary, VoteError> {
        let day = self.days.today_key();
        let ledger = self.store.read(&day).await?;

        Ok(VoteSummary::of(&ledger, identity))
    }

    #[instrument(skip_all, fields(user = %identity.id, meal = meal))]
    pub async fn cast_vote(
        &self,
        identity: &Identity,
        meal: &str,
    ) -> Result<VoteSummary, VoteError> {
        let meal: Meal = meal
            .parse()
            .map_err(|_| VoteError::InvalidInput(meal.to_string()))?;

        let day = self.days.today_key();
        let outcome = self.store.add_vote(&day, meal, &identity.id).await?;

        if !outcome.added {
            warn!(%day, "Duplicate {meal} vote rejected");
            return Err(VoteError::AlreadyVoted(meal));
        }

        info!(%day, count = outcome.counts.get(meal), "Vote recorded");

        let ledger = self.store.read(&day).await?;

        Ok(VoteSummary::of(&ledger, identity))
    }

    /// Drains today's ledger. There is deliberately no day parameter.
    #[instrument(skip_all, fields(user = %identity.id))]
    pub async fn reset_today(&self, identity: &Identity) -> Result<MealCounts, VoteError> {
        if !identity.is_admin() {
            warn!("Non-admin reset attempt");
            return Err(VoteError::PermissionDenied {
                required: Role::Admin,
            });
        }

        let day = self.days.today_key();
        let counts = self.store.reset_day(&day).await?;

        info!(%day, "Votes reset");

        Ok(counts)
    }
}
