//! # Vote Ledger
//!
//! One record per day key, holding a voter set for each meal.
//!
//! ## Rules
//!
//! - At most one ledger per day, provisioned by an insert-if-absent on first access
//! - A user id appears at most once per meal set
//! - Records are never deleted, a reset drains the sets of the same record
//! - Every mutation is a single atomic store primitive, callers never read-modify-write
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    future::Future,
    str::FromStr,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::{
    day::{Clock, DayKey, SystemClock},
    identity::UserId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Meal {
    Breakfast,
    Lunch,
    Dinner,
}

impl Meal {
    pub const ALL: [Meal; 3] = [Meal::Breakfast, Meal::Lunch, Meal::Dinner];

    pub fn as_str(self) -> &'static str {
        match self {
            Meal::Breakfast => "breakfast",
            Meal::Lunch => "lunch",
            Meal::Dinner => "dinner",
        }
    }
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown meal: {0}")]
pub struct UnknownMeal(pub String);

impl FromStr for Meal {
    type Err = UnknownMeal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Meal::ALL
            .into_iter()
            .find(|meal| meal.as_str() == s)
            .ok_or_else(|| UnknownMeal(s.to_string()))
    }
}

/// One value per meal, serialized as `{breakfast, lunch, dinner}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PerMeal<T> {
    pub breakfast: T,
    pub lunch: T,
    pub dinner: T,
}

impl<T> PerMeal<T> {
    pub fn get(&self, meal: Meal) -> &T {
        match meal {
            Meal::Breakfast => &self.breakfast,
            Meal::Lunch => &self.lunch,
            Meal::Dinner => &self.dinner,
        }
    }

    pub fn get_mut(&mut self, meal: Meal) -> &mut T {
        match meal {
            Meal::Breakfast => &mut self.breakfast,
            Meal::Lunch => &mut self.lunch,
            Meal::Dinner => &mut self.dinner,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerMeal<U> {
        PerMeal {
            breakfast: f(&self.breakfast),
            lunch: f(&self.lunch),
            dinner: f(&self.dinner),
        }
    }
}

pub type MealCounts = PerMeal<u64>;
pub type OwnVotes = PerMeal<bool>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteLedger {
    pub day: DayKey,
    pub voters: PerMeal<BTreeSet<UserId>>,
    pub created_at: DateTime<Utc>,
    /// Admin resets applied to this day, kept across resets.
    pub resets: u64,
}

impl VoteLedger {
    pub fn empty(day: DayKey, created_at: DateTime<Utc>) -> Self {
        Self {
            day,
            voters: PerMeal::default(),
            created_at,
            resets: 0,
        }
    }

    pub fn counts(&self) -> MealCounts {
        self.voters.map(|set| set.len() as u64)
    }

    pub fn own_votes(&self, user: &UserId) -> OwnVotes {
        self.voters.map(|set| set.contains(user))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteOutcome {
    pub added: bool,
    pub counts: MealCounts,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Ledger store unavailable: {0}")]
    Unavailable(#[source] redis::RedisError),

    #[error("Ledger store error: {0}")]
    Backend(#[source] redis::RedisError),

    #[error("Corrupt ledger record for {day}: {reason}")]
    Corrupt { day: DayKey, reason: String },
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout()
            || err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            StoreError::Unavailable(err)
        } else {
            StoreError::Backend(err)
        }
    }
}

/// Persistent day key to voter sets mapping.
///
/// Every method provisions the day's record if it does not exist yet, so no
/// caller ever observes a missing day.
pub trait LedgerStore: Send + Sync {
    /// Returns the day's record, creating an empty one if absent. Concurrent
    /// callers for the same day always end up with the same single record.
    fn get_or_create(
        &self,
        day: &DayKey,
    ) -> impl Future<Output = Result<VoteLedger, StoreError>> + Send;

    /// Inserts `user` into the meal's set if and only if absent, in one atomic step.
    fn add_vote(
        &self,
        day: &DayKey,
        meal: Meal,
        user: &UserId,
    ) -> impl Future<Output = Result<VoteOutcome, StoreError>> + Send;

    /// Empties all three sets of the day's record and bumps its reset counter.
    fn reset_day(&self, day: &DayKey)
    -> impl Future<Output = Result<MealCounts, StoreError>> + Send;

    fn read(&self, day: &DayKey) -> impl Future<Output = Result<VoteLedger, StoreError>> + Send;
}

/// In-process ledger store for single-node runs and tests.
pub struct MemoryLedgerStore {
    ledgers: Mutex<HashMap<DayKey, VoteLedger>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// `created_at` of new days is taken from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            ledgers: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of provisioned days.
    pub fn len(&self) -> usize {
        self.ledgers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.lock().is_empty()
    }

    fn with_ledger<T>(&self, day: &DayKey, f: impl FnOnce(&mut VoteLedger) -> T) -> T {
        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers
            .entry(day.clone())
            .or_insert_with(|| VoteLedger::empty(day.clone(), self.clock.now()));

        f(ledger)
    }
}

impl LedgerStore for MemoryLedgerStore {
    async fn get_or_create(&self, day: &DayKey) -> Result<VoteLedger, StoreError> {
        Ok(self.with_ledger(day, |ledger| ledger.clone()))
    }

    async fn add_vote(
        &self,
        day: &DayKey,
        meal: Meal,
        user: &UserId,
    ) -> Result<VoteOutcome, StoreError> {
        Ok(self.with_ledger(day, |ledger| {
            let added = ledger.voters.get_mut(meal).insert(user.clone());

            VoteOutcome {
                added,
                counts: ledger.counts(),
            }
        }))
    }

    async fn reset_day(&self, day: &DayKey) -> Result<MealCounts, StoreError> {
        Ok(self.with_ledger(day, |ledger| {
            ledger.voters = PerMeal::default();
            ledger.resets += 1;

            ledger.counts()
        }))
    }

    async fn read(&self, day: &DayKey) -> Result<VoteLedger, StoreError> {
        self.get_or_create(day).await
    }
}
