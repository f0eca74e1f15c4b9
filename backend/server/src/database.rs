//! # Redis
//!
//! RAM database holding the vote ledgers.
//!
//! ## Layout
//!
//! - `ledger:{day}`: hash with `created_at` (RFC 3339) and `resets` (int)
//! - `ledger:{day}:{meal}`: set of user ids, one per meal
//!
//! The hash is the record itself and is provisioned with `HSETNX`, so two
//! requests racing on the first access of a day still produce one record.
//! Sets are only ever touched through the Lua scripts below: Redis runs a
//! script as one atomic unit, which makes provisioning, `SADD` and the set
//! sizes a single check-and-set rather than a read-modify-write.
//!
//! An empty set is simply an absent key in Redis, so a drained day keeps its
//! hash while its set keys disappear.
//!
//! ## Commands
//!
//! Inspect a day.
//! ```sh
//! redis-cli HGETALL ledger:2025-11-01
//! redis-cli SMEMBERS ledger:2025-11-01:breakfast
//! ```
use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use redis::{
    Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::{
    day::{Clock, DayKey},
    identity::UserId,
    ledger::{
        LedgerStore, Meal, MealCounts, MemoryLedgerStore, PerMeal, StoreError, VoteLedger,
        VoteOutcome,
    },
};

const LEDGER_PREFIX: &str = "ledger";

// KEYS: record, breakfast, lunch, dinner
// ARGV: created_at
const READ_SCRIPT: &str = r#"
redis.call('HSETNX', KEYS[1], 'created_at', ARGV[1])
return {
    redis.call('HGET', KEYS[1], 'created_at'),
    tonumber(redis.call('HGET', KEYS[1], 'resets') or '0'),
    redis.call('SMEMBERS', KEYS[2]),
    redis.call('SMEMBERS', KEYS[3]),
    redis.call('SMEMBERS', KEYS[4])
}
"#;

// KEYS: record, breakfast, lunch, dinner, target meal
// ARGV: created_at, user id
const ADD_VOTE_SCRIPT: &str = r#"
redis.call('HSETNX', KEYS[1], 'created_at', ARGV[1])
local added = redis.call('SADD', KEYS[5], ARGV[2])
return {
    added,
    redis.call('SCARD', KEYS[2]),
    redis.call('SCARD', KEYS[3]),
    redis.call('SCARD', KEYS[4])
}
"#;

// KEYS: record, breakfast, lunch, dinner
// ARGV: created_at
const RESET_SCRIPT: &str = r#"
redis.call('HSETNX', KEYS[1], 'created_at', ARGV[1])
redis.call('DEL', KEYS[2], KEYS[3], KEYS[4])
redis.call('HINCRBY', KEYS[1], 'resets', 1)
return {
    redis.call('SCARD', KEYS[2]),
    redis.call('SCARD', KEYS[3]),
    redis.call('SCARD', KEYS[4])
}
"#;

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;

    client.get_connection_manager_with_config(config).await
}

fn record_key(day: &DayKey) -> String {
    format!("{LEDGER_PREFIX}:{day}")
}

fn meal_key(day: &DayKey, meal: Meal) -> String {
    format!("{LEDGER_PREFIX}:{day}:{meal}")
}

pub struct RedisLedgerStore {
    connection: ConnectionManager,
    read_script: Script,
    add_vote_script: Script,
    reset_script: Script,
    clock: Arc<dyn Clock>,
}

impl RedisLedgerStore {
    pub fn new(connection: ConnectionManager, clock: Arc<dyn Clock>) -> Self {
        Self {
            connection,
            clock,
            read_script: Script::new(READ_SCRIPT),
            add_vote_script: Script::new(ADD_VOTE_SCRIPT),
            reset_script: Script::new(RESET_SCRIPT),
        }
    }

    pub async fn connect(redis_url: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Ok(Self::new(init_redis(redis_url).await?, clock))
    }

    fn invocation<'a>(&self, script: &'a Script, day: &DayKey) -> redis::ScriptInvocation<'a> {
        let mut invocation = script.key(record_key(day));
        for meal in Meal::ALL {
            invocation.key(meal_key(day, meal));
        }
        invocation.arg(self.clock.now().to_rfc3339());

        invocation
    }
}

fn counts((breakfast, lunch, dinner): (u64, u64, u64)) -> MealCounts {
    PerMeal {
        breakfast,
        lunch,
        dinner,
    }
}

fn voter_set(members: Vec<String>) -> BTreeSet<UserId> {
    members.into_iter().map(UserId::new).collect()
}

impl LedgerStore for RedisLedgerStore {
    async fn get_or_create(&self, day: &DayKey) -> Result<VoteLedger, StoreError> {
        let mut connection = self.connection.clone();

        let (created_at, resets, breakfast, lunch, dinner): (
            String,
            u64,
            Vec<String>,
            Vec<String>,
            Vec<String>,
        ) = self
            .invocation(&self.read_script, day)
            .invoke_async(&mut connection)
            .await?;

        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::Corrupt {
                day: day.clone(),
                reason: format!("created_at {created_at:?}: {e}"),
            })?
            .with_timezone(&Utc);

        Ok(VoteLedger {
            day: day.clone(),
            voters: PerMeal {
                breakfast: voter_set(breakfast),
                lunch: voter_set(lunch),
                dinner: voter_set(dinner),
            },
            created_at,
            resets,
        })
    }

    async fn add_vote(
        &self,
        day: &DayKey,
        meal: Meal,
        user: &UserId,
    ) -> Result<VoteOutcome, StoreError> {
        let mut connection = self.connection.clone();

        let mut invocation = self.invocation(&self.add_vote_script, day);
        invocation.key(meal_key(day, meal)).arg(user.as_str());

        let (added, breakfast, lunch, dinner): (u64, u64, u64, u64) =
            invocation.invoke_async(&mut connection).await?;

        Ok(VoteOutcome {
            added: added == 1,
            counts: counts((breakfast, lunch, dinner)),
        })
    }

    async fn reset_day(&self, day: &DayKey) -> Result<MealCounts, StoreError> {
        let mut connection = self.connection.clone();

        let remaining: (u64, u64, u64) = self
            .invocation(&self.reset_script, day)
            .invoke_async(&mut connection)
            .await?;

        Ok(counts(remaining))
    }

    async fn read(&self, day: &DayKey) -> Result<VoteLedger, StoreError> {
        self.get_or_create(day).await
    }
}

/// Ledger store picked at startup by `LEDGER_STORE`.
pub enum LedgerBackend {
    Redis(RedisLedgerStore),
    Memory(MemoryLedgerStore),
}

impl LedgerStore for LedgerBackend {
    async fn get_or_create(&self, day: &DayKey) -> Result<VoteLedger, StoreError> {
        match self {
            LedgerBackend::Redis(store) => store.get_or_create(day).await,
            LedgerBackend::Memory(store) => store.get_or_create(day).await,
        }
    }

    async fn add_vote(
        &self,
        day: &DayKey,
        meal: Meal,
        user: &UserId,
    ) -> Result<VoteOutcome, StoreError> {
        match self {
            LedgerBackend::Redis(store) => store.add_vote(day, meal, user).await,
            LedgerBackend::Memory(store) => store.add_vote(day, meal, user).await,
        }
    }

    async fn reset_day(&self, day: &DayKey) -> Result<MealCounts, StoreError> {
        match self {
            LedgerBackend::Redis(store) => store.reset_day(day).await,
            LedgerBackend::Memory(store) => store.reset_day(day).await,
        }
    }

    async fn read(&self, day: &DayKey) -> Result<VoteLedger, StoreError> {
        match self {
            LedgerBackend::Redis(store) => store.read(day).await,
            LedgerBackend::Memory(store) => store.read(day).await,
        }
    }
}
