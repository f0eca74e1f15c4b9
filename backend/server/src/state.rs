use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::{
    auth::TokenVerifier,
    config::{Config, StoreKind},
    database::{LedgerBackend, RedisLedgerStore},
    day::{Clock, DayKeyResolver, SystemClock},
    ledger::MemoryLedgerStore,
    votes::VoteService,
};

pub struct State {
    pub config: Config,
    pub tokens: TokenVerifier,
    pub votes: VoteService<LedgerBackend>,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store = match config.store {
            StoreKind::Redis => {
                info!("Connecting to Redis...");
                LedgerBackend::Redis(
                    RedisLedgerStore::connect(&config.redis_url, clock.clone()).await?,
                )
            }
            StoreKind::Memory => {
                info!("Using in-memory ledger store");
                LedgerBackend::Memory(MemoryLedgerStore::with_clock(clock.clone()))
            }
        };

        let days = DayKeyResolver::new(config.time_zone, clock);

        Ok(Self::with_store(config, store, days))
    }

    pub fn with_store(config: Config, store: LedgerBackend, days: DayKeyResolver) -> Arc<Self> {
        let tokens = TokenVerifier::new(config.token_secret.as_bytes());

        Arc::new(Self {
            config,
            tokens,
            votes: VoteService::new(store, days),
        })
    }
}
