use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Asia::Kolkata;
use mess_server::{
    day::{DayKey, DayKeyResolver, ManualClock},
    identity::{Identity, Role},
    ledger::{LedgerStore, Meal, MealCounts, MemoryLedgerStore, OwnVotes, PerMeal},
    votes::{VoteError, VoteService},
};

// 23:00 on 2025-11-01 in Kolkata
fn late_evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 1, 17, 30, 0).unwrap()
}

fn setup() -> (Arc<ManualClock>, Arc<VoteService<MemoryLedgerStore>>) {
    let clock = Arc::new(ManualClock::new(late_evening()));
    let days = DayKeyResolver::new(Kolkata, clock.clone());
    let store = MemoryLedgerStore::with_clock(clock.clone());

    (clock, Arc::new(VoteService::new(store, days)))
}

fn student(id: &str) -> Identity {
    Identity::new(id, Role::Student, format!("21CS{id}"))
}

fn admin() -> Identity {
    Identity::new("admin", Role::Admin, "ADMIN")
}

fn counts(breakfast: u64, lunch: u64, dinner: u64) -> MealCounts {
    PerMeal {
        breakfast,
        lunch,
        dinner,
    }
}

#[tokio::test]
async fn test_breakfast_scenario() {
    let (_, votes) = setup();
    let (a, b, c) = (student("a"), student("b"), admin());

    let view = votes.cast_vote(&a, "breakfast").await.unwrap();
    assert_eq!(view.counts, counts(1, 0, 0));
    assert!(view.own_votes.breakfast);

    let view = votes.cast_vote(&b, "breakfast").await.unwrap();
    assert_eq!(view.counts, counts(2, 0, 0));

    let err = votes.cast_vote(&a, "breakfast").await.unwrap_err();
    assert!(matches!(err, VoteError::AlreadyVoted(Meal::Breakfast)));
    assert_eq!(votes.status(&a).await.unwrap().counts, counts(2, 0, 0));

    assert_eq!(votes.reset_today(&c).await.unwrap(), counts(0, 0, 0));

    let view = votes.status(&a).await.unwrap();
    assert_eq!(view.counts, counts(0, 0, 0));
    assert_eq!(view.own_votes, OwnVotes::default());

    let view = votes.cast_vote(&a, "breakfast").await.unwrap();
    assert_eq!(view.counts, counts(1, 0, 0));
}

#[tokio::test]
async fn test_meals_are_independent() {
    let (_, votes) = setup();
    let a = student("a");

    votes.cast_vote(&a, "breakfast").await.unwrap();
    votes.cast_vote(&a, "lunch").await.unwrap();
    let view = votes.cast_vote(&a, "dinner").await.unwrap();

    assert_eq!(view.counts, counts(1, 1, 1));
    assert_eq!(
        view.own_votes,
        PerMeal {
            breakfast: true,
            lunch: true,
            dinner: true
        }
    );
    assert!(!votes.status(&student("b")).await.unwrap().own_votes.lunch);
}

#[tokio::test]
async fn test_unknown_meal_changes_nothing() {
    let (_, votes) = setup();
    let a = student("a");
    votes.cast_vote(&a, "lunch").await.unwrap();

    let before = votes.store().read(&votes.today()).await.unwrap();
    let err = votes.cast_vote(&a, "brunch").await.unwrap_err();
    let after = votes.store().read(&votes.today()).await.unwrap();

    assert!(matches!(err, VoteError::InvalidInput(_)));
    assert_eq!(err.to_string(), "Invalid meal type: brunch");
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_rollover_at_local_midnight() {
    let (clock, votes) = setup();
    let a = student("a");

    votes.cast_vote(&a, "dinner").await.unwrap();
    let yesterday = votes.today();
    assert_eq!(yesterday.as_str(), "2025-11-01");

    clock.advance(Duration::minutes(59) + Duration::seconds(59));
    assert_eq!(votes.today().as_str(), "2025-11-01");

    // 18:30 UTC is exactly local midnight
    clock.advance(Duration::seconds(1));
    assert_eq!(votes.today().as_str(), "2025-11-02");

    let view = votes.status(&a).await.unwrap();
    assert_eq!(view.counts, counts(0, 0, 0));
    assert_eq!(view.own_votes, OwnVotes::default());

    votes.cast_vote(&a, "dinner").await.unwrap();

    let old = votes.store().read(&yesterday).await.unwrap();
    assert_eq!(old.counts(), counts(0, 0, 1));
    assert!(old.own_votes(&a.id).dinner);
    assert_eq!(old.created_at, late_evening());
    assert_eq!(votes.store().len(), 2);

    let new_day = votes.store().read(&votes.today()).await.unwrap();
    assert_eq!(new_day.created_at, late_evening() + Duration::hours(1));
}

#[tokio::test]
async fn test_reset_only_touches_today() {
    let (clock, votes) = setup();
    let a = student("a");

    votes.cast_vote(&a, "lunch").await.unwrap();
    let yesterday = votes.today();

    clock.advance(Duration::hours(2));
    votes.cast_vote(&a, "lunch").await.unwrap();
    votes.reset_today(&admin()).await.unwrap();

    let old = votes.store().read(&yesterday).await.unwrap();
    assert_eq!(old.counts(), counts(0, 1, 0));
    assert_eq!(old.resets, 0);

    let today = votes.store().read(&votes.today()).await.unwrap();
    assert_eq!(today.counts(), counts(0, 0, 0));
    assert_eq!(today.resets, 1);
}

#[tokio::test]
async fn test_non_admin_reset_denied() {
    let (_, votes) = setup();
    let a = student("a");
    votes.cast_vote(&a, "breakfast").await.unwrap();

    let err = votes.reset_today(&a).await.unwrap_err();

    assert!(matches!(err, VoteError::PermissionDenied { required: Role::Admin }));
    assert_eq!(votes.status(&a).await.unwrap().counts, counts(1, 0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_vote_single_success() {
    let (_, votes) = setup();
    let a = student("a");

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let votes = votes.clone();
            let a = a.clone();
            tokio::spawn(async move { votes.cast_vote(&a, "lunch").await })
        })
        .collect();

    let mut successes = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(VoteError::AlreadyVoted(Meal::Lunch)) => duplicates += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(duplicates, 31);
    assert_eq!(votes.status(&a).await.unwrap().counts, counts(0, 1, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_voters_all_count() {
    let (_, votes) = setup();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let votes = votes.clone();
            tokio::spawn(async move { votes.cast_vote(&student(&i.to_string()), "dinner").await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(votes.status(&admin()).await.unwrap().counts, counts(0, 0, 20));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_single_record() {
    let store = Arc::new(MemoryLedgerStore::new());
    let day = DayKey::parse("2025-11-03").unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            let day = day.clone();
            tokio::spawn(async move { store.get_or_create(&day).await })
        })
        .collect();

    let mut created = Vec::new();
    for handle in handles {
        created.push(handle.await.unwrap().unwrap().created_at);
    }

    assert_eq!(store.len(), 1);
    assert!(created.windows(2).all(|pair| pair[0] == pair[1]));
}
