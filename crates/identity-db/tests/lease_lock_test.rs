//! Integration tests for the SurrealDB lease lock.

use std::time::Duration;

use identity_core::repository::LeaseLock;
use identity_db::repository::SurrealLeaseLock;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    identity_db::run_migrations(&db).await.unwrap();
    db
}

#[tokio::test]
async fn only_one_owner_holds_the_lease() {
    let db = setup().await;
    let a = SurrealLeaseLock::with_owner(db.clone(), "rotation", "a", Duration::from_secs(30));
    let b = SurrealLeaseLock::with_owner(db, "rotation", "b", Duration::from_secs(30));

    assert!(a.try_acquire().await.unwrap());
    assert!(!b.try_acquire().await.unwrap());
    // Holder renews.
    assert!(a.try_acquire().await.unwrap());
    assert!(!b.try_acquire().await.unwrap());
}

#[tokio::test]
async fn release_lets_another_owner_in() {
    let db = setup().await;
    let a = SurrealLeaseLock::with_owner(db.clone(), "rotation", "a", Duration::from_secs(30));
    let b = SurrealLeaseLock::with_owner(db, "rotation", "b", Duration::from_secs(30));

    assert!(a.try_acquire().await.unwrap());
    // Releasing someone else's lease is a no-op.
    b.release().await.unwrap();
    assert!(!b.try_acquire().await.unwrap());

    a.release().await.unwrap();
    assert!(b.try_acquire().await.unwrap());
}

#[tokio::test]
async fn expired_lease_can_be_taken_over() {
    let db = setup().await;
    let a = SurrealLeaseLock::with_owner(db.clone(), "rotation", "a", Duration::from_millis(50));
    let b = SurrealLeaseLock::with_owner(db, "rotation", "b", Duration::from_secs(30));

    assert!(a.try_acquire().await.unwrap());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(b.try_acquire().await.unwrap());
    assert!(!a.try_acquire().await.unwrap());
}

#[tokio::test]
async fn distinct_keys_do_not_interfere() {
    let db = setup().await;
    let a = SurrealLeaseLock::with_owner(db.clone(), "rotation", "a", Duration::from_secs(30));
    let b = SurrealLeaseLock::with_owner(db, "cleanup", "b", Duration::from_secs(30));

    assert!(a.try_acquire().await.unwrap());
    assert!(b.try_acquire().await.unwrap());
    assert_eq!(a.key(), "rotation");
    assert_eq!(b.owner(), "b");
}

#[tokio::test]
async fn default_owner_is_unique_per_lock() {
    let db = setup().await;
    let a = SurrealLeaseLock::new(db.clone(), "rotation", Duration::from_secs(30));
    let b = SurrealLeaseLock::new(db, "rotation", Duration::from_secs(30));

    assert_ne!(a.owner(), b.owner());
    assert!(a.try_acquire().await.unwrap());
    assert!(!b.try_acquire().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_acquirers_never_error_and_never_share() {
    let db = setup().await;

    for round in 0..20 {
        let key = format!("race-{round}");
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let lock = SurrealLeaseLock::with_owner(
                    db.clone(),
                    key.clone(),
                    format!("owner-{i}"),
                    Duration::from_secs(30),
                );
                tokio::spawn(async move { lock.try_acquire().await })
            })
            .collect();

        let mut holders = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(true) => holders += 1,
                Ok(false) => {}
                Err(e) => panic!("round {round}: lost race surfaced as error: {e}"),
            }
        }
        assert!(holders <= 1, "round {round}: {holders} holders");
    }
}
