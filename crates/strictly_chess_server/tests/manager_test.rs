//! Tests for shared-session coordination.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use strictly_chess::{
    ChessSession, Color, GameStatus, MoveOutcome, RejectReason, ShakmatyEngine,
};
use strictly_chess_server::{
    GameId, MemoryStore, SessionManager, SessionPatch, SessionRecord, SqliteStore, StateStore,
    StoreError, StoreErrorKind,
};
use tempfile::TempDir;

const KNIGHT_SHUFFLE: [&str; 4] = ["g1f3", "g8f6", "f3g1", "f6g8"];

fn manager_over(store: Arc<dyn StateStore>) -> SessionManager<ShakmatyEngine> {
    SessionManager::new(ShakmatyEngine::new(), store)
}

/// Memory store where another writer plays `e2e4` right before the first
/// guarded update goes through.
#[derive(Debug, Default)]
struct InterleavedStore {
    inner: MemoryStore,
    interleaved: AtomicBool,
}

#[async_trait]
impl StateStore for InterleavedStore {
    async fn get(&self, game_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.inner.get(game_id).await
    }

    async fn set(&self, game_id: &str, record: SessionRecord) -> Result<SessionRecord, StoreError> {
        self.inner.set(game_id, record).await
    }

    async fn update(&self, game_id: &str, patch: SessionPatch) -> Result<SessionRecord, StoreError> {
        if !self.interleaved.swap(true, Ordering::SeqCst) {
            let current = self.inner.get(game_id).await?.expect("record");
            let mut session = ChessSession::restore(ShakmatyEngine::new(), current.state())
                .expect("restorable record");
            assert!(session.apply_move("e2e4").is_applied());
            self.inner
                .compare_and_set(game_id, current.version, SessionRecord::from_state(session.state()))
                .await?;
        }
        self.inner.update(game_id, patch).await
    }

    async fn compare_and_set(
        &self,
        game_id: &str,
        expected_version: u64,
        record: SessionRecord,
    ) -> Result<SessionRecord, StoreError> {
        self.inner.compare_and_set(game_id, expected_version, record).await
    }

    async fn list(&self) -> Result<Vec<GameId>, StoreError> {
        self.inner.list().await
    }

    async fn remove(&self, game_id: &str) -> Result<bool, StoreError> {
        self.inner.remove(game_id).await
    }
}

#[tokio::test]
async fn test_concurrent_submissions_one_manager() {
    let manager = manager_over(Arc::new(MemoryStore::new()));
    manager.create("g1").await.unwrap();

    let (a, b) = tokio::join!(
        manager.apply_move("g1", "e2e4"),
        manager.apply_move("g1", "d2d4")
    );
    let outcomes = [a.unwrap().outcome, b.unwrap().outcome];

    let applied = outcomes.iter().filter(|o| o.is_applied()).count();
    assert_eq!(applied, 1, "{outcomes:?}");
    assert!(outcomes.contains(&MoveOutcome::Rejected(RejectReason::Illegal)));

    let view = manager.view("g1").await.unwrap();
    assert_eq!(view.snapshot.turn, Color::Black);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_submissions_two_processes() {
    // Two managers stand in for two processes sharing one store: no common
    // lock, only the version check.
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let first = manager_over(store.clone());
    let second = manager_over(store.clone());
    first.create("g1").await.unwrap();

    let a = tokio::spawn({
        let first = first.clone();
        async move { first.apply_move("g1", "e2e4").await }
    });
    let b = tokio::spawn({
        let second = second.clone();
        async move { second.apply_move("g1", "d2d4").await }
    });
    let outcomes = [
        a.await.unwrap().unwrap().outcome,
        b.await.unwrap().unwrap().outcome,
    ];

    assert_eq!(
        outcomes.iter().filter(|o| o.is_applied()).count(),
        1,
        "{outcomes:?}"
    );
    let view = first.view("g1").await.unwrap();
    assert_eq!(view.snapshot.turn, Color::Black);
}

#[tokio::test]
async fn test_shared_sqlite_file_between_managers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    let path = path.to_str().unwrap();

    let writer = manager_over(Arc::new(SqliteStore::open(path).unwrap()));
    let reader = manager_over(Arc::new(SqliteStore::open(path).unwrap()));

    writer.create("g1").await.unwrap();
    for mv in ["f2f3", "e7e5", "g2g4", "d8h4"] {
        assert!(writer.apply_move("g1", mv).await.unwrap().outcome.is_applied());
    }

    let view = reader.view("g1").await.unwrap();
    assert_eq!(
        view.snapshot.status,
        GameStatus::Checkmate {
            winner: Color::Black
        }
    );
    assert_eq!(view.snapshot.status_message, "Checkmate! Black wins!");

    // The reader sees a finished game too.
    let reply = reader.apply_move("g1", "e2e4").await.unwrap();
    assert_eq!(reply.outcome, MoveOutcome::Unchanged);
}

#[tokio::test]
async fn test_duplicate_guard_survives_store_round_trip() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let first = manager_over(store.clone());
    let second = manager_over(store);
    first.create("g1").await.unwrap();

    assert!(first.apply_move("g1", "e2e4").await.unwrap().outcome.is_applied());
    let again = second.apply_move("g1", "e2e4").await.unwrap();
    assert_eq!(again.outcome, MoveOutcome::Unchanged);
}

#[tokio::test]
async fn test_reset_after_mate() {
    let manager = manager_over(Arc::new(MemoryStore::new()));
    manager.create("g1").await.unwrap();
    for mv in ["f2f3", "e7e5", "g2g4", "d8h4"] {
        manager.apply_move("g1", mv).await.unwrap();
    }

    let view = manager.reset("g1").await.unwrap();
    assert_eq!(view.snapshot.status, GameStatus::InProgress);
    assert_eq!(view.snapshot.status_message, "");
    assert!(manager.apply_move("g1", "f2f3").await.unwrap().outcome.is_applied());
}

#[tokio::test]
async fn test_corrupt_record_reported() {
    let store = Arc::new(MemoryStore::new());
    let manager = manager_over(store.clone());
    manager.create("g1").await.unwrap();

    let mut record = store.get("g1").await.unwrap().unwrap();
    record.position_encoding = "not a fen".to_string();
    store.set("g1", record).await.unwrap();

    let err = manager.apply_move("g1", "e2e4").await.unwrap_err();
    assert_eq!(err.kind, StoreErrorKind::Corrupt);
}

#[tokio::test]
async fn test_wait_for_change_wakes_on_move() {
    let manager = manager_over(Arc::new(MemoryStore::new()));
    let created = manager.create("g1").await.unwrap();

    let waiter = tokio::spawn({
        let manager = manager.clone();
        async move {
            manager
                .wait_for_change("g1", created.version, Duration::from_secs(30))
                .await
        }
    });
    tokio::task::yield_now().await;
    manager.apply_move("g1", "e2e4").await.unwrap();

    let view = waiter.await.unwrap().unwrap();
    assert!(view.version > created.version);
    assert_eq!(view.snapshot.turn, Color::Black);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_change_times_out_with_current_view() {
    let manager = manager_over(Arc::new(MemoryStore::new()));
    let created = manager.create("g1").await.unwrap();

    let view = manager
        .wait_for_change("g1", created.version, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(view.version, created.version);
}

#[tokio::test]
async fn test_rejection_losing_race_is_revalidated() {
    let manager = manager_over(Arc::new(InterleavedStore::default()));
    manager.create("g1").await.unwrap();

    // Black's reply is illegal until the other writer's e2e4 lands.
    let reply = manager.apply_move("g1", "e7e5").await.unwrap();
    assert_eq!(reply.outcome, MoveOutcome::Applied(GameStatus::InProgress));
    assert_eq!(reply.game.version, 3);
    assert_eq!(reply.game.snapshot.turn, Color::White);
    assert_eq!(
        reply.game.snapshot.position_encoding,
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
    );
    assert_eq!(reply.game.snapshot.status_message, "");
}

#[tokio::test]
async fn test_rejection_never_overwrites_newer_move() {
    let store = Arc::new(InterleavedStore::default());
    let manager = manager_over(store.clone()).with_max_conflict_retries(0);
    manager.create("g1").await.unwrap();

    let err = manager.apply_move("g1", "e7e5").await.unwrap_err();
    assert_eq!(err.kind, StoreErrorKind::Conflict);

    let stored = store.get("g1").await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert!(!stored.white_to_move);
    assert_eq!(stored.status_message, "");
    assert_eq!(stored.last_processed_input.as_deref(), Some("e2e4"));
}

#[tokio::test]
async fn test_fivefold_repetition_ends_shared_game() {
    let manager = manager_over(Arc::new(MemoryStore::new()));
    manager.create("g1").await.unwrap();

    let mut last = None;
    for _ in 0..4 {
        for mv in KNIGHT_SHUFFLE {
            last = Some(manager.apply_move("g1", mv).await.unwrap());
        }
    }
    let last = last.unwrap();
    assert_eq!(last.outcome, MoveOutcome::Applied(GameStatus::DrawOther));
    assert_eq!(last.game.snapshot.status_message, "Game over: Draw.");

    let after = manager.apply_move("g1", "g1f3").await.unwrap();
    assert_eq!(after.outcome, MoveOutcome::Unchanged);
}

#[tokio::test]
async fn test_fivefold_repetition_across_sqlite_processes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    let path = path.to_str().unwrap();

    let white = manager_over(Arc::new(SqliteStore::open(path).unwrap()));
    let black = manager_over(Arc::new(SqliteStore::open(path).unwrap()));
    white.create("g1").await.unwrap();

    let mut last = None;
    for _ in 0..4 {
        for (n, mv) in KNIGHT_SHUFFLE.into_iter().enumerate() {
            let mover = if n % 2 == 0 { &white } else { &black };
            last = Some(mover.apply_move("g1", mv).await.unwrap().outcome);
        }
    }
    assert_eq!(last, Some(MoveOutcome::Applied(GameStatus::DrawOther)));
    assert_eq!(
        white.view("g1").await.unwrap().snapshot.status,
        GameStatus::DrawOther
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    let path = path.to_str().unwrap();

    let first = manager_over(Arc::new(SqliteStore::open(path).unwrap()));
    let second = manager_over(Arc::new(SqliteStore::open(path).unwrap()));
    first.create("g1").await.unwrap();

    let a = tokio::spawn({
        let first = first.clone();
        async move { first.apply_move("g1", "e2e4").await }
    });
    let b = tokio::spawn({
        let second = second.clone();
        async move { second.apply_move("g1", "d2d4").await }
    });
    let outcomes = [
        a.await.unwrap().unwrap().outcome,
        b.await.unwrap().unwrap().outcome,
    ];

    assert_eq!(
        outcomes.iter().filter(|o| o.is_applied()).count(),
        1,
        "{outcomes:?}"
    );
    assert_eq!(first.view("g1").await.unwrap().snapshot.turn, Color::Black);
}
