//! Cursor pagination round-trip: every record exactly once, in
//! (created_at DESC, id DESC) order, terminating with a null cursor.

use std::collections::HashSet;
use std::sync::Arc;

use parallax::adapters::sqlite::{create_migrated_test_pool, SqliteResearchRepository};
use parallax::domain::ports::ResearchRepository;

async fn seeded_repo(owner: &str, count: usize) -> Arc<SqliteResearchRepository> {
    let pool = create_migrated_test_pool().await.unwrap();
    let repo = Arc::new(SqliteResearchRepository::new(pool));

    for i in 0..count {
        repo.create(owner, &format!("Topic {i}"), None).await.unwrap();
        // Keep creation timestamps distinct at stored precision.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    repo
}

#[tokio::test]
async fn round_trip_yields_every_record_once_in_order() {
    let repo = seeded_repo("uid-1", 7).await;

    let mut seen = HashSet::new();
    let mut collected = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = repo.list_by_owner("uid-1", 3, cursor.as_deref()).await.unwrap();
        pages += 1;
        assert!(page.items.len() <= 3);

        for research in &page.items {
            assert!(seen.insert(research.id), "record {} returned twice", research.id);
            collected.push((research.created_at, research.id));
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
        assert!(pages < 10, "pagination did not terminate");
    }

    assert_eq!(collected.len(), 7);
    assert_eq!(pages, 3); // 3 + 3 + 1

    // (created_at DESC, id DESC) order across page boundaries.
    for window in collected.windows(2) {
        let (prev_ts, prev_id) = window[0];
        let (next_ts, next_id) = window[1];
        assert!(
            prev_ts > next_ts || (prev_ts == next_ts && prev_id > next_id),
            "page order violated: ({prev_ts}, {prev_id}) then ({next_ts}, {next_id})"
        );
    }
}

#[tokio::test]
async fn exact_page_boundary_emits_no_cursor() {
    let repo = seeded_repo("uid-1", 4).await;

    let page = repo.list_by_owner("uid-1", 4, None).await.unwrap();
    assert_eq!(page.items.len(), 4);
    assert!(page.next_cursor.is_none(), "no extra row means no cursor");
}

#[tokio::test]
async fn cursor_is_opaque_round_trip_token() {
    let repo = seeded_repo("uid-1", 3).await;

    let first = repo.list_by_owner("uid-1", 2, None).await.unwrap();
    let cursor = first.next_cursor.expect("expected continuation");

    // Feeding the cursor back verbatim resumes after the last returned row.
    let second = repo.list_by_owner("uid-1", 2, Some(&cursor)).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_cursor.is_none());

    let first_ids: HashSet<_> = first.items.iter().map(|r| r.id).collect();
    assert!(!first_ids.contains(&second.items[0].id));
}

#[tokio::test]
async fn empty_owner_gets_empty_page() {
    let repo = seeded_repo("uid-1", 2).await;
    let page = repo.list_by_owner("nobody", 5, None).await.unwrap();
    assert!(page.items.is_empty());
    assert!(page.next_cursor.is_none());
}
