//! End-to-end pipeline tests over the in-memory store: index note content
//! through the dispatcher or indexer, then exercise the retrieval, fusion,
//! and answer paths.

mod common;

use std::sync::Arc;

use common::{note_change, CannedGenerator, TopicEmbedder};
use recall::answer;
use recall::chunker::ChunkerOptions;
use recall::dispatch::Dispatcher;
use recall::indexer::Indexer;
use recall::models::SearchFilters;
use recall::retrieval;
use recall::store::memory::MemoryStore;
use recall::store::ChunkStore;

fn make_indexer(store: Arc<MemoryStore>) -> Indexer<MemoryStore> {
    Indexer::new(
        store,
        Arc::new(TopicEmbedder),
        ChunkerOptions::default(),
        64,
    )
}

const CALCULUS_NOTE: &str = "# Derivatives\n\nThe derivative of a function measures the \
    instantaneous rate of change. A function is differentiable when its limit exists \
    everywhere in the interval.";

const COOKING_NOTE: &str = "# Sourdough\n\nMix the flour into the dough and let it rest. \
    Bake in a hot oven until the crust browns. This recipe rewards patience.";

#[tokio::test]
async fn test_topic_query_ranks_matching_note_first() {
    let store = Arc::new(MemoryStore::new());
    let indexer = make_indexer(store.clone());

    indexer
        .reindex(&note_change("calc", "u1", "Calc week 2", CALCULUS_NOTE, Some("MATH101")))
        .await
        .unwrap();
    indexer
        .reindex(&note_change("bread", "u1", "Bread journal", COOKING_NOTE, None))
        .await
        .unwrap();

    let retrieval = retrieval::retrieve(
        store.as_ref(),
        &TopicEmbedder,
        "u1",
        "derivative",
        &SearchFilters::default(),
        10,
    )
    .await
    .unwrap();

    assert!(!retrieval.results.is_empty());
    assert_eq!(retrieval.results[0].chunk.note_id, "calc");
    assert_eq!(retrieval.query_vec.len(), 4);
    // The cooking note, if present at all, ranks strictly below.
    for other in retrieval.results.iter().skip(1) {
        assert!(other.similarity <= retrieval.results[0].similarity);
    }
}

#[tokio::test]
async fn test_owner_isolation_across_all_paths() {
    let store = Arc::new(MemoryStore::new());
    let indexer = make_indexer(store.clone());

    // Only user B has indexed content, and it matches the query.
    indexer
        .reindex(&note_change("calc", "userB", "Calc", CALCULUS_NOTE, Some("MATH101")))
        .await
        .unwrap();

    let vector = retrieval::retrieve(
        store.as_ref(),
        &TopicEmbedder,
        "userA",
        "derivative",
        &SearchFilters::default(),
        10,
    )
    .await
    .unwrap();
    assert!(vector.results.is_empty());

    let lexical = retrieval::lexical_search(store.as_ref(), "userA", "derivative", 10, None)
        .await
        .unwrap();
    assert!(lexical.is_empty());

    // Filters must not widen visibility either.
    let filters = SearchFilters {
        course_tag: Some("MATH101".to_string()),
        date_range: Some((0, i64::MAX)),
    };
    let hybrid = retrieval::hybrid_search(
        store.as_ref(),
        &TopicEmbedder,
        "userA",
        "derivative",
        10,
        &filters,
    )
    .await
    .unwrap();
    assert!(hybrid.is_empty());

    for result in retrieval::hybrid_search(
        store.as_ref(),
        &TopicEmbedder,
        "userB",
        "derivative",
        10,
        &SearchFilters::default(),
    )
    .await
    .unwrap()
    {
        assert_eq!(result.chunk.owner_user_id, "userB");
    }
}

#[tokio::test]
async fn test_hybrid_prefers_chunk_found_by_both_paths() {
    let store = Arc::new(MemoryStore::new());
    let indexer = make_indexer(store.clone());

    // The calculus note matches "derivative" both lexically and by topic
    // vector; the cooking note appears only in the vector ranking.
    indexer
        .reindex(&note_change("calc", "u1", "Calc", CALCULUS_NOTE, None))
        .await
        .unwrap();
    indexer
        .reindex(&note_change("bread", "u1", "Bread", COOKING_NOTE, None))
        .await
        .unwrap();

    let results = retrieval::hybrid_search(
        store.as_ref(),
        &TopicEmbedder,
        "u1",
        "derivative",
        10,
        &SearchFilters::default(),
    )
    .await
    .unwrap();

    assert_eq!(results[0].chunk.note_id, "calc");
    if let Some(single_path) = results.iter().find(|r| r.chunk.note_id == "bread") {
        assert!(results[0].similarity > single_path.similarity);
    }
}

#[tokio::test]
async fn test_update_replaces_previous_generation() {
    let store = Arc::new(MemoryStore::new());
    let indexer = make_indexer(store.clone());

    indexer
        .reindex(&note_change("n1", "u1", "Draft", "Old text about the integral.", None))
        .await
        .unwrap();
    indexer
        .reindex(&note_change("n1", "u1", "Draft", "New text about the derivative.", None))
        .await
        .unwrap();

    let chunks = store.note_chunks("n1").await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content_raw.contains("New text"));
    assert_eq!(store.count_owner_chunks("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_dispatched_shrink_to_empty_leaves_note_unsearchable() {
    let store = Arc::new(MemoryStore::new());
    let indexer = Arc::new(make_indexer(store.clone()));

    let dispatcher = Dispatcher::spawn(indexer);
    dispatcher.notify(note_change("calc", "u1", "Calc", CALCULUS_NOTE, None));
    dispatcher.notify(note_change("calc", "u1", "Calc", "", None));
    dispatcher.shutdown().await;

    assert_eq!(store.count_owner_chunks("u1").await.unwrap(), 0);
    let retrieval = retrieval::retrieve(
        store.as_ref(),
        &TopicEmbedder,
        "u1",
        "derivative",
        &SearchFilters::default(),
        10,
    )
    .await
    .unwrap();
    assert!(retrieval.results.is_empty());
}

#[tokio::test]
async fn test_course_filter_scopes_hybrid_results() {
    let store = Arc::new(MemoryStore::new());
    let indexer = make_indexer(store.clone());

    indexer
        .reindex(&note_change("calc", "u1", "Calc", CALCULUS_NOTE, Some("MATH101")))
        .await
        .unwrap();
    indexer
        .reindex(&note_change("hist", "u1", "History", "The empire signed the treaty.", Some("HIST200")))
        .await
        .unwrap();

    let filters = SearchFilters {
        course_tag: Some("HIST200".to_string()),
        date_range: None,
    };
    let results = retrieval::hybrid_search(
        store.as_ref(),
        &TopicEmbedder,
        "u1",
        "treaty",
        10,
        &filters,
    )
    .await
    .unwrap();

    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(result.chunk.course_tag.as_deref(), Some("HIST200"));
    }
}

#[tokio::test]
async fn test_ask_flow_grounds_answer_on_retrieved_chunks() {
    let store = Arc::new(MemoryStore::new());
    let indexer = make_indexer(store.clone());

    indexer
        .reindex(&note_change("calc", "u1", "Calc", CALCULUS_NOTE, None))
        .await
        .unwrap();

    let chunks = retrieval::hybrid_search(
        store.as_ref(),
        &TopicEmbedder,
        "u1",
        "derivative",
        5,
        &SearchFilters::default(),
    )
    .await
    .unwrap();

    let generator = CannedGenerator("It measures the instantaneous rate of change.".to_string());
    let answer = answer::answer_query(&generator, "what is a derivative?", &chunks)
        .await
        .unwrap();
    assert!(!answer.insufficient_context);

    // A user with no notes gets the insufficient-context answer without a
    // generation call.
    let empty = answer::answer_query(&generator, "what is a derivative?", &[])
        .await
        .unwrap();
    assert!(empty.insufficient_context);
}
