//! End-to-end pipeline runs over an in-memory record store.
//!
//! Time is paused so pacing and rate-limit backoff are observable as exact
//! virtual durations.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use podcast_ingest::episode::{CategoryRuleset, Classifier, Extractor};
use podcast_ingest::pipeline::{Pipeline, PipelineError, PersistOptions, SaveFailure};
use podcast_ingest::store::{
    EpisodeRecord, IdPage, RecordStatus, RecordStore, StoreError, StoreErrorKind,
};

/// Record store with a fixed identity index and scripted create results.
#[derive(Default)]
struct MemoryStore {
    existing: Vec<String>,
    index_error: Mutex<Option<StoreError>>,
    creates: Mutex<VecDeque<Result<String, StoreError>>>,
    saved: Mutex<Vec<(EpisodeRecord, Instant)>>,
    marked: Mutex<Vec<(String, RecordStatus)>>,
    page_sizes: Mutex<Vec<u32>>,
}

impl MemoryStore {
    fn with_existing(ids: &[&str]) -> Self {
        Self {
            existing: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn script_creates(self, results: Vec<Result<String, StoreError>>) -> Self {
        *self.creates.lock().unwrap() = results.into();
        self
    }

    fn saved_ids(&self) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.episode_id.clone())
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query_ids(&self, page_size: u32, cursor: Option<&str>) -> Result<IdPage, StoreError> {
        self.page_sizes.lock().unwrap().push(page_size);
        if let Some(e) = self.index_error.lock().unwrap().take() {
            return Err(e);
        }
        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + page_size as usize).min(self.existing.len());
        let has_more = end < self.existing.len();
        Ok(IdPage {
            ids: self.existing[start..end].to_vec(),
            has_more,
            next_cursor: has_more.then(|| end.to_string()),
        })
    }

    async fn create_episode(&self, record: &EpisodeRecord) -> Result<String, StoreError> {
        self.saved
            .lock()
            .unwrap()
            .push((record.clone(), Instant::now()));
        self.creates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("page-{}", record.episode_id)))
    }

    async fn mark_status(&self, page_id: &str, status: RecordStatus) -> Result<(), StoreError> {
        self.marked.lock().unwrap().push((page_id.to_owned(), status));
        Ok(())
    }

    async fn check_connection(&self) -> Result<String, StoreError> {
        Ok("memory".into())
    }
}

fn extractor() -> Extractor {
    Extractor::new(
        Classifier::new(Arc::new(CategoryRuleset::builtin())),
        Some("channel-1".into()),
    )
}

const TWO_EPISODE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>羊飼いラジオ</title>
    <item>
      <title>羊の毛刈りイベント開催</title>
      <link>https://stand.fm/episodes/64a1f0c2e4b0</link>
      <description><![CDATA[<p>今年も毛刈りの季節です</p>]]></description>
      <pubDate>Mon, 06 May 2024 09:00:00 +0900</pubDate>
      <enclosure url="https://cdn.stand.fm/audio/64a1f0c2e4b0.m4a" length="12582912" type="audio/mp4"/>
    </item>
    <item>
      <title>AIボット開発日記</title>
      <link>https://stand.fm/episodes/64b2e1d3f5c1</link>
      <description>ボットを作っています</description>
      <pubDate>Tue, 07 May 2024 09:00:00 +0900</pubDate>
      <itunes:duration>12:34</itunes:duration>
    </item>
  </channel>
</rss>"#;

#[tokio::test(start_paused = true)]
async fn two_new_episodes_saved_with_one_pacing_gap() {
    let pipeline = Pipeline::new(MemoryStore::default(), extractor());
    let start = Instant::now();

    let summary = pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.new, 2);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 0);

    let saved = pipeline.store().saved.lock().unwrap().clone();
    let categories: Vec<_> = saved.iter().map(|(r, _)| r.category.as_str()).collect();
    assert_eq!(categories, vec!["羊飼い実務", "技術・AI"]);
    assert_eq!(saved[0].0.episode_id, "64a1f0c2e4b0");
    assert_eq!(saved[0].0.duration, "12:00");
    assert_eq!(saved[1].0.duration, "12:34");

    // Exactly one pacing interval, between the two saves
    assert_eq!(saved[1].1 - saved[0].1, Duration::from_secs(1));
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn rate_limited_once_then_saved() {
    let store = MemoryStore::default().script_creates(vec![
        Err(StoreError::RateLimited("slow down".into())),
        Ok("page-1".into()),
    ]);
    let pipeline = Pipeline::new(store, extractor());
    let feed = TWO_EPISODE_FEED.replacen("<item>", "<!--", 1).replacen("</item>", "-->", 1);

    let summary = pipeline.run_markup(&feed).await.unwrap();

    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].result, Ok("page-1".to_string()));
    assert_eq!(summary.outcomes[0].attempts, 2);
    assert_eq!(pipeline.store().saved_ids().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn known_episodes_are_skipped_across_pages() {
    let existing = ["aaa", "bbb", "64a1f0c2e4b0", "ccc"];
    let pipeline = Pipeline::new(MemoryStore::with_existing(&existing), extractor()).page_size(2);

    let summary = pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.new, 1);
    assert_eq!(pipeline.store().saved_ids(), vec!["64b2e1d3f5c1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn oversized_page_size_is_clamped() {
    let existing: Vec<String> = (0..150).map(|i| format!("{i:x}")).collect();
    let refs: Vec<&str> = existing.iter().map(String::as_str).collect();
    let pipeline = Pipeline::new(MemoryStore::with_existing(&refs), extractor()).page_size(500);

    pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap();

    assert_eq!(*pipeline.store().page_sizes.lock().unwrap(), vec![100, 100]);
}

#[tokio::test(start_paused = true)]
async fn zero_page_size_is_raised_to_one() {
    let pipeline = Pipeline::new(MemoryStore::with_existing(&["a"]), extractor()).page_size(0);

    pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap();

    assert_eq!(*pipeline.store().page_sizes.lock().unwrap(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn nothing_new_writes_nothing() {
    let store = MemoryStore::with_existing(&["64a1f0c2e4b0", "64b2e1d3f5c1"]);
    let pipeline = Pipeline::new(store, extractor());

    let summary = pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap();

    assert_eq!(summary.new, 0);
    assert!(summary.outcomes.is_empty());
    assert_eq!(summary.message, "No new episodes");
    assert!(pipeline.store().saved_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dry_run_stops_before_persisting() {
    let pipeline = Pipeline::new(MemoryStore::default(), extractor()).dry_run(true);

    let summary = pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap();

    assert_eq!(summary.new, 2);
    assert!(summary.outcomes.is_empty());
    let pending: Vec<_> = summary.pending.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(pending, vec!["64a1f0c2e4b0", "64b2e1d3f5c1"]);
    assert!(pipeline.store().saved_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn item_without_link_is_omitted() {
    let feed = TWO_EPISODE_FEED.replace(
        "<link>https://stand.fm/episodes/64a1f0c2e4b0</link>",
        "",
    );
    let pipeline = Pipeline::new(MemoryStore::default(), extractor());

    let summary = pipeline.run_markup(&feed).await.unwrap();

    assert_eq!(summary.fetched, 1);
    assert_eq!(pipeline.store().saved_ids(), vec!["64b2e1d3f5c1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn empty_channel_returns_summary() {
    let feed = "<rss><channel><title>empty</title></channel></rss>";
    let pipeline = Pipeline::new(MemoryStore::default(), extractor());

    let summary = pipeline.run_markup(feed).await.unwrap();

    assert_eq!(summary.fetched, 0);
    assert!(summary.outcomes.is_empty());
    assert_eq!(summary.message, "No episodes found in feed");
}

#[tokio::test(start_paused = true)]
async fn malformed_feed_aborts_run() {
    let pipeline = Pipeline::new(MemoryStore::default(), extractor());

    let err = pipeline
        .run_markup("<feed><entry/></feed>")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Feed(_)));
    assert!(pipeline.store().saved_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn index_fetch_failure_aborts_run() {
    let store = MemoryStore::default();
    *store.index_error.lock().unwrap() = Some(StoreError::Unauthorized("bad token".into()));
    let pipeline = Pipeline::new(store, extractor());

    let err = pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap_err();

    match err {
        PipelineError::IndexFetch(e) => assert_eq!(e.kind(), StoreErrorKind::Unauthorized),
        other => panic!("expected IndexFetch, got {other:?}"),
    }
    assert!(pipeline.store().saved_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failures_are_isolated_and_counted() {
    let store = MemoryStore::default().script_creates(vec![Err(StoreError::Validation(
        "bad select option".into(),
    ))]);
    let pipeline = Pipeline::new(store, extractor());
    let start = Instant::now();

    let summary = pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap();

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(matches!(
        summary.outcomes[0].result,
        Err(SaveFailure::Validation(_))
    ));
    assert_eq!(summary.message, "Saved 1 of 2 new episodes");
    // No pacing after a failure, none after the last item
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn trigger_marks_saved_records() {
    let options = PersistOptions {
        trigger_generation: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(MemoryStore::default(), extractor()).persist_options(options);

    let summary = pipeline.run_markup(TWO_EPISODE_FEED).await.unwrap();

    assert!(summary.outcomes.iter().all(|o| o.triggered));
    let marked = pipeline.store().marked.lock().unwrap().clone();
    assert_eq!(
        marked,
        vec![
            ("page-64a1f0c2e4b0".to_string(), RecordStatus::AwaitingGeneration),
            ("page-64b2e1d3f5c1".to_string(), RecordStatus::AwaitingGeneration),
        ]
    );
}
