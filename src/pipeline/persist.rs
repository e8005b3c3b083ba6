use chrono::Utc;
use std::time::Duration;
use thiserror::Error;

use crate::episode::Episode;
use crate::store::{EpisodeRecord, RecordStatus, RecordStore, StoreError};

/// Knobs for the save loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    /// Pause between consecutive successful saves
    pub pacing: Duration,
    /// Base backoff after a rate-limited attempt, multiplied by the attempt number
    pub rate_limit_backoff: Duration,
    /// Total attempts per episode, including the first
    pub max_attempts: u32,
    /// Mark saved records as awaiting article generation
    pub trigger_generation: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_secs(3),
            max_attempts: 3,
            trigger_generation: false,
        }
    }
}

/// Why a single episode could not be saved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaveFailure {
    /// Store rejected the record; not retried
    #[error("validation_error: {0}")]
    Validation(String),

    #[error("rate_limited: gave up after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("{0}")]
    Other(String),
}

/// Result of saving one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub episode_id: String,
    pub title: String,
    /// Page id assigned by the store on success
    pub result: Result<String, SaveFailure>,
    pub attempts: u32,
    /// Whether the downstream status update succeeded
    pub triggered: bool,
}

impl SaveOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error_message(&self) -> Option<String> {
        self.result.as_ref().err().map(ToString::to_string)
    }
}

/// Saves `episodes` one at a time, in order.
///
/// Every episode gets exactly one outcome; a failure never stops the loop.
/// Successful saves are spaced by `options.pacing`, except after the last
/// episode.
pub async fn persist<S>(store: &S, episodes: &[Episode], options: &PersistOptions) -> Vec<SaveOutcome>
where
    S: RecordStore + ?Sized,
{
    let mut outcomes = Vec::with_capacity(episodes.len());

    for (index, episode) in episodes.iter().enumerate() {
        let is_last = index + 1 == episodes.len();
        let (result, attempts) = save_with_retry(store, episode, options).await;

        let mut triggered = false;
        match &result {
            Ok(page_id) => {
                tracing::info!(
                    episode_id = %episode.id,
                    page_id = %page_id,
                    attempts,
                    "Saved episode"
                );
                if options.trigger_generation {
                    triggered = trigger(store, &episode.id, page_id).await;
                }
            }
            Err(failure) => {
                tracing::error!(
                    episode_id = %episode.id,
                    title = %episode.title,
                    attempts,
                    error = %failure,
                    "Failed to save episode"
                );
            }
        }

        let saved = result.is_ok();
        outcomes.push(SaveOutcome {
            episode_id: episode.id.clone(),
            title: episode.title.clone(),
            result,
            attempts,
            triggered,
        });

        if saved && !is_last && !options.pacing.is_zero() {
            tokio::time::sleep(options.pacing).await;
        }
    }

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    tracing::info!(
        succeeded,
        failed = outcomes.len() - succeeded,
        "Persistence complete"
    );
    outcomes
}

async fn save_with_retry<S>(
    store: &S,
    episode: &Episode,
    options: &PersistOptions,
) -> (Result<String, SaveFailure>, u32)
where
    S: RecordStore + ?Sized,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let record = EpisodeRecord::from_episode(episode, Utc::now());

        match store.create_episode(&record).await {
            Ok(page_id) => return (Ok(page_id), attempt),
            Err(StoreError::RateLimited(message)) => {
                if attempt >= max_attempts {
                    return (Err(SaveFailure::RateLimited { attempts: attempt }), attempt);
                }
                let delay = options.rate_limit_backoff * attempt;
                tracing::warn!(
                    episode_id = %episode.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(StoreError::Validation(message)) => {
                return (Err(SaveFailure::Validation(message)), attempt)
            }
            Err(e) => return (Err(SaveFailure::Other(e.to_string())), attempt),
        }
    }
}

async fn trigger<S>(store: &S, episode_id: &str, page_id: &str) -> bool
where
    S: RecordStore + ?Sized,
{
    match store
        .mark_status(page_id, RecordStatus::AwaitingGeneration)
        .await
    {
        Ok(()) => {
            tracing::debug!(episode_id, page_id, "Marked for article generation");
            true
        }
        Err(e) => {
            tracing::warn!(
                episode_id,
                page_id,
                error = %e,
                "Failed to trigger article generation"
            );
            false
        }
    }
}
