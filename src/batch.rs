//! Batch coordinator.
//!
//! Fans a list of URLs out to concurrent cascade evaluations and gathers the
//! outcomes back in input order. Each URL is isolated: a panicking evaluation
//! yields the error outcome for its own slot and nothing else.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cascade::CascadeEvaluator;
use crate::types::Outcome;

/// Concurrent multi-URL evaluation over a shared cascade.
#[derive(Clone)]
pub struct BatchCoordinator {
    evaluator: Arc<CascadeEvaluator>,
    limiter: Option<Arc<Semaphore>>,
}

impl BatchCoordinator {
    /// Coordinator using the evaluator's `max_in_flight` option.
    pub fn new(evaluator: Arc<CascadeEvaluator>) -> Self {
        let max_in_flight = evaluator.options().max_in_flight;
        Self::with_max_in_flight(evaluator, max_in_flight)
    }

    /// Coordinator with an explicit in-flight cap; 0 means unbounded.
    ///
    /// The cap is shared by every batch running on this coordinator (and its
    /// clones), so it bounds total load on the collaborators.
    pub fn with_max_in_flight(evaluator: Arc<CascadeEvaluator>, max_in_flight: usize) -> Self {
        let limiter = (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight)));
        Self { evaluator, limiter }
    }

    pub fn evaluator(&self) -> &Arc<CascadeEvaluator> {
        &self.evaluator
    }

    /// Evaluate every URL. The result has the same length and order as `urls`.
    ///
    /// Dropping the returned future aborts the outstanding evaluations.
    pub async fn evaluate_many<S: AsRef<str>>(&self, urls: &[S]) -> Vec<Outcome> {
        self.evaluate_many_until(urls, std::future::pending())
            .await
            .into_iter()
            .map(|slot| slot.unwrap_or_else(Outcome::error))
            .collect()
    }

    /// Evaluate every URL until `cancel` resolves.
    ///
    /// On cancellation outstanding evaluations are aborted and their slots are
    /// `None`; evaluations that already finished keep their outcome. Without
    /// cancellation every slot is `Some`.
    pub async fn evaluate_many_until<S, C>(&self, urls: &[S], cancel: C) -> Vec<Option<Outcome>>
    where
        S: AsRef<str>,
        C: Future<Output = ()>,
    {
        let mut slots: Vec<Option<Outcome>> = vec![None; urls.len()];
        if urls.is_empty() {
            return slots;
        }

        tracing::debug!(count = urls.len(), "evaluating batch");

        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let evaluator = self.evaluator.clone();
            let limiter = self.limiter.clone();
            let url = url.as_ref().to_string();

            tasks.spawn(async move {
                // The semaphore is never closed, so acquire only fails if it were.
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                (index, evaluator.evaluate(&url).await)
            });
        }

        tokio::pin!(cancel);
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel, if !cancelled => {
                    cancelled = true;
                    tasks.abort_all();
                    tracing::warn!(outstanding = tasks.len(), "batch cancelled");
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, outcome))) => slots[index] = Some(outcome),
                    Some(Err(e)) if e.is_panic() => {
                        tracing::error!(error = %e, "evaluation panicked");
                    }
                    Some(Err(_)) => {}
                    None => break,
                },
            }
        }

        if !cancelled {
            // Only panicked evaluations can leave a slot empty here.
            for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
                *slot = Some(Outcome::error());
            }
        }

        slots
    }
}
