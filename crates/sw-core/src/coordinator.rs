//! Tracks open review rounds and lets callers block until a decision lands.

use crate::error::ProtocolError;
use crate::types::enums::{ReviewDecision, ReviewStage};
use crate::types::ids::{ChangeId, ReviewId};
use crate::types::ReviewRecord;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

struct Round {
    record: ReviewRecord,
    notify: watch::Sender<bool>,
}

/// In-memory registry of review rounds. A round is opened when a checkpoint
/// is reached and decided exactly once; waiters observe the decision through
/// a watch channel.
#[derive(Default)]
pub struct ReviewCoordinator {
    rounds: Mutex<HashMap<String, Round>>,
}

impl ReviewCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, change_id: ChangeId, stage: ReviewStage) -> ReviewRecord {
        let record = ReviewRecord::open(change_id, stage);
        let (notify, _) = watch::channel(false);
        self.rounds
            .lock()
            .expect("review registry poisoned")
            .insert(
                record.review_id.to_string(),
                Round {
                    record: record.clone(),
                    notify,
                },
            );
        record
    }

    /// Applies a decision to an open round. Rejects unknown and
    /// already-decided rounds.
    pub fn decide(
        &self,
        review_id: &ReviewId,
        decision: ReviewDecision,
        feedback: Option<String>,
    ) -> Result<ReviewRecord, ProtocolError> {
        let mut rounds = self.rounds.lock().expect("review registry poisoned");
        let round = rounds
            .get_mut(review_id.as_str())
            .ok_or_else(|| ProtocolError::UnknownReview {
                review_id: review_id.to_string(),
            })?;
        if round.record.is_decided() {
            return Err(ProtocolError::AlreadyDecided {
                review_id: review_id.to_string(),
            });
        }
        round.record.decision = decision;
        round.record.feedback = feedback;
        round.record.decided_at = Some(chrono::Utc::now());
        let _ = round.notify.send(true);
        Ok(round.record.clone())
    }

    pub fn get(&self, review_id: &ReviewId) -> Option<ReviewRecord> {
        self.rounds
            .lock()
            .expect("review registry poisoned")
            .get(review_id.as_str())
            .map(|round| round.record.clone())
    }

    /// Resolves once the round is decided; returns immediately if it already
    /// is.
    pub async fn wait_for_decision(
        &self,
        review_id: &ReviewId,
    ) -> Result<ReviewRecord, ProtocolError> {
        let mut receiver = {
            let rounds = self.rounds.lock().expect("review registry poisoned");
            let round = rounds
                .get(review_id.as_str())
                .ok_or_else(|| ProtocolError::UnknownReview {
                    review_id: review_id.to_string(),
                })?;
            if round.record.is_decided() {
                return Ok(round.record.clone());
            }
            round.notify.subscribe()
        };
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return Err(ProtocolError::UnknownReview {
                    review_id: review_id.to_string(),
                });
            }
        }
        self.get(review_id).ok_or_else(|| ProtocolError::UnknownReview {
            review_id: review_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn change_id() -> ChangeId {
        ChangeId::derive("coordinate a review", "--- a/f\n+++ b/f\n")
    }

    #[tokio::test]
    async fn decision_resolves_waiters() {
        let coordinator = Arc::new(ReviewCoordinator::new());
        let record = coordinator.open(change_id(), ReviewStage::UseConsent);
        let review_id = record.review_id.clone();

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            let review_id = review_id.clone();
            tokio::spawn(async move { coordinator.wait_for_decision(&review_id).await })
        };
        tokio::task::yield_now().await;
        coordinator
            .decide(&review_id, ReviewDecision::Approved, None)
            .unwrap();

        let decided = waiter.await.unwrap().unwrap();
        assert_eq!(decided.decision, ReviewDecision::Approved);
        assert!(decided.decided_at.is_some());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_decided() {
        let coordinator = ReviewCoordinator::new();
        let record = coordinator.open(change_id(), ReviewStage::ApplyApproval);
        coordinator
            .decide(
                &record.review_id,
                ReviewDecision::Rejected,
                Some("wrong file".to_string()),
            )
            .unwrap();
        let decided = coordinator.wait_for_decision(&record.review_id).await.unwrap();
        assert_eq!(decided.feedback.as_deref(), Some("wrong file"));
    }

    #[test]
    fn double_decision_is_rejected() {
        let coordinator = ReviewCoordinator::new();
        let record = coordinator.open(change_id(), ReviewStage::UseConsent);
        coordinator
            .decide(&record.review_id, ReviewDecision::Approved, None)
            .unwrap();
        let err = coordinator
            .decide(&record.review_id, ReviewDecision::Rejected, None)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AlreadyDecided { .. }));
    }

    #[test]
    fn unknown_review_is_rejected() {
        let coordinator = ReviewCoordinator::new();
        let bogus = ReviewId::generate();
        assert!(matches!(
            coordinator.decide(&bogus, ReviewDecision::Approved, None),
            Err(ProtocolError::UnknownReview { .. })
        ));
    }
}
