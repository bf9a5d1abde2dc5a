//! The facade the transports talk to. Owns the in-flight request registry,
//! the per-path queues, and the two human checkpoints; drives each request
//! through validation, consent, preprocessing, approval, and apply.

use crate::apply::{apply_change, ApplyResult};
use crate::archive::Archive;
use crate::commit::commit_message;
use crate::coordinator::ReviewCoordinator;
use crate::error::{ProtocolError, StewardError};
use crate::normalize::NormalizerRegistry;
use crate::pipeline::{self, PipelineOutput};
use crate::state::validate_transition;
use crate::types::enums::{PipelineState, ReviewDecision, ReviewStage};
use crate::types::ids::{ChangeId, ReviewId};
use crate::types::{
    ArchiveOutcome, ArchiveRecord, ChangeRequest, EventBody, FileDiff, OutcomeDecision,
    ReviewPayload, ReviewRecord,
};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use sw_events::{EventBus, EventRecord, EventSource};
use sw_vcs::{GitBackend, VcsBackend};
use tokio::sync::OwnedMutexGuard;

/// One in-flight request. Lives from submission until a terminal state, then
/// is dropped, which releases the path lock to the next queued request.
pub struct RequestContext {
    pub change_id: ChangeId,
    pub state: PipelineState,
    request: ChangeRequest,
    file: FileDiff,
    output: Option<PipelineOutput>,
    current_review: Option<ReviewId>,
    _path_guards: Vec<OwnedMutexGuard<()>>,
}

/// What a checkpoint decision produced: another checkpoint, a finished
/// apply, or a terminal archive record.
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    Next(ReviewPayload),
    Applied(ApplyResult),
    Archived(ArchiveRecord),
}

/// One checkpoint answer from whoever is reviewing.
#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub approved: bool,
    pub feedback: Option<String>,
}

/// Supplies checkpoint decisions for [`Steward::run_request`]. The CLI
/// implements this with interactive prompts; tests implement it with canned
/// answers.
pub trait ReviewDecider {
    fn decide(
        &mut self,
        payload: &ReviewPayload,
    ) -> impl std::future::Future<Output = DecisionInput> + Send;
}

/// Serializes requests that target the same path while leaving requests for
/// disjoint paths fully independent.
#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    /// Acquires guards for every path, in the given order. Callers pass the
    /// paths sorted and deduplicated so two requests holding overlapping sets
    /// can never wait on each other in opposite orders.
    async fn acquire(&self, paths: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(paths.len());
        for path in paths {
            let lock = {
                let mut locks = self.locks.lock().expect("path lock registry poisoned");
                Arc::clone(locks.entry(path.clone()).or_default())
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

pub struct Steward<A: Archive, V: VcsBackend = GitBackend> {
    repo_root: PathBuf,
    archive: A,
    registry: NormalizerRegistry,
    coordinator: ReviewCoordinator,
    events: EventBus,
    source: EventSource,
    locks: PathLocks,
    instances: Mutex<HashMap<String, RequestContext>>,
    review_index: Mutex<HashMap<String, ChangeId>>,
    _backend: PhantomData<V>,
}

impl<A: Archive, V: VcsBackend> Steward<A, V> {
    pub fn new(repo_root: PathBuf, archive: A, events: EventBus, source: EventSource) -> Self {
        Self {
            repo_root,
            archive,
            registry: NormalizerRegistry::with_defaults(),
            coordinator: ReviewCoordinator::new(),
            events,
            source,
            locks: PathLocks::default(),
            instances: Mutex::new(HashMap::new()),
            review_index: Mutex::new(HashMap::new()),
            _backend: PhantomData,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Entry point for an agent: validate the request, queue on its target
    /// path, and open the use-consent checkpoint. The returned payload shows
    /// the summary only; nothing is analyzed or staged before consent.
    pub async fn request_change(
        &self,
        summary: &str,
        unified_diff: &str,
    ) -> Result<ReviewPayload, StewardError> {
        let change_id = ChangeId::derive(summary, unified_diff);
        let (request, file) = pipeline::validate(summary, unified_diff)?;

        if self.archive.is_settled(&change_id)? {
            return Err(ProtocolError::AlreadyProcessed {
                change_id: change_id.to_string(),
            }
            .into());
        }
        if self
            .instances
            .lock()
            .expect("instance registry poisoned")
            .contains_key(change_id.as_str())
        {
            return Err(ProtocolError::InFlight {
                change_id: change_id.to_string(),
            }
            .into());
        }

        let target = file
            .target_path()
            .ok_or(crate::error::ValidationError::NoPaths)?
            .to_string();
        // A move or rename touches both sides, so both are serialized.
        let mut affected: Vec<String> = file
            .old_path
            .iter()
            .chain(file.new_path.iter())
            .cloned()
            .collect();
        affected.sort();
        affected.dedup();
        let path_guards = self.locks.acquire(&affected).await;

        // Raced another submission of the same request while queued.
        if self.archive.is_settled(&change_id)? {
            return Err(ProtocolError::AlreadyProcessed {
                change_id: change_id.to_string(),
            }
            .into());
        }

        self.archive.record_request(&change_id, &request)?;
        self.publish(
            &change_id,
            EventBody::RequestReceived {
                summary: request.summary.clone(),
                target_path: target,
            },
        );

        let review = self
            .coordinator
            .open(change_id.clone(), ReviewStage::UseConsent);
        let payload = ReviewPayload {
            review_id: review.review_id.clone(),
            change_id: change_id.clone(),
            stage: ReviewStage::UseConsent,
            message: format!(
                "An agent requests consent to process this change: {}",
                request.summary.trim()
            ),
            summary: request.summary.clone(),
            normalized_diff: String::new(),
            metadata: Default::default(),
        };

        let context = RequestContext {
            change_id: change_id.clone(),
            state: PipelineState::AwaitingUseConsent,
            request,
            file,
            output: None,
            current_review: Some(review.review_id.clone()),
            _path_guards: path_guards,
        };
        self.instances
            .lock()
            .expect("instance registry poisoned")
            .insert(change_id.to_string(), context);
        self.review_index
            .lock()
            .expect("review index poisoned")
            .insert(review.review_id.to_string(), change_id.clone());

        self.publish(
            &change_id,
            EventBody::StateChanged {
                from: PipelineState::Validated,
                to: PipelineState::AwaitingUseConsent,
            },
        );
        self.publish(
            &change_id,
            EventBody::ReviewOpened {
                review_id: review.review_id,
                stage: ReviewStage::UseConsent,
            },
        );
        Ok(payload)
    }

    /// Lands a human decision on an open checkpoint and advances the request:
    /// consent approval runs preprocessing and opens apply-approval; apply
    /// approval mutates the tree and commits; any refusal archives a
    /// terminal outcome.
    pub fn handle_review_response(
        &self,
        review_id: &ReviewId,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<ReviewOutcome, StewardError> {
        let change_id = self
            .review_index
            .lock()
            .expect("review index poisoned")
            .get(review_id.as_str())
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownReview {
                review_id: review_id.to_string(),
            })?;

        let decision = if approved {
            ReviewDecision::Approved
        } else {
            ReviewDecision::Rejected
        };
        let record = self.coordinator.decide(review_id, decision, feedback.clone())?;
        self.archive.record_review(&change_id, &record)?;
        self.publish(
            &change_id,
            EventBody::ReviewDecided {
                review_id: review_id.clone(),
                stage: record.stage,
                decision: record.decision,
            },
        );

        let state = self.state(&change_id)?;
        match (record.stage, state) {
            (ReviewStage::UseConsent, PipelineState::AwaitingUseConsent) => {
                if approved {
                    self.advance_to_apply_approval(&change_id)
                } else {
                    let archived =
                        self.terminate(&change_id, PipelineState::Declined, OutcomeDecision::Declined)?;
                    Ok(ReviewOutcome::Archived(archived))
                }
            }
            (ReviewStage::ApplyApproval, PipelineState::AwaitingApplyApproval) => {
                if approved {
                    self.run_apply(&change_id)
                } else {
                    let archived = self.terminate(
                        &change_id,
                        PipelineState::Rejected,
                        OutcomeDecision::Rejected { feedback },
                    )?;
                    Ok(ReviewOutcome::Archived(archived))
                }
            }
            (_, state) => Err(ProtocolError::OutOfOrder {
                change_id: change_id.to_string(),
                state,
            }
            .into()),
        }
    }

    /// Withdraws a request that is parked at a checkpoint.
    pub fn cancel(&self, change_id: &ChangeId) -> Result<ArchiveRecord, StewardError> {
        let (state, review_id) = {
            let instances = self.instances.lock().expect("instance registry poisoned");
            let context = instances.get(change_id.as_str()).ok_or_else(|| {
                ProtocolError::UnknownChange {
                    change_id: change_id.to_string(),
                }
            })?;
            (context.state, context.current_review.clone())
        };
        if !matches!(
            state,
            PipelineState::AwaitingUseConsent | PipelineState::AwaitingApplyApproval
        ) {
            return Err(ProtocolError::OutOfOrder {
                change_id: change_id.to_string(),
                state,
            }
            .into());
        }
        if let Some(review_id) = review_id {
            let record = self.coordinator.decide(
                &review_id,
                ReviewDecision::Rejected,
                Some("cancelled by requester".to_string()),
            )?;
            self.archive.record_review(change_id, &record)?;
        }
        self.terminate(change_id, PipelineState::Cancelled, OutcomeDecision::Cancelled)
    }

    /// Current lifecycle state: in-flight state if the request is live,
    /// otherwise the terminal state recovered from the archive.
    pub fn state(&self, change_id: &ChangeId) -> Result<PipelineState, StewardError> {
        if let Some(context) = self
            .instances
            .lock()
            .expect("instance registry poisoned")
            .get(change_id.as_str())
        {
            return Ok(context.state);
        }
        let entry = self.archive.load(change_id)?.ok_or_else(|| {
            ProtocolError::UnknownChange {
                change_id: change_id.to_string(),
            }
        })?;
        let outcome = entry.outcome.ok_or_else(|| ProtocolError::UnknownChange {
            change_id: change_id.to_string(),
        })?;
        Ok(match outcome.decision {
            OutcomeDecision::Applied { .. } => PipelineState::Applied,
            OutcomeDecision::Rejected { .. } => PipelineState::Rejected,
            OutcomeDecision::Declined => PipelineState::Declined,
            OutcomeDecision::Cancelled => PipelineState::Cancelled,
            OutcomeDecision::Failed { .. } => PipelineState::Failed,
        })
    }

    /// Blocks until the given checkpoint is decided.
    pub async fn wait_for_decision(
        &self,
        review_id: &ReviewId,
    ) -> Result<ReviewRecord, StewardError> {
        Ok(self.coordinator.wait_for_decision(review_id).await?)
    }

    /// Drives one request end to end, asking `decider` at each checkpoint.
    pub async fn run_request<D: ReviewDecider>(
        &self,
        summary: &str,
        unified_diff: &str,
        decider: &mut D,
    ) -> Result<ReviewOutcome, StewardError> {
        let mut payload = self.request_change(summary, unified_diff).await?;
        loop {
            let decision = decider.decide(&payload).await;
            match self.handle_review_response(
                &payload.review_id,
                decision.approved,
                decision.feedback,
            )? {
                ReviewOutcome::Next(next) => payload = next,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Consent granted: run analysis and normalization, then park at the
    /// apply-approval checkpoint with the full preprocessed change on show.
    fn advance_to_apply_approval(
        &self,
        change_id: &ChangeId,
    ) -> Result<ReviewOutcome, StewardError> {
        let (request, file) = {
            let instances = self.instances.lock().expect("instance registry poisoned");
            let context = instances.get(change_id.as_str()).ok_or_else(|| {
                ProtocolError::UnknownChange {
                    change_id: change_id.to_string(),
                }
            })?;
            (context.request.clone(), context.file.clone())
        };
        self.transition(change_id, PipelineState::Analyzed)?;

        let output = match pipeline::preprocess(
            &self.repo_root,
            &self.registry,
            &request,
            &file,
            change_id.clone(),
        ) {
            Ok(output) => output,
            Err(err) => {
                // Recoverable: the agent gets the error and may resubmit.
                self.transition(change_id, PipelineState::Returned)?;
                self.publish(
                    change_id,
                    EventBody::Terminated {
                        state: PipelineState::Returned,
                    },
                );
                self.remove_instance(change_id);
                return Err(err);
            }
        };
        self.transition(change_id, PipelineState::Normalized)?;
        self.archive.record_change(&output.change)?;
        self.publish(
            change_id,
            EventBody::ChangePreprocessed {
                change: output.change.clone(),
            },
        );

        let review = self
            .coordinator
            .open(change_id.clone(), ReviewStage::ApplyApproval);
        let payload = ReviewPayload {
            review_id: review.review_id.clone(),
            change_id: change_id.clone(),
            stage: ReviewStage::ApplyApproval,
            message: format!(
                "Approve applying this {} to {}?",
                output.change.operation.kind, output.change.operation.source_path
            ),
            summary: request.summary.clone(),
            normalized_diff: output.change.normalized_diff.clone(),
            metadata: output.change.metadata.clone(),
        };

        {
            let mut instances = self.instances.lock().expect("instance registry poisoned");
            if let Some(context) = instances.get_mut(change_id.as_str()) {
                context.output = Some(output);
                context.current_review = Some(review.review_id.clone());
            }
        }
        self.review_index
            .lock()
            .expect("review index poisoned")
            .insert(review.review_id.to_string(), change_id.clone());

        self.transition(change_id, PipelineState::AwaitingApplyApproval)?;
        self.publish(
            change_id,
            EventBody::ReviewOpened {
                review_id: review.review_id,
                stage: ReviewStage::ApplyApproval,
            },
        );
        Ok(ReviewOutcome::Next(payload))
    }

    fn run_apply(&self, change_id: &ChangeId) -> Result<ReviewOutcome, StewardError> {
        self.transition(change_id, PipelineState::Applying)?;
        let (summary, output) = {
            let instances = self.instances.lock().expect("instance registry poisoned");
            let context = instances.get(change_id.as_str()).ok_or_else(|| {
                ProtocolError::UnknownChange {
                    change_id: change_id.to_string(),
                }
            })?;
            let output = context.output.clone().ok_or_else(|| StewardError::Internal {
                message: format!("no preprocessed change for {change_id}"),
            })?;
            (context.request.summary.clone(), output)
        };

        let message = commit_message(&summary, change_id, &output.change.operation);
        let result = match apply_change::<V>(
            &self.repo_root,
            &output.change.operation,
            output.post_content.as_deref(),
            &message,
        ) {
            Ok(result) => result,
            Err(err) => {
                log::error!("apply failed for {change_id}: {err}");
                self.transition(change_id, PipelineState::Failed)?;
                // The archive entry already holds both approvals, so the
                // failure is recorded as its disposition.
                self.archive.record_outcome(&ArchiveOutcome::new(
                    change_id.clone(),
                    OutcomeDecision::Failed {
                        reason: err.to_string(),
                    },
                ))?;
                self.publish(
                    change_id,
                    EventBody::Terminated {
                        state: PipelineState::Failed,
                    },
                );
                self.remove_instance(change_id);
                return Err(err.into());
            }
        };

        self.transition(change_id, PipelineState::Applied)?;
        self.publish(
            change_id,
            EventBody::Applied {
                commit: Some(result.commit.clone()),
            },
        );
        self.archive.record_outcome(&ArchiveOutcome::new(
            change_id.clone(),
            OutcomeDecision::Applied {
                commit: Some(result.commit.clone()),
            },
        ))?;
        self.publish(
            change_id,
            EventBody::Terminated {
                state: PipelineState::Applied,
            },
        );
        self.remove_instance(change_id);
        Ok(ReviewOutcome::Applied(result))
    }

    /// Archives the terminal outcome and drops the instance.
    fn terminate(
        &self,
        change_id: &ChangeId,
        state: PipelineState,
        decision: OutcomeDecision,
    ) -> Result<ArchiveRecord, StewardError> {
        self.transition(change_id, state)?;
        let outcome = ArchiveOutcome::new(change_id.clone(), decision);
        self.archive.record_outcome(&outcome)?;
        self.publish(change_id, EventBody::Terminated { state });
        self.remove_instance(change_id);
        Ok(ArchiveRecord {
            change_id: change_id.clone(),
            archived_to: self.archive.entry_dir(change_id),
            outcome,
        })
    }

    fn transition(&self, change_id: &ChangeId, to: PipelineState) -> Result<(), StewardError> {
        let mut instances = self.instances.lock().expect("instance registry poisoned");
        let context = instances.get_mut(change_id.as_str()).ok_or_else(|| {
            ProtocolError::UnknownChange {
                change_id: change_id.to_string(),
            }
        })?;
        validate_transition(change_id, context.state, to)?;
        let from = context.state;
        context.state = to;
        drop(instances);
        self.publish(change_id, EventBody::StateChanged { from, to });
        Ok(())
    }

    fn remove_instance(&self, change_id: &ChangeId) {
        self.instances
            .lock()
            .expect("instance registry poisoned")
            .remove(change_id.as_str());
    }

    fn publish(&self, change_id: &ChangeId, body: EventBody) {
        if self.events.receiver_count() == 0 {
            return;
        }
        let Ok(value) = serde_json::to_value(&body) else {
            return;
        };
        let _ = self
            .events
            .publish(EventRecord::new(change_id.to_string(), self.source, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApplyError, ArchiveError};
    use crate::types::ArchiveEntry;
    use std::fs;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// In-memory archive for orchestrator tests.
    #[derive(Default)]
    struct MemArchive {
        entries: StdMutex<HashMap<String, ArchiveEntry>>,
    }

    impl Archive for MemArchive {
        fn entry_dir(&self, change_id: &ChangeId) -> PathBuf {
            PathBuf::from("mem").join(change_id.as_str())
        }

        fn is_settled(&self, change_id: &ChangeId) -> Result<bool, ArchiveError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(change_id.as_str())
                .is_some_and(|entry| entry.outcome.is_some()))
        }

        fn record_request(
            &self,
            change_id: &ChangeId,
            request: &ChangeRequest,
        ) -> Result<(), ArchiveError> {
            self.entries
                .lock()
                .unwrap()
                .entry(change_id.to_string())
                .or_default()
                .request = Some(request.clone());
            Ok(())
        }

        fn record_change(
            &self,
            change: &crate::types::PreprocessedChange,
        ) -> Result<(), ArchiveError> {
            self.entries
                .lock()
                .unwrap()
                .entry(change.change_id.to_string())
                .or_default()
                .change = Some(change.clone());
            Ok(())
        }

        fn record_review(
            &self,
            change_id: &ChangeId,
            review: &ReviewRecord,
        ) -> Result<(), ArchiveError> {
            self.entries
                .lock()
                .unwrap()
                .entry(change_id.to_string())
                .or_default()
                .reviews
                .push(review.clone());
            Ok(())
        }

        fn record_outcome(&self, outcome: &ArchiveOutcome) -> Result<(), ArchiveError> {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.entry(outcome.change_id.to_string()).or_default();
            if entry.outcome.is_some() {
                return Err(ArchiveError::AlreadyRecorded {
                    path: outcome.change_id.to_string(),
                });
            }
            entry.outcome = Some(outcome.clone());
            Ok(())
        }

        fn load(&self, change_id: &ChangeId) -> Result<Option<ArchiveEntry>, ArchiveError> {
            Ok(self.entries.lock().unwrap().get(change_id.as_str()).cloned())
        }
    }

    struct Approve;

    impl ReviewDecider for Approve {
        async fn decide(&mut self, _payload: &ReviewPayload) -> DecisionInput {
            DecisionInput {
                approved: true,
                feedback: None,
            }
        }
    }

    /// Approves consent, rejects apply with feedback.
    struct RejectApply;

    impl ReviewDecider for RejectApply {
        async fn decide(&mut self, payload: &ReviewPayload) -> DecisionInput {
            match payload.stage {
                ReviewStage::UseConsent => DecisionInput {
                    approved: true,
                    feedback: None,
                },
                ReviewStage::ApplyApproval => DecisionInput {
                    approved: false,
                    feedback: Some("wrong file".to_string()),
                },
            }
        }
    }

    fn steward(repo: &TempDir) -> Steward<MemArchive> {
        Steward::new(
            repo.path().to_path_buf(),
            MemArchive::default(),
            EventBus::new(64),
            EventSource::Mcp,
        )
    }

    const CREATE_DIFF: &str = "--- /dev/null\n+++ b/README.md\n@@ -0,0 +1 @@\n+# Project\n";
    const SUMMARY: &str = "add a project readme";

    #[tokio::test]
    async fn full_flow_applies_and_commits() {
        let repo = TempDir::new().unwrap();
        let steward = steward(&repo);
        let outcome = steward
            .run_request(SUMMARY, CREATE_DIFF, &mut Approve)
            .await
            .unwrap();
        let ReviewOutcome::Applied(result) = outcome else {
            panic!("expected an applied outcome");
        };
        assert!(!result.commit.is_empty());
        assert_eq!(
            fs::read_to_string(repo.path().join("README.md")).unwrap(),
            "# Project\n"
        );
        // Settled: the same request cannot run again.
        let err = steward.request_change(SUMMARY, CREATE_DIFF).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn consent_payload_shows_no_diff() {
        let repo = TempDir::new().unwrap();
        let steward = steward(&repo);
        let payload = steward.request_change(SUMMARY, CREATE_DIFF).await.unwrap();
        assert_eq!(payload.stage, ReviewStage::UseConsent);
        assert!(payload.normalized_diff.is_empty());
        assert!(payload.metadata.is_empty());
    }

    #[tokio::test]
    async fn rejection_archives_without_touching_the_tree() {
        let repo = TempDir::new().unwrap();
        let steward = steward(&repo);
        let outcome = steward
            .run_request(SUMMARY, CREATE_DIFF, &mut RejectApply)
            .await
            .unwrap();
        let ReviewOutcome::Archived(record) = outcome else {
            panic!("expected an archived outcome");
        };
        assert!(matches!(
            record.outcome.decision,
            OutcomeDecision::Rejected { ref feedback } if feedback.as_deref() == Some("wrong file")
        ));
        assert!(!repo.path().join("README.md").exists());
        assert!(!repo.path().join(".git").exists());
        assert_eq!(
            steward.state(&record.change_id).unwrap(),
            PipelineState::Rejected
        );
    }

    #[tokio::test]
    async fn consent_decline_terminates_as_declined() {
        let repo = TempDir::new().unwrap();
        let steward = steward(&repo);
        let payload = steward.request_change(SUMMARY, CREATE_DIFF).await.unwrap();
        let outcome = steward
            .handle_review_response(&payload.review_id, false, None)
            .unwrap();
        let ReviewOutcome::Archived(record) = outcome else {
            panic!("expected an archived outcome");
        };
        assert!(matches!(record.outcome.decision, OutcomeDecision::Declined));
    }

    #[tokio::test]
    async fn consent_approval_reveals_preprocessed_diff() {
        let repo = TempDir::new().unwrap();
        let steward = steward(&repo);
        let payload = steward.request_change(SUMMARY, CREATE_DIFF).await.unwrap();
        let outcome = steward
            .handle_review_response(&payload.review_id, true, None)
            .unwrap();
        let ReviewOutcome::Next(next) = outcome else {
            panic!("expected the apply-approval checkpoint");
        };
        assert_eq!(next.stage, ReviewStage::ApplyApproval);
        assert!(next.normalized_diff.contains("+# Project"));
        assert_eq!(
            next.metadata.get("operation"),
            Some(&serde_json::json!("create"))
        );
    }

    #[tokio::test]
    async fn duplicate_decision_is_rejected() {
        let repo = TempDir::new().unwrap();
        let steward = steward(&repo);
        let payload = steward.request_change(SUMMARY, CREATE_DIFF).await.unwrap();
        steward
            .handle_review_response(&payload.review_id, false, None)
            .unwrap();
        let err = steward
            .handle_review_response(&payload.review_id, true, None)
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn cancel_while_awaiting_consent() {
        let repo = TempDir::new().unwrap();
        let steward = steward(&repo);
        let payload = steward.request_change(SUMMARY, CREATE_DIFF).await.unwrap();
        let record = steward.cancel(&payload.change_id).unwrap();
        assert!(matches!(record.outcome.decision, OutcomeDecision::Cancelled));
        assert!(steward
            .handle_review_response(&payload.review_id, true, None)
            .is_err());
    }

    #[tokio::test]
    async fn disjoint_paths_run_independently() {
        let repo = TempDir::new().unwrap();
        let steward = steward(&repo);
        let first = steward
            .request_change("create the first file", "--- /dev/null\n+++ b/one.txt\n@@ -0,0 +1 @@\n+1\n")
            .await
            .unwrap();
        let second = steward
            .request_change("create the second file", "--- /dev/null\n+++ b/two.txt\n@@ -0,0 +1 @@\n+2\n")
            .await
            .unwrap();
        assert_ne!(first.change_id, second.change_id);
        steward.cancel(&first.change_id).unwrap();
        steward.cancel(&second.change_id).unwrap();
    }

    #[tokio::test]
    async fn same_path_requests_queue_behind_each_other() {
        let repo = TempDir::new().unwrap();
        let steward = Arc::new(steward(&repo));
        let first = steward
            .request_change(SUMMARY, CREATE_DIFF)
            .await
            .unwrap();

        let second = {
            let steward = Arc::clone(&steward);
            tokio::spawn(async move {
                steward
                    .request_change(
                        "recreate the readme differently",
                        "--- /dev/null\n+++ b/README.md\n@@ -0,0 +1 @@\n+# Other\n",
                    )
                    .await
            })
        };
        // The second request targets the same path and must wait for the
        // first to reach a terminal state.
        tokio::task::yield_now().await;
        assert!(!second.is_finished());

        steward.cancel(&first.change_id).unwrap();
        let payload = second.await.unwrap().unwrap();
        assert_eq!(payload.stage, ReviewStage::UseConsent);
        steward.cancel(&payload.change_id).unwrap();
    }

    #[tokio::test]
    async fn rename_queues_behind_a_request_for_its_destination() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("a.py"), "print('hi')\n").unwrap();
        let steward = Arc::new(steward(&repo));
        let first = steward
            .request_change(
                "create the b helper",
                "--- /dev/null\n+++ b/b.py\n@@ -0,0 +1 @@\n+print('b')\n",
            )
            .await
            .unwrap();

        // The rename's destination is b.py, which the first request owns
        // until it settles.
        let second = {
            let steward = Arc::clone(&steward);
            tokio::spawn(async move {
                steward
                    .request_change(
                        "rename a.py to b.py",
                        "diff --git a/a.py b/b.py\nsimilarity index 100%\nrename from a.py\nrename to b.py\n",
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(!second.is_finished());

        steward.cancel(&first.change_id).unwrap();
        let payload = second.await.unwrap().unwrap();
        assert_eq!(payload.stage, ReviewStage::UseConsent);
        steward.cancel(&payload.change_id).unwrap();
    }

    #[tokio::test]
    async fn stale_base_fails_the_apply() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("f.txt"), "original\n").unwrap();
        let steward = steward(&repo);
        let diff = "--- a/f.txt\n+++ b/f.txt\n@@ -1 +1 @@\n-original\n+updated\n";
        let payload = steward
            .request_change("update f to its new content", diff)
            .await
            .unwrap();
        let ReviewOutcome::Next(next) = steward
            .handle_review_response(&payload.review_id, true, None)
            .unwrap()
        else {
            panic!("expected the apply-approval checkpoint");
        };
        // The tree moves underneath between approval and apply.
        fs::write(repo.path().join("f.txt"), "changed underneath\n").unwrap();
        let err = steward
            .handle_review_response(&next.review_id, true, None)
            .unwrap_err();
        assert!(matches!(
            err,
            StewardError::Apply(ApplyError::BaseMismatch { .. })
        ));
        assert_eq!(
            fs::read_to_string(repo.path().join("f.txt")).unwrap(),
            "changed underneath\n"
        );
        // The failure itself is the archived disposition.
        assert_eq!(
            steward.state(&payload.change_id).unwrap(),
            PipelineState::Failed
        );
        let entry = steward.archive.load(&payload.change_id).unwrap().unwrap();
        assert!(matches!(
            entry.outcome.unwrap().decision,
            OutcomeDecision::Failed { ref reason } if reason.contains("base content")
        ));
    }
}
