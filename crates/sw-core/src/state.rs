//! Pipeline state machine. Every state change funnels through
//! [`validate_transition`] so an out-of-order checkpoint call can never move a
//! request somewhere the lifecycle does not allow.

use crate::error::ProtocolError;
use crate::types::enums::PipelineState;
use crate::types::ids::ChangeId;

/// Legal successor states for each non-terminal state.
pub fn successors(state: PipelineState) -> &'static [PipelineState] {
    use PipelineState as S;
    match state {
        S::Received => &[S::Validated, S::Returned],
        S::Validated => &[S::AwaitingUseConsent],
        S::AwaitingUseConsent => &[S::Analyzed, S::Declined, S::Returned, S::Cancelled],
        S::Analyzed => &[S::Normalized, S::Returned],
        S::Normalized => &[S::AwaitingApplyApproval],
        S::AwaitingApplyApproval => &[S::Applying, S::Rejected, S::Cancelled],
        S::Applying => &[S::Applied, S::Failed],
        S::Applied
        | S::Rejected
        | S::Declined
        | S::Returned
        | S::Cancelled
        | S::Failed => &[],
    }
}

pub fn validate_transition(
    change_id: &ChangeId,
    from: PipelineState,
    to: PipelineState,
) -> Result<(), ProtocolError> {
    if successors(from).contains(&to) {
        Ok(())
    } else {
        Err(ProtocolError::OutOfOrder {
            change_id: change_id.to_string(),
            state: from,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState as S;

    fn id() -> ChangeId {
        ChangeId::derive("a summary long enough", "--- a/f\n+++ b/f\n")
    }

    #[test]
    fn happy_path_is_legal_end_to_end() {
        let path = [
            S::Received,
            S::Validated,
            S::AwaitingUseConsent,
            S::Analyzed,
            S::Normalized,
            S::AwaitingApplyApproval,
            S::Applying,
            S::Applied,
        ];
        for pair in path.windows(2) {
            validate_transition(&id(), pair[0], pair[1]).unwrap();
        }
    }

    #[test]
    fn terminal_states_have_no_successors() {
        for state in [
            S::Applied,
            S::Rejected,
            S::Declined,
            S::Returned,
            S::Cancelled,
            S::Failed,
        ] {
            assert!(state.is_terminal());
            assert!(successors(state).is_empty());
        }
    }

    #[test]
    fn rejects_skipping_a_checkpoint() {
        let err = validate_transition(&id(), S::Validated, S::Applying).unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfOrder { .. }));
    }

    #[test]
    fn cancel_is_legal_only_while_awaiting_a_decision() {
        validate_transition(&id(), S::AwaitingUseConsent, S::Cancelled).unwrap();
        validate_transition(&id(), S::AwaitingApplyApproval, S::Cancelled).unwrap();
        assert!(validate_transition(&id(), S::Applying, S::Cancelled).is_err());
    }
}
