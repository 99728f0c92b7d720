use crate::{
    errors::{
        self,
        ClassifiedError,
        ErrorKind,
    },
    provider::{
        PendingCall,
        RpcError,
        TxHash,
        TxStatus,
    },
};
use std::{
    fmt,
    future::Future,
};
use tracing::{
    debug,
    error,
};

/// The state-changing requests the session can issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    CreateQuiz,
    SubmitAnswer,
    FundQuiz,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::CreateQuiz => "create-quiz",
            CallKind::SubmitAnswer => "submit-answer",
            CallKind::FundQuiz => "fund-quiz",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle of the single in-flight call the session allows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Submitting,
    PendingConfirmation(TxHash),
}

/// Resolution of a tracked call. `Rejected` is the silent outcome of the
/// user declining in the wallet; it surfaces no error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    Confirmed,
    Rejected,
    Failed(ClassifiedError),
}

/// Drive one state-changing request from submission through finalization.
/// `on_submitted` fires as soon as the wallet accepts the request and hands
/// back a pending handle. Inclusion with a failure status is a revert; the
/// ledger does not say why, so a fixed message stands in.
pub async fn drive<Fut, N>(kind: CallKind, submit: Fut, mut on_submitted: N) -> CallOutcome
where
    Fut: Future<Output = Result<PendingCall, RpcError>>,
    N: FnMut(TxHash),
{
    let pending = match submit.await {
        Ok(pending) => pending,
        Err(raw) => {
            let classified = errors::classify(&raw);
            if classified.kind == ErrorKind::UserDeclined {
                debug!(%kind, "declined by user");
                return CallOutcome::Rejected;
            }
            error!(%kind, error = %raw, "submission failed");
            return CallOutcome::Failed(classified);
        }
    };

    let tx_hash = pending.tx_hash;
    debug!(%kind, %tx_hash, "submission accepted");
    on_submitted(tx_hash);

    match pending.finalized.await {
        Ok(TxStatus::Success) => {
            debug!(%kind, %tx_hash, "confirmed");
            CallOutcome::Confirmed
        }
        Ok(TxStatus::Failure) => {
            error!(%kind, %tx_hash, "transaction reverted");
            CallOutcome::Failed(ClassifiedError::unknown(errors::REMOTE_ACTION_FAILED))
        }
        Err(_) => {
            error!(%kind, %tx_hash, "finalization channel closed");
            CallOutcome::Failed(ClassifiedError::unknown(
                "lost track of the pending transaction",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::errors::TX_REJECTED_BY_USER;
    use tokio::sync::oneshot;

    fn accepted_call() -> (PendingCall, oneshot::Sender<TxStatus>) {
        let (status_tx, finalized) = oneshot::channel();
        let pending = PendingCall {
            tx_hash: TxHash::random(),
            finalized,
        };
        (pending, status_tx)
    }

    #[tokio::test]
    async fn drive__success_status_confirms() {
        let (pending, status_tx) = accepted_call();
        status_tx.send(TxStatus::Success).unwrap();
        let mut submitted = None;

        let outcome = drive(CallKind::SubmitAnswer, async { Ok(pending) }, |hash| {
            submitted = Some(hash);
        })
        .await;

        assert_eq!(outcome, CallOutcome::Confirmed);
        assert!(submitted.is_some());
    }

    #[tokio::test]
    async fn drive__failure_status_is_reverted() {
        let (pending, status_tx) = accepted_call();
        status_tx.send(TxStatus::Failure).unwrap();

        let outcome = drive(CallKind::FundQuiz, async { Ok(pending) }, |_| {}).await;

        match outcome {
            CallOutcome::Failed(err) => {
                assert_eq!(err.kind, ErrorKind::Unknown);
                assert_eq!(err.message, errors::REMOTE_ACTION_FAILED);
            }
            other => panic!("expected revert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drive__user_decline_is_silently_rejected() {
        let raw = RpcError::with_code(TX_REJECTED_BY_USER, "User denied transaction");
        let mut submitted = false;

        let outcome = drive(
            CallKind::SubmitAnswer,
            async { Err(raw) },
            |_| submitted = true,
        )
        .await;

        assert_eq!(outcome, CallOutcome::Rejected);
        assert!(!submitted);
    }

    #[tokio::test]
    async fn drive__other_submission_errors_are_classified() {
        let raw = RpcError::with_data("Internal JSON-RPC error.", "out of gas");

        let outcome = drive(CallKind::CreateQuiz, async { Err(raw) }, |_| {}).await;

        match outcome {
            CallOutcome::Failed(err) => {
                assert_eq!(err.kind, ErrorKind::RemoteRejected);
                assert_eq!(err.message, "out of gas");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
