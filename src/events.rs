use crate::provider::{
    Address,
    QuizEvent,
    QuizInstance,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

/// A quiz event tagged with the instance it came from. The session applies
/// an event only when the source still matches the active quiz, so events
/// from a superseded instance are no-ops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizEventEnvelope {
    pub source: Address,
    pub event: QuizEvent,
}

/// Standing attachment to one quiz's push events. Dropping or detaching
/// stops the forwarder immediately; detach happens before a view is
/// replaced and on session reset.
pub struct QuizSubscription {
    address: Address,
    forwarder: JoinHandle<()>,
}

impl QuizSubscription {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn detach(self) {
        self.forwarder.abort();
        debug!(address = %self.address, "quiz events detached");
    }
}

impl Drop for QuizSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Attach to a quiz's event stream, forwarding each event into `tx`
/// wrapped in an envelope carrying the instance address.
pub fn attach<Q, M>(quiz: &Q, tx: mpsc::UnboundedSender<M>) -> QuizSubscription
where
    Q: QuizInstance,
    M: From<QuizEventEnvelope> + Send + 'static,
{
    let address = quiz.address();
    let mut events = quiz.subscribe();
    debug!(%address, "quiz events attached");
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let envelope = QuizEventEnvelope {
                source: address,
                event,
            };
            if tx.send(M::from(envelope)).is_err() {
                break;
            }
        }
    });
    QuizSubscription { address, forwarder }
}
