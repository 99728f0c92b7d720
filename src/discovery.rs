use crate::provider::{
    Address,
    QuizFactory,
    QuizInstance,
    RpcError,
};
use tracing::debug;

/// Read-through projection of one remote quiz instance. Replaced wholesale
/// whenever discovery re-runs; the handle is never shared across views.
pub struct QuizView<Q> {
    pub handle: Q,
    pub address: Address,
    pub question: String,
    pub balance: u64,
    pub is_answer_correct: Option<bool>,
}

/// Scan the factory's quiz list in its listed order and load the first
/// instance that is still open. Later open instances are not considered
/// while an earlier one exists. A failed read aborts the whole scan;
/// partial results would misrepresent what is actually available.
pub async fn find_open_quiz<F: QuizFactory>(
    factory: &F,
) -> Result<Option<QuizView<F::Quiz>>, RpcError> {
    let addresses = factory.list_quizzes().await?;
    debug!(count = addresses.len(), "scanning quiz instances");

    for address in addresses {
        let quiz = factory.quiz(&address).await?;
        let question = quiz.question().await?;
        let solved = quiz.solved().await?;
        if solved {
            continue;
        }
        let balance = quiz.balance().await?;
        debug!(%address, "open quiz found");
        return Ok(Some(QuizView {
            handle: quiz,
            address,
            question,
            balance,
            is_answer_correct: None,
        }));
    }

    debug!("no open quiz");
    Ok(None)
}
