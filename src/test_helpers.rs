//! Scripted collaborators for driving the session controller in tests.

use crate::{
    AnswerCommitment,
    client::{
        SessionController,
        SessionReceiver,
    },
    network::LOCAL_CHAIN_ID,
    provider::{
        Address,
        ChainId,
        PendingCall,
        QuizEvent,
        QuizFactory,
        QuizInstance,
        RpcError,
        TxHash,
        TxStatus,
        WalletEvent,
        WalletProvider,
    },
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::{
        Notify,
        mpsc,
        oneshot,
    },
    time,
};

/// How a scripted state-changing call should behave.
pub enum SubmissionScript {
    /// Accepted and finalized immediately with the given status.
    Resolve(TxStatus),
    /// Accepted but left pending until released by the test.
    Hold,
    /// Rejected at submission time.
    Fail(RpcError),
}

fn scripted_call(
    script: SubmissionScript,
    held: &mut Vec<oneshot::Sender<TxStatus>>,
) -> Result<PendingCall, RpcError> {
    match script {
        SubmissionScript::Fail(err) => Err(err),
        SubmissionScript::Resolve(status) => {
            let (status_tx, finalized) = oneshot::channel();
            let _ = status_tx.send(status);
            Ok(PendingCall {
                tx_hash: TxHash::random(),
                finalized,
            })
        }
        SubmissionScript::Hold => {
            let (status_tx, finalized) = oneshot::channel();
            held.push(status_tx);
            Ok(PendingCall {
                tx_hash: TxHash::random(),
                finalized,
            })
        }
    }
}

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct FakeWalletState {
    access: VecDeque<Result<Address, RpcError>>,
    network: Option<ChainId>,
    balances: HashMap<Address, u64>,
    subscribers: Vec<mpsc::UnboundedSender<WalletEvent>>,
}

/// Wallet collaborator with queued access results and test-injected
/// account/network notifications.
#[derive(Clone, Default)]
pub struct FakeWallet {
    state: Arc<Mutex<FakeWalletState>>,
}

impl FakeWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a granted access request for `address`.
    pub fn grant(&self, address: Address) {
        lock(&self.state).access.push_back(Ok(address));
    }

    /// Queue a user-declined access request.
    pub fn deny(&self) {
        lock(&self.state).access.push_back(Err(RpcError::with_code(
            crate::errors::TX_REJECTED_BY_USER,
            "User rejected the request.",
        )));
    }

    pub fn set_network(&self, network: impl Into<ChainId>) {
        lock(&self.state).network = Some(network.into());
    }

    pub fn set_balance(&self, address: Address, amount: u64) {
        lock(&self.state).balances.insert(address, amount);
    }

    /// Push a wallet notification to every subscriber.
    pub fn emit(&self, event: WalletEvent) {
        lock(&self.state)
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

impl WalletProvider for FakeWallet {
    async fn request_access(&self) -> Result<Address, RpcError> {
        lock(&self.state)
            .access
            .pop_front()
            .unwrap_or_else(|| Err(RpcError::new("no scripted access result")))
    }

    async fn network(&self) -> Result<ChainId, RpcError> {
        Ok(lock(&self.state)
            .network
            .clone()
            .unwrap_or_else(|| ChainId::from(LOCAL_CHAIN_ID)))
    }

    async fn get_balance(&self, address: &Address) -> Result<u64, RpcError> {
        Ok(lock(&self.state)
            .balances
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<WalletEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).subscribers.push(tx);
        rx
    }
}

struct FakeQuizRecord {
    question: String,
    solved: bool,
    balance: u64,
    read_error: Option<RpcError>,
    subscribers: Vec<mpsc::UnboundedSender<QuizEvent>>,
    submissions: VecDeque<SubmissionScript>,
    guesses: Vec<String>,
    fundings: Vec<u64>,
    held: Vec<oneshot::Sender<TxStatus>>,
}

#[derive(Default)]
struct FakeChainState {
    order: Vec<Address>,
    quizzes: HashMap<Address, FakeQuizRecord>,
    list_error: Option<RpcError>,
    list_gate: Option<Arc<Notify>>,
    list_calls: usize,
    creations: VecDeque<SubmissionScript>,
    created: Vec<(String, AnswerCommitment)>,
    held_creations: Vec<oneshot::Sender<TxStatus>>,
}

/// Factory collaborator with scripted reads, submissions and events.
#[derive(Clone, Default)]
pub struct FakeChain {
    state: Arc<Mutex<FakeChainState>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_quiz(&self, question: &str, solved: bool, balance: u64) -> Address {
        let address = Address::random();
        let mut state = lock(&self.state);
        state.order.push(address);
        state.quizzes.insert(
            address,
            FakeQuizRecord {
                question: question.to_owned(),
                solved,
                balance,
                read_error: None,
                subscribers: Vec::new(),
                submissions: VecDeque::new(),
                guesses: Vec::new(),
                fundings: Vec::new(),
                held: Vec::new(),
            },
        );
        address
    }

    /// Make every read against `address` fail.
    pub fn fail_reads(&self, address: Address, error: RpcError) {
        if let Some(record) = lock(&self.state).quizzes.get_mut(&address) {
            record.read_error = Some(error);
        }
    }

    /// Make the next instance listing fail.
    pub fn fail_list(&self, error: RpcError) {
        lock(&self.state).list_error = Some(error);
    }

    /// Block instance listings until the returned gate is notified once
    /// per blocked call.
    pub fn hold_list(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.state).list_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Script the next submission against `address`.
    pub fn script_submission(&self, address: Address, script: SubmissionScript) {
        if let Some(record) = lock(&self.state).quizzes.get_mut(&address) {
            record.submissions.push_back(script);
        }
    }

    /// Script the next quiz creation.
    pub fn script_creation(&self, script: SubmissionScript) {
        lock(&self.state).creations.push_back(script);
    }

    /// Finalize the oldest held submission against `address`.
    pub fn release_held(&self, address: Address, status: TxStatus) {
        let sender = lock(&self.state)
            .quizzes
            .get_mut(&address)
            .filter(|record| !record.held.is_empty())
            .map(|record| record.held.remove(0));
        if let Some(sender) = sender {
            let _ = sender.send(status);
        }
    }

    /// Push a quiz event to the subscribers of `address`.
    pub fn emit(&self, address: Address, event: QuizEvent) {
        if let Some(record) = lock(&self.state).quizzes.get_mut(&address) {
            record
                .subscribers
                .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        }
    }

    pub fn mark_solved(&self, address: Address) {
        if let Some(record) = lock(&self.state).quizzes.get_mut(&address) {
            record.solved = true;
        }
    }

    pub fn guesses(&self, address: Address) -> Vec<String> {
        lock(&self.state)
            .quizzes
            .get(&address)
            .map(|record| record.guesses.clone())
            .unwrap_or_default()
    }

    pub fn fundings(&self, address: Address) -> Vec<u64> {
        lock(&self.state)
            .quizzes
            .get(&address)
            .map(|record| record.fundings.clone())
            .unwrap_or_default()
    }

    pub fn created(&self) -> Vec<(String, AnswerCommitment)> {
        lock(&self.state).created.clone()
    }

    /// How many times the instance listing was fetched; one per discovery
    /// run.
    pub fn list_calls(&self) -> usize {
        lock(&self.state).list_calls
    }
}

impl QuizFactory for FakeChain {
    type Quiz = FakeQuiz;

    async fn list_quizzes(&self) -> Result<Vec<Address>, RpcError> {
        let gate = lock(&self.state).list_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut state = lock(&self.state);
        state.list_calls += 1;
        if let Some(error) = state.list_error.take() {
            return Err(error);
        }
        Ok(state.order.clone())
    }

    async fn quiz(&self, address: &Address) -> Result<FakeQuiz, RpcError> {
        let state = lock(&self.state);
        if !state.quizzes.contains_key(address) {
            return Err(RpcError::new(format!("no quiz at {address}")));
        }
        Ok(FakeQuiz {
            state: Arc::clone(&self.state),
            address: *address,
        })
    }

    async fn create_quiz(
        &self,
        question: &str,
        commitment: AnswerCommitment,
    ) -> Result<PendingCall, RpcError> {
        let mut state = lock(&self.state);
        state.created.push((question.to_owned(), commitment));
        let script = state
            .creations
            .pop_front()
            .unwrap_or(SubmissionScript::Resolve(TxStatus::Success));
        let FakeChainState { held_creations, .. } = &mut *state;
        scripted_call(script, held_creations)
    }
}

#[derive(Clone)]
pub struct FakeQuiz {
    state: Arc<Mutex<FakeChainState>>,
    address: Address,
}

impl FakeQuiz {
    fn read<T>(&self, read: impl FnOnce(&FakeQuizRecord) -> T) -> Result<T, RpcError> {
        let state = lock(&self.state);
        let record = state
            .quizzes
            .get(&self.address)
            .ok_or_else(|| RpcError::new(format!("no quiz at {}", self.address)))?;
        if let Some(error) = &record.read_error {
            return Err(error.clone());
        }
        Ok(read(record))
    }

    fn submit(
        &self,
        record_call: impl FnOnce(&mut FakeQuizRecord),
    ) -> Result<PendingCall, RpcError> {
        let mut state = lock(&self.state);
        let record = state
            .quizzes
            .get_mut(&self.address)
            .ok_or_else(|| RpcError::new(format!("no quiz at {}", self.address)))?;
        record_call(record);
        let script = record
            .submissions
            .pop_front()
            .unwrap_or(SubmissionScript::Resolve(TxStatus::Success));
        scripted_call(script, &mut record.held)
    }
}

impl QuizInstance for FakeQuiz {
    fn address(&self) -> Address {
        self.address
    }

    async fn question(&self) -> Result<String, RpcError> {
        self.read(|record| record.question.clone())
    }

    async fn solved(&self) -> Result<bool, RpcError> {
        self.read(|record| record.solved)
    }

    async fn balance(&self) -> Result<u64, RpcError> {
        self.read(|record| record.balance)
    }

    async fn submit_answer(&self, guess: &str) -> Result<PendingCall, RpcError> {
        let guess = guess.to_owned();
        self.submit(|record| record.guesses.push(guess))
    }

    async fn fund(&self, amount: u64) -> Result<PendingCall, RpcError> {
        self.submit(|record| record.fundings.push(amount))
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<QuizEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        if let Some(record) = state.quizzes.get_mut(&self.address) {
            record.subscribers.push(tx);
        }
        rx
    }
}

/// Process queued session messages until the channel stays quiet. Under a
/// paused test clock this settles as soon as all spawned work has
/// reported back.
pub async fn settle<W, C>(
    controller: &mut SessionController<W, C>,
    rx: &mut SessionReceiver<C::Quiz>,
) where
    W: WalletProvider,
    C: QuizFactory,
{
    while let Ok(Some(message)) = time::timeout(Duration::from_millis(250), rx.recv()).await {
        controller.process(message).await;
    }
}
