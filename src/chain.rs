use crate::{
    AnswerCommitment,
    commit_answer,
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
    collections::HashMap,
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
        mpsc,
        oneshot,
    },
    time,
};
use tracing::info;

const SEED_ACCOUNT_BALANCE: u64 = 1_000_000_000;

#[derive(Clone, Debug)]
pub struct DevChainConfig {
    pub network: ChainId,
    /// Simulated inclusion delay between wallet acceptance and
    /// finalization.
    pub finalize_delay: Duration,
}

impl Default for DevChainConfig {
    fn default() -> Self {
        Self {
            network: ChainId::from(LOCAL_CHAIN_ID),
            finalize_delay: Duration::from_millis(400),
        }
    }
}

struct QuizRecord {
    question: String,
    commitment: AnswerCommitment,
    solved: bool,
    balance: u64,
    subscribers: Vec<mpsc::UnboundedSender<QuizEvent>>,
}

struct ChainState {
    network: ChainId,
    finalize_delay: Duration,
    factory_address: Address,
    order: Vec<Address>,
    quizzes: HashMap<Address, QuizRecord>,
    balances: HashMap<Address, u64>,
    connected_account: Option<Address>,
    wallet_subscribers: Vec<mpsc::UnboundedSender<WalletEvent>>,
}

fn lock_state(state: &Mutex<ChainState>) -> MutexGuard<'_, ChainState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit_quiz_event(record: &mut QuizRecord, event: QuizEvent) {
    record
        .subscribers
        .retain(|subscriber| subscriber.send(event.clone()).is_ok());
}

/// An in-process quiz ledger: factory, instances, accounts and push
/// events, with deferred finalization to mimic inclusion. Lets the
/// application run end-to-end without external infrastructure; tests use
/// it for contract-surface coverage.
#[derive(Clone)]
pub struct DevChain {
    state: Arc<Mutex<ChainState>>,
}

impl DevChain {
    pub fn launch(config: DevChainConfig) -> Self {
        let factory_address = Address::random();
        info!(network = %config.network, %factory_address, "dev chain up");
        Self {
            state: Arc::new(Mutex::new(ChainState {
                network: config.network,
                finalize_delay: config.finalize_delay,
                factory_address,
                order: Vec::new(),
                quizzes: HashMap::new(),
                balances: HashMap::new(),
                connected_account: None,
                wallet_subscribers: Vec::new(),
            })),
        }
    }

    pub fn factory_address(&self) -> Address {
        lock_state(&self.state).factory_address
    }

    /// A funded wallet for a fresh random account.
    pub fn wallet(&self) -> DevWallet {
        self.wallet_for(Address::random())
    }

    /// A funded wallet for a caller-chosen account identity.
    pub fn wallet_for(&self, account: Address) -> DevWallet {
        lock_state(&self.state)
            .balances
            .insert(account, SEED_ACCOUNT_BALANCE);
        DevWallet {
            state: Arc::clone(&self.state),
            account,
        }
    }

    pub fn seed_quiz(&self, question: &str, answer: &str, balance: u64, solved: bool) -> Address {
        let address = Address::random();
        let mut state = lock_state(&self.state);
        state.order.push(address);
        state.quizzes.insert(
            address,
            QuizRecord {
                question: question.to_owned(),
                commitment: commit_answer(answer),
                solved,
                balance,
                subscribers: Vec::new(),
            },
        );
        address
    }

    /// Switch the reported network and notify wallet subscribers, as a
    /// wallet extension would when the user changes chains.
    pub fn set_network(&self, network: ChainId) {
        let mut state = lock_state(&self.state);
        state.network = network.clone();
        let event = WalletEvent::NetworkChanged(network);
        state
            .wallet_subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Revoke account access, as a wallet extension would when the user
    /// disconnects the site.
    pub fn drop_accounts(&self) {
        let mut state = lock_state(&self.state);
        state.connected_account = None;
        let event = WalletEvent::AccountsChanged(None);
        state
            .wallet_subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn defer<F>(&self, apply: F) -> PendingCall
    where
        F: FnOnce(&mut ChainState) -> TxStatus + Send + 'static,
    {
        let delay = lock_state(&self.state).finalize_delay;
        let state = Arc::clone(&self.state);
        let (status_tx, finalized) = oneshot::channel();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let status = apply(&mut *lock_state(&state));
            let _ = status_tx.send(status);
        });
        PendingCall {
            tx_hash: TxHash::random(),
            finalized,
        }
    }
}

impl QuizFactory for DevChain {
    type Quiz = DevQuiz;

    async fn list_quizzes(&self) -> Result<Vec<Address>, RpcError> {
        Ok(lock_state(&self.state).order.clone())
    }

    async fn quiz(&self, address: &Address) -> Result<DevQuiz, RpcError> {
        let state = lock_state(&self.state);
        if !state.quizzes.contains_key(address) {
            return Err(RpcError::new(format!("no quiz at {address}")));
        }
        Ok(DevQuiz {
            state: Arc::clone(&self.state),
            address: *address,
        })
    }

    async fn create_quiz(
        &self,
        question: &str,
        commitment: AnswerCommitment,
    ) -> Result<PendingCall, RpcError> {
        let question = question.to_owned();
        Ok(self.defer(move |state| {
            if question.is_empty() {
                return TxStatus::Failure;
            }
            let address = Address::random();
            state.order.push(address);
            state.quizzes.insert(
                address,
                QuizRecord {
                    question,
                    commitment,
                    solved: false,
                    balance: 0,
                    subscribers: Vec::new(),
                },
            );
            info!(%address, "quiz created");
            TxStatus::Success
        }))
    }
}

/// Handle to one quiz on the dev chain.
#[derive(Clone)]
pub struct DevQuiz {
    state: Arc<Mutex<ChainState>>,
    address: Address,
}

impl DevQuiz {
    fn read<T>(&self, read: impl FnOnce(&QuizRecord) -> T) -> Result<T, RpcError> {
        let state = lock_state(&self.state);
        state
            .quizzes
            .get(&self.address)
            .map(read)
            .ok_or_else(|| RpcError::new(format!("no quiz at {}", self.address)))
    }

    fn defer<F>(&self, apply: F) -> PendingCall
    where
        F: FnOnce(&mut QuizRecord, Option<Address>) -> (TxStatus, Option<(Address, u64)>)
            + Send
            + 'static,
    {
        let delay = lock_state(&self.state).finalize_delay;
        let state = Arc::clone(&self.state);
        let address = self.address;
        let (status_tx, finalized) = oneshot::channel();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let status = {
                let mut guard = lock_state(&state);
                let chain = &mut *guard;
                let caller = chain.connected_account;
                match chain.quizzes.get_mut(&address) {
                    Some(record) => {
                        let (status, payout) = apply(record, caller);
                        if let Some((winner, amount)) = payout {
                            *chain.balances.entry(winner).or_insert(0) += amount;
                        }
                        status
                    }
                    None => TxStatus::Failure,
                }
            };
            let _ = status_tx.send(status);
        });
        PendingCall {
            tx_hash: TxHash::random(),
            finalized,
        }
    }
}

impl QuizInstance for DevQuiz {
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
        let commitment = commit_answer(guess);
        Ok(self.defer(move |record, caller| {
            if record.solved {
                return (TxStatus::Failure, None);
            }
            if commitment == record.commitment {
                record.solved = true;
                let stake = std::mem::take(&mut record.balance);
                emit_quiz_event(record, QuizEvent::AnsweredCorrectly);
                (TxStatus::Success, caller.map(|winner| (winner, stake)))
            } else {
                emit_quiz_event(record, QuizEvent::AnsweredIncorrectly);
                (TxStatus::Success, None)
            }
        }))
    }

    async fn fund(&self, amount: u64) -> Result<PendingCall, RpcError> {
        Ok(self.defer(move |record, _caller| {
            if record.solved || amount == 0 {
                return (TxStatus::Failure, None);
            }
            record.balance += amount;
            emit_quiz_event(record, QuizEvent::Funded(record.balance));
            (TxStatus::Success, None)
        }))
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<QuizEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock_state(&self.state);
        if let Some(record) = state.quizzes.get_mut(&self.address) {
            record.subscribers.push(tx);
        }
        rx
    }
}

/// Wallet side of the dev chain: one account, granted on request.
#[derive(Clone)]
pub struct DevWallet {
    state: Arc<Mutex<ChainState>>,
    account: Address,
}

impl DevWallet {
    pub fn account(&self) -> Address {
        self.account
    }
}

impl WalletProvider for DevWallet {
    async fn request_access(&self) -> Result<Address, RpcError> {
        let mut state = lock_state(&self.state);
        state.connected_account = Some(self.account);
        Ok(self.account)
    }

    async fn network(&self) -> Result<ChainId, RpcError> {
        Ok(lock_state(&self.state).network.clone())
    }

    async fn get_balance(&self, address: &Address) -> Result<u64, RpcError> {
        Ok(lock_state(&self.state)
            .balances
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<WalletEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock_state(&self.state).wallet_subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn fast_chain() -> DevChain {
        DevChain::launch(DevChainConfig {
            finalize_delay: Duration::from_millis(1),
            ..Default::default()
        })
    }

    async fn finalize(pending: PendingCall) -> TxStatus {
        pending.finalized.await.unwrap()
    }

    #[tokio::test]
    async fn submit_answer__correct_guess_solves_and_pays_out() {
        let chain = fast_chain();
        let wallet = chain.wallet();
        let address = chain.seed_quiz("What has keys but no locks?", "a piano", 50, false);
        // given
        wallet.request_access().await.unwrap();
        let quiz = chain.quiz(&address).await.unwrap();
        let mut events = quiz.subscribe();
        let before = wallet.get_balance(&wallet.account()).await.unwrap();

        // when
        let pending = quiz.submit_answer("A  Piano").await.unwrap();

        // then
        assert_eq!(finalize(pending).await, TxStatus::Success);
        assert!(quiz.solved().await.unwrap());
        assert_eq!(events.recv().await.unwrap(), QuizEvent::AnsweredCorrectly);
        let after = wallet.get_balance(&wallet.account()).await.unwrap();
        assert_eq!(after, before + 50);
    }

    #[tokio::test]
    async fn submit_answer__wrong_guess_emits_incorrect_and_stays_open() {
        let chain = fast_chain();
        let wallet = chain.wallet();
        let address = chain.seed_quiz("Riddle", "right", 10, false);
        wallet.request_access().await.unwrap();
        let quiz = chain.quiz(&address).await.unwrap();
        let mut events = quiz.subscribe();

        let pending = quiz.submit_answer("wrong").await.unwrap();

        assert_eq!(finalize(pending).await, TxStatus::Success);
        assert!(!quiz.solved().await.unwrap());
        assert_eq!(events.recv().await.unwrap(), QuizEvent::AnsweredIncorrectly);
    }

    #[tokio::test]
    async fn submit_answer__solved_quiz_reverts() {
        let chain = fast_chain();
        let address = chain.seed_quiz("Done", "x", 0, true);
        let quiz = chain.quiz(&address).await.unwrap();

        let pending = quiz.submit_answer("x").await.unwrap();

        assert_eq!(finalize(pending).await, TxStatus::Failure);
    }

    #[tokio::test]
    async fn fund__adds_stake_and_emits_new_balance() {
        let chain = fast_chain();
        let address = chain.seed_quiz("Riddle", "right", 5, false);
        let quiz = chain.quiz(&address).await.unwrap();
        let mut events = quiz.subscribe();

        let pending = quiz.fund(20).await.unwrap();

        assert_eq!(finalize(pending).await, TxStatus::Success);
        assert_eq!(events.recv().await.unwrap(), QuizEvent::Funded(25));
        assert_eq!(quiz.balance().await.unwrap(), 25);
    }

    #[tokio::test]
    async fn fund__zero_amount_reverts() {
        let chain = fast_chain();
        let address = chain.seed_quiz("Riddle", "right", 5, false);
        let quiz = chain.quiz(&address).await.unwrap();

        let pending = quiz.fund(0).await.unwrap();

        assert_eq!(finalize(pending).await, TxStatus::Failure);
    }

    #[tokio::test]
    async fn create_quiz__appends_open_instance_in_order() {
        let chain = fast_chain();
        let first = chain.seed_quiz("First", "a", 0, true);

        let pending = chain
            .create_quiz("Second", commit_answer("b"))
            .await
            .unwrap();
        assert_eq!(finalize(pending).await, TxStatus::Success);

        let order = chain.list_quizzes().await.unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], first);
        let quiz = chain.quiz(&order[1]).await.unwrap();
        assert_eq!(quiz.question().await.unwrap(), "Second");
        assert!(!quiz.solved().await.unwrap());
    }
}
