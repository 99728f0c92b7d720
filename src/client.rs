use crate::{
    commit_answer,
    discovery::{
        self,
        QuizView,
    },
    errors::ClassifiedError,
    events::{
        self,
        QuizEventEnvelope,
        QuizSubscription,
    },
    network::NetworkAllowList,
    provider::{
        Address,
        ChainId,
        QuizEvent,
        QuizFactory,
        QuizInstance,
        RpcError,
        TxHash,
        WalletEvent,
        WalletProvider,
    },
    tracker::{
        self,
        CallKind,
        CallOutcome,
        CallPhase,
    },
    ui,
};
use color_eyre::eyre::Result;
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub allow_list: NetworkAllowList,
    /// How long the success indicator stays visible after a correct answer
    /// before the next quiz is loaded.
    pub rediscover_cooldown: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allow_list: NetworkAllowList::default(),
            rediscover_cooldown: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Connecting,
    NetworkInvalid,
    Ready,
}

/// The quiz fields the presentation layer renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizCard {
    pub address: Address,
    pub question: String,
    pub balance: u64,
    pub is_answer_correct: Option<bool>,
}

/// Read-only snapshot of the session, rebuilt on demand for rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub phase: SessionPhase,
    pub address: Option<Address>,
    pub network: Option<ChainId>,
    pub network_name: Option<String>,
    pub wallet_balance: Option<u64>,
    pub active_quiz: Option<QuizCard>,
    pub pending_call: Option<TxHash>,
    pub transaction_error: Option<ClassifiedError>,
    pub network_error: Option<String>,
    pub loading: bool,
}

/// Everything that can move the session forward: wallet notifications,
/// quiz events, and resolutions of work spawned earlier. Each spawned
/// resolution carries the epoch it started under so anything that outlived
/// a reset is discarded instead of applied.
pub enum SessionMessage<Q> {
    Wallet(WalletEvent),
    Quiz(QuizEventEnvelope),
    DiscoveryFinished {
        epoch: u64,
        result: Result<Option<QuizView<Q>>, RpcError>,
    },
    CallSubmitted {
        epoch: u64,
        tx_hash: TxHash,
    },
    CallResolved {
        epoch: u64,
        kind: CallKind,
        outcome: CallOutcome,
    },
    RediscoverDue {
        epoch: u64,
    },
}

impl<Q> From<QuizEventEnvelope> for SessionMessage<Q> {
    fn from(envelope: QuizEventEnvelope) -> Self {
        SessionMessage::Quiz(envelope)
    }
}

pub type SessionReceiver<Q> = mpsc::UnboundedReceiver<SessionMessage<Q>>;

/// Owner of the session state machine. All mutation happens here, one
/// message at a time; spawned work only reports back through the channel.
pub struct SessionController<W: WalletProvider, C: QuizFactory> {
    wallet: W,
    factory: C,
    config: SessionConfig,
    tx: mpsc::UnboundedSender<SessionMessage<C::Quiz>>,
    epoch: u64,
    phase: SessionPhase,
    address: Option<Address>,
    network: Option<ChainId>,
    wallet_balance: Option<u64>,
    active_quiz: Option<QuizView<C::Quiz>>,
    subscription: Option<QuizSubscription>,
    call_phase: CallPhase,
    transaction_error: Option<ClassifiedError>,
    network_error: Option<String>,
    loading: bool,
    wallet_feed: Option<JoinHandle<()>>,
    cooldown: Option<JoinHandle<()>>,
}

impl<W: WalletProvider, C: QuizFactory> SessionController<W, C> {
    pub fn new(
        wallet: W,
        factory: C,
        config: SessionConfig,
    ) -> (Self, SessionReceiver<C::Quiz>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            wallet,
            factory,
            config,
            tx,
            epoch: 0,
            phase: SessionPhase::Disconnected,
            address: None,
            network: None,
            wallet_balance: None,
            active_quiz: None,
            subscription: None,
            call_phase: CallPhase::Idle,
            transaction_error: None,
            network_error: None,
            loading: false,
            wallet_feed: None,
            cooldown: None,
        };
        (controller, rx)
    }

    pub fn session(&self) -> Session {
        Session {
            phase: self.phase,
            address: self.address,
            network: self.network.clone(),
            network_name: self
                .network
                .as_ref()
                .and_then(|id| self.config.allow_list.name_of(id))
                .map(str::to_owned),
            wallet_balance: self.wallet_balance,
            active_quiz: self.active_quiz.as_ref().map(|view| QuizCard {
                address: view.address,
                question: view.question.clone(),
                balance: view.balance,
                is_answer_correct: view.is_answer_correct,
            }),
            pending_call: match self.call_phase {
                CallPhase::PendingConfirmation(hash) => Some(hash),
                _ => None,
            },
            transaction_error: self.transaction_error.clone(),
            network_error: self.network_error.clone(),
            loading: self.loading,
        }
    }

    /// Request wallet access and bring the session up. Denial leaves the
    /// session disconnected without surfacing an error; nothing retries on
    /// its own.
    pub async fn connect(&mut self) {
        self.reset();
        self.phase = SessionPhase::Connecting;
        match self.wallet.request_access().await {
            Ok(address) => {
                info!(%address, "wallet access granted");
                self.address = Some(address);
                self.spawn_wallet_feed();
                self.initialize().await;
            }
            Err(raw) => {
                warn!(error = %raw, "wallet access request failed");
                self.phase = SessionPhase::Disconnected;
            }
        }
    }

    pub fn submit_answer(&mut self, guess: &str) {
        let Some(quiz) = self.active_quiz.as_ref().map(|view| view.handle.clone()) else {
            debug!("submit_answer ignored: no active quiz");
            return;
        };
        if !self.begin_call(CallKind::SubmitAnswer) {
            return;
        }
        let guess = guess.to_owned();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let submitted = tx.clone();
            let outcome = tracker::drive(
                CallKind::SubmitAnswer,
                quiz.submit_answer(&guess),
                move |tx_hash| {
                    let _ = submitted.send(SessionMessage::CallSubmitted { epoch, tx_hash });
                },
            )
            .await;
            let _ = tx.send(SessionMessage::CallResolved {
                epoch,
                kind: CallKind::SubmitAnswer,
                outcome,
            });
        });
    }

    pub fn submit_funding(&mut self, amount: u64) {
        let Some(quiz) = self.active_quiz.as_ref().map(|view| view.handle.clone()) else {
            debug!("submit_funding ignored: no active quiz");
            return;
        };
        if !self.begin_call(CallKind::FundQuiz) {
            return;
        }
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let submitted = tx.clone();
            let outcome =
                tracker::drive(CallKind::FundQuiz, quiz.fund(amount), move |tx_hash| {
                    let _ = submitted.send(SessionMessage::CallSubmitted { epoch, tx_hash });
                })
                .await;
            let _ = tx.send(SessionMessage::CallResolved {
                epoch,
                kind: CallKind::FundQuiz,
                outcome,
            });
        });
    }

    /// Publish a new quiz. The answer is committed client-side; the
    /// plaintext never leaves this process.
    pub fn create_quiz(&mut self, question: &str, answer: &str) {
        if self.phase != SessionPhase::Ready {
            debug!("create_quiz ignored: session not ready");
            return;
        }
        if !self.begin_call(CallKind::CreateQuiz) {
            return;
        }
        let factory = self.factory.clone();
        let question = question.trim().to_owned();
        let commitment = commit_answer(answer);
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let submitted = tx.clone();
            let outcome = tracker::drive(
                CallKind::CreateQuiz,
                factory.create_quiz(&question, commitment),
                move |tx_hash| {
                    let _ = submitted.send(SessionMessage::CallSubmitted { epoch, tx_hash });
                },
            )
            .await;
            let _ = tx.send(SessionMessage::CallResolved {
                epoch,
                kind: CallKind::CreateQuiz,
                outcome,
            });
        });
    }

    /// Gate shared by all submissions: one call at a time against the
    /// remote handle, and at most one live transaction error.
    fn begin_call(&mut self, kind: CallKind) -> bool {
        if self.call_phase != CallPhase::Idle {
            debug!(%kind, "call already in flight; ignoring");
            return false;
        }
        self.transaction_error = None;
        self.call_phase = CallPhase::Submitting;
        true
    }

    /// Editing the answer input clears the last verdict.
    pub fn clear_answer_verdict(&mut self) {
        if let Some(view) = self.active_quiz.as_mut() {
            view.is_answer_correct = None;
        }
    }

    pub fn dismiss_transaction_error(&mut self) {
        self.transaction_error = None;
    }

    pub fn dismiss_network_error(&mut self) {
        self.network_error = None;
    }

    pub async fn process(&mut self, message: SessionMessage<C::Quiz>) {
        match message {
            SessionMessage::Wallet(event) => self.handle_wallet_event(event).await,
            SessionMessage::Quiz(envelope) => self.handle_quiz_event(envelope),
            SessionMessage::DiscoveryFinished { epoch, result } => {
                self.handle_discovery(epoch, result)
            }
            SessionMessage::CallSubmitted { epoch, tx_hash } => {
                if epoch != self.epoch {
                    debug!(%tx_hash, "stale submission handle discarded");
                    return;
                }
                self.call_phase = CallPhase::PendingConfirmation(tx_hash);
            }
            SessionMessage::CallResolved {
                epoch,
                kind,
                outcome,
            } => self.handle_call_resolved(epoch, kind, outcome).await,
            SessionMessage::RediscoverDue { epoch } => {
                self.cooldown = None;
                if epoch != self.epoch {
                    debug!("stale rediscovery timer discarded");
                    return;
                }
                if self.phase == SessionPhase::Ready {
                    self.start_discovery();
                }
            }
        }
    }

    async fn handle_wallet_event(&mut self, event: WalletEvent) {
        match event {
            WalletEvent::AccountsChanged(None) => {
                info!("wallet account removed; resetting session");
                self.reset();
            }
            WalletEvent::AccountsChanged(Some(address)) => {
                info!(%address, "wallet account changed");
                self.epoch += 1;
                self.cancel_cooldown();
                self.detach_quiz();
                self.active_quiz = None;
                self.call_phase = CallPhase::Idle;
                self.transaction_error = None;
                self.loading = false;
                self.address = Some(address);
                self.initialize().await;
            }
            WalletEvent::NetworkChanged(network) => {
                // Balances, the discovered quiz and pending calls are not
                // portable across networks; start over regardless of the
                // new value.
                info!(%network, "wallet network changed; resetting session");
                self.reset();
                self.network = Some(network);
            }
        }
    }

    fn handle_quiz_event(&mut self, envelope: QuizEventEnvelope) {
        let Some(view) = self.active_quiz.as_mut() else {
            debug!(source = %envelope.source, "quiz event with no active quiz discarded");
            return;
        };
        if envelope.source != view.address {
            debug!(source = %envelope.source, "quiz event from superseded instance discarded");
            return;
        }
        match envelope.event {
            QuizEvent::Funded(new_balance) => {
                info!(balance = new_balance, "quiz funded");
                view.balance = new_balance;
                self.transaction_error = None;
                self.loading = false;
            }
            QuizEvent::AnsweredCorrectly => {
                info!("answer accepted");
                view.is_answer_correct = Some(true);
                self.transaction_error = None;
                self.loading = false;
                self.schedule_rediscovery();
            }
            QuizEvent::AnsweredIncorrectly => {
                info!("answer rejected");
                view.is_answer_correct = Some(false);
                self.transaction_error = None;
                self.loading = false;
            }
        }
    }

    fn handle_discovery(
        &mut self,
        epoch: u64,
        result: Result<Option<QuizView<C::Quiz>>, RpcError>,
    ) {
        if epoch != self.epoch {
            debug!("stale discovery result discarded");
            return;
        }
        self.loading = false;
        match result {
            Ok(Some(view)) => {
                info!(address = %view.address, question = %view.question, "active quiz loaded");
                self.subscription = Some(events::attach(&view.handle, self.tx.clone()));
                self.active_quiz = Some(view);
            }
            Ok(None) => {
                info!("no open quiz available");
                self.active_quiz = None;
            }
            Err(raw) => {
                error!(error = %raw, "quiz discovery failed");
                let classified = crate::errors::classify(&raw);
                let message = if classified.message.is_empty() {
                    raw.message
                } else {
                    classified.message
                };
                self.transaction_error = Some(ClassifiedError::remote_rejected(message));
            }
        }
    }

    async fn handle_call_resolved(&mut self, epoch: u64, kind: CallKind, outcome: CallOutcome) {
        if epoch != self.epoch {
            debug!(%kind, "stale call resolution discarded");
            return;
        }
        self.call_phase = CallPhase::Idle;
        match outcome {
            CallOutcome::Confirmed => {
                // Inclusion is not the business outcome. Verdicts and
                // balances arrive through the quiz's own events; a created
                // quiz shows up through a fresh discovery.
                self.refresh_wallet_balance().await;
                if kind == CallKind::CreateQuiz {
                    self.start_discovery();
                }
            }
            CallOutcome::Rejected => {}
            CallOutcome::Failed(err) => {
                self.transaction_error = Some(err);
            }
        }
    }

    async fn initialize(&mut self) {
        let network = match self.wallet.network().await {
            Ok(network) => network,
            Err(raw) => {
                error!(error = %raw, "failed to read wallet network");
                self.network_error = Some(format!("Could not read wallet network: {raw}"));
                self.phase = SessionPhase::NetworkInvalid;
                return;
            }
        };
        self.network = Some(network.clone());
        if let Err(err) = self.config.allow_list.validate(&network) {
            // Keep the address: the UI still shows "connected, wrong
            // network" and the wallet can be reconnected.
            warn!(%err, "network validation failed");
            self.network_error = Some(err.user_message());
            self.phase = SessionPhase::NetworkInvalid;
            return;
        }
        self.network_error = None;
        self.phase = SessionPhase::Ready;
        self.refresh_wallet_balance().await;
        self.start_discovery();
    }

    fn start_discovery(&mut self) {
        self.cancel_cooldown();
        self.detach_quiz();
        self.active_quiz = None;
        self.loading = true;
        let factory = self.factory.clone();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = discovery::find_open_quiz(&factory).await;
            let _ = tx.send(SessionMessage::DiscoveryFinished { epoch, result });
        });
    }

    fn schedule_rediscovery(&mut self) {
        self.cancel_cooldown();
        let tx = self.tx.clone();
        let epoch = self.epoch;
        let delay = self.config.rediscover_cooldown;
        self.cooldown = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(SessionMessage::RediscoverDue { epoch });
        }));
    }

    fn spawn_wallet_feed(&mut self) {
        let mut events = self.wallet.subscribe();
        let tx = self.tx.clone();
        self.wallet_feed = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(SessionMessage::Wallet(event)).is_err() {
                    break;
                }
            }
        }));
    }

    async fn refresh_wallet_balance(&mut self) {
        let Some(address) = self.address else {
            return;
        };
        match self.wallet.get_balance(&address).await {
            Ok(balance) => self.wallet_balance = Some(balance),
            Err(raw) => {
                warn!(error = %raw, "failed to read wallet balance");
                self.wallet_balance = None;
            }
        }
    }

    /// Full teardown back to the disconnected state. Bumping the epoch
    /// makes every in-flight resolution stale; the cooldown timer is the
    /// one task cancelled outright.
    fn reset(&mut self) {
        self.epoch += 1;
        self.cancel_cooldown();
        self.detach_quiz();
        if let Some(feed) = self.wallet_feed.take() {
            feed.abort();
        }
        self.phase = SessionPhase::Disconnected;
        self.address = None;
        self.wallet_balance = None;
        self.active_quiz = None;
        self.call_phase = CallPhase::Idle;
        self.transaction_error = None;
        self.network_error = None;
        self.loading = false;
        // self.network keeps the last observed identifier.
    }

    fn detach_quiz(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.detach();
        }
    }

    fn cancel_cooldown(&mut self) {
        if let Some(cooldown) = self.cooldown.take() {
            cooldown.abort();
        }
    }
}

pub async fn run_app<W: WalletProvider, C: QuizFactory>(
    controller: SessionController<W, C>,
    session_rx: SessionReceiver<C::Quiz>,
) -> Result<()> {
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, session_rx, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<W: WalletProvider, C: QuizFactory>(
    mut controller: SessionController<W, C>,
    mut session_rx: SessionReceiver<C::Quiz>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    ui::draw(ui_state, &controller.session())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            message = session_rx.recv() => {
                let Some(message) = message else {
                    warn!("session channel closed");
                    break;
                };
                controller.process(message).await;
                ui::draw(ui_state, &controller.session())?;
            }
            raw = ui::next_raw_event(input_events) => {
                let Some(event) = ui::interpret_event(ui_state, raw?) else {
                    continue;
                };
                match event {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Connect => controller.connect().await,
                    ui::UserEvent::SubmitAnswer(guess) => controller.submit_answer(&guess),
                    ui::UserEvent::SubmitFunding(amount) => controller.submit_funding(amount),
                    ui::UserEvent::CreateQuiz { question, answer } => {
                        controller.create_quiz(&question, &answer)
                    }
                    ui::UserEvent::AnswerEdited => controller.clear_answer_verdict(),
                    ui::UserEvent::DismissTransactionError => {
                        controller.dismiss_transaction_error()
                    }
                    ui::UserEvent::DismissNetworkError => controller.dismiss_network_error(),
                }
                ui::draw(ui_state, &controller.session())?;
            }
        }
    }
    Ok(())
}
