#![allow(non_snake_case)]

use quiz_dapp::{
    client::{
        SessionConfig,
        SessionController,
        SessionPhase,
        SessionReceiver,
    },
    provider::{
        Address,
        ChainId,
        WalletEvent,
    },
    test_helpers::{
        FakeChain,
        FakeQuiz,
        FakeWallet,
        settle,
    },
};

fn controller_with(
    wallet: &FakeWallet,
    chain: &FakeChain,
) -> (
    SessionController<FakeWallet, FakeChain>,
    SessionReceiver<FakeQuiz>,
) {
    SessionController::new(wallet.clone(), chain.clone(), SessionConfig::default())
}

#[tokio::test(start_paused = true)]
async fn connect__loads_first_open_quiz() {
    let wallet = FakeWallet::new();
    let chain = FakeChain::new();
    // given
    let account = Address::new([0xa1; 20]);
    wallet.grant(account);
    wallet.set_network("1337");
    wallet.set_balance(account, 1_000);
    let quiz = chain.add_quiz("Q", false, 0);
    let (mut controller, mut rx) = controller_with(&wallet, &chain);

    // when
    controller.connect().await;
    settle(&mut controller, &mut rx).await;

    // then
    let session = controller.session();
    assert_eq!(session.phase, SessionPhase::Ready);
    assert_eq!(session.address, Some(account));
    assert_eq!(session.network, Some(ChainId::from("1337")));
    assert_eq!(session.wallet_balance, Some(1_000));
    assert!(!session.loading);
    let card = session.active_quiz.expect("quiz should be active");
    assert_eq!(card.address, quiz);
    assert_eq!(card.question, "Q");
    assert_eq!(card.balance, 0);
    assert_eq!(card.is_answer_correct, None);
}

#[tokio::test(start_paused = true)]
async fn connect__denied_stays_disconnected_without_error() {
    let wallet = FakeWallet::new();
    let chain = FakeChain::new();
    wallet.deny();
    let (mut controller, mut rx) = controller_with(&wallet, &chain);

    controller.connect().await;
    settle(&mut controller, &mut rx).await;

    let session = controller.session();
    assert_eq!(session.phase, SessionPhase::Disconnected);
    assert_eq!(session.address, None);
    assert_eq!(session.transaction_error, None);
    assert_eq!(session.network_error, None);
    // Nothing retried on its own.
    assert_eq!(chain.list_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn connect__unsupported_network_blocks_quiz_but_keeps_address() {
    let wallet = FakeWallet::new();
    let chain = FakeChain::new();
    let account = Address::random();
    wallet.grant(account);
    wallet.set_network("1");
    chain.add_quiz("Q", false, 0);
    let (mut controller, mut rx) = controller_with(&wallet, &chain);

    controller.connect().await;
    settle(&mut controller, &mut rx).await;

    let session = controller.session();
    assert_eq!(session.phase, SessionPhase::NetworkInvalid);
    assert_eq!(session.address, Some(account));
    assert!(session.network_error.is_some());
    assert!(session.active_quiz.is_none());
    assert_eq!(chain.list_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn dismiss_network_error__clears_only_that_field() {
    let wallet = FakeWallet::new();
    let chain = FakeChain::new();
    let account = Address::random();
    wallet.grant(account);
    wallet.set_network("999");
    let (mut controller, mut rx) = controller_with(&wallet, &chain);
    controller.connect().await;
    settle(&mut controller, &mut rx).await;

    controller.dismiss_network_error();

    let session = controller.session();
    assert_eq!(session.network_error, None);
    assert_eq!(session.address, Some(account));
    assert_eq!(session.phase, SessionPhase::NetworkInvalid);
}

#[tokio::test(start_paused = true)]
async fn account_removed__resets_to_disconnected() {
    let wallet = FakeWallet::new();
    let chain = FakeChain::new();
    wallet.grant(Address::random());
    chain.add_quiz("Q", false, 0);
    let (mut controller, mut rx) = controller_with(&wallet, &chain);
    controller.connect().await;
    settle(&mut controller, &mut rx).await;
    assert_eq!(controller.session().phase, SessionPhase::Ready);

    wallet.emit(WalletEvent::AccountsChanged(None));
    settle(&mut controller, &mut rx).await;

    let session = controller.session();
    assert_eq!(session.phase, SessionPhase::Disconnected);
    assert_eq!(session.address, None);
    assert!(session.active_quiz.is_none());
}

#[tokio::test(start_paused = true)]
async fn network_changed__resets_even_for_an_allowed_value() {
    let wallet = FakeWallet::new();
    let chain = FakeChain::new();
    wallet.grant(Address::random());
    chain.add_quiz("Q", false, 0);
    let (mut controller, mut rx) = controller_with(&wallet, &chain);
    controller.connect().await;
    settle(&mut controller, &mut rx).await;

    wallet.emit(WalletEvent::NetworkChanged(ChainId::from("1337")));
    settle(&mut controller, &mut rx).await;

    let session = controller.session();
    assert_eq!(session.phase, SessionPhase::Disconnected);
    assert!(session.active_quiz.is_none());
    assert_eq!(session.network, Some(ChainId::from("1337")));
}

#[tokio::test(start_paused = true)]
async fn account_changed__reinitializes_with_new_identity() {
    let wallet = FakeWallet::new();
    let chain = FakeChain::new();
    let first = Address::new([1; 20]);
    let second = Address::new([2; 20]);
    wallet.grant(first);
    chain.add_quiz("Q", false, 0);
    let (mut controller, mut rx) = controller_with(&wallet, &chain);
    controller.connect().await;
    settle(&mut controller, &mut rx).await;
    assert_eq!(controller.session().address, Some(first));

    wallet.emit(WalletEvent::AccountsChanged(Some(second)));
    settle(&mut controller, &mut rx).await;

    let session = controller.session();
    assert_eq!(session.phase, SessionPhase::Ready);
    assert_eq!(session.address, Some(second));
    assert!(session.active_quiz.is_some());
    assert_eq!(chain.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn reset_while_loading__discards_late_discovery_result() {
    let wallet = FakeWallet::new();
    let chain = FakeChain::new();
    wallet.grant(Address::random());
    chain.add_quiz("Q", false, 0);
    let gate = chain.hold_list();
    let (mut controller, mut rx) = controller_with(&wallet, &chain);

    // given: discovery in flight, blocked inside the listing call
    controller.connect().await;
    assert!(controller.session().loading);

    // when: the account disappears first, then discovery resolves
    wallet.emit(WalletEvent::AccountsChanged(None));
    settle(&mut controller, &mut rx).await;
    assert_eq!(controller.session().phase, SessionPhase::Disconnected);
    gate.notify_one();
    settle(&mut controller, &mut rx).await;

    // then: the late result is discarded, not applied
    let session = controller.session();
    assert_eq!(session.phase, SessionPhase::Disconnected);
    assert!(session.active_quiz.is_none());
    assert!(!session.loading);
}
