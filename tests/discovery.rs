#![allow(non_snake_case)]

use proptest::prelude::*;
use quiz_dapp::{
    client::{
        SessionConfig,
        SessionController,
        SessionPhase,
        SessionReceiver,
    },
    discovery::find_open_quiz,
    errors::ErrorKind,
    provider::{
        Address,
        RpcError,
    },
    test_helpers::{
        FakeChain,
        FakeQuiz,
        FakeWallet,
        settle,
    },
};

async fn ready_session(
    chain: &FakeChain,
) -> (
    SessionController<FakeWallet, FakeChain>,
    SessionReceiver<FakeQuiz>,
) {
    let wallet = FakeWallet::new();
    wallet.grant(Address::random());
    let (mut controller, mut rx) =
        SessionController::new(wallet, chain.clone(), SessionConfig::default());
    controller.connect().await;
    settle(&mut controller, &mut rx).await;
    (controller, rx)
}

#[tokio::test(start_paused = true)]
async fn discovery__selects_first_open_in_listed_order() {
    let chain = FakeChain::new();
    chain.add_quiz("solved", true, 10);
    let q1 = chain.add_quiz("Q1", false, 1);
    chain.add_quiz("Q2", false, 2);

    let (controller, _rx) = ready_session(&chain).await;

    let card = controller.session().active_quiz.expect("open quiz found");
    assert_eq!(card.address, q1);
    assert_eq!(card.question, "Q1");
    assert_eq!(card.balance, 1);
}

#[tokio::test(start_paused = true)]
async fn discovery__no_open_quiz_is_not_an_error() {
    let chain = FakeChain::new();
    chain.add_quiz("done", true, 0);
    chain.add_quiz("also done", true, 0);

    let (controller, _rx) = ready_session(&chain).await;

    let session = controller.session();
    assert_eq!(session.phase, SessionPhase::Ready);
    assert!(session.active_quiz.is_none());
    assert_eq!(session.transaction_error, None);
    assert!(!session.loading);
}

#[tokio::test(start_paused = true)]
async fn discovery__read_failure_aborts_instead_of_skipping() {
    let chain = FakeChain::new();
    chain.add_quiz("solved", true, 0);
    let broken = chain.add_quiz("unreachable", false, 0);
    chain.add_quiz("open", false, 5);
    chain.fail_reads(broken, RpcError::new("connection refused"));

    let (controller, _rx) = ready_session(&chain).await;

    // The open instance behind the unreachable one is never shown.
    let session = controller.session();
    assert!(session.active_quiz.is_none());
    assert!(!session.loading);
    let error = session.transaction_error.expect("discovery error surfaced");
    assert_eq!(error.kind, ErrorKind::RemoteRejected);
}

#[tokio::test(start_paused = true)]
async fn discovery__listing_failure_surfaces_error() {
    let chain = FakeChain::new();
    chain.fail_list(RpcError::new("factory unreachable"));

    let (controller, _rx) = ready_session(&chain).await;

    let session = controller.session();
    assert!(session.active_quiz.is_none());
    let error = session.transaction_error.expect("discovery error surfaced");
    assert_eq!(error.kind, ErrorKind::RemoteRejected);
    assert!(error.message.contains("factory unreachable"));
}

proptest! {
    #[test]
    fn discovery__always_selects_lowest_index_open(flags in proptest::collection::vec(any::<bool>(), 0..8)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let chain = FakeChain::new();
        let addresses: Vec<Address> = flags
            .iter()
            .enumerate()
            .map(|(i, solved)| chain.add_quiz(&format!("Q{i}"), *solved, i as u64))
            .collect();

        let found = rt.block_on(find_open_quiz(&chain)).unwrap();

        let expected = flags.iter().position(|solved| !solved);
        match expected {
            Some(index) => {
                let view = found.expect("an open quiz exists");
                prop_assert_eq!(view.address, addresses[index]);
                prop_assert_eq!(view.balance, index as u64);
            }
            None => prop_assert!(found.is_none()),
        }
    }
}
