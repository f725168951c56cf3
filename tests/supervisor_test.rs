use alloy::primitives::{Address, U256};
use bundle_executor::{
    signer::{BundleSigner, WalletSigner},
    tasks::{
        bundle::BundleAction,
        submit::{RelayError, SubmitError},
        supervisor::{ExecutionMode, ExecutionPath, RunError, Supervisor},
    },
    test_utils::{MockChain, MockRelay, setup_logging, setup_test_config, test_chain, test_signer},
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

fn supervisor(
    chain: &Arc<MockChain>,
    relay: MockRelay,
    mode: ExecutionMode,
) -> Supervisor<MockChain, MockChain, WalletSigner, MockRelay> {
    let mut config = setup_test_config();
    config.execution_mode = Some(mode);
    config.supervisor(chain.clone(), chain.clone(), test_signer(), relay)
}

#[tokio::test(start_paused = true)]
async fn timeout_falls_back_to_trigger_and_action() {
    setup_logging();
    let chain = test_chain();
    chain.set_nonce(test_signer().address(), 9);
    let supervisor = supervisor(&chain, MockRelay::mining_into(chain.clone()), ExecutionMode::Monitor);

    let started = Instant::now();
    let outcome = supervisor.run_with_timeout(Duration::from_millis(5_000)).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(5_000));

    assert!(matches!(outcome.path, ExecutionPath::Fallback));
    assert_eq!(outcome.requests.len(), 2);
    assert_eq!(outcome.requests[0].action, BundleAction::Trigger);
    assert_eq!(outcome.requests[0].nonce, 9);
    assert_eq!(outcome.requests[1].action, BundleAction::Action);
    assert_eq!(outcome.requests[1].nonce, 10);
    assert_eq!(outcome.requests[1].value, U256::from(10_000_000_000_000_000u128));

    assert_eq!(chain.nonce_queries(), 1);
    assert_eq!(supervisor.submitter().relay().bundles().len(), 1);
    assert!(outcome.inclusion.included);
    assert_eq!(outcome.inclusion.matched_hashes.len(), 2);
    assert_eq!(outcome.monitor.unwrap().trigger_matches, 0);
    assert!(outcome.bundle_stats.is_some());
}

#[tokio::test]
async fn direct_mode_skips_monitoring() {
    setup_logging();
    let chain = test_chain();
    let supervisor = supervisor(&chain, MockRelay::mining_into(chain.clone()), ExecutionMode::Direct);

    let outcome = supervisor.run().await.unwrap();

    assert!(matches!(outcome.path, ExecutionPath::Direct));
    assert!(outcome.monitor.is_none());
    assert_eq!(outcome.requests.len(), 2);
    assert_eq!(chain.lookups(), 0);
    assert!(outcome.inclusion.included);
}

#[tokio::test]
async fn fallback_requires_ownership() {
    setup_logging();
    let chain = test_chain();
    let owner = Address::repeat_byte(0x77);
    chain.set_owner(owner);
    let supervisor = supervisor(&chain, MockRelay::new(), ExecutionMode::Direct);

    let err = supervisor.run().await.unwrap_err();

    assert!(matches!(err, RunError::NotOwner { owner: o, .. } if o == owner));
    assert_eq!(chain.nonce_queries(), 0);
    assert!(supervisor.submitter().relay().bundles().is_empty());
}

#[tokio::test]
async fn relay_rejection_fails_the_run() {
    setup_logging();
    let chain = test_chain();
    let supervisor = supervisor(&chain, MockRelay::rejecting("insufficient fee"), ExecutionMode::Direct);

    let err = supervisor.run().await.unwrap_err();

    assert!(matches!(
        err,
        RunError::Submit(SubmitError::Relay(RelayError::Rejected(ref msg))) if msg == "insufficient fee"
    ));
}

#[tokio::test(start_paused = true)]
async fn missed_fallback_is_broadcast_when_enabled() {
    setup_logging();
    let chain = test_chain();
    let mut config = setup_test_config();
    config.broadcast_fallback = true;
    let supervisor = config.supervisor(chain.clone(), chain.clone(), test_signer(), MockRelay::new());

    let outcome = supervisor.run().await.unwrap();

    assert!(!outcome.inclusion.included);
    assert_eq!(outcome.broadcast.len(), 2);
    assert_eq!(outcome.broadcast, outcome.submission.expected_hashes());
    assert_eq!(chain.broadcasts().len(), 2);
}

#[tokio::test]
async fn contract_status_reads_owner_and_presale_flag() {
    let chain = test_chain();
    chain.set_presale_active(true);
    let supervisor = supervisor(&chain, MockRelay::new(), ExecutionMode::Direct);

    let status = supervisor.contract_status().await.unwrap();
    assert_eq!(status.owner, test_signer().address());
    assert!(status.presale_active);
}
