use alloy::primitives::{Address, B256};
use bundle_executor::{
    chain::WsFeed,
    tasks::{
        bundle::BundleAction,
        monitor::{
            Classifier, DetectionSource, Detector, MonitorSettings, MonitorTask, MonitoringState,
        },
        supervisor::{ExecutionMode, ExecutionPath, Supervisor},
    },
    signer::WalletSigner,
    test_utils::{
        MockChain, MockRelay, TEST_CONTRACT, candidate, setup_logging, setup_test_config,
        test_chain, test_signer, trigger_candidate,
    },
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const GWEI: u128 = 1_000_000_000;

fn monitor_supervisor(chain: &Arc<MockChain>) -> Supervisor<MockChain, MockChain, WalletSigner, MockRelay> {
    let mut config = setup_test_config();
    config.execution_mode = Some(ExecutionMode::Monitor);
    config.supervisor(chain.clone(), chain.clone(), test_signer(), MockRelay::mining_into(chain.clone()))
}

#[tokio::test(start_paused = true)]
async fn pending_trigger_is_acted_on_once() {
    setup_logging();
    let chain = test_chain();
    let trigger = trigger_candidate(B256::repeat_byte(0xaa), 20 * GWEI);
    chain.add_pending(trigger.clone());
    chain.notify_pending(trigger.id);

    let supervisor = monitor_supervisor(&chain);
    let outcome = supervisor.run().await.unwrap();

    let ExecutionPath::Triggered { detection } = &outcome.path else {
        panic!("expected triggered path, got {:?}", outcome.path);
    };
    assert_eq!(detection.candidate.id, trigger.id);
    assert_eq!(detection.source, DetectionSource::Pending);

    assert_eq!(outcome.requests.len(), 1);
    assert_eq!(outcome.requests[0].action, BundleAction::Action);
    assert_eq!(outcome.requests[0].gas_price, 33 * GWEI);

    assert_eq!(chain.nonce_queries(), 1);
    assert_eq!(supervisor.submitter().relay().bundles().len(), 1);
    assert!(outcome.inclusion.included);
    assert_eq!(outcome.monitor.unwrap().trigger_matches, 1);
}

#[tokio::test(start_paused = true)]
async fn mined_trigger_missed_by_the_feed_is_found_by_polling() {
    setup_logging();
    let chain = test_chain();
    let trigger = trigger_candidate(B256::repeat_byte(0xbb), 20 * GWEI);
    // Notified, but the node cannot serve the lookup.
    chain.notify_pending(trigger.id);

    let supervisor = Arc::new(monitor_supervisor(&chain));
    let run = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    chain.add_block(101, vec![trigger.clone()]);

    let outcome = run.await.unwrap().unwrap();
    let ExecutionPath::Triggered { detection } = &outcome.path else {
        panic!("expected triggered path, got {:?}", outcome.path);
    };
    assert_eq!(detection.source, DetectionSource::Block(101));
    assert_eq!(chain.lookups(), 1);
    assert_eq!(chain.nonce_queries(), 1);
    assert_eq!(supervisor.submitter().relay().bundles().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn polled_transactions_are_not_looked_up_again() {
    setup_logging();
    let chain = test_chain();
    let config = setup_test_config();
    let mut other = trigger_candidate(B256::repeat_byte(0xcc), GWEI);
    other.to = Some(Address::repeat_byte(0x22));

    let mut handle = MonitorTask::new(
        chain.clone(),
        chain.clone(),
        config.classifier(),
        config.monitor_settings(),
    )
    .spawn();

    tokio::time::sleep(Duration::from_millis(100)).await;
    chain.add_block(101, vec![other.clone()]);
    tokio::time::sleep(config.monitor_settings().poll_interval * 2).await;

    assert!(handle.state().seen().contains(&other.id));
    chain.add_pending(other.clone());
    chain.notify_pending(other.id);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(chain.lookups(), 0);
    assert_eq!(handle.state().stats().pending_count, 1);
    handle.cancel().await;
}

#[tokio::test(start_paused = true)]
async fn polling_works_without_a_pending_feed() {
    setup_logging();
    let chain = test_chain();
    chain.disable_pending_feed();

    let supervisor = Arc::new(monitor_supervisor(&chain));
    let run = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    chain.add_block(101, vec![trigger_candidate(B256::repeat_byte(0xdd), 5 * GWEI)]);

    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(outcome.path, ExecutionPath::Triggered { .. }));
}

#[tokio::test(start_paused = true)]
async fn concurrent_matches_produce_a_single_bundle() {
    setup_logging();
    let chain = test_chain();
    let triggers: Vec<_> =
        (1..=8u8).map(|n| trigger_candidate(B256::repeat_byte(n), n as u128 * GWEI)).collect();
    for trigger in &triggers {
        chain.add_pending(trigger.clone());
        chain.notify_pending(trigger.id);
    }
    chain.add_block(101, triggers.clone());

    let supervisor = monitor_supervisor(&chain);
    let outcome = supervisor.run().await.unwrap();

    assert!(matches!(outcome.path, ExecutionPath::Triggered { .. }));
    assert_eq!(outcome.monitor.unwrap().trigger_matches, 1);
    assert_eq!(chain.nonce_queries(), 1);
    assert_eq!(supervisor.submitter().relay().bundles().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn detector_claims_once_across_threads() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let detector = Detector::new(
        Arc::new(MonitoringState::new(1_024)),
        Classifier::new(TEST_CONTRACT, setup_test_config().trigger_selector()),
        CancellationToken::new(),
        tx,
    );

    let tasks: Vec<_> = (0..64u8)
        .map(|n| {
            let detector = detector.clone();
            tokio::spawn(async move {
                let source =
                    if n % 2 == 0 { DetectionSource::Pending } else { DetectionSource::Block(1) };
                detector.inspect(trigger_candidate(B256::repeat_byte(n), GWEI), source)
            })
        })
        .collect();

    let mut claimed = 0;
    for task in tasks {
        claimed += task.await.unwrap() as usize;
    }
    drop(detector);

    assert_eq!(claimed, 1);
    assert!(rx.recv().await.is_some());
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent() {
    setup_logging();
    let chain = test_chain();
    let config = setup_test_config();

    let mut handle = MonitorTask::new(
        chain.clone(),
        chain.clone(),
        config.classifier(),
        config.monitor_settings(),
    )
    .spawn();
    chain.notify_pending(B256::repeat_byte(1));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let first = handle.cancel().await;
    let second = handle.cancel().await;

    assert!(handle.is_stopped());
    assert!(!handle.state().is_active());
    assert_eq!(first.pending_count, second.pending_count);
    assert_eq!(first.trigger_matches, 0);
    assert!(handle.next_detection().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn trigger_at_the_timeout_is_not_lost() {
    setup_logging();
    let chain = test_chain();
    let supervisor = Arc::new(monitor_supervisor(&chain));
    let poll_interval = setup_test_config().monitor_settings().poll_interval;

    let run = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run_with_timeout(poll_interval).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    chain.add_block(101, vec![trigger_candidate(B256::repeat_byte(0xab), 5 * GWEI)]);

    let outcome = run.await.unwrap().unwrap();
    let stats = outcome.monitor.unwrap();
    if stats.trigger_matches == 1 {
        assert!(matches!(outcome.path, ExecutionPath::Triggered { .. }), "{:?}", outcome.path);
    } else {
        assert!(matches!(outcome.path, ExecutionPath::Fallback));
    }
    assert_eq!(supervisor.submitter().relay().bundles().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn claimed_detection_survives_cancel() {
    setup_logging();
    let chain = test_chain();
    let config = setup_test_config();

    let mut handle = MonitorTask::new(
        chain.clone(),
        chain.clone(),
        config.classifier(),
        config.monitor_settings(),
    )
    .spawn();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let trigger = trigger_candidate(B256::repeat_byte(0xac), GWEI);
    chain.add_block(101, vec![trigger.clone()]);
    tokio::time::sleep(config.monitor_settings().poll_interval * 2).await;

    let stats = handle.cancel().await;
    assert_eq!(stats.trigger_matches, 1);
    let detection = handle.try_next_detection().unwrap();
    assert_eq!(detection.candidate.id, trigger.id);
    assert!(handle.try_next_detection().is_none());
}

#[tokio::test(start_paused = true)]
async fn trigger_with_pending_lookup_in_flight_is_found_by_polling() {
    setup_logging();
    let chain = test_chain();
    let config = setup_test_config();
    let trigger = trigger_candidate(B256::repeat_byte(0xad), GWEI);

    let mut handle = MonitorTask::new(
        chain.clone(),
        chain.clone(),
        config.classifier(),
        config.monitor_settings(),
    )
    .spawn();

    // The pending loop recorded the hash and has not resolved its lookup yet.
    assert!(handle.state().seen().should_process(trigger.id));
    tokio::time::sleep(Duration::from_millis(100)).await;
    chain.add_block(101, vec![trigger.clone()]);

    let detection = handle.next_detection().await.unwrap();
    assert_eq!(detection.candidate.id, trigger.id);
    assert_eq!(detection.source, DetectionSource::Block(101));
    handle.cancel().await;
}

#[tokio::test]
async fn unreachable_websocket_falls_back_to_polling() {
    setup_logging();
    let chain = test_chain();
    let config = setup_test_config();
    let settings =
        MonitorSettings { poll_interval: Duration::from_millis(50), ..config.monitor_settings() };
    let feed = Arc::new(WsFeed::new(Some("ws://127.0.0.1:1".to_owned())));

    let mut handle = MonitorTask::new(chain.clone(), feed, config.classifier(), settings).spawn();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let trigger = trigger_candidate(B256::repeat_byte(0xae), GWEI);
    chain.add_block(101, vec![trigger.clone()]);

    let detection = tokio::time::timeout(Duration::from_secs(10), handle.next_detection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detection.source, DetectionSource::Block(101));
    assert_eq!(handle.cancel().await.trigger_matches, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stats_are_final_once_cancelled() {
    setup_logging();
    let chain = test_chain();
    let config = setup_test_config();
    let mut calls = Vec::new();
    for n in 0..=255u8 {
        let call = candidate(
            B256::repeat_byte(n),
            Some(TEST_CONTRACT),
            Some(alloy::primitives::bytes!("e6ab1434")),
        );
        chain.add_pending(call.clone());
        calls.push(call);
    }

    let mut handle = MonitorTask::new(
        chain.clone(),
        chain.clone(),
        config.classifier(),
        config.monitor_settings(),
    )
    .spawn();
    for call in &calls {
        chain.notify_pending(call.id);
    }
    tokio::time::sleep(Duration::from_millis(1)).await;

    let stats = handle.cancel().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state().stats().target_contract_matches, stats.target_contract_matches);
    assert_eq!(handle.state().stats().pending_count, stats.pending_count);
}
