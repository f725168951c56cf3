use alloy::primitives::{Address, B256, Bytes, U256};
use bundle_executor::{
    tasks::{
        bundle::{BundleAction, BundleRequest},
        submit::BundleSubmitter,
    },
    test_utils::{MockChain, MockRelay, candidate, setup_logging, test_signer},
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

const BLOCK_TIME: Duration = Duration::from_secs(12);

fn requests(base_nonce: u64, count: u32) -> Vec<BundleRequest> {
    (0..count)
        .map(|ordinal| BundleRequest {
            ordinal,
            action: BundleAction::Action,
            to: Address::repeat_byte(0x11),
            data: Bytes::new(),
            nonce: base_nonce + ordinal as u64,
            gas_limit: 21_000,
            gas_price: 2_000_000_000,
            value: U256::ZERO,
            chain_id: 11155111,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn one_of_three_hashes_confirms_inclusion() {
    setup_logging();
    let chain = Arc::new(MockChain::new());
    chain.set_head(200);
    let submitter = BundleSubmitter::new(chain.clone(), test_signer(), MockRelay::new(), BLOCK_TIME);

    let submission = submitter.submit(&requests(4, 3)).await.unwrap();
    assert_eq!(submission.target_block, 201);
    let second = submission.expected_hashes()[1];

    chain.add_block(
        201,
        vec![candidate(B256::repeat_byte(1), None, None), candidate(second, None, None)],
    );

    let result = submitter.confirm(&submission, 5).await;
    assert!(result.included);
    assert_eq!(result.block_number, Some(201));
    assert_eq!(result.matched_hashes, vec![second]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_window_reports_not_included() {
    setup_logging();
    let chain = Arc::new(MockChain::new());
    chain.set_head(200);
    let submitter = BundleSubmitter::new(chain.clone(), test_signer(), MockRelay::new(), BLOCK_TIME);
    let submission = submitter.submit(&requests(0, 3)).await.unwrap();

    for number in 201..=210 {
        chain.add_block(number, vec![candidate(B256::with_last_byte(number as u8), None, None)]);
    }

    let started = Instant::now();
    let result = submitter.confirm(&submission, 5).await;

    assert!(!result.included);
    assert!(result.block_number.is_none());
    assert!(result.matched_hashes.is_empty());
    assert_eq!(started.elapsed(), BLOCK_TIME * 4);
}

#[tokio::test(start_paused = true)]
async fn unmined_blocks_are_retried() {
    setup_logging();
    let chain = Arc::new(MockChain::new());
    chain.set_head(50);
    let submitter = BundleSubmitter::new(chain.clone(), test_signer(), MockRelay::new(), BLOCK_TIME);
    let submission = submitter.submit(&requests(0, 1)).await.unwrap();
    let hash = submission.expected_hashes()[0];

    let miner = tokio::spawn({
        let chain = chain.clone();
        async move {
            tokio::time::sleep(BLOCK_TIME * 2 + Duration::from_secs(1)).await;
            chain.add_block(51, vec![candidate(hash, None, None)]);
        }
    });

    let result = submitter.confirm(&submission, 5).await;
    miner.await.unwrap();

    assert!(result.included);
    assert_eq!(result.block_number, Some(51));
}
