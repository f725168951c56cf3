use bundle_executor::config::ExecutorConfig;
use init4_bin_base::{
    deps::tracing::{error, info, info_span},
    utils::from_env::FromEnv,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> eyre::Result<()> {
    let _guard = init4_bin_base::init4();
    let init_span_guard = info_span!("executor initialization");

    // Pull the configuration from the environment
    let config = ExecutorConfig::from_env()?;
    let supervisor = config.connect_supervisor().await?;
    let status = supervisor.contract_status().await?;
    info!(
        contract = %config.target_contract,
        owner = %status.owner,
        presale_active = status.presale_active,
        mode = ?config.mode(),
        "executor initialized"
    );

    drop(init_span_guard);

    let outcome = tokio::select! {
        outcome = supervisor.run() => outcome.inspect_err(|err| error!(%err, "run failed"))?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            return Ok(());
        }
    };

    info!(
        included = outcome.inclusion.included,
        block_number = ?outcome.inclusion.block_number,
        bundle_hash = %outcome.submission.bundle_hash,
        "run finished"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
