use color_eyre::eyre::{
    Result,
    eyre,
};
use quiz_dapp::{
    chain::{
        DevChain,
        DevChainConfig,
    },
    client::{
        self,
        SessionConfig,
        SessionController,
    },
    deployment::{
        self,
        DeploymentEnv,
    },
    network::LOCAL_CHAIN_ID,
    provider::{
        Address,
        ChainId,
    },
    wallets,
};
use std::time::Duration;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

struct AppConfig {
    chain_id: ChainId,
    wallet_name: Option<String>,
    wallet_dir: Option<String>,
    cooldown: Duration,
}

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: quiz-dapp [--chain-id <id>] [--wallet <name>] [--wallet-dir <path>]\n\
         [--cooldown-secs <n>]\n\
         \n\
         Flags:\n\
           --chain-id <id>      Chain id the local dev chain reports (default {})\n\
           --wallet <name>      Keystore wallet to unlock for the account identity\n\
           --wallet-dir <path>  Override keystore directory (defaults to ~/.quiz-dapp/wallets)\n\
           --cooldown-secs <n>  Delay before the next quiz loads after a correct answer",
        LOCAL_CHAIN_ID,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<AppConfig> {
    let mut args = std::env::args().skip(1);
    let mut chain_id: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut cooldown: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--chain-id" => {
                let id = args
                    .next()
                    .ok_or_else(|| eyre!("--chain-id requires an id argument"))?;
                if chain_id.is_some() {
                    return Err(eyre!("--chain-id may only be specified once"));
                }
                chain_id = Some(id);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--cooldown-secs" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--cooldown-secs requires a number"))?;
                let secs = raw
                    .parse::<u64>()
                    .map_err(|_| eyre!("--cooldown-secs requires a number, got {raw:?}"))?;
                cooldown = Some(secs);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    Ok(AppConfig {
        chain_id: ChainId::new(chain_id.unwrap_or_else(|| LOCAL_CHAIN_ID.to_owned())),
        wallet_name,
        wallet_dir,
        cooldown: Duration::from_secs(cooldown.unwrap_or(5)),
    })
}

fn init_tracing() -> WorkerGuard {
    let file_appender = rolling::daily("logs", "quiz-dapp.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = parse_cli_args()?;
    let _guard = init_tracing();
    run(config).await
}

async fn run(config: AppConfig) -> Result<()> {
    let chain = DevChain::launch(DevChainConfig {
        network: config.chain_id.clone(),
        ..Default::default()
    });
    seed_demo_quizzes(&chain);
    let deployments = deployment::DeploymentStore::new(DeploymentEnv::Local)?;
    if let Some(previous) = deployments.latest()? {
        tracing::debug!(
            factory = %previous.factory_address,
            deployed_at = %previous.deployed_at,
            "previous local dev chain"
        );
    }
    deployment::record_deployment(
        DeploymentEnv::Local,
        chain.factory_address().to_string(),
        config.chain_id.as_str(),
    )?;

    let account = match &config.wallet_name {
        Some(name) => {
            let dir = wallets::resolve_wallet_dir(config.wallet_dir.as_deref())?;
            let descriptor = wallets::find_wallet(&dir, name)?;
            wallets::unlock_wallet(&descriptor)?
        }
        None => Address::random(),
    };
    let wallet = chain.wallet_for(account);

    let session_config = SessionConfig {
        rediscover_cooldown: config.cooldown,
        ..Default::default()
    };
    let (controller, session_rx) = SessionController::new(wallet, chain, session_config);
    client::run_app(controller, session_rx).await
}

fn seed_demo_quizzes(chain: &DevChain) {
    chain.seed_quiz("What gets wetter the more it dries?", "a towel", 3, true);
    chain.seed_quiz("What has keys but can't open locks?", "a piano", 0, false);
    chain.seed_quiz("What has a head and a tail but no body?", "a coin", 5, false);
}
