//! LNURL-withdraw Service
//!
//! Run modes:
//!   cargo run                    - Show usage
//!   cargo run -- api             - Start the LNURL-withdraw API
//!   cargo run -- issue ...       - Create a withdraw link in the configured store
//!   cargo run -- slots <hash>    - Print per-voucher URLs of a link

use lnurlw::api::{self, create_rate_limiter, AppState};
use lnurlw::common::{self, LnurlwError, WithdrawConfig};
use lnurlw::storage::{LinkStore, MemoryLinkStore, SqliteLinkStore};
use lnurlw::types::{units, NewWithdrawLink, WithdrawLink};
use lnurlw::withdraw::{
    slot_tokens, HttpTransferGateway, LookupService, RedemptionEngine, TransferGateway,
};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // .env is optional
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let result = match args[1].as_str() {
        "api" => run_api_server(&args[2..]).await,
        "issue" => run_issue(&args[2..]).await,
        "slots" => run_slots(&args[2..]).await,
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        if e.is_retryable() {
            eprintln!("This looks transient; retrying may succeed.");
        }
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("LNURL-withdraw Service");
    println!();
    println!("Usage:");
    println!("  lnurlw-api api [--port <port>]          Start API server (default: 3001)");
    println!("  lnurlw-api issue --wallet <id> --max <sats> [--min <sats>]");
    println!("                   [--uses <n>] [--cooldown <secs>] [--description <text>]");
    println!("                                          Create a withdraw link");
    println!("  lnurlw-api slots <link_hash>            Print per-voucher URLs");
    println!("  lnurlw-api help                         Show this message");
    println!();
    println!("Environment Variables:");
    println!("  LNURLW_NETWORK                 mainnet | testnet | regtest (default: regtest)");
    println!("  LNURLW_PORT                    API port (default: 3001)");
    println!("  LNURLW_PUBLIC_URL              Base URL wallets call back to");
    println!("  LNURLW_DATABASE                SQLite path or :memory:");
    println!("  LNURLW_GATEWAY_URL             Wallet API base URL");
    println!("  LNURLW_GATEWAY_KEY             Wallet API admin key");
    println!("  LNURLW_TRANSFER_TIMEOUT_SECS   Payment timeout (default: 30)");
    println!("  LNURLW_RATE_LIMIT_PER_MIN      Requests per client per minute (default: 120)");
    println!("  LNURLW_TRUST_PROXY_HEADERS     Throttle by X-Forwarded-For (default: false)");
    println!("  LNURLW_LOG_LEVEL               Log level (default: info)");
}

/// Value following `name` on the command line
fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_flag<T: std::str::FromStr>(
    args: &[String],
    name: &str,
    default: Option<T>,
) -> common::Result<T> {
    match flag(args, name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| LnurlwError::validation(format!("invalid value for {}: {}", name, raw))),
        None => default.ok_or_else(|| LnurlwError::validation(format!("{} is required", name))),
    }
}

fn open_store(config: &WithdrawConfig) -> common::Result<Arc<dyn LinkStore>> {
    if config.uses_memory_store() {
        tracing::warn!(target: "lnurlw::system", "using in-memory link store; links are lost on exit");
        return Ok(Arc::new(MemoryLinkStore::new()));
    }
    Ok(Arc::new(SqliteLinkStore::new(&config.database)?))
}

/// Start the API server
async fn run_api_server(args: &[String]) -> common::Result<()> {
    let mut config = WithdrawConfig::from_env()?;
    if flag(args, "--port").is_some() {
        config.port = parse_flag(args, "--port", None)?;
    }

    common::init_from_config(&config)?;
    config.validate_for_production()?;
    config.print_summary();

    let store = open_store(&config)?;
    let gateway: Arc<dyn TransferGateway> = Arc::new(HttpTransferGateway::new(
        &config.gateway_url,
        &config.gateway_key,
    ));

    let lookup = LookupService::new(store.clone(), &config.public_url);
    let engine =
        RedemptionEngine::new(store, gateway).with_transfer_timeout(config.transfer_timeout);
    let rate_limiter = match config.rate_limit_per_min {
        0 => None,
        n => Some(create_rate_limiter(n, config.trust_proxy_headers)),
    };

    common::log_system_event(
        "startup",
        serde_json::json!({
            "network": format!("{:?}", config.network),
            "port": config.port,
            "public_url": config.public_url,
            "store": if config.uses_memory_store() { "memory" } else { "sqlite" },
        }),
    );

    api::start_server(AppState::new(lookup, engine), rate_limiter, config.port).await?;
    Ok(())
}

/// Create a link and print its URLs
async fn run_issue(args: &[String]) -> common::Result<()> {
    let config = WithdrawConfig::from_env()?;
    if config.uses_memory_store() {
        return Err(LnurlwError::validation(
            "issue needs a persistent LNURLW_DATABASE",
        ));
    }

    let wallet_id: String = parse_flag(args, "--wallet", None)?;
    let max_sats: u64 = parse_flag(args, "--max", None)?;
    let params = NewWithdrawLink {
        wallet_id,
        description: flag(args, "--description").unwrap_or_default().to_string(),
        min_sats: parse_flag(args, "--min", Some(max_sats))?,
        max_sats,
        total_uses: parse_flag(args, "--uses", Some(1))?,
        cooldown_secs: parse_flag(args, "--cooldown", Some(0))?,
    };

    let link = WithdrawLink::issue(params).map_err(|e| LnurlwError::validation(e.to_string()))?;
    let store = open_store(&config)?;
    store.insert(&link).await?;

    println!("=== Withdraw Link ===");
    println!("ID:        {}", link.id);
    println!("Hash:      {}", link.link_hash);
    println!(
        "Amount:    {} - {}",
        units::sats_to_display(link.min_sats),
        units::sats_to_display(link.max_sats)
    );
    println!("Uses:      {}", link.total_uses);
    println!("Cooldown:  {}s", link.cooldown_secs);
    println!("URL:       {}/api/v1/lnurl/{}", config.public_url, link.link_hash);
    Ok(())
}

/// Print one URL per remaining voucher
async fn run_slots(args: &[String]) -> common::Result<()> {
    let link_hash = args
        .first()
        .ok_or_else(|| LnurlwError::validation("usage: slots <link_hash>"))?;

    let config = WithdrawConfig::from_env()?;
    let store = open_store(&config)?;
    let link = store
        .get_by_hash(link_hash)
        .await?
        .ok_or_else(|| LnurlwError::validation(format!("no link with hash {}", link_hash)))?;

    println!(
        "Link {} ({} of {} uses left)",
        link.link_hash,
        link.remaining_uses(),
        link.total_uses
    );
    for (marker, token) in link.use_markers.iter().zip(slot_tokens(&link)) {
        println!(
            "  #{:<4} {}/api/v1/lnurl/{}/{}",
            marker, config.public_url, link.link_hash, token
        );
    }
    Ok(())
}
