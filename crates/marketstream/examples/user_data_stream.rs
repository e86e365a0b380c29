/*
[INPUT]:  BINANCE_API_KEY / BINANCE_API_SECRET environment variables
[OUTPUT]: Order, position and balance updates printed to stdout
[POS]:    Examples - private futures user data streams
[UPDATE]: When private subscription or session key handling changes
*/

use marketstream::*;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

/// Example: private user data from Binance USD-M futures
///
/// Requires an API key; the session (listen) key is minted and renewed
/// by the client while private subscriptions exist.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (Ok(api_key), Ok(api_secret)) = (
        std::env::var("BINANCE_API_KEY"),
        std::env::var("BINANCE_API_SECRET"),
    ) else {
        eprintln!("Set BINANCE_API_KEY and BINANCE_API_SECRET to run this example");
        return Ok(());
    };

    let ws = FuturesStreamClient::futures(Some(Credentials::new(api_key, api_secret)))?;
    ws.set_error_handler(|err| eprintln!("stream error: {err}"));
    ws.connect().await?;
    println!("✓ Connected");

    ws.subscribe_orders(|order| {
        println!(
            "[order]    {} {} {:?} {:?} {}/{} avg={}",
            order.instrument.symbol,
            order.id,
            order.side,
            order.status,
            order.executed_qty,
            order.qty,
            order.avg_price
        );
    })
    .await?;

    ws.subscribe_positions(|positions| {
        for position in positions {
            println!(
                "[position] {} {:?} qty={} entry={} upnl={}",
                position.instrument.symbol,
                position.side,
                position.qty,
                position.entry_price,
                position.unrealized_pnl
            );
        }
    })
    .await?;

    ws.subscribe_account(|balances| {
        for balance in balances {
            println!(
                "[balance]  {} wallet={} available={} frozen={}",
                balance.asset, balance.wallet_balance, balance.available_balance, balance.frozen
            );
        }
    })
    .await?;
    println!("✓ Session key state: {:?}", ws.session_key_state());

    sleep(Duration::from_secs(60)).await;

    ws.unsubscribe_orders().await?;
    ws.unsubscribe_positions().await?;
    ws.unsubscribe_account().await?;
    ws.close().await?;
    println!("\n✓ User data example complete");
    Ok(())
}
