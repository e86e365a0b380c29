/*
[INPUT]:  Symbol to watch (first CLI argument, default BTCUSDT)
[OUTPUT]: Ticker, depth and trade updates printed to stdout
[POS]:    Examples - public futures market streams
[UPDATE]: When the subscription API changes
*/

use marketstream::*;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

/// Example: public market data from Binance USD-M futures
///
/// Run with `RUST_LOG=marketstream=debug` to see connection and dispatch logs.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let symbol = std::env::args().nth(1).unwrap_or_else(|| "BTCUSDT".to_string());

    let ws = FuturesStreamClient::futures(None)?;
    ws.set_error_handler(|err| eprintln!("stream error: {err}"));
    ws.set_disconnected_handler(|cause| match cause {
        Some(err) => eprintln!("disconnected: {err}"),
        None => println!("disconnected"),
    });

    ws.connect().await?;
    println!("✓ Connected, {} instruments loaded", ws.instruments().len());

    ws.subscribe_ticker(&symbol, |ticker| {
        println!(
            "[ticker] {} last={} bid={} ask={} 24h={}%",
            ticker.instrument.symbol, ticker.last, ticker.buy, ticker.sell, ticker.percent
        );
    })
    .await?;

    ws.subscribe_depth(&symbol, 5, None, |depth| {
        if let (Some(bid), Some(ask)) = (depth.bids.first(), depth.asks.first()) {
            println!(
                "[depth]  {} {}@{} / {}@{}",
                depth.instrument.symbol, bid.amount, bid.price, ask.amount, ask.price
            );
        }
    })
    .await?;

    ws.subscribe_trade(&symbol, |trade| {
        println!(
            "[trade]  {} {:?} {} @ {}",
            trade.instrument.symbol, trade.side, trade.amount, trade.price
        );
    })
    .await?;

    ws.subscribe_funding_rate(&symbol, |funding| {
        println!(
            "[funding] {} rate={} mark={}",
            funding.instrument.symbol, funding.rate, funding.mark_price
        );
    })
    .await?;

    sleep(Duration::from_secs(30)).await;

    ws.close().await?;
    println!("\n✓ Market data example complete");
    Ok(())
}
