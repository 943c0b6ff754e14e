//! Binary to connect to the Kite ticker and subscribe one instrument in full
//! mode for inspecting live data.
//!
//! # Usage
//!
//! ```sh
//! export KITE_API_KEY="your-api-key"
//! export KITE_ACCESS_TOKEN="your-access-token"
//! export KITE_INSTRUMENT_TOKEN="408065"   # optional
//! cargo run --bin ticker_check --features cli
//! ```

use std::env;
use std::time::Duration;

use kite_ticker::{Mode, TickerBuilder, TickerError};

/// Crude oil futures on MCX, traded well past equity hours.
const DEFAULT_INSTRUMENT_TOKEN: u32 = 62285063;

#[tokio::main]
async fn main() -> kite_ticker::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let api_key = env::var("KITE_API_KEY").expect("set KITE_API_KEY env var before running");
    let access_token =
        env::var("KITE_ACCESS_TOKEN").expect("set KITE_ACCESS_TOKEN env var before running");
    let token = match env::var("KITE_INSTRUMENT_TOKEN") {
        Ok(raw) => raw.parse::<u32>().map_err(|e| {
            TickerError::InvalidArgument(format!("KITE_INSTRUMENT_TOKEN {raw:?}: {e}"))
        })?,
        Err(_) => DEFAULT_INSTRUMENT_TOKEN,
    };

    let mut ticker = TickerBuilder::new(access_token)
        .api_key(api_key)
        .reconnect_max_attempts(Some(10))
        .reconnect_max_delay(Duration::from_secs(30))
        .build()?;

    ticker.on_connect(|| println!("Connected."));
    ticker.on_tick(|tick| println!("{tick:#?}"));
    ticker.on_order_update(|update| println!("{update:#?}"));
    ticker.on_error(|err| eprintln!("Error: {err}"));
    ticker.on_close(|code, reason| println!("Closed: {code} {reason}"));
    ticker.on_reconnect(|attempt, delay| {
        println!("Reconnecting (attempt {attempt}) in {delay:?}…");
    });
    ticker.on_no_reconnect(|attempts| println!("Gave up after {attempts} attempts."));

    println!("Subscribing to {token} (Full)…");
    ticker.set_mode(Mode::Full, &[token]).await?;

    let handle = ticker.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nInterrupted, disconnecting…");
            handle.stop();
        }
    });

    ticker.serve().await?;
    println!("Done.");

    Ok(())
}
