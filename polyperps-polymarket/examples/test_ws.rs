//! Subscribe to one token on the live market feed and print updates.
//!
//! Usage: cargo run -p polyperps-polymarket --example test_ws -- <token_id>

use polyperps_polymarket::{FeedConfig, FeedEvent, MarketFeed};
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let Some(token_id) = std::env::args().nth(1) else {
        eprintln!("usage: test_ws <token_id>");
        std::process::exit(2);
    };

    let feed = MarketFeed::spawn(FeedConfig::default());
    let Some(mut subscription) = feed.subscribe(&token_id) else {
        eprintln!("{} is a mock or placeholder token", token_id);
        std::process::exit(2);
    };

    let deadline = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(FeedEvent::PriceChange { price, .. }) => println!("price  {}", price),
                Some(FeedEvent::Book { book, .. }) => println!(
                    "book   bid {:?} ask {:?} ({} / {} levels)",
                    book.best_bid(),
                    book.best_ask(),
                    book.bids.len(),
                    book.asks.len()
                ),
                None => break,
            },
            _ = &mut deadline => break,
        }
    }
}
