// src/bin/bench_book.rs
#![allow(dead_code)]

use std::time::Instant;

// Pull the book and its dependencies directly into this bench to avoid
// compiling the full binary graph.
#[path = "../price.rs"]
mod price;
#[path = "../parser.rs"]
mod parser;
#[path = "../orderbook.rs"]
mod orderbook;

use crate::orderbook::{OrderBook, MBP_LEVELS};
use crate::parser::{Action, MboRecord, Side};
use crate::price::Price;

fn parse_arg_usize(args: &[String], idx: usize, default: usize) -> usize {
    args.get(idx).and_then(|s| s.parse::<usize>().ok()).unwrap_or(default)
}

fn event(action: Action, side: Side, oid: u64, px: Price, size: u32) -> MboRecord {
    MboRecord {
        ts_recv: String::new(),
        ts_event: String::new(),
        rtype: 160,
        publisher_id: 1,
        instrument_id: 1,
        action,
        side,
        price: px,
        size,
        channel_id: 0,
        order_id: oid,
        flags: 0,
        ts_in_delta: 0,
        sequence: 0,
        symbol: String::new(),
    }
}

fn main() {
    // Args: [order_count] [price_band]
    let args: Vec<String> = std::env::args().collect();
    let order_count = parse_arg_usize(&args, 1, 200_000);
    let price_band = parse_arg_usize(&args, 2, 500);

    let mut book = OrderBook::new();
    let start_total = Instant::now();
    let mut total_events: usize = 0;

    // Phase 1: adds
    let t0 = Instant::now();
    for i in 0..order_count {
        let px = (1_000 + (i % price_band)) as Price * 1_000_000_000;
        let size = 1 + (i % 50) as u32;
        let side = if i & 1 == 0 { Side::Bid } else { Side::Ask };
        book.apply(&event(Action::Add, side, i as u64, px, size)).unwrap();
        total_events += 1;
    }
    let adds_dur = t0.elapsed();

    // Phase 2: modifies, about half of them across price
    let t1 = Instant::now();
    let mut x: u64 = 0x9E3779B97F4A7C15; // xorshift64* state
    for _ in 0..order_count / 2 {
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        x = x.wrapping_mul(0x2545F4914F6CDD1D);
        let i = (x as usize) % order_count;
        let shift = if x & 1 == 0 { 0 } else { 1 + (x >> 8) as usize % 5 };
        let px = (1_000 + (i + shift) % price_band) as Price * 1_000_000_000;
        let size = 1 + ((x >> 16) % 100) as u32;
        let side = if i & 1 == 0 { Side::Bid } else { Side::Ask };
        book.apply(&event(Action::Modify, side, i as u64, px, size)).unwrap();
        total_events += 1;
    }
    let mods_dur = t1.elapsed();

    // Phase 3: cancel every third order
    let t2 = Instant::now();
    for i in (0..order_count).step_by(3) {
        book.apply(&event(Action::Cancel, Side::None, i as u64, 1, 1)).unwrap();
        total_events += 1;
    }
    let dels_dur = t2.elapsed();

    // Touch the projection query so it stays on the measured path
    let bids = book.top_bids(MBP_LEVELS);
    let asks = book.top_asks(MBP_LEVELS);

    let total_dur = start_total.elapsed();

    println!(
        "bench_book: orders={} band={} total_events={} live_orders={} top=({},{}) total_time_ms={:.3} adds_ms={:.3} mods_ms={:.3} dels_ms={:.3} throughput_meps={:.3}",
        order_count,
        price_band,
        total_events,
        book.order_count(),
        bids.len(),
        asks.len(),
        total_dur.as_secs_f64() * 1000.0,
        adds_dur.as_secs_f64() * 1000.0,
        mods_dur.as_secs_f64() * 1000.0,
        dels_dur.as_secs_f64() * 1000.0,
        (total_events as f64) / 1_000_000.0 / total_dur.as_secs_f64(),
    );
}
