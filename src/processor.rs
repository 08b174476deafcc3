// src/processor.rs
//
// The one stateful orchestrator: pulls MBO records from a buffered source,
// routes them through the book, gates emission on the change flag, and
// writes buffered MBP rows to the sink. A bad line is logged and skipped;
// a sink or source failure is fatal.

use crate::config::AppConfig;
use crate::mbp::{self, MbpRecord};
use crate::orderbook::{OrderBook, MBP_LEVELS};
use crate::parser::{Action, MboRecord};
use crate::price;
use anyhow::Context;
use log::{error, info, warn};
use std::io::{BufRead, Write};
use std::time::Instant;

pub struct Processor<W: Write> {
    book: OrderBook,
    sink: W,
    row_buf: String,
    flush_bytes: usize,
    validate_rows: bool,
    log_every: u64,
    records_in: u64,
    rows_out: u64,
    skipped: u64,
    started: Instant,
}

impl<W: Write> Processor<W> {
    /// Writes the output header immediately so a failing sink is caught
    /// before any input is consumed.
    pub fn new(mut sink: W, cfg: &AppConfig) -> anyhow::Result<Self> {
        sink.write_all(mbp::header().as_bytes())
            .context("write output header")?;
        Ok(Self {
            book: OrderBook::new(),
            sink,
            row_buf: String::with_capacity(2 * cfg.output.flush_bytes),
            flush_bytes: cfg.output.flush_bytes,
            validate_rows: cfg.output.validate,
            log_every: cfg.general.log_every_records,
            records_in: 0,
            rows_out: 0,
            skipped: 0,
            started: Instant::now(),
        })
    }

    /// Drain the source: header line first, then one MBO record per line.
    pub fn run<R: BufRead>(&mut self, input: R) -> anyhow::Result<()> {
        let mut lines = input.lines();
        match lines.next() {
            Some(header) => {
                header.context("read input header")?;
            }
            None => anyhow::bail!("input is empty: missing MBO header"),
        }
        for (i, line) in lines.enumerate() {
            let line = line.context("read input line")?;
            match MboRecord::parse(&line) {
                Ok(rec) => self.process(&rec)?,
                Err(e) => {
                    warn!("line {}: skipping malformed record: {e}", i + 2);
                    self.skipped += 1;
                }
            }
        }
        self.flush()?;
        Ok(())
    }

    /// Apply one record and emit its snapshot when the gating rules say so.
    ///
    /// Emission: Clear always emits (with the freshly emptied book); Add,
    /// Cancel and Trade emit iff the change flag is set after apply; Modify,
    /// Fill and None never emit. Modify still raises the flag, so it stays
    /// set until the next emitting event clears it.
    pub fn process(&mut self, rec: &MboRecord) -> anyhow::Result<()> {
        if let Err(e) = self.book.apply(rec) {
            warn!("record {}: skipping: {e}", self.records_in + 1);
            self.skipped += 1;
            return Ok(());
        }
        self.records_in += 1;

        let emit = match rec.action {
            Action::Clear => true,
            Action::Add | Action::Cancel | Action::Trade => self.book.dirty(),
            Action::Modify | Action::Fill | Action::None => false,
        };
        if emit {
            self.emit(rec)?;
            self.book.clear_dirty();
        }

        if self.log_every > 0 && self.records_in % self.log_every == 0 {
            let stats = self.book.stats();
            info!(
                "records={} rows={} skipped={} live_orders={} bid_levels={} ask_levels={}",
                self.records_in,
                self.rows_out,
                self.skipped,
                stats.orders,
                stats.bid_levels,
                stats.ask_levels,
            );
        }
        Ok(())
    }

    fn emit(&mut self, rec: &MboRecord) -> anyhow::Result<()> {
        let bids = self.book.top_bids(MBP_LEVELS);
        let asks = self.book.top_asks(MBP_LEVELS);
        let row = MbpRecord::from_book_state(rec, &bids, &asks);
        if self.validate_rows {
            if let Err(e) = row.validate() {
                error!("row {}: dropping inconsistent projection: {e}", self.rows_out);
                self.skipped += 1;
                return Ok(());
            }
        }
        row.write_csv(self.rows_out, &mut self.row_buf);
        self.rows_out += 1;
        if self.row_buf.len() >= self.flush_bytes {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if !self.row_buf.is_empty() {
            self.sink
                .write_all(self.row_buf.as_bytes())
                .context("write output rows")?;
            self.row_buf.clear();
        }
        self.sink.flush().context("flush output sink")?;
        Ok(())
    }

    /// Final statistics, mirroring the progress log plus throughput and the
    /// closing book state.
    pub fn report(&self) {
        let elapsed = self.started.elapsed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            self.records_in as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        info!(
            "done: records={} rows={} skipped={} elapsed_ms={} rate={:.0} records/sec",
            self.records_in,
            self.rows_out,
            self.skipped,
            elapsed.as_millis(),
            rate,
        );
        let stats = self.book.stats();
        info!(
            "final book: bid_levels={} ask_levels={} orders={} best_bid={} best_ask={}",
            stats.bid_levels,
            stats.ask_levels,
            stats.orders,
            px_or_dash(stats.best_bid),
            px_or_dash(stats.best_ask),
        );
    }

    #[inline]
    pub fn rows_out(&self) -> u64 {
        self.rows_out
    }
}

fn px_or_dash(px: price::Price) -> String {
    if px == price::UNDEF_PRICE {
        return "-".to_string();
    }
    let mut s = String::new();
    price::write_px(&mut s, px);
    s
}
