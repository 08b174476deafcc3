// src/mbp.rs
//
// Pure projection of a triggering MBO event plus the book's top ten levels
// per side into one MBP row. Never reads the book directly and never
// mutates anything.

use crate::orderbook::{CompactLevel, TopLevels, MBP_LEVELS};
use crate::parser::{Action, MboRecord};
use crate::price;
use std::fmt::Write as _;
use thiserror::Error;

/// Record type code for MBP-10 rows.
pub const MBP_RTYPE: u8 = 10;

#[derive(Debug, Error)]
#[error("populated {side} slot {slot} has zero size or count")]
pub struct RowError {
    side: char,
    slot: usize,
}

/// One output row: metadata echoed from the triggering event plus ten bid
/// and ten ask slots. Unpopulated slots stay at `(UNDEF, 0, 0)`.
pub struct MbpRecord<'a> {
    event: &'a MboRecord,
    depth: u32,
    bids: [CompactLevel; MBP_LEVELS],
    asks: [CompactLevel; MBP_LEVELS],
}

impl<'a> MbpRecord<'a> {
    pub fn from_book_state(event: &'a MboRecord, bids: &TopLevels, asks: &TopLevels) -> Self {
        let mut row = MbpRecord {
            event,
            // A cancel removes exactly one order from one level.
            depth: if event.action == Action::Cancel { 1 } else { 0 },
            bids: [CompactLevel::default(); MBP_LEVELS],
            asks: [CompactLevel::default(); MBP_LEVELS],
        };
        for (slot, level) in row.bids.iter_mut().zip(bids.iter()) {
            *slot = *level;
        }
        for (slot, level) in row.asks.iter_mut().zip(asks.iter()) {
            *slot = *level;
        }
        row
    }

    /// Sanity check before the row is written: every populated slot must
    /// carry a positive size and count.
    pub fn validate(&self) -> Result<(), RowError> {
        for (side, slots) in [('b', &self.bids), ('a', &self.asks)] {
            for (i, slot) in slots.iter().enumerate() {
                if slot.price != price::UNDEF_PRICE && (slot.size == 0 || slot.count == 0) {
                    return Err(RowError { side, slot: i });
                }
            }
        }
        Ok(())
    }

    /// Append the row, prefixed with its 0-based index, to `out`.
    pub fn write_csv(&self, idx: u64, out: &mut String) {
        let e = self.event;
        let _ = write!(
            out,
            "{idx},{},{},{MBP_RTYPE},{},{},{},{},{},",
            e.ts_recv,
            e.ts_event,
            e.publisher_id,
            e.instrument_id,
            e.action.as_char(),
            e.side.as_char(),
            self.depth,
        );
        price::write_px(out, e.price);
        let _ = write!(out, ",{},{},{},{},", e.size, e.flags, e.ts_in_delta, e.sequence);
        for i in 0..MBP_LEVELS {
            let b = &self.bids[i];
            let a = &self.asks[i];
            price::write_px(out, b.price);
            let _ = write!(out, ",{},{},", b.size, b.count);
            price::write_px(out, a.price);
            let _ = write!(out, ",{},{},", a.size, a.count);
        }
        let _ = write!(out, "{},{}", e.symbol, e.order_id);
        out.push('\n');
    }
}

/// Output header: unnamed index column, event metadata, interleaved
/// per-level bid/ask columns, then symbol and order id.
pub fn header() -> String {
    let mut h = String::from(
        ",ts_recv,ts_event,rtype,publisher_id,instrument_id,action,side,depth,price,size,flags,ts_in_delta,sequence",
    );
    for i in 0..MBP_LEVELS {
        let _ = write!(h, ",bid_px_{i:02},bid_sz_{i:02},bid_ct_{i:02}");
        let _ = write!(h, ",ask_px_{i:02},ask_sz_{i:02},ask_ct_{i:02}");
    }
    h.push_str(",symbol,order_id\n");
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Side;
    use crate::price::UNDEF_PRICE;
    use smallvec::smallvec;

    fn event(action: Action) -> MboRecord {
        MboRecord {
            ts_recv: "t0".to_string(),
            ts_event: "t1".to_string(),
            rtype: 160,
            publisher_id: 2,
            instrument_id: 1108,
            action,
            side: Side::Bid,
            price: 5_510_000_000,
            size: 100,
            channel_id: 0,
            order_id: 817593,
            flags: 130,
            ts_in_delta: 165200,
            sequence: 851012,
            symbol: "ARL".to_string(),
        }
    }

    #[test]
    fn header_shape() {
        let h = header();
        assert!(h.starts_with(",ts_recv,ts_event,rtype,"));
        assert!(h.contains(",bid_px_00,bid_sz_00,bid_ct_00,ask_px_00,"));
        assert!(h.contains(",bid_px_09,bid_sz_09,bid_ct_09,ask_px_09,ask_sz_09,ask_ct_09,"));
        assert!(h.ends_with(",symbol,order_id\n"));
        assert_eq!(h.trim_end().matches(',').count(), 75);
    }

    #[test]
    fn depth_is_one_only_for_cancel() {
        let empty = TopLevels::new();
        let e = event(Action::Cancel);
        assert_eq!(MbpRecord::from_book_state(&e, &empty, &empty).depth, 1);
        let e = event(Action::Add);
        assert_eq!(MbpRecord::from_book_state(&e, &empty, &empty).depth, 0);
        let e = event(Action::Clear);
        assert_eq!(MbpRecord::from_book_state(&e, &empty, &empty).depth, 0);
    }

    #[test]
    fn row_layout() {
        let bids: TopLevels = smallvec![CompactLevel {
            price: 5_510_000_000,
            size: 100,
            count: 1
        }];
        let asks = TopLevels::new();
        let e = event(Action::Add);
        let row = MbpRecord::from_book_state(&e, &bids, &asks);
        let mut s = String::new();
        row.write_csv(7, &mut s);

        let fields: Vec<&str> = s.trim_end().split(',').collect();
        assert_eq!(fields.len(), 76);
        assert_eq!(fields[0], "7");
        assert_eq!(fields[1], "t0");
        assert_eq!(fields[2], "t1");
        assert_eq!(fields[3], "10"); // rtype is always the MBP code
        assert_eq!(fields[4], "2");
        assert_eq!(fields[5], "1108");
        assert_eq!(fields[6], "A");
        assert_eq!(fields[7], "B");
        assert_eq!(fields[8], "0"); // depth
        assert_eq!(fields[9], "5.51");
        assert_eq!(fields[10], "100");
        assert_eq!(fields[11], "130");
        assert_eq!(fields[12], "165200");
        assert_eq!(fields[13], "851012");
        // first level: bid populated, ask empty
        assert_eq!(fields[14], "5.51");
        assert_eq!(fields[15], "100");
        assert_eq!(fields[16], "1");
        assert_eq!(fields[17], "");
        assert_eq!(fields[18], "0");
        assert_eq!(fields[19], "0");
        // second bid slot is untouched
        assert_eq!(fields[20], "");
        assert_eq!(fields[21], "0");
        assert_eq!(fields[22], "0");
        assert_eq!(fields[74], "ARL");
        assert_eq!(fields[75], "817593");
    }

    #[test]
    fn undef_event_price_renders_empty() {
        let empty = TopLevels::new();
        let mut e = event(Action::Clear);
        e.price = UNDEF_PRICE;
        let row = MbpRecord::from_book_state(&e, &empty, &empty);
        let mut s = String::new();
        row.write_csv(0, &mut s);
        let fields: Vec<&str> = s.trim_end().split(',').collect();
        assert_eq!(fields[9], "");
    }

    #[test]
    fn validate_flags_zeroed_slot() {
        let bids: TopLevels = smallvec![CompactLevel {
            price: 5_510_000_000,
            size: 0,
            count: 1
        }];
        let asks = TopLevels::new();
        let e = event(Action::Add);
        let row = MbpRecord::from_book_state(&e, &bids, &asks);
        assert!(row.validate().is_err());

        let good: TopLevels = smallvec![CompactLevel {
            price: 5_510_000_000,
            size: 10,
            count: 1
        }];
        let row = MbpRecord::from_book_state(&e, &good, &asks);
        assert!(row.validate().is_ok());
    }
}
