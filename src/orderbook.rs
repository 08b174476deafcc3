// src/orderbook.rs
//
// Two-sided price-indexed book keyed by order id. The side books (price ->
// level) and the order index (order id -> location) are coupled: every
// mutation goes through OrderBook so both stay coherent. Neither map is
// exposed mutably.

use crate::parser::{Action, MboRecord, Side};
use crate::price::{self, Price, UNDEF_PRICE};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use thiserror::Error;

/// Visible depth of the MBP projection.
pub const MBP_LEVELS: usize = 10;

const INITIAL_ORDER_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum BookError {
    /// An Add for an order id already resting. Applying it would corrupt the
    /// order index, so it fails loudly and mutates nothing.
    #[error("duplicate add for order {0}")]
    DuplicateAdd(u64),
    #[error("invalid event: {0}")]
    InvalidEvent(&'static str),
}

/// Aggregate view of one price level: what the MBP output carries per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactLevel {
    pub price: Price,
    pub size: u64,
    pub count: u32,
}

impl Default for CompactLevel {
    #[inline]
    fn default() -> Self {
        Self { price: UNDEF_PRICE, size: 0, count: 0 }
    }
}

/// Top-k query result. Inline capacity covers the full projection depth, so
/// the per-event query never touches the heap.
pub type TopLevels = SmallVec<[CompactLevel; MBP_LEVELS]>;

/// All orders resting at one price on one side, with the per-order sizes
/// needed to reverse a cancel or modify.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    total_size: u64,
    order_count: u32,
    orders: HashMap<u64, u32>,
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self {
            price: UNDEF_PRICE,
            total_size: 0,
            order_count: 0,
            orders: HashMap::new(),
        }
    }
}

impl PriceLevel {
    fn add(&mut self, oid: u64, size: u32) {
        if self.orders.contains_key(&oid) {
            // The book's order index screens duplicates before we get here.
            return;
        }
        self.orders.insert(oid, size);
        self.total_size += u64::from(size);
        self.order_count += 1;
    }

    fn remove(&mut self, oid: u64) {
        if let Some(size) = self.orders.remove(&oid) {
            self.total_size -= u64::from(size);
            self.order_count -= 1;
            if self.order_count == 0 {
                self.price = UNDEF_PRICE;
                self.total_size = 0;
            }
        }
    }

    fn modify(&mut self, oid: u64, new_size: u32) {
        if let Some(size) = self.orders.get_mut(&oid) {
            self.total_size = self.total_size - u64::from(*size) + u64::from(new_size);
            *size = new_size;
        }
    }

    #[allow(dead_code)]
    #[inline]
    pub fn size_of(&self, oid: u64) -> u32 {
        self.orders.get(&oid).copied().unwrap_or(0)
    }

    #[allow(dead_code)]
    #[inline]
    pub fn contains(&self, oid: u64) -> bool {
        self.orders.contains_key(&oid)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.price == UNDEF_PRICE || self.order_count == 0
    }

    #[inline]
    pub fn as_compact(&self) -> CompactLevel {
        CompactLevel {
            price: self.price,
            size: self.total_size,
            count: self.order_count,
        }
    }
}

/// Ordered price levels for one side. Bids iterate best-first from the high
/// end of the map, asks from the low end.
#[derive(Debug, Clone)]
struct SideBook {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl SideBook {
    fn new(side: Side) -> Self {
        Self { side, levels: BTreeMap::new() }
    }

    fn get_or_insert(&mut self, px: Price) -> &mut PriceLevel {
        let level = self.levels.entry(px).or_default();
        if level.price == UNDEF_PRICE {
            level.price = px;
        }
        level
    }

    #[inline]
    fn level_mut(&mut self, px: Price) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&px)
    }

    fn drop_if_empty(&mut self, px: Price) {
        if self.levels.get(&px).is_some_and(PriceLevel::is_empty) {
            self.levels.remove(&px);
        }
    }

    /// Best-first aggregate view of the first `k` non-empty levels.
    fn top_k(&self, k: usize) -> TopLevels {
        let mut out = TopLevels::new();
        match self.side {
            Side::Bid => {
                for level in self.levels.values().rev() {
                    if out.len() == k {
                        break;
                    }
                    if !level.is_empty() {
                        out.push(level.as_compact());
                    }
                }
            }
            _ => {
                for level in self.levels.values() {
                    if out.len() == k {
                        break;
                    }
                    if !level.is_empty() {
                        out.push(level.as_compact());
                    }
                }
            }
        }
        out
    }

    #[inline]
    fn best(&self) -> Price {
        match self.side {
            Side::Bid => self.levels.keys().next_back().copied(),
            _ => self.levels.keys().next().copied(),
        }
        .unwrap_or(UNDEF_PRICE)
    }

    #[inline]
    fn len(&self) -> usize {
        self.levels.len()
    }

    fn clear(&mut self) {
        self.levels.clear();
    }
}

/// Book-wide counters for progress logging and the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookStats {
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub orders: usize,
    pub best_bid: Price,
    pub best_ask: Price,
}

pub struct OrderBook {
    bids: SideBook,
    asks: SideBook,
    /// order id -> (resting price, resting side)
    index: HashMap<u64, (Price, Side)>,
    dirty: bool,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: SideBook::new(Side::Bid),
            asks: SideBook::new(Side::Ask),
            index: HashMap::with_capacity(INITIAL_ORDER_CAPACITY),
            dirty: false,
        }
    }

    /// Apply one MBO event. Either every mutation lands or none does; on an
    /// error the book is untouched.
    pub fn apply(&mut self, rec: &MboRecord) -> Result<(), BookError> {
        validate(rec)?;
        match rec.action {
            Action::Add => self.add_order(rec.order_id, rec.side, rec.price, rec.size),
            Action::Cancel => {
                self.cancel_order(rec.order_id);
                Ok(())
            }
            Action::Modify => self.modify_order(rec.order_id, rec.side, rec.price, rec.size),
            Action::Clear => {
                self.clear();
                Ok(())
            }
            // Executions are conveyed by the cancel/modify events that
            // follow them in this feed; the book stays as-is.
            Action::Trade | Action::Fill | Action::None => Ok(()),
        }
    }

    fn add_order(&mut self, oid: u64, side: Side, px: Price, size: u32) -> Result<(), BookError> {
        if self.index.contains_key(&oid) {
            return Err(BookError::DuplicateAdd(oid));
        }
        self.book_mut(side)?.get_or_insert(px).add(oid, size);
        self.index.insert(oid, (px, side));
        self.dirty = true;
        Ok(())
    }

    fn cancel_order(&mut self, oid: u64) {
        if let Some((px, side)) = self.index.remove(&oid) {
            // Remove at the stored location; the event's own price/side may
            // be informational only.
            let book = self.book_for(side);
            if let Some(level) = book.level_mut(px) {
                level.remove(oid);
            }
            book.drop_if_empty(px);
        }
        // A cancel for an order we never saw is normal when the stream
        // starts mid-session; it still counts as a book-relevant event.
        self.dirty = true;
    }

    fn modify_order(&mut self, oid: u64, side: Side, px: Price, size: u32) -> Result<(), BookError> {
        let Some(&(old_px, old_side)) = self.index.get(&oid) else {
            return self.add_order(oid, side, px, size);
        };
        if old_px == px && old_side == side {
            self.book_mut(side)?.get_or_insert(px).modify(oid, size);
        } else {
            // Insert-new-first: a bad target side fails before the order is
            // pulled from its old level.
            self.book_mut(side)?.get_or_insert(px).add(oid, size);
            let old_book = self.book_for(old_side);
            if let Some(level) = old_book.level_mut(old_px) {
                level.remove(oid);
            }
            old_book.drop_if_empty(old_px);
            self.index.insert(oid, (px, side));
        }
        self.dirty = true;
        Ok(())
    }

    fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.index.clear();
        self.dirty = true;
    }

    #[inline]
    fn book_mut(&mut self, side: Side) -> Result<&mut SideBook, BookError> {
        match side {
            Side::Bid => Ok(&mut self.bids),
            Side::Ask => Ok(&mut self.asks),
            Side::None => Err(BookError::InvalidEvent("order side must be bid or ask")),
        }
    }

    /// For sides read back out of the index, which only ever holds Bid/Ask.
    #[inline]
    fn book_for(&mut self, side: Side) -> &mut SideBook {
        match side {
            Side::Ask => &mut self.asks,
            _ => &mut self.bids,
        }
    }

    #[inline]
    pub fn top_bids(&self, k: usize) -> TopLevels {
        self.bids.top_k(k)
    }

    #[inline]
    pub fn top_asks(&self, k: usize) -> TopLevels {
        self.asks.top_k(k)
    }

    #[inline]
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn stats(&self) -> BookStats {
        BookStats {
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
            orders: self.index.len(),
            best_bid: self.bids.best(),
            best_ask: self.asks.best(),
        }
    }

    /// Test-only coherence walk over the two coupled maps.
    #[cfg(test)]
    fn assert_coherent(&self) {
        for (&oid, &(px, side)) in &self.index {
            let book = match side {
                Side::Ask => &self.asks,
                _ => &self.bids,
            };
            let level = book.levels.get(&px).expect("indexed level missing");
            assert!(!level.is_empty(), "indexed level is empty");
            assert!(level.size_of(oid) > 0, "indexed order missing from level");
        }
        for book in [&self.bids, &self.asks] {
            let mut prev: Option<Price> = None;
            for (&px, level) in &book.levels {
                assert_eq!(level.price, px, "level price out of sync with key");
                assert!(!level.is_empty(), "empty level left in side book");
                let sum: u64 = level.orders.values().map(|&s| u64::from(s)).sum();
                assert_eq!(level.total_size, sum, "level total out of sync");
                assert_eq!(level.order_count as usize, level.orders.len());
                if let Some(p) = prev {
                    assert!(px > p, "side book keys not strictly increasing");
                }
                prev = Some(px);
                for &oid in level.orders.keys() {
                    assert_eq!(self.index.get(&oid), Some(&(px, book.side)));
                }
            }
        }
    }
}

fn validate(rec: &MboRecord) -> Result<(), BookError> {
    if rec.action == Action::Clear {
        return Ok(());
    }
    if !price::is_valid_px(rec.price) {
        return Err(BookError::InvalidEvent("undefined or non-positive price"));
    }
    if rec.size == 0 {
        return Err(BookError::InvalidEvent("zero size"));
    }
    Ok(())
}
