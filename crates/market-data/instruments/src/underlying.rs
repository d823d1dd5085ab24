//! Derivatives structure for one underlying on one exchange

use crate::instrument::OptionType;
use chrono::NaiveDate;
use common::{InstrumentId, Px};
use std::collections::BTreeMap;

/// A future contract in an underlying's futures strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FutureContract {
    /// Contract expiry
    pub expiry: NaiveDate,
    /// Contract instrument
    pub instrument: InstrumentId,
}

/// Call and put listed at one strike
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionPair {
    /// Call instrument, if listed
    pub call: Option<InstrumentId>,
    /// Put instrument, if listed
    pub put: Option<InstrumentId>,
}

impl OptionPair {
    /// Leg by option type
    #[must_use]
    pub const fn get(&self, option_type: OptionType) -> Option<InstrumentId> {
        match option_type {
            OptionType::Call => self.call,
            OptionType::Put => self.put,
        }
    }
}

/// All strikes listed for one expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionChain {
    expiry: NaiveDate,
    strikes: BTreeMap<Px, OptionPair>,
}

impl OptionChain {
    fn new(expiry: NaiveDate) -> Self {
        Self {
            expiry,
            strikes: BTreeMap::new(),
        }
    }

    /// Chain expiry
    #[must_use]
    pub const fn expiry(&self) -> NaiveDate {
        self.expiry
    }

    /// Pair at `strike`
    #[must_use]
    pub fn pair(&self, strike: Px) -> Option<&OptionPair> {
        self.strikes.get(&strike)
    }

    /// Call at `strike`
    #[must_use]
    pub fn call(&self, strike: Px) -> Option<InstrumentId> {
        self.pair(strike).and_then(|pair| pair.call)
    }

    /// Put at `strike`
    #[must_use]
    pub fn put(&self, strike: Px) -> Option<InstrumentId> {
        self.pair(strike).and_then(|pair| pair.put)
    }

    /// Strikes in ascending order
    pub fn strikes(&self) -> impl Iterator<Item = (Px, &OptionPair)> {
        self.strikes.iter().map(|(strike, pair)| (*strike, pair))
    }

    /// Listed strike closest to `price`; lower strike wins a tie
    #[must_use]
    pub fn nearest_strike(&self, price: Px) -> Option<Px> {
        let below = self.strikes.range(..=price).next_back().map(|(s, _)| *s);
        let above = self.strikes.range(price..).next().map(|(s, _)| *s);
        match (below, above) {
            (Some(b), Some(a)) => {
                if price.as_i64() - b.as_i64() <= a.as_i64() - price.as_i64() {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }

    /// Number of listed strikes
    #[must_use]
    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    /// True if no strike is listed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }
}

/// Futures and option chains grouped under one (exchange, underlying) pair
///
/// Futures and chains are kept sorted by expiry. The underlying is held by
/// id only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnderlyingDetails {
    exchange: String,
    symbol: String,
    underlying: InstrumentId,
    futures: Vec<FutureContract>,
    option_chains: Vec<OptionChain>,
}

impl UnderlyingDetails {
    pub(crate) fn new(exchange: &str, symbol: &str, underlying: InstrumentId) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            underlying,
            futures: Vec::new(),
            option_chains: Vec::new(),
        }
    }

    pub(crate) fn insert_future(&mut self, expiry: NaiveDate, instrument: InstrumentId) {
        let at = self
            .futures
            .partition_point(|f| (f.expiry, f.instrument) < (expiry, instrument));
        self.futures.insert(at, FutureContract { expiry, instrument });
    }

    /// Returns false if the slot is already taken
    pub(crate) fn insert_option(
        &mut self,
        expiry: NaiveDate,
        strike: Px,
        option_type: OptionType,
        instrument: InstrumentId,
    ) -> bool {
        let index = match self
            .option_chains
            .binary_search_by_key(&expiry, OptionChain::expiry)
        {
            Ok(index) => index,
            Err(index) => {
                self.option_chains.insert(index, OptionChain::new(expiry));
                index
            }
        };

        let pair = self.option_chains[index].strikes.entry(strike).or_default();
        let slot = match option_type {
            OptionType::Call => &mut pair.call,
            OptionType::Put => &mut pair.put,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(instrument);
        true
    }

    /// Exchange the derivatives are listed on
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Underlying symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Underlying instrument id
    #[must_use]
    pub const fn underlying(&self) -> InstrumentId {
        self.underlying
    }

    /// Futures ordered by expiry
    #[must_use]
    pub fn futures(&self) -> &[FutureContract] {
        &self.futures
    }

    /// First future expiring on or after `date`
    #[must_use]
    pub fn nearest_future(&self, date: NaiveDate) -> Option<InstrumentId> {
        self.futures
            .iter()
            .find(|f| f.expiry >= date)
            .map(|f| f.instrument)
    }

    /// Option chains ordered by expiry
    #[must_use]
    pub fn option_chains(&self) -> &[OptionChain] {
        &self.option_chains
    }

    /// Chain for one expiry
    #[must_use]
    pub fn option_chain(&self, expiry: NaiveDate) -> Option<&OptionChain> {
        self.option_chains
            .binary_search_by_key(&expiry, OptionChain::expiry)
            .ok()
            .map(|index| &self.option_chains[index])
    }

    /// Call listed at (expiry, strike)
    #[must_use]
    pub fn call_option(&self, expiry: NaiveDate, strike: Px) -> Option<InstrumentId> {
        self.option_chain(expiry)?.call(strike)
    }

    /// Put listed at (expiry, strike)
    #[must_use]
    pub fn put_option(&self, expiry: NaiveDate, strike: Px) -> Option<InstrumentId> {
        self.option_chain(expiry)?.put(strike)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, day).unwrap_or_default()
    }

    #[test]
    fn test_futures_sorted_by_expiry() {
        let mut details = UnderlyingDetails::new("NFO", "NIFTY", InstrumentId(1));
        details.insert_future(date(26), InstrumentId(12));
        details.insert_future(date(5), InstrumentId(10));
        details.insert_future(date(12), InstrumentId(11));

        let ids: Vec<u32> = details.futures().iter().map(|f| f.instrument.0).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert_eq!(details.nearest_future(date(6)), Some(InstrumentId(11)));
        assert_eq!(details.nearest_future(date(27)), None);
    }

    #[test]
    fn test_option_chain_lookup() {
        let mut details = UnderlyingDetails::new("NFO", "NIFTY", InstrumentId(1));
        let strike = Px::new(24_000.0);
        assert!(details.insert_option(date(26), strike, OptionType::Call, InstrumentId(20)));
        assert!(details.insert_option(date(26), strike, OptionType::Put, InstrumentId(21)));
        assert!(details.insert_option(date(5), strike, OptionType::Call, InstrumentId(22)));
        assert!(!details.insert_option(date(26), strike, OptionType::Call, InstrumentId(23)));

        let expiries: Vec<NaiveDate> = details.option_chains().iter().map(OptionChain::expiry).collect();
        assert_eq!(expiries, vec![date(5), date(26)]);
        assert_eq!(details.call_option(date(26), strike), Some(InstrumentId(20)));
        assert_eq!(details.put_option(date(26), strike), Some(InstrumentId(21)));
        assert_eq!(details.put_option(date(5), strike), None);
        assert_eq!(details.call_option(date(12), strike), None);
    }

    #[test]
    fn test_nearest_strike() {
        let mut details = UnderlyingDetails::new("NFO", "NIFTY", InstrumentId(1));
        for (i, s) in [23_900.0, 24_000.0, 24_100.0].into_iter().enumerate() {
            details.insert_option(date(26), Px::new(s), OptionType::Call, InstrumentId(30 + i as u32));
        }
        let chain = details.option_chain(date(26));
        assert_eq!(
            chain.and_then(|c| c.nearest_strike(Px::new(24_049.0))),
            Some(Px::new(24_000.0))
        );
        assert_eq!(
            chain.and_then(|c| c.nearest_strike(Px::new(24_050.0))),
            Some(Px::new(24_000.0))
        );
        assert_eq!(
            chain.and_then(|c| c.nearest_strike(Px::new(30_000.0))),
            Some(Px::new(24_100.0))
        );
        assert_eq!(chain.map(OptionChain::len), Some(3));
    }
}
