use crate::domain::market::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A signed holding in one instrument on one venue. Positive size is long.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub symbol: String,
    pub venue: String,
    pub size: Decimal,
    pub average_entry_price: Decimal,
    pub mark_price: Decimal,
    /// Always `|size| * average_entry_price` while the position is open.
    pub cost_basis: Decimal,
    pub leverage: f64,
    pub opened_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_synthetic: bool,
    /// Component instruments when the position replicates a synthetic.
    pub underlying: Vec<String>,
    pub trade_ids: Vec<String>,
    pub unrealized_pnl: Decimal,
}

impl Position {
    pub fn generate_id(symbol: &str, venue: &str) -> String {
        format!("{}_{}_{}", symbol, venue, Utc::now().timestamp_millis())
    }

    pub fn new(symbol: impl Into<String>, venue: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let venue = venue.into();
        let now = Utc::now();
        Self {
            position_id: Self::generate_id(&symbol, &venue),
            symbol,
            venue,
            size: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            mark_price: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            leverage: 1.0,
            opened_at: now,
            last_update_at: now,
            is_active: true,
            is_synthetic: false,
            underlying: Vec::new(),
            trade_ids: Vec::new(),
            unrealized_pnl: Decimal::ZERO,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.size.abs() * self.mark_price.max(self.average_entry_price)
    }

    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    /// Applies a fill, updating size, average entry and cost basis.
    ///
    /// Increasing fills blend the average entry price; reducing fills realize
    /// P&L against it and leave it unchanged; fills that flip direction start
    /// a fresh position at the fill price. Returns the realized P&L of the
    /// reduced portion (zero for pure increases).
    pub fn apply_fill(&mut self, side: Side, quantity: Decimal, price: Decimal) -> Decimal {
        let signed = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let old_size = self.size;
        let new_size = old_size + signed;
        let mut realized = Decimal::ZERO;

        let increasing = old_size.is_zero() || (old_size.is_sign_positive() == signed.is_sign_positive());
        if increasing {
            let total_cost = self.cost_basis + quantity * price;
            let total_qty = old_size.abs() + quantity;
            if !total_qty.is_zero() {
                self.average_entry_price = total_cost / total_qty;
            }
        } else {
            // Reducing or flipping: realize against the current average
            let closed = quantity.min(old_size.abs());
            realized = if old_size.is_sign_positive() {
                (price - self.average_entry_price) * closed
            } else {
                (self.average_entry_price - price) * closed
            };
            if old_size.is_sign_positive() != new_size.is_sign_positive() && !new_size.is_zero() {
                // Direction flipped, remainder opens at the fill price
                self.average_entry_price = price;
            }
        }

        self.size = new_size;
        self.cost_basis = self.size.abs() * self.average_entry_price;
        self.mark_price = price;
        self.last_update_at = Utc::now();
        if self.size.is_zero() {
            self.is_active = false;
            self.unrealized_pnl = Decimal::ZERO;
        }
        realized
    }

    /// Re-marks the position and refreshes unrealized P&L.
    pub fn update_mark(&mut self, mark: Decimal) {
        self.mark_price = mark;
        self.unrealized_pnl = if self.size.is_sign_positive() {
            (mark - self.average_entry_price) * self.size
        } else {
            (self.average_entry_price - mark) * self.size.abs()
        };
        self.last_update_at = Utc::now();
    }
}

/// Immutable record of one fill. Closing fields are written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub plan_id: Option<String>,
    pub venue: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,

    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub realized_pnl: Option<Decimal>,

    pub transaction_costs: Decimal,
    pub slippage: Decimal,
    pub total_costs: Decimal,
    pub is_closed: bool,
}

impl TradeRecord {
    pub fn generate_id() -> String {
        use rand::Rng;
        let suffix: u32 = rand::rng().random_range(100_000..1_000_000);
        format!("TRD_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), suffix)
    }

    /// Closes the record. A closed record never reopens and repeated closes
    /// are ignored.
    pub fn close(&mut self, exit_price: Decimal, realized_pnl: Decimal, exit_time: DateTime<Utc>) {
        if self.is_closed {
            return;
        }
        self.exit_price = Some(exit_price);
        self.exit_time = Some(exit_time);
        self.realized_pnl = Some(realized_pnl);
        self.is_closed = true;
    }
}

/// Capital split across strategy buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalAllocation {
    pub total_capital: Decimal,
    pub available_capital: Decimal,
    pub allocated_capital: Decimal,
    pub reserved_capital: Decimal,
    pub strategy_allocations: HashMap<String, Decimal>,
    pub last_update: DateTime<Utc>,
}

impl CapitalAllocation {
    pub fn new(total: Decimal) -> Self {
        Self {
            total_capital: total,
            available_capital: total,
            allocated_capital: Decimal::ZERO,
            reserved_capital: Decimal::ZERO,
            strategy_allocations: HashMap::new(),
            last_update: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn assert_invariant(p: &Position) {
        if !p.size.is_zero() {
            assert_eq!(p.cost_basis, p.size.abs() * p.average_entry_price);
        }
    }

    #[test]
    fn test_long_accumulation_blends_entry() {
        let mut p = Position::new("BTC-USDT", "binance");
        p.apply_fill(Side::Buy, dec!(1), dec!(100));
        p.apply_fill(Side::Buy, dec!(1), dec!(110));
        assert_eq!(p.size, dec!(2));
        assert_eq!(p.average_entry_price, dec!(105));
        assert_invariant(&p);
    }

    #[test]
    fn test_long_reduce_realizes_pnl() {
        let mut p = Position::new("BTC-USDT", "binance");
        p.apply_fill(Side::Buy, dec!(2), dec!(100));
        let realized = p.apply_fill(Side::Sell, dec!(1), dec!(120));
        assert_eq!(realized, dec!(20));
        assert_eq!(p.size, dec!(1));
        // Reducing does not move the average entry
        assert_eq!(p.average_entry_price, dec!(100));
        assert_invariant(&p);
    }

    #[test]
    fn test_short_cover_realizes_pnl() {
        let mut p = Position::new("ETH-USDT", "okx");
        p.apply_fill(Side::Sell, dec!(3), dec!(200));
        assert_eq!(p.size, dec!(-3));
        let realized = p.apply_fill(Side::Buy, dec!(3), dec!(180));
        assert_eq!(realized, dec!(60));
        assert!(p.is_flat());
        assert!(!p.is_active);
    }

    #[test]
    fn test_flip_direction_resets_entry() {
        let mut p = Position::new("BTC-USDT", "binance");
        p.apply_fill(Side::Buy, dec!(1), dec!(100));
        let realized = p.apply_fill(Side::Sell, dec!(2), dec!(110));
        // 1 long closed at +10, remainder is 1 short opened at 110
        assert_eq!(realized, dec!(10));
        assert_eq!(p.size, dec!(-1));
        assert_eq!(p.average_entry_price, dec!(110));
        assert_invariant(&p);
    }

    #[test]
    fn test_unrealized_marks() {
        let mut p = Position::new("BTC-USDT", "binance");
        p.apply_fill(Side::Buy, dec!(2), dec!(100));
        p.update_mark(dec!(105));
        assert_eq!(p.unrealized_pnl, dec!(10));
        p.apply_fill(Side::Sell, dec!(2), dec!(100));
        assert_eq!(p.unrealized_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_trade_record_closes_once() {
        let mut t = TradeRecord {
            trade_id: TradeRecord::generate_id(),
            plan_id: None,
            venue: "binance".to_string(),
            symbol: "BTC-USDT".to_string(),
            side: Side::Buy,
            quantity: dec!(1),
            entry_price: dec!(100),
            entry_time: Utc::now(),
            exit_price: None,
            exit_time: None,
            realized_pnl: None,
            transaction_costs: dec!(0.1),
            slippage: Decimal::ZERO,
            total_costs: dec!(0.1),
            is_closed: false,
        };
        t.close(dec!(110), dec!(10), Utc::now());
        assert!(t.is_closed);
        assert_eq!(t.exit_price, Some(dec!(110)));
        // Second close is a no-op
        t.close(dec!(90), dec!(-10), Utc::now());
        assert_eq!(t.exit_price, Some(dec!(110)));
        assert_eq!(t.realized_pnl, Some(dec!(10)));
    }
}
