use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use syntharb::application::detection::OpportunityDetector;
use syntharb::application::market_data::MarketDataCache;
use syntharb::config::{PricingConfig, TradingConfig};
use syntharb::domain::market::{Quote, Side};
use syntharb::domain::opportunity::{Opportunity, StrategyKind};

fn quote(symbol: &str, venue: &str, last: Decimal) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        venue: venue.to_string(),
        bid: last - dec!(1),
        ask: last + dec!(1),
        last,
        volume_24h: dec!(5000000),
        funding_rate: None,
        mark_price: None,
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

fn perp_quote(symbol: &str, venue: &str, last: Decimal, funding: f64) -> Quote {
    Quote {
        funding_rate: Some(funding),
        mark_price: Some(last),
        ..quote(symbol, venue, last)
    }
}

fn detector(min_profit_pct: f64) -> OpportunityDetector {
    OpportunityDetector::new(
        TradingConfig {
            min_profit_pct,
            ..TradingConfig::default()
        },
        PricingConfig::default(),
    )
}

fn cache() -> MarketDataCache {
    MarketDataCache::new(Duration::from_secs(5))
}

#[test]
fn spot_perp_seed_btc_dislocation() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let cache = cache();
    cache.update([
        quote("BTC-USD", "venue_a", dec!(43500)),
        quote("BTC-USD-PERP", "venue_a", dec!(43480)),
    ]);

    let found = detector(0.02).detect(&cache.snapshot());
    let spot_perp: Vec<&Opportunity> = found
        .iter()
        .filter(|o| o.strategy == StrategyKind::SpotPerp)
        .collect();
    assert_eq!(spot_perp.len(), 1);

    let opp = spot_perp[0];
    assert_eq!(opp.price_a, dec!(43500));
    assert_eq!(opp.price_b, dec!(43480));
    assert_eq!(opp.price_difference, dec!(20));
    assert!((opp.percentage_spread - 0.046).abs() < 0.001);

    assert_eq!(opp.legs.len(), 2);
    let perp_leg = opp.legs.iter().find(|l| l.instrument.ends_with("-PERP")).unwrap();
    let spot_leg = opp.legs.iter().find(|l| !l.instrument.ends_with("-PERP")).unwrap();
    assert_eq!(perp_leg.side, Side::Buy);
    assert_eq!(perp_leg.weight, 0.5);
    assert_eq!(spot_leg.side, Side::Sell);
    assert_eq!(spot_leg.weight, 0.5);
}

#[test]
fn cross_venue_seed_buy_cheap_sell_rich() {
    let cache = cache();
    cache.update([
        quote("BTC-USD", "venue_a", dec!(43500)),
        quote("BTC-USD", "venue_b", dec!(43520)),
    ]);

    let found = detector(0.02).detect(&cache.snapshot());
    let cross: Vec<&Opportunity> = found
        .iter()
        .filter(|o| o.strategy == StrategyKind::CrossVenue)
        .collect();
    assert_eq!(cross.len(), 1);

    let opp = cross[0];
    let buy = opp.legs.iter().find(|l| l.side == Side::Buy).unwrap();
    let sell = opp.legs.iter().find(|l| l.side == Side::Sell).unwrap();
    assert_eq!(buy.venue, "venue_a");
    assert_eq!(sell.venue, "venue_b");
}

#[test]
fn funding_seed_short_high_long_low() {
    let cache = cache();
    cache.update([
        perp_quote("ETH-USD-PERP", "venue_a", dec!(2300), 0.0001),
        perp_quote("ETH-USD-PERP", "venue_b", dec!(2301), 0.0003),
    ]);

    let found = detector(0.02).detect(&cache.snapshot());
    let funding: Vec<&Opportunity> = found
        .iter()
        .filter(|o| o.strategy == StrategyKind::FundingRate)
        .collect();
    assert_eq!(funding.len(), 1);

    let opp = funding[0];
    let short = opp.legs.iter().find(|l| l.side == Side::Sell).unwrap();
    let long = opp.legs.iter().find(|l| l.side == Side::Buy).unwrap();
    assert_eq!(short.venue, "venue_b");
    assert_eq!(long.venue, "venue_a");
    // One funding period
    assert_eq!(opp.estimated_duration, Duration::from_secs(8 * 3600));
}

#[test]
fn funding_difference_at_threshold_excluded() {
    let cache = cache();
    cache.update([
        perp_quote("ETH-USD-PERP", "venue_a", dec!(2300), 0.0001),
        perp_quote("ETH-USD-PERP", "venue_b", dec!(2301), 0.0002),
    ]);
    let found = detector(0.02).detect(&cache.snapshot());
    assert!(
        !found
            .iter()
            .any(|o| o.strategy == StrategyKind::FundingRate)
    );
}

#[test]
fn empty_cache_yields_no_candidates() {
    let found = detector(0.02).detect(&cache().snapshot());
    assert!(found.is_empty());
}

#[test]
fn net_profit_never_exceeds_gross() {
    let cache = cache();
    cache.update([
        quote("BTC-USD", "venue_a", dec!(43500)),
        quote("BTC-USD", "venue_b", dec!(43700)),
        quote("BTC-USD-PERP", "venue_a", dec!(43350)),
        perp_quote("ETH-USD-PERP", "venue_a", dec!(2300), 0.0001),
        perp_quote("ETH-USD-PERP", "venue_b", dec!(2301), 0.0005),
    ]);
    let found = detector(0.02).detect(&cache.snapshot());
    assert!(!found.is_empty());
    for opp in &found {
        assert!(
            opp.net_profit_usd <= opp.gross_profit_usd,
            "{}: net {} above gross {}",
            opp.id,
            opp.net_profit_usd,
            opp.gross_profit_usd
        );
        assert_eq!(
            opp.net_profit_usd,
            opp.gross_profit_usd - opp.execution_cost - opp.slippage_cost
        );
        assert!((opp.weights_sum() - 1.0).abs() < 1e-9);
    }
}

#[test]
fn detection_is_pure_over_identical_snapshots() {
    let cache = cache();
    cache.update([
        quote("BTC-USD", "venue_a", dec!(43500)),
        quote("BTC-USD", "venue_b", dec!(43520)),
        quote("BTC-USD-PERP", "venue_a", dec!(43480)),
    ]);
    let snapshot = cache.snapshot();
    let detector = detector(0.02);

    let key = |o: &Opportunity| {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            o.strategy.tag(),
            o.symbol,
            o.venue_a,
            o.venue_b,
            o.price_a,
            o.price_b,
            o.legs.len()
        )
    };
    let mut first: Vec<String> = detector.detect(&snapshot).iter().map(key).collect();
    let mut second: Vec<String> = detector.detect(&snapshot).iter().map(key).collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn reapplying_a_batch_leaves_cache_unchanged() {
    let cache = cache();
    let batch = vec![
        quote("BTC-USD", "venue_a", dec!(43500)),
        quote("ETH-USD", "venue_a", dec!(2300)),
    ];
    cache.update(batch.clone());
    let before = cache.get_quote("BTC-USD", "venue_a").unwrap();
    cache.update(batch);
    let after = cache.get_quote("BTC-USD", "venue_a").unwrap();
    assert_eq!(before.last, after.last);
    assert_eq!(before.bid, after.bid);
    assert_eq!(before.timestamp, after.timestamp);
}
