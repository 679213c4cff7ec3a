use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Listing board of an A-share symbol, which decides its daily price band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Board {
    /// Shanghai / Shenzhen main board (incl. SME)
    Main,
    /// Shenzhen ChiNext, `300xxx` / `301xxx`
    ChiNext,
    /// Shanghai STAR market, `688xxx` / `689xxx`
    Star,
    /// Beijing Stock Exchange
    Beijing,
}

/// Exchange suffix of a qualified symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Exchange {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Exchange {
    /// Parse the suffix of `000001.SZ`. Shanghai is accepted as `.SS` or `.SH`.
    pub fn from_symbol(symbol: &str) -> Option<Exchange> {
        let (_, suffix) = symbol.rsplit_once('.')?;
        match suffix.to_ascii_uppercase().as_str() {
            "SS" | "SH" => Some(Exchange::Shanghai),
            "SZ" => Some(Exchange::Shenzhen),
            "BJ" => Some(Exchange::Beijing),
            _ => None,
        }
    }
}

impl Board {
    pub fn from_symbol(symbol: &str) -> Board {
        let code = symbol.split('.').next().unwrap_or(symbol);
        match Exchange::from_symbol(symbol) {
            Some(Exchange::Beijing) => Board::Beijing,
            Some(Exchange::Shenzhen) if code.starts_with("300") || code.starts_with("301") => {
                Board::ChiNext
            }
            Some(Exchange::Shanghai) if code.starts_with("688") || code.starts_with("689") => {
                Board::Star
            }
            _ => Board::Main,
        }
    }

    /// Daily price band as a fraction of the previous close.
    ///
    /// The 5% ST band only narrows main-board stocks; the growth boards keep
    /// their own band for ST stocks.
    pub fn limit_pct(&self, is_st: bool) -> Decimal {
        match (self, is_st) {
            (Board::Main, true) => Decimal::new(5, 2),
            (Board::Main, false) => Decimal::new(10, 2),
            (Board::ChiNext | Board::Star, _) => Decimal::new(20, 2),
            (Board::Beijing, _) => Decimal::new(30, 2),
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Board::Main => "main",
            Board::ChiNext => "chinext",
            Board::Star => "star",
            Board::Beijing => "beijing",
        };
        f.write_str(name)
    }
}

/// Upper and lower limit price for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitPrices {
    pub high: f64,
    pub low: f64,
}

/// Compute limit prices from the previous close, rounded to the 0.01 tick
/// with half-away-from-zero rounding.
///
/// Returns `None` for a non-finite or non-positive preclose.
pub fn limit_prices(preclose: f64, pct: Decimal) -> Option<LimitPrices> {
    if !preclose.is_finite() || preclose <= 0.0 {
        return None;
    }
    let pre = Decimal::from_f64(preclose)?;
    let up = (pre * (Decimal::ONE + pct)).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let down =
        (pre * (Decimal::ONE - pct)).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Some(LimitPrices {
        high: up.to_f64()?,
        low: down.to_f64()?,
    })
}
