//! Domain types: rows, keys, boards and trading-calendar helpers.

pub mod board;
pub mod calendar;
pub mod row;

pub use board::{limit_prices, Board, Exchange, LimitPrices};
pub use calendar::{date_from_number, from_epoch_days, parse_date, quarter_index, to_epoch_days};
pub use row::{format_key, Key, KeyPart, Row, Value};

/// Status types recorded in `stock_status`.
pub mod status {
    pub const ST: &str = "ST";
    pub const HALT: &str = "HALT";
    pub const DELISTING: &str = "DELISTING";

    /// Every recognized status type.
    pub const ALL: [&str; 3] = [ST, HALT, DELISTING];
}
