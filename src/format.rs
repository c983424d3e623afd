//! Presentation helpers: raw chain integers to human-readable values.
//!
//! Everything upstream of this module works on raw `U256` amounts in the
//! token's smallest unit. Conversion to `Decimal` happens here only.

use crate::pools::PoolStatus;
use crate::state::ApyInputs;
use chrono::{DateTime, Utc};
use ethers::prelude::U256;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// `getPricePerFullShare` is always scaled by 1e18.
const PRICE_PER_SHARE_DECIMALS: u32 = 18;

const APY_UNITS: [&str; 5] = ["", "k", "M", "B", "T"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
}

/// `raw / 10^decimals` as a `Decimal`.
pub fn by_decimals(raw: U256, decimals: u32) -> Result<Decimal, FormatError> {
    let mut value = Decimal::from_str(&raw.to_string())
        .map_err(|e| FormatError::InvalidDecimal(e.to_string()))?;
    value
        .set_scale(decimals)
        .map_err(|e| FormatError::InvalidDecimal(e.to_string()))?;
    Ok(value.normalize())
}

/// Display string of a raw amount, trailing zeros trimmed.
pub fn format_amount(raw: U256, decimals: u32) -> String {
    match by_decimals(raw, decimals) {
        Ok(value) => value.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Value of all staked tokens, in the unit of `token_price`.
pub fn pool_tvl(
    total_staked: U256,
    token_decimals: u32,
    token_price: Decimal,
) -> Result<Decimal, FormatError> {
    by_decimals(total_staked, token_decimals)?
        .checked_mul(token_price)
        .ok_or(FormatError::Overflow)
}

/// Token prices come from an external price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPrices {
    pub token: Decimal,
    pub earned_token: Decimal,
}

/// Yearly reward value over staked value, as a fraction (`0.5` = 50%).
///
/// Staked tokens are vault shares, so their underlying amount is
/// `total_staked * price_per_share / 1e18`. `None` when nothing is staked.
pub fn pool_apy(
    inputs: &ApyInputs,
    token_decimals: u32,
    earned_token_decimals: u32,
    prices: TokenPrices,
) -> Result<Option<Decimal>, FormatError> {
    let yearly_rewards = by_decimals(inputs.reward_rate, earned_token_decimals)?
        .checked_mul(Decimal::from(SECONDS_PER_YEAR))
        .and_then(|v| v.checked_mul(prices.earned_token))
        .ok_or(FormatError::Overflow)?;

    let staked_value = by_decimals(inputs.total_staked, token_decimals)?
        .checked_mul(by_decimals(inputs.price_per_share, PRICE_PER_SHARE_DECIMALS)?)
        .and_then(|v| v.checked_mul(prices.token))
        .ok_or(FormatError::Overflow)?;

    if staked_value.is_zero() {
        return Ok(None);
    }
    yearly_rewards
        .checked_div(staked_value)
        .map(Some)
        .ok_or(FormatError::Overflow)
}

/// Percentage with a magnitude suffix, e.g. `"1.23k%"`. `"???"` when the
/// APY is unknown, zero or negative.
pub fn format_apy(apy: Option<Decimal>) -> String {
    let Some(mut pct) = apy
        .filter(|a| a.is_sign_positive() && !a.is_zero())
        .and_then(|a| a.checked_mul(Decimal::ONE_HUNDRED))
    else {
        return "???".to_string();
    };

    let thousand = Decimal::ONE_THOUSAND;
    let mut order = 0;
    while pct >= thousand && order < APY_UNITS.len() - 1 {
        pct /= thousand;
        order += 1;
    }
    format!("{:.2}{}%", pct.round_dp(2), APY_UNITS[order])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStatus {
    Finished,
    ComingSoon,
    Ends(Duration),
    /// Finish time not fetched yet
    Loading,
    Hidden,
}

pub fn countdown_status(
    status: PoolStatus,
    finish: Option<U256>,
    hide_countdown: bool,
    now: DateTime<Utc>,
) -> CountdownStatus {
    match status {
        PoolStatus::Closed => return CountdownStatus::Finished,
        PoolStatus::Soon => return CountdownStatus::ComingSoon,
        PoolStatus::Active => {}
    }
    if hide_countdown {
        return CountdownStatus::Hidden;
    }
    let Some(finish) = finish else {
        return CountdownStatus::Loading;
    };

    let finish = if finish > U256::from(u64::MAX) {
        u64::MAX
    } else {
        finish.as_u64()
    };
    let now = u64::try_from(now.timestamp()).unwrap_or(0);
    match finish.checked_sub(now) {
        Some(remaining) if remaining > 0 => CountdownStatus::Ends(Duration::from_secs(remaining)),
        _ => CountdownStatus::Finished,
    }
}

/// `"{d}d {hh}h {mm}m {ss}s"`
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days}d {hours:02}h {minutes:02}m {seconds:02}s")
}
