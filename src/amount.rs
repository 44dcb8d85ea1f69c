//! Amount input handling.
//!
//! Amounts are kept as the decimal strings the user typed. They are only
//! converted to token base units (`U256`) when compared or sent on-chain.

use ethers::types::U256;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Well-formed amount: optional integer part without redundant leading zeros,
/// optional fractional part introduced by a single decimal point.
pub const AMOUNT_PATTERN: &str = r"^(0|[1-9]\d*)?(\.\d*)?$";

/// Largest accepted integer part, in digits. Keeps base-unit values far
/// enough below `U256::MAX` for the weighted split to multiply safely.
pub const MAX_INTEGER_DIGITS: usize = 30;

static AMOUNT_RE: OnceLock<Regex> = OnceLock::new();

fn amount_re() -> &'static Regex {
    AMOUNT_RE.get_or_init(|| {
        Regex::new(AMOUNT_PATTERN).expect("AMOUNT_PATTERN is a valid regex")
    })
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount cannot be empty")]
    Empty,
    #[error("invalid amount '{0}'")]
    Invalid(String),
    #[error("at most {0} decimal places are allowed")]
    TooPrecise(u32),
    #[error("amount is too large")]
    TooLarge,
}

/// Check an amount string against [`AMOUNT_PATTERN`]
pub fn is_well_formed(input: &str) -> bool {
    amount_re().is_match(input)
}

/// Fix up a keystroke-edited amount instead of rejecting it.
///
/// Well-formed input is returned unchanged. Otherwise every character other
/// than digits and `.` is dropped, leading zeros directly followed by another
/// digit are dropped, and every decimal point after the first is dropped.
pub fn sanitize_amount(input: &str) -> String {
    if is_well_formed(input) {
        return input.to_string();
    }

    let mut seen_point = false;
    let mut fixed: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .filter(|c| {
            if *c != '.' {
                return true;
            }
            let keep = !seen_point;
            seen_point = true;
            keep
        })
        .collect();

    let zeros = fixed.chars().take_while(|c| *c == '0').count();
    if zeros > 0 {
        let next_is_digit = fixed[zeros..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false);
        // Keep one zero when the run ends the integer part ("00.5" -> "0.5").
        let strip = if next_is_digit { zeros } else { zeros - 1 };
        fixed.replace_range(..strip, "");
    }

    fixed
}

/// Parse a decimal amount into token base units
pub fn parse_token_amount(input: &str, decimals: u32) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Err(AmountError::Empty);
    }
    if !is_well_formed(trimmed) {
        return Err(AmountError::Invalid(trimmed.to_string()));
    }

    let normalized = match (trimmed.starts_with('.'), trimmed.ends_with('.')) {
        (true, _) => format!("0{}", trimmed),
        (false, true) => trimmed.trim_end_matches('.').to_string(),
        _ => trimmed.to_string(),
    };

    let (integer, fraction) = normalized.split_once('.').unwrap_or((normalized.as_str(), ""));
    if integer.len() > MAX_INTEGER_DIGITS {
        return Err(AmountError::TooLarge);
    }
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise(decimals));
    }

    ethers::utils::parse_units(normalized.as_str(), decimals)
        .map(|pu| pu.into())
        .map_err(|_| AmountError::Invalid(trimmed.to_string()))
}

/// Format base units as a short decimal string ("3", "0.25")
pub fn format_token_amount(value: U256, decimals: u32) -> String {
    let formatted =
        ethers::utils::format_units(value, decimals).unwrap_or_else(|_| "0".to_string());
    if formatted.contains('.') {
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        formatted
    }
}

/// True when the input is empty or the literal "0" (the states that disable funding)
pub fn is_unset(amount: &str) -> bool {
    amount.is_empty() || amount == "0"
}
