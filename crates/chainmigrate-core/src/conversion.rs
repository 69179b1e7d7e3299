//! Source → destination precision conversion.
//!
//! Amounts only ever lose precision on the way to the venue: the remainder
//! below the destination's smallest unit is truncated, so the credited value
//! is never larger than what was observed on the source chain.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::MigratorError;

/// An amount in destination base units together with its precision.
///
/// Renders as a fixed-point decimal string with exactly `decimals` places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationAmount {
    pub units: U256,
    pub decimals: u8,
}

impl DestinationAmount {
    pub fn new(units: U256, decimals: u8) -> Self {
        Self { units, decimals }
    }

    /// Dust: truncated all the way down to nothing.
    pub fn is_zero(&self) -> bool {
        self.units.is_zero()
    }
}

impl std::fmt::Display for DestinationAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.units.to_string();
        let places = self.decimals as usize;
        if places == 0 {
            return f.write_str(&digits);
        }
        let padded = format!("{digits:0>width$}", width = places + 1);
        let (whole, frac) = padded.split_at(padded.len() - places);
        write!(f, "{whole}.{frac}")
    }
}

/// Converts raw source-chain amounts into destination precision.
#[derive(Debug, Clone)]
pub struct AmountConverter {
    destination_decimals: u8,
    source_decimals: u8,
    divisor: U256,
}

impl AmountConverter {
    /// Fails if the destination would need more precision than the source has.
    pub fn new(destination_decimals: u8, source_decimals: u8) -> Result<Self, MigratorError> {
        if destination_decimals > source_decimals {
            return Err(MigratorError::ConversionConfig {
                destination_decimals,
                source_decimals,
                reason: "destination precision may not exceed source precision".into(),
            });
        }
        let gap = source_decimals - destination_decimals;
        let divisor = U256::from(10u8)
            .checked_pow(U256::from(gap))
            .ok_or_else(|| MigratorError::ConversionConfig {
                destination_decimals,
                source_decimals,
                reason: format!("10^{gap} does not fit in 256 bits"),
            })?;
        Ok(Self {
            destination_decimals,
            source_decimals,
            divisor,
        })
    }

    pub fn destination_decimals(&self) -> u8 {
        self.destination_decimals
    }

    pub fn source_decimals(&self) -> u8 {
        self.source_decimals
    }

    /// Truncating division by `10^(source − destination)`.
    pub fn convert(&self, raw_amount: U256) -> DestinationAmount {
        DestinationAmount::new(raw_amount / self.divisor, self.destination_decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> U256 {
        s.parse().unwrap()
    }

    #[test]
    fn truncates_to_destination_precision() {
        let conv = AmountConverter::new(6, 18).unwrap();
        let out = conv.convert(u("1234567890123456789"));
        assert_eq!(out.units, U256::from(1_234_567u64));
        assert_eq!(out.to_string(), "1.234567");
    }

    #[test]
    fn dust_renders_as_zero_with_full_places() {
        let conv = AmountConverter::new(6, 18).unwrap();
        let out = conv.convert(u("999999999999"));
        assert!(out.is_zero());
        assert_eq!(out.to_string(), "0.000000");
    }

    #[test]
    fn never_rounds_up() {
        let conv = AmountConverter::new(2, 4).unwrap();
        assert_eq!(conv.convert(U256::from(19_999u64)).to_string(), "1.99");
    }

    #[test]
    fn rejects_widening_precision() {
        let err = AmountConverter::new(8, 6).unwrap_err();
        assert!(matches!(
            err,
            MigratorError::ConversionConfig {
                destination_decimals: 8,
                source_decimals: 6,
                ..
            }
        ));
    }

    #[test]
    fn rejects_divisor_overflow() {
        assert!(AmountConverter::new(0, 78).is_err());
        assert!(AmountConverter::new(0, 77).is_ok());
    }

    #[test]
    fn equal_precision_is_identity() {
        let conv = AmountConverter::new(8, 8).unwrap();
        assert_eq!(conv.convert(U256::from(123_456_789u64)).to_string(), "1.23456789");
    }

    #[test]
    fn zero_decimals_has_no_point() {
        let conv = AmountConverter::new(0, 3).unwrap();
        assert_eq!(conv.convert(U256::from(12_345u64)).to_string(), "12");
    }
}
