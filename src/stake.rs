//! Chainage ("stake") values.
//!
//! Canonical text form is `<km>+<mmm>`, e.g. `12+005` for 12 005 m from
//! the route origin. The meter part is always three digits and totals are
//! never negative.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StakeError;

pub const ZERO_STAKE: &str = "0+000";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Stake {
    total_m: u64,
}

impl Stake {
    pub const ZERO: Stake = Stake { total_m: 0 };

    pub fn from_parts(km: u64, meters: u64) -> Result<Self, StakeError> {
        if meters > 999 {
            return Err(StakeError::InvalidFormat(format!("{km}+{meters}")));
        }
        km.checked_mul(1000)
            .and_then(|m| m.checked_add(meters))
            .map(|total_m| Stake { total_m })
            .ok_or_else(|| StakeError::InvalidFormat(format!("{km}+{meters:03}")))
    }

    /// Build from a real-valued total, flooring to whole meters.
    pub fn from_meters(total_m: f64) -> Result<Self, StakeError> {
        if !total_m.is_finite() || total_m < 0.0 {
            return Err(StakeError::Negative { total_m });
        }
        Ok(Stake {
            total_m: total_m.floor() as u64,
        })
    }

    pub fn total_meters(&self) -> u64 {
        self.total_m
    }

    pub fn km(&self) -> u64 {
        self.total_m / 1000
    }

    pub fn meters(&self) -> u64 {
        self.total_m % 1000
    }

    /// Shift by a signed number of meters.
    pub fn offset(&self, delta_m: f64) -> Result<Stake, StakeError> {
        Stake::from_meters(self.total_m as f64 + delta_m)
    }
}

impl fmt::Display for Stake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:03}", self.km(), self.meters())
    }
}

impl FromStr for Stake {
    type Err = StakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StakeError::InvalidFormat(s.to_string());
        let (km, meters) = s.split_once('+').ok_or_else(invalid)?;

        if km.is_empty() || !km.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if meters.len() != 3 || !meters.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let km: u64 = km.parse().map_err(|_| invalid())?;
        let meters: u64 = meters.parse().map_err(|_| invalid())?;
        Stake::from_parts(km, meters).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Stake {
    type Error = StakeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Stake> for String {
    fn from(stake: Stake) -> Self {
        stake.to_string()
    }
}

/// True when `s` matches `^\d+\+\d{3}$`.
pub fn is_valid_stake(s: &str) -> bool {
    s.parse::<Stake>().is_ok()
}

/// Add a signed offset (meters) to a stake string, returning canonical text.
pub fn add_stake_offset(stake: &str, offset_m: f64) -> Result<String, StakeError> {
    let base: Stake = stake.parse()?;
    Ok(base.offset(offset_m)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_and_format() {
        let stake: Stake = "12+005".parse().unwrap();
        assert_eq!(stake.total_meters(), 12_005);
        assert_eq!(stake.km(), 12);
        assert_eq!(stake.meters(), 5);
        assert_eq!(stake.to_string(), "12+005");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "12", "12+5", "12+0005", "+005", "a+005", "12+00a", "-1+000", "1+000 "] {
            assert!(!is_valid_stake(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_leading_zero_km_normalises() {
        let stake: Stake = "012+340".parse().unwrap();
        assert_eq!(stake.to_string(), "12+340");
    }

    #[test]
    fn test_offset_floors() {
        assert_eq!(add_stake_offset("10+000", 300.9).unwrap(), "10+300");
        assert_eq!(add_stake_offset("10+000", -0.5).unwrap(), "9+999");
        assert_eq!(add_stake_offset("0+999", 1.0).unwrap(), "1+000");
    }

    #[test]
    fn test_negative_total_is_error() {
        let err = add_stake_offset("0+100", -200.0).unwrap_err();
        assert!(matches!(err, StakeError::Negative { .. }));
    }

    #[test]
    fn test_unparsable_offset_is_error() {
        assert!(matches!(
            add_stake_offset("K12", 10.0),
            Err(StakeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let stake: Stake = "3+042".parse().unwrap();
        assert_eq!(serde_json::to_string(&stake).unwrap(), "\"3+042\"");
        let back: Stake = serde_json::from_str("\"3+042\"").unwrap();
        assert_eq!(back, stake);
    }

    proptest! {
        #[test]
        fn prop_format_parse_round_trip(km in 0u64..1_000_000, m in 0u64..1000) {
            let text = format!("{km}+{m:03}");
            let stake: Stake = text.parse().unwrap();
            prop_assert_eq!(stake.to_string(), text);
        }

        #[test]
        fn prop_distance_from_zero_floors(d in 0.0f64..5_000_000.0) {
            let stake = Stake::ZERO.offset(d).unwrap();
            prop_assert_eq!(stake.total_meters(), d.floor() as u64);
        }
    }
}
