//! Flocking policy: the odds and cooldown that shape behaviour

use crate::error::{FlockError, FlockResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A "numerator in denominator" chance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Odds {
    pub numerator: u32,
    pub denominator: u32,
}

impl Odds {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `1 in n`
    pub const fn one_in(denominator: u32) -> Self {
        Self::new(1, denominator)
    }

    pub const fn never() -> Self {
        Self::new(0, 1)
    }

    pub const fn always() -> Self {
        Self::new(1, 1)
    }

    pub fn validate(&self, name: &str) -> FlockResult<()> {
        if self.denominator == 0 {
            return Err(FlockError::InvalidPolicy(format!(
                "{name}: denominator must be non-zero"
            )));
        }
        if self.numerator > self.denominator {
            return Err(FlockError::InvalidPolicy(format!(
                "{name}: {self} exceeds certainty"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.numerator, self.denominator)
    }
}

/// Tunable constants of the flocking state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlockPolicy {
    /// Accumulated delay since the last move below which the target is not
    /// re-evaluated
    #[serde(default = "default_cooldown_floor")]
    pub cooldown_floor: u64,

    /// Per-tick chance of picking or dropping a target
    #[serde(default = "default_objective_odds")]
    pub objective_odds: Odds,

    /// Per-bird, per-tick chance of moving toward (or away from) the target
    #[serde(default = "default_move_odds")]
    pub move_odds: Odds,

    /// Chance that disturbing the target channel clears the target
    #[serde(default = "default_target_scatter_odds")]
    pub target_scatter_odds: Odds,

    /// Chance that disturbing a channel forces each parked bird out
    #[serde(default = "default_bird_scatter_odds")]
    pub bird_scatter_odds: Odds,
}

impl Default for FlockPolicy {
    fn default() -> Self {
        Self {
            cooldown_floor: default_cooldown_floor(),
            objective_odds: default_objective_odds(),
            move_odds: default_move_odds(),
            target_scatter_odds: default_target_scatter_odds(),
            bird_scatter_odds: default_bird_scatter_odds(),
        }
    }
}

impl FlockPolicy {
    pub fn validate(&self) -> FlockResult<()> {
        self.objective_odds.validate("objective_odds")?;
        self.move_odds.validate("move_odds")?;
        self.target_scatter_odds.validate("target_scatter_odds")?;
        self.bird_scatter_odds.validate("bird_scatter_odds")?;
        Ok(())
    }
}

fn default_cooldown_floor() -> u64 {
    20
}

fn default_objective_odds() -> Odds {
    Odds::one_in(10)
}

fn default_move_odds() -> Odds {
    Odds::one_in(10)
}

fn default_target_scatter_odds() -> Odds {
    Odds::new(4, 5)
}

fn default_bird_scatter_odds() -> Odds {
    Odds::new(2, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = FlockPolicy::default();
        assert_eq!(policy.cooldown_floor, 20);
        assert_eq!(policy.objective_odds, Odds::new(1, 10));
        assert_eq!(policy.move_odds, Odds::new(1, 10));
        assert_eq!(policy.target_scatter_odds, Odds::new(4, 5));
        assert_eq!(policy.bird_scatter_odds, Odds::new(2, 3));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_rejects_impossible_odds() {
        assert!(Odds::new(1, 0).validate("x").is_err());
        assert!(Odds::new(3, 2).validate("x").is_err());
        assert!(Odds::never().validate("x").is_ok());
        assert!(Odds::always().validate("x").is_ok());
    }

    #[test]
    fn test_partial_policy_uses_defaults() {
        let policy: FlockPolicy = serde_json::from_str(r#"{"cooldown_floor": 5}"#).unwrap();
        assert_eq!(policy.cooldown_floor, 5);
        assert_eq!(policy.bird_scatter_odds, Odds::new(2, 3));
    }
}
