//! Background knowledge: forbidden and required directed edges, and tiers.
//!
//! Variables are referred to by name so that one knowledge object can be
//! shared between graphs with different node orders.

use crate::error::ParseError;
use std::collections::{BTreeMap, BTreeSet};

/// Forbidden/required directed pairs plus a temporal tier ordering.
///
/// A variable in a later tier may not cause a variable in an earlier tier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Knowledge {
    forbidden: BTreeSet<(String, String)>,
    required: BTreeSet<(String, String)>,
    tiers: BTreeMap<String, usize>,
    forbidden_within: BTreeSet<usize>,
}

impl Knowledge {
    /// Empty knowledge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbids `x --> y`.
    pub fn set_forbidden(&mut self, x: &str, y: &str) {
        self.forbidden.insert((x.to_string(), y.to_string()));
    }

    /// Lifts an explicit prohibition of `x --> y`.
    pub fn remove_forbidden(&mut self, x: &str, y: &str) {
        self.forbidden.remove(&(x.to_string(), y.to_string()));
    }

    /// Requires `x --> y`.
    pub fn set_required(&mut self, x: &str, y: &str) {
        self.required.insert((x.to_string(), y.to_string()));
    }

    /// Places `name` in `tier` (moving it if it already has one).
    pub fn add_to_tier(&mut self, tier: usize, name: &str) {
        self.tiers.insert(name.to_string(), tier);
    }

    /// Forbids (or allows) edges between variables of the same tier.
    pub fn set_tier_forbidden_within(&mut self, tier: usize, forbidden: bool) {
        if forbidden {
            self.forbidden_within.insert(tier);
        } else {
            self.forbidden_within.remove(&tier);
        }
    }

    /// Tier of `name`, if assigned.
    pub fn tier_of(&self, name: &str) -> Option<usize> {
        self.tiers.get(name).copied()
    }

    /// Whether `x --> y` is forbidden, explicitly or by tiers.
    pub fn is_forbidden(&self, x: &str, y: &str) -> bool {
        if self.forbidden.contains(&(x.to_string(), y.to_string())) {
            return true;
        }
        match (self.tier_of(x), self.tier_of(y)) {
            (Some(tx), Some(ty)) => tx > ty || (tx == ty && self.forbidden_within.contains(&tx)),
            _ => false,
        }
    }

    /// Whether `x --> y` is required.
    pub fn is_required(&self, x: &str, y: &str) -> bool {
        self.required.contains(&(x.to_string(), y.to_string()))
    }

    /// Explicitly required pairs.
    pub fn required_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.required.iter().map(|(x, y)| (x.as_str(), y.as_str()))
    }

    /// Explicitly forbidden pairs (tier prohibitions are not listed).
    pub fn forbidden_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forbidden.iter().map(|(x, y)| (x.as_str(), y.as_str()))
    }

    /// Whether no constraint of any kind is set.
    pub fn is_empty(&self) -> bool {
        self.forbidden.is_empty() && self.required.is_empty() && self.tiers.is_empty()
    }

    /// Parses one directive per line:
    ///
    /// ```text
    /// forbid X Y          # X --> Y is forbidden
    /// require X Y         # X --> Y is required
    /// tier 0 X Y Z        # X, Y, Z are in tier 0
    /// within 2            # no edges inside tier 2
    /// ```
    ///
    /// # Errors
    /// Returns [`ParseError::Malformed`] on an unknown directive or wrong arity.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut k = Knowledge::new();
        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let malformed = |message: String| ParseError::Malformed {
                line: line_no,
                message,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let parse_tier = |tok: &str| {
                tok.parse::<usize>()
                    .map_err(|_| malformed(format!("bad tier {tok:?}")))
            };
            match tokens[..] {
                ["forbid", x, y] => k.set_forbidden(x, y),
                ["require", x, y] => k.set_required(x, y),
                ["tier", tier, ref names @ ..] if !names.is_empty() => {
                    let tier = parse_tier(tier)?;
                    for name in names {
                        k.add_to_tier(tier, name);
                    }
                }
                ["within", tier] => {
                    let tier = parse_tier(tier)?;
                    k.set_tier_forbidden_within(tier, true);
                }
                _ => return Err(malformed(format!("unrecognized directive {line:?}"))),
            }
        }
        Ok(k)
    }
}
