//! Increments: the smallest billable slices of a time span

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

use super::traffic::TrafficType;
use crate::utils::{self, duration_nanos};

/// Unit balance that absorbed an increment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitInfo {
    pub uuid: String,
    pub id: String,
    /// Balance value left after this increment
    pub value: Decimal,
    /// Units taken from the balance for this increment
    pub consumed: Decimal,
    pub tor: TrafficType,
}

/// Money balance that absorbed an increment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonetaryInfo {
    pub uuid: String,
    pub id: String,
    /// Balance value left after this increment
    pub value: Decimal,
    /// Amount taken from the balance for this increment, factor applied
    #[serde(default)]
    pub consumed: Decimal,
}

/// Attribution of an increment to the balances that paid it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebitInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monetary: Option<MonetaryInfo>,
    /// Account owning the paying balances
    #[serde(default)]
    pub account_id: String,
}

impl DebitInfo {
    pub fn is_empty(&self) -> bool {
        self.unit.is_none() && self.monetary.is_none()
    }

    /// Same paying balances, ignoring the running values
    pub fn same_payers(&self, other: &DebitInfo) -> bool {
        let units = match (&self.unit, &other.unit) {
            (Some(a), Some(b)) => a.uuid == b.uuid && a.consumed == b.consumed && a.tor == b.tor,
            (None, None) => true,
            _ => false,
        };
        let money = match (&self.monetary, &other.monetary) {
            (Some(a), Some(b)) => a.uuid == b.uuid && a.consumed == b.consumed,
            (None, None) => true,
            _ => false,
        };
        units && money && self.account_id == other.account_id
    }
}

fn one() -> u32 {
    1
}

/// Smallest billable unit of a time span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Increment {
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    pub cost: Decimal,
    #[serde(default)]
    pub debit_info: DebitInfo,
    #[serde(default = "one")]
    pub compress_factor: u32,
}

impl Increment {
    pub fn new(duration: Duration, cost: Decimal) -> Self {
        Self {
            duration,
            cost,
            debit_info: DebitInfo::default(),
            compress_factor: 1,
        }
    }

    /// Equal except for running balance values and repeat count
    pub fn same_unit(&self, other: &Increment) -> bool {
        self.duration == other.duration
            && self.cost == other.cost
            && self.debit_info.same_payers(&other.debit_info)
    }

    pub fn factor(&self) -> u32 {
        self.compress_factor.max(1)
    }

    pub fn total_cost(&self) -> Decimal {
        self.cost * Decimal::from(self.factor())
    }

    pub fn total_duration(&self) -> Duration {
        utils::times(self.duration, i64::from(self.factor()))
    }
}

/// Ordered increments of one time span
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Increments(pub Vec<Increment>);

impl Deref for Increments {
    type Target = Vec<Increment>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Increments {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Increment>> for Increments {
    fn from(increments: Vec<Increment>) -> Self {
        Self(increments)
    }
}

impl Increments {
    /// Collapse runs of equal increments into one entry with a repeat count.
    ///
    /// The kept entry carries the balance values of the last increment of
    /// its run.
    pub fn compress(&mut self) {
        let mut compressed: Vec<Increment> = Vec::with_capacity(self.0.len());
        for inc in self.0.drain(..) {
            match compressed.last_mut() {
                Some(last) if last.same_unit(&inc) => {
                    last.compress_factor = last.factor() + inc.factor();
                    if let (Some(kept), Some(next)) =
                        (last.debit_info.monetary.as_mut(), inc.debit_info.monetary)
                    {
                        kept.value = next.value;
                    }
                    if let (Some(kept), Some(next)) =
                        (last.debit_info.unit.as_mut(), inc.debit_info.unit)
                    {
                        kept.value = next.value;
                    }
                }
                _ => compressed.push(inc),
            }
        }
        self.0 = compressed;
    }

    /// Expand every repeat count back into literal increments, restoring the
    /// balance value each one left behind.
    pub fn decompress(&mut self) {
        let mut expanded = Vec::with_capacity(self.length());
        for inc in self.0.drain(..) {
            let factor = inc.factor();
            for i in 0..factor {
                let mut literal = inc.clone();
                literal.compress_factor = 1;
                let remaining = Decimal::from(factor - (i + 1));
                if let Some(monetary) = literal.debit_info.monetary.as_mut() {
                    monetary.value += remaining * monetary.consumed;
                }
                if let Some(unit) = literal.debit_info.unit.as_mut() {
                    unit.value += remaining * unit.consumed;
                }
                expanded.push(literal);
            }
        }
        self.0 = expanded;
    }

    /// Number of literal increments
    pub fn length(&self) -> usize {
        self.0.iter().map(|inc| inc.factor() as usize).sum()
    }

    pub fn total_cost(&self) -> Decimal {
        self.0.iter().map(Increment::total_cost).sum()
    }

    pub fn total_duration(&self) -> Duration {
        self.0
            .iter()
            .fold(Duration::zero(), |acc, inc| acc + inc.total_duration())
    }

    /// Run signature ignoring repeat counts, used to decide span merges
    pub fn signature(&self) -> Vec<&Increment> {
        let mut runs: Vec<&Increment> = Vec::new();
        for inc in &self.0 {
            if !runs.last().is_some_and(|last| last.same_unit(inc)) {
                runs.push(inc);
            }
        }
        runs
    }

    pub fn same_signature(&self, other: &Increments) -> bool {
        let (a, b) = (self.signature(), other.signature());
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_unit(y))
    }
}
