use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KinshipError, Result};
use crate::types::{AnimalId, Sex};

use super::kinship::KinshipEngine;

/// Cut points on offspring inbreeding that separate the risk bands.
///
/// - `Low`:    F < `high_threshold`
/// - `High`:   `high_threshold` <= F < `severe_threshold`
/// - `Severe`: F >= `severe_threshold`
///
/// The defaults are 1/16 and 1/8, the inbreeding of offspring from
/// first-cousin and half-sibling matings respectively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub high_threshold: f64,
    pub severe_threshold: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            high_threshold: 0.0625,
            severe_threshold: 0.125,
        }
    }
}

impl RiskPolicy {
    /// Create a validated policy.
    pub fn new(high_threshold: f64, severe_threshold: f64) -> Result<Self> {
        let policy = Self {
            high_threshold,
            severe_threshold,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Load a policy from a JSON object such as
    /// `{"high_threshold": 0.03125, "severe_threshold": 0.0625}`.
    /// Missing fields take their default value.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let policy: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        policy.validate()?;
        Ok(policy)
    }

    /// # Errors
    /// Thresholds must lie in [0, 1] with `high_threshold <= severe_threshold`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("high_threshold", self.high_threshold),
            ("severe_threshold", self.severe_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(KinshipError::InvalidArgument(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.high_threshold > self.severe_threshold {
            return Err(KinshipError::InvalidArgument(format!(
                "high_threshold ({}) exceeds severe_threshold ({})",
                self.high_threshold, self.severe_threshold
            )));
        }
        Ok(())
    }

    pub fn classify(&self, inbreeding: f64) -> RiskLevel {
        if inbreeding >= self.severe_threshold {
            RiskLevel::Severe
        } else if inbreeding >= self.high_threshold {
            RiskLevel::High
        } else {
            RiskLevel::Low
        }
    }
}

/// Inbreeding risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    High,
    Severe,
}

impl RiskLevel {
    pub fn recommendation(self) -> &'static str {
        match self {
            RiskLevel::Low => "Safe mating: low genetic risk",
            RiskLevel::High => "Mate with caution: monitor the offspring",
            RiskLevel::Severe => "Avoid this mating: elevated genetic risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::High => "high",
            RiskLevel::Severe => "severe",
        };
        f.write_str(label)
    }
}

/// Outcome of a simulated mating. Percentages are rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatingResult {
    pub sire_id: AnimalId,
    pub dam_id: AnimalId,
    pub sire_inbreeding_pct: f64,
    pub dam_inbreeding_pct: f64,
    /// Additive relationship between the parents.
    pub relationship_pct: f64,
    pub offspring_inbreeding_pct: f64,
    /// Unrounded offspring inbreeding, as a fraction.
    pub offspring_inbreeding: f64,
    pub risk: RiskLevel,
    pub recommendation: String,
}

/// A candidate that passed the offspring-inbreeding limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibleMate {
    pub candidate_id: AnimalId,
    pub offspring_inbreeding: f64,
    pub offspring_inbreeding_pct: f64,
    pub relationship_pct: f64,
    pub risk: RiskLevel,
    pub recommendation: String,
}

/// Convert a fraction to a percentage rounded to 2 decimals.
pub fn to_percent(fraction: f64) -> f64 {
    (fraction * 10_000.0).round() / 100.0
}

/// Predict inbreeding of the offspring of `sire_id` x `dam_id`.
///
/// The offspring inbreeding is the coancestry of the two parents. Ids missing
/// from the pedigree are treated as unrelated founders.
///
/// # Errors
/// Returns [`KinshipError::PedigreeNotLoaded`] if the pedigree is empty.
pub fn simulate_mating(
    engine: &mut KinshipEngine,
    sire_id: AnimalId,
    dam_id: AnimalId,
    policy: &RiskPolicy,
) -> Result<MatingResult> {
    if engine.pedigree().is_empty() {
        return Err(KinshipError::PedigreeNotLoaded);
    }

    let sire_inbreeding = engine.inbreeding(sire_id);
    let dam_inbreeding = engine.inbreeding(dam_id);
    let offspring_inbreeding = engine.coancestry(sire_id, dam_id);
    let risk = policy.classify(offspring_inbreeding);

    Ok(MatingResult {
        sire_id,
        dam_id,
        sire_inbreeding_pct: to_percent(sire_inbreeding),
        dam_inbreeding_pct: to_percent(dam_inbreeding),
        relationship_pct: to_percent(2.0 * offspring_inbreeding),
        offspring_inbreeding_pct: to_percent(offspring_inbreeding),
        offspring_inbreeding,
        risk,
        recommendation: risk.recommendation().to_string(),
    })
}

/// Screen `candidate_pool` as mates for `target_id`.
///
/// Keeps candidates whose offspring inbreeding is at most
/// `max_offspring_inbreeding_pct` percent (inclusive), ordered by offspring
/// inbreeding and then by id. The target itself and repeated ids are
/// skipped. A female target is placed as dam, anything else as sire.
///
/// # Errors
/// Returns [`KinshipError::InvalidArgument`] if the limit is outside
/// [0, 100], and [`KinshipError::PedigreeNotLoaded`] if the pedigree is empty.
pub fn find_compatible_mates(
    engine: &mut KinshipEngine,
    target_id: AnimalId,
    candidate_pool: &[AnimalId],
    max_offspring_inbreeding_pct: f64,
    policy: &RiskPolicy,
) -> Result<Vec<CompatibleMate>> {
    if !(0.0..=100.0).contains(&max_offspring_inbreeding_pct) {
        return Err(KinshipError::InvalidArgument(format!(
            "max offspring inbreeding must be a percentage within [0, 100], got {}",
            max_offspring_inbreeding_pct
        )));
    }
    if engine.pedigree().is_empty() {
        return Err(KinshipError::PedigreeNotLoaded);
    }

    let limit = max_offspring_inbreeding_pct / 100.0;
    let target_is_dam = engine
        .pedigree()
        .get(target_id)
        .is_some_and(|e| e.sex == Sex::Female);

    let mut seen = HashSet::new();
    let mut mates = Vec::new();

    for &candidate in candidate_pool {
        if candidate == target_id || !seen.insert(candidate) {
            continue;
        }
        let (sire, dam) = if target_is_dam {
            (candidate, target_id)
        } else {
            (target_id, candidate)
        };
        let result = simulate_mating(engine, sire, dam, policy)?;
        if result.offspring_inbreeding <= limit {
            mates.push(CompatibleMate {
                candidate_id: candidate,
                offspring_inbreeding: result.offspring_inbreeding,
                offspring_inbreeding_pct: result.offspring_inbreeding_pct,
                relationship_pct: result.relationship_pct,
                risk: result.risk,
                recommendation: result.recommendation,
            });
        }
    }

    mates.sort_by(|a, b| {
        a.offspring_inbreeding
            .total_cmp(&b.offspring_inbreeding)
            .then(a.candidate_id.cmp(&b.candidate_id))
    });

    log::debug!(
        "{} of {} candidates compatible with animal {} at {}%",
        mates.len(),
        seen.len(),
        target_id,
        max_offspring_inbreeding_pct
    );

    Ok(mates)
}
