use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{KinshipError, Result};
use crate::types::{AnimalId, Sex};

use super::kinship::KinshipEngine;
use super::lineage::{ancestors, descendants, Lineage};
use super::mating::{to_percent, RiskLevel, RiskPolicy};
use super::pedigree::Pedigree;

/// Depth used when counting known ancestors and descendants.
pub const REPORT_GENERATIONS: usize = 5;

/// Depth searched for ancestors shared by the parents.
pub const COMMON_ANCESTOR_GENERATIONS: usize = 10;

/// Inbreeding summary for one recorded animal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimalRiskReport {
    pub animal_id: AnimalId,
    pub sex: Sex,
    pub sire_id: Option<AnimalId>,
    pub dam_id: Option<AnimalId>,
    pub inbreeding: f64,
    pub inbreeding_pct: f64,
    pub risk: RiskLevel,
    /// Animals the sire and dam both descend from (or are).
    pub parental_common_ancestors: Vec<AnimalId>,
    pub known_ancestors: usize,
    pub known_descendants: usize,
}

/// An animal together with its ancestors, up to `max_generations` back.
fn lineage_members(
    pedigree: &Pedigree,
    id: AnimalId,
    max_generations: usize,
) -> Result<BTreeSet<AnimalId>> {
    let mut members: BTreeSet<AnimalId> = ancestors(pedigree, id, max_generations)?
        .into_values()
        .flatten()
        .collect();
    if pedigree.contains(id) {
        members.insert(id);
    }
    Ok(members)
}

fn distinct_count(lineage: Lineage) -> usize {
    lineage.into_values().flatten().collect::<BTreeSet<_>>().len()
}

/// Describe how inbred `id` is and where the inbreeding comes from.
///
/// # Errors
/// Returns [`KinshipError::PedigreeNotLoaded`] for an empty pedigree and
/// [`KinshipError::AnimalNotFound`] if `id` has no record.
pub fn analyze_animal(
    engine: &mut KinshipEngine,
    id: AnimalId,
    policy: &RiskPolicy,
) -> Result<AnimalRiskReport> {
    let pedigree = engine.shared_pedigree();
    if pedigree.is_empty() {
        return Err(KinshipError::PedigreeNotLoaded);
    }
    let entry = pedigree.get(id).ok_or(KinshipError::AnimalNotFound(id))?;

    let inbreeding = engine.inbreeding(id);

    let parental_common_ancestors = match (entry.sire_id, entry.dam_id) {
        (Some(sire), Some(dam)) => {
            let sire_side = lineage_members(&pedigree, sire, COMMON_ANCESTOR_GENERATIONS)?;
            let dam_side = lineage_members(&pedigree, dam, COMMON_ANCESTOR_GENERATIONS)?;
            sire_side.intersection(&dam_side).copied().collect()
        }
        _ => Vec::new(),
    };

    Ok(AnimalRiskReport {
        animal_id: id,
        sex: entry.sex,
        sire_id: entry.sire_id,
        dam_id: entry.dam_id,
        inbreeding,
        inbreeding_pct: to_percent(inbreeding),
        risk: policy.classify(inbreeding),
        parental_common_ancestors,
        known_ancestors: distinct_count(ancestors(&pedigree, id, REPORT_GENERATIONS)?),
        known_descendants: distinct_count(descendants(&pedigree, id, REPORT_GENERATIONS)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetics::pedigree::PedigreeEntry;

    fn backcross() -> KinshipEngine {
        KinshipEngine::from(
            Pedigree::build(vec![
                PedigreeEntry::founder(1, Sex::Male),
                PedigreeEntry::founder(2, Sex::Female),
                PedigreeEntry::new(3, Some(1), Some(2), Sex::Female),
                PedigreeEntry::new(4, Some(1), Some(3), Sex::Male),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_backcross_report() {
        let mut eng = backcross();
        let report = analyze_animal(&mut eng, 4, &RiskPolicy::default()).unwrap();
        assert_eq!(report.inbreeding_pct, 25.0);
        assert_eq!(report.risk, RiskLevel::Severe);
        assert_eq!(report.parental_common_ancestors, vec![1]);
        assert_eq!(report.known_ancestors, 3);
        assert_eq!(report.known_descendants, 0);
    }

    #[test]
    fn test_founder_report() {
        let mut eng = backcross();
        let report = analyze_animal(&mut eng, 1, &RiskPolicy::default()).unwrap();
        assert_eq!(report.inbreeding, 0.0);
        assert_eq!(report.risk, RiskLevel::Low);
        assert!(report.parental_common_ancestors.is_empty());
        assert_eq!(report.known_descendants, 2);
    }

    #[test]
    fn test_report_errors() {
        let mut eng = backcross();
        assert!(matches!(
            analyze_animal(&mut eng, 77, &RiskPolicy::default()),
            Err(KinshipError::AnimalNotFound(77))
        ));
        let mut empty = KinshipEngine::from(Pedigree::new());
        assert!(matches!(
            analyze_animal(&mut empty, 1, &RiskPolicy::default()),
            Err(KinshipError::PedigreeNotLoaded)
        ));
    }
}
