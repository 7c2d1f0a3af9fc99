use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{KinshipError, Result};
use crate::types::AnimalId;

use super::pedigree::Pedigree;

/// Which link a lineage entry was reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LineRole {
    Sire,
    Dam,
    Offspring,
}

/// Key of a lineage map, shown as `generation_<n>_<role>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationLabel {
    pub generation: usize,
    pub role: LineRole,
}

impl fmt::Display for GenerationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            LineRole::Sire => "sire",
            LineRole::Dam => "dam",
            LineRole::Offspring => "offspring",
        };
        write!(f, "generation_{}_{}", self.generation, role)
    }
}

impl Serialize for GenerationLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Animals grouped by generation and role, nearest generation first.
pub type Lineage = BTreeMap<GenerationLabel, Vec<AnimalId>>;

fn check_generations(max_generations: usize) -> Result<()> {
    if max_generations == 0 {
        return Err(KinshipError::InvalidArgument(
            "max_generations must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Breadth-first walk up sire and dam links, at most `max_generations` deep.
///
/// An ancestor reached along several paths is listed under each generation it
/// appears in but expanded only once. Unknown ids yield an empty map.
///
/// # Errors
/// Returns [`KinshipError::InvalidArgument`] if `max_generations` is 0.
pub fn ancestors(pedigree: &Pedigree, id: AnimalId, max_generations: usize) -> Result<Lineage> {
    check_generations(max_generations)?;
    let mut lineage = Lineage::new();
    let Some(start) = pedigree.index_of(id) else {
        return Ok(lineage);
    };

    let mut visited = vec![false; pedigree.len()];
    let mut queue = VecDeque::from([(start, 0usize)]);

    while let Some((idx, generation)) = queue.pop_front() {
        if generation >= max_generations || visited[idx] {
            continue;
        }
        visited[idx] = true;

        let parents = [
            (LineRole::Sire, pedigree.sire(idx)),
            (LineRole::Dam, pedigree.dam(idx)),
        ];
        for (role, parent) in parents {
            if let Some(p) = parent {
                let label = GenerationLabel {
                    generation: generation + 1,
                    role,
                };
                lineage.entry(label).or_default().push(pedigree.id_at(p));
                queue.push_back((p, generation + 1));
            }
        }
    }

    Ok(lineage)
}

/// Breadth-first walk down the offspring index, at most `max_generations`
/// deep. Unknown ids yield an empty map.
///
/// # Errors
/// Returns [`KinshipError::InvalidArgument`] if `max_generations` is 0.
pub fn descendants(pedigree: &Pedigree, id: AnimalId, max_generations: usize) -> Result<Lineage> {
    check_generations(max_generations)?;
    let mut lineage = Lineage::new();
    let Some(start) = pedigree.index_of(id) else {
        return Ok(lineage);
    };

    let mut visited = vec![false; pedigree.len()];
    let mut queue = VecDeque::from([(start, 0usize)]);

    while let Some((idx, generation)) = queue.pop_front() {
        if generation >= max_generations || visited[idx] {
            continue;
        }
        visited[idx] = true;

        for &child in pedigree.children_of(idx) {
            let label = GenerationLabel {
                generation: generation + 1,
                role: LineRole::Offspring,
            };
            lineage.entry(label).or_default().push(pedigree.id_at(child));
            queue.push_back((child, generation + 1));
        }
    }

    Ok(lineage)
}

fn ancestor_set(
    pedigree: &Pedigree,
    id: AnimalId,
    max_generations: usize,
) -> Result<BTreeSet<AnimalId>> {
    Ok(ancestors(pedigree, id, max_generations)?
        .into_values()
        .flatten()
        .collect())
}

/// Animals that are ancestors of both `a` and `b` within `max_generations`.
///
/// # Errors
/// Returns [`KinshipError::InvalidArgument`] if `max_generations` is 0.
pub fn common_ancestors(
    pedigree: &Pedigree,
    a: AnimalId,
    b: AnimalId,
    max_generations: usize,
) -> Result<BTreeSet<AnimalId>> {
    let left = ancestor_set(pedigree, a, max_generations)?;
    let right = ancestor_set(pedigree, b, max_generations)?;
    Ok(left.intersection(&right).copied().collect())
}
