// Genetics module
// Pedigree, Wright coancestry/inbreeding, mating screening, lineage queries

pub mod analysis;
pub mod kinship;
pub mod lineage;
pub mod mating;
pub mod pedigree;

pub use analysis::{analyze_animal, AnimalRiskReport};
pub use kinship::{EngineStats, KinshipEngine};
pub use lineage::{ancestors, common_ancestors, descendants, GenerationLabel, LineRole, Lineage};
pub use mating::{
    find_compatible_mates, simulate_mating, to_percent, CompatibleMate, MatingResult, RiskLevel,
    RiskPolicy,
};
pub use pedigree::{Pedigree, PedigreeEntry};
