pub mod error;
pub mod genetics;
pub mod types;

pub use error::{KinshipError, Result};
pub use types::{AnimalId, Sex};
