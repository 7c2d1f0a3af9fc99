use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KinshipError;

/// Animal identifier. Always positive; `0` is reserved for "unknown parent"
/// in flat-file input and never names an animal.
pub type AnimalId = u64;

/// Sex of an animal. Only consulted when assembling mate pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// The sex a mate must have.
    pub fn opposite(self) -> Self {
        match self {
            Sex::Male => Sex::Female,
            Sex::Female => Sex::Male,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => write!(f, "M"),
            Sex::Female => write!(f, "F"),
        }
    }
}

impl FromStr for Sex {
    type Err = KinshipError;

    /// Accepts `M`/`male` and `F`/`female`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("m") || trimmed.eq_ignore_ascii_case("male") {
            Ok(Sex::Male)
        } else if trimmed.eq_ignore_ascii_case("f") || trimmed.eq_ignore_ascii_case("female") {
            Ok(Sex::Female)
        } else {
            Err(KinshipError::Pedigree(format!("Unrecognised sex code: '{}'", s)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sex_codes() {
        assert_eq!("M".parse::<Sex>().unwrap(), Sex::Male);
        assert_eq!("female".parse::<Sex>().unwrap(), Sex::Female);
        assert_eq!(" f ".parse::<Sex>().unwrap(), Sex::Female);
        assert!("X".parse::<Sex>().is_err());
    }

    #[test]
    fn test_opposite() {
        assert_eq!(Sex::Male.opposite(), Sex::Female);
        assert_eq!(Sex::Female.opposite(), Sex::Male);
    }
}
