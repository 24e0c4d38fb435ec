use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Property performance bucket.
///
/// Variants are declared in escalating risk order, so `Ord` doubles as the
/// tie-break priority: when two categories are equally common, the riskier
/// one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Promote,
    Intervention,
    AtRisk,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Promote, Category::Intervention, Category::AtRisk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Promote => "promote",
            Category::Intervention => "intervention",
            Category::AtRisk => "at_risk",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "promote" => Ok(Category::Promote),
            "intervention" => Ok(Category::Intervention),
            "at_risk" => Ok(Category::AtRisk),
            other => Err(format!("unknown category {:?}", other)),
        }
    }
}
