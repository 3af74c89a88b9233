use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A linear textual encoding of a molecule, e.g. a SMILES string.
///
/// The string is kept verbatim; all fingerprints are derived from it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureString(String);

impl StructureString {
    pub fn new(value: impl Into<String>) -> Self {
        StructureString(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for StructureString {
    fn from(value: &str) -> Self {
        StructureString::new(value)
    }
}

impl From<String> for StructureString {
    fn from(value: String) -> Self {
        StructureString(value)
    }
}

impl AsRef<str> for StructureString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for StructureString {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
