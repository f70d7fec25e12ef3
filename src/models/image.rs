use serde::{Deserialize, Serialize};

/// A stored image: file name plus the public URL it is served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    pub url: String,
}

impl Image {
    /// Matches either the file name or the full URL.
    pub fn is_referenced_by(&self, reference: &str) -> bool {
        self.name == reference || self.url == reference
    }
}
