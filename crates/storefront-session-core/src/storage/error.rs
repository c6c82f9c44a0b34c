use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{tier} storage unavailable for slot {key}: {source}")]
    Unavailable {
        tier: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode session user: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StorageError {
    pub fn unavailable(tier: &'static str, key: &str, source: std::io::Error) -> Self {
        StorageError::Unavailable {
            tier,
            key: key.to_string(),
            source,
        }
    }

    /// Name of the tier that failed, if the failure came from a tier
    pub fn tier(&self) -> Option<&'static str> {
        match self {
            StorageError::Unavailable { tier, .. } => Some(tier),
            StorageError::Encode(_) => None,
        }
    }
}
