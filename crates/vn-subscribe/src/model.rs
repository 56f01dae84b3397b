use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubsError {
    #[error("fetch error: {0}")]
    Fetch(String),
    /// Zero valid nodes is a failure, not a partial result.
    #[error("no valid nodes in subscription payload ({dropped} entries dropped)")]
    NoValidNodes { dropped: usize },
}

impl From<SubsError> for vn_core::Error {
    fn from(e: SubsError) -> Self {
        match e {
            SubsError::Fetch(msg) => vn_core::Error::Fetch(msg),
            SubsError::NoValidNodes { dropped } => vn_core::Error::Parse {
                msg: "no valid nodes".to_string(),
                dropped,
            },
        }
    }
}
