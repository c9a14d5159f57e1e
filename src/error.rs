use std::fmt;

/// Fatal failures the engine cannot route around a single drop or tile.
///
/// Everything recoverable (out-of-bounds lookups, flood divergence) is
/// handled with `Option`/counters at the call site instead of this type.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    PoolExhausted { requested: usize, available: usize },
    InvalidSeed { raw: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::PoolExhausted { requested, available } => write!(
                f,
                "cell pool exhausted: requested {} cells, {} available",
                requested, available
            ),
            EngineError::InvalidSeed { raw } => {
                write!(f, "invalid seed '{}': not an integer", raw)
            }
        }
    }
}

impl std::error::Error for EngineError {}
