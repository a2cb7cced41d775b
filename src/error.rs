use thiserror::Error;

/// Errors raised while building a simulation from external data.
///
/// The simulation tick itself never fails; only loading a scenario and
/// validating a road map can.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed scenario: {0}")]
    Json(#[from] serde_json::Error),

    #[error("road map has no tiles")]
    EmptyMap,

    #[error("road map row {row} has {got} tiles, expected {expected}")]
    RaggedMap {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("unknown tile code {code} at ({col}, {row})")]
    UnknownTileCode { col: usize, row: usize, code: i32 },
}

pub type Result<T> = std::result::Result<T, Error>;
