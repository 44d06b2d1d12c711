use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Insertion coordinate outside the grid")]
    OutOfBounds,
    #[error("Inserted value cannot be negative")]
    NegativeValue,
    #[error("Persisted board snapshot is malformed")]
    BadSnapshot,
}

pub type Result<T> = core::result::Result<T, GameError>;
