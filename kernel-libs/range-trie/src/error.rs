use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeTrieError {
    #[error("range has zero length")]
    EmptyRange,
}
