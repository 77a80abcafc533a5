use containers::Bytes32;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block {root} is not saved; it cannot become the chain head")]
    BlockNotFound { root: Bytes32 },
    #[error("no {kind} block saved")]
    NoneSaved { kind: &'static str },
    #[error("chain head has not been initialized")]
    NoChainHead,
    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type Result<T, E = StoreError> = core::result::Result<T, E>;
