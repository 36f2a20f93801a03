use ethers::{contract::ContractError, providers::Middleware};
use memoria_utils::retry::{Classify, RetryClass};

pub type ChainResult<T> = Result<T, ChainError>;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainError {
    /// The call reached the contract and failed there: a revert, a selector
    /// the contract does not have, or a return value that does not decode.
    #[error("contract call {function} failed: {message}")]
    ContractRead {
        function: &'static str,
        message: String,
    },

    #[error("network error calling {function}: {message}")]
    TransientNetwork {
        function: &'static str,
        message: String,
    },

    #[error("transaction {function} rejected: {message}")]
    WriteRejected {
        function: &'static str,
        message: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ChainError {
    pub fn write_rejected(function: &'static str, message: impl ToString) -> Self {
        ChainError::WriteRejected {
            function,
            message: message.to_string(),
        }
    }

    /// Identifies failed reads that can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::TransientNetwork { .. })
    }
}

impl Classify for ChainError {
    fn retry_class(&self) -> RetryClass {
        if self.is_retryable() {
            RetryClass::Transient
        } else {
            RetryClass::Permanent
        }
    }
}

const CONTRACT_FAILURE_MARKERS: &[&str] = &[
    "revert",
    "invalid opcode",
    "function selector",
    "invalid jump",
    "out of gas",
];

/// True when a node error message describes an execution failure rather
/// than a transport problem.
pub fn is_contract_failure_message(message: &str) -> bool {
    let message = message.to_lowercase();
    CONTRACT_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Classifies a failed view call.
pub fn classify_read_error<M: Middleware>(
    function: &'static str,
    err: ContractError<M>,
) -> ChainError {
    let message = err.to_string();
    let transient = match &err {
        ContractError::MiddlewareError { .. } | ContractError::ProviderError { .. } => {
            !is_contract_failure_message(&message)
        }
        _ => false,
    };
    if transient && !err.is_revert() {
        ChainError::TransientNetwork { function, message }
    } else {
        ChainError::ContractRead { function, message }
    }
}
