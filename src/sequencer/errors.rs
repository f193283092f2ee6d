//! Provider/contract error classification
//!
//! Raw error text is matched case-insensitively against an ordered substring
//! table; the first hit wins. Anything unmatched is shown verbatim.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    UserRejected,
    AlreadyVoted,
    NftAttached,
    LockNotExpired,
    LockExpired,
    InsufficientLiquidity,
    SlippageExceeded,
    DeadlineExpired,
    InsufficientBalance,
    InsufficientAllowance,
    InsufficientGasFunds,
    NonceConflict,
    RpcDegraded,
    Reverted,
    Unmapped,
}

/// Lower-case needle → category. Specific contract messages come before the
/// generic "expired"/"reverted" catch-alls.
const RULES: &[(&str, ErrorCategory)] = &[
    ("user rejected", ErrorCategory::UserRejected),
    ("user denied", ErrorCategory::UserRejected),
    ("action_rejected", ErrorCategory::UserRejected),
    ("already voted", ErrorCategory::AlreadyVoted),
    ("already_voted", ErrorCategory::AlreadyVoted),
    ("alreadyvotedordeposited", ErrorCategory::AlreadyVoted),
    ("attached", ErrorCategory::NftAttached),
    ("didn't expire", ErrorCategory::LockNotExpired),
    ("did not expire", ErrorCategory::LockNotExpired),
    ("expired lock", ErrorCategory::LockExpired),
    ("lock expired", ErrorCategory::LockExpired),
    ("insufficient_liquidity", ErrorCategory::InsufficientLiquidity),
    ("insufficientliquidity", ErrorCategory::InsufficientLiquidity),
    ("insufficient liquidity", ErrorCategory::InsufficientLiquidity),
    ("insufficient_output_amount", ErrorCategory::SlippageExceeded),
    ("insufficient_a_amount", ErrorCategory::SlippageExceeded),
    ("insufficient_b_amount", ErrorCategory::SlippageExceeded),
    ("expired", ErrorCategory::DeadlineExpired),
    ("transfer amount exceeds balance", ErrorCategory::InsufficientBalance),
    ("insufficient balance", ErrorCategory::InsufficientBalance),
    ("transfer amount exceeds allowance", ErrorCategory::InsufficientAllowance),
    ("insufficient allowance", ErrorCategory::InsufficientAllowance),
    ("insufficient funds", ErrorCategory::InsufficientGasFunds),
    ("nonce too low", ErrorCategory::NonceConflict),
    ("replacement transaction underpriced", ErrorCategory::NonceConflict),
    ("header not found", ErrorCategory::RpcDegraded),
    ("missing trie node", ErrorCategory::RpcDegraded),
    ("internal json-rpc error", ErrorCategory::RpcDegraded),
    ("error sending request", ErrorCategory::RpcDegraded),
    ("connection", ErrorCategory::RpcDegraded),
    ("timeout", ErrorCategory::RpcDegraded),
    ("timed out", ErrorCategory::RpcDegraded),
    ("rate limit", ErrorCategory::RpcDegraded),
    ("too many requests", ErrorCategory::RpcDegraded),
    ("429", ErrorCategory::RpcDegraded),
    ("execution reverted", ErrorCategory::Reverted),
    ("reverted", ErrorCategory::Reverted),
];

impl ErrorCategory {
    /// User-facing text; `None` for `Unmapped`, whose raw text is shown instead
    pub fn message(&self) -> Option<&'static str> {
        let msg = match self {
            ErrorCategory::UserRejected => "Transaction rejected in wallet",
            ErrorCategory::AlreadyVoted => "This veNFT already voted this epoch, try again next epoch",
            ErrorCategory::NftAttached => "veNFT is attached or has active votes, reset votes first",
            ErrorCategory::LockNotExpired => "Lock has not expired yet",
            ErrorCategory::LockExpired => "Lock has expired, withdraw it instead",
            ErrorCategory::InsufficientLiquidity => "Insufficient pool liquidity",
            ErrorCategory::SlippageExceeded => "Price moved beyond slippage tolerance",
            ErrorCategory::DeadlineExpired => "Transaction deadline passed, try again",
            ErrorCategory::InsufficientBalance => "Insufficient token balance",
            ErrorCategory::InsufficientAllowance => "Token allowance too low, approve again",
            ErrorCategory::InsufficientGasFunds => "Not enough native balance to pay for gas",
            ErrorCategory::NonceConflict => "Nonce conflict with a pending transaction",
            ErrorCategory::RpcDegraded => "RPC degraded, switch network/RPC",
            ErrorCategory::Reverted => "Transaction would revert",
            ErrorCategory::Unmapped => return None,
        };
        Some(msg)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// First matching category for `raw`, `Unmapped` if none
pub fn classify(raw: &str) -> ErrorCategory {
    let haystack = raw.to_lowercase();
    RULES
        .iter()
        .find(|(needle, _)| haystack.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Unmapped)
}

/// Classified message for display, or `raw` verbatim when unmapped
pub fn user_message(raw: &str) -> String {
    match classify(raw).message() {
        Some(msg) => msg.to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_messages() {
        let cases = [
            ("MetaMask Tx Signature: User denied transaction signature.", ErrorCategory::UserRejected),
            ("user rejected transaction", ErrorCategory::UserRejected),
            ("execution reverted: TOKEN_ALREADY_VOTED_THIS_EPOCH", ErrorCategory::AlreadyVoted),
            ("execution reverted: attached", ErrorCategory::NftAttached),
            ("execution reverted: The lock didn't expire", ErrorCategory::LockNotExpired),
            ("execution reverted: Cannot add to expired lock. Withdraw", ErrorCategory::LockExpired),
            ("execution reverted: BaseV1Router: INSUFFICIENT_OUTPUT_AMOUNT", ErrorCategory::SlippageExceeded),
            ("execution reverted: BaseV1: INSUFFICIENT_LIQUIDITY_MINTED", ErrorCategory::InsufficientLiquidity),
            ("execution reverted: BaseV1Router: EXPIRED", ErrorCategory::DeadlineExpired),
            ("insufficient funds for gas * price + value", ErrorCategory::InsufficientGasFunds),
            ("nonce too low", ErrorCategory::NonceConflict),
            ("header not found", ErrorCategory::RpcDegraded),
            ("HTTP error 429 Too Many Requests", ErrorCategory::RpcDegraded),
            ("timeout: transaction 0xab not included after 120 polls", ErrorCategory::RpcDegraded),
            ("execution reverted", ErrorCategory::Reverted),
        ];
        for (raw, expected) in cases {
            assert_eq!(classify(raw), expected, "{}", raw);
        }
    }

    #[test]
    fn test_first_rule_wins() {
        // contains both "already voted" and "execution reverted"
        assert_eq!(
            classify("execution reverted: already voted"),
            ErrorCategory::AlreadyVoted
        );
        // lock-specific text before the generic deadline rule
        assert_eq!(classify("Lock expired"), ErrorCategory::LockExpired);
    }

    #[test]
    fn test_unmapped_passes_through_verbatim() {
        let raw = "something odd happened: 0xdeadbeef";
        assert_eq!(classify(raw), ErrorCategory::Unmapped);
        assert_eq!(user_message(raw), raw);
    }

    #[test]
    fn test_rpc_degraded_message() {
        assert_eq!(
            user_message("error sending request for url (https://rpc): connection closed"),
            "RPC degraded, switch network/RPC"
        );
    }
}
