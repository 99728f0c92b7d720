use sha2::{
    Digest,
    Sha256,
};
use std::fmt;

pub mod chain;

pub mod client;

pub mod deployment;

pub mod discovery;

pub mod errors;

pub mod events;

pub mod network;

pub mod provider;

pub mod test_helpers;

pub mod tracker;

pub mod ui;

pub mod wallets;

/// Hashed form of an answer, submitted in place of the plaintext so the
/// answer is never readable on the public ledger before verification.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnswerCommitment([u8; 32]);

impl AnswerCommitment {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AnswerCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AnswerCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Canonical form of an answer: trimmed, lower-cased, inner whitespace
/// collapsed. Creation and guessing must agree on this or no guess would
/// ever match its commitment.
pub fn normalize_answer(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn commit_answer(raw: &str) -> AnswerCommitment {
    let mut hasher = Sha256::new();
    hasher.update(normalize_answer(raw).as_bytes());
    AnswerCommitment(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn normalize_answer__collapses_case_and_whitespace() {
        assert_eq!(normalize_answer("  A  Piano \t"), "a piano");
    }

    #[test]
    fn commit_answer__equal_for_equivalent_answers() {
        assert_eq!(commit_answer("A Piano"), commit_answer(" a  piano "));
    }

    #[test]
    fn commit_answer__differs_for_different_answers() {
        assert_ne!(commit_answer("a piano"), commit_answer("a harp"));
    }
}
