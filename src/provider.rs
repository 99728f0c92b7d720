use crate::AnswerCommitment;
use serde::Serialize;
use std::{
    fmt,
    future::Future,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

/// A 20-byte account or contract identity, rendered as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn from_hex(raw: &str) -> Result<Self, RpcError> {
        let stripped = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(stripped)
            .map_err(|e| RpcError::new(format!("invalid address {raw:?}: {e}")))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| RpcError::new(format!("invalid address length in {raw:?}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Handle of a submitted transaction, rendered as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Network identifier as reported by the wallet (decimal chain id).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChainId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw failure shape of the wallet/ledger call layer. Depending on where a
/// call dies the useful text lives in a structured provider field or only
/// inside the stringified error, so both are carried; `errors::classify`
/// turns this into something the session may store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub code: Option<i64>,
    pub data_message: Option<String>,
    pub message: String,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            data_message: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            data_message: None,
            message: message.into(),
        }
    }

    pub fn with_data(message: impl Into<String>, data_message: impl Into<String>) -> Self {
        Self {
            code: None,
            data_message: Some(data_message.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RpcError {}

/// Ledger status of a finalized transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failure,
}

/// A state-changing call accepted by the wallet: the handle identifies the
/// in-flight transaction, `finalized` resolves once it is included.
pub struct PendingCall {
    pub tx_hash: TxHash,
    pub finalized: oneshot::Receiver<TxStatus>,
}

/// Notifications pushed by the wallet for the lifetime of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Option<Address>),
    NetworkChanged(ChainId),
}

/// Notifications pushed by one quiz instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuizEvent {
    Funded(u64),
    AnsweredCorrectly,
    AnsweredIncorrectly,
}

/// The wallet side of the session: account access, the current network,
/// balances, and the standing account/network notification stream.
pub trait WalletProvider: Clone + Send + Sync + 'static {
    fn request_access(&self) -> impl Future<Output = Result<Address, RpcError>> + Send;

    fn network(&self) -> impl Future<Output = Result<ChainId, RpcError>> + Send;

    fn get_balance(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<WalletEvent>;
}

/// One remote quiz instance: reads, state-changing submissions, and the
/// push-event stream. A handle is owned by at most one `QuizView`.
pub trait QuizInstance: Clone + Send + Sync + 'static {
    fn address(&self) -> Address;

    fn question(&self) -> impl Future<Output = Result<String, RpcError>> + Send;

    fn solved(&self) -> impl Future<Output = Result<bool, RpcError>> + Send;

    fn balance(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    fn submit_answer(
        &self,
        guess: &str,
    ) -> impl Future<Output = Result<PendingCall, RpcError>> + Send;

    fn fund(&self, amount: u64) -> impl Future<Output = Result<PendingCall, RpcError>> + Send;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<QuizEvent>;
}

/// The factory contract: the ordered list of quiz instances plus creation
/// of new ones.
pub trait QuizFactory: Clone + Send + Sync + 'static {
    type Quiz: QuizInstance;

    fn list_quizzes(&self) -> impl Future<Output = Result<Vec<Address>, RpcError>> + Send;

    fn quiz(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Self::Quiz, RpcError>> + Send;

    fn create_quiz(
        &self,
        question: &str,
        commitment: AnswerCommitment,
    ) -> impl Future<Output = Result<PendingCall, RpcError>> + Send;
}
