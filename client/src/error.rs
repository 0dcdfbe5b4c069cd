use mercado_common::order::{OrderId, OrderStatus, StatusError};
use mercado_common::product::ProductId;
use thiserror::Error;

/// Failures of store mutations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("product {0} not found")]
    ProductNotFound(ProductId),
    #[error("order {0} already exists")]
    DuplicateOrder(OrderId),
    #[error(transparent)]
    IllegalTransition(#[from] StatusError),
    #[error("order {id} is already {status}")]
    Finished { id: OrderId, status: OrderStatus },
    #[error("not enough stock for {product}: {available} available, {requested} requested")]
    InsufficientStock {
        product: ProductId,
        available: u32,
        requested: u32,
    },
}

/// Failures talking to the remote backend.
#[derive(Clone, Debug, Error)]
pub enum RemoteError {
    #[error("remote backend is not configured")]
    NotConfigured,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("could not decode remote response: {0}")]
    Decode(String),
    #[error("remote call timed out")]
    Timeout,
    #[error("no remote session")]
    NoSession,
    #[error("{0}")]
    Rejected(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Decode(e.to_string())
    }
}

/// Failures of the durable local store.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("local storage I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("local storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failures of registration and sign-in, local or remote.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),
    #[error("no account found for {0}")]
    UnknownUser(String),
    #[error("wrong password")]
    WrongPassword,
    #[error("this account has no staff access")]
    NotStaff,
    #[error("wrong secret key, attempt {attempt}/{max}")]
    InvalidSecretKey { attempt: u32, max: u32 },
    #[error("registration locked for {0} more seconds")]
    Locked(u64),
    #[error(transparent)]
    Storage(#[from] LocalStoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
