use crate::dispatch::DispatchError;
use crate::settings::StoreError;
use thiserror::Error;
use tilde_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("malformed reply data: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("request echo has no valid `{0}`")]
    MissingField(&'static str),
    #[error("no active database")]
    NoDatabase,
    #[error("unknown database `{0}`")]
    UnknownDatabase(String),
    #[error("invalid database name `{0}`")]
    InvalidName(String),
    #[error("not available in demo mode")]
    DemoRestricted,
    #[error("object {0} is not opened")]
    NotOpened(String),
    #[error("Unexpected behaviour (ref #{0}), please, report this to the developers!")]
    Invariant(u8),
}
