use game2048_billing::BillingError;
use game2048_core::{CoreError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Game(#[from] CoreError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("json output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("terminal error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot read callback: {0}")]
    Callback(String),
}

pub type AppResult<T> = Result<T, AppError>;
