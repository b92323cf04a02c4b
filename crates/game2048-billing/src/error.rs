use crate::plan::PaymentMethod;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BillingError {
    #[error("unknown plan {0}")]
    UnknownPlan(u32),

    #[error("plan {0} is no longer offered")]
    PlanInactive(u32),

    #[error("unknown order {0}")]
    UnknownOrder(u64),

    #[error("{0} cannot pay for a plan")]
    UnsupportedMethod(PaymentMethod),

    #[error("no active premium subscription")]
    NotPremium,

    #[error("{0} payments are not configured")]
    GatewayUnavailable(&'static str),

    #[error("gateway secret key rejected")]
    InvalidKey,

    #[error("callback signature does not match")]
    InvalidSignature,

    #[error("callback is missing field '{0}'")]
    MissingField(&'static str),

    #[error("callback field '{field}' is malformed: {value}")]
    MalformedField { field: &'static str, value: String },

    #[error("paid amount {paid} does not match order amount {expected}")]
    AmountMismatch { expected: u64, paid: u64 },

    #[error("ledger codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("ledger file error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BillingError>;
