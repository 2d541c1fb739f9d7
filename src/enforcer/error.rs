use thiserror::Error;

use crate::client::ClientError;
use crate::enforcer::claims::ClaimError;

/// Reasons an enforcement pass could not produce a grant.
#[derive(Debug, Error)]
pub enum EnforceError {
    #[error("no configured path matches the request")]
    NoMatchingPath,

    #[error("request carries no bearer credentials")]
    Unauthenticated,

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Service(#[from] ClientError),
}
