use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the rotation pipeline.
///
/// `Validation` is fatal and caught before any remote call. `NotFound` and
/// the service variants are scoped to the smallest enclosing unit of work;
/// the orchestrator never lets them cross the per-identity boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The collaborator could not be reached at all.
    #[error("{service} request failed")]
    ServiceUnavailable {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The collaborator answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    ExternalService {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The collaborator answered, but the payload did not parse.
    #[error("{service} response could not be decoded")]
    Decode {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("credential rotation failed for {identity}")]
    Rotation {
        identity: String,
        #[source]
        source: Box<Error>,
    },

    #[error("owner lookup failed for {identity}")]
    Enrichment {
        identity: String,
        #[source]
        source: Box<Error>,
    },

    #[error("reconciliation failed for connection {connection}")]
    Reconcile {
        connection: String,
        #[source]
        source: Box<Error>,
    },
}
