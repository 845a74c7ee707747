use thiserror::Error;

/// Everything that can go wrong while parsing, rendering or recognizing.
///
/// [`Error::RecognitionFailure`] is the one low-severity variant: during a
/// multi-protocol decode it only means "not this protocol" and the search
/// moves on. All other variants indicate a bad protocol, bad input
/// parameters or an inconsistent signal.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("name `{0}` is not assigned")]
    Unassigned(String),

    #[error("value {value} for `{name}` is not in {min}..{max}")]
    DomainViolation {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("conflicting values for `{0}`")]
    ParameterInconsistency(String),

    #[error("signal does not match: {0}")]
    RecognitionFailure(String),

    #[error("unsupported repeat: {0}")]
    UnsupportedRepeat(String),

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("logic error: {0}")]
    Logic(String),

    #[error("cannot encode: {0}")]
    Encode(String),
}
