use snafu::Snafu;

/// Errors raised when building a value type from an incomplete description.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum ValidationError {
    #[snafu(display("{} is missing required field '{}'", resource, field))]
    MissingField {
        resource: &'static str,
        field: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Returns the value if it is present and non-empty, otherwise a `MissingField` error.
pub(crate) fn required(
    value: Option<String>,
    resource: &'static str,
    field: &'static str,
) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => MissingFieldSnafu { resource, field }.fail(),
    }
}
