//! Stable error codes exposed to transports.
//!
//! Transports map these onto their own status space (HTTP 400/404/500,
//! gRPC InvalidArgument/NotFound/Internal) without matching on variants.

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const UNSUPPORTED_KIND: &str = "UNSUPPORTED_KIND";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const IO_ERROR: &str = "IO_ERROR";
pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
pub const TIMEOUT: &str = "TIMEOUT";
pub const STORAGE_CLOSED: &str = "STORAGE_CLOSED";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";

/// Implemented by every error enum in the workspace.
pub trait TallyErrorCode {
    /// The stable, machine-readable code for this error.
    fn error_code(&self) -> &'static str;
}
