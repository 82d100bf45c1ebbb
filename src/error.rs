//! Error types for the DMA engine
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Engine configuration and lifecycle failures
//! - [`RequestError`]: Caller contract violations on submission
//! - [`ResourceError`]: Host page locking failures
//! - [`BuildError`]: Descriptor ring construction failures
//!
//! The unified [`Error`] enum wraps all domain errors and is what a failed
//! transfer reports to its notifier.

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration and lifecycle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Page size is not a power of two or is smaller than one word
    InvalidPageSize,
    /// Pipeline window must hold at least one page
    InvalidPipelineSize,
    /// Largest non-aligned chunk must be at least one word and below a page
    InvalidChunkLog,
    /// Engine has been torn down and accepts no more work
    Finished,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::InvalidPageSize => "invalid page size",
            ConfigError::InvalidPipelineSize => "invalid pipeline size",
            ConfigError::InvalidChunkLog => "invalid non-aligned chunk size",
            ConfigError::Finished => "engine finished",
        }
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors raised when a transfer request breaks the submission contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// Length is not a multiple of 4 bytes
    UnalignedLength,
    /// Host address is not 4-byte aligned
    UnalignedAddress,
    /// Another transfer is still in flight
    TransferInProgress,
    /// Deferred-work queue has no room for the start item
    QueueFull,
}

impl core::fmt::Display for RequestError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RequestError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestError::UnalignedLength => "length is not a multiple of 4",
            RequestError::UnalignedAddress => "host address is not 4-byte aligned",
            RequestError::TransferInProgress => "transfer already in progress",
            RequestError::QueueFull => "work queue full",
        }
    }
}

// =============================================================================
// Resource Errors
// =============================================================================

/// Host memory pinning errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResourceError {
    /// Fewer pages were locked than the range requires
    PartialLock {
        /// Pages the range spans
        requested: usize,
        /// Pages the locker actually locked
        locked: usize,
    },
    /// Empty or overflowing address range
    InvalidRange,
}

impl core::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ResourceError::PartialLock { requested, locked } => {
                write!(f, "{}: {locked} of {requested} pages", self.as_str())
            }
            ResourceError::InvalidRange => f.write_str(self.as_str()),
        }
    }
}

impl ResourceError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceError::PartialLock { .. } => "partial page lock",
            ResourceError::InvalidRange => "invalid address range",
        }
    }
}

// =============================================================================
// Build Errors
// =============================================================================

/// Descriptor ring construction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuildError {
    /// No power-of-two chunk size covers the non-aligned slice
    NoChunkSize,
    /// More than one chunk of a size was needed where at most one fits
    ChunkOverflow,
    /// Non-aligned slice is a full page or larger
    SliceTooLarge,
    /// Hardware reported a last id outside the ring
    UnrecognizedLastId(u32),
}

impl core::fmt::Display for BuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BuildError::UnrecognizedLastId(id) => write!(f, "{} {id}", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl BuildError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BuildError::NoChunkSize => "no chunk size fits non-aligned slice",
            BuildError::ChunkOverflow => "non-aligned chunk count overflow",
            BuildError::SliceTooLarge => "non-aligned slice not below page size",
            BuildError::UnrecognizedLastId(_) => "unrecognized last id",
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// ```ignore
/// match result {
///     Err(Error::Request(RequestError::TransferInProgress)) => { /* retry later */ }
///     Err(Error::Resource(ResourceError::PartialLock { .. })) => { /* ... */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// Request contract error
    Request(RequestError),
    /// Page locking error
    Resource(ResourceError),
    /// Ring construction error
    Build(BuildError),
    /// Bounded polling gave up
    Timeout,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {e}"),
            Error::Request(e) => write!(f, "request: {e}"),
            Error::Resource(e) => write!(f, "resource: {e}"),
            Error::Build(e) => write!(f, "build: {e}"),
            Error::Timeout => f.write_str("operation timed out"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<RequestError> for Error {
    fn from(e: RequestError) -> Self {
        Error::Request(e)
    }
}

impl From<ResourceError> for Error {
    fn from(e: ResourceError) -> Self {
        Error::Resource(e)
    }
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        Error::Build(e)
    }
}

/// Result type alias for engine operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for request validation
pub type RequestResult<T> = core::result::Result<T, RequestError>;

/// Result type alias for pinning operations
pub type ResourceResult<T> = core::result::Result<T, ResourceError>;

/// Result type alias for ring building
pub type BuildResult<T> = core::result::Result<T, BuildError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    extern crate std;
    use std::format;

    use super::*;

    #[test]
    fn config_error_as_str_non_empty() {
        let variants = [
            ConfigError::InvalidPageSize,
            ConfigError::InvalidPipelineSize,
            ConfigError::InvalidChunkLog,
            ConfigError::Finished,
        ];

        for variant in variants {
            assert!(!variant.as_str().is_empty(), "ConfigError::{variant:?} has empty string");
        }
    }

    #[test]
    fn request_error_display() {
        let display = format!("{}", RequestError::UnalignedLength);
        assert_eq!(display, "length is not a multiple of 4");
    }

    #[test]
    fn resource_error_display_includes_counts() {
        let err = ResourceError::PartialLock {
            requested: 4,
            locked: 2,
        };
        let display = format!("{err}");
        assert!(display.contains("partial page lock"));
        assert!(display.contains("2 of 4"));
    }

    #[test]
    fn build_error_display_includes_id() {
        let display = format!("{}", BuildError::UnrecognizedLastId(200));
        assert_eq!(display, "unrecognized last id 200");
    }

    #[test]
    fn error_from_domain_errors() {
        assert_eq!(
            Error::from(ConfigError::Finished),
            Error::Config(ConfigError::Finished)
        );
        assert_eq!(
            Error::from(RequestError::QueueFull),
            Error::Request(RequestError::QueueFull)
        );
        assert_eq!(
            Error::from(ResourceError::InvalidRange),
            Error::Resource(ResourceError::InvalidRange)
        );
        assert_eq!(
            Error::from(BuildError::NoChunkSize),
            Error::Build(BuildError::NoChunkSize)
        );
    }

    #[test]
    fn error_display_prefixes_domain() {
        let display = format!("{}", Error::Build(BuildError::ChunkOverflow));
        assert!(display.starts_with("build:"));
        assert!(display.contains("overflow"));

        let display = format!("{}", Error::Request(RequestError::TransferInProgress));
        assert!(display.starts_with("request:"));

        assert_eq!(format!("{}", Error::Timeout), "operation timed out");
    }

    #[test]
    fn error_equality() {
        let a = Error::Resource(ResourceError::PartialLock {
            requested: 3,
            locked: 1,
        });
        let b = Error::Resource(ResourceError::PartialLock {
            requested: 3,
            locked: 1,
        });
        let c = Error::Resource(ResourceError::InvalidRange);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn result_aliases_work() {
        fn build() -> BuildResult<u8> {
            Err(BuildError::SliceTooLarge)
        }
        fn unified() -> Result<u8> {
            Ok(build()?)
        }

        assert_eq!(unified(), Err(Error::Build(BuildError::SliceTooLarge)));
    }
}
