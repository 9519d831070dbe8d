// src/error.rs
//
// Unified error handling for sizefit
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input or request, recoverable
// - CodecError: Format/encoding issues
// - ResourceLimit: Memory/dimension limits, file access
// - Precision: Search finished but missed the tolerance band
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to decide whether to retry, report or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/dimension limits
    ResourceLimit,
    /// Best-effort result exists but is outside the requested tolerance
    Precision,
    /// Library bugs (should not happen)
    InternalBug,
}

/// sizefit error types
#[derive(Debug, Error)]
pub enum SizeFitError {
    // Input / request errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Unsupported operation: {message}")]
    UnsupportedOperation { message: Cow<'static, str> },

    // File I/O Errors
    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Search Errors
    #[error("No candidate could be produced after {attempts} attempts: {last_error}")]
    SearchExhausted {
        attempts: u32,
        last_error: Cow<'static, str>,
    },

    #[error("Best result {achieved_bytes} bytes is {error_percent:.2}% away from target {target_bytes} bytes")]
    ConvergenceShortfall {
        achieved_bytes: u64,
        target_bytes: u64,
        error_percent: f64,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl Clone for SizeFitError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidInput { message } => Self::InvalidInput {
                message: message.clone(),
            },
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::UnsupportedOperation { message } => Self::UnsupportedOperation {
                message: message.clone(),
            },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::SearchExhausted {
                attempts,
                last_error,
            } => Self::SearchExhausted {
                attempts: *attempts,
                last_error: last_error.clone(),
            },
            Self::ConvergenceShortfall {
                achieved_bytes,
                target_bytes,
                error_percent,
            } => Self::ConvergenceShortfall {
                achieved_bytes: *achieved_bytes,
                target_bytes: *target_bytes,
                error_percent: *error_percent,
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl SizeFitError {
    pub fn invalid_input(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_operation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn search_exhausted(attempts: u32, last_error: impl Into<Cow<'static, str>>) -> Self {
        Self::SearchExhausted {
            attempts,
            last_error: last_error.into(),
        }
    }

    pub fn convergence_shortfall(achieved_bytes: u64, target_bytes: u64, error_percent: f64) -> Self {
        Self::ConvergenceShortfall {
            achieved_bytes,
            target_bytes,
            error_percent,
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category():
    /// - UserError and ResourceLimit are recoverable (different input, smaller image)
    /// - Precision is recoverable (relax the target or accept the best candidate)
    /// - CodecError and InternalBug are not
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit | ErrorCategory::Precision => {
                true
            }
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Whether a failed batch item failed while decoding its source.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::DecodeFailed { .. } | Self::UnsupportedFormat { .. }
        )
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. }
            | Self::InvalidArgument { .. }
            | Self::UnsupportedOperation { .. } => ErrorCategory::UserError,

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::ResizeFailed { .. }
            | Self::SearchExhausted { .. } => ErrorCategory::CodecError,

            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::FileReadFailed { .. } => ErrorCategory::ResourceLimit,

            Self::ConvergenceShortfall { .. } => ErrorCategory::Precision,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

impl ErrorCategory {
    /// Get string representation of error category
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::Precision => "Precision",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    /// Stable machine-readable code for this category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "SIZEFIT_USER_ERROR",
            ErrorCategory::CodecError => "SIZEFIT_CODEC_ERROR",
            ErrorCategory::ResourceLimit => "SIZEFIT_RESOURCE_LIMIT",
            ErrorCategory::Precision => "SIZEFIT_PRECISION",
            ErrorCategory::InternalBug => "SIZEFIT_INTERNAL_BUG",
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, SizeFitError>;
