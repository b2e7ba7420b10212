//! HTTP/2 error taxonomy
//!
//! Errors carry their own classification: a [`StreamError`] is answered with
//! a single RST_STREAM, a composite stream error with one RST_STREAM per
//! constituent, and everything else is a connection error answered with
//! GOAWAY (RFC 7540 Section 5.4).

use std::fmt;

/// A stream-scoped protocol failure
///
/// Resolving one of these resets the named stream; the connection survives.
#[derive(Debug, Clone, thiserror::Error)]
#[error("stream {stream_id} error ({code}): {message}")]
pub struct StreamError {
    /// Stream the failure is scoped to
    pub stream_id: u32,
    /// Error code carried on the RST_STREAM answering this failure
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
}

/// HTTP/2 errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection-scoped failure; answered with GOAWAY
    #[error("connection error ({code}): {message}")]
    Connection {
        /// Error code carried on the GOAWAY
        code: ErrorCode,
        /// Human-readable detail
        message: String,
    },

    /// Stream-scoped failure; answered with RST_STREAM
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Several independent stream failures from one batch operation
    #[error("{} stream errors", .0.len())]
    CompositeStream(Vec<StreamError>),

    /// Failure reported by the header encoding/decoding capability
    #[error("header codec error ({code}): {message}")]
    HeaderCodec {
        /// Error code classifying the failure
        code: ErrorCode,
        /// Human-readable detail
        message: String,
    },

    /// I/O failure reported by the frame sink
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Connection error with the given code
    pub fn connection(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Connection {
            code,
            message: message.into(),
        }
    }

    /// Connection-level protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::connection(ErrorCode::ProtocolError, message)
    }

    /// Connection-level frame size error
    pub fn frame_size(message: impl Into<String>) -> Self {
        Self::connection(ErrorCode::FrameSizeError, message)
    }

    /// Stream error with the given code
    pub fn stream(stream_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Stream(StreamError {
            stream_id,
            code,
            message: message.into(),
        })
    }

    /// True unless this error is scoped to one or more streams
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, Error::Stream(_) | Error::CompositeStream(_))
    }

    /// The error code classifying this failure
    ///
    /// Unclassified failures (I/O) map to INTERNAL_ERROR; a composite maps to
    /// the code of its first constituent.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Connection { code, .. } => *code,
            Error::Stream(e) => e.code,
            Error::CompositeStream(errors) => {
                errors.first().map(|e| e.code).unwrap_or(ErrorCode::InternalError)
            }
            Error::HeaderCodec { code, .. } => *code,
            Error::Io(_) => ErrorCode::InternalError,
        }
    }
}

/// HTTP/2 error codes as defined in RFC 7540 Section 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown
    NoError = 0x0,
    /// Protocol error detected
    ProtocolError = 0x1,
    /// Implementation fault
    InternalError = 0x2,
    /// Flow-control limits exceeded
    FlowControlError = 0x3,
    /// Settings not acknowledged
    SettingsTimeout = 0x4,
    /// Frame received for closed stream
    StreamClosed = 0x5,
    /// Frame size incorrect
    FrameSizeError = 0x6,
    /// Stream not processed
    RefusedStream = 0x7,
    /// Stream cancelled
    Cancel = 0x8,
    /// Compression state not updated
    CompressionError = 0x9,
    /// TCP connection error for CONNECT method
    ConnectError = 0xa,
    /// Processing capacity exceeded
    EnhanceYourCalm = 0xb,
    /// Negotiated TLS parameters not acceptable
    InadequateSecurity = 0xc,
    /// Use HTTP/1.1 for the request
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create error code from u32
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameSizeError),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            0xc => Some(ErrorCode::InadequateSecurity),
            0xd => Some(ErrorCode::Http11Required),
            _ => None,
        }
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;
