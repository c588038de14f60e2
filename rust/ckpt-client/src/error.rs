// rust/ckpt-client/src/error.rs

use std::fmt;

use thiserror::Error;

use crate::types::Version;

/// Status code carried in every server response header.
///
/// Numbering follows the AIS status enumeration the checkpoint service
/// speaks on the wire. Values this client does not know decode to
/// [`Status::Unknown`] instead of failing the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Library,
    Version,
    Init,
    Timeout,
    TryAgain,
    InvalidParam,
    NoMemory,
    BadHandle,
    Busy,
    Access,
    NotExist,
    NameTooLong,
    Exist,
    NoSpace,
    Interrupt,
    NameNotFound,
    NoResources,
    NotSupported,
    BadOperation,
    FailedOperation,
    MessageError,
    QueueFull,
    QueueNotAvailable,
    BadFlags,
    TooBig,
    NoSections,
    Unknown(u32),
}

impl Status {
    /// Wire discriminant value.
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Ok => 1,
            Self::Library => 2,
            Self::Version => 3,
            Self::Init => 4,
            Self::Timeout => 5,
            Self::TryAgain => 6,
            Self::InvalidParam => 7,
            Self::NoMemory => 8,
            Self::BadHandle => 9,
            Self::Busy => 10,
            Self::Access => 11,
            Self::NotExist => 12,
            Self::NameTooLong => 13,
            Self::Exist => 14,
            Self::NoSpace => 15,
            Self::Interrupt => 16,
            Self::NameNotFound => 17,
            Self::NoResources => 18,
            Self::NotSupported => 19,
            Self::BadOperation => 20,
            Self::FailedOperation => 21,
            Self::MessageError => 22,
            Self::QueueFull => 23,
            Self::QueueNotAvailable => 24,
            Self::BadFlags => 25,
            Self::TooBig => 26,
            Self::NoSections => 27,
            Self::Unknown(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Ok,
            2 => Self::Library,
            3 => Self::Version,
            4 => Self::Init,
            5 => Self::Timeout,
            6 => Self::TryAgain,
            7 => Self::InvalidParam,
            8 => Self::NoMemory,
            9 => Self::BadHandle,
            10 => Self::Busy,
            11 => Self::Access,
            12 => Self::NotExist,
            13 => Self::NameTooLong,
            14 => Self::Exist,
            15 => Self::NoSpace,
            16 => Self::Interrupt,
            17 => Self::NameNotFound,
            18 => Self::NoResources,
            19 => Self::NotSupported,
            20 => Self::BadOperation,
            21 => Self::FailedOperation,
            22 => Self::MessageError,
            23 => Self::QueueFull,
            24 => Self::QueueNotAvailable,
            25 => Self::BadFlags,
            26 => Self::TooBig,
            27 => Self::NoSections,
            other => Self::Unknown(other),
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Turns a server-reported status into a `Result` for `operation`.
    pub fn into_result(self, operation: &'static str) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(CkptError::Server {
                operation,
                status: self,
            })
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "OK",
            Self::Library => "ERR_LIBRARY",
            Self::Version => "ERR_VERSION",
            Self::Init => "ERR_INIT",
            Self::Timeout => "ERR_TIMEOUT",
            Self::TryAgain => "ERR_TRY_AGAIN",
            Self::InvalidParam => "ERR_INVALID_PARAM",
            Self::NoMemory => "ERR_NO_MEMORY",
            Self::BadHandle => "ERR_BAD_HANDLE",
            Self::Busy => "ERR_BUSY",
            Self::Access => "ERR_ACCESS",
            Self::NotExist => "ERR_NOT_EXIST",
            Self::NameTooLong => "ERR_NAME_TOO_LONG",
            Self::Exist => "ERR_EXIST",
            Self::NoSpace => "ERR_NO_SPACE",
            Self::Interrupt => "ERR_INTERRUPT",
            Self::NameNotFound => "ERR_NAME_NOT_FOUND",
            Self::NoResources => "ERR_NO_RESOURCES",
            Self::NotSupported => "ERR_NOT_SUPPORTED",
            Self::BadOperation => "ERR_BAD_OPERATION",
            Self::FailedOperation => "ERR_FAILED_OPERATION",
            Self::MessageError => "ERR_MESSAGE_ERROR",
            Self::QueueFull => "ERR_QUEUE_FULL",
            Self::QueueNotAvailable => "ERR_QUEUE_NOT_AVAILABLE",
            Self::BadFlags => "ERR_BAD_FLAGS",
            Self::TooBig => "ERR_TOO_BIG",
            Self::NoSections => "ERR_NO_SECTIONS",
            Self::Unknown(v) => return write!(f, "ERR_UNKNOWN({v})"),
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum CkptError {

    #[error("Invalid parameter: {message}")]
    InvalidParam {
        message: String,
    },

    #[error("Bad {namespace} handle {handle:#x}")]
    BadHandle {
        namespace: &'static str,
        handle: u64,
    },

    #[error("Access denied: {operation} requires {required} access")]
    AccessDenied {
        operation: &'static str,
        required: &'static str,
    },

    #[error("Version {requested} not supported (closest supported: {supported})")]
    VersionMismatch {
        requested: Version,
        supported: Version,
    },

    #[error("Out of memory: {message}")]
    NoMemory {
        message: String,
    },

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Server rejected {operation}: {status}")]
    Server {
        operation: &'static str,
        status: Status,
    },

    #[error("Vector element {index} failed: {status}")]
    Vector {
        index: u32,
        status: Status,
    },
}

pub type Result<T> = std::result::Result<T, CkptError>;

// Convenience constructors
impl CkptError {

    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidParam {
            message: message.into(),
        }
    }

    pub fn bad_handle(namespace: &'static str, handle: u64) -> Self {
        Self::BadHandle { namespace, handle }
    }

    pub fn access_denied(operation: &'static str, required: &'static str) -> Self {
        Self::AccessDenied {
            operation,
            required,
        }
    }

    pub fn no_memory(message: impl Into<String>) -> Self {
        Self::NoMemory {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Flattens the error into the wire status model.
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidParam { .. } | Self::Config { .. } => Status::InvalidParam,
            Self::BadHandle { .. } => Status::BadHandle,
            Self::AccessDenied { .. } => Status::Access,
            Self::VersionMismatch { .. } => Status::Version,
            Self::NoMemory { .. } => Status::NoMemory,
            Self::Transport { .. } => Status::Library,
            Self::Protocol { .. } => Status::MessageError,
            Self::Server { status, .. } | Self::Vector { status, .. } => *status,
        }
    }

    /// Returns true if this error is the server saying "try again".
    pub fn is_try_again(&self) -> bool {
        self.status() == Status::TryAgain
    }
}
