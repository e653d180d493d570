use std::fmt::{self, Display, Formatter};
use thiserror::Error;

use crate::marshal::ArgumentContext;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("{context}: {reason}")]
    TypeConversion {
        context: ArgumentContext,
        reason: String,
    },

    #[error("{context}: {reason}")]
    Range {
        context: ArgumentContext,
        reason: String,
    },

    #[error("{context}: {reason}")]
    UnsupportedArgument {
        context: ArgumentContext,
        reason: String,
    },

    #[error("Unsupported return type '{encoding}' for {selector} (on {class})")]
    UnsupportedReturn {
        class: String,
        selector: String,
        encoding: String,
    },

    #[error("Method {selector} not found on {class}")]
    Lookup { class: String, selector: String },

    #[error("Cannot construct directly")]
    Construction,

    #[error("Cannot send {selector} to a non-object result ({found})")]
    NonObjectReceiver {
        selector: String,
        found: &'static str,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Failures of the runtime binding itself rather than of a single conversion.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Failed to load library '{path}': {reason}")]
    LibraryLoad { path: String, reason: String },

    #[error("Unable to find symbol '{symbol}' in '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    #[error("Class {0} not found")]
    ClassNotFound(String),

    #[error("Invalid selector name {0:?}")]
    InvalidSelectorName(String),

    #[error("Malformed call record for {selector}: {reason}")]
    MalformedRecord { selector: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeConversion,
    Range,
    Lookup,
    Construction,
    UnsupportedType,
    Runtime,
}

/// The exception class an error is raised as on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostErrorClass {
    TypeError,
    RangeError,
    Error,
}

impl Display for HostErrorClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HostErrorClass::TypeError => write!(f, "TypeError"),
            HostErrorClass::RangeError => write!(f, "RangeError"),
            HostErrorClass::Error => write!(f, "Error"),
        }
    }
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::TypeConversion { .. } | BridgeError::NonObjectReceiver { .. } => {
                ErrorKind::TypeConversion
            }
            BridgeError::Range { .. } => ErrorKind::Range,
            BridgeError::UnsupportedArgument { .. } | BridgeError::UnsupportedReturn { .. } => {
                ErrorKind::UnsupportedType
            }
            BridgeError::Lookup { .. } => ErrorKind::Lookup,
            BridgeError::Construction => ErrorKind::Construction,
            BridgeError::Runtime(_) => ErrorKind::Runtime,
        }
    }

    pub fn host_class(&self) -> HostErrorClass {
        match self.kind() {
            ErrorKind::TypeConversion | ErrorKind::UnsupportedType | ErrorKind::Construction => {
                HostErrorClass::TypeError
            }
            ErrorKind::Range => HostErrorClass::RangeError,
            ErrorKind::Lookup | ErrorKind::Runtime => HostErrorClass::Error,
        }
    }

    /// The argument context for conversion failures, `None` for everything else.
    pub fn context(&self) -> Option<&ArgumentContext> {
        match self {
            BridgeError::TypeConversion { context, .. }
            | BridgeError::Range { context, .. }
            | BridgeError::UnsupportedArgument { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ArgumentContext {
        ArgumentContext::new("NSString", "substringFromIndex:", 0)
    }

    #[test]
    fn test_argument_error_message() {
        let err = BridgeError::Range {
            context: context(),
            reason: "Number is out of range".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Error converting argument 0 of substringFromIndex: (on NSString): Number is out of range"
        );
        assert_eq!(err.host_class(), HostErrorClass::RangeError);
    }

    #[test]
    fn test_kind_mapping() {
        let unsupported = BridgeError::UnsupportedArgument {
            context: context(),
            reason: "Unsupported argument type".to_string(),
        };
        assert_eq!(unsupported.kind(), ErrorKind::UnsupportedType);
        assert_eq!(unsupported.host_class(), HostErrorClass::TypeError);

        let lookup = BridgeError::Lookup {
            class: "NSString".to_string(),
            selector: "frobnicate".to_string(),
        };
        assert_eq!(lookup.kind(), ErrorKind::Lookup);
        assert_eq!(lookup.host_class(), HostErrorClass::Error);
        assert!(lookup.context().is_none());

        let runtime: BridgeError = RuntimeError::ClassNotFound("NSNothing".to_string()).into();
        assert_eq!(runtime.kind(), ErrorKind::Runtime);
        assert_eq!(runtime.to_string(), "Class NSNothing not found");
    }
}
