// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidArgument,
    /// Shape or type error found on set/load. Never reaches handler code.
    SchemaViolation,
    NotFound,
    /// Semantic invariant violated during the verify phase.
    ConfigError,
    RenderError,
    CommandFailed,
    ApplyError,
    StorageFailure,
    IoError,
    CommitInProgress,
    DependencyCycle,
    /// External prerequisite (tool, daemon) missing on this system.
    DependencyError,
    Cancelled,
    Bug,
}

impl ErrorKind {
    /// Errors which leave the running system untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidArgument
                | ErrorKind::SchemaViolation
                | ErrorKind::NotFound
                | ErrorKind::ConfigError
                | ErrorKind::CommitInProgress
                | ErrorKind::DependencyCycle
                | ErrorKind::DependencyError
        )
    }
}

impl Default for ErrorKind {
    fn default() -> Self {
        Self::Bug
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for RtconfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.kind)?;
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path)?;
        }
        write!(f, "{}", self.msg)?;
        for cause in self.causes.as_slice() {
            write!(f, "\n  ")?;
            if !cause.path.is_empty() {
                write!(f, "{}: ", cause.path)?;
            }
            write!(f, "{}", cause.msg)?;
        }
        Ok(())
    }
}

impl Error for RtconfError {}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct RtconfError {
    kind: ErrorKind,
    msg: String,
    path: String,
    handler: String,
    timeout: bool,
    causes: Vec<RtconfError>,
}

impl RtconfError {
    pub fn new(kind: ErrorKind, msg: String) -> Self {
        Self {
            kind,
            msg,
            ..Default::default()
        }
    }

    /// Error carrying a configuration path breadcrumb shown to the user,
    /// for example `interfaces ethernet eth0 vrf`.
    pub fn new_with_path(kind: ErrorKind, path: &str, msg: String) -> Self {
        Self {
            kind,
            msg,
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn new_timeout(msg: String) -> Self {
        Self {
            kind: ErrorKind::CommandFailed,
            msg,
            timeout: true,
            ..Default::default()
        }
    }

    /// Fold several errors into one report. Nested combined errors are
    /// flattened so the report stays one level deep.
    pub fn combined(kind: ErrorKind, msg: String, causes: Vec<Self>) -> Self {
        let mut flat = Vec::new();
        for cause in causes {
            if cause.causes.is_empty() {
                flat.push(cause);
            } else {
                flat.extend(cause.causes);
            }
        }
        Self {
            kind,
            msg,
            causes: flat,
            ..Default::default()
        }
    }

    pub fn with_handler(mut self, handler: &str) -> Self {
        self.handler = handler.to_string();
        for cause in self.causes.iter_mut() {
            if cause.handler.is_empty() {
                cause.handler = handler.to_string();
            }
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn msg(&self) -> &str {
        self.msg.as_str()
    }

    /// User facing breadcrumb of the configuration node at fault, empty
    /// when the error is not tied to a node.
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Name of the handler which raised or was running when this error
    /// happened.
    pub fn handler(&self) -> &str {
        self.handler.as_str()
    }

    /// Whether an external command was killed after reaching its timeout.
    pub fn is_timeout(&self) -> bool {
        self.timeout
    }

    pub fn causes(&self) -> &[RtconfError] {
        self.causes.as_slice()
    }
}

impl From<serde_json::Error> for RtconfError {
    fn from(e: serde_json::Error) -> Self {
        RtconfError::new(
            ErrorKind::InvalidArgument,
            format!("Invalid property: {e}"),
        )
    }
}

impl From<serde_yaml::Error> for RtconfError {
    fn from(e: serde_yaml::Error) -> Self {
        RtconfError::new(
            ErrorKind::InvalidArgument,
            format!("Invalid YAML string: {e}"),
        )
    }
}

impl From<std::io::Error> for RtconfError {
    fn from(e: std::io::Error) -> Self {
        RtconfError::new(ErrorKind::IoError, format!("{e}"))
    }
}

impl From<nix::Error> for RtconfError {
    fn from(e: nix::Error) -> Self {
        RtconfError::new(ErrorKind::IoError, format!("{e}"))
    }
}

impl From<std::net::AddrParseError> for RtconfError {
    fn from(e: std::net::AddrParseError) -> Self {
        RtconfError::new(
            ErrorKind::InvalidArgument,
            format!("Invalid IP address : {e}"),
        )
    }
}
