use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Kind {
    /// Transport-level failure while connecting, sending or receiving
    Network,
    /// Liveness check failed, or a caller gave up waiting for a reply
    Timeout,
    /// A frame could not be decompressed or decoded
    Codec,
    /// Unexpected control-frame sequence from the remote end
    Protocol,
    /// The connection closed before the operation could complete
    Closed,
    /// Invalid arguments or state on the caller's side
    Validation,
    /// Internal error from dependencies
    Internal,
}

impl Kind {
    /// Whether an error of this kind tears the current connection down.
    ///
    /// Codec and protocol errors only drop the offending frame; the receive
    /// loop keeps running after reporting them.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Closed)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            source: None,
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    /// Error handed to every request still waiting when a connection goes away.
    #[must_use]
    pub fn connection_closed(url: &str) -> Self {
        ConnectionClosed {
            url: url.to_owned(),
        }
        .into()
    }

    /// A copy for an additional recipient of the same failure. Keeps the kind;
    /// the source is carried over as its rendered message.
    #[must_use]
    pub fn detached(&self) -> Self {
        match &self.source {
            Some(source) => Self::with_source(
                self.kind,
                Detached {
                    message: source.to_string(),
                },
            ),
            None => Self::new(self.kind),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ConnectionClosed {
    pub url: String,
}

impl fmt::Display for ConnectionClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection to {} closed", self.url)
    }
}

impl StdError for ConnectionClosed {}

/// Rendered source of an error shared between several waiters.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Detached {
    pub message: String,
}

impl fmt::Display for Detached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Detached {}

impl From<ConnectionClosed> for Error {
    fn from(err: ConnectionClosed) -> Self {
        Error::with_source(Kind::Closed, err)
    }
}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}
