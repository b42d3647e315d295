//! IMAP error types.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::result;
use std::str::Utf8Error;

use bufstream::IntoInnerError as BufError;

/// A convenience wrapper around `Result` for `imap_resync::Error`.
pub type Result<T, E = Error> = result::Result<T, E>;

/// A set of errors that can occur while synchronizing with or mutating a remote folder.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A malformed request that was rejected locally and never reached the server: an empty
    /// delta on an add/remove store, an unresolvable message selector, or a missing required
    /// value.
    InvalidArgument(String),
    /// The operation is not permitted in the current state: the folder is not open, it is
    /// open read-only, or quick resynchronization was enabled after a folder was opened.
    InvalidState(String),
    /// The operation needs a server feature that the open folder does not provide, such as an
    /// `UNCHANGEDSINCE` precondition on a folder without mod-sequences.
    NotSupported(String),
    /// The `UIDVALIDITY` supplied as a resynchronization hint does not match the folder's current
    /// value. Every cached [`UniqueId`](crate::types::UniqueId) for this folder is invalid and
    /// must be discarded.
    UidValidityMismatch {
        /// The validity the caller had cached.
        expected: u32,
        /// The validity reported by the server.
        actual: u32,
    },
    /// The caller cancelled the request before its result was applied. No local state changed.
    Cancelled,
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    Io(IoError),
    /// A `BAD` response from the IMAP server.
    Bad(String),
    /// A `NO` response from the IMAP server.
    No(String),
    /// The connection was terminated unexpectedly.
    ConnectionLost,
    /// Error parsing a server response.
    Parse(ParseError),
    /// Command inputs were not valid [IMAP
    /// strings](https://tools.ietf.org/html/rfc3501#section-4.3).
    Validate(ValidateError),
}

impl Error {
    /// Whether this error was produced locally, before or instead of talking to the server.
    ///
    /// Local errors are caller programming errors (or, for [`Error::UidValidityMismatch`], a
    /// signal to rebuild the cache) and retrying the same call will fail the same way. All other
    /// errors come from the transport and left local state untouched, so the whole call may be
    /// retried once the connection is re-established.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::InvalidState(_)
                | Error::NotSupported(_)
                | Error::UidValidityMismatch { .. }
                | Error::Cancelled
                | Error::Validate(_)
        )
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl<T> From<BufError<T>> for Error {
    fn from(err: BufError<T>) -> Error {
        Error::Io(err.into())
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<ValidateError> for Error {
    fn from(err: ValidateError) -> Error {
        Error::Validate(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InvalidArgument(ref msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidState(ref msg) => write!(f, "Invalid state: {}", msg),
            Error::NotSupported(ref msg) => write!(f, "Not supported: {}", msg),
            Error::UidValidityMismatch { expected, actual } => write!(
                f,
                "UIDVALIDITY mismatch: expected {}, server reports {}",
                expected, actual
            ),
            Error::Cancelled => f.write_str("Request cancelled"),
            Error::Io(ref e) => fmt::Display::fmt(e, f),
            Error::Bad(ref data) => write!(f, "Bad Response: {}", data),
            Error::No(ref data) => write!(f, "No Response: {}", data),
            Error::ConnectionLost => f.write_str("Connection Lost"),
            Error::Parse(ref e) => fmt::Display::fmt(e, f),
            Error::Validate(ref e) => fmt::Display::fmt(e, f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Parse(ParseError::DataNotUtf8(_, ref e)) => Some(e),
            _ => None,
        }
    }
}

/// An error occured while trying to parse a server response.
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseError {
    /// Indicates an error parsing the status response. Such as OK, NO, and BAD.
    Invalid(Vec<u8>),
    /// The server returned a `MODIFIED` or `COPYUID` code we could not make sense of.
    ResponseCode(String),
    /// The client could not decode the server's response as UTF-8.
    DataNotUtf8(Vec<u8>, Utf8Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParseError::Invalid(_) => f.write_str("Unable to parse status response"),
            ParseError::ResponseCode(ref code) => {
                write!(f, "Unable to parse response code: {}", code)
            }
            ParseError::DataNotUtf8(_, _) => f.write_str("Unable to parse data as UTF-8 text"),
        }
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            ParseError::DataNotUtf8(_, ref e) => Some(e),
            _ => None,
        }
    }
}

/// An [invalid character](https://tools.ietf.org/html/rfc3501#section-4.3) was found in a command
/// argument.
#[derive(Debug)]
pub struct ValidateError {
    /// the synopsis of the invalid command
    pub(crate) command_synopsis: String,
    /// the name of the invalid argument
    pub(crate) argument: String,
    /// the invalid character contained in the argument
    pub(crate) offending_char: char,
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // print character in debug form because invalid ones are often whitespaces
        write!(
            f,
            "Invalid character {:?} in argument '{}' of command '{}'",
            self.offending_char, self.argument, self.command_synopsis
        )
    }
}

impl StdError for ValidateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_error_display() {
        assert_eq!(
            ValidateError {
                command_synopsis: "SELECT (mailbox)".to_owned(),
                argument: "mailbox".to_owned(),
                offending_char: '\n'
            }
            .to_string(),
            "Invalid character '\\n' in argument 'mailbox' of command 'SELECT (mailbox)'"
        );
    }

    #[test]
    fn local_errors() {
        assert!(Error::InvalidArgument("empty".into()).is_local());
        assert!(Error::NotSupported("modseq".into()).is_local());
        assert!(Error::UidValidityMismatch {
            expected: 1,
            actual: 2
        }
        .is_local());
        assert!(Error::Cancelled.is_local());
        assert!(!Error::ConnectionLost.is_local());
        assert!(!Error::No("nope".into()).is_local());
    }

    #[test]
    fn mismatch_display() {
        let e = Error::UidValidityMismatch {
            expected: 7,
            actual: 9,
        };
        assert_eq!(
            e.to_string(),
            "UIDVALIDITY mismatch: expected 7, server reports 9"
        );
    }
}
