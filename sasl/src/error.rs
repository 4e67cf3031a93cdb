use base64::DecodeError;
use std::error::Error as StdError;
use std::fmt;

use crate::client::MechanismError;
use crate::common::DirectiveError;
use crate::negotiation::State;

/// The broad classes of reasons an attempt can fail for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Something is missing on our side, before anything was sent.
    Configuration,
    /// The server offered no mechanism we support.
    UnsupportedMechanism,
    /// The server sent a challenge we can’t make sense of.
    MalformedInput,
    /// The server sent a stanza at the wrong time.
    ProtocolViolation,
    /// The server failed to prove it knows our password.
    Verification,
    /// Sending a stanza failed.
    Transport,
    /// The server refused our credentials.
    Rejected,
}

/// A wrapper enum for things that could go wrong during a negotiation.
#[derive(Debug)]
pub enum Error {
    /// No mechanism we support is in the server’s list.
    NoSupportedMechanism,
    /// The active mechanism refused to go on.
    Mechanism(MechanismError),
    /// A challenge isn’t valid base64.
    CannotDecodeChallenge(DecodeError),
    /// A challenge doesn’t parse as a list of directives.
    InvalidChallenge(DirectiveError),
    /// A stanza arrived before any mechanism was chosen.
    UnexpectedStanza(&'static str, State),
    /// The connection failed to send a stanza.
    Transport(String),
    /// The server sent `<failure/>`, with this reason.
    Rejected(String),
    /// An outgoing stanza couldn't be built.
    Stanza(minidom::Error),
}

impl Error {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoSupportedMechanism => ErrorKind::UnsupportedMechanism,
            Error::Mechanism(err) => match err {
                MechanismError::MissingCredentials | MechanismError::NoRealm => {
                    ErrorKind::Configuration
                }
                #[cfg(feature = "digest-md5")]
                MechanismError::CannotGenerateNonce(_) => ErrorKind::Configuration,
                MechanismError::NoServerNonce | MechanismError::NoServerProof => {
                    ErrorKind::MalformedInput
                }
                MechanismError::InvalidServerProof => ErrorKind::Verification,
                MechanismError::UnexpectedChallenge(_) | MechanismError::PrematureSuccess(_) => {
                    ErrorKind::ProtocolViolation
                }
            },
            Error::CannotDecodeChallenge(_) | Error::InvalidChallenge(_) => {
                ErrorKind::MalformedInput
            }
            Error::UnexpectedStanza(_, _) => ErrorKind::ProtocolViolation,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Rejected(_) => ErrorKind::Rejected,
            Error::Stanza(_) => ErrorKind::Configuration,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoSupportedMechanism => write!(fmt, "no supported SASL mechanism"),
            Error::Mechanism(err) => write!(fmt, "{}", err),
            Error::CannotDecodeChallenge(err) => {
                write!(fmt, "server error: can't decode challenge: {}", err)
            }
            Error::InvalidChallenge(err) => write!(fmt, "server error: invalid challenge: {}", err),
            Error::UnexpectedStanza(name, state) => {
                write!(fmt, "server error: {} received in state {:?}", name, state)
            }
            Error::Transport(err) => write!(fmt, "transport error: {}", err),
            // The server’s own words.
            Error::Rejected(reason) => write!(fmt, "{}", reason),
            Error::Stanza(err) => write!(fmt, "can't build stanza: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Mechanism(err) => Some(err),
            Error::CannotDecodeChallenge(err) => Some(err),
            Error::InvalidChallenge(err) => Some(err),
            Error::Stanza(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MechanismError> for Error {
    fn from(err: MechanismError) -> Error {
        Error::Mechanism(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Error {
        Error::CannotDecodeChallenge(err)
    }
}

impl From<DirectiveError> for Error {
    fn from(err: DirectiveError) -> Error {
        Error::InvalidChallenge(err)
    }
}
