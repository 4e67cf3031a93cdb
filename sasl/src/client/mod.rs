//! The client side of the supported SASL mechanisms.

use crate::common::{Credentials, Directives};
use crate::negotiation::State;
use std::error::Error as StdError;
use std::fmt;

/// Everything a mechanism can refuse to do.
#[derive(Debug, PartialEq)]
pub enum MechanismError {
    /// The mechanism needs both a username and a password.
    MissingCredentials,
    /// Neither the challenge nor the configuration gives a realm.
    NoRealm,
    /// The random source failed while generating the client nonce.
    #[cfg(feature = "digest-md5")]
    CannotGenerateNonce(getrandom::Error),

    /// The challenge has no `nonce` directive.
    NoServerNonce,
    /// The final challenge has no `rspauth` directive.
    NoServerProof,
    /// The `rspauth` directive doesn’t match the value we computed.
    InvalidServerProof,

    /// A challenge arrived in a state which doesn’t expect one.
    UnexpectedChallenge(State),
    /// `<success/>` arrived before the exchange was complete.
    PrematureSuccess(State),
}

#[cfg(feature = "digest-md5")]
impl From<getrandom::Error> for MechanismError {
    fn from(err: getrandom::Error) -> MechanismError {
        MechanismError::CannotGenerateNonce(err)
    }
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MechanismError::MissingCredentials => write!(fmt, "no username/password provided"),
            MechanismError::NoRealm => write!(fmt, "no realm in challenge and no server name"),
            #[cfg(feature = "digest-md5")]
            MechanismError::CannotGenerateNonce(err) => {
                write!(fmt, "can't generate nonce: {}", err)
            }

            MechanismError::NoServerNonce => write!(fmt, "server error: no nonce in challenge"),
            MechanismError::NoServerProof => {
                write!(fmt, "server error: no rspauth in final challenge")
            }
            MechanismError::InvalidServerProof => {
                write!(fmt, "server error: rspauth doesn't match")
            }

            MechanismError::UnexpectedChallenge(state) => {
                write!(fmt, "server error: challenge received in state {:?}", state)
            }
            MechanismError::PrematureSuccess(state) => {
                write!(fmt, "server error: success received in state {:?}", state)
            }
        }
    }
}

impl StdError for MechanismError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "digest-md5")]
            MechanismError::CannotGenerateNonce(err) => Some(err),
            _ => None,
        }
    }
}

/// What a mechanism wants sent, and the state to wait in once it has been.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// The payload, to be base64-encoded as the text of the stanza; `None`
    /// for an empty element.
    pub payload: Option<Vec<u8>>,
    /// The state to move to once the stanza has been sent.
    pub next: State,
}

/// A trait which defines SASL mechanisms.
pub trait Mechanism {
    /// The name of the mechanism.
    fn name(&self) -> &'static str;

    /// Creates this mechanism from `Credentials`.
    fn from_credentials(credentials: &Credentials) -> Result<Self, MechanismError>
    where
        Self: Sized;

    /// The state to wait in before `<auth/>` has been sent.
    fn pending_state(&self) -> State;

    /// Provides the initial payload of `<auth/>`.
    fn initial(&mut self) -> Result<Step, MechanismError>;

    /// Whether a challenge is acceptable in `state`.
    fn accepts_challenge(&self, _state: State) -> bool {
        false
    }

    /// Creates a response to the SASL challenge.
    fn response(&mut self, state: State, _challenge: &Directives) -> Result<Step, MechanismError> {
        Err(MechanismError::UnexpectedChallenge(state))
    }

    /// Checks that the exchange is complete, so `<success/>` is expected.
    fn success(&mut self, state: State) -> Result<(), MechanismError>;
}

pub mod mechanisms;
