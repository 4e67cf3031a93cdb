//! Provides the SASL "PLAIN" mechanism.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::client::{Mechanism, MechanismError, Step};
use crate::common::Credentials;
use crate::negotiation::State;

/// A struct for the SASL PLAIN mechanism.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Plain {
    username: String,
    password: String,
}

impl Plain {
    /// Constructs a new struct for authenticating using the SASL PLAIN mechanism.
    ///
    /// It is recommended that instead you use a `Credentials` struct and turn it into the
    /// requested mechanism using `from_credentials`.
    pub fn new<N: Into<String>, P: Into<String>>(username: N, password: P) -> Plain {
        Plain {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn from_credentials(credentials: &Credentials) -> Result<Plain, MechanismError> {
        match (&credentials.username, &credentials.password) {
            (Some(username), Some(password)) => Ok(Plain::new(username.as_str(), password.as_str())),
            _ => Err(MechanismError::MissingCredentials),
        }
    }

    fn pending_state(&self) -> State {
        State::SimplePending
    }

    fn initial(&mut self) -> Result<Step, MechanismError> {
        let mut auth = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        auth.push(0);
        auth.extend(self.username.bytes());
        auth.push(0);
        auth.extend(self.password.bytes());
        Ok(Step {
            payload: Some(auth),
            next: State::SimpleAuthSent,
        })
    }

    fn success(&mut self, state: State) -> Result<(), MechanismError> {
        match state {
            State::SimpleAuthSent => Ok(()),
            other => Err(MechanismError::PrematureSuccess(other)),
        }
    }
}
