//! Provides the SASL "DIGEST-MD5" mechanism.

use log::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::client::{Mechanism, MechanismError, Step};
use crate::common::digest::{generate_cnonce, DigestInputs, NONCE_COUNT, QOP, XMPP_SERV_TYPE};
use crate::common::{Credentials, Directives, DirectivesWriter};
use crate::negotiation::State;

/// A struct for the SASL DIGEST-MD5 mechanism.
///
/// Credentials are only checked once the first challenge arrives, the
/// `<auth/>` selecting this mechanism carries no payload.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DigestMd5 {
    username: Option<String>,
    password: Option<String>,
    server: Option<String>,
    /// The `rspauth` we expect in the final challenge.
    server_proof: Option<String>,
    cnonce: Option<String>,
}

impl DigestMd5 {
    /// Constructs a new struct for authenticating using the SASL DIGEST-MD5 mechanism.
    ///
    /// It is recommended that instead you use a `Credentials` struct and turn it into the
    /// requested mechanism using `from_credentials`.
    pub fn new(
        username: Option<String>,
        password: Option<String>,
        server: Option<String>,
    ) -> DigestMd5 {
        DigestMd5 {
            username,
            password,
            server,
            server_proof: None,
            cnonce: None,
        }
    }

    // Used for testing.
    #[doc(hidden)]
    #[cfg(test)]
    pub fn new_with_cnonce<N: Into<String>, P: Into<String>, C: Into<String>>(
        username: N,
        password: P,
        cnonce: C,
    ) -> DigestMd5 {
        DigestMd5 {
            username: Some(username.into()),
            password: Some(password.into()),
            server: None,
            server_proof: None,
            cnonce: Some(cnonce.into()),
        }
    }

    fn auth_response(&mut self, challenge: &Directives) -> Result<Vec<u8>, MechanismError> {
        let (username, password) = match (&self.username, &self.password) {
            (Some(username), Some(password)) => (username.as_str(), password.as_str()),
            _ => return Err(MechanismError::MissingCredentials),
        };
        let nonce = challenge
            .get("nonce")
            .ok_or(MechanismError::NoServerNonce)?;
        let realm = challenge
            .get("realm")
            .or(self.server.as_deref())
            .ok_or(MechanismError::NoRealm)?;
        let cnonce = match self.cnonce.take() {
            Some(cnonce) => cnonce,
            None => generate_cnonce()?,
        };

        let inputs = DigestInputs {
            username,
            realm,
            password,
            nonce,
            cnonce: &cnonce,
            serv_type: XMPP_SERV_TYPE,
        };
        let output = inputs.compute();

        let response = DirectivesWriter::new()
            .quoted("username", username)
            .quoted("realm", realm)
            .quoted("digest-uri", &inputs.digest_uri())
            .quoted("nonce", nonce)
            .bare("nc", NONCE_COUNT)
            .quoted("cnonce", &cnonce)
            .bare("qop", QOP)
            .bare("charset", "utf-8")
            .bare("response", &output.response)
            .finish();
        self.server_proof = Some(output.server_proof);
        Ok(response.into_bytes())
    }

    fn check_server_proof(&mut self, challenge: &Directives) -> Result<(), MechanismError> {
        let received = challenge
            .get("rspauth")
            .ok_or(MechanismError::NoServerProof)?;
        let expected = self
            .server_proof
            .take()
            .ok_or(MechanismError::UnexpectedChallenge(State::ChallengeResponseAuthSent))?;
        if received.as_bytes() != expected.as_bytes() {
            debug!("server sent an invalid reply (rspauth not matching)");
            return Err(MechanismError::InvalidServerProof);
        }
        Ok(())
    }
}

impl Mechanism for DigestMd5 {
    fn name(&self) -> &'static str {
        "DIGEST-MD5"
    }

    fn from_credentials(credentials: &Credentials) -> Result<DigestMd5, MechanismError> {
        Ok(DigestMd5::new(
            credentials.username.clone(),
            credentials.password.clone(),
            credentials.server.clone(),
        ))
    }

    fn pending_state(&self) -> State {
        State::ChallengeResponsePending
    }

    fn initial(&mut self) -> Result<Step, MechanismError> {
        Ok(Step {
            payload: None,
            next: State::ChallengeResponsePending,
        })
    }

    fn accepts_challenge(&self, state: State) -> bool {
        matches!(
            state,
            State::ChallengeResponsePending | State::ChallengeResponseAuthSent
        )
    }

    fn response(&mut self, state: State, challenge: &Directives) -> Result<Step, MechanismError> {
        match state {
            State::ChallengeResponsePending => Ok(Step {
                payload: Some(self.auth_response(challenge)?),
                next: State::ChallengeResponseAuthSent,
            }),
            State::ChallengeResponseAuthSent => {
                self.check_server_proof(challenge)?;
                Ok(Step {
                    payload: None,
                    next: State::ChallengeResponseFinalSent,
                })
            }
            other => Err(MechanismError::UnexpectedChallenge(other)),
        }
    }

    fn success(&mut self, state: State) -> Result<(), MechanismError> {
        match state {
            State::ChallengeResponseFinalSent => Ok(()),
            other => Err(MechanismError::PrematureSuccess(other)),
        }
    }
}
