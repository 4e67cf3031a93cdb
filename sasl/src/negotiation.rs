//! The per-attempt SASL state machine.
//!
//! A [`Negotiation`] owns everything one authentication attempt needs and is
//! driven by the four events the server can produce: the mechanism list,
//! challenges, success and failure. Outgoing stanzas go through the
//! [`Connection`] passed to each event, and the attempt ends by invoking
//! the result handler exactly once.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{debug, warn};
use minidom::{Element, Node};

use crate::client::mechanisms::Plain;
#[cfg(feature = "digest-md5")]
use crate::client::mechanisms::DigestMd5;
use crate::client::{Mechanism, MechanismError, Step};
use crate::common::{Credentials, Directives};
use crate::dispatch::Connection;
use crate::error::Error;
use crate::ns;

/// Called once with the outcome of the attempt: whether it succeeded and,
/// if not, why.
pub type ResultHandler = Box<dyn FnOnce(bool, Option<String>)>;

/// Where an attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No mechanism has been chosen yet.
    NoMechanism,
    /// PLAIN was chosen, `<auth/>` isn’t sent yet.
    SimplePending,
    /// PLAIN `<auth/>` was sent, waiting for the outcome.
    SimpleAuthSent,
    /// DIGEST-MD5 was chosen, waiting for the first challenge.
    ChallengeResponsePending,
    /// The digest response was sent, waiting for the server proof.
    ChallengeResponseAuthSent,
    /// The server proof checked out and was acknowledged.
    ChallengeResponseFinalSent,
    /// The attempt succeeded.
    Succeeded,
    /// The attempt failed.
    Failed,
}

impl State {
    /// Whether the attempt is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Succeeded | State::Failed)
    }
}

/// The mechanisms this crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MechanismKind {
    /// RFC 4616 PLAIN.
    Plain,
    /// RFC 2831 DIGEST-MD5.
    #[cfg(feature = "digest-md5")]
    DigestMd5,
}

impl MechanismKind {
    /// The name the server advertises this mechanism with.
    pub fn name(self) -> &'static str {
        match self {
            MechanismKind::Plain => "PLAIN",
            #[cfg(feature = "digest-md5")]
            MechanismKind::DigestMd5 => "DIGEST-MD5",
        }
    }

    /// Recognizes an advertised mechanism name, case-sensitively.
    pub fn from_name(name: &str) -> Option<MechanismKind> {
        match name {
            "PLAIN" => Some(MechanismKind::Plain),
            #[cfg(feature = "digest-md5")]
            "DIGEST-MD5" => Some(MechanismKind::DigestMd5),
            _ => None,
        }
    }

    /// Every implemented mechanism, most preferred first.
    pub fn all() -> Vec<MechanismKind> {
        let mut all = Vec::new();
        #[cfg(feature = "digest-md5")]
        all.push(MechanismKind::DigestMd5);
        all.push(MechanismKind::Plain);
        all
    }

    fn preference(self) -> u8 {
        match self {
            MechanismKind::Plain => 1,
            #[cfg(feature = "digest-md5")]
            MechanismKind::DigestMd5 => 2,
        }
    }
}

/// Picks the mechanism to use among the `offered` ones.
///
/// Only mechanisms in `allowed` are considered, DIGEST-MD5 is preferred over
/// PLAIN whatever the order of the list, and unknown names are skipped.
pub fn select_mechanism<I, S>(offered: I, allowed: &[MechanismKind]) -> Option<MechanismKind>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut best: Option<MechanismKind> = None;
    for name in offered {
        let name = name.as_ref();
        match MechanismKind::from_name(name) {
            Some(kind) if allowed.contains(&kind) => {
                if best.map_or(true, |best| kind.preference() > best.preference()) {
                    best = Some(kind);
                }
            }
            Some(kind) => debug!("SASL mechanism {} disabled in configuration", kind.name()),
            None => debug!("unknown SASL auth mechanism: {}", name),
        }
    }
    best
}

/// What to do when `<success/>` arrives before the mechanism is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessPolicy {
    /// Log the anomaly and report success anyway; the server has the last
    /// word.
    TrustServer,
    /// Fail the attempt.
    Strict,
}

impl Default for SuccessPolicy {
    fn default() -> SuccessPolicy {
        SuccessPolicy::TrustServer
    }
}

/// Negotiation settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// How to treat a premature `<success/>`.
    pub success_policy: SuccessPolicy,
    /// Add the Google Talk `client-uses-full-bind-result` marker to PLAIN
    /// `<auth/>`.
    pub google_full_bind_result: bool,
    /// The mechanisms we are willing to use.
    pub mechanisms: Vec<MechanismKind>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            success_policy: SuccessPolicy::default(),
            google_full_bind_result: true,
            mechanisms: MechanismKind::all(),
        }
    }
}

impl Config {
    /// Sets the premature success policy.
    pub fn with_success_policy(mut self, success_policy: SuccessPolicy) -> Config {
        self.success_policy = success_policy;
        self
    }

    /// Enables or disables the Google Talk marker on PLAIN `<auth/>`.
    pub fn with_google_full_bind_result(mut self, enabled: bool) -> Config {
        self.google_full_bind_result = enabled;
        self
    }

    /// Restricts the mechanisms we are willing to use.
    pub fn with_mechanisms<I: IntoIterator<Item = MechanismKind>>(mut self, mechanisms: I) -> Config {
        self.mechanisms = mechanisms.into_iter().collect();
        self
    }
}

enum ActiveMechanism {
    Plain(Plain),
    #[cfg(feature = "digest-md5")]
    DigestMd5(DigestMd5),
}

impl ActiveMechanism {
    fn from_credentials(
        kind: MechanismKind,
        credentials: &Credentials,
    ) -> Result<ActiveMechanism, MechanismError> {
        Ok(match kind {
            MechanismKind::Plain => ActiveMechanism::Plain(Plain::from_credentials(credentials)?),
            #[cfg(feature = "digest-md5")]
            MechanismKind::DigestMd5 => {
                ActiveMechanism::DigestMd5(DigestMd5::from_credentials(credentials)?)
            }
        })
    }

    fn get_mut(&mut self) -> &mut dyn Mechanism {
        match self {
            ActiveMechanism::Plain(plain) => plain,
            #[cfg(feature = "digest-md5")]
            ActiveMechanism::DigestMd5(digest) => digest,
        }
    }
}

/// One authentication attempt.
pub struct Negotiation {
    credentials: Credentials,
    config: Config,
    kind: Option<MechanismKind>,
    mechanism: Option<ActiveMechanism>,
    state: State,
    handler: Option<ResultHandler>,
    error: Option<Error>,
}

impl Negotiation {
    /// Creates an attempt which will report its outcome to `handler`.
    pub fn new<F>(credentials: Credentials, config: Config, handler: F) -> Negotiation
    where
        F: FnOnce(bool, Option<String>) + 'static,
    {
        Negotiation {
            credentials,
            config,
            kind: None,
            mechanism: None,
            state: State::NoMechanism,
            handler: Some(Box::new(handler)),
            error: None,
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The chosen mechanism, once there is one.
    pub fn mechanism(&self) -> Option<MechanismKind> {
        self.kind
    }

    /// The settings of this attempt.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the outcome has been reported.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Why the attempt failed, once it has.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Handles the server’s mechanism list: picks one and sends `<auth/>`.
    pub fn start<C, I, S>(&mut self, connection: &mut C, offered: I)
    where
        C: Connection + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.state != State::NoMechanism {
            warn!(
                "ignoring SASL mechanism list received in state {:?}",
                self.state
            );
            return;
        }
        if let Err(err) = self.try_start(connection, offered) {
            self.finish(Err(err));
        }
    }

    fn try_start<C, I, S>(&mut self, connection: &mut C, offered: I) -> Result<(), Error>
    where
        C: Connection + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kind = select_mechanism(offered, &self.config.mechanisms).ok_or_else(|| {
            debug!("no supported SASL auth mechanisms found");
            Error::NoSupportedMechanism
        })?;
        debug!("using SASL mechanism {}", kind.name());
        self.kind = Some(kind);

        let mut mechanism = ActiveMechanism::from_credentials(kind, &self.credentials)?;
        self.transition(mechanism.get_mut().pending_state());
        let Step { payload, next } = mechanism.get_mut().initial()?;
        self.mechanism = Some(mechanism);

        let mut auth = Element::builder("auth", ns::SASL).attr("mechanism", kind.name());
        if kind == MechanismKind::Plain && self.config.google_full_bind_result {
            auth = auth
                .prefix(Some("ga".to_owned()), ns::GOOGLE_AUTH)
                .map_err(Error::Stanza)?
                .attr("ga:client-uses-full-bind-result", "true");
        }
        if let Some(payload) = payload {
            auth = auth.append(Node::Text(BASE64.encode(payload)));
        }
        self.send(connection, auth.build(), next)
    }

    /// Handles a `<challenge/>` whose text is `payload`.
    pub fn challenge<C>(&mut self, connection: &mut C, payload: &str)
    where
        C: Connection + ?Sized,
    {
        if self.state.is_terminal() {
            warn!("ignoring SASL challenge received after the attempt ended");
            return;
        }
        if let Err(err) = self.try_challenge(connection, payload) {
            self.finish(Err(err));
        }
    }

    fn try_challenge<C>(&mut self, connection: &mut C, payload: &str) -> Result<(), Error>
    where
        C: Connection + ?Sized,
    {
        let state = self.state;
        let mechanism = match self.mechanism.as_mut() {
            Some(mechanism) => mechanism.get_mut(),
            None => return Err(Error::UnexpectedStanza("challenge", state)),
        };
        if !mechanism.accepts_challenge(state) {
            debug!(
                "server sent a {} challenge at the wrong time",
                mechanism.name()
            );
            return Err(MechanismError::UnexpectedChallenge(state).into());
        }
        let data = BASE64
            .decode(payload.trim())
            .map_err(Error::CannotDecodeChallenge)?;
        let challenge = Directives::parse(&data).map_err(|err| {
            debug!("server sent an invalid challenge: {}", err);
            Error::InvalidChallenge(err)
        })?;
        let Step { payload, next } = mechanism.response(state, &challenge)?;

        let mut response = Element::builder("response", ns::SASL);
        if let Some(payload) = payload {
            response = response.append(Node::Text(BASE64.encode(payload)));
        }
        self.send(connection, response.build(), next)
    }

    /// Handles `<success/>`.
    pub fn success(&mut self) {
        if self.state.is_terminal() {
            warn!("ignoring SASL success received after the attempt ended");
            return;
        }
        let state = self.state;
        let complete = match self.mechanism.as_mut() {
            Some(mechanism) => mechanism.get_mut().success(state).map_err(Error::from),
            None => Err(Error::UnexpectedStanza("success", state)),
        };
        match complete {
            Ok(()) => {
                debug!("SASL authentication successful");
                self.finish(Ok(()));
            }
            Err(err) => match self.config.success_policy {
                SuccessPolicy::TrustServer => {
                    warn!("server sent success before finishing auth: {}", err);
                    self.finish(Ok(()));
                }
                SuccessPolicy::Strict => self.finish(Err(err)),
            },
        }
    }

    /// Handles `<failure/>`, with the reason the server gave, if any.
    pub fn failure(&mut self, reason: Option<String>) {
        if self.state.is_terminal() {
            warn!("ignoring SASL failure received after the attempt ended");
            return;
        }
        let reason = reason.unwrap_or_else(|| "unknown reason".to_owned());
        debug!("SASL authentication failed: {}", reason);
        self.finish(Err(Error::Rejected(reason)));
    }

    fn send<C>(&mut self, connection: &mut C, stanza: Element, next: State) -> Result<(), Error>
    where
        C: Connection + ?Sized,
    {
        debug!("sending SASL <{}/>", stanza.name());
        connection
            .send(stanza)
            .map_err(|err| Error::Transport(err.to_string()))?;
        self.transition(next);
        Ok(())
    }

    fn transition(&mut self, next: State) {
        debug!("SASL state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn finish(&mut self, result: Result<(), Error>) {
        self.transition(match result {
            Ok(()) => State::Succeeded,
            Err(_) => State::Failed,
        });
        // Drops the expected server proof along with the mechanism.
        self.mechanism = None;
        match self.handler.take() {
            Some(handler) => match &result {
                Ok(()) => handler(true, None),
                Err(err) => handler(false, Some(err.to_string())),
            },
            None => warn!("SASL outcome already reported"),
        }
        self.error = result.err();
    }
}
