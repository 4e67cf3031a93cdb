//! Glue between a connection’s stanza routing and a [`Negotiation`].
//!
//! The connection owns the routing: it is told which stanza types to hand
//! over, at which priority, and asks [`Sasl::handle`] whether a stanza has
//! been consumed.

use log::debug;
use minidom::Element;
use std::fmt;

use crate::common::Credentials;
use crate::negotiation::{Config, Negotiation};
use crate::ns;

/// The stanza types the negotiation listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaKind {
    /// `<stream:features/>`
    StreamFeatures,
    /// `<challenge/>`
    Challenge,
    /// `<success/>`
    Success,
    /// `<failure/>`
    Failure,
}

impl StanzaKind {
    /// All four kinds, in registration order.
    pub const ALL: [StanzaKind; 4] = [
        StanzaKind::StreamFeatures,
        StanzaKind::Challenge,
        StanzaKind::Success,
        StanzaKind::Failure,
    ];

    /// Classifies a stanza by its name.
    pub fn of(stanza: &Element) -> Option<StanzaKind> {
        match stanza.name() {
            "features" => Some(StanzaKind::StreamFeatures),
            "challenge" => Some(StanzaKind::Challenge),
            "success" => Some(StanzaKind::Success),
            "failure" => Some(StanzaKind::Failure),
            _ => None,
        }
    }
}

/// When a handler runs relative to the others registered for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Before any other handler.
    First,
    /// In registration order.
    Normal,
    /// After every other handler.
    Last,
}

/// Whether a stanza should be offered to further handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// The stanza has been consumed.
    RemoveMessage,
    /// Let other handlers see it.
    AllowMoreHandlers,
}

/// Identifies a handler registration on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// What the negotiation needs from the connection it runs on.
pub trait Connection {
    /// Why sending failed.
    type Error: fmt::Display;

    /// Sends a stanza; once this returns `Ok` it is considered sent.
    fn send(&mut self, stanza: Element) -> Result<(), Self::Error>;

    /// Asks for stanzas of `kind` to be routed to us.
    fn register_handler(&mut self, kind: StanzaKind, priority: Priority) -> HandlerId;

    /// Stops routing stanzas to a registration.
    fn unregister_handler(&mut self, kind: StanzaKind, id: HandlerId);
}

impl<T: Connection + ?Sized> Connection for &mut T {
    type Error = T::Error;

    fn send(&mut self, stanza: Element) -> Result<(), Self::Error> {
        (**self).send(stanza)
    }

    fn register_handler(&mut self, kind: StanzaKind, priority: Priority) -> HandlerId {
        (**self).register_handler(kind, priority)
    }

    fn unregister_handler(&mut self, kind: StanzaKind, id: HandlerId) {
        (**self).unregister_handler(kind, id)
    }
}

/// A SASL negotiation attached to a connection.
///
/// Creating it registers the four handlers, dropping it unregisters them
/// and wipes the credentials.
pub struct Sasl<C: Connection> {
    connection: C,
    negotiation: Negotiation,
    handlers: Vec<(StanzaKind, HandlerId)>,
}

impl<C: Connection> Sasl<C> {
    /// Attaches a negotiation to `connection`, reporting to `handler`.
    pub fn new<F>(connection: C, credentials: Credentials, handler: F) -> Sasl<C>
    where
        F: FnOnce(bool, Option<String>) + 'static,
    {
        Sasl::with_config(connection, credentials, Config::default(), handler)
    }

    /// Same as [`Sasl::new`], with custom settings.
    pub fn with_config<F>(
        mut connection: C,
        credentials: Credentials,
        config: Config,
        handler: F,
    ) -> Sasl<C>
    where
        F: FnOnce(bool, Option<String>) + 'static,
    {
        let handlers = StanzaKind::ALL
            .iter()
            .map(|&kind| (kind, connection.register_handler(kind, Priority::First)))
            .collect();
        Sasl {
            connection,
            negotiation: Negotiation::new(credentials, config, handler),
            handlers,
        }
    }

    /// The negotiation driven by this adapter.
    pub fn negotiation(&self) -> &Negotiation {
        &self.negotiation
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// The underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Routes a stanza by its name; stanzas we don’t listen to are left alone.
    pub fn dispatch(&mut self, stanza: &Element) -> HandlerResult {
        match StanzaKind::of(stanza) {
            Some(kind) => self.handle(kind, stanza),
            None => HandlerResult::AllowMoreHandlers,
        }
    }

    /// Handles a stanza the connection routed to us as `kind`.
    pub fn handle(&mut self, kind: StanzaKind, stanza: &Element) -> HandlerResult {
        match kind {
            StanzaKind::StreamFeatures => {
                self.features(stanza);
                // Resource binding and friends need the features too.
                HandlerResult::AllowMoreHandlers
            }
            _ if !stanza.has_ns(ns::SASL) => HandlerResult::AllowMoreHandlers,
            _ => {
                debug!("received SASL <{}/>", stanza.name());
                self.consume(kind, stanza);
                HandlerResult::RemoveMessage
            }
        }
    }

    fn consume(&mut self, kind: StanzaKind, stanza: &Element) {
        match kind {
            StanzaKind::Challenge => self
                .negotiation
                .challenge(&mut self.connection, &stanza.text()),
            StanzaKind::Success => self.negotiation.success(),
            StanzaKind::Failure => {
                let reason = stanza
                    .children()
                    .next()
                    .map(|child| child.text())
                    .filter(|text| !text.is_empty());
                self.negotiation.failure(reason);
            }
            StanzaKind::StreamFeatures => (),
        }
    }

    fn features(&mut self, stanza: &Element) {
        let mechanisms = match stanza.children().find(|child| child.name() == "mechanisms") {
            Some(mechanisms) => mechanisms,
            None => return,
        };
        if !mechanisms.has_ns(ns::SASL) {
            debug!("ignoring mechanisms outside of the SASL namespace");
            return;
        }
        let offered: Vec<String> = mechanisms
            .children()
            .map(|mechanism| mechanism.text())
            .filter(|name| !name.is_empty())
            .collect();
        self.negotiation.start(&mut self.connection, &offered);
    }
}

impl<C: Connection> Drop for Sasl<C> {
    fn drop(&mut self) {
        for (kind, id) in self.handlers.drain(..) {
            self.connection.unregister_handler(kind, id);
        }
    }
}
