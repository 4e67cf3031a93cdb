//! XML namespaces used during SASL negotiation.

/// RFC 6120: XMPP Core, SASL negotiation.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// Google Talk authentication extensions.
pub const GOOGLE_AUTH: &str = "http://www.google.com/talk/protocol/auth";
