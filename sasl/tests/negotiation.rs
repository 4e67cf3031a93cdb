use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::cell::RefCell;
use std::rc::Rc;

use xmpp_sasl::common::{Credentials, Directives};
use xmpp_sasl::dispatch::{HandlerId, Priority};
use xmpp_sasl::{Config, Connection, Element, ErrorKind, HandlerResult, Sasl, StanzaKind, State};

#[derive(Default)]
struct MockConnection {
    sent: Vec<Element>,
    handlers: Vec<(StanzaKind, HandlerId, Priority)>,
    next_id: u64,
}

impl Connection for MockConnection {
    type Error = std::io::Error;

    fn send(&mut self, stanza: Element) -> Result<(), std::io::Error> {
        self.sent.push(stanza);
        Ok(())
    }

    fn register_handler(&mut self, kind: StanzaKind, priority: Priority) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.push((kind, id, priority));
        id
    }

    fn unregister_handler(&mut self, kind: StanzaKind, id: HandlerId) {
        self.handlers
            .retain(|&(other_kind, other_id, _)| (other_kind, other_id) != (kind, id));
    }
}

type Outcomes = Rc<RefCell<Vec<(bool, Option<String>)>>>;

fn attach(connection: &mut MockConnection, credentials: Credentials) -> (Sasl<&mut MockConnection>, Outcomes) {
    let outcomes = Outcomes::default();
    let recorder = outcomes.clone();
    let sasl = Sasl::new(connection, credentials, move |ok, reason| {
        recorder.borrow_mut().push((ok, reason))
    });
    (sasl, outcomes)
}

fn juliet() -> Credentials {
    Credentials::default()
        .with_username("juliet")
        .with_password("r0m30myr0m30")
        .with_server("capulet.lit")
}

fn features(mechanisms: &[&str]) -> Element {
    let list: String = mechanisms
        .iter()
        .map(|name| format!("<mechanism>{}</mechanism>", name))
        .collect();
    format!(
        "<stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
           <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{}</mechanisms>\
         </stream:features>",
        list
    )
    .parse()
    .unwrap()
}

fn sasl_stanza(name: &str, text: &str) -> Element {
    format!(
        "<{0} xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{1}</{0}>",
        name, text
    )
    .parse()
    .unwrap()
}

/// Writes a stanza out the way a transport would, and reads it back.
fn reparse(stanza: &Element) -> Element {
    let mut buf = Vec::new();
    stanza.write_to(&mut buf).unwrap();
    String::from_utf8(buf).unwrap().parse().unwrap()
}

#[test]
fn plain_auth_serializes() {
    let mut connection = MockConnection::default();
    let (mut sasl, _outcomes) = attach(&mut connection, juliet());
    sasl.dispatch(&features(&["PLAIN"]));

    let auth = reparse(&sasl.connection().sent[0]);
    assert!(auth.is("auth", "urn:ietf:params:xml:ns:xmpp-sasl"));
    assert_eq!(auth.attr("mechanism"), Some("PLAIN"));
    assert_eq!(auth.attr("ga:client-uses-full-bind-result"), Some("true"));
    assert_eq!(auth.text(), "AGp1bGlldAByMG0zMG15cjBtMzA=");
}

#[test]
fn plain_auth_without_google_marker_serializes() {
    let mut connection = MockConnection::default();
    let config = Config::default().with_google_full_bind_result(false);
    let mut sasl = Sasl::with_config(&mut connection, juliet(), config, |_, _| ());
    sasl.dispatch(&features(&["PLAIN"]));

    let auth = reparse(&sasl.connection().sent[0]);
    assert!(auth.is("auth", "urn:ietf:params:xml:ns:xmpp-sasl"));
    assert_eq!(auth.attr("ga:client-uses-full-bind-result"), None);
    assert_eq!(auth.text(), "AGp1bGlldAByMG0zMG15cjBtMzA=");
}

#[test]
#[cfg(feature = "digest-md5")]
fn digest_md5_stanzas_serialize() {
    use xmpp_sasl::common::digest::{DigestInputs, XMPP_SERV_TYPE};

    let mut connection = MockConnection::default();
    let (mut sasl, outcomes) = attach(&mut connection, juliet());
    sasl.dispatch(&features(&["DIGEST-MD5"]));
    let challenge = BASE64.encode("realm=\"capulet.lit\",nonce=\"abcd\",qop=\"auth\"");
    sasl.dispatch(&sasl_stanza("challenge", &challenge));

    let auth = reparse(&sasl.connection().sent[0]);
    assert!(auth.is("auth", "urn:ietf:params:xml:ns:xmpp-sasl"));
    assert_eq!(auth.attr("mechanism"), Some("DIGEST-MD5"));
    assert_eq!(auth.attr("ga:client-uses-full-bind-result"), None);
    assert_eq!(auth.text(), "");

    let response = reparse(&sasl.connection().sent[1]);
    assert!(response.is("response", "urn:ietf:params:xml:ns:xmpp-sasl"));
    let directives = Directives::parse(&BASE64.decode(response.text()).unwrap()).unwrap();
    let expected = DigestInputs {
        username: "juliet",
        realm: "capulet.lit",
        password: "r0m30myr0m30",
        nonce: "abcd",
        cnonce: directives.get("cnonce").unwrap(),
        serv_type: XMPP_SERV_TYPE,
    }
    .compute();
    assert_eq!(directives.get("response"), Some(expected.response.as_str()));

    let proof = BASE64.encode(format!("rspauth={}", expected.server_proof));
    sasl.dispatch(&sasl_stanza("challenge", &proof));
    let last = reparse(&sasl.connection().sent[2]);
    assert!(last.is("response", "urn:ietf:params:xml:ns:xmpp-sasl"));
    assert_eq!(last.text(), "");

    sasl.dispatch(&sasl_stanza("success", ""));
    assert_eq!(*outcomes.borrow(), vec![(true, None)]);
}

#[test]
fn registers_and_unregisters_handlers() {
    let mut connection = MockConnection::default();
    {
        let (_sasl, outcomes) = attach(&mut connection, juliet());
        assert!(outcomes.borrow().is_empty());
    }
    assert!(connection.handlers.is_empty());
    assert_eq!(connection.next_id, 4);

    let mut connection = MockConnection::default();
    let (sasl, _outcomes) = attach(&mut connection, juliet());
    let kinds: Vec<StanzaKind> = sasl
        .connection()
        .handlers
        .iter()
        .map(|&(kind, _, priority)| {
            assert_eq!(priority, Priority::First);
            kind
        })
        .collect();
    assert_eq!(kinds, StanzaKind::ALL.to_vec());
}

#[test]
fn plain_negotiation() {
    let mut connection = MockConnection::default();
    let (mut sasl, outcomes) = attach(&mut connection, juliet());

    // The rest of the stream setup needs the features as well.
    assert_eq!(
        sasl.dispatch(&features(&["PLAIN", "X-OAUTH2"])),
        HandlerResult::AllowMoreHandlers
    );
    assert_eq!(sasl.negotiation().state(), State::SimpleAuthSent);
    {
        let auth = &sasl.connection().sent[0];
        assert!(auth.is("auth", "urn:ietf:params:xml:ns:xmpp-sasl"));
        assert_eq!(auth.attr("mechanism"), Some("PLAIN"));
        assert_eq!(
            BASE64.decode(auth.text()).unwrap(),
            b"\0juliet\0r0m30myr0m30".to_vec()
        );
    }

    assert_eq!(
        sasl.dispatch(&sasl_stanza("success", "")),
        HandlerResult::RemoveMessage
    );
    assert_eq!(sasl.negotiation().state(), State::Succeeded);
    assert_eq!(*outcomes.borrow(), vec![(true, None)]);
}

#[test]
#[cfg(feature = "digest-md5")]
fn digest_md5_negotiation() {
    use xmpp_sasl::common::digest::{DigestInputs, XMPP_SERV_TYPE};

    let mut connection = MockConnection::default();
    let (mut sasl, outcomes) = attach(&mut connection, juliet());

    sasl.dispatch(&features(&["PLAIN", "DIGEST-MD5"]));
    assert_eq!(sasl.negotiation().state(), State::ChallengeResponsePending);
    {
        let auth = &sasl.connection().sent[0];
        assert_eq!(auth.attr("mechanism"), Some("DIGEST-MD5"));
        assert_eq!(auth.text(), "");
        assert_eq!(auth.attr("ga:client-uses-full-bind-result"), None);
    }

    let challenge =
        BASE64.encode("realm=\"capulet.lit\",nonce=\"3858f62230ac3c915f300c664312c63f\",qop=\"auth\",charset=utf-8,algorithm=md5-sess");
    assert_eq!(
        sasl.dispatch(&sasl_stanza("challenge", &challenge)),
        HandlerResult::RemoveMessage
    );
    assert_eq!(sasl.negotiation().state(), State::ChallengeResponseAuthSent);

    let response = {
        let stanza = &sasl.connection().sent[1];
        assert!(stanza.is("response", "urn:ietf:params:xml:ns:xmpp-sasl"));
        Directives::parse(&BASE64.decode(stanza.text()).unwrap()).unwrap()
    };
    assert_eq!(response.get("username"), Some("juliet"));
    assert_eq!(response.get("realm"), Some("capulet.lit"));
    assert_eq!(response.get("digest-uri"), Some("xmpp/capulet.lit"));
    assert_eq!(response.get("nc"), Some("00000001"));
    assert_eq!(response.get("qop"), Some("auth"));
    assert_eq!(response.get("charset"), Some("utf-8"));

    let cnonce = response.get("cnonce").unwrap();
    let expected = DigestInputs {
        username: "juliet",
        realm: "capulet.lit",
        password: "r0m30myr0m30",
        nonce: "3858f62230ac3c915f300c664312c63f",
        cnonce,
        serv_type: XMPP_SERV_TYPE,
    }
    .compute();
    assert_eq!(response.get("response"), Some(expected.response.as_str()));

    let proof = BASE64.encode(format!("rspauth={}", expected.server_proof));
    sasl.dispatch(&sasl_stanza("challenge", &proof));
    assert_eq!(sasl.negotiation().state(), State::ChallengeResponseFinalSent);
    {
        let last = &sasl.connection().sent[2];
        assert!(last.is("response", "urn:ietf:params:xml:ns:xmpp-sasl"));
        assert_eq!(last.text(), "");
    }
    assert!(outcomes.borrow().is_empty());

    sasl.dispatch(&sasl_stanza("success", ""));
    assert_eq!(sasl.negotiation().state(), State::Succeeded);
    assert_eq!(*outcomes.borrow(), vec![(true, None)]);
}

#[test]
#[cfg(feature = "digest-md5")]
fn digest_md5_rejects_wrong_server_proof() {
    let mut connection = MockConnection::default();
    let (mut sasl, outcomes) = attach(&mut connection, juliet());

    sasl.dispatch(&features(&["DIGEST-MD5"]));
    let challenge = BASE64.encode("nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\"");
    sasl.dispatch(&sasl_stanza("challenge", &challenge));
    let proof = BASE64.encode("rspauth=00000000000000000000000000000000");
    sasl.dispatch(&sasl_stanza("challenge", &proof));

    assert_eq!(sasl.negotiation().state(), State::Failed);
    assert_eq!(
        sasl.negotiation().error().map(|err| err.kind()),
        Some(ErrorKind::Verification)
    );
    assert_eq!(sasl.connection().sent.len(), 2);
    assert_eq!(outcomes.borrow().len(), 1);
    assert!(!outcomes.borrow()[0].0);

    // Whatever the server says next, the outcome stays reported once.
    sasl.dispatch(&sasl_stanza("success", ""));
    assert_eq!(outcomes.borrow().len(), 1);
}

#[test]
fn server_failure() {
    let mut connection = MockConnection::default();
    let (mut sasl, outcomes) = attach(&mut connection, juliet());

    sasl.dispatch(&features(&["PLAIN"]));
    let failure: Element = "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
                              <text>Password not verified</text>\
                            </failure>"
        .parse()
        .unwrap();
    assert_eq!(sasl.dispatch(&failure), HandlerResult::RemoveMessage);
    assert_eq!(sasl.negotiation().state(), State::Failed);
    assert_eq!(
        *outcomes.borrow(),
        vec![(false, Some("Password not verified".to_owned()))]
    );
}

#[test]
fn server_failure_without_reason() {
    let mut connection = MockConnection::default();
    let (mut sasl, outcomes) = attach(&mut connection, juliet());

    sasl.dispatch(&features(&["PLAIN"]));
    let failure: Element = "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
                              <not-authorized/>\
                            </failure>"
        .parse()
        .unwrap();
    sasl.dispatch(&failure);
    assert_eq!(
        *outcomes.borrow(),
        vec![(false, Some("unknown reason".to_owned()))]
    );
}

#[test]
fn ignores_foreign_namespaces() {
    let mut connection = MockConnection::default();
    let (mut sasl, outcomes) = attach(&mut connection, juliet());

    let foreign: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
                              <mechanisms xmlns='urn:example:not-sasl'>\
                                <mechanism>PLAIN</mechanism>\
                              </mechanisms>\
                            </stream:features>"
        .parse()
        .unwrap();
    assert_eq!(sasl.dispatch(&foreign), HandlerResult::AllowMoreHandlers);
    assert_eq!(sasl.negotiation().state(), State::NoMechanism);
    assert!(sasl.connection().sent.is_empty());

    let success: Element = "<success xmlns='urn:example:not-sasl'/>".parse().unwrap();
    assert_eq!(sasl.dispatch(&success), HandlerResult::AllowMoreHandlers);
    assert!(outcomes.borrow().is_empty());

    let message: Element = "<message xmlns='jabber:client'/>".parse().unwrap();
    assert_eq!(sasl.dispatch(&message), HandlerResult::AllowMoreHandlers);

    // Features without any mechanism list leave the attempt untouched.
    let bare: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'/>"
        .parse()
        .unwrap();
    assert_eq!(sasl.dispatch(&bare), HandlerResult::AllowMoreHandlers);
    assert_eq!(sasl.negotiation().state(), State::NoMechanism);
}

#[test]
fn restricted_mechanisms() {
    let mut connection = MockConnection::default();
    let outcomes = Outcomes::default();
    let recorder = outcomes.clone();
    let config = Config::default().with_mechanisms(vec![xmpp_sasl::MechanismKind::Plain]);
    let mut sasl = Sasl::with_config(&mut connection, juliet(), config, move |ok, reason| {
        recorder.borrow_mut().push((ok, reason))
    });

    sasl.dispatch(&features(&["DIGEST-MD5", "PLAIN"]));
    assert_eq!(
        sasl.negotiation().mechanism(),
        Some(xmpp_sasl::MechanismKind::Plain)
    );
    assert_eq!(sasl.connection().sent[0].attr("mechanism"), Some("PLAIN"));
}
