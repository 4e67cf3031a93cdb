use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::env::args;
use std::fmt;

use xmpp_sasl::common::digest::{DigestInputs, XMPP_SERV_TYPE};
use xmpp_sasl::common::{Credentials, Directives};
use xmpp_sasl::dispatch::{HandlerId, Priority};
use xmpp_sasl::{Connection, Element, Sasl, StanzaKind};

/// Prints what the client sends and keeps the last stanza for the fake server.
#[derive(Default)]
struct Console {
    last: Option<Element>,
    next_id: u64,
}

#[derive(Debug)]
struct Closed;

impl fmt::Display for Closed {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "console closed")
    }
}

impl Connection for Console {
    type Error = Closed;

    fn send(&mut self, stanza: Element) -> Result<(), Closed> {
        println!("C: {}", String::from(&stanza));
        self.last = Some(stanza);
        Ok(())
    }

    fn register_handler(&mut self, kind: StanzaKind, priority: Priority) -> HandlerId {
        self.next_id += 1;
        println!("registered {:?} handler at {:?} priority", kind, priority);
        HandlerId(self.next_id)
    }

    fn unregister_handler(&mut self, kind: StanzaKind, id: HandlerId) {
        println!("unregistered {:?} handler {:?}", kind, id);
    }
}

fn server(stanza: &str) -> Element {
    println!("S: {}", stanza);
    stanza.parse().unwrap()
}

fn main() {
    env_logger::init();

    let args: Vec<String> = args().collect();
    if args.len() != 3 {
        println!("Usage: {} <username> <password>", args[0]);
        return;
    }
    let (username, password) = (&args[1], &args[2]);
    let realm = "capulet.lit";
    let nonce = "OA6MG9tEQGm2hh";

    let credentials = Credentials::default()
        .with_username(username.as_str())
        .with_password(password.as_str())
        .with_server(realm);
    let mut sasl = Sasl::new(Console::default(), credentials, |ok, reason| match reason {
        None if ok => println!("Authenticated."),
        reason => println!("Authentication failed: {:?}", reason),
    });

    sasl.dispatch(&server(
        "<stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
           <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
             <mechanism>PLAIN</mechanism><mechanism>DIGEST-MD5</mechanism>\
           </mechanisms>\
         </stream:features>",
    ));

    let challenge = BASE64.encode(format!(
        "realm=\"{}\",nonce=\"{}\",qop=\"auth\",charset=utf-8,algorithm=md5-sess",
        realm, nonce
    ));
    sasl.dispatch(&server(&format!(
        "<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{}</challenge>",
        challenge
    )));

    // Play the server: check the response and prove we know the password too.
    let response = match sasl.connection_mut().last.take() {
        Some(response) => response,
        None => return,
    };
    let directives = Directives::parse(&BASE64.decode(response.text()).unwrap()).unwrap();
    let expected = DigestInputs {
        username,
        realm,
        password,
        nonce,
        cnonce: directives.get("cnonce").unwrap_or_default(),
        serv_type: XMPP_SERV_TYPE,
    }
    .compute();
    if directives.get("response") != Some(expected.response.as_str()) {
        sasl.dispatch(&server(
            "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><text>bad response</text></failure>",
        ));
        return;
    }

    let rspauth = BASE64.encode(format!("rspauth={}", expected.server_proof));
    sasl.dispatch(&server(&format!(
        "<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>{}</challenge>",
        rspauth
    )));
    sasl.dispatch(&server("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>"));
    println!("Final state: {:?}", sasl.negotiation().state());
}
