//! Credentials and the `key=value` directive format shared by the mechanisms.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::str::Utf8Error;

use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(feature = "digest-md5")]
pub mod digest;

/// A struct containing SASL credentials.
///
/// Every field is optional; whether a missing one is an error depends on the
/// mechanism the server lets us pick.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// The username (authentication identity).
    pub username: Option<String>,
    /// The plaintext password.
    pub password: Option<String>,
    /// The server name, used as the realm when a challenge doesn’t carry one.
    pub server: Option<String>,
}

impl Credentials {
    /// Creates a new Credentials with the specified username.
    pub fn with_username<N: Into<String>>(mut self, username: N) -> Credentials {
        self.username = Some(username.into());
        self
    }

    /// Creates a new Credentials with the specified plaintext password.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Credentials {
        self.password = Some(password.into());
        self
    }

    /// Creates a new Credentials with the specified server name.
    pub fn with_server<S: Into<String>>(mut self, server: S) -> Credentials {
        self.server = Some(server.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("server", &self.server)
            .finish()
    }
}

/// The ways a challenge payload can fail to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    /// The payload isn’t valid UTF-8.
    InvalidUtf8(Utf8Error),
    /// A directive starts with `=`.
    EmptyKey,
    /// A key isn’t followed by `=`.
    MissingEquals(String),
    /// A directive has an empty value, quoted or not.
    EmptyValue(String),
    /// A quoted value never gets its closing quote.
    UnterminatedQuote(String),
    /// A closing quote is followed by something other than `,`.
    TrailingData(String),
}

impl From<Utf8Error> for DirectiveError {
    fn from(err: Utf8Error) -> DirectiveError {
        DirectiveError::InvalidUtf8(err)
    }
}

impl fmt::Display for DirectiveError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DirectiveError::InvalidUtf8(err) => write!(fmt, "invalid UTF-8: {}", err),
            DirectiveError::EmptyKey => write!(fmt, "empty directive name"),
            DirectiveError::MissingEquals(key) => write!(fmt, "no value for directive {:?}", key),
            DirectiveError::EmptyValue(key) => write!(fmt, "empty value for directive {:?}", key),
            DirectiveError::UnterminatedQuote(key) => {
                write!(fmt, "unterminated quoted value for directive {:?}", key)
            }
            DirectiveError::TrailingData(key) => {
                write!(fmt, "unexpected data after quoted value of directive {:?}", key)
            }
        }
    }
}

impl StdError for DirectiveError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DirectiveError::InvalidUtf8(err) => Some(err),
            _ => None,
        }
    }
}

/// The directives of a decoded challenge, as a name to value mapping.
///
/// Quoted values are stored unescaped. When a name appears more than once,
/// the last value wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Directives(HashMap<String, String>);

impl Directives {
    /// Parses a `key1=value1,key2="value2",…` payload.
    ///
    /// Nothing is returned on failure, not even the directives which parsed
    /// fine before the faulty one.
    pub fn parse(data: &[u8]) -> Result<Directives, DirectiveError> {
        let input = std::str::from_utf8(data)?;
        let bytes = input.as_bytes();
        let mut ret = HashMap::new();
        let mut pos = 0;
        loop {
            // Empty list elements and white space before a name are allowed.
            while pos < bytes.len() && is_separator(bytes[pos]) {
                pos += 1;
            }
            if pos == bytes.len() && !ret.is_empty() {
                break;
            }
            let key_start = pos;
            while pos < bytes.len() && bytes[pos] != b'=' {
                pos += 1;
            }
            if pos == key_start {
                return Err(DirectiveError::EmptyKey);
            }
            let key = &input[key_start..pos];
            if pos == bytes.len() {
                return Err(DirectiveError::MissingEquals(key.to_owned()));
            }
            pos += 1;

            let value = if bytes.get(pos) == Some(&b'"') {
                pos += 1;
                let (value, len) = unquote(&input[pos..])
                    .ok_or_else(|| DirectiveError::UnterminatedQuote(key.to_owned()))?;
                pos += len;
                while pos < bytes.len() && is_lws(bytes[pos]) {
                    pos += 1;
                }
                if pos < bytes.len() && bytes[pos] != b',' {
                    return Err(DirectiveError::TrailingData(key.to_owned()));
                }
                value
            } else {
                let value_start = pos;
                while pos < bytes.len() && bytes[pos] != b',' {
                    pos += 1;
                }
                input[value_start..pos].to_owned()
            };
            if value.is_empty() {
                return Err(DirectiveError::EmptyValue(key.to_owned()));
            }
            ret.insert(key.to_owned(), value);

            // Skip the separator, a trailing one is tolerated.
            if pos < bytes.len() {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }
        }
        Ok(Directives(ret))
    }

    /// Returns the value of the directive `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The number of directives.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there is no directive at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all directives, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn is_lws(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_separator(byte: u8) -> bool {
    byte == b',' || is_lws(byte)
}

/// Reads a quoted value whose opening quote has already been consumed.
///
/// Returns the unescaped value and the number of bytes consumed, closing
/// quote included.
fn unquote(input: &str) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some((value, i + 1));
        } else {
            value.push(c);
        }
    }
    None
}

/// Builds an outgoing directive string.
#[derive(Debug, Default)]
pub struct DirectivesWriter {
    buf: String,
}

impl DirectivesWriter {
    /// Creates an empty writer.
    pub fn new() -> DirectivesWriter {
        DirectivesWriter::default()
    }

    /// Appends `key="value"`, escaping `\` and `"` inside the value.
    pub fn quoted(&mut self, key: &str, value: &str) -> &mut DirectivesWriter {
        self.separator();
        self.buf.push_str(key);
        self.buf.push_str("=\"");
        for c in value.chars() {
            if c == '\\' || c == '"' {
                self.buf.push('\\');
            }
            self.buf.push(c);
        }
        self.buf.push('"');
        self
    }

    /// Appends `key=value` as is; only for tokens which never need quoting.
    pub fn bare(&mut self, key: &str, value: &str) -> &mut DirectivesWriter {
        self.separator();
        self.buf.push_str(key);
        self.buf.push('=');
        self.buf.push_str(value);
        self
    }

    /// Returns the directive string built so far.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    fn separator(&mut self) {
        if !self.buf.is_empty() {
            self.buf.push(',');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_quoted_values() {
        let directives = Directives::parse(
            b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\",algorithm=md5-sess,charset=utf-8",
        )
        .unwrap();
        assert_eq!(directives.len(), 5);
        assert_eq!(directives.get("realm"), Some("elwood.innosoft.com"));
        assert_eq!(directives.get("nonce"), Some("OA6MG9tEQGm2hh"));
        assert_eq!(directives.get("qop"), Some("auth"));
        assert_eq!(directives.get("algorithm"), Some("md5-sess"));
        assert_eq!(directives.get("charset"), Some("utf-8"));
        assert_eq!(directives.get("cipher"), None);
    }

    #[test]
    fn unescapes_quoted_values() {
        let directives =
            Directives::parse(br#"realm="a\"b\\c",nonce="x,y=z",rspauth=deadbeef"#).unwrap();
        assert_eq!(directives.get("realm"), Some(r#"a"b\c"#));
        assert_eq!(directives.get("nonce"), Some("x,y=z"));
        assert_eq!(directives.get("rspauth"), Some("deadbeef"));
    }

    #[test]
    fn keeps_multibyte_characters() {
        let directives = Directives::parse("realm=\"żółw\\ł\",x=é".as_bytes()).unwrap();
        assert_eq!(directives.get("realm"), Some("żółwł"));
        assert_eq!(directives.get("x"), Some("é"));
    }

    #[test]
    fn last_duplicate_wins() {
        let directives = Directives::parse(b"realm=one,realm=\"two\"").unwrap();
        assert_eq!(directives.len(), 1);
        assert_eq!(directives.get("realm"), Some("two"));
    }

    #[test]
    fn tolerates_trailing_comma() {
        let directives = Directives::parse(b"rspauth=ea40f60335c427b5527b84dbabcdfffd,").unwrap();
        assert_eq!(
            directives.get("rspauth"),
            Some("ea40f60335c427b5527b84dbabcdfffd")
        );
    }

    #[test]
    fn skips_empty_elements_and_white_space() {
        let directives = Directives::parse(b"a=b,,c=d").unwrap();
        assert_eq!(directives.len(), 2);
        assert_eq!(directives.get("c"), Some("d"));

        let directives =
            Directives::parse(b" nonce=\"abc\" ,\r\n qop=auth,\tcharset=utf-8,,").unwrap();
        assert_eq!(directives.len(), 3);
        assert_eq!(directives.get("nonce"), Some("abc"));
        assert_eq!(directives.get("qop"), Some("auth"));
        assert_eq!(directives.get("charset"), Some("utf-8"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(Directives::parse(b""), Err(DirectiveError::EmptyKey));
        assert_eq!(Directives::parse(b", ,"), Err(DirectiveError::EmptyKey));
        assert_eq!(Directives::parse(b"=value"), Err(DirectiveError::EmptyKey));
        assert_eq!(Directives::parse(b"a=b,=c"), Err(DirectiveError::EmptyKey));
        assert_eq!(
            Directives::parse(b"nonce"),
            Err(DirectiveError::MissingEquals("nonce".to_owned()))
        );
        assert_eq!(
            Directives::parse(b"a=b,nonce"),
            Err(DirectiveError::MissingEquals("nonce".to_owned()))
        );
        assert_eq!(
            Directives::parse(b"nonce="),
            Err(DirectiveError::EmptyValue("nonce".to_owned()))
        );
        assert_eq!(
            Directives::parse(b"nonce=,realm=x"),
            Err(DirectiveError::EmptyValue("nonce".to_owned()))
        );
        assert_eq!(
            Directives::parse(b"nonce=\"\""),
            Err(DirectiveError::EmptyValue("nonce".to_owned()))
        );
        assert_eq!(
            Directives::parse(b"nonce=\"abc"),
            Err(DirectiveError::UnterminatedQuote("nonce".to_owned()))
        );
        assert_eq!(
            Directives::parse(br#"nonce="abc\""#),
            Err(DirectiveError::UnterminatedQuote("nonce".to_owned()))
        );
        assert_eq!(
            Directives::parse(b"nonce=\"abc\"def"),
            Err(DirectiveError::TrailingData("nonce".to_owned()))
        );
        assert!(matches!(
            Directives::parse(b"nonce=\xff"),
            Err(DirectiveError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn writer_output_parses_back() {
        let fields = [
            ("username", r#"ju"li\et"#),
            ("realm", "capulet.lit"),
            ("digest-uri", "xmpp/capulet.lit"),
            ("cnonce", "a+b/c=="),
        ];
        let mut writer = DirectivesWriter::new();
        for (key, value) in fields.iter() {
            writer.quoted(key, value);
        }
        writer.bare("nc", "00000001").bare("qop", "auth");
        let out = writer.finish();
        assert!(out.starts_with(r#"username="ju\"li\\et",realm="capulet.lit""#));

        let directives = Directives::parse(out.as_bytes()).unwrap();
        assert_eq!(directives.len(), fields.len() + 2);
        for (key, value) in fields.iter() {
            assert_eq!(directives.get(key), Some(*value));
        }
        assert_eq!(directives.get("nc"), Some("00000001"));
        assert_eq!(directives.get("qop"), Some("auth"));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::default()
            .with_username("juliet")
            .with_password("r0m30myr0m30");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("juliet"));
        assert!(!debug.contains("r0m30myr0m30"));
    }
}
