#![deny(unsafe_code, bare_trait_objects)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! This crate negotiates SASL authentication on an XMPP stream, using the PLAIN or
//! DIGEST-MD5 mechanisms.
//!
//! # Examples
//!
//! A mechanism can be used on its own:
//!
//! ```rust
//! use xmpp_sasl::client::Mechanism;
//! use xmpp_sasl::client::mechanisms::Plain;
//! use xmpp_sasl::common::Credentials;
//!
//! let creds = Credentials::default()
//!                         .with_username("user")
//!                         .with_password("pencil");
//!
//! let mut mechanism = Plain::from_credentials(&creds).unwrap();
//!
//! let step = mechanism.initial().unwrap();
//!
//! assert_eq!(step.payload.as_deref(), Some(&b"\0user\0pencil"[..]));
//! ```
//!
//! More commonly, a [`Sasl`] is attached to a [`Connection`] and fed the stanzas the
//! connection routes to it, see `examples/negotiate.rs`.
//!
//! # Usage
//!
//! You can use this in your crate by adding this under `dependencies` in your `Cargo.toml`:
//!
//! ```toml,ignore
//! xmpp-sasl = "*"
//! ```

pub mod client;
pub mod common;
pub mod dispatch;
mod error;
pub mod negotiation;
pub mod ns;

pub use crate::common::Credentials;
pub use crate::dispatch::{Connection, HandlerResult, Sasl, StanzaKind};
pub use crate::error::{Error, ErrorKind};
pub use crate::negotiation::{Config, MechanismKind, Negotiation, State, SuccessPolicy};
pub use minidom::Element;
