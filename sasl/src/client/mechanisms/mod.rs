//! Provides the supported SASL mechanisms.

#[cfg(feature = "digest-md5")]
mod digest_md5;
mod plain;

#[cfg(feature = "digest-md5")]
#[cfg_attr(docsrs, doc(cfg(feature = "digest-md5")))]
pub use self::digest_md5::DigestMd5;
pub use self::plain::Plain;
