//! Credential wrapper for macaroons and API tokens.
//!
//! `SecretString` holds bearer-style credentials read from disk. The memory is
//! zeroed on drop and `Debug` prints a placeholder, so a
//! credential can be stored inside client structs that are logged freely.

use std::fmt;
use zeroize::Zeroizing;

/// A credential string that zeroes its memory on drop and never prints itself.
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	fn new(s: String) -> Self {
		Self(Zeroizing::new(s))
	}

	/// Hex-encodes raw credential bytes, as node RPC headers expect for macaroons.
	pub fn from_bytes_hex(bytes: &[u8]) -> Self {
		Self::new(hex::encode(bytes))
	}

	/// Exposes the secret as a string slice.
	///
	/// Callers must not log or persist the returned value.
	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	/// Returns true if no credential was provided.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString(***REDACTED***)")
	}
}

impl From<&str> for SecretString {
	fn from(s: &str) -> Self {
		Self::new(s.to_string())
	}
}
