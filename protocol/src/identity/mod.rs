//! # Identity Module
//!
//! How parties are named on the ledger. A party is a secp256k1 keypair; the
//! ledger only ever sees its [`Address`], a 20-byte digest of the public
//! key rendered as `0x` + 40 hex digits.

pub mod address;

pub use address::{Address, AddressError};
