//! Delta output mode: fingerprint what the client already has, send only
//! what changed.

pub mod cache;
pub mod canonical;
pub mod diff;

pub use cache::{DeltaCache, DeltaKey};
pub use canonical::{canonical_json, hash_value, sha256_hex};
pub use diff::{
    ChangedMessage, Fingerprints, MessageDelta, VariableDelta, diff_messages, diff_variables,
    message_fingerprints, snapshot, variable_fingerprints, variables_hash,
};
