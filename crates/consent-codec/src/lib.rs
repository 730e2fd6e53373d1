//! Consent-state decoding for Google tag requests.
//!
//! Two wire encodings are understood:
//!
//! * `gcs=` (legacy): `G1` followed by one status character per category.
//! * `gcd=` (extended): a base64url string where every category is one sextet carrying a
//!   `default` and an `update` field.
//!
//! Every decoder is total: malformed input yields a record whose categories are all
//! [`ConsentState::Unspecified`]. The values are scraped from third-party UI text, so partial
//! captures are an expected input, not an error.

pub mod extended;
pub mod extract;
pub mod legacy;
pub mod model;

pub use extended::{decode_gcd, GCD_CATEGORY_OFFSETS, GCD_MIN_LEN, GCD_PREFIX_LEN};
pub use extract::{extract_params, ConsentParams, ConsentReport};
pub use legacy::{decode_gcs, LegacyLayout};
pub use model::{ConsentCategory, ConsentEntry, ConsentFormat, ConsentRecord, ConsentState};
