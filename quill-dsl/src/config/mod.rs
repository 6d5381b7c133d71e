//! Front-matter decoding
//! Uses serde_yaml for ALL parsing (no custom mini-syntax)

mod front_matter;

pub use front_matter::*;
