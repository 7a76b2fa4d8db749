pub mod sha256;

pub use sha256::{hash_data, sha256_file};
