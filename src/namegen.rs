//! Unique name generation
//!
//! Names are `<prefix>-<5 random lowercase alphanumerics>`. Uniqueness relies on
//! the randomness width only.

use rand::Rng;

const SUFFIX_LEN: usize = 5;
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Lowercase alphanumeric string of `len` characters
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Append a random suffix to `prefix`
pub fn append_random_string(prefix: &str) -> String {
    format!("{}-{}", prefix, random_string(SUFFIX_LEN))
}
