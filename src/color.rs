//! Deterministic category colors.
//!
//! A category's color depends on nothing but its name: the UTF-8 bytes are
//! hashed with SHA-256 and the first three digest bytes become the red, green
//! and blue channels. Each channel is then lifted into `[80, 233]` so no
//! category ends up near-black or near-white.

use sha2::{Digest, Sha256};

/// Digest used for [color_of]. Changing it changes every category color.
pub const COLOR_DIGEST: &str = "sha256";

/// RGB color of a category name
pub fn color_of(name: &str) -> [u8; 3] {
    let digest = Sha256::digest(name.as_bytes());
    [lift(digest[0]), lift(digest[1]), lift(digest[2])]
}

#[inline]
fn lift(x: u8) -> u8 {
    // 0.6 * 255 + 80 = 233, never overflows
    (0.6 * f64::from(x) + 80.0).round() as u8
}
