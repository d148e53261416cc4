//! Check-in tokens printed into an activity's QR code.

use rand_core::RngCore;

/// Length of a token issued today: 16 random bytes, hex-encoded.
pub const TOKEN_LEN: usize = 32;

/// Length of tokens issued by earlier deployments. Codes printed with those
/// are still in circulation; their first [`TOKEN_LEN`] characters are the
/// canonical token.
pub const LEGACY_TOKEN_LEN: usize = 64;

/// Generate a fresh token.
pub fn generate_token<R: RngCore>(rng: &mut R) -> String {
  let mut bytes = [0u8; TOKEN_LEN / 2];
  rng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// Compare a scanned token against the stored one.
///
/// Both sides are trimmed. When exactly one side has the legacy length and the
/// other the current length, the legacy token is compared by its prefix.
pub fn tokens_match(stored: &str, supplied: &str) -> bool {
  let stored = stored.trim();
  let supplied = supplied.trim();
  if stored.is_empty() || supplied.is_empty() {
    return false;
  }

  match (stored.len(), supplied.len()) {
    (TOKEN_LEN, LEGACY_TOKEN_LEN) => supplied.get(..TOKEN_LEN) == Some(stored),
    (LEGACY_TOKEN_LEN, TOKEN_LEN) => stored.get(..TOKEN_LEN) == Some(supplied),
    _ => stored == supplied,
  }
}
