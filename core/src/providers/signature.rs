// core/src/providers/signature.rs

//! HMAC-SHA256 helpers. Verification goes through the MAC's constant-time
//! comparison, never through string equality.

use crate::providers::ProviderError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_over(secret: &str, parts: &[&[u8]]) -> Result<HmacSha256, ProviderError> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
    .map_err(|e| ProviderError::Protocol(format!("unusable HMAC key: {e}")))?;
  for part in parts {
    mac.update(part);
  }
  Ok(mac)
}

/// Lower-case hex HMAC over the concatenation of `parts`.
pub fn sign_hex(secret: &str, parts: &[&[u8]]) -> Result<String, ProviderError> {
  Ok(hex::encode(mac_over(secret, parts)?.finalize().into_bytes()))
}

/// Standard base64 HMAC over the concatenation of `parts`.
pub fn sign_base64(secret: &str, parts: &[&[u8]]) -> Result<String, ProviderError> {
  Ok(BASE64.encode(mac_over(secret, parts)?.finalize().into_bytes()))
}

pub fn verify_hex(secret: &str, parts: &[&[u8]], signature: &str) -> Result<(), ProviderError> {
  let expected =
    hex::decode(signature.trim()).map_err(|_| ProviderError::Signature("signature is not valid hex".to_string()))?;
  mac_over(secret, parts)?
    .verify_slice(&expected)
    .map_err(|_| ProviderError::Signature("signature does not match".to_string()))
}

pub fn verify_base64(secret: &str, parts: &[&[u8]], signature: &str) -> Result<(), ProviderError> {
  let expected = BASE64
    .decode(signature.trim())
    .map_err(|_| ProviderError::Signature("signature is not valid base64".to_string()))?;
  mac_over(secret, parts)?
    .verify_slice(&expected)
    .map_err(|_| ProviderError::Signature("signature does not match".to_string()))
}
