use hmac::{Hmac, Mac};

use sha2::Sha256;

use secrecy::Secret;

/// Application secret used to digest tokens before they are stored
#[derive(Clone)]
pub struct SigningKey(Hmac<Sha256>);

impl SigningKey {
    pub fn new(key: &Secret<String>) -> anyhow::Result<Self> {
        use secrecy::ExposeSecret;

        let hmac = Hmac::new_from_slice(key.expose_secret().as_bytes())?;

        Ok(Self(hmac))
    }

    /// HMAC-SHA256 of `msg`
    pub fn digest(&self, msg: &[u8]) -> Vec<u8> {
        self.0.clone().chain_update(msg).finalize().into_bytes().to_vec()
    }
}
