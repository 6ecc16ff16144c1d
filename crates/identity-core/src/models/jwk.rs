//! Published JSON Web Key Set types.

use serde::{Deserialize, Serialize};

/// Public half of an RSA signing key in JWK form.
///
/// `n` and `e` are unpadded base64url big-endian integers with no
/// leading zero bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kid: String,
    pub kty: String,
    #[serde(rename = "use")]
    pub usage: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.find(kid).is_some()
    }
}
