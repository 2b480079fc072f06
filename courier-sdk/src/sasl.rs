//! SASL authentication payload encoding.
//!
//! Only the PLAIN mechanism (RFC 4616) is spoken; the negotiation state
//! machine lives in the client engine.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Encode credentials for SASL PLAIN: base64 of
/// `authzid NUL authcid NUL password`, with the authorization identity set
/// to the authentication identity.
pub fn encode_plain(user: &str, pass: &str) -> String {
    BASE64.encode(format!("{user}\0{user}\0{pass}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_nul_separated_identity() {
        // base64("alice\0alice\0sesame")
        assert_eq!(encode_plain("alice", "sesame"), "YWxpY2UAYWxpY2UAc2VzYW1l");
    }

    #[test]
    fn empty_password_still_encodes() {
        assert!(!encode_plain("alice", "").is_empty());
    }
}
