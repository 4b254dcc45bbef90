use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEX_LEN: usize = 64;

/// Checks the gateway signature returned to the client after payment.
///
/// The signature is `hex(HMAC-SHA256(key_secret, "{intent_id}|{payment_id}"))`
/// in lowercase.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Arc<str>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
        }
    }

    fn mac_for(&self, intent_id: &str, payment_id: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(intent_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Some(mac)
    }

    /// Produce the signature the gateway would issue for this pair.
    pub fn sign(&self, intent_id: &str, payment_id: &str) -> String {
        self.mac_for(intent_id, payment_id)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    /// Constant-time comparison against the expected signature. Anything
    /// that is not 64 lowercase hex digits is rejected outright.
    pub fn verify(&self, intent_id: &str, payment_id: &str, signature: &str) -> bool {
        if signature.len() != SIGNATURE_HEX_LEN
            || !signature
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return false;
        }

        let Ok(provided) = hex::decode(signature) else {
            return false;
        };

        match self.mac_for(intent_id, payment_id) {
            Some(mac) => mac.verify_slice(&provided).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &str = "gateway_test_secret";

    #[test]
    fn matches_known_vector() {
        // HMAC-SHA256("gateway_test_secret", "order_abc|pay_xyz")
        let expected = "db298ef954ae9495b52957b17374a3901a204868839e3d97c0813ce5277a9f6e";
        let verifier = SignatureVerifier::new(SECRET);
        assert_eq!(verifier.sign("order_abc", "pay_xyz"), expected);
        assert!(verifier.verify("order_abc", "pay_xyz", expected));
    }

    #[test]
    fn separator_is_part_of_the_message() {
        let verifier = SignatureVerifier::new(SECRET);
        let sig = verifier.sign("order_a", "bc");
        assert!(!verifier.verify("order_ab", "c", &sig));
    }

    #[test]
    fn rejects_wrong_secret_and_swapped_ids() {
        let verifier = SignatureVerifier::new(SECRET);
        let other = SignatureVerifier::new("another_secret");
        let sig = other.sign("order_1", "pay_1");
        assert!(!verifier.verify("order_1", "pay_1", &sig));

        let sig = verifier.sign("order_1", "pay_1");
        assert!(!verifier.verify("pay_1", "order_1", &sig));
    }

    #[test]
    fn rejects_malformed_signatures() {
        let verifier = SignatureVerifier::new(SECRET);
        let sig = verifier.sign("order_1", "pay_1");
        assert!(!verifier.verify("order_1", "pay_1", ""));
        assert!(!verifier.verify("order_1", "pay_1", &sig[..63]));
        assert!(!verifier.verify("order_1", "pay_1", &format!("{sig}0")));
        assert!(!verifier.verify("order_1", "pay_1", &sig.to_uppercase()));
        assert!(!verifier.verify("order_1", "pay_1", &"z".repeat(64)));
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", SignatureVerifier::new(SECRET));
        assert!(!rendered.contains(SECRET));
    }

    proptest! {
        #[test]
        fn any_single_character_mutation_is_rejected(
            intent_id in "order_[A-Za-z0-9]{6,14}",
            payment_id in "pay_[A-Za-z0-9]{6,14}",
            index in 0usize..64,
            replacement in proptest::char::range('0', 'z'),
        ) {
            let verifier = SignatureVerifier::new(SECRET);
            let sig = verifier.sign(&intent_id, &payment_id);
            prop_assert!(verifier.verify(&intent_id, &payment_id, &sig));

            let mut chars: Vec<char> = sig.chars().collect();
            prop_assume!(chars[index] != replacement);
            chars[index] = replacement;
            let mutated: String = chars.into_iter().collect();

            prop_assert!(!verifier.verify(&intent_id, &payment_id, &mutated));
        }
    }
}
