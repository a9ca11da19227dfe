//! Signature primitives via `ring`.

use crate::base::codes::SigAlg;
use crate::base::keys::{PublicKeyId, Signature};
use crate::base::section::Signed;
use crate::wire;
use bytes::Bytes;
use ring::signature as ring_sig;
use tracing::debug;

/// Verifies raw signature data under a public key.
///
/// Unknown or unsupported algorithms verify nothing; the section carrying
/// such a signature is simply dropped, peer input never aborts the
/// process.
pub fn verify_signature(
    algorithm: SigAlg,
    key: &[u8],
    data: &[u8],
    signature: &[u8],
) -> bool {
    let scheme: &'static dyn ring_sig::VerificationAlgorithm = match algorithm
    {
        SigAlg::Ed25519 => &ring_sig::ED25519,
        SigAlg::EcdsaP256 => &ring_sig::ECDSA_P256_SHA256_FIXED,
        SigAlg::EcdsaP384 => &ring_sig::ECDSA_P384_SHA384_FIXED,
        other => {
            debug!(algorithm = %other, "unsupported signature algorithm");
            return false;
        }
    };
    ring_sig::UnparsedPublicKey::new(scheme, key)
        .verify(data, signature)
        .is_ok()
}

/// Signs a section with an ed25519 key pair and attaches the signature.
///
/// The signature covers the canonical encoding of the section at the time
/// of the call; mutating the section afterwards invalidates it.
pub fn sign_section(
    section: &mut Signed,
    keypair: &ring_sig::Ed25519KeyPair,
    id: PublicKeyId,
    valid_since: i64,
    valid_until: i64,
) -> Result<(), wire::WireError> {
    let bytes = wire::signed_sig_bytes(section)?;
    let data = Bytes::copy_from_slice(keypair.sign(&bytes).as_ref());
    section.signatures_mut().push(Signature {
        id,
        valid_since,
        valid_until,
        data,
    });
    Ok(())
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::codes::KeySpace;
    use crate::base::section::Assertion;
    use ring::rand::SystemRandom;
    use ring::signature::KeyPair;

    fn keypair() -> ring_sig::Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 =
            ring_sig::Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        ring_sig::Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let keypair = keypair();
        let mut section =
            Signed::Assertion(Assertion::new("www", "ch", "."));
        sign_section(
            &mut section,
            &keypair,
            PublicKeyId {
                algorithm: SigAlg::Ed25519,
                key_space: KeySpace::Rains,
                key_phase: 0,
            },
            0,
            i64::MAX,
        )
        .unwrap();

        let sig = &section.signatures()[0];
        let bytes = wire::signed_sig_bytes(&section).unwrap();
        assert!(verify_signature(
            SigAlg::Ed25519,
            keypair.public_key().as_ref(),
            &bytes,
            &sig.data,
        ));
        // A different message must not verify.
        assert!(!verify_signature(
            SigAlg::Ed25519,
            keypair.public_key().as_ref(),
            b"something else",
            &sig.data,
        ));
    }

    #[test]
    fn unsupported_algorithm_never_verifies() {
        assert!(!verify_signature(
            SigAlg::Int(200),
            &[0u8; 32],
            b"data",
            &[0u8; 64],
        ));
    }
}
