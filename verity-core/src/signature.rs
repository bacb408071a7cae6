//! The root-hash-signature collaborator (out of scope per spec.md §1): the
//! core invokes a single hook at construction time to validate the root
//! digest against an external signature, then never touches it again.

/// Validates a root digest against whatever signature scheme the caller's
/// environment implements (a PKCS#7 blob, a platform keyring lookup, or
/// nothing at all in tests).
pub trait RootSignatureVerifier: Send + Sync {
    /// Returns `Ok(())` if `root_digest` is authentic, or an error message
    /// suitable for surfacing as a construction failure.
    fn verify(&self, root_digest: &[u8]) -> Result<(), String>;
}

/// A verifier that accepts any root digest unconditionally, for
/// verifiers constructed without signature enforcement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignatureCheck;

impl RootSignatureVerifier for NoSignatureCheck {
    fn verify(&self, _root_digest: &[u8]) -> Result<(), String> {
        Ok(())
    }
}
