/*
[INPUT]:  Signed challenges and verification service configuration
[OUTPUT]: Backend-issued identity tokens
[POS]:    HTTP layer - verification service communication
[UPDATE]: When adding endpoints or changing client behavior
*/

pub mod client;
pub mod verify;

pub use client::{ClientConfig, DEFAULT_VERIFIER_URL, VerifierClient};
pub use verify::{ChallengeVerifier, SignedChallenge, VerifyRequest, VerifyResponse};
