/*
[INPUT]:  Connected providers, SDK configuration, and a verifier
[OUTPUT]: Identity tokens minted from wallet signatures
[POS]:    Auth layer - challenge-response authentication
[UPDATE]: When auth flow or signature methods change
*/

pub mod authenticator;
pub mod challenge;

pub use authenticator::{Authenticator, IssuedToken};
pub use challenge::{ChallengeChainId, SignChallenge, generate_nonce};
