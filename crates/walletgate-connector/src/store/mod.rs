/*
[INPUT]:  String keys/values and issued identity tokens
[OUTPUT]: Durable key/value slots and an expiry-aware token cache
[POS]:    Storage layer - persistence shared by the authenticator and orchestrator
[UPDATE]: When adding storage backends or changing key layout
*/

pub mod file;
pub mod kv;
pub mod token;

pub use file::FileStore;
pub use kv::{GuardedStore, KeyValueStore, MemoryStore};
pub use token::{IdentityClaims, TokenStore, is_expired_at, token_claims};
