pub mod agent_auth;
pub mod rate_limit;
pub mod replay_cache;
pub mod signature;

pub use agent_auth::{
    AgentAuthenticator, AgentRequest, AgentSigner, AuthRejection, NONCE_HEADER,
    SIGNATURE_HEADER, SignedHeaders, TIMESTAMP_HEADER,
};
pub use rate_limit::{RequestLimiter, SlidingWindowLimiter};
pub use replay_cache::{NonceVerdict, ReplayCache, ReplayStore};
pub use signature::{constant_time_eq, verify_webhook_signature};
