//! Backend access
//!
//! Layered bottom-up: [`transport`] performs single HTTP exchanges,
//! [`fetch`] applies the rate-limit retry contract, [`schemas`] decodes
//! payloads and [`backend`] exposes typed endpoint accessors.

pub mod backend;
pub mod fetch;
pub mod schemas;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendApi, BackendError, ChannelFilter, VERIFICATION_HEADER};
pub use fetch::{FetchClient, FetchError, RetryPolicy, Sleeper, TokioSleeper};
pub use schemas::{OperatorProfile, SlackUser, TeamMember};
pub use transport::{ApiRequest, RawResponse, ReqwestTransport, Transport, TransportError};
