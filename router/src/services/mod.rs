//! The gRPC-facing half of the router: `ClientService`/`AgentService`
//! implementations plus the generic plumbing ([`drive`]) they share.

mod agent_endpoint;
mod client_endpoint;
mod drive;
mod raw;

pub use agent_endpoint::AgentEndpoint;
pub use client_endpoint::ClientEndpoint;
