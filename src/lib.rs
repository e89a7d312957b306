pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod handler;
pub mod http; // HTTP 服务器
pub mod identity;
pub mod infra;
pub mod logging;
pub mod ping;
pub mod throttle;

pub use config::GateConfig;
pub use context::InvocationContext;
pub use error::{GateError, Result};
pub use gate::{InvocationGate, InvocationGateBuilder};
pub use handler::{
    handler_fn, json_handler, payload_fn, HandlerError, InvocationHandler, InvocationRequest,
    InvocationResponse,
};
pub use http::{create_router, GateHttpServer};
pub use identity::{ConversationIdentity, HeaderIdentityResolver, IdentitySource};
pub use ping::{HealthCheck, HealthState, PingResponse, PingService, PingStatus, TaskTracker};
pub use throttle::{EndpointCategory, RateLimitConfig, RateLimiter, ThrottleScope};
