pub mod backend;
pub mod director;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod registry;

pub use director::{ProxyRequest, RouteContext, rewrite};
pub use dispatcher::ProxyDispatcher;
pub use error::{GatewayError, GatewayErrorKind};
pub use lifecycle::{DrainOutcome, LifecycleError, LifecycleState};
pub use registry::{Route, RouteRegistry};
