pub mod event_sink;
pub mod http_client;
pub mod http_handler;
pub mod middleware;
pub mod server;

/// Re-export commonly used types from adapters
pub use event_sink::TracingEventSink;
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use middleware::*;
pub use server::GatewayServer;
