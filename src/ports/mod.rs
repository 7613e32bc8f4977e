pub mod event_sink;
pub mod http_client;
