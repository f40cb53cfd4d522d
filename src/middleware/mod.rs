pub mod drain;
pub mod headers;

pub use drain::{drain_guard, KillSwitch};
pub use headers::{request_id_middleware, security_headers_middleware};
