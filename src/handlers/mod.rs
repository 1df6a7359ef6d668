mod admin;
mod health;
mod proxy;

pub use admin::{get_status, set_status};
pub use health::health_check;
pub use proxy::forward;
