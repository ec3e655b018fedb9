mod manager;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod renewal;
mod store;

pub use manager::*;
pub use memory::*;
#[cfg(feature = "redis")]
pub use redis_store::*;
pub use renewal::*;
pub use store::*;
