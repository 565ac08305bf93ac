// storage/mod.rs
// Geolocation cache and cooldown persistence

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod sqlite;
mod traits;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used items
pub use memory::MemoryStore;
pub use migrations::run_migrations;
pub use pool::init_db_pool_with_path;
pub use sqlite::SqliteStore;
pub use traits::{CacheFilter, CooldownStore, GeolocationStore};
