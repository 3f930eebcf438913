// Declare modules within the adapters directory
pub mod connection_manager;
pub mod in_memory_cache;
pub mod redis_cache;
pub mod ssh_tunnel;
