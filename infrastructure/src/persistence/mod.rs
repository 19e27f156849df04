pub mod in_memory_store;
pub mod json_file_store;

// Re-export both store backends
pub use in_memory_store::InMemoryStore;
pub use json_file_store::JsonFileStore;
