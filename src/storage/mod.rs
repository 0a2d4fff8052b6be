pub mod engine;
pub mod http;
pub mod memory;

pub use engine::{Operation, RemoteStore};
pub use http::HttpStore;
pub use memory::InMemoryStore;
