pub mod backend;
pub mod error;
pub mod http;
pub mod types;

pub mod mock;

pub use backend::Backend;
pub use error::ApiError;
pub use http::HttpBackend;
pub use mock::MockBackend;
