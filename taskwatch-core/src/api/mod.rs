pub mod client;
pub mod routes;
pub mod service;

pub use client::ApiClient;
pub use service::ApiService;

#[cfg(test)]
pub use service::MockApiService;
