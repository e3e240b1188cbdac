pub mod client_metrics;
pub mod rate;
pub mod server_metrics;

pub use client_metrics::*;
pub use rate::*;
pub use server_metrics::*;
