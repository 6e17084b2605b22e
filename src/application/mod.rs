// Application layer - use cases and orchestration over the domain and storage

mod audit;
mod balance_cache;
mod clock;
mod daily_limit;
pub mod error;
mod locks;
mod orchestrator;
mod reconciliation;
mod reporting;
mod service;
mod wallets;

pub use audit::*;
pub use balance_cache::*;
pub use clock::*;
pub use daily_limit::*;
pub use error::*;
pub use locks::*;
pub use orchestrator::*;
pub use reconciliation::*;
pub use reporting::*;
pub use service::*;
pub use wallets::*;
