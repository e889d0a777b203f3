pub mod errors;
pub mod metrics;
pub mod state;

pub use errors::RegistryError;
pub use state::SubscriptionRegistry;
