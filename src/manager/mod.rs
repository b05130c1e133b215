//! Session manager facade and its factory.

mod config;
mod distributable;
mod factory;

pub use config::{ManagerConfig, DEFAULT_DEPLOYMENT_NAME, DEFAULT_SESSION_TIMEOUT};
pub(crate) use config::max_from_signed;
pub use distributable::DistributableSessionManager;
pub use factory::DistributableSessionManagerFactory;
