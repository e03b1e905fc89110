//! The engine components run by each tick.

pub mod credentials;
pub mod dispatcher;
pub mod normalizer;
pub mod reconciler;

pub use credentials::CredentialManager;
pub use dispatcher::{BotDispatcher, DispatchStats};
pub use normalizer::{normalize, NormalizedEvent};
pub use reconciler::{CalendarReconciler, ReconcileStats};
