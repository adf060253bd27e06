// Service exports
pub mod dispatch;
pub mod notifier;
pub mod postgres;
pub mod projects;

pub use dispatch::EventDispatcher;
pub use notifier::{NotifyError, OfferNotification, OfferNotifier};
pub use postgres::{PostgresClient, PostgresError};
pub use projects::{CreatedProject, ProjectClient, ProjectError};
