//! One-shot weather notifications that survive restarts.

pub mod notifier;
pub mod scheduler;

pub use notifier::{build_notifier, LogNotifier, Notifier, WebhookNotifier};
pub use scheduler::{delay_until, NotificationScheduler, ScheduleError};
