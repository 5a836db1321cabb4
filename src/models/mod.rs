pub mod alert;
pub mod message;
pub mod notification;
pub mod visit;

pub use alert::{Alert, AlertFilter, AlertMetadata, AlertType, NewAlert, Severity};
pub use message::{MessagePriority, RepresentativeMessage};
pub use notification::{Audience, Channel, Notification};
pub use visit::{Visit, VisitStatus};
