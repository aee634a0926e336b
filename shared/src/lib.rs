//! Event-delivery library for Hireheaven's notification pipeline.
//!
//! Request-serving services publish `send-mail` events through
//! [`EventPublisher`]; the mail worker consumes them with [`EventConsumer`]
//! and hands each payload to an [`EventHandler`]. Delivery is at-least-once:
//! offsets are committed only after a handler invocation returns, so handlers
//! must tolerate redelivery.

pub mod error;
pub mod kafka;
pub mod mail;
pub mod runtime;

pub use error::{ConnectError, HandlerError, ProvisionError, PublishError, SubscribeError};
pub use kafka::consumer::{EventConsumer, EventHandler};
pub use kafka::producer::EventPublisher;
pub use mail::{MailEventHandler, MailMessage, MailSender, SmtpMailer};
