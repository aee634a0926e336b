// Mail delivery: the `send-mail` wire format, the consumer-side handler, and
// the SMTP transport behind it.

pub mod handler;
pub mod message;
pub mod smtp;

pub use handler::{MailEventHandler, MailSender};
pub use message::MailMessage;
pub use smtp::SmtpMailer;
