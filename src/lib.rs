//! This crate sends a single email by speaking SMTP directly
//! over an implicit-TLS connection.
//!
//! A [`MailConfig`] describes the message and the server.
//! The [`Mailer`] composes the payload, plain text or
//! `multipart/alternative` when an html body is set,
//! and drives one [`Session`]: `EHLO`, `AUTH LOGIN`,
//! `MAIL FROM`, one `RCPT TO` per recipient, `DATA` and `QUIT`.
//!
//! By default server rejections are ignored, as a fire-and-forget client.
//! Use [`ReplyPolicy::Strict`] to turn any 4xx or 5xx reply into an error.
//!
//! # Examples
//!
//! ```no_run
//! # tokio_test::block_on(async {
//! use implicit_smtp::{MailConfig, Mailer};
//!
//! let config = MailConfig::builder()
//!     .from_named("Friend", "friend@example.com")
//!     .to(["self@example.com"])
//!     .subject("Hello")
//!     .text("Welcome!")
//!     .html("<p>Welcome!</p>")
//!     .endpoint("friend@example.com:secret@smtp.example.com:465".parse().unwrap())
//!     .build();
//!
//! let mut mailer = Mailer::new(config);
//! let mut transcript = mailer.transcript();
//! tokio::spawn(async move {
//!     while let Some(event) = transcript.recv().await {
//!         println!("{:?}: {}", event.direction, event.line);
//!     }
//! });
//! mailer.send().await.unwrap();
//! # })
//! ```

#![forbid(unsafe_code)]

pub mod compose;
mod config;
mod mail;
mod session;
mod smtp;
pub mod template;

pub use compose::CompositionError;
pub use config::{Endpoint, MailBuilder, MailConfig, Sender, DEFAULT_HOST, DEFAULT_PORT};
pub use mail::{Error, Mailer};
pub use session::{Session, SessionOptions, State};
pub use smtp::{Direction, Error as SmtpError, Reply, ReplyPolicy, TranscriptEvent};
pub use template::{render, TemplateError};
