//! Transport boundary: where events come from and where producers send them.
//!
//! The broker is an in-process bounded channel. `Consumer` drains a
//! `MessageSource` into a `Dispatcher`, committing an offset only once its
//! event dispatched cleanly.

pub mod channel;
pub mod consumer;
pub mod error;
pub mod http;
pub mod traits;

pub use channel::{channel, ChannelPublisher, ChannelSource, CommitLog};
pub use consumer::{Consumer, ConsumerConfig, ConsumerStats};
pub use error::TransportError;
pub use http::HttpEventSink;
pub use traits::{EventSink, Message, MessageSource};
