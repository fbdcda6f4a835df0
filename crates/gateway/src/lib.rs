//! Message-queue RPC gateway.
//!
//! Consumes query messages from an inbound queue, answers each one through
//! an [`Answerer`](relay_pipeline::Answerer) and publishes exactly one reply
//! to the message's `reply-to` destination with the same correlation id.
//!
//! The request/reply logic in [`rpc`] is broker-agnostic; [`amqp`] binds it
//! to an AMQP 0.9.1 broker and [`service`] runs the worker loops with
//! reconnection and graceful shutdown.

pub mod amqp;
pub mod channel;
pub mod rpc;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use amqp::{AmqpBroker, AmqpChannel};
pub use channel::{ConsumerSource, Deliveries, ReplyChannel};
pub use rpc::RpcGateway;
pub use service::{open_consumers, run_workers, GatewayService};
pub use types::{InboundMessage, Query, Reply};
