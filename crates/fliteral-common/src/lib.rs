//! fliteral Common Types
//!
//! This crate provides the types shared by every fliteral component: the
//! canonical invocation event handed to function handlers, the closed outcome
//! taxonomy produced by the execution pipeline, and the infrastructure error
//! type used outside of request handling.
//!
//! # Overview
//!
//! fliteral turns a directory tree of JavaScript function modules into HTTP
//! endpoints. Each request flows through a fixed pipeline:
//!
//! - **Request Adapter**: builds an [`InvocationEvent`] from the HTTP request
//! - **Path Resolver**: maps the event path to a function directory
//! - **Module Cache**: loads or reuses the function's module
//! - **Execution Engine**: races the handler against the request deadline
//! - **Response Translator**: turns the [`Outcome`] into a wire response
//!
//! Every stage reports failures as a [`Failure`] whose [`FailureKind`] decides
//! the HTTP status. Failure detail stays server-side.
//!
//! # Example
//!
//! ```
//! use fliteral_common::{InvocationEvent, Failure, Outcome};
//!
//! let event = InvocationEvent::builder("GET", "/echotest")
//!     .query_string("foo=1&bar=2")
//!     .build();
//! assert_eq!(event.query_params()["foo"], "1");
//!
//! let outcome: Outcome = Failure::not_found("no package.json in /echotest").into();
//! assert_eq!(outcome.status_code(), 404);
//! ```

pub mod protocol;

pub use protocol::*;
