//! fliteral Server
//!
//! This crate serves a directory tree of JavaScript function modules over
//! HTTP, executing each handler with the Boa JavaScript engine.
//!
//! A request flows through [`adapter`], [`resolver`], [`cache`], [`engine`]
//! and [`translator`], wired together by the [`FunctionHost`] and exposed by
//! the [`HttpServer`].

pub mod adapter;
pub mod cache;
pub mod config;
pub mod engine;
pub mod host;
pub mod http_router;
pub mod http_server;
pub mod resolver;
pub mod runtime;
pub mod translator;

pub use cache::{FunctionDescriptor, LoadedModule, ModuleCache};
pub use config::{Identity, ServerConfig};
pub use engine::{ExecutionEngine, Invocation, InvocationState};
pub use host::FunctionHost;
pub use http_router::FunctionRouter;
pub use http_server::HttpServer;
pub use resolver::{PathResolver, ResolvedFunction};
pub use runtime::FunctionContext;
