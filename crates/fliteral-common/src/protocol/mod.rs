pub mod error;
pub mod event;
pub mod outcome;


pub use error::{FliteralError, Result};
pub use event::{normalize_path, InvocationEvent, InvocationEventBuilder, RequestId};
pub use outcome::{Failure, FailureKind, HandlerResponse, Outcome};
