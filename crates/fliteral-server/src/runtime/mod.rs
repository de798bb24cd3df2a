pub mod context;

mod bindings;
mod conversions;


pub use context::{CompletionHook, FunctionContext};
pub use conversions::{js_value_to_json, json_to_js_value};
