use boa_engine::{
    js_string,
    native_function::NativeFunction,
    object::{FunctionObjectBuilder, JsObject},
    Context, JsError, JsString, JsValue, Source,
};
use fliteral_common::{Failure, HandlerResponse, Outcome};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::runtime::{
    bindings,
    conversions::{js_value_to_json, json_to_js_value},
};

/// Receives the outcome a handler reports through `completion`.
///
/// Called at most once per `completion` invocation; a handler that calls
/// `completion` twice produces two calls, and the receiver decides which one
/// counts.
pub type CompletionHook = Arc<dyn Fn(Outcome) + Send + Sync>;

/// A function module evaluated in its own Boa context.
///
/// Boa's `Context` is neither `Send` nor `Sync`, so a `FunctionContext` is
/// built, invoked and dropped on the same thread. Every invocation gets a
/// fresh context created from the cached module source; module-level state
/// does not survive between requests.
pub struct FunctionContext {
    ctx: Context,
    handler: JsObject,
    timers: JsObject,
    deadline: Option<Instant>,
}

impl FunctionContext {
    /// Evaluates module source and extracts `module.exports.handler`.
    ///
    /// `root` is the function directory: `require` cannot reach outside it.
    ///
    /// # Errors
    ///
    /// - `ModuleLoad` if the source fails to parse or throws while evaluating
    /// - `ModuleInvalid` if the module does not export a callable `handler`
    pub fn load(source: &str, filename: &Path, root: &Path) -> Result<Self, Failure> {
        let mut ctx = Context::default();
        bindings::install_console(&mut ctx).map_err(|e| Failure::module_load(e.to_string()))?;
        let timers = bindings::install_timers(&mut ctx).map_err(|e| Failure::module_load(e.to_string()))?;
        let dirname = filename.parent().unwrap_or(root);

        let wrapped = bindings::wrap_module(source);
        let module_fn = ctx
            .eval(Source::from_bytes(wrapped.as_str()))
            .map_err(|e| Failure::module_load(format!("{}: {}", filename.display(), e)))?;
        let module_fn = module_fn
            .as_object()
            .filter(|o| o.is_callable())
            .map(|o| o.clone())
            .ok_or_else(|| Failure::module_load(format!("{}: module wrapper is not callable", filename.display())))?;

        let exports = JsObject::with_object_proto(ctx.intrinsics());
        let module = JsObject::with_object_proto(ctx.intrinsics());
        module
            .set(js_string!("exports"), exports.clone(), false, &mut ctx)
            .map_err(|e| Failure::module_load(e.to_string()))?;
        let require = bindings::entry_require(&mut ctx, root, filename, &module)
            .map_err(|e| Failure::module_load(format!("{}: {}", filename.display(), e)))?;

        let args = [
            JsValue::from(exports),
            JsValue::from(module.clone()),
            JsValue::new(JsString::from(filename.to_string_lossy().as_ref())),
            JsValue::new(JsString::from(dirname.to_string_lossy().as_ref())),
            require,
        ];
        module_fn
            .call(&JsValue::undefined(), &args, &mut ctx)
            .map_err(|e| Failure::module_load(format!("{}: {}", filename.display(), e)))?;
        let _ = ctx.run_jobs();

        let exports = module
            .get(js_string!("exports"), &mut ctx)
            .map_err(|e| Failure::module_load(e.to_string()))?;
        let handler = match exports.as_object() {
            Some(exports) => exports
                .get(js_string!("handler"), &mut ctx)
                .map_err(|e| Failure::module_load(e.to_string()))?,
            None => JsValue::undefined(),
        };
        let handler = handler
            .as_object()
            .filter(|o| o.is_callable())
            .map(|o| o.clone())
            .ok_or_else(|| {
                Failure::module_invalid(format!(
                    "{} does not export a handler function",
                    filename.display()
                ))
            })?;

        Ok(Self {
            ctx,
            handler,
            timers,
            deadline: None,
        })
    }

    /// Stops running timers once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Calls `handler(event, context, completion)`, then drains the job queue
    /// and the timer queue.
    ///
    /// Timers keep firing until `completion` has been called, nothing is left
    /// scheduled, or the next timer would fall past the deadline. Returns `Ok`
    /// whether or not the handler ever called `completion`. A synchronous
    /// throw, in the handler or in a timer callback, is reported as
    /// `HandlerExecution`.
    pub fn invoke(mut self, event: &JsonValue, on_complete: CompletionHook) -> Result<(), Failure> {
        let ctx = &mut self.ctx;
        let completed = Arc::new(AtomicBool::new(false));

        let event = json_to_js_value(event, ctx)
            .map_err(|e| Failure::handler_execution(format!("event conversion failed: {}", e)))?;
        let execution_context = JsObject::with_object_proto(ctx.intrinsics());

        let completion_flag = Arc::clone(&completed);
        // SAFETY: the closure captures only `Arc`s of Rust data; it holds no
        // garbage-collected values that would need tracing.
        let native = unsafe {
            NativeFunction::from_closure(move |_this, args, ctx| {
                completion_flag.store(true, Ordering::Release);
                let outcome = settle(args, ctx);
                on_complete(outcome);
                Ok(JsValue::undefined())
            })
        };
        let completion = FunctionObjectBuilder::new(ctx.realm(), native)
            .name(js_string!("completion"))
            .length(2)
            .build();

        let glue = ctx
            .eval(Source::from_bytes(bindings::INVOKE_GLUE))
            .map_err(|e| Failure::handler_execution(format!("invocation glue failed: {}", e)))?;
        let glue = glue
            .as_object()
            .map(|o| o.clone())
            .ok_or_else(|| Failure::handler_execution("invocation glue is not callable"))?;

        let args = [
            JsValue::from(self.handler.clone()),
            event,
            JsValue::from(execution_context),
            JsValue::from(completion),
        ];
        let called = glue.call(&JsValue::undefined(), &args, ctx);
        let _ = ctx.run_jobs();
        called.map_err(|e| Failure::handler_execution(format!("handler threw: {}", describe(&e, ctx))))?;

        while !completed.load(Ordering::Acquire) {
            let wait = match bindings::next_timer(&self.timers, ctx) {
                Ok(Some(wait)) => wait,
                Ok(None) => break,
                Err(e) => return Err(Failure::handler_execution(format!("timer queue failed: {}", describe(&e, ctx)))),
            };
            if self.deadline.is_some_and(|deadline| Instant::now() + wait >= deadline) {
                break;
            }
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
            bindings::fire_timer(&self.timers, ctx)
                .map_err(|e| Failure::handler_execution(format!("timer callback threw: {}", describe(&e, ctx))))?;
            let _ = ctx.run_jobs();
        }

        Ok(())
    }
}

/// Turns `completion(error, result)` arguments into an outcome.
fn settle(args: &[JsValue], ctx: &mut Context) -> Outcome {
    let error = args.first().cloned().unwrap_or_default();
    if error.to_boolean() {
        let detail = error
            .to_string(ctx)
            .map(|s| s.to_std_string_escaped())
            .unwrap_or_else(|_| error.display().to_string());
        return Failure::handler_execution(format!("handler reported error: {}", detail)).into();
    }

    let result = args.get(1).cloned().unwrap_or_default();
    match js_value_to_json(&result, ctx) {
        Ok(json) => match HandlerResponse::from_value(&json) {
            Ok(response) => Outcome::Success(response),
            Err(failure) => failure.into(),
        },
        Err(e) => Failure::response_contract(format!("result is not serialisable: {}", e)).into(),
    }
}

fn describe(error: &JsError, ctx: &mut Context) -> String {
    let value = error.to_opaque(ctx);
    value
        .to_string(ctx)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|_| error.to_string())
}
