//! JavaScript bindings for function modules
//!
//! Everything a function module can see beyond the ECMAScript builtins is
//! installed here:
//!
//! - a CommonJS-style module wrapper providing `exports`, `module`,
//!   `__filename`, `__dirname` and `require`
//! - `require` for relative paths inside the function directory, with one
//!   module registry per context
//! - `setTimeout`/`setInterval`/`setImmediate` and their `clear*`
//!   counterparts, backed by a queue the invoking thread drains
//! - `console.log/info/warn/error/debug`, routed to `tracing` under the
//!   `fliteral::function` target
//! - the invocation glue that calls `handler(event, context, completion)` and
//!   settles thenables through `completion`

use boa_engine::{
    js_string,
    native_function::NativeFunction,
    object::{FunctionObjectBuilder, JsObject, ObjectInitializer},
    property::Attribute,
    Context, JsNativeError, JsResult, JsString, JsValue, Source,
};
use fliteral_common::{FliteralError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::DEFAULT_ENTRY;
use crate::runtime::conversions::js_value_to_json;

pub(crate) const FUNCTION_LOG_TARGET: &str = "fliteral::function";

const MODULE_PREFIX: &str = "(function (exports, module, __filename, __dirname, require) {\n";
const MODULE_SUFFIX: &str = "\n})";

/// Calls the handler and forwards a returned thenable to `completion`.
pub(crate) const INVOKE_GLUE: &str = r#"(function (handler, event, context, completion) {
    var ret = handler(event, context, completion);
    if (ret !== null && (typeof ret === 'object' || typeof ret === 'function') && typeof ret.then === 'function') {
        ret.then(
            function (result) { completion(null, result); },
            function (err) { completion(err || new Error('handler rejected'), undefined); }
        );
    }
})"#;

/// Builds `require` functions sharing one registry keyed by canonical filename.
///
/// A module is registered before its body runs, so a require cycle sees the
/// partially filled `exports` instead of recursing.
const REQUIRE_FACTORY: &str = r#"(function (resolve, compile, entryFilename, entryModule) {
    var registry = {};
    registry[entryFilename] = entryModule;
    function makeRequire(dirname) {
        return function require(specifier) {
            if (typeof specifier !== 'string') {
                throw new TypeError('require expects a string, got ' + typeof specifier);
            }
            var found = resolve(specifier, dirname);
            var cached = registry[found.filename];
            if (cached !== undefined) {
                return cached.exports;
            }
            var module = { exports: {}, filename: found.filename, loaded: false };
            registry[found.filename] = module;
            try {
                compile(found.filename).call(
                    module.exports,
                    module.exports,
                    module,
                    found.filename,
                    found.dirname,
                    makeRequire(found.dirname)
                );
            } catch (err) {
                delete registry[found.filename];
                throw err;
            }
            module.loaded = true;
            return module.exports;
        };
    }
    return makeRequire;
})"#;

/// Installs the timer globals and returns the queue handle `{next, fire}`.
///
/// `next()` is the delay in milliseconds until the earliest timer is due, or
/// -1 when the queue is empty. `fire()` runs that timer; ties fire in
/// scheduling order.
const TIMERS: &str = r#"(function (global) {
    var queue = [];
    var nextId = 1;
    function schedule(callback, delay, args, repeat) {
        if (typeof callback !== 'function') {
            throw new TypeError('timer callback must be a function');
        }
        delay = Number(delay);
        if (!(delay > 0)) {
            delay = 0;
        }
        var timer = { id: nextId++, due: Date.now() + delay, delay: delay, callback: callback, args: args, repeat: repeat };
        queue.push(timer);
        return timer.id;
    }
    function cancel(id) {
        for (var i = 0; i < queue.length; i++) {
            if (queue[i].id === id) {
                queue.splice(i, 1);
                return;
            }
        }
    }
    function earliest() {
        var index = 0;
        for (var i = 1; i < queue.length; i++) {
            if (queue[i].due < queue[index].due) {
                index = i;
            }
        }
        return index;
    }
    global.setTimeout = function (callback, delay) {
        return schedule(callback, delay, Array.prototype.slice.call(arguments, 2), false);
    };
    global.setInterval = function (callback, delay) {
        return schedule(callback, delay, Array.prototype.slice.call(arguments, 2), true);
    };
    global.setImmediate = function (callback) {
        return schedule(callback, 0, Array.prototype.slice.call(arguments, 1), false);
    };
    global.clearTimeout = cancel;
    global.clearInterval = cancel;
    global.clearImmediate = cancel;
    return {
        next: function () {
            if (queue.length === 0) {
                return -1;
            }
            return Math.max(0, queue[earliest()].due - Date.now());
        },
        fire: function () {
            if (queue.length === 0) {
                return;
            }
            var index = earliest();
            var timer = queue[index];
            if (timer.repeat) {
                timer.due += Math.max(timer.delay, 1);
            } else {
                queue.splice(index, 1);
            }
            timer.callback.apply(undefined, timer.args);
        }
    };
})(globalThis)"#;

/// Wraps module source so that evaluating it yields the module function.
pub(crate) fn wrap_module(source: &str) -> String {
    let mut wrapped = String::with_capacity(MODULE_PREFIX.len() + source.len() + MODULE_SUFFIX.len());
    wrapped.push_str(MODULE_PREFIX);
    wrapped.push_str(source);
    wrapped.push_str(MODULE_SUFFIX);
    wrapped
}

#[derive(Clone, Copy)]
enum ConsoleLevel {
    Debug,
    Info,
    Warn,
    Error,
}

fn render_args(args: &[JsValue], ctx: &mut Context) -> String {
    args.iter()
        .map(|arg| {
            if let Some(s) = arg.as_string() {
                return s.to_std_string_escaped();
            }
            if arg.is_object() {
                if let Ok(json) = js_value_to_json(arg, ctx) {
                    return json.to_string();
                }
            }
            arg.display().to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn emit(level: ConsoleLevel, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let message = render_args(args, ctx);
    match level {
        ConsoleLevel::Debug => debug!(target: FUNCTION_LOG_TARGET, "{}", message),
        ConsoleLevel::Info => info!(target: FUNCTION_LOG_TARGET, "{}", message),
        ConsoleLevel::Warn => warn!(target: FUNCTION_LOG_TARGET, "{}", message),
        ConsoleLevel::Error => error!(target: FUNCTION_LOG_TARGET, "{}", message),
    }
    Ok(JsValue::undefined())
}

fn console_debug(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    emit(ConsoleLevel::Debug, args, ctx)
}

fn console_info(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    emit(ConsoleLevel::Info, args, ctx)
}

fn console_warn(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    emit(ConsoleLevel::Warn, args, ctx)
}

fn console_error(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    emit(ConsoleLevel::Error, args, ctx)
}

/// Installs the global `console` object.
pub(crate) fn install_console(ctx: &mut Context) -> Result<()> {
    let console = ObjectInitializer::new(ctx)
        .function(NativeFunction::from_fn_ptr(console_info), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_info), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 0)
        .function(NativeFunction::from_fn_ptr(console_debug), js_string!("debug"), 0)
        .build();

    ctx.register_global_property(js_string!("console"), console, Attribute::all())
        .map_err(|e| FliteralError::JavaScriptExecution(format!("failed to install console: {}", e)))
}

fn string_arg(args: &[JsValue], index: usize, name: &str) -> JsResult<String> {
    args.get(index)
        .and_then(|v| v.as_string())
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| JsNativeError::typ().with_message(format!("{} must be a string", name)).into())
}

fn js_path(path: &Path) -> JsValue {
    JsValue::new(JsString::from(path.to_string_lossy().as_ref()))
}

/// Resolves a `require` specifier relative to `from`.
///
/// Only `./` and `../` specifiers are accepted. Candidates are tried in the
/// same order as the entry file (`x`, `x.js`, `x/index.js`), and the match
/// must canonicalise to a file inside `root`.
pub(crate) fn resolve_require(root: &Path, from: &Path, specifier: &str) -> std::result::Result<PathBuf, String> {
    let relative = matches!(specifier, "." | "..") || specifier.starts_with("./") || specifier.starts_with("../");
    if !relative {
        return Err(format!(
            "Cannot find module '{}': only relative paths inside the function directory can be required",
            specifier
        ));
    }

    let base = from.join(specifier);
    let mut with_extension = base.clone().into_os_string();
    with_extension.push(".js");
    let candidates = [base.clone(), PathBuf::from(with_extension), base.join(DEFAULT_ENTRY)];

    for candidate in candidates {
        let is_file = std::fs::metadata(&candidate).map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let canonical = std::fs::canonicalize(&candidate)
            .map_err(|e| format!("Cannot resolve '{}': {}", candidate.display(), e))?;
        if !canonical.starts_with(root) {
            return Err(format!(
                "Cannot require '{}': {} lies outside {}",
                specifier,
                canonical.display(),
                root.display()
            ));
        }
        return Ok(canonical);
    }

    Err(format!("Cannot find module '{}' from {}", specifier, from.display()))
}

/// Reads and evaluates a required file, returning its module function.
///
/// `.json` files export their parsed content.
fn compile_module(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let filename = string_arg(args, 0, "filename")?;
    let text = std::fs::read_to_string(&filename)
        .map_err(|e| JsNativeError::error().with_message(format!("Cannot read module {}: {}", filename, e)))?;

    let body = if filename.ends_with(".json") {
        let literal = serde_json::to_string(&text)
            .map_err(|e| JsNativeError::error().with_message(format!("Cannot read module {}: {}", filename, e)))?;
        format!("module.exports = JSON.parse({});", literal)
    } else {
        text
    };

    debug!(module = %filename, "require");
    ctx.eval(Source::from_bytes(wrap_module(&body).as_str()))
}

/// Creates the `require` function handed to the entry module.
///
/// `entry_module` is registered under `entry` so that a sibling requiring the
/// entry back gets the same `exports`.
pub(crate) fn entry_require(
    ctx: &mut Context,
    root: &Path,
    entry: &Path,
    entry_module: &JsObject,
) -> JsResult<JsValue> {
    let boundary = root.to_path_buf();
    // SAFETY: the closure captures only a `PathBuf`; it holds no
    // garbage-collected values that would need tracing.
    let resolve = unsafe {
        NativeFunction::from_closure(move |_this, args, ctx| {
            let specifier = string_arg(args, 0, "specifier")?;
            let from = string_arg(args, 1, "dirname")?;
            let filename = resolve_require(&boundary, Path::new(&from), &specifier)
                .map_err(|message| JsNativeError::error().with_message(message))?;
            let dirname = filename.parent().unwrap_or(boundary.as_path()).to_path_buf();
            let found = ObjectInitializer::new(ctx)
                .property(js_string!("filename"), js_path(&filename), Attribute::all())
                .property(js_string!("dirname"), js_path(&dirname), Attribute::all())
                .build();
            Ok(JsValue::from(found))
        })
    };
    let resolve = FunctionObjectBuilder::new(ctx.realm(), resolve)
        .name(js_string!("resolve"))
        .length(2)
        .build();
    let compile = FunctionObjectBuilder::new(ctx.realm(), NativeFunction::from_fn_ptr(compile_module))
        .name(js_string!("compile"))
        .length(1)
        .build();

    let factory = ctx.eval(Source::from_bytes(REQUIRE_FACTORY))?;
    let factory = factory
        .as_object()
        .filter(|o| o.is_callable())
        .map(|o| o.clone())
        .ok_or_else(|| JsNativeError::typ().with_message("require factory is not callable"))?;
    let make_require = factory.call(
        &JsValue::undefined(),
        &[
            JsValue::from(resolve),
            JsValue::from(compile),
            js_path(entry),
            JsValue::from(entry_module.clone()),
        ],
        ctx,
    )?;
    let make_require = make_require
        .as_object()
        .filter(|o| o.is_callable())
        .map(|o| o.clone())
        .ok_or_else(|| JsNativeError::typ().with_message("require factory returned no function"))?;

    let dirname = entry.parent().unwrap_or(root);
    make_require.call(&JsValue::undefined(), &[js_path(dirname)], ctx)
}

/// Installs the timer globals and returns the queue handle.
pub(crate) fn install_timers(ctx: &mut Context) -> Result<JsObject> {
    let queue = ctx
        .eval(Source::from_bytes(TIMERS))
        .map_err(|e| FliteralError::JavaScriptExecution(format!("failed to install timers: {}", e)))?;
    queue
        .as_object()
        .map(|o| o.clone())
        .ok_or_else(|| FliteralError::JavaScriptExecution("timer queue is not an object".to_string()))
}

fn call_queue(queue: &JsObject, name: JsString, ctx: &mut Context) -> JsResult<JsValue> {
    let method = queue.get(name, ctx)?;
    let method = method
        .as_object()
        .filter(|o| o.is_callable())
        .map(|o| o.clone())
        .ok_or_else(|| JsNativeError::typ().with_message("timer queue method is not callable"))?;
    method.call(&JsValue::from(queue.clone()), &[], ctx)
}

/// Delay until the earliest pending timer, `None` when nothing is scheduled.
pub(crate) fn next_timer(queue: &JsObject, ctx: &mut Context) -> JsResult<Option<Duration>> {
    let millis = call_queue(queue, js_string!("next"), ctx)?.to_number(ctx)?;
    if millis.is_nan() || millis < 0.0 {
        return Ok(None);
    }
    Ok(Some(Duration::from_millis(millis.ceil() as u64)))
}

/// Runs the earliest pending timer callback.
pub(crate) fn fire_timer(queue: &JsObject, ctx: &mut Context) -> JsResult<()> {
    call_queue(queue, js_string!("fire"), ctx).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;

    #[test]
    fn test_install_console() {
        let mut ctx = Context::default();
        install_console(&mut ctx).unwrap();

        for name in ["log", "info", "warn", "error", "debug"] {
            let src = format!("typeof console.{}", name);
            let value = ctx.eval(Source::from_bytes(src.as_str())).unwrap();
            assert_eq!(
                value.as_string().map(|s| s.to_std_string_escaped()),
                Some("function".to_string()),
                "console.{} should be a function",
                name
            );
        }
    }

    #[test]
    fn test_console_calls_return_undefined() {
        let mut ctx = Context::default();
        install_console(&mut ctx).unwrap();
        let value = ctx
            .eval(Source::from_bytes("console.log('hello', 1, {a: [1, 2]}, null)"))
            .unwrap();
        assert!(value.is_undefined());
    }

    #[test]
    fn test_render_args() {
        let mut ctx = Context::default();
        let obj = ctx.eval(Source::from_bytes("({a: 1})")).unwrap();
        let args = [JsValue::new(js_string!("x")), JsValue::new(2), obj];
        assert_eq!(render_args(&args, &mut ctx), r#"x 2 {"a":1}"#);
    }

    #[test]
    fn test_wrap_module_evaluates_to_function() {
        let mut ctx = Context::default();
        let wrapped = wrap_module("module.exports.handler = function () {};");
        let value = ctx.eval(Source::from_bytes(wrapped.as_str())).unwrap();
        assert!(value.is_callable());
    }

    #[test]
    fn test_wrap_module_tolerates_trailing_line_comment() {
        let mut ctx = Context::default();
        let wrapped = wrap_module("exports.handler = function () {}; // trailing");
        let value = ctx.eval(Source::from_bytes(wrapped.as_str())).unwrap();
        assert!(value.is_callable());
    }

    #[test]
    fn test_invoke_glue_is_function() {
        let mut ctx = Context::default();
        let value = ctx.eval(Source::from_bytes(INVOKE_GLUE)).unwrap();
        assert!(value.is_callable());
    }
}
