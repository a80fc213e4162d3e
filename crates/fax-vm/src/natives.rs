//! Host-provided native functions. The language itself defines exactly
//! one, `clock`, with the native contract `fn(args, out) -> bool`;
//! everything else is left to the host embedding the VM (`fax-drv`, or
//! any future one) to register through [`crate::Vm::define_native`].

use fax_gc::Value;

/// Wall-clock seconds since the Unix epoch. CPU time via `clock()` has no
/// portable stdlib equivalent, so this uses `SystemTime` instead, which
/// is close enough for the scripts this language runs (timing loops,
/// not benchmarking process CPU usage).
pub(crate) fn clock_native(_args: &[Value], out: &mut Value) -> bool {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    *out = Value::Number(elapsed.as_secs_f64());
    true
}
