//! Property tests exercising the dispatch loop's arithmetic opcodes and
//! the per-iteration `for`-loop closure semantics across many generated
//! programs rather than the hand-picked scenarios in `fax-vm`'s own unit
//! tests.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use fax_vm::Vm;
use proptest::prelude::*;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn run(source: &str) -> String {
    let out = SharedBuf::default();
    let err = SharedBuf::default();
    let mut vm = Vm::with_io(Box::new(out.clone()), Box::new(err.clone()));
    vm.interpret(source.as_bytes())
        .expect("expected the generated program to interpret successfully");
    String::from_utf8(out.0.borrow().clone()).unwrap()
}

/// Mirrors `fax-vm`'s own `format_number`: whole-valued doubles print
/// without a trailing `.0`.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

proptest! {
    /// `print a OP b;` against every arithmetic opcode matches evaluating
    /// the same operation natively, for any pair of small integers (kept
    /// small and integral so float-formatting differences can't cause a
    /// spurious mismatch).
    #[test]
    fn arithmetic_matches_native_evaluation(a in -1000i64..1000, b in 1i64..1000) {
        let (a, b) = (a as f64, b as f64);
        let cases = [
            ("+", a + b),
            ("-", a - b),
            ("*", a * b),
            ("/", a / b),
        ];
        for (op, expected) in cases {
            let source = format!("print {a} {op} {b};");
            let output = run(&source);
            prop_assert_eq!(output, format!("{}\n", format_number(expected)));
        }
    }

    /// A `for` loop that captures its own loop variable in a closure on
    /// every iteration always returns the final iteration's value when
    /// the last captured closure is called. This per-iteration rebinding
    /// must hold for any iteration count, not just a hand-picked example.
    #[test]
    fn for_loop_closures_capture_the_iteration_they_were_created_in(n in 1i64..30) {
        let source = format!(
            r#"
            var last = nil;
            for (var i = 0; i < {n}; i = i + 1) {{
                fun capture() {{ return i; }}
                last = capture;
            }}
            print last();
            "#
        );
        let output = run(&source);
        prop_assert_eq!(output, format!("{}\n", n - 1));
    }
}
