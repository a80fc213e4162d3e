//! fax-vm - the Bytecode Interpreter
//!
//! ============================================================================
//! OVERVIEW
//! ============================================================================
//!
//! The interpreter: a stack-based dispatch loop over the `fax_gc::Chunk`s
//! `fax_compiler::compile` produces. [`Vm`] owns the value stack, the
//! call-frame stack, the open-upvalue list, and the runtime globals
//! store that mirrors `fax_compiler::GlobalsTable`'s slot assignment.
//! Closures, single-inheritance classes with bound methods, and the full
//! `INVOKE`/`SUPER_INVOKE` fast paths are all implemented here, driven by
//! the heap object variants `fax-gc` defines.

mod call_frame;
mod natives;
mod vm;

pub use vm::Vm;

#[cfg(test)]
mod tests {
    use super::*;
    use fax_util::FaxError;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

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

    fn run(source: &str) -> (Result<(), FaxError>, String, String) {
        let out = SharedBuf::default();
        let err = SharedBuf::default();
        let mut vm = Vm::with_io(Box::new(out.clone()), Box::new(err.clone()));
        let result = vm.interpret(source.as_bytes());
        let stdout = String::from_utf8(out.0.borrow().clone()).unwrap();
        let stderr = String::from_utf8(err.0.borrow().clone()).unwrap();
        (result, stdout, stderr)
    }

    #[test]
    fn arithmetic_and_print() {
        let (result, stdout, _) = run("print 1 + 2 * 3;");
        assert!(result.is_ok());
        assert_eq!(stdout, "7\n");
    }

    #[test]
    fn string_concatenation() {
        let (result, stdout, _) = run(r#"print "foo" + "bar";"#);
        assert!(result.is_ok());
        assert_eq!(stdout, "foobar\n");
    }

    #[test]
    fn global_var_and_const() {
        let (result, stdout, _) = run("var x = 1; x = x + 1; print x; const y = 2; print y;");
        assert!(result.is_ok());
        assert_eq!(stdout, "2\n2\n");
    }

    #[test]
    fn writing_a_const_global_is_a_compile_error() {
        let (result, _, _) = run("const x = 1; x = 2;");
        match result {
            Err(FaxError::Compile { messages }) => assert!(!messages.is_empty()),
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    #[test]
    fn closures_capture_their_enclosing_local() {
        let source = r#"
            fun makeCounter() {
                var count = 0;
                fun inc() {
                    count = count + 1;
                    return count;
                }
                return inc;
            }
            var counter = makeCounter();
            print counter();
            print counter();
            print counter();
        "#;
        let (result, stdout, _) = run(source);
        assert!(result.is_ok());
        assert_eq!(stdout, "1\n2\n3\n");
    }

    #[test]
    fn for_loop_closes_over_a_fresh_binding_per_iteration() {
        let source = r#"
            var closures = nil;
            var lastCall = nil;
            for (var i = 0; i < 3; i = i + 1) {
                fun capture() { return i; }
                lastCall = capture;
            }
            print lastCall();
        "#;
        let (result, stdout, _) = run(source);
        assert!(result.is_ok());
        assert_eq!(stdout, "2\n");
    }

    #[test]
    fn classes_inheritance_and_super() {
        let source = r#"
            class Animal {
                init(name) {
                    this.name = name;
                }
                speak() {
                    return "...";
                }
                describe() {
                    return this.name + " says " + this.speak();
                }
            }
            class Dog < Animal {
                speak() {
                    return "Woof, says " + super.speak();
                }
            }
            var d = Dog("Rex");
            print d.describe();
        "#;
        let (result, stdout, _) = run(source);
        assert!(result.is_ok());
        assert_eq!(stdout, "Rex says Woof, says ...\n");
    }

    #[test]
    fn initializer_always_returns_this() {
        let source = r#"
            class Box {
                init(v) {
                    this.v = v;
                    return;
                }
            }
            var b = Box(42);
            print b.v;
        "#;
        let (result, stdout, _) = run(source);
        assert!(result.is_ok());
        assert_eq!(stdout, "42\n");
    }

    #[test]
    fn bound_methods_carry_their_receiver() {
        let source = r#"
            class Greeter {
                init(name) { this.name = name; }
                greet() { return "hi " + this.name; }
            }
            var g = Greeter("Ada");
            var m = g.greet;
            print m();
        "#;
        let (result, stdout, _) = run(source);
        assert!(result.is_ok());
        assert_eq!(stdout, "hi Ada\n");
    }

    #[test]
    fn adding_a_number_and_a_string_is_a_runtime_error() {
        let (result, _, stderr) = run(r#"print 1 + "a";"#);
        match result {
            Err(FaxError::Runtime { message, trace }) => {
                assert_eq!(message, "Operands must be two numbers or two strings.");
                assert_eq!(trace, vec!["[line 1] in script".to_string()]);
            }
            other => panic!("expected a runtime error, got {other:?}"),
        }
        assert!(stderr.contains("Operands must be two numbers or two strings."));
    }

    #[test]
    fn calling_a_function_with_the_wrong_arity_is_a_runtime_error() {
        let (result, _, _) = run("fun f(a, b) { return a + b; } f(1);");
        match result {
            Err(FaxError::Runtime { message, .. }) => {
                assert_eq!(message, "Expected 2 arguments but got 1.");
            }
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn undefined_global_read_is_a_runtime_error() {
        let (result, _, _) = run("print nope;");
        assert!(matches!(result, Err(FaxError::Runtime { .. })));
    }

    #[test]
    fn repl_recovers_after_a_runtime_error() {
        let mut vm = Vm::new();
        assert!(vm.interpret(b"print 1 + \"a\";").is_err());
        assert!(vm.interpret(b"print 2 + 2;").is_ok());
    }

    #[test]
    fn native_clock_is_callable_with_no_arguments() {
        let (result, _, _) = run("print clock() >= 0;");
        assert!(result.is_ok());
    }

    /// A program allocating many short-lived strings must complete
    /// without exhausting memory. The collector has to actually run and
    /// reclaim the unreachable ones along the way, which `--stress-gc`
    /// forces on every allocation.
    #[test]
    fn many_short_lived_strings_are_collected_and_the_program_still_completes() {
        let source = r#"
            fun build(n) {
                var s = "x";
                var i = 0;
                while (i < n) {
                    s = s + "x";
                    i = i + 1;
                }
                return s;
            }
            var total = 0;
            var i = 0;
            while (i < 200) {
                var garbage = build(20);
                total = total + 1;
                i = i + 1;
            }
            print total;
        "#;
        let stdout = SharedBuf::default();
        let stderr = SharedBuf::default();
        let mut vm = Vm::with_io(Box::new(stdout.clone()), Box::new(stderr.clone()));
        vm.set_stress_gc(true);
        let result = vm.interpret(source.as_bytes());
        assert!(result.is_ok());
        assert_eq!(String::from_utf8(stdout.0.borrow().clone()).unwrap(), "200\n");
    }

    #[test]
    fn deeply_nested_calls_overflow_the_frame_stack() {
        let source = r#"
            fun recurse() { return recurse(); }
            recurse();
        "#;
        let (result, _, _) = run(source);
        match result {
            Err(FaxError::Runtime { message, .. }) => assert_eq!(message, "Stack overflow."),
            other => panic!("expected a stack overflow, got {other:?}"),
        }
    }
}
