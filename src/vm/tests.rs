//! End-to-end tests interpreting tide source and asserting on output.

use super::{InterpretResult, VM};
use crate::object::ObjData;
use crate::value::Value;

fn run(source: &str) -> (InterpretResult, String) {
    let mut vm = VM::with_buffered_output(false);
    let result = vm.interpret(source.as_bytes());
    (result, vm.take_output())
}

fn run_ok(source: &str) -> String {
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok(0), "output so far: {output}");
    output
}

#[test]
fn test_print_and_arithmetic() {
    assert_eq!(run_ok("print(1 + 2, 3.5, \"x\", true, null)"), "3 3.5 x true null\n");
    assert_eq!(run_ok("print(7 / 2, 7.0 / 2)"), "3 3.5\n");
    assert_eq!(run_ok("print(1 + 2.5)"), "3.5\n");
    assert_eq!(run_ok("print(2.0)"), "2.0\n");
    assert_eq!(run_ok("print(1 < 2, 1 > 2, 1 == 1, 1 == 1.0)"), "true false true false\n");
    assert_eq!(run_ok("print(-3 + 1, -(1 + 2))"), "-2 -3\n");
}

#[test]
fn test_string_concatenation_interns() {
    assert_eq!(run_ok("print(\"foo\" + \"bar\")"), "foobar\n");
    // Interned strings are identical, so raw equality sees them as equal.
    assert_eq!(run_ok("print(\"foo\" + \"bar\" == \"foobar\")"), "true\n");
}

#[test]
fn test_globals_and_locals() {
    assert_eq!(
        run_ok("let a = 1 a = a + 2 { let b = a * 10 print(b) } print(a)"),
        "30\n3\n"
    );
}

#[test]
fn test_control_flow() {
    assert_eq!(run_ok("if (1 < 2) print(\"yes\") else print(\"no\")"), "yes\n");
    assert_eq!(
        run_ok("let i = 0 while (i < 5) { i = i + 1 } print(i)"),
        "5\n"
    );
    assert_eq!(
        run_ok("let sum = 0 for (let i = 1; i < 4; i = i + 1) { sum = sum + i } print(sum)"),
        "6\n"
    );
}

#[test]
fn test_falsiness() {
    // Only null and false are falsy; 0, 0.0 and "" are truthy.
    assert_eq!(run_ok("if (0) print(\"t\") else print(\"f\")"), "t\n");
    assert_eq!(run_ok("if (0.0) print(\"t\") else print(\"f\")"), "t\n");
    assert_eq!(run_ok("if (\"\") print(\"t\") else print(\"f\")"), "t\n");
    assert_eq!(run_ok("if (null) print(\"t\") else print(\"f\")"), "f\n");
    assert_eq!(run_ok("if (false) print(\"t\") else print(\"f\")"), "f\n");
    assert_eq!(run_ok("print(null and 1, 2 and 3, null or 4, 5 or 6)"), "null 3 4 5\n");
}

#[test]
fn test_functions_and_recursion() {
    assert_eq!(
        run_ok("def fib(n) { if (n < 2) return n return fib(n - 1) + fib(n - 2) } print(fib(10))"),
        "55\n"
    );
    assert_eq!(run_ok("def inc(x) => x + 1 print(inc(41))"), "42\n");
    assert_eq!(run_ok("def f() {} print(f())"), "null\n");
}

#[test]
fn test_manual_decorator() {
    let source = r#"
        def deco(x) {
            def wrapper(func) {
                def inner(a, b) {
                    let r = func(a, b)
                    print(x, a, b, r)
                }
                return inner
            }
            return wrapper
        }
        def add(a, b) { return a + b }
        add = deco("add")(add)
        add(1, 2)
    "#;
    assert_eq!(run_ok(source), "add 1 2 3\n");
}

#[test]
fn test_stacked_decorators() {
    let source = r#"
        def deco(x) {
            def wrapper(func) {
                def inner(a, b) {
                    let r = func(a, b)
                    print(x, a, b, r)
                }
                return inner
            }
            return wrapper
        }
        @deco("lol") @deco("add") def add(a, b) { return a + b }
        add(1, 2)
    "#;
    assert_eq!(run_ok(source), "add 1 2 3\nlol 1 2 null\n");
}

#[test]
fn test_method_decorator() {
    let source = r#"
        def method_deco(func) {
            def wrapper(this, a, b) {
                print("before")
                let r = func(this, a, b)
                print("after")
                return r
            }
            return wrapper
        }
        class Foo {
            @method_deco def foo(this, a, b) { print("foo", a, b) }
        }
        Foo().foo(1, 2)
    "#;
    assert_eq!(run_ok(source), "before\nfoo 1 2\nafter\n");
}

#[test]
fn test_closure_survives_scope_exit() {
    let source = r#"
        let f = null
        {
            let x = 7
            def cap() { return x }
            f = cap
        }
        print(f())
    "#;
    assert_eq!(run_ok(source), "7\n");
}

#[test]
fn test_upvalue_sharing() {
    // Both closures capture the same slot, so they must share one
    // upvalue object, before and after it is closed.
    let source = r#"
        let get = null
        let set = null
        def make() {
            let x = 1
            def get_() { return x }
            def set_(v) { x = v }
            get = get_
            set = set_
        }
        make()
        set(42)
        print(get())
    "#;
    assert_eq!(run_ok(source), "42\n");
}

#[test]
fn test_counter_closure() {
    let source = r#"
        let counter = null
        def make() {
            let n = 0
            def tick() {
                n = n + 1
                return n
            }
            counter = tick
        }
        make()
        counter()
        counter()
        print(counter())
    "#;
    assert_eq!(run_ok(source), "3\n");
}

#[test]
fn test_inheritance_and_super() {
    let source = r#"
        class A {
            def m(this) { return "A" }
        }
        class B : A {
            def m(this) { return "B+" + super.m() }
        }
        print(B().m())
    "#;
    assert_eq!(run_ok(source), "B+A\n");
}

#[test]
fn test_super_binds_subclass_receiver() {
    let source = r#"
        class A {
            def who(this) { return this.name }
        }
        class B : A {
            def init(this) { this.name = "b" }
            def who(this) { return "via " + super.who() }
        }
        print(B().who())
    "#;
    assert_eq!(run_ok(source), "via b\n");
}

#[test]
fn test_inherited_method_lookup_chains() {
    let source = r#"
        class A {
            def hello(this) { return "hi" }
        }
        class B : A {}
        class C : B {}
        print(C().hello())
    "#;
    assert_eq!(run_ok(source), "hi\n");
}

#[test]
fn test_constructor_semantics() {
    let source = r#"
        class C {
            def init(this, x) { this.x = x }
        }
        print(C(42).x)
    "#;
    assert_eq!(run_ok(source), "42\n");

    // A return value inside a constructor is discarded; the receiver
    // comes back instead.
    let source = r#"
        class E {
            def init(this) {
                this.v = 5
                return 7
            }
        }
        print(E().v)
    "#;
    assert_eq!(run_ok(source), "5\n");
}

#[test]
fn test_instance_attribute_shadows_class_method() {
    let source = r#"
        class A {
            def m(this) { return 1 }
        }
        let a = A()
        print(a.m())
        a.m = abs
        print(a.m(-3))
    "#;
    assert_eq!(run_ok(source), "1\n3\n");
}

#[test]
fn test_bound_method_as_value() {
    let source = r#"
        class A {
            def init(this, n) { this.n = n }
            def get(this) { return this.n }
        }
        let m = A(9).get
        print(m())
    "#;
    assert_eq!(run_ok(source), "9\n");
}

#[test]
fn test_natives() {
    assert_eq!(run_ok("print(abs(-5), abs(5))"), "5 5\n");
    assert_eq!(run_ok("print(clock() > 0.0)"), "true\n");
}

#[test]
fn test_builtin_type_methods_bind_primitives() {
    let mut vm = VM::with_buffered_output(false);
    assert_eq!(
        vm.interpret(b"def double(this) => this + this"),
        InterpretResult::Ok(0)
    );
    // Attach the compiled function to the int method table.
    let name = vm.heap.copy_string("double");
    let double = *vm.globals.get(&name).unwrap();
    assert!(matches!(vm.heap[double.as_object()].data, ObjData::Function(_)));
    vm.heap[vm.builtin_types.int].dict.insert(name, double);

    assert_eq!(vm.interpret(b"print((21).double())"), InterpretResult::Ok(0));
    assert_eq!(vm.take_output(), "42\n");
}

#[test]
fn test_member_lookup_round_trip() {
    let mut vm = VM::with_buffered_output(false);
    assert_eq!(
        vm.interpret(b"class A { def m(this) => 1 } let a = A()"),
        InterpretResult::Ok(0)
    );
    let a_name = vm.heap.copy_string("a");
    let instance = *vm.globals.get(&a_name).unwrap();
    let field = vm.heap.copy_string("f");
    let method = vm.heap.copy_string("m");

    // An own-dict entry reads back unflagged; a class hit is a method.
    vm.heap[instance.as_object()].dict.insert(field, Value::int(3));
    assert_eq!(
        vm.get_member_obj(instance.as_object(), field, false),
        Some((Value::int(3), false))
    );
    let (_, is_method) = vm
        .get_member_obj(instance.as_object(), method, false)
        .unwrap();
    assert!(is_method);
}

#[test]
fn test_top_level_return() {
    let (result, _) = run("return 7");
    assert_eq!(result, InterpretResult::Ok(7));
    let (result, _) = run("print(\"done\") return 0");
    assert_eq!(result, InterpretResult::Ok(0));
    // Falling off the end halts with 0.
    let (result, _) = run("1 + 1");
    assert_eq!(result, InterpretResult::Ok(0));
    // Non-int top-level returns are runtime errors.
    let (result, _) = run("return \"x\"");
    assert_eq!(result, InterpretResult::RuntimeError);
    let (result, _) = run("return 1.0");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn test_runtime_errors() {
    let cases = [
        "missing",
        "missing = 1",
        "1 + \"a\"",
        "true + false",
        "1 / 0",
        "null()",
        "def f(a) {} f(1, 2)",
        "class C {} C(1)",
        "class C { def init(this) {} } C(1)",
        "let a = 1 a.b",
        "\"abc\".x = 1",
        "class C {} C().missing()",
        "let x = true x.y = 1",
    ];
    for source in cases {
        let (result, _) = run(source);
        assert_eq!(result, InterpretResult::RuntimeError, "source: {source}");
    }
}

#[test]
fn test_compile_errors() {
    let cases = [
        "1 = 2",
        "{ let a = a }",
        "class A : A {}",
        "1 <= 2",
        "!true",
        "def f( {",
    ];
    for source in cases {
        let (result, _) = run(source);
        assert_eq!(result, InterpretResult::CompileError, "source: {source}");
    }
}

#[test]
fn test_gc_stress_produces_identical_output() {
    let source = r#"
        def deco(x) {
            def wrapper(func) {
                def inner(a, b) {
                    let r = func(a, b)
                    print(x, a, b, r)
                }
                return inner
            }
            return wrapper
        }
        @deco("lol") @deco("add") def add(a, b) { return a + b }
        add(1, 2)
        class A { def m(this) { return "A" + "-" + "m" } }
        class B : A { def m(this) { return super.m() + "!" } }
        print(B().m())
        let s = ""
        for (let i = 0; i < 20; i = i + 1) { s = s + "x" }
        print(s)
    "#;

    let mut plain = VM::with_buffered_output(false);
    assert_eq!(plain.interpret(source.as_bytes()), InterpretResult::Ok(0));
    let plain_output = plain.take_output();

    let mut stressed = VM::with_buffered_output(true);
    assert_eq!(stressed.interpret(source.as_bytes()), InterpretResult::Ok(0));
    let stressed_output = stressed.take_output();

    assert_eq!(plain_output, stressed_output);

    // After teardown every allocation must have been freed.
    stressed.shutdown();
    let (allocated, freed) = stressed.gc_statistics();
    assert_eq!(allocated, freed);
}

#[test]
fn test_gc_reclaims_garbage_under_stress() {
    let source = r#"
        let keep = ""
        for (let i = 0; i < 10; i = i + 1) {
            keep = keep + "ab"
        }
        print(keep == "abababababababababab")
    "#;
    let mut vm = VM::with_buffered_output(true);
    assert_eq!(vm.interpret(source.as_bytes()), InterpretResult::Ok(0));
    assert_eq!(vm.take_output(), "true\n");
    let (allocated, freed) = vm.gc_statistics();
    // The intermediate concatenations must have been collected while
    // the program was still running.
    assert!(freed > 0, "allocated {allocated}, freed {freed}");
}

#[test]
fn test_repl_style_reuse_keeps_globals() {
    let mut vm = VM::with_buffered_output(false);
    assert_eq!(vm.interpret(b"let a = 40"), InterpretResult::Ok(0));
    assert_eq!(vm.interpret(b"a = a + 2"), InterpretResult::Ok(0));
    assert_eq!(vm.interpret(b"print(a)"), InterpretResult::Ok(0));
    assert_eq!(vm.take_output(), "42\n");
}

#[test]
fn test_number_literal_bases() {
    assert_eq!(run_ok("print(0x10, 0b101, 10)"), "16 5 10\n");
}
