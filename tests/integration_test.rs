use std::{cell::RefCell, rc::Rc};

use schema::{
    tree_walk_interpreter::{ExecutionError, ExecutionErrorKind, Interpreter},
    SchemaError,
};

fn run_program(source: &str) -> (Result<(), SchemaError>, String) {
    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::new(output.clone());
    let result = schema::run(&mut interpreter, source);
    let output = String::from_utf8(output.take()).expect("Output should be valid UTF-8");
    (result, output)
}

fn test_valid_program(source: &str, expected_output: &str) {
    let (result, output) = run_program(source);
    if let Err(e) = result {
        panic!("Program should run without errors, got: {e}");
    }
    assert_eq!(output, expected_output);
}

fn runtime_error(source: &str) -> (ExecutionErrorKind, usize) {
    match run_program(source).0 {
        Err(SchemaError::Execution(ExecutionError::Runtime { kind, line })) => (kind, line),
        other => panic!("Expected a runtime fault, got {other:?}"),
    }
}

#[test]
fn test_reassign_global() {
    test_valid_program("auto x = 5; x = x + 1; print(x);", "6\n");
}

#[test]
fn test_inherited_method_through_parent() {
    let source = r#"
    node Animal { define(n) { self.name = n; } speak() { print(self.name + " makes a sound"); } }
    node Dog : Animal { speak() { parent.speak(); print("Woof"); } }
    auto d = Dog("Fido"); d.speak();
    "#;
    test_valid_program(source, "Fido makes a sound\nWoof\n");
}

#[test]
fn test_arrays() {
    let source = "auto arr = array[3]; arr[0] = 10; print(arr[0]); print(arr.length); print(arr);";
    test_valid_program(source, "10\n3\n[10, null, null]\n");

    let (kind, line) = runtime_error("auto arr = array[3];\nprint(arr[3]);");
    assert!(matches!(
        kind,
        ExecutionErrorKind::IndexOutOfBounds { length: 3, .. }
    ));
    assert_eq!(line, 2);
}

#[test]
fn test_break() {
    let source = "auto i = 0; while (i < 10) { if (i == 3) { break; } i = i + 1; } print(i);";
    test_valid_program(source, "3\n");
}

#[test]
fn test_fib() {
    let source = r#"
    function fib(n) {
        if (n <= 1) return n;
        return fib(n - 1) + fib(n - 2);
    }

    for (auto i = 0; i < 10; i = i + 1) {
        print(fib(i));
    }
    "#;
    test_valid_program(source, "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n");
}

#[test]
fn test_closure() {
    let source = r#"
    function makeCounter() {
        auto i = 0;
        function count() {
            i = i + 1;
            return i;
        }
        return count;
    }

    auto counter = makeCounter();
    print(counter()); // 1
    print(counter()); // 2
    "#;
    test_valid_program(source, "1\n2\n");
}

#[test]
fn test_functions_cant_break_scope() {
    let source = r#"
    auto a = "global";
    {
        function showA() {
            print(a);
        }
        showA(); // global
        auto a = "block";
        showA(); // global
    }
    "#;
    test_valid_program(source, "global\nglobal\n");
}

#[test]
fn test_break_from_nested_loop_only_exits_inner() {
    let source = r#"
    for (auto i = 0; i < 2; i = i + 1) {
        for (auto j = 0; j < 5; j = j + 1) {
            if (j == 1) break;
            print(i + j);
        }
    }
    "#;
    test_valid_program(source, "0\n1\n");
}

#[test]
fn test_return_from_inside_loop() {
    let source = r#"
    function first_over(limit) {
        auto i = 0;
        while (true) {
            if (i * i > limit) { return i; }
            i = i + 1;
        }
    }
    print(first_over(20));
    "#;
    test_valid_program(source, "5\n");
}

#[test]
fn test_continue_does_not_skip() {
    let source = r#"
    auto i = 0;
    while (i < 3) {
        i = i + 1;
        if (i == 2) continue;
        print(i);
    }
    "#;
    test_valid_program(source, "1\n2\n3\n");
}

#[test]
fn test_getters_run_on_access() {
    let source = r#"
    node Square {
        define(side) { self.side = side; }
        area { return self.side * self.side; }
    }
    print(Square(3).area);
    "#;
    test_valid_program(source, "9\n");
}

#[test]
fn test_definition_returns_instance() {
    let source = r#"
    node Point {
        define(x) { self.x = x; return; self.x = 0; }
    }
    auto p = Point(4);
    print(p.x);
    print(p.define(7) == p);
    print(p.x);
    "#;
    test_valid_program(source, "4\ntrue\n7\n");
}

#[test]
fn test_meta_methods() {
    let source = r#"
    node Geometry {
        node square(x) { return x * x; }
        node describe() { return self; }
    }
    print(Geometry.square(4));
    print(Geometry.describe());
    Geometry.count = 2;
    print(Geometry.count);
    "#;
    test_valid_program(source, "16\nGeometry\n2\n");

    let (kind, _) = runtime_error("node Empty {} Empty().square(1);");
    assert!(matches!(kind, ExecutionErrorKind::UndefinedProperty(name) if name == "square"));
}

#[test]
fn test_parent_chain() {
    let source = r#"
    node A { hi() { print("A"); } }
    node B : A { hi() { parent.hi(); print("B"); } }
    node C : B { hi() { parent.hi(); print("C"); } }
    C().hi();
    "#;
    test_valid_program(source, "A\nB\nC\n");
}

#[test]
fn test_inherited_definition() {
    let source = r#"
    node Named { define(name) { self.name = name; } }
    node Pet : Named {}
    print(Pet("Rex").name);
    "#;
    test_valid_program(source, "Rex\n");

    let (kind, _) = runtime_error("node Pet {} Pet(1);");
    assert!(matches!(
        kind,
        ExecutionErrorKind::ArityMismatch {
            received: 1,
            expected: 0
        }
    ));
}

#[test]
fn test_traits() {
    let source = r#"
    trait Greets { greet() { print("hi " + self.name); } }
    trait Waves with Greets { wave() { self.greet(); print("*waves*"); } }
    node Person with Waves { define(n) { self.name = n; } }
    Person("Ann").wave();
    "#;
    test_valid_program(source, "hi Ann\n*waves*\n");
}

#[test]
fn test_trait_collisions() {
    let (kind, line) = runtime_error(
        "trait A { go() {} }\ntrait B { go() {} }\nnode C with A, B {}",
    );
    assert!(matches!(kind, ExecutionErrorKind::MethodCollision(name) if name == "go"));
    assert_eq!(line, 3);

    let (kind, _) = runtime_error("trait A { go() {} } node C with A { go() {} }");
    assert!(matches!(kind, ExecutionErrorKind::MethodCollision(_)));

    let (kind, _) = runtime_error("auto NotTrait = 1; node C with NotTrait {}");
    assert!(matches!(kind, ExecutionErrorKind::NotATrait(_)));
}

#[test]
fn test_local_nodes_and_closures() {
    let source = r#"
    function make(greeting) {
        node Greeter { greet(name) { return greeting + ", " + name; } }
        return Greeter();
    }
    print(make("Hello").greet("Bob"));
    "#;
    test_valid_program(source, "Hello, Bob\n");
}

#[test]
fn test_lists_and_maps() {
    let source = r#"
    auto l = create_list(1, 2, 3);
    l.add(4);
    print(l.size());
    print(l.get(3));
    print(l.slice(1, 3));
    print(l.has(2));
    print(l);
    auto m = create_map("a", 1);
    m.put("b", 2);
    print(m.get("b"));
    print(m.has_key("c"));
    print(m.keys());
    print(m);
    "#;
    test_valid_program(
        source,
        "4\n4\nlist[2, 3]\ntrue\nlist[1, 2, 3, 4]\n2\nfalse\nlist[a, b]\nmap[a: 1, b: 2]\n",
    );

    let (kind, _) = runtime_error("auto l = create_list(); l.get(0);");
    assert!(matches!(kind, ExecutionErrorKind::IndexOutOfBounds { .. }));
}

#[test]
fn test_compound_assignment() {
    let source = r#"
    {
        auto x = 1;
        x += 5;
        print(x);
        ++x;
        print(x);
        x *= 2;
        print(x);
    }
    auto g = 1;
    print(g += 2);
    print(g);
    "#;
    test_valid_program(source, "6\n7\n14\n3\n1\n");
}

#[test]
fn test_operators() {
    let source = r#"
    print(10 / 4);
    print("n=" + 1.5);
    print(null or "default");
    print(0 and 1);
    print(!null);
    print(1 == "1");
    print(-(2 + 3));
    "#;
    test_valid_program(source, "2.5\nn=1.5\ndefault\n0\ntrue\nfalse\n-5\n");

    let (kind, _) = runtime_error("print(1 - \"a\");");
    assert!(matches!(kind, ExecutionErrorKind::InvalidOperands { .. }));
}

#[test]
fn test_type_names() {
    let source = r#"
    print(type(1));
    print(type(1.5));
    print(type("s"));
    print(type(null));
    print(type(print));
    print(type(array[0]));
    "#;
    test_valid_program(source, "int\nfloat\nstring\nnull\nfunction\narray\n");
}

#[test]
fn test_use_native_module() {
    test_valid_program("use math; print(sqrt(16)); print(max(2, 7));", "4\n7\n");

    let (kind, _) = runtime_error("use math; use math;");
    assert!(matches!(kind, ExecutionErrorKind::ModuleAlreadyLoaded(_)));

    let (kind, _) = runtime_error("print(sqrt(4));");
    assert!(matches!(kind, ExecutionErrorKind::UndefinedVariable(name) if name == "sqrt"));
}

#[test]
fn test_runtime_faults() {
    let (kind, _) = runtime_error("function f(a) {} f(1, 2);");
    assert!(matches!(
        kind,
        ExecutionErrorKind::ArityMismatch {
            received: 2,
            expected: 1
        }
    ));

    let (kind, _) = runtime_error("auto x = 1; x();");
    assert!(matches!(kind, ExecutionErrorKind::NotCallable("int")));

    let (kind, _) = runtime_error("print(missing);");
    assert!(matches!(kind, ExecutionErrorKind::UndefinedVariable(_)));

    let (kind, _) = runtime_error("auto s = \"str\"; s.field = 1;");
    assert!(matches!(kind, ExecutionErrorKind::SetOnNonObject("string")));

    let (kind, _) = runtime_error("auto a = array[-1];");
    assert!(matches!(kind, ExecutionErrorKind::InvalidArraySize(_)));
}

#[test]
fn test_exit_codes() {
    let code = |source: &str| match run_program(source).0 {
        Ok(()) => 0,
        Err(e) => e.exit_code(),
    };

    assert_eq!(code("print(1);"), 0);
    assert_eq!(code("exit(); print(1);"), 0);
    assert_eq!(code("abort();"), 75);
    assert_eq!(code("abort(3);"), 3);
    assert_eq!(code("print(1 - null);"), 70);
    assert_eq!(code("auto = 1;"), 65);
    assert_eq!(code("{ auto a = a; }"), 65);
    assert_eq!(code("return 1;"), 65);
    assert_eq!(code("auto s = \"open;"), 65);
}

#[test]
fn test_exit_stops_execution() {
    let (result, output) = run_program("print(1); exit(); print(2);");
    assert!(matches!(
        result,
        Err(SchemaError::Execution(ExecutionError::Exit(0)))
    ));
    assert_eq!(output, "1\n");
}

#[test]
fn test_state_persists_between_runs() {
    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::new(output.clone());
    schema::run(&mut interpreter, "function twice(x) { return x * 2; }").unwrap();
    schema::run(&mut interpreter, "auto y = twice(21);").unwrap();
    schema::run(&mut interpreter, "print(y);").unwrap();
    assert!(schema::run(&mut interpreter, "print(nope);").is_err());
    schema::run(&mut interpreter, "print(twice(y));").unwrap();
    assert_eq!(String::from_utf8(output.take()).unwrap(), "42\n84\n");
}

#[test]
fn test_errors_are_collected() {
    match run_program("auto = 1;\nprint(;\nauto ok = 2;\n1 +;").0 {
        Err(SchemaError::Parse(errors)) => assert_eq!(errors.0.len(), 3),
        other => panic!("Expected parse errors, got {other:?}"),
    }

    let source = "function f() { auto a = 1; auto a = 2; }\n{ auto b = b; }\nself;";
    match run_program(source).0 {
        Err(SchemaError::Resolve(errors)) => assert_eq!(errors.0.len(), 3),
        other => panic!("Expected resolve errors, got {other:?}"),
    }
}

#[test]
fn test_trait_methods_on_node_value() {
    let source = r#"
    trait Labelled { label() { return "<" + self + ">"; } }
    node Box with Labelled { node make() { return Box(); } }
    print(Box.label());
    print(Box().label());
    print(Box.make().label());
    "#;
    test_valid_program(source, "<Box>\n<<Box instance>>\n<<Box instance>>\n");

    let (kind, _) = runtime_error("trait T { make() {} } node N with T { node make() {} }");
    assert!(matches!(kind, ExecutionErrorKind::MethodCollision(name) if name == "make"));
}

#[test]
fn test_huge_array_is_a_fault() {
    let (kind, line) = runtime_error("auto ok = array[2];\nauto a = array[100000000000000000000];");
    assert!(matches!(kind, ExecutionErrorKind::ArrayTooLarge(_)));
    assert_eq!(line, 2);

    let (kind, _) = runtime_error("auto a = array[1.5];");
    assert!(matches!(kind, ExecutionErrorKind::InvalidArraySize(_)));
}

#[test]
fn test_while_closures_share_the_loop_frame() {
    let source = r#"
    auto fs = create_list();
    auto i = 0;
    while (i < 3) {
        auto x = i;
        fs.add(function () { return x; });
        i = i + 1;
    }
    print(fs.get(0)());
    print(fs.get(2)());
    "#;
    test_valid_program(source, "2\n2\n");
}

#[test]
fn test_for_body_gets_a_frame_per_iteration() {
    let source = r#"
    auto fs = create_list();
    for (auto i = 0; i < 3; i = i + 1) {
        auto x = i;
        fs.add(function () { return x; });
    }
    print(fs.get(0)());
    print(fs.get(2)());
    "#;
    test_valid_program(source, "0\n2\n");
}

#[test]
fn test_closures_alias_captured_variable() {
    let source = r#"
    function counter() {
        auto n = 0;
        auto increment = function () { n = n + 1; return n; };
        auto current = function () { return n; };
        return create_list(increment, current);
    }
    auto pair = counter();
    pair.get(0)();
    pair.get(0)();
    print(pair.get(1)());
    auto other = counter();
    print(other.get(1)());
    "#;
    test_valid_program(source, "2\n0\n");
}

#[test]
fn test_parent_getter_is_returned_bound() {
    let source = r#"
    node Base { size { return 1; } }
    node Bigger : Base { size { return parent.size() + 1; } }
    print(Bigger().size);
    "#;
    test_valid_program(source, "2\n");
}
