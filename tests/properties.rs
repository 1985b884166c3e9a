use std::{cell::RefCell, rc::Rc};

use proptest::prelude::*;
use schema::{resolver::Resolver, tree_walk_interpreter::Interpreter};

fn statement() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0..4u8, 0..100u32).prop_map(|(v, n)| format!("auto v{v} = {n};")),
        (0..4u8).prop_map(|v| format!("print(v{v});")),
        (0..4u8, 0..4u8).prop_map(|(a, b)| format!("v{a} = v{b} + 1;")),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4)
                .prop_map(|body| format!("{{ {} }}", body.join(" "))),
            (0..4u8, prop::collection::vec(inner, 0..4)).prop_map(|(f, body)| {
                format!("function f{f}(v0) {{ {} return v0; }}", body.join(" "))
            }),
        ]
    })
}

fn program() -> impl Strategy<Value = String> {
    prop::collection::vec(statement(), 1..8).prop_map(|statements| statements.join("\n"))
}

proptest! {
    #[test]
    fn resolving_twice_gives_the_same_addresses(source in program()) {
        let tokens = schema::tokenizer::tokens(&source).unwrap();
        let program = schema::parser::program(&tokens).unwrap();

        match (Resolver::new().resolve(&program), Resolver::new().resolve(&program)) {
            (Ok(first), Ok(second)) => prop_assert_eq!(first, second),
            (Err(first), Err(second)) => prop_assert_eq!(first.0.len(), second.0.len()),
            _ => prop_assert!(false, "resolver disagreed with itself"),
        }
    }

    #[test]
    fn whole_numbers_print_without_fraction(n in -1_000_000_000i64..1_000_000_000) {
        let output = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = Interpreter::new(output.clone());
        schema::run(&mut interpreter, &format!("print({n});")).unwrap();
        prop_assert_eq!(String::from_utf8(output.take()).unwrap(), format!("{n}\n"));
    }

    #[test]
    fn number_formatting_round_trips(n in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
        let text = schema::tree_walk_interpreter::format_number(n);
        prop_assert!(!text.ends_with(".0"));
        prop_assert_eq!(text.parse::<f64>().unwrap(), n);
    }
}
