//! Compiler tests -- program shape, frame layouts, patching and listings

use typevm::ast::BinaryOp;
use typevm::parser::parse_source;
use typevm::types::{Guard, TypeTag};
use typevm::vm::bytecode::{Module, SlotKind};
use typevm::vm::disasm::{disassemble, disassemble_module};
use typevm::vm::opcodes::{Address, Constant, Instruction};
use typevm::vm::{Compiler, Program};

// ── Helpers ──────────────────────────────────────────────────────

fn program(source: &str) -> Program {
    let file = parse_source(source, "test.ts").unwrap();
    Compiler::new("test.ts").compile(&file)
}

fn link(source: &str) -> Module {
    program(source).link().unwrap()
}

/// Instructions of the named subroutine
fn code_of<'a>(module: &'a Module, name: &str) -> &'a [Instruction] {
    let sub = module
        .subroutines
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no subroutine named {}", name));
    let start = sub.entry as usize;
    &module.code[start..start + sub.len as usize]
}

fn slot_kind(module: &Module, layout: usize, name: &str) -> SlotKind {
    module.layouts[layout]
        .slots
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.kind)
        .unwrap_or_else(|| panic!("no slot named {}", name))
}

// ── Program shape ───────────────────────────────────────────────

#[test]
fn compiler_file_entry_point() {
    let module = link("const x = 1;");
    assert_eq!(module.file, "test.ts");
    assert_eq!(module.subroutines[0].name, "<file>");
    assert_eq!(module.subroutines[0].layout, 0);
    assert_eq!(module.layouts[0].depth, 0);
    assert_eq!(code_of(&module, "<file>").last(), Some(&Instruction::Return));
}

#[test]
fn compiler_empty_file() {
    let module = link("");
    assert_eq!(module.subroutines.len(), 1);
    assert_eq!(module.code, vec![Instruction::Return]);
}

#[test]
fn compiler_alias_gets_own_body() {
    let module = link("type A = string;\ntype B<T> = T;");
    assert_eq!(module.subroutines[1].name, "A");
    assert_eq!(module.subroutines[2].name, "B");
    assert_eq!(slot_kind(&module, 0, "A"), SlotKind::Alias { body: 1, params: 0, required: 0 });
    assert_eq!(slot_kind(&module, 0, "B"), SlotKind::Alias { body: 2, params: 1, required: 1 });
    let body_layout = module.subroutines[2].layout as usize;
    assert_eq!(module.layouts[body_layout].depth, 1);
    assert_eq!(slot_kind(&module, body_layout, "T"), SlotKind::TypeParam);
    assert_eq!(code_of(&module, "A"), &[Instruction::String, Instruction::Return]);
}

#[test]
fn compiler_bindings_record_constness() {
    let module = link("const a = 1; let b = 2; var c = 3;");
    assert_eq!(slot_kind(&module, 0, "a"), SlotKind::Binding { constant: true });
    assert_eq!(slot_kind(&module, 0, "b"), SlotKind::Binding { constant: false });
    assert_eq!(slot_kind(&module, 0, "c"), SlotKind::Binding { constant: false });
}

#[test]
fn compiler_types_and_values_have_separate_names() {
    let module = link("type x = number;\nconst x: x = 1;");
    let slots: Vec<&str> = module.layouts[0].slots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(slots, vec!["x", "x"]);
    // The annotation loads the alias in slot 0
    assert!(code_of(&module, "<file>").contains(&Instruction::Load(Address::new(0, 0))));
}

#[test]
fn compiler_function_signature_and_body() {
    let module = link("function f(a: string, b?: number): string { return a; }\nconst r = f('x');");
    assert_eq!(slot_kind(&module, 0, "f"), SlotKind::Function { signature: 1 });
    assert_eq!(module.subroutines[1].name, "f (signature)");
    assert_eq!(module.subroutines[2].name, "f");

    // Optional parameters are widened with undefined
    assert_eq!(
        code_of(&module, "f (signature)"),
        &[
            Instruction::String,
            Instruction::Number,
            Instruction::Undefined,
            Instruction::Union(2),
            Instruction::String,
            Instruction::Function(2),
            Instruction::Return,
        ]
    );

    let body_layout = module.subroutines[2].layout as usize;
    let names: Vec<&str> = module.layouts[body_layout].slots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "<return>"]);
    // The body runs where the declaration stands
    assert!(code_of(&module, "<file>").contains(&Instruction::Body(2)));
}

#[test]
fn compiler_nested_function_is_deeper() {
    let module = link("function outer() { function inner() { return 1; } }");
    let inner = module.subroutines.iter().find(|s| s.name == "inner").unwrap();
    assert_eq!(module.layouts[inner.layout as usize].depth, 2);
}

// ── Type parameters ─────────────────────────────────────────────

#[test]
fn compiler_params_with_defaults() {
    let module = link("type P<A, B = A> = B;");
    assert_eq!(slot_kind(&module, 0, "P"), SlotKind::Alias { body: 1, params: 2, required: 1 });
    assert_eq!(
        code_of(&module, "P"),
        &[
            Instruction::Param { index: 0, skip: 1 },
            Instruction::Any,
            Instruction::Bind(0),
            Instruction::Param { index: 1, skip: 1 },
            Instruction::Load(Address::new(1, 0)),
            Instruction::Bind(1),
            Instruction::Load(Address::new(1, 1)),
            Instruction::Return,
        ]
    );
}

#[test]
fn compiler_constraints_follow_bindings() {
    let module = link("type C<T extends string> = T;");
    assert_eq!(
        code_of(&module, "C"),
        &[
            Instruction::Param { index: 0, skip: 1 },
            Instruction::Any,
            Instruction::Bind(0),
            Instruction::String,
            Instruction::Constraint(0),
            Instruction::Load(Address::new(1, 0)),
            Instruction::Return,
        ]
    );
}

#[test]
fn compiler_generic_reference_is_a_call() {
    let module = link("type Box<T> = [T];\ntype B = Box<number>;");
    assert_eq!(
        code_of(&module, "B"),
        &[
            Instruction::Number,
            Instruction::Call {
                addr: Address::new(0, 0),
                argc: 1
            },
            Instruction::Return,
        ]
    );
}

// ── Patching ────────────────────────────────────────────────────

#[test]
fn compiler_forward_references_resolve() {
    let program = program("type A = B;\ntype B = number;");
    assert!(program.pending_patches() > 0);
    let module = program.link().unwrap();
    assert_eq!(code_of(&module, "A")[0], Instruction::Load(Address::new(0, 1)));
}

#[test]
fn compiler_inner_names_resolve_outward() {
    let module = link("type T = string;\nfunction f() { const v: T = 'a'; }");
    assert!(code_of(&module, "f").contains(&Instruction::Load(Address::new(0, 0))));
}

#[test]
fn compiler_unknown_type_becomes_missing() {
    let module = link("type A = Nope;");
    match code_of(&module, "A")[0] {
        Instruction::Missing { name, pop: 0, push: true } => assert_eq!(module.string(name), Some("Nope")),
        other => panic!("expected MISSING, got {}", other),
    }
}

#[test]
fn compiler_unknown_generic_pops_its_arguments() {
    let module = link("type A = Nope<string, number>;");
    assert!(matches!(
        code_of(&module, "A")[2],
        Instruction::Missing { pop: 2, push: true, .. }
    ));
}

#[test]
fn compiler_assignment_to_unknown_binding() {
    let module = link("ghost = 1;");
    assert!(code_of(&module, "<file>")
        .iter()
        .any(|i| matches!(i, Instruction::Missing { pop: 1, push: false, .. })));
}

#[test]
fn compiler_missing_names_share_a_constant() {
    let module = link("type A = Nope;\ntype B = Nope;");
    let count = module
        .constants
        .iter()
        .filter(|c| **c == Constant::Str("Nope".into()))
        .count();
    assert_eq!(count, 1);
}

#[test]
fn compiler_spans_point_at_declarations() {
    let module = link("let a = 1;\n  const b: string = 'x';");
    let file = &module.subroutines[0];
    let assigns: Vec<usize> = (file.entry as usize..(file.entry + file.len) as usize)
        .filter(|&ip| matches!(module.code[ip], Instruction::Assign(_)))
        .collect();
    assert_eq!(assigns.len(), 2);
    let second = module.span_at(assigns[1]).unwrap();
    assert_eq!((second.line, second.column), (2, 9));
}

// ── Conditional types ───────────────────────────────────────────

#[test]
fn compiler_conditional_header() {
    let module = link("type IsStr<T> = T extends string ? 1 : 2;");
    let code = code_of(&module, "IsStr");
    assert_eq!(
        code[4],
        Instruction::Conditional {
            distribute: Some(Address::new(1, 0)),
            infer_slot: 1,
            infer_count: 0,
            extends_len: 2,
            true_len: 2,
            false_len: 2,
        }
    );
    assert_eq!(&code[5..7], &[Instruction::String, Instruction::Return]);
    assert_eq!(code.last(), Some(&Instruction::Return));
    assert_eq!(code.len(), 4 + 1 + 6 + 1);
}

#[test]
fn compiler_wrapped_check_does_not_distribute() {
    let module = link("type W<T> = [T] extends [string] ? 1 : 2;");
    let header = code_of(&module, "W")
        .iter()
        .find(|i| matches!(i, Instruction::Conditional { .. }))
        .copied()
        .unwrap();
    assert!(matches!(
        header,
        Instruction::Conditional {
            distribute: None,
            extends_len: 3,
            ..
        }
    ));
}

#[test]
fn compiler_infer_slots_live_in_the_alias_frame() {
    let module = link("type Head<T> = T extends [infer H, ...infer R] ? H : never;");
    let layout = module.subroutines[1].layout as usize;
    assert_eq!(slot_kind(&module, layout, "H"), SlotKind::Infer);
    assert_eq!(slot_kind(&module, layout, "R"), SlotKind::Infer);

    let code = code_of(&module, "Head");
    let header = code.iter().position(|i| matches!(i, Instruction::Conditional { .. })).unwrap();
    assert!(matches!(
        code[header],
        Instruction::Conditional {
            infer_slot: 1,
            infer_count: 2,
            extends_len: 7,
            true_len: 2,
            false_len: 2,
            ..
        }
    ));
    // The true branch reads the inferred slot
    assert_eq!(code[header + 1 + 7], Instruction::Load(Address::new(1, 1)));
}

#[test]
fn compiler_infer_names_are_not_visible_in_false_branch() {
    let module = link("type F<T> = T extends [infer H] ? H : H;");
    let code = code_of(&module, "F");
    assert!(matches!(code[code.len() - 3], Instruction::Missing { push: true, .. }));
}

// ── Expressions & control flow ──────────────────────────────────

#[test]
fn compiler_widening_depends_on_binding_kind() {
    let widened = |src: &str| link(src).code.contains(&Instruction::Widen);
    assert!(widened("let a = 1;"));
    assert!(!widened("const a = 1;"));
    assert!(widened("const a = [1];"));
    assert!(widened("const a = { x: 1 };"));
    assert!(!widened("let a: number = 1;"));
}

#[test]
fn compiler_spreads_become_concatenation() {
    let module = link("const b = [1];\nconst a = [0, ...b];");
    let code = code_of(&module, "<file>");
    let window = [
        Instruction::Tuple { len: 1, rest: false },
        Instruction::Concat,
        Instruction::Load(Address::new(0, 0)),
        Instruction::Concat,
    ];
    assert!(code.windows(4).any(|w| w == window));
}

#[test]
fn compiler_template_type_operands() {
    let module = link("type G = `hi ${string}!`;");
    let code = code_of(&module, "G");
    assert!(matches!(code[0], Instruction::StringLiteral(_)));
    assert_eq!(code[1], Instruction::String);
    assert!(matches!(code[2], Instruction::StringLiteral(_)));
    assert_eq!(code[3], Instruction::TemplateLiteral(3));
}

#[test]
fn compiler_operators_keep_their_span() {
    let module = link("const x = 1 +\n  'a';");
    let ip = module
        .code
        .iter()
        .position(|i| *i == Instruction::Binary(BinaryOp::Add))
        .unwrap();
    assert_eq!(module.span_at(ip).map(|s| s.line), Some(1));
}

#[test]
fn compiler_guarded_if_saves_and_joins() {
    let module = link("let x: string | number = 1;\nif (typeof x === 'string') {}");
    let x = Address::new(0, 0);
    let code = code_of(&module, "<file>");
    let tail = &code[code.len() - 10..];
    assert_eq!(
        tail,
        &[
            Instruction::Save(x),
            Instruction::Narrow {
                addr: x,
                guard: Guard::TypeOf(TypeTag::String),
                negate: false
            },
            Instruction::Save(x),
            Instruction::Swap,
            Instruction::Restore(x),
            Instruction::Narrow {
                addr: x,
                guard: Guard::TypeOf(TypeTag::String),
                negate: true
            },
            Instruction::Save(x),
            Instruction::Union(2),
            Instruction::Restore(x),
            Instruction::Return,
        ]
    );
}

#[test]
fn compiler_negated_null_guard() {
    let module = link("let x: string | null = null;\nif (x !== null) {}");
    assert!(module.code.contains(&Instruction::Narrow {
        addr: Address::new(0, 0),
        guard: Guard::IsNull,
        negate: true
    }));
}

#[test]
fn compiler_guard_on_function_is_ignored() {
    let module = link("function f() {}\nif (typeof f === 'string') {}");
    assert!(!module.code.iter().any(|i| matches!(i, Instruction::Save(_) | Instruction::Narrow { .. })));
}

// ── Listings ────────────────────────────────────────────────────

#[test]
fn compiler_listing_names_layouts_and_subroutines() {
    let module = link("type IsStr<T> = T extends string ? 1 : 2;\ntype A = Nope;");
    let text = disassemble_module(&module);
    assert!(text.starts_with("; file test.ts\n"));
    assert!(text.contains("alias s1 params=1 required=1"));
    assert!(text.contains("type-param"));
    assert!(text.contains("s1 IsStr (L1):"));
    assert!(text.contains("CONDITIONAL distribute=@1:0 extends=2 true=2 false=2"));
    assert!(text.contains("; 'Nope'"));
}

#[test]
fn compiler_listing_of_blob_carries_digest() {
    let bytecode = program("const x: string = 'a';").build().unwrap();
    let text = disassemble(&bytecode).unwrap();
    let first = text.lines().next().unwrap();
    assert_eq!(first, format!("; sha256 {}", bytecode.digest_hex()));
    assert!(text.contains("VAR @0:0"));
    assert!(text.contains("ASSIGN @0:0"));
}
