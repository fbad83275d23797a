//! Parser tests -- declarations, type syntax, expressions, statements

use typevm::ast::*;
use typevm::lexer::Lexer;
use typevm::parser::{parse_source, FrontendError, Parser};

fn parse(source: &str) -> SourceFile {
    let tokens = Lexer::new(source, "test.ts").tokenize().unwrap();
    Parser::new(tokens, "test.ts").parse().unwrap()
}

fn parse_err(source: &str) -> String {
    let tokens = Lexer::new(source, "test.ts").tokenize().unwrap();
    Parser::new(tokens, "test.ts").parse().unwrap_err().to_string()
}

fn alias(source: &str) -> TypeAlias {
    match parse(source).statements.into_iter().next() {
        Some(Statement::TypeAlias(alias)) => alias,
        other => panic!("expected a type alias, got {:?}", other),
    }
}

fn alias_body(source: &str) -> TypeNode {
    alias(source).body
}

fn init(source: &str) -> Expr {
    match parse(source).statements.into_iter().next() {
        Some(Statement::Variable(VariableDecl { init: Some(init), .. })) => init,
        other => panic!("expected an initialised variable, got {:?}", other),
    }
}

// ── Type aliases ────────────────────────────────────────────

#[test]
fn parse_simple_alias() {
    let a = alias("type A = number;");
    assert_eq!(a.name.name, "A");
    assert!(a.params.is_empty());
    assert!(matches!(a.body, TypeNode::Keyword { kind: KeywordType::Number, .. }));
}

#[test]
fn parse_type_params_with_constraint_and_default() {
    let a = alias("type A<K extends string, T = K> = T;");
    assert_eq!(a.params.len(), 2);
    assert_eq!(a.params[0].name.name, "K");
    assert!(matches!(
        a.params[0].constraint,
        Some(TypeNode::Keyword { kind: KeywordType::String, .. })
    ));
    assert!(a.params[0].default.is_none());
    assert!(a.params[1].constraint.is_none());
    assert!(matches!(&a.params[1].default, Some(TypeNode::Reference { name, .. }) if name.name == "K"));
}

#[test]
fn parse_trailing_comma_in_type_params() {
    assert_eq!(alias("type A<T,> = T;").params.len(), 1);
}

#[test]
fn parse_keyword_types() {
    for (text, kind) in [
        ("any", KeywordType::Any),
        ("unknown", KeywordType::Unknown),
        ("never", KeywordType::Never),
        ("undefined", KeywordType::Undefined),
        ("void", KeywordType::Void),
        ("string", KeywordType::String),
        ("number", KeywordType::Number),
        ("boolean", KeywordType::Boolean),
        ("null", KeywordType::Null),
    ] {
        let body = alias_body(&format!("type A = {};", text));
        assert!(matches!(body, TypeNode::Keyword { kind: k, .. } if k == kind), "{}", text);
    }
}

#[test]
fn parse_literal_types() {
    assert!(matches!(alias_body("type A = 'x';"), TypeNode::StringLiteral { value, .. } if value == "x"));
    assert!(matches!(alias_body("type A = -3;"), TypeNode::NumberLiteral { value, .. } if value == -3.0));
    assert!(matches!(alias_body("type A = true;"), TypeNode::BooleanLiteral { value: true, .. }));
    assert!(matches!(alias_body("type A = `raw`;"), TypeNode::StringLiteral { value, .. } if value == "raw"));
}

#[test]
fn parse_union_and_intersection_precedence() {
    let body = alias_body("type A = string & { a: 1 } | number;");
    let TypeNode::Union { members, .. } = body else {
        panic!("expected union");
    };
    assert_eq!(members.len(), 2);
    assert!(matches!(&members[0], TypeNode::Intersection { members, .. } if members.len() == 2));
}

#[test]
fn parse_leading_pipe() {
    let body = alias_body("type A =\n  | 'a'\n  | 'b';");
    assert!(matches!(body, TypeNode::Union { members, .. } if members.len() == 2));
}

#[test]
fn parse_generic_reference() {
    let body = alias_body("type A = Map<string, Array<number>>;");
    let TypeNode::Reference { name, args, .. } = body else {
        panic!("expected reference");
    };
    assert_eq!(name.name, "Map");
    assert_eq!(args.len(), 2);
    assert!(matches!(&args[1], TypeNode::Reference { args, .. } if args.len() == 1));
}

#[test]
fn parse_tuple_with_spread() {
    let body = alias_body("type A = [string, ...T, number];");
    let TypeNode::Tuple { elements, .. } = body else {
        panic!("expected tuple");
    };
    let spreads: Vec<bool> = elements.iter().map(|e| e.spread).collect();
    assert_eq!(spreads, vec![false, true, false]);
}

#[test]
fn parse_array_and_indexed_access() {
    assert!(matches!(alias_body("type A = string[][];"), TypeNode::Array { element, .. }
        if matches!(*element, TypeNode::Array { .. })));
    assert!(matches!(alias_body("type A = T['length'];"), TypeNode::IndexedAccess { .. }));
}

#[test]
fn parse_object_type() {
    let body = alias_body("type A = { a: string; b?: number, 'c': boolean };");
    let TypeNode::Object { members, .. } = body else {
        panic!("expected object");
    };
    let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(members[1].optional);
    assert!(!members[0].optional);
}

#[test]
fn parse_function_type() {
    let body = alias_body("type F = (a: string, b?: number) => void;");
    let TypeNode::Function { params, ret, .. } = body else {
        panic!("expected function type");
    };
    assert_eq!(params.len(), 2);
    assert!(params[1].optional);
    assert!(matches!(*ret, TypeNode::Keyword { kind: KeywordType::Void, .. }));
    assert!(matches!(alias_body("type F = () => string;"), TypeNode::Function { .. }));
}

#[test]
fn parse_parenthesized_type_is_not_function() {
    assert!(matches!(alias_body("type A = (string | number)[];"), TypeNode::Array { .. }));
    assert!(matches!(alias_body("type A = (infer E)[];"), TypeNode::Array { element, .. }
        if matches!(*element, TypeNode::Infer { .. })));
}

#[test]
fn parse_keyof_and_typeof() {
    assert!(matches!(alias_body("type A = keyof T;"), TypeNode::KeyOf { .. }));
    assert!(matches!(alias_body("type A = typeof x;"), TypeNode::Query { name, .. } if name.name == "x"));
}

#[test]
fn parse_conditional_type() {
    let body = alias_body("type A<T> = T extends string ? 'y' : 'n';");
    let TypeNode::Conditional { check, extends, .. } = body else {
        panic!("expected conditional");
    };
    assert!(matches!(*check, TypeNode::Reference { .. }));
    assert!(matches!(*extends, TypeNode::Keyword { kind: KeywordType::String, .. }));
}

#[test]
fn parse_nested_conditional_in_false_branch() {
    let body = alias_body("type A<T> = T extends string ? 1 : T extends number ? 2 : 3;");
    let TypeNode::Conditional { when_false, .. } = body else {
        panic!("expected conditional");
    };
    assert!(matches!(*when_false, TypeNode::Conditional { .. }));
}

#[test]
fn parse_template_literal_type() {
    let body = alias_body("type A = `a${B}c${D}`;");
    let TypeNode::TemplateLiteral { head, spans, .. } = body else {
        panic!("expected template literal");
    };
    assert_eq!(head, "a");
    let texts: Vec<&str> = spans.iter().map(|(_, t)| t.as_str()).collect();
    assert_eq!(texts, vec!["c", ""]);
}

#[test]
fn parse_infer_in_template() {
    let body = alias_body("type A<S> = S extends `${infer H}${infer R}` ? H : never;");
    let TypeNode::Conditional { extends, .. } = body else {
        panic!("expected conditional");
    };
    let TypeNode::TemplateLiteral { spans, .. } = *extends else {
        panic!("expected template literal");
    };
    assert!(spans.iter().all(|(t, _)| matches!(t, TypeNode::Infer { .. })));
}

// ── Variables, functions, statements ────────────────────────

#[test]
fn parse_variable_kinds() {
    let file = parse("const a = 1; let b: string; var c");
    let kinds: Vec<VarKind> = file
        .statements
        .iter()
        .map(|s| match s {
            Statement::Variable(v) => v.kind,
            other => panic!("expected variable, got {:?}", other),
        })
        .collect();
    assert_eq!(kinds, vec![VarKind::Const, VarKind::Let, VarKind::Var]);
}

#[test]
fn parse_annotation_without_initializer() {
    let file = parse("let b: string;");
    let Statement::Variable(v) = &file.statements[0] else {
        panic!("expected variable");
    };
    assert!(v.annotation.is_some());
    assert!(v.init.is_none());
}

#[test]
fn parse_function_declaration() {
    let file = parse("function f<T extends string>(a: T, b?: number): string { return a; }");
    let Statement::Function(f) = &file.statements[0] else {
        panic!("expected function");
    };
    assert_eq!(f.name.name, "f");
    assert_eq!(f.type_params.len(), 1);
    assert_eq!(f.params.len(), 2);
    assert!(f.params[1].optional);
    assert!(f.return_type.is_some());
    assert!(matches!(&f.body[0], Statement::Return { value: Some(_), .. }));
}

#[test]
fn parse_bare_return() {
    let file = parse("function f() { return }");
    let Statement::Function(f) = &file.statements[0] else {
        panic!("expected function");
    };
    assert!(matches!(&f.body[0], Statement::Return { value: None, .. }));
}

#[test]
fn parse_if_else() {
    let file = parse("if (typeof x === 'string') { a = 1; } else b = 2;");
    let Statement::If { condition, then_branch, else_branch, .. } = &file.statements[0] else {
        panic!("expected if");
    };
    assert!(matches!(condition, Expr::Binary { op: BinaryOp::StrictEq, .. }));
    assert!(matches!(**then_branch, Statement::Block { .. }));
    assert!(matches!(else_branch.as_deref(), Some(Statement::Assignment { .. })));
}

#[test]
fn parse_assignment_statement() {
    let file = parse("x = 'a'");
    assert!(matches!(&file.statements[0], Statement::Assignment { target, .. } if target.name == "x"));
}

#[test]
fn parse_type_as_identifier() {
    // `type` not followed by a name is an ordinary identifier
    let file = parse("type = 1;");
    assert!(matches!(&file.statements[0], Statement::Assignment { target, .. } if target.name == "type"));
}

#[test]
fn parse_semicolons_are_optional() {
    let file = parse("type A = string\nconst a: A = 'x'\nlet b = a");
    assert_eq!(file.statements.len(), 3);
}

// ── Expressions ─────────────────────────────────────────────

#[test]
fn parse_binary_precedence() {
    let expr = init("const a = 1 + 2 * 3;");
    let Expr::Binary { op: BinaryOp::Add, right, .. } = expr else {
        panic!("expected addition");
    };
    assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn parse_greater_equal() {
    assert!(matches!(init("const a = x >= 1;"), Expr::Binary { op: BinaryOp::Ge, .. }));
    assert!(matches!(init("const a = x > 1;"), Expr::Binary { op: BinaryOp::Gt, .. }));
}

#[test]
fn parse_negative_literal_is_folded() {
    assert!(matches!(init("const a = -5;"), Expr::NumberLiteral { value, .. } if value == -5.0));
    assert!(matches!(init("const a = -x;"), Expr::Unary { op: UnaryOp::Negate, .. }));
}

#[test]
fn parse_postfix_chain() {
    let expr = init("const a = f(1, 'b').c[0];");
    let Expr::Index { object, .. } = expr else {
        panic!("expected index");
    };
    let Expr::Member { object, property, .. } = *object else {
        panic!("expected member");
    };
    assert_eq!(property.name, "c");
    assert!(matches!(*object, Expr::Call { ref args, .. } if args.len() == 2));
}

#[test]
fn parse_keyword_property_name() {
    let expr = init("const a = o.type;");
    assert!(matches!(expr, Expr::Member { property, .. } if property.name == "type"));
}

#[test]
fn parse_member_property_span() {
    let Expr::Member { property, .. } = init("const a = obj.len;") else {
        panic!("expected member");
    };
    assert_eq!(property.name, "len");
    assert_eq!((property.span.line, property.span.column), (1, 15));
    assert_eq!((property.span.start, property.span.end), (14, 17));
}

#[test]
fn parse_array_and_object_literals() {
    assert!(matches!(init("const a = [1, ...b, 'c'];"), Expr::Array { elements, .. }
        if elements.len() == 3 && elements[1].spread));
    let Expr::Object { properties, .. } = init("const o = { a: 1, b, 2: 'x' };") else {
        panic!("expected object literal");
    };
    let keys: Vec<&str> = properties.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "2"]);
    assert!(matches!(&properties[1].1, Expr::Identifier { name, .. } if name == "b"));
}

#[test]
fn parse_template_expression() {
    let Expr::Template { head, spans, .. } = init("const s = `a${x}b`;") else {
        panic!("expected template");
    };
    assert_eq!(head, "a");
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].1, "b");
}

#[test]
fn parse_spans() {
    let file = parse("type A = 1;\nconst value: A = 1;");
    let Statement::Variable(v) = &file.statements[1] else {
        panic!("expected variable");
    };
    assert_eq!((v.name.span.line, v.name.span.column), (2, 7));
    assert_eq!(v.name.span.len(), 5);
}

// ── Errors ──────────────────────────────────────────────────

#[test]
fn error_missing_type() {
    assert!(parse_err("type A = ;").contains("Expected a type"));
}

#[test]
fn error_unclosed_block() {
    assert!(parse_err("function f() { const a = 1;").contains("Expected '}'"));
}

#[test]
fn error_reports_position() {
    let err = parse_err("const a = 1;\ntype B = ");
    assert!(err.starts_with("test.ts:2:"), "{}", err);
}

#[test]
fn error_nesting_depth() {
    let src = format!("{}{}", "{".repeat(300), "}".repeat(300));
    assert!(parse_err(&src).contains("Maximum nesting depth"));
}

#[test]
fn parse_source_wraps_both_stages() {
    assert!(matches!(parse_source("'open", "x.ts"), Err(FrontendError::Lex(_))));
    assert!(matches!(parse_source("const = 1", "x.ts"), Err(FrontendError::Parse(_))));
    assert_eq!(parse_source("", "x.ts").unwrap().statements.len(), 0);
}
