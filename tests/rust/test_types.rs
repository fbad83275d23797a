//! Type value tests -- normalisation, assignability, narrowing, templates

use typevm::types::template;
use typevm::types::{
    format_number, is_assignable, narrow, narrow_by_assignment, Guard, Member, Relater, TemplatePart, TypeTag,
    TypeValue,
};

fn s(text: &str) -> TypeValue {
    TypeValue::StringLiteral(text.to_string())
}

fn n(value: f64) -> TypeValue {
    TypeValue::NumberLiteral(value)
}

fn union(members: Vec<TypeValue>) -> TypeValue {
    TypeValue::union(members)
}

fn object(members: &[(&str, TypeValue, bool)]) -> TypeValue {
    TypeValue::Object(
        members
            .iter()
            .map(|(name, ty, optional)| (name.to_string(), Member { ty: ty.clone(), optional: *optional }))
            .collect(),
    )
}

fn tuple(elements: Vec<TypeValue>) -> TypeValue {
    TypeValue::Tuple(elements, false)
}

// ── Union normalisation ─────────────────────────────────────

#[test]
fn union_flattens_and_dedups() {
    let inner = union(vec![TypeValue::String, TypeValue::Number]);
    let u = union(vec![inner, TypeValue::Number, TypeValue::Null]);
    assert_eq!(u, TypeValue::Union(vec![TypeValue::String, TypeValue::Number, TypeValue::Null]));
}

#[test]
fn union_single_and_empty() {
    assert_eq!(union(vec![TypeValue::String]), TypeValue::String);
    assert_eq!(union(vec![]), TypeValue::Never);
    assert_eq!(union(vec![TypeValue::Never, TypeValue::Never]), TypeValue::Never);
}

#[test]
fn union_absorption() {
    assert_eq!(union(vec![TypeValue::String, TypeValue::Any]), TypeValue::Any);
    assert_eq!(union(vec![TypeValue::Unknown, TypeValue::Number]), TypeValue::Unknown);
    assert_eq!(union(vec![s("a"), TypeValue::String]), TypeValue::String);
    assert_eq!(union(vec![n(1.0), n(2.0), TypeValue::Number]), TypeValue::Number);
}

#[test]
fn union_of_both_booleans_is_boolean() {
    let u = union(vec![TypeValue::BooleanLiteral(true), TypeValue::BooleanLiteral(false)]);
    assert_eq!(u, TypeValue::Boolean);
    let mixed = union(vec![TypeValue::BooleanLiteral(true), s("x"), TypeValue::BooleanLiteral(false)]);
    assert_eq!(mixed, TypeValue::Union(vec![TypeValue::Boolean, s("x")]));
}

#[test]
fn union_equality_ignores_order() {
    assert_eq!(
        union(vec![TypeValue::String, TypeValue::Number]),
        union(vec![TypeValue::Number, TypeValue::String])
    );
}

// ── Intersection normalisation ──────────────────────────────

#[test]
fn intersection_of_disjoint_primitives_is_never() {
    assert_eq!(TypeValue::intersection(vec![TypeValue::String, TypeValue::Number]), TypeValue::Never);
    assert_eq!(TypeValue::intersection(vec![s("a"), s("b")]), TypeValue::Never);
}

#[test]
fn intersection_literal_and_primitive() {
    assert_eq!(TypeValue::intersection(vec![TypeValue::String, s("a")]), s("a"));
}

#[test]
fn intersection_drops_unknown_and_absorbs_any() {
    assert_eq!(TypeValue::intersection(vec![TypeValue::Unknown, TypeValue::Number]), TypeValue::Number);
    assert_eq!(TypeValue::intersection(vec![TypeValue::Any, TypeValue::Number]), TypeValue::Any);
    assert_eq!(TypeValue::intersection(vec![]), TypeValue::Unknown);
}

#[test]
fn intersection_merges_objects() {
    let a = object(&[("x", TypeValue::Number, false)]);
    let b = object(&[("y", TypeValue::String, true)]);
    let merged = TypeValue::intersection(vec![a, b]);
    assert_eq!(
        merged,
        object(&[("x", TypeValue::Number, false), ("y", TypeValue::String, true)])
    );
}

#[test]
fn intersection_distributes_over_union() {
    let u = union(vec![s("a"), TypeValue::Number]);
    assert_eq!(TypeValue::intersection(vec![u, TypeValue::String]), s("a"));
}

// ── Tuples ──────────────────────────────────────────────────

#[test]
fn concat_closed_tuples() {
    let joined = TypeValue::concat(tuple(vec![n(0.0)]), tuple(vec![n(1.0), n(2.0)]));
    assert_eq!(joined, tuple(vec![n(0.0), n(1.0), n(2.0)]));
}

#[test]
fn concat_onto_open_tuple_folds_into_rest() {
    let joined = TypeValue::concat(TypeValue::array(TypeValue::String), tuple(vec![TypeValue::Number]));
    assert_eq!(joined, TypeValue::array(union(vec![TypeValue::String, TypeValue::Number])));
}

#[test]
fn concat_with_any_and_never() {
    let open = TypeValue::concat(tuple(vec![TypeValue::String]), TypeValue::Any);
    assert_eq!(open, TypeValue::Tuple(vec![TypeValue::String, TypeValue::Any], true));
    assert_eq!(TypeValue::concat(tuple(vec![]), TypeValue::Never), TypeValue::Never);
}

#[test]
fn widen_literals_and_tuples() {
    assert_eq!(s("a").widen(), TypeValue::String);
    assert_eq!(tuple(vec![n(1.0), s("a")]).widen(), TypeValue::array(union(vec![TypeValue::Number, TypeValue::String])));
    assert_eq!(tuple(vec![]).widen(), TypeValue::array(TypeValue::Any));
    assert_eq!(TypeValue::Null.widen(), TypeValue::Null);
}

#[test]
fn tuple_length_property() {
    assert_eq!(tuple(vec![n(1.0), n(2.0)]).property("length"), Some((n(2.0), false)));
    assert_eq!(TypeValue::array(TypeValue::String).property("length"), Some((TypeValue::Number, false)));
    assert_eq!(s("abc").property("length"), Some((n(3.0), false)));
}

// ── Display ─────────────────────────────────────────────────

#[test]
fn display_forms() {
    assert_eq!(union(vec![TypeValue::String, TypeValue::Number]).to_string(), "string | number");
    assert_eq!(s("a").to_string(), "\"a\"");
    assert_eq!(TypeValue::array(union(vec![TypeValue::String, TypeValue::Null])).to_string(), "(string | null)[]");
    assert_eq!(tuple(vec![TypeValue::String, n(1.0)]).to_string(), "[string, 1]");
    assert_eq!(
        object(&[("a", TypeValue::Number, false), ("b", TypeValue::String, true)]).to_string(),
        "{ a: number; b?: string; }"
    );
    assert_eq!(
        TypeValue::Function(vec![TypeValue::String], Box::new(TypeValue::Undefined)).to_string(),
        "(arg0: string) => undefined"
    );
}

#[test]
fn numbers_format_like_javascript() {
    assert_eq!(format_number(5.0), "5");
    assert_eq!(format_number(1.5), "1.5");
    assert_eq!(format_number(-0.0), "0");
    assert_eq!(format_number(f64::INFINITY), "Infinity");
    assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    assert_eq!(format_number(f64::NAN), "NaN");
    assert_eq!(format_number(1e20), "100000000000000000000");
    assert_eq!(format_number(1e21), "1e+21");
    assert_eq!(format_number(1.23e22), "1.23e+22");
    assert_eq!(format_number(-1e21), "-1e+21");
    assert_eq!(format_number(0.000001), "0.000001");
    assert_eq!(format_number(1e-7), "1e-7");
    assert_eq!(format_number(1.5e-7), "1.5e-7");
}

// ── Assignability ───────────────────────────────────────────

#[test]
fn literal_to_primitive_only() {
    assert!(is_assignable(&s("a"), &TypeValue::String));
    assert!(is_assignable(&n(1.0), &TypeValue::Number));
    assert!(is_assignable(&TypeValue::BooleanLiteral(false), &TypeValue::Boolean));
    assert!(!is_assignable(&TypeValue::String, &s("a")));
    assert!(!is_assignable(&s("a"), &TypeValue::Number));
}

#[test]
fn any_never_unknown() {
    assert!(is_assignable(&TypeValue::Any, &TypeValue::Number));
    assert!(is_assignable(&TypeValue::Number, &TypeValue::Any));
    assert!(!is_assignable(&TypeValue::Any, &TypeValue::Never));
    assert!(is_assignable(&TypeValue::Never, &TypeValue::String));
    assert!(!is_assignable(&TypeValue::String, &TypeValue::Never));
    assert!(is_assignable(&TypeValue::String, &TypeValue::Unknown));
    assert!(!is_assignable(&TypeValue::Unknown, &TypeValue::String));
}

#[test]
fn union_source_and_target() {
    let target = union(vec![TypeValue::String, TypeValue::Number]);
    assert!(is_assignable(&s("x"), &target));
    assert!(!is_assignable(&TypeValue::BooleanLiteral(true), &target));
    assert!(is_assignable(&union(vec![s("a"), n(1.0)]), &target));
    assert!(!is_assignable(&union(vec![s("a"), TypeValue::Null]), &target));
}

#[test]
fn boolean_relates_as_both_literals() {
    let target = union(vec![TypeValue::BooleanLiteral(true), TypeValue::BooleanLiteral(false), TypeValue::Null]);
    assert!(is_assignable(&TypeValue::Boolean, &target));
}

#[test]
fn null_and_undefined_are_distinct() {
    assert!(!is_assignable(&TypeValue::Null, &TypeValue::Undefined));
    assert!(!is_assignable(&TypeValue::Undefined, &TypeValue::String));
    assert!(is_assignable(&TypeValue::Null, &TypeValue::Null));
}

#[test]
fn object_width_and_depth() {
    let target = object(&[("a", TypeValue::Number, false), ("b", TypeValue::String, true)]);
    assert!(is_assignable(&object(&[("a", n(1.0), false), ("c", TypeValue::Null, false)]), &target));
    assert!(!is_assignable(&object(&[("b", s("x"), false)]), &target));
    assert!(!is_assignable(&object(&[("a", s("x"), false)]), &target));
    // optional source member does not satisfy a required target member
    assert!(!is_assignable(&object(&[("a", TypeValue::Number, true)]), &target));
}

#[test]
fn tuples_and_arrays() {
    let arr = TypeValue::array(TypeValue::Number);
    assert!(is_assignable(&tuple(vec![n(1.0), n(2.0)]), &arr));
    assert!(!is_assignable(&arr, &tuple(vec![TypeValue::Number])));
    assert!(!is_assignable(&tuple(vec![n(1.0)]), &tuple(vec![n(1.0), n(2.0)])));
    assert!(is_assignable(&tuple(vec![]), &TypeValue::array(TypeValue::Unknown)));
    let with_head = TypeValue::Tuple(vec![TypeValue::String, TypeValue::Number], true);
    assert!(is_assignable(&tuple(vec![s("a"), n(1.0), n(2.0)]), &with_head));
    assert!(!is_assignable(&tuple(vec![n(1.0)]), &with_head));
}

#[test]
fn functions_are_contravariant_in_parameters() {
    let wide = TypeValue::Function(vec![TypeValue::String], Box::new(s("r")));
    let narrow_param = TypeValue::Function(vec![s("a")], Box::new(TypeValue::String));
    let target = TypeValue::Function(vec![s("a"), TypeValue::Number], Box::new(TypeValue::String));
    assert!(is_assignable(&wide, &target));
    assert!(!is_assignable(&target, &wide));
    assert!(is_assignable(&narrow_param, &target));
}

#[test]
fn template_literal_targets() {
    let t = template::build(vec![s("id-"), TypeValue::Number]);
    assert!(is_assignable(&s("id-42"), &t));
    assert!(!is_assignable(&s("id-x"), &t));
    assert!(is_assignable(&t, &TypeValue::String));
}

// ── Inference ───────────────────────────────────────────────

#[test]
fn infer_binds_source() {
    let mut relater = Relater::new();
    let target = TypeValue::array(TypeValue::Infer("E".into()));
    assert!(relater.relate(&TypeValue::array(TypeValue::String), &target));
    assert_eq!(relater.into_inferences().get("E"), Some(&TypeValue::String));
}

#[test]
fn infer_candidates_unite() {
    let mut relater = Relater::new();
    let target = tuple(vec![TypeValue::Infer("T".into()), TypeValue::Infer("T".into())]);
    assert!(relater.relate(&tuple(vec![s("a"), n(1.0)]), &target));
    assert_eq!(relater.into_inferences().get("T"), Some(&union(vec![s("a"), n(1.0)])));
}

#[test]
fn infer_from_object_member() {
    let mut relater = Relater::new();
    let target = object(&[("value", TypeValue::Infer("V".into()), false)]);
    assert!(relater.relate(&object(&[("value", n(3.0), false)]), &target));
    assert_eq!(relater.into_inferences().get("V"), Some(&n(3.0)));
}

// ── Narrowing ───────────────────────────────────────────────

#[test]
fn typeof_guard_on_unknown() {
    assert_eq!(narrow(&TypeValue::Unknown, Guard::TypeOf(TypeTag::String), false), TypeValue::String);
    assert_eq!(narrow(&TypeValue::Any, Guard::TypeOf(TypeTag::Number), false), TypeValue::Number);
}

#[test]
fn typeof_guard_keeps_literals() {
    let u = union(vec![s("a"), n(1.0), TypeValue::Null]);
    assert_eq!(narrow(&u, Guard::TypeOf(TypeTag::String), false), s("a"));
    assert_eq!(narrow(&u, Guard::TypeOf(TypeTag::String), true), union(vec![n(1.0), TypeValue::Null]));
    assert_eq!(narrow(&u, Guard::TypeOf(TypeTag::Object), false), TypeValue::Null);
}

#[test]
fn undefined_guard() {
    let u = union(vec![TypeValue::String, TypeValue::Undefined]);
    assert_eq!(narrow(&u, Guard::IsUndefined, true), TypeValue::String);
    assert_eq!(narrow(&u, Guard::IsUndefined, false), TypeValue::Undefined);
}

#[test]
fn impossible_guard_is_never() {
    assert_eq!(narrow(&TypeValue::String, Guard::TypeOf(TypeTag::Number), false), TypeValue::Never);
}

#[test]
fn assignment_narrowing() {
    let declared = union(vec![TypeValue::String, TypeValue::Number, TypeValue::Null]);
    assert_eq!(narrow_by_assignment(&declared, &s("x")), TypeValue::String);
    assert_eq!(
        narrow_by_assignment(&declared, &union(vec![n(1.0), TypeValue::Null])),
        union(vec![TypeValue::Number, TypeValue::Null])
    );
    assert_eq!(narrow_by_assignment(&TypeValue::String, &s("x")), TypeValue::String);
    assert_eq!(narrow_by_assignment(&TypeValue::Unknown, &n(2.0)), TypeValue::Number);
}

// ── Template literals ───────────────────────────────────────

#[test]
fn template_never_hole() {
    assert_eq!(template::build(vec![s("a"), TypeValue::Never]), TypeValue::Never);
}

#[test]
fn template_folds_literal_holes() {
    let t = template::build(vec![s("v"), n(1.5), s("-"), TypeValue::BooleanLiteral(true)]);
    assert_eq!(t, s("v1.5-true"));
}

#[test]
fn template_cartesian_product() {
    let t = template::build(vec![union(vec![s("a"), s("b")]), s("-"), union(vec![s("x"), s("y")])]);
    assert_eq!(t, union(vec![s("a-x"), s("a-y"), s("b-x"), s("b-y")]));
}

#[test]
fn template_keeps_open_holes() {
    let t = template::build(vec![s("pre-"), TypeValue::String, s("")]);
    assert_eq!(
        t,
        TypeValue::TemplateLiteral(vec![TemplatePart::Text("pre-".into()), TemplatePart::Hole(TypeValue::String)])
    );
    assert_eq!(t.to_string(), "`pre-${string}`");
}

#[test]
fn template_matching_binds_infer_text() {
    let parts = vec![
        TemplatePart::Text("key:".into()),
        TemplatePart::Hole(TypeValue::Infer("K".into())),
        TemplatePart::Text(";".into()),
    ];
    let mut relater = Relater::new();
    assert!(template::matches("key:abc;", &parts, &mut relater));
    assert_eq!(relater.into_inferences().get("K"), Some(&s("abc")));
}

#[test]
fn template_literal_hole_must_match_exactly() {
    let parts = vec![TemplatePart::Hole(union(vec![s("a"), s("b")])), TemplatePart::Text("!".into())];
    let mut relater = Relater::new();
    assert!(template::matches("b!", &parts, &mut relater));
    assert!(!template::matches("c!", &parts, &mut relater));
}
