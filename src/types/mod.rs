//! Type values: the closed set of evaluated types the VM computes with
//!
//! Every composite is built through [`TypeValue::union`],
//! [`TypeValue::intersection`] or the template helpers so that values on the
//! operand stack are always in normal form.

pub mod narrow;
pub mod relate;
pub mod template;

use std::fmt;

use indexmap::IndexMap;

pub use narrow::{narrow, narrow_by_assignment, Guard, TypeTag};
pub use relate::{is_assignable, Relater};

/// Names a declaration for display and identity in [`TypeValue::GenericRef`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRef {
    pub name: String,
    pub depth: u16,
    pub slot: u16,
}

/// One property of an object type
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub ty: TypeValue,
    pub optional: bool,
}

impl Member {
    pub fn required(ty: TypeValue) -> Self {
        Self { ty, optional: false }
    }
}

/// A fragment of a template literal type
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Hole(TypeValue),
}

/// A conditional type whose check could not be decided yet
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalType {
    pub check: TypeValue,
    pub extends: TypeValue,
    pub when_true: TypeValue,
    pub when_false: TypeValue,
}

#[derive(Debug, Clone)]
pub enum TypeValue {
    Any,
    Unknown,
    Never,
    Null,
    Undefined,
    String,
    Number,
    Boolean,
    BooleanLiteral(bool),
    NumberLiteral(f64),
    StringLiteral(String),
    TemplateLiteral(Vec<TemplatePart>),
    Union(Vec<TypeValue>),
    Intersection(Vec<TypeValue>),
    /// Ordered elements; when the flag is set the last element is the rest
    /// element type (`T[]` is `Tuple([T], true)`).
    Tuple(Vec<TypeValue>, bool),
    Object(IndexMap<String, Member>),
    Function(Vec<TypeValue>, Box<TypeValue>),
    GenericRef(SymbolRef, Vec<TypeValue>),
    Conditional(Box<ConditionalType>),
    IndexedAccess(Box<TypeValue>, Box<TypeValue>),
    Infer(String),
}

impl PartialEq for TypeValue {
    fn eq(&self, other: &Self) -> bool {
        use TypeValue::*;
        match (self, other) {
            (Any, Any)
            | (Unknown, Unknown)
            | (Never, Never)
            | (Null, Null)
            | (Undefined, Undefined)
            | (String, String)
            | (Number, Number)
            | (Boolean, Boolean) => true,
            (BooleanLiteral(a), BooleanLiteral(b)) => a == b,
            (NumberLiteral(a), NumberLiteral(b)) => a == b,
            (StringLiteral(a), StringLiteral(b)) => a == b,
            (TemplateLiteral(a), TemplateLiteral(b)) => a == b,
            (Union(a), Union(b)) | (Intersection(a), Intersection(b)) => same_members(a, b),
            (Tuple(a, rest_a), Tuple(b, rest_b)) => rest_a == rest_b && a == b,
            (Object(a), Object(b)) => a == b,
            (Function(params_a, ret_a), Function(params_b, ret_b)) => {
                params_a == params_b && ret_a == ret_b
            }
            (GenericRef(sym_a, args_a), GenericRef(sym_b, args_b)) => sym_a == sym_b && args_a == args_b,
            (Conditional(a), Conditional(b)) => a == b,
            (IndexedAccess(obj_a, key_a), IndexedAccess(obj_b, key_b)) => obj_a == obj_b && key_a == key_b,
            (Infer(a), Infer(b)) => a == b,
            _ => false,
        }
    }
}

fn same_members(a: &[TypeValue], b: &[TypeValue]) -> bool {
    a.len() == b.len() && a.iter().all(|m| b.contains(m)) && b.iter().all(|m| a.contains(m))
}

/// Disjointness classes of primitive-like types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrimitiveClass {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
}

impl TypeValue {
    // ── Construction ────────────────────────────────────────────────────

    /// Normalised union: flattened, deduplicated, literals absorbed by their
    /// primitive, `never` dropped.
    pub fn union(members: Vec<TypeValue>) -> TypeValue {
        let mut flat = Vec::with_capacity(members.len());
        for m in members {
            flatten_into(m, &mut flat, true);
        }
        if flat.iter().any(|m| matches!(m, TypeValue::Any)) {
            return TypeValue::Any;
        }
        if flat.iter().any(|m| matches!(m, TypeValue::Unknown)) {
            return TypeValue::Unknown;
        }

        let mut out: Vec<TypeValue> = Vec::with_capacity(flat.len());
        for m in flat {
            if matches!(m, TypeValue::Never) || out.contains(&m) {
                continue;
            }
            out.push(m);
        }

        // true | false is boolean
        let has_true = out.contains(&TypeValue::BooleanLiteral(true));
        let has_false = out.contains(&TypeValue::BooleanLiteral(false));
        if has_true && has_false {
            if let Some(pos) = out.iter().position(|m| matches!(m, TypeValue::BooleanLiteral(_))) {
                out[pos] = TypeValue::Boolean;
            }
            out.retain(|m| !matches!(m, TypeValue::BooleanLiteral(_)));
            if out.iter().filter(|m| matches!(m, TypeValue::Boolean)).count() > 1 {
                let mut seen = false;
                out.retain(|m| {
                    if matches!(m, TypeValue::Boolean) {
                        if seen {
                            return false;
                        }
                        seen = true;
                    }
                    true
                });
            }
        }

        let has_string = out.contains(&TypeValue::String);
        let has_number = out.contains(&TypeValue::Number);
        let has_boolean = out.contains(&TypeValue::Boolean);
        out.retain(|m| match m {
            TypeValue::StringLiteral(_) | TypeValue::TemplateLiteral(_) => !has_string,
            TypeValue::NumberLiteral(_) => !has_number,
            TypeValue::BooleanLiteral(_) => !has_boolean,
            _ => true,
        });

        match out.len() {
            0 => TypeValue::Never,
            1 => out.remove(0),
            _ => TypeValue::Union(out),
        }
    }

    /// Normalised intersection. Distributes over union members, so the
    /// result is either a union of intersections or a single intersection.
    pub fn intersection(members: Vec<TypeValue>) -> TypeValue {
        let mut flat = Vec::with_capacity(members.len());
        for m in members {
            flatten_into(m, &mut flat, false);
        }

        if let Some(pos) = flat.iter().position(|m| matches!(m, TypeValue::Union(_))) {
            let union = flat.remove(pos);
            let alternatives = match union {
                TypeValue::Union(ms) => ms,
                other => vec![other],
            };
            let distributed = alternatives
                .into_iter()
                .map(|alt| {
                    let mut parts = flat.clone();
                    parts.push(alt);
                    TypeValue::intersection(parts)
                })
                .collect();
            return TypeValue::union(distributed);
        }

        if flat.iter().any(|m| matches!(m, TypeValue::Never)) {
            return TypeValue::Never;
        }
        if flat.iter().any(|m| matches!(m, TypeValue::Any)) {
            return TypeValue::Any;
        }

        let mut out: Vec<TypeValue> = Vec::with_capacity(flat.len());
        for m in flat {
            if matches!(m, TypeValue::Unknown) || out.contains(&m) {
                continue;
            }
            out.push(m);
        }

        // Primitive disjointness and literal & primitive → literal
        let mut keep = vec![true; out.len()];
        for i in 0..out.len() {
            for j in (i + 1)..out.len() {
                let (Some(ci), Some(cj)) = (out[i].primitive_class(), out[j].primitive_class()) else {
                    continue;
                };
                if ci != cj {
                    return TypeValue::Never;
                }
                match (out[i].is_unit(), out[j].is_unit()) {
                    (true, true) => return TypeValue::Never,
                    (true, false) => keep[j] = false,
                    (false, true) => keep[i] = false,
                    (false, false) => {}
                }
            }
        }
        let mut out: Vec<TypeValue> = out
            .into_iter()
            .zip(keep)
            .filter_map(|(m, k)| k.then_some(m))
            .collect();

        if out.len() > 1 && out.iter().all(|m| matches!(m, TypeValue::Object(_))) {
            if let Some(merged) = merge_objects(&out) {
                return merged;
            }
        }

        match out.len() {
            0 => TypeValue::Unknown,
            1 => out.remove(0),
            _ => TypeValue::Intersection(out),
        }
    }

    /// `T[]`
    pub fn array(element: TypeValue) -> TypeValue {
        TypeValue::Tuple(vec![element], true)
    }

    /// Concatenate two tuples as `[...left, ...right]`
    pub fn concat(left: TypeValue, right: TypeValue) -> TypeValue {
        match (left, right) {
            (TypeValue::Never, _) | (_, TypeValue::Never) => TypeValue::Never,
            (TypeValue::Tuple(mut l, false), TypeValue::Tuple(r, rest)) => {
                l.extend(r);
                TypeValue::Tuple(l, rest)
            }
            (TypeValue::Tuple(mut l, true), TypeValue::Tuple(r, _)) => {
                // Everything after an open rest element folds into it
                if let Some(last) = l.pop() {
                    let mut rest = vec![last];
                    rest.extend(r);
                    l.push(TypeValue::union(rest));
                }
                TypeValue::Tuple(l, true)
            }
            (TypeValue::Tuple(mut l, rest), _) => {
                if rest {
                    if let Some(last) = l.pop() {
                        l.push(TypeValue::union(vec![last, TypeValue::Any]));
                    }
                } else {
                    l.push(TypeValue::Any);
                }
                TypeValue::Tuple(l, true)
            }
            (_, right) => TypeValue::concat(TypeValue::array(TypeValue::Any), right),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TypeValue::BooleanLiteral(_) | TypeValue::NumberLiteral(_) | TypeValue::StringLiteral(_)
        )
    }

    /// The primitive a literal widens to
    pub fn natural_primitive(&self) -> Option<TypeValue> {
        match self {
            TypeValue::BooleanLiteral(_) => Some(TypeValue::Boolean),
            TypeValue::NumberLiteral(_) => Some(TypeValue::Number),
            TypeValue::StringLiteral(_) | TypeValue::TemplateLiteral(_) => Some(TypeValue::String),
            _ => None,
        }
    }

    pub fn is_string_like(&self) -> bool {
        match self {
            TypeValue::String | TypeValue::StringLiteral(_) | TypeValue::TemplateLiteral(_) => true,
            TypeValue::Union(ms) => ms.iter().all(TypeValue::is_string_like),
            _ => false,
        }
    }

    pub fn is_number_like(&self) -> bool {
        match self {
            TypeValue::Number | TypeValue::NumberLiteral(_) => true,
            TypeValue::Union(ms) => ms.iter().all(TypeValue::is_number_like),
            _ => false,
        }
    }

    /// Union constituents, or the value itself
    pub fn constituents(&self) -> &[TypeValue] {
        match self {
            TypeValue::Union(ms) => ms,
            other => std::slice::from_ref(other),
        }
    }

    fn primitive_class(&self) -> Option<PrimitiveClass> {
        match self {
            TypeValue::String | TypeValue::StringLiteral(_) | TypeValue::TemplateLiteral(_) => {
                Some(PrimitiveClass::String)
            }
            TypeValue::Number | TypeValue::NumberLiteral(_) => Some(PrimitiveClass::Number),
            TypeValue::Boolean | TypeValue::BooleanLiteral(_) => Some(PrimitiveClass::Boolean),
            TypeValue::Null => Some(PrimitiveClass::Null),
            TypeValue::Undefined => Some(PrimitiveClass::Undefined),
            _ => None,
        }
    }

    /// Types inhabited by exactly one value
    fn is_unit(&self) -> bool {
        self.is_literal() || matches!(self, TypeValue::Null | TypeValue::Undefined)
    }

    /// Widened form used for mutable bindings: literals become primitives,
    /// closed tuples become arrays.
    pub fn widen(&self) -> TypeValue {
        match self {
            TypeValue::BooleanLiteral(_)
            | TypeValue::NumberLiteral(_)
            | TypeValue::StringLiteral(_)
            | TypeValue::TemplateLiteral(_) => self.natural_primitive().unwrap_or(TypeValue::Any),
            TypeValue::Union(ms) => TypeValue::union(ms.iter().map(TypeValue::widen).collect()),
            TypeValue::Tuple(elements, false) => {
                if elements.is_empty() {
                    TypeValue::array(TypeValue::Any)
                } else {
                    TypeValue::array(TypeValue::union(elements.iter().map(TypeValue::widen).collect()))
                }
            }
            TypeValue::Object(members) => TypeValue::Object(
                members
                    .iter()
                    .map(|(k, m)| (k.clone(), Member { ty: m.ty.widen(), optional: m.optional }))
                    .collect(),
            ),
            _ => self.clone(),
        }
    }

    /// Property lookup shared by member access and structural assignability.
    /// Returns the property type and whether it is optional.
    pub fn property(&self, name: &str) -> Option<(TypeValue, bool)> {
        match self {
            TypeValue::Object(members) => members.get(name).map(|m| (m.ty.clone(), m.optional)),
            TypeValue::Tuple(elements, rest) => {
                if name == "length" {
                    return Some(if *rest {
                        (TypeValue::Number, false)
                    } else {
                        (TypeValue::NumberLiteral(elements.len() as f64), false)
                    });
                }
                let index: usize = name.parse().ok()?;
                tuple_element(elements, *rest, index).map(|ty| (ty, *rest))
            }
            TypeValue::StringLiteral(s) if name == "length" => {
                Some((TypeValue::NumberLiteral(s.chars().count() as f64), false))
            }
            TypeValue::String | TypeValue::TemplateLiteral(_) if name == "length" => {
                Some((TypeValue::Number, false))
            }
            TypeValue::Intersection(ms) => {
                let found: Vec<(TypeValue, bool)> = ms.iter().filter_map(|m| m.property(name)).collect();
                if found.is_empty() {
                    return None;
                }
                let optional = found.iter().all(|(_, o)| *o);
                Some((TypeValue::intersection(found.into_iter().map(|(t, _)| t).collect()), optional))
            }
            _ => None,
        }
    }
}

/// Element `index` of a tuple, taking the rest element into account
pub fn tuple_element(elements: &[TypeValue], rest: bool, index: usize) -> Option<TypeValue> {
    if rest {
        let fixed = elements.len().saturating_sub(1);
        if index < fixed {
            elements.get(index).cloned()
        } else {
            elements.last().cloned()
        }
    } else {
        elements.get(index).cloned()
    }
}

fn flatten_into(value: TypeValue, out: &mut Vec<TypeValue>, union: bool) {
    match value {
        TypeValue::Union(ms) if union => {
            for m in ms {
                flatten_into(m, out, union);
            }
        }
        TypeValue::Intersection(ms) if !union => {
            for m in ms {
                flatten_into(m, out, union);
            }
        }
        other => out.push(other),
    }
}

/// Merge object members; conflicting members intersect
pub(crate) fn merge_objects(objects: &[TypeValue]) -> Option<TypeValue> {
    let mut merged: IndexMap<String, Member> = IndexMap::new();
    for obj in objects {
        let TypeValue::Object(members) = obj else {
            return None;
        };
        for (name, member) in members {
            match merged.get_mut(name) {
                Some(existing) => {
                    existing.ty = TypeValue::intersection(vec![existing.ty.clone(), member.ty.clone()]);
                    existing.optional = existing.optional && member.optional;
                }
                None => {
                    merged.insert(name.clone(), member.clone());
                }
            }
        }
    }
    Some(TypeValue::Object(merged))
}

/// Render a number the way JavaScript's `String(n)` does for common values
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        // `{:e}` already yields the shortest mantissa; only the sign differs
        let text = format!("{:e}", n);
        match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => text,
        }
    } else if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeValue], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        if matches!(item, TypeValue::Function(..) | TypeValue::Conditional(_))
            || (sep == " & " && matches!(item, TypeValue::Union(_)))
        {
            write!(f, "({})", item)?;
        } else {
            write!(f, "{}", item)?;
        }
    }
    Ok(())
}

impl fmt::Display for TypeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeValue::Any => write!(f, "any"),
            TypeValue::Unknown => write!(f, "unknown"),
            TypeValue::Never => write!(f, "never"),
            TypeValue::Null => write!(f, "null"),
            TypeValue::Undefined => write!(f, "undefined"),
            TypeValue::String => write!(f, "string"),
            TypeValue::Number => write!(f, "number"),
            TypeValue::Boolean => write!(f, "boolean"),
            TypeValue::BooleanLiteral(b) => write!(f, "{}", b),
            TypeValue::NumberLiteral(n) => write!(f, "{}", format_number(*n)),
            TypeValue::StringLiteral(s) => write!(f, "{:?}", s),
            TypeValue::TemplateLiteral(parts) => {
                write!(f, "`")?;
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => write!(f, "{}", text)?,
                        TemplatePart::Hole(ty) => write!(f, "${{{}}}", ty)?,
                    }
                }
                write!(f, "`")
            }
            TypeValue::Union(ms) => write_list(f, ms, " | "),
            TypeValue::Intersection(ms) => write_list(f, ms, " & "),
            TypeValue::Tuple(elements, rest) => {
                if *rest && elements.len() == 1 {
                    let element = &elements[0];
                    return match element {
                        TypeValue::Union(_) | TypeValue::Intersection(_) | TypeValue::Function(..) => {
                            write!(f, "({})[]", element)
                        }
                        _ => write!(f, "{}[]", element),
                    };
                }
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if *rest && i + 1 == elements.len() {
                        write!(f, "...{}", TypeValue::array(element.clone()))?;
                    } else {
                        write!(f, "{}", element)?;
                    }
                }
                write!(f, "]")
            }
            TypeValue::Object(members) => {
                if members.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (name, member) in members {
                    let q = if member.optional { "?" } else { "" };
                    write!(f, "{}{}: {}; ", name, q, member.ty)?;
                }
                write!(f, "}}")
            }
            TypeValue::Function(params, ret) => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "arg{}: {}", i, p)?;
                }
                write!(f, ") => {}", ret)
            }
            TypeValue::GenericRef(symbol, args) => {
                write!(f, "{}", symbol.name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    write_list(f, args, ", ")?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeValue::Conditional(c) => write!(
                f,
                "{} extends {} ? {} : {}",
                c.check, c.extends, c.when_true, c.when_false
            ),
            TypeValue::IndexedAccess(object, key) => write!(f, "{}[{}]", object, key),
            TypeValue::Infer(name) => write!(f, "{}", name),
        }
    }
}
