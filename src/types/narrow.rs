//! Control-flow narrowing of slot types

use super::{is_assignable, TypeValue};

/// Result strings of the JavaScript `typeof` operator that guards understand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Undefined,
    Object,
    Function,
}

impl TypeTag {
    pub fn from_name(name: &str) -> Option<TypeTag> {
        match name {
            "string" => Some(TypeTag::String),
            "number" => Some(TypeTag::Number),
            "boolean" => Some(TypeTag::Boolean),
            "undefined" => Some(TypeTag::Undefined),
            "object" => Some(TypeTag::Object),
            "function" => Some(TypeTag::Function),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::Undefined => "undefined",
            TypeTag::Object => "object",
            TypeTag::Function => "function",
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            TypeTag::String => 0,
            TypeTag::Number => 1,
            TypeTag::Boolean => 2,
            TypeTag::Undefined => 3,
            TypeTag::Object => 4,
            TypeTag::Function => 5,
        }
    }

    pub fn from_u8(tag: u8) -> Option<TypeTag> {
        match tag {
            0 => Some(TypeTag::String),
            1 => Some(TypeTag::Number),
            2 => Some(TypeTag::Boolean),
            3 => Some(TypeTag::Undefined),
            4 => Some(TypeTag::Object),
            5 => Some(TypeTag::Function),
            _ => None,
        }
    }
}

/// A condition that refines the type of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// `typeof x === "tag"`
    TypeOf(TypeTag),
    /// `x === null`
    IsNull,
    /// `x === undefined`
    IsUndefined,
}

impl Guard {
    /// Type a completely unknown value has once the guard holds
    fn positive_type(self) -> TypeValue {
        match self {
            Guard::TypeOf(TypeTag::String) => TypeValue::String,
            Guard::TypeOf(TypeTag::Number) => TypeValue::Number,
            Guard::TypeOf(TypeTag::Boolean) => TypeValue::Boolean,
            Guard::TypeOf(TypeTag::Undefined) | Guard::IsUndefined => TypeValue::Undefined,
            Guard::TypeOf(TypeTag::Object) => {
                TypeValue::union(vec![TypeValue::Object(Default::default()), TypeValue::Null])
            }
            Guard::TypeOf(TypeTag::Function) => {
                TypeValue::Function(Vec::new(), Box::new(TypeValue::Unknown))
            }
            Guard::IsNull => TypeValue::Null,
        }
    }

    /// Whether a non-union value certainly passes (`Some(true)`), certainly
    /// fails (`Some(false)`), or cannot be decided.
    fn test(self, ty: &TypeValue) -> Option<bool> {
        use TypeValue as T;
        match ty {
            T::Any | T::Unknown | T::GenericRef(..) | T::Conditional(_) | T::IndexedAccess(..) | T::Infer(_) => {
                None
            }
            T::Never => Some(false),
            T::Union(ms) => {
                let results: Vec<Option<bool>> = ms.iter().map(|m| self.test(m)).collect();
                if results.iter().all(|r| *r == Some(true)) {
                    Some(true)
                } else if results.iter().all(|r| *r == Some(false)) {
                    Some(false)
                } else {
                    None
                }
            }
            T::Intersection(ms) => {
                if ms.iter().any(|m| self.test(m) == Some(true)) {
                    Some(true)
                } else {
                    None
                }
            }
            _ => Some(match self {
                Guard::TypeOf(TypeTag::String) => {
                    matches!(ty, T::String | T::StringLiteral(_) | T::TemplateLiteral(_))
                }
                Guard::TypeOf(TypeTag::Number) => matches!(ty, T::Number | T::NumberLiteral(_)),
                Guard::TypeOf(TypeTag::Boolean) => matches!(ty, T::Boolean | T::BooleanLiteral(_)),
                Guard::TypeOf(TypeTag::Undefined) | Guard::IsUndefined => matches!(ty, T::Undefined),
                Guard::TypeOf(TypeTag::Object) => matches!(ty, T::Null | T::Object(_) | T::Tuple(..)),
                Guard::TypeOf(TypeTag::Function) => matches!(ty, T::Function(..)),
                Guard::IsNull => matches!(ty, T::Null),
            }),
        }
    }
}

/// Refine `ty` under `guard` (or its complement when `negate` is set)
pub fn narrow(ty: &TypeValue, guard: Guard, negate: bool) -> TypeValue {
    match ty {
        TypeValue::Union(ms) => TypeValue::union(ms.iter().map(|m| narrow(m, guard, negate)).collect()),
        TypeValue::Any | TypeValue::Unknown if !negate => guard.positive_type(),
        other => match guard.test(other) {
            Some(passes) if passes == negate => TypeValue::Never,
            _ => other.clone(),
        },
    }
}

/// The narrowed type a slot takes after `assigned` was stored into a slot
/// declared as `declared`
pub fn narrow_by_assignment(declared: &TypeValue, assigned: &TypeValue) -> TypeValue {
    match declared {
        TypeValue::Any | TypeValue::Unknown => assigned.widen(),
        TypeValue::Union(members) => {
            if let TypeValue::Union(parts) = assigned {
                return TypeValue::union(parts.iter().map(|p| narrow_by_assignment(declared, p)).collect());
            }
            let kept: Vec<TypeValue> = members.iter().filter(|m| is_assignable(assigned, m)).cloned().collect();
            if kept.is_empty() {
                declared.clone()
            } else {
                TypeValue::union(kept)
            }
        }
        _ => declared.clone(),
    }
}
