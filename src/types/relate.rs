//! The structural assignability relation
//!
//! [`Relater`] answers "is `source` assignable to `target`" and records the
//! bindings of any `infer` variables met in the target along the way.

use super::template;
use super::{merge_objects, Member, TemplatePart, TypeValue};

use indexmap::IndexMap;

/// Relation state for one top-level check
#[derive(Debug, Default)]
pub struct Relater {
    inferences: Vec<(String, TypeValue)>,
}

/// `source` assignable to `target`, ignoring any `infer` bindings
pub fn is_assignable(source: &TypeValue, target: &TypeValue) -> bool {
    Relater::new().relate(source, target)
}

impl Relater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inferred bindings, candidates for the same name united
    pub fn into_inferences(self) -> IndexMap<String, TypeValue> {
        let mut grouped: IndexMap<String, Vec<TypeValue>> = IndexMap::new();
        for (name, ty) in self.inferences {
            grouped.entry(name).or_default().push(ty);
        }
        grouped.into_iter().map(|(name, candidates)| (name, TypeValue::union(candidates))).collect()
    }

    pub(crate) fn bind(&mut self, name: &str, ty: TypeValue) {
        self.inferences.push((name.to_string(), ty));
    }

    /// Try a relation and roll back any bindings it made when it fails
    fn attempt(&mut self, source: &TypeValue, target: &TypeValue) -> bool {
        let mark = self.inferences.len();
        let ok = self.relate(source, target);
        if !ok {
            self.inferences.truncate(mark);
        }
        ok
    }

    pub fn relate(&mut self, source: &TypeValue, target: &TypeValue) -> bool {
        use TypeValue as T;

        if let T::Infer(name) = target {
            self.bind(name, source.clone());
            return true;
        }
        if source == target {
            return true;
        }
        if matches!(target, T::Any | T::Unknown) {
            return true;
        }
        match source {
            T::Any => return !matches!(target, T::Never),
            T::Never => return true,
            _ => {}
        }
        if matches!(target, T::Never) {
            return false;
        }

        if let T::Union(members) = source {
            return members.iter().all(|m| self.relate(m, target));
        }
        if matches!(source, T::Boolean) && matches!(target, T::Union(_)) {
            return self.relate(&T::BooleanLiteral(true), target) && self.relate(&T::BooleanLiteral(false), target);
        }
        if let T::Union(members) = target {
            return members.iter().any(|m| self.attempt(source, m));
        }
        if let T::Intersection(members) = source {
            if members.iter().any(|m| self.attempt(m, target)) {
                return true;
            }
            let objects: Vec<TypeValue> = members.iter().filter(|m| matches!(m, T::Object(_))).cloned().collect();
            return match merge_objects(&objects) {
                Some(merged) if objects.len() > 1 => self.relate(&merged, target),
                _ => false,
            };
        }
        if let T::Intersection(members) = target {
            return members.iter().all(|m| self.relate(source, m));
        }

        self.relate_structural(source, target)
    }

    fn relate_structural(&mut self, source: &TypeValue, target: &TypeValue) -> bool {
        use TypeValue as T;
        match target {
            T::Null | T::Undefined => false,
            T::String => matches!(source, T::StringLiteral(_) | T::TemplateLiteral(_)),
            T::Number => matches!(source, T::NumberLiteral(_)),
            T::Boolean => matches!(source, T::BooleanLiteral(_)),
            T::BooleanLiteral(_) | T::NumberLiteral(_) | T::StringLiteral(_) => false,
            T::TemplateLiteral(parts) => match source {
                T::StringLiteral(text) => template::matches(text, parts, self),
                T::String => matches!(
                    parts.as_slice(),
                    [TemplatePart::Hole(T::String)] | [TemplatePart::Hole(T::Any)]
                ),
                _ => false,
            },
            T::Tuple(target_elems, target_rest) => match source {
                T::Tuple(source_elems, source_rest) => {
                    self.relate_tuples(source_elems, *source_rest, target_elems, *target_rest)
                }
                _ => false,
            },
            T::Object(members) => self.relate_object(source, members),
            T::Function(target_params, target_ret) => match source {
                T::Function(source_params, source_ret) => {
                    source_params.len() <= target_params.len()
                        && source_params.iter().zip(target_params).all(|(s, t)| self.relate(t, s))
                        && self.relate(source_ret, target_ret)
                }
                _ => false,
            },
            // Deferred values are only related by equality, checked above
            T::GenericRef(..) | T::Conditional(_) | T::IndexedAccess(..) => false,
            T::Any | T::Unknown | T::Infer(_) => true,
            T::Never | T::Union(_) | T::Intersection(_) => false,
        }
    }

    fn relate_tuples(
        &mut self,
        source: &[TypeValue],
        source_rest: bool,
        target: &[TypeValue],
        target_rest: bool,
    ) -> bool {
        if !target_rest {
            return !source_rest
                && source.len() == target.len()
                && source.iter().zip(target).all(|(s, t)| self.relate(s, t));
        }
        let Some((rest, fixed)) = target.split_last() else {
            return false;
        };
        if source_rest {
            let Some((source_rest_elem, source_fixed)) = source.split_last() else {
                return false;
            };
            source_fixed.len() >= fixed.len()
                && source_fixed.iter().zip(fixed).all(|(s, t)| self.relate(s, t))
                && source_fixed[fixed.len()..].iter().all(|s| self.relate(s, rest))
                && self.relate(source_rest_elem, rest)
        } else {
            source.len() >= fixed.len()
                && source.iter().zip(fixed).all(|(s, t)| self.relate(s, t))
                && source[fixed.len()..].iter().all(|s| self.relate(s, rest))
        }
    }

    fn relate_object(&mut self, source: &TypeValue, members: &IndexMap<String, Member>) -> bool {
        if matches!(source, TypeValue::Null | TypeValue::Undefined) {
            return false;
        }
        for (name, member) in members {
            match source.property(name) {
                Some((ty, optional)) => {
                    if optional && !member.optional {
                        return false;
                    }
                    if !self.relate(&ty, &member.ty) {
                        return false;
                    }
                }
                None if member.optional => {}
                None => return false,
            }
        }
        true
    }
}
