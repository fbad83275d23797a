//! Template literal types: construction and string matching

use regex::Regex;

use super::{format_number, Relater, TemplatePart, TypeValue};

/// Upper bound on the number of strings a template may expand to before it
/// collapses to `string`
const MAX_EXPANSION: usize = 10_000;

/// Compose a template from its operands. Text fragments arrive as string
/// literals; every other operand is a hole.
pub fn build(operands: Vec<TypeValue>) -> TypeValue {
    let mut results: Vec<Vec<TemplatePart>> = vec![Vec::new()];
    for operand in operands {
        let alternatives = match operand {
            TypeValue::Never => return TypeValue::Never,
            TypeValue::Union(ms) => ms,
            other => vec![other],
        };
        if results.len() * alternatives.len() > MAX_EXPANSION {
            return TypeValue::String;
        }
        let mut next = Vec::with_capacity(results.len() * alternatives.len());
        for prefix in &results {
            for alt in &alternatives {
                let mut parts = prefix.clone();
                push_part(&mut parts, alt);
                next.push(parts);
            }
        }
        results = next;
    }
    TypeValue::union(results.into_iter().map(finish).collect())
}

fn push_text(parts: &mut Vec<TemplatePart>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(TemplatePart::Text(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(TemplatePart::Text(text.to_string()));
    }
}

fn push_part(parts: &mut Vec<TemplatePart>, value: &TypeValue) {
    match value {
        TypeValue::StringLiteral(s) => push_text(parts, s),
        TypeValue::NumberLiteral(n) => push_text(parts, &format_number(*n)),
        TypeValue::BooleanLiteral(b) => push_text(parts, if *b { "true" } else { "false" }),
        TypeValue::Null => push_text(parts, "null"),
        TypeValue::Undefined => push_text(parts, "undefined"),
        TypeValue::TemplateLiteral(inner) => {
            for part in inner {
                match part {
                    TemplatePart::Text(t) => push_text(parts, t),
                    TemplatePart::Hole(h) => parts.push(TemplatePart::Hole(h.clone())),
                }
            }
        }
        TypeValue::Any => parts.push(TemplatePart::Hole(TypeValue::String)),
        other => parts.push(TemplatePart::Hole(other.clone())),
    }
}

fn finish(parts: Vec<TemplatePart>) -> TypeValue {
    match parts.as_slice() {
        [] => TypeValue::StringLiteral(String::new()),
        [TemplatePart::Text(text)] => TypeValue::StringLiteral(text.clone()),
        _ => TypeValue::TemplateLiteral(parts),
    }
}

fn hole_pattern(hole: &TypeValue, followed_by_hole: bool) -> &'static str {
    match hole {
        TypeValue::Number => r"(-?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)",
        TypeValue::Boolean => "(true|false)",
        // A hole directly followed by another hole takes one character
        _ if followed_by_hole => "(.)",
        _ => "(.*?)",
    }
}

/// Whether the string `text` inhabits the template described by `parts`.
/// `infer` holes bind their matched text through `relater`.
pub fn matches(text: &str, parts: &[TemplatePart], relater: &mut Relater) -> bool {
    let mut pattern = String::from("(?s)^");
    for (i, part) in parts.iter().enumerate() {
        match part {
            TemplatePart::Text(t) => pattern.push_str(&regex::escape(t)),
            TemplatePart::Hole(hole) => {
                let followed_by_hole = matches!(parts.get(i + 1), Some(TemplatePart::Hole(_)));
                pattern.push_str(hole_pattern(hole, followed_by_hole));
            }
        }
    }
    pattern.push('$');

    let Ok(re) = Regex::new(&pattern) else {
        return false;
    };
    let Some(captures) = re.captures(text) else {
        return false;
    };

    let holes = parts.iter().filter_map(|p| match p {
        TemplatePart::Hole(h) => Some(h),
        TemplatePart::Text(_) => None,
    });
    for (i, hole) in holes.enumerate() {
        let matched = captures.get(i + 1).map_or("", |m| m.as_str());
        let ok = match hole {
            TypeValue::String | TypeValue::Any | TypeValue::Unknown | TypeValue::Number | TypeValue::Boolean => true,
            TypeValue::Infer(name) => {
                relater.bind(name, TypeValue::StringLiteral(matched.to_string()));
                true
            }
            other => relater.relate(&TypeValue::StringLiteral(matched.to_string()), other),
        };
        if !ok {
            return false;
        }
    }
    true
}
