//! Diagnostic records emitted by the VM
//!
//! A diagnostic is built from a static [`DiagnosticMessage`] plus its
//! arguments. The message text is looked up through a [`MessageCatalog`]
//! handed to the VM, so localisation never depends on global state.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Byte range plus the 1-based line/column of its start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        Self { start, end, line, column }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest span covering both `self` and `other`
    pub fn to(&self, other: Span) -> Span {
        Span { end: other.end.max(self.end), ..*self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Error,
    Warning,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Error => write!(f, "error"),
            Category::Warning => write!(f, "warning"),
        }
    }
}

/// A message template known to the checker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticMessage {
    pub code: u32,
    pub category: Category,
    pub key: &'static str,
    pub text: &'static str,
}

const fn error(code: u32, key: &'static str, text: &'static str) -> DiagnosticMessage {
    DiagnosticMessage { code, category: Category::Error, key, text }
}

/// Message table. `{n}` placeholders are filled positionally.
pub mod messages {
    use super::{error, DiagnosticMessage};

    pub const CANNOT_FIND_NAME: DiagnosticMessage =
        error(2304, "Cannot_find_name_0_2304", "Cannot find name '{0}'.");
    pub const GENERIC_TYPE_REQUIRES_ARGUMENTS: DiagnosticMessage = error(
        2314,
        "Generic_type_0_requires_1_type_argument_s_2314",
        "Generic type '{0}' requires {1} type argument(s).",
    );
    pub const TYPE_IS_NOT_GENERIC: DiagnosticMessage =
        error(2315, "Type_0_is_not_generic_2315", "Type '{0}' is not generic.");
    pub const NOT_ASSIGNABLE: DiagnosticMessage = error(
        2322,
        "Type_0_is_not_assignable_to_type_1_2322",
        "Type '{0}' is not assignable to type '{1}'.",
    );
    pub const PROPERTY_DOES_NOT_EXIST: DiagnosticMessage = error(
        2339,
        "Property_0_does_not_exist_on_type_1_2339",
        "Property '{0}' does not exist on type '{1}'.",
    );
    pub const DOES_NOT_SATISFY_CONSTRAINT: DiagnosticMessage = error(
        2344,
        "Type_0_does_not_satisfy_the_constraint_1_2344",
        "Type '{0}' does not satisfy the constraint '{1}'.",
    );
    pub const ARGUMENT_NOT_ASSIGNABLE: DiagnosticMessage = error(
        2345,
        "Argument_of_type_0_is_not_assignable_to_parameter_of_type_1_2345",
        "Argument of type '{0}' is not assignable to parameter of type '{1}'.",
    );
    pub const NOT_CALLABLE: DiagnosticMessage = error(
        2349,
        "This_expression_is_not_callable_2349",
        "This expression is not callable.",
    );
    pub const ARITHMETIC_LEFT_OPERAND: DiagnosticMessage = error(
        2362,
        "The_left_hand_side_of_an_arithmetic_operation_must_be_of_type_any_or_number_2362",
        "The left-hand side of an arithmetic operation must be of type 'any' or 'number'.",
    );
    pub const ARITHMETIC_RIGHT_OPERAND: DiagnosticMessage = error(
        2363,
        "The_right_hand_side_of_an_arithmetic_operation_must_be_of_type_any_or_number_2363",
        "The right-hand side of an arithmetic operation must be of type 'any' or 'number'.",
    );
    pub const OPERATOR_CANNOT_BE_APPLIED: DiagnosticMessage = error(
        2365,
        "Operator_0_cannot_be_applied_to_types_1_and_2_2365",
        "Operator '{0}' cannot be applied to types '{1}' and '{2}'.",
    );
    pub const USED_BEFORE_DECLARATION: DiagnosticMessage = error(
        2448,
        "Block_scoped_variable_0_used_before_its_declaration_2448",
        "Block-scoped variable '{0}' used before its declaration.",
    );
    pub const CIRCULAR_TYPE_ALIAS: DiagnosticMessage = error(
        2456,
        "Type_alias_0_circularly_references_itself_2456",
        "Type alias '{0}' circularly references itself.",
    );
    pub const TUPLE_INDEX_OUT_OF_RANGE: DiagnosticMessage = error(
        2493,
        "Tuple_type_0_of_length_1_has_no_element_at_index_2_2493",
        "Tuple type '{0}' of length '{1}' has no element at index '{2}'.",
    );
    pub const CANNOT_BE_USED_AS_INDEX: DiagnosticMessage = error(
        2536,
        "Type_0_cannot_be_used_to_index_type_1_2536",
        "Type '{0}' cannot be used to index type '{1}'.",
    );
    pub const NOT_A_VARIABLE: DiagnosticMessage = error(
        2539,
        "Cannot_assign_to_0_because_it_is_not_a_variable_2539",
        "Cannot assign to '{0}' because it is not a variable.",
    );
    pub const EXPECTED_ARGUMENTS: DiagnosticMessage = error(
        2554,
        "Expected_0_arguments_but_got_1_2554",
        "Expected {0} arguments, but got {1}.",
    );
    pub const CANNOT_ASSIGN_TO_CONSTANT: DiagnosticMessage = error(
        2588,
        "Cannot_assign_to_0_because_it_is_a_constant_2588",
        "Cannot assign to '{0}' because it is a constant.",
    );
    pub const EXCESSIVELY_DEEP_INSTANTIATION: DiagnosticMessage = error(
        2589,
        "Type_instantiation_is_excessively_deep_and_possibly_infinite_2589",
        "Type instantiation is excessively deep and possibly infinite.",
    );
    pub const GENERIC_TYPE_REQUIRES_BETWEEN: DiagnosticMessage = error(
        2707,
        "Generic_type_0_requires_between_1_and_2_type_arguments_2707",
        "Generic type '{0}' requires between {1} and {2} type arguments.",
    );
}

/// Looks up the (possibly localized) template for a message.
///
/// Returning `None` falls back to the built-in English text.
pub trait MessageCatalog: Send + Sync {
    fn template(&self, message: &DiagnosticMessage) -> Option<&str>;
}

/// The built-in English messages
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCatalog;

impl MessageCatalog for DefaultCatalog {
    fn template(&self, _message: &DiagnosticMessage) -> Option<&str> {
        None
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read message catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid message catalog: {0}")]
    Json(#[from] serde_json::Error),
}

/// A catalog read from a JSON object of `key -> template`
#[derive(Debug, Default, Clone)]
pub struct JsonCatalog {
    entries: HashMap<String, String>,
}

impl JsonCatalog {
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let entries: HashMap<String, String> = serde_json::from_str(text)?;
        Ok(Self { entries })
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MessageCatalog for JsonCatalog {
    fn template(&self, message: &DiagnosticMessage) -> Option<&str> {
        self.entries.get(message.key).map(|s| s.as_str())
    }
}

/// Replace `{0}`, `{1}`, … with the matching argument.
pub fn format_message(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                match after[..close].parse::<usize>().ok().and_then(|i| args.get(i)) {
                    Some(arg) => out.push_str(arg),
                    None => out.push_str(&rest[open..open + close + 2]),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// One detected issue. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub category: Category,
    pub code: u32,
    pub file: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(
        catalog: &dyn MessageCatalog,
        message: &DiagnosticMessage,
        args: &[String],
        file: &str,
        span: Span,
    ) -> Self {
        let template = catalog.template(message).unwrap_or(message.text);
        Self {
            message: format_message(template, args),
            category: message.category,
            code: message.code,
            file: file.to_string(),
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} - {} TS{}: {}",
            self.file, self.span.line, self.span.column, self.category, self.code, self.message
        )
    }
}
