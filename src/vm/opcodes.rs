//! Type VM instruction set

use std::fmt;

use crate::ast::{BinaryOp, UnaryOp};
use crate::types::{format_number, Guard};

/// Storage location of a declaration: lexical frame depth plus slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub depth: u16,
    pub slot: u16,
}

impl Address {
    /// Placeholder carried by instructions until `Program::build` patches them
    pub const UNRESOLVED: Address = Address {
        depth: u16::MAX,
        slot: u16::MAX,
    };

    pub fn new(depth: u16, slot: u16) -> Self {
        Self { depth, slot }
    }

    pub fn is_resolved(&self) -> bool {
        *self != Self::UNRESOLVED
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_resolved() {
            write!(f, "@{}:{}", self.depth, self.slot)
        } else {
            write!(f, "@?")
        }
    }
}

/// One member of an object shape constant
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMember {
    pub name: String,
    pub optional: bool,
}

/// Constants stored in the module's constant pool
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Str(String),
    Number(f64),
    /// Property names of an object literal or object type, in order
    Shape(Vec<ShapeMember>),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Number(n) => write!(f, "{}", format_number(*n)),
            Constant::Shape(members) => {
                write!(f, "{{")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}{}", m.name, if m.optional { "?" } else { "" })?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// Bytecode instructions for the type VM.
///
/// All operands are Copy types so instructions can be copied cheaply.
/// u16 operands index the constant pool, slots or subroutines; u32 lengths
/// count the instructions of an inline block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    // ── Primitives & literals ────────────────────────────────────────
    Any,
    Unknown,
    Never,
    Null,
    Undefined,
    String,
    Number,
    Boolean,
    True,
    False,
    /// Push NumberLiteral(constants[idx])
    NumberLiteral(u16),
    /// Push StringLiteral(constants[idx])
    StringLiteral(u16),

    // ── Composites ───────────────────────────────────────────────────
    /// Pop n, push their normalised union
    Union(u16),
    /// Pop n, push their normalised intersection
    Intersection(u16),
    /// Pop len elements; with `rest` the last one is the rest element type
    Tuple { len: u16, rest: bool },
    /// Pop right, pop left, push `[...left, ...right]`
    Concat,
    /// Pop one member type per shape entry (shape constant index)
    Object(u16),
    /// Pop return type, then n parameter types
    Function(u16),
    /// Pop n fragments and holes, push the composed template
    TemplateLiteral(u16),
    /// Pop key, pop object, push the member type
    Index,
    /// Pop a type, push the union of its keys
    KeyOf,

    // ── Slots ────────────────────────────────────────────────────────
    /// Push the value of a slot, evaluating it on first use
    Load(Address),
    /// Pop the declared type of a binding, declare it, push it back
    Var(Address),
    /// Pop a value and check it against the binding's declared type
    Assign(Address),
    /// Push the binding's current narrowed type
    Save(Address),
    /// Pop a type into the binding's narrowed type
    Restore(Address),
    /// Refine the binding's narrowed type under a guard
    Narrow { addr: Address, guard: Guard, negate: bool },
    /// Push the `infer` variable declared at addr
    Infer(Address),

    // ── Generics ─────────────────────────────────────────────────────
    /// Pop argc type arguments, instantiate the generic alias at addr
    Call { addr: Address, argc: u16 },
    /// A name that resolved nowhere: pop `pop` operands, report it, and
    /// push `any` when `push` is set
    Missing { name: u16, pop: u16, push: bool },
    /// Push argument `index` of the instantiation and skip the next `skip`
    /// instructions (the default), or fall through to the default
    Param { index: u16, skip: u32 },
    /// Pop a type into type-parameter slot n of the current frame
    Bind(u16),
    /// Pop a constraint and check type-parameter slot n against it
    Constraint(u16),
    /// Pop the check type and evaluate the inline extends / true / false
    /// blocks that follow. `distribute` names the naked type parameter the
    /// check distributes over.
    Conditional {
        distribute: Option<Address>,
        infer_slot: u16,
        infer_count: u16,
        extends_len: u32,
        true_len: u32,
        false_len: u32,
    },

    // ── Values ───────────────────────────────────────────────────────
    /// Replace the top with its widened form
    Widen,
    /// Pop right, pop left, push the result type of the operator
    Binary(BinaryOp),
    /// Pop operand, push the result type of the operator
    Unary(UnaryOp),
    /// Pop n argument types, pop callee, push its return type
    Invoke(u16),
    /// Run a function body subroutine in a fresh frame
    Body(u16),

    // ── Stack & control ──────────────────────────────────────────────
    Pop,
    Dup,
    Swap,
    /// End of the current subroutine or inline block
    Return,
}

impl Instruction {
    /// Operand address that `Program::build` resolves
    pub fn patchable_address(&self) -> Option<Address> {
        match self {
            Instruction::Load(addr) | Instruction::Assign(addr) => Some(*addr),
            Instruction::Call { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    pub fn with_address(self, addr: Address) -> Instruction {
        match self {
            Instruction::Load(_) => Instruction::Load(addr),
            Instruction::Assign(_) => Instruction::Assign(addr),
            Instruction::Call { argc, .. } => Instruction::Call { addr, argc },
            other => other,
        }
    }

    /// What a reference that resolves nowhere turns into
    pub fn as_missing(self, name: u16) -> Instruction {
        match self {
            Instruction::Call { argc, .. } => Instruction::Missing { name, pop: argc, push: true },
            Instruction::Assign(_) => Instruction::Missing { name, pop: 1, push: false },
            _ => Instruction::Missing { name, pop: 0, push: true },
        }
    }

    /// Every address operand, patched or not
    pub fn addresses(&self) -> Vec<Address> {
        match self {
            Instruction::Load(a)
            | Instruction::Var(a)
            | Instruction::Assign(a)
            | Instruction::Save(a)
            | Instruction::Restore(a)
            | Instruction::Infer(a) => vec![*a],
            Instruction::Narrow { addr, .. } | Instruction::Call { addr, .. } => vec![*addr],
            Instruction::Conditional { distribute: Some(a), .. } => vec![*a],
            _ => Vec::new(),
        }
    }
}

fn guard_text(guard: &Guard) -> String {
    match guard {
        Guard::TypeOf(tag) => format!("typeof={}", tag.name()),
        Guard::IsNull => "null".to_string(),
        Guard::IsUndefined => "undefined".to_string(),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Any => write!(f, "ANY"),
            Instruction::Unknown => write!(f, "UNKNOWN"),
            Instruction::Never => write!(f, "NEVER"),
            Instruction::Null => write!(f, "NULL"),
            Instruction::Undefined => write!(f, "UNDEFINED"),
            Instruction::String => write!(f, "STRING"),
            Instruction::Number => write!(f, "NUMBER"),
            Instruction::Boolean => write!(f, "BOOLEAN"),
            Instruction::True => write!(f, "TRUE"),
            Instruction::False => write!(f, "FALSE"),
            Instruction::NumberLiteral(i) => write!(f, "NUMBER_LITERAL c{}", i),
            Instruction::StringLiteral(i) => write!(f, "STRING_LITERAL c{}", i),
            Instruction::Union(n) => write!(f, "UNION {}", n),
            Instruction::Intersection(n) => write!(f, "INTERSECTION {}", n),
            Instruction::Tuple { len, rest } => {
                write!(f, "TUPLE {}{}", len, if *rest { " rest" } else { "" })
            }
            Instruction::Concat => write!(f, "CONCAT"),
            Instruction::Object(i) => write!(f, "OBJECT c{}", i),
            Instruction::Function(n) => write!(f, "FUNCTION {}", n),
            Instruction::TemplateLiteral(n) => write!(f, "TEMPLATE_LITERAL {}", n),
            Instruction::Index => write!(f, "INDEX"),
            Instruction::KeyOf => write!(f, "KEYOF"),
            Instruction::Load(a) => write!(f, "LOAD {}", a),
            Instruction::Var(a) => write!(f, "VAR {}", a),
            Instruction::Assign(a) => write!(f, "ASSIGN {}", a),
            Instruction::Save(a) => write!(f, "SAVE {}", a),
            Instruction::Restore(a) => write!(f, "RESTORE {}", a),
            Instruction::Narrow { addr, guard, negate } => write!(
                f,
                "NARROW {} {}{}",
                addr,
                if *negate { "!" } else { "" },
                guard_text(guard)
            ),
            Instruction::Infer(a) => write!(f, "INFER {}", a),
            Instruction::Call { addr, argc } => write!(f, "CALL {} args={}", addr, argc),
            Instruction::Missing { name, pop, push } => {
                write!(f, "MISSING c{} pop={}{}", name, pop, if *push { " push" } else { "" })
            }
            Instruction::Param { index, skip } => write!(f, "PARAM {} skip={}", index, skip),
            Instruction::Bind(i) => write!(f, "BIND {}", i),
            Instruction::Constraint(i) => write!(f, "CONSTRAINT {}", i),
            Instruction::Conditional {
                distribute,
                infer_slot,
                infer_count,
                extends_len,
                true_len,
                false_len,
            } => {
                write!(f, "CONDITIONAL")?;
                if let Some(addr) = distribute {
                    write!(f, " distribute={}", addr)?;
                }
                if *infer_count > 0 {
                    write!(f, " infer={}..{}", infer_slot, infer_slot + infer_count)?;
                }
                write!(f, " extends={} true={} false={}", extends_len, true_len, false_len)
            }
            Instruction::Widen => write!(f, "WIDEN"),
            Instruction::Binary(op) => write!(f, "BINARY {}", op.symbol()),
            Instruction::Unary(op) => write!(f, "UNARY {}", op.symbol()),
            Instruction::Invoke(n) => write!(f, "INVOKE {}", n),
            Instruction::Body(i) => write!(f, "BODY s{}", i),
            Instruction::Pop => write!(f, "POP"),
            Instruction::Dup => write!(f, "DUP"),
            Instruction::Swap => write!(f, "SWAP"),
            Instruction::Return => write!(f, "RETURN"),
        }
    }
}
