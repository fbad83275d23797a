//! Type VM bytecode module format and serialization
//!
//! A built program is a [`Bytecode`] blob: header, SHA-256 digest and the
//! serialized [`Module`]. The VM decodes the blob at the start of every run.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::opcodes::{Address, Constant, Instruction, ShapeMember};
use crate::ast::{BinaryOp, UnaryOp};
use crate::diagnostics::Span;
use crate::types::{Guard, TypeTag};

/// What a frame slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A type alias; generic when `params > 0`
    Alias { body: u16, params: u16, required: u16 },
    /// A hoisted function whose signature is evaluated lazily
    Function { signature: u16 },
    TypeParam,
    /// `const` (constant) or `let`/`var`/parameter binding
    Binding { constant: bool },
    Infer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotDecl {
    pub name: String,
    pub kind: SlotKind,
}

/// Slots of every frame created for one lexical scope
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameLayout {
    pub depth: u16,
    pub slots: Vec<SlotDecl>,
}

/// A linked subroutine: `len` instructions starting at `entry`
#[derive(Debug, Clone, PartialEq)]
pub struct SubroutineInfo {
    pub name: String,
    pub layout: u16,
    pub entry: u32,
    pub len: u32,
}

/// A linked program. Subroutine 0 is the file entry point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub file: String,
    pub constants: Vec<Constant>,
    pub layouts: Vec<FrameLayout>,
    pub subroutines: Vec<SubroutineInfo>,
    pub code: Vec<Instruction>,
    /// (instruction index, span), sorted by index
    pub spans: Vec<(u32, Span)>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bytecode too small")]
    TooShort,
    #[error("invalid magic number; not a type VM module")]
    BadMagic,
    #[error("unsupported bytecode version: {0}")]
    UnsupportedVersion(u8),
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("unexpected end of data at offset {0}")]
    Truncated(usize),
    #[error("unknown opcode 0x{op:02x} at offset {offset}")]
    UnknownOpcode { op: u8, offset: usize },
    #[error("unknown {what} tag {tag} at offset {offset}")]
    UnknownTag { what: &'static str, tag: u8, offset: usize },
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),
    #[error("unresolved reference at instruction {0}")]
    Unresolved(usize),
    #[error("inconsistent module: {0}")]
    Inconsistent(String),
}

// ── Binary serialization ─────────────────────────────────────────────────

const MAGIC: &[u8; 4] = b"TYVM";
const VERSION: u8 = 1;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 1 + DIGEST_LEN;

// Constant type tags
const TAG_STR: u8 = 0;
const TAG_NUMBER: u8 = 1;
const TAG_SHAPE: u8 = 2;

// Slot kind tags
const KIND_ALIAS: u8 = 0;
const KIND_FUNCTION: u8 = 1;
const KIND_TYPE_PARAM: u8 = 2;
const KIND_BINDING: u8 = 3;
const KIND_INFER: u8 = 4;

// Guard tags
const GUARD_TYPEOF: u8 = 0;
const GUARD_NULL: u8 = 1;
const GUARD_UNDEFINED: u8 = 2;

// Instruction opcode bytes
const OP_ANY: u8 = 0x01;
const OP_UNKNOWN: u8 = 0x02;
const OP_NEVER: u8 = 0x03;
const OP_NULL: u8 = 0x04;
const OP_UNDEFINED: u8 = 0x05;
const OP_STRING: u8 = 0x06;
const OP_NUMBER: u8 = 0x07;
const OP_BOOLEAN: u8 = 0x08;
const OP_TRUE: u8 = 0x09;
const OP_FALSE: u8 = 0x0a;
const OP_NUMBER_LITERAL: u8 = 0x0b;
const OP_STRING_LITERAL: u8 = 0x0c;
const OP_UNION: u8 = 0x10;
const OP_INTERSECTION: u8 = 0x11;
const OP_TUPLE: u8 = 0x12;
const OP_CONCAT: u8 = 0x13;
const OP_OBJECT: u8 = 0x14;
const OP_FUNCTION: u8 = 0x15;
const OP_TEMPLATE_LITERAL: u8 = 0x16;
const OP_INDEX: u8 = 0x17;
const OP_KEYOF: u8 = 0x18;
const OP_LOAD: u8 = 0x20;
const OP_VAR: u8 = 0x21;
const OP_ASSIGN: u8 = 0x22;
const OP_SAVE: u8 = 0x23;
const OP_RESTORE: u8 = 0x24;
const OP_NARROW: u8 = 0x25;
const OP_INFER: u8 = 0x26;
const OP_CALL: u8 = 0x30;
const OP_MISSING: u8 = 0x31;
const OP_PARAM: u8 = 0x32;
const OP_BIND: u8 = 0x33;
const OP_CONSTRAINT: u8 = 0x34;
const OP_CONDITIONAL: u8 = 0x35;
const OP_WIDEN: u8 = 0x40;
const OP_BINARY: u8 = 0x41;
const OP_UNARY: u8 = 0x42;
const OP_INVOKE: u8 = 0x43;
const OP_BODY: u8 = 0x44;
const OP_POP: u8 = 0x50;
const OP_DUP: u8 = 0x51;
const OP_SWAP: u8 = 0x52;
const OP_RETURN: u8 = 0x53;

impl Module {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        write_string(&mut buf, &self.file);

        write_u32(&mut buf, self.constants.len() as u32);
        for c in &self.constants {
            serialize_constant(&mut buf, c);
        }

        write_u32(&mut buf, self.layouts.len() as u32);
        for layout in &self.layouts {
            write_u16(&mut buf, layout.depth);
            write_u32(&mut buf, layout.slots.len() as u32);
            for slot in &layout.slots {
                write_string(&mut buf, &slot.name);
                serialize_slot_kind(&mut buf, &slot.kind);
            }
        }

        write_u32(&mut buf, self.subroutines.len() as u32);
        for sub in &self.subroutines {
            write_string(&mut buf, &sub.name);
            write_u16(&mut buf, sub.layout);
            write_u32(&mut buf, sub.entry);
            write_u32(&mut buf, sub.len);
        }

        write_u32(&mut buf, self.code.len() as u32);
        for inst in &self.code {
            serialize_instruction(&mut buf, inst);
        }

        write_u32(&mut buf, self.spans.len() as u32);
        for (ip, span) in &self.spans {
            write_u32(&mut buf, *ip);
            write_u32(&mut buf, span.start);
            write_u32(&mut buf, span.end);
            write_u32(&mut buf, span.line);
            write_u32(&mut buf, span.column);
        }

        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, DecodeError> {
        let mut pos = 0;
        let file = read_string(data, &mut pos)?;

        let const_count = read_u32(data, &mut pos)? as usize;
        let mut constants = Vec::with_capacity(const_count.min(data.len()));
        for _ in 0..const_count {
            constants.push(deserialize_constant(data, &mut pos)?);
        }

        let layout_count = read_u32(data, &mut pos)? as usize;
        let mut layouts = Vec::with_capacity(layout_count.min(data.len()));
        for _ in 0..layout_count {
            let depth = read_u16(data, &mut pos)?;
            let slot_count = read_u32(data, &mut pos)? as usize;
            let mut slots = Vec::with_capacity(slot_count.min(data.len()));
            for _ in 0..slot_count {
                let name = read_string(data, &mut pos)?;
                let kind = deserialize_slot_kind(data, &mut pos)?;
                slots.push(SlotDecl { name, kind });
            }
            layouts.push(FrameLayout { depth, slots });
        }

        let sub_count = read_u32(data, &mut pos)? as usize;
        let mut subroutines = Vec::with_capacity(sub_count.min(data.len()));
        for _ in 0..sub_count {
            subroutines.push(SubroutineInfo {
                name: read_string(data, &mut pos)?,
                layout: read_u16(data, &mut pos)?,
                entry: read_u32(data, &mut pos)?,
                len: read_u32(data, &mut pos)?,
            });
        }

        let code_count = read_u32(data, &mut pos)? as usize;
        let mut code = Vec::with_capacity(code_count.min(data.len()));
        for _ in 0..code_count {
            code.push(deserialize_instruction(data, &mut pos)?);
        }

        let span_count = read_u32(data, &mut pos)? as usize;
        let mut spans = Vec::with_capacity(span_count.min(data.len()));
        for _ in 0..span_count {
            let ip = read_u32(data, &mut pos)?;
            let start = read_u32(data, &mut pos)?;
            let end = read_u32(data, &mut pos)?;
            let line = read_u32(data, &mut pos)?;
            let column = read_u32(data, &mut pos)?;
            spans.push((ip, Span::new(start, end, line, column)));
        }

        let module = Module {
            file,
            constants,
            layouts,
            subroutines,
            code,
            spans,
        };
        module.validate()?;
        Ok(module)
    }

    /// Check every index and address the VM will follow
    pub fn validate(&self) -> Result<(), DecodeError> {
        let inconsistent = |msg: String| Err(DecodeError::Inconsistent(msg));

        if self.subroutines.is_empty() {
            return inconsistent("no entry subroutine".to_string());
        }
        for (i, sub) in self.subroutines.iter().enumerate() {
            if sub.layout as usize >= self.layouts.len() {
                return inconsistent(format!("subroutine {} uses unknown layout {}", i, sub.layout));
            }
            let end = sub.entry as usize + sub.len as usize;
            if end > self.code.len() || sub.len == 0 {
                return inconsistent(format!("subroutine {} has an invalid code range", i));
            }
            if !matches!(self.code[end - 1], Instruction::Return) {
                return inconsistent(format!("subroutine {} does not end in RETURN", i));
            }
        }
        for layout in &self.layouts {
            for slot in &layout.slots {
                let sub = match slot.kind {
                    SlotKind::Alias { body, params, required } => {
                        if required > params {
                            return inconsistent(format!("alias '{}' requires more than it declares", slot.name));
                        }
                        Some(body)
                    }
                    SlotKind::Function { signature } => Some(signature),
                    _ => None,
                };
                if let Some(sub) = sub {
                    if sub as usize >= self.subroutines.len() {
                        return inconsistent(format!("slot '{}' names unknown subroutine {}", slot.name, sub));
                    }
                }
            }
        }

        let constant = |idx: u16| self.constants.get(idx as usize);
        for (ip, inst) in self.code.iter().enumerate() {
            if inst.addresses().iter().any(|a| !a.is_resolved()) {
                return Err(DecodeError::Unresolved(ip));
            }
            let ok = match inst {
                Instruction::NumberLiteral(i) => matches!(constant(*i), Some(Constant::Number(_))),
                Instruction::StringLiteral(i) | Instruction::Missing { name: i, .. } => {
                    matches!(constant(*i), Some(Constant::Str(_)))
                }
                Instruction::Object(i) => matches!(constant(*i), Some(Constant::Shape(_))),
                Instruction::Body(s) => (*s as usize) < self.subroutines.len(),
                Instruction::Conditional {
                    extends_len,
                    true_len,
                    false_len,
                    ..
                } => ip + 1 + (*extends_len as usize) + (*true_len as usize) + (*false_len as usize) <= self.code.len(),
                _ => true,
            };
            if !ok {
                return inconsistent(format!("instruction {} ({}) has an invalid operand", ip, inst));
            }
        }
        Ok(())
    }

    /// Span recorded for an instruction, if any
    pub fn span_at(&self, ip: usize) -> Option<Span> {
        self.spans
            .binary_search_by_key(&(ip as u32), |(i, _)| *i)
            .ok()
            .map(|idx| self.spans[idx].1)
    }

    pub fn string(&self, idx: u16) -> Option<&str> {
        match self.constants.get(idx as usize) {
            Some(Constant::Str(s)) => Some(s),
            _ => None,
        }
    }
}

// ── Checksummed blob ─────────────────────────────────────────────────────

/// An immutable, checksummed program image. Cloning shares the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Bytecode {
    data: Arc<[u8]>,
}

impl Bytecode {
    pub fn from_module(module: &Module) -> Self {
        let payload = module.serialize();
        let digest = Sha256::digest(&payload);
        let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
        data.extend_from_slice(MAGIC);
        data.push(VERSION);
        data.extend_from_slice(&digest);
        data.extend_from_slice(&payload);
        Self { data: data.into() }
    }

    /// Accept bytes read back from disk after verifying them
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecodeError> {
        let bytecode = Self { data: bytes.into() };
        bytecode.decode()?;
        Ok(bytecode)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hex SHA-256 of the payload as stored in the header
    pub fn digest_hex(&self) -> String {
        self.data
            .get(MAGIC.len() + 1..HEADER_LEN)
            .unwrap_or_default()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn decode(&self) -> Result<Module, DecodeError> {
        let data = &self.data;
        if data.len() < HEADER_LEN {
            return Err(DecodeError::TooShort);
        }
        if &data[0..4] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        if data[4] != VERSION {
            return Err(DecodeError::UnsupportedVersion(data[4]));
        }
        let payload = &data[HEADER_LEN..];
        if Sha256::digest(payload).as_slice() != &data[MAGIC.len() + 1..HEADER_LEN] {
            return Err(DecodeError::ChecksumMismatch);
        }
        Module::deserialize(payload)
    }
}

impl fmt::Debug for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bytecode")
            .field("len", &self.data.len())
            .field("digest", &self.digest_hex())
            .finish()
    }
}

// ── Serialization helpers ────────────────────────────────────────────────

fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn write_address(buf: &mut Vec<u8>, a: &Address) {
    write_u16(buf, a.depth);
    write_u16(buf, a.slot);
}

fn serialize_constant(buf: &mut Vec<u8>, c: &Constant) {
    match c {
        Constant::Str(s) => {
            buf.push(TAG_STR);
            write_string(buf, s);
        }
        Constant::Number(n) => {
            buf.push(TAG_NUMBER);
            write_f64(buf, *n);
        }
        Constant::Shape(members) => {
            buf.push(TAG_SHAPE);
            write_u32(buf, members.len() as u32);
            for m in members {
                write_string(buf, &m.name);
                buf.push(u8::from(m.optional));
            }
        }
    }
}

fn serialize_slot_kind(buf: &mut Vec<u8>, kind: &SlotKind) {
    match kind {
        SlotKind::Alias { body, params, required } => {
            buf.push(KIND_ALIAS);
            write_u16(buf, *body);
            write_u16(buf, *params);
            write_u16(buf, *required);
        }
        SlotKind::Function { signature } => {
            buf.push(KIND_FUNCTION);
            write_u16(buf, *signature);
        }
        SlotKind::TypeParam => buf.push(KIND_TYPE_PARAM),
        SlotKind::Binding { constant } => {
            buf.push(KIND_BINDING);
            buf.push(u8::from(*constant));
        }
        SlotKind::Infer => buf.push(KIND_INFER),
    }
}

fn binary_op_code(op: BinaryOp) -> u8 {
    BinaryOp::ALL.iter().position(|o| *o == op).unwrap_or(0) as u8
}

fn unary_op_code(op: UnaryOp) -> u8 {
    UnaryOp::ALL.iter().position(|o| *o == op).unwrap_or(0) as u8
}

fn serialize_instruction(buf: &mut Vec<u8>, inst: &Instruction) {
    match inst {
        Instruction::Any => buf.push(OP_ANY),
        Instruction::Unknown => buf.push(OP_UNKNOWN),
        Instruction::Never => buf.push(OP_NEVER),
        Instruction::Null => buf.push(OP_NULL),
        Instruction::Undefined => buf.push(OP_UNDEFINED),
        Instruction::String => buf.push(OP_STRING),
        Instruction::Number => buf.push(OP_NUMBER),
        Instruction::Boolean => buf.push(OP_BOOLEAN),
        Instruction::True => buf.push(OP_TRUE),
        Instruction::False => buf.push(OP_FALSE),
        Instruction::NumberLiteral(i) => {
            buf.push(OP_NUMBER_LITERAL);
            write_u16(buf, *i);
        }
        Instruction::StringLiteral(i) => {
            buf.push(OP_STRING_LITERAL);
            write_u16(buf, *i);
        }
        Instruction::Union(n) => {
            buf.push(OP_UNION);
            write_u16(buf, *n);
        }
        Instruction::Intersection(n) => {
            buf.push(OP_INTERSECTION);
            write_u16(buf, *n);
        }
        Instruction::Tuple { len, rest } => {
            buf.push(OP_TUPLE);
            write_u16(buf, *len);
            buf.push(u8::from(*rest));
        }
        Instruction::Concat => buf.push(OP_CONCAT),
        Instruction::Object(i) => {
            buf.push(OP_OBJECT);
            write_u16(buf, *i);
        }
        Instruction::Function(n) => {
            buf.push(OP_FUNCTION);
            write_u16(buf, *n);
        }
        Instruction::TemplateLiteral(n) => {
            buf.push(OP_TEMPLATE_LITERAL);
            write_u16(buf, *n);
        }
        Instruction::Index => buf.push(OP_INDEX),
        Instruction::KeyOf => buf.push(OP_KEYOF),
        Instruction::Load(a) => {
            buf.push(OP_LOAD);
            write_address(buf, a);
        }
        Instruction::Var(a) => {
            buf.push(OP_VAR);
            write_address(buf, a);
        }
        Instruction::Assign(a) => {
            buf.push(OP_ASSIGN);
            write_address(buf, a);
        }
        Instruction::Save(a) => {
            buf.push(OP_SAVE);
            write_address(buf, a);
        }
        Instruction::Restore(a) => {
            buf.push(OP_RESTORE);
            write_address(buf, a);
        }
        Instruction::Narrow { addr, guard, negate } => {
            buf.push(OP_NARROW);
            write_address(buf, addr);
            match guard {
                Guard::TypeOf(tag) => {
                    buf.push(GUARD_TYPEOF);
                    buf.push(tag.to_u8());
                }
                Guard::IsNull => buf.push(GUARD_NULL),
                Guard::IsUndefined => buf.push(GUARD_UNDEFINED),
            }
            buf.push(u8::from(*negate));
        }
        Instruction::Infer(a) => {
            buf.push(OP_INFER);
            write_address(buf, a);
        }
        Instruction::Call { addr, argc } => {
            buf.push(OP_CALL);
            write_address(buf, addr);
            write_u16(buf, *argc);
        }
        Instruction::Missing { name, pop, push } => {
            buf.push(OP_MISSING);
            write_u16(buf, *name);
            write_u16(buf, *pop);
            buf.push(u8::from(*push));
        }
        Instruction::Param { index, skip } => {
            buf.push(OP_PARAM);
            write_u16(buf, *index);
            write_u32(buf, *skip);
        }
        Instruction::Bind(i) => {
            buf.push(OP_BIND);
            write_u16(buf, *i);
        }
        Instruction::Constraint(i) => {
            buf.push(OP_CONSTRAINT);
            write_u16(buf, *i);
        }
        Instruction::Conditional {
            distribute,
            infer_slot,
            infer_count,
            extends_len,
            true_len,
            false_len,
        } => {
            buf.push(OP_CONDITIONAL);
            match distribute {
                Some(a) => {
                    buf.push(1);
                    write_address(buf, a);
                }
                None => buf.push(0),
            }
            write_u16(buf, *infer_slot);
            write_u16(buf, *infer_count);
            write_u32(buf, *extends_len);
            write_u32(buf, *true_len);
            write_u32(buf, *false_len);
        }
        Instruction::Widen => buf.push(OP_WIDEN),
        Instruction::Binary(op) => {
            buf.push(OP_BINARY);
            buf.push(binary_op_code(*op));
        }
        Instruction::Unary(op) => {
            buf.push(OP_UNARY);
            buf.push(unary_op_code(*op));
        }
        Instruction::Invoke(n) => {
            buf.push(OP_INVOKE);
            write_u16(buf, *n);
        }
        Instruction::Body(i) => {
            buf.push(OP_BODY);
            write_u16(buf, *i);
        }
        Instruction::Pop => buf.push(OP_POP),
        Instruction::Dup => buf.push(OP_DUP),
        Instruction::Swap => buf.push(OP_SWAP),
        Instruction::Return => buf.push(OP_RETURN),
    }
}

// ── Deserialization helpers ──────────────────────────────────────────────

fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8, DecodeError> {
    let b = *data.get(*pos).ok_or(DecodeError::Truncated(*pos))?;
    *pos += 1;
    Ok(b)
}

fn read_array<const N: usize>(data: &[u8], pos: &mut usize) -> Result<[u8; N], DecodeError> {
    let bytes = data
        .get(*pos..*pos + N)
        .and_then(|s| <[u8; N]>::try_from(s).ok())
        .ok_or(DecodeError::Truncated(*pos))?;
    *pos += N;
    Ok(bytes)
}

fn read_u16(data: &[u8], pos: &mut usize) -> Result<u16, DecodeError> {
    Ok(u16::from_le_bytes(read_array(data, pos)?))
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32, DecodeError> {
    Ok(u32::from_le_bytes(read_array(data, pos)?))
}

fn read_f64(data: &[u8], pos: &mut usize) -> Result<f64, DecodeError> {
    Ok(f64::from_le_bytes(read_array(data, pos)?))
}

fn read_bool(data: &[u8], pos: &mut usize) -> Result<bool, DecodeError> {
    Ok(read_u8(data, pos)? != 0)
}

fn read_string(data: &[u8], pos: &mut usize) -> Result<String, DecodeError> {
    let len = read_u32(data, pos)? as usize;
    let start = *pos;
    let bytes = data.get(start..start + len).ok_or(DecodeError::Truncated(start))?;
    *pos += len;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(start))
}

fn read_address(data: &[u8], pos: &mut usize) -> Result<Address, DecodeError> {
    let depth = read_u16(data, pos)?;
    let slot = read_u16(data, pos)?;
    Ok(Address { depth, slot })
}

fn deserialize_constant(data: &[u8], pos: &mut usize) -> Result<Constant, DecodeError> {
    let offset = *pos;
    match read_u8(data, pos)? {
        TAG_STR => Ok(Constant::Str(read_string(data, pos)?)),
        TAG_NUMBER => Ok(Constant::Number(read_f64(data, pos)?)),
        TAG_SHAPE => {
            let count = read_u32(data, pos)? as usize;
            let mut members = Vec::with_capacity(count.min(data.len()));
            for _ in 0..count {
                let name = read_string(data, pos)?;
                let optional = read_bool(data, pos)?;
                members.push(ShapeMember { name, optional });
            }
            Ok(Constant::Shape(members))
        }
        tag => Err(DecodeError::UnknownTag { what: "constant", tag, offset }),
    }
}

fn deserialize_slot_kind(data: &[u8], pos: &mut usize) -> Result<SlotKind, DecodeError> {
    let offset = *pos;
    match read_u8(data, pos)? {
        KIND_ALIAS => Ok(SlotKind::Alias {
            body: read_u16(data, pos)?,
            params: read_u16(data, pos)?,
            required: read_u16(data, pos)?,
        }),
        KIND_FUNCTION => Ok(SlotKind::Function {
            signature: read_u16(data, pos)?,
        }),
        KIND_TYPE_PARAM => Ok(SlotKind::TypeParam),
        KIND_BINDING => Ok(SlotKind::Binding {
            constant: read_bool(data, pos)?,
        }),
        KIND_INFER => Ok(SlotKind::Infer),
        tag => Err(DecodeError::UnknownTag { what: "slot kind", tag, offset }),
    }
}

fn deserialize_guard(data: &[u8], pos: &mut usize) -> Result<Guard, DecodeError> {
    let offset = *pos;
    match read_u8(data, pos)? {
        GUARD_TYPEOF => {
            let tag_offset = *pos;
            let tag = read_u8(data, pos)?;
            TypeTag::from_u8(tag)
                .map(Guard::TypeOf)
                .ok_or(DecodeError::UnknownTag { what: "typeof", tag, offset: tag_offset })
        }
        GUARD_NULL => Ok(Guard::IsNull),
        GUARD_UNDEFINED => Ok(Guard::IsUndefined),
        tag => Err(DecodeError::UnknownTag { what: "guard", tag, offset }),
    }
}

fn deserialize_instruction(data: &[u8], pos: &mut usize) -> Result<Instruction, DecodeError> {
    let offset = *pos;
    let op = read_u8(data, pos)?;
    let inst = match op {
        OP_ANY => Instruction::Any,
        OP_UNKNOWN => Instruction::Unknown,
        OP_NEVER => Instruction::Never,
        OP_NULL => Instruction::Null,
        OP_UNDEFINED => Instruction::Undefined,
        OP_STRING => Instruction::String,
        OP_NUMBER => Instruction::Number,
        OP_BOOLEAN => Instruction::Boolean,
        OP_TRUE => Instruction::True,
        OP_FALSE => Instruction::False,
        OP_NUMBER_LITERAL => Instruction::NumberLiteral(read_u16(data, pos)?),
        OP_STRING_LITERAL => Instruction::StringLiteral(read_u16(data, pos)?),
        OP_UNION => Instruction::Union(read_u16(data, pos)?),
        OP_INTERSECTION => Instruction::Intersection(read_u16(data, pos)?),
        OP_TUPLE => Instruction::Tuple {
            len: read_u16(data, pos)?,
            rest: read_bool(data, pos)?,
        },
        OP_CONCAT => Instruction::Concat,
        OP_OBJECT => Instruction::Object(read_u16(data, pos)?),
        OP_FUNCTION => Instruction::Function(read_u16(data, pos)?),
        OP_TEMPLATE_LITERAL => Instruction::TemplateLiteral(read_u16(data, pos)?),
        OP_INDEX => Instruction::Index,
        OP_KEYOF => Instruction::KeyOf,
        OP_LOAD => Instruction::Load(read_address(data, pos)?),
        OP_VAR => Instruction::Var(read_address(data, pos)?),
        OP_ASSIGN => Instruction::Assign(read_address(data, pos)?),
        OP_SAVE => Instruction::Save(read_address(data, pos)?),
        OP_RESTORE => Instruction::Restore(read_address(data, pos)?),
        OP_NARROW => Instruction::Narrow {
            addr: read_address(data, pos)?,
            guard: deserialize_guard(data, pos)?,
            negate: read_bool(data, pos)?,
        },
        OP_INFER => Instruction::Infer(read_address(data, pos)?),
        OP_CALL => Instruction::Call {
            addr: read_address(data, pos)?,
            argc: read_u16(data, pos)?,
        },
        OP_MISSING => Instruction::Missing {
            name: read_u16(data, pos)?,
            pop: read_u16(data, pos)?,
            push: read_bool(data, pos)?,
        },
        OP_PARAM => Instruction::Param {
            index: read_u16(data, pos)?,
            skip: read_u32(data, pos)?,
        },
        OP_BIND => Instruction::Bind(read_u16(data, pos)?),
        OP_CONSTRAINT => Instruction::Constraint(read_u16(data, pos)?),
        OP_CONDITIONAL => {
            let distribute = if read_bool(data, pos)? {
                Some(read_address(data, pos)?)
            } else {
                None
            };
            Instruction::Conditional {
                distribute,
                infer_slot: read_u16(data, pos)?,
                infer_count: read_u16(data, pos)?,
                extends_len: read_u32(data, pos)?,
                true_len: read_u32(data, pos)?,
                false_len: read_u32(data, pos)?,
            }
        }
        OP_WIDEN => Instruction::Widen,
        OP_BINARY => {
            let tag_offset = *pos;
            let tag = read_u8(data, pos)?;
            let op = BinaryOp::ALL
                .get(tag as usize)
                .copied()
                .ok_or(DecodeError::UnknownTag { what: "binary operator", tag, offset: tag_offset })?;
            Instruction::Binary(op)
        }
        OP_UNARY => {
            let tag_offset = *pos;
            let tag = read_u8(data, pos)?;
            let op = UnaryOp::ALL
                .get(tag as usize)
                .copied()
                .ok_or(DecodeError::UnknownTag { what: "unary operator", tag, offset: tag_offset })?;
            Instruction::Unary(op)
        }
        OP_INVOKE => Instruction::Invoke(read_u16(data, pos)?),
        OP_BODY => Instruction::Body(read_u16(data, pos)?),
        OP_POP => Instruction::Pop,
        OP_DUP => Instruction::Dup,
        OP_SWAP => Instruction::Swap,
        OP_RETURN => Instruction::Return,
        other => return Err(DecodeError::UnknownOpcode { op: other, offset }),
    };
    Ok(inst)
}
