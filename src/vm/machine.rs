//! Type VM -- stack-based bytecode execution engine
//!
//! - The operand stack holds [`TypeValue`]s; instructions are Copy enums
//!   dispatched in one tight match
//! - Frames live in an arena with explicit lexical parent links; an
//!   [`Address`] is resolved by walking those links, never the call order
//! - Slots of aliases and function signatures are evaluated on first use and
//!   memoized; an evaluating marker catches direct cycles
//! - Generic instantiations run in ephemeral frames, bounded by
//!   `max_instantiation_depth`; every subroutine entry grows the native
//!   stack on demand so deep recursion never depends on the thread's stack

use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use super::bytecode::{Bytecode, DecodeError, Module, SlotKind};
use super::opcodes::{Address, Constant, Instruction};
use crate::ast::{BinaryOp, UnaryOp};
use crate::config::CheckerOptions;
use crate::diagnostics::{messages, Category, DefaultCatalog, Diagnostic, DiagnosticMessage, MessageCatalog, Span};
use crate::types::{
    format_number, is_assignable, narrow, narrow_by_assignment, template, ConditionalType, Member, Relater,
    SymbolRef, TypeTag, TypeValue,
};

/// Remaining native stack below which a subroutine entry switches segments
const STACK_RED_ZONE: usize = 1024 * 1024;
const STACK_SEGMENT: usize = 8 * 1024 * 1024;

/// Fatal conditions; ordinary type errors are diagnostics
#[derive(Debug, Error)]
pub enum VmError {
    #[error("malformed bytecode: {0}")]
    Malformed(#[from] DecodeError),
    #[error("address {address} does not resolve at instruction {ip}")]
    Resolution { address: Address, ip: usize },
    #[error("operand stack underflow at instruction {ip}")]
    StackUnderflow { ip: usize },
    #[error("step budget of {limit} instructions exhausted")]
    StepLimit { limit: u64 },
}

#[derive(Debug, Clone)]
enum SlotState {
    Unset,
    /// Body evaluation in progress
    Evaluating,
    Resolved(TypeValue),
    Bound {
        declared: TypeValue,
        narrowed: TypeValue,
        initialized: bool,
    },
}

/// A scope activation. `parent` is the lexically enclosing frame.
struct Frame {
    parent: Option<usize>,
    layout: u16,
    depth: u16,
    slots: Vec<SlotState>,
    /// Type arguments of a generic instantiation
    args: Vec<TypeValue>,
}

/// The type VM. One instance runs one program at a time and keeps nothing
/// between runs except its options and catalog.
pub struct VM {
    options: CheckerOptions,
    catalog: Arc<dyn MessageCatalog>,
    module: Arc<Module>,
    stack: Vec<TypeValue>,
    frames: Vec<Frame>,
    current: usize,
    diagnostics: Vec<Diagnostic>,
    steps: u64,
    instantiation_depth: usize,
    /// Set once the depth cutoff fires; cleared when the outermost
    /// instantiation returns
    tripped: bool,
    call_sites: Vec<Span>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    pub fn new() -> Self {
        Self {
            options: CheckerOptions::default(),
            catalog: Arc::new(DefaultCatalog),
            module: Arc::new(Module::default()),
            stack: Vec::with_capacity(64),
            frames: Vec::with_capacity(16),
            current: 0,
            diagnostics: Vec::new(),
            steps: 0,
            instantiation_depth: 0,
            tripped: false,
            call_sites: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: CheckerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn MessageCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn options(&self) -> &CheckerOptions {
        &self.options
    }

    /// Execute a program to completion. Diagnostics from a previous run are
    /// discarded first.
    pub fn run(&mut self, bytecode: &Bytecode) -> Result<(), VmError> {
        self.reset();
        self.module = Arc::new(bytecode.decode()?);
        let module = Arc::clone(&self.module);
        let entry = module
            .subroutines
            .first()
            .ok_or_else(|| DecodeError::Inconsistent("no entry subroutine".to_string()))?;

        let frame = self.push_frame(None, entry.layout, Vec::new())?;
        self.current = frame;
        self.execute(entry.entry as usize)?;

        debug!(
            file = %module.file,
            steps = self.steps,
            diagnostics = self.diagnostics.len(),
            "run complete"
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.current = 0;
        self.diagnostics.clear();
        self.steps = 0;
        self.instantiation_depth = 0;
        self.tripped = false;
        self.call_sites.clear();
    }

    /// Diagnostics of the last run, in emission order
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Rendered diagnostics of the last run
    pub fn errors(&self) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.to_string()).collect()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.category == Category::Error)
            .count()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Dump the diagnostics through the log channel
    pub fn report(&self) {
        for d in &self.diagnostics {
            match d.category {
                Category::Error => error!(code = d.code, "{}", d),
                Category::Warning => warn!(code = d.code, "{}", d),
            }
        }
        debug!(count = self.diagnostics.len(), "diagnostics reported");
    }

    // ── Frames & slots ───────────────────────────────────────────────

    fn push_frame(&mut self, parent: Option<usize>, layout: u16, args: Vec<TypeValue>) -> Result<usize, VmError> {
        let decl = self
            .module
            .layouts
            .get(layout as usize)
            .ok_or_else(|| DecodeError::Inconsistent(format!("unknown layout {}", layout)))?;
        self.frames.push(Frame {
            parent,
            layout,
            depth: decl.depth,
            slots: vec![SlotState::Unset; decl.slots.len()],
            args,
        });
        Ok(self.frames.len() - 1)
    }

    /// Walk the lexical chain from the current frame to the frame at the
    /// address's depth
    fn resolve(&self, address: Address, ip: usize) -> Result<(usize, usize), VmError> {
        let mut frame = Some(self.current);
        while let Some(idx) = frame {
            let f = &self.frames[idx];
            if f.depth == address.depth {
                if (address.slot as usize) < f.slots.len() {
                    return Ok((idx, address.slot as usize));
                }
                break;
            }
            frame = f.parent;
        }
        Err(VmError::Resolution { address, ip })
    }

    fn slot_decl(&self, frame: usize, slot: usize) -> Option<(&str, SlotKind)> {
        let layout = self.module.layouts.get(self.frames[frame].layout as usize)?;
        layout.slots.get(slot).map(|s| (s.name.as_str(), s.kind))
    }

    fn slot_name(&self, frame: usize, slot: usize) -> String {
        self.slot_decl(frame, slot).map_or_else(String::new, |(n, _)| n.to_string())
    }

    /// Run a subroutine in a fresh frame under `parent`; the frame is
    /// discarded once the result is produced
    fn run_subroutine(&mut self, sub: u16, parent: usize, args: Vec<TypeValue>) -> Result<TypeValue, VmError> {
        let (layout, entry) = match self.module.subroutines.get(sub as usize) {
            Some(info) => (info.layout, info.entry as usize),
            None => return Err(DecodeError::Inconsistent(format!("unknown subroutine {}", sub)).into()),
        };
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            let frame = self.push_frame(Some(parent), layout, args)?;
            let saved = self.current;
            self.current = frame;
            let result = self.execute(entry);
            self.current = saved;
            self.frames.truncate(frame);
            result
        })
    }

    /// Memoized evaluation of an alias body or function signature
    fn evaluate_lazy(&mut self, frame: usize, slot: usize, sub: u16, ip: usize, alias: bool) -> Result<TypeValue, VmError> {
        match &self.frames[frame].slots[slot] {
            SlotState::Resolved(value) => return Ok(value.clone()),
            SlotState::Evaluating => {
                if alias {
                    let name = self.slot_name(frame, slot);
                    self.diagnose(&messages::CIRCULAR_TYPE_ALIAS, &[name], ip);
                }
                return Ok(TypeValue::Any);
            }
            _ => {}
        }
        trace!(slot = %self.slot_name(frame, slot), "evaluating slot");
        self.frames[frame].slots[slot] = SlotState::Evaluating;
        let value = self.run_subroutine(sub, frame, Vec::new())?;
        self.frames[frame].slots[slot] = SlotState::Resolved(value.clone());
        Ok(value)
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    fn span_at(&self, ip: usize) -> Span {
        self.module.span_at(ip).unwrap_or_default()
    }

    fn diagnose(&mut self, message: &DiagnosticMessage, args: &[String], ip: usize) {
        let span = self.span_at(ip);
        self.diagnose_at(message, args, span);
    }

    fn diagnose_at(&mut self, message: &DiagnosticMessage, args: &[String], span: Span) {
        let diagnostic = Diagnostic::new(self.catalog.as_ref(), message, args, &self.module.file, span);
        trace!(code = diagnostic.code, message = %diagnostic.message, "diagnostic");
        self.diagnostics.push(diagnostic);
    }

    // ── Stack ────────────────────────────────────────────────────────

    fn push(&mut self, value: TypeValue) {
        self.stack.push(value);
    }

    fn pop(&mut self, ip: usize) -> Result<TypeValue, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow { ip })
    }

    fn pop_n(&mut self, n: usize, ip: usize) -> Result<Vec<TypeValue>, VmError> {
        if self.stack.len() < n {
            return Err(VmError::StackUnderflow { ip });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn tick(&mut self) -> Result<(), VmError> {
        self.steps += 1;
        match self.options.max_steps {
            Some(limit) if self.steps > limit => Err(VmError::StepLimit { limit }),
            _ => Ok(()),
        }
    }

    // ── Main execution loop ──────────────────────────────────────────

    /// Execute from `start` up to the matching `Return` and yield the value
    /// left on top of the stack (undefined when there is none)
    fn execute(&mut self, start: usize) -> Result<TypeValue, VmError> {
        let module = Arc::clone(&self.module);
        let base = self.stack.len();
        let mut ip = start;

        loop {
            let inst = *module
                .code
                .get(ip)
                .ok_or_else(|| DecodeError::Inconsistent(format!("execution ran past the end at {}", ip)))?;
            self.tick()?;
            let at = ip;
            ip += 1;

            match inst {
                Instruction::Return => break,
                Instruction::Param { index, skip } => {
                    if let Some(arg) = self.frames[self.current].args.get(index as usize).cloned() {
                        self.push(arg);
                        ip += skip as usize;
                    }
                }
                Instruction::Conditional {
                    distribute,
                    infer_slot,
                    infer_count,
                    extends_len,
                    true_len,
                    false_len,
                } => {
                    let check = self.pop(at)?;
                    let blocks = Blocks {
                        extends: at + 1,
                        when_true: at + 1 + extends_len as usize,
                        when_false: at + 1 + extends_len as usize + true_len as usize,
                        infer_slot: infer_slot as usize,
                        infer_count: infer_count as usize,
                    };
                    let value = self.conditional(check, distribute, &blocks, at)?;
                    self.push(value);
                    ip = blocks.when_false + false_len as usize;
                }
                other => self.dispatch(other, at, &module)?,
            }
        }

        let result = if self.stack.len() > base {
            self.stack.pop().unwrap_or(TypeValue::Undefined)
        } else {
            TypeValue::Undefined
        };
        self.stack.truncate(base);
        Ok(result)
    }

    fn dispatch(&mut self, inst: Instruction, at: usize, module: &Module) -> Result<(), VmError> {
        match inst {
            // ── Primitives & literals ────────────────────────────────
            Instruction::Any => self.push(TypeValue::Any),
            Instruction::Unknown => self.push(TypeValue::Unknown),
            Instruction::Never => self.push(TypeValue::Never),
            Instruction::Null => self.push(TypeValue::Null),
            Instruction::Undefined => self.push(TypeValue::Undefined),
            Instruction::String => self.push(TypeValue::String),
            Instruction::Number => self.push(TypeValue::Number),
            Instruction::Boolean => self.push(TypeValue::Boolean),
            Instruction::True => self.push(TypeValue::BooleanLiteral(true)),
            Instruction::False => self.push(TypeValue::BooleanLiteral(false)),
            Instruction::NumberLiteral(idx) => {
                let n = match module.constants.get(idx as usize) {
                    Some(Constant::Number(n)) => *n,
                    _ => return Err(bad_operand(at)),
                };
                self.push(TypeValue::NumberLiteral(n));
            }
            Instruction::StringLiteral(idx) => {
                let s = module.string(idx).ok_or_else(|| bad_operand(at))?;
                self.push(TypeValue::StringLiteral(s.to_string()));
            }

            // ── Composites ───────────────────────────────────────────
            Instruction::Union(n) => {
                let members = self.pop_n(n as usize, at)?;
                self.push(TypeValue::union(members));
            }
            Instruction::Intersection(n) => {
                let members = self.pop_n(n as usize, at)?;
                self.push(TypeValue::intersection(members));
            }
            Instruction::Tuple { len, rest } => {
                let elements = self.pop_n(len as usize, at)?;
                self.push(TypeValue::Tuple(elements, rest && len > 0));
            }
            Instruction::Concat => {
                let right = self.pop(at)?;
                let left = self.pop(at)?;
                self.push(TypeValue::concat(left, right));
            }
            Instruction::Object(idx) => {
                let shape = match module.constants.get(idx as usize) {
                    Some(Constant::Shape(shape)) => shape,
                    _ => return Err(bad_operand(at)),
                };
                let values = self.pop_n(shape.len(), at)?;
                let members: IndexMap<String, Member> = shape
                    .iter()
                    .zip(values)
                    .map(|(m, ty)| (m.name.clone(), Member { ty, optional: m.optional }))
                    .collect();
                self.push(TypeValue::Object(members));
            }
            Instruction::Function(n) => {
                let ret = self.pop(at)?;
                let params = self.pop_n(n as usize, at)?;
                self.push(TypeValue::Function(params, Box::new(ret)));
            }
            Instruction::TemplateLiteral(n) => {
                let operands = self.pop_n(n as usize, at)?;
                self.push(template::build(operands));
            }
            Instruction::Index => {
                let key = self.pop(at)?;
                let object = self.pop(at)?;
                let value = self.index_type(&object, &key, at);
                self.push(value);
            }
            Instruction::KeyOf => {
                let operand = self.pop(at)?;
                self.push(keyof_type(&operand));
            }

            // ── Slots ────────────────────────────────────────────────
            Instruction::Load(addr) => {
                let value = self.load(addr, at)?;
                self.push(value);
            }
            Instruction::Var(addr) => {
                let declared = self.pop(at)?;
                let (f, s) = self.resolve(addr, at)?;
                if !matches!(self.slot_decl(f, s), Some((_, SlotKind::Binding { .. }))) {
                    return Err(bad_operand(at));
                }
                self.frames[f].slots[s] = SlotState::Bound {
                    declared: declared.clone(),
                    narrowed: declared.clone(),
                    initialized: false,
                };
                self.push(declared);
            }
            Instruction::Assign(addr) => {
                let value = self.pop(at)?;
                self.assign(addr, value, at)?;
            }
            Instruction::Save(addr) => {
                let (f, s) = self.resolve(addr, at)?;
                let value = match &self.frames[f].slots[s] {
                    SlotState::Bound { narrowed, .. } => narrowed.clone(),
                    _ => TypeValue::Unknown,
                };
                self.push(value);
            }
            Instruction::Restore(addr) => {
                let value = self.pop(at)?;
                let (f, s) = self.resolve(addr, at)?;
                if let SlotState::Bound { narrowed, .. } = &mut self.frames[f].slots[s] {
                    *narrowed = value;
                }
            }
            Instruction::Narrow { addr, guard, negate } => {
                let (f, s) = self.resolve(addr, at)?;
                if let SlotState::Bound { narrowed, .. } = &mut self.frames[f].slots[s] {
                    *narrowed = narrow(narrowed, guard, negate);
                }
            }
            Instruction::Infer(addr) => {
                let (f, s) = self.resolve(addr, at)?;
                let name = self.slot_name(f, s);
                self.push(TypeValue::Infer(name));
            }

            // ── Generics ─────────────────────────────────────────────
            Instruction::Call { addr, argc } => {
                let args = self.pop_n(argc as usize, at)?;
                let value = self.call(addr, args, at)?;
                self.push(value);
            }
            Instruction::Missing { name, pop, push } => {
                self.pop_n(pop as usize, at)?;
                let name = module.string(name).ok_or_else(|| bad_operand(at))?.to_string();
                self.diagnose(&messages::CANNOT_FIND_NAME, &[name], at);
                if push {
                    self.push(TypeValue::Any);
                }
            }
            Instruction::Bind(index) => {
                let value = self.pop(at)?;
                let slot = self.frames[self.current]
                    .slots
                    .get_mut(index as usize)
                    .ok_or_else(|| bad_operand(at))?;
                *slot = SlotState::Resolved(value);
            }
            Instruction::Constraint(index) => {
                let constraint = self.pop(at)?;
                let value = match self.frames[self.current].slots.get(index as usize) {
                    Some(SlotState::Resolved(v)) => v.clone(),
                    _ => TypeValue::Unknown,
                };
                if !is_assignable(&value, &constraint) {
                    let span = self.call_sites.last().copied().unwrap_or_else(|| self.span_at(at));
                    self.diagnose_at(
                        &messages::DOES_NOT_SATISFY_CONSTRAINT,
                        &[value.to_string(), constraint.to_string()],
                        span,
                    );
                }
            }

            // ── Values ───────────────────────────────────────────────
            Instruction::Widen => {
                let value = self.pop(at)?;
                self.push(value.widen());
            }
            Instruction::Binary(op) => {
                let right = self.pop(at)?;
                let left = self.pop(at)?;
                let value = self.binary(op, left, right, at);
                self.push(value);
            }
            Instruction::Unary(op) => {
                let operand = self.pop(at)?;
                self.push(unary(op, &operand));
            }
            Instruction::Invoke(n) => {
                let args = self.pop_n(n as usize, at)?;
                let callee = self.pop(at)?;
                let value = self.invoke(callee, args, at);
                self.push(value);
            }
            Instruction::Body(sub) => {
                self.run_subroutine(sub, self.current, Vec::new())?;
            }

            // ── Stack ────────────────────────────────────────────────
            Instruction::Pop => {
                self.pop(at)?;
            }
            Instruction::Dup => {
                let top = self.stack.last().cloned().ok_or(VmError::StackUnderflow { ip: at })?;
                self.push(top);
            }
            Instruction::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(VmError::StackUnderflow { ip: at });
                }
                self.stack.swap(len - 1, len - 2);
            }

            // Handled by the execution loop
            Instruction::Return | Instruction::Param { .. } | Instruction::Conditional { .. } => {}
        }
        Ok(())
    }

    // ── Slot access ──────────────────────────────────────────────────

    fn load(&mut self, addr: Address, at: usize) -> Result<TypeValue, VmError> {
        let (f, s) = self.resolve(addr, at)?;
        let (name, kind) = match self.slot_decl(f, s) {
            Some((name, kind)) => (name.to_string(), kind),
            None => return Err(VmError::Resolution { address: addr, ip: at }),
        };
        match kind {
            SlotKind::Alias { body, params: 0, .. } => self.evaluate_lazy(f, s, body, at, true),
            SlotKind::Alias {
                body,
                params,
                required: 0,
            } => self.instantiate(f, body, Vec::new(), &name, params, 0, at),
            SlotKind::Alias { required, .. } => {
                self.diagnose(
                    &messages::GENERIC_TYPE_REQUIRES_ARGUMENTS,
                    &[name.clone(), required.to_string()],
                    at,
                );
                let symbol = SymbolRef {
                    name,
                    depth: addr.depth,
                    slot: addr.slot,
                };
                Ok(TypeValue::GenericRef(symbol, Vec::new()))
            }
            SlotKind::Function { signature } => self.evaluate_lazy(f, s, signature, at, false),
            SlotKind::TypeParam => Ok(match &self.frames[f].slots[s] {
                SlotState::Resolved(v) => v.clone(),
                _ => TypeValue::Unknown,
            }),
            SlotKind::Infer => Ok(match &self.frames[f].slots[s] {
                SlotState::Resolved(v) => v.clone(),
                _ => TypeValue::Infer(name),
            }),
            SlotKind::Binding { .. } => match &self.frames[f].slots[s] {
                SlotState::Bound { narrowed, .. } => Ok(narrowed.clone()),
                _ => {
                    self.diagnose(&messages::USED_BEFORE_DECLARATION, &[name], at);
                    Ok(TypeValue::Any)
                }
            },
        }
    }

    fn assign(&mut self, addr: Address, value: TypeValue, at: usize) -> Result<(), VmError> {
        let (f, s) = self.resolve(addr, at)?;
        let (name, kind) = match self.slot_decl(f, s) {
            Some((name, kind)) => (name.to_string(), kind),
            None => return Err(VmError::Resolution { address: addr, ip: at }),
        };
        let SlotKind::Binding { constant } = kind else {
            self.diagnose(&messages::NOT_A_VARIABLE, &[name], at);
            return Ok(());
        };

        let (declared, initialized) = match &self.frames[f].slots[s] {
            SlotState::Bound {
                declared, initialized, ..
            } => (declared.clone(), *initialized),
            _ => {
                self.diagnose(&messages::USED_BEFORE_DECLARATION, &[name], at);
                return Ok(());
            }
        };

        if constant && initialized {
            self.diagnose(&messages::CANNOT_ASSIGN_TO_CONSTANT, &[name], at);
            return Ok(());
        }

        let narrowed = if is_assignable(&value, &declared) {
            narrow_by_assignment(&declared, &value)
        } else {
            self.diagnose(&messages::NOT_ASSIGNABLE, &[value.to_string(), declared.to_string()], at);
            declared.clone()
        };
        self.frames[f].slots[s] = SlotState::Bound {
            declared,
            narrowed,
            initialized: true,
        };
        Ok(())
    }

    // ── Generics ─────────────────────────────────────────────────────

    fn call(&mut self, addr: Address, args: Vec<TypeValue>, at: usize) -> Result<TypeValue, VmError> {
        let (f, s) = self.resolve(addr, at)?;
        let (name, kind) = match self.slot_decl(f, s) {
            Some((name, kind)) => (name.to_string(), kind),
            None => return Err(VmError::Resolution { address: addr, ip: at }),
        };
        match kind {
            SlotKind::Alias { body, params, required } if params > 0 => {
                self.instantiate(f, body, args, &name, params, required, at)
            }
            SlotKind::Alias { body, .. } => {
                self.diagnose(&messages::TYPE_IS_NOT_GENERIC, &[name], at);
                self.evaluate_lazy(f, s, body, at, true)
            }
            _ => {
                self.diagnose(&messages::TYPE_IS_NOT_GENERIC, &[name], at);
                Ok(TypeValue::Any)
            }
        }
    }

    /// Evaluate a generic alias body in a fresh frame under the frame that
    /// declares it
    #[allow(clippy::too_many_arguments)]
    fn instantiate(
        &mut self,
        declaring_frame: usize,
        body: u16,
        mut args: Vec<TypeValue>,
        name: &str,
        params: u16,
        required: u16,
        at: usize,
    ) -> Result<TypeValue, VmError> {
        if self.tripped {
            return Ok(TypeValue::Any);
        }
        if self.instantiation_depth >= self.options.instantiation_limit() {
            self.tripped = true;
            warn!(alias = name, depth = self.instantiation_depth, "instantiation depth limit reached");
            self.diagnose(&messages::EXCESSIVELY_DEEP_INSTANTIATION, &[], at);
            return Ok(TypeValue::Any);
        }

        let argc = args.len();
        if argc < required as usize || argc > params as usize {
            if required == params {
                self.diagnose(
                    &messages::GENERIC_TYPE_REQUIRES_ARGUMENTS,
                    &[name.to_string(), params.to_string()],
                    at,
                );
            } else {
                self.diagnose(
                    &messages::GENERIC_TYPE_REQUIRES_BETWEEN,
                    &[name.to_string(), required.to_string(), params.to_string()],
                    at,
                );
            }
            args.truncate(params as usize);
        }

        self.instantiation_depth += 1;
        let span = self.span_at(at);
        self.call_sites.push(span);
        trace!(alias = name, depth = self.instantiation_depth, "instantiating");

        let result = self.run_subroutine(body, declaring_frame, args);

        self.call_sites.pop();
        self.instantiation_depth -= 1;
        if self.instantiation_depth == 0 {
            self.tripped = false;
        }
        result
    }

    fn conditional(
        &mut self,
        check: TypeValue,
        distribute: Option<Address>,
        blocks: &Blocks,
        at: usize,
    ) -> Result<TypeValue, VmError> {
        let Some(addr) = distribute else {
            return self.select_branch(check, blocks);
        };
        let members = match &check {
            TypeValue::Never => return Ok(TypeValue::Never),
            TypeValue::Union(ms) => ms.clone(),
            TypeValue::Boolean => vec![TypeValue::BooleanLiteral(true), TypeValue::BooleanLiteral(false)],
            _ => return self.select_branch(check, blocks),
        };

        let (f, s) = self.resolve(addr, at)?;
        let saved = std::mem::replace(&mut self.frames[f].slots[s], SlotState::Unset);
        let mut results = Vec::with_capacity(members.len());
        for member in members {
            self.frames[f].slots[s] = SlotState::Resolved(member.clone());
            let result = self.select_branch(member, blocks);
            match result {
                Ok(value) => results.push(value),
                Err(e) => {
                    self.frames[f].slots[s] = saved;
                    return Err(e);
                }
            }
        }
        self.frames[f].slots[s] = saved;
        Ok(TypeValue::union(results))
    }

    /// Evaluate the extends clause for one check type and run the branch it
    /// selects
    fn select_branch(&mut self, check: TypeValue, blocks: &Blocks) -> Result<TypeValue, VmError> {
        let infer_range = blocks.infer_slot..blocks.infer_slot + blocks.infer_count;
        for i in infer_range.clone() {
            if let Some(slot) = self.frames[self.current].slots.get_mut(i) {
                *slot = SlotState::Unset;
            }
        }
        let extends = self.execute(blocks.extends)?;

        // An unbound `infer` check cannot be decided yet
        if matches!(check, TypeValue::Infer(_)) {
            let when_true = self.execute(blocks.when_true)?;
            let when_false = self.execute(blocks.when_false)?;
            return Ok(TypeValue::Conditional(Box::new(ConditionalType {
                check,
                extends,
                when_true,
                when_false,
            })));
        }
        if matches!(check, TypeValue::Any) && !matches!(extends, TypeValue::Any | TypeValue::Unknown) {
            let mut relater = Relater::new();
            relater.relate(&check, &extends);
            self.bind_inferences(relater, infer_range);
            let when_true = self.execute(blocks.when_true)?;
            let when_false = self.execute(blocks.when_false)?;
            return Ok(TypeValue::union(vec![when_true, when_false]));
        }

        let mut relater = Relater::new();
        if relater.relate(&check, &extends) {
            self.bind_inferences(relater, infer_range);
            self.execute(blocks.when_true)
        } else {
            self.execute(blocks.when_false)
        }
    }

    fn bind_inferences(&mut self, relater: Relater, slots: std::ops::Range<usize>) {
        let inferred = relater.into_inferences();
        for i in slots {
            let name = self.slot_name(self.current, i);
            let value = inferred.get(&name).cloned().unwrap_or(TypeValue::Unknown);
            if let Some(slot) = self.frames[self.current].slots.get_mut(i) {
                *slot = SlotState::Resolved(value);
            }
        }
    }

    // ── Operators ────────────────────────────────────────────────────

    fn index_type(&mut self, object: &TypeValue, key: &TypeValue, at: usize) -> TypeValue {
        match (object, key) {
            (TypeValue::Any, _) | (_, TypeValue::Any) => TypeValue::Any,
            (TypeValue::Never, _) | (_, TypeValue::Never) => TypeValue::Never,
            (
                TypeValue::Infer(_)
                | TypeValue::GenericRef(..)
                | TypeValue::Conditional(_)
                | TypeValue::IndexedAccess(..),
                _,
            ) => TypeValue::IndexedAccess(Box::new(object.clone()), Box::new(key.clone())),
            (_, TypeValue::Union(keys)) => {
                let results = keys.iter().map(|k| self.index_type(object, k, at)).collect();
                TypeValue::union(results)
            }
            (TypeValue::Union(objects), _) => {
                let results = objects.iter().map(|o| self.index_type(o, key, at)).collect();
                TypeValue::union(results)
            }
            (TypeValue::Tuple(elements, false), TypeValue::NumberLiteral(n))
                if n.fract() == 0.0 && *n >= 0.0 && *n as usize >= elements.len() =>
            {
                self.diagnose(
                    &messages::TUPLE_INDEX_OUT_OF_RANGE,
                    &[object.to_string(), elements.len().to_string(), format_number(*n)],
                    at,
                );
                TypeValue::Any
            }
            (_, TypeValue::StringLiteral(name)) => self.property_type(object, name, at),
            (_, TypeValue::NumberLiteral(n)) => self.property_type(object, &format_number(*n), at),
            (TypeValue::Tuple(elements, _), TypeValue::Number) => TypeValue::union(elements.clone()),
            (TypeValue::String | TypeValue::StringLiteral(_) | TypeValue::TemplateLiteral(_), TypeValue::Number) => {
                TypeValue::String
            }
            _ => {
                self.diagnose(&messages::CANNOT_BE_USED_AS_INDEX, &[key.to_string(), object.to_string()], at);
                TypeValue::Any
            }
        }
    }

    fn property_type(&mut self, object: &TypeValue, name: &str, at: usize) -> TypeValue {
        match object.property(name) {
            Some((ty, true)) => TypeValue::union(vec![ty, TypeValue::Undefined]),
            Some((ty, false)) => ty,
            None => {
                self.diagnose(&messages::PROPERTY_DOES_NOT_EXIST, &[name.to_string(), object.to_string()], at);
                TypeValue::Any
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: TypeValue, right: TypeValue, at: usize) -> TypeValue {
        let is_any = |t: &TypeValue| matches!(t, TypeValue::Any);
        match op {
            BinaryOp::Add => {
                if left.is_string_like() || right.is_string_like() {
                    TypeValue::String
                } else if is_any(&left) || is_any(&right) {
                    TypeValue::Any
                } else if left.is_number_like() && right.is_number_like() {
                    TypeValue::Number
                } else {
                    self.diagnose(
                        &messages::OPERATOR_CANNOT_BE_APPLIED,
                        &[op.symbol().to_string(), left.to_string(), right.to_string()],
                        at,
                    );
                    TypeValue::Any
                }
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                if !(is_any(&left) || left.is_number_like()) {
                    self.diagnose(&messages::ARITHMETIC_LEFT_OPERAND, &[], at);
                }
                if !(is_any(&right) || right.is_number_like()) {
                    self.diagnose(&messages::ARITHMETIC_RIGHT_OPERAND, &[], at);
                }
                TypeValue::Number
            }
            BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::StrictEq
            | BinaryOp::StrictNotEq => TypeValue::Boolean,
            BinaryOp::And | BinaryOp::Or => TypeValue::union(vec![left, right]),
        }
    }

    fn invoke(&mut self, callee: TypeValue, args: Vec<TypeValue>, at: usize) -> TypeValue {
        let (params, ret) = match callee {
            TypeValue::Any => return TypeValue::Any,
            TypeValue::Function(params, ret) => (params, ret),
            _ => {
                self.diagnose(&messages::NOT_CALLABLE, &[], at);
                return TypeValue::Any;
            }
        };

        let min = params
            .iter()
            .rposition(|p| !is_assignable(&TypeValue::Undefined, p))
            .map_or(0, |i| i + 1);
        let max = params.len();
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                max.to_string()
            } else {
                format!("{}-{}", min, max)
            };
            self.diagnose(&messages::EXPECTED_ARGUMENTS, &[expected, args.len().to_string()], at);
        }
        for (arg, param) in args.iter().zip(&params) {
            if !is_assignable(arg, param) {
                self.diagnose(&messages::ARGUMENT_NOT_ASSIGNABLE, &[arg.to_string(), param.to_string()], at);
            }
        }
        *ret
    }
}

/// Instruction offsets of the inline blocks that follow a `Conditional`
struct Blocks {
    extends: usize,
    when_true: usize,
    when_false: usize,
    infer_slot: usize,
    infer_count: usize,
}

fn bad_operand(ip: usize) -> VmError {
    VmError::Malformed(DecodeError::Inconsistent(format!("invalid operand at instruction {}", ip)))
}

fn unary(op: UnaryOp, operand: &TypeValue) -> TypeValue {
    match op {
        UnaryOp::Not => TypeValue::Boolean,
        UnaryOp::Negate => match operand {
            TypeValue::NumberLiteral(n) => TypeValue::NumberLiteral(-n),
            _ => TypeValue::Number,
        },
        UnaryOp::Plus => TypeValue::Number,
        UnaryOp::TypeOf => TypeValue::union(
            [
                TypeTag::String,
                TypeTag::Number,
                TypeTag::Boolean,
                TypeTag::Undefined,
                TypeTag::Object,
                TypeTag::Function,
            ]
            .iter()
            .map(|t| TypeValue::StringLiteral(t.name().to_string()))
            .collect(),
        ),
    }
}

fn keyof_type(value: &TypeValue) -> TypeValue {
    match value {
        TypeValue::Object(members) => {
            TypeValue::union(members.keys().map(|k| TypeValue::StringLiteral(k.clone())).collect())
        }
        TypeValue::Tuple(elements, false) => {
            let mut keys: Vec<TypeValue> = (0..elements.len())
                .map(|i| TypeValue::StringLiteral(i.to_string()))
                .collect();
            keys.push(TypeValue::StringLiteral("length".to_string()));
            TypeValue::union(keys)
        }
        TypeValue::Tuple(_, true) => {
            TypeValue::union(vec![TypeValue::Number, TypeValue::StringLiteral("length".to_string())])
        }
        TypeValue::String | TypeValue::StringLiteral(_) | TypeValue::TemplateLiteral(_) => {
            TypeValue::union(vec![TypeValue::Number, TypeValue::StringLiteral("length".to_string())])
        }
        TypeValue::Any | TypeValue::Never => TypeValue::union(vec![TypeValue::String, TypeValue::Number]),
        TypeValue::Union(ms) => TypeValue::intersection(ms.iter().map(keyof_type).collect()),
        TypeValue::Intersection(ms) => TypeValue::union(ms.iter().map(keyof_type).collect()),
        _ => TypeValue::Never,
    }
}
