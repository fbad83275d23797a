//! Program builder
//!
//! The compiler emits into per-subroutine instruction buffers and records a
//! patch for every name reference. `build()` links the buffers, resolves the
//! patches through the compile-time scope chain and seals the result into a
//! [`Bytecode`] blob.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use super::bytecode::{Bytecode, DecodeError, FrameLayout, Module, SlotDecl, SlotKind, SubroutineInfo};
use super::opcodes::{Address, Constant, Instruction};
use crate::diagnostics::Span;

/// Type names and value names never collide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Type,
    Value,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("program has more than {limit} {what}")]
    Overflow { what: &'static str, limit: usize },
    #[error("linked program is invalid: {0}")]
    Invalid(#[from] DecodeError),
}

#[derive(Debug, Clone)]
struct Subroutine {
    name: String,
    layout: u16,
    code: Vec<Instruction>,
    spans: Vec<(u32, Span)>,
}

/// A lexical naming scope. Block scopes share their function's layout.
#[derive(Debug, Clone)]
struct Scope {
    parent: Option<usize>,
    layout: u16,
    types: FxHashMap<String, u16>,
    values: FxHashMap<String, u16>,
}

impl Scope {
    fn names(&self, namespace: Namespace) -> &FxHashMap<String, u16> {
        match namespace {
            Namespace::Type => &self.types,
            Namespace::Value => &self.values,
        }
    }
}

#[derive(Debug, Clone)]
struct Patch {
    sub: usize,
    ip: usize,
    name: String,
    namespace: Namespace,
    scope: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    file: String,
    constants: Vec<Constant>,
    layouts: Vec<FrameLayout>,
    subroutines: Vec<Subroutine>,
    scopes: Vec<Scope>,
    patches: Vec<Patch>,
    overflow: Option<&'static str>,
}

fn index_u16(len: usize, what: &'static str, overflow: &mut Option<&'static str>) -> u16 {
    match u16::try_from(len) {
        Ok(idx) if idx != u16::MAX => idx,
        _ => {
            overflow.get_or_insert(what);
            u16::MAX
        }
    }
}

impl Program {
    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            ..Self::default()
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    // ── Constants ────────────────────────────────────────────────────

    /// Add a constant, deduplicating
    pub fn add_constant(&mut self, c: Constant) -> u16 {
        if let Some(pos) = self.constants.iter().position(|existing| existing == &c) {
            return pos as u16;
        }
        let idx = index_u16(self.constants.len(), "constants", &mut self.overflow);
        self.constants.push(c);
        idx
    }

    pub fn add_string(&mut self, s: &str) -> u16 {
        self.add_constant(Constant::Str(s.to_string()))
    }

    // ── Layouts & slots ──────────────────────────────────────────────

    pub fn new_layout(&mut self, depth: u16) -> u16 {
        let idx = index_u16(self.layouts.len(), "frame layouts", &mut self.overflow);
        self.layouts.push(FrameLayout { depth, slots: Vec::new() });
        idx
    }

    pub fn layout_depth(&self, layout: u16) -> u16 {
        self.layouts.get(layout as usize).map_or(0, |l| l.depth)
    }

    pub fn declare_slot(&mut self, layout: u16, name: &str, kind: SlotKind) -> u16 {
        let Some(frame) = self.layouts.get_mut(layout as usize) else {
            return u16::MAX;
        };
        let idx = index_u16(frame.slots.len(), "slots in one frame", &mut self.overflow);
        frame.slots.push(SlotDecl {
            name: name.to_string(),
            kind,
        });
        idx
    }

    pub fn set_slot_kind(&mut self, layout: u16, slot: u16, kind: SlotKind) {
        if let Some(decl) = self
            .layouts
            .get_mut(layout as usize)
            .and_then(|l| l.slots.get_mut(slot as usize))
        {
            decl.kind = kind;
        }
    }

    pub fn slot_count(&self, layout: u16) -> u16 {
        self.layouts.get(layout as usize).map_or(0, |l| l.slots.len() as u16)
    }

    // ── Subroutines ──────────────────────────────────────────────────

    pub fn new_subroutine(&mut self, name: &str, layout: u16) -> u16 {
        let idx = index_u16(self.subroutines.len(), "subroutines", &mut self.overflow);
        self.subroutines.push(Subroutine {
            name: name.to_string(),
            layout,
            code: Vec::new(),
            spans: Vec::new(),
        });
        idx
    }

    pub fn emit(&mut self, sub: u16, inst: Instruction) -> usize {
        match self.subroutines.get_mut(sub as usize) {
            Some(s) => {
                s.code.push(inst);
                s.code.len() - 1
            }
            None => 0,
        }
    }

    pub fn emit_spanned(&mut self, sub: u16, inst: Instruction, span: Span) -> usize {
        let ip = self.emit(sub, inst);
        if let Some(s) = self.subroutines.get_mut(sub as usize) {
            s.spans.push((ip as u32, span));
        }
        ip
    }

    pub fn set_instruction(&mut self, sub: u16, ip: usize, inst: Instruction) {
        if let Some(slot) = self.subroutines.get_mut(sub as usize).and_then(|s| s.code.get_mut(ip)) {
            *slot = inst;
        }
    }

    pub fn instruction(&self, sub: u16, ip: usize) -> Option<Instruction> {
        self.subroutines.get(sub as usize).and_then(|s| s.code.get(ip)).copied()
    }

    pub fn code_len(&self, sub: u16) -> usize {
        self.subroutines.get(sub as usize).map_or(0, |s| s.code.len())
    }

    // ── Compile-time scopes ──────────────────────────────────────────

    pub fn new_scope(&mut self, parent: Option<usize>, layout: u16) -> usize {
        self.scopes.push(Scope {
            parent,
            layout,
            types: FxHashMap::default(),
            values: FxHashMap::default(),
        });
        self.scopes.len() - 1
    }

    /// Bind a name in a scope; a redeclaration in the same scope wins
    pub fn bind_name(&mut self, scope: usize, namespace: Namespace, name: &str, slot: u16) {
        if let Some(s) = self.scopes.get_mut(scope) {
            let names = match namespace {
                Namespace::Type => &mut s.types,
                Namespace::Value => &mut s.values,
            };
            names.insert(name.to_string(), slot);
        }
    }

    /// Resolve a name by walking the scope chain outwards
    pub fn lookup(&self, scope: usize, namespace: Namespace, name: &str) -> Option<(Address, SlotKind)> {
        let mut current = Some(scope);
        while let Some(idx) = current {
            let s = self.scopes.get(idx)?;
            if let Some(&slot) = s.names(namespace).get(name) {
                let layout = self.layouts.get(s.layout as usize)?;
                let kind = layout.slots.get(slot as usize)?.kind;
                return Some((Address::new(layout.depth, slot), kind));
            }
            current = s.parent;
        }
        None
    }

    /// Record a reference at `sub[ip]` to be resolved by `build()`
    pub fn add_patch(&mut self, sub: u16, ip: usize, name: &str, namespace: Namespace, scope: usize) {
        self.patches.push(Patch {
            sub: sub as usize,
            ip,
            name: name.to_string(),
            namespace,
            scope,
        });
    }

    pub fn pending_patches(&self) -> usize {
        self.patches.len()
    }

    // ── Build ────────────────────────────────────────────────────────

    /// Resolve every patch and link the subroutines into one module
    pub fn link(&self) -> Result<Module, BuildError> {
        if let Some(what) = self.overflow {
            return Err(BuildError::Overflow {
                what,
                limit: u16::MAX as usize - 1,
            });
        }

        let mut constants = self.constants.clone();
        let mut bodies: Vec<Vec<Instruction>> = self.subroutines.iter().map(|s| s.code.clone()).collect();

        let mut missing = 0usize;
        for patch in &self.patches {
            let Some(inst) = bodies.get(patch.sub).and_then(|c| c.get(patch.ip)).copied() else {
                continue;
            };
            let resolved = match self.lookup(patch.scope, patch.namespace, &patch.name) {
                Some((addr, _)) => inst.with_address(addr),
                None => {
                    missing += 1;
                    let c = Constant::Str(patch.name.clone());
                    let idx = match constants.iter().position(|existing| existing == &c) {
                        Some(pos) => pos,
                        None => {
                            constants.push(c);
                            constants.len() - 1
                        }
                    };
                    if idx >= u16::MAX as usize {
                        return Err(BuildError::Overflow {
                            what: "constants",
                            limit: u16::MAX as usize - 1,
                        });
                    }
                    inst.as_missing(idx as u16)
                }
            };
            bodies[patch.sub][patch.ip] = resolved;
        }

        let mut code = Vec::new();
        let mut spans = Vec::new();
        let mut subroutines = Vec::with_capacity(self.subroutines.len());
        for (sub, body) in self.subroutines.iter().zip(bodies) {
            let entry = code.len() as u32;
            subroutines.push(SubroutineInfo {
                name: sub.name.clone(),
                layout: sub.layout,
                entry,
                len: body.len() as u32,
            });
            spans.extend(sub.spans.iter().map(|(ip, span)| (entry + ip, *span)));
            code.extend(body);
        }
        spans.sort_by_key(|(ip, _)| *ip);
        spans.dedup_by_key(|(ip, _)| *ip);

        debug!(
            file = %self.file,
            instructions = code.len(),
            subroutines = subroutines.len(),
            patches = self.patches.len(),
            missing,
            "linked program"
        );

        let module = Module {
            file: self.file.clone(),
            constants,
            layouts: self.layouts.clone(),
            subroutines,
            code,
            spans,
        };
        module.validate()?;
        Ok(module)
    }

    pub fn build(&self) -> Result<Bytecode, BuildError> {
        let module = self.link()?;
        Ok(Bytecode::from_module(&module))
    }
}
