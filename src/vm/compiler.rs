//! Bytecode compiler: AST → Program
//!
//! Emits post-order code for every type expression and statement. Each lazily
//! evaluated body (type alias, function signature, function body, the file
//! itself) is compiled into its own subroutine. Declarations are hoisted into
//! their scope before the statements of that scope are compiled, so forward
//! references resolve; every name reference goes through the patch table and
//! is resolved by `Program::build`.

use tracing::debug;

use super::bytecode::SlotKind;
use super::opcodes::{Address, Constant, Instruction, ShapeMember};
use super::program::{Namespace, Program};
use crate::ast::*;
use crate::types::{Guard, TypeTag};

/// Hidden binding that receives `return` values inside a function body
const RETURN_SLOT: &str = "<return>";

pub struct Compiler {
    program: Program,
    sub: u16,
    scope: usize,
    layout: u16,
    return_slot: Option<Address>,
}

/// Compilation context saved when entering a nested body
#[derive(Clone, Copy)]
struct Context {
    sub: u16,
    scope: usize,
    layout: u16,
    return_slot: Option<Address>,
}

impl Compiler {
    pub fn new(file: &str) -> Self {
        Self {
            program: Program::new(file),
            sub: 0,
            scope: 0,
            layout: 0,
            return_slot: None,
        }
    }

    /// Compile a whole source file into an unlinked program
    pub fn compile(mut self, source: &SourceFile) -> Program {
        self.layout = self.program.new_layout(0);
        self.scope = self.program.new_scope(None, self.layout);
        self.sub = self.program.new_subroutine("<file>", self.layout);

        self.declare_statements(&source.statements);
        for stmt in &source.statements {
            self.compile_statement(stmt);
        }
        self.emit(Instruction::Return);

        debug!(
            file = %source.file,
            statements = source.statements.len(),
            patches = self.program.pending_patches(),
            "compiled source file"
        );
        self.program
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn emit(&mut self, inst: Instruction) -> usize {
        self.program.emit(self.sub, inst)
    }

    fn emit_spanned(&mut self, inst: Instruction, span: Span) -> usize {
        self.program.emit_spanned(self.sub, inst, span)
    }

    /// Emit an instruction whose address `build()` fills in
    fn emit_reference(&mut self, inst: Instruction, name: &str, namespace: Namespace, span: Span) {
        let ip = self.emit_spanned(inst, span);
        self.program.add_patch(self.sub, ip, name, namespace, self.scope);
    }

    fn save(&self) -> Context {
        Context {
            sub: self.sub,
            scope: self.scope,
            layout: self.layout,
            return_slot: self.return_slot,
        }
    }

    fn restore(&mut self, ctx: Context) {
        self.sub = ctx.sub;
        self.scope = ctx.scope;
        self.layout = ctx.layout;
        self.return_slot = ctx.return_slot;
    }

    fn depth(&self) -> u16 {
        self.program.layout_depth(self.layout)
    }

    fn declare(&mut self, namespace: Namespace, name: &str, kind: SlotKind) -> Address {
        let slot = self.program.declare_slot(self.layout, name, kind);
        self.program.bind_name(self.scope, namespace, name, slot);
        Address::new(self.depth(), slot)
    }

    /// Address of a name bound directly in the current scope
    fn own_slot(&self, namespace: Namespace, name: &str) -> Option<Address> {
        self.program.lookup(self.scope, namespace, name).map(|(addr, _)| addr)
    }

    fn string_constant(&mut self, s: &str) -> u16 {
        self.program.add_string(s)
    }

    fn number_constant(&mut self, n: f64) -> u16 {
        self.program.add_constant(Constant::Number(n))
    }

    /// Open a fresh layout one level deeper plus its subroutine and scope
    fn enter_body(&mut self, name: &str) -> Context {
        let saved = self.save();
        let layout = self.program.new_layout(self.depth() + 1);
        let sub = self.program.new_subroutine(name, layout);
        let scope = self.program.new_scope(Some(self.scope), layout);
        self.sub = sub;
        self.scope = scope;
        self.layout = layout;
        saved
    }

    // ── Declarations ─────────────────────────────────────────────────

    /// Reserve slots for every declaration of one scope before any of its
    /// statements is compiled
    fn declare_statements(&mut self, statements: &[Statement]) {
        for stmt in statements {
            match stmt {
                Statement::TypeAlias(alias) => {
                    let kind = SlotKind::Alias {
                        body: 0,
                        params: alias.params.len() as u16,
                        required: 0,
                    };
                    self.declare(Namespace::Type, &alias.name.name, kind);
                }
                Statement::Function(func) => {
                    self.declare(Namespace::Value, &func.name.name, SlotKind::Function { signature: 0 });
                }
                Statement::Variable(decl) => {
                    let kind = SlotKind::Binding {
                        constant: decl.kind == VarKind::Const,
                    };
                    self.declare(Namespace::Value, &decl.name.name, kind);
                }
                _ => {}
            }
        }
    }

    fn compile_statements(&mut self, statements: &[Statement]) {
        self.declare_statements(statements);
        for stmt in statements {
            self.compile_statement(stmt);
        }
    }

    fn compile_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::TypeAlias(alias) => self.compile_type_alias(alias),
            Statement::Function(func) => self.compile_function(func),
            Statement::Variable(decl) => self.compile_variable(decl),
            Statement::Assignment { target, value, .. } => {
                self.compile_expr(value);
                self.emit_reference(
                    Instruction::Assign(Address::UNRESOLVED),
                    &target.name,
                    Namespace::Value,
                    target.span,
                );
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => self.compile_if(condition, then_branch, else_branch.as_deref()),
            Statement::Block { statements, .. } => self.compile_block(statements),
            Statement::Return { value, span } => {
                match value {
                    Some(expr) => self.compile_expr(expr),
                    None => {
                        self.emit(Instruction::Undefined);
                    }
                }
                match self.return_slot {
                    Some(addr) => {
                        let span = value.as_ref().map_or(*span, Expr::span);
                        self.emit_spanned(Instruction::Assign(addr), span);
                    }
                    None => {
                        self.emit(Instruction::Pop);
                    }
                }
            }
            Statement::Expression(expr) => {
                self.compile_expr(expr);
                self.emit(Instruction::Pop);
            }
        }
    }

    fn compile_block(&mut self, statements: &[Statement]) {
        let outer = self.scope;
        self.scope = self.program.new_scope(Some(outer), self.layout);
        self.compile_statements(statements);
        self.scope = outer;
    }

    /// A branch owns its names even when it is not a block
    fn compile_branch(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block { statements, .. } => self.compile_block(statements),
            other => self.compile_block(std::slice::from_ref(other)),
        }
    }

    /// Type parameters of an alias or function: `Param`/default/`Bind` per
    /// parameter, then every constraint check
    fn compile_type_params(&mut self, params: &[TypeParam], from_arguments: bool) {
        for param in params {
            self.declare(Namespace::Type, &param.name.name, SlotKind::TypeParam);
        }
        for (i, param) in params.iter().enumerate() {
            let index = i as u16;
            if from_arguments {
                let param_ip = self.emit(Instruction::Param { index, skip: 0 });
                let before = self.program.code_len(self.sub);
                match &param.default {
                    Some(default) => self.compile_type(default),
                    None => {
                        self.emit(Instruction::Any);
                    }
                }
                let skip = (self.program.code_len(self.sub) - before) as u32;
                self.program
                    .set_instruction(self.sub, param_ip, Instruction::Param { index, skip });
            } else {
                // Function type parameters are not inferred from call sites;
                // they stand for their constraint
                match &param.constraint {
                    Some(constraint) => self.compile_type(constraint),
                    None => {
                        self.emit(Instruction::Any);
                    }
                }
            }
            self.emit(Instruction::Bind(index));
        }
        if from_arguments {
            for (i, param) in params.iter().enumerate() {
                if let Some(constraint) = &param.constraint {
                    self.compile_type(constraint);
                    self.emit_spanned(Instruction::Constraint(i as u16), constraint.span());
                }
            }
        }
    }

    fn compile_type_alias(&mut self, alias: &TypeAlias) {
        let Some(slot) = self.own_slot(Namespace::Type, &alias.name.name) else {
            return;
        };
        let outer_layout = self.layout;
        let saved = self.enter_body(&alias.name.name);
        let body_sub = self.sub;

        self.compile_type_params(&alias.params, true);
        self.compile_type(&alias.body);
        self.emit(Instruction::Return);
        self.restore(saved);

        let required = alias.params.iter().filter(|p| p.default.is_none()).count() as u16;
        self.program.set_slot_kind(
            outer_layout,
            slot.slot,
            SlotKind::Alias {
                body: body_sub,
                params: alias.params.len() as u16,
                required,
            },
        );
    }

    fn compile_param_type(&mut self, param: &Param) {
        match &param.annotation {
            Some(ann) => self.compile_type(ann),
            None => {
                self.emit(Instruction::Any);
            }
        }
        if param.optional {
            self.emit(Instruction::Undefined);
            self.emit(Instruction::Union(2));
        }
    }

    fn compile_function(&mut self, func: &FunctionDecl) {
        let Some(slot) = self.own_slot(Namespace::Value, &func.name.name) else {
            return;
        };
        let outer_layout = self.layout;

        // Signature, evaluated on first reference
        let saved = self.enter_body(&format!("{} (signature)", func.name.name));
        let signature = self.sub;
        self.compile_type_params(&func.type_params, false);
        for param in &func.params {
            self.compile_param_type(param);
        }
        self.compile_return_type(func.return_type.as_ref());
        self.emit(Instruction::Function(func.params.len() as u16));
        self.emit(Instruction::Return);
        self.restore(saved);
        self.program
            .set_slot_kind(outer_layout, slot.slot, SlotKind::Function { signature });

        // Body, run where the declaration appears
        let saved = self.enter_body(&func.name.name);
        let body = self.sub;
        self.compile_type_params(&func.type_params, false);
        for param in &func.params {
            let addr = self.declare(Namespace::Value, &param.name.name, SlotKind::Binding { constant: false });
            self.compile_param_type(param);
            self.emit(Instruction::Var(addr));
            self.emit_spanned(Instruction::Assign(addr), param.name.span);
        }
        let ret = self.declare(Namespace::Value, RETURN_SLOT, SlotKind::Binding { constant: false });
        self.compile_return_type(func.return_type.as_ref());
        self.emit(Instruction::Var(ret));
        self.emit(Instruction::Pop);
        self.return_slot = Some(ret);
        self.compile_statements(&func.body);
        self.emit(Instruction::Return);
        self.restore(saved);

        self.emit_spanned(Instruction::Body(body), func.name.span);
    }

    fn compile_return_type(&mut self, ret: Option<&TypeNode>) {
        match ret {
            Some(ty) => self.compile_type(ty),
            None => {
                self.emit(Instruction::Any);
            }
        }
    }

    fn compile_variable(&mut self, decl: &VariableDecl) {
        let Some(addr) = self.own_slot(Namespace::Value, &decl.name.name) else {
            return;
        };
        match (&decl.annotation, &decl.init) {
            (Some(annotation), init) => {
                self.compile_type(annotation);
                self.emit(Instruction::Var(addr));
                self.emit(Instruction::Pop);
                if let Some(init) = init {
                    self.compile_expr(init);
                    self.emit_spanned(Instruction::Assign(addr), decl.name.span);
                }
            }
            (None, Some(init)) => {
                self.compile_expr(init);
                self.emit(Instruction::Dup);
                let literal_container = matches!(init, Expr::Array { .. } | Expr::Object { .. });
                if decl.kind != VarKind::Const || literal_container {
                    self.emit(Instruction::Widen);
                }
                self.emit(Instruction::Var(addr));
                self.emit(Instruction::Pop);
                self.emit_spanned(Instruction::Assign(addr), decl.name.span);
            }
            (None, None) => {
                self.emit(Instruction::Any);
                self.emit(Instruction::Var(addr));
                self.emit(Instruction::Pop);
            }
        }
    }

    // ── Control flow ─────────────────────────────────────────────────

    fn compile_if(&mut self, condition: &Expr, then_branch: &Statement, else_branch: Option<&Statement>) {
        self.compile_expr(condition);
        self.emit(Instruction::Pop);

        let guard = guard_of(condition).and_then(|(name, guard, negate)| {
            match self.program.lookup(self.scope, Namespace::Value, name) {
                Some((addr, SlotKind::Binding { .. })) => Some((addr, guard, negate)),
                _ => None,
            }
        });

        let Some((addr, guard, negate)) = guard else {
            self.compile_branch(then_branch);
            if let Some(else_branch) = else_branch {
                self.compile_branch(else_branch);
            }
            return;
        };

        // stack: [before]
        self.emit(Instruction::Save(addr));
        self.emit(Instruction::Narrow { addr, guard, negate });
        self.compile_branch(then_branch);
        // stack: [before, after_then] -> [after_then, before]
        self.emit(Instruction::Save(addr));
        self.emit(Instruction::Swap);
        self.emit(Instruction::Restore(addr));
        self.emit(Instruction::Narrow {
            addr,
            guard,
            negate: !negate,
        });
        if let Some(else_branch) = else_branch {
            self.compile_branch(else_branch);
        }
        // Flow join: either branch may have run
        self.emit(Instruction::Save(addr));
        self.emit(Instruction::Union(2));
        self.emit(Instruction::Restore(addr));
    }

    // ── Expressions ──────────────────────────────────────────────────

    fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier { name, span } => match name.as_str() {
                "undefined" => {
                    self.emit(Instruction::Undefined);
                }
                "NaN" | "Infinity" => {
                    self.emit(Instruction::Number);
                }
                _ => self.emit_reference(Instruction::Load(Address::UNRESOLVED), name, Namespace::Value, *span),
            },
            Expr::StringLiteral { value, .. } => {
                let idx = self.string_constant(value);
                self.emit(Instruction::StringLiteral(idx));
            }
            Expr::NumberLiteral { value, .. } => {
                let idx = self.number_constant(*value);
                self.emit(Instruction::NumberLiteral(idx));
            }
            Expr::BoolLiteral { value, .. } => {
                self.emit(if *value { Instruction::True } else { Instruction::False });
            }
            Expr::Null { .. } => {
                self.emit(Instruction::Null);
            }
            Expr::Template { spans, .. } => {
                for (hole, _) in spans {
                    self.compile_expr(hole);
                    self.emit(Instruction::Pop);
                }
                self.emit(Instruction::String);
            }
            Expr::Array { elements, .. } => {
                let items: Vec<(bool, &Expr)> = elements.iter().map(|e| (e.spread, &e.expr)).collect();
                self.compile_sequence(&items, |c, e| c.compile_expr(e));
            }
            Expr::Object { properties, .. } => {
                let mut shape = Vec::with_capacity(properties.len());
                for (name, value) in properties {
                    self.compile_expr(value);
                    shape.push(ShapeMember {
                        name: name.clone(),
                        optional: false,
                    });
                }
                let idx = self.program.add_constant(Constant::Shape(shape));
                self.emit(Instruction::Object(idx));
            }
            Expr::Call { callee, args, span } => {
                self.compile_expr(callee);
                for arg in args {
                    self.compile_expr(arg);
                }
                self.emit_spanned(Instruction::Invoke(args.len() as u16), *span);
            }
            Expr::Member { object, property, .. } => {
                self.compile_expr(object);
                let idx = self.string_constant(&property.name);
                self.emit(Instruction::StringLiteral(idx));
                self.emit_spanned(Instruction::Index, property.span);
            }
            Expr::Index { object, index, span } => {
                self.compile_expr(object);
                self.compile_expr(index);
                self.emit_spanned(Instruction::Index, *span);
            }
            Expr::Unary { op, operand, span } => {
                self.compile_expr(operand);
                self.emit_spanned(Instruction::Unary(*op), *span);
            }
            Expr::Binary { op, left, right, span } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.emit_spanned(Instruction::Binary(*op), *span);
            }
        }
    }

    /// Tuple-shaped sequence with spreads: fixed runs become `Tuple`
    /// segments joined with `Concat`
    fn compile_sequence<T>(&mut self, items: &[(bool, T)], mut compile: impl FnMut(&mut Self, &T)) {
        if items.iter().all(|(spread, _)| !spread) {
            for (_, item) in items {
                compile(self, item);
            }
            self.emit(Instruction::Tuple {
                len: items.len() as u16,
                rest: false,
            });
            return;
        }

        self.emit(Instruction::Tuple { len: 0, rest: false });
        let mut run = 0u16;
        for (spread, item) in items {
            if *spread {
                if run > 0 {
                    self.emit(Instruction::Tuple { len: run, rest: false });
                    self.emit(Instruction::Concat);
                    run = 0;
                }
                compile(self, item);
                self.emit(Instruction::Concat);
            } else {
                compile(self, item);
                run += 1;
            }
        }
        if run > 0 {
            self.emit(Instruction::Tuple { len: run, rest: false });
            self.emit(Instruction::Concat);
        }
    }

    // ── Types ────────────────────────────────────────────────────────

    fn compile_type(&mut self, ty: &TypeNode) {
        match ty {
            TypeNode::Keyword { kind, .. } => {
                self.emit(match kind {
                    KeywordType::Any => Instruction::Any,
                    KeywordType::Unknown => Instruction::Unknown,
                    KeywordType::Never => Instruction::Never,
                    KeywordType::Null => Instruction::Null,
                    KeywordType::Undefined | KeywordType::Void => Instruction::Undefined,
                    KeywordType::String => Instruction::String,
                    KeywordType::Number => Instruction::Number,
                    KeywordType::Boolean => Instruction::Boolean,
                });
            }
            TypeNode::StringLiteral { value, .. } => {
                let idx = self.string_constant(value);
                self.emit(Instruction::StringLiteral(idx));
            }
            TypeNode::NumberLiteral { value, .. } => {
                let idx = self.number_constant(*value);
                self.emit(Instruction::NumberLiteral(idx));
            }
            TypeNode::BooleanLiteral { value, .. } => {
                self.emit(if *value { Instruction::True } else { Instruction::False });
            }
            TypeNode::Reference { name, args, span } => {
                if args.is_empty() {
                    self.emit_reference(Instruction::Load(Address::UNRESOLVED), &name.name, Namespace::Type, *span);
                } else {
                    for arg in args {
                        self.compile_type(arg);
                    }
                    let call = Instruction::Call {
                        addr: Address::UNRESOLVED,
                        argc: args.len() as u16,
                    };
                    self.emit_reference(call, &name.name, Namespace::Type, *span);
                }
            }
            TypeNode::Union { members, .. } => {
                for m in members {
                    self.compile_type(m);
                }
                self.emit(Instruction::Union(members.len() as u16));
            }
            TypeNode::Intersection { members, .. } => {
                for m in members {
                    self.compile_type(m);
                }
                self.emit(Instruction::Intersection(members.len() as u16));
            }
            TypeNode::Tuple { elements, .. } => {
                let items: Vec<(bool, &TypeNode)> = elements.iter().map(|e| (e.spread, &e.ty)).collect();
                self.compile_sequence(&items, |c, t| c.compile_type(t));
            }
            TypeNode::Array { element, .. } => {
                self.compile_type(element);
                self.emit(Instruction::Tuple { len: 1, rest: true });
            }
            TypeNode::Object { members, .. } => {
                let mut shape = Vec::with_capacity(members.len());
                for m in members {
                    self.compile_type(&m.ty);
                    shape.push(ShapeMember {
                        name: m.name.clone(),
                        optional: m.optional,
                    });
                }
                let idx = self.program.add_constant(Constant::Shape(shape));
                self.emit(Instruction::Object(idx));
            }
            TypeNode::Function { params, ret, .. } => {
                for p in params {
                    self.compile_param_type(p);
                }
                self.compile_type(ret);
                self.emit(Instruction::Function(params.len() as u16));
            }
            TypeNode::IndexedAccess { object, index, span } => {
                self.compile_type(object);
                self.compile_type(index);
                self.emit_spanned(Instruction::Index, *span);
            }
            TypeNode::KeyOf { operand, .. } => {
                self.compile_type(operand);
                self.emit(Instruction::KeyOf);
            }
            TypeNode::Query { name, span } => {
                self.emit_reference(Instruction::Load(Address::UNRESOLVED), &name.name, Namespace::Value, *span);
            }
            TypeNode::Conditional {
                check,
                extends,
                when_true,
                when_false,
                ..
            } => self.compile_conditional(check, extends, when_true, when_false),
            TypeNode::Infer { name, .. } => match self.program.lookup(self.scope, Namespace::Type, &name.name) {
                Some((addr, SlotKind::Infer)) => {
                    self.emit(Instruction::Infer(addr));
                }
                _ => {
                    self.emit(Instruction::Unknown);
                }
            },
            TypeNode::TemplateLiteral { head, spans, .. } => {
                let idx = self.string_constant(head);
                self.emit(Instruction::StringLiteral(idx));
                for (hole, text) in spans {
                    self.compile_type(hole);
                    let idx = self.string_constant(text);
                    self.emit(Instruction::StringLiteral(idx));
                }
                self.emit(Instruction::TemplateLiteral((1 + 2 * spans.len()) as u16));
            }
        }
    }

    fn compile_conditional(
        &mut self,
        check: &TypeNode,
        extends: &TypeNode,
        when_true: &TypeNode,
        when_false: &TypeNode,
    ) {
        // A naked type parameter distributes over unions
        let distribute = match check {
            TypeNode::Reference { name, args, .. } if args.is_empty() => {
                match self.program.lookup(self.scope, Namespace::Type, &name.name) {
                    Some((addr, SlotKind::TypeParam)) => Some(addr),
                    _ => None,
                }
            }
            _ => None,
        };
        self.compile_type(check);

        // `infer` variables live in the current frame, visible to the
        // extends clause and the true branch only
        let mut infer_names = Vec::new();
        collect_infer_names(extends, &mut infer_names);
        let outer = self.scope;
        let inner = self.program.new_scope(Some(outer), self.layout);
        let infer_slot = self.program.slot_count(self.layout);
        for name in &infer_names {
            let slot = self.program.declare_slot(self.layout, name, SlotKind::Infer);
            self.program.bind_name(inner, Namespace::Type, name, slot);
        }

        let header = self.emit(Instruction::Return);
        let start = self.program.code_len(self.sub);

        self.scope = inner;
        self.compile_type(extends);
        self.emit(Instruction::Return);
        let extends_end = self.program.code_len(self.sub);

        self.compile_type(when_true);
        self.emit(Instruction::Return);
        let true_end = self.program.code_len(self.sub);

        self.scope = outer;
        self.compile_type(when_false);
        self.emit(Instruction::Return);
        let false_end = self.program.code_len(self.sub);

        self.program.set_instruction(
            self.sub,
            header,
            Instruction::Conditional {
                distribute,
                infer_slot,
                infer_count: infer_names.len() as u16,
                extends_len: (extends_end - start) as u32,
                true_len: (true_end - extends_end) as u32,
                false_len: (false_end - true_end) as u32,
            },
        );
    }
}

/// Names declared by `infer` in an extends clause, in order of appearance.
/// Nested conditional types introduce their own.
fn collect_infer_names(ty: &TypeNode, out: &mut Vec<String>) {
    let mut visit = |t: &TypeNode| collect_infer_names(t, out);
    match ty {
        TypeNode::Infer { name, .. } => {
            if !out.contains(&name.name) {
                out.push(name.name.clone());
            }
        }
        TypeNode::Reference { args, .. } => args.iter().for_each(&mut visit),
        TypeNode::Union { members, .. } | TypeNode::Intersection { members, .. } => {
            members.iter().for_each(&mut visit)
        }
        TypeNode::Tuple { elements, .. } => elements.iter().for_each(|e| visit(&e.ty)),
        TypeNode::Array { element, .. } => visit(element),
        TypeNode::Object { members, .. } => members.iter().for_each(|m| visit(&m.ty)),
        TypeNode::Function { params, ret, .. } => {
            for p in params {
                if let Some(ann) = &p.annotation {
                    visit(ann);
                }
            }
            visit(ret);
        }
        TypeNode::IndexedAccess { object, index, .. } => {
            visit(object);
            visit(index);
        }
        TypeNode::KeyOf { operand, .. } => visit(operand),
        TypeNode::TemplateLiteral { spans, .. } => spans.iter().for_each(|(t, _)| visit(t)),
        TypeNode::Keyword { .. }
        | TypeNode::StringLiteral { .. }
        | TypeNode::NumberLiteral { .. }
        | TypeNode::BooleanLiteral { .. }
        | TypeNode::Query { .. }
        | TypeNode::Conditional { .. } => {}
    }
}

/// Recognise a narrowing guard: `typeof x === 'tag'`, `x === null`,
/// `x === undefined`, in either operand order, negated by `!==` or `!`
fn guard_of(expr: &Expr) -> Option<(&str, Guard, bool)> {
    match expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
            ..
        } => guard_of(operand).map(|(name, guard, negate)| (name, guard, !negate)),
        Expr::Binary { op, left, right, .. } => {
            let negate = match op {
                BinaryOp::StrictEq => false,
                BinaryOp::StrictNotEq => true,
                BinaryOp::Eq | BinaryOp::NotEq => {
                    return typeof_guard(left, right)
                        .or_else(|| typeof_guard(right, left))
                        .map(|(name, guard)| (name, guard, *op == BinaryOp::NotEq));
                }
                _ => return None,
            };
            typeof_guard(left, right)
                .or_else(|| typeof_guard(right, left))
                .or_else(|| unit_guard(left, right))
                .or_else(|| unit_guard(right, left))
                .map(|(name, guard)| (name, guard, negate))
        }
        _ => None,
    }
}

fn typeof_guard<'a>(subject: &'a Expr, tag: &Expr) -> Option<(&'a str, Guard)> {
    let Expr::Unary {
        op: UnaryOp::TypeOf,
        operand,
        ..
    } = subject
    else {
        return None;
    };
    let Expr::Identifier { name, .. } = operand.as_ref() else {
        return None;
    };
    let Expr::StringLiteral { value, .. } = tag else {
        return None;
    };
    TypeTag::from_name(value).map(|t| (name.as_str(), Guard::TypeOf(t)))
}

fn unit_guard<'a>(subject: &'a Expr, unit: &Expr) -> Option<(&'a str, Guard)> {
    let Expr::Identifier { name, .. } = subject else {
        return None;
    };
    match unit {
        Expr::Null { .. } => Some((name.as_str(), Guard::IsNull)),
        Expr::Identifier { name: u, .. } if u == "undefined" => Some((name.as_str(), Guard::IsUndefined)),
        _ => None,
    }
}
