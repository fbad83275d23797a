//! Human-readable listing of a program. The format is for debugging only.

use std::fmt::Write;

use super::bytecode::{Bytecode, DecodeError, Module, SlotKind};
use super::opcodes::Instruction;

pub fn disassemble(bytecode: &Bytecode) -> Result<String, DecodeError> {
    let module = bytecode.decode()?;
    let mut out = format!("; sha256 {}\n", bytecode.digest_hex());
    out.push_str(&disassemble_module(&module));
    Ok(out)
}

fn slot_kind_text(kind: &SlotKind) -> String {
    match kind {
        SlotKind::Alias { body, params, required } => {
            if *params == 0 {
                format!("alias s{}", body)
            } else {
                format!("alias s{} params={} required={}", body, params, required)
            }
        }
        SlotKind::Function { signature } => format!("function s{}", signature),
        SlotKind::TypeParam => "type-param".to_string(),
        SlotKind::Binding { constant: true } => "const".to_string(),
        SlotKind::Binding { constant: false } => "let".to_string(),
        SlotKind::Infer => "infer".to_string(),
    }
}

pub fn disassemble_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; file {}", module.file);

    if !module.constants.is_empty() {
        let _ = writeln!(out, "\n; constants");
        for (i, c) in module.constants.iter().enumerate() {
            let _ = writeln!(out, ";   c{:<4} {}", i, c);
        }
    }

    let _ = writeln!(out, "\n; frame layouts");
    for (i, layout) in module.layouts.iter().enumerate() {
        let _ = writeln!(out, ";   L{} depth {}", i, layout.depth);
        for (j, slot) in layout.slots.iter().enumerate() {
            let _ = writeln!(out, ";     {:<3} {:<16} {}", j, slot.name, slot_kind_text(&slot.kind));
        }
    }

    for (i, sub) in module.subroutines.iter().enumerate() {
        let _ = writeln!(out, "\ns{} {} (L{}):", i, sub.name, sub.layout);
        let start = sub.entry as usize;
        let end = start + sub.len as usize;
        // Inline block ends, so nested blocks are indented
        let mut block_ends: Vec<usize> = Vec::new();
        for ip in start..end.min(module.code.len()) {
            while block_ends.last().is_some_and(|&e| ip >= e) {
                block_ends.pop();
            }
            let inst = module.code[ip];
            let indent = "  ".repeat(block_ends.len());
            let _ = write!(out, "  {:05}  {}{}", ip, indent, inst);
            if let Some(note) = operand_note(module, &inst) {
                let _ = write!(out, "  ; {}", note);
            }
            if let Some(span) = module.span_at(ip) {
                let _ = write!(out, "  @{}:{}", span.line, span.column);
            }
            out.push('\n');

            if let Instruction::Conditional {
                extends_len,
                true_len,
                false_len,
                ..
            } = inst
            {
                block_ends.push(ip + 1 + (extends_len + true_len + false_len) as usize);
            }
        }
    }
    out
}

fn operand_note(module: &Module, inst: &Instruction) -> Option<String> {
    match inst {
        Instruction::NumberLiteral(i) | Instruction::StringLiteral(i) | Instruction::Object(i) => {
            module.constants.get(*i as usize).map(|c| c.to_string())
        }
        Instruction::Missing { name, .. } => module.string(*name).map(|s| format!("'{}'", s)),
        Instruction::Body(s) => module.subroutines.get(*s as usize).map(|sub| sub.name.clone()),
        _ => None,
    }
}
