//! Bytecode blob tests -- header, checksum, decoding and re-running

use sha2::{Digest, Sha256};

use typevm::diagnostics::Span;
use typevm::vm::bytecode::{FrameLayout, SlotDecl, SlotKind, SubroutineInfo};
use typevm::vm::opcodes::{Address, Constant, Instruction};
use typevm::vm::{Bytecode, DecodeError, Module, VM};

const SOURCE: &str = "type Pair<A, B = A> = [A, B];\n\
type IsStr<T> = T extends string ? 'y' : 'n';\n\
const p: Pair<number> = [1, 2];\n\
let q: IsStr<1 | 2> = 'y';\n\
function f(x?: string): number { return 1; }\n";

// ── Helpers ──────────────────────────────────────────────────────

fn compile(source: &str) -> Bytecode {
    typevm::compile_source(source, "test.ts").unwrap()
}

fn errors(bytecode: &Bytecode) -> Vec<String> {
    let mut vm = VM::new();
    vm.run(bytecode).unwrap();
    vm.errors()
}

const HEADER_LEN: usize = 4 + 1 + 32;

/// Replace the payload and fix up the digest so only decoding can reject it
fn with_payload(bytecode: &Bytecode, payload: &[u8]) -> Vec<u8> {
    let mut bytes = bytecode.as_bytes()[..5].to_vec();
    bytes.extend_from_slice(&Sha256::digest(payload));
    bytes.extend_from_slice(payload);
    bytes
}

/// One-frame module: `const x: string = 1;`
fn hand_module() -> Module {
    Module {
        file: "hand.ts".to_string(),
        constants: vec![Constant::Number(1.0)],
        layouts: vec![FrameLayout {
            depth: 0,
            slots: vec![SlotDecl {
                name: "x".to_string(),
                kind: SlotKind::Binding { constant: true },
            }],
        }],
        subroutines: vec![SubroutineInfo {
            name: "<file>".to_string(),
            layout: 0,
            entry: 0,
            len: 6,
        }],
        code: vec![
            Instruction::String,
            Instruction::Var(Address::new(0, 0)),
            Instruction::Pop,
            Instruction::NumberLiteral(0),
            Instruction::Assign(Address::new(0, 0)),
            Instruction::Return,
        ],
        spans: vec![(4, Span::new(6, 7, 1, 7))],
    }
}

// ── Header ──────────────────────────────────────────────────────

#[test]
fn bytecode_header_layout() {
    let bytecode = compile(SOURCE);
    let bytes = bytecode.as_bytes();
    assert_eq!(&bytes[..4], b"TYVM");
    assert_eq!(bytes[4], 1);
    assert_eq!(&bytes[5..HEADER_LEN], Sha256::digest(&bytes[HEADER_LEN..]).as_slice());
    assert_eq!(bytecode.len(), bytes.len());
    assert!(!bytecode.is_empty());
}

#[test]
fn bytecode_digest_is_hex() {
    let digest = compile(SOURCE).digest_hex();
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn bytecode_is_deterministic() {
    assert_eq!(compile(SOURCE).as_bytes(), compile(SOURCE).as_bytes());
    assert_ne!(compile(SOURCE).digest_hex(), compile("type A = 1;").digest_hex());
}

// ── Decoding ────────────────────────────────────────────────────

#[test]
fn bytecode_decodes_to_linked_module() {
    let file = typevm::parser::parse_source(SOURCE, "test.ts").unwrap();
    let linked = typevm::vm::Compiler::new("test.ts").compile(&file).link().unwrap();
    let bytecode = Bytecode::from_module(&linked);
    assert_eq!(bytecode.decode().unwrap(), linked);
    assert_eq!(bytecode, compile(SOURCE));
}

#[test]
fn bytecode_accepts_its_own_bytes() {
    let bytecode = compile(SOURCE);
    let reloaded = Bytecode::from_bytes(bytecode.as_bytes().to_vec()).unwrap();
    assert_eq!(reloaded, bytecode);
    assert_eq!(reloaded.digest_hex(), bytecode.digest_hex());
}

#[test]
fn bytecode_rejects_short_input() {
    assert_eq!(Bytecode::from_bytes(Vec::new()).unwrap_err(), DecodeError::TooShort);
    assert_eq!(Bytecode::from_bytes(b"TYVM\x01".to_vec()).unwrap_err(), DecodeError::TooShort);
}

#[test]
fn bytecode_rejects_bad_magic() {
    let mut bytes = compile(SOURCE).as_bytes().to_vec();
    bytes[0] = b'X';
    assert_eq!(Bytecode::from_bytes(bytes).unwrap_err(), DecodeError::BadMagic);
}

#[test]
fn bytecode_rejects_other_versions() {
    let mut bytes = compile(SOURCE).as_bytes().to_vec();
    bytes[4] = 2;
    assert_eq!(Bytecode::from_bytes(bytes).unwrap_err(), DecodeError::UnsupportedVersion(2));
}

#[test]
fn bytecode_detects_tampering() {
    let bytecode = compile(SOURCE);
    for offset in [HEADER_LEN, bytecode.len() / 2, bytecode.len() - 1] {
        let mut bytes = bytecode.as_bytes().to_vec();
        bytes[offset] ^= 0x40;
        assert_eq!(Bytecode::from_bytes(bytes).unwrap_err(), DecodeError::ChecksumMismatch);
    }
    let mut bytes = bytecode.as_bytes().to_vec();
    bytes[10] ^= 0x01;
    assert_eq!(Bytecode::from_bytes(bytes).unwrap_err(), DecodeError::ChecksumMismatch);
}

#[test]
fn bytecode_truncated_payload_fails_to_decode() {
    let bytecode = compile(SOURCE);
    let payload = &bytecode.as_bytes()[HEADER_LEN..];
    let bytes = with_payload(&bytecode, &payload[..payload.len() - 3]);
    assert!(matches!(Bytecode::from_bytes(bytes), Err(DecodeError::Truncated(_))));
}

#[test]
fn bytecode_unknown_opcode() {
    let mut module = hand_module();
    module.code = vec![Instruction::Pop, Instruction::Return];
    module.subroutines[0].len = 2;
    module.spans.clear();
    let bytecode = Bytecode::from_module(&module);
    let mut payload = bytecode.as_bytes()[HEADER_LEN..].to_vec();
    // No other byte of this payload is 0x50
    let pop = payload.iter().rposition(|&b| b == 0x50).unwrap();
    payload[pop] = 0xee;
    let err = Bytecode::from_bytes(with_payload(&bytecode, &payload)).unwrap_err();
    assert!(matches!(err, DecodeError::UnknownOpcode { op: 0xee, .. }));
}

// ── Validation ──────────────────────────────────────────────────

#[test]
fn bytecode_hand_module_is_valid() {
    let module = hand_module();
    assert_eq!(module.validate(), Ok(()));
    assert_eq!(Bytecode::from_module(&module).decode().unwrap(), module);
}

#[test]
fn bytecode_rejects_unresolved_addresses() {
    let mut module = hand_module();
    module.code[1] = Instruction::Var(Address::UNRESOLVED);
    let bytecode = Bytecode::from_module(&module);
    assert_eq!(bytecode.decode().unwrap_err(), DecodeError::Unresolved(1));
}

#[test]
fn bytecode_rejects_open_subroutine() {
    let mut module = hand_module();
    module.code[5] = Instruction::Pop;
    assert!(matches!(module.validate(), Err(DecodeError::Inconsistent(_))));
}

#[test]
fn bytecode_rejects_bad_constant_reference() {
    let mut module = hand_module();
    module.code[3] = Instruction::StringLiteral(0);
    assert!(matches!(module.validate(), Err(DecodeError::Inconsistent(_))));
    module.code[3] = Instruction::NumberLiteral(9);
    assert!(matches!(module.validate(), Err(DecodeError::Inconsistent(_))));
}

#[test]
fn bytecode_rejects_overlong_conditional() {
    let mut module = hand_module();
    module.code[2] = Instruction::Conditional {
        distribute: None,
        infer_slot: 0,
        infer_count: 0,
        extends_len: 10,
        true_len: 1,
        false_len: 1,
    };
    assert!(matches!(module.validate(), Err(DecodeError::Inconsistent(_))));
}

#[test]
fn bytecode_rejects_missing_alias_body() {
    let mut module = hand_module();
    module.layouts[0].slots[0].kind = SlotKind::Alias { body: 4, params: 0, required: 0 };
    assert!(matches!(module.validate(), Err(DecodeError::Inconsistent(_))));
}

// ── Running blobs ───────────────────────────────────────────────

#[test]
fn bytecode_hand_module_runs() {
    let bytecode = Bytecode::from_module(&hand_module());
    assert_eq!(
        errors(&bytecode),
        vec!["hand.ts:1:7 - error TS2322: Type '1' is not assignable to type 'string'.".to_string()]
    );
}

#[test]
fn bytecode_reloaded_blob_reports_the_same() {
    let bytecode = compile(SOURCE);
    let reloaded = Bytecode::from_bytes(bytecode.as_bytes().to_vec()).unwrap();
    let direct = errors(&bytecode);
    assert_eq!(direct.len(), 1);
    assert!(direct[0].starts_with("test.ts:4:5 - error TS2322"));
    assert_eq!(errors(&reloaded), direct);
}

#[test]
fn bytecode_clones_share_bytes() {
    let bytecode = compile(SOURCE);
    let copy = bytecode.clone();
    assert_eq!(copy.as_bytes().as_ptr(), bytecode.as_bytes().as_ptr());
}
