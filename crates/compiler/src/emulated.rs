//! Emulated logical and comparison helpers.
//!
//! The VM has no logical or relational instructions, so the compiler
//! synthesizes small subroutines for them on demand. Each helper is a lazy
//! singleton: the first call materializes its body and later calls reuse the
//! recorded entry label. Calling convention: left operand in the accumulator,
//! right operand in the scratch register; no guarantee is made about the flag
//! at return, so callers re-establish `F=A` with `OR 0` before branching.

use indexmap::IndexMap;

use crate::asm::{AsmArena, AsmBuffer, Operand, SCR0, TagId};

/// The helper routines the lowering can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperOp {
    Neg,
    Not,
    Notl,
    Andl,
    Orl,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl HelperOp {
    pub fn name(self) -> &'static str {
        match self {
            HelperOp::Neg => "NEG",
            HelperOp::Not => "NOT",
            HelperOp::Notl => "NOTL",
            HelperOp::Andl => "ANDL",
            HelperOp::Orl => "ORL",
            HelperOp::Eq => "EQ",
            HelperOp::Ne => "NE",
            HelperOp::Gt => "GT",
            HelperOp::Ge => "GE",
            HelperOp::Lt => "LT",
            HelperOp::Le => "LE",
        }
    }

    /// Pseudo-signature used as the entry label comment in `-c` output.
    fn signature(self) -> &'static str {
        match self {
            HelperOp::Neg => "int NEG(): A=-A",
            HelperOp::Not => "int NOT(): A=~A",
            HelperOp::Notl => "int NOTL(): A=!A; A:(0|1)",
            HelperOp::Andl => "int ANDL(v0): A=(A && v0); A:(0|1)",
            HelperOp::Orl => "int ORL(v0): A=(A || v0); A:(0|1)",
            HelperOp::Eq => "int EQ(v0): A=(A == v0); A:(0|1)",
            HelperOp::Ne => "int NE(v0): A=(A != v0); A:(0|1)",
            HelperOp::Gt => "int GT(v0): A=(A > v0); A:(0|1)",
            HelperOp::Ge => "int GE(v0): A=(A >= v0); A:(0|1)",
            HelperOp::Lt => "int LT(v0): A=(A < v0); A:(0|1)",
            HelperOp::Le => "int LE(v0): A=(A <= v0); A:(0|1)",
        }
    }
}

/// One materialized helper: entry label plus body.
#[derive(Debug)]
pub struct Helper {
    pub entry: TagId,
    pub buf: AsmBuffer,
}

/// Lazily populated helper library.
#[derive(Debug, Default)]
pub struct HelperLib {
    helpers: IndexMap<HelperOp, Helper>,
}

impl HelperLib {
    pub fn new() -> Self {
        HelperLib::default()
    }

    /// Emit a `CALL` to the helper into `out`, materializing the helper body
    /// on first use.
    pub fn emit_call(&mut self, op: HelperOp, out: &mut AsmBuffer, arena: &mut AsmArena) {
        let entry = match self.helpers.get(&op) {
            Some(helper) => helper.entry,
            None => {
                let helper = build_helper(op, arena);
                let entry = helper.entry;
                self.helpers.insert(op, helper);
                entry
            }
        };
        out.emit_c("CALL", vec![Operand::Tag(entry)], op.name());
    }

    /// Entry labels of every materialized helper, for tag-use seeding.
    pub fn entry_tags(&self) -> impl Iterator<Item = TagId> + '_ {
        self.helpers.values().map(|h| h.entry)
    }

    /// Take the helper buffers in materialization order.
    pub fn take_buffers(&mut self) -> Vec<AsmBuffer> {
        self.helpers
            .values_mut()
            .map(|h| std::mem::take(&mut h.buf))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }

    #[cfg(test)]
    fn get(&self, op: HelperOp) -> Option<&Helper> {
        self.helpers.get(&op)
    }
}

fn scr0() -> Operand {
    Operand::Reg(SCR0)
}

fn build_helper(op: HelperOp, arena: &mut AsmArena) -> Helper {
    let entry = arena.new_tag();
    let mut buf = AsmBuffer::new();
    buf.emit_c("TAG", vec![Operand::Tag(entry)], op.signature());
    match op {
        HelperOp::Neg => {
            buf.emit("XOR", vec![Operand::Const("0xffffffff".into())]);
            buf.emit("ADD", vec![Operand::Imm(1)]);
        }
        HelperOp::Not => {
            buf.emit("XOR", vec![Operand::Const("0xffffffff".into())]);
        }
        HelperOp::Notl => {
            let true_tag = arena.new_tag();
            buf.emit_c("OR", vec![Operand::Imm(0)], "F=A");
            buf.emit("JZ", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(0)]);
            buf.emit("RET", vec![]);
            buf.emit("TAG", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
        }
        HelperOp::Andl => {
            let ret_tag = arena.new_tag();
            buf.emit_c("OR", vec![Operand::Imm(0)], "F=A");
            buf.emit("JZ", vec![Operand::Tag(ret_tag)]);
            buf.emit("LDA", vec![scr0()]);
            buf.emit_c("OR", vec![Operand::Imm(0)], "F=A");
            buf.emit("JZ", vec![Operand::Tag(ret_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
            buf.emit("TAG", vec![Operand::Tag(ret_tag)]);
        }
        HelperOp::Orl => {
            let true_tag = arena.new_tag();
            buf.emit("OR", vec![scr0()]);
            buf.emit("JNZ", vec![Operand::Tag(true_tag)]);
            buf.emit("RET", vec![]);
            buf.emit("TAG", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
        }
        HelperOp::Eq => {
            let true_tag = arena.new_tag();
            buf.emit("CMP", vec![scr0()]);
            buf.emit("JZ", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(0)]);
            buf.emit("RET", vec![]);
            buf.emit("TAG", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
        }
        HelperOp::Ne => {
            let true_tag = arena.new_tag();
            buf.emit("CMP", vec![scr0()]);
            buf.emit("JNZ", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(0)]);
            buf.emit("RET", vec![]);
            buf.emit("TAG", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
        }
        HelperOp::Gt => {
            let false_tag = arena.new_tag();
            buf.emit("CMP", vec![scr0()]);
            buf.emit("JZ", vec![Operand::Tag(false_tag)]);
            buf.emit("JM", vec![Operand::Tag(false_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
            buf.emit("RET", vec![]);
            buf.emit("TAG", vec![Operand::Tag(false_tag)]);
            buf.emit("LDA", vec![Operand::Imm(0)]);
        }
        HelperOp::Ge => {
            let true_tag = arena.new_tag();
            buf.emit("CMP", vec![scr0()]);
            buf.emit("JP", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(0)]);
            buf.emit("RET", vec![]);
            buf.emit("TAG", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
        }
        HelperOp::Lt => {
            let true_tag = arena.new_tag();
            buf.emit("CMP", vec![scr0()]);
            buf.emit("JM", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(0)]);
            buf.emit("RET", vec![]);
            buf.emit("TAG", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
        }
        HelperOp::Le => {
            let true_tag = arena.new_tag();
            buf.emit("CMP", vec![scr0()]);
            buf.emit("JZ", vec![Operand::Tag(true_tag)]);
            buf.emit("JM", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(0)]);
            buf.emit("RET", vec![]);
            buf.emit("TAG", vec![Operand::Tag(true_tag)]);
            buf.emit("LDA", vec![Operand::Imm(1)]);
        }
    }
    buf.emit("RET", vec![]);
    Helper { entry, buf }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(op: HelperOp) -> Vec<String> {
        let mut arena = AsmArena::new();
        let mut lib = HelperLib::new();
        let mut out = AsmBuffer::new();
        lib.emit_call(op, &mut out, &mut arena);
        let helper = lib.get(op).unwrap();
        helper.buf.bind_tags(&mut arena, 10);
        helper.buf.render(&arena, false)
    }

    #[test]
    fn test_helpers_are_lazy_singletons() {
        let mut arena = AsmArena::new();
        let mut lib = HelperLib::new();
        let mut out = AsmBuffer::new();
        assert!(lib.is_empty());
        lib.emit_call(HelperOp::Eq, &mut out, &mut arena);
        lib.emit_call(HelperOp::Eq, &mut out, &mut arena);
        lib.emit_call(HelperOp::Lt, &mut out, &mut arena);
        // two distinct helpers, three call sites
        assert_eq!(lib.entry_tags().count(), 2);
        assert_eq!(out.stmts().len(), 3);
    }

    #[test]
    fn test_neg_body() {
        assert_eq!(
            render(HelperOp::Neg),
            vec!["TAG 10", "    XOR   0xffffffff", "    ADD   1", "    RET"]
        );
    }

    #[test]
    fn test_notl_returns_zero_or_one() {
        let body = render(HelperOp::Notl);
        assert_eq!(
            body,
            vec![
                "TAG 10",
                "    OR    0",
                "    JZ    11",
                "    LDA   0",
                "    RET",
                "TAG 11",
                "    LDA   1",
                "    RET",
            ]
        );
    }

    #[test]
    fn test_andl_checks_both_operands() {
        let body = render(HelperOp::Andl);
        assert_eq!(
            body,
            vec![
                "TAG 10",
                "    OR    0",
                "    JZ    11",
                "    LDA   v0",
                "    OR    0",
                "    JZ    11",
                "    LDA   1",
                "TAG 11",
                "    RET",
            ]
        );
    }

    #[test]
    fn test_orl_combines_with_or() {
        let body = render(HelperOp::Orl);
        assert_eq!(
            body,
            vec![
                "TAG 10",
                "    OR    v0",
                "    JNZ   11",
                "    RET",
                "TAG 11",
                "    LDA   1",
                "    RET",
            ]
        );
    }

    #[test]
    fn test_comparison_bodies_use_cmp() {
        for op in [HelperOp::Eq, HelperOp::Ne, HelperOp::Gt, HelperOp::Ge, HelperOp::Lt, HelperOp::Le] {
            let body = render(op);
            assert_eq!(body[1], "    CMP   v0", "{:?}", op);
            assert_eq!(*body.last().unwrap(), "    RET", "{:?}", op);
            // every comparison returns exactly 0 or 1
            assert!(body.contains(&"    LDA   0".to_string()), "{:?}", op);
            assert!(body.contains(&"    LDA   1".to_string()), "{:?}", op);
        }
    }

    #[test]
    fn test_gt_falls_to_false_on_zero_or_minus() {
        let body = render(HelperOp::Gt);
        assert_eq!(
            body,
            vec![
                "TAG 10",
                "    CMP   v0",
                "    JZ    11",
                "    JM    11",
                "    LDA   1",
                "    RET",
                "TAG 11",
                "    LDA   0",
                "    RET",
            ]
        );
    }
}
