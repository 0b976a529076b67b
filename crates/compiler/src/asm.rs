//! Assembly-level building blocks: symbolic variables and tags, instruction
//! records, and the statement buffer with its peephole reducer.
//!
//! Variables and tags are arena handles that stay unbound while code is being
//! generated; the link pass assigns the final `vN` slots and tag numbers once
//! every buffer is known. Instructions reference handles, so rewriting a
//! branch target is a plain handle comparison rather than a text edit.

use std::collections::HashMap;

use cfront::Coord;
use indexmap::IndexSet;

/// General purpose (scratch) register
pub const SCR0: &str = "v0";
/// Function argument registers (ARG0 ... ARG2) for VM API calls
pub const ARG_REGS: [&str; 3] = ["v1", "v2", "v3"];

/// Mnemonics that take a single tag operand; `TAG` itself defines the label.
const TAG_MNEMONICS: [&str; 7] = ["TAG", "CALL", "JMP", "JNZ", "JZ", "JP", "JM"];

/// True when the (uppercase) mnemonic takes a single tag operand.
pub fn takes_tag_operand(mnemonic: &str) -> bool {
    TAG_MNEMONICS.contains(&mnemonic)
}

/// Handle for a symbolic branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(u32);

/// Handle for a symbolic VM variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(u32);

/// Declaration details attached to a variable handle, used for the `-c`
/// variable listing and for the global/local partition at bind time.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub ctype: String,
    pub cname: String,
    pub coord: Coord,
    /// Name of the owning function; `None` for file-scope variables
    pub owner: Option<String>,
}

#[derive(Debug, Default)]
struct VarSlot {
    bound: Option<u32>,
    info: Option<VarInfo>,
}

/// Owner of every variable and tag handle in one compilation session.
#[derive(Debug, Default)]
pub struct AsmArena {
    tags: Vec<Option<u32>>,
    vars: Vec<VarSlot>,
}

impl AsmArena {
    pub fn new() -> Self {
        AsmArena::default()
    }

    pub fn new_tag(&mut self) -> TagId {
        self.tags.push(None);
        TagId(self.tags.len() as u32 - 1)
    }

    pub fn new_var(&mut self) -> VarId {
        self.vars.push(VarSlot::default());
        VarId(self.vars.len() as u32 - 1)
    }

    pub fn bind_tag(&mut self, tag: TagId, number: u32) {
        self.tags[tag.0 as usize] = Some(number);
    }

    pub fn bind_var(&mut self, var: VarId, slot: u32) {
        self.vars[var.0 as usize].bound = Some(slot);
    }

    /// Attach declaration details to a handle. A handle belongs to exactly one
    /// declaration; a second attachment is a compiler bug.
    pub fn set_var_info(&mut self, var: VarId, info: VarInfo) {
        let slot = &mut self.vars[var.0 as usize];
        if slot.info.is_some() {
            panic!("internal error: variable handle is already attached to a declaration");
        }
        slot.info = Some(info);
    }

    pub fn var_info(&self, var: VarId) -> Option<&VarInfo> {
        self.vars[var.0 as usize].info.as_ref()
    }

    pub fn tag_text(&self, tag: TagId) -> String {
        match self.tags[tag.0 as usize] {
            Some(n) => n.to_string(),
            None => format!("<unbound:t{}>", tag.0),
        }
    }

    pub fn var_text(&self, var: VarId) -> String {
        match self.vars[var.0 as usize].bound {
            Some(n) => format!("v{}", n),
            None => format!("<unbound:v{}>", var.0),
        }
    }
}

/// One instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Compiler-generated integer (`OR 0`, `ADD 1`)
    Imm(i64),
    /// Source-written constant, spelling preserved (`10`, `0xffffffff`)
    Const(String),
    /// Short string argument for VM API instructions (`"W"`, `"U"`)
    Str(String),
    /// Script parameter `p0` ... `p9`
    Param(String),
    /// Reserved register (`v0` scratch, `v1..v3` call arguments)
    Reg(&'static str),
    Var(VarId),
    Tag(TagId),
}

impl Operand {
    fn render(&self, arena: &AsmArena) -> String {
        match self {
            Operand::Imm(v) => v.to_string(),
            Operand::Const(s) | Operand::Str(s) | Operand::Param(s) => s.clone(),
            Operand::Reg(r) => (*r).to_string(),
            Operand::Var(v) => arena.var_text(*v),
            Operand::Tag(t) => arena.tag_text(*t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub mnemonic: String,
    pub operands: Vec<Operand>,
    pub comment: Option<String>,
    /// True for `CALL`/`JMP`/`JNZ`/`JZ`/`JP`/`JM`
    pub is_branch: bool,
}

/// A statement is an instruction or a label; labels stay identity-stable so
/// the reducer can merge them by rewriting handles.
#[derive(Debug, Clone, PartialEq)]
pub enum AsmStmt {
    Instr(Instr),
    Tag { tag: TagId, comment: Option<String> },
}

impl AsmStmt {
    fn branch_target(&self) -> Option<TagId> {
        match self {
            AsmStmt::Instr(i) if i.is_branch => match i.operands.first() {
                Some(Operand::Tag(t)) => Some(*t),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Ordered statement sequence for one function, helper, or the init segment.
#[derive(Debug, Default, Clone)]
pub struct AsmBuffer {
    stmts: Vec<AsmStmt>,
}

impl AsmBuffer {
    pub fn new() -> Self {
        AsmBuffer::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    pub fn stmts(&self) -> &[AsmStmt] {
        &self.stmts
    }

    pub fn emit(&mut self, mnemonic: &str, operands: Vec<Operand>) {
        self.push_stmt(mnemonic, operands, None);
    }

    pub fn emit_c(&mut self, mnemonic: &str, operands: Vec<Operand>, comment: impl Into<String>) {
        self.push_stmt(mnemonic, operands, Some(comment.into()));
    }

    fn push_stmt(&mut self, mnemonic: &str, operands: Vec<Operand>, comment: Option<String>) {
        let mnemonic = mnemonic.to_ascii_uppercase();
        let tag_idx = TAG_MNEMONICS.iter().position(|m| *m == mnemonic);
        match tag_idx {
            None => self.stmts.push(AsmStmt::Instr(Instr {
                mnemonic,
                operands,
                comment,
                is_branch: false,
            })),
            Some(idx) => {
                let tag = match operands.as_slice() {
                    [Operand::Tag(t)] => *t,
                    _ => panic!(
                        "internal error: {} instruction expects a single tag operand",
                        mnemonic
                    ),
                };
                if idx == 0 {
                    self.stmts.push(AsmStmt::Tag { tag, comment });
                } else {
                    self.stmts.push(AsmStmt::Instr(Instr {
                        mnemonic,
                        operands,
                        comment,
                        is_branch: true,
                    }));
                }
            }
        }
    }

    /// Rewrite every branch operand equal to `from` into `to`. Label
    /// statements are never touched.
    pub(crate) fn rename_branch_targets(&mut self, from: TagId, to: TagId) {
        rename_slice(&mut self.stmts, from, to);
    }

    /// Single forward peephole pass over (previous, current) statement pairs.
    ///
    /// Returns the label renames that were applied, in order, so the caller
    /// can replay them on any other buffer that might branch into this one.
    pub fn reduce(&mut self) -> Vec<(TagId, TagId)> {
        let mut renames = Vec::new();
        if self.stmts.len() < 2 {
            return renames;
        }
        enum Action {
            Keep,
            DropCurr,
            /// Drop the previous statement, keep the current one
            SwapPrev,
            /// "TAG X + TAG Y": rename Y to X, drop the current label
            MergeLabels { from: TagId, to: TagId },
            /// "TAG X + JMP Y": rename X to Y; drop the jump too when the
            /// label was only reachable by falling out of an earlier jump
            FoldLabelJump {
                from: TagId,
                to: TagId,
                drop_both: bool,
            },
        }

        let mut input = std::mem::take(&mut self.stmts);
        let mut rest = input.split_off(1);
        let mut out: Vec<AsmStmt> = input;
        let mut i = 0;
        while i < rest.len() {
            let curr = rest[i].clone();
            let action = match (out.last(), &curr) {
                (Some(AsmStmt::Instr(p)), AsmStmt::Instr(c)) => {
                    if p.mnemonic == "RET" && c.mnemonic == "RET" {
                        // "RET + RET": drop the earlier one
                        Action::SwapPrev
                    } else if p.mnemonic == "JMP" && c.mnemonic == "JMP" {
                        // "JMP X + JMP Y": the second is unreachable
                        Action::DropCurr
                    } else if p.mnemonic == "STA"
                        && c.mnemonic == "LDA"
                        && p.operands == c.operands
                    {
                        // "STA X + LDA X": the accumulator already holds X
                        Action::DropCurr
                    } else {
                        Action::Keep
                    }
                }
                (Some(&AsmStmt::Tag { tag: x, .. }), &AsmStmt::Tag { tag: y, .. }) => {
                    Action::MergeLabels { from: y, to: x }
                }
                (Some(&AsmStmt::Tag { tag: x, .. }), AsmStmt::Instr(c))
                    if c.mnemonic == "JMP" =>
                {
                    let y = match c.operands.first() {
                        Some(Operand::Tag(t)) => *t,
                        _ => panic!("internal error: JMP without tag operand"),
                    };
                    // A label directly followed by a jump: everything that
                    // branches to the label may branch to the jump target
                    // instead. A self-targeting jump (empty endless loop)
                    // must keep its label.
                    if x != y {
                        let jmp_before_label = out.len() >= 2
                            && matches!(&out[out.len() - 2],
                                        AsmStmt::Instr(b) if b.mnemonic == "JMP");
                        Action::FoldLabelJump {
                            from: x,
                            to: y,
                            drop_both: jmp_before_label,
                        }
                    } else {
                        Action::Keep
                    }
                }
                (Some(AsmStmt::Instr(p)), &AsmStmt::Tag { tag: y, .. }) => {
                    // "JMP X + TAG X": fall through instead
                    if p.mnemonic == "JMP" && p.operands == vec![Operand::Tag(y)] {
                        Action::SwapPrev
                    } else {
                        Action::Keep
                    }
                }
                _ => Action::Keep,
            };
            match action {
                Action::Keep => out.push(curr),
                Action::DropCurr => {}
                Action::SwapPrev => {
                    out.pop();
                    out.push(curr);
                }
                Action::MergeLabels { from, to } => {
                    if from != to {
                        rename_slice(&mut out, from, to);
                        rename_slice(&mut rest[i + 1..], from, to);
                        renames.push((from, to));
                    }
                }
                Action::FoldLabelJump { from, to, drop_both } => {
                    rename_slice(&mut out, from, to);
                    rename_slice(&mut rest[i + 1..], from, to);
                    renames.push((from, to));
                    out.pop();
                    if !drop_both {
                        out.push(curr);
                    }
                }
            }
            i += 1;
        }
        self.stmts = out;
        renames
    }

    /// Delete label statements that no branch uses. `seed` must pre-credit
    /// every tag referenced from outside this buffer (function and helper
    /// entry labels).
    pub fn drop_unused_tags(&mut self, seed: &HashMap<TagId, u32>) {
        let mut counts = seed.clone();
        for stmt in &self.stmts {
            match stmt {
                AsmStmt::Tag { tag, .. } => {
                    counts.entry(*tag).or_insert(0);
                }
                _ => {
                    if let Some(target) = stmt.branch_target() {
                        *counts.entry(target).or_insert(0) += 1;
                    }
                }
            }
        }
        self.stmts.retain(|stmt| match stmt {
            AsmStmt::Tag { tag, .. } => counts.get(tag).copied().unwrap_or(0) != 0,
            _ => true,
        });
    }

    /// Assign `base`, `base + 1`, ... to this buffer's labels in statement
    /// order. Returns the number of labels bound.
    pub fn bind_tags(&self, arena: &mut AsmArena, base: u32) -> u32 {
        let mut count = 0;
        for stmt in &self.stmts {
            if let AsmStmt::Tag { tag, .. } = stmt {
                arena.bind_tag(*tag, base + count);
                count += 1;
            }
        }
        count
    }

    /// Partition variable operands by owning function, preserving first
    /// appearance order so slot assignment is deterministic.
    pub fn collect_vars(
        &self,
        arena: &AsmArena,
        globals: &mut IndexSet<VarId>,
        locals: &mut IndexSet<VarId>,
    ) {
        for stmt in &self.stmts {
            if let AsmStmt::Instr(instr) = stmt {
                for op in &instr.operands {
                    if let Operand::Var(var) = op {
                        let is_local = arena
                            .var_info(*var)
                            .map(|info| info.owner.is_some())
                            .unwrap_or(false);
                        if is_local {
                            locals.insert(*var);
                        } else {
                            globals.insert(*var);
                        }
                    }
                }
            }
        }
    }

    /// Render this buffer to assembly lines.
    pub fn render(&self, arena: &AsmArena, use_comments: bool) -> Vec<String> {
        self.stmts
            .iter()
            .map(|stmt| {
                let (line, comment) = match stmt {
                    AsmStmt::Tag { tag, comment } => {
                        (format!("TAG {}", arena.tag_text(*tag)), comment)
                    }
                    AsmStmt::Instr(instr) => {
                        let operands = instr
                            .operands
                            .iter()
                            .map(|op| op.render(arena))
                            .collect::<Vec<_>>()
                            .join(" ");
                        (format!("    {:<5} {}", instr.mnemonic, operands), &instr.comment)
                    }
                };
                match comment {
                    Some(c) if use_comments => format!("{:<24}; {}", line, c),
                    _ => line.trim_end().to_string(),
                }
            })
            .collect()
    }
}

fn rename_slice(stmts: &mut [AsmStmt], from: TagId, to: TagId) {
    for stmt in stmts {
        if let AsmStmt::Instr(instr) = stmt {
            if instr.is_branch {
                for op in &mut instr.operands {
                    if *op == Operand::Tag(from) {
                        *op = Operand::Tag(to);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(buf: &AsmBuffer, arena: &mut AsmArena) -> Vec<String> {
        buf.bind_tags(arena, 10);
        buf.render(arena, false)
    }

    #[test]
    fn test_emit_uppercases_and_routes_labels() {
        let mut arena = AsmArena::new();
        let tag = arena.new_tag();
        let mut buf = AsmBuffer::new();
        buf.emit("lda", vec![Operand::Imm(1)]);
        buf.emit("TAG", vec![Operand::Tag(tag)]);
        assert!(matches!(&buf.stmts()[0], AsmStmt::Instr(i) if i.mnemonic == "LDA"));
        assert!(matches!(&buf.stmts()[1], AsmStmt::Tag { .. }));
    }

    #[test]
    #[should_panic(expected = "internal error")]
    fn test_branch_without_tag_operand_is_a_bug() {
        let mut buf = AsmBuffer::new();
        buf.emit("JMP", vec![Operand::Imm(3)]);
    }

    #[test]
    fn test_reduce_double_ret() {
        let mut arena = AsmArena::new();
        let mut buf = AsmBuffer::new();
        buf.emit("LDA", vec![Operand::Imm(1)]);
        buf.emit("RET", vec![]);
        buf.emit("RET", vec![]);
        buf.reduce();
        assert_eq!(lines(&buf, &mut arena), vec!["    LDA   1", "    RET"]);
    }

    #[test]
    fn test_reduce_jump_shadowed_by_jump() {
        let mut arena = AsmArena::new();
        let (a, b) = (arena.new_tag(), arena.new_tag());
        let mut buf = AsmBuffer::new();
        buf.emit("LDA", vec![Operand::Imm(0)]);
        buf.emit("JMP", vec![Operand::Tag(a)]);
        buf.emit("JMP", vec![Operand::Tag(b)]);
        buf.emit("TAG", vec![Operand::Tag(a)]);
        buf.emit("TAG", vec![Operand::Tag(b)]);
        buf.reduce();
        // the second jump is dropped, "JMP a + TAG a" falls through, and the
        // two labels merge
        assert_eq!(lines(&buf, &mut arena), vec!["    LDA   0", "TAG 10"]);
    }

    #[test]
    fn test_reduce_store_then_load_same_target() {
        let mut arena = AsmArena::new();
        let v = arena.new_var();
        let w = arena.new_var();
        let mut buf = AsmBuffer::new();
        buf.emit("STA", vec![Operand::Var(v)]);
        buf.emit("LDA", vec![Operand::Var(v)]);
        buf.emit("STA", vec![Operand::Var(w)]);
        buf.emit("LDA", vec![Operand::Var(v)]);
        buf.reduce();
        arena.bind_var(v, 4);
        arena.bind_var(w, 5);
        assert_eq!(
            buf.render(&arena, false),
            vec!["    STA   v4", "    STA   v5", "    LDA   v4"]
        );
    }

    #[test]
    fn test_reduce_label_followed_by_jump() {
        let mut arena = AsmArena::new();
        let (x, y) = (arena.new_tag(), arena.new_tag());
        let mut buf = AsmBuffer::new();
        buf.emit("LDA", vec![Operand::Imm(0)]);
        buf.emit("JZ", vec![Operand::Tag(x)]);
        buf.emit("TAG", vec![Operand::Tag(x)]);
        buf.emit("JMP", vec![Operand::Tag(y)]);
        buf.emit("TAG", vec![Operand::Tag(y)]);
        buf.emit("RET", vec![]);
        let renames = buf.reduce();
        assert_eq!(renames, vec![(x, y)]);
        // JZ is redirected to y, the x label disappears, then "JMP y + TAG y"
        // falls through
        assert_eq!(
            lines(&buf, &mut arena),
            vec!["    LDA   0", "    JZ    10", "TAG 10", "    RET"]
        );
    }

    #[test]
    fn test_reduce_label_between_two_jumps_drops_both() {
        let mut arena = AsmArena::new();
        let (x, y, z) = (arena.new_tag(), arena.new_tag(), arena.new_tag());
        let mut buf = AsmBuffer::new();
        buf.emit("TAG", vec![Operand::Tag(z)]);
        buf.emit("JMP", vec![Operand::Tag(z)]);
        buf.emit("TAG", vec![Operand::Tag(x)]);
        buf.emit("JMP", vec![Operand::Tag(y)]);
        buf.emit("TAG", vec![Operand::Tag(y)]);
        buf.emit("RET", vec![]);
        buf.reduce();
        assert_eq!(
            lines(&buf, &mut arena),
            vec!["TAG 10", "    JMP   10", "TAG 11", "    RET"]
        );
    }

    #[test]
    fn test_reduce_keeps_self_targeting_loop() {
        let mut arena = AsmArena::new();
        let x = arena.new_tag();
        let mut buf = AsmBuffer::new();
        buf.emit("LDA", vec![Operand::Imm(0)]);
        buf.emit("TAG", vec![Operand::Tag(x)]);
        buf.emit("JMP", vec![Operand::Tag(x)]);
        buf.reduce();
        assert_eq!(
            lines(&buf, &mut arena),
            vec!["    LDA   0", "TAG 10", "    JMP   10"]
        );
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let mut arena = AsmArena::new();
        let (x, y) = (arena.new_tag(), arena.new_tag());
        let v = arena.new_var();
        let mut buf = AsmBuffer::new();
        buf.emit("STA", vec![Operand::Var(v)]);
        buf.emit("LDA", vec![Operand::Var(v)]);
        buf.emit("JZ", vec![Operand::Tag(x)]);
        buf.emit("TAG", vec![Operand::Tag(x)]);
        buf.emit("TAG", vec![Operand::Tag(y)]);
        buf.emit("JMP", vec![Operand::Tag(y)]);
        buf.emit("RET", vec![]);
        buf.emit("RET", vec![]);
        buf.reduce();
        let once = buf.clone();
        buf.reduce();
        assert_eq!(once.stmts(), buf.stmts());
    }

    #[test]
    fn test_drop_unused_tags_respects_seed() {
        let mut arena = AsmArena::new();
        let (entry, dead, used) = (arena.new_tag(), arena.new_tag(), arena.new_tag());
        let mut buf = AsmBuffer::new();
        buf.emit("TAG", vec![Operand::Tag(entry)]);
        buf.emit("TAG", vec![Operand::Tag(dead)]);
        buf.emit("JZ", vec![Operand::Tag(used)]);
        buf.emit("TAG", vec![Operand::Tag(used)]);
        buf.emit("RET", vec![]);
        let mut seed = HashMap::new();
        seed.insert(entry, 1);
        buf.drop_unused_tags(&seed);
        buf.bind_tags(&mut arena, 10);
        assert_eq!(
            buf.render(&arena, false),
            vec!["TAG 10", "    JZ    11", "TAG 11", "    RET"]
        );
    }

    #[test]
    fn test_bind_tags_returns_count_and_orders() {
        let mut arena = AsmArena::new();
        let (a, b) = (arena.new_tag(), arena.new_tag());
        let mut buf = AsmBuffer::new();
        buf.emit("TAG", vec![Operand::Tag(b)]);
        buf.emit("TAG", vec![Operand::Tag(a)]);
        let bound = buf.bind_tags(&mut arena, 30);
        assert_eq!(bound, 2);
        assert_eq!(arena.tag_text(b), "30");
        assert_eq!(arena.tag_text(a), "31");
    }

    #[test]
    fn test_collect_vars_partitions_and_keeps_order() {
        let mut arena = AsmArena::new();
        let g = arena.new_var();
        let l1 = arena.new_var();
        let l2 = arena.new_var();
        let coord = Coord::new(1, 1);
        arena.set_var_info(g, VarInfo {
            ctype: "int".into(), cname: "g".into(), coord, owner: None,
        });
        arena.set_var_info(l1, VarInfo {
            ctype: "int".into(), cname: "a".into(), coord, owner: Some("f".into()),
        });
        arena.set_var_info(l2, VarInfo {
            ctype: "int".into(), cname: "b".into(), coord, owner: Some("f".into()),
        });
        let mut buf = AsmBuffer::new();
        buf.emit("LDA", vec![Operand::Var(l2)]);
        buf.emit("ADD", vec![Operand::Var(g)]);
        buf.emit("STA", vec![Operand::Var(l1)]);
        buf.emit("LDA", vec![Operand::Var(l2)]);
        let mut globals = IndexSet::new();
        let mut locals = IndexSet::new();
        buf.collect_vars(&arena, &mut globals, &mut locals);
        assert_eq!(globals.into_iter().collect::<Vec<_>>(), vec![g]);
        assert_eq!(locals.into_iter().collect::<Vec<_>>(), vec![l2, l1]);
    }

    #[test]
    fn test_render_comment_column() {
        let mut arena = AsmArena::new();
        let mut buf = AsmBuffer::new();
        buf.emit_c("OR", vec![Operand::Imm(0)], "F=A");
        let with = buf.render(&arena, true);
        assert!(with[0].starts_with("    OR    0"));
        assert_eq!(with[0].find(';'), Some(24));
        assert!(with[0].ends_with("; F=A"));
        let without = buf.render(&arena, false);
        assert_eq!(without, vec!["    OR    0"]);
    }
}
