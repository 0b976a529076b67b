//! The link pass: sequence buffers, run the peephole reduction, and bind the
//! symbolic handles to the VM's numeric namespaces.
//!
//! Buffer order is init segment, retained user functions in declaration
//! order, then the materialized helpers. Tag numbers are packed contiguously
//! within each buffer and rounded up to the next multiple of 10 between
//! buffers, starting at 10. Variable slots start after the reserved
//! `v0..v3`: globals in first-appearance order, then locals.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::asm::{ARG_REGS, AsmBuffer, Operand, TagId, VarId};
use crate::codegen::{LinkPlan, Pcc};
use crate::functions::Function;

impl Pcc {
    pub(crate) fn link(&mut self, plan: &LinkPlan, do_reduce: bool) {
        // one use per function and helper entry label, so entry labels
        // survive the unused-tag sweep even before their callers are scanned
        let mut seed: HashMap<TagId, u32> = HashMap::new();
        for name in &plan.functions {
            if let Some(Function::User(f)) = self.functions.get(name) {
                seed.insert(f.entry, 1);
            }
        }
        for entry in self.helpers.entry_tags() {
            seed.insert(entry, 1);
        }
        let main_entry = match self.functions.get("main") {
            Some(Function::User(f)) => f.entry,
            _ => panic!("internal error: linking without a main function"),
        };

        let mut bufs: Vec<AsmBuffer> = Vec::new();
        bufs.push(std::mem::take(&mut self.out));
        for name in &plan.functions {
            if let Some(Function::User(f)) = self.functions.get_mut(name) {
                bufs.push(std::mem::take(&mut f.buf));
            }
        }
        bufs.extend(self.helpers.take_buffers());

        for i in 0..bufs.len() {
            bufs[i].drop_unused_tags(&seed);
            if do_reduce {
                // label renames must reach every buffer that branches here
                let renames = bufs[i].reduce();
                for (from, to) in renames {
                    for (j, buf) in bufs.iter_mut().enumerate() {
                        if j != i {
                            buf.rename_branch_targets(from, to);
                        }
                    }
                }
            }
        }

        // run the file-scope initializers, then hand over to main
        bufs[0].emit_c("CALL", vec![Operand::Tag(main_entry)], "main();");
        bufs[0].emit("HALT", vec![]);

        let mut tag_count: u32 = 0;
        let mut base: u32 = 10;
        for buf in &bufs {
            let bound = buf.bind_tags(&mut self.arena, base);
            tag_count += bound;
            base = ((base + bound + 10) / 10) * 10;
        }

        let mut globals: IndexSet<VarId> = IndexSet::new();
        let mut locals: IndexSet<VarId> = IndexSet::new();
        for buf in &bufs {
            buf.collect_vars(&self.arena, &mut globals, &mut locals);
        }
        let ordered: Vec<VarId> = globals.into_iter().chain(locals).collect();
        let mut var_count = 1 + ARG_REGS.len();
        for var in &ordered {
            self.arena.bind_var(*var, var_count as u32);
            var_count += 1;
        }

        self.tag_count = tag_count as usize;
        self.var_count = var_count;
        self.bound_vars = ordered;
        self.buffers = bufs;
    }
}
