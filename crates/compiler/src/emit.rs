//! Assembly text emission.

use std::path::Path;

use crate::asm::VarId;
use crate::codegen::Pcc;

impl Pcc {
    /// Render the linked program to assembly text. With `use_comments`, a
    /// leading block documents every variable slot and instruction comments
    /// are included.
    pub fn encode_asm(&self, use_comments: bool) -> String {
        let mut lines: Vec<String> = Vec::new();
        if use_comments {
            lines.push("; VM variables:".to_string());
            lines.push(";".to_string());
            lines.push(";  v0: reserved: SCR0".to_string());
            lines.push(";  v1: reserved: ARG0".to_string());
            lines.push(";  v2: reserved: ARG1".to_string());
            lines.push(";  v3: reserved: ARG2".to_string());
            for var in &self.bound_vars {
                lines.push(self.format_var_comment(*var));
            }
        }
        for buf in &self.buffers {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.extend(buf.render(&self.arena, use_comments));
        }
        lines.join("\n")
    }

    /// `;  v4: blink.c:3:5: int main.i` line for the `-c` variable block.
    fn format_var_comment(&self, var: VarId) -> String {
        let slot = self.arena.var_text(var);
        let Some(info) = self.arena.var_info(var) else {
            return format!("; {:>3}:", slot);
        };
        let (file, row) = self.sources.map_coord(info.coord.line);
        let file = file
            .map(|name| {
                Path::new(name)
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.to_string())
            })
            .unwrap_or_default();
        let fqname = match &info.owner {
            Some(func) => format!("{}.{}", func, info.cname),
            None => info.cname.clone(),
        };
        format!(
            "; {:>3}: {}:{}:{}: {} {}",
            slot, file, row, info.coord.column, info.ctype, fqname
        )
    }
}
