//! AST to assembly compilation.
//!
//! [`Pcc`] is one compilation session: it owns the symbol scope, the function
//! table, the handle arena, and the output buffers, and walks the parsed
//! translation unit producing instructions into the buffer of whatever
//! function is currently being compiled (or the init segment at file scope).
//!
//! Register discipline: the accumulator holds every expression result; the
//! scratch register `v0` stages second operands; `v1..v3` pass arguments to
//! VM API calls. The zero flag only reliably mirrors the accumulator after
//! arithmetic, so a conditional branch is always preceded by `OR 0` unless
//! the flag is already known to be accumulator-valued.

use std::collections::HashSet;
use std::sync::LazyLock;

use cfront::{
    BinaryOp, Block, BlockItem, Coord, Decl, DeclKind, EnumDecl, Expr, ExternalItem, ForInit,
    FuncDecl, FuncDef, Stmt, TranslationUnit, UnaryOp,
};
use indexmap::IndexMap;
use regex::Regex;

use crate::asm::{
    ARG_REGS, AsmArena, AsmBuffer, Operand, SCR0, TagId, VarId, VarInfo, takes_tag_operand,
};
use crate::emulated::{HelperLib, HelperOp};
use crate::error::PccError;
use crate::functions::{
    CType, Function, Prototype, UserFunction, VmApiFunction, anonymous_arg_name, decl_str,
    parse_ctype, parse_int,
};
use crate::sources::SourceBundle;
use crate::symbols::{Scope, Symbol};

static PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:.*_)?(p[0-9])(?:_.*)?$").unwrap());

/// How a binary operator lowers: a native VM instruction or a helper call.
enum Lowering {
    Native(&'static str),
    Emulated(HelperOp),
}

fn binary_lowering(op: BinaryOp) -> Lowering {
    match op {
        BinaryOp::Add => Lowering::Native("ADD"),
        BinaryOp::Sub => Lowering::Native("SUB"),
        BinaryOp::Mul => Lowering::Native("MLT"),
        BinaryOp::Div => Lowering::Native("DIV"),
        BinaryOp::Mod => Lowering::Native("MOD"),
        BinaryOp::BitAnd => Lowering::Native("AND"),
        BinaryOp::BitOr => Lowering::Native("OR"),
        BinaryOp::BitXor => Lowering::Native("XOR"),
        BinaryOp::Shl => Lowering::Native("RLA"),
        BinaryOp::Shr => Lowering::Native("RRA"),
        BinaryOp::LogAnd => Lowering::Emulated(HelperOp::Andl),
        BinaryOp::LogOr => Lowering::Emulated(HelperOp::Orl),
        BinaryOp::Eq => Lowering::Emulated(HelperOp::Eq),
        BinaryOp::Ne => Lowering::Emulated(HelperOp::Ne),
        BinaryOp::Gt => Lowering::Emulated(HelperOp::Gt),
        BinaryOp::Ge => Lowering::Emulated(HelperOp::Ge),
        BinaryOp::Lt => Lowering::Emulated(HelperOp::Lt),
        BinaryOp::Le => Lowering::Emulated(HelperOp::Le),
    }
}

#[derive(Debug)]
struct FuncContext {
    name: String,
    has_return: bool,
}

/// Retained user functions in declaration order (including `main`), computed
/// after the translation unit is compiled.
pub(crate) struct LinkPlan {
    pub functions: Vec<String>,
}

/// Pre-fetched callee details, so call lowering does not hold a borrow into
/// the function table while it emits code.
enum CalleeInfo {
    Vm(VmApiFunction),
    User {
        name: String,
        entry: TagId,
        arg_vars: Vec<VarId>,
        has_return: bool,
    },
}

/// One compilation session.
#[derive(Debug)]
pub struct Pcc {
    pub(crate) sources: SourceBundle,
    diagnostics: Vec<String>,
    error_count: usize,
    pub(crate) arena: AsmArena,
    /// The buffer code is currently emitted into: the init segment at file
    /// scope, the function's own buffer inside a definition
    pub(crate) out: AsmBuffer,
    stashed_init: AsmBuffer,
    scope: Scope,
    pub(crate) functions: IndexMap<String, Function>,
    pub(crate) helpers: HelperLib,
    in_expression: bool,
    context: Option<FuncContext>,
    loop_stack: Vec<(Option<TagId>, Option<TagId>)>,
    continue_tag: Option<TagId>,
    break_tag: Option<TagId>,
    // link products
    pub(crate) buffers: Vec<AsmBuffer>,
    pub(crate) bound_vars: Vec<VarId>,
    pub(crate) var_count: usize,
    pub(crate) tag_count: usize,
}

impl Pcc {
    pub fn new(sources: SourceBundle) -> Self {
        Pcc {
            sources,
            diagnostics: Vec::new(),
            error_count: 0,
            arena: AsmArena::new(),
            out: AsmBuffer::new(),
            stashed_init: AsmBuffer::new(),
            scope: Scope::new(),
            functions: IndexMap::new(),
            helpers: HelperLib::new(),
            in_expression: false,
            context: None,
            loop_stack: Vec::new(),
            continue_tag: None,
            break_tag: None,
            buffers: Vec::new(),
            bound_vars: Vec::new(),
            var_count: 0,
            tag_count: 0,
        }
    }

    /// Compile a parsed translation unit. Returns the error count; emission
    /// only happens when it is zero.
    pub fn compile(&mut self, unit: &TranslationUnit, do_reduce: bool) -> usize {
        self.compile_translation_unit(unit);
        let plan = self.analyze_functions();
        if self.error_count == 0 {
            self.link(&plan, do_reduce);
        }
        self.error_count
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Number of VM variable slots in use, including the reserved `v0..v3`.
    pub fn var_count(&self) -> usize {
        self.var_count
    }

    pub fn tag_count(&self) -> usize {
        self.tag_count
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    // ------------------------------------------------------------------
    // Diagnostics

    fn log_error(&mut self, e: &PccError) {
        self.push_diagnostic(e.coord, &format!("error: {}", e.message));
        self.error_count += 1;
    }

    fn log_warning(&mut self, coord: Coord, message: &str) {
        self.push_diagnostic(Some(coord), &format!("warning: {}", message));
    }

    fn push_diagnostic(&mut self, coord: Option<Coord>, message: &str) {
        let ctx = self.context.as_ref().map(|c| c.name.clone());
        let text = match coord {
            Some(c) => self
                .sources
                .format_message(c.line, c.column, message, ctx.as_deref()),
            None => message.to_string(),
        };
        self.diagnostics.push(text);
    }

    // ------------------------------------------------------------------
    // Scope and loop context

    fn push_scope(&mut self) {
        self.scope.push();
    }

    fn pop_scope(&mut self) {
        self.scope.pop();
    }

    fn push_loop_tags(&mut self, continue_tag: TagId, break_tag: TagId) {
        self.loop_stack.push((self.continue_tag, self.break_tag));
        self.continue_tag = Some(continue_tag);
        self.break_tag = Some(break_tag);
    }

    fn pop_loop_tags(&mut self) {
        match self.loop_stack.pop() {
            Some((c, b)) => {
                self.continue_tag = c;
                self.break_tag = b;
            }
            None => panic!("internal error: loop tag stack underflow"),
        }
    }

    fn bind_symbol(&mut self, coord: Coord, name: &str, symbol: Symbol) -> Result<(), PccError> {
        if self.scope.bind(name, symbol) {
            Ok(())
        } else {
            Err(PccError::at(coord, format!("redefinition of \"{}\"", name)))
        }
    }

    // ------------------------------------------------------------------
    // Declarations

    fn declare_enum(&mut self, decl: &EnumDecl) -> Result<(), PccError> {
        let mut cursor: i64 = 0;
        for member in &decl.members {
            let value = match &member.value {
                None => {
                    let v = cursor.to_string();
                    cursor += 1;
                    v
                }
                Some(expr) => {
                    let v = self
                        .try_parse_constant(expr)
                        .ok_or_else(|| PccError::at(expr.coord(), "unsupported enum syntax"))?;
                    cursor = parse_int(&v)
                        .ok_or_else(|| PccError::at(expr.coord(), "unsupported enum syntax"))?
                        + 1;
                    v
                }
            };
            self.bind_symbol(member.coord, &member.name, Symbol::EnumConst { value })?;
        }
        Ok(())
    }

    fn declare_variable(
        &mut self,
        coord: Coord,
        ctype: CType,
        cname: &str,
        existing: Option<VarId>,
    ) -> Result<VarId, PccError> {
        let var = existing.unwrap_or_else(|| self.arena.new_var());
        self.arena.set_var_info(
            var,
            VarInfo {
                ctype: ctype.to_string(),
                cname: cname.to_string(),
                coord,
                owner: self.context.as_ref().map(|c| c.name.clone()),
            },
        );
        self.bind_symbol(coord, cname, Symbol::Var { var })?;
        Ok(var)
    }

    fn declare_parameter(&mut self, coord: Coord, cname: &str) -> Result<String, PccError> {
        let register = PARAM_NAME
            .captures(cname)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| {
                PccError::at(
                    coord,
                    "external variable names must contain one of \"p0\", \"p1\", ..., \"p9\"",
                )
            })?;
        self.bind_symbol(
            coord,
            cname,
            Symbol::Param {
                register: register.clone(),
            },
        )?;
        Ok(register)
    }

    fn declare_function(
        &mut self,
        decl: &Decl,
        func_decl: &FuncDecl,
        is_vm: bool,
    ) -> Result<String, PccError> {
        let proto = Prototype::parse(func_decl, is_vm)?;
        let name = func_decl.name.clone();
        let function = if is_vm {
            Function::VmApi(VmApiFunction::new(&name, proto, decl.coord)?)
        } else {
            Function::User(UserFunction::new(&name, proto, decl.coord, &mut self.arena)?)
        };
        match self.functions.get(&name) {
            None => {
                self.functions.insert(name.clone(), function);
            }
            Some(existing) => {
                if !function.matches(existing) {
                    return Err(PccError::at(
                        decl.coord,
                        "function prototype conflicts with previous declaration",
                    ));
                }
            }
        }
        // an existing function symbol is reused; anything else shadowing the
        // name in the innermost frame is a redefinition
        if let Some(Symbol::Func { .. }) = self.scope.lookup(&name) {
            return Ok(name);
        }
        self.bind_symbol(decl.coord, &name, Symbol::Func { name: name.clone() })?;
        Ok(name)
    }

    // ------------------------------------------------------------------
    // Constants and terms

    /// Recognize a compile-time integer constant: a literal, an enum
    /// constant, or a negation of either. The value keeps its spelling.
    fn try_parse_constant(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::IntLit { value, .. } => Some(value.clone()),
            Expr::Ident { name, .. } => match self.scope.lookup(name) {
                Some(Symbol::EnumConst { value }) => Some(value.clone()),
                _ => None,
            },
            Expr::Unary {
                op: UnaryOp::Minus,
                expr,
                ..
            } => match expr.as_ref() {
                Expr::IntLit { value, .. } => parse_int(value).map(|v| (-v).to_string()),
                Expr::Ident { name, .. } => match self.scope.lookup(name) {
                    Some(Symbol::EnumConst { value }) => {
                        parse_int(value).map(|v| (-v).to_string())
                    }
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    /// Recognize an expression usable directly as an instruction operand: a
    /// constant, a declared variable, or a parameter. An identifier that is
    /// neither is an error.
    fn try_parse_term(&self, expr: &Expr) -> Result<Option<Operand>, PccError> {
        if let Some(value) = self.try_parse_constant(expr) {
            return Ok(Some(Operand::Const(value)));
        }
        if let Expr::Ident { name, coord } = expr {
            return match self.scope.lookup(name) {
                Some(Symbol::Var { var }) => Ok(Some(Operand::Var(*var))),
                Some(Symbol::Param { register }) => Ok(Some(Operand::Param(register.clone()))),
                _ => Err(PccError::at(
                    *coord,
                    format!("undeclared variable \"{}\"", name),
                )),
            };
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Expressions

    /// Compile an expression; result in the accumulator.
    fn compile_expression(&mut self, expr: &Expr) -> Result<(), PccError> {
        if let Some(term) = self.try_parse_term(expr)? {
            self.out.emit("LDA", vec![term]);
            return Ok(());
        }
        match expr {
            Expr::Unary { .. } | Expr::Binary { .. } | Expr::Assign { .. } | Expr::Call { .. } => {
                let prev = self.in_expression;
                self.in_expression = true;
                let result = self.compile_expr_node(expr);
                self.in_expression = prev;
                result.map(|_| ())
            }
            _ => Err(PccError::at(expr.coord(), "unsupported expression syntax")),
        }
    }

    /// Compile an assignment into `dst`. With `op` this is a compound
    /// assignment (`+=` etc).
    fn compile_assignment(
        &mut self,
        dst: Operand,
        rhs: &Expr,
        op: Option<BinaryOp>,
    ) -> Result<(), PccError> {
        let rhs_term = self.try_parse_term(rhs)?;
        match op {
            None => {
                if let Some(term) = rhs_term {
                    self.out.emit("LD", vec![dst.clone(), term]);
                    if self.in_expression {
                        self.out.emit("LDA", vec![dst]);
                    }
                } else {
                    self.compile_expression(rhs)?;
                    self.out.emit("STA", vec![dst]);
                }
            }
            Some(op) => {
                let mnemonic = match binary_lowering(op) {
                    Lowering::Native(m) => m,
                    // C has no compound form of the logical/relational
                    // operators, so the parser never produces one
                    Lowering::Emulated(_) => {
                        panic!("internal error: compound assignment with emulated operator")
                    }
                };
                if let Some(term) = rhs_term {
                    self.out.emit("LDA", vec![dst.clone()]);
                    self.out.emit(mnemonic, vec![term]);
                } else {
                    self.compile_expression(rhs)?;
                    self.out.emit("STA", vec![Operand::Reg(SCR0)]);
                    self.out.emit("LDA", vec![dst.clone()]);
                    self.out.emit(mnemonic, vec![Operand::Reg(SCR0)]);
                }
                self.out.emit("STA", vec![dst]);
            }
        }
        Ok(())
    }

    /// Compile an expression-kind node (unary, binary, assignment, call) in
    /// statement position. Returns true when the statement terminates the
    /// block (a `HALT` or inline-asm `RET`).
    fn compile_expr_node(&mut self, expr: &Expr) -> Result<bool, PccError> {
        match expr {
            Expr::Unary {
                op,
                expr: operand,
                coord,
            } => {
                self.compile_unary(*op, operand, *coord)?;
                Ok(false)
            }
            Expr::Binary { op, left, right, .. } => {
                self.compile_binary(*op, left, right)?;
                Ok(false)
            }
            Expr::Assign {
                op, target, value, ..
            } => {
                let Expr::Ident { name, coord } = target.as_ref() else {
                    return Err(PccError::at(target.coord(), "unsupported assignment syntax"));
                };
                let dst = match self.scope.lookup(name) {
                    Some(Symbol::Var { var }) => Operand::Var(*var),
                    Some(Symbol::Param { register }) => Operand::Param(register.clone()),
                    _ => {
                        return Err(PccError::at(
                            *coord,
                            format!("undefined variable \"{}\"", name),
                        ));
                    }
                };
                self.compile_assignment(dst, value, *op)?;
                Ok(false)
            }
            Expr::Call { callee, args, coord } => self.compile_call(callee, args, *coord),
            _ => Err(PccError::at(expr.coord(), "unsupported statement syntax")),
        }
    }

    fn compile_unary(&mut self, op: UnaryOp, operand: &Expr, coord: Coord) -> Result<(), PccError> {
        match op {
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let Expr::Ident {
                    name,
                    coord: id_coord,
                } = operand
                else {
                    return Err(PccError::at(coord, "increment operator expects variable"));
                };
                let reg = match self.scope.lookup(name) {
                    Some(Symbol::Var { var }) => Operand::Var(*var),
                    Some(Symbol::Param { register }) => Operand::Param(register.clone()),
                    _ => {
                        return Err(PccError::at(
                            *id_coord,
                            format!("undefined variable \"{}\"", name),
                        ));
                    }
                };
                match op {
                    UnaryOp::PreInc => {
                        self.out.emit("INR", vec![reg.clone()]);
                        self.out.emit("LDA", vec![reg]);
                    }
                    UnaryOp::PreDec => {
                        self.out.emit("DCR", vec![reg.clone()]);
                        self.out.emit("LDA", vec![reg]);
                    }
                    UnaryOp::PostInc => {
                        // return the value before the increment
                        self.out.emit("LD", vec![Operand::Reg(SCR0), reg.clone()]);
                        self.out.emit("INR", vec![reg]);
                        self.out.emit("LDA", vec![Operand::Reg(SCR0)]);
                    }
                    UnaryOp::PostDec => {
                        self.out.emit("LD", vec![Operand::Reg(SCR0), reg.clone()]);
                        self.out.emit("DCR", vec![reg]);
                        self.out.emit("LDA", vec![Operand::Reg(SCR0)]);
                    }
                    _ => unreachable!(),
                }
            }
            UnaryOp::Plus => {
                self.compile_expression(operand)?;
            }
            UnaryOp::Minus => {
                self.compile_expression(operand)?;
                self.helpers
                    .emit_call(HelperOp::Neg, &mut self.out, &mut self.arena);
            }
            UnaryOp::BitNot => {
                self.compile_expression(operand)?;
                self.out
                    .emit("XOR", vec![Operand::Const("0xffffffff".into())]);
            }
            UnaryOp::LogNot => {
                self.compile_expression(operand)?;
                self.helpers
                    .emit_call(HelperOp::Notl, &mut self.out, &mut self.arena);
            }
        }
        Ok(())
    }

    fn compile_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<(), PccError> {
        self.compile_expression(left)?;
        let rhs_term = self.try_parse_term(right)?;
        match (binary_lowering(op), rhs_term) {
            (Lowering::Native(mnemonic), Some(term)) => {
                self.out.emit(mnemonic, vec![term]);
            }
            (Lowering::Emulated(helper), Some(term)) => {
                self.out.emit("LD", vec![Operand::Reg(SCR0), term]);
                self.helpers.emit_call(helper, &mut self.out, &mut self.arena);
            }
            (lowering, None) => {
                // the left value survives the right subexpression on the stack
                self.out.emit("PUSHA", vec![]);
                self.compile_expression(right)?;
                self.out.emit("STA", vec![Operand::Reg(SCR0)]);
                self.out.emit("POPA", vec![]);
                match lowering {
                    Lowering::Native(mnemonic) => {
                        self.out.emit(mnemonic, vec![Operand::Reg(SCR0)]);
                    }
                    Lowering::Emulated(helper) => {
                        self.helpers.emit_call(helper, &mut self.out, &mut self.arena);
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Calls

    fn compile_call(
        &mut self,
        callee: &str,
        args: &[Expr],
        coord: Coord,
    ) -> Result<bool, PccError> {
        if callee == "asm" {
            return self.compile_asm_call(args, coord);
        }
        let info = match self.scope.lookup(callee) {
            Some(Symbol::Func { name }) => match self.functions.get(name) {
                Some(Function::VmApi(f)) => CalleeInfo::Vm(f.clone()),
                Some(Function::User(f)) => CalleeInfo::User {
                    name: f.name.clone(),
                    entry: f.entry,
                    arg_vars: f.arg_vars.clone(),
                    has_return: f.proto.has_return(),
                },
                None => panic!("internal error: function symbol without table entry"),
            },
            _ => {
                return Err(PccError::at(
                    coord,
                    format!("undeclared function \"{}\"", callee),
                ));
            }
        };
        let (arg_count, has_return) = match &info {
            CalleeInfo::Vm(f) => (f.proto.args.len(), f.proto.has_return()),
            CalleeInfo::User {
                arg_vars,
                has_return,
                ..
            } => (arg_vars.len(), *has_return),
        };
        if self.in_expression && !has_return {
            return Err(PccError::at(coord, "function declared without return value"));
        }
        if arg_count != args.len() {
            return Err(PccError::at(
                coord,
                format!(
                    "function expects {} argument(s) instead of {}",
                    arg_count,
                    args.len()
                ),
            ));
        }
        match info {
            CalleeInfo::Vm(vm) => {
                let mut operands = Vec::new();
                for (i, arg) in args.iter().enumerate() {
                    let constant = self.try_parse_constant(arg);
                    let mut term = vm.map_argument(i, constant, arg.coord())?;
                    if term.is_none() {
                        term = self.try_parse_term(arg)?;
                    }
                    let operand = match term {
                        Some(t) => t,
                        None => {
                            // stage the computed value through an argument
                            // register
                            let reg = *ARG_REGS.get(i).ok_or_else(|| {
                                PccError::at(
                                    arg.coord(),
                                    "too many computed arguments for a VM function call",
                                )
                            })?;
                            self.compile_assignment(Operand::Reg(reg), arg, None)?;
                            Operand::Reg(reg)
                        }
                    };
                    operands.push(operand);
                }
                let terminated = vm.mnemonic == "HALT";
                self.out
                    .emit_c(vm.mnemonic, operands, format!("{}();", vm.name));
                Ok(terminated)
            }
            CalleeInfo::User {
                name,
                entry,
                arg_vars,
                ..
            } => {
                let caller = self
                    .context
                    .as_ref()
                    .map(|c| c.name.clone())
                    // file-scope initializer calls run from the init segment,
                    // which always reaches main
                    .unwrap_or_else(|| "main".to_string());
                if caller != name {
                    if let Some(Function::User(f)) = self.functions.get_mut(&name) {
                        f.callers.insert(caller);
                    }
                }
                for (i, arg) in args.iter().enumerate() {
                    self.compile_assignment(Operand::Var(arg_vars[i]), arg, None)?;
                }
                self.out
                    .emit_c("CALL", vec![Operand::Tag(entry)], format!("{}();", name));
                Ok(false)
            }
        }
    }

    /// `asm("MNEM", args...)` with a string mnemonic. Label-taking mnemonics
    /// resolve their argument through the function's static label map.
    fn compile_asm_call(&mut self, args: &[Expr], coord: Coord) -> Result<bool, PccError> {
        if args.is_empty() {
            return Err(PccError::at(coord, "asm() expects at least one argument"));
        }
        let mnemonic = match &args[0] {
            Expr::StrLit { value, .. } => value.to_ascii_uppercase(),
            other => {
                return Err(PccError::at(
                    other.coord(),
                    "asm() expects first argument to be a string constant",
                ));
            }
        };
        let mut operands = Vec::new();
        for arg in &args[1..] {
            let term = match arg {
                Expr::StrLit { value, .. } => Some(Operand::Str(value.clone())),
                _ => self.try_parse_term(arg)?,
            };
            match term {
                Some(t) => operands.push(t),
                None => {
                    return Err(PccError::at(
                        arg.coord(),
                        "asm() expects arguments to be variables, int or string constants",
                    ));
                }
            }
        }
        if takes_tag_operand(&mnemonic) {
            if operands.len() != 1 {
                return Err(PccError::at(
                    coord,
                    format!("{} expects a single tag label argument", mnemonic),
                ));
            }
            let label = match &operands[0] {
                Operand::Str(s) | Operand::Const(s) => s.clone(),
                _ => {
                    return Err(PccError::at(
                        args[1].coord(),
                        format!("{} expects a tag label argument", mnemonic),
                    ));
                }
            };
            let Some(ctx) = &self.context else {
                return Err(PccError::at(
                    coord,
                    "asm() tag labels are only allowed inside a function",
                ));
            };
            let arena = &mut self.arena;
            let tag = match self.functions.get_mut(&ctx.name) {
                Some(Function::User(f)) => *f
                    .static_labels
                    .entry(label)
                    .or_insert_with(|| arena.new_tag()),
                _ => panic!("internal error: function context without table entry"),
            };
            operands[0] = Operand::Tag(tag);
        }
        self.out.emit(&mnemonic, operands);
        Ok(mnemonic == "RET" || mnemonic == "HALT")
    }

    // ------------------------------------------------------------------
    // Statements

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<bool, PccError> {
        match stmt {
            Stmt::Expr(expr) => self.compile_expr_as_stmt(expr),
            Stmt::Compound(block) => self.compile_block(block),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => self.compile_if(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body, .. } => self.compile_while(cond, body),
            Stmt::DoWhile { body, cond, .. } => self.compile_do_while(body, cond),
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => self.compile_for(init.as_ref(), cond.as_ref(), step, body),
            Stmt::Return { value, coord } => self.compile_return(value.as_ref(), *coord),
            Stmt::Continue { coord } => match self.continue_tag {
                Some(tag) => {
                    self.out.emit("JMP", vec![Operand::Tag(tag)]);
                    Ok(false)
                }
                None => Err(PccError::at(*coord, "\"continue\" outside loop not allowed")),
            },
            Stmt::Break { coord } => match self.break_tag {
                Some(tag) => {
                    self.out.emit("JMP", vec![Operand::Tag(tag)]);
                    Ok(false)
                }
                None => Err(PccError::at(*coord, "\"break\" outside loop not allowed")),
            },
            Stmt::Empty { .. } => Ok(false),
        }
    }

    fn compile_expr_as_stmt(&mut self, expr: &Expr) -> Result<bool, PccError> {
        match expr {
            Expr::Unary { .. } | Expr::Binary { .. } | Expr::Assign { .. } | Expr::Call { .. } => {
                self.compile_expr_node(expr)
            }
            _ => Err(PccError::at(expr.coord(), "unsupported statement syntax")),
        }
    }

    fn compile_block(&mut self, block: &Block) -> Result<bool, PccError> {
        let mut returned = false;
        let mut unreachable = false;
        self.push_scope();
        for item in &block.items {
            if unreachable {
                let coord = match item {
                    BlockItem::Decl(d) => d.coord,
                    BlockItem::Stmt(s) => s.coord(),
                };
                self.log_warning(coord, "unreachable code");
                break;
            }
            let result = match item {
                BlockItem::Decl(decl) => self.compile_decl(decl),
                BlockItem::Stmt(stmt) => self.compile_stmt(stmt),
            };
            match result {
                Ok(item_returned) => {
                    if item_returned {
                        returned = true;
                    }
                    let leaves_loop = matches!(
                        item,
                        BlockItem::Stmt(Stmt::Continue { .. } | Stmt::Break { .. })
                    );
                    if item_returned || leaves_loop {
                        unreachable = true;
                    }
                }
                Err(e) => self.log_error(&e),
            }
        }
        self.pop_scope();
        Ok(returned)
    }

    fn compile_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<bool, PccError> {
        let endif_tag = self.arena.new_tag();
        self.compile_expression(cond)?;
        self.out.emit_c("OR", vec![Operand::Imm(0)], "F=A");
        match else_branch {
            None => {
                self.out.emit("JZ", vec![Operand::Tag(endif_tag)]);
                self.compile_stmt(then_branch)?;
                self.out.emit("TAG", vec![Operand::Tag(endif_tag)]);
                // without an else branch some path always falls through
                Ok(false)
            }
            Some(else_stmt) => {
                let else_tag = self.arena.new_tag();
                self.out.emit("JZ", vec![Operand::Tag(else_tag)]);
                let r1 = self.compile_stmt(then_branch)?;
                if !r1 {
                    self.out.emit("JMP", vec![Operand::Tag(endif_tag)]);
                }
                self.out.emit("TAG", vec![Operand::Tag(else_tag)]);
                let r2 = self.compile_stmt(else_stmt)?;
                self.out.emit("TAG", vec![Operand::Tag(endif_tag)]);
                Ok(r1 && r2)
            }
        }
    }

    fn compile_while(&mut self, cond: &Expr, body: &Stmt) -> Result<bool, PccError> {
        let begin_tag = self.arena.new_tag();
        let end_tag = self.arena.new_tag();
        self.push_loop_tags(begin_tag, end_tag);
        let result = self.compile_while_inner(begin_tag, end_tag, cond, body);
        self.pop_loop_tags();
        result
    }

    fn compile_while_inner(
        &mut self,
        begin_tag: TagId,
        end_tag: TagId,
        cond: &Expr,
        body: &Stmt,
    ) -> Result<bool, PccError> {
        self.out.emit("TAG", vec![Operand::Tag(begin_tag)]);
        self.compile_expression(cond)?;
        self.out.emit_c("OR", vec![Operand::Imm(0)], "F=A");
        self.out.emit("JZ", vec![Operand::Tag(end_tag)]);
        let returned = self.compile_stmt(body)?;
        self.out.emit("JMP", vec![Operand::Tag(begin_tag)]);
        self.out.emit("TAG", vec![Operand::Tag(end_tag)]);
        Ok(returned)
    }

    fn compile_do_while(&mut self, body: &Stmt, cond: &Expr) -> Result<bool, PccError> {
        let begin_tag = self.arena.new_tag();
        let end_tag = self.arena.new_tag();
        self.push_loop_tags(begin_tag, end_tag);
        let result = self.compile_do_while_inner(begin_tag, end_tag, body, cond);
        self.pop_loop_tags();
        result
    }

    fn compile_do_while_inner(
        &mut self,
        begin_tag: TagId,
        end_tag: TagId,
        body: &Stmt,
        cond: &Expr,
    ) -> Result<bool, PccError> {
        self.out.emit("TAG", vec![Operand::Tag(begin_tag)]);
        let returned = self.compile_stmt(body)?;
        self.compile_expression(cond)?;
        self.out.emit_c("OR", vec![Operand::Imm(0)], "F=A");
        self.out.emit("JNZ", vec![Operand::Tag(begin_tag)]);
        self.out.emit("TAG", vec![Operand::Tag(end_tag)]);
        Ok(returned)
    }

    fn compile_for(
        &mut self,
        init: Option<&ForInit>,
        cond: Option<&Expr>,
        step: &[Expr],
        body: &Stmt,
    ) -> Result<bool, PccError> {
        let begin_tag = self.arena.new_tag();
        let next_tag = self.arena.new_tag();
        let end_tag = self.arena.new_tag();
        // continue jumps to the iteration expression, not the condition
        self.push_loop_tags(next_tag, end_tag);
        let scoped = matches!(init, Some(ForInit::Decls(_)));
        if scoped {
            self.push_scope();
        }
        let result = self.compile_for_inner(begin_tag, next_tag, end_tag, init, cond, step, body);
        if scoped {
            self.pop_scope();
        }
        self.pop_loop_tags();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_for_inner(
        &mut self,
        begin_tag: TagId,
        next_tag: TagId,
        end_tag: TagId,
        init: Option<&ForInit>,
        cond: Option<&Expr>,
        step: &[Expr],
        body: &Stmt,
    ) -> Result<bool, PccError> {
        match init {
            Some(ForInit::Decls(decls)) => {
                for decl in decls {
                    self.compile_decl(decl)?;
                }
            }
            Some(ForInit::Expr(expr)) => {
                self.compile_expr_as_stmt(expr)?;
            }
            None => {}
        }
        self.out.emit("TAG", vec![Operand::Tag(begin_tag)]);
        if let Some(cond) = cond {
            self.compile_expression(cond)?;
            self.out.emit_c("OR", vec![Operand::Imm(0)], "F=A");
            self.out.emit("JZ", vec![Operand::Tag(end_tag)]);
        }
        let returned = self.compile_stmt(body)?;
        self.out.emit("TAG", vec![Operand::Tag(next_tag)]);
        for expr in step {
            self.compile_expression(expr)?;
        }
        self.out.emit("JMP", vec![Operand::Tag(begin_tag)]);
        self.out.emit("TAG", vec![Operand::Tag(end_tag)]);
        Ok(returned)
    }

    fn compile_return(&mut self, value: Option<&Expr>, coord: Coord) -> Result<bool, PccError> {
        let expected = self.context.as_ref().map(|c| c.has_return).unwrap_or(false);
        let given = value.is_some();
        if !expected && given {
            self.log_warning(coord, "function does not return a value");
        } else if expected && !given {
            self.log_warning(coord, "function should return a value");
        } else if let Some(expr) = value {
            self.compile_expression(expr)?;
        }
        self.out.emit("RET", vec![]);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Declarations in statement position and function definitions

    fn compile_decl(&mut self, decl: &Decl) -> Result<bool, PccError> {
        let is_extern = if decl.storage.is_empty() {
            false
        } else if decl.storage.len() == 1 && decl.storage[0] == "extern" {
            true
        } else {
            return Err(PccError::at(
                decl.coord,
                format!("unsupported storage qualifier \"{}\"", decl.storage.join(" ")),
            ));
        };
        match &decl.kind {
            DeclKind::Var(var_decl) => {
                if !var_decl.ctype.quals.is_empty() {
                    return Err(PccError::at(
                        decl.coord,
                        format!(
                            "unsupported type qualifier \"{}\"",
                            var_decl.ctype.quals.join(" ")
                        ),
                    ));
                }
                let ctype = parse_ctype(&var_decl.ctype, false, false).map_err(|_| {
                    PccError::at(
                        var_decl.ctype.coord,
                        format!("unsupported variable type \"{}\"", var_decl.ctype.spelled()),
                    )
                })?;
                let dst = if is_extern {
                    let register = self.declare_parameter(decl.coord, &var_decl.name)?;
                    Operand::Param(register)
                } else {
                    let var = self.declare_variable(decl.coord, ctype, &var_decl.name, None)?;
                    Operand::Var(var)
                };
                if let Some(init) = &var_decl.init {
                    self.compile_assignment(dst, init, None)?;
                }
            }
            DeclKind::Func(func_decl) => {
                self.declare_function(decl, func_decl, is_extern)?;
            }
            DeclKind::Enum(enum_decl) => {
                self.declare_enum(enum_decl)?;
            }
        }
        Ok(false)
    }

    fn compile_func_def(&mut self, def: &FuncDef) -> Result<bool, PccError> {
        let DeclKind::Func(func_decl) = &def.decl.kind else {
            panic!("internal error: function definition without function declarator");
        };
        let name = self.declare_function(&def.decl, func_decl, false)?;
        let (entry, arg_vars, arg_ctypes, has_return, signature) = match self.functions.get(&name)
        {
            Some(Function::User(f)) => {
                if f.defined {
                    return Err(PccError::at(
                        def.decl.coord,
                        format!("redefinition of \"{}\"", name),
                    ));
                }
                (
                    f.entry,
                    f.arg_vars.clone(),
                    f.proto.args.clone(),
                    f.proto.has_return(),
                    decl_str(&name, &f.proto),
                )
            }
            _ => {
                return Err(PccError::at(
                    def.decl.coord,
                    "function prototype conflicts with previous declaration",
                ));
            }
        };
        if let Some(Function::User(f)) = self.functions.get_mut(&name) {
            f.defined = true;
        }
        self.enter_function(&name, has_return);
        self.push_scope();
        let result = self.compile_func_body(
            def,
            func_decl,
            &name,
            entry,
            &arg_vars,
            &arg_ctypes,
            has_return,
            &signature,
        );
        if let Err(e) = result {
            self.log_error(&e);
        }
        self.pop_scope();
        self.leave_function(&name);
        Ok(false)
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_func_body(
        &mut self,
        def: &FuncDef,
        func_decl: &FuncDecl,
        name: &str,
        entry: TagId,
        arg_vars: &[VarId],
        arg_ctypes: &[CType],
        has_return: bool,
        signature: &str,
    ) -> Result<(), PccError> {
        self.out.emit_c("TAG", vec![Operand::Tag(entry)], signature);
        if !arg_vars.is_empty() {
            if let Some(params) = &func_decl.params {
                for (i, param) in params.iter().enumerate() {
                    let cname = param
                        .name
                        .clone()
                        .unwrap_or_else(|| anonymous_arg_name(name, i));
                    self.declare_variable(param.coord, arg_ctypes[i], &cname, Some(arg_vars[i]))?;
                }
            }
        }
        let returned = self.compile_block(&def.body)?;
        if !returned {
            if has_return {
                self.log_warning(def.decl.coord, "function should return a value");
            }
            self.out.emit("RET", vec![]);
        }
        Ok(())
    }

    fn enter_function(&mut self, name: &str, has_return: bool) {
        let buf = match self.functions.get_mut(name) {
            Some(Function::User(f)) => std::mem::take(&mut f.buf),
            _ => panic!("internal error: entering a non-user function"),
        };
        self.stashed_init = std::mem::replace(&mut self.out, buf);
        self.context = Some(FuncContext {
            name: name.to_string(),
            has_return,
        });
    }

    fn leave_function(&mut self, name: &str) {
        let buf = std::mem::replace(&mut self.out, std::mem::take(&mut self.stashed_init));
        if let Some(Function::User(f)) = self.functions.get_mut(name) {
            f.buf = buf;
        }
        self.context = None;
    }

    // ------------------------------------------------------------------
    // Translation unit driver

    fn compile_translation_unit(&mut self, unit: &TranslationUnit) {
        for item in &unit.items {
            let result = match item {
                ExternalItem::Decl(decl) => self.compile_decl(decl),
                ExternalItem::FuncDef(def) => self.compile_func_def(def),
            };
            if let Err(e) = result {
                self.log_error(&e);
            }
        }
    }

    /// Drop user functions that nothing calls (iterating to a fixpoint) and
    /// verify that every surviving function, main included, has an
    /// implementation.
    fn analyze_functions(&mut self) -> LinkPlan {
        let mut userdefs: Vec<String> = self
            .functions
            .iter()
            .filter(|(name, f)| matches!(f, Function::User(_)) && name.as_str() != "main")
            .map(|(name, _)| name.clone())
            .collect();
        loop {
            let mut dropped: HashSet<String> = HashSet::new();
            let mut passed: Vec<String> = Vec::new();
            for name in &userdefs {
                let uncalled = match self.functions.get(name) {
                    Some(Function::User(f)) => f.callers.is_empty(),
                    _ => true,
                };
                if uncalled {
                    dropped.insert(name.clone());
                } else {
                    passed.push(name.clone());
                }
            }
            if dropped.is_empty() {
                break;
            }
            for name in &passed {
                if let Some(Function::User(f)) = self.functions.get_mut(name) {
                    f.callers.retain(|caller| !dropped.contains(caller));
                }
            }
            userdefs = passed;
        }
        let mut errors: Vec<PccError> = Vec::new();
        for name in &userdefs {
            if let Some(Function::User(f)) = self.functions.get(name) {
                if !f.defined {
                    errors.push(PccError::at(
                        f.decl_coord,
                        format!("missing \"{}()\" function implementation", name),
                    ));
                }
            }
        }
        match self.functions.get("main") {
            Some(Function::User(f)) if f.defined => {}
            _ => errors.push(PccError::global("missing \"main()\" function implementation")),
        }
        for e in &errors {
            self.log_error(e);
        }
        let retained: HashSet<String> = userdefs.into_iter().collect();
        let functions = self
            .functions
            .iter()
            .filter(|(name, f)| {
                matches!(f, Function::User(_))
                    && (name.as_str() == "main" || retained.contains(name.as_str()))
            })
            .map(|(name, _)| name.clone())
            .collect();
        LinkPlan { functions }
    }
}
