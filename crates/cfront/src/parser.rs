//! Recursive-descent parser for the restricted C dialect.
//!
//! The grammar is the subset the compiler supports: integer-typed variable and
//! enum declarations, function prototypes and definitions, the usual statement
//! forms, and expressions with C operator precedence. Constructs the dialect
//! excludes outright (pointers, arrays, structs, `?:`) fail here with a parse
//! error; constructs that parse but carry unsupported details (storage
//! classes, qualifiers, exotic types) are passed through for the compiler to
//! diagnose with full context.

use crate::ParseError;
use crate::ast::*;
use crate::token::{Token, TokenKind, tokenize};

const TYPE_SPECIFIERS: [&str; 9] = [
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
];
const TYPE_QUALIFIERS: [&str; 2] = ["const", "volatile"];
const STORAGE_CLASSES: [&str; 4] = ["extern", "static", "auto", "register"];

const KEYWORDS: [&str; 11] = [
    "if", "else", "while", "do", "for", "return", "continue", "break", "enum", "sizeof",
    "typedef",
];

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Parser {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    pub fn parse(&mut self) -> Result<TranslationUnit, ParseError> {
        let mut unit = TranslationUnit::default();
        while !self.at_eof() {
            self.parse_external_item(&mut unit.items)?;
        }
        Ok(unit)
    }

    // ------------------------------------------------------------------
    // Token helpers

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn coord(&self) -> Coord {
        let t = self.peek();
        Coord::new(t.line, t.column)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        t
    }

    fn check_punct(&self, p: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(q) if *q == p)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.check_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<Token, ParseError> {
        if self.check_punct(p) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected \"{}\", found {}", p, self.peek().describe())))
        }
    }

    fn check_keyword(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == word)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.check_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn ident_text(&self) -> Option<&str> {
        match &self.peek().kind {
            TokenKind::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<(String, Coord), ParseError> {
        let coord = self.coord();
        match &self.peek().kind {
            TokenKind::Ident(s) if !KEYWORDS.contains(&s.as_str()) => {
                let name = s.clone();
                self.advance();
                Ok((name, coord))
            }
            _ => Err(self.error_here(format!(
                "expected {}, found {}",
                what,
                self.peek().describe()
            ))),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let t = self.peek();
        ParseError {
            line: t.line,
            column: t.column,
            message: message.into(),
        }
    }

    // ------------------------------------------------------------------
    // Declarations

    fn is_decl_start(&self) -> bool {
        match self.ident_text() {
            Some(word) => {
                TYPE_SPECIFIERS.contains(&word)
                    || TYPE_QUALIFIERS.contains(&word)
                    || STORAGE_CLASSES.contains(&word)
                    || word == "enum"
            }
            None => false,
        }
    }

    fn parse_external_item(&mut self, items: &mut Vec<ExternalItem>) -> Result<(), ParseError> {
        if !self.is_decl_start() {
            return Err(self.error_here(format!(
                "expected declaration, found {}",
                self.peek().describe()
            )));
        }
        let (decls, funcdef) = self.parse_declaration_group(true)?;
        items.extend(decls.into_iter().map(ExternalItem::Decl));
        if let Some(def) = funcdef {
            items.push(ExternalItem::FuncDef(def));
        }
        Ok(())
    }

    /// Parse one declaration group: either an enum declaration, a function
    /// prototype, a function definition (when `allow_funcdef`), or a list of
    /// variable declarators sharing one type.
    fn parse_declaration_group(
        &mut self,
        allow_funcdef: bool,
    ) -> Result<(Vec<Decl>, Option<FuncDef>), ParseError> {
        let coord = self.coord();
        let mut storage = Vec::new();
        while let Some(word) = self.ident_text() {
            if STORAGE_CLASSES.contains(&word) {
                storage.push(word.to_string());
                self.advance();
            } else {
                break;
            }
        }

        if self.eat_keyword("enum") {
            let decl = self.parse_enum_decl(storage, coord)?;
            self.expect_punct(";")?;
            return Ok((vec![decl], None));
        }

        let ctype = self.parse_type_name()?;
        let (name, name_coord) = self.expect_name("identifier")?;

        if self.check_punct("(") {
            let params = self.parse_params()?;
            let decl = Decl {
                storage,
                kind: DeclKind::Func(FuncDecl {
                    name,
                    ret: ctype,
                    params,
                }),
                coord,
            };
            if self.eat_punct(";") {
                return Ok((vec![decl], None));
            }
            if self.check_punct("{") {
                if !allow_funcdef {
                    return Err(
                        self.error_here("function definitions are only allowed at file scope")
                    );
                }
                let body = self.parse_compound()?;
                return Ok((Vec::new(), Some(FuncDef { decl, body })));
            }
            return Err(self.error_here(format!(
                "expected \";\" or \"{{\", found {}",
                self.peek().describe()
            )));
        }

        // variable declarator list
        let mut decls = Vec::new();
        let mut decl_name = name;
        let mut decl_coord = name_coord;
        loop {
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push(Decl {
                storage: storage.clone(),
                kind: DeclKind::Var(VarDecl {
                    ctype: ctype.clone(),
                    name: decl_name,
                    init,
                }),
                coord: decl_coord,
            });
            if !self.eat_punct(",") {
                break;
            }
            let (next_name, next_coord) = self.expect_name("identifier")?;
            decl_name = next_name;
            decl_coord = next_coord;
        }
        self.expect_punct(";")?;
        Ok((decls, None))
    }

    fn parse_type_name(&mut self) -> Result<TypeName, ParseError> {
        let coord = self.coord();
        let mut names = Vec::new();
        let mut quals = Vec::new();
        while let Some(word) = self.ident_text() {
            if TYPE_SPECIFIERS.contains(&word) {
                names.push(word.to_string());
                self.advance();
            } else if TYPE_QUALIFIERS.contains(&word) {
                quals.push(word.to_string());
                self.advance();
            } else {
                break;
            }
        }
        if names.is_empty() {
            return Err(self.error_here(format!(
                "expected type specifier, found {}",
                self.peek().describe()
            )));
        }
        if self.check_punct("*") {
            return Err(self.error_here("pointer types are not supported"));
        }
        Ok(TypeName { names, quals, coord })
    }

    fn parse_enum_decl(&mut self, storage: Vec<String>, coord: Coord) -> Result<Decl, ParseError> {
        let name = if self.check_punct("{") {
            None
        } else {
            Some(self.expect_name("enum name")?.0)
        };
        self.expect_punct("{")?;
        let mut members = Vec::new();
        while !self.check_punct("}") {
            let (member_name, member_coord) = self.expect_name("enumerator name")?;
            let value = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            members.push(EnumMember {
                name: member_name,
                value,
                coord: member_coord,
            });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Decl {
            storage,
            kind: DeclKind::Enum(EnumDecl { name, members }),
            coord,
        })
    }

    fn parse_params(&mut self) -> Result<Option<Vec<ParamDecl>>, ParseError> {
        self.expect_punct("(")?;
        if self.eat_punct(")") {
            return Ok(None);
        }
        let mut params = Vec::new();
        loop {
            let coord = self.coord();
            let ctype = self.parse_type_name()?;
            let name = match self.ident_text() {
                Some(word) if !KEYWORDS.contains(&word) => {
                    let n = word.to_string();
                    self.advance();
                    Some(n)
                }
                _ => None,
            };
            params.push(ParamDecl { ctype, name, coord });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(Some(params))
    }

    // ------------------------------------------------------------------
    // Statements

    fn parse_compound(&mut self) -> Result<Block, ParseError> {
        let coord = self.coord();
        self.expect_punct("{")?;
        let mut items = Vec::new();
        while !self.check_punct("}") {
            if self.at_eof() {
                return Err(self.error_here("expected \"}\", found end of input"));
            }
            if self.is_decl_start() {
                let (decls, _) = self.parse_declaration_group(false)?;
                items.extend(decls.into_iter().map(BlockItem::Decl));
            } else {
                items.push(BlockItem::Stmt(self.parse_statement()?));
            }
        }
        self.expect_punct("}")?;
        Ok(Block { items, coord })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let coord = self.coord();
        if self.check_punct("{") {
            return Ok(Stmt::Compound(self.parse_compound()?));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty { coord });
        }
        if self.eat_keyword("if") {
            self.expect_punct("(")?;
            let cond = self.parse_expr()?;
            self.expect_punct(")")?;
            let then_branch = Box::new(self.parse_statement()?);
            let else_branch = if self.eat_keyword("else") {
                Some(Box::new(self.parse_statement()?))
            } else {
                None
            };
            return Ok(Stmt::If {
                cond,
                then_branch,
                else_branch,
                coord,
            });
        }
        if self.eat_keyword("while") {
            self.expect_punct("(")?;
            let cond = self.parse_expr()?;
            self.expect_punct(")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::While { cond, body, coord });
        }
        if self.eat_keyword("do") {
            let body = Box::new(self.parse_statement()?);
            if !self.eat_keyword("while") {
                return Err(self.error_here(format!(
                    "expected \"while\", found {}",
                    self.peek().describe()
                )));
            }
            self.expect_punct("(")?;
            let cond = self.parse_expr()?;
            self.expect_punct(")")?;
            self.expect_punct(";")?;
            return Ok(Stmt::DoWhile { body, cond, coord });
        }
        if self.eat_keyword("for") {
            return self.parse_for(coord);
        }
        if self.eat_keyword("return") {
            let value = if self.check_punct(";") {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect_punct(";")?;
            return Ok(Stmt::Return { value, coord });
        }
        if self.eat_keyword("continue") {
            self.expect_punct(";")?;
            return Ok(Stmt::Continue { coord });
        }
        if self.eat_keyword("break") {
            self.expect_punct(";")?;
            return Ok(Stmt::Break { coord });
        }
        let expr = self.parse_expr()?;
        self.expect_punct(";")?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_for(&mut self, coord: Coord) -> Result<Stmt, ParseError> {
        self.expect_punct("(")?;
        let init = if self.eat_punct(";") {
            None
        } else if self.is_decl_start() {
            // the declaration group consumes the terminating ";"
            let (decls, _) = self.parse_declaration_group(false)?;
            Some(ForInit::Decls(decls))
        } else {
            let e = self.parse_expr()?;
            self.expect_punct(";")?;
            Some(ForInit::Expr(e))
        };
        let cond = if self.check_punct(";") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(";")?;
        let mut step = Vec::new();
        if !self.check_punct(")") {
            loop {
                step.push(self.parse_expr()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
            coord,
        })
    }

    // ------------------------------------------------------------------
    // Expressions

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_binary(1)?;
        let op = match &self.peek().kind {
            TokenKind::Punct("=") => Some(None),
            TokenKind::Punct("+=") => Some(Some(BinaryOp::Add)),
            TokenKind::Punct("-=") => Some(Some(BinaryOp::Sub)),
            TokenKind::Punct("*=") => Some(Some(BinaryOp::Mul)),
            TokenKind::Punct("/=") => Some(Some(BinaryOp::Div)),
            TokenKind::Punct("%=") => Some(Some(BinaryOp::Mod)),
            TokenKind::Punct("&=") => Some(Some(BinaryOp::BitAnd)),
            TokenKind::Punct("|=") => Some(Some(BinaryOp::BitOr)),
            TokenKind::Punct("^=") => Some(Some(BinaryOp::BitXor)),
            TokenKind::Punct("<<=") => Some(Some(BinaryOp::Shl)),
            TokenKind::Punct(">>=") => Some(Some(BinaryOp::Shr)),
            _ => None,
        };
        match op {
            Some(op) => {
                let coord = lhs.coord();
                self.advance();
                let value = Box::new(self.parse_assignment()?);
                Ok(Expr::Assign {
                    op,
                    target: Box::new(lhs),
                    value,
                    coord,
                })
            }
            None => Ok(lhs),
        }
    }

    fn binary_op_here(&self) -> Option<(BinaryOp, u8)> {
        let p = match &self.peek().kind {
            TokenKind::Punct(p) => *p,
            _ => return None,
        };
        let entry = match p {
            "||" => (BinaryOp::LogOr, 1),
            "&&" => (BinaryOp::LogAnd, 2),
            "|" => (BinaryOp::BitOr, 3),
            "^" => (BinaryOp::BitXor, 4),
            "&" => (BinaryOp::BitAnd, 5),
            "==" => (BinaryOp::Eq, 6),
            "!=" => (BinaryOp::Ne, 6),
            "<" => (BinaryOp::Lt, 7),
            ">" => (BinaryOp::Gt, 7),
            "<=" => (BinaryOp::Le, 7),
            ">=" => (BinaryOp::Ge, 7),
            "<<" => (BinaryOp::Shl, 8),
            ">>" => (BinaryOp::Shr, 8),
            "+" => (BinaryOp::Add, 9),
            "-" => (BinaryOp::Sub, 9),
            "*" => (BinaryOp::Mul, 10),
            "/" => (BinaryOp::Div, 10),
            "%" => (BinaryOp::Mod, 10),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, prec)) = self.binary_op_here() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let coord = lhs.coord();
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                coord,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let coord = self.coord();
        let op = match &self.peek().kind {
            TokenKind::Punct("++") => Some(UnaryOp::PreInc),
            TokenKind::Punct("--") => Some(UnaryOp::PreDec),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("-") => Some(UnaryOp::Minus),
            TokenKind::Punct("~") => Some(UnaryOp::BitNot),
            TokenKind::Punct("!") => Some(UnaryOp::LogNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary { op, expr, coord });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check_punct("(") {
                let callee = match &expr {
                    Expr::Ident { name, coord } => (name.clone(), *coord),
                    _ => {
                        return Err(self.error_here("expected function name before \"(\""));
                    }
                };
                self.advance();
                let mut args = Vec::new();
                if !self.check_punct(")") {
                    loop {
                        args.push(self.parse_assignment()?);
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                }
                self.expect_punct(")")?;
                expr = Expr::Call {
                    callee: callee.0,
                    args,
                    coord: callee.1,
                };
            } else if self.check_punct("++") {
                self.advance();
                let coord = expr.coord();
                expr = Expr::Unary {
                    op: UnaryOp::PostInc,
                    expr: Box::new(expr),
                    coord,
                };
            } else if self.check_punct("--") {
                self.advance();
                let coord = expr.coord();
                expr = Expr::Unary {
                    op: UnaryOp::PostDec,
                    expr: Box::new(expr),
                    coord,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let coord = self.coord();
        match &self.peek().kind {
            TokenKind::IntLit(v) => {
                let value = v.clone();
                self.advance();
                Ok(Expr::IntLit { value, coord })
            }
            TokenKind::StrLit(v) => {
                let value = v.clone();
                self.advance();
                Ok(Expr::StrLit { value, coord })
            }
            TokenKind::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::Ident { name, coord })
            }
            TokenKind::Punct("(") => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            _ => Err(self.error_here(format!(
                "expected expression, found {}",
                self.peek().describe()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> TranslationUnit {
        Parser::new(source).unwrap().parse().unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        match Parser::new(source) {
            Ok(mut p) => p.parse().unwrap_err(),
            Err(e) => e,
        }
    }

    fn first_stmt(unit: &TranslationUnit) -> &Stmt {
        match &unit.items[0] {
            ExternalItem::FuncDef(def) => match &def.body.items[0] {
                BlockItem::Stmt(s) => s,
                other => panic!("expected statement, got {:?}", other),
            },
            other => panic!("expected function definition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_variable_declarations() {
        let unit = parse_ok("int a; long b = 2, c;");
        assert_eq!(unit.items.len(), 3);
        match &unit.items[1] {
            ExternalItem::Decl(d) => match &d.kind {
                DeclKind::Var(v) => {
                    assert_eq!(v.name, "b");
                    assert_eq!(v.ctype.spelled(), "long");
                    assert!(v.init.is_some());
                }
                other => panic!("expected variable, got {:?}", other),
            },
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_extern_parameter() {
        let unit = parse_ok("extern int A_p0;");
        match &unit.items[0] {
            ExternalItem::Decl(d) => {
                assert_eq!(d.storage, vec!["extern".to_string()]);
                assert!(matches!(&d.kind, DeclKind::Var(v) if v.name == "A_p0"));
            }
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_prototype_and_definition() {
        let unit = parse_ok("int f(int x, long y); void main(void) { f(1, 2); }");
        match &unit.items[0] {
            ExternalItem::Decl(d) => match &d.kind {
                DeclKind::Func(f) => {
                    assert_eq!(f.name, "f");
                    assert_eq!(f.params.as_ref().unwrap().len(), 2);
                    assert_eq!(f.params.as_ref().unwrap()[1].name.as_deref(), Some("y"));
                }
                other => panic!("expected function, got {:?}", other),
            },
            other => panic!("expected declaration, got {:?}", other),
        }
        assert!(matches!(&unit.items[1], ExternalItem::FuncDef(_)));
    }

    #[test]
    fn test_parse_unspecified_params_differs_from_void() {
        let unit = parse_ok("int f(); int g(void);");
        let params = |item: &ExternalItem| match item {
            ExternalItem::Decl(d) => match &d.kind {
                DeclKind::Func(f) => f.params.clone(),
                other => panic!("expected function, got {:?}", other),
            },
            other => panic!("expected declaration, got {:?}", other),
        };
        assert!(params(&unit.items[0]).is_none());
        let g = params(&unit.items[1]).unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g[0].ctype.spelled(), "void");
        assert!(g[0].name.is_none());
    }

    #[test]
    fn test_parse_enum_with_values() {
        let unit = parse_ok("enum { A, B = 3, C };");
        match &unit.items[0] {
            ExternalItem::Decl(d) => match &d.kind {
                DeclKind::Enum(e) => {
                    assert!(e.name.is_none());
                    assert_eq!(e.members.len(), 3);
                    assert!(e.members[0].value.is_none());
                    assert!(e.members[1].value.is_some());
                }
                other => panic!("expected enum, got {:?}", other),
            },
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let unit = parse_ok("void main(void) { x = 1 + 2 * 3 == 7 && 1; }");
        let stmt = first_stmt(&unit);
        // ((1 + (2 * 3)) == 7) && 1
        match stmt {
            Stmt::Expr(Expr::Assign { op: None, value, .. }) => match value.as_ref() {
                Expr::Binary { op: BinaryOp::LogAnd, left, .. } => match left.as_ref() {
                    Expr::Binary { op: BinaryOp::Eq, left, .. } => {
                        assert!(matches!(
                            left.as_ref(),
                            Expr::Binary { op: BinaryOp::Add, .. }
                        ));
                    }
                    other => panic!("expected ==, got {:?}", other),
                },
                other => panic!("expected &&, got {:?}", other),
            },
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_prefix_and_postfix() {
        let unit = parse_ok("void main(void) { x = ++a; y = a--; }");
        match first_stmt(&unit) {
            Stmt::Expr(Expr::Assign { value, .. }) => {
                assert!(matches!(
                    value.as_ref(),
                    Expr::Unary { op: UnaryOp::PreInc, .. }
                ));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_with_decl_and_step_list() {
        let unit = parse_ok("void main(void) { for (int i = 0; i < 10; i = i + 1, j = j + 1) ; }");
        match first_stmt(&unit) {
            Stmt::For { init, cond, step, .. } => {
                assert!(matches!(init, Some(ForInit::Decls(d)) if d.len() == 1));
                assert!(cond.is_some());
                assert_eq!(step.len(), 2);
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_do_while() {
        let unit = parse_ok("void main(void) { do { x = 1; } while (x); }");
        assert!(matches!(first_stmt(&unit), Stmt::DoWhile { .. }));
    }

    #[test]
    fn test_parse_asm_call_with_string() {
        let unit = parse_ok("void main(void) { asm(\"LDAP\", 0); }");
        match first_stmt(&unit) {
            Stmt::Expr(Expr::Call { callee, args, .. }) => {
                assert_eq!(callee, "asm");
                assert!(matches!(&args[0], Expr::StrLit { value, .. } if value == "LDAP"));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pointer_rejected() {
        let err = parse_err("int *p;");
        assert!(err.message.contains("pointer"));
    }

    #[test]
    fn test_parse_missing_semicolon() {
        let err = parse_err("int a");
        assert!(err.message.contains("expected"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_parse_conditional_operator_rejected() {
        let err = parse_err("void main(void) { x = a ? 1 : 2; }");
        assert!(err.message.contains("expected"));
    }
}
