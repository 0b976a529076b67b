//! Function and prototype model.
//!
//! User-defined functions own their entry label, argument variables, and
//! statement buffer; VM API functions carry the VM mnemonic instead. Both
//! share prototype parsing, which accepts `unsigned` spellings only for the
//! VM API (matching the shipped `vm_api.h`).

use std::collections::{HashMap, HashSet};

use cfront::{Coord, FuncDecl, TypeName};

use crate::asm::{AsmArena, AsmBuffer, Operand, TagId, VarId};
use crate::error::PccError;
use crate::vm_api;

/// The supported C types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CType {
    Int,
    Long,
    Void,
    Unsigned,
    UnsignedInt,
    UnsignedLong,
}

impl std::fmt::Display for CType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CType::Int => "int",
            CType::Long => "long",
            CType::Void => "void",
            CType::Unsigned => "unsigned",
            CType::UnsignedInt => "unsigned int",
            CType::UnsignedLong => "unsigned long",
        };
        write!(f, "{}", text)
    }
}

/// Validate a written type against the supported set.
pub fn parse_ctype(
    type_name: &TypeName,
    accept_void: bool,
    accept_uint: bool,
) -> Result<CType, PccError> {
    let names: Vec<&str> = type_name.names.iter().map(String::as_str).collect();
    let ctype = match names.as_slice() {
        ["int"] => Some(CType::Int),
        ["long"] => Some(CType::Long),
        ["void"] if accept_void => Some(CType::Void),
        ["unsigned"] if accept_uint => Some(CType::Unsigned),
        ["unsigned", "int"] if accept_uint => Some(CType::UnsignedInt),
        ["unsigned", "long"] if accept_uint => Some(CType::UnsignedLong),
        _ => None,
    };
    ctype.ok_or_else(|| {
        PccError::at(
            type_name.coord,
            format!("unsupported type \"{}\"", type_name.spelled()),
        )
    })
}

/// Parse an integer constant as spelled in source or produced by constant
/// folding: decimal (optionally negative) or `0x` hex.
pub fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Return type and argument types of a function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub ret: CType,
    pub args: Vec<CType>,
}

impl Prototype {
    /// Parse a prototype from the declaration. `(void)` and `()` both mean
    /// "no arguments".
    pub fn parse(decl: &FuncDecl, accept_uint: bool) -> Result<Prototype, PccError> {
        let ret = parse_ctype(&decl.ret, true, accept_uint)?;
        let args = match &decl.params {
            None => Vec::new(),
            Some(params) => {
                if params.len() == 1
                    && parse_ctype(&params[0].ctype, true, accept_uint)? == CType::Void
                {
                    Vec::new()
                } else {
                    params
                        .iter()
                        .map(|p| parse_ctype(&p.ctype, false, accept_uint))
                        .collect::<Result<Vec<_>, _>>()?
                }
            }
        };
        Ok(Prototype { ret, args })
    }

    pub fn has_return(&self) -> bool {
        self.ret != CType::Void
    }
}

/// A user-defined C function.
#[derive(Debug)]
pub struct UserFunction {
    pub name: String,
    pub proto: Prototype,
    pub decl_coord: Coord,
    /// Whether the implementation has been compiled yet
    pub defined: bool,
    /// Entry point label, the `CALL` target
    pub entry: TagId,
    /// Argument variables in declaration order
    pub arg_vars: Vec<VarId>,
    /// Compiled body
    pub buf: AsmBuffer,
    /// User-defined static labels from inline `asm()` statements
    pub static_labels: HashMap<String, TagId>,
    /// Names of functions that call this one
    pub callers: HashSet<String>,
}

impl UserFunction {
    pub fn new(
        name: &str,
        proto: Prototype,
        decl_coord: Coord,
        arena: &mut AsmArena,
    ) -> Result<Self, PccError> {
        if name == "main" {
            if proto.has_return() {
                return Err(PccError::at(
                    decl_coord,
                    "return type other than \"void\" is not supported for main()",
                ));
            }
            if !proto.args.is_empty() {
                return Err(PccError::at(
                    decl_coord,
                    "function arguments are not supported for main()",
                ));
            }
        }
        let arg_vars = proto.args.iter().map(|_| arena.new_var()).collect();
        Ok(UserFunction {
            name: name.to_string(),
            proto,
            decl_coord,
            defined: false,
            entry: arena.new_tag(),
            arg_vars,
            buf: AsmBuffer::new(),
            static_labels: HashMap::new(),
            callers: HashSet::new(),
        })
    }
}

/// A VM API function: one C name mapped to one VM instruction.
#[derive(Debug, Clone)]
pub struct VmApiFunction {
    pub name: String,
    pub proto: Prototype,
    pub mnemonic: &'static str,
}

impl VmApiFunction {
    pub fn new(name: &str, proto: Prototype, decl_coord: Coord) -> Result<Self, PccError> {
        let mnemonic = vm_api::vm_instruction(name).ok_or_else(|| {
            PccError::at(decl_coord, format!("undefined VM function \"{}\"", name))
        })?;
        Ok(VmApiFunction {
            name: name.to_string(),
            proto,
            mnemonic,
        })
    }

    /// Apply the per-argument literal remap, when this function has one.
    ///
    /// Returns `Ok(None)` when the argument position has no remap and no
    /// compile-time constant was supplied; the caller then falls back to term
    /// or register staging.
    pub fn map_argument(
        &self,
        index: usize,
        constant: Option<String>,
        coord: Coord,
    ) -> Result<Option<Operand>, PccError> {
        let remap: Option<&str> = match (self.name.as_str(), index) {
            // int gpioSetMode(unsigned gpio, unsigned mode), 2nd argument:
            //   0..7 = PI_INPUT PI_OUTPUT PI_ALT5 PI_ALT4 PI_ALT0..PI_ALT3
            ("gpioSetMode", 1) => Some("RW540123"),
            // int gpioSetPullUpDown(unsigned gpio, unsigned pud), 2nd
            // argument: 0..2 = PI_PUD_OFF PI_PUD_DOWN PI_PUD_UP
            ("gpioSetPullUpDown", 1) => Some("ODU"),
            _ => None,
        };
        match remap {
            None => Ok(constant.map(Operand::Const)),
            Some(chars) => {
                let constant = constant.ok_or_else(|| {
                    PccError::at(
                        coord,
                        format!(
                            "{}: compile-time constant required for 2nd argument",
                            self.decl_str()
                        ),
                    )
                })?;
                match parse_int(&constant) {
                    Some(value) if value >= 0 && (value as usize) < chars.len() => {
                        let ch = chars.as_bytes()[value as usize] as char;
                        Ok(Some(Operand::Str(ch.to_string())))
                    }
                    _ => Ok(Some(Operand::Const(constant))),
                }
            }
        }
    }

    pub fn decl_str(&self) -> String {
        decl_str(&self.name, &self.proto)
    }
}

/// `int f(int, long)` rendering for comments and diagnostics.
pub fn decl_str(name: &str, proto: &Prototype) -> String {
    let args = proto
        .args
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} {}({})", proto.ret, name, args)
}

/// Entry in the compiler's function table.
#[derive(Debug)]
pub enum Function {
    User(UserFunction),
    VmApi(VmApiFunction),
}

impl Function {
    pub fn proto(&self) -> &Prototype {
        match self {
            Function::User(f) => &f.proto,
            Function::VmApi(f) => &f.proto,
        }
    }

    pub fn is_vm(&self) -> bool {
        matches!(self, Function::VmApi(_))
    }

    /// Same kind and identical return/argument types.
    pub fn matches(&self, other: &Function) -> bool {
        self.is_vm() == other.is_vm() && self.proto() == other.proto()
    }
}

/// Fallback name for unnamed function parameters, unique per position and
/// impossible to collide with a C identifier.
pub fn anonymous_arg_name(func_name: &str, index: usize) -> String {
    format!(".{}.{}", func_name, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_name(names: &[&str]) -> TypeName {
        TypeName {
            names: names.iter().map(|s| s.to_string()).collect(),
            quals: Vec::new(),
            coord: Coord::new(1, 1),
        }
    }

    #[test]
    fn test_parse_ctype_user_set() {
        assert_eq!(parse_ctype(&type_name(&["int"]), false, false), Ok(CType::Int));
        assert_eq!(parse_ctype(&type_name(&["long"]), false, false), Ok(CType::Long));
        assert!(parse_ctype(&type_name(&["void"]), false, false).is_err());
        assert!(parse_ctype(&type_name(&["unsigned"]), false, false).is_err());
        assert!(parse_ctype(&type_name(&["float"]), true, true).is_err());
    }

    #[test]
    fn test_parse_ctype_vm_set() {
        assert_eq!(
            parse_ctype(&type_name(&["unsigned"]), false, true),
            Ok(CType::Unsigned)
        );
        assert_eq!(
            parse_ctype(&type_name(&["unsigned", "long"]), false, true),
            Ok(CType::UnsignedLong)
        );
    }

    #[test]
    fn test_parse_int_decimal_and_hex() {
        assert_eq!(parse_int("10"), Some(10));
        assert_eq!(parse_int("-3"), Some(-3));
        assert_eq!(parse_int("0x1f"), Some(31));
        assert_eq!(parse_int("0Xff"), Some(255));
        assert_eq!(parse_int("x"), None);
    }

    #[test]
    fn test_main_prototype_constraints() {
        let mut arena = AsmArena::new();
        let bad_ret = Prototype { ret: CType::Int, args: vec![] };
        let err = UserFunction::new("main", bad_ret, Coord::new(1, 1), &mut arena).unwrap_err();
        assert!(err.message.contains("main()"));
        let bad_args = Prototype { ret: CType::Void, args: vec![CType::Int] };
        assert!(UserFunction::new("main", bad_args, Coord::new(1, 1), &mut arena).is_err());
        let good = Prototype { ret: CType::Void, args: vec![] };
        assert!(UserFunction::new("main", good, Coord::new(1, 1), &mut arena).is_ok());
    }

    #[test]
    fn test_vm_function_must_exist_in_table() {
        let proto = Prototype { ret: CType::Int, args: vec![CType::Unsigned] };
        assert!(VmApiFunction::new("gpioRead", proto.clone(), Coord::new(1, 1)).is_ok());
        let err = VmApiFunction::new("gpioBogus", proto, Coord::new(1, 1)).unwrap_err();
        assert!(err.message.contains("undefined VM function"));
    }

    #[test]
    fn test_set_mode_argument_remap() {
        let proto = Prototype {
            ret: CType::Int,
            args: vec![CType::Unsigned, CType::Unsigned],
        };
        let f = VmApiFunction::new("gpioSetMode", proto, Coord::new(1, 1)).unwrap();
        let coord = Coord::new(1, 1);
        // in-range constants remap to mode letters
        assert_eq!(
            f.map_argument(1, Some("1".into()), coord).unwrap(),
            Some(Operand::Str("W".into()))
        );
        assert_eq!(
            f.map_argument(1, Some("0".into()), coord).unwrap(),
            Some(Operand::Str("R".into()))
        );
        // out-of-range constants pass through unchanged
        assert_eq!(
            f.map_argument(1, Some("9".into()), coord).unwrap(),
            Some(Operand::Const("9".into()))
        );
        // the gpio argument has no remap
        assert_eq!(f.map_argument(0, None, coord).unwrap(), None);
        // a non-constant mode is an error
        let err = f.map_argument(1, None, coord).unwrap_err();
        assert!(err.message.contains("compile-time constant required"));
    }

    #[test]
    fn test_pull_up_down_argument_remap() {
        let proto = Prototype {
            ret: CType::Int,
            args: vec![CType::Unsigned, CType::Unsigned],
        };
        let f = VmApiFunction::new("gpioSetPullUpDown", proto, Coord::new(1, 1)).unwrap();
        let coord = Coord::new(1, 1);
        assert_eq!(
            f.map_argument(1, Some("2".into()), coord).unwrap(),
            Some(Operand::Str("U".into()))
        );
    }

    #[test]
    fn test_prototype_matching() {
        let mut arena = AsmArena::new();
        let proto = Prototype { ret: CType::Int, args: vec![CType::Int] };
        let a = Function::User(
            UserFunction::new("f", proto.clone(), Coord::new(1, 1), &mut arena).unwrap(),
        );
        let b = Function::User(
            UserFunction::new("f", proto.clone(), Coord::new(2, 1), &mut arena).unwrap(),
        );
        let c = Function::User(
            UserFunction::new(
                "f",
                Prototype { ret: CType::Long, args: vec![CType::Int] },
                Coord::new(3, 1),
                &mut arena,
            )
            .unwrap(),
        );
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }
}
