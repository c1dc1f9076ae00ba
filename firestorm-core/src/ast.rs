//! Abstract syntax tree produced by the parser.
//!
//! The tree is strictly owned: every node owns its children and there is
//! no sharing between subtrees. Declaration order inside [`Global`] is
//! the order the items appeared in the flattened source.

use std::fmt;

use crate::types::Datatype;

/// Root of a compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Global {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Variable(GlobalVariable),
    Offset(Offset),
    Function(Function),
}

/// A datatype paired with the identifier it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedDatatype {
    pub name: String,
    pub datatype: Datatype,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    pub var: NamedDatatype,
    pub init: Option<Expr>,
}

/// Byte layout description; every entry becomes an integer constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offset {
    pub name: String,
    pub entries: Vec<NamedDatatype>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    External,
    NoReturn,
    Assembly,
}

impl Attribute {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "external" => Some(Attribute::External),
            "noreturn" => Some(Attribute::NoReturn),
            "assembly" => Some(Attribute::Assembly),
            _ => None,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Attribute::External => "external",
            Attribute::NoReturn => "noreturn",
            Attribute::Assembly => "assembly",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<NamedDatatype>,
    pub return_type: Datatype,
    pub body: Vec<Stmt>,
    pub attributes: Vec<Attribute>,
    /// Raw text of an `assembly` function body.
    pub assembly: Option<String>,
}

impl Function {
    pub fn has_attribute(&self, attribute: Attribute) -> bool {
        self.attributes.contains(&attribute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    /// Decoded bytes of a string literal, without the terminating NUL.
    Str(Vec<u8>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call(Call),
    Lookup(String),
    LookupIndexed {
        name: String,
        index: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Declare {
        var: NamedDatatype,
        init: Option<Expr>,
    },
    Assign {
        name: String,
        value: Expr,
    },
    AssignIndexed {
        name: String,
        index: Expr,
        value: Expr,
    },
    Increment(String),
    Decrease(String),
    Call(Call),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
    },
    Loop {
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    /// End-of-execution hook, replayed on every exit of the function.
    End {
        body: Vec<Stmt>,
    },
}
