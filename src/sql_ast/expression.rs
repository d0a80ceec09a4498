//! Scalar expressions and the explicit walkers the planner passes use.

use std::fmt;

use super::ObjectName;
use crate::utils::Ident;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    Binary(BinaryExpr),
    Function(FunctionExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

/// A dotted column reference of one to three parts: `column`,
/// `alias.column`, or `schema.alias.column`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub parts: Vec<Ident>,
}

impl ColumnRef {
    pub fn new(parts: Vec<Ident>) -> Self {
        ColumnRef { parts }
    }

    /// The qualifying alias, for two- and three-part references.
    pub fn qualifier(&self) -> Option<&Ident> {
        match self.parts.len() {
            2 => self.parts.first(),
            3 => self.parts.get(1),
            _ => None,
        }
    }

    pub fn column(&self) -> &Ident {
        self.parts.last().expect("column reference has no parts")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpr {
    pub name: ObjectName,
    pub args: Vec<Expr>,
}

impl Expr {
    pub fn column(parts: &[&str]) -> Expr {
        Expr::Column(ColumnRef::new(parts.iter().map(|p| Ident::new(*p)).collect()))
    }

    pub fn integer(value: i64) -> Expr {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Or, left, right)
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, left, right)
    }

    pub fn function(name: ObjectName, args: Vec<Expr>) -> Expr {
        Expr::Function(FunctionExpr { name, args })
    }

    /// Visit every column reference in evaluation order.
    pub fn for_each_column_ref<F: FnMut(&ColumnRef)>(&self, f: &mut F) {
        match self {
            Expr::Column(column) => f(column),
            Expr::Literal(_) => {}
            Expr::Binary(binary) => {
                binary.left.for_each_column_ref(f);
                binary.right.for_each_column_ref(f);
            }
            Expr::Function(function) => {
                for arg in &function.args {
                    arg.for_each_column_ref(f);
                }
            }
        }
    }

    /// Rewrite every column reference in place.
    pub fn rewrite_column_refs<F: FnMut(&mut ColumnRef)>(&mut self, f: &mut F) {
        match self {
            Expr::Column(column) => f(column),
            Expr::Literal(_) => {}
            Expr::Binary(binary) => {
                binary.left.rewrite_column_refs(f);
                binary.right.rewrite_column_refs(f);
            }
            Expr::Function(function) => {
                for arg in &mut function.args {
                    arg.rewrite_column_refs(f);
                }
            }
        }
    }
}

/// Split an expression into its top-level AND conjuncts.
pub fn conjuncts(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::Binary(binary) if binary.op == BinaryOp::And => {
            let mut out = conjuncts(&binary.left);
            out.extend(conjuncts(&binary.right));
            out
        }
        other => vec![other.clone()],
    }
}

/// Rebuild a conjunction from parts; `None` for an empty list.
pub fn conjoin(parts: Vec<Expr>) -> Option<Expr> {
    parts.into_iter().reduce(Expr::and)
}

impl BinaryOp {
    fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div => 5,
        }
    }
}

fn fmt_operand(expr: &Expr, parent: BinaryOp, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match expr {
        Expr::Binary(binary) if binary.op.precedence() < parent.precedence() => {
            write!(f, "({})", expr)
        }
        _ => write!(f, "{}", expr),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(column) => write!(f, "{}", column),
            Expr::Literal(literal) => write!(f, "{}", literal),
            Expr::Binary(binary) => {
                fmt_operand(&binary.left, binary.op, f)?;
                write!(f, " {} ", binary.op.as_sql())?;
                fmt_operand(&binary.right, binary.op, f)
            }
            Expr::Function(function) => {
                write!(f, "{}(", function.name)?;
                for (i, arg) in function.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(value) => write!(f, "{}", value),
            Literal::Float(value) => write!(f, "{}", value),
            Literal::String(value) => write!(f, "'{}'", value.replace('\'', "''")),
            Literal::Bool(value) => write!(f, "{}", if *value { 1 } else { 0 }),
            Literal::Null => write!(f, "NULL"),
        }
    }
}
