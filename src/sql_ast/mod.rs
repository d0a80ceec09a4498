//! AST for a single SELECT query block of the graph-extended SQL dialect.
//!
//! The parser producing these types is a collaborator; the planner consumes
//! a [`QueryBlock`] and mutates it in place. Only the clauses the planner
//! touches are modeled: the projection, the `FROM` table references, the
//! `WHERE` expression, and the `MATCH` clause.

pub mod expression;

pub use expression::{
    conjoin, conjuncts, BinaryExpr, BinaryOp, ColumnRef, Expr, FunctionExpr, Literal,
};

use std::fmt;

use crate::utils::{Ident, ObjectKey};

/// One SELECT query block. `MATCH` is present on input and cleared by the
/// planner once the pattern has been folded into `from` and `where_clause`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBlock {
    pub select: SelectClause,
    pub from: Vec<TableRef>,
    pub where_clause: Option<Expr>,
    pub match_clause: Option<MatchClause>,
}

impl QueryBlock {
    /// AND a conjunct onto the WHERE clause.
    pub fn append_where_conjunct(&mut self, conjunct: Expr) {
        self.where_clause = match self.where_clause.take() {
            Some(existing) => Some(Expr::and(existing, conjunct)),
            None => Some(conjunct),
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Star,
    /// `alias.*`
    QualifiedStar(Ident),
    Expr { expr: Expr, alias: Option<Ident> },
}

/// Schema-qualified object name. An absent schema defaults to `dbo` at
/// pattern-construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectName {
    pub schema: Option<Ident>,
    pub base: Ident,
}

impl ObjectName {
    pub fn new(schema: Option<Ident>, base: impl Into<Ident>) -> Self {
        ObjectName {
            schema,
            base: base.into(),
        }
    }

    pub fn bare(base: impl Into<Ident>) -> Self {
        ObjectName {
            schema: None,
            base: base.into(),
        }
    }

    pub fn qualified(schema: impl Into<Ident>, base: impl Into<Ident>) -> Self {
        ObjectName {
            schema: Some(schema.into()),
            base: base.into(),
        }
    }

    pub fn schema_or_default(&self) -> Ident {
        self.schema.clone().unwrap_or_else(|| Ident::new("dbo"))
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            schema: self.schema_or_default(),
            name: self.base.clone(),
        }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.base),
            None => write!(f, "{}", self.base),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Named(NamedTable),
    Function(FunctionTable),
    Join(Box<JoinTable>),
}

impl TableRef {
    pub fn named(object: ObjectName, alias: Option<Ident>) -> Self {
        TableRef::Named(NamedTable { object, alias })
    }

    pub fn join(left: TableRef, right: TableRef, condition: Option<Expr>) -> Self {
        TableRef::Join(Box::new(JoinTable {
            left,
            right,
            condition,
        }))
    }

    /// The alias this reference is visible under, if any.
    pub fn alias(&self) -> Option<&Ident> {
        match self {
            TableRef::Named(named) => named.alias.as_ref(),
            TableRef::Function(function) => Some(&function.alias),
            TableRef::Join(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedTable {
    pub object: ObjectName,
    pub alias: Option<Ident>,
}

/// A table-valued function application, e.g. an edge decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionTable {
    pub function: ObjectName,
    pub args: Vec<Expr>,
    pub alias: Ident,
}

/// A join node. A `None` condition renders as an unconstrained cross apply.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTable {
    pub left: TableRef,
    pub right: TableRef,
    pub condition: Option<Expr>,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRef::Named(named) => match &named.alias {
                Some(alias) => write!(f, "{} AS [{}]", named.object, alias),
                None => write!(f, "{}", named.object),
            },
            TableRef::Function(function) => {
                write!(f, "{}(", function.function)?;
                for (i, arg) in function.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ") AS [{}]", function.alias)
            }
            TableRef::Join(join) => match &join.condition {
                Some(condition) => {
                    write!(f, "{} JOIN {} ON {}", join.left, join.right, condition)
                }
                None => write!(f, "{} CROSS APPLY {}", join.left, join.right),
            },
        }
    }
}

/// A `MATCH` clause: one or more paths over node aliases and edge columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub paths: Vec<MatchPathPattern>,
}

/// A single path: `a-[e]->b-[f]->c` is two hops terminated by tail `c`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPathPattern {
    pub hops: Vec<MatchHop>,
    pub tail: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchHop {
    pub node: Ident,
    pub edge: EdgePattern,
}

/// One edge in a path. `min_length == 1 && max_length == Some(1)` is a plain
/// edge; anything else is a variable-length path. `max_length == None` means
/// unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePattern {
    pub column: Ident,
    pub alias: Option<Ident>,
    pub min_length: u32,
    pub max_length: Option<u32>,
}

impl EdgePattern {
    pub fn plain(column: impl Into<Ident>) -> Self {
        EdgePattern {
            column: column.into(),
            alias: None,
            min_length: 1,
            max_length: Some(1),
        }
    }

    pub fn aliased(column: impl Into<Ident>, alias: impl Into<Ident>) -> Self {
        EdgePattern {
            column: column.into(),
            alias: Some(alias.into()),
            min_length: 1,
            max_length: Some(1),
        }
    }

    pub fn path(
        column: impl Into<Ident>,
        alias: Option<Ident>,
        min_length: u32,
        max_length: Option<u32>,
    ) -> Self {
        EdgePattern {
            column: column.into(),
            alias,
            min_length,
            max_length,
        }
    }

    pub fn is_plain(&self) -> bool {
        self.min_length == 1 && self.max_length == Some(1)
    }
}
