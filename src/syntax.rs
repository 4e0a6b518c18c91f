//! Syntax surface for the mutated language.
//!
//! Compilation units arrive from the language frontend as pre-parsed trees of
//! these types. The orchestrator rewrites expressions and statements into
//! guard nodes (`MutantSwitch` / `MutantIf`) that select the original or a
//! mutated subtree at runtime based on the active mutant id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::mutant::MutantId;
use crate::span::SourceSpan;

/// Leading/trailing trivia attached to a node.
///
/// Trivia is raw source text: whitespace, end-of-line markers, comments and
/// directives. Mutators carry the *whitespace* portion of the original node's
/// trivia onto their replacement; comments and directives are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trivia {
    /// Raw text before the node token(s).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leading: String,

    /// Raw text after the node token(s).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trailing: String,
}

impl Trivia {
    /// Trivia with only whitespace/EOL text retained.
    ///
    /// Line comments (`// …`), block comments (`/* … */`) and directives
    /// (`# …` to end of line) are removed; the line breaks that terminated
    /// them are kept so vertical layout survives.
    pub fn whitespace_only(&self) -> Trivia {
        Trivia {
            leading: strip_comments(&self.leading),
            trailing: strip_comments(&self.trailing),
        }
    }

    /// Is there any trivia at all?
    pub fn is_empty(&self) -> bool {
        self.leading.is_empty() && self.trailing.is_empty()
    }
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            // Line comment: skip to (not including) the newline.
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
        } else if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            // Block comment: skip past the terminator, tolerate unterminated.
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
        } else if bytes[i] == b'#' {
            // Directive: skip to end of line.
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }

    out.retain(|c| c.is_ascii_whitespace());
    out
}

/// Binary operator tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    /// Surface token for rendering.
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Rem
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    pub fn is_relational(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

/// Compound (and plain) assignment operator tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
}

impl AssignOp {
    pub fn token(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::MulAssign => "*=",
            Self::DivAssign => "/=",
            Self::RemAssign => "%=",
            Self::ShlAssign => "<<=",
            Self::ShrAssign => ">>=",
            Self::AndAssign => "&=",
            Self::OrAssign => "|=",
        }
    }
}

/// Prefix unary operators (not the `++`/`--` pair, which is `UpdateOp`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn token(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
            Self::BitNot => "~",
        }
    }
}

/// Increment/decrement operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

impl UpdateOp {
    pub fn token(self) -> &'static str {
        match self {
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }

    pub fn flipped(self) -> UpdateOp {
        match self {
            Self::Increment => Self::Decrement,
            Self::Decrement => Self::Increment,
        }
    }
}

/// Which coverage-hit routine a guard node calls on entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HitKind {
    Normal,
    Static,
}

/// One guarded alternative inside a `MutantSwitch`/`MutantIf`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardArm<T> {
    /// Mutant selected by this arm.
    pub id: MutantId,

    /// Subtree evaluated when the mutant is active.
    pub body: T,
}

/// Part of an interpolated string literal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InterpPart {
    Text(String),
    Hole(Expr),
}

/// Expression node: kind plus location and trivia.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
    #[serde(default, skip_serializing_if = "Trivia::is_empty")]
    pub trivia: Trivia,
}

/// Expression kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExprKind {
    IntLit(i64),
    BoolLit(bool),
    StringLit(String),
    InterpolatedString(Vec<InterpPart>),
    Ident(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `checked(inner)` overflow-checked region.
    Checked(Box<Expr>),
    Conditional {
        cond: Box<Expr>,
        when_true: Box<Expr>,
        when_false: Box<Expr>,
    },
    MemberAccess {
        receiver: Box<Expr>,
        member: String,
        /// True for the null-conditional form `recv?.member`.
        null_conditional: bool,
    },
    MethodCall {
        receiver: Option<Box<Expr>>,
        method: String,
        args: Vec<Expr>,
    },
    CollectionInit {
        elements: Vec<Expr>,
    },
    /// Runtime mutant guard: evaluates the arm whose mutant is active,
    /// otherwise the original. Entry records a coverage hit for every arm id.
    MutantSwitch {
        arms: Vec<GuardArm<Expr>>,
        original: Box<Expr>,
        hit: HitKind,
    },
}

/// Statement node: kind plus location and trivia.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
    #[serde(default, skip_serializing_if = "Trivia::is_empty")]
    pub trivia: Trivia,
}

/// Statement kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StmtKind {
    Expr(Expr),
    LocalDecl {
        name: String,
        ty: Option<String>,
        init: Option<Expr>,
        is_const: bool,
    },
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Return(Option<Expr>),
    /// Runtime mutant guard in statement position (if/else chain).
    MutantIf {
        arms: Vec<GuardArm<Block>>,
        original: Block,
        hit: HitKind,
    },
}

/// Brace-delimited statement list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

impl Block {
    pub fn single(stmt: Stmt) -> Block {
        Block {
            statements: vec![stmt],
        }
    }
}

/// Method parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

/// Type member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub kind: MemberKind,
    /// Attribute markers on the member (names only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    pub span: SourceSpan,
}

/// Member kinds relevant to mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberKind {
    Method {
        name: String,
        params: Vec<Param>,
        body: Block,
        is_static: bool,
    },
    Field {
        name: String,
        ty: String,
        init: Option<Expr>,
        is_static: bool,
        is_const: bool,
    },
    /// One-time type initializer.
    StaticCtor {
        body: Block,
    },
}

/// Type declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    pub members: Vec<Member>,
    pub span: SourceSpan,
}

/// One parsed compilation unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyntaxTree {
    /// Source path the unit was parsed from.
    pub path: PathBuf,

    /// Marked generated by the frontend (auto-generated header or tooling
    /// output); generated units are never mutated.
    #[serde(default)]
    pub is_generated: bool,

    pub types: Vec<TypeDecl>,
}

/// Node kinds a mutator can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Binary,
    Update,
    BoolLiteral,
    StringLiteral,
    InterpolatedString,
    Checked,
    Assignment,
    NullConditional,
    CollectionInit,
    MethodCall,
}

impl Expr {
    pub fn new(kind: ExprKind, span: SourceSpan) -> Expr {
        Expr {
            kind,
            span,
            trivia: Trivia::default(),
        }
    }

    /// Registry dispatch key for this expression, if any mutator family
    /// applies to its kind.
    pub fn node_kind(&self) -> Option<NodeKind> {
        match &self.kind {
            ExprKind::Binary { .. } => Some(NodeKind::Binary),
            ExprKind::Update { .. } => Some(NodeKind::Update),
            ExprKind::BoolLit(_) => Some(NodeKind::BoolLiteral),
            ExprKind::StringLit(_) => Some(NodeKind::StringLiteral),
            ExprKind::InterpolatedString(_) => Some(NodeKind::InterpolatedString),
            ExprKind::Checked(_) => Some(NodeKind::Checked),
            ExprKind::Assign { .. } => Some(NodeKind::Assignment),
            ExprKind::MemberAccess {
                null_conditional: true,
                ..
            } => Some(NodeKind::NullConditional),
            ExprKind::CollectionInit { .. } => Some(NodeKind::CollectionInit),
            ExprKind::MethodCall { .. } => Some(NodeKind::MethodCall),
            _ => None,
        }
    }

    /// Replace this node's trivia with the whitespace portion of `source`'s.
    pub fn with_trivia_from(mut self, source: &Expr) -> Expr {
        self.trivia = source.trivia.whitespace_only();
        self
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntLit(v) => write!(f, "{v}"),
            Self::BoolLit(v) => write!(f, "{v}"),
            Self::StringLit(s) => write!(f, "{s:?}"),
            Self::InterpolatedString(parts) => {
                write!(f, "$\"")?;
                for p in parts {
                    match p {
                        InterpPart::Text(t) => write!(f, "{t}")?,
                        InterpPart::Hole(e) => write!(f, "{{{e}}}")?,
                    }
                }
                write!(f, "\"")
            }
            Self::Ident(name) => write!(f, "{name}"),
            Self::Binary { op, lhs, rhs } => write!(f, "{lhs} {} {rhs}", op.token()),
            Self::Unary { op, operand } => write!(f, "{}{operand}", op.token()),
            Self::Update { op, prefix, target } => {
                if *prefix {
                    write!(f, "{}{target}", op.token())
                } else {
                    write!(f, "{target}{}", op.token())
                }
            }
            Self::Assign { op, target, value } => write!(f, "{target} {} {value}", op.token()),
            Self::Checked(inner) => write!(f, "checked({inner})"),
            Self::Conditional {
                cond,
                when_true,
                when_false,
            } => write!(f, "{cond} ? {when_true} : {when_false}"),
            Self::MemberAccess {
                receiver,
                member,
                null_conditional,
            } => {
                let dot = if *null_conditional { "?." } else { "." };
                write!(f, "{receiver}{dot}{member}")
            }
            Self::MethodCall {
                receiver,
                method,
                args,
            } => {
                if let Some(r) = receiver {
                    write!(f, "{r}.")?;
                }
                write!(f, "{method}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Self::CollectionInit { elements } => {
                write!(f, "{{ ")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                if elements.is_empty() {
                    write!(f, "}}")
                } else {
                    write!(f, " }}")
                }
            }
            Self::MutantSwitch { arms, original, .. } => {
                for arm in arms {
                    write!(f, "[{}]{} : ", arm.id, arm.body)?;
                }
                write!(f, "{original}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> SourceSpan {
        SourceSpan::new("src/calc.cs", 0, 5, 1, 1)
    }

    #[test]
    fn whitespace_only_drops_line_comment_keeps_newline() {
        let t = Trivia {
            leading: "  // note\n    ".to_string(),
            trailing: " ".to_string(),
        };
        let stripped = t.whitespace_only();
        assert_eq!(stripped.leading, "  \n    ");
        assert_eq!(stripped.trailing, " ");
    }

    #[test]
    fn whitespace_only_drops_block_comment_and_directive() {
        let t = Trivia {
            leading: "\t/* why */ #pragma x\n".to_string(),
            trailing: " /* tail".to_string(),
        };
        let stripped = t.whitespace_only();
        assert_eq!(stripped.leading, "\t \n");
        assert_eq!(stripped.trailing, " ");
    }

    #[test]
    fn display_renders_update_and_checked() {
        let x = Expr::new(ExprKind::Ident("x".into()), span());
        let post = Expr::new(
            ExprKind::Update {
                op: UpdateOp::Increment,
                prefix: false,
                target: Box::new(x.clone()),
            },
            span(),
        );
        assert_eq!(post.to_string(), "x++");

        let checked = Expr::new(
            ExprKind::Checked(Box::new(Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Add,
                    lhs: Box::new(x.clone()),
                    rhs: Box::new(x),
                },
                span(),
            ))),
            span(),
        );
        assert_eq!(checked.to_string(), "checked(x + x)");
    }

    #[test]
    fn node_kind_distinguishes_null_conditional() {
        let recv = Expr::new(ExprKind::Ident("user".into()), span());
        let plain = Expr::new(
            ExprKind::MemberAccess {
                receiver: Box::new(recv.clone()),
                member: "Name".into(),
                null_conditional: false,
            },
            span(),
        );
        let cond = Expr::new(
            ExprKind::MemberAccess {
                receiver: Box::new(recv),
                member: "Name".into(),
                null_conditional: true,
            },
            span(),
        );

        assert_eq!(plain.node_kind(), None);
        assert_eq!(cond.node_kind(), Some(NodeKind::NullConditional));
    }
}
