//! Mutator catalog and registry.
//!
//! A mutator is a pure, stateless rule keyed by AST node kind. The registry
//! is a tagged sum with a single dispatch function rather than a trait-object
//! hierarchy, which keeps the catalog data-driven and trivially testable.
//! `apply` never mutates its input and yields nothing when the node kind
//! matches but no semantic rule does (e.g. arithmetic swap on a string `+`).

use std::collections::HashMap;

use crate::frontend::{SemanticModel, TypeKind};
use crate::mutant::{Mutation, MutationKind, MutationLevel};
use crate::syntax::{AssignOp, BinaryOp, Expr, ExprKind, NodeKind};

/// One mutation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutator {
    ArithmeticOperator,
    ComparisonOperator,
    BooleanLiteral,
    StringLiteral,
    InterpolatedString,
    UpdateOperator,
    CheckedRemoval,
    NullConditional,
    CollectionInitializer,
    LinqMethod,
    AssignmentOperator,
}

impl Mutator {
    /// Every rule in the catalog.
    pub fn all() -> Vec<Mutator> {
        vec![
            Self::ArithmeticOperator,
            Self::ComparisonOperator,
            Self::BooleanLiteral,
            Self::StringLiteral,
            Self::InterpolatedString,
            Self::UpdateOperator,
            Self::CheckedRemoval,
            Self::NullConditional,
            Self::CollectionInitializer,
            Self::LinqMethod,
            Self::AssignmentOperator,
        ]
    }

    /// AST node kind this rule registers for.
    pub fn node_kind(self) -> NodeKind {
        match self {
            Self::ArithmeticOperator | Self::ComparisonOperator => NodeKind::Binary,
            Self::BooleanLiteral => NodeKind::BoolLiteral,
            Self::StringLiteral => NodeKind::StringLiteral,
            Self::InterpolatedString => NodeKind::InterpolatedString,
            Self::UpdateOperator => NodeKind::Update,
            Self::CheckedRemoval => NodeKind::Checked,
            Self::NullConditional => NodeKind::NullConditional,
            Self::CollectionInitializer => NodeKind::CollectionInit,
            Self::LinqMethod => NodeKind::MethodCall,
            Self::AssignmentOperator => NodeKind::Assignment,
        }
    }

    /// Minimum session level at which this rule emits.
    pub fn min_level(self) -> MutationLevel {
        match self {
            Self::ArithmeticOperator | Self::ComparisonOperator | Self::BooleanLiteral => {
                MutationLevel::Basic
            }
            Self::StringLiteral
            | Self::InterpolatedString
            | Self::UpdateOperator
            | Self::AssignmentOperator => MutationLevel::Standard,
            Self::CheckedRemoval | Self::NullConditional | Self::CollectionInitializer => {
                MutationLevel::Advanced
            }
            Self::LinqMethod => MutationLevel::Complete,
        }
    }

    /// Propose mutations for `expr`.
    pub fn apply(self, expr: &Expr, semantics: &SemanticModel) -> Vec<Mutation> {
        match self {
            Self::ArithmeticOperator => arithmetic(expr, semantics),
            Self::ComparisonOperator => comparison(expr),
            Self::BooleanLiteral => boolean_literal(expr),
            Self::StringLiteral => string_literal(expr),
            Self::InterpolatedString => interpolated_string(expr),
            Self::UpdateOperator => update_operator(expr),
            Self::CheckedRemoval => checked_removal(expr),
            Self::NullConditional => null_conditional(expr),
            Self::CollectionInitializer => collection_initializer(expr),
            Self::LinqMethod => linq_method(expr),
            Self::AssignmentOperator => assignment_operator(expr, semantics),
        }
    }
}

/// Mutators indexed by the node kind they registered for.
#[derive(Debug)]
pub struct MutatorRegistry {
    by_kind: HashMap<NodeKind, Vec<Mutator>>,
}

impl MutatorRegistry {
    /// Registry holding the full catalog.
    pub fn standard() -> MutatorRegistry {
        let mut by_kind: HashMap<NodeKind, Vec<Mutator>> = HashMap::new();
        for m in Mutator::all() {
            by_kind.entry(m.node_kind()).or_default().push(m);
        }
        MutatorRegistry { by_kind }
    }

    /// All mutations proposed for `expr` by rules at or below `level`.
    pub fn mutations_for(
        &self,
        expr: &Expr,
        semantics: &SemanticModel,
        level: MutationLevel,
    ) -> Vec<Mutation> {
        let Some(kind) = expr.node_kind() else {
            return Vec::new();
        };

        let Some(mutators) = self.by_kind.get(&kind) else {
            return Vec::new();
        };

        mutators
            .iter()
            .filter(|m| m.min_level() <= level)
            .flat_map(|m| m.apply(expr, semantics))
            .collect()
    }
}

/// Build a `Mutation` replacing `original` with `kind`, carrying over the
/// original's whitespace trivia onto the replacement root.
fn replace_with(original: &Expr, kind: ExprKind, tag: MutationKind) -> Mutation {
    let replacement = Expr {
        kind,
        span: original.span.clone(),
        trivia: original.trivia.whitespace_only(),
    };
    Mutation {
        original_span: original.span.clone(),
        display_name: format!("{original} -> {replacement}"),
        replacement,
        kind: tag,
    }
}

fn arithmetic(expr: &Expr, semantics: &SemanticModel) -> Vec<Mutation> {
    let ExprKind::Binary { op, lhs, rhs } = &expr.kind else {
        return Vec::new();
    };
    if !op.is_arithmetic() {
        return Vec::new();
    }

    // `+` on strings is concatenation; there is no counterpart operator.
    if *op == BinaryOp::Add && semantics.expr_type(expr) == TypeKind::Str {
        return Vec::new();
    }

    let swapped = match op {
        BinaryOp::Add => BinaryOp::Sub,
        BinaryOp::Sub => BinaryOp::Add,
        BinaryOp::Mul => BinaryOp::Div,
        BinaryOp::Div => BinaryOp::Mul,
        BinaryOp::Rem => BinaryOp::Mul,
        _ => return Vec::new(),
    };

    vec![replace_with(
        expr,
        ExprKind::Binary {
            op: swapped,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        },
        MutationKind::Arithmetic,
    )]
}

fn comparison(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::Binary { op, lhs, rhs } = &expr.kind else {
        return Vec::new();
    };

    let targets: &[BinaryOp] = match op {
        BinaryOp::Eq => &[BinaryOp::Ne],
        BinaryOp::Ne => &[BinaryOp::Eq],
        BinaryOp::Lt => &[BinaryOp::Le, BinaryOp::Ge],
        BinaryOp::Le => &[BinaryOp::Lt, BinaryOp::Gt],
        BinaryOp::Gt => &[BinaryOp::Ge, BinaryOp::Le],
        BinaryOp::Ge => &[BinaryOp::Gt, BinaryOp::Lt],
        _ => return Vec::new(),
    };

    targets
        .iter()
        .map(|t| {
            replace_with(
                expr,
                ExprKind::Binary {
                    op: *t,
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                },
                MutationKind::Equality,
            )
        })
        .collect()
}

fn boolean_literal(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::BoolLit(value) = &expr.kind else {
        return Vec::new();
    };
    vec![replace_with(
        expr,
        ExprKind::BoolLit(!value),
        MutationKind::Boolean,
    )]
}

fn string_literal(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::StringLit(value) = &expr.kind else {
        return Vec::new();
    };
    let mutated = if value.is_empty() {
        "sharp-mutant was here!".to_string()
    } else {
        String::new()
    };
    vec![replace_with(
        expr,
        ExprKind::StringLit(mutated),
        MutationKind::String,
    )]
}

fn interpolated_string(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::InterpolatedString(parts) = &expr.kind else {
        return Vec::new();
    };
    if parts.is_empty() {
        return Vec::new();
    }
    vec![replace_with(
        expr,
        ExprKind::InterpolatedString(Vec::new()),
        MutationKind::String,
    )]
}

fn update_operator(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::Update { op, prefix, target } = &expr.kind else {
        return Vec::new();
    };
    vec![replace_with(
        expr,
        ExprKind::Update {
            op: op.flipped(),
            prefix: *prefix,
            target: target.clone(),
        },
        MutationKind::Update,
    )]
}

fn checked_removal(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::Checked(inner) = &expr.kind else {
        return Vec::new();
    };

    // Unwrap to the inner expression; only the whitespace portion of the
    // `checked(...)` node's trivia survives on the replacement root.
    let replacement = Expr {
        kind: inner.kind.clone(),
        span: inner.span.clone(),
        trivia: expr.trivia.whitespace_only(),
    };

    vec![Mutation {
        original_span: expr.span.clone(),
        display_name: format!("{expr} -> {replacement}"),
        replacement,
        kind: MutationKind::CheckedRemoval,
    }]
}

fn null_conditional(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::MemberAccess {
        receiver,
        member,
        null_conditional: true,
    } = &expr.kind
    else {
        return Vec::new();
    };
    vec![replace_with(
        expr,
        ExprKind::MemberAccess {
            receiver: receiver.clone(),
            member: member.clone(),
            null_conditional: false,
        },
        MutationKind::NullConditional,
    )]
}

fn collection_initializer(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::CollectionInit { elements } = &expr.kind else {
        return Vec::new();
    };
    if elements.is_empty() {
        return Vec::new();
    }
    vec![replace_with(
        expr,
        ExprKind::CollectionInit {
            elements: Vec::new(),
        },
        MutationKind::CollectionInit,
    )]
}

fn linq_swap(method: &str) -> Option<&'static str> {
    Some(match method {
        "Any" => "All",
        "All" => "Any",
        "First" => "Last",
        "Last" => "First",
        "Min" => "Max",
        "Max" => "Min",
        "OrderBy" => "OrderByDescending",
        "OrderByDescending" => "OrderBy",
        "Single" => "SingleOrDefault",
        "SingleOrDefault" => "Single",
        _ => return None,
    })
}

fn linq_method(expr: &Expr) -> Vec<Mutation> {
    let ExprKind::MethodCall {
        receiver,
        method,
        args,
    } = &expr.kind
    else {
        return Vec::new();
    };
    let Some(swapped) = linq_swap(method) else {
        return Vec::new();
    };
    vec![replace_with(
        expr,
        ExprKind::MethodCall {
            receiver: receiver.clone(),
            method: swapped.to_string(),
            args: args.clone(),
        },
        MutationKind::Linq,
    )]
}

fn assignment_operator(expr: &Expr, semantics: &SemanticModel) -> Vec<Mutation> {
    let ExprKind::Assign { op, target, value } = &expr.kind else {
        return Vec::new();
    };

    // `+=` on strings appends; there is no counterpart operator.
    if *op == AssignOp::AddAssign
        && (semantics.expr_type(target) == TypeKind::Str
            || semantics.expr_type(value) == TypeKind::Str)
    {
        return Vec::new();
    }

    let swapped = match op {
        AssignOp::AddAssign => AssignOp::SubAssign,
        AssignOp::SubAssign => AssignOp::AddAssign,
        AssignOp::MulAssign => AssignOp::DivAssign,
        AssignOp::DivAssign => AssignOp::MulAssign,
        AssignOp::RemAssign => AssignOp::MulAssign,
        AssignOp::ShlAssign => AssignOp::ShrAssign,
        AssignOp::ShrAssign => AssignOp::ShlAssign,
        AssignOp::AndAssign => AssignOp::OrAssign,
        AssignOp::OrAssign => AssignOp::AndAssign,
        AssignOp::Assign => return Vec::new(),
    };

    vec![replace_with(
        expr,
        ExprKind::Assign {
            op: swapped,
            target: target.clone(),
            value: value.clone(),
        },
        MutationKind::Assignment,
    )]
}
