//! Mutant placement.
//!
//! The placer rewrites a node into a guard that selects a mutated subtree
//! only while that mutant is active, and the original subtree otherwise.
//! Expressions become a `MutantSwitch` (ternary-style chain); statements
//! become a `MutantIf` (if/else chain), since a conditional expression is not
//! a legal statement-expression in the target language. Guard entry records a
//! coverage hit for every arm id, through `hit_normal` or `hit_static`
//! depending on the enclosing context.
//!
//! Injection metadata is recorded per mutant so the rollback loop can excise
//! an offending mutant without re-running mutators.

use std::collections::{BTreeMap, BTreeSet};

use crate::mutant::MutantId;
use crate::span::SourceSpan;
use crate::syntax::{
    Block, Expr, ExprKind, GuardArm, HitKind, MemberKind, Stmt, StmtKind, SyntaxTree,
};

/// Shape of an installed guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    ExpressionSwitch,
    StatementIf,
}

/// Syntactic position of a candidate site, as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPosition {
    /// Ordinary expression; a switch can wrap it.
    Expression,
    /// Whole expression-statement; an if/else can wrap it.
    Statement,
    /// Compile-time constant initializer; guards are forbidden.
    ConstInitializer,
}

/// Context a placement happens in.
#[derive(Debug, Clone, Copy)]
pub struct PlacementContext {
    pub position: GuardPosition,
    pub hit: HitKind,
    /// Node kind name of the parent, for injection metadata.
    pub parent: &'static str,
}

/// Injection metadata for one placed mutant.
#[derive(Debug, Clone)]
pub struct PlacementRecord {
    pub id: MutantId,
    pub kind: PlacementKind,
    pub parent: &'static str,
    pub span: SourceSpan,
    pub hit: HitKind,
}

/// Result of asking the placer to install candidates at a site.
#[derive(Debug)]
pub enum PlaceOutcome<T> {
    Placed(T),
    /// The position cannot host a guard; candidates must be dropped. The
    /// node is handed back untouched.
    Refused { original: T, reason: &'static str },
}

/// Records where every mutant guard went.
#[derive(Debug, Default)]
pub struct PlacementRegistry {
    records: BTreeMap<MutantId, PlacementRecord>,
}

impl PlacementRegistry {
    pub fn record(&mut self, record: PlacementRecord) {
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: MutantId) -> Option<&PlacementRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Smallest placement whose span encloses `span`.
    ///
    /// This is how compiler diagnostics are blamed on a mutant: the error
    /// span lies inside the guard the mutant's replacement was placed in.
    pub fn smallest_enclosing(&self, span: &SourceSpan) -> Option<MutantId> {
        self.records
            .values()
            .filter(|r| r.span.contains(span))
            .min_by_key(|r| (r.span.len(), std::cmp::Reverse(r.span.start)))
            .map(|r| r.id)
    }

    pub fn remove(&mut self, id: MutantId) {
        self.records.remove(&id);
    }
}

/// Installs guards and keeps the placement registry.
#[derive(Debug, Default)]
pub struct MutantPlacer {
    registry: PlacementRegistry,
}

impl MutantPlacer {
    pub fn new() -> MutantPlacer {
        MutantPlacer::default()
    }

    pub fn registry(&self) -> &PlacementRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> PlacementRegistry {
        self.registry
    }

    /// Wrap `original` in an expression switch selecting one of `arms`.
    ///
    /// `original` is the subtree with already-mutated children, so nested
    /// placements live inside the fallback branch.
    pub fn place_expr(
        &mut self,
        original: Expr,
        arms: Vec<GuardArm<Expr>>,
        ctx: PlacementContext,
    ) -> PlaceOutcome<Expr> {
        debug_assert!(!arms.is_empty(), "placement with no arms");

        if ctx.position == GuardPosition::ConstInitializer {
            return PlaceOutcome::Refused {
                original,
                reason: "unsupported placement",
            };
        }

        let span = original.span.clone();
        let trivia = original.trivia.clone();

        for arm in &arms {
            self.registry.record(PlacementRecord {
                id: arm.id,
                kind: PlacementKind::ExpressionSwitch,
                parent: ctx.parent,
                span: span.clone(),
                hit: ctx.hit,
            });
        }

        let mut guarded = Expr::new(
            ExprKind::MutantSwitch {
                arms,
                original: Box::new(original),
                hit: ctx.hit,
            },
            span,
        );
        guarded.trivia = trivia;
        PlaceOutcome::Placed(guarded)
    }

    /// Wrap `original` in an if/else chain selecting one of `arms`.
    pub fn place_stmt(
        &mut self,
        original: Stmt,
        arms: Vec<GuardArm<Block>>,
        ctx: PlacementContext,
    ) -> PlaceOutcome<Stmt> {
        debug_assert!(!arms.is_empty(), "placement with no arms");

        if ctx.position == GuardPosition::ConstInitializer {
            return PlaceOutcome::Refused {
                original,
                reason: "unsupported placement",
            };
        }

        let span = original.span.clone();
        let trivia = original.trivia.clone();

        for arm in &arms {
            self.registry.record(PlacementRecord {
                id: arm.id,
                kind: PlacementKind::StatementIf,
                parent: ctx.parent,
                span: span.clone(),
                hit: ctx.hit,
            });
        }

        let mut guarded = Stmt {
            kind: StmtKind::MutantIf {
                arms,
                original: Block::single(original),
                hit: ctx.hit,
            },
            span,
            trivia: Default::default(),
        };
        guarded.trivia = trivia;
        PlaceOutcome::Placed(guarded)
    }
}

/// Remove the guards of `doomed` mutants from `tree`, keeping the original
/// branch only. A guard that loses all of its arms collapses back to the
/// plain original subtree.
pub fn excise_mutants(tree: &SyntaxTree, doomed: &BTreeSet<MutantId>) -> SyntaxTree {
    let mut out = tree.clone();
    for ty in &mut out.types {
        for member in &mut ty.members {
            match &mut member.kind {
                MemberKind::Method { body, .. } | MemberKind::StaticCtor { body } => {
                    excise_block(body, doomed);
                }
                MemberKind::Field { init: Some(init), .. } => {
                    *init = excise_expr(init.clone(), doomed);
                }
                _ => {}
            }
        }
    }
    out
}

fn excise_block(block: &mut Block, doomed: &BTreeSet<MutantId>) {
    let statements = std::mem::take(&mut block.statements);
    block.statements = statements
        .into_iter()
        .map(|s| excise_stmt(s, doomed))
        .collect();
}

fn excise_stmt(stmt: Stmt, doomed: &BTreeSet<MutantId>) -> Stmt {
    let Stmt { kind, span, trivia } = stmt;
    let kind = match kind {
        StmtKind::MutantIf {
            arms,
            mut original,
            hit,
        } => {
            let arms: Vec<GuardArm<Block>> = arms
                .into_iter()
                .filter(|arm| !doomed.contains(&arm.id))
                .map(|mut arm| {
                    excise_block(&mut arm.body, doomed);
                    arm
                })
                .collect();
            excise_block(&mut original, doomed);

            if arms.is_empty() {
                // Collapse: the original branch of a statement guard holds
                // exactly one statement.
                let mut inner = original.statements;
                if inner.len() == 1 {
                    let restored = inner.remove(0);
                    return Stmt {
                        kind: restored.kind,
                        span,
                        trivia,
                    };
                }
                StmtKind::MutantIf {
                    arms,
                    original: Block { statements: inner },
                    hit,
                }
            } else {
                StmtKind::MutantIf {
                    arms,
                    original,
                    hit,
                }
            }
        }
        StmtKind::Expr(e) => StmtKind::Expr(excise_expr(e, doomed)),
        StmtKind::LocalDecl {
            name,
            ty,
            init,
            is_const,
        } => StmtKind::LocalDecl {
            name,
            ty,
            init: init.map(|e| excise_expr(e, doomed)),
            is_const,
        },
        StmtKind::If {
            cond,
            mut then_branch,
            mut else_branch,
        } => {
            excise_block(&mut then_branch, doomed);
            if let Some(b) = else_branch.as_mut() {
                excise_block(b, doomed);
            }
            StmtKind::If {
                cond: excise_expr(cond, doomed),
                then_branch,
                else_branch,
            }
        }
        StmtKind::While { cond, mut body } => {
            excise_block(&mut body, doomed);
            StmtKind::While {
                cond: excise_expr(cond, doomed),
                body,
            }
        }
        StmtKind::Return(e) => StmtKind::Return(e.map(|e| excise_expr(e, doomed))),
    };
    Stmt { kind, span, trivia }
}

fn excise_expr(expr: Expr, doomed: &BTreeSet<MutantId>) -> Expr {
    let Expr { kind, span, trivia } = expr;
    let kind = match kind {
        ExprKind::MutantSwitch {
            arms,
            original,
            hit,
        } => {
            let arms: Vec<GuardArm<Expr>> = arms
                .into_iter()
                .filter(|arm| !doomed.contains(&arm.id))
                .map(|arm| GuardArm {
                    id: arm.id,
                    body: excise_expr(arm.body, doomed),
                })
                .collect();
            let original = excise_expr(*original, doomed);

            if arms.is_empty() {
                // Collapse to the plain original subtree, keeping the guard
                // node's trivia.
                return Expr {
                    kind: original.kind,
                    span,
                    trivia,
                };
            }
            ExprKind::MutantSwitch {
                arms,
                original: Box::new(original),
                hit,
            }
        }
        ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
            op,
            lhs: Box::new(excise_expr(*lhs, doomed)),
            rhs: Box::new(excise_expr(*rhs, doomed)),
        },
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op,
            operand: Box::new(excise_expr(*operand, doomed)),
        },
        ExprKind::Update { op, prefix, target } => ExprKind::Update {
            op,
            prefix,
            target: Box::new(excise_expr(*target, doomed)),
        },
        ExprKind::Assign { op, target, value } => ExprKind::Assign {
            op,
            target: Box::new(excise_expr(*target, doomed)),
            value: Box::new(excise_expr(*value, doomed)),
        },
        ExprKind::Checked(inner) => ExprKind::Checked(Box::new(excise_expr(*inner, doomed))),
        ExprKind::Conditional {
            cond,
            when_true,
            when_false,
        } => ExprKind::Conditional {
            cond: Box::new(excise_expr(*cond, doomed)),
            when_true: Box::new(excise_expr(*when_true, doomed)),
            when_false: Box::new(excise_expr(*when_false, doomed)),
        },
        ExprKind::MemberAccess {
            receiver,
            member,
            null_conditional,
        } => ExprKind::MemberAccess {
            receiver: Box::new(excise_expr(*receiver, doomed)),
            member,
            null_conditional,
        },
        ExprKind::MethodCall {
            receiver,
            method,
            args,
        } => ExprKind::MethodCall {
            receiver: receiver.map(|r| Box::new(excise_expr(*r, doomed))),
            method,
            args: args.into_iter().map(|a| excise_expr(a, doomed)).collect(),
        },
        ExprKind::CollectionInit { elements } => ExprKind::CollectionInit {
            elements: elements
                .into_iter()
                .map(|e| excise_expr(e, doomed))
                .collect(),
        },
        ExprKind::InterpolatedString(parts) => ExprKind::InterpolatedString(
            parts
                .into_iter()
                .map(|p| match p {
                    crate::syntax::InterpPart::Hole(e) => {
                        crate::syntax::InterpPart::Hole(excise_expr(e, doomed))
                    }
                    text => text,
                })
                .collect(),
        ),
        leaf => leaf,
    };
    Expr { kind, span, trivia }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceSpan;

    fn span_at(start: u32, end: u32) -> SourceSpan {
        SourceSpan::new("src/calc.cs", start, end, 1, start + 1)
    }

    fn ident(name: &str, start: u32) -> Expr {
        Expr::new(
            ExprKind::Ident(name.into()),
            span_at(start, start + name.len() as u32),
        )
    }

    fn ctx(position: GuardPosition) -> PlacementContext {
        PlacementContext {
            position,
            hit: HitKind::Normal,
            parent: "binary",
        }
    }

    #[test]
    fn place_expr_wraps_and_records_metadata() {
        let mut placer = MutantPlacer::new();
        let original = ident("x", 10);
        let arm = GuardArm {
            id: MutantId(3),
            body: ident("y", 10),
        };

        let out = placer.place_expr(original, vec![arm], ctx(GuardPosition::Expression));
        let guarded = match out {
            PlaceOutcome::Placed(e) => e,
            PlaceOutcome::Refused { reason, .. } => panic!("unexpected refusal: {reason}"),
        };

        assert!(matches!(guarded.kind, ExprKind::MutantSwitch { .. }));
        let record = placer.registry().get(MutantId(3)).expect("record");
        assert_eq!(record.kind, PlacementKind::ExpressionSwitch);
        assert_eq!(record.parent, "binary");
    }

    #[test]
    fn const_initializer_position_is_refused() {
        let mut placer = MutantPlacer::new();
        let original = ident("x", 0);
        let arm = GuardArm {
            id: MutantId(0),
            body: ident("y", 0),
        };

        let out = placer.place_expr(original, vec![arm], ctx(GuardPosition::ConstInitializer));
        match out {
            PlaceOutcome::Refused { reason, original } => {
                assert_eq!(reason, "unsupported placement");
                assert_eq!(original.kind, ExprKind::Ident("x".into()));
            }
            PlaceOutcome::Placed(_) => panic!("const initializer must refuse placement"),
        }
        assert!(placer.registry().is_empty(), "refusal records nothing");
    }

    #[test]
    fn excise_collapses_switch_with_no_remaining_arms() {
        let mut placer = MutantPlacer::new();
        let original = ident("x", 5);
        let arm = GuardArm {
            id: MutantId(7),
            body: ident("y", 5),
        };
        let out = placer.place_expr(original, vec![arm], ctx(GuardPosition::Expression));
        let guarded = match out {
            PlaceOutcome::Placed(e) => e,
            PlaceOutcome::Refused { .. } => unreachable!(),
        };

        let doomed: BTreeSet<MutantId> = [MutantId(7)].into_iter().collect();
        let restored = excise_expr(guarded, &doomed);

        assert_eq!(restored.kind, ExprKind::Ident("x".into()));
    }

    #[test]
    fn excise_keeps_unrelated_arms() {
        let mut placer = MutantPlacer::new();
        let original = ident("x", 5);
        let arms = vec![
            GuardArm {
                id: MutantId(1),
                body: ident("y", 5),
            },
            GuardArm {
                id: MutantId(2),
                body: ident("z", 5),
            },
        ];
        let guarded = match placer.place_expr(original, arms, ctx(GuardPosition::Expression)) {
            PlaceOutcome::Placed(e) => e,
            PlaceOutcome::Refused { .. } => unreachable!(),
        };

        let doomed: BTreeSet<MutantId> = [MutantId(1)].into_iter().collect();
        let pruned = excise_expr(guarded, &doomed);

        match pruned.kind {
            ExprKind::MutantSwitch { arms, .. } => {
                assert_eq!(arms.len(), 1);
                assert_eq!(arms[0].id, MutantId(2));
            }
            other => panic!("expected switch to survive, got {other:?}"),
        }
    }

    #[test]
    fn smallest_enclosing_prefers_innermost_placement() {
        let mut registry = PlacementRegistry::default();
        registry.record(PlacementRecord {
            id: MutantId(1),
            kind: PlacementKind::ExpressionSwitch,
            parent: "method",
            span: span_at(0, 100),
            hit: HitKind::Normal,
        });
        registry.record(PlacementRecord {
            id: MutantId(2),
            kind: PlacementKind::ExpressionSwitch,
            parent: "binary",
            span: span_at(10, 30),
            hit: HitKind::Normal,
        });

        let diag = span_at(12, 14);
        assert_eq!(registry.smallest_enclosing(&diag), Some(MutantId(2)));

        let outside = span_at(40, 44);
        assert_eq!(registry.smallest_enclosing(&outside), Some(MutantId(1)));

        let mut far = span_at(0, 4);
        far.file = "src/other.cs".into();
        assert_eq!(registry.smallest_enclosing(&far), None);
    }
}
