//! Mutation orchestration.
//!
//! Depth-first traversal over each compilation unit: collect the proposed
//! mutations at every site, allocate session-global ids in encounter order,
//! and ask the placer to install the guards. Traversal continues into the
//! children of the original (pre-placement) tree, never into freshly placed
//! guards, so placement cannot recurse.

use crate::frontend::SemanticModel;
use crate::mutant::{Mutant, MutantId, MutantStatus, MutatedUnit, Mutation};
use crate::mutators::MutatorRegistry;
use crate::options::{MutateDecision, Options};
use crate::placer::{
    GuardPosition, MutantPlacer, PlaceOutcome, PlacementContext, PlacementRegistry,
};
use crate::syntax::{
    Block, Expr, ExprKind, GuardArm, HitKind, InterpPart, MemberKind, Stmt, StmtKind, SyntaxTree,
};

/// Path markers that flag generated compilation units.
const GENERATED_PATH_MARKERS: &[&str] = &[".g.", ".generated.", ".Designer."];

#[derive(Debug, Clone, Copy)]
struct WalkCtx {
    hit: HitKind,
    position: GuardPosition,
    parent: &'static str,
}

impl WalkCtx {
    fn child(self, parent: &'static str) -> WalkCtx {
        // Everything inside a constant initializer is itself constant.
        let position = if self.position == GuardPosition::ConstInitializer {
            GuardPosition::ConstInitializer
        } else {
            GuardPosition::Expression
        };
        WalkCtx {
            position,
            parent,
            ..self
        }
    }
}

/// Walks trees and produces mutated units. One orchestrator per session: the
/// id counter and the placement registry span all units.
pub struct MutantOrchestrator<'a> {
    registry: &'a MutatorRegistry,
    options: &'a Options,
    placer: MutantPlacer,
    next_id: i32,
    mutants: Vec<Mutant>,
    /// Collect mutants as ignored instead of placing guards (denied units).
    ignore_reason: Option<String>,
}

impl<'a> MutantOrchestrator<'a> {
    pub fn new(registry: &'a MutatorRegistry, options: &'a Options) -> MutantOrchestrator<'a> {
        MutantOrchestrator {
            registry,
            options,
            placer: MutantPlacer::new(),
            next_id: 0,
            mutants: Vec::new(),
            ignore_reason: None,
        }
    }

    /// Mutate one unit. Returns `None` when the unit is skipped wholesale
    /// (generated code, or not matched by any include pattern).
    pub fn mutate_unit(
        &mut self,
        tree: &SyntaxTree,
        semantics: &SemanticModel,
    ) -> Option<MutatedUnit> {
        let path = tree.path.to_string_lossy().to_string();

        if tree.is_generated || GENERATED_PATH_MARKERS.iter().any(|m| path.contains(m)) {
            return None;
        }

        match self.options.mutate_decision(&path) {
            MutateDecision::Mutate => self.ignore_reason = None,
            MutateDecision::NotIncluded => return None,
            MutateDecision::Excluded { pattern } => {
                self.ignore_reason = Some(format!("excluded by pattern '{pattern}'"));
            }
        }

        let first_mutant = self.mutants.len();
        let mutated = self.walk_tree(tree, semantics);
        let mutants = self.mutants.split_off(first_mutant);

        Some(MutatedUnit {
            original: tree.clone(),
            mutated,
            mutants,
        })
    }

    pub fn into_registry(self) -> PlacementRegistry {
        self.placer.into_registry()
    }

    fn walk_tree(&mut self, tree: &SyntaxTree, semantics: &SemanticModel) -> SyntaxTree {
        let mut out = tree.clone();

        for ty in &mut out.types {
            if self.has_excluded_attribute(&ty.attributes) {
                continue;
            }

            for member in &mut ty.members {
                if self.has_excluded_attribute(&member.attributes) {
                    continue;
                }

                match &mut member.kind {
                    MemberKind::Method { body, .. } => {
                        let ctx = WalkCtx {
                            hit: HitKind::Normal,
                            position: GuardPosition::Expression,
                            parent: "method",
                        };
                        *body = self.walk_block(body, semantics, ctx);
                    }
                    MemberKind::StaticCtor { body } => {
                        // One-time initializer: hits are not test-scoped.
                        let ctx = WalkCtx {
                            hit: HitKind::Static,
                            position: GuardPosition::Expression,
                            parent: "static_ctor",
                        };
                        *body = self.walk_block(body, semantics, ctx);
                    }
                    MemberKind::Field {
                        init: Some(init),
                        is_const,
                        ..
                    } => {
                        // Field initializers are treated as one-time
                        // initializers; when in doubt the static hit wins.
                        let ctx = WalkCtx {
                            hit: HitKind::Static,
                            position: if *is_const {
                                GuardPosition::ConstInitializer
                            } else {
                                GuardPosition::Expression
                            },
                            parent: "field",
                        };
                        *init = self.walk_expr(init, semantics, ctx);
                    }
                    _ => {}
                }
            }
        }

        out
    }

    fn has_excluded_attribute(&self, attributes: &[String]) -> bool {
        attributes
            .iter()
            .any(|a| a == &self.options.excluded_attribute)
    }

    fn walk_block(&mut self, block: &Block, semantics: &SemanticModel, ctx: WalkCtx) -> Block {
        Block {
            statements: block
                .statements
                .iter()
                .map(|s| self.walk_stmt(s, semantics, ctx))
                .collect(),
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, semantics: &SemanticModel, ctx: WalkCtx) -> Stmt {
        let kind = match &stmt.kind {
            StmtKind::Expr(expr) => {
                // The whole expression-statement is the mutation site: a
                // conditional expression is not a legal statement-expression,
                // so mutations here go through statement placement.
                return self.mutate_expr_statement(stmt, expr, semantics, ctx);
            }
            StmtKind::LocalDecl {
                name,
                ty,
                init,
                is_const,
            } => {
                let init = init.as_ref().map(|e| {
                    let ctx = WalkCtx {
                        position: if *is_const {
                            GuardPosition::ConstInitializer
                        } else {
                            GuardPosition::Expression
                        },
                        parent: "local_decl",
                        ..ctx
                    };
                    self.walk_expr(e, semantics, ctx)
                });
                StmtKind::LocalDecl {
                    name: name.clone(),
                    ty: ty.clone(),
                    init,
                    is_const: *is_const,
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => StmtKind::If {
                cond: self.walk_expr(cond, semantics, ctx.child("if")),
                then_branch: self.walk_block(then_branch, semantics, ctx),
                else_branch: else_branch
                    .as_ref()
                    .map(|b| self.walk_block(b, semantics, ctx)),
            },
            StmtKind::While { cond, body } => StmtKind::While {
                cond: self.walk_expr(cond, semantics, ctx.child("while")),
                body: self.walk_block(body, semantics, ctx),
            },
            StmtKind::Return(expr) => StmtKind::Return(
                expr.as_ref()
                    .map(|e| self.walk_expr(e, semantics, ctx.child("return"))),
            ),
            StmtKind::MutantIf { .. } => stmt.kind.clone(),
        };

        Stmt {
            kind,
            span: stmt.span.clone(),
            trivia: stmt.trivia.clone(),
        }
    }

    fn mutate_expr_statement(
        &mut self,
        stmt: &Stmt,
        expr: &Expr,
        semantics: &SemanticModel,
        ctx: WalkCtx,
    ) -> Stmt {
        let mutations = self.collect_mutations(expr, semantics);
        let ids = self.track_mutants(&mutations, expr);

        let rewritten = self.walk_children(expr, semantics, ctx);
        let rewritten_stmt = Stmt {
            kind: StmtKind::Expr(rewritten),
            span: stmt.span.clone(),
            trivia: stmt.trivia.clone(),
        };

        if mutations.is_empty() || self.ignore_reason.is_some() {
            return rewritten_stmt;
        }

        let arms: Vec<GuardArm<Block>> = ids
            .iter()
            .zip(&mutations)
            .map(|(id, m)| GuardArm {
                id: *id,
                body: Block::single(Stmt {
                    kind: StmtKind::Expr(m.replacement.clone()),
                    span: stmt.span.clone(),
                    trivia: stmt.trivia.clone(),
                }),
            })
            .collect();

        let placement = PlacementContext {
            position: GuardPosition::Statement,
            hit: ctx.hit,
            parent: ctx.parent,
        };

        match self.placer.place_stmt(rewritten_stmt, arms, placement) {
            PlaceOutcome::Placed(guarded) => guarded,
            PlaceOutcome::Refused { original, reason } => {
                self.ignore_ids(&ids, reason);
                original
            }
        }
    }

    fn walk_expr(&mut self, expr: &Expr, semantics: &SemanticModel, ctx: WalkCtx) -> Expr {
        let mutations = self.collect_mutations(expr, semantics);
        let ids = self.track_mutants(&mutations, expr);

        let rewritten = self.walk_children(expr, semantics, ctx);

        if mutations.is_empty() || self.ignore_reason.is_some() {
            return rewritten;
        }

        let arms: Vec<GuardArm<Expr>> = ids
            .iter()
            .zip(&mutations)
            .map(|(id, m)| GuardArm {
                id: *id,
                body: m.replacement.clone(),
            })
            .collect();

        let placement = PlacementContext {
            position: ctx.position,
            hit: ctx.hit,
            parent: ctx.parent,
        };

        match self.placer.place_expr(rewritten, arms, placement) {
            PlaceOutcome::Placed(guarded) => guarded,
            PlaceOutcome::Refused { original, reason } => {
                self.ignore_ids(&ids, reason);
                original
            }
        }
    }

    fn collect_mutations(&self, expr: &Expr, semantics: &SemanticModel) -> Vec<Mutation> {
        self.registry
            .mutations_for(expr, semantics, self.options.level)
    }

    /// Allocate ids and track mutants for `mutations`, in catalog order.
    fn track_mutants(&mut self, mutations: &[Mutation], original: &Expr) -> Vec<MutantId> {
        mutations
            .iter()
            .map(|m| {
                let id = MutantId(self.next_id);
                self.next_id += 1;

                let mut mutant = Mutant::from_mutation(id, m, original);
                if let Some(reason) = &self.ignore_reason {
                    mutant.status = MutantStatus::Ignored;
                    mutant.status_reason = reason.clone();
                }
                self.mutants.push(mutant);
                id
            })
            .collect()
    }

    fn ignore_ids(&mut self, ids: &[MutantId], reason: &str) {
        for mutant in &mut self.mutants {
            if ids.contains(&mutant.id) {
                mutant.status = MutantStatus::Ignored;
                mutant.status_reason = reason.to_string();
            }
        }
    }

    fn walk_children(&mut self, expr: &Expr, semantics: &SemanticModel, ctx: WalkCtx) -> Expr {
        let kind = match &expr.kind {
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op: *op,
                lhs: Box::new(self.walk_expr(lhs, semantics, ctx.child("binary"))),
                rhs: Box::new(self.walk_expr(rhs, semantics, ctx.child("binary"))),
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: Box::new(self.walk_expr(operand, semantics, ctx.child("unary"))),
            },
            ExprKind::Update { op, prefix, target } => ExprKind::Update {
                op: *op,
                prefix: *prefix,
                // Update targets are storage locations; not a guard site.
                target: target.clone(),
            },
            ExprKind::Assign { op, target, value } => ExprKind::Assign {
                op: *op,
                target: target.clone(),
                value: Box::new(self.walk_expr(value, semantics, ctx.child("assignment"))),
            },
            ExprKind::Checked(inner) => ExprKind::Checked(Box::new(self.walk_expr(
                inner,
                semantics,
                ctx.child("checked"),
            ))),
            ExprKind::Conditional {
                cond,
                when_true,
                when_false,
            } => ExprKind::Conditional {
                cond: Box::new(self.walk_expr(cond, semantics, ctx.child("conditional"))),
                when_true: Box::new(self.walk_expr(when_true, semantics, ctx.child("conditional"))),
                when_false: Box::new(self.walk_expr(
                    when_false,
                    semantics,
                    ctx.child("conditional"),
                )),
            },
            ExprKind::MemberAccess {
                receiver,
                member,
                null_conditional,
            } => ExprKind::MemberAccess {
                receiver: Box::new(self.walk_expr(receiver, semantics, ctx.child("member_access"))),
                member: member.clone(),
                null_conditional: *null_conditional,
            },
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => ExprKind::MethodCall {
                receiver: receiver
                    .as_ref()
                    .map(|r| Box::new(self.walk_expr(r, semantics, ctx.child("method_call")))),
                method: method.clone(),
                args: args
                    .iter()
                    .map(|a| self.walk_expr(a, semantics, ctx.child("method_call")))
                    .collect(),
            },
            ExprKind::CollectionInit { elements } => ExprKind::CollectionInit {
                elements: elements
                    .iter()
                    .map(|e| self.walk_expr(e, semantics, ctx.child("collection_init")))
                    .collect(),
            },
            ExprKind::InterpolatedString(parts) => ExprKind::InterpolatedString(
                parts
                    .iter()
                    .map(|p| match p {
                        InterpPart::Hole(e) => InterpPart::Hole(self.walk_expr(
                            e,
                            semantics,
                            ctx.child("interpolation"),
                        )),
                        InterpPart::Text(t) => InterpPart::Text(t.clone()),
                    })
                    .collect(),
            ),
            _ => expr.kind.clone(),
        };

        Expr {
            kind,
            span: expr.span.clone(),
            trivia: expr.trivia.clone(),
        }
    }
}
