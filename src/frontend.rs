//! Language-frontend collaborator.
//!
//! Parsing and compilation are delegated across this seam. The shipped
//! `TreeFileFrontend` consumes pre-parsed `.ast.json` units and persists the
//! instrumented tree document; a real compiler frontend plugs in behind the
//! same trait.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::EngineError;
use crate::span::SourceSpan;
use crate::syntax::{
    BinaryOp, Expr, ExprKind, MemberKind, Stmt, StmtKind, SyntaxTree,
};

/// Coarse expression types the mutators care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Numeric,
    Bool,
    Str,
    Unknown,
}

impl TypeKind {
    /// Map a declared type name onto a kind.
    pub fn from_type_name(name: &str) -> TypeKind {
        match name {
            "int" | "uint" | "long" | "ulong" | "short" | "ushort" | "byte" | "sbyte"
            | "float" | "double" | "decimal" => TypeKind::Numeric,
            "bool" => TypeKind::Bool,
            "string" => TypeKind::Str,
            _ => TypeKind::Unknown,
        }
    }
}

/// Semantic information for one unit: declared identifier types plus local
/// structural inference.
#[derive(Debug, Clone, Default)]
pub struct SemanticModel {
    idents: BTreeMap<String, TypeKind>,
}

impl SemanticModel {
    /// Build the model by collecting declared types for fields, parameters
    /// and locals of `tree`.
    pub fn of(tree: &SyntaxTree) -> SemanticModel {
        let mut idents = BTreeMap::new();

        for ty in &tree.types {
            for member in &ty.members {
                match &member.kind {
                    MemberKind::Field { name, ty, .. } => {
                        idents.insert(name.clone(), TypeKind::from_type_name(ty));
                    }
                    MemberKind::Method { params, body, .. } => {
                        for p in params {
                            idents.insert(p.name.clone(), TypeKind::from_type_name(&p.ty));
                        }
                        collect_locals(&body.statements, &mut idents);
                    }
                    MemberKind::StaticCtor { body } => {
                        collect_locals(&body.statements, &mut idents);
                    }
                }
            }
        }

        SemanticModel { idents }
    }

    /// Infer the coarse type of an expression.
    pub fn expr_type(&self, expr: &Expr) -> TypeKind {
        match &expr.kind {
            ExprKind::IntLit(_) => TypeKind::Numeric,
            ExprKind::BoolLit(_) => TypeKind::Bool,
            ExprKind::StringLit(_) | ExprKind::InterpolatedString(_) => TypeKind::Str,
            ExprKind::Ident(name) => self.idents.get(name).copied().unwrap_or(TypeKind::Unknown),
            ExprKind::Unary { operand, .. } => self.expr_type(operand),
            ExprKind::Update { target, .. } => self.expr_type(target),
            ExprKind::Checked(inner) => self.expr_type(inner),
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_equality() || op.is_relational() || matches!(op, BinaryOp::And | BinaryOp::Or)
                {
                    TypeKind::Bool
                } else {
                    // String concatenation wins over numeric addition.
                    match (self.expr_type(lhs), self.expr_type(rhs)) {
                        (TypeKind::Str, _) | (_, TypeKind::Str) => TypeKind::Str,
                        (TypeKind::Numeric, _) | (_, TypeKind::Numeric) => TypeKind::Numeric,
                        _ => TypeKind::Unknown,
                    }
                }
            }
            ExprKind::Conditional { when_true, .. } => self.expr_type(when_true),
            _ => TypeKind::Unknown,
        }
    }
}

fn collect_locals(statements: &[Stmt], idents: &mut BTreeMap<String, TypeKind>) {
    for stmt in statements {
        match &stmt.kind {
            StmtKind::LocalDecl { name, ty, init, .. } => {
                if let Some(ty) = ty {
                    idents.insert(name.clone(), TypeKind::from_type_name(ty));
                } else if let Some(init) = init {
                    // `var` declarations: remember literal-backed types only.
                    let kind = match &init.kind {
                        ExprKind::IntLit(_) => TypeKind::Numeric,
                        ExprKind::BoolLit(_) => TypeKind::Bool,
                        ExprKind::StringLit(_) | ExprKind::InterpolatedString(_) => TypeKind::Str,
                        _ => TypeKind::Unknown,
                    };
                    idents.insert(name.clone(), kind);
                }
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_locals(&then_branch.statements, idents);
                if let Some(b) = else_branch {
                    collect_locals(&b.statements, idents);
                }
            }
            StmtKind::While { body, .. } => collect_locals(&body.statements, idents),
            _ => {}
        }
    }
}

/// One compiler diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub span: SourceSpan,
    pub message: String,
}

/// Result of handing the mutated trees to the compiler.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Ok,
    Errors(Vec<Diagnostic>),
}

impl CompileOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CompileOutcome::Ok)
    }
}

/// Parsing/compilation collaborator contract.
pub trait LanguageFrontend {
    /// Parse one compilation unit.
    fn parse(&self, path: &Path) -> Result<SyntaxTree, EngineError>;

    /// Semantic information for a parsed unit.
    fn semantics(&self, tree: &SyntaxTree) -> SemanticModel;

    /// Compile the (instrumented) trees into `output`.
    fn compile(&self, trees: &[SyntaxTree], output: &Path) -> Result<CompileOutcome>;
}

/// Frontend over pre-parsed `.ast.json` tree documents.
#[derive(Debug, Default)]
pub struct TreeFileFrontend;

impl LanguageFrontend for TreeFileFrontend {
    fn parse(&self, path: &Path) -> Result<SyntaxTree, EngineError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| EngineError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn semantics(&self, tree: &SyntaxTree) -> SemanticModel {
        SemanticModel::of(tree)
    }

    fn compile(&self, trees: &[SyntaxTree], output: &Path) -> Result<CompileOutcome> {
        let mut errors = Vec::new();
        for tree in trees {
            validate_tree(tree, &mut errors);
        }
        if !errors.is_empty() {
            return Ok(CompileOutcome::Errors(errors));
        }

        let json = serde_json::to_string_pretty(trees).context("serialize instrumented trees")?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output dir {:?}", parent))?;
        }
        fs::write(output, json).with_context(|| format!("failed to write {:?}", output))?;
        Ok(CompileOutcome::Ok)
    }
}

/// Reject guards in positions the language cannot host them: constant
/// initializers must stay compile-time constant.
fn validate_tree(tree: &SyntaxTree, errors: &mut Vec<Diagnostic>) {
    for ty in &tree.types {
        for member in &ty.members {
            match &member.kind {
                MemberKind::Field {
                    init: Some(init),
                    is_const: true,
                    ..
                } => reject_guards(init, errors),
                MemberKind::Method { body, .. } | MemberKind::StaticCtor { body } => {
                    for stmt in &body.statements {
                        if let StmtKind::LocalDecl {
                            init: Some(init),
                            is_const: true,
                            ..
                        } = &stmt.kind
                        {
                            reject_guards(init, errors);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn reject_guards(expr: &Expr, errors: &mut Vec<Diagnostic>) {
    if let ExprKind::MutantSwitch { .. } = &expr.kind {
        errors.push(Diagnostic {
            span: expr.span.clone(),
            message: "constant initializer is not a compile-time constant".to_string(),
        });
        return;
    }
    visit_children(expr, &mut |child| reject_guards(child, errors));
}

fn visit_children(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    match &expr.kind {
        ExprKind::Binary { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        ExprKind::Unary { operand, .. } => f(operand),
        ExprKind::Update { target, .. } => f(target),
        ExprKind::Assign { target, value, .. } => {
            f(target);
            f(value);
        }
        ExprKind::Checked(inner) => f(inner),
        ExprKind::Conditional {
            cond,
            when_true,
            when_false,
        } => {
            f(cond);
            f(when_true);
            f(when_false);
        }
        ExprKind::MemberAccess { receiver, .. } => f(receiver),
        ExprKind::MethodCall { receiver, args, .. } => {
            if let Some(r) = receiver {
                f(r);
            }
            for a in args {
                f(a);
            }
        }
        ExprKind::CollectionInit { elements } => {
            for e in elements {
                f(e);
            }
        }
        ExprKind::MutantSwitch { arms, original, .. } => {
            for arm in arms {
                f(&arm.body);
            }
            f(original);
        }
        ExprKind::InterpolatedString(parts) => {
            for p in parts {
                if let crate::syntax::InterpPart::Hole(e) = p {
                    f(e);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutant::MutantId;
    use crate::syntax::{Block, GuardArm, HitKind, Param};

    fn span() -> SourceSpan {
        SourceSpan::new("src/calc.cs", 0, 1, 1, 1)
    }

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.into()), span())
    }

    #[test]
    fn model_types_params_and_fields() {
        let tree = SyntaxTree {
            path: "src/calc.cs".into(),
            is_generated: false,
            types: vec![crate::syntax::TypeDecl {
                name: "Calc".into(),
                attributes: Vec::new(),
                members: vec![
                    crate::syntax::Member {
                        kind: MemberKind::Field {
                            name: "greeting".into(),
                            ty: "string".into(),
                            init: None,
                            is_static: false,
                            is_const: false,
                        },
                        attributes: Vec::new(),
                        span: span(),
                    },
                    crate::syntax::Member {
                        kind: MemberKind::Method {
                            name: "Add".into(),
                            params: vec![Param {
                                name: "a".into(),
                                ty: "int".into(),
                            }],
                            body: Default::default(),
                            is_static: false,
                        },
                        attributes: Vec::new(),
                        span: span(),
                    },
                ],
                span: span(),
            }],
        };

        let model = SemanticModel::of(&tree);
        assert_eq!(model.expr_type(&ident("greeting")), TypeKind::Str);
        assert_eq!(model.expr_type(&ident("a")), TypeKind::Numeric);
        assert_eq!(model.expr_type(&ident("unknown")), TypeKind::Unknown);
    }

    #[test]
    fn string_concat_wins_over_numeric_add() {
        let model = SemanticModel::default();
        let concat = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::new(ExprKind::StringLit("a".into()), span())),
                rhs: Box::new(Expr::new(ExprKind::IntLit(1), span())),
            },
            span(),
        );
        assert_eq!(model.expr_type(&concat), TypeKind::Str);

        let sum = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::new(ExprKind::IntLit(1), span())),
                rhs: Box::new(Expr::new(ExprKind::IntLit(2), span())),
            },
            span(),
        );
        assert_eq!(model.expr_type(&sum), TypeKind::Numeric);
    }

    #[test]
    fn compile_rejects_guards_left_in_const_initializers() {
        let guard = Expr::new(
            ExprKind::MutantSwitch {
                arms: vec![GuardArm {
                    id: MutantId(0),
                    body: Expr::new(ExprKind::IntLit(2), span()),
                }],
                original: Box::new(Expr::new(ExprKind::IntLit(1), span())),
                hit: HitKind::Static,
            },
            SourceSpan::new("src/calc.cs", 10, 15, 1, 11),
        );

        // Direct guard in a const field, nested guard in a const local.
        let nested = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(guard.clone()),
                rhs: Box::new(Expr::new(ExprKind::IntLit(3), span())),
            },
            span(),
        );

        let tree = SyntaxTree {
            path: "src/calc.cs".into(),
            is_generated: false,
            types: vec![crate::syntax::TypeDecl {
                name: "Calc".into(),
                attributes: Vec::new(),
                members: vec![
                    crate::syntax::Member {
                        kind: MemberKind::Field {
                            name: "LIMIT".into(),
                            ty: "int".into(),
                            init: Some(guard.clone()),
                            is_static: true,
                            is_const: true,
                        },
                        attributes: Vec::new(),
                        span: span(),
                    },
                    crate::syntax::Member {
                        kind: MemberKind::Method {
                            name: "Use".into(),
                            params: Vec::new(),
                            body: Block::single(Stmt {
                                kind: StmtKind::LocalDecl {
                                    name: "bound".into(),
                                    ty: Some("int".into()),
                                    init: Some(nested),
                                    is_const: true,
                                },
                                span: span(),
                                trivia: Default::default(),
                            }),
                            is_static: false,
                        },
                        attributes: Vec::new(),
                        span: span(),
                    },
                ],
                span: span(),
            }],
        };

        let outcome = TreeFileFrontend
            .compile(
                std::slice::from_ref(&tree),
                Path::new("target/never-written.json"),
            )
            .expect("compile call itself succeeds");

        let CompileOutcome::Errors(diags) = outcome else {
            panic!("guards in const initializers must fail validation");
        };

        assert_eq!(diags.len(), 2, "one diagnostic per const guard");
        for diag in &diags {
            assert_eq!(
                diag.message,
                "constant initializer is not a compile-time constant"
            );
        }
        assert_eq!(diags[0].span, guard.span);
    }

    #[test]
    fn comparisons_are_bool() {
        let model = SemanticModel::default();
        let cmp = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Lt,
                lhs: Box::new(Expr::new(ExprKind::IntLit(1), span())),
                rhs: Box::new(Expr::new(ExprKind::IntLit(2), span())),
            },
            span(),
        );
        assert_eq!(model.expr_type(&cmp), TypeKind::Bool);
    }
}
