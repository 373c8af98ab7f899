//! Semantic elaboration (spec §4.3).
//!
//! There is no separate type-checking pass: [`crate::codegen::Codegen`]
//! calls the rules below at the moment it lowers each expression, so that
//! every node's type is determined exactly once, interleaved with IR
//! emission rather than precomputed into a side table (spec §9 "keep them
//! together but pass the `TypeInfo` of a sub-expression out of each
//! lowering call").

pub mod types;

use crate::ast::{BinaryOp, TypeExpr};
use crate::error::CompileError;
use crate::span::Span;
use types::Type;

/// Converts a parsed, syntactic type into the resolved type model. Named
/// types are left unresolved to `Type::Struct` since validating that the
/// name exists is the caller's job (it needs the struct registry, which
/// this free function intentionally does not take so it stays usable
/// before the registry exists, e.g. for parameter types during the
/// struct-predeclaration pass).
#[must_use]
pub fn resolve_type_expr(type_expr: &TypeExpr) -> Type {
    match type_expr {
        TypeExpr::Int => Type::Int,
        TypeExpr::Float => Type::Float,
        TypeExpr::Double => Type::Double,
        TypeExpr::Bool => Type::Bool,
        TypeExpr::Str => Type::Str,
        TypeExpr::Char => Type::Int,
        TypeExpr::Void => Type::Void,
        TypeExpr::Named(name) => Type::Struct(name.clone()),
        TypeExpr::Pointer(inner) => resolve_type_expr(inner).pointer_to(),
        TypeExpr::Array(element, size) => Type::Array(Box::new(resolve_type_expr(element)), size.unwrap_or(0)),
        // `map`/`list` are sugar over the runtime's C-ABI collection types
        // (spec §6 "Runtime ABI"); the element type is irrelevant to the
        // compiler's own type system once the opaque handle is chosen.
        TypeExpr::Map(..) | TypeExpr::List(..) => Type::Pointer(Box::new(Type::Void), 1),
    }
}

/// Result type of a binary arithmetic operator, applying the promotion
/// rules from spec §4.3 verbatim. Errors when the operands are not jointly
/// comparable/arithmetic-compatible.
pub fn binary_result_type(op: BinaryOp, lhs: &Type, rhs: &Type, span: Span) -> Result<Type, CompileError> {
    use BinaryOp::{
        Add, And, BitAnd, BitOr, BitXor, Div, Eq as OpEq, Gt, GtEq, Lt, LtEq, Mul, NotEq, Or, Rem, Shl, Shr, Sub,
    };
    match op {
        Add | Sub | Mul | Div | Rem | BitAnd | BitOr | BitXor | Shl | Shr => {
            if matches!(lhs, Type::Pointer(..)) && matches!(rhs, Type::Int) {
                return Ok(lhs.clone());
            }
            if matches!(lhs, Type::Pointer(..)) && matches!(rhs, Type::Pointer(..)) && matches!(op, Sub) {
                return Ok(Type::Int);
            }
            if !lhs.is_numeric() || !rhs.is_numeric() {
                return Err(CompileError::Semantic {
                    span,
                    message: format!("cannot apply `{op}` to `{lhs}` and `{rhs}`"),
                });
            }
            if lhs.is_floating() || rhs.is_floating() {
                Ok(Type::wider_float(lhs, rhs))
            } else {
                Ok(Type::Int)
            }
        }
        OpEq | NotEq | Lt | Gt | LtEq | GtEq => {
            let comparable = (lhs.is_numeric() && rhs.is_numeric())
                || (matches!(lhs, Type::Pointer(..)) && matches!(rhs, Type::Pointer(..)))
                || (matches!(lhs, Type::Bool) && matches!(rhs, Type::Bool))
                || (matches!(lhs, Type::Str) && matches!(rhs, Type::Str));
            if !comparable {
                return Err(CompileError::Semantic {
                    span,
                    message: format!("`{lhs}` and `{rhs}` are not comparable"),
                });
            }
            Ok(Type::Bool)
        }
        And | Or => {
            if !matches!(lhs, Type::Bool) || !matches!(rhs, Type::Bool) {
                return Err(CompileError::Semantic {
                    span,
                    message: format!("operands of `{op}` must be `bool`, found `{lhs}` and `{rhs}`"),
                });
            }
            Ok(Type::Bool)
        }
    }
}

/// Builds the standard "expected X, found Y, in <context>" message shape
/// used throughout semantic diagnostics (spec §4.3 "a contextual phrase").
#[must_use]
pub fn type_mismatch(expected: &Type, actual: &Type, context: &str, span: Span) -> CompileError {
    CompileError::Semantic { span, message: format!("expected `{expected}`, found `{actual}` {context}") }
}
