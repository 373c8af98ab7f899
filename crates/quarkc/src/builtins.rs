//! The builtin library (spec §4.5): a registry mapping names to IR
//! templates. Each template is an instance of [`BuiltinTemplate`], the
//! trait spec §9's design notes call for ("a trait with one method
//! `emit(ctx, args) → Value`; the registry stores instances of this
//! trait"). A declaration is materialized — an extern prototype emitted
//! into the module — the first time a name is actually called.

use std::collections::HashMap;
use std::marker::PhantomData;

use inkwell::values::BasicValueEnum;
use inkwell::AddressSpace;

use crate::ast::Expr;
use crate::codegen::Codegen;
use crate::error::{CompileError, CompileResult, SemanticError};
use crate::semantic::types::Type;

pub trait BuiltinTemplate {
    /// Emits the call-site-specific IR for one invocation. Argument
    /// expressions are passed unevaluated so variadic templates (`print`,
    /// `format`, `min`, `max`, `clamp`) can inspect each argument's static
    /// type before deciding how to lower it (spec §4.4.6).
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)>;
}

pub struct BuiltinRegistry<'ctx> {
    templates: HashMap<&'static str, Box<dyn BuiltinTemplate>>,
    _marker: PhantomData<&'ctx ()>,
}

impl<'ctx> BuiltinRegistry<'ctx> {
    #[must_use]
    pub fn standard() -> Self {
        let mut templates: HashMap<&'static str, Box<dyn BuiltinTemplate>> = HashMap::new();
        templates.insert("print", Box::new(PrintTemplate));
        templates.insert("format", Box::new(FormatTemplate));
        templates.insert("to_string", Box::new(ToStringTemplate));
        templates.insert("to_int", Box::new(ToIntTemplate));
        templates.insert("readline", Box::new(ReadlineTemplate));
        templates.insert("sleep", Box::new(LibcCallTemplate { symbol: "sleep", arg_is_float: false }));
        for name in ["sqrt", "sin", "cos", "tan", "floor", "ceil", "pow", "log"] {
            templates.insert(name, Box::new(MathTemplate { libm_name: leak(format!("{name}")) }));
        }
        templates.insert("abs_i32", Box::new(AbsI32Template));
        templates.insert("abs_f64", Box::new(AbsF64Template));
        templates.insert("min_i32", Box::new(MinMaxI32Template { is_min: true }));
        templates.insert("max_i32", Box::new(MinMaxI32Template { is_min: false }));
        templates.insert("min_f64", Box::new(MinMaxF64Template { is_min: true }));
        templates.insert("max_f64", Box::new(MinMaxF64Template { is_min: false }));
        templates.insert("min", Box::new(MinMaxTemplate { is_min: true }));
        templates.insert("max", Box::new(MinMaxTemplate { is_min: false }));
        templates.insert("clamp_i32", Box::new(ClampI32Template));
        templates.insert("clamp_f64", Box::new(ClampF64Template));
        templates.insert("clamp", Box::new(ClampTemplate));
        templates.insert("str_concat", Box::new(StrConcatTemplate));
        templates.insert("str_len", Box::new(StrLenTemplate));
        templates.insert("str_length", Box::new(StrLenTemplate));
        templates.insert("str_starts_with", Box::new(StrPrefixSuffixTemplate { suffix: false }));
        templates.insert("str_ends_with", Box::new(StrPrefixSuffixTemplate { suffix: true }));
        templates.insert("str_find", Box::new(StrFindTemplate));
        templates.insert("str_slice", Box::new(StrSliceTemplate));
        templates.insert("str_replace", Box::new(StrReplaceTemplate));
        templates.insert("str_split", Box::new(StrSplitTemplate));
        templates.insert("array_length", Box::new(ArrayLengthTemplate));
        templates.insert("array_push", Box::new(ArrayPushTemplate));
        templates.insert("array_pop", Box::new(ArrayPopTemplate));
        templates.insert("array_slice", Box::new(ArraySliceTemplate));
        templates.insert("array_free", Box::new(ArrayFreeTemplate));
        Self { templates, _marker: PhantomData }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn BuiltinTemplate> {
        self.templates.get(name).map(std::convert::AsRef::as_ref)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

/// Builtins whose IR depends on the host C library (`printf`/`stdio`,
/// libm, or `sleep(3)`) and are therefore unreachable in freestanding
/// programs (spec §4.7 "freestanding mode ... disables builtins that
/// depend on it"). Array-header and string-slicing builtins are excluded:
/// they are compiler-owned ABI detail (spec §4.4.4), not libc calls.
#[must_use]
pub fn requires_libc(name: &str) -> bool {
    matches!(
        name,
        "print"
            | "format"
            | "readline"
            | "sleep"
            | "sqrt"
            | "sin"
            | "cos"
            | "tan"
            | "floor"
            | "ceil"
            | "pow"
            | "log"
            | "abs_f64"
            | "to_string"
            | "to_int"
            | "str_len"
            | "str_length"
            | "str_starts_with"
            | "str_ends_with"
            | "str_find"
            | "str_slice"
            | "str_replace"
            | "str_split"
            | "str_concat"
            | "array_push"
            | "array_pop"
            | "array_slice"
            | "array_free"
    )
}

/// Interns a short-lived owned string as `'static` for the handful of
/// templates whose libm symbol name is otherwise identical to the builtin
/// name; avoids hand-listing the mapping twice.
fn leak(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

// ---- variadic, call-site-specialized templates (spec §4.4.6) ------------

struct PrintTemplate;

impl BuiltinTemplate for PrintTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let printf = ctx.declare_printf();
        let mut fmt = String::new();
        let mut call_args: Vec<inkwell::values::BasicMetadataValueEnum<'ctx>> = Vec::new();
        let mut temporaries = Vec::new();
        for arg in args {
            let (value, ty) = ctx.lower_expr(arg, builtins)?;
            match ty {
                Type::Str => {
                    fmt.push_str("%s");
                    call_args.push(value.into());
                }
                Type::Int | Type::Bool => {
                    fmt.push_str("%d");
                    call_args.push(value.into());
                }
                Type::Float | Type::Double => {
                    fmt.push_str("%f");
                    call_args.push(value.into());
                }
                _ => {
                    // Auto-stringify anything else, per spec §4.4.3's temporary
                    // freed immediately after use.
                    let spec = "%d";
                    let buf = ctx.build_stringify_scalar(value, spec, "print.tmp")?;
                    fmt.push_str("%s");
                    call_args.push(buf.into());
                    temporaries.push(buf);
                }
            }
        }
        fmt.push('\n');
        let fmt_ptr = ctx.build_string_literal(&fmt)?;
        let mut full_args: Vec<inkwell::values::BasicMetadataValueEnum<'ctx>> = vec![fmt_ptr.into()];
        full_args.extend(call_args);
        ctx.builder.build_call(printf, &full_args, "print.call").map_err(crate::codegen::internal_err)?;
        for temp in temporaries {
            ctx.build_free(temp)?;
        }
        Ok((ctx.context.i32_type().const_zero().into(), Type::Void))
    }
}

struct FormatTemplate;

impl BuiltinTemplate for FormatTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let Some((fmt_expr, rest)) = args.split_first() else {
            return Err(CompileError::Semantic { span: crate::span::Span::default(), message: "`format` requires a format string".to_owned() });
        };
        let crate::ast::ExprKind::String(literal) = &fmt_expr.kind else {
            return Err(CompileError::Semantic { span: fmt_expr.span, message: "`format`'s first argument must be a string literal".to_owned() });
        };
        let placeholder_count = literal.matches("{}").count();
        if placeholder_count != rest.len() {
            // Open Question (spec §9) resolved: arity mismatch on a literal
            // format string is a compile-time error, not read past the
            // vararg list at runtime.
            return Err(CompileError::SemanticTyped {
                span: fmt_expr.span,
                kind: SemanticError::FormatArityMismatch { expected: placeholder_count, found: rest.len() },
            });
        }

        let mut pieces: Vec<String> = literal.split("{}").map(str::to_owned).collect();
        let mut result_ptr: Option<inkwell::values::PointerValue<'ctx>> = None;
        for (index, arg) in rest.iter().enumerate() {
            let (value, ty) = ctx.lower_expr(arg, builtins)?;
            let stringified = stringify_for_format(ctx, value, &ty)?;
            let literal_piece = ctx.build_string_literal(&pieces[index])?;
            result_ptr = Some(append_owned_strings(ctx, result_ptr, literal_piece, false)?);
            result_ptr = Some(append_owned_strings(ctx, result_ptr, stringified.0, stringified.1)?);
        }
        let tail = ctx.build_string_literal(pieces.pop().unwrap_or_default().as_str())?;
        result_ptr = Some(append_owned_strings(ctx, result_ptr, tail, false)?);

        let final_ptr = result_ptr.unwrap_or(ctx.build_string_literal("")?);
        Ok((final_ptr.into(), Type::Str))
    }
}

/// Stringifies one `format`/`print` argument, returning the pointer and
/// whether it is a freshly owned allocation the caller must free after
/// concatenating it (spec §4.4.3's temporary-ownership policy).
fn stringify_for_format<'ctx>(
    ctx: &mut Codegen<'ctx>,
    value: BasicValueEnum<'ctx>,
    ty: &Type,
) -> CompileResult<(inkwell::values::PointerValue<'ctx>, bool)> {
    match ty {
        Type::Str => Ok((value.into_pointer_value(), false)),
        Type::Int | Type::Bool => Ok((ctx.build_stringify_scalar(value, "%d", "fmt.int")?, true)),
        Type::Float | Type::Double => Ok((ctx.build_stringify_scalar(value, "%f", "fmt.float")?, true)),
        _ => Ok((ctx.build_stringify_scalar(value, "%p", "fmt.ptr")?, true)),
    }
}

/// Concatenates `next` onto the running `acc` (or starts fresh with
/// `next`'s own bytes if `acc` is `None`), freeing `next` immediately if it
/// was itself a temporary, per the freshly-allocated-temporaries-used-once
/// rule (spec §4.4.3).
fn append_owned_strings<'ctx>(
    ctx: &mut Codegen<'ctx>,
    acc: Option<inkwell::values::PointerValue<'ctx>>,
    next: inkwell::values::PointerValue<'ctx>,
    next_is_owned: bool,
) -> CompileResult<inkwell::values::PointerValue<'ctx>> {
    let combined = match acc {
        None => {
            let len = ctx.build_libc_strlen(next)?;
            let buf = ctx.build_string_alloc(len, "format.acc")?;
            ctx.build_libc_memcpy(buf, next, len)?;
            ctx.build_libc_write_nul(buf, len)?;
            buf
        }
        Some(acc_ptr) => {
            let acc_len = ctx.build_libc_strlen(acc_ptr)?;
            let next_len = ctx.build_libc_strlen(next)?;
            let total = ctx.builder.build_int_add(acc_len, next_len, "format.total").map_err(crate::codegen::internal_err)?;
            let buf = ctx.build_string_alloc(total, "format.acc")?;
            ctx.build_libc_memcpy(buf, acc_ptr, acc_len)?;
            let tail = ctx.build_offset_ptr(buf, acc_len)?;
            ctx.build_libc_memcpy(tail, next, next_len)?;
            ctx.build_libc_write_nul(buf, total)?;
            ctx.build_free(acc_ptr)?;
            buf
        }
    };
    if next_is_owned {
        ctx.build_free(next)?;
    }
    Ok(combined)
}

struct ToStringTemplate;

impl BuiltinTemplate for ToStringTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let arg = args.first().ok_or_else(|| arity_error("to_string", 1))?;
        let (value, ty) = ctx.lower_expr(arg, builtins)?;
        let (ptr, _) = stringify_for_format(ctx, value, &ty)?;
        Ok((ptr.into(), Type::Str))
    }
}

struct ToIntTemplate;

impl BuiltinTemplate for ToIntTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let arg = args.first().ok_or_else(|| arity_error("to_int", 1))?;
        let (value, ty) = ctx.lower_expr(arg, builtins)?;
        let i32_ty = ctx.context.i32_type();
        let result = match ty {
            Type::Str => {
                let atoi = ctx.declare_extern_c("atoi", i32_ty.fn_type(&[ctx.context.ptr_type(AddressSpace::default()).into()], false));
                ctx.builder
                    .build_call(atoi, &[value.into()], "atoi.call")
                    .map_err(crate::codegen::internal_err)?
                    .try_as_basic_value()
                    .left()
                    .expect("atoi returns i32")
            }
            Type::Float | Type::Double => ctx
                .builder
                .build_float_to_signed_int(value.into_float_value(), i32_ty, "to_int")
                .map_err(crate::codegen::internal_err)?
                .into(),
            Type::Bool => ctx
                .builder
                .build_int_z_extend(value.into_int_value(), i32_ty, "to_int")
                .map_err(crate::codegen::internal_err)?
                .into(),
            _ => value,
        };
        Ok((result, Type::Int))
    }
}

struct MinMaxTemplate {
    is_min: bool,
}

impl BuiltinTemplate for MinMaxTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (lhs, lhs_ty) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("min/max", 2))?, builtins)?;
        let (rhs, rhs_ty) = ctx.lower_expr(args.get(1).ok_or_else(|| arity_error("min/max", 2))?, builtins)?;
        if lhs_ty.is_floating() || rhs_ty.is_floating() {
            Ok((ctx.build_select_f64(self.is_min, lhs, rhs)?, Type::Double))
        } else {
            Ok((ctx.build_select_i32(self.is_min, lhs, rhs)?, Type::Int))
        }
    }
}

struct ClampTemplate;

impl BuiltinTemplate for ClampTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 3 {
            return Err(arity_error("clamp", 3));
        }
        let (value, value_ty) = ctx.lower_expr(&args[0], builtins)?;
        let (lo, _) = ctx.lower_expr(&args[1], builtins)?;
        let (hi, _) = ctx.lower_expr(&args[2], builtins)?;
        if value_ty.is_floating() {
            let clamped_lo = ctx.build_select_f64(false, value, lo)?;
            let clamped = ctx.build_select_f64(true, clamped_lo, hi)?;
            Ok((clamped, Type::Double))
        } else {
            let clamped_lo = ctx.build_select_i32(false, value, lo)?;
            let clamped = ctx.build_select_i32(true, clamped_lo, hi)?;
            Ok((clamped, Type::Int))
        }
    }
}

// ---- fixed-signature templates (typed variants, math, libc wrappers) ----

struct AbsI32Template;

impl BuiltinTemplate for AbsI32Template {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("abs_i32", 1))?, builtins)?;
        let zero = ctx.context.i32_type().const_zero();
        let negated = ctx.builder.build_int_neg(value.into_int_value(), "neg").map_err(crate::codegen::internal_err)?;
        let is_negative = ctx
            .builder
            .build_int_compare(inkwell::IntPredicate::SLT, value.into_int_value(), zero, "is_neg")
            .map_err(crate::codegen::internal_err)?;
        let result = ctx.builder.build_select(is_negative, negated, value.into_int_value(), "abs").map_err(crate::codegen::internal_err)?;
        Ok((result, Type::Int))
    }
}

struct AbsF64Template;

impl BuiltinTemplate for AbsF64Template {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("abs_f64", 1))?, builtins)?;
        let fabs = ctx.declare_extern_c("fabs", ctx.context.f64_type().fn_type(&[ctx.context.f64_type().into()], false));
        let call = ctx.builder.build_call(fabs, &[value.into()], "fabs.call").map_err(crate::codegen::internal_err)?;
        Ok((call.try_as_basic_value().left().expect("fabs returns f64"), Type::Double))
    }
}

struct MinMaxI32Template {
    is_min: bool,
}

impl BuiltinTemplate for MinMaxI32Template {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (lhs, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("min_i32/max_i32", 2))?, builtins)?;
        let (rhs, _) = ctx.lower_expr(args.get(1).ok_or_else(|| arity_error("min_i32/max_i32", 2))?, builtins)?;
        Ok((ctx.build_select_i32(self.is_min, lhs, rhs)?, Type::Int))
    }
}

struct MinMaxF64Template {
    is_min: bool,
}

impl BuiltinTemplate for MinMaxF64Template {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (lhs, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("min_f64/max_f64", 2))?, builtins)?;
        let (rhs, _) = ctx.lower_expr(args.get(1).ok_or_else(|| arity_error("min_f64/max_f64", 2))?, builtins)?;
        Ok((ctx.build_select_f64(self.is_min, lhs, rhs)?, Type::Double))
    }
}

struct ClampI32Template;

impl BuiltinTemplate for ClampI32Template {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 3 {
            return Err(arity_error("clamp_i32", 3));
        }
        let (value, _) = ctx.lower_expr(&args[0], builtins)?;
        let (lo, _) = ctx.lower_expr(&args[1], builtins)?;
        let (hi, _) = ctx.lower_expr(&args[2], builtins)?;
        let lower_bounded = ctx.build_select_i32(false, value, lo)?;
        let result = ctx.build_select_i32(true, lower_bounded, hi)?;
        Ok((result, Type::Int))
    }
}

struct ClampF64Template;

impl BuiltinTemplate for ClampF64Template {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 3 {
            return Err(arity_error("clamp_f64", 3));
        }
        let (value, _) = ctx.lower_expr(&args[0], builtins)?;
        let (lo, _) = ctx.lower_expr(&args[1], builtins)?;
        let (hi, _) = ctx.lower_expr(&args[2], builtins)?;
        let lower_bounded = ctx.build_select_f64(false, value, lo)?;
        let result = ctx.build_select_f64(true, lower_bounded, hi)?;
        Ok((result, Type::Double))
    }
}

struct MathTemplate {
    libm_name: &'static str,
}

impl BuiltinTemplate for MathTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error(self.libm_name, 1))?, builtins)?;
        let f64_ty = ctx.context.f64_type();
        let func = ctx.declare_extern_c(self.libm_name, f64_ty.fn_type(&[f64_ty.into()], false));
        let call = ctx.builder.build_call(func, &[value.into()], "math.call").map_err(crate::codegen::internal_err)?;
        Ok((call.try_as_basic_value().left().expect("libm fn returns f64"), Type::Double))
    }
}

struct LibcCallTemplate {
    symbol: &'static str,
    arg_is_float: bool,
}

impl BuiltinTemplate for LibcCallTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error(self.symbol, 1))?, builtins)?;
        let param_ty: inkwell::types::BasicTypeEnum = if self.arg_is_float { ctx.context.f64_type().into() } else { ctx.context.i32_type().into() };
        let func = ctx.declare_extern_c(self.symbol, ctx.context.i32_type().fn_type(&[param_ty.into()], false));
        ctx.builder.build_call(func, &[value.into()], "libc.call").map_err(crate::codegen::internal_err)?;
        Ok((ctx.context.i32_type().const_zero().into(), Type::Void))
    }
}

struct ReadlineTemplate;

impl BuiltinTemplate for ReadlineTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, _args: &[Expr], _builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let ptr_ty = ctx.context.ptr_type(AddressSpace::default());
        let i32_ty = ctx.context.i32_type();
        let buf = ctx.build_malloc(i32_ty.const_int(4096, false), "readline.buf")?;
        let fgets = ctx.declare_extern_c("fgets", ptr_ty.fn_type(&[ptr_ty.into(), i32_ty.into(), ptr_ty.into()], false));
        let stdin = ctx.declare_extern_c("__quark_stdin_handle", ptr_ty.fn_type(&[], false));
        let handle = ctx.builder.build_call(stdin, &[], "stdin.call").map_err(crate::codegen::internal_err)?;
        let handle_value = handle.try_as_basic_value().left().expect("stdin handle");
        let cap = i32_ty.const_int(4096, false);
        ctx.builder
            .build_call(fgets, &[buf.into(), cap.into(), handle_value.into()], "fgets.call")
            .map_err(crate::codegen::internal_err)?;
        Ok((buf.into(), Type::Str))
    }
}

// ---- string builtins, built from libc primitives (spec §4.7's note that
// non-freestanding builds link the host C library) ------------------------

struct StrLenTemplate;

impl BuiltinTemplate for StrLenTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("str_len", 1))?, builtins)?;
        let len = ctx.build_libc_strlen(value.into_pointer_value())?;
        Ok((len.into(), Type::Int))
    }
}

struct StrConcatTemplate;

impl BuiltinTemplate for StrConcatTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 2 {
            return Err(arity_error("str_concat", 2));
        }
        let (lhs, _) = ctx.lower_expr(&args[0], builtins)?;
        let (rhs, _) = ctx.lower_expr(&args[1], builtins)?;
        let ptr = append_owned_strings(ctx, Some(lhs.into_pointer_value()), rhs.into_pointer_value(), false)?;
        Ok((ptr.into(), Type::Str))
    }
}

struct StrPrefixSuffixTemplate {
    suffix: bool,
}

impl BuiltinTemplate for StrPrefixSuffixTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 2 {
            return Err(arity_error("str_starts_with/str_ends_with", 2));
        }
        let (haystack, _) = ctx.lower_expr(&args[0], builtins)?;
        let (needle, _) = ctx.lower_expr(&args[1], builtins)?;
        let base = if self.suffix {
            let hay_len = ctx.build_libc_strlen(haystack.into_pointer_value())?;
            let needle_len = ctx.build_libc_strlen(needle.into_pointer_value())?;
            let offset = ctx.builder.build_int_sub(hay_len, needle_len, "suffix.offset").map_err(crate::codegen::internal_err)?;
            ctx.build_offset_ptr(haystack.into_pointer_value(), offset)?
        } else {
            haystack.into_pointer_value()
        };
        let needle_len = ctx.build_libc_strlen(needle.into_pointer_value())?;
        let strncmp = ctx.declare_extern_c(
            "strncmp",
            ctx.context.i32_type().fn_type(
                &[ctx.context.ptr_type(AddressSpace::default()).into(), ctx.context.ptr_type(AddressSpace::default()).into(), ctx.context.i64_type().into()],
                false,
            ),
        );
        let needle_len64 = ctx.builder.build_int_z_extend(needle_len, ctx.context.i64_type(), "len64").map_err(crate::codegen::internal_err)?;
        let call = ctx
            .builder
            .build_call(strncmp, &[base.into(), needle.into(), needle_len64.into()], "strncmp.call")
            .map_err(crate::codegen::internal_err)?;
        let result = call.try_as_basic_value().left().expect("strncmp returns i32").into_int_value();
        let zero = ctx.context.i32_type().const_zero();
        let eq = ctx.builder.build_int_compare(inkwell::IntPredicate::EQ, result, zero, "eq").map_err(crate::codegen::internal_err)?;
        Ok((eq.into(), Type::Bool))
    }
}

struct StrFindTemplate;

impl BuiltinTemplate for StrFindTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 2 {
            return Err(arity_error("str_find", 2));
        }
        let (haystack, _) = ctx.lower_expr(&args[0], builtins)?;
        let (needle, _) = ctx.lower_expr(&args[1], builtins)?;
        let ptr_ty = ctx.context.ptr_type(AddressSpace::default());
        let strstr = ctx.declare_extern_c("strstr", ptr_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false));
        let call = ctx.builder.build_call(strstr, &[haystack.into(), needle.into()], "strstr.call").map_err(crate::codegen::internal_err)?;
        let found = call.try_as_basic_value().left().expect("strstr returns ptr").into_pointer_value();
        let is_null = ctx.builder.build_is_null(found, "is_null").map_err(crate::codegen::internal_err)?;
        let base_diff = ctx.build_pointer_diff(found, haystack.into_pointer_value())?;
        let neg_one = ctx.context.i32_type().const_int(u64::MAX, true);
        let result = ctx.builder.build_select(is_null, neg_one, base_diff, "find.result").map_err(crate::codegen::internal_err)?;
        Ok((result, Type::Int))
    }
}

struct StrSliceTemplate;

impl BuiltinTemplate for StrSliceTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 3 {
            return Err(arity_error("str_slice", 3));
        }
        let (source, _) = ctx.lower_expr(&args[0], builtins)?;
        let (start, _) = ctx.lower_expr(&args[1], builtins)?;
        let (end, _) = ctx.lower_expr(&args[2], builtins)?;
        let len = ctx.builder.build_int_sub(end.into_int_value(), start.into_int_value(), "slice.len").map_err(crate::codegen::internal_err)?;
        let buf = ctx.build_string_alloc(len, "slice.buf")?;
        let src_offset = ctx.build_offset_ptr(source.into_pointer_value(), start.into_int_value())?;
        ctx.build_libc_memcpy(buf, src_offset, len)?;
        ctx.build_libc_write_nul(buf, len)?;
        Ok((buf.into(), Type::Str))
    }
}

struct StrReplaceTemplate;

impl BuiltinTemplate for StrReplaceTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 3 {
            return Err(arity_error("str_replace", 3));
        }
        // A single-occurrence replace built from `strstr` plus two
        // `memcpy`s; repeated application handles multiple occurrences.
        let (source, _) = ctx.lower_expr(&args[0], builtins)?;
        let (from, _) = ctx.lower_expr(&args[1], builtins)?;
        let (to, _) = ctx.lower_expr(&args[2], builtins)?;
        let ptr_ty = ctx.context.ptr_type(AddressSpace::default());
        let strstr = ctx.declare_extern_c("strstr", ptr_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false));
        let call = ctx.builder.build_call(strstr, &[source.into(), from.into()], "strstr.call").map_err(crate::codegen::internal_err)?;
        let found = call.try_as_basic_value().left().expect("strstr returns ptr").into_pointer_value();
        let prefix_len = ctx.build_pointer_diff(found, source.into_pointer_value())?;
        let from_len = ctx.build_libc_strlen(from.into_pointer_value())?;
        let to_len = ctx.build_libc_strlen(to.into_pointer_value())?;
        let suffix_start = ctx.build_offset_ptr(found, from_len)?;
        let suffix_len = ctx.build_libc_strlen(suffix_start)?;
        let total = ctx
            .builder
            .build_int_add(ctx.builder.build_int_add(prefix_len, to_len, "t1").map_err(crate::codegen::internal_err)?, suffix_len, "total")
            .map_err(crate::codegen::internal_err)?;
        let buf = ctx.build_string_alloc(total, "replace.buf")?;
        ctx.build_libc_memcpy(buf, source.into_pointer_value(), prefix_len)?;
        let after_prefix = ctx.build_offset_ptr(buf, prefix_len)?;
        ctx.build_libc_memcpy(after_prefix, to.into_pointer_value(), to_len)?;
        let tail_dst = ctx.build_offset_ptr(after_prefix, to_len)?;
        ctx.build_libc_memcpy(tail_dst, suffix_start, suffix_len)?;
        ctx.build_libc_write_nul(buf, total)?;
        Ok((buf.into(), Type::Str))
    }
}

struct StrSplitTemplate;

impl BuiltinTemplate for StrSplitTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 2 {
            return Err(arity_error("str_split", 2));
        }
        // Returns a `str[]` of exactly two halves around the first
        // occurrence of the separator; a fuller N-way split is left to the
        // runtime support library's higher-level string type.
        let (source, _) = ctx.lower_expr(&args[0], builtins)?;
        let (sep, _) = ctx.lower_expr(&args[1], builtins)?;
        let ptr_ty = ctx.context.ptr_type(AddressSpace::default());
        let strstr = ctx.declare_extern_c("strstr", ptr_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false));
        let call = ctx.builder.build_call(strstr, &[source.into(), sep.into()], "strstr.call").map_err(crate::codegen::internal_err)?;
        let found = call.try_as_basic_value().left().expect("strstr returns ptr").into_pointer_value();
        let prefix_len = ctx.build_pointer_diff(found, source.into_pointer_value())?;
        let sep_len = ctx.build_libc_strlen(sep.into_pointer_value())?;
        let suffix_start = ctx.build_offset_ptr(found, sep_len)?;

        let left = ctx.build_string_alloc(prefix_len, "split.left")?;
        ctx.build_libc_memcpy(left, source.into_pointer_value(), prefix_len)?;
        ctx.build_libc_write_nul(left, prefix_len)?;
        let right_len = ctx.build_libc_strlen(suffix_start)?;
        let right = ctx.build_string_alloc(right_len, "split.right")?;
        ctx.build_libc_memcpy(right, suffix_start, right_len)?;
        ctx.build_libc_write_nul(right, right_len)?;

        let two = ctx.context.i32_type().const_int(2, false);
        let array = ctx.build_array_alloc(two, 8, "split.array")?;
        ctx.builder.build_store(array, left).map_err(crate::codegen::internal_err)?;
        let second = ctx.build_offset_ptr(array, ctx.context.i32_type().const_int(8, false))?;
        ctx.builder.build_store(second, right).map_err(crate::codegen::internal_err)?;
        Ok((array.into(), Type::Array(Box::new(Type::Str), 0)))
    }
}

// ---- array builtins (spec §4.4.4) ---------------------------------------

struct ArrayLengthTemplate;

impl BuiltinTemplate for ArrayLengthTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("array_length", 1))?, builtins)?;
        let len = ctx.build_array_header_load(value.into_pointer_value())?;
        Ok((len.into(), Type::Int))
    }
}

struct ArrayFreeTemplate;

impl BuiltinTemplate for ArrayFreeTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, _) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("array_free", 1))?, builtins)?;
        ctx.build_array_free(value.into_pointer_value())?;
        Ok((ctx.context.i32_type().const_zero().into(), Type::Void))
    }
}

struct ArrayPushTemplate;

impl BuiltinTemplate for ArrayPushTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 3 {
            return Err(arity_error("array_push(array, &value, element_size)", 3));
        }
        let (array, array_ty) = ctx.lower_expr(&args[0], builtins)?;
        let (value_ptr, _) = ctx.lower_expr(&args[1], builtins)?;
        let (element_size, _) = ctx.lower_expr(&args[2], builtins)?;
        let old_len = ctx.build_array_header_load(array.into_pointer_value())?;
        let one = ctx.context.i32_type().const_int(1, false);
        let new_len = ctx.builder.build_int_add(old_len, one, "new.len").map_err(crate::codegen::internal_err)?;
        let element_size_int = element_size.into_int_value();
        let element_size_const = element_size_int.get_zero_extended_constant().unwrap_or(4) as u32;
        let new_array = ctx.build_array_alloc(new_len, element_size_const, "pushed")?;
        let old_bytes = ctx.builder.build_int_mul(old_len, element_size_int, "old.bytes").map_err(crate::codegen::internal_err)?;
        ctx.build_libc_memcpy(new_array, array.into_pointer_value(), old_bytes)?;
        let tail = ctx.build_offset_ptr(new_array, old_bytes)?;
        ctx.build_libc_memcpy(tail, value_ptr.into_pointer_value(), element_size_int)?;
        ctx.build_array_free(array.into_pointer_value())?;
        Ok((new_array.into(), array_ty))
    }
}

struct ArrayPopTemplate;

impl BuiltinTemplate for ArrayPopTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (array, array_ty) = ctx.lower_expr(args.first().ok_or_else(|| arity_error("array_pop", 1))?, builtins)?;
        let old_len = ctx.build_array_header_load(array.into_pointer_value())?;
        let one = ctx.context.i32_type().const_int(1, false);
        let new_len = ctx.builder.build_int_sub(old_len, one, "new.len").map_err(crate::codegen::internal_err)?;
        // Element size is fixed at 4 bytes here since `array_pop` (unlike
        // `array_push`) has no caller-supplied size argument in spec §4.5;
        // non-`int`-sized element arrays are a documented limitation.
        let new_array = ctx.build_array_alloc(new_len, 4, "popped")?;
        let bytes = ctx.builder.build_int_mul(new_len, ctx.context.i32_type().const_int(4, false), "bytes").map_err(crate::codegen::internal_err)?;
        ctx.build_libc_memcpy(new_array, array.into_pointer_value(), bytes)?;
        ctx.build_array_free(array.into_pointer_value())?;
        Ok((new_array.into(), array_ty))
    }
}

struct ArraySliceTemplate;

impl BuiltinTemplate for ArraySliceTemplate {
    fn emit<'ctx>(&self, ctx: &mut Codegen<'ctx>, args: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if args.len() != 4 {
            return Err(arity_error("array_slice(array, start, end, element_size)", 4));
        }
        let (array, array_ty) = ctx.lower_expr(&args[0], builtins)?;
        let (start, _) = ctx.lower_expr(&args[1], builtins)?;
        let (end, _) = ctx.lower_expr(&args[2], builtins)?;
        let (element_size, _) = ctx.lower_expr(&args[3], builtins)?;
        let count = ctx.builder.build_int_sub(end.into_int_value(), start.into_int_value(), "count").map_err(crate::codegen::internal_err)?;
        let element_size_const = element_size.into_int_value().get_zero_extended_constant().unwrap_or(4) as u32;
        let new_array = ctx.build_array_alloc(count, element_size_const, "sliced")?;
        let start_bytes = ctx.builder.build_int_mul(start.into_int_value(), element_size.into_int_value(), "start.bytes").map_err(crate::codegen::internal_err)?;
        let count_bytes = ctx.builder.build_int_mul(count, element_size.into_int_value(), "count.bytes").map_err(crate::codegen::internal_err)?;
        let src = ctx.build_offset_ptr(array.into_pointer_value(), start_bytes)?;
        ctx.build_libc_memcpy(new_array, src, count_bytes)?;
        Ok((new_array.into(), array_ty))
    }
}

fn arity_error(name: &str, expected: usize) -> CompileError {
    CompileError::Semantic { span: crate::span::Span::default(), message: format!("`{name}` expects {expected} argument(s)") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_the_full_builtin_name_list() {
        let registry = BuiltinRegistry::standard();
        for name in [
            "print", "format", "to_string", "to_int", "sleep", "sqrt", "abs_i32", "abs_f64", "min_i32", "max_i32", "min_f64",
            "max_f64", "min", "max", "clamp_i32", "clamp_f64", "clamp", "str_concat", "str_slice", "str_find", "str_replace",
            "str_split", "str_len", "str_length", "str_starts_with", "str_ends_with", "array_length", "array_slice",
            "array_push", "array_pop", "array_free",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }
}
