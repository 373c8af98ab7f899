//! Expression lowering — every [`ExprKind`] variant reduces to an IR value
//! plus its resolved type (spec §4.4, §9 "pass the `TypeInfo` of a
//! sub-expression out of each lowering call").

use inkwell::values::BasicValueEnum;
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::builtins::BuiltinRegistry;
use crate::error::{CompileError, CompileResult, SemanticError};
use crate::semantic::types::Type;
use crate::semantic::{binary_result_type, resolve_type_expr};

use super::{internal_err, Codegen};

impl<'ctx> Codegen<'ctx> {
    pub(crate) fn lower_expr(&mut self, expr: &Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        match &expr.kind {
            ExprKind::Number(value) => Ok((self.context.i32_type().const_int(*value as u64, true).into(), Type::Int)),
            ExprKind::Float(value) => Ok((self.context.f64_type().const_float(*value).into(), Type::Double)),
            ExprKind::String(text) => Ok((self.build_string_literal(text)?.into(), Type::Str)),
            ExprKind::Char(c) => Ok((self.context.i32_type().const_int(*c as u64, false).into(), Type::Int)),
            ExprKind::Bool(value) => Ok((self.context.bool_type().const_int(u64::from(*value), false).into(), Type::Bool)),
            ExprKind::Null => Ok((self.context.ptr_type(inkwell::AddressSpace::default()).const_null().into(), Type::Null)),
            ExprKind::Variable(name) => self.lower_variable(name, expr),
            ExprKind::Binary(op, lhs, rhs) => self.lower_binary(*op, lhs, rhs, expr, builtins),
            ExprKind::Unary(op, operand) => self.lower_unary(*op, operand, builtins),
            ExprKind::Call(callee, args) => self.lower_call(callee, args, expr, builtins),
            ExprKind::MethodCall(receiver, method, args) => self.lower_method_call(receiver, method, args, builtins, false, None),
            ExprKind::StaticCall(type_expr, method, args) => {
                let Type::Struct(name) = resolve_type_expr(type_expr) else {
                    return Err(CompileError::Semantic { span: expr.span, message: "static calls are only valid on struct types".to_owned() });
                };
                self.lower_method_call(receiver_placeholder(expr), method, args, builtins, true, Some(&name))
            }
            ExprKind::MemberAccess(obj, field) => {
                let ptr = self.lower_field_pointer(obj, field, builtins)?;
                let (_, obj_ty) = self.lower_expr(obj, builtins)?;
                let Type::Struct(struct_name) = obj_ty else {
                    return Err(CompileError::Internal { message: "member access on non-struct after field resolution".to_owned() });
                };
                let field_ty = self
                    .struct_registry()
                    .resolve_field(&struct_name, field)
                    .cloned()
                    .ok_or_else(|| CompileError::Semantic { span: expr.span, message: format!("struct `{struct_name}` has no field `{field}`") })?;
                let loaded = self.builder.build_load(self.lower_type(&field_ty), ptr, "field.load").map_err(internal_err)?;
                Ok((loaded, field_ty))
            }
            ExprKind::AddressOf(operand) => self.lower_address_of(operand, builtins),
            ExprKind::Dereference(operand) => self.lower_dereference(operand, builtins),
            ExprKind::Range(..) => Err(CompileError::Semantic {
                span: expr.span,
                message: "a range expression is only valid as a `for` loop's iterable".to_owned(),
            }),
            ExprKind::ArrayLiteral(elements) => self.lower_array_literal(elements, builtins),
            ExprKind::MapLiteral(_) => Err(CompileError::Semantic {
                span: expr.span,
                message: "map literals require the runtime collection library, not yet wired into codegen".to_owned(),
            }),
            ExprKind::ArrayAccess(array, index) => self.lower_array_access(array, index, builtins),
            ExprKind::StructLiteral(name, fields) => self.lower_struct_literal(name, fields, builtins),
            ExprKind::Cast(type_expr, inner) => self.lower_cast(type_expr, inner, builtins),
        }
    }

    fn lower_variable(&mut self, name: &str, expr: &Expr) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (ty, binding) = self
            .scope()
            .lookup(name)
            .ok_or_else(|| CompileError::Semantic { span: expr.span, message: format!("undefined variable `{name}`") })?;
        let loaded = self.builder.build_load(self.lower_type(&ty), binding.ty_ptr, name).map_err(internal_err)?;
        Ok((loaded, ty))
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        expr: &Expr,
        builtins: &BuiltinRegistry<'ctx>,
    ) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.lower_short_circuit(op, lhs, rhs, builtins);
        }
        let (lhs_value, lhs_ty) = self.lower_expr(lhs, builtins)?;
        let (rhs_value, rhs_ty) = self.lower_expr(rhs, builtins)?;
        let result_ty = binary_result_type(op, &lhs_ty, &rhs_ty, expr.span)?;

        if matches!(lhs_ty, Type::Str) && matches!(rhs_ty, Type::Str) && matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
            return self.lower_string_equality(op, lhs_value, rhs_value);
        }

        let widened_ty = if result_ty.is_floating() { result_ty.clone() } else { Type::wider_float(&lhs_ty, &rhs_ty) };
        let use_float = lhs_ty.is_floating() || rhs_ty.is_floating();
        if use_float {
            let lhs_f = self.to_float(lhs_value, &lhs_ty, &widened_ty)?;
            let rhs_f = self.to_float(rhs_value, &rhs_ty, &widened_ty)?;
            self.lower_float_binary(op, lhs_f, rhs_f, result_ty)
        } else if matches!(lhs_ty, Type::Pointer(..)) {
            self.lower_pointer_binary(op, lhs_value, rhs_value, lhs_ty, result_ty)
        } else {
            self.lower_int_binary(op, lhs_value.into_int_value(), rhs_value.into_int_value(), result_ty)
        }
    }

    fn to_float(&mut self, value: BasicValueEnum<'ctx>, from: &Type, to: &Type) -> CompileResult<inkwell::values::FloatValue<'ctx>> {
        let target = self.lower_type(to).into_float_type();
        match value {
            BasicValueEnum::FloatValue(f) if from == to => Ok(f),
            BasicValueEnum::FloatValue(f) => self.builder.build_float_ext(f, target, "widen").map_err(internal_err),
            BasicValueEnum::IntValue(i) => self.builder.build_signed_int_to_float(i, target, "int_to_float").map_err(internal_err),
            _ => Err(internal_err("expected a numeric operand")),
        }
    }

    /// Coerces a lowered value from its source type to a target storage
    /// type at every assignment/argument/return/field site (spec §4.3's
    /// mandatory int-to-float widening, decision #4 rejecting `null` where
    /// a `str` is expected), emitting the actual `sitofp`/`fpext`
    /// instruction rather than just relabeling the tracked type.
    pub(crate) fn coerce_value(&mut self, value: BasicValueEnum<'ctx>, from: &Type, to: &Type, span: crate::span::Span) -> CompileResult<BasicValueEnum<'ctx>> {
        if matches!(from, Type::Null) && matches!(to, Type::Str) {
            return Err(CompileError::SemanticTyped {
                span,
                kind: SemanticError::TypeMismatch { expected: Type::Str.to_string(), actual: Type::Null.to_string() },
            });
        }
        if to.is_floating() && from.is_numeric() && from != to {
            return Ok(self.to_float(value, from, to)?.into());
        }
        Ok(value)
    }

    fn lower_float_binary(
        &mut self,
        op: BinaryOp,
        lhs: inkwell::values::FloatValue<'ctx>,
        rhs: inkwell::values::FloatValue<'ctx>,
        result_ty: Type,
    ) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        use BinaryOp::{Add, Div, Eq as OpEq, Gt, GtEq, Lt, LtEq, Mul, NotEq, Rem, Sub};
        let value: BasicValueEnum<'ctx> = match op {
            Add => self.builder.build_float_add(lhs, rhs, "fadd").map_err(internal_err)?.into(),
            Sub => self.builder.build_float_sub(lhs, rhs, "fsub").map_err(internal_err)?.into(),
            Mul => self.builder.build_float_mul(lhs, rhs, "fmul").map_err(internal_err)?.into(),
            Div => self.builder.build_float_div(lhs, rhs, "fdiv").map_err(internal_err)?.into(),
            Rem => self.builder.build_float_rem(lhs, rhs, "frem").map_err(internal_err)?.into(),
            OpEq => self.builder.build_float_compare(FloatPredicate::OEQ, lhs, rhs, "feq").map_err(internal_err)?.into(),
            NotEq => self.builder.build_float_compare(FloatPredicate::ONE, lhs, rhs, "fne").map_err(internal_err)?.into(),
            Lt => self.builder.build_float_compare(FloatPredicate::OLT, lhs, rhs, "flt").map_err(internal_err)?.into(),
            Gt => self.builder.build_float_compare(FloatPredicate::OGT, lhs, rhs, "fgt").map_err(internal_err)?.into(),
            LtEq => self.builder.build_float_compare(FloatPredicate::OLE, lhs, rhs, "fle").map_err(internal_err)?.into(),
            GtEq => self.builder.build_float_compare(FloatPredicate::OGE, lhs, rhs, "fge").map_err(internal_err)?.into(),
            _ => return Err(CompileError::Internal { message: format!("`{op}` is not a floating-point operator") }),
        };
        Ok((value, result_ty))
    }

    fn lower_int_binary(
        &mut self,
        op: BinaryOp,
        lhs: inkwell::values::IntValue<'ctx>,
        rhs: inkwell::values::IntValue<'ctx>,
        result_ty: Type,
    ) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        use BinaryOp::{Add, BitAnd, BitOr, BitXor, Div, Eq as OpEq, Gt, GtEq, Lt, LtEq, Mul, NotEq, Rem, Shl, Shr, Sub};
        let value: BasicValueEnum<'ctx> = match op {
            Add => self.builder.build_int_add(lhs, rhs, "add").map_err(internal_err)?.into(),
            Sub => self.builder.build_int_sub(lhs, rhs, "sub").map_err(internal_err)?.into(),
            Mul => self.builder.build_int_mul(lhs, rhs, "mul").map_err(internal_err)?.into(),
            Div => self.builder.build_int_signed_div(lhs, rhs, "sdiv").map_err(internal_err)?.into(),
            Rem => self.builder.build_int_signed_rem(lhs, rhs, "srem").map_err(internal_err)?.into(),
            BitAnd => self.builder.build_and(lhs, rhs, "and").map_err(internal_err)?.into(),
            BitOr => self.builder.build_or(lhs, rhs, "or").map_err(internal_err)?.into(),
            BitXor => self.builder.build_xor(lhs, rhs, "xor").map_err(internal_err)?.into(),
            Shl => self.builder.build_left_shift(lhs, rhs, "shl").map_err(internal_err)?.into(),
            Shr => self.builder.build_right_shift(lhs, rhs, true, "shr").map_err(internal_err)?.into(),
            OpEq => self.builder.build_int_compare(IntPredicate::EQ, lhs, rhs, "eq").map_err(internal_err)?.into(),
            NotEq => self.builder.build_int_compare(IntPredicate::NE, lhs, rhs, "ne").map_err(internal_err)?.into(),
            Lt => self.builder.build_int_compare(IntPredicate::SLT, lhs, rhs, "lt").map_err(internal_err)?.into(),
            Gt => self.builder.build_int_compare(IntPredicate::SGT, lhs, rhs, "gt").map_err(internal_err)?.into(),
            LtEq => self.builder.build_int_compare(IntPredicate::SLE, lhs, rhs, "le").map_err(internal_err)?.into(),
            GtEq => self.builder.build_int_compare(IntPredicate::SGE, lhs, rhs, "ge").map_err(internal_err)?.into(),
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are handled separately"),
        };
        Ok((value, result_ty))
    }

    fn lower_pointer_binary(
        &mut self,
        op: BinaryOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
        pointee_ty: Type,
        result_ty: Type,
    ) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        match op {
            BinaryOp::Add => {
                let element_ty = match &pointee_ty {
                    Type::Pointer(inner, _) => self.lower_type(inner),
                    _ => self.context.i8_type().into(),
                };
                let offset = rhs.into_int_value();
                let result = unsafe {
                    self.builder.build_gep(element_ty, lhs.into_pointer_value(), &[offset], "ptr.add").map_err(internal_err)?
                };
                Ok((result.into(), result_ty))
            }
            BinaryOp::Sub => {
                let diff = self.build_pointer_diff(lhs.into_pointer_value(), rhs.into_pointer_value())?;
                Ok((diff.into(), Type::Int))
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let predicate = if matches!(op, BinaryOp::Eq) { IntPredicate::EQ } else { IntPredicate::NE };
                let lhs_int = self.builder.build_ptr_to_int(lhs.into_pointer_value(), self.context.i64_type(), "lhs.int").map_err(internal_err)?;
                let rhs_int = self.builder.build_ptr_to_int(rhs.into_pointer_value(), self.context.i64_type(), "rhs.int").map_err(internal_err)?;
                let cmp = self.builder.build_int_compare(predicate, lhs_int, rhs_int, "ptr.cmp").map_err(internal_err)?;
                Ok((cmp.into(), Type::Bool))
            }
            _ => Err(CompileError::Semantic { span: crate::span::Span::default(), message: format!("`{op}` is not defined for pointer operands") }),
        }
    }

    fn lower_string_equality(&mut self, op: BinaryOp, lhs: BasicValueEnum<'ctx>, rhs: BasicValueEnum<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let ptr_ty = self.context.ptr_type(inkwell::AddressSpace::default());
        let i32_ty = self.context.i32_type();
        let strcmp = self.declare_extern_c("strcmp", i32_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false));
        let call = self.builder.build_call(strcmp, &[lhs.into(), rhs.into()], "strcmp.call").map_err(internal_err)?;
        let result = call.try_as_basic_value().left().expect("strcmp returns i32").into_int_value();
        let zero = i32_ty.const_zero();
        let predicate = if matches!(op, BinaryOp::Eq) { IntPredicate::EQ } else { IntPredicate::NE };
        let cmp = self.builder.build_int_compare(predicate, result, zero, "streq").map_err(internal_err)?;
        Ok((cmp.into(), Type::Bool))
    }

    /// `a && b` / `a || b` short-circuit: the right operand is only
    /// evaluated in the branch that needs it, unlike the other binary
    /// operators which evaluate both sides unconditionally.
    fn lower_short_circuit(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let function = self.current_function();
        let (lhs_value, _) = self.lower_expr(lhs, builtins)?;
        let rhs_block = self.context.append_basic_block(function, "sc.rhs");
        let cont_block = self.context.append_basic_block(function, "sc.cont");
        let entry_block = self.builder.get_insert_block().expect("inside a function body");

        match op {
            BinaryOp::And => {
                self.builder.build_conditional_branch(lhs_value.into_int_value(), rhs_block, cont_block).map_err(internal_err)?;
            }
            BinaryOp::Or => {
                self.builder.build_conditional_branch(lhs_value.into_int_value(), cont_block, rhs_block).map_err(internal_err)?;
            }
            _ => unreachable!("only And/Or reach lower_short_circuit"),
        }

        self.builder.position_at_end(rhs_block);
        let (rhs_value, _) = self.lower_expr(rhs, builtins)?;
        let rhs_end_block = self.builder.get_insert_block().expect("still inside rhs_block or a successor");
        self.builder.build_unconditional_branch(cont_block).map_err(internal_err)?;

        self.builder.position_at_end(cont_block);
        let phi = self.builder.build_phi(self.context.bool_type(), "sc.result").map_err(internal_err)?;
        phi.add_incoming(&[(&lhs_value, entry_block), (&rhs_value, rhs_end_block)]);
        Ok((phi.as_basic_value(), Type::Bool))
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, ty) = self.lower_expr(operand, builtins)?;
        match op {
            UnaryOp::Neg if ty.is_floating() => {
                Ok((self.builder.build_float_neg(value.into_float_value(), "fneg").map_err(internal_err)?.into(), ty))
            }
            UnaryOp::Neg => Ok((self.builder.build_int_neg(value.into_int_value(), "neg").map_err(internal_err)?.into(), ty)),
            UnaryOp::Not => Ok((self.builder.build_not(value.into_int_value(), "not").map_err(internal_err)?.into(), Type::Bool)),
            UnaryOp::BitNot => Ok((self.builder.build_not(value.into_int_value(), "bitnot").map_err(internal_err)?.into(), ty)),
        }
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr], expr: &Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let ExprKind::Variable(name) = &callee.kind else {
            return Err(CompileError::Semantic { span: callee.span, message: "call target must be a named function".to_owned() });
        };
        if let Some(template) = builtins.get(name) {
            if self.freestanding() && crate::builtins::requires_libc(name) {
                return Err(CompileError::Semantic { span: callee.span, message: format!("`{name}` depends on the host C library and is unavailable in a freestanding program") });
            }
            return template.emit(self, args, builtins);
        }
        let function = self
            .lookup_function(name)
            .ok_or_else(|| CompileError::Semantic { span: expr.span, message: format!("call to undefined function `{name}`") })?;
        let param_tys = self.function_param_types(name).map(|tys| tys.to_vec());
        let mut arg_values: Vec<inkwell::values::BasicMetadataValueEnum<'ctx>> = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            let (value, value_ty) = self.lower_expr(arg, builtins)?;
            let value = match param_tys.as_ref().and_then(|tys| tys.get(index)) {
                Some(param_ty) => self.coerce_value(value, &value_ty, param_ty, arg.span)?,
                None => value,
            };
            arg_values.push(value.into());
        }
        let call = self.builder.build_call(function, &arg_values, "call").map_err(internal_err)?;
        match (call.try_as_basic_value().left(), function.get_type().get_return_type()) {
            (Some(value), _) => Ok((value, Type::Unknown)),
            (None, None) => Ok((self.context.i32_type().const_zero().into(), Type::Void)),
            (None, Some(_)) => Err(CompileError::Internal { message: "call produced no value but a non-void signature".to_owned() }),
        }
    }

    fn lower_address_of(&mut self, operand: &Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        match &operand.kind {
            ExprKind::Variable(name) => {
                let (ty, binding) = self
                    .scope()
                    .lookup(name)
                    .ok_or_else(|| CompileError::Semantic { span: operand.span, message: format!("undefined variable `{name}`") })?;
                Ok((binding.ty_ptr.into(), ty.pointer_to()))
            }
            ExprKind::MemberAccess(obj, field) => {
                let ptr = self.lower_field_pointer(obj, field, builtins)?;
                let (_, obj_ty) = self.lower_expr(obj, builtins)?;
                let Type::Struct(struct_name) = obj_ty else {
                    return Err(CompileError::Internal { message: "member access on non-struct after field resolution".to_owned() });
                };
                let field_ty = self.struct_registry().resolve_field(&struct_name, field).cloned().unwrap_or(Type::Unknown);
                Ok((ptr.into(), field_ty.pointer_to()))
            }
            _ => Err(CompileError::Semantic { span: operand.span, message: "`&` requires an lvalue operand".to_owned() }),
        }
    }

    fn lower_dereference(&mut self, operand: &Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (value, ty) = self.lower_expr(operand, builtins)?;
        let Type::Pointer(pointee, depth) = ty else {
            return Err(CompileError::Semantic { span: operand.span, message: format!("cannot dereference `{ty}`") });
        };
        let pointee_ty = if depth > 1 { Type::Pointer(pointee.clone(), depth - 1) } else { *pointee };
        let loaded = self.builder.build_load(self.lower_type(&pointee_ty), value.into_pointer_value(), "deref").map_err(internal_err)?;
        Ok((loaded, pointee_ty))
    }

    fn lower_array_literal(&mut self, elements: &[Expr], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let count = self.context.i32_type().const_int(elements.len() as u64, false);
        let mut element_ty = Type::Int;
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            let (value, ty) = self.lower_expr(element, builtins)?;
            element_ty = ty;
            values.push(value);
        }
        let element_size = self.sizeof_type(&element_ty);
        let array = self.build_array_alloc(count, element_size, "array.lit")?;
        let element_llvm = self.lower_type(&element_ty);
        for (index, value) in values.into_iter().enumerate() {
            let idx = self.context.i32_type().const_int(index as u64, false);
            let slot = unsafe { self.builder.build_gep(element_llvm, array, &[idx], "array.slot").map_err(internal_err)? };
            self.builder.build_store(slot, value).map_err(internal_err)?;
        }
        Ok((array.into(), Type::Array(Box::new(element_ty), 0)))
    }

    fn lower_array_access(&mut self, array: &Expr, index: &Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (array_value, array_ty) = self.lower_expr(array, builtins)?;
        let (index_value, _) = self.lower_expr(index, builtins)?;
        if matches!(array_ty, Type::Str) {
            // `s[i]` loads the i-th byte, zero-extended to `char` (spec §9
            // decision #3); `str` is a `char*`, so this is a plain i8 GEP
            // rather than the element-typed GEP the `Array` arm below uses.
            let i8_ty = self.context.i8_type();
            let slot = unsafe {
                self.builder
                    .build_gep(i8_ty, array_value.into_pointer_value(), &[index_value.into_int_value()], "str.byte")
                    .map_err(internal_err)?
            };
            let byte = self.builder.build_load(i8_ty, slot, "str.load").map_err(internal_err)?;
            let widened = self.builder.build_int_z_extend(byte.into_int_value(), self.context.i32_type(), "str.byte.widen").map_err(internal_err)?;
            return Ok((widened.into(), Type::Int));
        }
        let element_ty = match array_ty {
            Type::Array(element, _) => *element,
            _ => return Err(CompileError::Semantic { span: array.span, message: format!("`{array_ty}` cannot be indexed") }),
        };
        let element_llvm = self.lower_type(&element_ty);
        let slot = unsafe {
            self.builder
                .build_gep(element_llvm, array_value.into_pointer_value(), &[index_value.into_int_value()], "array.elem")
                .map_err(internal_err)?
        };
        let loaded = self.builder.build_load(element_llvm, slot, "array.load").map_err(internal_err)?;
        Ok((loaded, element_ty))
    }

    fn lower_cast(&mut self, type_expr: &crate::ast::TypeExpr, inner: &Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let target = resolve_type_expr(type_expr);
        let (value, source) = self.lower_expr(inner, builtins)?;
        let converted: BasicValueEnum<'ctx> = match (&source, &target) {
            (a, b) if a == b => value,
            (Type::Int, Type::Float | Type::Double) => {
                self.builder.build_signed_int_to_float(value.into_int_value(), self.lower_type(&target).into_float_type(), "cast").map_err(internal_err)?.into()
            }
            (Type::Float | Type::Double, Type::Int) => {
                self.builder.build_float_to_signed_int(value.into_float_value(), self.context.i32_type(), "cast").map_err(internal_err)?.into()
            }
            (Type::Float, Type::Double) => self.builder.build_float_ext(value.into_float_value(), self.context.f64_type(), "cast").map_err(internal_err)?.into(),
            (Type::Double, Type::Float) => self.builder.build_float_trunc(value.into_float_value(), self.context.f32_type(), "cast").map_err(internal_err)?.into(),
            (Type::Bool, Type::Int) => self.builder.build_int_z_extend(value.into_int_value(), self.context.i32_type(), "cast").map_err(internal_err)?.into(),
            (Type::Int, Type::Bool) => {
                let zero = self.context.i32_type().const_zero();
                self.builder
                    .build_int_compare(IntPredicate::NE, value.into_int_value(), zero, "cast")
                    .map_err(internal_err)?
                    .into()
            }
            _ if target.is_pointer_like() && source.is_pointer_like() => value,
            _ => return Err(CompileError::Semantic { span: inner.span, message: format!("no cast from `{source}` to `{target}`") }),
        };
        Ok((converted, target))
    }

    fn sizeof_type(&self, ty: &Type) -> u32 {
        match ty {
            Type::Bool => 1,
            Type::Double => 8,
            Type::Pointer(..) | Type::Str | Type::Struct(_) | Type::Null | Type::Array(..) => 8,
            _ => 4,
        }
    }
}

/// `Type->m(args)` carries no receiver expression in the AST (spec §4.4.5
/// static calls skip `this` entirely); `lower_method_call` only reads the
/// receiver when `static_call` is false, so this placeholder is never
/// actually evaluated.
fn receiver_placeholder(expr: &Expr) -> &Expr {
    expr
}
