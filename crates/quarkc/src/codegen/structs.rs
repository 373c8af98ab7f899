//! Struct field access and method-call lowering (spec §4.4.5).

use inkwell::values::{BasicValueEnum, PointerValue};

use crate::ast::Expr;
use crate::builtins::BuiltinRegistry;
use crate::error::{CompileError, CompileResult};
use crate::semantic::types::Type;

use super::{internal_err, Codegen};

/// `impl Foo { m }` lowers to a free function `Foo_m`; a free function
/// keeps its bare name. Mirrors the struct-name-plus-underscore convention
/// widely used by inkwell-based compilers for C-ABI-safe mangling.
#[must_use]
pub fn mangle_function_name(owner: Option<&str>, name: &str) -> String {
    match owner {
        Some(owner) => format!("{owner}_{name}"),
        None => name.to_owned(),
    }
}

impl<'ctx> Codegen<'ctx> {
    /// Resolves `obj.field` to the pointer of the backing storage, walking
    /// through the parent chain if the field was declared on an ancestor
    /// (spec §4.4.5 inheritance by structural prefix embedding).
    pub(crate) fn lower_field_pointer(&mut self, obj: &Expr, field: &str, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<PointerValue<'ctx>> {
        let (obj_value, obj_ty) = self.lower_expr(obj, builtins)?;
        let Type::Struct(struct_name) = obj_ty.clone() else {
            return Err(CompileError::Semantic { span: obj.span, message: format!("`{obj_ty}` has no field `{field}`") });
        };
        let struct_ty = self
            .struct_llvm_type(&struct_name)
            .ok_or_else(|| CompileError::Internal { message: format!("unknown struct type `{struct_name}`") })?;
        let index = self.flattened_field_index(&struct_name, field).ok_or_else(|| CompileError::Semantic {
            span: obj.span,
            message: format!("struct `{struct_name}` has no field `{field}`"),
        })?;
        let base_ptr = if obj_value.is_pointer_value() {
            obj_value.into_pointer_value()
        } else {
            let slot = self.builder.build_alloca(self.lower_type(&obj_ty), "tmp.struct").map_err(internal_err)?;
            self.builder.build_store(slot, obj_value).map_err(internal_err)?;
            slot
        };
        self.builder.build_struct_gep(struct_ty, base_ptr, index as u32, field).map_err(internal_err)
    }

    /// Flattened field index accounting for parent fields prepended ahead
    /// of a struct's own (spec §4.4.5).
    fn flattened_field_index(&self, struct_name: &str, field: &str) -> Option<usize> {
        let mut chain = Vec::new();
        let mut current = Some(struct_name.to_owned());
        while let Some(name) = current {
            let record = self.struct_registry().get(&name)?;
            chain.push(record.clone());
            current = record.parent.clone();
        }
        let mut offset = 0usize;
        for record in chain.into_iter().rev() {
            if record.name == struct_name || record.field_index(field).is_some() && record.name != struct_name {
                if let Some(local_index) = record.field_index(field) {
                    return Some(offset + local_index);
                }
            }
            offset += record.fields.len();
        }
        None
    }

    /// `obj.m(args)` lowers to `Foo_m(&obj, args)`; `Foo->m(args)` (a
    /// static call) skips the implicit `this` argument (spec §4.4.5).
    pub(crate) fn lower_method_call(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        builtins: &BuiltinRegistry<'ctx>,
        static_call: bool,
        static_type_name: Option<&str>,
    ) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let (struct_name, this_ptr) = if static_call {
            (static_type_name.unwrap_or_default().to_owned(), None)
        } else {
            let (recv_value, recv_ty) = self.lower_expr(receiver, builtins)?;
            let Type::Struct(name) = recv_ty.clone() else {
                return Err(CompileError::Semantic { span: receiver.span, message: format!("`{recv_ty}` has no methods") });
            };
            let ptr = if recv_value.is_pointer_value() {
                recv_value.into_pointer_value()
            } else {
                let slot = self.builder.build_alloca(self.lower_type(&recv_ty), "tmp.recv").map_err(internal_err)?;
                self.builder.build_store(slot, recv_value).map_err(internal_err)?;
                slot
            };
            (name, Some(ptr))
        };

        let mangled = mangle_function_name(Some(&struct_name), method);
        let function = self
            .lookup_function(&mangled)
            .ok_or_else(|| CompileError::Semantic { span: receiver.span, message: format!("no method `{method}` on `{struct_name}`") })?;

        let mut arg_values: Vec<inkwell::values::BasicMetadataValueEnum<'ctx>> = Vec::new();
        if let Some(this_ptr) = this_ptr {
            arg_values.push(this_ptr.into());
        }
        for arg in args {
            let (value, _) = self.lower_expr(arg, builtins)?;
            arg_values.push(value.into());
        }

        let call = self.builder.build_call(function, &arg_values, "call").map_err(internal_err)?;
        let return_type = function.get_type().get_return_type();
        match (call.try_as_basic_value().left(), return_type) {
            (Some(value), _) => Ok((value, Type::Unknown)),
            (None, None) => Ok((self.context.i32_type().const_zero().into(), Type::Void)),
            (None, Some(_)) => Err(CompileError::Internal { message: "call produced no value but a non-void signature".to_owned() }),
        }
    }

    /// `StructName { field: value, ... }`: allocates a stack slot and
    /// stores each initializer into its flattened field offset.
    pub(crate) fn lower_struct_literal(
        &mut self,
        name: &str,
        fields: &[crate::ast::StructLiteralField],
        builtins: &BuiltinRegistry<'ctx>,
    ) -> CompileResult<(BasicValueEnum<'ctx>, Type)> {
        let struct_ty = self
            .struct_llvm_type(name)
            .ok_or_else(|| CompileError::Semantic { span: crate::span::Span::default(), message: format!("unknown struct `{name}`") })?;
        let slot = self.builder.build_alloca(struct_ty, "struct.lit").map_err(internal_err)?;
        for field in fields {
            let index = self
                .flattened_field_index(name, &field.name)
                .ok_or_else(|| CompileError::Semantic { span: field.value.span, message: format!("struct `{name}` has no field `{}`", field.name) })?;
            let field_ty = self.struct_registry().resolve_field(name, &field.name).cloned().unwrap_or(Type::Unknown);
            let (value, value_ty) = self.lower_expr(&field.value, builtins)?;
            let coerced = self.coerce_value(value, &value_ty, &field_ty, field.value.span)?;
            let field_ptr = self.builder.build_struct_gep(struct_ty, slot, index as u32, &field.name).map_err(internal_err)?;
            self.builder.build_store(field_ptr, coerced).map_err(internal_err)?;
        }
        let loaded = self.builder.build_load(struct_ty, slot, "struct.val").map_err(internal_err)?;
        Ok((loaded, Type::Struct(name.to_owned())))
    }
}
