//! Heap-owned strings and length-prefixed arrays (spec §4.4.3, §4.4.4).

use inkwell::types::BasicMetadataTypeEnum;
use inkwell::values::{BasicValueEnum, IntValue, PointerValue};
use inkwell::AddressSpace;

use crate::error::CompileResult;

use super::{internal_err, Codegen};

/// Byte layout of a `T[]` heap block: a 4-byte signed element-count header
/// immediately followed by the payload (spec §4.4.4). The public handle a
/// Quark program manipulates is always the payload pointer; the header is
/// reached by a negative offset.
pub struct ArrayLayout;

impl ArrayLayout {
    pub const HEADER_BYTES: u32 = 4;
}

impl<'ctx> Codegen<'ctx> {
    fn malloc_fn(&mut self) -> inkwell::values::FunctionValue<'ctx> {
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let i64_ty = self.context.i64_type();
        let fn_type = ptr_ty.fn_type(&[i64_ty.into()], false);
        self.declare_extern_c("malloc", fn_type)
    }

    fn free_fn(&mut self) -> inkwell::values::FunctionValue<'ctx> {
        let void_ty = self.context.void_type();
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let fn_type = void_ty.fn_type(&[ptr_ty.into()], false);
        self.declare_extern_c("free", fn_type)
    }

    pub(crate) fn build_malloc(&mut self, size_bytes: IntValue<'ctx>, name: &str) -> CompileResult<PointerValue<'ctx>> {
        let malloc = self.malloc_fn();
        let i64_ty = self.context.i64_type();
        let size64 = self.builder.build_int_z_extend(size_bytes, i64_ty, "size64").map_err(internal_err)?;
        let call = self.builder.build_call(malloc, &[size64.into()], name).map_err(internal_err)?;
        Ok(call.try_as_basic_value().left().expect("malloc returns a pointer").into_pointer_value())
    }

    pub(crate) fn build_free(&mut self, ptr: PointerValue<'ctx>) -> CompileResult<()> {
        let free = self.free_fn();
        self.builder.build_call(free, &[ptr.into()], "").map_err(internal_err)?;
        Ok(())
    }

    /// Lowers a string literal to a read-only global and returns a pointer
    /// to its first byte (spec §4.4.3 "String literals lower to read-only
    /// globals").
    pub(crate) fn build_string_literal(&mut self, text: &str) -> CompileResult<PointerValue<'ctx>> {
        let global = self.builder.build_global_string_ptr(text, "str.lit").map_err(internal_err)?;
        Ok(global.as_pointer_value())
    }

    /// Allocates a fresh heap string of `len` bytes plus a null terminator
    /// and returns the pointer; callers fill in the bytes.
    pub(crate) fn build_string_alloc(&mut self, len: IntValue<'ctx>, name: &str) -> CompileResult<PointerValue<'ctx>> {
        let i32_ty = self.context.i32_type();
        let one = i32_ty.const_int(1, false);
        let with_nul = self.builder.build_int_add(len, one, "len.nul").map_err(internal_err)?;
        self.build_malloc(with_nul, name)
    }

    /// Allocates a `T[]` block: a 4-byte header carrying `count`, followed
    /// by `count` elements of `element_size_bytes`. Returns the payload
    /// pointer (spec §4.4.4).
    pub(crate) fn build_array_alloc(
        &mut self,
        count: IntValue<'ctx>,
        element_size_bytes: u32,
        name: &str,
    ) -> CompileResult<PointerValue<'ctx>> {
        let i32_ty = self.context.i32_type();
        let header_bytes = i32_ty.const_int(u64::from(ArrayLayout::HEADER_BYTES), false);
        let elem_size = i32_ty.const_int(u64::from(element_size_bytes), false);
        let payload_bytes = self.builder.build_int_mul(count, elem_size, "payload.bytes").map_err(internal_err)?;
        let total_bytes = self.builder.build_int_add(payload_bytes, header_bytes, "total.bytes").map_err(internal_err)?;
        let base = self.build_malloc(total_bytes, name)?;
        self.builder.build_store(base, count).map_err(internal_err)?;
        let payload = unsafe {
            self.builder
                .build_gep(self.context.i8_type(), base, &[header_bytes], "array.payload")
                .map_err(internal_err)?
        };
        Ok(payload)
    }

    /// `array_length`: loads the header at `payload - 4` (spec §4.4.4).
    pub(crate) fn build_array_header_load(&mut self, payload: PointerValue<'ctx>) -> CompileResult<IntValue<'ctx>> {
        let i32_ty = self.context.i32_type();
        let neg_header = i32_ty.const_int(u64::from(ArrayLayout::HEADER_BYTES), true).const_neg();
        let header_ptr = unsafe {
            self.builder.build_gep(self.context.i8_type(), payload, &[neg_header], "array.header.ptr").map_err(internal_err)?
        };
        let loaded = self.builder.build_load(i32_ty, header_ptr, "array.len").map_err(internal_err)?;
        Ok(loaded.into_int_value())
    }

    /// `array_free(p)`: frees `p - 4` (spec §4.4.4), not `p` itself.
    pub(crate) fn build_array_free(&mut self, payload: PointerValue<'ctx>) -> CompileResult<()> {
        let i32_ty = self.context.i32_type();
        let neg_header = i32_ty.const_int(u64::from(ArrayLayout::HEADER_BYTES), true).const_neg();
        let base = unsafe {
            self.builder.build_gep(self.context.i8_type(), payload, &[neg_header], "array.base").map_err(internal_err)?
        };
        self.build_free(base)
    }

    /// Stringifies a scalar for `print`/`format` auto-stringification via
    /// `snprintf` into a freshly `malloc`'d buffer, the only extern C
    /// variadic used by the generator (spec §4.4.6).
    pub(crate) fn build_stringify_scalar(&mut self, value: BasicValueEnum<'ctx>, format_spec: &str, name: &str) -> CompileResult<PointerValue<'ctx>> {
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let i32_ty = self.context.i32_type();
        let i64_ty = self.context.i64_type();
        let snprintf_ty = i32_ty.fn_type(&[ptr_ty.into(), i64_ty.into(), ptr_ty.into()], true);
        let snprintf = self.declare_extern_c("snprintf", snprintf_ty);

        let fmt = self.build_string_literal(format_spec)?;
        // First pass with a zero-size buffer to discover the required
        // length, mirroring the size-probe idiom `snprintf` is designed for.
        let zero = ptr_ty.const_null();
        let zero_len = i64_ty.const_zero();
        let probe_args: Vec<inkwell::values::BasicMetadataValueEnum<'ctx>> = vec![zero.into(), zero_len.into(), fmt.into(), value.into()];
        let probe = self.builder.build_call(snprintf, &probe_args, "probe").map_err(internal_err)?;
        let needed = probe.try_as_basic_value().left().expect("snprintf returns i32").into_int_value();
        let needed64 = self.builder.build_int_z_extend(needed, i64_ty, "needed64").map_err(internal_err)?;
        let one = i64_ty.const_int(1, false);
        let buf_len = self.builder.build_int_add(needed64, one, "buf.len").map_err(internal_err)?;
        let buf = self.build_malloc(self.builder.build_int_truncate(buf_len, i32_ty, "buf.len32").map_err(internal_err)?, name)?;

        let real_args: Vec<inkwell::values::BasicMetadataValueEnum<'ctx>> = vec![buf.into(), buf_len.into(), fmt.into(), value.into()];
        self.builder.build_call(snprintf, &real_args, "").map_err(internal_err)?;
        Ok(buf)
    }

    pub(crate) fn declare_printf(&mut self) -> inkwell::values::FunctionValue<'ctx> {
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let i32_ty = self.context.i32_type();
        let fn_type = i32_ty.fn_type(&[BasicMetadataTypeEnum::from(ptr_ty)], true);
        self.declare_extern_c("printf", fn_type)
    }

    /// `strlen`, returned widened to `i32` since every Quark-visible length
    /// (array headers, `str_len`) is `int`.
    pub(crate) fn build_libc_strlen(&mut self, ptr: PointerValue<'ctx>) -> CompileResult<IntValue<'ctx>> {
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let i64_ty = self.context.i64_type();
        let strlen = self.declare_extern_c("strlen", i64_ty.fn_type(&[ptr_ty.into()], false));
        let call = self.builder.build_call(strlen, &[ptr.into()], "strlen.call").map_err(internal_err)?;
        let len64 = call.try_as_basic_value().left().expect("strlen returns i64").into_int_value();
        self.builder.build_int_truncate(len64, self.context.i32_type(), "strlen.i32").map_err(internal_err)
    }

    pub(crate) fn build_libc_memcpy(&mut self, dest: PointerValue<'ctx>, src: PointerValue<'ctx>, len: IntValue<'ctx>) -> CompileResult<()> {
        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let i64_ty = self.context.i64_type();
        let memcpy = self.declare_extern_c("memcpy", ptr_ty.fn_type(&[ptr_ty.into(), ptr_ty.into(), i64_ty.into()], false));
        let len64 = self.builder.build_int_z_extend(len, i64_ty, "len64").map_err(internal_err)?;
        self.builder.build_call(memcpy, &[dest.into(), src.into(), len64.into()], "memcpy.call").map_err(internal_err)?;
        Ok(())
    }

    /// Writes a null terminator at `buf[len]`, completing a buffer that was
    /// sized with `build_string_alloc`'s extra byte (spec §4.4.3).
    pub(crate) fn build_libc_write_nul(&mut self, buf: PointerValue<'ctx>, len: IntValue<'ctx>) -> CompileResult<()> {
        let tail = self.build_offset_ptr(buf, len)?;
        self.builder.build_store(tail, self.context.i8_type().const_zero()).map_err(internal_err)?;
        Ok(())
    }

    pub(crate) fn build_offset_ptr(&mut self, ptr: PointerValue<'ctx>, offset: IntValue<'ctx>) -> CompileResult<PointerValue<'ctx>> {
        unsafe { self.builder.build_gep(self.context.i8_type(), ptr, &[offset], "ptr.offset").map_err(internal_err) }
    }

    /// Byte distance from `base` to `ptr`, widened down to `i32` (used by
    /// `str_find`'s not-found sentinel and `str_replace`'s prefix length).
    pub(crate) fn build_pointer_diff(&mut self, ptr: PointerValue<'ctx>, base: PointerValue<'ctx>) -> CompileResult<IntValue<'ctx>> {
        let diff = self.builder.build_ptr_diff(self.context.i8_type(), ptr, base, "ptr.diff").map_err(internal_err)?;
        self.builder.build_int_truncate(diff, self.context.i32_type(), "ptr.diff32").map_err(internal_err)
    }

    pub(crate) fn build_select_i32(&mut self, want_min: bool, lhs: BasicValueEnum<'ctx>, rhs: BasicValueEnum<'ctx>) -> CompileResult<BasicValueEnum<'ctx>> {
        let predicate = if want_min { inkwell::IntPredicate::SLT } else { inkwell::IntPredicate::SGT };
        let cmp = self
            .builder
            .build_int_compare(predicate, lhs.into_int_value(), rhs.into_int_value(), "select.cmp")
            .map_err(internal_err)?;
        self.builder.build_select(cmp, lhs.into_int_value(), rhs.into_int_value(), "select").map_err(internal_err)
    }

    pub(crate) fn build_select_f64(&mut self, want_min: bool, lhs: BasicValueEnum<'ctx>, rhs: BasicValueEnum<'ctx>) -> CompileResult<BasicValueEnum<'ctx>> {
        let predicate = if want_min { inkwell::FloatPredicate::OLT } else { inkwell::FloatPredicate::OGT };
        let lhs_f = self.coerce_to_f64(lhs)?;
        let rhs_f = self.coerce_to_f64(rhs)?;
        let cmp = self.builder.build_float_compare(predicate, lhs_f, rhs_f, "select.cmp").map_err(internal_err)?;
        self.builder.build_select(cmp, lhs_f, rhs_f, "select").map_err(internal_err)
    }

    fn coerce_to_f64(&mut self, value: BasicValueEnum<'ctx>) -> CompileResult<inkwell::values::FloatValue<'ctx>> {
        match value {
            BasicValueEnum::FloatValue(f) if f.get_type() == self.context.f64_type() => Ok(f),
            BasicValueEnum::FloatValue(f) => self.builder.build_float_ext(f, self.context.f64_type(), "to.f64").map_err(internal_err),
            BasicValueEnum::IntValue(i) => self.builder.build_signed_int_to_float(i, self.context.f64_type(), "to.f64").map_err(internal_err),
            _ => Err(internal_err("expected a numeric value")),
        }
    }
}
