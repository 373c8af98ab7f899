//! AST + type info → typed IR (spec §4.4).
//!
//! [`Codegen`] is the `GeneratorContext` spec §9 calls for: every mutable
//! piece of generator state (symbol table, current function, loop stack,
//! struct registry) lives on this one struct and is threaded through
//! `&mut self`, never through a global. Modeled on the `ASTCodeGen` shape
//! used by inkwell-based compilers in the wider Rust ecosystem, since the
//! teacher repo itself has no LLVM backend to draw from.

mod control_flow;
mod exprs;
mod strings;
mod structs;

pub use strings::ArrayLayout;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicMetadataTypeEnum, BasicTypeEnum};
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};
use inkwell::AddressSpace;

use crate::ast::{Program, StmtKind};
use crate::builtins::BuiltinRegistry;
use crate::error::{CompileError, CompileResult};
use crate::semantic::types::{StructRecord, StructRegistry, Type};
use crate::semantic::resolve_type_expr;

/// One binding's IR-side identity: where its value lives and what source
/// type it holds (spec §3 "Symbol table").
#[derive(Debug, Clone, Copy)]
pub struct ValueBinding<'ctx> {
    pub ty_ptr: PointerValue<'ctx>,
    pub is_param: bool,
}

#[derive(Debug, Default)]
struct ScopeData<'ctx> {
    bindings: HashMap<String, (Type, ValueBinding<'ctx>)>,
    parent: Option<ValueScope<'ctx>>,
}

/// Parent-linked lexical scope carrying actual IR pointers (spec §3
/// "Symbol table", §4.4.1's parameter-vs-alloca distinction).
#[derive(Debug, Clone)]
pub struct ValueScope<'ctx>(Rc<RefCell<ScopeData<'ctx>>>);

impl<'ctx> ValueScope<'ctx> {
    fn root() -> Self {
        Self(Rc::new(RefCell::new(ScopeData::default())))
    }

    fn child(&self) -> Self {
        Self(Rc::new(RefCell::new(ScopeData { bindings: HashMap::new(), parent: Some(self.clone()) })))
    }

    fn declare(&self, name: impl Into<String>, ty: Type, binding: ValueBinding<'ctx>) {
        self.0.borrow_mut().bindings.insert(name.into(), (ty, binding));
    }

    fn lookup(&self, name: &str) -> Option<(Type, ValueBinding<'ctx>)> {
        let data = self.0.borrow();
        if let Some(entry) = data.bindings.get(name) {
            return Some(entry.clone());
        }
        data.parent.as_ref().and_then(|parent| parent.lookup(name))
    }
}

pub(crate) struct LoopTargets<'ctx> {
    pub continue_block: inkwell::basic_block::BasicBlock<'ctx>,
    pub break_block: inkwell::basic_block::BasicBlock<'ctx>,
}

pub struct Codegen<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    functions: HashMap<String, FunctionValue<'ctx>>,
    function_param_tys: HashMap<String, Vec<Type>>,
    struct_registry: StructRegistry,
    struct_types: HashMap<String, inkwell::types::StructType<'ctx>>,
    current_function: Option<FunctionValue<'ctx>>,
    current_return_ty: Option<Type>,
    scope: ValueScope<'ctx>,
    loop_stack: Vec<LoopTargets<'ctx>>,
    freestanding: bool,
}

impl<'ctx> Codegen<'ctx> {
    #[must_use]
    pub fn new(context: &'ctx Context, module_name: &str, freestanding: bool) -> Self {
        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            functions: HashMap::new(),
            function_param_tys: HashMap::new(),
            struct_registry: StructRegistry::new(),
            struct_types: HashMap::new(),
            current_function: None,
            current_return_ty: None,
            scope: ValueScope::root(),
            loop_stack: Vec::new(),
            freestanding,
        }
    }

    #[must_use]
    pub fn freestanding(&self) -> bool {
        self.freestanding
    }

    pub fn lower_type(&self, ty: &Type) -> BasicTypeEnum<'ctx> {
        match ty {
            Type::Int => self.context.i32_type().into(),
            Type::Float => self.context.f32_type().into(),
            Type::Double => self.context.f64_type().into(),
            Type::Bool => self.context.bool_type().into(),
            Type::Str => self.context.ptr_type(AddressSpace::default()).into(),
            Type::Null | Type::Pointer(..) => self.context.ptr_type(AddressSpace::default()).into(),
            Type::Array(..) => self.context.ptr_type(AddressSpace::default()).into(),
            Type::Struct(name) => self
                .struct_types
                .get(name)
                .map(|st| BasicTypeEnum::from(*st))
                .unwrap_or_else(|| self.context.ptr_type(AddressSpace::default()).into()),
            Type::Void | Type::Unknown => self.context.i8_type().into(),
        }
    }

    // ---- program entry ---------------------------------------------------

    /// Lowers an entire program: struct types first (pre-declared for
    /// mutual reference, spec §4.4.5), then extern declarations, then
    /// function bodies. Top-level bare statements must already have been
    /// folded into a synthetic `main` by [`crate::compiler`] before this is
    /// called.
    pub fn lower_program(&mut self, program: &Program, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<()> {
        self.predeclare_structs(program)?;
        self.predeclare_functions(program)?;
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::ExternFn(name, return_type, params) => {
                    self.declare_extern_fn(name, return_type, params);
                }
                StmtKind::FunctionDef(def) => {
                    self.lower_function(def, None, builtins)?;
                }
                StmtKind::ImplBlock(struct_name, methods) => {
                    for method in methods {
                        self.lower_function(method, Some(struct_name), builtins)?;
                    }
                }
                StmtKind::StructDef(struct_name, _, _, methods) => {
                    for method in methods {
                        self.lower_function(method, Some(struct_name), builtins)?;
                    }
                }
                StmtKind::Module(_) | StmtKind::Import(_) | StmtKind::ExternStructDecl(_) => {}
                other => {
                    return Err(CompileError::Internal {
                        message: format!("unexpected top-level statement reached codegen: {other:?}"),
                    })
                }
            }
        }
        Ok(())
    }

    fn predeclare_structs(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            let (name, parent, fields) = match &stmt.kind {
                StmtKind::StructDef(name, parent, fields, _) => (name, parent.clone(), fields),
                StmtKind::ExternStructDecl(name) => {
                    self.struct_types.insert(name.clone(), self.context.opaque_struct_type(name));
                    continue;
                }
                _ => continue,
            };
            let opaque = self.context.opaque_struct_type(name);
            self.struct_types.insert(name.clone(), opaque);
            let resolved_fields: Vec<(String, Type)> =
                fields.iter().map(|field| (field.name.clone(), resolve_type_expr(&field.ty))).collect();
            self.struct_registry.insert(StructRecord {
                name: name.clone(),
                parent,
                fields: resolved_fields,
                method_names: Vec::new(),
            });
        }
        // Second pass: now every name is known, materialize bodies with
        // parent fields prepended (spec §4.4.5).
        for stmt in &program.statements {
            if let StmtKind::StructDef(name, ..) = &stmt.kind {
                self.materialize_struct_body(name)?;
            }
        }
        Ok(())
    }

    fn materialize_struct_body(&mut self, name: &str) -> CompileResult<()> {
        if !self.struct_registry.is_acyclic(name) {
            return Err(CompileError::Semantic { span: crate::span::Span::default(), message: format!("struct `{name}` has a cyclic parent chain") });
        }
        let record = self
            .struct_registry
            .get(name)
            .ok_or_else(|| CompileError::Internal { message: format!("struct `{name}` missing from registry") })?
            .clone();
        let mut field_tys = Vec::new();
        let mut chain = vec![record.clone()];
        let mut parent_name = record.parent.clone();
        while let Some(parent) = parent_name {
            let parent_record = self
                .struct_registry
                .get(&parent)
                .ok_or_else(|| CompileError::Semantic { span: crate::span::Span::default(), message: format!("unknown parent struct `{parent}`") })?
                .clone();
            parent_name = parent_record.parent.clone();
            chain.push(parent_record);
        }
        for ancestor in chain.into_iter().rev() {
            for (_, ty) in &ancestor.fields {
                field_tys.push(self.lower_type(ty));
            }
        }
        if let Some(struct_ty) = self.struct_types.get(name) {
            struct_ty.set_body(&field_tys, false);
        }
        Ok(())
    }

    fn predeclare_functions(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::FunctionDef(def) => self.declare_function(&def.name, None, def),
                StmtKind::ImplBlock(struct_name, methods) => {
                    for method in methods {
                        self.declare_function(&method.name, Some(struct_name), method);
                    }
                }
                StmtKind::StructDef(struct_name, _, _, methods) => {
                    for method in methods {
                        self.declare_function(&method.name, Some(struct_name), method);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn declare_function(&mut self, name: &str, owner: Option<&str>, def: &crate::ast::FunctionDef) {
        let mangled = structs::mangle_function_name(owner, name);
        let mut param_types: Vec<BasicMetadataTypeEnum<'ctx>> = Vec::new();
        let mut param_tys: Vec<Type> = Vec::new();
        for param in &def.params {
            let ty = if param.name == "this" {
                Type::Pointer(Box::new(Type::Struct(owner.unwrap_or_default().to_owned())), 1)
            } else {
                resolve_type_expr(&param.ty)
            };
            param_types.push(self.lower_type(&ty).into());
            param_tys.push(ty);
        }
        let return_type = resolve_type_expr(&def.return_type);
        let fn_type = if matches!(return_type, Type::Void) {
            self.context.void_type().fn_type(&param_types, false)
        } else {
            self.lower_type(&return_type).fn_type(&param_types, false)
        };
        let function = self.module.add_function(&mangled, fn_type, None);
        self.functions.insert(mangled.clone(), function);
        self.function_param_tys.insert(mangled, param_tys);
    }

    fn declare_extern_fn(&mut self, name: &str, return_type: &crate::ast::TypeExpr, params: &[crate::ast::Param]) {
        let resolved_return = resolve_type_expr(return_type);
        let param_tys: Vec<Type> = params.iter().map(|p| resolve_type_expr(&p.ty)).collect();
        let param_types: Vec<BasicMetadataTypeEnum<'ctx>> = param_tys.iter().map(|ty| self.lower_type(ty).into()).collect();
        let fn_type = if matches!(resolved_return, Type::Void) {
            self.context.void_type().fn_type(&param_types, false)
        } else {
            self.lower_type(&resolved_return).fn_type(&param_types, false)
        };
        let function = self.module.add_function(name, fn_type, Some(Linkage::External));
        self.functions.insert(name.to_owned(), function);
        self.function_param_tys.insert(name.to_owned(), param_tys);
    }

    pub(crate) fn lookup_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.functions.get(name).copied()
    }

    /// Declared parameter types for a previously-declared function, used to
    /// coerce call arguments to their parameter's type (spec §4.4.2).
    pub(crate) fn function_param_types(&self, name: &str) -> Option<&[Type]> {
        self.function_param_tys.get(name).map(Vec::as_slice)
    }

    pub(crate) fn declare_extern_c(&mut self, name: &str, fn_type: inkwell::types::FunctionType<'ctx>) -> FunctionValue<'ctx> {
        if let Some(existing) = self.functions.get(name) {
            return *existing;
        }
        let function = self.module.add_function(name, fn_type, Some(Linkage::External));
        self.functions.insert(name.to_owned(), function);
        function
    }

    pub(crate) fn struct_registry(&self) -> &StructRegistry {
        &self.struct_registry
    }

    pub(crate) fn struct_llvm_type(&self, name: &str) -> Option<inkwell::types::StructType<'ctx>> {
        self.struct_types.get(name).copied()
    }

    // ---- function bodies --------------------------------------------------

    fn lower_function(
        &mut self,
        def: &crate::ast::FunctionDef,
        owner: Option<&str>,
        builtins: &BuiltinRegistry<'ctx>,
    ) -> CompileResult<()> {
        let mangled = structs::mangle_function_name(owner, &def.name);
        let function = self
            .lookup_function(&mangled)
            .ok_or_else(|| CompileError::Internal { message: format!("function `{mangled}` was not predeclared") })?;
        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);
        self.current_function = Some(function);
        self.current_return_ty = Some(resolve_type_expr(&def.return_type));
        self.scope = ValueScope::root();
        self.loop_stack.clear();

        // Function prologue: every non-aggregate parameter is copied into a
        // fresh stack slot so it can be mutated or addressed (spec §4.4.1).
        for (index, param) in def.params.iter().enumerate() {
            let ty = if param.name == "this" {
                Type::Pointer(Box::new(Type::Struct(owner.unwrap_or_default().to_owned())), 1)
            } else {
                resolve_type_expr(&param.ty)
            };
            let llvm_ty = self.lower_type(&ty);
            let slot = self.builder.build_alloca(llvm_ty, &param.name).map_err(internal_err)?;
            let arg_value = function
                .get_nth_param(index as u32)
                .ok_or_else(|| CompileError::Internal { message: "missing parameter value".to_owned() })?;
            self.builder.build_store(slot, arg_value).map_err(internal_err)?;
            self.scope.declare(param.name.clone(), ty, ValueBinding { ty_ptr: slot, is_param: true });
        }

        for stmt in &def.body {
            self.lower_stmt(stmt, builtins)?;
        }

        if !self.block_is_terminated() {
            let return_type = resolve_type_expr(&def.return_type);
            if matches!(return_type, Type::Void) {
                self.builder.build_return(None).map_err(internal_err)?;
            } else {
                let zero = self.lower_type(&return_type).const_zero();
                self.builder.build_return(Some(&zero)).map_err(internal_err)?;
            }
        }

        if !self.loop_stack.is_empty() {
            return Err(CompileError::Internal { message: "loop stack not empty at function exit".to_owned() });
        }
        self.current_function = None;
        self.current_return_ty = None;
        Ok(())
    }

    pub(crate) fn block_is_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(inkwell::basic_block::BasicBlock::get_terminator)
            .is_some()
    }

    pub(crate) fn current_function(&self) -> FunctionValue<'ctx> {
        self.current_function.expect("lower_stmt called outside a function body")
    }

    /// The enclosing function's declared return type, used to coerce a
    /// `ret` expression before `build_return` (spec §4.4.2).
    pub(crate) fn current_return_ty(&self) -> Type {
        self.current_return_ty.clone().unwrap_or(Type::Void)
    }

    pub(crate) fn scope(&self) -> &ValueScope<'ctx> {
        &self.scope
    }

    pub(crate) fn push_scope(&mut self) {
        self.scope = self.scope.child();
    }

    pub(crate) fn pop_scope(&mut self, saved: ValueScope<'ctx>) {
        self.scope = saved;
    }

    pub(crate) fn declare_local(&mut self, name: &str, ty: Type, value: BasicValueEnum<'ctx>) -> CompileResult<()> {
        let llvm_ty = self.lower_type(&ty);
        let slot = self.builder.build_alloca(llvm_ty, name).map_err(internal_err)?;
        self.builder.build_store(slot, value).map_err(internal_err)?;
        self.scope.declare(name.to_owned(), ty, ValueBinding { ty_ptr: slot, is_param: false });
        Ok(())
    }

    /// Registers a binding for a slot that was already allocated elsewhere
    /// (the `for` loop's induction variable owns its alloca outside the
    /// per-iteration scope so `step` can see it after the body pops).
    pub(crate) fn declare_local_raw(&mut self, name: &str, ty: Type, slot: PointerValue<'ctx>) {
        self.scope.declare(name.to_owned(), ty, ValueBinding { ty_ptr: slot, is_param: false });
    }

    pub(crate) fn push_loop(&mut self, targets: LoopTargets<'ctx>) {
        self.loop_stack.push(targets);
    }

    pub(crate) fn pop_loop(&mut self) {
        self.loop_stack.pop();
    }

    pub(crate) fn loop_targets(&self) -> Option<(inkwell::basic_block::BasicBlock<'ctx>, inkwell::basic_block::BasicBlock<'ctx>)> {
        self.loop_stack.last().map(|t| (t.continue_block, t.break_block))
    }
}

pub(crate) fn internal_err(err: impl std::fmt::Display) -> CompileError {
    CompileError::Internal { message: err.to_string() }
}
