//! Statement lowering and the fixed basic-block templates of spec §4.4.2.

use inkwell::IntPredicate;

use crate::ast::{Stmt, StmtKind};
use crate::builtins::BuiltinRegistry;
use crate::error::{CompileError, CompileResult, SemanticError};
use crate::semantic::types::Type;
use crate::semantic::{binary_result_type, resolve_type_expr};

use super::{internal_err, Codegen, LoopTargets};

impl<'ctx> Codegen<'ctx> {
    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<()> {
        if self.block_is_terminated() {
            // Spec §4.4.2 invariant: suppress emission of unreachable code
            // after a ret/break/continue rather than erroring on it.
            return Ok(());
        }
        match &stmt.kind {
            StmtKind::VarDecl(declared_type, name, init) => self.lower_var_decl(declared_type.as_ref(), name, init.as_ref(), builtins),
            StmtKind::Assign(name, value) => self.lower_assign(name, value, builtins),
            StmtKind::MemberAssign(obj, field, value) => self.lower_member_assign(obj, field, value, builtins),
            StmtKind::DerefAssign(ptr, value) => self.lower_deref_assign(ptr, value, builtins),
            StmtKind::ArrayAssign(arr, index, value) => self.lower_array_assign(arr, index, value, builtins),
            StmtKind::ExprStmt(expr) => {
                self.lower_expr(expr, builtins)?;
                Ok(())
            }
            StmtKind::If(cond, then_body, elifs, else_body) => self.lower_if(cond, then_body, elifs, else_body.as_deref(), builtins),
            StmtKind::While(cond, body) => self.lower_while(cond, body, builtins),
            StmtKind::For(var, range, body) => self.lower_for(var, range, body, builtins),
            StmtKind::Match(scrutinee, arms) => self.lower_match(scrutinee, arms, builtins),
            StmtKind::Return(value) => self.lower_return(value.as_ref(), builtins),
            StmtKind::Break => self.lower_break(),
            StmtKind::Continue => self.lower_continue(),
            StmtKind::FunctionDef(_) | StmtKind::ExternFn(..) | StmtKind::ExternStructDecl(_) => Err(CompileError::Internal {
                message: "nested declarations are not lowered as statements".to_owned(),
            }),
            StmtKind::StructDef(..) | StmtKind::ImplBlock(..) => Err(CompileError::Semantic {
                span: stmt.span,
                message: "struct and impl definitions are only valid at the top level".to_owned(),
            }),
            StmtKind::Import(_) | StmtKind::Module(_) => Ok(()),
        }
    }

    fn lower_var_decl(
        &mut self,
        declared_type: Option<&crate::ast::TypeExpr>,
        name: &str,
        init: Option<&crate::ast::Expr>,
        builtins: &BuiltinRegistry<'ctx>,
    ) -> CompileResult<()> {
        let Some(init) = init else {
            let ty = declared_type.map(resolve_type_expr).unwrap_or(Type::Unknown);
            let zero = self.lower_type(&ty).const_zero();
            return self.declare_local(name, ty, zero);
        };
        let (value, value_ty) = self.lower_expr(init, builtins)?;
        let Some(declared) = declared_type else {
            return self.declare_local(name, value_ty, value);
        };
        let declared_ty = resolve_type_expr(declared);
        let coerced = self.coerce_value(value, &value_ty, &declared_ty, init.span)?;
        self.declare_local(name, declared_ty, coerced)
    }

    fn lower_assign(&mut self, name: &str, value: &crate::ast::Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<()> {
        let (declared_ty, binding) = self.scope().lookup(name).ok_or_else(|| CompileError::Semantic {
            span: value.span,
            message: format!("assignment to undefined variable `{name}`"),
        })?;
        let (new_value, value_ty) = self.lower_expr(value, builtins)?;
        let coerced = self.coerce_value(new_value, &value_ty, &declared_ty, value.span)?;
        self.builder.build_store(binding.ty_ptr, coerced).map_err(internal_err)?;
        Ok(())
    }

    fn lower_member_assign(
        &mut self,
        obj: &crate::ast::Expr,
        field: &str,
        value: &crate::ast::Expr,
        builtins: &BuiltinRegistry<'ctx>,
    ) -> CompileResult<()> {
        let field_ptr = self.lower_field_pointer(obj, field, builtins)?;
        let (_, obj_ty) = self.lower_expr(obj, builtins)?;
        let Type::Struct(struct_name) = obj_ty else {
            return Err(CompileError::Internal { message: "member access on non-struct after field resolution".to_owned() });
        };
        let field_ty = self
            .struct_registry()
            .resolve_field(&struct_name, field)
            .cloned()
            .ok_or_else(|| CompileError::Semantic { span: value.span, message: format!("struct `{struct_name}` has no field `{field}`") })?;
        let (new_value, value_ty) = self.lower_expr(value, builtins)?;
        let coerced = self.coerce_value(new_value, &value_ty, &field_ty, value.span)?;
        self.builder.build_store(field_ptr, coerced).map_err(internal_err)?;
        Ok(())
    }

    fn lower_deref_assign(&mut self, ptr: &crate::ast::Expr, value: &crate::ast::Expr, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<()> {
        let (ptr_value, ptr_ty) = self.lower_expr(ptr, builtins)?;
        let pointee_ty = match ptr_ty {
            Type::Pointer(pointee, depth) if depth > 1 => Type::Pointer(pointee, depth - 1),
            Type::Pointer(pointee, _) => *pointee,
            other => other,
        };
        let (new_value, value_ty) = self.lower_expr(value, builtins)?;
        let coerced = self.coerce_value(new_value, &value_ty, &pointee_ty, value.span)?;
        let ptr_value = ptr_value.into_pointer_value();
        self.builder.build_store(ptr_value, coerced).map_err(internal_err)?;
        Ok(())
    }

    fn lower_array_assign(
        &mut self,
        arr: &crate::ast::Expr,
        index: &crate::ast::Expr,
        value: &crate::ast::Expr,
        builtins: &BuiltinRegistry<'ctx>,
    ) -> CompileResult<()> {
        let (array_ptr, array_ty) = self.lower_expr(arr, builtins)?;
        let (index_value, _) = self.lower_expr(index, builtins)?;
        let element_type = match array_ty {
            Type::Array(element, _) => *element,
            // `str` is a byte buffer; assignment through an index into it
            // is rejected outright rather than corrupting it with an
            // i32-strided store (spec §9 decision #3).
            Type::Str => return Err(CompileError::SemanticTyped { span: arr.span, kind: SemanticError::ImmutableIndex }),
            other => return Err(CompileError::Semantic { span: arr.span, message: format!("`{other}` cannot be indexed for assignment") }),
        };
        let element_llvm = self.lower_type(&element_type);
        let element_ptr = unsafe {
            self.builder
                .build_gep(element_llvm, array_ptr.into_pointer_value(), &[index_value.into_int_value()], "array_elem")
                .map_err(internal_err)?
        };
        let (new_value, value_ty) = self.lower_expr(value, builtins)?;
        let coerced = self.coerce_value(new_value, &value_ty, &element_type, value.span)?;
        self.builder.build_store(element_ptr, coerced).map_err(internal_err)?;
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&crate::ast::Expr>, builtins: &BuiltinRegistry<'ctx>) -> CompileResult<()> {
        match value {
            Some(expr) => {
                let (value, value_ty) = self.lower_expr(expr, builtins)?;
                let return_ty = self.current_return_ty();
                let coerced = self.coerce_value(value, &value_ty, &return_ty, expr.span)?;
                self.builder.build_return(Some(&coerced)).map_err(internal_err)?;
            }
            None => {
                self.builder.build_return(None).map_err(internal_err)?;
            }
        }
        Ok(())
    }

    fn lower_break(&mut self) -> CompileResult<()> {
        let (_, break_block) = self.loop_targets().ok_or_else(|| CompileError::Semantic {
            span: crate::span::Span::default(),
            message: "`break` outside a loop".to_owned(),
        })?;
        self.builder.build_unconditional_branch(break_block).map_err(internal_err)?;
        Ok(())
    }

    fn lower_continue(&mut self) -> CompileResult<()> {
        let (continue_block, _) = self.loop_targets().ok_or_else(|| CompileError::Semantic {
            span: crate::span::Span::default(),
            message: "`continue` outside a loop".to_owned(),
        })?;
        self.builder.build_unconditional_branch(continue_block).map_err(internal_err)?;
        Ok(())
    }

    /// `if cond { A } elif c2 { B } else { C }`: one test/body pair per
    /// arm, all converging on a single continuation block (spec §4.4.2).
    fn lower_if(
        &mut self,
        cond: &crate::ast::Expr,
        then_body: &[Stmt],
        elifs: &[(crate::ast::Expr, Vec<Stmt>)],
        else_body: Option<&[Stmt]>,
        builtins: &BuiltinRegistry<'ctx>,
    ) -> CompileResult<()> {
        let function = self.current_function();
        let cont = self.context.append_basic_block(function, "if.cont");

        let mut arms: Vec<(&crate::ast::Expr, &[Stmt])> = vec![(cond, then_body)];
        for (elif_cond, elif_body) in elifs {
            arms.push((elif_cond, elif_body));
        }

        let else_block = if else_body.is_some() { Some(self.context.append_basic_block(function, "if.else")) } else { None };

        self.lower_if_chain(&arms, 0, else_block, cont, builtins)?;

        if let Some(else_stmts) = else_body {
            let else_block = else_block.expect("allocated above");
            self.builder.position_at_end(else_block);
            let saved = self.scope().clone();
            self.push_scope();
            for stmt in else_stmts {
                self.lower_stmt(stmt, builtins)?;
            }
            if !self.block_is_terminated() {
                self.builder.build_unconditional_branch(cont).map_err(internal_err)?;
            }
            self.pop_scope(saved);
        }

        self.builder.position_at_end(cont);
        Ok(())
    }

    fn lower_if_chain(
        &mut self,
        arms: &[(&crate::ast::Expr, &[Stmt])],
        index: usize,
        final_else: Option<inkwell::basic_block::BasicBlock<'ctx>>,
        cont: inkwell::basic_block::BasicBlock<'ctx>,
        builtins: &BuiltinRegistry<'ctx>,
    ) -> CompileResult<()> {
        let Some((cond, body)) = arms.get(index) else {
            if let Some(else_block) = final_else {
                self.builder.build_unconditional_branch(else_block).map_err(internal_err)?;
            } else {
                self.builder.build_unconditional_branch(cont).map_err(internal_err)?;
            }
            return Ok(());
        };

        let function = self.current_function();
        let body_block = self.context.append_basic_block(function, "if.body");
        let next_test = if index + 1 < arms.len() {
            Some(self.context.append_basic_block(function, "if.test"))
        } else {
            None
        };
        let else_target = next_test.or(final_else).unwrap_or(cont);

        let (cond_value, _) = self.lower_expr(cond, builtins)?;
        self.builder
            .build_conditional_branch(cond_value.into_int_value(), body_block, else_target)
            .map_err(internal_err)?;

        self.builder.position_at_end(body_block);
        let saved = self.scope().clone();
        self.push_scope();
        for stmt in *body {
            self.lower_stmt(stmt, builtins)?;
        }
        if !self.block_is_terminated() {
            self.builder.build_unconditional_branch(cont).map_err(internal_err)?;
        }
        self.pop_scope(saved);

        if let Some(next_test) = next_test {
            self.builder.position_at_end(next_test);
            return self.lower_if_chain(arms, index + 1, final_else, cont, builtins);
        }
        Ok(())
    }

    /// `while cond { body }`: head/body/cont, loop stack pushes
    /// `(continue=head, break=cont)` (spec §4.4.2).
    fn lower_while(&mut self, cond: &crate::ast::Expr, body: &[Stmt], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<()> {
        let function = self.current_function();
        let head = self.context.append_basic_block(function, "while.head");
        let body_block = self.context.append_basic_block(function, "while.body");
        let cont = self.context.append_basic_block(function, "while.cont");

        self.builder.build_unconditional_branch(head).map_err(internal_err)?;
        self.builder.position_at_end(head);
        let (cond_value, _) = self.lower_expr(cond, builtins)?;
        self.builder.build_conditional_branch(cond_value.into_int_value(), body_block, cont).map_err(internal_err)?;

        self.builder.position_at_end(body_block);
        self.push_loop(LoopTargets { continue_block: head, break_block: cont });
        let saved = self.scope().clone();
        self.push_scope();
        for stmt in body {
            self.lower_stmt(stmt, builtins)?;
        }
        if !self.block_is_terminated() {
            self.builder.build_unconditional_branch(head).map_err(internal_err)?;
        }
        self.pop_scope(saved);
        self.pop_loop();

        self.builder.position_at_end(cont);
        Ok(())
    }

    /// `for x in a..b { body }`: init/head/body/step/cont;
    /// `continue` jumps to `step`, `break` jumps to `cont` (spec §4.4.2).
    fn lower_for(&mut self, var: &str, range: &crate::ast::Expr, body: &[Stmt], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<()> {
        let crate::ast::ExprKind::Range(lo, hi) = &range.kind else {
            return Err(CompileError::Semantic { span: range.span, message: "`for` requires a range expression (`lo..hi`)".to_owned() });
        };
        let function = self.current_function();
        let head = self.context.append_basic_block(function, "for.head");
        let body_block = self.context.append_basic_block(function, "for.body");
        let step = self.context.append_basic_block(function, "for.step");
        let cont = self.context.append_basic_block(function, "for.cont");

        let (lo_value, _) = self.lower_expr(lo, builtins)?;
        let (hi_value, _) = self.lower_expr(hi, builtins)?;
        let i32_ty = self.context.i32_type();
        let induction_slot = self.builder.build_alloca(i32_ty, var).map_err(internal_err)?;
        self.builder.build_store(induction_slot, lo_value).map_err(internal_err)?;

        let saved = self.scope().clone();
        self.push_scope();
        self.declare_local_raw(var, Type::Int, induction_slot);

        self.builder.build_unconditional_branch(head).map_err(internal_err)?;
        self.builder.position_at_end(head);
        let current = self.builder.build_load(i32_ty, induction_slot, var).map_err(internal_err)?;
        let keep_going = self
            .builder
            .build_int_compare(IntPredicate::SLT, current.into_int_value(), hi_value.into_int_value(), "for.cmp")
            .map_err(internal_err)?;
        self.builder.build_conditional_branch(keep_going, body_block, cont).map_err(internal_err)?;

        self.builder.position_at_end(body_block);
        self.push_loop(LoopTargets { continue_block: step, break_block: cont });
        for stmt in body {
            self.lower_stmt(stmt, builtins)?;
        }
        if !self.block_is_terminated() {
            self.builder.build_unconditional_branch(step).map_err(internal_err)?;
        }
        self.pop_loop();

        self.builder.position_at_end(step);
        let current = self.builder.build_load(i32_ty, induction_slot, var).map_err(internal_err)?;
        let one = i32_ty.const_int(1, false);
        let next = self.builder.build_int_add(current.into_int_value(), one, "for.next").map_err(internal_err)?;
        self.builder.build_store(induction_slot, next).map_err(internal_err)?;
        self.builder.build_unconditional_branch(head).map_err(internal_err)?;

        self.pop_scope(saved);
        self.builder.position_at_end(cont);
        Ok(())
    }

    /// `match v { p1 => …, _ => … }`: a cascade of equality tests, one test
    /// and one body block per arm, `_` as the unconditional fall-through
    /// (spec §4.4.2).
    fn lower_match(&mut self, scrutinee: &crate::ast::Expr, arms: &[crate::ast::MatchArm], builtins: &BuiltinRegistry<'ctx>) -> CompileResult<()> {
        let function = self.current_function();
        let cont = self.context.append_basic_block(function, "match.cont");
        let (scrutinee_value, scrutinee_ty) = self.lower_expr(scrutinee, builtins)?;

        let mut next_test = self.context.append_basic_block(function, "match.test");
        self.builder.build_unconditional_branch(next_test).map_err(internal_err)?;

        for (index, arm) in arms.iter().enumerate() {
            self.builder.position_at_end(next_test);
            let body_block = self.context.append_basic_block(function, "match.body");
            let is_last = index + 1 == arms.len();
            let upcoming_test = if is_last { None } else { Some(self.context.append_basic_block(function, "match.test")) };

            match &arm.pattern {
                Some(pattern) => {
                    let (pattern_value, _) = self.lower_expr(pattern, builtins)?;
                    let op = crate::ast::BinaryOp::Eq;
                    binary_result_type(op, &scrutinee_ty, &scrutinee_ty, arm.span)?;
                    let eq = self
                        .builder
                        .build_int_compare(IntPredicate::EQ, scrutinee_value.into_int_value(), pattern_value.into_int_value(), "match.eq")
                        .map_err(internal_err)?;
                    let fallthrough = upcoming_test.unwrap_or(cont);
                    self.builder.build_conditional_branch(eq, body_block, fallthrough).map_err(internal_err)?;
                }
                None => {
                    self.builder.build_unconditional_branch(body_block).map_err(internal_err)?;
                }
            }

            self.builder.position_at_end(body_block);
            let saved = self.scope().clone();
            self.push_scope();
            for stmt in &arm.body {
                self.lower_stmt(stmt, builtins)?;
            }
            if !self.block_is_terminated() {
                self.builder.build_unconditional_branch(cont).map_err(internal_err)?;
            }
            self.pop_scope(saved);

            if let Some(test) = upcoming_test {
                next_test = test;
            }
        }

        self.builder.position_at_end(cont);
        Ok(())
    }
}
