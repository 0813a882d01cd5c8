//! SSA generation from the AST.
//!
//! Expressions fold to constants whenever their operands are constant,
//! which is what makes `for` loops (constant bounds, unrolled here) and
//! array geometry work in a language that must flatten to a finite
//! circuit. Function calls are inlined; there is no call instruction.

use std::path::PathBuf;
use std::sync::Arc;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use qcl::{parse as circ_parse, Circuit, IoArg, Type, IO};
use tracing::debug;

use crate::ast::{self, BinaryOp, Expr, Func, LValue, Package, Stmt, TypeExpr, UnaryOp};
use crate::error::{CompileError, Point};
use crate::ssa::{
    serialize, Bindings, BlockArena, BlockId, BuiltinOp, Const, Generator, Instr, InstrOp,
    Program, PtrInfo, ReturnBindingCtx, Value,
};

/// Loop unrolling safety cap.
const MAX_LOOP_ITERATIONS: u64 = 1 << 20;

/// Function inlining depth cap; the language has no recursion.
const MAX_CALL_DEPTH: usize = 64;

struct Scope {
    id: u32,
    names: HashSet<String>,
}

struct RetTarget {
    block: BlockId,
    results: Vec<Type>,
    scope: u32,
}

pub struct Codegen<'a> {
    pub gen: Generator,
    pub arena: BlockArena,
    packages: &'a HashMap<String, Package>,
    /// Package whose names unqualified references resolve in; switched
    /// while inlining imported functions.
    cur_pkg: &'a Package,
    native_cache: HashMap<PathBuf, Arc<Circuit>>,
    source_dir: PathBuf,
    scopes: Vec<Scope>,
    next_scope: u32,
    rets: Vec<RetTarget>,
    cur: Option<BlockId>,
    call_depth: usize,
}

/// Compile a package's `main` into a linearized SSA program.
///
/// `input_sizes` supplies the bit widths of unsized `main` parameters,
/// one entry per parameter, as agreed during session establishment.
pub fn compile_package(
    pkg: &Package,
    packages: &HashMap<String, Package>,
    source_dir: PathBuf,
    input_sizes: &[Vec<u64>],
    want_dot: bool,
) -> Result<(Program, Option<String>), CompileError> {
    let main = pkg
        .func("main")
        .ok_or_else(|| CompileError::user(&Point::default(), "no main function"))?;

    let mut cg = Codegen {
        gen: Generator::new(),
        arena: BlockArena::new(),
        packages,
        cur_pkg: pkg,
        native_cache: HashMap::new(),
        source_dir,
        scopes: Vec::new(),
        next_scope: 1,
        rets: Vec::new(),
        cur: None,
        call_depth: 0,
    };

    // Parameter types, specialized from the agreed input shape.
    let mut param_types = Vec::with_capacity(main.params.len());
    for (i, param) in main.params.iter().enumerate() {
        let mut typ = cg.resolve_type(&param.typ, &param.point)?;
        if !typ.is_sized() {
            let sizes = input_sizes.get(i).filter(|s| !s.is_empty());
            match sizes {
                Some(sizes) => typ = typ.with_bits(sizes.iter().sum::<u64>() as u32),
                None => {
                    return Err(CompileError::user(
                        &param.point,
                        format!("unsized parameter '{}' and no input size", param.name),
                    ))
                }
            }
        }
        param_types.push(typ);
    }

    let entry = cg.arena.add("main", Bindings::new());
    let ret_block = cg.arena.add("", Bindings::new());
    cg.cur = Some(entry);

    // Arguments are at scope 1.
    cg.push_scope();
    let scope = cg.scopes.last().unwrap().id;
    let mut params = Vec::with_capacity(main.params.len());
    let mut inputs = IO::new();
    for (param, typ) in main.params.iter().zip(&param_types) {
        cg.declare(&param.name, &param.point)?;
        let value = cg.gen.new_val(&param.name, typ.clone(), scope);
        cg.arena
            .block_mut(entry)
            .bindings
            .set(value.binding_key(), value.clone());
        inputs.0.push(IoArg::new(&param.name, typ.clone()));
        params.push(value);
    }

    let results: Vec<Type> = main
        .results
        .iter()
        .map(|r| cg.resolve_type(&r.typ, &r.point))
        .collect::<Result<_, _>>()?;
    cg.rets.push(RetTarget {
        block: ret_block,
        results: results.clone(),
        scope,
    });

    cg.stmts(&main.body)?;
    if let Some(cur) = cg.cur {
        if !results.is_empty() {
            return Err(CompileError::user(&main.point, "missing return"));
        }
        cg.arena.set_next(cur, ret_block);
    }
    let target = cg.rets.pop().unwrap();
    cg.pop_scope();

    // Resolve the return values across the CFG, materializing Phis in
    // the return block, then terminate it.
    let mut ctx = ReturnBindingCtx::new();
    let mut ret_values = Vec::with_capacity(target.results.len());
    let mut outputs = IO::new();
    for (i, result) in target.results.iter().enumerate() {
        let key = format!("%ret{i}@{}", target.scope);
        let (value, _diff) = cg
            .arena
            .return_binding(&mut ctx, entry, &key, ret_block, &mut cg.gen);
        let Some(value) = value else {
            return Err(CompileError::user(&main.point, "missing return"));
        };
        let value = cg.convert_in(ret_block, value, result, &main.point)?;
        outputs.0.push(IoArg::new("", value.typ.clone()));
        ret_values.push(value);
    }
    cg.arena.add_instr(ret_block, Instr::ret(ret_values));

    cg.arena.mark_dead(entry);
    let dot = want_dot.then(|| crate::ssa::dot(&cg.arena, entry));
    let steps = serialize(&cg.arena, entry);
    debug!(
        blocks = cg.arena.len(),
        steps = steps.len(),
        "ssa generation complete"
    );

    let program = Program::new(inputs, outputs, params, cg.gen.constants(), steps);
    Ok((program, dot))
}

impl Codegen<'_> {
    fn cur(&self) -> BlockId {
        self.cur.expect("no current block")
    }

    fn push_scope(&mut self) {
        let id = self.next_scope;
        self.next_scope += 1;
        self.scopes.push(Scope {
            id,
            names: HashSet::new(),
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, point: &Point) -> Result<(), CompileError> {
        let scope = self.scopes.last_mut().expect("no scope");
        if !scope.names.insert(name.to_string()) {
            return Err(CompileError::user(
                point,
                format!("'{name}' redeclared in this block"),
            ));
        }
        Ok(())
    }

    /// Scope id of the innermost declaration of a visible variable.
    fn lookup_scope(&self, name: &str) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .find(|s| s.names.contains(name))
            .map(|s| s.id)
    }

    /// Binding key of a visible variable, innermost scope first.
    fn lookup(&self, name: &str) -> Option<String> {
        self.lookup_scope(name).map(|id| format!("{name}@{id}"))
    }

    fn bind(&mut self, key: String, value: Value) {
        let cur = self.cur();
        self.arena.block_mut(cur).bindings.set(key, value);
    }

    fn add_instr(&mut self, instr: Instr) {
        for input in &instr.inputs {
            if input.is_const() {
                self.gen.add_constant(input);
            }
        }
        let cur = self.cur();
        self.arena.add_instr(cur, instr);
    }

    fn resolve_type(&mut self, typ: &TypeExpr, point: &Point) -> Result<Type, CompileError> {
        Ok(match typ {
            TypeExpr::Bool => Type::Bool,
            TypeExpr::Int(bits) => Type::Int(*bits),
            TypeExpr::Uint(bits) => Type::Uint(*bits),
            TypeExpr::Str => Type::Str { bytes: 0 },
            TypeExpr::Array { len, elem } => {
                let len = self.const_int_expr(len, point)?;
                let len = len.to_u32().ok_or_else(|| {
                    CompileError::user(point, "array length out of range")
                })?;
                let elem = self.resolve_type(elem, point)?;
                if !elem.is_sized() {
                    return Err(CompileError::user(point, "array of unsized element type"));
                }
                Type::Array {
                    elem: Box::new(elem),
                    len,
                }
            }
        })
    }

    fn const_int_expr(&mut self, expr: &Expr, point: &Point) -> Result<BigInt, CompileError> {
        let value = self.eval_expr(expr)?;
        value
            .const_int()
            .ok_or_else(|| CompileError::user(point, "expression is not constant"))
    }

    // ---- statements ----

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for stmt in stmts {
            if self.cur.is_none() {
                return Err(CompileError::user(stmt_point(stmt), "unreachable code"));
            }
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Var {
                names,
                typ,
                init,
                point,
            } => {
                let typ = self.resolve_type(typ, point)?;
                if !typ.is_sized() {
                    return Err(CompileError::user(point, "variable of unsized type"));
                }
                let init = match init {
                    Some(expr) => {
                        let value = self.eval_rvalue(expr)?;
                        Some(self.convert(value, &typ, point)?)
                    }
                    None => None,
                };
                for name in names {
                    self.declare(name, point)?;
                    let key = self.lookup(name).unwrap();
                    let value = match &init {
                        Some(value) => value.clone(),
                        None => self.gen.constant(Const::Int(BigInt::zero()), typ.clone()),
                    };
                    self.bind(key, value);
                }
                Ok(())
            }
            Stmt::Assign {
                targets,
                op,
                values,
                define,
                point,
            } => self.assign(targets, *op, values, *define, point),
            Stmt::If {
                cond,
                then,
                els,
                point,
            } => self.if_stmt(cond, then, els.as_deref(), point),
            Stmt::For {
                init,
                cond,
                post,
                body,
                point,
            } => self.for_stmt(init, cond, post, body, point),
            Stmt::Return { values, point } => self.return_stmt(values, point),
            Stmt::Expr(expr) => {
                self.eval_expr(expr)?;
                Ok(())
            }
        }
    }

    fn assign(
        &mut self,
        targets: &[LValue],
        op: Option<BinaryOp>,
        values: &[Expr],
        define: bool,
        point: &Point,
    ) -> Result<(), CompileError> {
        // Evaluate sources first; a call with multiple results spreads
        // over the targets.
        let mut rhs: Vec<Value> = Vec::new();
        if values.len() == 1 && targets.len() > 1 {
            rhs = self.eval_multi(&values[0])?;
        } else {
            for value in values {
                rhs.push(self.eval_rvalue(value)?);
            }
        }
        if rhs.len() != targets.len() {
            return Err(CompileError::user(
                point,
                format!(
                    "assignment mismatch: {} variables but {} values",
                    targets.len(),
                    rhs.len()
                ),
            ));
        }

        for (target, mut value) in targets.iter().zip(rhs) {
            match target {
                LValue::Name(name, point) => {
                    if name.package.is_some() {
                        return Err(CompileError::user(point, "cannot assign to package name"));
                    }
                    if define {
                        // Short declaration; allow rebinding a name
                        // already declared in this scope.
                        let scope = self.scopes.last_mut().expect("no scope");
                        scope.names.insert(name.name.clone());
                        let key = self.lookup(&name.name).unwrap();
                        self.bind(key, value);
                        continue;
                    }
                    let key = self.lookup(&name.name).ok_or_else(|| {
                        CompileError::user(point, format!("undefined: {}", name.name))
                    })?;
                    let current = self.read_binding(&key, point)?;
                    if let Some(op) = op {
                        value = self.binary(op, current.clone(), value, point)?;
                    }
                    // Keep the variable's established type.
                    if current.typ.is_sized() && !value.is_const() {
                        value = self.convert(value, &current.typ.clone(), point)?;
                    } else if current.typ.is_sized() && value.is_const() {
                        value = self.retype_const(value, &current.typ, point)?;
                    }
                    self.bind(key, value);
                }
                LValue::Index {
                    name,
                    index,
                    point,
                } => {
                    if op.is_some() || define {
                        return Err(CompileError::user(
                            point,
                            "indexed assignment must be a plain '='",
                        ));
                    }
                    self.assign_index(name, index, value, point)?;
                }
            }
        }
        Ok(())
    }

    fn assign_index(
        &mut self,
        name: &ast::Name,
        index: &Expr,
        value: Value,
        point: &Point,
    ) -> Result<(), CompileError> {
        let scope = self
            .lookup_scope(&name.name)
            .ok_or_else(|| CompileError::user(point, format!("undefined: {}", name.name)))?;
        let key = format!("{}@{scope}", name.name);
        let arr = self.read_binding(&key, point)?;
        let Type::Array { elem, len } = arr.typ.clone() else {
            return Err(CompileError::user(
                point,
                format!("cannot index value of type {}", arr.typ),
            ));
        };
        let idx = self.const_int_expr(index, point)?;
        let idx = idx
            .to_u32()
            .filter(|i| *i < len)
            .ok_or_else(|| CompileError::user(point, "array index out of bounds"))?;

        let value = self.convert(value, &elem, point)?;
        let from = idx * elem.bits();
        let to = from + elem.bits();
        let out = self.gen.new_val(&name.name, arr.typ.clone(), scope);
        let from = self.int_const(from);
        let to = self.int_const(to);
        self.add_instr(Instr::new(
            InstrOp::Amov,
            vec![value, arr, from, to],
            Some(out.clone()),
        ));
        self.bind(key, out);
        Ok(())
    }

    fn if_stmt(
        &mut self,
        cond: &Expr,
        then: &[Stmt],
        els: Option<&[Stmt]>,
        point: &Point,
    ) -> Result<(), CompileError> {
        let cond = self.eval_rvalue(cond)?;
        if cond.typ != Type::Bool {
            return Err(CompileError::user(
                point,
                format!("non-bool condition of type {}", cond.typ),
            ));
        }

        // A constant condition folds to the taken branch.
        if let Some(Const::Bool(taken)) = &cond.konst {
            self.push_scope();
            let result = if *taken {
                self.stmts(then)
            } else if let Some(els) = els {
                self.stmts(els)
            } else {
                Ok(())
            };
            self.pop_scope();
            return result;
        }

        let entry = self.cur();
        let entry_bindings = self.arena.block(entry).bindings.clone();
        self.arena.block_mut(entry).branch_cond = Some(cond.clone());

        let t_block = self.arena.add("", entry_bindings.clone());
        self.arena.set_branch(entry, t_block);
        self.cur = Some(t_block);
        self.push_scope();
        self.stmts(then)?;
        self.pop_scope();
        let t_end = self.cur;

        let f_end = match els {
            Some(els) => {
                let f_block = self.arena.add("", entry_bindings);
                self.arena.set_next(entry, f_block);
                self.cur = Some(f_block);
                self.push_scope();
                self.stmts(els)?;
                self.pop_scope();
                self.cur
            }
            None => Some(entry),
        };

        match (t_end, f_end) {
            (None, None) => {
                self.cur = None;
            }
            (Some(alive), None) | (None, Some(alive)) => {
                let join_bindings = self.arena.block(alive).bindings.clone();
                let join = self.arena.add("", join_bindings);
                self.arena.set_next(alive, join);
                self.cur = Some(join);
            }
            (Some(t_end), Some(f_end)) => {
                let join = self.arena.add("", self.arena.block(f_end).bindings.clone());
                self.arena.set_next(t_end, join);
                self.arena.set_next(f_end, join);
                self.arena
                    .merge_bindings(&cond, t_end, f_end, join, &mut self.gen);
                self.cur = Some(join);
            }
        }
        Ok(())
    }

    fn for_stmt(
        &mut self,
        init: &Stmt,
        cond: &Expr,
        post: &Stmt,
        body: &[Stmt],
        point: &Point,
    ) -> Result<(), CompileError> {
        self.push_scope();
        self.stmt(init)?;

        let mut iterations = 0u64;
        loop {
            let cond_value = self.eval_rvalue(cond)?;
            let taken = match &cond_value.konst {
                Some(Const::Bool(b)) => *b,
                _ => {
                    return Err(CompileError::user(
                        point,
                        "loop condition is not compile-time constant",
                    ))
                }
            };
            if !taken {
                break;
            }
            iterations += 1;
            if iterations > MAX_LOOP_ITERATIONS {
                return Err(CompileError::user(point, "loop unrolls too many times"));
            }

            self.push_scope();
            self.stmts(body)?;
            self.pop_scope();
            if self.cur.is_none() {
                // A return inside the loop body ends the unrolling.
                break;
            }
            self.stmt(post)?;
        }

        self.pop_scope();
        Ok(())
    }

    fn return_stmt(&mut self, values: &[Expr], point: &Point) -> Result<(), CompileError> {
        let target = self.rets.last().expect("return outside function");
        let (block, results, scope) = (target.block, target.results.clone(), target.scope);

        let mut rhs: Vec<Value> = Vec::new();
        if values.len() == 1 && results.len() > 1 {
            rhs = self.eval_multi(&values[0])?;
        } else {
            for value in values {
                rhs.push(self.eval_rvalue(value)?);
            }
        }
        if rhs.len() != results.len() {
            return Err(CompileError::user(
                point,
                format!(
                    "wrong number of return values: got {}, want {}",
                    rhs.len(),
                    results.len()
                ),
            ));
        }

        for (i, (value, result)) in rhs.into_iter().zip(&results).enumerate() {
            let value = if result.is_sized() {
                self.convert(value, result, point)?
            } else if value.is_const() && !value.typ.is_sized() {
                let bits = const_bits(&value);
                let typ = result.with_bits(bits);
                self.retype_const(value, &typ, point)?
            } else {
                value
            };
            self.bind(format!("%ret{i}@{scope}"), value);
        }

        let cur = self.cur();
        self.arena.set_next(cur, block);
        self.cur = None;
        Ok(())
    }

    // ---- expressions ----

    /// Evaluate an expression and dereference any pointer result.
    fn eval_rvalue(&mut self, expr: &Expr) -> Result<Value, CompileError> {
        let value = self.eval_expr(expr)?;
        self.deref(value, expr.point())
    }

    fn eval_multi(&mut self, expr: &Expr) -> Result<Vec<Value>, CompileError> {
        match expr {
            Expr::Call { name, args, point } => {
                let values = self.call(name, args, point)?;
                Ok(values)
            }
            _ => Ok(vec![self.eval_rvalue(expr)?]),
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, CompileError> {
        match expr {
            Expr::Int(value, _) => Ok(self
                .gen
                .constant(Const::Int(value.clone()), Type::Undefined)),
            Expr::Bool(value, _) => Ok(self.gen.constant(Const::Bool(*value), Type::Bool)),
            Expr::Str(value, _) => {
                let bytes = value.len() as u32;
                Ok(self
                    .gen
                    .constant(Const::Str(value.clone()), Type::Str { bytes }))
            }
            Expr::Name(name, point) => self.resolve_name(name, point),
            Expr::Unary { op, expr, point } => {
                let value = self.eval_rvalue(expr)?;
                self.unary(*op, value, point)
            }
            Expr::Binary {
                op,
                left,
                right,
                point,
            } => {
                let left = self.eval_rvalue(left)?;
                let right = self.eval_rvalue(right)?;
                self.binary(*op, left, right, point)
            }
            Expr::Call { name, args, point } => {
                let mut values = self.call(name, args, point)?;
                match values.len() {
                    1 => Ok(values.pop().unwrap()),
                    n => Err(CompileError::user(
                        point,
                        format!("multi-value call ({n} results) in single-value context"),
                    )),
                }
            }
            Expr::Index { expr, index, point } => {
                let arr = self.eval_rvalue(expr)?;
                self.index(arr, index, point)
            }
            Expr::Slice {
                expr,
                lo,
                hi,
                point,
            } => self.slice_expr(expr, lo.as_deref(), hi.as_deref(), point),
        }
    }

    fn resolve_name(&mut self, name: &ast::Name, point: &Point) -> Result<Value, CompileError> {
        if name.package.is_none() {
            if let Some(key) = self.lookup(&name.name) {
                return self.read_binding(&key, point);
            }
        }
        // Package-level constants, local or imported.
        let (pkg, const_name) = match &name.package {
            None => (self.cur_pkg, name.name.as_str()),
            Some(alias) => {
                let pkg = self.packages.get(alias).ok_or_else(|| {
                    CompileError::user(point, format!("package '{alias}' not found"))
                })?;
                (pkg, name.name.as_str())
            }
        };
        let decl = pkg
            .consts
            .iter()
            .find(|c| c.name == const_name)
            .ok_or_else(|| CompileError::user(point, format!("undefined: {name}")))?
            .clone();
        self.eval_expr(&decl.init)
    }

    fn read_binding(&mut self, key: &str, point: &Point) -> Result<Value, CompileError> {
        let cur = self.cur();
        let bound = self
            .arena
            .block(cur)
            .bindings
            .get(key)
            .cloned()
            .ok_or_else(|| CompileError::user(point, format!("undefined: {key}")))?;
        let value = self.arena.materialize(&bound, cur, &mut self.gen);
        // Cache the materialized merge so later reads reuse it.
        self.bind(key.to_string(), value.clone());
        Ok(value)
    }

    fn unary(&mut self, op: UnaryOp, value: Value, point: &Point) -> Result<Value, CompileError> {
        match op {
            UnaryOp::Neg => {
                if let Some(v) = value.const_int() {
                    if value.typ == Type::Bool {
                        return Err(CompileError::user(point, "cannot negate bool"));
                    }
                    return Ok(self.gen.constant(Const::Int(-v), value.typ.clone()));
                }
                let typ = value.typ.clone();
                let zero = self.gen.constant(Const::Int(BigInt::zero()), typ.clone());
                let out = self.gen.anon_val(typ);
                self.add_instr(Instr::new(InstrOp::Sub, vec![zero, value], Some(out.clone())));
                Ok(out)
            }
            UnaryOp::Not => {
                if value.typ != Type::Bool {
                    return Err(CompileError::user(
                        point,
                        format!("operator ! on non-bool {}", value.typ),
                    ));
                }
                if let Some(Const::Bool(b)) = &value.konst {
                    return Ok(self.gen.constant(Const::Bool(!b), Type::Bool));
                }
                let out = self.gen.anon_val(Type::Bool);
                self.add_instr(Instr::new(InstrOp::Not, vec![value], Some(out.clone())));
                Ok(out)
            }
            UnaryOp::Complement => {
                let typ = value.typ.clone();
                if !typ.is_sized() {
                    return Err(CompileError::user(
                        point,
                        "cannot complement an untyped constant",
                    ));
                }
                let out = self.gen.anon_val(typ);
                self.add_instr(Instr::new(InstrOp::Not, vec![value], Some(out.clone())));
                Ok(out)
            }
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        point: &Point,
    ) -> Result<Value, CompileError> {
        // Fold constant operands.
        if left.is_const() && right.is_const() {
            return self.fold(op, &left, &right, point);
        }

        match op {
            BinaryOp::And | BinaryOp::Or => {
                if left.typ != Type::Bool || right.typ != Type::Bool {
                    return Err(CompileError::user(
                        point,
                        format!("operator {op} on {} and {}", left.typ, right.typ),
                    ));
                }
                let instr_op = if op == BinaryOp::And {
                    InstrOp::And
                } else {
                    InstrOp::Or
                };
                let out = self.gen.anon_val(Type::Bool);
                self.add_instr(Instr::new(instr_op, vec![left, right], Some(out.clone())));
                Ok(out)
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                let count = right.const_int().ok_or_else(|| {
                    CompileError::user(point, "shift count is not constant")
                })?;
                if count.is_negative() {
                    return Err(CompileError::user(point, "negative shift count"));
                }
                let typ = left.typ.clone();
                let instr_op = match op {
                    BinaryOp::Shl => InstrOp::Lshift,
                    _ if typ.is_signed() => InstrOp::Srshift,
                    _ => InstrOp::Rshift,
                };
                let count = self.gen.constant(Const::Int(count), Type::Uint(32));
                let out = self.gen.anon_val(typ);
                self.add_instr(Instr::new(instr_op, vec![left, count], Some(out.clone())));
                Ok(out)
            }
            BinaryOp::Eq
            | BinaryOp::Neq
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let (left, right) = self.unify(left, right, point)?;
                let instr_op = match op {
                    BinaryOp::Eq => InstrOp::Eq,
                    BinaryOp::Neq => InstrOp::Neq,
                    BinaryOp::Lt => InstrOp::Lt,
                    BinaryOp::Le => InstrOp::Le,
                    BinaryOp::Gt => InstrOp::Gt,
                    _ => InstrOp::Ge,
                };
                let out = self.gen.anon_val(Type::Bool);
                self.add_instr(Instr::new(instr_op, vec![left, right], Some(out.clone())));
                Ok(out)
            }
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::Band
            | BinaryOp::Bor
            | BinaryOp::Bxor => {
                let (left, right) = self.unify(left, right, point)?;
                let signed = left.typ.is_signed() || right.typ.is_signed();
                let (lb, rb) = (left.typ.bits(), right.typ.bits());
                let bits = match op {
                    // Addition keeps its carry; the caller truncates
                    // through an explicit conversion when it wants
                    // wrapping.
                    BinaryOp::Add => lb.max(rb) + 1,
                    BinaryOp::Sub => lb.max(rb),
                    BinaryOp::Mul => lb + rb,
                    BinaryOp::Div => lb,
                    BinaryOp::Mod => rb,
                    _ => lb.max(rb),
                };
                let typ = if signed { Type::Int(bits) } else { Type::Uint(bits) };
                let instr_op = match op {
                    BinaryOp::Add => InstrOp::Add,
                    BinaryOp::Sub => InstrOp::Sub,
                    BinaryOp::Mul => InstrOp::Mul,
                    BinaryOp::Div => InstrOp::Div,
                    BinaryOp::Mod => InstrOp::Mod,
                    BinaryOp::Band => InstrOp::Band,
                    BinaryOp::Bor => InstrOp::Bor,
                    _ => InstrOp::Bxor,
                };
                let out = self.gen.anon_val(typ);
                self.add_instr(Instr::new(instr_op, vec![left, right], Some(out.clone())));
                Ok(out)
            }
        }
    }

    fn fold(
        &mut self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        point: &Point,
    ) -> Result<Value, CompileError> {
        if let (Some(Const::Bool(a)), Some(Const::Bool(b))) = (&left.konst, &right.konst) {
            let out = match op {
                BinaryOp::And => *a && *b,
                BinaryOp::Or => *a || *b,
                BinaryOp::Eq => a == b,
                BinaryOp::Neq => a != b,
                _ => {
                    return Err(CompileError::user(
                        point,
                        format!("operator {op} on bool operands"),
                    ))
                }
            };
            return Ok(self.gen.constant(Const::Bool(out), Type::Bool));
        }

        if let (Some(Const::Str(a)), Some(Const::Str(b))) = (&left.konst, &right.konst) {
            let out = match op {
                BinaryOp::Eq => a == b,
                BinaryOp::Neq => a != b,
                _ => {
                    return Err(CompileError::user(
                        point,
                        format!("operator {op} on string operands"),
                    ))
                }
            };
            return Ok(self.gen.constant(Const::Bool(out), Type::Bool));
        }

        let (Some(a), Some(b)) = (left.const_int(), right.const_int()) else {
            return Err(CompileError::user(
                point,
                format!("operator {op} on incompatible constants"),
            ));
        };
        let typ = if left.typ.is_sized() {
            left.typ.clone()
        } else {
            right.typ.clone()
        };

        let int = |v: BigInt, cg: &mut Self| Ok(cg.gen.constant(Const::Int(v), typ.clone()));
        let boolean =
            |v: bool, cg: &mut Self| Ok(cg.gen.constant(Const::Bool(v), Type::Bool));
        match op {
            BinaryOp::Add => int(a + b, self),
            BinaryOp::Sub => int(a - b, self),
            BinaryOp::Mul => int(a * b, self),
            BinaryOp::Div => {
                if b.is_zero() {
                    return Err(CompileError::user(point, "division by zero"));
                }
                int(a / b, self)
            }
            BinaryOp::Mod => {
                if b.is_zero() {
                    return Err(CompileError::user(point, "division by zero"));
                }
                int(a % b, self)
            }
            BinaryOp::Band => int(a & b, self),
            BinaryOp::Bor => int(a | b, self),
            BinaryOp::Bxor => int(a ^ b, self),
            BinaryOp::Shl => {
                let count = shift_count(&b, point)? as usize;
                int(a << count, self)
            }
            BinaryOp::Shr => {
                let count = shift_count(&b, point)? as usize;
                int(a >> count, self)
            }
            BinaryOp::Lt => boolean(a < b, self),
            BinaryOp::Le => boolean(a <= b, self),
            BinaryOp::Gt => boolean(a > b, self),
            BinaryOp::Ge => boolean(a >= b, self),
            BinaryOp::Eq => boolean(a == b, self),
            BinaryOp::Neq => boolean(a != b, self),
            BinaryOp::And | BinaryOp::Or => Err(CompileError::user(
                point,
                format!("operator {op} on integer operands"),
            )),
        }
    }

    /// Adapt untyped constants to the other operand and reject
    /// mismatched signedness.
    fn unify(
        &mut self,
        mut left: Value,
        mut right: Value,
        point: &Point,
    ) -> Result<(Value, Value), CompileError> {
        if (left.typ == Type::Bool) != (right.typ == Type::Bool) {
            return Err(CompileError::user(
                point,
                format!("mismatched types {} and {}", left.typ, right.typ),
            ));
        }
        if !left.typ.is_sized() && left.is_const() {
            let bits = const_bits(&left).max(1);
            let typ = if right.typ.is_sized() {
                right.typ.with_bits(right.typ.bits().max(bits))
            } else {
                Type::Uint(bits)
            };
            left = self.retype_const(left, &typ, point)?;
        }
        if !right.typ.is_sized() && right.is_const() {
            let bits = const_bits(&right).max(1);
            let typ = if left.typ.is_sized() {
                left.typ.with_bits(left.typ.bits().max(bits))
            } else {
                Type::Uint(bits)
            };
            right = self.retype_const(right, &typ, point)?;
        }
        Ok((left, right))
    }

    fn retype_const(
        &mut self,
        value: Value,
        typ: &Type,
        point: &Point,
    ) -> Result<Value, CompileError> {
        let konst = value
            .konst
            .clone()
            .ok_or_else(|| CompileError::user(point, "constant expected"))?;
        if let Const::Int(v) = &konst {
            if v.is_negative() && !typ.is_signed() {
                return Err(CompileError::user(
                    point,
                    format!("constant {v} overflows {typ}"),
                ));
            }
            if const_bits(&value) > typ.bits() && typ.is_sized() {
                return Err(CompileError::user(
                    point,
                    format!("constant {v} overflows {typ}"),
                ));
            }
        }
        Ok(self.gen.constant(konst, typ.clone()))
    }

    /// Convert a value to the target type, emitting a `Mov`/`Smov` when
    /// the widths differ.
    fn convert(
        &mut self,
        value: Value,
        typ: &Type,
        point: &Point,
    ) -> Result<Value, CompileError> {
        let cur = self.cur();
        self.convert_in(cur, value, typ, point)
    }

    fn convert_in(
        &mut self,
        block: BlockId,
        value: Value,
        typ: &Type,
        point: &Point,
    ) -> Result<Value, CompileError> {
        if !typ.is_sized() {
            // Unsized target adopts the value's type.
            return Ok(value);
        }
        if value.is_const() {
            return self.retype_const(value, typ, point);
        }
        if value.typ == *typ {
            return Ok(value);
        }
        if (value.typ == Type::Bool) != (*typ == Type::Bool) {
            return Err(CompileError::user(
                point,
                format!("cannot convert {} to {typ}", value.typ),
            ));
        }
        let op = if value.typ.is_signed() {
            InstrOp::Smov
        } else {
            InstrOp::Mov
        };
        let out = self.gen.anon_val(typ.clone());
        let instr = Instr::new(op, vec![value], Some(out.clone()));
        for input in &instr.inputs {
            if input.is_const() {
                self.gen.add_constant(input);
            }
        }
        self.arena.add_instr(block, instr);
        Ok(out)
    }

    fn int_const(&mut self, v: u32) -> Value {
        let value = self
            .gen
            .constant(Const::Int(BigInt::from(v)), Type::Uint(32));
        self.gen.add_constant(&value);
        value
    }

    /// Dereference a pointer value into a `Slice` of its container's
    /// current contents.
    fn deref(&mut self, value: Value, point: &Point) -> Result<Value, CompileError> {
        let Some(ptr) = value.ptr.clone() else {
            return Ok(value);
        };
        let key = format!("{}@{}", ptr.name, ptr.scope);
        let base = self.read_binding(&key, point)?;
        let elem_typ = match &value.typ {
            Type::Ptr { elem } => (**elem).clone(),
            other => other.clone(),
        };
        let from = self.int_const(ptr.offset);
        let to = self.int_const(ptr.offset + elem_typ.bits());
        let out = self.gen.anon_val(elem_typ);
        self.add_instr(Instr::new(
            InstrOp::Slice,
            vec![base, from, to],
            Some(out.clone()),
        ));
        Ok(out)
    }

    fn index(&mut self, arr: Value, index: &Expr, point: &Point) -> Result<Value, CompileError> {
        let (elem, len): (Type, u32) = match &arr.typ {
            Type::Array { elem, len } => ((**elem).clone(), *len),
            Type::Str { bytes } => (Type::Uint(8), *bytes),
            other => {
                return Err(CompileError::user(
                    point,
                    format!("cannot index value of type {other}"),
                ))
            }
        };
        let idx = self.const_int_expr(index, point)?;
        let idx = idx
            .to_u32()
            .filter(|i| *i < len)
            .ok_or_else(|| CompileError::user(point, "array index out of bounds"))?;

        let from = self.int_const(idx * elem.bits());
        let to = self.int_const((idx + 1) * elem.bits());
        let out = self.gen.anon_val(elem);
        self.add_instr(Instr::new(
            InstrOp::Slice,
            vec![arr, from, to],
            Some(out.clone()),
        ));
        Ok(out)
    }

    /// A slice expression produces a pointer into its base variable.
    fn slice_expr(
        &mut self,
        base: &Expr,
        lo: Option<&Expr>,
        hi: Option<&Expr>,
        point: &Point,
    ) -> Result<Value, CompileError> {
        let Expr::Name(name, _) = base else {
            return Err(CompileError::user(point, "can only slice a variable"));
        };
        let scope = self
            .lookup_scope(&name.name)
            .ok_or_else(|| CompileError::user(point, format!("undefined: {}", name.name)))?;
        let key = format!("{}@{scope}", name.name);
        let base_value = self.read_binding(&key, point)?;
        let Type::Array { elem, len } = base_value.typ.clone() else {
            return Err(CompileError::user(
                point,
                format!("cannot slice value of type {}", base_value.typ),
            ));
        };

        let lo = match lo {
            Some(expr) => self
                .const_int_expr(expr, point)?
                .to_u32()
                .ok_or_else(|| CompileError::user(point, "slice bound out of range"))?,
            None => 0,
        };
        let hi = match hi {
            Some(expr) => self
                .const_int_expr(expr, point)?
                .to_u32()
                .ok_or_else(|| CompileError::user(point, "slice bound out of range"))?,
            None => len,
        };
        if lo > hi || hi > len {
            return Err(CompileError::user(
                point,
                format!("slice bounds [{lo}:{hi}] out of range for length {len}"),
            ));
        }

        let slice_type = Type::Array {
            elem: elem.clone(),
            len: hi - lo,
        };
        let mut value = self.gen.anon_val(Type::Ptr {
            elem: Box::new(slice_type),
        });
        value.ptr = Some(PtrInfo {
            name: name.name.clone(),
            scope,
            container_type: base_value.typ.clone(),
            offset: lo * elem.bits(),
        });
        Ok(value)
    }

    // ---- calls ----

    fn call(
        &mut self,
        name: &ast::Name,
        args: &[Expr],
        point: &Point,
    ) -> Result<Vec<Value>, CompileError> {
        if name.package.is_none() {
            match name.name.as_str() {
                "copy" => return self.builtin_copy(args, point),
                "len" => return self.builtin_len(args, point),
                "size" => return self.builtin_size(args, point),
                "native" => return self.builtin_native(args, point),
                "floorPow2" => return self.builtin_floor_pow2(args, point),
                _ => {}
            }
        }

        let pkg = match &name.package {
            None => self.cur_pkg,
            Some(alias) => self.packages.get(alias).ok_or_else(|| {
                CompileError::user(point, format!("package '{alias}' not found"))
            })?,
        };
        let func = pkg
            .func(&name.name)
            .ok_or_else(|| CompileError::user(point, format!("undefined: {name}")))?
            .clone();

        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.eval_rvalue(arg)?);
        }

        // The callee's unqualified names resolve in its own package.
        let caller_pkg = std::mem::replace(&mut self.cur_pkg, pkg);
        let result = self.inline_call(&func, arg_values, point);
        self.cur_pkg = caller_pkg;
        result
    }

    /// Inline a function call: bind arguments in a fresh scope, run the
    /// body, resolve its return bindings, continue in the callee's
    /// return block.
    fn inline_call(
        &mut self,
        func: &Func,
        args: Vec<Value>,
        point: &Point,
    ) -> Result<Vec<Value>, CompileError> {
        if args.len() != func.params.len() {
            return Err(CompileError::user(
                point,
                format!(
                    "wrong number of arguments to {}: got {}, want {}",
                    func.name,
                    args.len(),
                    func.params.len()
                ),
            ));
        }
        self.call_depth += 1;
        if self.call_depth > MAX_CALL_DEPTH {
            return Err(CompileError::user(
                point,
                format!("call depth exceeded inlining '{}'; recursion is not supported", func.name),
            ));
        }

        let start = self.cur();
        // The callee sees its own parameters and package scope only,
        // never the caller's locals.
        let caller_scopes = std::mem::take(&mut self.scopes);
        self.push_scope();
        let scope = self.scopes.last().unwrap().id;

        for (param, arg) in func.params.iter().zip(args) {
            let mut typ = self.resolve_type(&param.typ, &param.point)?;
            if !typ.is_sized() {
                typ = arg.typ.clone();
            }
            let arg = self.convert(arg, &typ, point)?;
            self.declare(&param.name, &param.point)?;
            let key = self.lookup(&param.name).unwrap();
            self.bind(key, arg);
        }

        let results: Vec<Type> = func
            .results
            .iter()
            .map(|r| self.resolve_type(&r.typ, &r.point))
            .collect::<Result<_, _>>()?;
        let ret_block = self
            .arena
            .add("", self.arena.block(start).bindings.clone());
        self.rets.push(RetTarget {
            block: ret_block,
            results: results.clone(),
            scope,
        });

        self.stmts(&func.body)?;
        if let Some(cur) = self.cur {
            if !results.is_empty() {
                return Err(CompileError::user(
                    &func.point,
                    format!("missing return in {}", func.name),
                ));
            }
            self.arena.set_next(cur, ret_block);
        }
        self.rets.pop();
        self.scopes = caller_scopes;
        self.call_depth -= 1;

        let mut ctx = ReturnBindingCtx::new();
        let mut out = Vec::with_capacity(results.len());
        for (i, result) in results.iter().enumerate() {
            let key = format!("%ret{i}@{scope}");
            let (value, _diff) =
                self.arena
                    .return_binding(&mut ctx, start, &key, ret_block, &mut self.gen);
            let Some(value) = value else {
                return Err(CompileError::user(
                    &func.point,
                    format!("missing return in {}", func.name),
                ));
            };
            let value = self.convert_in(ret_block, value, result, point)?;
            out.push(value);
        }

        self.cur = Some(ret_block);
        Ok(out)
    }

    // ---- builtins ----

    fn builtin_copy(&mut self, args: &[Expr], point: &Point) -> Result<Vec<Value>, CompileError> {
        if args.len() != 2 {
            return Err(CompileError::user(
                point,
                "invalid amount of arguments in call to copy",
            ));
        }
        let src = self.eval_rvalue(&args[1])?;

        // Destination: a whole array variable, or a slice expression
        // into one.
        let (base_name, base_scope, base, dst_offset, dst_bits, elem_type) = match &args[0] {
            Expr::Slice { .. } => {
                let dst = self.eval_expr(&args[0])?;
                let (Some(ptr), Type::Ptr { elem }) = (&dst.ptr, &dst.typ) else {
                    return Err(CompileError::user(point, "cannot copy into this expression"));
                };
                let Type::Array { elem: inner, len } = (**elem).clone() else {
                    return Err(CompileError::user(
                        point,
                        format!("setting elements of non-array {elem}"),
                    ));
                };
                let key = format!("{}@{}", ptr.name, ptr.scope);
                let base = self.read_binding(&key, point)?;
                (
                    ptr.name.clone(),
                    ptr.scope,
                    base,
                    ptr.offset,
                    inner.bits() * len,
                    (*inner).clone(),
                )
            }
            Expr::Name(name, _) => {
                let scope = self.lookup_scope(&name.name).ok_or_else(|| {
                    CompileError::user(point, format!("undefined: {}", name.name))
                })?;
                let key = format!("{}@{scope}", name.name);
                let base = self.read_binding(&key, point)?;
                let Type::Array { elem, .. } = base.typ.clone() else {
                    return Err(CompileError::user(
                        point,
                        format!(
                            "arguments to copy must be slices; have {}, {}",
                            base.typ, src.typ
                        ),
                    ));
                };
                let bits = base.typ.bits();
                (name.name.clone(), scope, base, 0, bits, (*elem).clone())
            }
            other => {
                return Err(CompileError::user(
                    other.point(),
                    "first argument to copy must be addressable",
                ))
            }
        };
        let base_key = format!("{base_name}@{base_scope}");

        let Type::Array {
            elem: src_elem,
            len: src_len,
        } = src.typ.clone()
        else {
            return Err(CompileError::user(
                point,
                format!("second argument to copy should be slice or array ({})", src.typ),
            ));
        };
        if *src_elem != elem_type {
            return Err(CompileError::user(
                point,
                format!(
                    "arguments to copy have different element types: {elem_type} and {src_elem}"
                ),
            ));
        }

        let src_bits = src.typ.bits();
        let (src, copied, copy_bits) = if src_bits > dst_bits {
            let trimmed_len = dst_bits / elem_type.bits();
            let typ = Type::Array {
                elem: src_elem,
                len: trimmed_len,
            };
            let from = self.int_const(0);
            let to = self.int_const(dst_bits);
            let out = self.gen.anon_val(typ);
            self.add_instr(Instr::new(
                InstrOp::Slice,
                vec![src, from, to],
                Some(out.clone()),
            ));
            (out, trimmed_len, dst_bits)
        } else {
            (src, src_len, src_bits)
        };

        let l_value = self
            .gen
            .new_val(&base_name, base.typ.clone(), base_scope);
        let from = self.int_const(dst_offset);
        let to = self.int_const(dst_offset + copy_bits);
        self.add_instr(Instr::new(
            InstrOp::Amov,
            vec![src, base, from, to],
            Some(l_value.clone()),
        ));
        self.bind(base_key, l_value);

        let count = self
            .gen
            .constant(Const::Int(BigInt::from(copied)), Type::Int(32));
        self.gen.add_constant(&count);
        Ok(vec![count])
    }

    fn builtin_len(&mut self, args: &[Expr], point: &Point) -> Result<Vec<Value>, CompileError> {
        if args.len() != 1 {
            return Err(CompileError::user(
                point,
                "invalid amount of arguments in call to len",
            ));
        }
        let value = self.eval_expr(&args[0])?;
        let typ = match &value.typ {
            Type::Ptr { elem } => (**elem).clone(),
            other => other.clone(),
        };
        let len = match &typ {
            Type::Str { bytes } => *bytes,
            Type::Array { len, .. } => *len,
            other => {
                return Err(CompileError::user(
                    point,
                    format!("invalid argument 1 (type {other}) for len"),
                ))
            }
        };
        let value = self
            .gen
            .constant(Const::Int(BigInt::from(len)), Type::Int(32));
        self.gen.add_constant(&value);
        Ok(vec![value])
    }

    fn builtin_size(&mut self, args: &[Expr], point: &Point) -> Result<Vec<Value>, CompileError> {
        if args.len() != 1 {
            return Err(CompileError::user(
                point,
                "invalid amount of arguments in call to size",
            ));
        }
        let value = self.eval_expr(&args[0])?;
        let bits = value.typ.bits();
        let value = self
            .gen
            .constant(Const::Int(BigInt::from(bits)), Type::Int(32));
        self.gen.add_constant(&value);
        Ok(vec![value])
    }

    fn builtin_floor_pow2(
        &mut self,
        args: &[Expr],
        point: &Point,
    ) -> Result<Vec<Value>, CompileError> {
        if args.len() != 1 {
            return Err(CompileError::user(
                point,
                "invalid amount of arguments in call to floorPow2",
            ));
        }
        let value = self.const_int_expr(&args[0], point)?;
        if value.is_negative() {
            return Err(CompileError::user(point, "floorPow2 of negative value"));
        }
        let result = if value.is_zero() {
            BigInt::zero()
        } else {
            BigInt::from(1) << (value.bits() - 1)
        };
        let value = self.gen.constant(Const::Int(result), Type::Int(32));
        self.gen.add_constant(&value);
        Ok(vec![value])
    }

    fn builtin_native(&mut self, args: &[Expr], point: &Point) -> Result<Vec<Value>, CompileError> {
        if args.is_empty() {
            return Err(CompileError::user(
                point,
                "not enough arguments in call to native",
            ));
        }
        let name_value = self.eval_expr(&args[0])?;
        let Some(Const::Str(name)) = name_value.konst.clone() else {
            return Err(CompileError::user(
                point,
                "first argument to native must be a constant string",
            ));
        };
        // The circuit name constant never reaches the program.
        self.gen.remove_constant(&name_value);

        let mut arg_values = Vec::new();
        for arg in &args[1..] {
            arg_values.push(self.eval_rvalue(arg)?);
        }

        match name.as_str() {
            "hamming" => {
                if arg_values.len() != 2 {
                    return Err(CompileError::user(
                        point,
                        "invalid amount of arguments in call to 'hamming'",
                    ));
                }
                let mut typ = Type::Uint(1);
                for arg in &arg_values {
                    if arg.typ.bits() > typ.bits() {
                        typ = arg.typ.clone();
                    }
                }
                let out = self.gen.anon_val(typ);
                self.add_instr(Instr::new(
                    InstrOp::Builtin(BuiltinOp::Hamming),
                    arg_values,
                    Some(out.clone()),
                ));
                Ok(vec![out])
            }
            _ if qcl::parse::is_circuit_file(&name) => {
                self.native_circuit(&name, arg_values, point)
            }
            _ => Err(CompileError::user(
                point,
                format!("unknown native '{name}'"),
            )),
        }
    }

    fn native_circuit(
        &mut self,
        name: &str,
        args: Vec<Value>,
        point: &Point,
    ) -> Result<Vec<Value>, CompileError> {
        let path = self.source_dir.join(name);
        let path = path.canonicalize().unwrap_or(path);

        let circ = match self.native_cache.get(&path) {
            Some(circ) => circ.clone(),
            None => {
                // Parsing assigns levels already.
                let circ = Arc::new(circ_parse::parse_file(&path).map_err(|e| {
                    CompileError::user(point, format!("failed to parse circuit: {e}"))
                })?);
                debug!(circuit = name, gates = circ.gates.len(), "native circuit loaded");
                self.native_cache.insert(path, circ.clone());
                circ
            }
        };

        if circ.inputs.len() > args.len() {
            return Err(CompileError::user(
                point,
                "not enough arguments in call to native",
            ));
        }
        if circ.inputs.len() < args.len() {
            return Err(CompileError::user(
                point,
                "too many arguments in call to native",
            ));
        }
        for (idx, (io, arg)) in circ.inputs.iter().zip(&args).enumerate() {
            let io_bits = io.typ.bits();
            let arg_bits = arg.typ.bits();
            // Constants may zero-extend; everything else must match.
            if io_bits < arg_bits || (io_bits > arg_bits && !arg.is_const()) {
                return Err(CompileError::user(
                    point,
                    format!(
                        "invalid argument {idx} for native circuit: got {}, need {io_bits}",
                        arg.typ
                    ),
                ));
            }
        }

        let total_bits: u32 = circ.outputs.iter().map(|io| io.typ.bits()).sum();
        let out = self.gen.anon_val(Type::Uint(total_bits));
        self.add_instr(Instr::circ(args, circ.clone(), out.clone()));

        if circ.outputs.len() == 1 {
            return Ok(vec![out]);
        }
        // Split multi-output circuits into one value per output.
        let mut values = Vec::with_capacity(circ.outputs.len());
        let mut at = 0u32;
        for io in circ.outputs.iter() {
            let bits = io.typ.bits();
            let from = self.int_const(at);
            let to = self.int_const(at + bits);
            let piece = self.gen.anon_val(Type::Uint(bits));
            self.add_instr(Instr::new(
                InstrOp::Slice,
                vec![out.clone(), from, to],
                Some(piece.clone()),
            ));
            values.push(piece);
            at += bits;
        }
        Ok(values)
    }
}

fn stmt_point(stmt: &Stmt) -> &Point {
    match stmt {
        Stmt::Var { point, .. }
        | Stmt::Assign { point, .. }
        | Stmt::If { point, .. }
        | Stmt::For { point, .. }
        | Stmt::Return { point, .. } => point,
        Stmt::Expr(expr) => expr.point(),
    }
}

/// Bits needed to represent a constant, sign bit included for negative
/// values.
fn const_bits(value: &Value) -> u32 {
    match &value.konst {
        Some(Const::Int(v)) => {
            let bits = v.magnitude().bits() as u32;
            if v.is_negative() {
                bits + 1
            } else {
                bits.max(1)
            }
        }
        Some(Const::Bool(_)) => 1,
        Some(Const::Str(s)) => s.len() as u32 * 8,
        None => value.typ.bits(),
    }
}

fn shift_count(v: &BigInt, point: &Point) -> Result<u64, CompileError> {
    if v.is_negative() {
        return Err(CompileError::user(point, "negative shift count"));
    }
    v.to_u64()
        .ok_or_else(|| CompileError::user(point, "shift count out of range"))
}
