//! LLVM IR backend.
//!
//! Lowering happens in four passes over the item list: global variables,
//! offset constants, function signatures, then function bodies. Every
//! signature is therefore known before the first body is lowered, so
//! calls may refer to functions defined later in the file.
//!
//! All arithmetic is carried out on `i64`; values are converted to and
//! from their slot representation with [`FunctionState::cast`].

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::ast::{
    Attribute, BinaryOp, Call, CompareOp, Expr, Function, Global, GlobalVariable, Item, Offset,
    Stmt, UnaryOp,
};
use crate::constexpr;
use crate::error::CoreError;
use crate::ir::{FunctionBuilder, Module, Value, escape_bytes};
use crate::target::Target;
use crate::types::{BaseType, Datatype, IrType};

const RETURN_LABEL: &str = "fn.return";

/// Lowers a parsed compilation unit into a textual LLVM module.
pub fn generate_llvm_ir(
    global: &Global,
    target: &Target,
    source_name: &str,
) -> Result<String, CoreError> {
    let mut generator = Generator::new(target, source_name);
    generator.generate(global)?;
    Ok(generator.module.render())
}

/// Storage a name resolves to.
#[derive(Debug, Clone)]
struct Slot {
    address: String,
    datatype: Datatype,
    ty: IrType,
    read_only: bool,
}

#[derive(Debug)]
struct Signature {
    params: Vec<IrType>,
    ret: IrType,
}

struct Generator {
    word_bits: u32,
    module: Module,
    globals: HashMap<String, Slot>,
    functions: HashMap<String, Signature>,
    strings: u32,
}

impl Generator {
    fn new(target: &Target, source_name: &str) -> Self {
        Generator {
            word_bits: target.word_bits(),
            module: Module::new(source_name, target.triple()),
            globals: HashMap::new(),
            functions: HashMap::new(),
            strings: 0,
        }
    }

    fn generate(&mut self, global: &Global) -> Result<(), CoreError> {
        debug!(items = global.items.len(), word_bits = self.word_bits, "generating llvm ir");

        for item in &global.items {
            if let Item::Variable(variable) = item {
                self.global_variable(variable)?;
            }
        }
        for item in &global.items {
            if let Item::Offset(offset) = item {
                self.offset(offset)?;
            }
        }

        let functions: Vec<&Function> = global
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Function(function) => Some(function),
                _ => None,
            })
            .collect();
        for function in &functions {
            self.declare_function(function)?;
        }
        for function in functions {
            if !function.has_attribute(Attribute::External) {
                self.define_function(function)?;
            }
        }
        Ok(())
    }

    fn claim_name(&self, name: &str) -> Result<(), CoreError> {
        if self.globals.contains_key(name) || self.functions.contains_key(name) {
            return Err(CoreError::semantic(
                None,
                format!("'{name}' is declared more than once"),
            ));
        }
        Ok(())
    }

    fn global_variable(&mut self, variable: &GlobalVariable) -> Result<(), CoreError> {
        let name = variable.var.name.as_str();
        let datatype = variable.var.datatype;
        self.claim_name(name)?;
        if datatype.base == BaseType::Void {
            return Err(CoreError::semantic(
                None,
                format!("global '{name}' cannot have type {datatype}"),
            ));
        }

        let ty = datatype.ir_type(self.word_bits);
        let init = match &variable.init {
            None => ty.zero().to_string(),
            Some(_) if datatype.is_array => {
                return Err(CoreError::semantic(
                    None,
                    format!("global array '{name}' cannot have an initializer"),
                ));
            }
            Some(Expr::Str(bytes)) => {
                let data = format!("@{name}.init");
                self.module.push_global(format!(
                    "{data} = private unnamed_addr constant {}",
                    byte_array(bytes)
                ));
                if ty.is_pointer() {
                    data
                } else {
                    format!("ptrtoint (ptr {data} to {ty})")
                }
            }
            Some(expr) => {
                let IrType::Int(bits) = ty else {
                    return Err(CoreError::semantic(
                        None,
                        format!("global '{name}' of type {datatype} needs a string initializer"),
                    ));
                };
                wrap_to_width(constexpr::evaluate(expr)?, bits).to_string()
            }
        };

        self.module.push_global(format!("@{name} = global {ty} {init}"));
        self.globals.insert(
            name.to_string(),
            Slot {
                address: format!("@{name}"),
                datatype,
                ty,
                read_only: false,
            },
        );
        Ok(())
    }

    fn offset(&mut self, offset: &Offset) -> Result<(), CoreError> {
        let mut current = 0;
        for entry in &offset.entries {
            self.offset_constant(&format!("{}_{}", offset.name, entry.name), current)?;
            current += entry.datatype.size_in_bytes(self.word_bits);
        }
        self.offset_constant(&format!("{}_size", offset.name), current)
    }

    fn offset_constant(&mut self, name: &str, value: i64) -> Result<(), CoreError> {
        self.claim_name(name)?;
        self.module
            .push_global(format!("@{name} = constant i64 {value}"));
        self.globals.insert(
            name.to_string(),
            Slot {
                address: format!("@{name}"),
                datatype: Datatype::scalar(BaseType::Int),
                ty: IrType::Int(64),
                read_only: true,
            },
        );
        Ok(())
    }

    fn declare_function(&mut self, function: &Function) -> Result<(), CoreError> {
        let name = function.name.as_str();
        if function.has_attribute(Attribute::Assembly) {
            return Err(CoreError::semantic(
                Some(name),
                format!("unsupported attribute {}", Attribute::Assembly),
            ));
        }
        self.claim_name(name)?;

        let mut params = Vec::with_capacity(function.params.len());
        for (index, param) in function.params.iter().enumerate() {
            if param.datatype.base == BaseType::Void {
                return Err(CoreError::semantic(
                    Some(name),
                    format!("parameter '{}' cannot have type {}", param.name, param.datatype),
                ));
            }
            if function.params[..index]
                .iter()
                .any(|earlier| earlier.name == param.name)
            {
                return Err(CoreError::semantic(
                    Some(name),
                    format!("parameter '{}' is declared more than once", param.name),
                ));
            }
            params.push(param.datatype.ir_type(self.word_bits));
        }
        if function.return_type.is_array && function.return_type.base == BaseType::Void {
            return Err(CoreError::semantic(
                Some(name),
                format!("cannot return {}", function.return_type),
            ));
        }
        let ret = function.return_type.ir_type(self.word_bits);

        if function.has_attribute(Attribute::External) {
            let list = params
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            self.module.push_declaration(format!(
                "declare {ret} @{name}({list}){}",
                attribute_suffix(function)
            ));
        }
        self.functions
            .insert(name.to_string(), Signature { params, ret });
        Ok(())
    }

    fn define_function(&mut self, function: &Function) -> Result<(), CoreError> {
        trace!(function = %function.name, "lowering function");
        let ret = function.return_type.ir_type(self.word_bits);
        let params = function
            .params
            .iter()
            .map(|param| format!("{} %{}", param.datatype.ir_type(self.word_bits), param.name))
            .collect::<Vec<_>>()
            .join(", ");
        let header = format!(
            "define {ret} @{}({params}){}",
            function.name,
            attribute_suffix(function)
        );

        let mut state = FunctionState::new(&function.name, header, ret);
        state.no_return = function.has_attribute(Attribute::NoReturn);
        for param in &function.params {
            let ty = param.datatype.ir_type(self.word_bits);
            let slot = state.declare_slot(&param.name, param.datatype, ty.clone());
            state
                .builder
                .prologue(format!("store {ty} %{}, ptr {slot}", param.name));
        }

        self.block(&mut state, &function.body)?;

        if !state.builder.is_terminated() {
            if state.ret != IrType::Void {
                let label = state.builder.current_label().to_string();
                state.incomings.push((state.ret.zero().to_string(), label));
            }
            state.builder.branch(RETURN_LABEL);
        }

        let exit = state.builder.append_block(RETURN_LABEL.to_string());
        state.builder.position_at(exit);
        let merged = if state.no_return || state.incomings.is_empty() {
            None
        } else {
            let incoming = state
                .incomings
                .iter()
                .map(|(value, label)| format!("[ {value}, %{label} ]"))
                .collect::<Vec<_>>()
                .join(", ");
            Some(state.builder.assign(format!("phi {} {incoming}", state.ret)))
        };

        self.run_hooks(&mut state)?;

        let terminator = match merged {
            _ if state.no_return => "unreachable".to_string(),
            Some(value) => format!("ret {} {value}", state.ret),
            None if state.ret == IrType::Void => "ret void".to_string(),
            None => "unreachable".to_string(),
        };
        state.builder.terminate(terminator);
        self.module.push_definition(state.builder.finish());
        Ok(())
    }

    /// Replays every registered `end` block whose flag was set.
    fn run_hooks<'a>(&mut self, state: &mut FunctionState<'a>) -> Result<(), CoreError> {
        state.in_hook = true;
        let hooks = std::mem::take(&mut state.hooks);
        for (flag, body) in hooks {
            let id = state.builder.next_id();
            let run = format!("hook.run.{id}");
            let next = format!("hook.next.{id}");

            let armed = state.builder.assign(format!("load i1, ptr {flag}"));
            state.builder.cond_branch(&armed, &run, &next);

            let run_block = state.builder.append_block(run);
            state.builder.position_at(run_block);
            self.block(state, body)?;
            state.builder.branch(&next);

            let next_block = state.builder.append_block(next);
            state.builder.position_at(next_block);
        }
        Ok(())
    }

    fn block<'a>(&mut self, state: &mut FunctionState<'a>, body: &'a [Stmt]) -> Result<(), CoreError> {
        for stmt in body {
            if state.builder.is_terminated() {
                let label = format!("dead.{}", state.builder.next_id());
                let dead = state.builder.append_block(label);
                state.builder.position_at(dead);
            }
            self.statement(state, stmt)?;
        }
        Ok(())
    }

    fn statement<'a>(&mut self, state: &mut FunctionState<'a>, stmt: &'a Stmt) -> Result<(), CoreError> {
        match stmt {
            Stmt::Declare { var, init } => {
                if var.datatype.base == BaseType::Void {
                    return Err(state.error(format!(
                        "variable '{}' cannot have type {}",
                        var.name, var.datatype
                    )));
                }
                let ty = var.datatype.ir_type(self.word_bits);
                // The initializer still sees any previous binding of the name.
                let value = match init {
                    Some(expr) => {
                        let value = self.expression(state, expr)?;
                        state.cast(value, &ty)?.repr
                    }
                    None => ty.zero().to_string(),
                };
                let slot = state.declare_slot(&var.name, var.datatype, ty.clone());
                state
                    .builder
                    .emit(format!("store {ty} {value}, ptr {slot}"));
            }
            Stmt::Assign { name, value } => self.assign(state, name, value)?,
            Stmt::AssignIndexed { name, index, value } => {
                self.assign_indexed(state, name, index, value)?
            }
            Stmt::Increment(name) => self.step(state, name, BinaryOp::Add)?,
            Stmt::Decrease(name) => self.step(state, name, BinaryOp::Sub)?,
            Stmt::Call(call) => {
                self.call(state, call)?;
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let id = state.builder.next_id();
                let then_label = format!("if.then.{id}");
                let else_label = format!("if.else.{id}");
                let join_label = format!("if.join.{id}");

                let cond = self.condition(state, cond)?;
                state.builder.cond_branch(&cond, &then_label, &else_label);

                let then_block = state.builder.append_block(then_label);
                state.builder.position_at(then_block);
                self.block(state, then_body)?;
                state.builder.branch(&join_label);

                let else_block = state.builder.append_block(else_label);
                state.builder.position_at(else_block);
                self.block(state, else_body)?;
                state.builder.branch(&join_label);

                let join = state.builder.append_block(join_label);
                state.builder.position_at(join);
            }
            Stmt::While { cond, body } => {
                let id = state.builder.next_id();
                let test_label = format!("while.test.{id}");
                let body_label = format!("while.body.{id}");
                let exit_label = format!("while.exit.{id}");

                state.builder.branch(&test_label);
                let test = state.builder.append_block(test_label.clone());
                state.builder.position_at(test);
                let cond = self.condition(state, cond)?;
                state.builder.cond_branch(&cond, &body_label, &exit_label);

                let body_block = state.builder.append_block(body_label);
                state.builder.position_at(body_block);
                self.block(state, body)?;
                state.builder.branch(&test_label);

                let exit = state.builder.append_block(exit_label);
                state.builder.position_at(exit);
            }
            Stmt::DoWhile { body, cond } => {
                let id = state.builder.next_id();
                let body_label = format!("do.body.{id}");
                let exit_label = format!("do.exit.{id}");

                state.builder.branch(&body_label);
                let body_block = state.builder.append_block(body_label.clone());
                state.builder.position_at(body_block);
                self.block(state, body)?;
                if !state.builder.is_terminated() {
                    let cond = self.condition(state, cond)?;
                    state.builder.cond_branch(&cond, &body_label, &exit_label);
                }

                let exit = state.builder.append_block(exit_label);
                state.builder.position_at(exit);
            }
            Stmt::Loop { body } => {
                let id = state.builder.next_id();
                let body_label = format!("loop.body.{id}");

                state.builder.branch(&body_label);
                let body_block = state.builder.append_block(body_label.clone());
                state.builder.position_at(body_block);
                self.block(state, body)?;
                state.builder.branch(&body_label);

                let after = state.builder.append_block(format!("loop.after.{id}"));
                state.builder.position_at(after);
            }
            Stmt::Return(value) => {
                if state.in_hook {
                    return Err(state.error("return is not allowed inside an end block"));
                }
                match (value, state.ret == IrType::Void) {
                    (Some(_), true) => {
                        return Err(state.error("void function cannot return a value"));
                    }
                    (None, false) => {
                        return Err(state.error(format!("missing return value of type {}", state.ret)));
                    }
                    (None, true) => {}
                    (Some(expr), false) => {
                        let value = self.expression(state, expr)?;
                        let ret = state.ret.clone();
                        let value = state.cast(value, &ret)?;
                        let label = state.builder.current_label().to_string();
                        state.incomings.push((value.repr, label));
                    }
                }
                state.builder.branch(RETURN_LABEL);
            }
            Stmt::End { body } => {
                if state.in_hook {
                    return Err(state.error("end blocks cannot be nested"));
                }
                let flag = format!("%end.{}", state.hooks.len());
                state.builder.alloca(&flag, &IrType::Int(1));
                state.builder.prologue(format!("store i1 false, ptr {flag}"));
                state.builder.emit(format!("store i1 true, ptr {flag}"));
                state.hooks.push((flag, body));
            }
        }
        Ok(())
    }

    fn lookup(&self, state: &FunctionState<'_>, name: &str) -> Result<Slot, CoreError> {
        state
            .locals
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
            .ok_or_else(|| state.error(format!("unknown variable '{name}'")))
    }

    fn writable(&self, state: &FunctionState<'_>, name: &str) -> Result<Slot, CoreError> {
        let slot = self.lookup(state, name)?;
        if slot.read_only {
            return Err(state.error(format!("cannot assign to constant '{name}'")));
        }
        Ok(slot)
    }

    fn assign(&mut self, state: &mut FunctionState<'_>, name: &str, value: &Expr) -> Result<(), CoreError> {
        let slot = self.writable(state, name)?;
        let value = self.expression(state, value)?;
        let value = state.cast(value, &slot.ty)?;
        state.builder.emit(format!(
            "store {} {}, ptr {}",
            slot.ty, value.repr, slot.address
        ));
        Ok(())
    }

    fn step(&mut self, state: &mut FunctionState<'_>, name: &str, op: BinaryOp) -> Result<(), CoreError> {
        let value = Expr::binary(op, Expr::Lookup(name.to_string()), Expr::Number(1));
        self.assign(state, name, &value)
    }

    fn assign_indexed(
        &mut self,
        state: &mut FunctionState<'_>,
        name: &str,
        index: &Expr,
        value: &Expr,
    ) -> Result<(), CoreError> {
        let slot = self.writable(state, name)?;
        if slot.datatype.is_memory_indexed() {
            let (address, element) = self.element_address(state, &slot, index)?;
            let value = self.expression(state, value)?;
            let value = state.cast(value, &element)?;
            state
                .builder
                .emit(format!("store {element} {}, ptr {address}", value.repr));
            return Ok(());
        }

        // x[n] = v  =>  x = (x & ~(1 << n)) | ((v != 0) << n)
        let wide = IrType::Int(64);
        let current = state.load(&slot);
        let current = state.cast(current, &wide)?;
        let index = self.expression(state, index)?;
        let index = state.cast(index, &wide)?;
        let value = self.expression(state, value)?;
        let value = state.cast(value, &wide)?;

        let b = &mut state.builder;
        let mask = b.assign(format!("shl i64 1, {}", index.repr));
        let inverted = b.assign(format!("xor i64 {mask}, -1"));
        let cleared = b.assign(format!("and i64 {}, {inverted}", current.repr));
        let set = b.assign(format!("icmp ne i64 {}, 0", value.repr));
        let bit = b.assign(format!("zext i1 {set} to i64"));
        let shifted = b.assign(format!("shl i64 {bit}, {}", index.repr));
        let updated = b.assign(format!("or i64 {cleared}, {shifted}"));

        let updated = state.cast(Value::new(updated, wide), &slot.ty)?;
        state.builder.emit(format!(
            "store {} {}, ptr {}",
            slot.ty, updated.repr, slot.address
        ));
        Ok(())
    }

    /// Address of element `index` of the pointer stored in `slot`.
    fn element_address(
        &mut self,
        state: &mut FunctionState<'_>,
        slot: &Slot,
        index: &Expr,
    ) -> Result<(String, IrType), CoreError> {
        let element = slot
            .ty
            .pointee()
            .cloned()
            .ok_or_else(|| state.error(format!("'{}' cannot be indexed", slot.address)))?;
        let base = state
            .builder
            .assign(format!("load ptr, ptr {}", slot.address));
        let index = self.expression(state, index)?;
        let index = state.cast(index, &IrType::Int(64))?;
        let address = state.builder.assign(format!(
            "getelementptr {element}, ptr {base}, i64 {}",
            index.repr
        ));
        Ok((address, element))
    }

    fn expression(&mut self, state: &mut FunctionState<'_>, expr: &Expr) -> Result<Value, CoreError> {
        let wide = IrType::Int(64);
        match expr {
            Expr::Number(value) => Ok(Value::int(*value)),
            Expr::Str(bytes) => Ok(self.string_literal(bytes)),
            Expr::Lookup(name) => {
                let slot = self.lookup(state, name)?;
                Ok(state.load(&slot))
            }
            Expr::LookupIndexed { name, index } => {
                let slot = self.lookup(state, name)?;
                if slot.datatype.is_memory_indexed() {
                    let (address, element) = self.element_address(state, &slot, index)?;
                    let loaded = state
                        .builder
                        .assign(format!("load {element}, ptr {address}"));
                    return Ok(Value::new(loaded, element));
                }
                let current = state.load(&slot);
                let current = state.cast(current, &wide)?;
                let index = self.expression(state, index)?;
                let index = state.cast(index, &wide)?;
                let shifted = state
                    .builder
                    .assign(format!("lshr i64 {}, {}", current.repr, index.repr));
                let bit = state.builder.assign(format!("and i64 {shifted}, 1"));
                Ok(Value::new(bit, wide))
            }
            Expr::Call(call) => self.call(state, call)?.ok_or_else(|| {
                state.error(format!("void function '{}' used as a value", call.name))
            }),
            Expr::Unary { op, operand } => {
                let value = self.expression(state, operand)?;
                let value = state.cast(value, &wide)?;
                let result = match op {
                    UnaryOp::Plus => return Ok(value),
                    UnaryOp::Minus => state
                        .builder
                        .assign(format!("sub i64 0, {}", value.repr)),
                    UnaryOp::BitNot => state
                        .builder
                        .assign(format!("xor i64 {}, -1", value.repr)),
                    UnaryOp::Not => {
                        let zero = state
                            .builder
                            .assign(format!("icmp eq i64 {}, 0", value.repr));
                        state.builder.assign(format!("zext i1 {zero} to i64"))
                    }
                };
                Ok(Value::new(result, wide))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.expression(state, lhs)?;
                let lhs = state.cast(lhs, &wide)?;
                let rhs = self.expression(state, rhs)?;
                let rhs = state.cast(rhs, &wide)?;
                let result = state.builder.assign(format!(
                    "{} i64 {}, {}",
                    binary_instruction(*op),
                    lhs.repr,
                    rhs.repr
                ));
                Ok(Value::new(result, wide))
            }
            Expr::Compare { op, lhs, rhs } => {
                let flag = self.compare(state, *op, lhs, rhs)?;
                let result = state.builder.assign(format!("zext i1 {flag} to i64"));
                Ok(Value::new(result, wide))
            }
        }
    }

    fn compare(
        &mut self,
        state: &mut FunctionState<'_>,
        op: CompareOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<String, CoreError> {
        let wide = IrType::Int(64);
        let lhs = self.expression(state, lhs)?;
        let lhs = state.cast(lhs, &wide)?;
        let rhs = self.expression(state, rhs)?;
        let rhs = state.cast(rhs, &wide)?;
        Ok(state.builder.assign(format!(
            "icmp {} i64 {}, {}",
            predicate(op),
            lhs.repr,
            rhs.repr
        )))
    }

    /// Lowers `expr` to an `i1` that is set when the value is non-zero.
    fn condition(&mut self, state: &mut FunctionState<'_>, expr: &Expr) -> Result<String, CoreError> {
        if let Expr::Compare { op, lhs, rhs } = expr {
            return self.compare(state, *op, lhs, rhs);
        }
        let value = self.expression(state, expr)?;
        let value = state.cast(value, &IrType::Int(64))?;
        Ok(state
            .builder
            .assign(format!("icmp ne i64 {}, 0", value.repr)))
    }

    fn call(&mut self, state: &mut FunctionState<'_>, call: &Call) -> Result<Option<Value>, CoreError> {
        let (params, ret) = match self.functions.get(&call.name) {
            Some(signature) => (signature.params.clone(), signature.ret.clone()),
            None => return Err(state.error(format!("unknown function '{}'", call.name))),
        };
        if params.len() != call.args.len() {
            return Err(state.error(format!(
                "'{}' expects {} arguments but {} were given",
                call.name,
                params.len(),
                call.args.len()
            )));
        }

        let mut args = Vec::with_capacity(params.len());
        for (arg, ty) in call.args.iter().zip(&params) {
            let value = self.expression(state, arg)?;
            let value = state.cast(value, ty)?;
            args.push(format!("{ty} {}", value.repr));
        }
        let args = args.join(", ");

        if ret == IrType::Void {
            state
                .builder
                .emit(format!("call void @{}({args})", call.name));
            return Ok(None);
        }
        let result = state
            .builder
            .assign(format!("call {ret} @{}({args})", call.name));
        Ok(Some(Value::new(result, ret)))
    }

    fn string_literal(&mut self, bytes: &[u8]) -> Value {
        let name = format!("@.str.{}", self.strings);
        self.strings += 1;
        self.module.push_global(format!(
            "{name} = private unnamed_addr constant {}",
            byte_array(bytes)
        ));
        Value::new(name, IrType::pointer_to(IrType::Int(8)))
    }
}

/// Per-function lowering state.
struct FunctionState<'a> {
    name: &'a str,
    builder: FunctionBuilder,
    locals: HashMap<String, Slot>,
    /// How many slots each local name has been given so far.
    declared: HashMap<String, u32>,
    ret: IrType,
    no_return: bool,
    incomings: Vec<(String, String)>,
    hooks: Vec<(String, &'a [Stmt])>,
    in_hook: bool,
}

impl<'a> FunctionState<'a> {
    fn new(name: &'a str, header: String, ret: IrType) -> Self {
        FunctionState {
            name,
            builder: FunctionBuilder::new(header),
            locals: HashMap::new(),
            declared: HashMap::new(),
            ret,
            no_return: false,
            incomings: Vec::new(),
            hooks: Vec::new(),
            in_hook: false,
        }
    }

    fn error(&self, message: impl Into<String>) -> CoreError {
        CoreError::semantic(Some(self.name), message)
    }

    /// Allocates a fresh stack slot and binds `name` to it.
    fn declare_slot(&mut self, name: &str, datatype: Datatype, ty: IrType) -> String {
        let count = self.declared.entry(name.to_string()).or_insert(0);
        let address = match *count {
            0 => format!("%{name}.addr"),
            n => format!("%{name}.addr.{n}"),
        };
        *count += 1;

        self.builder.alloca(&address, &ty);
        self.locals.insert(
            name.to_string(),
            Slot {
                address: address.clone(),
                datatype,
                ty,
                read_only: false,
            },
        );
        address
    }

    fn load(&mut self, slot: &Slot) -> Value {
        let loaded = self
            .builder
            .assign(format!("load {}, ptr {}", slot.ty, slot.address));
        Value::new(loaded, slot.ty.clone())
    }

    fn cast(&mut self, value: Value, to: &IrType) -> Result<Value, CoreError> {
        let converted = match (&value.ty, to) {
            (from, to) if from.same_repr(to) => return Ok(Value::new(value.repr, to.clone())),
            (IrType::Ptr(_), IrType::Int(bits)) => self
                .builder
                .assign(format!("ptrtoint ptr {} to i{bits}", value.repr)),
            (IrType::Int(bits), IrType::Ptr(_)) => self
                .builder
                .assign(format!("inttoptr i{bits} {} to ptr", value.repr)),
            (IrType::Int(from), IrType::Int(bits)) if from < bits => self
                .builder
                .assign(format!("zext i{from} {} to i{bits}", value.repr)),
            (IrType::Int(from), IrType::Int(bits)) => self
                .builder
                .assign(format!("trunc i{from} {} to i{bits}", value.repr)),
            (from, to) => {
                return Err(self.error(format!("cannot convert {from} to {to}")));
            }
        };
        Ok(Value::new(converted, to.clone()))
    }
}

fn attribute_suffix(function: &Function) -> &'static str {
    if function.has_attribute(Attribute::NoReturn) {
        " noreturn"
    } else {
        ""
    }
}

fn byte_array(bytes: &[u8]) -> String {
    format!("[{} x i8] c\"{}\\00\"", bytes.len() + 1, escape_bytes(bytes))
}

/// Reinterprets the low `bits` bits of `value` as a signed integer.
fn wrap_to_width(value: i64, bits: u32) -> i64 {
    if bits >= 64 {
        return value;
    }
    let shift = 64 - bits;
    (value << shift) >> shift
}

fn binary_instruction(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "sdiv",
        BinaryOp::Mod => "srem",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::Shr => "lshr",
    }
}

fn predicate(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Equal => "eq",
        CompareOp::NotEqual => "ne",
        CompareOp::Less => "slt",
        CompareOp::LessEqual => "sle",
        CompareOp::Greater => "sgt",
        CompareOp::GreaterEqual => "sge",
    }
}
