//! The instruction set compiled scripts are made of.
//!
//! A script is a flat list of [`Op`]s addressed by index. Control flow is
//! expressed with jumps, so a thread can stop after any instruction and
//! pick up again at the saved index. Expressions ([`Expr`]) never suspend:
//! anything that might is hoisted into its own instruction first.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::block::{BlockId, Mutation};
use crate::blocks::data;
use crate::blocks::operators::{self, Arithmetic, Comparison, MathOp};
use crate::cast;
use crate::error::BlockError;
use crate::input::Field;
use crate::value::Value;
use crate::variable;

/// A variable or list as named by a block field.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
  pub id: String,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Constant(Value),
  Local(usize),
  /// A procedure parameter; `default` when the name is unbound.
  Argument { name: String, default: Value },
  Variable(VarRef),
  ListContents(VarRef),
  ListItem(VarRef, Box<Expr>),
  ListLength(VarRef),
  ListContains(VarRef, Box<Expr>),
  ListItemNum(VarRef, Box<Expr>),
  /// Number with NaN mapped to 0.
  ToNumber(Box<Expr>),
  /// Number that keeps NaN.
  JsNumber(Box<Expr>),
  NanToZero(Box<Expr>),
  ToString(Box<Expr>),
  ToBoolean(Box<Expr>),
  Arithmetic(Arithmetic, Box<Expr>, Box<Expr>),
  Compare(Comparison, Box<Expr>, Box<Expr>),
  /// Comparison of two operands already known to be numbers.
  NumberCompare(Comparison, Box<Expr>, Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
  Not(Box<Expr>),
  Join(Box<Expr>, Box<Expr>),
  LetterOf(Box<Expr>, Box<Expr>),
  Length(Box<Expr>),
  Contains(Box<Expr>, Box<Expr>),
  Round(Box<Expr>),
  Math(MathOp, Box<Expr>),
  Random(Box<Expr>, Box<Expr>),
  Timer,
}

/// What expressions read while they are evaluated.
pub trait ExprEnv {
  fn local(&self, slot: usize) -> Value;
  fn argument(&self, name: &str) -> Option<Value>;
  fn variable(&mut self, var: &VarRef) -> Result<Value, BlockError>;
  fn list(&mut self, var: &VarRef) -> Result<&[Value], BlockError>;
  fn timer(&mut self) -> Result<f64, BlockError>;
}

/// Evaluates expressions that read nothing but constants.
pub struct ConstantEnv;

impl ConstantEnv {
  fn not_constant() -> BlockError {
    BlockError::primitive("constant", "expression reads runtime state")
  }
}

impl ExprEnv for ConstantEnv {
  fn local(&self, _: usize) -> Value {
    Value::default()
  }

  fn argument(&self, _: &str) -> Option<Value> {
    None
  }

  fn variable(&mut self, _: &VarRef) -> Result<Value, BlockError> {
    Err(Self::not_constant())
  }

  fn list(&mut self, _: &VarRef) -> Result<&[Value], BlockError> {
    Err(Self::not_constant())
  }

  fn timer(&mut self) -> Result<f64, BlockError> {
    Err(Self::not_constant())
  }
}

fn boxed(expr: Expr) -> Box<Expr> {
  Box::new(expr)
}

impl Expr {
  pub fn to_number(self) -> Expr {
    Expr::ToNumber(boxed(self))
  }

  pub fn to_js_number(self) -> Expr {
    Expr::JsNumber(boxed(self))
  }

  pub fn nan_to_zero(self) -> Expr {
    Expr::NanToZero(boxed(self))
  }

  pub fn to_string_expr(self) -> Expr {
    Expr::ToString(boxed(self))
  }

  pub fn to_boolean(self) -> Expr {
    Expr::ToBoolean(boxed(self))
  }

  pub fn binary(
    make: fn(Box<Expr>, Box<Expr>) -> Expr,
    a: Expr,
    b: Expr,
  ) -> Expr {
    make(boxed(a), boxed(b))
  }

  /// Whether the value depends on nothing but the expression itself.
  pub fn is_constant_foldable(&self) -> bool {
    match self {
      Expr::Constant(_) => true,
      Expr::Local(_)
      | Expr::Argument { .. }
      | Expr::Variable(_)
      | Expr::ListContents(_)
      | Expr::ListItem(..)
      | Expr::ListLength(_)
      | Expr::ListContains(..)
      | Expr::ListItemNum(..)
      | Expr::Random(..)
      | Expr::Timer => false,
      Expr::ToNumber(a)
      | Expr::JsNumber(a)
      | Expr::NanToZero(a)
      | Expr::ToString(a)
      | Expr::ToBoolean(a)
      | Expr::Not(a)
      | Expr::Length(a)
      | Expr::Round(a)
      | Expr::Math(_, a) => a.is_constant_foldable(),
      Expr::Arithmetic(_, a, b)
      | Expr::Compare(_, a, b)
      | Expr::NumberCompare(_, a, b)
      | Expr::And(a, b)
      | Expr::Or(a, b)
      | Expr::Join(a, b)
      | Expr::LetterOf(a, b)
      | Expr::Contains(a, b) => {
        a.is_constant_foldable() && b.is_constant_foldable()
      }
    }
  }

  pub fn eval(&self, env: &mut dyn ExprEnv) -> Result<Value, BlockError> {
    Ok(match self {
      Expr::Constant(value) => value.clone(),
      Expr::Local(slot) => env.local(*slot),
      Expr::Argument { name, default } => {
        env.argument(name).unwrap_or_else(|| default.clone())
      }
      Expr::Variable(var) => env.variable(var)?,
      Expr::ListContents(var) => {
        Value::from(variable::list_contents(env.list(var)?))
      }
      Expr::ListItem(var, index) => {
        let index = index.eval(env)?;
        data::item_of_list(env.list(var)?, &index)
      }
      Expr::ListLength(var) => Value::from(env.list(var)?.len()),
      Expr::ListContains(var, item) => {
        let item = item.eval(env)?;
        Value::Bool(data::list_contains_item(env.list(var)?, &item))
      }
      Expr::ListItemNum(var, item) => {
        let item = item.eval(env)?;
        Value::from(variable::item_num_of_list(env.list(var)?, &item))
      }
      Expr::ToNumber(a) => Value::Number(cast::to_number(&a.eval(env)?)),
      Expr::JsNumber(a) => Value::Number(a.number(env)?),
      Expr::NanToZero(a) => {
        let n = a.number(env)?;
        Value::Number(if n.is_nan() { 0. } else { n })
      }
      Expr::ToString(a) => Value::String(a.eval(env)?.to_string()),
      Expr::ToBoolean(a) => Value::Bool(a.boolean(env)?),
      Expr::Arithmetic(op, a, b) => {
        Value::Number(op.apply(a.number(env)?, b.number(env)?))
      }
      Expr::Compare(op, a, b) => {
        let a = a.eval(env)?;
        Value::Bool(op.apply(&a, &b.eval(env)?))
      }
      Expr::NumberCompare(op, a, b) => {
        Value::Bool(op.apply_numbers(a.number(env)?, b.number(env)?))
      }
      Expr::And(a, b) => Value::Bool(a.boolean(env)? && b.boolean(env)?),
      Expr::Or(a, b) => Value::Bool(a.boolean(env)? || b.boolean(env)?),
      Expr::Not(a) => Value::Bool(!a.boolean(env)?),
      Expr::Join(a, b) => {
        let a = a.eval(env)?;
        Value::String(format!("{a}{}", b.eval(env)?))
      }
      Expr::LetterOf(index, string) => {
        let index = index.number(env)?;
        Value::from(operators::letter_of(index, &string.eval(env)?.to_string()))
      }
      Expr::Length(a) => {
        Value::Number(operators::length(&a.eval(env)?.to_string()))
      }
      Expr::Contains(a, b) => {
        let a = a.eval(env)?.to_string();
        Value::Bool(operators::contains(&a, &b.eval(env)?.to_string()))
      }
      Expr::Round(a) => Value::Number(cast::js_round(a.number(env)?)),
      Expr::Math(op, a) => Value::Number(op.apply(a.number(env)?)),
      Expr::Random(from, to) => {
        let from = from.eval(env)?;
        Value::Number(operators::random(&from, &to.eval(env)?))
      }
      Expr::Timer => Value::Number(env.timer()?),
    })
  }

  fn number(&self, env: &mut dyn ExprEnv) -> Result<f64, BlockError> {
    Ok(cast::js_number(&self.eval(env)?))
  }

  fn boolean(&self, env: &mut dyn ExprEnv) -> Result<bool, BlockError> {
    Ok(cast::to_boolean(&self.eval(env)?))
  }
}

fn comparison_symbol(op: Comparison) -> &'static str {
  match op {
    Comparison::Lt => "<",
    Comparison::Gt => ">",
    Comparison::Equals => "==",
  }
}

fn arithmetic_symbol(op: Arithmetic) -> &'static str {
  match op {
    Arithmetic::Add => "+",
    Arithmetic::Subtract => "-",
    Arithmetic::Multiply => "*",
    Arithmetic::Divide => "/",
    Arithmetic::Mod => "mod",
  }
}

impl fmt::Display for VarRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}", self.name)
  }
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Expr::Constant(Value::String(string)) => write!(f, "{string:?}"),
      Expr::Constant(value) => write!(f, "{value}"),
      Expr::Local(slot) => write!(f, "%{slot}"),
      Expr::Argument { name, .. } => write!(f, "arg({name:?})"),
      Expr::Variable(var) => write!(f, "var({var})"),
      Expr::ListContents(var) => write!(f, "contents({var})"),
      Expr::ListItem(var, index) => write!(f, "item({var}, {index})"),
      Expr::ListLength(var) => write!(f, "length({var})"),
      Expr::ListContains(var, item) => write!(f, "contains({var}, {item})"),
      Expr::ListItemNum(var, item) => write!(f, "index_of({var}, {item})"),
      Expr::ToNumber(a) => write!(f, "number({a})"),
      Expr::JsNumber(a) => write!(f, "js_number({a})"),
      Expr::NanToZero(a) => write!(f, "nan_to_zero({a})"),
      Expr::ToString(a) => write!(f, "string({a})"),
      Expr::ToBoolean(a) => write!(f, "bool({a})"),
      Expr::Arithmetic(op, a, b) => {
        write!(f, "({a} {} {b})", arithmetic_symbol(*op))
      }
      Expr::Compare(op, a, b) => {
        write!(f, "compare({a} {} {b})", comparison_symbol(*op))
      }
      Expr::NumberCompare(op, a, b) => {
        write!(f, "({a} {} {b})", comparison_symbol(*op))
      }
      Expr::And(a, b) => write!(f, "({a} && {b})"),
      Expr::Or(a, b) => write!(f, "({a} || {b})"),
      Expr::Not(a) => write!(f, "!{a}"),
      Expr::Join(a, b) => write!(f, "join({a}, {b})"),
      Expr::LetterOf(index, string) => write!(f, "letter({index}, {string})"),
      Expr::Length(a) => write!(f, "strlen({a})"),
      Expr::Contains(a, b) => write!(f, "includes({a}, {b})"),
      Expr::Round(a) => write!(f, "round({a})"),
      Expr::Math(op, a) => write!(f, "{op:?}({a})"),
      Expr::Random(a, b) => write!(f, "random({a}, {b})"),
      Expr::Timer => write!(f, "timer()"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOption {
  All,
  ThisScript,
  OtherScripts,
}

/// Which compiled body a procedure call runs. Warp-mode callers use the
/// warp variant even when the procedure itself is not warp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcedureKey {
  pub proccode: String,
  pub warp: bool,
}

/// A block that has no generator, invoked through its primitive.
#[derive(Debug, Clone)]
pub struct CompatCall {
  pub opcode: String,
  pub block: BlockId,
  pub args: Vec<(String, Expr)>,
  pub fields: BTreeMap<String, Field>,
  pub mutation: Option<Mutation>,
  /// Compiled substacks, by branch number starting at 1.
  pub branches: Vec<Option<Rc<CompiledScript>>>,
  /// Local that receives the reported value.
  pub dest: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum Op {
  SetVariable { var: VarRef, value: Expr },
  ChangeVariable { var: VarRef, by: Expr },
  AddToList { list: VarRef, item: Expr },
  DeleteOfList { list: VarRef, index: Expr },
  DeleteAllOfList { list: VarRef },
  InsertAtList { list: VarRef, index: Expr, item: Expr },
  ReplaceItemOfList { list: VarRef, index: Expr, item: Expr },
  Store { slot: usize, value: Expr },
  Jump(usize),
  JumpIfFalse { condition: Expr, target: usize },
  JumpIfTrue { condition: Expr, target: usize },
  /// Sets the loop counter in `slot` to the rounded repeat count.
  RepeatInit { slot: usize, times: Expr },
  /// Jumps to `exit` once the counter in `slot` is used up, else counts
  /// one iteration down.
  RepeatTest { slot: usize, exit: usize },
  /// Ends the thread's turn for this pass.
  Yield,
  /// Ends the turn only once the warp budget is spent.
  YieldIfNeeded,
  /// Sleeps until the next tick.
  YieldTick,
  /// Suspends until the given number of seconds has passed.
  Wait { duration: Expr },
  Call { key: ProcedureKey, args: Vec<(String, Expr)> },
  Compat(Box<CompatCall>),
  Stop(StopOption),
  Nop(String),
}

/// Compiled form of one block stack.
#[derive(Debug, Clone, Default)]
pub struct CompiledScript {
  pub name: String,
  pub ops: Vec<Op>,
  pub locals: usize,
  pub warp: bool,
}

fn write_args(
  f: &mut fmt::Formatter<'_>,
  args: &[(String, Expr)],
) -> fmt::Result {
  for (index, (name, expr)) in args.iter().enumerate() {
    if index > 0 {
      write!(f, ", ")?;
    }
    write!(f, "{name}: {expr}")?;
  }
  Ok(())
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Op::SetVariable { var, value } => write!(f, "set {var} = {value}"),
      Op::ChangeVariable { var, by } => write!(f, "change {var} += {by}"),
      Op::AddToList { list, item } => write!(f, "push {list} {item}"),
      Op::DeleteOfList { list, index } => write!(f, "delete {list}[{index}]"),
      Op::DeleteAllOfList { list } => write!(f, "clear {list}"),
      Op::InsertAtList { list, index, item } => {
        write!(f, "insert {list}[{index}] {item}")
      }
      Op::ReplaceItemOfList { list, index, item } => {
        write!(f, "replace {list}[{index}] {item}")
      }
      Op::Store { slot, value } => write!(f, "%{slot} = {value}"),
      Op::Jump(target) => write!(f, "jump @{target}"),
      Op::JumpIfFalse { condition, target } => {
        write!(f, "unless {condition} jump @{target}")
      }
      Op::JumpIfTrue { condition, target } => {
        write!(f, "if {condition} jump @{target}")
      }
      Op::RepeatInit { slot, times } => write!(f, "%{slot} = round({times})"),
      Op::RepeatTest { slot, exit } => {
        write!(f, "if %{slot} < 0.5 jump @{exit} else %{slot} -= 1")
      }
      Op::Yield => write!(f, "yield"),
      Op::YieldIfNeeded => write!(f, "yield if stuck"),
      Op::YieldTick => write!(f, "yield tick"),
      Op::Wait { duration } => write!(f, "wait {duration}s"),
      Op::Call { key, args } => {
        let warp = if key.warp { " (warp)" } else { "" };
        write!(f, "call {:?}{warp} (", key.proccode)?;
        write_args(f, args)?;
        write!(f, ")")
      }
      Op::Compat(call) => {
        if let Some(dest) = call.dest {
          write!(f, "%{dest} = ")?;
        }
        write!(f, "compat {} (", call.opcode)?;
        write_args(f, &call.args)?;
        write!(f, ")")?;
        if !call.branches.is_empty() {
          write!(f, " with {} branches", call.branches.len())?;
        }
        Ok(())
      }
      Op::Stop(option) => write!(f, "stop {option:?}"),
      Op::Nop(comment) => write!(f, "nop // {comment}"),
    }
  }
}

/// The listing logged when a script is compiled.
impl fmt::Display for CompiledScript {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let warp = if self.warp { " warp" } else { "" };
    writeln!(f, "{}{warp} ({} locals):", self.name, self.locals)?;
    for (index, op) in self.ops.iter().enumerate() {
      writeln!(f, "  @{index:<3} {op}")?;
    }
    Ok(())
  }
}
