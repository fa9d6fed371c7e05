use super::ir::{ConstantEnv, Expr};
use crate::cast;
use crate::value::Value;

/// What is statically known about the value of a compiled input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
  /// A number that is never NaN.
  AlwaysNumber,
  /// A number, possibly NaN.
  Number,
  String,
  Boolean,
  /// Anything.
  Dynamic,
}

/// A compiled input expression with its static type. Constant inputs are
/// cast at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledInput {
  pub expr: Expr,
  pub ty: InputType,
}

impl CompiledInput {
  pub fn new(expr: Expr, ty: InputType) -> Self {
    CompiledInput { expr, ty }
  }

  pub fn dynamic(expr: Expr) -> Self {
    CompiledInput::new(expr, InputType::Dynamic)
  }

  pub fn constant(value: Value) -> Self {
    let ty = match &value {
      Value::Number(n) if n.is_nan() => InputType::Number,
      Value::Number(_) => InputType::AlwaysNumber,
      Value::Bool(_) => InputType::Boolean,
      Value::String(_) => InputType::String,
    };
    CompiledInput::new(Expr::Constant(value), ty)
  }

  /// Evaluates the expression now when it reads nothing at run time.
  pub fn folded(expr: Expr, ty: InputType) -> Self {
    if expr.is_constant_foldable() && !matches!(expr, Expr::Constant(_)) {
      if let Ok(value) = expr.eval(&mut ConstantEnv) {
        return CompiledInput::constant(value);
      }
    }
    CompiledInput::new(expr, ty)
  }

  pub fn constant_value(&self) -> Option<&Value> {
    match &self.expr {
      Expr::Constant(value) => Some(value),
      _ => None,
    }
  }

  pub fn is_constant(&self) -> bool {
    self.constant_value().is_some()
  }

  /// The input as a number, NaN mapped to 0.
  pub fn as_number(&self) -> Expr {
    if let Some(value) = self.constant_value() {
      return Expr::Constant(Value::Number(cast::to_number(value)));
    }
    match self.ty {
      InputType::AlwaysNumber => self.expr.clone(),
      InputType::Number => self.expr.clone().nan_to_zero(),
      _ => self.expr.clone().to_number(),
    }
  }

  /// The input as a number without mapping NaN to 0.
  pub fn as_pure_number(&self) -> Expr {
    if let Some(value) = self.constant_value() {
      return Expr::Constant(Value::Number(cast::js_number(value)));
    }
    match self.ty {
      InputType::AlwaysNumber | InputType::Number => self.expr.clone(),
      _ => self.expr.clone().to_js_number(),
    }
  }

  pub fn as_string(&self) -> Expr {
    if let Some(value) = self.constant_value() {
      return Expr::Constant(Value::String(value.to_string()));
    }
    match self.ty {
      InputType::String => self.expr.clone(),
      _ => self.expr.clone().to_string_expr(),
    }
  }

  pub fn as_boolean(&self) -> Expr {
    if let Some(value) = self.constant_value() {
      return Expr::Constant(Value::Bool(cast::to_boolean(value)));
    }
    match self.ty {
      InputType::Boolean => self.expr.clone(),
      _ => self.expr.clone().to_boolean(),
    }
  }

  /// The input as it is, for blocks that cast it themselves.
  pub fn as_unknown(&self) -> Expr {
    self.expr.clone()
  }

  pub fn is_always_number(&self) -> bool {
    self.ty == InputType::AlwaysNumber
  }
}
