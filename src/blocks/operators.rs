use std::f64::consts::PI;

use super::{BlockArgs, BlockLibrary, BlockRegistry, Reported};
use crate::block_utility::BlockUtility;
use crate::cast;
use crate::compiler::{generator, Generator};
use crate::error::BlockError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
  Add,
  Subtract,
  Multiply,
  Divide,
  Mod,
}

impl Arithmetic {
  pub fn apply(self, a: f64, b: f64) -> f64 {
    match self {
      Arithmetic::Add => a + b,
      Arithmetic::Subtract => a - b,
      Arithmetic::Multiply => a * b,
      Arithmetic::Divide => a / b,
      Arithmetic::Mod => modulo(a, b),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
  Lt,
  Gt,
  Equals,
}

impl Comparison {
  pub fn apply(self, a: &Value, b: &Value) -> bool {
    match self {
      Comparison::Lt => cast::lt(a, b),
      Comparison::Gt => cast::gt(a, b),
      Comparison::Equals => cast::equals(a, b),
    }
  }

  /// Same result as [`Comparison::apply`] for operands that are known to
  /// be numbers.
  pub fn apply_numbers(self, a: f64, b: f64) -> bool {
    match self {
      Comparison::Lt => a < b,
      Comparison::Gt => a > b,
      Comparison::Equals => a == b,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
  Abs,
  Floor,
  Ceiling,
  Sqrt,
  Sin,
  Cos,
  Tan,
  Asin,
  Acos,
  Atan,
  Ln,
  Log,
  Exp,
  Pow10,
}

impl MathOp {
  pub fn parse(name: &str) -> Option<MathOp> {
    Some(match name.to_lowercase().as_str() {
      "abs" => MathOp::Abs,
      "floor" => MathOp::Floor,
      "ceiling" => MathOp::Ceiling,
      "sqrt" => MathOp::Sqrt,
      "sin" => MathOp::Sin,
      "cos" => MathOp::Cos,
      "tan" => MathOp::Tan,
      "asin" => MathOp::Asin,
      "acos" => MathOp::Acos,
      "atan" => MathOp::Atan,
      "ln" => MathOp::Ln,
      "log" => MathOp::Log,
      "e ^" => MathOp::Exp,
      "10 ^" => MathOp::Pow10,
      _ => return None,
    })
  }

  pub fn apply(self, n: f64) -> f64 {
    match self {
      MathOp::Abs => n.abs(),
      MathOp::Floor => n.floor(),
      MathOp::Ceiling => n.ceil(),
      MathOp::Sqrt => n.sqrt(),
      MathOp::Sin => round_ten_places((PI * n / 180.).sin()),
      MathOp::Cos => round_ten_places((PI * n / 180.).cos()),
      MathOp::Tan => tan(n),
      MathOp::Asin => n.asin() * 180. / PI,
      MathOp::Acos => n.acos() * 180. / PI,
      MathOp::Atan => n.atan() * 180. / PI,
      MathOp::Ln => n.ln(),
      MathOp::Log => n.log10(),
      MathOp::Exp => n.exp(),
      MathOp::Pow10 => 10f64.powf(n),
    }
  }
}

fn round_ten_places(n: f64) -> f64 {
  cast::js_round(n * 1e10) / 1e10
}

fn tan(degrees: f64) -> f64 {
  let angle = degrees % 360.;
  if angle == -270. || angle == 90. {
    f64::INFINITY
  } else if angle == -90. || angle == 270. {
    f64::NEG_INFINITY
  } else {
    round_ten_places((PI * angle / 180.).tan())
  }
}

/// Remainder with the sign of the divisor.
pub fn modulo(n: f64, modulus: f64) -> f64 {
  let mut result = n % modulus;
  if result / modulus < 0. {
    result += modulus;
  }
  result
}

/// The `index`th character (1-based), or an empty string.
pub fn letter_of(index: f64, string: &str) -> String {
  let index = index - 1.;
  let length = string.chars().count();
  if index < 0. || index >= length as f64 || index.is_nan() {
    return String::new();
  }
  string
    .chars()
    .nth(index as usize)
    .map(String::from)
    .unwrap_or_default()
}

pub fn length(string: &str) -> f64 {
  string.chars().count() as f64
}

pub fn contains(haystack: &str, needle: &str) -> bool {
  haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Integer result when both bounds look like integers, otherwise a
/// fraction between them.
pub fn random(from: &Value, to: &Value) -> f64 {
  let n_from = cast::to_number(from);
  let n_to = cast::to_number(to);
  let (low, high) = if n_from <= n_to {
    (n_from, n_to)
  } else {
    (n_to, n_from)
  };
  if low == high {
    return low;
  }
  if cast::is_int(from) && cast::is_int(to) {
    return low + (cast::random_fraction() * (high + 1. - low)).floor();
  }
  cast::random_fraction() * (high - low) + low
}

fn arithmetic(args: &BlockArgs, op: Arithmetic) -> Reported {
  op.apply(args.number("NUM1"), args.number("NUM2")).into()
}

fn comparison(args: &BlockArgs, op: Comparison) -> Reported {
  op.apply(&args.get("OPERAND1"), &args.get("OPERAND2")).into()
}

type Outcome = Result<Reported, BlockError>;

fn add(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(arithmetic(args, Arithmetic::Add))
}

fn subtract(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(arithmetic(args, Arithmetic::Subtract))
}

fn multiply(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(arithmetic(args, Arithmetic::Multiply))
}

fn divide(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(arithmetic(args, Arithmetic::Divide))
}

fn mod_(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(arithmetic(args, Arithmetic::Mod))
}

fn lt(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(comparison(args, Comparison::Lt))
}

fn gt(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(comparison(args, Comparison::Gt))
}

fn equals(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(comparison(args, Comparison::Equals))
}

fn and(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok((args.boolean("OPERAND1") && args.boolean("OPERAND2")).into())
}

fn or(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok((args.boolean("OPERAND1") || args.boolean("OPERAND2")).into())
}

fn not(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok((!args.boolean("OPERAND")).into())
}

fn random_block(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(random(&args.get("FROM"), &args.get("TO")).into())
}

fn join(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(format!("{}{}", args.string("STRING1"), args.string("STRING2")).into())
}

fn letter_of_block(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(letter_of(args.number("LETTER"), &args.string("STRING")).into())
}

fn length_block(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(length(&args.string("STRING")).into())
}

fn contains_block(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(contains(&args.string("STRING1"), &args.string("STRING2")).into())
}

fn round(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  Ok(cast::js_round(args.number("NUM")).into())
}

fn mathop(args: &BlockArgs, _: &mut BlockUtility) -> Outcome {
  let n = args.number("NUM");
  let result = MathOp::parse(&args.string("OPERATOR")).map_or(0., |op| op.apply(n));
  Ok(result.into())
}

#[derive(Debug, Default)]
pub struct OperatorBlocks;

impl BlockLibrary for OperatorBlocks {
  fn name(&self) -> &'static str {
    "operators"
  }

  fn register(&self, registry: &mut BlockRegistry) {
    registry.register_fn("operator_add", add);
    registry.register_fn("operator_subtract", subtract);
    registry.register_fn("operator_multiply", multiply);
    registry.register_fn("operator_divide", divide);
    registry.register_fn("operator_mod", mod_);
    registry.register_fn("operator_lt", lt);
    registry.register_fn("operator_gt", gt);
    registry.register_fn("operator_equals", equals);
    registry.register_fn("operator_and", and);
    registry.register_fn("operator_or", or);
    registry.register_fn("operator_not", not);
    registry.register_fn("operator_random", random_block);
    registry.register_fn("operator_join", join);
    registry.register_fn("operator_letter_of", letter_of_block);
    registry.register_fn("operator_length", length_block);
    registry.register_fn("operator_contains", contains_block);
    registry.register_fn("operator_round", round);
    registry.register_fn("operator_mathop", mathop);

    let generators: [(&str, Generator); 18] = [
      ("operator_add", Generator::Reporter(generator::add)),
      ("operator_subtract", Generator::Reporter(generator::subtract)),
      ("operator_multiply", Generator::Reporter(generator::multiply)),
      ("operator_divide", Generator::Reporter(generator::divide)),
      ("operator_mod", Generator::Reporter(generator::modulo)),
      ("operator_lt", Generator::Reporter(generator::lt)),
      ("operator_gt", Generator::Reporter(generator::gt)),
      ("operator_equals", Generator::Reporter(generator::equals)),
      ("operator_and", Generator::Reporter(generator::and)),
      ("operator_or", Generator::Reporter(generator::or)),
      ("operator_not", Generator::Reporter(generator::not)),
      ("operator_random", Generator::Reporter(generator::random)),
      ("operator_join", Generator::Reporter(generator::join)),
      ("operator_letter_of", Generator::Reporter(generator::letter_of)),
      ("operator_length", Generator::Reporter(generator::length)),
      ("operator_contains", Generator::Reporter(generator::contains)),
      ("operator_round", Generator::Reporter(generator::round)),
      ("operator_mathop", Generator::Reporter(generator::mathop)),
    ];
    for (opcode, generator) in generators {
      registry.register_generator(opcode, generator);
    }
  }
}
