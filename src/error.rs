use thiserror::Error;

use crate::block::BlockId;

/// Raised while turning a block stack into a compiled script. Any of these
/// makes the whole script fall back to the interpreter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
  #[error("block {0} does not exist")]
  MissingBlock(BlockId),
  #[error("block {block} has a malformed mutation: {reason}")]
  MalformedMutation { block: BlockId, reason: String },
  #[error("opcode {opcode} has neither a generator nor a primitive")]
  UnknownOpcode { opcode: String },
}

/// Raised by a block while it runs. The thread that hit it stops; the
/// others keep going.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockError {
  #[error("{opcode}: {message}")]
  Primitive { opcode: String, message: String },
  #[error("no I/O device named {0}")]
  UnknownDevice(String),
  #[error("I/O device {device} has no function {function}")]
  UnknownDeviceFunction { device: String, function: String },
  #[error("target {0} no longer exists")]
  MissingTarget(usize),
}

impl BlockError {
  pub fn primitive(opcode: &str, message: impl Into<String>) -> Self {
    BlockError::Primitive {
      opcode: opcode.to_string(),
      message: message.into(),
    }
  }
}

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("could not read project: {0}")]
  Io(#[from] std::io::Error),
  #[error("could not parse project: {0}")]
  Json(#[from] serde_json::Error),
  #[error("project has no stage target")]
  MissingStage,
}
