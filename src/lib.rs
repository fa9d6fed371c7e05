//! A cooperative block-script virtual machine: green threads stepped by a
//! frame-budgeted sequencer, an interpreter for block stacks, and a
//! compiler that turns stacks into resumable instruction lists.

pub mod block;
pub mod block_utility;
pub mod blocks;
pub mod cast;
mod compat;
pub mod compiler;
pub mod config;
pub mod error;
mod execute;
pub mod input;
pub mod io;
pub mod project;
pub mod promise;
pub mod runtime;
pub mod sequencer;
pub mod target;
pub mod thread;
pub mod timer;
pub mod value;
pub mod variable;

pub use block::{Block, BlockContainer, BlockId, Mutation};
pub use block_utility::BlockUtility;
pub use blocks::{BlockArgs, BlockLibrary, BlockRegistry, HatInfo, Reported};
pub use config::RuntimeConfig;
pub use error::{BlockError, CompileError, LoadError};
pub use input::{Field, Input};
pub use io::{ClockDevice, IoDevice};
pub use project::{load_project, Project};
pub use promise::{Promise, PromiseState, Resolver};
pub use runtime::{Runtime, RuntimeEvent};
pub use sequencer::Sequencer;
pub use target::{Target, TargetId};
pub use thread::{Thread, ThreadId, ThreadStatus};
pub use timer::{Clock, ManualClock, SystemClock, Timer};
pub use value::Value;
pub use variable::Variable;
