//! SSA intermediate representation: values, instructions, basic blocks
//! and linearized programs.

pub mod block;
pub mod instr;
pub mod program;
pub mod value;
pub mod walloc;

pub use block::{Bindings, Block, BlockArena, BlockId, Bound, ReturnBindingCtx};
pub use instr::{BuiltinOp, Instr, InstrOp};
pub use program::{dot, serialize, Program, Step};
pub use value::{Const, Generator, PtrInfo, Value, ValueId};
pub use walloc::WireAllocator;
