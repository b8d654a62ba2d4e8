/// Scalar instruction: one static or dynamic instruction occurrence,
/// independent of how many lanes execute it.
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::{MemoryOp, MemorySpace};

/// Program-counter address type
pub type Address = u32;

/// Number of architectural register slots tracked for bank-conflict analysis
pub const MAX_REG_OPERANDS: usize = 8;

/// Operation classes the timing model can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OpType {
    #[default]
    NoOp,
    Alu,
    /// Special-function unit (transcendentals)
    Sfu,
    AluSfu,
    Load,
    Store,
    Branch,
    Barrier,
    MemoryBarrier,
}

/// Human-readable one-line rendering of an instruction.
pub trait Renderable {
    fn render(&self) -> String;
}

/// Extension point for populating an instruction from an encoded program.
///
/// The decoder owns the encoding; the model only defines where the result
/// lands.
pub trait Decoder {
    fn pre_decode(&self, pc: Address, inst: &mut ScalarInstruction) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarInstruction {
    /// Program counter address of the instruction
    pub pc: Address,
    /// Encoded size in bytes
    pub isize: u32,
    pub op: OpType,
    pub memory_op: MemoryOp,

    /// Output register numbers, 0 = unused
    pub out: [u32; 4],
    /// Input register numbers, 0 = unused
    pub inp: [u32; 4],
    pub is_vectorin: bool,
    pub is_vectorout: bool,
    /// Predicate register number
    pub pred: i32,
    pub ar1: i32,
    pub ar2: i32,
    /// Register numbers for bank conflict evaluation, -1 = unused
    pub arch_reg: [i32; MAX_REG_OPERANDS],
    /// Inverse throughput
    pub cycles: u32,
    /// Size of the word being operated on, in bytes
    pub data_size: u32,
    pub space: MemorySpace,

    decoded: bool,
}

impl ScalarInstruction {
    /// A slot with no instruction in it.
    pub fn placeholder() -> Self {
        ScalarInstruction {
            pc: Address::MAX,
            isize: 0,
            op: OpType::NoOp,
            memory_op: MemoryOp::None,
            out: [0; 4],
            inp: [0; 4],
            is_vectorin: false,
            is_vectorout: false,
            pred: 0,
            ar1: 0,
            ar2: 0,
            arch_reg: [-1; MAX_REG_OPERANDS],
            cycles: 0,
            data_size: 0,
            space: MemorySpace::default(),
            decoded: false,
        }
    }

    /// Run the decoder's hook over a fresh placeholder at `pc`.
    pub fn decode<D: Decoder + ?Sized>(pc: Address, decoder: &D) -> Result<Self> {
        let mut inst = Self::placeholder();
        inst.pc = pc;
        decoder.pre_decode(pc, &mut inst)?;
        inst.decoded = true;
        Ok(inst)
    }

    /// Whether decoding has populated this instruction.
    pub fn valid(&self) -> bool {
        self.decoded
    }

    pub fn is_load(&self) -> bool {
        self.op == OpType::Load || self.memory_op == MemoryOp::Load
    }

    pub fn is_store(&self) -> bool {
        self.op == OpType::Store || self.memory_op == MemoryOp::Store
    }

    pub fn is_memory(&self) -> bool {
        self.is_load() || self.is_store()
    }
}

impl Default for ScalarInstruction {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl Renderable for ScalarInstruction {
    fn render(&self) -> String {
        format!(" [inst @ pc=0x{:04x}] ", self.pc)
    }
}

impl std::fmt::Display for ScalarInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
