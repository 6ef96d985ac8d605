/// Conditions that stop the interpreter from completing a step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Unimplemented instruction [opcode: {opcode:#06X}]")]
    Unimplemented { opcode: u16 },

    #[error("Stack overflow: call depth exceeded {capacity} frames")]
    StackOverflow { capacity: usize },

    #[error("Stack underflow: attempted to return with an empty call stack")]
    StackUnderflow,

    #[error("Memory access out of bounds [address: {address:#06X}] [len: {len}]")]
    MemoryOutOfBounds { address: u16, len: usize },

    #[error("Program is too large ({size} bytes), max size is {max_size} bytes")]
    ProgramTooLarge { size: usize, max_size: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
