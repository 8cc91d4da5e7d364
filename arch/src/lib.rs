pub mod cond;
pub mod model;
pub mod op;
pub mod opcode;
pub mod reg;
