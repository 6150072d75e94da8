pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod decompiler;
pub mod strategy;
pub mod value;
pub mod vm;
