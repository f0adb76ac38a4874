//! A small jit compiler front end for the kaleidoscope language: a
//! streaming lexer, a precedence-climbing recursive-descent parser, and
//! an AST to LLVM IR lowering stage built on inkwell.
//!
//! The pipeline is pull-based. The parser keeps one token of lookahead
//! and asks the lexer for more on demand, so a driver can lower each
//! top-level construct as soon as it parses without ever holding the
//! whole source in memory.

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;
