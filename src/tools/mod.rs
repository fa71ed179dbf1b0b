// External Tool Adapter
//
// Runs the disassembler, aligner, signer, key generator and retriever as
// isolated child processes. Every command is an argument vector; nothing is
// ever handed to a shell.

pub mod error;
pub mod executor;
pub mod apktool;
pub mod signing;
pub mod retrieve;

pub use error::{ToolError, ToolResult};
pub use executor::{ProcessRunner, ToolCommand, ToolOutput, ToolRunner};
pub use apktool::{ApkTool, Assembler, Disassembler};
pub use signing::{Aligner, ApkSigner, SigningTools};
pub use retrieve::{CurlRetriever, Retriever};
