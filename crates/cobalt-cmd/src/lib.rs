//! # Cobalt Command Encoding
//!
//! Hardware command layouts, the per-generation table and the encoder that
//! turns one staged image transfer into heap contents and a batch.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      Transfer Encoding Pipeline                   │
//! │                                                                   │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐    │
//! │  │ Transfer     │    │   Command    │    │    ArenaSet      │    │
//! │  │ Dispatch     │───▶│   Encoder    │───▶│  IH SSH IOH DSH  │    │
//! │  │              │    │  (GenTraits) │    │  command stream  │    │
//! │  └──────────────┘    └──────────────┘    └────────┬─────────┘    │
//! │                                                    │              │
//! │                                           ┌────────▼─────────┐    │
//! │                                           │ CommandStream    │    │
//! │                                           │ Receiver         │    │
//! │                                           └──────────────────┘    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Generations
//!
//! Gen8 stamps completion with one PIPE_CONTROL carrying both the DC flush
//! and the tag write. Gen9 and later split it into two.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod commands;
pub mod encoder;
pub mod gen;
pub mod parse;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use commands::{HwCommand, PipeControlFlags};
pub use encoder::{
    CommandEncoder, CopyKernelArgs, DispatchLayout, EncodedBatch, EncoderState, TransferDispatch,
};
pub use gen::{gen_traits, CompletionFlush, GenTraits};
pub use parse::{parse, validate_batch, CommandIter, CommandKind, ParseError, ParsedCommand};
