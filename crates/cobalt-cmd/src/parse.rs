//! # Command Stream Parser
//!
//! Walks an encoded command stream by header and hands out typed views of
//! each command. Used by the `validation` feature and by tests.

use alloc::vec::Vec;
use core::fmt;

use bytemuck::{Pod, Zeroable};

use crate::commands::{
    header, GpgpuWalker, LoadRegisterImm, MediaInterfaceDescriptorLoad, MediaVfeState,
    PipeControl, PipelineSelect, StateBaseAddress, MI_BATCH_BUFFER_END, MI_NOOP,
};

// =============================================================================
// COMMAND KIND
// =============================================================================

/// Commands the parser recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// MI_NOOP
    Noop,
    /// MI_BATCH_BUFFER_END
    BatchBufferEnd,
    /// MI_LOAD_REGISTER_IMM
    LoadRegisterImm,
    /// PIPELINE_SELECT
    PipelineSelect,
    /// STATE_BASE_ADDRESS
    StateBaseAddress,
    /// MEDIA_VFE_STATE
    MediaVfeState,
    /// MEDIA_INTERFACE_DESCRIPTOR_LOAD
    MediaInterfaceDescriptorLoad,
    /// GPGPU_WALKER
    GpgpuWalker,
    /// PIPE_CONTROL
    PipeControl,
}

impl CommandKind {
    /// Classify a header dword and return the command's total dwords
    pub fn decode(dw: u32) -> Option<(Self, usize)> {
        if dw == MI_NOOP {
            return Some((Self::Noop, 1));
        }
        if dw == MI_BATCH_BUFFER_END {
            return Some((Self::BatchBufferEnd, 1));
        }

        let len = header::length_from_field(dw);
        let kind = match dw & 0xFFFF_0000 {
            0x1100_0000 => Self::LoadRegisterImm,
            0x6904_0000 => return Some((Self::PipelineSelect, 1)),
            0x6101_0000 => Self::StateBaseAddress,
            0x7000_0000 => Self::MediaVfeState,
            0x7002_0000 => Self::MediaInterfaceDescriptorLoad,
            0x7105_0000 => Self::GpgpuWalker,
            0x7A00_0000 => Self::PipeControl,
            _ => return None,
        };
        Some((kind, len))
    }
}

// =============================================================================
// PARSE ERRORS
// =============================================================================

/// Malformed command stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Stream length is not a whole number of dwords
    Misaligned {
        /// Stream length in bytes
        len: usize,
    },
    /// Header not recognized
    UnknownCommand {
        /// Byte offset of the header
        offset: usize,
        /// The header dword
        header: u32,
    },
    /// Command runs past the end of the stream
    Truncated {
        /// Byte offset of the header
        offset: usize,
        /// Command kind
        kind: CommandKind,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { len } => write!(f, "stream of {} bytes is not dword aligned", len),
            Self::UnknownCommand { offset, header } => {
                write!(f, "unknown command 0x{:08x} at offset {}", header, offset)
            }
            Self::Truncated { offset, kind } => {
                write!(f, "{:?} at offset {} runs past end of stream", kind, offset)
            }
        }
    }
}

// =============================================================================
// PARSED COMMAND
// =============================================================================

/// One command located in a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Byte offset of the header
    pub offset: usize,
    /// Command kind
    pub kind: CommandKind,
    /// Every byte of the command, header included
    pub bytes: &'a [u8],
}

impl ParsedCommand<'_> {
    /// Length in dwords
    pub fn dword_count(&self) -> usize {
        self.bytes.len() / 4
    }

    /// Read dword `index`
    pub fn dword(&self, index: usize) -> u32 {
        let start = index * 4;
        self.bytes
            .get(start..start + 4)
            .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Copy the command into a typed layout
    ///
    /// Commands shorter than `T` are zero-extended; longer ones truncated.
    pub fn view<T: Pod + Zeroable>(&self) -> T {
        let mut value = T::zeroed();
        let dst = bytemuck::bytes_of_mut(&mut value);
        let n = dst.len().min(self.bytes.len());
        dst[..n].copy_from_slice(&self.bytes[..n]);
        value
    }

    /// View as PIPELINE_SELECT
    pub fn as_pipeline_select(&self) -> Option<PipelineSelect> {
        (self.kind == CommandKind::PipelineSelect).then(|| self.view())
    }

    /// View as STATE_BASE_ADDRESS
    pub fn as_state_base_address(&self) -> Option<StateBaseAddress> {
        (self.kind == CommandKind::StateBaseAddress).then(|| self.view())
    }

    /// View as MEDIA_VFE_STATE
    pub fn as_media_vfe_state(&self) -> Option<MediaVfeState> {
        (self.kind == CommandKind::MediaVfeState).then(|| self.view())
    }

    /// View as MI_LOAD_REGISTER_IMM
    pub fn as_load_register_imm(&self) -> Option<LoadRegisterImm> {
        (self.kind == CommandKind::LoadRegisterImm).then(|| self.view())
    }

    /// View as MEDIA_INTERFACE_DESCRIPTOR_LOAD
    pub fn as_interface_descriptor_load(&self) -> Option<MediaInterfaceDescriptorLoad> {
        (self.kind == CommandKind::MediaInterfaceDescriptorLoad).then(|| self.view())
    }

    /// View as GPGPU_WALKER
    pub fn as_gpgpu_walker(&self) -> Option<GpgpuWalker> {
        (self.kind == CommandKind::GpgpuWalker).then(|| self.view())
    }

    /// View as PIPE_CONTROL
    pub fn as_pipe_control(&self) -> Option<PipeControl> {
        (self.kind == CommandKind::PipeControl).then(|| self.view())
    }
}

// =============================================================================
// PARSER
// =============================================================================

/// Iterator over the commands in a stream
#[derive(Debug, Clone)]
pub struct CommandIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> CommandIter<'a> {
    /// Iterate over `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = Result<ParsedCommand<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }

        let offset = self.offset;
        let Some(head) = self.bytes.get(offset..offset + 4) else {
            self.failed = true;
            return Some(Err(ParseError::Misaligned {
                len: self.bytes.len(),
            }));
        };
        let header = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);

        let Some((kind, dwords)) = CommandKind::decode(header) else {
            self.failed = true;
            return Some(Err(ParseError::UnknownCommand { offset, header }));
        };

        let end = offset + dwords * 4;
        let Some(bytes) = self.bytes.get(offset..end) else {
            self.failed = true;
            return Some(Err(ParseError::Truncated { offset, kind }));
        };

        self.offset = end;
        Some(Ok(ParsedCommand {
            offset,
            kind,
            bytes,
        }))
    }
}

/// Parse a whole stream
pub fn parse(bytes: &[u8]) -> Result<Vec<ParsedCommand<'_>>, ParseError> {
    CommandIter::new(bytes).collect()
}

/// Check that the stream parses and ends with MI_BATCH_BUFFER_END
pub fn validate_batch(bytes: &[u8]) -> Result<(), ParseError> {
    let commands = parse(bytes)?;
    let terminated = commands
        .iter()
        .rev()
        .find(|c| c.kind != CommandKind::Noop)
        .is_some_and(|c| c.kind == CommandKind::BatchBufferEnd);
    if !terminated {
        return Err(ParseError::Truncated {
            offset: bytes.len(),
            kind: CommandKind::BatchBufferEnd,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{HwCommand, PipeControlFlags};
    use std::vec::Vec;

    fn stream() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(PipelineSelect::gpgpu(true).as_bytes());
        bytes.extend_from_slice(StateBaseAddress::new(16).emitted_bytes());
        bytes.extend_from_slice(LoadRegisterImm::new(0x7034, 0x8000_0340).as_bytes());
        bytes.extend_from_slice(PipeControl::new(PipeControlFlags::DC_FLUSH).as_bytes());
        bytes.extend_from_slice(&MI_BATCH_BUFFER_END.to_le_bytes());
        bytes.extend_from_slice(&MI_NOOP.to_le_bytes());
        bytes
    }

    #[test]
    fn test_parse_kinds_and_offsets() {
        let bytes = stream();
        let commands = parse(&bytes).unwrap();
        let kinds: Vec<_> = commands.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            [
                CommandKind::PipelineSelect,
                CommandKind::StateBaseAddress,
                CommandKind::LoadRegisterImm,
                CommandKind::PipeControl,
                CommandKind::BatchBufferEnd,
                CommandKind::Noop,
            ]
        );
        assert_eq!(commands[1].offset, 4);
        assert_eq!(commands[1].dword_count(), 16);
        assert_eq!(commands[2].as_load_register_imm().unwrap().value(), 0x8000_0340);
        assert!(commands[3].as_pipe_control().unwrap().dc_flush());
        assert!(commands[3].as_gpgpu_walker().is_none());
        assert!(validate_batch(&bytes).is_ok());
    }

    #[test]
    fn test_parse_errors() {
        let bytes = stream();
        assert_eq!(
            parse(&bytes[..10]).unwrap_err(),
            ParseError::Truncated {
                offset: 4,
                kind: CommandKind::StateBaseAddress
            }
        );
        assert_eq!(
            parse(&[0xEF, 0xBE, 0xAD, 0xDE]).unwrap_err(),
            ParseError::UnknownCommand {
                offset: 0,
                header: 0xDEAD_BEEF
            }
        );
        assert_eq!(parse(&bytes[..6]).unwrap_err(), ParseError::Misaligned { len: 6 });
        assert!(validate_batch(&bytes[..4]).is_err());
    }
}
