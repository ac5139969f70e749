//! Program loading: collaborators of the core that get a byte image
//! into [`crate::memory::Memory`] before the [`crate::cpu::Cpu`] ever
//! runs. Neither function is part of the instruction set simulator
//! itself — they exist so the crate is runnable end to end from a real
//! executable on disk.
use crate::error::MemoryError;
use crate::memory::Memory;
use elf::endian::AnyEndian;
use elf::ElfBytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ELF file: {0}")]
    Elf(#[from] elf::ParseError),
    #[error("{0} has no .text section")]
    MissingText(String),
    #[error(".text section of {0} is compressed, which is not supported")]
    CompressedText(String),
}

/// Treat `bytes` as a flat sequence of instruction words (§6's program
/// image format) and write it into `memory` starting at `base`.
pub fn load_flat(memory: &mut Memory, bytes: &[u8], base: u32) -> Result<(), LoadError> {
    memory.write(bytes, base)?;
    Ok(())
}

/// Parse an ELF32 executable, extract its `.text` section, and load it
/// as a flat image at `base`. Symbol tables are read by the underlying
/// `elf` crate's parser but not retained here; this crate has no use
/// for symbolication.
pub fn load_elf(memory: &mut Memory, path: &str, base: u32) -> Result<(), LoadError> {
    let file_data = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_string(),
        source,
    })?;
    let file = ElfBytes::<AnyEndian>::minimal_parse(&file_data)?;

    let text_header = file
        .section_header_by_name(".text")?
        .ok_or_else(|| LoadError::MissingText(path.to_string()))?;

    let (data, compression) = file.section_data(&text_header)?;
    if compression.is_some() {
        return Err(LoadError::CompressedText(path.to_string()));
    }

    load_flat(memory, data, base)
}
