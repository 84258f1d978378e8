//! Binary automaton files.
//!
//! Wire layout, all integers little-endian:
//!
//! ```text
//! magic            u32
//! version          u32
//! weight type tag  u32 length + utf-8 bytes
//! properties       u64
//! start            i64   (-1 = no start state)
//! num states       i64
//! symbol flags     u32   (bit 0: input table follows, bit 1: output table)
//! [input symbol table]   (binary symbol-table form)
//! [output symbol table]
//! per state:
//!   final weight   (semiring wire form)
//!   num arcs       i64
//!   per arc: ilabel i64, olabel i64, weight, nextstate i64
//! ```

use std::io::{Read, Write};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::arc::Arc;
use crate::fst::{ExpandedFst, Fst, MutableFst};
use crate::properties::{known_properties, ALL_PROPERTIES};
use crate::semiring::Semiring;
use crate::symbol_table::SymbolTable;
use crate::vector_fst::VectorFst;

/// Magic number opening a binary automaton file.
pub const FST_MAGIC: u32 = 0x7EB2_FDD6;

/// Current file format version.
pub const FST_FILE_VERSION: u32 = 1;

const FLAG_INPUT_SYMBOLS: u32 = 1 << 0;
const FLAG_OUTPUT_SYMBOLS: u32 = 1 << 1;

/// Errors reading or writing automaton and symbol-table files.
#[derive(Debug, Error)]
pub enum IoError {
    /// The file does not open with the expected magic number.
    #[error("bad magic number: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        /// Magic number the reader expected.
        expected: u32,
        /// Magic number found in the stream.
        found: u32,
    },
    /// The file version is not supported.
    #[error("unsupported file version {0}")]
    BadVersion(u32),
    /// The file stores weights of a different semiring.
    #[error("weight type mismatch: file holds `{found}`, expected `{expected}`")]
    WeightTypeMismatch {
        /// Weight type of the reader.
        expected: &'static str,
        /// Weight type tag found in the file.
        found: String,
    },
    /// Structurally invalid file contents.
    #[error("corrupt automaton file: {0}")]
    Corrupt(String),
    /// An underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) fn write_string<Wr: Write + ?Sized>(
    writer: &mut Wr,
    value: &str,
) -> Result<(), IoError> {
    writer.write_u32::<LittleEndian>(value.len() as u32)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

pub(crate) fn read_string<R: Read + ?Sized>(reader: &mut R) -> Result<String, IoError> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| IoError::Corrupt("non-utf8 string field".into()))
}

fn write_state_id<Wr: Write + ?Sized>(
    writer: &mut Wr,
    state: Option<usize>,
) -> Result<(), IoError> {
    writer.write_i64::<LittleEndian>(state.map_or(-1, |s| s as i64))?;
    Ok(())
}

/// Writes `fst` in the binary form.
pub fn write_fst<W: Semiring, Wr: Write>(
    fst: &VectorFst<W>,
    writer: &mut Wr,
) -> Result<(), IoError> {
    writer.write_u32::<LittleEndian>(FST_MAGIC)?;
    writer.write_u32::<LittleEndian>(FST_FILE_VERSION)?;
    write_string(writer, W::TYPE_NAME)?;
    writer.write_u64::<LittleEndian>(fst.properties(ALL_PROPERTIES, false))?;
    write_state_id(writer, fst.start())?;
    writer.write_i64::<LittleEndian>(fst.num_states() as i64)?;

    let mut flags = 0;
    if fst.input_symbols().is_some() {
        flags |= FLAG_INPUT_SYMBOLS;
    }
    if fst.output_symbols().is_some() {
        flags |= FLAG_OUTPUT_SYMBOLS;
    }
    writer.write_u32::<LittleEndian>(flags)?;
    if let Some(symbols) = fst.input_symbols() {
        symbols.write_binary(writer)?;
    }
    if let Some(symbols) = fst.output_symbols() {
        symbols.write_binary(writer)?;
    }

    for state in fst.states() {
        fst.final_weight(state).write_to(writer)?;
        writer.write_i64::<LittleEndian>(fst.num_arcs(state) as i64)?;
        for arc in fst.arcs(state) {
            writer.write_i64::<LittleEndian>(arc.ilabel as i64)?;
            writer.write_i64::<LittleEndian>(arc.olabel as i64)?;
            arc.weight.write_to(writer)?;
            writer.write_i64::<LittleEndian>(arc.nextstate as i64)?;
        }
    }
    Ok(())
}

/// Reads an automaton in the binary form.
pub fn read_fst<W: Semiring, R: Read>(reader: &mut R) -> Result<VectorFst<W>, IoError> {
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != FST_MAGIC {
        return Err(IoError::BadMagic {
            expected: FST_MAGIC,
            found: magic,
        });
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != FST_FILE_VERSION {
        return Err(IoError::BadVersion(version));
    }
    let weight_type = read_string(reader)?;
    if weight_type != W::TYPE_NAME {
        return Err(IoError::WeightTypeMismatch {
            expected: W::TYPE_NAME,
            found: weight_type,
        });
    }
    let properties = reader.read_u64::<LittleEndian>()?;
    let start = reader.read_i64::<LittleEndian>()?;
    let num_states = reader.read_i64::<LittleEndian>()?;
    if num_states < 0 {
        return Err(IoError::Corrupt("negative state count".into()));
    }
    let num_states = num_states as usize;
    if start < -1 || start >= num_states as i64 {
        return Err(IoError::Corrupt(format!("start state {start} out of range")));
    }

    let flags = reader.read_u32::<LittleEndian>()?;
    let isymbols = if flags & FLAG_INPUT_SYMBOLS != 0 {
        Some(Rc::new(SymbolTable::read_binary(reader)?))
    } else {
        None
    };
    let osymbols = if flags & FLAG_OUTPUT_SYMBOLS != 0 {
        Some(Rc::new(SymbolTable::read_binary(reader)?))
    } else {
        None
    };

    let mut fst = VectorFst::new();
    fst.set_input_symbols(isymbols);
    fst.set_output_symbols(osymbols);
    fst.reserve_states(num_states);
    for _ in 0..num_states {
        fst.add_state();
    }
    if start >= 0 {
        fst.set_start(start as usize);
    }
    for state in 0..num_states {
        let final_weight = W::read_from(reader)?;
        if !final_weight.is_zero() {
            fst.set_final(state, final_weight);
        }
        let num_arcs = reader.read_i64::<LittleEndian>()?;
        if num_arcs < 0 {
            return Err(IoError::Corrupt("negative arc count".into()));
        }
        for _ in 0..num_arcs {
            let ilabel = reader.read_i64::<LittleEndian>()?;
            let olabel = reader.read_i64::<LittleEndian>()?;
            let weight = W::read_from(reader)?;
            let nextstate = reader.read_i64::<LittleEndian>()?;
            if ilabel < 0 || olabel < 0 {
                return Err(IoError::Corrupt("negative label".into()));
            }
            if nextstate < 0 || nextstate >= num_states as i64 {
                return Err(IoError::Corrupt(format!(
                    "arc target {nextstate} out of range"
                )));
            }
            fst.add_arc(
                state,
                Arc::new(ilabel as usize, olabel as usize, weight, nextstate as usize),
            );
        }
    }
    fst.set_properties(properties, known_properties(properties));
    Ok(fst)
}
