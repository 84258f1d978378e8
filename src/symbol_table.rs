//! Symbol-to-label mappings.
//!
//! A [`SymbolTable`] names the input or output alphabet of an automaton.
//! Tables are cheap to copy (shared inner, copy-on-write on mutation) so a
//! single alphabet can be attached to many machines. Compatibility between
//! tables is decided by a labeled MD5 fingerprint over the ordered
//! (key, symbol) sequence.

use std::cell::RefCell;
use std::io::{BufRead, Read, Write};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use md5::{Digest, Md5};
use rustc_hash::FxHashMap;

use crate::io::{read_string, write_string, IoError};

/// Key reported for symbols absent from a table.
pub const NO_SYMBOL: i64 = -1;

/// Magic number opening a binary symbol-table file.
pub const SYMBOL_TABLE_MAGIC: u32 = 0x7EB2_FB74;

/// Options for the text symbol-table format: `symbol<sep>key` lines.
#[derive(Debug, Clone)]
pub struct SymbolTableTextOptions {
    /// Permit negative keys when reading.
    pub allow_negative: bool,
    /// Field separator; `None` splits on any run of whitespace.
    pub separator: Option<char>,
}

impl Default for SymbolTableTextOptions {
    fn default() -> Self {
        Self {
            allow_negative: false,
            separator: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SymbolTableInner {
    name: String,
    available_key: i64,
    // Keys below this limit index `symbols` directly; keys at or above it
    // go through `key_map`.
    dense_key_limit: i64,
    symbols: Vec<String>,
    // idx -> key for idx >= dense_key_limit.
    idx_key: Vec<i64>,
    // key -> idx for sparse keys.
    key_map: FxHashMap<i64, usize>,
    symbol_map: FxHashMap<String, i64>,
    checksum: RefCell<Option<String>>,
}

/// Symbol (string) to key (integer) mapping and its reverse.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    inner: Rc<SymbolTableInner>,
}

impl SymbolTable {
    /// Creates an empty table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(SymbolTableInner {
                name: name.into(),
                ..Default::default()
            }),
        }
    }

    /// The table's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Renames the table.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let inner = Rc::make_mut(&mut self.inner);
        inner.name = name.into();
        // The fingerprint covers only (key, symbol) pairs, so it survives.
    }

    /// Number of symbols in the table.
    pub fn num_symbols(&self) -> usize {
        self.inner.symbols.len()
    }

    /// Whether the table holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.inner.symbols.is_empty()
    }

    /// The lowest key never yet assigned automatically.
    pub fn available_key(&self) -> i64 {
        self.inner.available_key
    }

    /// Adds `symbol` with an automatically assigned key, or returns the
    /// existing key if the symbol is already present.
    pub fn add_symbol(&mut self, symbol: impl AsRef<str>) -> i64 {
        let key = self.inner.available_key;
        self.add_symbol_with_key(symbol, key)
    }

    /// Adds `symbol` under an explicit `key`, or returns the existing key
    /// if the symbol is already present.
    pub fn add_symbol_with_key(&mut self, symbol: impl AsRef<str>, key: i64) -> i64 {
        let symbol = symbol.as_ref();
        if let Some(&existing) = self.inner.symbol_map.get(symbol) {
            return existing;
        }
        let inner = Rc::make_mut(&mut self.inner);
        let idx = inner.symbols.len();
        inner.symbols.push(symbol.to_string());
        inner.symbol_map.insert(symbol.to_string(), key);
        if key == idx as i64 && inner.dense_key_limit == idx as i64 {
            inner.dense_key_limit = idx as i64 + 1;
        } else {
            inner.idx_key.push(key);
            inner.key_map.insert(key, idx);
        }
        if key >= inner.available_key {
            inner.available_key = key + 1;
        }
        *inner.checksum.borrow_mut() = None;
        key
    }

    /// Merges another table into this one, offsetting its keys by the
    /// current available key. Symbols already present keep their key.
    pub fn add_table(&mut self, other: &SymbolTable) {
        let offset = self.available_key();
        for (key, symbol) in other.iter() {
            if self.find_key(symbol).is_none() {
                self.add_symbol_with_key(symbol, key + offset);
            }
        }
    }

    /// The symbol stored under `key`, if any.
    pub fn find_symbol(&self, key: i64) -> Option<&str> {
        let inner = &*self.inner;
        let idx = if key >= 0 && key < inner.dense_key_limit {
            key as usize
        } else {
            *inner.key_map.get(&key)?
        };
        inner.symbols.get(idx).map(String::as_str)
    }

    /// The key assigned to `symbol`, if any.
    pub fn find_key(&self, symbol: impl AsRef<str>) -> Option<i64> {
        self.inner.symbol_map.get(symbol.as_ref()).copied()
    }

    /// Whether the table contains `symbol`.
    pub fn contains(&self, symbol: impl AsRef<str>) -> bool {
        self.find_key(symbol).is_some()
    }

    /// Iterates (key, symbol) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> + '_ {
        let inner = &*self.inner;
        inner.symbols.iter().enumerate().map(move |(idx, symbol)| {
            let key = if (idx as i64) < inner.dense_key_limit {
                idx as i64
            } else {
                inner.idx_key[idx - inner.dense_key_limit as usize]
            };
            (key, symbol.as_str())
        })
    }

    /// The labeled fingerprint over the ordered (key, symbol) sequence.
    ///
    /// Two tables are compatible iff their fingerprints match. The value
    /// is cached until the next mutation.
    pub fn labeled_checksum(&self) -> String {
        if let Some(cached) = self.inner.checksum.borrow().clone() {
            return cached;
        }
        let mut hasher = Md5::new();
        for (key, symbol) in self.iter() {
            hasher.update(key.to_le_bytes());
            hasher.update(symbol.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        let mut checksum = String::with_capacity(32);
        for byte in digest {
            checksum.push_str(&format!("{byte:02x}"));
        }
        *self.inner.checksum.borrow_mut() = Some(checksum.clone());
        checksum
    }

    /// Whether two optional tables are compatible: a missing table is
    /// compatible with anything, two present tables must share the same
    /// labeled fingerprint. The process-wide flag
    /// [`config::GlobalConfig::compat_symbols`](crate::config::GlobalConfig)
    /// can disable checking wholesale; callers decide whether to honor it.
    pub fn compatible(a: Option<&SymbolTable>, b: Option<&SymbolTable>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.labeled_checksum() == b.labeled_checksum(),
            _ => true,
        }
    }

    /// Reads the text form: one `symbol<sep>key` pair per line.
    pub fn read_text<R: BufRead>(
        reader: R,
        name: impl Into<String>,
        opts: &SymbolTableTextOptions,
    ) -> Result<Self, IoError> {
        let mut table = Self::new(name);
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let mut fields = match opts.separator {
                Some(sep) => line.splitn(2, sep).collect::<Vec<_>>(),
                None => line.split_whitespace().collect::<Vec<_>>(),
            };
            fields.retain(|f| !f.is_empty());
            if fields.len() != 2 {
                return Err(IoError::Corrupt(format!(
                    "symbol table line {}: expected `symbol key`, got {:?}",
                    lineno + 1,
                    line
                )));
            }
            let key: i64 = fields[1].parse().map_err(|_| {
                IoError::Corrupt(format!(
                    "symbol table line {}: bad key {:?}",
                    lineno + 1,
                    fields[1]
                ))
            })?;
            if key < 0 && !opts.allow_negative {
                return Err(IoError::Corrupt(format!(
                    "symbol table line {}: negative key {} not allowed",
                    lineno + 1,
                    key
                )));
            }
            table.add_symbol_with_key(fields[0], key);
        }
        Ok(table)
    }

    /// Writes the text form with a tab separator.
    pub fn write_text<Wr: Write>(&self, writer: &mut Wr) -> Result<(), IoError> {
        for (key, symbol) in self.iter() {
            writeln!(writer, "{symbol}\t{key}")?;
        }
        Ok(())
    }

    /// Reads the binary form.
    pub fn read_binary<R: Read>(reader: &mut R) -> Result<Self, IoError> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != SYMBOL_TABLE_MAGIC {
            return Err(IoError::BadMagic {
                expected: SYMBOL_TABLE_MAGIC,
                found: magic,
            });
        }
        let name = read_string(reader)?;
        let available_key = reader.read_i64::<LittleEndian>()?;
        let _dense_key_limit = reader.read_i64::<LittleEndian>()?;
        let num_symbols = reader.read_u64::<LittleEndian>()?;
        let mut table = Self::new(name);
        for _ in 0..num_symbols {
            let key = reader.read_i64::<LittleEndian>()?;
            let symbol = read_string(reader)?;
            table.add_symbol_with_key(symbol, key);
        }
        if table.available_key() > available_key {
            return Err(IoError::Corrupt(
                "symbol table available-key counter below its own keys".into(),
            ));
        }
        Rc::make_mut(&mut table.inner).available_key = available_key;
        Ok(table)
    }

    /// Writes the binary form: name, available-key counter, dense-key
    /// limit, then ⟨key, symbol⟩ entries. Little-endian throughout.
    pub fn write_binary<Wr: Write>(&self, writer: &mut Wr) -> Result<(), IoError> {
        writer.write_u32::<LittleEndian>(SYMBOL_TABLE_MAGIC)?;
        write_string(writer, self.name())?;
        writer.write_i64::<LittleEndian>(self.inner.available_key)?;
        writer.write_i64::<LittleEndian>(self.inner.dense_key_limit)?;
        writer.write_u64::<LittleEndian>(self.num_symbols() as u64)?;
        for (key, symbol) in self.iter() {
            writer.write_i64::<LittleEndian>(key)?;
            write_string(writer, symbol)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_keys() {
        let mut table = SymbolTable::new("letters");
        assert_eq!(table.add_symbol("<eps>"), 0);
        assert_eq!(table.add_symbol("a"), 1);
        assert_eq!(table.add_symbol("b"), 2);
        assert_eq!(table.find_symbol(1), Some("a"));
        assert_eq!(table.find_key("b"), Some(2));
        assert_eq!(table.available_key(), 3);
    }

    #[test]
    fn test_duplicate_symbol_keeps_key() {
        let mut table = SymbolTable::new("t");
        let k = table.add_symbol("x");
        assert_eq!(table.add_symbol("x"), k);
        assert_eq!(table.num_symbols(), 1);
    }

    #[test]
    fn test_sparse_keys() {
        let mut table = SymbolTable::new("t");
        table.add_symbol_with_key("a", 0);
        table.add_symbol_with_key("far", 1000);
        table.add_symbol_with_key("b", 1);
        assert_eq!(table.find_symbol(1000), Some("far"));
        assert_eq!(table.find_symbol(1), Some("b"));
        assert_eq!(table.find_symbol(2), None);
        assert_eq!(table.available_key(), 1001);
    }

    #[test]
    fn test_checksum_detects_difference() {
        let mut a = SymbolTable::new("a");
        a.add_symbol("x");
        a.add_symbol("y");
        let mut b = SymbolTable::new("b");
        b.add_symbol("x");
        b.add_symbol("y");
        // Names differ but content matches.
        assert_eq!(a.labeled_checksum(), b.labeled_checksum());
        assert!(SymbolTable::compatible(Some(&a), Some(&b)));

        b.add_symbol("z");
        assert_ne!(a.labeled_checksum(), b.labeled_checksum());
        assert!(!SymbolTable::compatible(Some(&a), Some(&b)));
        assert!(SymbolTable::compatible(None, Some(&b)));
    }

    #[test]
    fn test_checksum_updates_after_mutation() {
        let mut table = SymbolTable::new("t");
        table.add_symbol("x");
        let before = table.labeled_checksum();
        table.add_symbol("y");
        assert_ne!(before, table.labeled_checksum());
    }

    #[test]
    fn test_copy_on_write() {
        let mut a = SymbolTable::new("t");
        a.add_symbol("x");
        let b = a.clone();
        a.add_symbol("y");
        assert_eq!(a.num_symbols(), 2);
        assert_eq!(b.num_symbols(), 1);
    }

    #[test]
    fn test_text_roundtrip() {
        let mut table = SymbolTable::new("t");
        table.add_symbol("<eps>");
        table.add_symbol("hello");
        table.add_symbol_with_key("sparse", 40);

        let mut buf = Vec::new();
        table.write_text(&mut buf).unwrap();
        let back = SymbolTable::read_text(
            buf.as_slice(),
            "t",
            &SymbolTableTextOptions::default(),
        )
        .unwrap();
        assert_eq!(back.labeled_checksum(), table.labeled_checksum());
    }

    #[test]
    fn test_text_rejects_negative_keys_by_default() {
        let data = "bad\t-2\n";
        let err = SymbolTable::read_text(
            data.as_bytes(),
            "t",
            &SymbolTableTextOptions::default(),
        );
        assert!(err.is_err());
        let ok = SymbolTable::read_text(
            data.as_bytes(),
            "t",
            &SymbolTableTextOptions {
                allow_negative: true,
                ..Default::default()
            },
        );
        assert_eq!(ok.unwrap().find_key("bad"), Some(-2));
    }

    #[test]
    fn test_binary_roundtrip() {
        let mut table = SymbolTable::new("alphabet");
        table.add_symbol("<eps>");
        table.add_symbol("a");
        table.add_symbol_with_key("rare", 512);

        let mut buf = Vec::new();
        table.write_binary(&mut buf).unwrap();
        let back = SymbolTable::read_binary(&mut buf.as_slice()).unwrap();
        assert_eq!(back.name(), "alphabet");
        assert_eq!(back.available_key(), table.available_key());
        assert_eq!(back.labeled_checksum(), table.labeled_checksum());
    }
}
