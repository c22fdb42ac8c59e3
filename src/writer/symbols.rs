//! Symbol tables consulted by the managed writer.

use std::collections::HashMap;

/// The Ion 1.0 system symbols, SIDs 1 through 9.
pub const SYSTEM_SYMBOLS: [&str; 9] = [
    "$ion",
    "$ion_1_0",
    "$ion_symbol_table",
    "name",
    "version",
    "imports",
    "symbols",
    "max_id",
    "$ion_shared_symbol_table",
];

pub const ION_1_0_SID: u64 = 2;
pub const ION_SYMBOL_TABLE_SID: u64 = 3;

pub trait SymbolTable {
    /// Returns the SID for `text`, adding it if necessary.
    fn intern(&mut self, text: &str) -> u64;

    fn find_symbol(&self, text: &str) -> Option<u64>;

    fn text_of(&self, sid: u64) -> Option<&str>;

    /// Highest SID currently assigned.
    fn max_id(&self) -> u64;
}

/// A local symbol table whose first entries are the system symbols.
#[derive(Debug, Clone)]
pub struct LocalSymbolTable {
    symbols: Vec<String>,
    ids: HashMap<String, u64>,
}

impl Default for LocalSymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSymbolTable {
    pub fn new() -> Self {
        let mut table = Self {
            symbols: Vec::new(),
            ids: HashMap::new(),
        };
        for text in SYSTEM_SYMBOLS {
            table.intern(text);
        }
        table
    }

    /// Symbols added after the system symbols, in SID order.
    pub fn local_symbols(&self) -> &[String] {
        &self.symbols[SYSTEM_SYMBOLS.len()..]
    }
}

impl SymbolTable for LocalSymbolTable {
    fn intern(&mut self, text: &str) -> u64 {
        if let Some(sid) = self.ids.get(text) {
            return *sid;
        }
        self.symbols.push(text.to_string());
        let sid = self.symbols.len() as u64;
        self.ids.insert(text.to_string(), sid);
        sid
    }

    fn find_symbol(&self, text: &str) -> Option<u64> {
        self.ids.get(text).copied()
    }

    fn text_of(&self, sid: u64) -> Option<&str> {
        let index = usize::try_from(sid).ok()?.checked_sub(1)?;
        self.symbols.get(index).map(String::as_str)
    }

    fn max_id(&self) -> u64 {
        self.symbols.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_symbols_come_first() {
        let mut table = LocalSymbolTable::new();
        assert_eq!(table.find_symbol("$ion_1_0"), Some(ION_1_0_SID));
        assert_eq!(table.find_symbol("$ion_symbol_table"), Some(ION_SYMBOL_TABLE_SID));
        assert_eq!(table.max_id(), 9);
        assert_eq!(table.intern("foo"), 10);
        assert_eq!(table.intern("foo"), 10);
        assert_eq!(table.text_of(10), Some("foo"));
        assert_eq!(table.text_of(0), None);
        assert_eq!(table.local_symbols(), &["foo".to_string()]);
    }
}
