//! Name interning for statement and parameter identifiers.

use string_interner::{StringInterner, DefaultSymbol, backend::StringBackend, Symbol as SymbolTrait};
use std::fmt;

/// Type alias for our interner backend
type Backend = StringBackend<DefaultSymbol>;

/// A symbol representing an interned name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn as_raw(&self) -> u32 { self.0 }

    /// Position of the symbol in interning order.
    pub fn index(&self) -> usize { self.0 as usize }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// An interner handing out dense symbols in first-seen order.
///
/// Symbols double as indices: the n-th distinct name gets index n, which is
/// how the text front end numbers statements and parameters.
#[derive(Debug)]
pub struct SymbolInterner {
    interner: StringInterner<Backend>,
}

impl Default for SymbolInterner {
    fn default() -> Self { Self::new() }
}

impl SymbolInterner {
    pub fn new() -> Self {
        Self { interner: StringInterner::new() }
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        let sym = self.interner.get_or_intern(s);
        Symbol(sym.to_usize() as u32)
    }

    pub fn resolve(&self, sym: Symbol) -> Option<&str> {
        let internal_sym = DefaultSymbol::try_from_usize(sym.0 as usize)?;
        self.interner.resolve(internal_sym)
    }

    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.interner.get(s).map(|sym| Symbol(sym.to_usize() as u32))
    }

    /// All names in interning order.
    pub fn names(&self) -> Vec<String> {
        (0..self.len())
            .filter_map(|i| DefaultSymbol::try_from_usize(i))
            .filter_map(|sym| self.interner.resolve(sym))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize { self.interner.len() }
    pub fn is_empty(&self) -> bool { self.interner.is_empty() }
}
