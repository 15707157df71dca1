//! Category string interning.

use fnv::FnvHashMap;

/// Interned category. `Atom::UNKNOWN` never matches anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Atom(u32);

impl Atom {
    pub const UNKNOWN: Atom = Atom(0);

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

/// Bidirectional category name <-> atom table. Strings are never removed.
#[derive(Debug)]
pub struct CategoryAtoms {
    by_name: FnvHashMap<Box<str>, Atom>,
    names: Vec<Box<str>>,
}

impl Default for CategoryAtoms {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryAtoms {
    pub fn new() -> Self {
        Self {
            by_name: FnvHashMap::default(),
            names: vec!["unknown".into()],
        }
    }

    pub fn intern(&mut self, name: &str) -> Atom {
        if let Some(&atom) = self.by_name.get(name) {
            return atom;
        }
        let atom = Atom(self.names.len() as u32);
        self.names.push(name.into());
        self.by_name.insert(name.into(), atom);
        atom
    }

    /// Looks a name up without interning it.
    pub fn lookup(&self, name: &str) -> Atom {
        self.by_name.get(name).copied().unwrap_or(Atom::UNKNOWN)
    }

    pub fn name(&self, atom: Atom) -> Option<&str> {
        if atom.is_unknown() {
            return None;
        }
        self.names.get(atom.0 as usize).map(|name| &**name)
    }

    pub fn len(&self) -> usize {
        self.names.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
