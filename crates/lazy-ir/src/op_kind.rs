//! Interned operation identifiers.
//!
//! Every distinct operation name is interned once per process into a leaked [`OpSymbol`], so an
//! [`OpKind`] is a `Copy` pointer whose equality, ordering, and hashing reduce to an integer
//! comparison. Content hashes use [`OpKind::fingerprint`] instead of the interned id, which keeps
//! them independent of the order in which names were first seen.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::hashing::fnv1a_hash;

/// Namespace applied to names that do not carry one.
pub const DEFAULT_NAMESPACE: &str = "ir";

#[derive(Debug)]
struct OpSymbol {
    id: u32,
    name: Box<str>,
    namespace_len: usize,
    fingerprint: u64,
}

struct InternTable {
    ids: HashMap<&'static str, &'static OpSymbol>,
    next_id: u32,
}

impl InternTable {
    fn new() -> Self {
        Self {
            ids: HashMap::new(),
            next_id: 0,
        }
    }

    fn intern(&mut self, qualified: String) -> &'static OpSymbol {
        if let Some(symbol) = self.ids.get(qualified.as_str()).copied() {
            return symbol;
        }
        let namespace_len = qualified.find("::").unwrap_or(0);
        let fingerprint = fnv1a_hash(qualified.as_bytes());
        let symbol: &'static OpSymbol = Box::leak(Box::new(OpSymbol {
            id: self.next_id,
            name: qualified.into_boxed_str(),
            namespace_len,
            fingerprint,
        }));
        self.next_id += 1;
        self.ids.insert(&*symbol.name, symbol);
        symbol
    }
}

static INTERNER: Lazy<Mutex<InternTable>> = Lazy::new(|| Mutex::new(InternTable::new()));

fn qualify(name: &str) -> String {
    if name.contains("::") {
        name.to_string()
    } else {
        format!("{DEFAULT_NAMESPACE}::{name}")
    }
}

/// Canonical identifier of an operation.
#[derive(Clone, Copy)]
pub struct OpKind(&'static OpSymbol);

impl OpKind {
    /// Returns the interned kind for `name`, creating it on first use.
    pub fn get(name: &str) -> OpKind {
        let qualified = qualify(name);
        let mut table = INTERNER.lock().expect("op interner poisoned");
        OpKind(table.intern(qualified))
    }

    /// Fully qualified name, e.g. `ir::add`.
    pub fn name(&self) -> &'static str {
        &self.0.name
    }

    pub fn namespace(&self) -> &'static str {
        &self.0.name[..self.0.namespace_len]
    }

    pub fn unqualified(&self) -> &'static str {
        &self.0.name[self.0.namespace_len + 2..]
    }

    /// Interning order; only meaningful within one process.
    pub fn id(&self) -> u32 {
        self.0.id
    }

    /// Stable hash of the qualified name.
    pub fn fingerprint(&self) -> u64 {
        self.0.fingerprint
    }
}

impl PartialEq for OpKind {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for OpKind {}

impl PartialOrd for OpKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl Hash for OpKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpKind({})", self.name())
    }
}

/// Operations owned by the concrete node kinds in [`crate::node::NodeKind`].
pub mod known {
    use once_cell::sync::Lazy;

    use super::OpKind;

    static CONSTANT: Lazy<OpKind> = Lazy::new(|| OpKind::get("xla::constant"));
    static DEVICE_DATA: Lazy<OpKind> = Lazy::new(|| OpKind::get("xla::device_data"));
    static RESHAPE: Lazy<OpKind> = Lazy::new(|| OpKind::get("ir::reshape"));
    static PERMUTE: Lazy<OpKind> = Lazy::new(|| OpKind::get("ir::permute"));
    static CAST: Lazy<OpKind> = Lazy::new(|| OpKind::get("ir::cast"));
    static TOPK: Lazy<OpKind> = Lazy::new(|| OpKind::get("ir::topk"));

    pub fn constant() -> OpKind {
        *CONSTANT
    }

    pub fn device_data() -> OpKind {
        *DEVICE_DATA
    }

    pub fn reshape() -> OpKind {
        *RESHAPE
    }

    pub fn permute() -> OpKind {
        *PERMUTE
    }

    pub fn cast() -> OpKind {
        *CAST
    }

    pub fn topk() -> OpKind {
        *TOPK
    }

    /// Returns `true` when `op` belongs to a concrete node kind.
    pub fn is_reserved(op: OpKind) -> bool {
        [constant(), device_data(), reshape(), permute(), cast(), topk()].contains(&op)
    }
}
