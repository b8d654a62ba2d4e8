/// Memory-space classification.
/// Every address an instruction touches belongs to one storage class. The
/// memory hierarchy routes requests on it and caches key per-bank conflict
/// tracking on the (kind, bank) pair.
use serde::{Deserialize, Serialize};

/// Storage class of a value or address. Declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum MemorySpaceKind {
    #[default]
    Undefined,
    Register,
    Local,
    Shared,
    ParamUnclassified,
    /// Kernel parameters: global to all threads in a kernel, read-only
    ParamKernel,
    /// Per-thread parameters: read-write
    ParamLocal,
    Const,
    Texture,
    Surface,
    Global,
    Generic,
    Instruction,
}

impl MemorySpaceKind {
    /// PTX state-space spelling, e.g. `.global`
    pub fn ptx_name(&self) -> &'static str {
        match self {
            MemorySpaceKind::Undefined => "<undefined>",
            MemorySpaceKind::Register => ".reg",
            MemorySpaceKind::Local => ".local",
            MemorySpaceKind::Shared => ".shared",
            MemorySpaceKind::ParamUnclassified => ".param",
            MemorySpaceKind::ParamKernel => ".param::kernel",
            MemorySpaceKind::ParamLocal => ".param::local",
            MemorySpaceKind::Const => ".const",
            MemorySpaceKind::Texture => ".tex",
            MemorySpaceKind::Surface => ".surf",
            MemorySpaceKind::Global => ".global",
            MemorySpaceKind::Generic => ".generic",
            MemorySpaceKind::Instruction => ".instruction",
        }
    }
}

/// A memory-space tag plus a bank index.
///
/// The bank is the `n` in `.const[n]`; plain `.const` is bank 0. Nothing
/// stops a caller from setting a bank on another kind, it is simply never
/// read there. Fields are ordered so the derived `Ord` compares kind first,
/// then bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MemorySpace {
    kind: MemorySpaceKind,
    bank: u32,
}

impl MemorySpace {
    pub fn new(kind: MemorySpaceKind) -> Self {
        MemorySpace { kind, bank: 0 }
    }

    pub fn with_bank(kind: MemorySpaceKind, bank: u32) -> Self {
        MemorySpace { kind, bank }
    }

    pub fn kind(&self) -> MemorySpaceKind {
        self.kind
    }

    pub fn bank(&self) -> u32 {
        self.bank
    }

    pub fn set_bank(&mut self, bank: u32) {
        self.bank = bank;
    }

    /// Any of the three parameter spaces
    pub fn is_param(&self) -> bool {
        matches!(
            self.kind,
            MemorySpaceKind::ParamUnclassified
                | MemorySpaceKind::ParamKernel
                | MemorySpaceKind::ParamLocal
        )
    }
}

impl From<MemorySpaceKind> for MemorySpace {
    fn from(kind: MemorySpaceKind) -> Self {
        MemorySpace::new(kind)
    }
}

impl std::fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MemorySpaceKind::Const if self.bank != 0 => write!(f, ".const[{}]", self.bank),
            kind => write!(f, "{}", kind.ptx_name()),
        }
    }
}

/// Memory operation performed by an instruction, as seen by the timing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemoryOp {
    #[default]
    None,
    Load,
    Store,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_undefined_bank_zero() {
        let s = MemorySpace::default();
        assert_eq!(s.kind(), MemorySpaceKind::Undefined);
        assert_eq!(s.bank(), 0);
        assert_eq!(MemorySpace::from(MemorySpaceKind::Global).bank(), 0);
    }

    #[test]
    fn test_equality_needs_kind_and_bank() {
        let mut a = MemorySpace::new(MemorySpaceKind::Const);
        let mut b = MemorySpace::new(MemorySpaceKind::Const);
        a.set_bank(2);
        b.set_bank(2);
        assert_eq!(a, b);

        b.set_bank(3);
        assert_ne!(a, b);
        assert!(a < b);

        assert_ne!(
            MemorySpace::new(MemorySpaceKind::Shared),
            MemorySpace::new(MemorySpaceKind::Global)
        );
    }

    #[test]
    fn test_kind_dominates_bank_in_ordering() {
        let shared_hi = MemorySpace::with_bank(MemorySpaceKind::Shared, 9);
        let const_lo = MemorySpace::with_bank(MemorySpaceKind::Const, 0);
        assert!(shared_hi < const_lo);

        let mut spaces = vec![
            MemorySpace::new(MemorySpaceKind::Global),
            MemorySpace::with_bank(MemorySpaceKind::Const, 1),
            MemorySpace::new(MemorySpaceKind::Register),
            MemorySpace::new(MemorySpaceKind::Const),
        ];
        spaces.sort();
        assert_eq!(
            spaces,
            vec![
                MemorySpace::new(MemorySpaceKind::Register),
                MemorySpace::new(MemorySpaceKind::Const),
                MemorySpace::with_bank(MemorySpaceKind::Const, 1),
                MemorySpace::new(MemorySpaceKind::Global),
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(MemorySpace::new(MemorySpaceKind::Global).to_string(), ".global");
        assert_eq!(MemorySpace::new(MemorySpaceKind::Const).to_string(), ".const");
        assert_eq!(MemorySpace::with_bank(MemorySpaceKind::Const, 4).to_string(), ".const[4]");
    }

    #[test]
    fn test_is_param() {
        assert!(MemorySpace::new(MemorySpaceKind::ParamKernel).is_param());
        assert!(MemorySpace::new(MemorySpaceKind::ParamLocal).is_param());
        assert!(!MemorySpace::new(MemorySpaceKind::Local).is_param());
    }
}
