//! Architecture and ABI descriptors.
//!
//! The scheduler only needs register classes with their sizes, the
//! architectural ignore registers, the ABI-reserved registers, and a way to
//! map nodes onto classes. Registers within a class are plain bit positions.

use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use petrel_ir::{Graph, Mode, Node, NodeFlags};

/// An opaque reference to a register class.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegClass(u32);
entity_impl!(RegClass, "class");

#[derive(Debug, Clone)]
pub struct RegClassData {
    pub name: SmolStr,
    pub n_regs: u32,
    /// Registers the architecture withholds from allocation (stack pointer
    /// and friends), as a bit mask over the class.
    pub ignore_regs: u64,
    /// The value modes this class holds.
    pub modes: Vec<Mode>,
}

/// The architecture seen by the scheduler.
#[derive(Default)]
pub struct ArchEnv {
    classes: PrimaryMap<RegClass, RegClassData>,
}

impl ArchEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, name: &str, n_regs: u32, ignore_regs: u64, modes: &[Mode]) -> RegClass {
        assert!(n_regs <= 64);
        self.classes.push(RegClassData {
            name: name.into(),
            n_regs,
            ignore_regs,
            modes: modes.to_vec(),
        })
    }

    pub fn classes(&self) -> impl Iterator<Item = RegClass> {
        self.classes.keys()
    }

    pub fn class_data(&self, class: RegClass) -> &RegClassData {
        &self.classes[class]
    }

    /// The register class holding `node`'s value, if any.
    pub fn class_of(&self, graph: &Graph, node: Node) -> Option<RegClass> {
        let mode = graph.mode(node);
        if !mode.is_data() {
            return None;
        }
        self.classes
            .keys()
            .find(|&class| self.classes[class].modes.contains(&mode))
    }

    /// Whether `node` is invisible to register pressure.
    pub fn is_ignore(&self, graph: &Graph, node: Node) -> bool {
        graph.flags(node).contains(NodeFlags::IGNORE)
    }

    /// Registers actually usable for scheduling: the class minus its
    /// architectural ignores minus the ABI-reserved ones.
    pub fn available_regs(&self, abi: &AbiEnv, class: RegClass) -> u32 {
        let data = &self.classes[class];
        let all = if data.n_regs == 64 {
            u64::MAX
        } else {
            (1u64 << data.n_regs) - 1
        };
        let usable = all & !data.ignore_regs & !abi.reserved_mask(class);
        usable.count_ones()
    }
}

/// Per-class registers the ABI reserves (frame pointer, callee saves kept
/// untouchable, ...).
#[derive(Default)]
pub struct AbiEnv {
    reserved: FxHashMap<RegClass, u64>,
}

impl AbiEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve_regs(&mut self, class: RegClass, mask: u64) {
        *self.reserved.entry(class).or_insert(0) |= mask;
    }

    pub fn reserved_mask(&self, class: RegClass) -> u64 {
        self.reserved.get(&class).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_regs_subtracts_both_ignore_sets() {
        let mut arch = ArchEnv::new();
        let gp = arch.add_class("gp", 8, 0b1000_0001, &[Mode::Int, Mode::Ptr]);

        let mut abi = AbiEnv::new();
        assert_eq!(arch.available_regs(&abi, gp), 6);

        abi.reserve_regs(gp, 0b0000_0110);
        assert_eq!(arch.available_regs(&abi, gp), 4);

        // Overlap with the architectural ignores does not double count.
        abi.reserve_regs(gp, 0b0000_0001);
        assert_eq!(arch.available_regs(&abi, gp), 4);
    }
}
