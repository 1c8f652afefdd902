//! The procedure property lattice.
//!
//! Properties are inferred by the call optimization and consumed by call-site
//! rewriting and code motion. `CONST` implies `PURE` semantically, but the
//! bits are stored independently; the solver only ever sets the strongest
//! applicable one on a procedure.

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Props: u8 {
        /// Deterministic in its arguments, reads no memory.
        const CONST = 1 << 0;
        /// Reads non-volatile memory only; no writes, no exceptions.
        const PURE = 1 << 1;
        /// Cannot raise an exception.
        const NOTHROW = 1 << 2;
        /// Every returned value is freshly allocated and alias free.
        const MALLOC = 1 << 3;
        /// The procedure contains a control-flow cycle and thus may not
        /// terminate; calls to it must not be hoisted.
        const HAS_LOOP = 1 << 4;
        /// The result rests on an in-progress recursive analysis and must not
        /// be committed except at top level.
        const TENTATIVE = 1 << 5;
    }
}

impl Props {
    /// Combine the contributions of two memory-chain paths.
    ///
    /// The empty set is the bottom of the lattice and absorbs everything.
    /// Otherwise the weaker surviving property wins (a path that is merely
    /// pure drags a const path down to pure); the bit encoding is ordered so
    /// that a plain numeric comparison picks it. The tentative marker is
    /// carried over from either side.
    pub fn max(self, other: Props) -> Props {
        let tentative = (self | other) & Props::TENTATIVE;
        let a = self - Props::TENTATIVE;
        let b = other - Props::TENTATIVE;
        if a.is_empty() || b.is_empty() {
            return Props::empty();
        }
        let r = if b.bits() > a.bits() { b } else { a };
        r | tentative
    }

    /// Fold one call site's property word into an accumulating result: only
    /// properties both sides agree on survive, tentativeness is contagious.
    pub fn update(self, other: Props) -> Props {
        let tentative = (self | other) & Props::TENTATIVE;
        (self & other) | tentative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_is_bottom_absorbing() {
        assert_eq!(Props::CONST.max(Props::empty()), Props::empty());
        assert_eq!(Props::empty().max(Props::PURE), Props::empty());
        assert_eq!(
            (Props::CONST | Props::TENTATIVE).max(Props::empty()),
            Props::empty()
        );
    }

    #[test]
    fn max_picks_the_weaker_property() {
        assert_eq!(Props::CONST.max(Props::PURE), Props::PURE);
        assert_eq!(Props::PURE.max(Props::CONST), Props::PURE);
        assert_eq!(Props::CONST.max(Props::CONST), Props::CONST);
    }

    #[test]
    fn max_carries_tentative() {
        let t = Props::CONST | Props::TENTATIVE;
        assert_eq!(t.max(Props::PURE), Props::PURE | Props::TENTATIVE);
        assert_eq!(Props::CONST.max(t), Props::CONST | Props::TENTATIVE);
    }

    #[test]
    fn update_intersects() {
        let a = Props::NOTHROW | Props::MALLOC;
        assert_eq!(a.update(Props::NOTHROW), Props::NOTHROW);
        assert_eq!(
            a.update(Props::NOTHROW | Props::TENTATIVE),
            Props::NOTHROW | Props::TENTATIVE
        );
        assert_eq!(a.update(Props::empty()), Props::empty());
    }
}
