//! Validity bookkeeping for the quantities derived from the MAP estimate.
//!
//! The levels form a chain: MAP, log posterior, gradient and Hessian,
//! Cholesky factor of the negated Hessian, and its inverse. A level is only
//! ever computed once everything it depends on is valid, and any change to
//! the data drops the whole set back to empty.

use std::ops::BitOr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheFlags(u8);

impl CacheFlags {
    pub const EMPTY: CacheFlags = CacheFlags(0);
    pub const MAP: CacheFlags = CacheFlags(1 << 0);
    pub const LOG_P: CacheFlags = CacheFlags(1 << 1);
    pub const GRADIENT: CacheFlags = CacheFlags(1 << 2);
    pub const HESSIAN: CacheFlags = CacheFlags(1 << 3);
    pub const CHOLESKY: CacheFlags = CacheFlags(1 << 4);
    pub const CHOLESKY_INVERSE: CacheFlags = CacheFlags(1 << 5);

    #[inline]
    pub fn contains(self, other: CacheFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: CacheFlags) {
        self.0 |= other.0;
    }

    /// `self` plus every level it depends on.
    fn with_prerequisites(self) -> CacheFlags {
        let mut closed = self;
        if closed.contains(Self::CHOLESKY_INVERSE) {
            closed.insert(Self::CHOLESKY);
        }
        if closed.contains(Self::CHOLESKY) {
            closed.insert(Self::HESSIAN);
        }
        if closed.contains(Self::GRADIENT) || closed.contains(Self::HESSIAN) {
            closed.insert(Self::LOG_P);
        }
        if closed.contains(Self::LOG_P) {
            closed.insert(Self::MAP);
        }
        closed
    }
}

impl BitOr for CacheFlags {
    type Output = CacheFlags;

    fn bitor(self, rhs: CacheFlags) -> CacheFlags {
        CacheFlags(self.0 | rhs.0)
    }
}

/// One unit of recomputation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStep {
    Map,
    LogP,
    Gradient,
    Hessian,
    Cholesky,
    CholeskyInverse,
}

impl CacheStep {
    const ORDER: [CacheStep; 6] = [
        CacheStep::Map,
        CacheStep::LogP,
        CacheStep::Gradient,
        CacheStep::Hessian,
        CacheStep::Cholesky,
        CacheStep::CholeskyInverse,
    ];

    pub fn flag(self) -> CacheFlags {
        match self {
            CacheStep::Map => CacheFlags::MAP,
            CacheStep::LogP => CacheFlags::LOG_P,
            CacheStep::Gradient => CacheFlags::GRADIENT,
            CacheStep::Hessian => CacheFlags::HESSIAN,
            CacheStep::Cholesky => CacheFlags::CHOLESKY,
            CacheStep::CholeskyInverse => CacheFlags::CHOLESKY_INVERSE,
        }
    }
}

/// Next level to compute so that `need` becomes valid, or `None` when `have`
/// already covers it.
pub fn plan_step(have: CacheFlags, need: CacheFlags) -> Option<CacheStep> {
    let need = need.with_prerequisites();
    CacheStep::ORDER
        .into_iter()
        .find(|step| need.contains(step.flag()) && !have.contains(step.flag()))
}
