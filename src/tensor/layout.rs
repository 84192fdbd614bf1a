//! Tensor layout definitions.
//!
//! A layout names the memory ordering of a tensor whose dims are always
//! given in outer-to-inner logical order (batch, channel, height, width).

use serde::Serialize;
use smallvec::SmallVec;

/// Per-axis strides, in elements, indexed by logical axis.
pub type Strides = SmallVec<[usize; 6]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Layout {
    /// Unconstrained, resolved later
    #[default]
    Any,
    Scalar,
    C,
    NC,
    CHW,
    NCHW,
    NHWC,
    NCDHW,
    /// Dense row-major of any rank
    Plain,
}

impl Layout {
    /// Dense batch/channel/height/width layout used when `Any` is resolved.
    pub fn default_for_rank(rank: usize) -> Layout {
        match rank {
            0 => Layout::Scalar,
            1 => Layout::C,
            2 => Layout::NC,
            3 => Layout::CHW,
            4 => Layout::NCHW,
            5 => Layout::NCDHW,
            _ => Layout::Plain,
        }
    }

    pub fn is_any(self) -> bool {
        self == Layout::Any
    }

    /// Rank this layout is defined for; `None` for `Any` and `Plain`.
    pub fn rank(self) -> Option<usize> {
        match self {
            Layout::Scalar => Some(0),
            Layout::C => Some(1),
            Layout::NC => Some(2),
            Layout::CHW => Some(3),
            Layout::NCHW | Layout::NHWC => Some(4),
            Layout::NCDHW => Some(5),
            Layout::Any | Layout::Plain => None,
        }
    }

    pub fn fits_rank(self, rank: usize) -> bool {
        self.rank().map_or(true, |r| r == rank)
    }

    /// Logical axis holding channels. Dims are always in logical order, so
    /// this only depends on whether the layout has a batch axis.
    pub fn channel_axis(self, rank: usize) -> Option<usize> {
        match (self, rank) {
            (_, 0) => None,
            (Layout::C | Layout::CHW, _) => Some(0),
            (_, 1) => Some(0),
            _ => Some(1),
        }
    }

    /// Logical axes ordered from outermost to innermost in memory.
    pub fn memory_order(self, rank: usize) -> SmallVec<[usize; 6]> {
        match (self, rank) {
            (Layout::NHWC, 4) => SmallVec::from_slice(&[0, 2, 3, 1]),
            _ => (0..rank).collect(),
        }
    }

    /// Element strides for `dims` stored in this layout.
    pub fn strides(self, dims: &[usize]) -> Strides {
        let mut strides: Strides = SmallVec::from_elem(0, dims.len());
        let mut stride = 1usize;
        for &axis in self.memory_order(dims.len()).iter().rev() {
            strides[axis] = stride;
            stride = stride.saturating_mul(dims[axis]);
        }
        strides
    }

    pub fn name(self) -> &'static str {
        match self {
            Layout::Any => "ANY",
            Layout::Scalar => "SCALAR",
            Layout::C => "C",
            Layout::NC => "NC",
            Layout::CHW => "CHW",
            Layout::NCHW => "NCHW",
            Layout::NHWC => "NHWC",
            Layout::NCDHW => "NCDHW",
            Layout::Plain => "PLAIN",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ANY" => Some(Layout::Any),
            "SCALAR" => Some(Layout::Scalar),
            "C" => Some(Layout::C),
            "NC" => Some(Layout::NC),
            "CHW" => Some(Layout::CHW),
            "NCHW" => Some(Layout::NCHW),
            "NHWC" => Some(Layout::NHWC),
            "NCDHW" => Some(Layout::NCDHW),
            "PLAIN" => Some(Layout::Plain),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_for_rank() {
        assert_eq!(Layout::default_for_rank(1), Layout::C);
        assert_eq!(Layout::default_for_rank(4), Layout::NCHW);
        assert_eq!(Layout::default_for_rank(7), Layout::Plain);
    }

    #[test]
    fn test_nchw_strides() {
        let strides = Layout::NCHW.strides(&[2, 3, 4, 5]);
        assert_eq!(strides.as_slice(), &[60, 20, 5, 1]);
    }

    #[test]
    fn test_nhwc_strides() {
        // channels innermost
        let strides = Layout::NHWC.strides(&[2, 3, 4, 5]);
        assert_eq!(strides.as_slice(), &[60, 1, 15, 3]);
    }

    #[test]
    fn test_channel_axis() {
        assert_eq!(Layout::NCHW.channel_axis(4), Some(1));
        assert_eq!(Layout::NHWC.channel_axis(4), Some(1));
        assert_eq!(Layout::C.channel_axis(1), Some(0));
        assert_eq!(Layout::NC.channel_axis(2), Some(1));
        assert_eq!(Layout::Scalar.channel_axis(0), None);
    }

    #[test]
    fn test_fits_rank() {
        assert!(Layout::NCHW.fits_rank(4));
        assert!(!Layout::NCHW.fits_rank(2));
        assert!(Layout::Any.fits_rank(3));
        assert!(Layout::Plain.fits_rank(9));
    }
}
