//! Layout and precision conversion between two storages of the same
//! logical tensor. Used by the compiler-inserted reorder nodes and by the
//! input/output exchange when caller blobs differ from the planned format.

use smallvec::SmallVec;

use crate::error::{ForgeError, ForgeResult};
use crate::tensor::{Storage, TensorDesc};

/// Copy `src` into `dst`, converting layout and precision. Never allocates.
pub fn reorder(
    src: &Storage,
    src_desc: &TensorDesc,
    dst: &mut Storage,
    dst_desc: &TensorDesc,
) -> ForgeResult<()> {
    if src_desc.dims != dst_desc.dims {
        return Err(ForgeError::InvalidNetwork(format!(
            "reorder between different shapes {:?} -> {:?}",
            src_desc.dims, dst_desc.dims
        )));
    }
    let count = src_desc.element_count();
    for (storage, desc) in [(src, src_desc), (&*dst, dst_desc)] {
        if storage.len() != count {
            return Err(ForgeError::ShapeMismatch {
                name: desc.to_string(),
                expected: count,
                actual: storage.len(),
            });
        }
    }

    let src_precision = src_desc.precision;
    let dst_precision = dst_desc.precision;
    let src_strides = src_desc.strides();
    let dst_strides = dst_desc.strides();

    if src_strides == dst_strides {
        if src_precision == dst_precision && dst.copy_from(src) {
            return Ok(());
        }
        for i in 0..count {
            dst.set_f32(i, src.get_f32(i, src_precision), dst_precision);
        }
        return Ok(());
    }

    let dims = &src_desc.dims;
    let mut index: SmallVec<[usize; 6]> = SmallVec::from_elem(0, dims.len());
    for _ in 0..count {
        let src_offset: usize = index.iter().zip(&src_strides).map(|(i, s)| i * s).sum();
        let dst_offset: usize = index.iter().zip(&dst_strides).map(|(i, s)| i * s).sum();
        dst.set_f32(dst_offset, src.get_f32(src_offset, src_precision), dst_precision);

        for axis in (0..dims.len()).rev() {
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    Ok(())
}
