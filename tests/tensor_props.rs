//! Property tests for tensor declarations and storage

use cpuforge::tensor::{create_blob, element_count, StorageKind};
use cpuforge::{Data, ForgeError, Layout, Precision, TensorDesc};
use proptest::prelude::*;

fn dims_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..6, 1..6)
}

fn precision_strategy() -> impl Strategy<Value = Precision> {
    prop_oneof![
        Just(Precision::FP32),
        Just(Precision::FP16),
        Just(Precision::I16),
        Just(Precision::Q78),
        Just(Precision::U8),
    ]
}

proptest! {
    #[test]
    fn prop_dims_round_trip(dims in dims_strategy()) {
        let data = Data::with_dims("t", dims.clone(), Precision::FP32, Layout::Any);
        prop_assert_eq!(data.dims().unwrap(), dims.as_slice());
        let reversed: Vec<usize> = dims.iter().rev().copied().collect();
        prop_assert_eq!(data.reversed_dims(), reversed.as_slice());
    }

    #[test]
    fn prop_batch_mutation_touches_outermost_only(dims in dims_strategy(), batch in 1usize..64) {
        let mut data = Data::with_dims("t", dims.clone(), Precision::FP32, Layout::Any);
        data.set_batch_size(batch);
        let after = data.dims().unwrap().to_vec();
        prop_assert_eq!(after[0], batch);
        prop_assert_eq!(&after[1..], &dims[1..]);
        prop_assert_eq!(data.reversed_dims().last().copied(), Some(batch));
    }

    #[test]
    fn prop_blob_width_follows_precision(dims in dims_strategy(), precision in precision_strategy()) {
        let blob = create_blob(&TensorDesc::new(precision, dims.clone(), Layout::Any)).unwrap();
        let width = match precision {
            Precision::FP32 => 4,
            Precision::U8 => 1,
            _ => 2,
        };
        prop_assert_eq!(blob.len(), element_count(&dims));
        prop_assert_eq!(blob.element_size(), width);
        prop_assert_eq!(precision.storage_kind().map(StorageKind::element_size), Some(width));
    }
}

#[test]
fn test_unspecified_precision_cannot_materialize() {
    let desc = TensorDesc::new(Precision::Unspecified, vec![2, 2], Layout::NC);
    assert!(matches!(
        create_blob(&desc),
        Err(ForgeError::UnspecifiedPrecision(_))
    ));
    let data = Data::with_dims("t", vec![2], Precision::Unspecified, Layout::C);
    assert!(matches!(
        data.create_blob(),
        Err(ForgeError::UnspecifiedPrecision(_))
    ));
}

#[test]
fn test_diverged_descriptor_is_inconsistent() {
    let mut data = Data::with_dims("t", vec![1, 2, 3], Precision::FP32, Layout::Any);
    data.descriptor_mut().dims = vec![1, 2, 4];
    assert!(matches!(
        data.dims(),
        Err(ForgeError::InconsistentDescriptor { .. })
    ));
}
