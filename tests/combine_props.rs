use index_remap::transfer::{AbsMaxCombine, AddCombine, Combine, CombineMode};
use proptest::prelude::*;

proptest! {
    #[test]
    fn abs_max_result_is_one_of_the_inputs(stored in -1_000i64..1_000, incoming in -1_000i64..1_000) {
        let mut v = stored;
        AbsMaxCombine::fuse(&mut v, incoming);
        prop_assert!(v == stored || v == incoming);
        prop_assert_eq!(v.abs(), stored.abs().max(incoming.abs()));
        if stored.abs() == incoming.abs() {
            prop_assert_eq!(v, stored);
        }
    }

    #[test]
    fn abs_max_is_order_independent_in_magnitude(values in prop::collection::vec(-500i32..500, 1..20)) {
        let fuse = CombineMode::AbsMax.fuse_fn::<i32>().unwrap();
        let mut forward = 0;
        for &x in &values {
            fuse(&mut forward, x);
        }
        let mut backward = 0;
        for &x in values.iter().rev() {
            fuse(&mut backward, x);
        }
        prop_assert_eq!(forward.abs(), backward.abs());
        prop_assert_eq!(forward.abs(), values.iter().map(|x| x.abs()).max().unwrap_or(0));
    }

    #[test]
    fn add_accumulates(values in prop::collection::vec(-1_000i64..1_000, 0..32)) {
        let mut acc = 0i64;
        for &x in &values {
            <AddCombine as Combine<i64>>::fuse(&mut acc, x);
        }
        prop_assert_eq!(acc, values.iter().sum::<i64>());
    }
}

#[test]
fn insert_has_no_elementwise_rule() {
    assert!(CombineMode::Insert.fuse_fn::<f64>().is_err());
}
