use convergent::ot::{ListOp, StringOp, Value};

use super::helpers::*;

#[test]
fn test_string_transform_converges() {
    for seed in 0..SEEDS {
        let mut rng = rng(seed);
        let base = random_base(&mut rng);
        let a = random_string_op(&mut rng, &base);
        let b = random_string_op(&mut rng, &base);

        let (a2, b2) = a.transform(&b).unwrap();
        let via_a = b2.apply(&a.apply(&base).unwrap()).unwrap();
        let via_b = a2.apply(&b.apply(&base).unwrap()).unwrap();
        assert_eq!(via_a, via_b, "seed {seed}: {a:?} vs {b:?} on {base:?}");
    }
}

#[test]
fn test_string_compose_matches_sequential_apply() {
    for seed in 0..SEEDS {
        let mut rng = rng(seed);
        let base = random_base(&mut rng);
        let a = random_string_op(&mut rng, &base);
        let middle = a.apply(&base).unwrap();
        let b = random_string_op(&mut rng, &middle);

        let composed = a.compose(&b).unwrap();
        assert_eq!(
            composed.apply(&base).unwrap(),
            b.apply(&middle).unwrap(),
            "seed {seed}"
        );
    }
}

#[test]
fn test_string_compose_is_associative() {
    for seed in 0..SEEDS {
        let mut rng = rng(seed);
        let base = random_base(&mut rng);
        let a = random_string_op(&mut rng, &base);
        let s1 = a.apply(&base).unwrap();
        let b = random_string_op(&mut rng, &s1);
        let s2 = b.apply(&s1).unwrap();
        let c = random_string_op(&mut rng, &s2);

        let left = a.compose(&b).unwrap().compose(&c).unwrap();
        let right = a.compose(&b.compose(&c).unwrap()).unwrap();
        assert_eq!(left.apply(&base).unwrap(), right.apply(&base).unwrap(), "seed {seed}");
    }
}

#[test]
fn test_list_transform_converges() {
    for seed in 0..SEEDS {
        let mut rng = rng(seed);
        let base: Vec<Value> = random_base(&mut rng).chars().map(|c| Value::from(c.to_string())).collect();
        let a = random_list_op(&mut rng, &base);
        let b = random_list_op(&mut rng, &base);

        let (a2, b2) = a.transform(&b).unwrap();
        let via_a = b2.apply(&a.apply(&base).unwrap()).unwrap();
        let via_b = a2.apply(&b.apply(&base).unwrap()).unwrap();
        assert_eq!(via_a, via_b, "seed {seed}");
    }
}

#[test]
fn test_transformed_operations_keep_lengths_consistent() {
    for seed in 0..SEEDS {
        let mut rng = rng(seed);
        let base = random_base(&mut rng);
        let a = random_string_op(&mut rng, &base);
        let b = random_string_op(&mut rng, &base);

        let (a2, b2) = a.transform(&b).unwrap();
        assert_eq!(a2.base_len(), b.target_len());
        assert_eq!(b2.base_len(), a.target_len());
    }
}

#[test]
fn test_concurrent_inserts_at_same_position_order_left_first() {
    let base = "ab".to_string();
    let left = StringOp::new().insert("XY").retain(2);
    let right = StringOp::new().insert("Z").retain(2);

    let (left2, right2) = left.transform(&right).unwrap();
    assert_eq!(right2.apply(&left.apply(&base).unwrap()).unwrap(), "XYZab");
    assert_eq!(left2.apply(&right.apply(&base).unwrap()).unwrap(), "XYZab");
}

#[test]
fn test_overlapping_deletes_remove_once() {
    let base = "Hello World".to_string();
    let a = StringOp::new().retain(5).delete(" World");
    let b = StringOp::new().retain(4).delete("o W").retain(4);

    let (a2, b2) = a.transform(&b).unwrap();
    assert_eq!(b2.apply(&a.apply(&base).unwrap()).unwrap(), "Hell");
    assert_eq!(a2.apply(&b.apply(&base).unwrap()).unwrap(), "Hell");
}

#[test]
fn test_compose_rejects_mismatched_lengths() {
    let a = StringOp::new().retain(3).insert("x");
    let b = StringOp::new().retain(3);
    assert!(a.compose(&b).unwrap_err().is_compose_conflict());
}

#[test]
fn test_transform_rejects_different_bases() {
    let a = ListOp::new().retain(2);
    let b = ListOp::new().retain(3);
    assert!(a.transform(&b).unwrap_err().is_transform_conflict());
}
