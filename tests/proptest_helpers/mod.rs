#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Tolerance for boxes that went through a 6-decimal YOLO label.
pub const EPS_LABEL: f64 = 1e-6;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// A normalized top-left box that stays inside the unit square.
pub fn arb_unit_box() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (0.0f64..0.9, 0.0f64..0.9)
        .prop_flat_map(|(x, y)| (Just(x), Just(y), 0.001f64..(1.0 - x), 0.001f64..(1.0 - y)))
}

/// Raw command-line references: IDs, names and the `list` sentinel.
pub fn arb_reference() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<u32>().prop_map(|id| id.to_string()),
        Just("list".to_string()),
        "[a-zA-Z][a-zA-Z0-9_ .-]{0,15}",
    ]
}

pub fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}
