//! Property-based tests for optimistic overlays

use cms_sync::offline::{FoldOp, OptimisticManager};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn base_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(("[a-z]{1,6}", 0i64..100), 0..6).prop_map(|rows| {
        let records: Vec<Value> = rows
            .into_iter()
            .enumerate()
            .map(|(i, (name, qty))| json!({ "_id": format!("r{}", i), "name": name, "qty": qty }))
            .collect();
        Value::Array(records)
    })
}

fn fold_strategy() -> impl Strategy<Value = FoldOp> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(|name| FoldOp::insert(json!({ "_id": "tmp", "name": name }))),
        (0usize..6).prop_map(|i| FoldOp::Remove { id: format!("r{}", i) }),
        (0usize..6, 0i64..100).prop_map(|(i, qty)| {
            let mut fields = Map::new();
            fields.insert("qty".to_string(), json!(qty));
            FoldOp::Patch { id: format!("r{}", i), fields }
        }),
        (0usize..6).prop_map(|i| FoldOp::Replace {
            id: format!("r{}", i),
            record: json!({ "_id": format!("r{}", i), "name": "replaced" }),
        }),
    ]
}

proptest! {
    #[test]
    fn test_confirm_converges_to_base(base in base_strategy(), folds in prop::collection::vec(fold_strategy(), 1..6)) {
        let mut manager = OptimisticManager::new("_id");
        for (i, fold) in folds.into_iter().enumerate() {
            manager.apply_optimistic(format!("op-{}", i), fold);
        }
        let ids: Vec<String> = manager.pending().iter().map(|op| op.operation_id.clone()).collect();
        for id in &ids {
            manager.confirm_optimistic(id);
        }

        prop_assert_eq!(manager.apply_optimistic_updates(&base), base);
        prop_assert_eq!(manager.count_pending(), 0);
    }

    #[test]
    fn test_rollback_restores_previous_view(
        base in base_strategy(),
        earlier in prop::collection::vec(fold_strategy(), 0..4),
        fold in fold_strategy(),
    ) {
        let mut manager = OptimisticManager::new("_id");
        for (i, op) in earlier.into_iter().enumerate() {
            manager.apply_optimistic(format!("op-{}", i), op);
        }
        let before = manager.apply_optimistic_updates(&base);

        manager.apply_optimistic("latest", fold);
        manager.rollback_optimistic("latest");

        prop_assert_eq!(manager.apply_optimistic_updates(&base), before);
    }
}
