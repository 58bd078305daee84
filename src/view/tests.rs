use super::*;
use crate::config::CacheConfig;
use crate::record::UpdateRecord;
use crate::store::StateStore;
use serde_json::{json, Value};

/// Total item count across the inventory, plus the player's name
fn carried() -> CompositeView<Value> {
    CompositeView::new(
        "carried",
        vec![EntityClass::inventory(), EntityClass::Player],
        |inputs: &ViewInputs<'_, Value>| {
            let total: u64 = inputs
                .records(&EntityClass::inventory())
                .iter()
                .filter_map(|r| r.payload["quantity"].as_u64())
                .sum();
            let name = inputs
                .table(&EntityClass::Player)
                .and_then(|t| t.get(0u64))
                .map(|r| r.payload["name"].clone())
                .unwrap_or(Value::Null);
            vec![(EntityKey(0), json!({"total": total, "name": name}))]
        },
    )
}

fn store_with_carried() -> (Arc<StateStore>, Arc<CompositeView<Value>>) {
    let store = StateStore::new(CacheConfig::default());
    store.register_view(carried());
    let view = store.view("carried").unwrap();
    (store, view)
}

fn inventory_full(sequence: u64, quantity: u64) -> UpdateRecord<Value> {
    UpdateRecord::full(
        EntityClass::inventory(),
        sequence,
        (0..4u64).map(move |slot| (slot, json!({"id": 995, "quantity": quantity}))),
    )
}

#[test]
fn test_view_memoized_between_reads() {
    let (store, view) = store_with_carried();
    let class = EntityClass::view("carried");
    store.ingest(inventory_full(1, 5));

    let first = store.snapshot(&[class.clone()]);
    let second = store.snapshot(&[class.clone()]);
    assert_eq!(view.rebuild_count(), 1);
    assert_eq!(first.get(&class, 0u64).unwrap().payload["total"], 20);
    assert_eq!(second.version(&class), first.version(&class));

    store.ingest(UpdateRecord::delta(
        EntityClass::inventory(),
        2,
        0u64,
        json!({"id": 995, "quantity": 10}),
    ));
    let third = store.snapshot(&[class.clone()]);
    assert_eq!(view.rebuild_count(), 2);
    assert_eq!(third.get(&class, 0u64).unwrap().payload["total"], 25);
}

#[test]
fn test_view_version_is_max_of_inputs() {
    let (store, _view) = store_with_carried();
    let class = EntityClass::view("carried");

    store.ingest(inventory_full(1, 1));
    store.ingest(UpdateRecord::delta(EntityClass::inventory(), 2, 1u64, json!({"quantity": 2})));
    store.ingest(UpdateRecord::delta(EntityClass::inventory(), 3, 1u64, json!({"quantity": 3})));
    store.ingest(UpdateRecord::full(EntityClass::Player, 1, vec![(0u64, json!({"name": "a"}))]));

    let snapshot = store.snapshot(&[class.clone()]);
    assert_eq!(snapshot.version(&class), Some(3));
    assert_eq!(store.version(&class), 3);
    assert_eq!(snapshot.get(&class, 0u64).unwrap().payload["name"], "a");
}

#[test]
fn test_view_warm_only_when_all_inputs_warm() {
    let (store, _view) = store_with_carried();
    let class = EntityClass::view("carried");

    assert_eq!(store.snapshot(&[class.clone()]).warmup(&class), WarmupState::Cold);

    store.ingest(inventory_full(1, 1));
    assert_eq!(store.snapshot(&[class.clone()]).warmup(&class), WarmupState::Warming);
    assert!(store
        .await_warm(&class, std::time::Duration::from_millis(20))
        .is_err());

    store.ingest(UpdateRecord::full(EntityClass::Player, 1, vec![(0u64, json!({"name": "a"}))]));
    assert_eq!(store.snapshot(&[class.clone()]).warmup(&class), WarmupState::Warm);
    store
        .await_warm(&class, std::time::Duration::from_millis(20))
        .unwrap();
}

#[test]
fn test_view_defers_rebuild_while_input_stale() {
    let (store, view) = store_with_carried();
    let class = EntityClass::view("carried");
    store.ingest(inventory_full(1, 1));
    store.ingest(UpdateRecord::full(EntityClass::Player, 1, vec![(0u64, json!({"name": "a"}))]));

    let before = store.snapshot(&[class.clone()]);
    assert_eq!(view.rebuild_count(), 1);

    // Gap on the inventory, then a change to the other input
    store.ingest(UpdateRecord::delta(EntityClass::inventory(), 9, 0u64, json!({"quantity": 100})));
    store.ingest(UpdateRecord::delta(EntityClass::Player, 2, 0u64, json!({"name": "b"})));

    let during = store.snapshot(&[class.clone()]);
    assert!(during.is_stale(&class));
    assert!(store.is_stale(&class));
    assert_eq!(view.rebuild_count(), 1);
    assert_eq!(during.get(&class, 0u64).unwrap().payload["name"], "a");
    assert_eq!(during.version(&class), before.version(&class));

    store.ingest(inventory_full(10, 2));
    let after = store.snapshot(&[class.clone()]);
    assert!(!after.is_stale(&class));
    assert_eq!(view.rebuild_count(), 2);
    assert_eq!(after.get(&class, 0u64).unwrap().payload["total"], 8);
    assert_eq!(after.get(&class, 0u64).unwrap().payload["name"], "b");
}

#[test]
fn test_view_resync_forwards_to_inputs() {
    let (store, _view) = store_with_carried();
    store.ingest(inventory_full(1, 1));
    store.ingest(UpdateRecord::full(EntityClass::Player, 1, vec![(0u64, json!({"name": "a"}))]));

    store.request_resync(&EntityClass::view("carried"));

    let pending = store.pending_resyncs();
    assert_eq!(pending.len(), 2);
    assert!(store.is_stale(&EntityClass::inventory()));
    assert!(store.is_stale(&EntityClass::Player));
}

#[test]
fn test_open_interfaces_joins_groups_and_widgets() {
    let store = StateStore::with_standard_views(CacheConfig::default());
    let class = EntityClass::view(OPEN_INTERFACES);

    store.ingest(UpdateRecord::full(
        EntityClass::Interface,
        1,
        vec![(149u64, json!({"modal": false})), (162u64, json!({"modal": true}))],
    ));
    store.ingest(UpdateRecord::full(
        EntityClass::Widget,
        1,
        vec![
            (EntityKey::widget(149, 0), json!({"group": 149, "text": "Inventory"})),
            (
                EntityKey::widget(149, 1),
                json!({"group": 149, "parent": EntityKey::widget(149, 0).0}),
            ),
            (
                EntityKey::widget(149, 2),
                json!({"group": 149, "parent": EntityKey::widget(149, 0).0, "hidden": true}),
            ),
            (EntityKey::widget(162, 0), json!({"group": 162})),
            // Group not open, ignored
            (EntityKey::widget(300, 0), json!({"group": 300})),
        ],
    ));

    let snapshot = store.snapshot(&[class.clone()]);
    assert_eq!(snapshot.warmup(&class), WarmupState::Warm);

    let open: Vec<(EntityKey, OpenInterface)> = snapshot.decode(&class).unwrap();
    assert_eq!(open.len(), 2);

    let (key, inventory) = &open[0];
    assert_eq!(*key, EntityKey(149));
    assert!(!inventory.modal);
    assert_eq!(inventory.roots, vec![EntityKey::widget(149, 0)]);
    assert_eq!(
        inventory.widgets,
        vec![EntityKey::widget(149, 0), EntityKey::widget(149, 1)]
    );

    let (_, chat) = &open[1];
    assert_eq!(chat.group, 162);
    assert!(chat.modal);
}

#[test]
fn test_open_interfaces_empty_without_groups() {
    let store = StateStore::with_standard_views(CacheConfig::default());
    let class = EntityClass::view(OPEN_INTERFACES);
    store.ingest(UpdateRecord::full(
        EntityClass::Widget,
        1,
        vec![(EntityKey::widget(149, 0), json!({"group": 149}))],
    ));

    let snapshot = store.snapshot(&[class.clone()]);
    assert_eq!(snapshot.len(&class), 0);
    assert_eq!(snapshot.warmup(&class), WarmupState::Warming);
}

fn input_at(class: &EntityClass, version: u64) -> ClassView<Value> {
    ClassView {
        table: Arc::new(ClassTable::derived(
            class.clone(),
            version,
            vec![(EntityKey(0), json!({"quantity": version}))],
        )),
        warmup: WarmupState::Warm,
        stale: false,
    }
}

#[test]
fn test_view_memo_never_moves_backwards() {
    let view = carried();

    let newer = view.read(|class| input_at(class, 5));
    assert_eq!(newer.version(), 5);
    assert_eq!(view.rebuild_count(), 1);

    // A reader that loaded its inputs before the newer build gets the newer memo
    let late = view.read(|class| input_at(class, 3));
    assert_eq!(late.version(), 5);
    assert_eq!(view.rebuild_count(), 1);

    let again = view.read(|class| input_at(class, 5));
    assert_eq!(again.version(), 5);
    assert_eq!(view.rebuild_count(), 1);
}

#[test]
fn test_view_mixed_versions_do_not_replace_memo() {
    let view = carried();
    let inventory = EntityClass::inventory();

    view.read(|class| input_at(class, 5));
    assert_eq!(view.rebuild_count(), 1);

    // Inventory ahead, player behind: built for this reader but not memoized
    let mixed = view.read(|class| {
        if *class == inventory {
            input_at(class, 7)
        } else {
            input_at(class, 2)
        }
    });
    assert_eq!(mixed.version(), 7);
    assert_eq!(view.rebuild_count(), 2);

    let current = view.read(|class| input_at(class, 5));
    assert_eq!(current.version(), 5);
    assert_eq!(view.rebuild_count(), 2);
}
