//! End-to-end tests of the library pipeline against its documented
//! behavior.

use serde_json::{json, Value};
use shred::{
    ArrayMode, IdMode, ShredConfig, ShredError, Shredder, DEFAULT_ID_FIELD,
    DEFAULT_PARENT_FIELD, DEFAULT_TIME_FIELD,
};
use std::collections::HashSet;

fn shredder(config: ShredConfig) -> Shredder {
    Shredder::new(config).expect("valid config")
}

#[test]
fn scalar_only_record_produces_one_main_row() {
    let result = shred::flatten(json!({"id": 1, "name": "A"}), "e").expect("run");

    assert_eq!(1, result.main().len());
    assert!(result.tables().is_empty());

    let row = &result.main()[0];
    assert_eq!(json!("1"), row["id"]);
    assert_eq!(json!("A"), row["name"]);
    // The numeric id is a usable natural id, so no synthetic id column.
    assert!(!row.contains_key(DEFAULT_ID_FIELD));
    assert!(row[DEFAULT_TIME_FIELD].is_string());
}

#[test]
fn simple_arrays_stay_inline_in_smart_mode() {
    let result = shred::flatten(json!({"id": 1, "tags": ["x", "y", "z"]}), "e").expect("run");

    assert_eq!(json!(["x", "y", "z"]), result.main()[0]["tags"]);
    assert!(result.tables().is_empty());
}

#[test]
fn object_arrays_become_child_tables_in_smart_mode() {
    let result =
        shred::flatten(json!({"name": "n", "items": [{"v": 10}, {"v": 20}]}), "e").expect("run");

    let main = &result.main()[0];
    assert!(!main.contains_key("items"));

    let items = &result.tables()["e_items"];
    assert_eq!(2, items.len());
    let main_id = &main[DEFAULT_ID_FIELD];
    for row in items {
        assert_eq!(main_id, &row[DEFAULT_PARENT_FIELD]);
    }
}

#[test]
fn deep_nesting_flattens_to_path_named_columns() {
    let result = shred::flatten(json!({"a": {"b": {"c": {"d": 42}}}}), "e").expect("run");
    assert_eq!(json!("42"), result.main()[0]["a_b_c_d"]);
}

#[test]
fn deterministic_ids_are_identical_across_runs() {
    let input = json!({"id": "", "sku": "k", "v": 1});
    let config = ShredConfig::default().with_deterministic_ids(["sku"]);

    let first = shredder(config.clone()).flatten(input.clone(), "e").expect("run");
    let second = shredder(config).flatten(input, "e").expect("run");

    let id = |result: &shred::ShredResult| result.main()[0][DEFAULT_ID_FIELD].clone();
    assert_eq!(id(&first), id(&second));
}

#[test]
fn jsonl_recovery_skips_or_aborts_per_mode() {
    let text = "{\"a\": 1}\nnot json\n{\"a\": 3}";

    let tolerant = shredder(ShredConfig::error_tolerant());
    let result = tolerant.flatten(text, "e").expect("skip mode completes");
    assert_eq!(2, result.main().len());

    let strict = shredder(ShredConfig::default());
    let err = strict.flatten(text, "e").expect_err("strict mode aborts");
    assert!(matches!(err, ShredError::Parse(_)));
}

#[test]
fn referential_integrity_holds_across_nested_tables() {
    let input = json!([
        {
            "name": "r1",
            "items": [
                {"v": 1, "subs": [{"w": 1}, {"w": 2}]},
                {"v": 2, "subs": [{"w": 3}]},
            ],
        },
        {"name": "r2", "items": [{"v": 3}]},
    ]);
    let result = shred::flatten(input, "e").expect("run");

    // Identity of a row: its discovered natural id or the installed id.
    let ids = |rows: &[shred::Row]| -> HashSet<Value> {
        rows.iter().map(|r| r[DEFAULT_ID_FIELD].clone()).collect()
    };
    let main_ids = ids(result.main());
    let item_ids = ids(&result.tables()["e_items"]);

    assert_eq!(2, main_ids.len());
    assert_eq!(3, item_ids.len());

    for row in &result.tables()["e_items"] {
        assert!(
            main_ids.contains(&row[DEFAULT_PARENT_FIELD]),
            "orphaned item row"
        );
    }
    for row in &result.tables()["e_items_subs"] {
        assert!(
            item_ids.contains(&row[DEFAULT_PARENT_FIELD]),
            "orphaned sub row"
        );
    }
}

#[test]
fn all_rows_of_a_run_share_one_timestamp() {
    let input = json!([
        {"a": 1, "items": [{"v": 1}]},
        {"a": 2, "items": [{"v": 2}]},
    ]);
    let result = shred::flatten(input, "e").expect("run");

    let mut stamps: HashSet<Value> = HashSet::new();
    for row in result.main() {
        stamps.insert(row[DEFAULT_TIME_FIELD].clone());
    }
    for rows in result.tables().values() {
        for row in rows {
            stamps.insert(row[DEFAULT_TIME_FIELD].clone());
        }
    }
    assert_eq!(1, stamps.len());
}

#[test]
fn every_array_mode_disposes_of_arrays_exactly_once() {
    let input = || json!({"tags": ["x"], "items": [{"v": 1}]});

    // Smart: tags inline, items extracted.
    let smart = shred::flatten(input(), "e").expect("run");
    assert!(smart.main()[0].contains_key("tags"));
    assert!(!smart.main()[0].contains_key("items"));
    assert_eq!(
        vec!["e_items"],
        smart.tables().keys().map(String::as_str).collect::<Vec<_>>()
    );

    // Separate: both extracted.
    let separate = shredder(ShredConfig::default().with_array_mode(ArrayMode::Separate))
        .flatten(input(), "e")
        .expect("run");
    assert!(!separate.main()[0].contains_key("tags"));
    assert_eq!(
        vec!["e_items", "e_tags"],
        separate
            .tables()
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
    );

    // Inline: both serialized in place.
    let inline = shredder(ShredConfig::default().with_array_mode(ArrayMode::Inline))
        .flatten(input(), "e")
        .expect("run");
    assert_eq!(json!(r#"["x"]"#), inline.main()[0]["tags"]);
    assert_eq!(json!(r#"[{"v":1}]"#), inline.main()[0]["items"]);
    assert!(inline.tables().is_empty());

    // Skip: both dropped.
    let skip = shredder(ShredConfig::default().with_array_mode(ArrayMode::Skip))
        .flatten(input(), "e")
        .expect("run");
    assert!(!skip.main()[0].contains_key("tags"));
    assert!(!skip.main()[0].contains_key("items"));
    assert!(skip.tables().is_empty());
}

#[test]
fn natural_id_mode_prefers_data_identifiers() {
    let config = ShredConfig {
        id_mode: IdMode::Natural,
        ..ShredConfig::default()
    };
    let result = shredder(config)
        .flatten(json!({"uuid": "u-1", "items": [{"v": 1}]}), "e")
        .expect("run");

    let main = &result.main()[0];
    assert!(!main.contains_key(DEFAULT_ID_FIELD));
    assert_eq!(
        json!("u-1"),
        result.tables()["e_items"][0][DEFAULT_PARENT_FIELD]
    );
}

#[test]
fn depth_limited_records_still_emit_their_shallow_columns() {
    let mut nested = json!({"leaf": 1});
    for _ in 0..20 {
        nested = json!({"level": nested});
    }
    let mut record = nested.as_object().unwrap().clone();
    record.insert("top".to_string(), json!("t"));

    let config = ShredConfig::default().with_max_depth(5);
    let result = shredder(config)
        .flatten(Value::Object(record), "e")
        .expect("run completes despite depth");
    assert_eq!(1, result.main().len());
    assert_eq!(json!("t"), result.main()[0]["top"]);
}

#[test]
fn save_round_trips_through_csv() {
    let input = json!([{"name": "A", "items": [{"v": 1}, {"v": 2}]}]);
    let result = shred::flatten(input, "e").expect("run");

    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("out");
    let written = result
        .save(&base, Some("csv"), &shred::WriterOptions::default())
        .expect("save");

    assert_eq!(2, written.len());
    let main_csv = std::fs::read_to_string(&written["e"]).unwrap();
    assert!(main_csv.contains("name"));
    assert!(main_csv.contains('A'));
    let items_csv = std::fs::read_to_string(&written["e_items"]).unwrap();
    assert_eq!(3, items_csv.lines().count());
}

#[test]
fn random_ids_do_not_collide_over_many_records() {
    let records: Vec<Value> = (0..5_000).map(|n| json!({"n": n})).collect();
    let result = shred::flatten(Value::Array(records), "e").expect("run");

    let ids: HashSet<Value> = result
        .main()
        .iter()
        .map(|r| r[DEFAULT_ID_FIELD].clone())
        .collect();
    assert_eq!(5_000, ids.len());
}

#[test]
fn flatten_stream_writes_every_table_in_batches() {
    let lines: String = (0..25)
        .map(|n| format!("{{\"name\": \"r{n}\", \"items\": [{{\"v\": {n}}}]}}\n"))
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let config = ShredConfig::default().with_batch_size(10);
    shredder(config)
        .flatten_stream(
            lines,
            "e",
            &out,
            "jsonl".parse().expect("format"),
            &shred::WriterOptions::default(),
        )
        .expect("stream run");

    let read = |name: &str| -> usize {
        std::fs::read_to_string(out.join(name))
            .expect("output file")
            .lines()
            .count()
    };
    assert_eq!(25, read("e.jsonl"));
    assert_eq!(25, read("e_items.jsonl"));
}

#[test]
fn metadata_prefixed_keys_survive_the_whole_pipeline() {
    let result =
        shred::flatten(json!({"__origin": "import", "a": {"b": 1}}), "e").expect("run");
    let row = &result.main()[0];
    assert_eq!(json!("import"), row["__origin"]);
    assert_eq!(json!("1"), row["a_b"]);
}
