use annbridge::error::{ErrorCategory, Result};
use annbridge::host::HostIndex;
use serde_json::{Value, json};
use tempfile::tempdir;

fn host(config: Value) -> Result<HostIndex> {
    HostIndex::construct(&[config])
}

#[test]
fn construction_rejects_malformed_configuration() {
    let cases = [
        json!({ "dimensions": 2.5 }),
        json!({ "dimensions": -2 }),
        json!({ "dimensions": 2, "capacity": "big" }),
        json!({ "dimensions": 2, "metric": "manhattan" }),
        json!({ "dimensions": 2, "quantization": "u8" }),
        json!([2]),
    ];
    for config in cases {
        let err = HostIndex::<annbridge::FlatEngine>::construct(&[config.clone()]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Argument, "{config}");
    }
}

#[test]
fn defaults_apply_when_options_are_omitted() -> Result<()> {
    let index = host(json!({ "dimensions": 5 }))?;
    let typed = index.index();
    assert_eq!(typed.dimensions(), 5);
    assert_eq!(typed.capacity(), 0);
    assert_eq!(typed.metric(), annbridge::MetricKind::Ip);
    assert_eq!(typed.quantization(), annbridge::ScalarKind::F32);
    assert_eq!(typed.connectivity(), 16);
    Ok(())
}

#[test]
fn scripted_session() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.ann");
    let path = path.to_str().unwrap();

    let mut index = host(json!({ "dimensions": 4, "metric": "ip" }))?;
    index.call("add", &[json!(1), json!([1, 0, 0, 0])])?;
    index.call("add", &[json!(2), json!([0, 1, 0, 0])])?;

    let found = index.call("search", &[json!([1, 0, 0, 0]), json!(1)])?;
    assert_eq!(found, json!({ "keys": [1], "distances": [0.0], "count": 1 }));

    assert_eq!(index.call("rename", &[json!(2), json!(3)])?, json!(true));
    assert_eq!(index.call("contains", &[json!(2)])?, json!(false));
    assert_eq!(index.call("capacity", &[])?, json!(2));
    index.call("save", &[json!(path)])?;

    let mut restored = host(json!({ "dimensions": 4, "metric": "ip" }))?;
    restored.call("load", &[json!(path)])?;
    assert_eq!(restored.call("size", &[])?, json!(2));
    assert_eq!(restored.call("contains", &[json!(3)])?, json!(true));

    let mut viewed = host(json!({ "dimensions": 4, "metric": "ip" }))?;
    viewed.call("view", &[json!(path)])?;
    let err = viewed.call("remove", &[json!(3)]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Engine);
    assert_eq!(viewed.call("dimensions", &[])?, json!(4));
    Ok(())
}

#[test]
fn large_keys_survive_unchanged() -> Result<()> {
    let mut index = host(json!({ "dimensions": 1 }))?;
    index.add(&[json!(u64::MAX), json!([1.0])])?;
    assert!(index.contains(&[json!(u64::MAX)])?);

    let found = index.search(&[json!([1.0]), json!(1)])?;
    assert_eq!(found["keys"], json!([u64::MAX]));

    let err = index.add(&[json!(1e20), json!([1.0])]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Argument);
    Ok(())
}

#[test]
fn loading_a_missing_file_is_an_engine_error() -> Result<()> {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.ann");

    let mut index = host(json!({ "dimensions": 2 }))?;
    let err = index.load(&[json!(missing.to_str().unwrap())]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Engine);
    Ok(())
}
