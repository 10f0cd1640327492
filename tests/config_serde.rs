use index_remap::transfer::{CombineMode, ExchangeConfig};

#[test]
fn config_round_trips_through_json() {
    let config = ExchangeConfig::default().with_tag_base(0x3000);
    let json = serde_json::to_string(&config).unwrap();
    let back: ExchangeConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn missing_fields_take_defaults() {
    let config: ExchangeConfig = serde_json::from_str(r#"{ "collective_error_checks": false }"#).unwrap();
    assert!(!config.collective_error_checks);
    assert_eq!(config.tags, ExchangeConfig::default().tags);
    assert_eq!(config.directory_tags, ExchangeConfig::default().directory_tags);
}

#[test]
fn tag_base_moves_both_tag_pairs() {
    let config = ExchangeConfig::default().with_tag_base(0x4000);
    assert_eq!(config.tags.sizes.as_u16(), 0x4000);
    assert_eq!(config.tags.data.as_u16(), 0x4001);
    assert_eq!(config.directory_tags.sizes.as_u16(), 0x4002);
    assert_eq!(config.directory_tags.data.as_u16(), 0x4003);
}

#[test]
fn combine_mode_names_are_stable() {
    assert_eq!(serde_json::to_string(&CombineMode::AbsMax).unwrap(), "\"AbsMax\"");
    let mode: CombineMode = serde_json::from_str("\"Insert\"").unwrap();
    assert_eq!(mode, CombineMode::Insert);
}
