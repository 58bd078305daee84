use super::*;

#[test]
fn test_parse_known_classes() {
    assert_eq!("widget".parse::<EntityClass>().unwrap(), EntityClass::Widget);
    assert_eq!("interface".parse::<EntityClass>().unwrap(), EntityClass::Interface);
    assert_eq!("player".parse::<EntityClass>().unwrap(), EntityClass::Player);
    assert_eq!("menu".parse::<EntityClass>().unwrap(), EntityClass::Menu);
    assert_eq!(
        "container:inventory".parse::<EntityClass>().unwrap(),
        EntityClass::inventory()
    );
    assert_eq!(
        "view:open_interfaces".parse::<EntityClass>().unwrap(),
        EntityClass::view("open_interfaces")
    );
}

#[test]
fn test_parse_rejects_bad_classes() {
    assert_eq!("".parse::<EntityClass>().unwrap_err(), ParseClassError::Empty);
    assert_eq!(
        "container:".parse::<EntityClass>().unwrap_err(),
        ParseClassError::MissingName("container:".to_string())
    );
    assert!(matches!(
        "Widget".parse::<EntityClass>(),
        Err(ParseClassError::Unknown(_))
    ));
    assert!(matches!(
        "npc:goblin".parse::<EntityClass>(),
        Err(ParseClassError::Unknown(_))
    ));
}

#[test]
fn test_display_matches_parse() {
    let classes = vec![
        EntityClass::container("bank"),
        EntityClass::Widget,
        EntityClass::WorldEntity,
        EntityClass::GroundItem,
        EntityClass::view("open_interfaces"),
    ];

    for class in classes {
        let text = class.to_string();
        assert_eq!(text.parse::<EntityClass>().unwrap(), class);
    }
}

#[test]
fn test_serde_uses_string_form() {
    let json = serde_json::to_string(&EntityClass::inventory()).unwrap();
    assert_eq!(json, "\"container:inventory\"");

    let class: EntityClass = serde_json::from_str("\"world_entity\"").unwrap();
    assert_eq!(class, EntityClass::WorldEntity);

    assert!(serde_json::from_str::<EntityClass>("\"bogus\"").is_err());
}

#[test]
fn test_widget_key_packing() {
    let key = EntityKey::widget(149, 0);
    assert_eq!(key.0, 149 << 16);
    assert_eq!(key.widget_group(), 149);
    assert_eq!(key.widget_child(), 0);

    let key = EntityKey::widget(12, 7);
    assert_eq!(key.widget_group(), 12);
    assert_eq!(key.widget_child(), 7);
}
