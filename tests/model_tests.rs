use abmerge::model::*;
use abmerge::report::{diff_contacts, ChangeReport, ContactChanges, FieldChange, RunSummary};
use chrono::NaiveDate;

fn setup() -> Contact {
    let mut contact = Contact::create(
        Id::from_u128(1),
        SourceRef {
            label: "icloud".into(),
            origin: Some("icloud.vcf".into()),
        },
    );
    contact.name = Name {
        formatted: Some("Jon Smith".into()),
        family: Some("Smith".into()),
        given: Some("Jon".into()),
        ..Name::default()
    };
    contact.emails.push(Email::new("jon@example.com", Some("home".into())));
    contact.phones.push(Phone {
        number: NormalizedValue::parsed("07980 220 220", "+447980220220"),
        label: Some("cell".into()),
    });
    contact
}

// ==========================================================================
// ID TESTS
// ==========================================================================

#[test]
fn ids_order_by_value() {
    let a = Id::<Contact>::from_u128(1);
    let b = Id::<Contact>::from_u128(2);
    assert!(a < b);
    assert_eq!(a, Id::from_u128(1));
}

#[test]
fn id_round_trips_through_display() {
    let id = Id::<Contact>::from_u128(42);
    let parsed: Id<Contact> = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn id_serializes_as_plain_uuid_string() {
    let id = Id::<Contact>::from_u128(7);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", id));
}

// ==========================================================================
// CONTACT TESTS
// ==========================================================================

#[test]
fn display_name_prefers_formatted() {
    let contact = setup();
    assert_eq!(contact.name.display().as_deref(), Some("Jon Smith"));
}

#[test]
fn display_name_falls_back_to_components() {
    let name = Name {
        given: Some("Ada".into()),
        family: Some("Lovelace".into()),
        ..Name::default()
    };
    assert_eq!(name.display().as_deref(), Some("Ada Lovelace"));
    assert!(Name::default().display().is_none());
    assert!(Name::default().is_empty());
}

#[test]
fn label_falls_back_to_org_then_email() {
    let mut contact = Contact::create(
        Id::from_u128(3),
        SourceRef {
            label: "google".into(),
            origin: None,
        },
    );
    assert_eq!(contact.label(), "Unnamed");
    contact.emails.push(Email::new("info@acme.test", None));
    assert_eq!(contact.label(), "info@acme.test");
    contact.organization = Some("Acme Ltd".into());
    assert_eq!(contact.label(), "Acme Ltd");
}

#[test]
fn populated_fields_counts_each_value() {
    let mut contact = setup();
    assert_eq!(contact.populated_fields(), 3);
    contact.emails.push(Email::new("jon@work.test", None));
    contact.organization = Some("Acme".into());
    assert_eq!(contact.populated_fields(), 5);
}

#[test]
fn self_card_is_detected_by_kind() {
    let mut contact = setup();
    assert!(!contact.is_self());
    contact.kind = Some(ContactKind::SelfCard);
    assert!(contact.is_self());
}

#[test]
fn kind_parses_vcard_values() {
    assert_eq!(ContactKind::parse("ORG"), Some(ContactKind::Organization));
    assert_eq!(ContactKind::parse(" individual "), Some(ContactKind::Individual));
    assert_eq!(ContactKind::parse("self"), Some(ContactKind::SelfCard));
    assert_eq!(ContactKind::parse("group"), None);
}

#[test]
fn address_match_key_needs_street() {
    let with_postal = Address {
        street: Some("1 High Street".into()),
        postal_code: Some("SW1A 1AA".into()),
        ..Address::default()
    };
    let with_city = Address {
        street: Some("1 High Street".into()),
        locality: Some("London".into()),
        ..Address::default()
    };
    let city_only = Address {
        locality: Some("London".into()),
        ..Address::default()
    };
    assert_eq!(with_postal.match_key().as_deref(), Some("1 high street|sw1a1aa"));
    assert_eq!(with_city.match_key().as_deref(), Some("1 high street|london"));
    assert_eq!(city_only.match_key(), None);
    assert!(Address::default().is_empty());
}

#[test]
fn address_display_skips_missing_components() {
    let address = Address {
        street: Some("1 High Street".into()),
        locality: Some("London".into()),
        country: Some("UK".into()),
        ..Address::default()
    };
    assert_eq!(address.to_string(), "1 High Street, London, UK");
}

#[test]
fn relationship_self_loop() {
    let a = Id::from_u128(1);
    let b = Id::from_u128(2);
    assert!(RelationshipEdge::create(a, a, "friend").is_self_loop());
    assert!(!RelationshipEdge::create(a, b, "friend").is_self_loop());
}

// ==========================================================================
// RAW RECORD TESTS
// ==========================================================================

#[test]
fn raw_record_deserializes_from_json() {
    let json = r#"{
        "id": "00000000-0000-0000-0000-000000000001",
        "source": "icloud",
        "properties": [
            {"name": "FN", "value": {"kind": "text", "value": "Jon Smith"}},
            {"name": "TEL", "params": {"TYPE": "CELL"}, "value": {"kind": "text", "value": "07980 220 220"}},
            {"name": "N", "value": {"kind": "structured", "value": ["Smith", "Jon", "", "", ""]}}
        ]
    }"#;
    let raw: RawContact = serde_json::from_str(json).unwrap();
    assert_eq!(raw.id, Id::from_u128(1));
    assert_eq!(raw.origin, None);
    assert_eq!(raw.properties.len(), 3);
    assert_eq!(raw.properties[1].label().as_deref(), Some("cell"));
    assert!(matches!(raw.properties[2].value, PropertyValue::Structured(ref p) if p.len() == 5));
}

#[test]
fn param_lookup_ignores_case() {
    let property = RawProperty::text("PHOTO", "abc").with_param("encoding", "B");
    assert_eq!(property.param("ENCODING"), Some("B"));
    assert!(property.is_binary());
    assert!(!RawProperty::text("NOTE", "hello").is_binary());
}

#[test]
fn from_contact_emits_canonical_values() {
    let mut contact = setup();
    contact.birthday = NaiveDate::from_ymd_opt(1980, 2, 29);
    contact.kind = Some(ContactKind::Individual);
    contact.categories = vec!["Friends".into(), "Work".into()];
    contact
        .relationships
        .push(RelationshipEdge::create(contact.id, Id::from_u128(9), "spouse"));

    let raw = RawContact::from_contact(&contact);
    assert_eq!(raw.id, contact.id);
    assert_eq!(raw.source, "icloud");
    assert_eq!(raw.origin.as_deref(), Some("icloud.vcf"));

    let find = |name: &str| raw.properties.iter().find(|p| p.name == name).unwrap();
    assert_eq!(find("TEL").value, PropertyValue::Text("+447980220220".into()));
    assert_eq!(find("TEL").label().as_deref(), Some("cell"));
    assert_eq!(find("BDAY").value, PropertyValue::Text("1980-02-29".into()));
    assert_eq!(find("KIND").value, PropertyValue::Text("individual".into()));
    assert_eq!(
        find("RELATED").value,
        PropertyValue::Text(format!("urn:uuid:{}", Id::<Contact>::from_u128(9)))
    );
    assert_eq!(find("RELATED").param("TYPE"), Some("spouse"));
    assert_eq!(
        find("CATEGORIES").value,
        PropertyValue::Structured(vec!["Friends".into(), "Work".into()])
    );
}

// ==========================================================================
// REPORT TESTS
// ==========================================================================

#[test]
fn diff_of_identical_contacts_is_empty() {
    let contact = setup();
    assert!(diff_contacts(&contact, &contact.clone()).is_empty());
}

#[test]
fn diff_lists_previous_and_new_values() {
    let before = setup();
    let mut after = before.clone();
    after.emails.push(Email::new("jon@work.test", None));
    after.organization = Some("Acme".into());

    let changes = diff_contacts(&before, &after);
    assert_eq!(
        changes,
        vec![
            FieldChange {
                field: "emails".into(),
                previous: vec!["jon@example.com".into()],
                new: vec!["jon@example.com".into(), "jon@work.test".into()],
            },
            FieldChange {
                field: "organization".into(),
                previous: vec![],
                new: vec!["Acme".into()],
            },
        ]
    );
}

#[test]
fn diff_includes_revision() {
    let before = setup();
    let mut after = before.clone();
    after.revision = "2024-01-05T10:15:00.500Z".parse().ok();

    let changes = diff_contacts(&before, &after);
    assert_eq!(
        changes,
        vec![FieldChange {
            field: "revision".into(),
            previous: vec![],
            new: vec!["2024-01-05T10:15:00.500Z".into()],
        }]
    );
}

#[test]
fn diff_compares_canonical_phones() {
    let before = setup();
    let mut after = before.clone();
    after.phones[0].number.raw = "+44 7980 220220".into();
    assert!(diff_contacts(&before, &after).is_empty());
}

#[test]
fn empty_report_renders_summary_only() {
    let report = ChangeReport::default();
    assert!(report.is_empty());
    let text = report.to_text();
    assert!(text.contains("Contacts read in: 0"));
    assert!(!text.contains("Stripped properties:"));
}

#[test]
fn report_text_lists_changes_and_aliases() {
    let report = ChangeReport {
        summary: RunSummary {
            input_records: 2,
            output_contacts: 1,
            duplicate_clusters: 1,
            merged_away: 1,
            ..RunSummary::default()
        },
        contacts: vec![ContactChanges {
            contact: Id::from_u128(1),
            label: "Jon Smith".into(),
            sources: vec!["icloud".into(), "google".into()],
            changes: vec![FieldChange {
                field: "phones".into(),
                previous: vec![],
                new: vec!["+447980220220".into()],
            }],
            also_known_as: vec!["Jonathan Smith".into()],
        }],
        stripped: vec![],
        merges: vec![],
    };
    assert!(!report.is_empty());
    let text = report.to_text();
    assert!(text.contains("Jon Smith:  (sources: icloud, google)"));
    assert!(text.contains("  - phones: [] -> [+447980220220]"));
    assert!(text.contains("  - also seen as: Jonathan Smith"));
    assert!(text.contains("Duplicates merged away: 1"));
}
