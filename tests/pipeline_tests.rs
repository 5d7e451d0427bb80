use abmerge::cli::prompt::PromptDecisionProvider;
use abmerge::config::Settings;
use abmerge::error::DedupeError;
use abmerge::model::*;
use abmerge::ops::merge_ops::AutomaticPolicy;
use abmerge::ops::pipeline_ops::{run, PipelineOutput};
use abmerge::report::StripReason;
use std::io::Cursor;

fn record(n: u128, source: &str) -> RawContact {
    RawContact::new(Id::from_u128(n), source).with_origin(format!("{}.vcf", source))
}

fn related(target: u128) -> String {
    format!("urn:uuid:{}", Id::<Contact>::from_u128(target))
}

fn automatic(records: &[RawContact]) -> PipelineOutput {
    run(records, &Settings::default(), &mut AutomaticPolicy).unwrap()
}

fn ids(output: &PipelineOutput) -> Vec<Id<Contact>> {
    output.contacts.iter().map(|c| c.id).collect()
}

/// A set with no duplicates but plenty for the normalizer to do.
fn messy_records() -> Vec<RawContact> {
    vec![
        record(1, "icloud")
            .text("VERSION", "3.0")
            .text("FN", "jon smith")
            .structured("N", &["SMITH", "jon", "", "", ""])
            .labeled("EMAIL", " Jon@EXAMPLE.com", "HOME")
            .labeled("TEL", "07980 220 220", "cell")
            .labeled("ADR", ";;1 high street;london;;sw1a 1aa;uk", "home")
            .text("BDAY", "19800229")
            .text("REV", "2024-01-05T10:15:00Z")
            .text("CATEGORIES", "Friends,Work")
            .labeled("RELATED", &related(2), "friend")
            .text("X-ABUID", "5D1A")
            .binary("PHOTO", vec![0xff, 0xd8]),
        record(2, "google")
            .text("FN", "Ann Lee")
            .text("EMAIL", "ann@example.org")
            .text("TEL", "0412 345 678")
            .structured("ADR", &["", "", "1 George St", "Sydney", "NSW", "2000", "Australia"])
            .text("NOTE", "  met at the conference ")
            .text("UID", "ann-1"),
        record(3, "protonmail")
            .text("ORG", "Acme Widgets Ltd")
            .text("EMAIL", "info@acme.test")
            .text("TEL", "call reception"),
    ]
}

// ==========================================================================
// SCENARIO TESTS
// ==========================================================================

#[test]
fn shared_email_across_sources_merges() {
    let records = vec![
        record(1, "icloud").text("EMAIL", "jon@example.com"),
        record(2, "protonmail").text("EMAIL", "jon@example.com"),
    ];
    let output = automatic(&records);

    assert_eq!(ids(&output), vec![Id::from_u128(1)]);
    let merged = &output.contacts[0];
    assert_eq!(
        merged.sources.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(),
        vec!["icloud", "protonmail"]
    );

    let summary = &output.report.summary;
    assert_eq!(summary.input_records, 2);
    assert_eq!(summary.output_contacts, 1);
    assert_eq!(summary.duplicate_clusters, 1);
    assert_eq!(summary.cross_source_clusters, 1);
    assert_eq!(summary.merged_away, 1);
    assert_eq!(output.report.merges.len(), 1);
    assert_eq!(output.report.merges[0].outcome, MergeOutcome::Merged);
}

#[test]
fn similar_names_alone_stay_apart() {
    let records = vec![
        record(1, "icloud").text("FN", "Jon Smith"),
        record(2, "google").text("FN", "Jonathan Smith"),
    ];
    let mut settings = Settings::default();
    settings.similarity.name_threshold = 0.6;
    let output = run(&records, &settings, &mut AutomaticPolicy).unwrap();

    assert_eq!(output.contacts.len(), 2);
    assert!(output.report.merges.is_empty());
    assert_eq!(output.report.summary.duplicate_clusters, 0);
}

#[test]
fn chained_signals_collapse_to_one_contact() {
    let records = vec![
        record(1, "icloud").text("EMAIL", "jon@example.com"),
        record(2, "google")
            .text("EMAIL", "jon@example.com")
            .text("TEL", "07980220220"),
        record(3, "protonmail").text("TEL", "+44 7980 220220"),
    ];
    let output = automatic(&records);

    assert_eq!(output.contacts.len(), 1);
    assert_eq!(output.contacts[0].id, Id::from_u128(2));
    assert_eq!(output.report.summary.merged_away, 2);
    assert_eq!(output.report.merges[0].retired.len(), 2);
}

#[test]
fn merged_contact_takes_earliest_member_slot() {
    let records = vec![
        record(1, "icloud").text("FN", "Xavier Quinn"),
        record(2, "icloud").text("EMAIL", "jon@example.com"),
        record(3, "google").text("FN", "Yolanda Park"),
        record(4, "google")
            .text("FN", "Jon Smith")
            .text("EMAIL", "jon@example.com")
            .text("TEL", "07980220220"),
    ];
    let output = automatic(&records);
    assert_eq!(
        ids(&output),
        vec![Id::from_u128(1), Id::from_u128(4), Id::from_u128(3)]
    );
}

#[test]
fn self_card_passes_through_untouched() {
    let records = vec![
        record(1, "icloud")
            .text("FN", "Me Myself")
            .text("EMAIL", "me@example.com")
            .text("KIND", "self"),
        record(2, "google")
            .text("FN", "Me")
            .text("EMAIL", "me@example.com"),
    ];
    let output = automatic(&records);

    assert_eq!(output.contacts.len(), 2);
    assert!(output.contacts[0].is_self());
    assert_eq!(output.report.summary.self_contacts, 1);
    assert!(output.report.merges.is_empty());
}

#[test]
fn relationships_follow_the_survivor() {
    let records = vec![
        record(1, "icloud")
            .text("FN", "Jon Smith")
            .text("EMAIL", "jon@example.com")
            .text("TEL", "07980220220")
            .text("TITLE", "Engineer"),
        record(2, "google")
            .text("FN", "Jonathan Smith")
            .text("EMAIL", "jon@example.com")
            .labeled("RELATED", &related(1), "sibling"),
        record(3, "google")
            .text("FN", "Ann Lee")
            .labeled("RELATED", &related(2), "friend"),
    ];
    let output = automatic(&records);

    assert_eq!(ids(&output), vec![Id::from_u128(1), Id::from_u128(3)]);
    assert!(output.contacts[0].relationships.is_empty());
    assert_eq!(
        output.contacts[1].relationships,
        vec![RelationshipEdge::create(Id::from_u128(3), Id::from_u128(1), "friend")]
    );

    let ann = output
        .report
        .contacts
        .iter()
        .find(|c| c.contact == Id::from_u128(3))
        .unwrap();
    let change = ann.changes.iter().find(|c| c.field == "relationships").unwrap();
    assert_eq!(change.new, vec![format!("friend -> {}", Id::<Contact>::from_u128(1))]);

    let jon = output
        .report
        .contacts
        .iter()
        .find(|c| c.contact == Id::from_u128(1))
        .unwrap();
    assert_eq!(jon.also_known_as, vec!["Jonathan Smith".to_string()]);
    assert_eq!(jon.sources, vec!["icloud".to_string(), "google".to_string()]);
}

#[test]
fn conflicts_are_counted_in_summary() {
    let records = vec![
        record(1, "icloud")
            .text("EMAIL", "jon@example.com")
            .text("ORG", "Acme")
            .text("BDAY", "1980-02-29"),
        record(2, "google")
            .text("EMAIL", "jon@example.com")
            .text("ORG", "Globex")
            .text("BDAY", "1981-03-01"),
    ];
    let output = automatic(&records);
    assert_eq!(output.report.summary.conflicts, 2);
    assert_eq!(output.contacts[0].organization.as_deref(), Some("Acme"));
}

#[test]
fn repeated_record_id_aborts() {
    let records = vec![
        record(1, "icloud").text("FN", "A"),
        record(1, "google").text("FN", "B"),
    ];
    let result = run(&records, &Settings::default(), &mut AutomaticPolicy);
    assert!(matches!(result, Err(DedupeError::ClusterIntegrity(_))));
}

#[test]
fn invalid_threshold_is_rejected() {
    let mut settings = Settings::default();
    settings.similarity.name_threshold = 1.5;
    let result = run(&messy_records(), &settings, &mut AutomaticPolicy);
    assert!(matches!(result, Err(DedupeError::Config(_))));
}

#[test]
fn unknown_default_region_is_rejected() {
    let mut settings = Settings::default();
    settings.default_region = "QQ".into();
    let result = run(&messy_records(), &settings, &mut AutomaticPolicy);
    assert!(matches!(result, Err(DedupeError::UnknownRegion(_))));
}

// ==========================================================================
// REPORT TESTS
// ==========================================================================

#[test]
fn first_pass_reports_normalization() {
    let output = automatic(&messy_records());
    let report = &output.report;

    assert_eq!(report.summary.stripped_properties, 3);
    assert!(report
        .stripped
        .iter()
        .any(|s| s.property == "PHOTO" && s.reason == StripReason::Binary));
    assert_eq!(report.summary.invalid_phones, 1);

    let jon = &output.contacts[0];
    assert_eq!(jon.phones[0].number.canonical, "+447980220220");
    assert_eq!(jon.emails[0].address, "Jon@example.com");
    assert_eq!(jon.kind, Some(ContactKind::Individual));
    assert_eq!(output.contacts[1].phones[0].number.canonical, "+61412345678");
    assert_eq!(output.contacts[2].kind, Some(ContactKind::Organization));

    let changes = &report
        .contacts
        .iter()
        .find(|c| c.contact == Id::from_u128(1))
        .unwrap()
        .changes;
    let phones = changes.iter().find(|c| c.field == "phones").unwrap();
    assert_eq!(phones.previous, vec!["07980 220 220".to_string()]);
    assert_eq!(phones.new, vec!["+447980220220".to_string()]);
}

#[test]
fn second_pass_is_a_no_op() {
    let first = automatic(&messy_records());
    let reemitted: Vec<RawContact> = first.contacts.iter().map(RawContact::from_contact).collect();

    let second = automatic(&reemitted);
    assert!(second.report.is_empty(), "{}", second.report.to_text());
    assert_eq!(
        second
            .contacts
            .iter()
            .map(RawContact::from_contact)
            .collect::<Vec<_>>(),
        reemitted
    );

    let third = automatic(&second.contacts.iter().map(RawContact::from_contact).collect::<Vec<_>>());
    assert_eq!(third.contacts, second.contacts);
}

#[test]
fn sub_second_revision_survives_reemission() {
    let records = vec![record(1, "icloud")
        .text("FN", "Jon Smith")
        .text("REV", "2024-01-05T10:15:00.500Z")];
    let first = automatic(&records);
    let reemitted: Vec<RawContact> = first.contacts.iter().map(RawContact::from_contact).collect();
    assert!(reemitted[0]
        .properties
        .iter()
        .any(|p| p.name == "REV" && p.value == PropertyValue::Text("2024-01-05T10:15:00.500Z".into())));

    let second = automatic(&reemitted);
    assert_eq!(second.contacts[0].revision, first.contacts[0].revision);
    assert!(second.report.is_empty(), "{}", second.report.to_text());
}

#[test]
fn automatic_runs_are_deterministic() {
    let mut records = messy_records();
    records.push(record(4, "google").text("EMAIL", "ann@example.org").text("ORG", "Initech"));
    records.push(record(5, "icloud").text("TEL", "+61 412 345 678").text("FN", "A. Lee"));

    let one = automatic(&records);
    let two = automatic(&records);
    assert_eq!(one.contacts, two.contacts);
    assert_eq!(one.report, two.report);
    assert_eq!(
        serde_json::to_string(&one.contacts).unwrap(),
        serde_json::to_string(&two.contacts).unwrap()
    );
}

// ==========================================================================
// INTERACTIVE TESTS
// ==========================================================================

fn conflicting_pair() -> Vec<RawContact> {
    vec![
        record(1, "icloud")
            .text("FN", "Jon Smith")
            .text("EMAIL", "jon@example.com")
            .text("ORG", "Acme"),
        record(2, "google")
            .text("FN", "Jon Smith")
            .text("EMAIL", "jon@example.com")
            .text("ORG", "Globex"),
    ]
}

#[test]
fn scripted_session_picks_base_and_value() {
    let mut provider = PromptDecisionProvider::new(Cursor::new("2\n2\n"), Vec::new());
    let output = run(&conflicting_pair(), &Settings::default(), &mut provider).unwrap();

    assert_eq!(ids(&output), vec![Id::from_u128(2)]);
    assert_eq!(output.contacts[0].organization.as_deref(), Some("Acme"));
    let conflict = output.report.merges[0].conflicts().next().unwrap();
    assert!(matches!(
        &conflict.resolution,
        Resolution::Conflict {
            policy: ConflictPolicy::Chosen,
            ..
        }
    ));

    let (_, transcript) = provider.into_inner();
    let transcript = String::from_utf8(transcript).unwrap();
    assert!(transcript.contains("Possible duplicates (cluster-0, 2 contacts):"));
    assert!(transcript.contains("Conflicting organization:"));
}

#[test]
fn bad_answers_are_asked_again() {
    let mut provider = PromptDecisionProvider::new(Cursor::new("9\nfoo\n1\n\n"), Vec::new());
    let output = run(&conflicting_pair(), &Settings::default(), &mut provider).unwrap();

    assert_eq!(ids(&output), vec![Id::from_u128(1)]);
    assert_eq!(output.contacts[0].organization.as_deref(), Some("Acme"));
    let (_, transcript) = provider.into_inner();
    let transcript = String::from_utf8(transcript).unwrap();
    assert_eq!(transcript.matches("Please enter a number between 1 and 2").count(), 2);
}

#[test]
fn skipping_leaves_members_unchanged() {
    let records = conflicting_pair();
    let skipped = {
        let mut provider = PromptDecisionProvider::new(Cursor::new("s\n"), Vec::new());
        run(&records, &Settings::default(), &mut provider).unwrap()
    };
    assert_eq!(skipped.contacts.len(), 2);
    assert_eq!(skipped.report.summary.skipped_clusters, 1);
    assert_eq!(skipped.report.merges[0].outcome, MergeOutcome::Skipped);
}

#[test]
fn cancelled_conflict_skips_whole_cluster() {
    let records = conflicting_pair();
    let mut provider = PromptDecisionProvider::new(Cursor::new("1\nc\n"), Vec::new());
    let cancelled = run(&records, &Settings::default(), &mut provider).unwrap();

    let mut eof = PromptDecisionProvider::new(Cursor::new(""), Vec::new());
    let abandoned = run(&records, &Settings::default(), &mut eof).unwrap();

    for output in [&cancelled, &abandoned] {
        assert_eq!(ids(output), vec![Id::from_u128(1), Id::from_u128(2)]);
        assert_eq!(output.contacts[0].organization.as_deref(), Some("Acme"));
        assert_eq!(output.contacts[1].organization.as_deref(), Some("Globex"));
        assert_eq!(output.report.summary.skipped_clusters, 1);
        assert_eq!(output.report.summary.merged_away, 0);
    }
}
