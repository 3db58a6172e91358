use std::sync::{Arc, Mutex};

use erpbridge_core::{CoreError, FieldSchema, FieldType, FieldValue, Filter, LogicalOperator, Row};
use erpbridge_engine::{EngineError, SessionConfig};
use erpbridge_harness::TestSession;
use erpbridge_harness::fixtures::{ACME, GLOBEX, INITECH, ORDER, PARTNER, RETAIL, VIP};
use erpbridge_remote::{SearchOptions, ServerVersion};
use proptest::prelude::*;
use serde_json::json;
use time::macros::{date, datetime};

// ============================================================================
// Schema discovery
// ============================================================================

#[test]
fn discovered_schema_keeps_flags_and_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let fields = partners.fields();

    let name = fields.get("name").ok_or("name missing")?;
    assert!(name.required);
    assert_eq!(name.size, 128);
    assert_eq!(name.description, "Name");

    let label = fields.get("display_label").ok_or("label missing")?;
    assert!(label.computed);
    assert!(label.read_only);
    assert!(!label.stored);

    let notes = fields.get("notes").ok_or("notes missing")?;
    assert!(notes.stored && notes.selectable && !notes.required);
    assert_eq!(notes.size, 64);

    let state = fields.get("state").ok_or("state missing")?;
    assert_eq!(state.field_type, FieldType::Selection);
    assert_eq!(state.selection.len(), 3);

    let parent = fields.get("parent_id").ok_or("parent missing")?;
    assert_eq!(parent.relation, PARTNER);
    Ok(())
}

#[test]
fn state_overrides_are_exposed() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let orders = test.adapter(ORDER)?;
    let schemas = orders.field_schemas(&["state".to_string()])?;
    assert_eq!(schemas.len(), 1);

    let state = schemas.get("state").ok_or("state missing")?;
    let readonly = state.state_properties("readonly");
    assert_eq!(
        readonly,
        vec![
            ("cancel".to_string(), json!(true)),
            ("sale".to_string(), json!(true)),
        ]
    );
    assert!(state.state_properties("required").is_empty());
    Ok(())
}

// ============================================================================
// Read path
// ============================================================================

#[test]
fn read_converts_wire_values() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let rows = partners.read(&[ACME, GLOBEX], &[] as &[&str])?;
    let acme = &rows[0];

    assert_eq!(acme.id(), ACME);
    assert_eq!(acme.get("birthday"), Some(&FieldValue::Date(date!(1970 - 01 - 12))));
    assert_eq!(
        acme.get("last_login"),
        Some(&FieldValue::DateTime(datetime!(2024-03-01 09:30:00)))
    );
    assert_eq!(acme.get("category_id"), Some(&FieldValue::from(vec![RETAIL, VIP])));
    assert_eq!(acme.get("active"), Some(&FieldValue::Boolean(true)));

    // `false` on non-boolean fields and empty lists come back as null.
    assert_eq!(acme.get("parent_id"), Some(&FieldValue::Null));
    assert_eq!(acme.get("child_ids"), Some(&FieldValue::Null));
    assert_eq!(acme.get("notes"), Some(&FieldValue::Null));

    let globex = &rows[1];
    assert_eq!(globex.get("active"), Some(&FieldValue::Boolean(false)));
    assert_eq!(globex.get("birthday"), Some(&FieldValue::Null));
    assert!(acme.changed_fields().is_empty());
    Ok(())
}

#[test]
fn unparsable_dates_read_as_null() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let id = test
        .remote
        .insert(PARTNER, json!({"name": "Odd", "birthday": "sometime in May"}))?;
    let partners = test.partners()?;
    let row = partners.read(&[id], &["birthday"])?.remove(0);
    assert_eq!(row.get("birthday"), Some(&FieldValue::Null));
    Ok(())
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn search_with_coerced_filters() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let names = |filter: Filter| -> Result<Vec<String>, EngineError> {
        Ok(partners
            .search_and_read(&filter, &["name"], &SearchOptions::default())?
            .iter()
            .filter_map(|row| row.get("name").map(FieldValue::to_string))
            .collect())
    };

    assert_eq!(names(Filter::new().add("active", "=", "No")?)?, vec!["Globex"]);
    assert_eq!(names(Filter::new().add("credit_limit", ">=", "250.5")?)?, vec!["Acme", "Globex"]);
    assert_eq!(names(Filter::new().add("parent_id", "=", "1")?)?, vec!["Initech"]);
    assert_eq!(names(Filter::new().add("parent_id", "is null", FieldValue::Null)?)?, vec!["Acme", "Globex"]);
    assert_eq!(names(Filter::new().add("id", "in", "1,3")?)?, vec!["Acme", "Initech"]);
    assert_eq!(
        names(Filter::new().add("birthday", "<", date!(1980 - 01 - 01))?)?,
        vec!["Acme"]
    );
    assert_eq!(
        names(
            Filter::new()
                .operator(LogicalOperator::Not)
                .add("state", "=", "open")?
        )?,
        vec!["Globex", "Initech"]
    );
    Ok(())
}

#[test]
fn in_filter_honours_escaped_commas() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    test.remote.insert(PARTNER, json!({"name": "Smith, Jones"}))?;
    let partners = test.partners()?;

    let filter = Filter::new().add("name", "in", r"Acme,Smith\, Jones")?;
    assert_eq!(
        partners.validate_filter(&filter)?,
        vec![json!(["name", "in", ["Acme", "Smith, Jones"]])]
    );
    assert_eq!(partners.count(&filter)?, 2);
    Ok(())
}

#[test]
fn invalid_filters_are_rejected_locally() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    test.remote.clear_calls();

    let unknown = partners.count(&Filter::new().add("nickname", "=", "x")?);
    assert!(matches!(unknown, Err(EngineError::Core(CoreError::UnknownField(_)))));

    let computed = partners.count(&Filter::new().add("display_label", "=", "x")?);
    assert!(matches!(computed, Err(EngineError::Core(CoreError::ComputedFieldFilter(_)))));

    let boolean = partners.count(&Filter::new().add("active", "=", "maybe")?);
    assert!(matches!(boolean, Err(EngineError::Core(CoreError::UnknownBoolean(_)))));

    let malformed = Filter::from_wire(&json!([["name", "="]]));
    assert!(matches!(malformed, Err(CoreError::MalformedFilter(_))));

    assert!(test.remote.calls().is_empty());
    Ok(())
}

#[test]
fn wire_domains_round_trip_through_normalization() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let filter = Filter::from_wire(&json!(["|", ["name", "=", "Acme"], ["employee_count", "=", "12"]]))?;
    assert_eq!(
        partners.validate_filter(&filter)?,
        vec![json!("|"), json!(["name", "=", "Acme"]), json!(["employee_count", "=", 12])]
    );
    assert_eq!(partners.count(&filter)?, 2);
    Ok(())
}

#[test]
fn paging_and_default_limit() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::with_config(
        ServerVersion::new(9, 0),
        SessionConfig::from_json(r#"{"default_limit": 2}"#)?,
    )?;
    let partners = test.partners()?;
    let all = Filter::new();

    let first_page = partners.search_and_read(&all, &["name"], &SearchOptions::default())?;
    assert_eq!(first_page.len(), 2);

    let options = SearchOptions {
        offset: Some(1),
        limit: Some(5),
        order: Some("name desc".to_string()),
    };
    let rows = partners.search_and_read(&all, &["name"], &options)?;
    let ids: Vec<i64> = rows.iter().map(|row| row.id()).collect();
    assert_eq!(ids, vec![GLOBEX, ACME]);
    assert!(rows.iter().all(|row| row.get("name").is_some() && row.get("state").is_none()));
    Ok(())
}

// ============================================================================
// Write path
// ============================================================================

#[test]
fn write_sends_only_changes_and_listeners_fire() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let mut row = partners.read(&[INITECH], &["name", "state", "category_id"])?.remove(0);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    row.on_change(Box::new(move |field: &FieldSchema, _row: &Row| {
        sink.lock().unwrap().push(field.name.clone());
    }));

    row.put("name", "Initech")?;
    row.put("state", "Closed")?;
    row.put_many2many("category_id", &[VIP], true)?;
    assert_eq!(*seen.lock().unwrap(), vec!["state", "category_id"]);

    assert!(partners.write(&mut row, true)?);
    let stored = test.remote.record(PARTNER, INITECH).ok_or("initech missing")?;
    assert_eq!(stored.get("state"), Some(&json!("closed")));
    assert_eq!(stored.get("category_id"), Some(&json!([VIP])));
    assert!(!partners.write(&mut row, true)?);
    Ok(())
}

#[test]
fn selection_mismatch_names_field_and_value() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let mut row = partners.read(&[ACME], &["state"])?.remove(0);
    row.put("state", "archived")?;

    let err = partners.write(&mut row, true).unwrap_err();
    assert_eq!(
        err.to_string(),
        "core error: no valid value for selection field 'state' with value 'archived'"
    );
    assert!(row.is_changed("state"));
    Ok(())
}

#[test]
fn write_all_reports_each_row() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let mut rows = partners.read(&[ACME, GLOBEX], &["employee_count"])?;
    rows[0].put("employee_count", 121)?;

    assert_eq!(partners.write_all(&mut rows, true)?, vec![true, false]);
    let acme = test.remote.record(PARTNER, ACME).ok_or("acme missing")?;
    assert_eq!(acme.get("employee_count"), Some(&json!(121)));
    Ok(())
}

#[test]
fn created_rows_read_back_equal() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let mut row = partners.new_row(&["name", "birthday", "last_login", "credit_limit", "parent_id"])?;
    row.put("name", "Wayne Enterprises")?;
    row.put("birthday", date!(1939 - 05 - 01))?;
    row.put("last_login", datetime!(2024-02-29 23:59:58))?;
    row.put("credit_limit", "1e6")?;
    row.put("parent_id", vec![FieldValue::from(ACME), FieldValue::from("Acme")])?;
    partners.create(&mut row)?;

    let back = partners.read(&[row.id()], &["birthday", "last_login", "credit_limit", "parent_id"])?;
    assert_eq!(back[0].get("birthday"), row.get("birthday"));
    assert_eq!(back[0].get("last_login"), row.get("last_login"));
    assert_eq!(back[0].get("credit_limit"), Some(&FieldValue::Float(1_000_000.0)));
    assert_eq!(back[0].get("parent_id").and_then(FieldValue::as_id), Some(ACME));
    Ok(())
}

#[test]
fn template_rows_start_clean() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let mut original = partners.read(&[ACME], &["name"])?.remove(0);
    original.put("name", "Acme Corp")?;

    let copy = Row::from_template(&original);
    assert_eq!(copy.get("name"), original.get("name"));
    assert!(copy.changed_fields().is_empty());
    assert_eq!(copy.id(), ACME);
    Ok(())
}

#[test]
fn delete_then_read_is_empty() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestSession::current()?;
    let partners = test.partners()?;
    let row = partners.read(&[GLOBEX], &["name"])?.remove(0);
    assert!(partners.delete(&row)?);
    assert_eq!(partners.count(&Filter::new())?, 2);
    assert!(partners.read(&[GLOBEX], &["name"]).is_err());
    Ok(())
}

proptest! {
    #[test]
    fn putting_the_current_value_is_a_no_op(
        name in "[A-Za-z ]{1,24}",
        employees in 0i64..100_000,
        contact in 1i64..1_000,
    ) {
        let test = TestSession::current().unwrap();
        let partners = test.partners().unwrap();
        let fields = ["name", "employee_count", "child_ids"];
        let mut row = partners.read(&[ACME], &fields).unwrap().remove(0);
        row.put("name", name.as_str()).unwrap();
        row.put("employee_count", employees).unwrap();
        row.put("child_ids", contact).unwrap();
        row.commit();

        for field in fields {
            let current = row.get(field).cloned().unwrap();
            row.put(field, current).unwrap();
        }
        prop_assert!(row.changed_fields().is_empty());
        prop_assert_eq!(
            row.get("child_ids"),
            Some(&FieldValue::List(vec![FieldValue::Integer(contact), FieldValue::Null]))
        );
    }
}
