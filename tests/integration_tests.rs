use sales_report_builder::*;
use serde_json::{json, Value};

fn rows(values: Vec<Value>) -> Vec<ReportRow> {
    values
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

fn dispatch_rows() -> Vec<ReportRow> {
    rows(vec![
        json!({"region": "South", "location": "Chennai", "material": "OPC", "qty": "12.5", "gross_value": 1250}),
        json!({"region": "North", "location": "Delhi", "material": "PPC", "qty": 8, "gross_value": 800}),
        json!({"region": "North", "location": "Amritsar", "material": "OPC", "qty": 4, "gross_value": 400}),
        json!({"region": "North", "location": "Delhi", "material": "OPC", "qty": 2, "gross_value": null}),
        json!({"region": "", "location": "Depot 9", "material": "OPC", "qty": 1, "gross_value": "n/a"}),
    ])
}

fn group_of(row: &AggregatedRow) -> Option<String> {
    row.group().map(|g| g.join("/"))
}

#[test]
fn test_location_wise_report_structure() {
    let layout = ReportLayout::location_wise();
    let table = build_report_with_verification(&dispatch_rows(), &layout, 1e-9).unwrap();

    let headers: Vec<String> = table
        .iter()
        .filter(|r| matches!(r, AggregatedRow::GroupHeader { .. }))
        .filter_map(group_of)
        .collect();
    assert_eq!(headers, vec!["North", "Other", "South"]);

    // Delhi's two rows are merged into one data row
    let north: Vec<String> = table
        .iter()
        .filter(|r| r.is_data() && group_of(r).as_deref() == Some("North"))
        .map(|r| r.label("location").unwrap_or_default().to_string())
        .collect();
    assert_eq!(north, vec!["Amritsar", "Delhi"]);

    let delhi = table
        .iter()
        .find(|r| r.label("location") == Some("Delhi"))
        .unwrap();
    assert_eq!(delhi.value("qty"), 10.0);
    assert_eq!(delhi.value("OPC"), 2.0);
    assert_eq!(delhi.value("PPC"), 8.0);
    assert_eq!(delhi.value("gross_value"), 800.0);

    let grand = table.last().unwrap();
    assert!(matches!(grand, AggregatedRow::GrandTotal { .. }));
    assert_eq!(grand.value("qty"), 27.5);
    assert_eq!(grand.value("OPC"), 19.5);
    assert_eq!(grand.value("gross_value"), 2450.0);
}

#[test]
fn test_view_pipeline_search_sort_and_collapse() {
    let layout = ReportLayout::location_wise();
    let table = build_report(&dispatch_rows(), &layout).unwrap();

    let mut state = ViewState::for_layout(&layout, &["OPC".to_string(), "PPC".to_string()]);
    state.expand_all(&table);

    state.set_search("delhi");
    let searched = apply_view(&table, &state);
    let groups: Vec<String> = searched.iter().filter_map(group_of).collect();
    assert!(groups.iter().all(|g| g == "North"));
    assert_eq!(searched.iter().filter(|r| r.is_data()).count(), 1);
    assert!(matches!(searched.last(), Some(AggregatedRow::GrandTotal { .. })));

    state.reset_filters();
    state.sort_by("qty");
    state.sort_by("qty");
    let sorted = apply_view(&table, &state);
    let north: Vec<&str> = sorted
        .iter()
        .filter(|r| r.is_data() && group_of(r).as_deref() == Some("North"))
        .filter_map(|r| r.label("location"))
        .collect();
    assert_eq!(north, vec!["Delhi", "Amritsar"]);

    state.collapse_all();
    let collapsed = apply_view(&table, &state);
    assert!(collapsed.iter().all(|r| !r.is_data()));
    assert_eq!(
        collapsed
            .iter()
            .filter(|r| matches!(r, AggregatedRow::GroupSubtotal { .. }))
            .count(),
        0
    );
}

#[test]
fn test_report_view_drops_stale_loads() {
    let mut view = ReportView::new(ReportLayout::location_wise()).unwrap();

    let first = view.begin_load();
    let second = view.begin_load();

    assert!(view.complete_load(second, Ok(dispatch_rows())));
    assert!(!view.complete_load(
        first,
        Ok(rows(vec![json!({"region": "East", "location": "Kolkata", "qty": 99})]))
    ));

    let rendered = view.render();
    assert!(rendered
        .iter()
        .all(|r| r.group().map_or(true, |g| g[0] != "East")));
    assert_eq!(rendered.last().unwrap().value("qty"), 27.5);
}

#[test]
fn test_rendered_table_as_csv() -> anyhow::Result<()> {
    let layout = ReportLayout::location_wise();
    let mut view = ReportView::new(layout)?;
    let ticket = view.begin_load();
    view.complete_load(ticket, Ok(dispatch_rows()));
    view.state_mut().toggle_column("gross_value");

    let columns = view.visible_columns();
    let csv = TableRenderer::new(&columns).to_csv(&view.render())?;

    let header = csv.lines().next().unwrap_or_default();
    assert!(header.starts_with("Row Type,Region,Location"));
    assert!(!header.contains("Gross Value"));
    assert!(csv.lines().last().unwrap_or_default().starts_with("grand_total,Grand Total"));
    Ok(())
}

#[test]
fn test_layout_schema_is_exposed() -> anyhow::Result<()> {
    let schema = ReportLayout::schema_as_json()?;
    assert!(schema.contains("hierarchy_levels"));
    assert!(schema.contains("derived_metrics"));
    Ok(())
}
