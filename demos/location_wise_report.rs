use sales_report_builder::{
    build_report_with_verification, ReportLayout, ReportRow, ReportView, TableRenderer,
};
use serde_json::json;

fn sample_rows() -> Vec<ReportRow> {
    [
        json!({"region": "North", "location": "Delhi", "material": "OPC 53", "qty": 120, "prev_day_sale": 14, "curr_day_sale": 18, "cumm_day_sale": 120, "gross_value": "540000"}),
        json!({"region": "North", "location": "Delhi", "material": "PPC", "qty": 80, "prev_day_sale": 9, "curr_day_sale": 6, "cumm_day_sale": 80, "gross_value": 312000}),
        json!({"region": "North", "location": "Amritsar", "material": "OPC 53", "qty": "45.5", "prev_day_sale": 3, "curr_day_sale": 5, "cumm_day_sale": 45.5, "gross_value": 204750}),
        json!({"region": "South", "location": "Chennai", "material": "PPC", "qty": 210, "prev_day_sale": 22, "curr_day_sale": 19, "cumm_day_sale": 210, "gross_value": 819000}),
        json!({"region": "South", "location": "Bengaluru", "material": "OPC 43", "qty": 64, "prev_day_sale": null, "curr_day_sale": 8, "cumm_day_sale": 64, "gross_value": 262400}),
        json!({"region": null, "location": "Transit Depot", "material": "PPC", "qty": 12, "gross_value": 46800}),
    ]
    .into_iter()
    .filter_map(|v| v.as_object().cloned())
    .collect()
}

fn main() {
    env_logger::init();

    let layout = ReportLayout::location_wise();
    let rows = sample_rows();

    let table = build_report_with_verification(&rows, &layout, 1e-6)
        .expect("sample rows should aggregate cleanly");
    println!("Aggregated {} source rows into {} report rows\n", rows.len(), table.len());

    let mut view = ReportView::new(layout).expect("preset layout is valid");
    let ticket = view.begin_load();
    view.complete_load(ticket, Ok(rows));

    println!("## Full report\n");
    let columns = view.visible_columns();
    println!("{}", TableRenderer::new(&columns).to_markdown(&view.render()));

    println!("## Search \"chennai\", sorted by quantity (descending)\n");
    {
        let state = view.state_mut();
        state.set_search("chennai");
        state.sort_by("qty");
        state.sort_by("qty");
    }
    println!("{}", TableRenderer::new(&columns).to_markdown(&view.render()));

    println!("## North collapsed, gross value hidden\n");
    {
        let state = view.state_mut();
        state.reset_filters();
        state.toggle_group(&vec!["North".to_string()]);
        state.toggle_column("gross_value");
    }
    let columns = view.visible_columns();
    match TableRenderer::new(&columns).to_csv(&view.render()) {
        Ok(csv) => println!("{}", csv),
        Err(e) => eprintln!("Failed to render CSV: {}", e),
    }
}
