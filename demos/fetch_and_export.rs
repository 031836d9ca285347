use chrono::Local;
use dotenv::dotenv;
use futures::future;
use log::info;
use sales_report_builder::{
    export_filename, ClientConfig, ExportFormat, FileSessionStore, FilterCriteria, MetaLookup,
    ReportClient, ReportEndpoint, ReportLayout, ReportView, SessionStore, TableRenderer,
};
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let config = ClientConfig::from_env()?;
    let session = Arc::new(FileSessionStore::new(
        std::env::var("REPORT_SESSION_FILE").unwrap_or_else(|_| ".report-session.json".to_string()),
    ));
    if let Ok(token) = std::env::var("REPORT_API_TOKEN") {
        session.set_token(&token)?;
    }

    let client = ReportClient::new(config, session)?;
    let criteria = FilterCriteria::month_to_date(Local::now().date_naive())
        .with_division(std::env::var("REPORT_DIVISION").unwrap_or_default());
    let endpoint = ReportEndpoint::new("location-wise-dispatch");

    let (groups, divisions) = future::try_join(
        client.fetch_lookup(MetaLookup::SalesGroups, &criteria),
        client.fetch_lookup(MetaLookup::Divisions, &criteria),
    )
    .await?;
    info!("{} sales groups, {} divisions available", groups.len(), divisions.len());

    let mut view = ReportView::new(ReportLayout::location_wise())?;
    let ticket = view.begin_load();
    let result = client.fetch_report(&endpoint, &criteria).await;
    view.complete_load(ticket, result);

    if let Some(error) = view.last_error() {
        eprintln!("Report load failed: {}", error);
        return Ok(());
    }

    let columns = view.visible_columns();
    println!("{}", TableRenderer::new(&columns).to_markdown(&view.render()));

    let filename = export_filename(
        &endpoint.path,
        ExportFormat::Excel,
        &criteria.date_from,
        &criteria.date_to,
    );
    let path = client
        .export_to(&endpoint, &criteria, ExportFormat::Excel, &filename)
        .await?;
    println!("Excel export saved to {}", path.display());

    Ok(())
}
