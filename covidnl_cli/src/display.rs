use comfy_table::{presets::NOTHING, *};
use covidnl::{country::CountrySeries, trend::TrendSeries, PipelineSummary, COL};
use itertools::izip;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

pub fn display_summary(summary: &PipelineSummary) {
    let mut table = new_table();
    table
        .add_row(vec![
            Cell::new("Municipalities").add_attribute(Attribute::Bold),
            summary.municipalities.into(),
        ])
        .add_row(vec![
            Cell::new("Days").add_attribute(Attribute::Bold),
            summary.days.into(),
        ])
        .add_row(vec![
            Cell::new(format!("Confirmed on {}", summary.as_of)).add_attribute(Attribute::Bold),
            format!("{}", summary.confirmed_as_of).into(),
        ])
        .add_row(vec![
            Cell::new("Wide export").add_attribute(Attribute::Bold),
            summary.wide_export.display().to_string().into(),
        ])
        .add_row(vec![
            Cell::new("Long export").add_attribute(Attribute::Bold),
            summary.long_export.display().to_string().into(),
        ])
        .add_row(vec![
            Cell::new("Intermediate table").add_attribute(Attribute::Bold),
            summary.wide_table.display().to_string().into(),
        ]);
    if let Some(column) = table.column_mut(0) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    println!("\n{}", table);

    if !summary.unresolved.is_empty() {
        println!(
            "\n{} municipalities have no coordinates and were exported at 0.0, 0.0:",
            summary.unresolved.len()
        );
        for city in &summary.unresolved {
            println!("  {city}");
        }
    }
}

/// Prints the last `rows` days of the national trend.
pub fn display_trend_tail(series: &TrendSeries, rows: usize) {
    let mut table = new_table();
    table.set_header(header(&[COL::DATE, COL::CONFIRMED, COL::DELTA, COL::INFLECTION]));
    let skip = series.len().saturating_sub(rows);
    for (date, confirmed, delta, inflection) in izip!(
        &series.dates,
        &series.confirmed,
        &series.delta,
        &series.inflection
    )
    .skip(skip)
    {
        table.add_row(vec![
            date.to_string(),
            confirmed.to_string(),
            delta.to_string(),
            format!("{inflection:.3}"),
        ]);
    }
    println!("\n{}", table);
}

/// Prints the last `rows` days of a country series.
pub fn display_country_tail(series: &CountrySeries, rows: usize) -> anyhow::Result<()> {
    let df = series.to_dataframe()?.tail(Some(rows));
    let mut table = new_table();
    table.set_header(header(&[
        COL::DATE,
        COL::CONFIRMED,
        COL::DEATHS,
        COL::RECOVERED,
        COL::DEATH_RATE,
    ]));
    for (date, confirmed, deaths, recovered, death_rate) in izip!(
        df.column(COL::DATE)?.date()?.as_date_iter(),
        df.column(COL::CONFIRMED)?.f64()?,
        df.column(COL::DEATHS)?.f64()?,
        df.column(COL::RECOVERED)?.f64()?,
        df.column(COL::DEATH_RATE)?.f64()?,
    ) {
        table.add_row(vec![
            date.map(|date| date.to_string()).unwrap_or_default(),
            confirmed.unwrap_or_default().to_string(),
            deaths.unwrap_or_default().to_string(),
            recovered.unwrap_or_default().to_string(),
            format!("{:.2}", death_rate.unwrap_or_default()),
        ]);
    }
    println!("\n{} ({} days)", series.country, series.len());
    println!("{}", table);
    Ok(())
}
