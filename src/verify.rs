use crate::engine::{AggregatedRow, Values};
use crate::error::{ReportError, Result};
use crate::schema::{DerivedMetric, ReportLayout};

/// Checks the structural and arithmetic invariants of an aggregated sequence.
pub struct TotalsVerifier<'a> {
    layout: &'a ReportLayout,
}

impl<'a> TotalsVerifier<'a> {
    pub fn new(layout: &'a ReportLayout) -> Self {
        Self { layout }
    }

    pub fn verify(&self, rows: &[AggregatedRow], tolerance: f64) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut open_group = None;
        let mut group_sum = Values::new();
        let mut subtotal_sum = Values::new();
        let mut grand_total = None;

        for (idx, row) in rows.iter().enumerate() {
            if grand_total.is_some() {
                return Err(ReportError::InvalidStructure(format!(
                    "row {} follows the grand total",
                    idx
                )));
            }

            match row {
                AggregatedRow::GroupHeader { group } => {
                    if let Some(open) = &open_group {
                        return Err(ReportError::InvalidStructure(format!(
                            "group {:?} starts before group {:?} was closed",
                            group, open
                        )));
                    }
                    open_group = Some(group.clone());
                    group_sum.clear();
                }
                AggregatedRow::Data { group, values, .. } => {
                    if open_group.as_ref() != Some(group) {
                        return Err(ReportError::InvalidStructure(format!(
                            "data row {} for {:?} is outside its group",
                            idx, group
                        )));
                    }
                    self.check_derived(&format!("row {}", idx), values, tolerance)?;
                    self.accumulate(&mut group_sum, values);
                }
                AggregatedRow::GroupSubtotal { group, values } => {
                    if open_group.as_ref() != Some(group) {
                        return Err(ReportError::InvalidStructure(format!(
                            "subtotal for {:?} has no matching header",
                            group
                        )));
                    }
                    let scope = format!("subtotal {}", group.join(" / "));
                    self.compare(&scope, &group_sum, values, tolerance)?;
                    self.check_derived(&scope, values, tolerance)?;
                    self.accumulate(&mut subtotal_sum, values);
                    open_group = None;
                }
                AggregatedRow::GrandTotal { values } => {
                    if let Some(open) = &open_group {
                        return Err(ReportError::InvalidStructure(format!(
                            "grand total reached while group {:?} is open",
                            open
                        )));
                    }
                    self.compare("grand total", &subtotal_sum, values, tolerance)?;
                    self.check_derived("grand total", values, tolerance)?;
                    grand_total = Some(values);
                }
            }
        }

        if grand_total.is_none() {
            return Err(ReportError::InvalidStructure(
                "sequence has no grand total".to_string(),
            ));
        }

        Ok(())
    }

    fn is_derived(&self, field: &str) -> bool {
        self.layout.derived_metrics.iter().any(|d| d.field == field)
    }

    fn accumulate(&self, target: &mut Values, source: &Values) {
        for (field, value) in source {
            if !self.is_derived(field) {
                *target.entry(field.clone()).or_insert(0.0) += value;
            }
        }
    }

    fn compare(&self, scope: &str, expected: &Values, actual: &Values, tolerance: f64) -> Result<()> {
        for (field, &sum) in expected {
            let found = actual.get(field).copied().unwrap_or(0.0);
            if (sum - found).abs() > tolerance {
                return Err(ReportError::TotalsMismatch {
                    scope: scope.to_string(),
                    field: field.clone(),
                    expected: sum,
                    actual: found,
                });
            }
        }
        Ok(())
    }

    fn check_derived(&self, scope: &str, values: &Values, tolerance: f64) -> Result<()> {
        for derived in &self.layout.derived_metrics {
            let numerator = values.get(&derived.numerator).copied().unwrap_or(0.0);
            let denominator = values.get(&derived.denominator).copied().unwrap_or(0.0);
            let expected = DerivedMetric::compute(numerator, denominator);
            let found = values.get(&derived.field).copied().unwrap_or(0.0);

            if (expected - found).abs() > tolerance {
                return Err(ReportError::TotalsMismatch {
                    scope: scope.to_string(),
                    field: derived.field.clone(),
                    expected,
                    actual: found,
                });
            }
        }
        Ok(())
    }
}

pub fn verify_totals(rows: &[AggregatedRow], layout: &ReportLayout, tolerance: f64) -> Result<()> {
    TotalsVerifier::new(layout).verify(rows, tolerance)
}
