use crate::normalize::{field_value, hierarchy_label};
use crate::schema::{DerivedMetric, GroupKey, ReportLayout, ReportRow, FALLBACK_GROUP_LABEL};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Summed (and derived) numeric fields of one aggregated row.
pub type Values = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelLabel {
    pub level: String,
    pub value: String,
}

/// One row of the flattened report. The variant is the row kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregatedRow {
    GroupHeader {
        group: GroupKey,
    },
    Data {
        group: GroupKey,
        /// Every hierarchy level of this row, outermost first.
        labels: Vec<LevelLabel>,
        values: Values,
    },
    GroupSubtotal {
        group: GroupKey,
        values: Values,
    },
    GrandTotal {
        values: Values,
    },
}

impl AggregatedRow {
    pub fn group(&self) -> Option<&GroupKey> {
        match self {
            Self::GroupHeader { group }
            | Self::Data { group, .. }
            | Self::GroupSubtotal { group, .. } => Some(group),
            Self::GrandTotal { .. } => None,
        }
    }

    pub fn values(&self) -> Option<&Values> {
        match self {
            Self::GroupHeader { .. } => None,
            Self::Data { values, .. }
            | Self::GroupSubtotal { values, .. }
            | Self::GrandTotal { values } => Some(values),
        }
    }

    /// Numeric value of `field`, zero when the row carries no such field.
    pub fn value(&self, field: &str) -> f64 {
        self.values()
            .and_then(|v| v.get(field))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    /// The label of one hierarchy level on a data row.
    pub fn label(&self, level: &str) -> Option<&str> {
        match self {
            Self::Data { labels, .. } => labels
                .iter()
                .find(|l| l.level == level)
                .map(|l| l.value.as_str()),
            _ => None,
        }
    }

    /// Hierarchy text used for display and search.
    pub fn display_label(&self) -> String {
        match self {
            Self::GroupHeader { group } => group.join(" / "),
            Self::Data { labels, .. } => labels
                .iter()
                .map(|l| l.value.as_str())
                .collect::<Vec<_>>()
                .join(" / "),
            Self::GroupSubtotal { group, .. } => format!("Total {}", group.join(" / ")),
            Self::GrandTotal { .. } => "Grand Total".to_string(),
        }
    }
}

pub struct Aggregator<'a> {
    layout: &'a ReportLayout,
}

impl<'a> Aggregator<'a> {
    pub fn new(layout: &'a ReportLayout) -> Self {
        Self { layout }
    }

    /// Dynamic column names for `rows`: the configured list if one is set, otherwise
    /// every distinct value of the source field, sorted ascending. Values that clash
    /// with a hierarchy, metric or derived field are dropped.
    pub fn dynamic_column_values(&self, rows: &[ReportRow]) -> Vec<String> {
        let Some(dynamic) = &self.layout.dynamic_columns else {
            return Vec::new();
        };

        let candidates: Vec<String> = if dynamic.values.is_empty() {
            rows.iter()
                .map(|row| hierarchy_label(row, &dynamic.source_field))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            dynamic.values.clone()
        };

        candidates
            .into_iter()
            .filter(|value| {
                let reserved = self.layout.is_reserved_field(value);
                if reserved {
                    warn!(
                        "Skipping dynamic column '{}' from '{}': name is already a report field",
                        value, dynamic.source_field
                    );
                }
                !reserved
            })
            .collect()
    }

    pub fn aggregate(&self, rows: &[ReportRow]) -> Vec<AggregatedRow> {
        if rows.is_empty() {
            return Vec::new();
        }

        let dynamic_values = self.dynamic_column_values(rows);
        let template = self.zeroed_values(&dynamic_values);

        // group key -> leaf labels -> summed values; BTreeMap ordering gives the
        // ascending sort on every hierarchy level.
        let mut groups: BTreeMap<GroupKey, BTreeMap<Vec<String>, Values>> = BTreeMap::new();

        for row in rows {
            let labels: Vec<String> = self
                .layout
                .hierarchy_levels
                .iter()
                .map(|level| hierarchy_label(row, level))
                .collect();
            let group = self.group_key(&labels);

            let acc = groups
                .entry(group)
                .or_default()
                .entry(labels)
                .or_insert_with(|| template.clone());

            for field in &self.layout.metric_fields {
                *acc.entry(field.clone()).or_insert(0.0) += field_value(row, field);
            }

            if let Some(dynamic) = &self.layout.dynamic_columns {
                let column = hierarchy_label(row, &dynamic.source_field);
                if dynamic_values.contains(&column) {
                    *acc.entry(column).or_insert(0.0) += field_value(row, &dynamic.value_field);
                }
            }
        }

        debug!(
            "Aggregating {} rows into {} groups ({} dynamic columns)",
            rows.len(),
            groups.len(),
            dynamic_values.len()
        );

        let mut output = Vec::new();
        let mut grand_total = template.clone();

        for (group, members) in groups {
            output.push(AggregatedRow::GroupHeader {
                group: group.clone(),
            });

            let mut subtotal = template.clone();
            for (labels, mut values) in members {
                add_into(&mut subtotal, &values);
                self.apply_derived(&mut values);
                output.push(AggregatedRow::Data {
                    group: group.clone(),
                    labels: self
                        .layout
                        .hierarchy_levels
                        .iter()
                        .cloned()
                        .zip(labels)
                        .map(|(level, value)| LevelLabel { level, value })
                        .collect(),
                    values,
                });
            }

            add_into(&mut grand_total, &subtotal);
            self.apply_derived(&mut subtotal);
            output.push(AggregatedRow::GroupSubtotal {
                group,
                values: subtotal,
            });
        }

        self.apply_derived(&mut grand_total);
        output.push(AggregatedRow::GrandTotal {
            values: grand_total,
        });

        info!("Built report table with {} rows", output.len());

        output
    }

    fn group_key(&self, labels: &[String]) -> GroupKey {
        match labels.len() {
            0 => vec![FALLBACK_GROUP_LABEL.to_string()],
            1 => labels.to_vec(),
            n => labels[..n - 1].to_vec(),
        }
    }

    fn zeroed_values(&self, dynamic_values: &[String]) -> Values {
        self.layout
            .metric_fields
            .iter()
            .chain(dynamic_values)
            .map(|f| (f.clone(), 0.0))
            .collect()
    }

    fn apply_derived(&self, values: &mut Values) {
        for derived in &self.layout.derived_metrics {
            let numerator = values.get(&derived.numerator).copied().unwrap_or(0.0);
            let denominator = values.get(&derived.denominator).copied().unwrap_or(0.0);
            values.insert(
                derived.field.clone(),
                DerivedMetric::compute(numerator, denominator),
            );
        }
    }
}

fn add_into(target: &mut Values, source: &Values) {
    for (field, value) in source {
        *target.entry(field.clone()).or_insert(0.0) += value;
    }
}

pub fn aggregate(rows: &[ReportRow], layout: &ReportLayout) -> Vec<AggregatedRow> {
    Aggregator::new(layout).aggregate(rows)
}

/// Every group key present in `rows`, in sequence order.
pub fn group_keys(rows: &[AggregatedRow]) -> Vec<GroupKey> {
    rows.iter()
        .filter_map(|row| match row {
            AggregatedRow::GroupHeader { group } => Some(group.clone()),
            _ => None,
        })
        .collect()
}
