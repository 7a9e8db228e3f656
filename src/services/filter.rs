/// Client-side filter engine over fetched station features
use crate::domain::{FilterState, StationFeature, StationProperties};
use crate::utils::{format_address, power_range};
use std::collections::HashSet;

/// Stations that pass every active predicate of `filters`
pub fn visible_stations(stations: &[StationFeature], filters: &FilterState) -> Vec<StationFeature> {
    let compiled = CompiledFilter::new(filters);
    stations
        .iter()
        .filter(|feature| compiled.matches(&feature.properties))
        .cloned()
        .collect()
}

/// Filter state prepared for repeated matching
pub struct CompiledFilter {
    query: String,
    operators: HashSet<i64>,
    connection_types: HashSet<i64>,
    levels: HashSet<i64>,
    usage_types: HashSet<i64>,
    status_types: HashSet<i64>,
    operational_only: bool,
    power_min: Option<f64>,
    power_max: Option<f64>,
}

impl CompiledFilter {
    pub fn new(filters: &FilterState) -> Self {
        let set = |ids: &[i64]| ids.iter().copied().collect::<HashSet<_>>();
        Self {
            query: filters.search.trim().to_lowercase(),
            operators: set(&filters.operator_ids),
            connection_types: set(&filters.connection_type_ids),
            levels: set(&filters.level_ids),
            usage_types: set(&filters.usage_type_ids),
            status_types: set(&filters.status_type_ids),
            operational_only: filters.operational_only,
            power_min: filters.power_min.filter(|v| v.is_finite()),
            power_max: filters.power_max.filter(|v| v.is_finite()),
        }
    }

    pub fn matches(&self, properties: &StationProperties) -> bool {
        self.matches_text(properties)
            && member(&self.operators, properties.operator_info.as_ref().and_then(|o| o.id))
            && member(&self.usage_types, properties.usage_type.as_ref().and_then(|u| u.id))
            && member(&self.status_types, properties.status_type.as_ref().and_then(|s| s.id))
            && any_member(
                &self.connection_types,
                properties
                    .connections
                    .iter()
                    .filter_map(|c| c.connection_type.as_ref().and_then(|t| t.id)),
            )
            && any_member(
                &self.levels,
                properties
                    .connections
                    .iter()
                    .filter_map(|c| c.level.as_ref().and_then(|l| l.id)),
            )
            && self.matches_operational(properties)
            && self.matches_power(properties)
    }

    fn matches_text(&self, properties: &StationProperties) -> bool {
        if self.query.is_empty() {
            return true;
        }
        let title = properties.title.as_deref().unwrap_or_default().to_lowercase();
        let operator = properties
            .operator_info
            .as_ref()
            .and_then(|o| o.title.as_deref())
            .unwrap_or_default()
            .to_lowercase();
        let address = format_address(properties).to_lowercase();

        title.contains(&self.query)
            || operator.contains(&self.query)
            || address.contains(&self.query)
    }

    fn matches_operational(&self, properties: &StationProperties) -> bool {
        !self.operational_only
            || properties
                .status_type
                .as_ref()
                .and_then(|s| s.is_operational)
                .unwrap_or(false)
    }

    /// Connection power range must overlap `[min, max]`; unknown power fails any bound
    fn matches_power(&self, properties: &StationProperties) -> bool {
        if self.power_min.is_none() && self.power_max.is_none() {
            return true;
        }
        let Some((lowest, highest)) = power_range(properties) else {
            return false;
        };
        if let Some(min) = self.power_min {
            if highest < min {
                return false;
            }
        }
        if let Some(max) = self.power_max {
            if lowest > max {
                return false;
            }
        }
        true
    }
}

/// Empty selection is no constraint
fn member(selected: &HashSet<i64>, id: Option<i64>) -> bool {
    selected.is_empty() || id.is_some_and(|id| selected.contains(&id))
}

fn any_member(selected: &HashSet<i64>, mut ids: impl Iterator<Item = i64>) -> bool {
    selected.is_empty() || ids.any(|id| selected.contains(&id))
}
