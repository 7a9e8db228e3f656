/// CSV and JSON snapshots of the visible station list
use crate::domain::StationFeature;
use crate::errors::{ApiError, ApiResult};
use crate::utils::{format_address, format_power_range};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn filename(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "albania-charging-stations.csv",
            ExportFormat::Json => "albania-charging-stations.json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv;charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV",
            ExportFormat::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub id: i64,
    pub title: String,
    pub address: String,
    pub operator: String,
    pub status: String,
    pub usage: String,
    pub power: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ExportRow {
    pub fn from_feature(feature: &StationFeature) -> Self {
        let properties = &feature.properties;
        let position = feature.position();
        Self {
            id: properties.id,
            title: properties
                .title
                .clone()
                .unwrap_or_else(|| "Unknown station".to_string()),
            address: format_address(properties),
            operator: properties
                .operator_info
                .as_ref()
                .and_then(|o| o.title.clone())
                .unwrap_or_else(|| "Unknown operator".to_string()),
            status: properties
                .status_type
                .as_ref()
                .and_then(|s| s.title.clone())
                .unwrap_or_else(|| "Unknown status".to_string()),
            usage: properties
                .usage_type
                .as_ref()
                .and_then(|u| u.title.clone())
                .unwrap_or_else(|| "Unknown usage".to_string()),
            power: format_power_range(properties).unwrap_or_else(|| "Unspecified".to_string()),
            latitude: position.map(|p| p.lat),
            longitude: position.map(|p| p.lng),
        }
    }

    fn csv_fields(&self) -> [String; 9] {
        let coord = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        [
            self.id.to_string(),
            self.title.clone(),
            self.address.clone(),
            self.operator.clone(),
            self.status.clone(),
            self.usage.clone(),
            self.power.clone(),
            coord(self.latitude),
            coord(self.longitude),
        ]
    }
}

/// Rendered download
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub format: ExportFormat,
    pub body: String,
}

/// Export the visible list; an empty list is reported instead of producing an empty file
pub fn export(visible: &[StationFeature], format: ExportFormat) -> ApiResult<ExportFile> {
    if visible.is_empty() {
        return Err(ApiError::NothingToExport);
    }

    let rows: Vec<ExportRow> = visible.iter().map(ExportRow::from_feature).collect();
    let body = match format {
        ExportFormat::Csv => to_csv(&rows),
        ExportFormat::Json => serde_json::to_string_pretty(&rows)
            .map_err(|e| ApiError::Internal(format!("JSON export failed: {}", e)))?,
    };

    Ok(ExportFile { format, body })
}

const CSV_HEADERS: [&str; 9] = [
    "ID",
    "Title",
    "Address",
    "Operator",
    "Status",
    "Usage",
    "Power",
    "Latitude",
    "Longitude",
];

pub fn to_csv(rows: &[ExportRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(CSV_HEADERS.join(","));
    for row in rows {
        let line = row
            .csv_fields()
            .iter()
            .map(|value| format!("\"{}\"", value.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{connection, StationBuilder};

    #[test]
    fn test_empty_visible_set_is_reported() {
        let err = export(&[], ExportFormat::Csv).unwrap_err();
        assert!(matches!(err, ApiError::NothingToExport));
        assert!(export(&[], ExportFormat::Json).is_err());
    }

    #[test]
    fn test_csv_quotes_and_doubles_inner_quotes() {
        let station = StationBuilder::new(5, "The \"Green\" Hub")
            .at(41.5, 19.5)
            .operator(3, "Eco Charge")
            .town("Tirana")
            .connection(connection(33, 3, Some(22.0)))
            .connection(connection(33, 3, Some(50.0)))
            .build();

        let file = export(&[station], ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = file.body.lines().collect();
        assert_eq!(
            lines[0],
            "ID,Title,Address,Operator,Status,Usage,Power,Latitude,Longitude"
        );
        assert_eq!(
            lines[1],
            "\"5\",\"The \"\"Green\"\" Hub\",\"Tirana\",\"Eco Charge\",\"Unknown status\",\"Unknown usage\",\"22–50 kW\",\"41.5\",\"19.5\""
        );
        assert_eq!(file.format.filename(), "albania-charging-stations.csv");
    }

    #[test]
    fn test_json_export_fields() {
        let station = StationBuilder::new(8, "Korçë").at(40.6186, 20.7808).build();
        let file = export(&[station], ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&file.body).unwrap();

        assert_eq!(value[0]["id"], 8);
        assert_eq!(value[0]["title"], "Korçë");
        assert_eq!(value[0]["power"], "Unspecified");
        assert_eq!(value[0]["operator"], "Unknown operator");
        assert_eq!(value[0]["latitude"], 40.6186);
        assert_eq!(file.format.content_type(), "application/json");
    }
}
