// src/record.rs

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// CSV columns, in output order.
pub const CSV_HEADERS: [&str; 12] = [
    "filename",
    "provider",
    "account_number",
    "start_date",
    "end_date",
    "kWh_usage",
    "cost_per_kWh",
    "service_charge",
    "reading_type",
    "amount_due",
    "tariff_split",
    "notes",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadingType {
    Actual,
    Estimated,
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingType::Actual => f.write_str("Actual"),
            ReadingType::Estimated => f.write_str("Estimated"),
        }
    }
}

/// Electricity fields of one bill, already normalized.
///
/// `None` / empty string means the model could not find the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillFields {
    pub provider: String,
    pub account_number: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(rename = "kWh_usage")]
    pub kwh_usage: Option<f64>,
    #[serde(rename = "cost_per_kWh")]
    pub cost_per_kwh: Option<f64>,
    pub service_charge: Option<f64>,
    pub reading_type: Option<ReadingType>,
    pub amount_due: Option<f64>,
    pub tariff_split: bool,
    pub notes: String,
}

impl BillFields {
    /// How many of the scalar fields were filled (tariff flag excluded).
    pub fn coverage(&self) -> (usize, usize) {
        let total = 9;
        let filled = [
            !self.provider.is_empty(),
            !self.account_number.is_empty(),
            self.start_date.is_some(),
            self.end_date.is_some(),
            self.kwh_usage.is_some(),
            self.cost_per_kwh.is_some(),
            self.service_charge.is_some(),
            self.reading_type.is_some(),
            self.amount_due.is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, total)
    }

    /// Column values after `filename`, matching `CSV_HEADERS[1..]`.
    fn csv_values(&self) -> Vec<String> {
        vec![
            self.provider.clone(),
            self.account_number.clone(),
            fmt_date(self.start_date),
            fmt_date(self.end_date),
            fmt_number(self.kwh_usage),
            fmt_number(self.cost_per_kwh),
            fmt_number(self.service_charge),
            self.reading_type.map(|r| r.to_string()).unwrap_or_default(),
            fmt_number(self.amount_due),
            self.tariff_split.to_string(),
            self.notes.clone(),
        ]
    }
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn fmt_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Either the bill's fields or the reason there are none.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Bill(BillFields),
    Failed(String),
}

/// One output row. Built once per input file and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BillRecord {
    pub filename: String,
    pub outcome: Outcome,
}

impl BillRecord {
    pub fn bill(filename: impl Into<String>, fields: BillFields) -> Self {
        Self {
            filename: filename.into(),
            outcome: Outcome::Bill(fields),
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            filename: filename.into(),
            outcome: Outcome::Failed(error.to_string()),
        }
    }

    pub fn fields(&self) -> Option<&BillFields> {
        match &self.outcome {
            Outcome::Bill(fields) => Some(fields),
            Outcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Bill(_) => None,
            Outcome::Failed(e) => Some(e),
        }
    }

    /// The 12 `CSV_HEADERS` columns; all but `filename` are blank for a failed record.
    pub fn csv_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(CSV_HEADERS.len());
        row.push(self.filename.clone());
        match &self.outcome {
            Outcome::Bill(fields) => row.extend(fields.csv_values()),
            Outcome::Failed(_) => row.resize(CSV_HEADERS.len(), String::new()),
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn march_bill() -> BillFields {
        BillFields {
            provider: "City of Cape Town".to_string(),
            account_number: "113220507".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31),
            kwh_usage: Some(59154.37),
            cost_per_kwh: Some(2.34),
            service_charge: Some(2495.5),
            reading_type: Some(ReadingType::Actual),
            amount_due: Some(162836.21),
            tariff_split: false,
            notes: String::new(),
        }
    }

    #[test]
    fn test_bill_row() {
        let record = BillRecord::bill("march.pdf", march_bill());
        assert_eq!(
            record.csv_row(),
            vec![
                "march.pdf",
                "City of Cape Town",
                "113220507",
                "2024-03-01",
                "2024-03-31",
                "59154.37",
                "2.34",
                "2495.5",
                "Actual",
                "162836.21",
                "false",
                "",
            ]
        );
        assert_eq!(record.error(), None);
    }

    #[test]
    fn test_failed_row_is_blank_but_filename() {
        let record = BillRecord::failed("bad.pdf", "No readable text found in PDF");
        let row = record.csv_row();
        assert_eq!(row.len(), CSV_HEADERS.len());
        assert_eq!(row[0], "bad.pdf");
        assert!(row[1..].iter().all(String::is_empty));
        assert_eq!(record.error(), Some("No readable text found in PDF"));
        assert!(record.fields().is_none());
    }

    #[test]
    fn test_coverage() {
        let mut fields = march_bill();
        assert_eq!(fields.coverage(), (9, 9));
        fields.cost_per_kwh = None;
        fields.provider.clear();
        assert_eq!(fields.coverage(), (7, 9));
    }

    #[test]
    fn test_serializes_with_csv_names() {
        let json = serde_json::to_value(march_bill()).unwrap();
        assert_eq!(json["kWh_usage"], 59154.37);
        assert_eq!(json["cost_per_kWh"], 2.34);
        assert_eq!(json["start_date"], "2024-03-01");
        assert_eq!(json["reading_type"], "Actual");
    }
}
