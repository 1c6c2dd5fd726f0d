//! Dataset descriptor and correlation summary
//!
//! These are the shapes the analysis backend produces for an uploaded file.
//! They are carried in the session and persisted alongside a trained model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One preview row: column name to cell value
pub type PreviewRow = Map<String, Value>;

/// Structured summary of an uploaded tabular file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Name of the uploaded file
    pub filename: String,

    /// Number of data rows
    pub rows: usize,

    /// Number of columns
    pub columns: usize,

    /// Column names in file order
    pub column_names: Vec<String>,

    /// First rows of the file
    #[serde(default)]
    pub preview: Vec<PreviewRow>,

    /// Detected text encoding
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Detected field separator
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Per-column statistics computed by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_summary: Option<DataSummary>,

    /// Upload metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileInfo>,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_separator() -> String {
    ",".to_string()
}

impl DatasetInfo {
    /// Build a descriptor from a backend data summary
    ///
    /// `fallback_filename` is used when the backend did not echo file info.
    pub fn from_summary(
        summary: DataSummary,
        file_info: Option<FileInfo>,
        fallback_filename: &str,
    ) -> Self {
        let filename = file_info
            .as_ref()
            .map(|info| info.filename.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| fallback_filename.to_string());
        let encoding = file_info
            .as_ref()
            .map(|info| info.encoding.clone())
            .unwrap_or_else(default_encoding);
        let separator = file_info
            .as_ref()
            .map(|info| info.separator.clone())
            .unwrap_or_else(default_separator);

        DatasetInfo {
            filename,
            rows: summary.shape.rows,
            columns: summary.shape.columns,
            column_names: summary.columns.clone(),
            preview: summary.preview.clone(),
            encoding,
            separator,
            data_summary: Some(summary),
            file_info,
        }
    }

    /// Whether `name` is one of the dataset's columns
    pub fn has_column(&self, name: &str) -> bool {
        self.column_names.iter().any(|column| column == name)
    }

    /// Statistics for a single column, when the backend provided them
    pub fn column_summary(&self, name: &str) -> Option<&ColumnSummary> {
        self.data_summary
            .as_ref()?
            .columns_summary
            .iter()
            .find(|summary| summary.column == name)
    }
}

/// Upload metadata echoed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

/// Whole-dataset statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub shape: Shape,
    pub columns: Vec<String>,
    #[serde(default)]
    pub data_types: BTreeMap<String, String>,
    #[serde(default)]
    pub memory_usage_mb: f64,
    #[serde(default)]
    pub missing_values_percent: String,
    #[serde(default)]
    pub numeric_columns_count: usize,
    #[serde(default)]
    pub categorical_columns_count: usize,
    #[serde(default)]
    pub preview: Vec<PreviewRow>,
    #[serde(default)]
    pub columns_summary: Vec<ColumnSummary>,
}

/// Statistics for one column
///
/// Numeric columns carry the moments, quartiles, outlier bounds, a normality
/// test and a histogram; categorical columns carry their top categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub dtype: String,
    #[serde(default)]
    pub non_null_count: usize,
    #[serde(default)]
    pub missing_percent: String,
    #[serde(default)]
    pub unique_values: usize,
    #[serde(default)]
    pub nan_percentage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(rename = "25%", default, skip_serializing_if = "Option::is_none")]
    pub q1: Option<f64>,
    #[serde(rename = "50%", default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(rename = "75%", default, skip_serializing_if = "Option::is_none")]
    pub q3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outliers_detection: Option<OutlierBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normality_test: Option<NormalityTest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram_data: Option<Histogram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_categories: Option<TopCategories>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq: Option<u64>,
}

impl ColumnSummary {
    /// Numeric columns are the ones the backend computed a mean for
    pub fn is_numeric(&self) -> bool {
        self.mean.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub method: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub outliers_count: u64,
    pub outliers_percentage: f64,
    pub has_outliers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityTest {
    pub test_name: String,
    pub statistic: f64,
    pub p_value: f64,
    pub is_normal: bool,
    pub interpretation: String,
    pub alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub n_bins: usize,
    pub bin_edges: Vec<f64>,
    pub frequencies: Vec<u64>,
    pub bin_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCategories {
    pub top_n: usize,
    pub values: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: u64,
    pub percentage: f64,
}

/// Statistical method a coefficient was computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    pub const ALL: [CorrelationMethod; 3] = [
        CorrelationMethod::Pearson,
        CorrelationMethod::Spearman,
        CorrelationMethod::Kendall,
    ];
}

/// Coefficient and p-value for one method; either may be missing
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coefficient {
    pub correlation: Option<f64>,
    pub p_value: Option<f64>,
}

/// Pairwise correlation between two variables under all three methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub variable_1: String,
    pub variable_2: String,
    #[serde(default)]
    pub pearson: Coefficient,
    #[serde(default)]
    pub spearman: Coefficient,
    #[serde(default)]
    pub kendall: Coefficient,
    #[serde(default)]
    pub average_abs_correlation: f64,
}

impl CorrelationEntry {
    pub fn coefficient(&self, method: CorrelationMethod) -> Coefficient {
        match method {
            CorrelationMethod::Pearson => self.pearson,
            CorrelationMethod::Spearman => self.spearman,
            CorrelationMethod::Kendall => self.kendall,
        }
    }
}

/// A single ranked correlation, flattened for display
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCorrelation<'a> {
    pub variable_1: &'a str,
    pub variable_2: &'a str,
    pub correlation: f64,
    pub p_value: Option<f64>,
}

/// Correlation analysis of the numeric columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationData {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub methods: Vec<String>,
    pub n_variables: usize,
    pub variables: Vec<String>,
    pub total_correlations: usize,
    pub samples_used: usize,
    #[serde(default)]
    pub top_correlations: Vec<CorrelationEntry>,
    pub all_correlations: Vec<CorrelationEntry>,
    #[serde(default)]
    pub correlation_matrices: BTreeMap<String, BTreeMap<String, BTreeMap<String, Coefficient>>>,
}

fn default_true() -> bool {
    true
}

impl CorrelationData {
    /// Strongest `limit` correlations for one method, by absolute value
    ///
    /// Pairs whose coefficient is missing for that method are skipped.
    pub fn strongest(&self, method: CorrelationMethod, limit: usize) -> Vec<RankedCorrelation<'_>> {
        let mut ranked: Vec<RankedCorrelation<'_>> = self
            .all_correlations
            .iter()
            .filter_map(|entry| {
                let coefficient = entry.coefficient(method);
                coefficient.correlation.map(|correlation| RankedCorrelation {
                    variable_1: &entry.variable_1,
                    variable_2: &entry.variable_2,
                    correlation,
                    p_value: coefficient.p_value,
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
        ranked.truncate(limit);
        ranked
    }

    /// All entries involving `variable`
    pub fn involving<'a>(&'a self, variable: &'a str) -> impl Iterator<Item = &'a CorrelationEntry> {
        self.all_correlations
            .iter()
            .filter(move |entry| entry.variable_1 == variable || entry.variable_2 == variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(a: &str, b: &str, pearson: Option<f64>) -> CorrelationEntry {
        CorrelationEntry {
            variable_1: a.to_string(),
            variable_2: b.to_string(),
            pearson: Coefficient {
                correlation: pearson,
                p_value: Some(0.01),
            },
            spearman: Coefficient::default(),
            kendall: Coefficient::default(),
            average_abs_correlation: pearson.unwrap_or(0.0).abs(),
        }
    }

    fn correlations(entries: Vec<CorrelationEntry>) -> CorrelationData {
        CorrelationData {
            success: true,
            message: String::new(),
            methods: vec!["pearson".into(), "spearman".into(), "kendall".into()],
            n_variables: 3,
            variables: vec!["age".into(), "income".into(), "churn".into()],
            total_correlations: entries.len(),
            samples_used: 100,
            top_correlations: Vec::new(),
            all_correlations: entries,
            correlation_matrices: BTreeMap::new(),
        }
    }

    #[test]
    fn strongest_ranks_by_absolute_value_and_skips_missing() {
        let data = correlations(vec![
            entry("age", "income", Some(0.3)),
            entry("age", "churn", Some(-0.8)),
            entry("income", "churn", None),
        ]);

        let ranked = data.strongest(CorrelationMethod::Pearson, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].variable_2, "churn");
        assert_eq!(ranked[0].correlation, -0.8);
        assert_eq!(ranked[1].variable_2, "income");

        assert!(data.strongest(CorrelationMethod::Kendall, 10).is_empty());
        assert_eq!(data.strongest(CorrelationMethod::Pearson, 1).len(), 1);
    }

    #[test]
    fn involving_filters_both_sides() {
        let data = correlations(vec![
            entry("age", "income", Some(0.3)),
            entry("age", "churn", Some(-0.8)),
            entry("income", "churn", Some(0.1)),
        ]);
        assert_eq!(data.involving("churn").count(), 2);
        assert_eq!(data.involving("age").count(), 2);
        assert_eq!(data.involving("missing").count(), 0);
    }

    #[test]
    fn column_summary_reads_quartile_keys() {
        let summary: ColumnSummary = serde_json::from_value(json!({
            "column": "age",
            "dtype": "Int64",
            "non_null_count": 10,
            "missing_percent": "0.0%",
            "unique_values": 8,
            "nan_percentage": "0.0%",
            "mean": 40.5,
            "25%": 30.0,
            "50%": 41.0,
            "75%": 50.0
        }))
        .unwrap();

        assert!(summary.is_numeric());
        assert_eq!(summary.q1, Some(30.0));
        assert_eq!(summary.median, Some(41.0));
        assert_eq!(summary.q3, Some(50.0));
    }

    #[test]
    fn from_summary_falls_back_to_local_filename() {
        let summary: DataSummary = serde_json::from_value(json!({
            "shape": {"rows": 2, "columns": 3},
            "columns": ["age", "income", "churn"],
            "preview": [{"age": 30, "income": 1000, "churn": 0}]
        }))
        .unwrap();

        let dataset = DatasetInfo::from_summary(summary, None, "local.csv");
        assert_eq!(dataset.filename, "local.csv");
        assert_eq!(dataset.rows, 2);
        assert_eq!(dataset.columns, 3);
        assert_eq!(dataset.encoding, "utf-8");
        assert_eq!(dataset.separator, ",");
        assert!(dataset.has_column("income"));
        assert!(!dataset.has_column("salary"));
        assert_eq!(dataset.preview.len(), 1);
        assert!(dataset.column_summary("age").is_none());
    }
}
