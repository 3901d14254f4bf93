//! Decoding of the stored chart axis configuration.
//!
//! Each axis is stored as `{"fields": [{"name", "aggregate", "sort", "dataType"}]}`.
//! The x-axis holds dimensions, the y-axis holds measures. `dataType` is not
//! used for compilation.

use crate::error::CompileError;
use crate::sanitize::validate_identifier;
use serde::Deserialize;
use tracing::debug;

pub const X_AXIS: &str = "xAxis";
pub const Y_AXIS: &str = "yAxis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    Sum,
    Avg,
    Count,
    Max,
    Min,
    #[default]
    None,
}

impl Aggregate {
    /// Case-sensitive match on the stored names. Anything else is `None`.
    pub fn parse(name: &str) -> Self {
        match name {
            "SUM" => Self::Sum,
            "AVG" => Self::Avg,
            "COUNT" => Self::Count,
            "MAX" => Self::Max,
            "MIN" => Self::Min,
            _ => Self::None,
        }
    }

    pub fn sql_name(&self) -> Option<&'static str> {
        match self {
            Self::Sum => Some("SUM"),
            Self::Avg => Some("AVG"),
            Self::Count => Some("COUNT"),
            Self::Max => Some("MAX"),
            Self::Min => Some("MIN"),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `DESC` sorts descending; any other declared value sorts ascending.
    pub fn from_declared(declared: &str) -> Self {
        if declared == "DESC" {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measure {
    pub name: String,
    pub aggregate: Aggregate,
    pub sort: Option<String>,
}

impl Measure {
    /// `COUNT` over `*` is exposed as a column named `count`.
    pub fn is_count_star(&self) -> bool {
        self.aggregate == Aggregate::Count && self.name == "*"
    }

    /// Name of the column this measure produces.
    pub fn output_name(&self) -> &str {
        if self.is_count_star() {
            "count"
        } else {
            &self.name
        }
    }
}

/// Dimensions and measures of one chart, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSpec {
    pub dimensions: Vec<Dimension>,
    pub measures: Vec<Measure>,
}

#[derive(Debug, Deserialize)]
struct StoredAxis {
    #[serde(default)]
    fields: Vec<StoredField>,
}

#[derive(Debug, Deserialize)]
struct StoredField {
    name: String,
    #[serde(default)]
    aggregate: Option<String>,
    #[serde(default)]
    sort: Option<String>,
}

fn parse_axis(axis: &'static str, blob: Option<&str>) -> Result<Vec<StoredField>, CompileError> {
    let blob = match blob.map(str::trim) {
        Some(b) if !b.is_empty() => b,
        _ => return Ok(Vec::new()),
    };

    let stored: Option<StoredAxis> = serde_json::from_str(blob)
        .map_err(|source| CompileError::MalformedAxis { axis, source })?;

    let fields = stored.map(|s| s.fields).unwrap_or_default();
    for field in &fields {
        validate_identifier(&field.name, Some(axis))?;
    }
    Ok(fields)
}

fn declared_sort(sort: Option<String>) -> Option<String> {
    sort.filter(|s| !s.trim().is_empty())
}

impl FieldSpec {
    /// Decodes the stored x-axis (dimensions) and y-axis (measures) blobs.
    ///
    /// Absent, blank or `null` blobs decode to empty lists.
    pub fn decode(x_axis: Option<&str>, y_axis: Option<&str>) -> Result<Self, CompileError> {
        let dimensions = parse_axis(X_AXIS, x_axis)?
            .into_iter()
            .map(|f| {
                if f.aggregate.as_deref().is_some_and(|a| !a.is_empty()) {
                    debug!(field = %f.name, "Ignoring aggregate on dimension field");
                }
                Dimension {
                    name: f.name,
                    sort: declared_sort(f.sort),
                }
            })
            .collect();

        let measures = parse_axis(Y_AXIS, y_axis)?
            .into_iter()
            .map(|f| {
                let declared = f.aggregate.unwrap_or_default();
                let aggregate = Aggregate::parse(&declared);
                if aggregate == Aggregate::None && !declared.is_empty() {
                    debug!(
                        field = %f.name,
                        aggregate = %declared,
                        "Unrecognized aggregate, emitting field unaggregated"
                    );
                }
                Measure {
                    name: f.name,
                    aggregate,
                    sort: declared_sort(f.sort),
                }
            })
            .collect();

        Ok(Self {
            dimensions,
            measures,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty() && self.measures.is_empty()
    }

    /// The first field with a declared sort, scanning dimensions then measures.
    pub fn sort_field(&self) -> Option<(&str, SortDirection)> {
        let dims = self
            .dimensions
            .iter()
            .filter_map(|d| d.sort.as_deref().map(|s| (d.name.as_str(), s)));
        let measures = self
            .measures
            .iter()
            .filter_map(|m| m.sort.as_deref().map(|s| (m.output_name(), s)));

        dims.chain(measures)
            .next()
            .map(|(name, sort)| (name, SortDirection::from_declared(sort)))
    }
}
