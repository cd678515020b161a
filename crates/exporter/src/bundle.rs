use crate::error::ExportError;
use core_types::{CompositionChange, DateRange, IndexComposition, IndexPerformance};
use database::{CompositionStore, PerformanceStore};
use index_engine::{CompositionDiffer, CompositionReader, PerformanceReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// One table of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportSheet {
    #[default]
    Performance,
    Composition,
    Changes,
}

impl ExportSheet {
    pub const ALL: [ExportSheet; 3] = [
        ExportSheet::Performance,
        ExportSheet::Composition,
        ExportSheet::Changes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportSheet::Performance => "performance",
            ExportSheet::Composition => "composition",
            ExportSheet::Changes => "changes",
        }
    }

    pub fn file_name(&self) -> String {
        format!("index_{}.csv", self.as_str())
    }
}

impl fmt::Display for ExportSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportSheet {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "performance" => Ok(ExportSheet::Performance),
            "composition" => Ok(ExportSheet::Composition),
            "changes" => Ok(ExportSheet::Changes),
            other => Err(ExportError::UnknownSheet(other.to_string())),
        }
    }
}

/// Everything stored for a date range, ready to render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportBundle {
    pub range: Option<DateRange>,
    pub performance: Vec<IndexPerformance>,
    pub composition: Vec<IndexComposition>,
    pub changes: Vec<CompositionChange>,
}

impl ExportBundle {
    /// Reads performance, dated composition rows and composition changes
    /// for `range`.
    pub async fn gather<S>(store: Arc<S>, range: DateRange) -> Result<Self, ExportError>
    where
        S: CompositionStore + PerformanceStore + ?Sized,
    {
        let performance = PerformanceReader::new(store.clone()).get(range).await?;
        let composition = CompositionReader::new(store.clone()).get_range(range).await?;
        let changes = CompositionDiffer::new(store).diff(range).await?;

        tracing::info!(
            %range,
            performance_rows = performance.len(),
            composition_rows = composition.len(),
            changes = changes.len(),
            "Gathered export data."
        );

        Ok(Self {
            range: Some(range),
            performance,
            composition,
            changes,
        })
    }

    /// Renders one sheet as CSV with a header row.
    pub fn render(&self, sheet: ExportSheet) -> Result<Vec<u8>, ExportError> {
        let mut wtr = csv::Writer::from_writer(vec![]);

        match sheet {
            ExportSheet::Performance => {
                wtr.write_record(["date", "daily_return", "cumulative_return", "index_level"])?;
                for row in &self.performance {
                    wtr.write_record([
                        row.date.to_string(),
                        row.daily_return.to_string(),
                        row.cumulative_return.to_string(),
                        row.index_level.to_string(),
                    ])?;
                }
            }
            ExportSheet::Composition => {
                wtr.write_record(["date", "symbol", "weight"])?;
                for row in &self.composition {
                    wtr.write_record([row.date.to_string(), row.symbol.clone(), row.weight.to_string()])?;
                }
            }
            ExportSheet::Changes => {
                wtr.write_record(["date", "entered", "exited"])?;
                for change in &self.changes {
                    wtr.write_record([
                        change.date.to_string(),
                        change.entered.join(", "),
                        change.exited.join(", "),
                    ])?;
                }
            }
        }

        let data = wtr.into_inner().map_err(|e| e.into_error())?;
        Ok(data)
    }

    /// Writes every sheet into `dir`, creating it if needed. Returns the
    /// paths written, in sheet order.
    pub fn write_all(&self, dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(ExportSheet::ALL.len());
        for sheet in ExportSheet::ALL {
            let path = dir.join(sheet.file_name());
            std::fs::write(&path, self.render(sheet)?)?;
            tracing::debug!(path = %path.display(), "Wrote export sheet.");
            written.push(path);
        }
        Ok(written)
    }
}
