pub mod parser;
pub mod scraper;

pub use parser::{ParseError, RawRow, parse_rows};
pub use scraper::{Fetch, ScraperError, WebScraper};

use std::fmt::Display;
use std::str::FromStr;

use crate::builder::ColumnMapping;
use crate::types::PRIMARY_METRIC;

pub(crate) const WIKI_URL: &str =
    "https://en.wikipedia.org/api/rest_v1/page/html/2019%E2%80%9320_Wuhan_coronavirus_outbreak";

/// How raw rows are laid out in the fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLayout {
    Html {
        /// CSS selector matching one `<tr>` per region.
        row_selector: String,
        /// Skip rows whose first cell is bold, which is how totals rows are marked.
        skip_bold_rows: bool,
    },
    Csv {
        delimiter: char,
        has_header: bool,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid source preset '{0}'. Accepted values: 'wiki', 'sheet', 'csv'")]
pub struct PresetParseError(String);

/// Known source shapes with their default layout and column mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePreset {
    Wiki,
    Sheet,
    Csv,
}

impl SourcePreset {
    pub fn layout(&self) -> TableLayout {
        match self {
            SourcePreset::Wiki => TableLayout::Html {
                row_selector: ".infobox .wikitable tr".to_string(),
                skip_bold_rows: true,
            },
            SourcePreset::Sheet => TableLayout::Html {
                row_selector: "table.waffle tr".to_string(),
                skip_bold_rows: false,
            },
            SourcePreset::Csv => TableLayout::Csv {
                delimiter: ',',
                has_header: true,
            },
        }
    }

    pub fn mapping(&self) -> ColumnMapping {
        match self {
            // Published sheets render the row number as the first cell.
            SourcePreset::Sheet => ColumnMapping::new(1, [(PRIMARY_METRIC, 2), ("death", 3)]),
            SourcePreset::Wiki | SourcePreset::Csv => {
                ColumnMapping::new(0, [(PRIMARY_METRIC, 1), ("death", 2)])
            }
        }
    }

    pub fn default_url(&self) -> Option<&'static str> {
        match self {
            SourcePreset::Wiki => Some(WIKI_URL),
            SourcePreset::Sheet | SourcePreset::Csv => None,
        }
    }
}

impl FromStr for SourcePreset {
    type Err = PresetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wiki" => Ok(SourcePreset::Wiki),
            "sheet" | "spreadsheet" => Ok(SourcePreset::Sheet),
            "csv" => Ok(SourcePreset::Csv),
            _ => Err(PresetParseError(s.to_string())),
        }
    }
}

impl Display for SourcePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourcePreset::Wiki => write!(f, "wiki"),
            SourcePreset::Sheet => write!(f, "sheet"),
            SourcePreset::Csv => write!(f, "csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_from_str() {
        assert_eq!("wiki".parse::<SourcePreset>().ok(), Some(SourcePreset::Wiki));
        assert_eq!(
            "spreadsheet".parse::<SourcePreset>().ok(),
            Some(SourcePreset::Sheet)
        );
        assert!("xml".parse::<SourcePreset>().is_err());
    }

    #[test]
    fn test_sheet_mapping_skips_row_number_column() {
        let mapping = SourcePreset::Sheet.mapping();
        assert_eq!(mapping.region, 1);
        assert_eq!(mapping.primary_metric(), Some("cases"));
    }

    #[test]
    fn test_only_wiki_has_a_default_url() {
        assert!(SourcePreset::Wiki.default_url().is_some());
        assert!(SourcePreset::Csv.default_url().is_none());
    }
}
