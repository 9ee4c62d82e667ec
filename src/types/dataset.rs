//! Defines the NOAA CDO datasets that observations can be requested from.

use std::fmt;
use std::str::FromStr;

/// A Climate Data Online dataset identifier.
///
/// The well-known datasets get their own variant; anything else the API exposes can
/// still be addressed through [`Dataset::Other`].
///
/// # Examples
///
/// ```
/// use noaa_cdo::Dataset;
///
/// assert_eq!(Dataset::Gsom.to_string(), "GSOM");
/// assert_eq!("GHCND".parse::<Dataset>().unwrap(), Dataset::Ghcnd);
/// assert_eq!("GSOQ".parse::<Dataset>().unwrap(), Dataset::Other("GSOQ".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dataset {
    /// Daily summaries (Global Historical Climatology Network - Daily).
    Ghcnd,
    /// Global summary of the month.
    Gsom,
    /// Global summary of the year.
    Gsoy,
    /// Daily climate normals.
    NormalDly,
    /// Monthly climate normals.
    NormalMly,
    /// Annual and seasonal climate normals.
    NormalAnn,
    /// Precipitation in 15 minute increments.
    Precip15,
    /// Hourly precipitation.
    PrecipHly,
    /// Any other dataset id accepted by the API.
    Other(String),
}

impl Dataset {
    /// The id sent as `datasetid` on the wire.
    pub fn id(&self) -> &str {
        match self {
            Dataset::Ghcnd => "GHCND",
            Dataset::Gsom => "GSOM",
            Dataset::Gsoy => "GSOY",
            Dataset::NormalDly => "NORMAL_DLY",
            Dataset::NormalMly => "NORMAL_MLY",
            Dataset::NormalAnn => "NORMAL_ANN",
            Dataset::Precip15 => "PRECIP_15",
            Dataset::PrecipHly => "PRECIP_HLY",
            Dataset::Other(id) => id,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Error returned when parsing an empty dataset id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dataset id must not be empty")]
pub struct EmptyDatasetId;

impl FromStr for Dataset {
    type Err = EmptyDatasetId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        if id.is_empty() {
            return Err(EmptyDatasetId);
        }
        Ok(match id.to_ascii_uppercase().as_str() {
            "GHCND" => Dataset::Ghcnd,
            "GSOM" => Dataset::Gsom,
            "GSOY" => Dataset::Gsoy,
            "NORMAL_DLY" => Dataset::NormalDly,
            "NORMAL_MLY" => Dataset::NormalMly,
            "NORMAL_ANN" => Dataset::NormalAnn,
            "PRECIP_15" => Dataset::Precip15,
            "PRECIP_HLY" => Dataset::PrecipHly,
            _ => Dataset::Other(id.to_string()),
        })
    }
}

/// Unit system requested for observation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Units {
    Standard,
    Metric,
}

impl Units {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Units::Standard => "standard",
            Units::Metric => "metric",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
