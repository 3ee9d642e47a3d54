use crate::entrypoints::cli::parse_args;
use clap::Parser;
use std::path::PathBuf;
use visit_atlas_lib::engine::SourceData;
use visit_atlas_lib::{Coordinate, LocationErrorKind};

/// Natural Earth based country polygons with `ISO_A2` and `ADMIN` properties
pub const DEFAULT_COUNTRIES_URL: &str =
    "https://raw.githubusercontent.com/datasets/geo-countries/master/data/countries.geojson";

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Visit Atlas - A world map for keeping track of the countries you have visited
pub struct Settings {
    /// GeoJSON file (or URL) with the country polygons
    #[clap(short, long, value_name = "FILE")]
    pub countries: Option<String>,

    /// Pretend the device is at this position, as "longitude,latitude"
    #[clap(short, long, value_name = "LON,LAT", allow_hyphen_values = true)]
    pub location: Option<Coordinate>,

    /// Pretend the device reports this location error code (1 = denied, 2 = unavailable, 3 = timeout)
    #[clap(long, value_name = "CODE")]
    pub location_error: Option<u16>,

    /// Initial zoom level of the map
    #[clap(short, long, default_value = "3.0")]
    pub zoom: f64,

    /// Where to keep the visited places (native only)
    #[clap(long, value_name = "FILE")]
    pub storage_path: Option<PathBuf>,

    /// Ignore previously persisted state and start fresh
    #[clap(long, default_value = "false")]
    pub ignore_persisted: bool,
}

impl Settings {
    /// Parse the command line (native) or the `cli`-prefixed GET parameters (web)
    pub fn from_cli() -> Self {
        match parse_args::<Settings>() {
            Ok(args) => args,
            Err(e) => {
                #[cfg(not(target_arch = "wasm32"))]
                e.exit();
                #[cfg(target_arch = "wasm32")]
                {
                    let user_msg = format!(
                        "Error parsing CLI:\n{}\n
    You should change the GET params, using the cli prefix.\n
    Starting anyway without args.",
                        e
                    );
                    if let Some(window) = web_sys::window() {
                        window.alert_with_message(&user_msg).unwrap_or(());
                    } else {
                        tracing::error!(user_msg);
                    }
                    Settings::parse_from(Vec::<String>::new())
                }
            }
        }
    }

    /// Where the country polygons come from
    pub fn countries_source(&self) -> SourceData {
        let countries = self
            .countries
            .clone()
            .unwrap_or_else(|| DEFAULT_COUNTRIES_URL.to_string());
        if countries.starts_with("http://") || countries.starts_with("https://") {
            SourceData::Url(countries)
        } else if countries.trim_start().starts_with('{') {
            SourceData::Inline(countries)
        } else {
            SourceData::Path(PathBuf::from(countries))
        }
    }

    /// Location failure requested on the command line
    pub fn simulated_failure(&self) -> Option<LocationErrorKind> {
        self.location_error.map(LocationErrorKind::from_code)
    }
}
