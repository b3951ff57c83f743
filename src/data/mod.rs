/// Data layer: core types and loading.
///
/// Architecture:
/// ```text
///  .csv / .parquet / .feather / .hdf      .parquet / .geojson / .shp / .gpkg
///        │                                        │
///        ▼                                        ▼
///   ┌──────────┐                            ┌──────────┐
///   │  loader   │  parse file → Table        │   geo     │  point layer → Table
///   └──────────┘                            └──────────┘  + x/y (Web Mercator)
///        │                                        │
///        ▼                                        ▼
///   ┌──────────────────────────────────────────────────┐
///   │  Table     named typed columns, Value cells        │
///   └──────────────────────────────────────────────────┘
/// ```

pub mod geo;
pub mod loader;
pub mod model;
