//! Geospatial ingestion: point layers become a [`Table`] with derived x/y
//! columns, reprojected to Web Mercator when the source CRS is geographic.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use geo_types::Geometry;
use geojson::{GeoJson, JsonObject, JsonValue};
use geozero::wkb::Wkb;
use geozero::ToGeo;

use super::loader::{batches_to_table, read_parquet};
use super::model::{Column, ColumnData, Table, Value};
use crate::error::Error;

/// Spherical Mercator radius (EPSG:3857).
const EARTH_RADIUS: f64 = 6_378_137.0;
/// Latitude where Web Mercator turns the world into a square.
const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

/// Geographic 2D/3D systems seen in the wild: WGS84, NAD83, NAD27, ETRS89,
/// GDA94, GDA2020, SIRGAS 2000, CGCS2000, JGD2000/2011, NZGD2000, ED50,
/// Pulkovo 1942, Tokyo, OSGB36, WGS84 3D.
const GEOGRAPHIC_EPSG: &[i64] = &[
    4326, 4269, 4267, 4258, 4283, 7844, 4674, 4490, 4612, 6668, 4167, 4230, 4284, 4301, 4277, 4979, 4937,
];

// ---------------------------------------------------------------------------
// Formats and CRS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoFormat {
    GeoParquet,
    GeoJson,
    Shapefile,
    GeoPackage,
}

impl GeoFormat {
    /// HDF, CSV and feather are tabular-only and rejected here.
    pub fn detect(path: &Path) -> Result<GeoFormat, Error> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "parquet" => Ok(GeoFormat::GeoParquet),
            "geojson" | "json" => Ok(GeoFormat::GeoJson),
            "shp" => Ok(GeoFormat::Shapefile),
            "gpkg" => Ok(GeoFormat::GeoPackage),
            _ => Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                expected: "parquet (GeoParquet), geojson, shp, gpkg",
            }),
        }
    }
}

/// What we know about the coordinate reference system of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    Geographic,
    Projected,
    Unknown,
}

impl Crs {
    /// Classify a WKT (1 or 2) definition by its root keyword.
    fn from_wkt(wkt: &str) -> Crs {
        let head = wkt.trim_start().to_ascii_uppercase();
        if head.starts_with("GEOGCS") || head.starts_with("GEOGCRS") || head.starts_with("GEODCRS") {
            Crs::Geographic
        } else if head.starts_with("PROJCS") || head.starts_with("PROJCRS") {
            Crs::Projected
        } else {
            Crs::Unknown
        }
    }

    /// Classify an authority string such as `EPSG:4269` or
    /// `urn:ogc:def:crs:OGC:1.3:CRS84`. EPSG codes outside the known tables
    /// are `Unknown`, never guessed.
    fn from_name(name: &str) -> Crs {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") || upper == "CRS:84" {
            return Crs::Geographic;
        }
        if upper.contains("EPSG") {
            return upper
                .rsplit(':')
                .next()
                .and_then(|code| code.parse::<i64>().ok())
                .map_or(Crs::Unknown, Crs::from_epsg);
        }
        Crs::from_wkt(name)
    }

    /// Classify an EPSG code against the common geographic and projected
    /// systems.
    fn from_epsg(code: i64) -> Crs {
        match code {
            c if GEOGRAPHIC_EPSG.contains(&c) => Crs::Geographic,
            3857 | 900_913 | 3395 | 3035 | 2154 | 27700 | 3031 | 3413 | 5070 | 102_100 => Crs::Projected,
            // UTM zones on WGS84 and NAD83 / NAD27.
            32601..=32660 | 32701..=32760 | 26901..=26923 | 26701..=26722 => Crs::Projected,
            _ => Crs::Unknown,
        }
    }

    /// Classify a PROJJSON document (GeoParquet `crs` member).
    fn from_projjson(doc: &JsonValue) -> Crs {
        match doc {
            JsonValue::String(s) => Crs::from_name(s),
            JsonValue::Object(obj) => match obj.get("type").and_then(JsonValue::as_str) {
                Some("GeographicCRS") | Some("GeodeticCRS") => Crs::Geographic,
                Some("ProjectedCRS") => Crs::Projected,
                _ => Crs::Unknown,
            },
            _ => Crs::Unknown,
        }
    }
}

/// Project lon/lat degrees to Web Mercator metres.
pub fn web_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// A decoded layer: attribute table, one optional point per row, and CRS.
struct GeoLayer {
    table: Table,
    points: Vec<Option<(f64, f64)>>,
    crs: Crs,
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a point layer and add `x_col`/`y_col` columns from its geometry.
/// Rows with empty geometry get `NaN` coordinates and are never binned.
pub fn load_geo_table(path: &Path, x_col: &str, y_col: &str) -> Result<Table> {
    let format = GeoFormat::detect(path)?;
    let layer = match format {
        GeoFormat::GeoParquet => load_geoparquet(path),
        GeoFormat::GeoJson => load_geojson(path),
        GeoFormat::Shapefile => load_shapefile(path),
        GeoFormat::GeoPackage => load_geopackage(path),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    let GeoLayer {
        mut table,
        points,
        crs,
    } = layer;

    let reproject = crs == Crs::Geographic;
    if reproject {
        log::info!("reprojecting {} geographic points to EPSG:3857", points.len());
    } else {
        log::debug!("layer CRS is {crs:?}, keeping coordinates as-is");
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = points
        .into_iter()
        .map(|p| match p {
            Some((x, y)) if reproject => web_mercator(x, y),
            Some(xy) => xy,
            None => (f64::NAN, f64::NAN),
        })
        .unzip();

    table.set_column(Column::new(x_col, ColumnData::Float(xs)));
    table.set_column(Column::new(y_col, ColumnData::Float(ys)));

    log::info!("loaded {} features from {}", table.len(), path.display());
    Ok(table)
}

fn point_of(geometry: Geometry<f64>, row: usize) -> Result<(f64, f64), Error> {
    let kind = match geometry {
        Geometry::Point(p) => return Ok((p.x(), p.y())),
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    };
    Err(Error::NonPointGeometry {
        row,
        kind: kind.to_string(),
    })
}

// ---------------------------------------------------------------------------
// GeoJSON loader
// ---------------------------------------------------------------------------

/// Feature properties become columns (union of keys, first-seen order).
/// RFC 7946 coordinates are WGS84 unless a legacy `crs` member says otherwise.
fn load_geojson(path: &Path) -> Result<GeoLayer> {
    let text = std::fs::read_to_string(path).context("reading GeoJSON file")?;
    let geojson: GeoJson = text.parse().context("parsing GeoJSON")?;

    let (features, foreign) = match geojson {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(f) => (vec![f], None),
        GeoJson::Geometry(g) => (
            vec![geojson::Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            None,
        ),
    };

    let crs = foreign
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(JsonValue::as_str)
        .map_or(Crs::Geographic, Crs::from_name);

    let mut names: Vec<String> = Vec::new();
    let mut points = Vec::with_capacity(features.len());
    for (row, feature) in features.iter().enumerate() {
        let point = match feature.geometry.as_ref().map(|g| &g.value) {
            None => None,
            Some(geojson::Value::Point(coords)) if coords.len() >= 2 => Some((coords[0], coords[1])),
            Some(other) => {
                return Err(Error::NonPointGeometry {
                    row,
                    kind: geojson_kind(other).to_string(),
                }
                .into())
            }
        };
        points.push(point);
        for key in feature.properties.iter().flat_map(JsonObject::keys) {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let values = features
                .iter()
                .map(|f| f.property(&name).map_or(Value::Null, json_to_value))
                .collect();
            Column::from_values(name, values)
        })
        .collect();

    Ok(GeoLayer {
        table: Table::new(columns),
        points,
        crs,
    })
}

fn geojson_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// GeoParquet loader
// ---------------------------------------------------------------------------

/// The `geo` file metadata document of GeoParquet.
#[derive(Debug, serde::Deserialize)]
struct GeoMetadata {
    primary_column: String,
    columns: HashMap<String, serde_json::Map<String, JsonValue>>,
}

fn load_geoparquet(path: &Path) -> Result<GeoLayer> {
    let contents = read_parquet(path)?;

    let (geometry_column, crs) = match contents.metadata.get("geo") {
        Some(doc) => {
            let meta: GeoMetadata = serde_json::from_str(doc).context("parsing GeoParquet 'geo' metadata")?;
            let column = meta
                .columns
                .get(&meta.primary_column)
                .with_context(|| format!("no metadata for primary column {}", meta.primary_column))?;
            let encoding = column.get("encoding").and_then(JsonValue::as_str).unwrap_or("WKB");
            if !encoding.eq_ignore_ascii_case("WKB") {
                bail!("unsupported GeoParquet geometry encoding {encoding}; only WKB is read");
            }
            // Absent crs means OGC:CRS84, explicit null means unknown.
            let crs = match column.get("crs") {
                None => Crs::Geographic,
                Some(JsonValue::Null) => Crs::Unknown,
                Some(doc) => Crs::from_projjson(doc),
            };
            (meta.primary_column, crs)
        }
        None => {
            log::warn!("no GeoParquet metadata, reading WKB from column 'geometry' with unknown CRS");
            ("geometry".to_string(), Crs::Unknown)
        }
    };

    let table = batches_to_table(&contents.schema, &contents.batches)?;

    let index = contents
        .schema
        .index_of(&geometry_column)
        .with_context(|| format!("geometry column '{geometry_column}' missing"))?;

    let mut points = Vec::with_capacity(table.len());
    for batch in &contents.batches {
        let wkb = cast(batch.column(index), &DataType::LargeBinary).context("geometry column is not binary")?;
        let wkb = wkb.as_binary::<i64>();
        for i in 0..wkb.len() {
            let row = points.len();
            if wkb.is_null(i) {
                points.push(None);
                continue;
            }
            let geometry = Wkb(wkb.value(i).to_vec())
                .to_geo()
                .with_context(|| format!("decoding WKB geometry in row {row}"))?;
            points.push(Some(point_of(geometry, row)?));
        }
    }

    Ok(GeoLayer { table, points, crs })
}

// ---------------------------------------------------------------------------
// Shapefile loader
// ---------------------------------------------------------------------------

const SHP_FILE_CODE: i32 = 9994;

/// Read a point shapefile: geometry from `.shp`, attributes from the sibling
/// `.dbf`, CRS from the sibling `.prj` when present.
fn load_shapefile(path: &Path) -> Result<GeoLayer> {
    let shp = std::fs::read(path).context("reading .shp file")?;
    let points = parse_shp_points(&shp)?;

    let dbf_path = path.with_extension("dbf");
    let table = if dbf_path.exists() {
        let dbf = std::fs::read(&dbf_path).context("reading .dbf file")?;
        parse_dbf(&dbf).context("parsing .dbf attributes")?
    } else {
        log::debug!("no .dbf next to {}, loading geometry only", path.display());
        Table::default()
    };
    if !table.columns.is_empty() && table.len() != points.len() {
        bail!(".dbf has {} records but .shp has {}", table.len(), points.len());
    }

    let prj_path = path.with_extension("prj");
    let crs = match std::fs::read_to_string(&prj_path) {
        Ok(wkt) => Crs::from_wkt(&wkt),
        Err(_) => Crs::Unknown,
    };

    Ok(GeoLayer { table, points, crs })
}

fn parse_shp_points(buf: &[u8]) -> Result<Vec<Option<(f64, f64)>>> {
    if buf.len() < 100 || i32::from_be_bytes(buf[0..4].try_into()?) != SHP_FILE_CODE {
        bail!("not a shapefile (bad header)");
    }

    let mut points = Vec::new();
    let mut offset = 100;
    while offset + 8 <= buf.len() {
        let content_words = i32::from_be_bytes(buf[offset + 4..offset + 8].try_into()?);
        let start = offset + 8;
        let end = usize::try_from(content_words)
            .ok()
            .filter(|&words| words >= 2)
            .and_then(|words| words.checked_mul(2))
            .and_then(|len| start.checked_add(len))
            .filter(|&end| end <= buf.len());
        let Some(end) = end else {
            bail!("bad shapefile record length {content_words} at byte {offset}");
        };
        let content = &buf[start..end];
        let shape_type = i32::from_le_bytes(content[0..4].try_into()?);
        let row = points.len();
        match shape_type {
            0 => points.push(None),
            // Point, PointM, PointZ all lead with x, y.
            1 | 11 | 21 => {
                if content.len() < 20 {
                    bail!("truncated point record {row}");
                }
                let x = f64::from_le_bytes(content[4..12].try_into()?);
                let y = f64::from_le_bytes(content[12..20].try_into()?);
                points.push(Some((x, y)));
            }
            other => {
                let kind = match other {
                    3 | 13 | 23 => "PolyLine",
                    5 | 15 | 25 => "Polygon",
                    8 | 18 | 28 => "MultiPoint",
                    31 => "MultiPatch",
                    _ => "unknown shape",
                };
                return Err(Error::NonPointGeometry {
                    row,
                    kind: kind.to_string(),
                }
                .into());
            }
        }
        offset = end;
    }
    Ok(points)
}

struct DbfField {
    name: String,
    kind: u8,
    length: usize,
}

/// dBase III attribute table: fixed-width records after a field descriptor
/// array terminated by `0x0D`.
fn parse_dbf(buf: &[u8]) -> Result<Table> {
    if buf.len() < 32 {
        bail!("dbf header too short");
    }
    let n_records = u32::from_le_bytes(buf[4..8].try_into()?) as usize;
    let header_len = u16::from_le_bytes(buf[8..10].try_into()?) as usize;
    let record_len = u16::from_le_bytes(buf[10..12].try_into()?) as usize;

    let mut fields = Vec::new();
    let mut pos = 32;
    while pos + 32 <= buf.len() && buf[pos] != 0x0D {
        let raw_name = &buf[pos..pos + 11];
        let name_end = raw_name.iter().position(|&b| b == 0).unwrap_or(11);
        fields.push(DbfField {
            name: String::from_utf8_lossy(&raw_name[..name_end]).trim().to_string(),
            kind: buf[pos + 11],
            length: buf[pos + 16] as usize,
        });
        pos += 32;
    }

    let mut cells: Vec<Vec<Value>> = vec![Vec::with_capacity(n_records); fields.len()];
    for record in 0..n_records {
        let start = record
            .checked_mul(record_len)
            .and_then(|offset| offset.checked_add(header_len))
            .filter(|start| start + record_len <= buf.len());
        let Some(start) = start else {
            bail!("dbf record {record} is truncated");
        };
        let record_end = start + record_len;
        // First byte is the deletion flag.
        let mut field_pos = start + 1;
        for (field, column) in fields.iter().zip(cells.iter_mut()) {
            if field_pos + field.length > record_end {
                bail!("dbf field '{}' runs past the {record_len}-byte record", field.name);
            }
            let raw = &buf[field_pos..field_pos + field.length];
            let text = String::from_utf8_lossy(raw);
            let text = text.trim();
            column.push(match field.kind {
                b'N' | b'F' | b'I' | b'O' => Value::parse_guess(text),
                b'L' => match text {
                    "T" | "t" | "Y" | "y" => Value::Bool(true),
                    "F" | "f" | "N" | "n" => Value::Bool(false),
                    _ => Value::Null,
                },
                _ if text.is_empty() => Value::Null,
                _ => Value::String(text.to_string()),
            });
            field_pos += field.length;
        }
    }

    Ok(Table::new(
        fields
            .into_iter()
            .zip(cells)
            .map(|(field, values)| Column::from_values(field.name, values))
            .collect(),
    ))
}

// ---------------------------------------------------------------------------
// GeoPackage loader
// ---------------------------------------------------------------------------

/// Read the first feature table listed in `gpkg_contents`.
#[cfg(feature = "gpkg")]
fn load_geopackage(path: &Path) -> Result<GeoLayer> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting SQLite runtime")?;
    runtime.block_on(gpkg::read_layer(path))
}

#[cfg(not(feature = "gpkg"))]
fn load_geopackage(_path: &Path) -> Result<GeoLayer> {
    Err(Error::FormatUnavailable {
        format: "GeoPackage",
        feature: "gpkg",
    }
    .into())
}

#[cfg(feature = "gpkg")]
mod gpkg {
    use std::path::Path;

    use anyhow::{Context, Result};
    use geozero::wkb::GpkgWkb;
    use geozero::ToGeo;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
    use sqlx::{Column as _, Connection, Row, TypeInfo, ValueRef};

    use super::{point_of, Crs, GeoLayer};
    use crate::data::model::{Column, Table, Value};

    pub(super) async fn read_layer(path: &Path) -> Result<GeoLayer> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .context("opening GeoPackage")?;

        let (table_name,): (String,) =
            sqlx::query_as("SELECT table_name FROM gpkg_contents WHERE data_type = 'features' LIMIT 1")
                .fetch_one(&mut conn)
                .await
                .context("GeoPackage has no feature table")?;

        let (geometry_column, srs_id): (String, i64) =
            sqlx::query_as("SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?")
                .bind(&table_name)
                .fetch_one(&mut conn)
                .await
                .context("reading gpkg_geometry_columns")?;

        let crs = match srs_id {
            4326 => Crs::Geographic,
            0 | -1 => Crs::Unknown,
            _ => {
                let definition: Option<(String,)> =
                    sqlx::query_as("SELECT definition FROM gpkg_spatial_ref_sys WHERE srs_id = ?")
                        .bind(srs_id)
                        .fetch_optional(&mut conn)
                        .await
                        .context("reading gpkg_spatial_ref_sys")?;
                match definition.map_or(Crs::Unknown, |(wkt,)| Crs::from_wkt(&wkt)) {
                    Crs::Unknown => Crs::from_epsg(srs_id),
                    known => known,
                }
            }
        };

        let sql = format!("SELECT * FROM \"{}\"", table_name.replace('"', "\"\""));
        let rows = sqlx::query(&sql)
            .fetch_all(&mut conn)
            .await
            .with_context(|| format!("reading feature table {table_name}"))?;
        conn.close().await.ok();

        log::debug!("GeoPackage layer {table_name}: {} rows, srs_id {srs_id}", rows.len());

        let names: Vec<String> = rows
            .first()
            .map(|r| {
                r.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .filter(|n| *n != geometry_column)
                    .collect()
            })
            .unwrap_or_default();

        let mut points = Vec::with_capacity(rows.len());
        let mut cells: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (row_no, row) in rows.iter().enumerate() {
            let blob: Option<Vec<u8>> = row.try_get(geometry_column.as_str())?;
            let point = match blob {
                Some(blob) => {
                    let geometry = GpkgWkb(blob)
                        .to_geo()
                        .with_context(|| format!("decoding geometry in row {row_no}"))?;
                    Some(point_of(geometry, row_no)?)
                }
                None => None,
            };
            points.push(point);
            for (name, column) in names.iter().zip(cells.iter_mut()) {
                column.push(cell(row, name)?);
            }
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::from_values(name, values))
            .collect();

        Ok(GeoLayer {
            table: Table::new(columns),
            points,
            crs,
        })
    }

    fn cell(row: &SqliteRow, name: &str) -> Result<Value> {
        let raw = row.try_get_raw(name)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let type_name = raw.type_info().name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => Value::Integer(row.try_get_unchecked::<i64, _>(name)?),
            "REAL" | "NUMERIC" => Value::Float(row.try_get_unchecked::<f64, _>(name)?),
            "BLOB" => Value::Null,
            _ => Value::String(row.try_get_unchecked::<String, _>(name)?),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shp_with_points(points: &[(f64, f64)]) -> Vec<u8> {
        let mut buf = vec![0u8; 100];
        buf[0..4].copy_from_slice(&SHP_FILE_CODE.to_be_bytes());
        buf[28..32].copy_from_slice(&1000i32.to_le_bytes());
        buf[32..36].copy_from_slice(&1i32.to_le_bytes());
        for (i, (x, y)) in points.iter().enumerate() {
            buf.extend_from_slice(&(i as i32 + 1).to_be_bytes());
            buf.extend_from_slice(&10i32.to_be_bytes());
            buf.extend_from_slice(&1i32.to_le_bytes());
            buf.extend_from_slice(&x.to_le_bytes());
            buf.extend_from_slice(&y.to_le_bytes());
        }
        let words = (buf.len() / 2) as i32;
        buf[24..28].copy_from_slice(&words.to_be_bytes());
        buf
    }

    fn dbf_with_names(names: &[&str]) -> Vec<u8> {
        let field_len = 8usize;
        let header_len = 32 + 32 + 1;
        let record_len = 1 + field_len;
        let mut buf = vec![0u8; 32];
        buf[0] = 3;
        buf[4..8].copy_from_slice(&(names.len() as u32).to_le_bytes());
        buf[8..10].copy_from_slice(&(header_len as u16).to_le_bytes());
        buf[10..12].copy_from_slice(&(record_len as u16).to_le_bytes());
        let mut field = [0u8; 32];
        field[..4].copy_from_slice(b"NAME");
        field[11] = b'C';
        field[16] = field_len as u8;
        buf.extend_from_slice(&field);
        buf.push(0x0D);
        for name in names {
            buf.push(b' ');
            buf.extend_from_slice(format!("{name:<8}").as_bytes());
        }
        buf
    }

    #[test]
    fn test_web_mercator_origin_and_edges() {
        let (x, y) = web_mercator(0.0, 0.0);
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);

        let (x, _) = web_mercator(180.0, 0.0);
        assert!((x - 20_037_508.342_789_244).abs() < 1e-3);

        // Latitude clamps instead of running off to infinity.
        let (_, y) = web_mercator(0.0, 90.0);
        assert!(y.is_finite());
        assert!((y - 20_037_508.342_789_244).abs() < 1.0);
    }

    #[test]
    fn test_detect_restricts_geo_formats() {
        assert_eq!(GeoFormat::detect(Path::new("a.shp")).unwrap(), GeoFormat::Shapefile);
        assert_eq!(GeoFormat::detect(Path::new("a.gpkg")).unwrap(), GeoFormat::GeoPackage);
        assert!(GeoFormat::detect(Path::new("a.hdf")).is_err());
        assert!(GeoFormat::detect(Path::new("a.csv")).is_err());
    }

    #[test]
    fn test_crs_classification() {
        assert_eq!(Crs::from_wkt("GEOGCS[\"WGS 84\",DATUM[...]]"), Crs::Geographic);
        assert_eq!(Crs::from_wkt("PROJCS[\"WGS 84 / Pseudo-Mercator\"]"), Crs::Projected);
        assert_eq!(Crs::from_name("urn:ogc:def:crs:EPSG::3857"), Crs::Projected);
        assert_eq!(Crs::from_name("urn:ogc:def:crs:OGC:1.3:CRS84"), Crs::Geographic);
        assert_eq!(Crs::from_name("EPSG:4258"), Crs::Geographic);
        assert_eq!(Crs::from_name("urn:ogc:def:crs:EPSG::4283"), Crs::Geographic);
        assert_eq!(Crs::from_name("EPSG:32633"), Crs::Projected);
        assert_eq!(Crs::from_name("EPSG:999999"), Crs::Unknown);
        assert_eq!(Crs::from_name("EPSG:abc"), Crs::Unknown);
        let projjson = serde_json::json!({"type": "ProjectedCRS", "name": "UTM"});
        assert_eq!(Crs::from_projjson(&projjson), Crs::Projected);
    }

    #[test]
    fn test_geojson_points_are_reprojected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[0.0,0.0]},"properties":{"pop":10}},
                {"type":"Feature","geometry":{"type":"Point","coordinates":[180.0,0.0]},"properties":{"pop":20,"name":"b"}},
                {"type":"Feature","geometry":null,"properties":{}}
            ]}"#,
        )
        .unwrap();

        let table = load_geo_table(&path, "x", "y").unwrap();
        assert_eq!(table.len(), 3);
        let xs = table.f64_column("x").unwrap();
        assert!(xs[0].abs() < 1e-9);
        assert!(xs[1] > 2.0e7);
        assert!(xs[2].is_nan());
        assert_eq!(table.column("pop").unwrap().value(1), Value::Integer(20));
        assert_eq!(table.column("name").unwrap().value(0), Value::Null);
    }

    #[test]
    fn test_geojson_legacy_geographic_crs_is_reprojected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nad83.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::4269"}},
                "features":[{"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[-74.0,40.7]}}]}"#,
        )
        .unwrap();

        let table = load_geo_table(&path, "x", "y").unwrap();
        let (x, y) = web_mercator(-74.0, 40.7);
        assert!((table.f64_column("x").unwrap()[0] - x).abs() < 1e-6);
        assert!((table.f64_column("y").unwrap()[0] - y).abs() < 1e-6);
    }

    #[test]
    fn test_geojson_rejects_polygons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("area.geojson");
        std::fs::write(
            &path,
            r#"{"type":"Feature","properties":null,"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}"#,
        )
        .unwrap();

        let err = load_geo_table(&path, "x", "y").unwrap_err();
        assert!(format!("{err:#}").contains("Polygon"), "{err:#}");
    }

    #[test]
    fn test_shapefile_with_attributes_and_projected_crs() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("sites.shp");
        std::fs::write(&shp, shp_with_points(&[(100.0, 200.0), (300.0, 400.0)])).unwrap();
        std::fs::write(dir.path().join("sites.dbf"), dbf_with_names(&["alpha", "beta"])).unwrap();
        std::fs::write(dir.path().join("sites.prj"), "PROJCS[\"NAD83 / UTM zone 18N\"]").unwrap();

        let table = load_geo_table(&shp, "px", "py").unwrap();
        assert_eq!(table.f64_column("px").unwrap(), vec![100.0, 300.0]);
        assert_eq!(table.f64_column("py").unwrap(), vec![200.0, 400.0]);
        assert_eq!(table.column("NAME").unwrap().value(1), Value::String("beta".into()));
    }

    /// Little-endian WKB point.
    fn wkb_point(x: f64, y: f64) -> Vec<u8> {
        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&1u32.to_le_bytes());
        wkb.extend_from_slice(&x.to_le_bytes());
        wkb.extend_from_slice(&y.to_le_bytes());
        wkb
    }

    fn write_geoparquet(path: &Path, geo: Option<&str>) {
        use std::sync::Arc;

        use arrow::array::{BinaryArray, StringArray};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;
        use parquet::file::metadata::KeyValue;
        use parquet::file::properties::WriterProperties;

        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("geometry", DataType::Binary, true),
        ]));
        let points = [wkb_point(10.0, 20.0), wkb_point(-30.0, 40.0)];
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
                Arc::new(BinaryArray::from(vec![Some(points[0].as_slice()), None, Some(points[1].as_slice())])),
            ],
        )
        .unwrap();
        let props = WriterProperties::builder()
            .set_key_value_metadata(geo.map(|doc| vec![KeyValue::new("geo".to_string(), doc.to_string())]))
            .build();
        let mut writer = ArrowWriter::try_new(std::fs::File::create(path).unwrap(), schema, Some(props)).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_geoparquet_without_crs_is_lon_lat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.parquet");
        write_geoparquet(
            &path,
            Some(r#"{"version":"1.0.0","primary_column":"geometry","columns":{"geometry":{"encoding":"WKB","geometry_types":["Point"]}}}"#),
        );

        let table = load_geo_table(&path, "x", "y").unwrap();
        assert_eq!(table.len(), 3);
        let xs = table.f64_column("x").unwrap();
        let ys = table.f64_column("y").unwrap();
        let (x, y) = web_mercator(10.0, 20.0);
        assert!((xs[0] - x).abs() < 1e-6 && (ys[0] - y).abs() < 1e-6);
        assert!(xs[1].is_nan());
        assert_eq!(table.column("name").unwrap().value(2), Value::String("c".into()));
        // The WKB column itself is not carried as an attribute.
        assert!(table.column("geometry").is_err());
    }

    #[test]
    fn test_geoparquet_projected_and_unknown_crs_stay_put() {
        let dir = tempfile::tempdir().unwrap();
        for (name, crs) in [("projected", r#"{"type":"ProjectedCRS","name":"UTM"}"#), ("unknown", "null")] {
            let path = dir.path().join(format!("{name}.parquet"));
            let geo = format!(r#"{{"primary_column":"geometry","columns":{{"geometry":{{"encoding":"WKB","crs":{crs}}}}}}}"#);
            write_geoparquet(&path, Some(&geo));
            let table = load_geo_table(&path, "x", "y").unwrap();
            assert_eq!(table.f64_column("x").unwrap()[2], -30.0, "{name}");
            assert_eq!(table.f64_column("y").unwrap()[2], 40.0, "{name}");
        }
    }

    #[test]
    fn test_geoparquet_rejects_other_encodings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("native.parquet");
        write_geoparquet(
            &path,
            Some(r#"{"primary_column":"geometry","columns":{"geometry":{"encoding":"point"}}}"#),
        );
        let err = load_geo_table(&path, "x", "y").unwrap_err();
        assert!(err.to_string().contains("encoding"), "{err}");
    }

    /// Minimal GeoPackage: the three metadata tables and one feature table
    /// whose geometry blobs use the GeoPackage binary header.
    #[cfg(feature = "gpkg")]
    fn write_geopackage(path: &Path, srs_id: i32, definition: &str) {
        use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
        use sqlx::Connection;

        let gpkg_point = |x: f64, y: f64| {
            let mut blob = b"GP".to_vec();
            blob.push(0); // version
            blob.push(1); // little endian, no envelope
            blob.extend_from_slice(&srs_id.to_le_bytes());
            blob.extend_from_slice(&wkb_point(x, y));
            blob
        };

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
            let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
            for sql in [
                "CREATE TABLE gpkg_spatial_ref_sys (srs_id INTEGER PRIMARY KEY, definition TEXT NOT NULL)",
                "CREATE TABLE gpkg_contents (table_name TEXT PRIMARY KEY, data_type TEXT NOT NULL)",
                "CREATE TABLE gpkg_geometry_columns (table_name TEXT, column_name TEXT, srs_id INTEGER)",
                "CREATE TABLE sites (fid INTEGER PRIMARY KEY, name TEXT, pop REAL, geom BLOB)",
                "INSERT INTO gpkg_contents VALUES ('sites', 'features')",
                "INSERT INTO gpkg_geometry_columns VALUES ('sites', 'geom', ?1)",
                "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2)",
            ] {
                let mut query = sqlx::query(sql);
                if sql.contains("?1") {
                    query = query.bind(srs_id);
                }
                if sql.contains("?2") {
                    query = query.bind(definition);
                }
                query.execute(&mut conn).await.unwrap();
            }
            for (fid, name, pop, point) in [(1, "a", 1.5, Some((-74.0, 40.7))), (2, "b", 2.5, None)] {
                sqlx::query("INSERT INTO sites VALUES (?, ?, ?, ?)")
                    .bind(fid)
                    .bind(name)
                    .bind(pop)
                    .bind(point.map(|(x, y)| gpkg_point(x, y)))
                    .execute(&mut conn)
                    .await
                    .unwrap();
            }
            conn.close().await.unwrap();
        });
    }

    #[cfg(feature = "gpkg")]
    #[test]
    fn test_geopackage_layer_with_geographic_srs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.gpkg");
        // No usable definition: the srs_id itself decides.
        write_geopackage(&path, 4258, "undefined");

        let table = load_geo_table(&path, "x", "y").unwrap();
        assert_eq!(table.len(), 2);
        let (x, _) = web_mercator(-74.0, 40.7);
        let xs = table.f64_column("x").unwrap();
        assert!((xs[0] - x).abs() < 1e-6);
        assert!(xs[1].is_nan());
        assert_eq!(table.column("fid").unwrap().value(1), Value::Integer(2));
        assert_eq!(table.column("pop").unwrap().value(0), Value::Float(1.5));
        assert_eq!(table.column("name").unwrap().value(1), Value::String("b".into()));
    }

    #[cfg(feature = "gpkg")]
    #[test]
    fn test_geopackage_projected_srs_from_definition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utm.gpkg");
        write_geopackage(&path, 32618, "PROJCS[\"WGS 84 / UTM zone 18N\"]");

        let table = load_geo_table(&path, "x", "y").unwrap();
        assert_eq!(table.f64_column("x").unwrap()[0], -74.0);
        assert_eq!(table.f64_column("y").unwrap()[0], 40.7);
    }

    #[test]
    fn test_malformed_shapefile_records_are_errors() {
        let mut shp = shp_with_points(&[(1.0, 2.0)]);
        shp[104..108].copy_from_slice(&(-1i32).to_be_bytes());
        assert!(parse_shp_points(&shp).is_err());

        shp[104..108].copy_from_slice(&i32::MAX.to_be_bytes());
        assert!(parse_shp_points(&shp).is_err());

        let mut dbf = dbf_with_names(&["alpha"]);
        // Field wider than the whole record.
        dbf[32 + 16] = 200;
        let err = parse_dbf(&dbf).unwrap_err();
        assert!(err.to_string().contains("NAME"), "{err}");
    }
}
