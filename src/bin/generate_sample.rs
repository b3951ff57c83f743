use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Write sample datasets for trying out `pointshade`.
#[derive(Debug, Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Number of points in points.csv / points.parquet
    #[arg(long, default_value_t = 100_000)]
    points: usize,

    /// Number of nodes in nodes.csv
    #[arg(long, default_value_t = 200)]
    nodes: usize,

    /// Directory the files are written to
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,
}

/// Cities the point clusters are centered on: (name, lon, lat, spread in degrees).
const CLUSTERS: [(&str, f64, f64, f64); 5] = [
    ("paris", 2.35, 48.86, 1.5),
    ("new_york", -74.0, 40.7, 2.0),
    ("tokyo", 139.7, 35.7, 1.0),
    ("sao_paulo", -46.6, -23.5, 2.5),
    ("nairobi", 36.8, -1.3, 1.2),
];

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

struct Points {
    lon: Vec<f64>,
    lat: Vec<f64>,
    value: Vec<f64>,
    city: Vec<&'static str>,
    id: Vec<i64>,
}

fn generate_points(n: usize, rng: &mut StdRng) -> Points {
    let mut pts = Points {
        lon: Vec::with_capacity(n),
        lat: Vec::with_capacity(n),
        value: Vec::with_capacity(n),
        city: Vec::with_capacity(n),
        id: Vec::with_capacity(n),
    };
    for i in 0..n {
        let (city, lon, lat, spread) = CLUSTERS[rng.gen_range(0..CLUSTERS.len())];
        let x = gauss(rng, lon, spread);
        let y = gauss(rng, lat, spread * 0.7);
        pts.lon.push(x);
        pts.lat.push(y);
        // Higher values towards the cluster center.
        let r = ((x - lon).powi(2) + (y - lat).powi(2)).sqrt();
        pts.value.push((100.0 * (-r / spread).exp() + gauss(rng, 0.0, 5.0)).max(0.0));
        pts.city.push(city);
        pts.id.push(i as i64);
    }
    pts
}

fn write_points_csv(path: &Path, pts: &Points) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("Failed to create points CSV")?;
    writer.write_record(["id", "lon", "lat", "value", "city"])?;
    for i in 0..pts.id.len() {
        writer.write_record([
            pts.id[i].to_string(),
            pts.lon[i].to_string(),
            pts.lat[i].to_string(),
            pts.value[i].to_string(),
            pts.city[i].to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_points_parquet(path: &Path, pts: &Points) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("lon", DataType::Float64, false),
        Field::new("lat", DataType::Float64, false),
        Field::new("value", DataType::Float64, false),
        Field::new("city", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(pts.id.clone())),
            Arc::new(Float64Array::from(pts.lon.clone())),
            Arc::new(Float64Array::from(pts.lat.clone())),
            Arc::new(Float64Array::from(pts.value.clone())),
            Arc::new(StringArray::from(pts.city.clone())),
        ],
    )
    .context("Failed to create RecordBatch")?;

    let file = std::fs::File::create(path).context("Failed to create points Parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("Failed to create writer")?;
    writer.write(&batch).context("Failed to write batch")?;
    writer.close().context("Failed to close writer")?;
    Ok(())
}

/// A few communities, dense inside and sparse between, keyed by node name.
fn write_network(dir: &Path, n: usize, rng: &mut StdRng) -> Result<usize> {
    let communities = 4.min(n.max(1));
    let group = |i: usize| i % communities;

    let mut nodes = csv::Writer::from_path(dir.join("nodes.csv")).context("Failed to create nodes CSV")?;
    nodes.write_record(["name", "x", "y", "group"])?;
    for i in 0..n {
        let angle = std::f64::consts::TAU * group(i) as f64 / communities as f64;
        nodes.write_record([
            format!("n{i}"),
            gauss(rng, angle.cos(), 0.2).to_string(),
            gauss(rng, angle.sin(), 0.2).to_string(),
            group(i).to_string(),
        ])?;
    }
    nodes.flush()?;

    let mut edges = csv::Writer::from_path(dir.join("edges.csv")).context("Failed to create edges CSV")?;
    edges.write_record(["source", "target", "weight"])?;
    let mut count = 0;
    for s in 0..n {
        for t in (s + 1)..n {
            let p = if group(s) == group(t) { 0.08 } else { 0.004 };
            if rng.gen_bool(p) {
                edges.write_record([format!("n{s}"), format!("n{t}"), format!("{:.2}", rng.gen_range(0.5..2.0))])?;
                count += 1;
            }
        }
    }
    edges.flush()?;
    Ok(count)
}

fn main() -> Result<()> {
    let args = Args::parse();
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;
    let mut rng = StdRng::seed_from_u64(42);

    let pts = generate_points(args.points, &mut rng);
    write_points_csv(&args.out_dir.join("points.csv"), &pts)?;
    write_points_parquet(&args.out_dir.join("points.parquet"), &pts)?;
    println!(
        "Wrote {} points to points.csv and points.parquet in {}",
        args.points,
        args.out_dir.display()
    );

    let edges = write_network(&args.out_dir, args.nodes, &mut rng)?;
    println!("Wrote {} nodes and {edges} edges to nodes.csv and edges.csv", args.nodes);
    Ok(())
}
