use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use image::RgbaImage;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pointshade::{points, Error, RenderSpec};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Sample {
    x: Vec<f64>,
    y: Vec<f64>,
    v: Vec<i64>,
}

fn sample(n: usize, seed: u64) -> Sample {
    let mut rng = StdRng::seed_from_u64(seed);
    Sample {
        x: (0..n).map(|_| rng.gen_range(0.0..10.0)).collect(),
        y: (0..n).map(|_| rng.gen_range(0.0..10.0)).collect(),
        v: (0..n).map(|_| rng.gen_range(0..100)).collect(),
    }
}

fn write_csv(path: &Path, s: &Sample) {
    let mut w = csv::Writer::from_path(path).unwrap();
    w.write_record(["x", "y", "v"]).unwrap();
    for i in 0..s.x.len() {
        w.write_record([s.x[i].to_string(), s.y[i].to_string(), s.v[i].to_string()])
            .unwrap();
    }
    w.flush().unwrap();
}

fn batch(s: &Sample) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::Float64, false),
        Field::new("y", DataType::Float64, false),
        Field::new("v", DataType::Int64, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Float64Array::from(s.x.clone())),
            Arc::new(Float64Array::from(s.y.clone())),
            Arc::new(Int64Array::from(s.v.clone())),
        ],
    )
    .unwrap()
}

fn write_parquet(path: &Path, s: &Sample) {
    let batch = batch(s);
    let mut w = ArrowWriter::try_new(File::create(path).unwrap(), batch.schema(), None).unwrap();
    w.write(&batch).unwrap();
    w.close().unwrap();
}

fn write_feather(path: &Path, s: &Sample) {
    let batch = batch(s);
    let mut w = FileWriter::try_new(File::create(path).unwrap(), &batch.schema()).unwrap();
    w.write(&batch).unwrap();
    w.finish().unwrap();
}

fn read_png(path: &Path) -> RgbaImage {
    image::open(path).unwrap().to_rgba8()
}

fn drawn(img: &RgbaImage) -> Vec<(u32, u32)> {
    img.enumerate_pixels()
        .filter(|(_, _, p)| p[3] > 0)
        .map(|(x, y, _)| (x, y))
        .collect()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn test_same_data_renders_identically_in_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let data = sample(500, 1);
    write_csv(&dir.path().join("d.csv"), &data);
    write_parquet(&dir.path().join("d.parquet"), &data);
    write_feather(&dir.path().join("d.feather"), &data);

    let spec = RenderSpec::builder()
        .canvas(64, 48)
        .unwrap()
        .aggregation(Some("mean"), Some("v"), None)
        .unwrap()
        .build();

    let images: Vec<RgbaImage> = ["csv", "parquet", "feather"]
        .iter()
        .map(|ext| {
            let out = dir.path().join(format!("{ext}.png"));
            points::run(&dir.path().join(format!("d.{ext}")), &out, &spec).unwrap();
            read_png(&out)
        })
        .collect();

    assert_eq!(images[0], images[1]);
    assert_eq!(images[0], images[2]);
}

#[test]
fn test_points_in_one_cell_draw_one_pixel() {
    let dir = tempfile::tempdir().unwrap();
    let data = Sample {
        x: vec![5.01, 5.02, 5.03, 5.04],
        y: vec![5.01, 5.02, 5.03, 5.04],
        v: vec![1, 1, 1, 1],
    };
    write_csv(&dir.path().join("d.csv"), &data);

    let spec = RenderSpec::builder()
        .canvas(10, 10)
        .unwrap()
        .x_range(Some("0,10"))
        .unwrap()
        .y_range(Some("0,10"))
        .unwrap()
        .build();
    let out = dir.path().join("out.png");
    points::run(&dir.path().join("d.csv"), &out, &spec).unwrap();

    assert_eq!(drawn(&read_png(&out)), vec![(5, 4)]);
}

#[test]
fn test_centroid_falls_where_the_data_is() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = sample(2000, 2);
    // Squeeze everything into [2, 4] x [6, 8].
    data.x.iter_mut().for_each(|x| *x = 2.0 + *x / 5.0);
    data.y.iter_mut().for_each(|y| *y = 6.0 + *y / 5.0);
    write_csv(&dir.path().join("d.csv"), &data);

    let spec = RenderSpec::builder()
        .canvas(100, 100)
        .unwrap()
        .x_range(Some("0,10"))
        .unwrap()
        .y_range(Some("0,10"))
        .unwrap()
        .build();
    let out = dir.path().join("out.png");
    points::run(&dir.path().join("d.csv"), &out, &spec).unwrap();
    let img = read_png(&out);

    let (mut sx, mut sy, mut sw) = (0.0, 0.0, 0.0);
    for (x, y, p) in img.enumerate_pixels() {
        let w = p[3] as f64;
        sx += x as f64 * w;
        sy += y as f64 * w;
        sw += w;
    }
    let (cx, cy) = (sx / sw, sy / sw);
    assert!((20.0..=40.0).contains(&cx), "centroid x {cx}");
    // Rows count from the top: y in [6, 8] is rows 20..40.
    assert!((20.0..=40.0).contains(&cy), "centroid y {cy}");
}

#[test]
fn test_unsupported_extension_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("d.txt");
    std::fs::write(&input, "x,y\n1,2\n").unwrap();
    let out = dir.path().join("out.png");

    let err = points::run(&input, &out, &RenderSpec::builder().build()).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnsupportedFormat { .. })));
    assert!(!out.exists());
}

#[test]
fn test_format_restrictions_follow_geo_flag() {
    let dir = tempfile::tempdir().unwrap();
    let geojson = dir.path().join("d.geojson");
    std::fs::write(&geojson, r#"{"type":"FeatureCollection","features":[]}"#).unwrap();
    let out = dir.path().join("out.png");

    // GeoJSON is geo-only.
    let err = points::run(&geojson, &out, &RenderSpec::builder().build()).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnsupportedFormat { .. })));

    // HDF is tabular-only.
    let hdf = dir.path().join("d.hdf");
    std::fs::write(&hdf, b"").unwrap();
    let err = points::run(&hdf, &out, &RenderSpec::builder().geo(true).build()).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnsupportedFormat { .. })));
    assert!(!out.exists());
}

#[test]
fn test_group_by_column_without_values_writes_full_image() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("d.csv");
    std::fs::write(&input, "x,y,kind\n1,1,\n2,3,\n").unwrap();
    let out = dir.path().join("o.png");
    let spec = RenderSpec::builder()
        .canvas(20, 10)
        .unwrap()
        .aggregation(None, None, Some("kind"))
        .unwrap()
        .build();
    points::run(&input, &out, &spec).unwrap();

    let img = read_png(&out);
    assert_eq!((img.width(), img.height()), (20, 10));
    assert!(drawn(&img).is_empty());
}

#[test]
fn test_unsupported_output_fails_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.gif");
    let err = points::run(&dir.path().join("missing.csv"), &out, &RenderSpec::builder().build()).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnsupportedOutput(_))));
}

#[test]
fn test_geojson_points_are_reprojected_and_drawn() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("cities.geojson");
    std::fs::write(
        &input,
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"name":"a"},"geometry":{"type":"Point","coordinates":[2.35,48.86]}},
            {"type":"Feature","properties":{"name":"b"},"geometry":{"type":"Point","coordinates":[-74.0,40.7]}},
            {"type":"Feature","properties":{"name":"c"},"geometry":{"type":"Point","coordinates":[139.7,35.7]}}
        ]}"#,
    )
    .unwrap();
    let out = dir.path().join("out.png");
    let spec = RenderSpec::builder().canvas(50, 50).unwrap().geo(true).build();
    let timings = points::run(&input, &out, &spec).unwrap();

    assert_eq!(drawn(&read_png(&out)).len(), 3);
    assert_eq!(timings.stages().len(), 3);
}

#[test]
fn test_end_to_end_lon_lat_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sample.csv");
    let mut rng = StdRng::seed_from_u64(3);
    let mut w = csv::Writer::from_path(&input).unwrap();
    w.write_record(["lon", "lat"]).unwrap();
    for _ in 0..1000 {
        // Two clusters of different density.
        let (cx, cy, r) = if rng.gen_bool(0.8) { (10.0, 50.0, 1.0) } else { (-70.0, -30.0, 8.0) };
        w.write_record([
            (cx + rng.gen_range(-r..r)).to_string(),
            (cy + rng.gen_range(-r..r)).to_string(),
        ])
        .unwrap();
    }
    w.flush().unwrap();

    let spec = RenderSpec::builder()
        .columns("lon", "lat")
        .canvas(400, 300)
        .unwrap()
        .aggregation(Some("count"), None, None)
        .unwrap()
        .colormap("fire")
        .unwrap()
        .build();
    let out = dir.path().join("out.png");
    points::run(&input, &out, &spec).unwrap();

    let img = read_png(&out);
    assert_eq!((img.width(), img.height()), (400, 300));
    let mut distinct: Vec<[u8; 4]> = img.pixels().map(|p| p.0).collect();
    distinct.sort_unstable();
    distinct.dedup();
    assert!(distinct.len() > 2, "expected varying pixel values, got {distinct:?}");
}
