use std::env;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use shapeio::{DbaseFileHeader, Feature, Shape, ShapefileError, ShapefileOptions};
use tracing_subscriber::EnvFilter;

fn copy(src: &Path, dest: &Path, options: ShapefileOptions) -> Result<usize, ShapefileError> {
    let reader = shapeio::open(src, options)?;
    let shape_type = reader.shape_type();
    let fields = reader.dbf_header().fields().to_vec();

    let features: Vec<Feature<Shape>> = reader.collect::<Result<_, _>>()?;

    // Deleted rows were skipped, so the count can differ from the source's
    let header = DbaseFileHeader::with_fields(fields, features.len())?;

    let mut writer = shapeio::create(dest, shape_type, header, options)?;
    for feature in features.iter() {
        writer.write_feature(feature)?;
    }
    writer.finish()?;
    Ok(features.len())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 3 {
        writeln!(&mut io::stderr(), "Usage: {} <SRC_SHP_PATH> <DEST_SHP_PATH>", args[0]).unwrap();
        process::exit(1);
    }

    let src = PathBuf::from(&args[1]);
    let dest = PathBuf::from(&args[2]);
    let options = ShapefileOptions::default().skip_deleted(true);

    match copy(&src, &dest, options) {
        Err(err) => {
            writeln!(&mut io::stderr(), "{}", err).unwrap();
            process::exit(1);
        }
        Ok(n) => println!("Copied {} records", n),
    }
}
