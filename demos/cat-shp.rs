use std::env;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::process;

use shapeio::ShapefileOptions;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut args = env::args();

    if args.len() < 2 || args.len() > 3 {
        let program = args.next().unwrap_or_else(|| String::from("cat-shp"));
        writeln!(&mut io::stderr(), "Usage: {} <SHP_PATH> [ENCODING]", program).unwrap();
        process::exit(1);
    }

    args.next();
    let path = PathBuf::from(args.next().unwrap());

    let options = match args.next() {
        None => ShapefileOptions::default(),
        Some(label) => match ShapefileOptions::default().with_encoding_label(&label) {
            Some(options) => options,
            None => {
                writeln!(&mut io::stderr(), "Unknown encoding: {}", label).unwrap();
                process::exit(1);
            }
        },
    };

    match shapeio::open(&path, options) {
        Err(err) => {
            writeln!(&mut io::stderr(), "{}", err).unwrap();
            process::exit(1);
        }
        Ok(reader) => {
            let columns: Vec<&str> = reader.columns().iter().map(|c| c.name()).collect();
            println!("{} {} records: {}", reader.shape_type(), reader.len(), columns.join(", "));

            let mut n_records: usize = 0;

            for feature_result in reader {
                match feature_result {
                    Err(err) => {
                        writeln!(&mut io::stderr(), "Error during read ({:?}): {}", err.kind(), err).unwrap();
                        process::exit(1);
                    }
                    Ok(feature) => {
                        n_records += 1;
                        println!("{}", feature);
                    }
                }
            }

            println!("Read {} records", n_records);
        }
    }
}
