use std::env;
use std::fs;

fn main() -> vista_export::Result<()> {
    let path = env::args()
        .nth(1)
        .unwrap_or("points.las".to_string());
    let max_points = env::args()
        .nth(2)
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(5);

    let bytes = fs::read(&path)?;
    let cloud = vista_export::decode_point_cloud(&bytes)?;
    let header = &cloud.header;

    println!(
        "{}: LAS {}.{} format {}{}, {} points, {} bytes",
        path,
        header.version.0,
        header.version.1,
        header.point_format,
        if cloud.compressed { " (laz)" } else { "" },
        header.point_count,
        bytes.len()
    );
    println!("offset: {:?}", header.offset);
    println!("scale:  {:?}", header.scale);

    for (q, p) in cloud.quantized.iter().zip(&cloud.points).take(max_points) {
        println!(
            "Point coordinates: ({}, {}, {}) <- {:?}",
            p[0], p[1], p[2], q
        );
    }

    Ok(())
}
