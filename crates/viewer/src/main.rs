use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let data_dir = PathBuf::from(args.next().unwrap_or_else(|| "static".into()));
    let ship_record = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("ship.json"));

    hangar_viewer::run(data_dir, ship_record)
}
