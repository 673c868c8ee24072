use casams_decode::result::Result;
use casams_decode::MeasurementSet;

fn main() -> Result<()> {
    let ms = MeasurementSet::open("./tests/fixtures/minimal.ms")?;

    dbg!(ms.nrows());
    dbg!(ms.name());

    // list every column's name and declared value type
    for column in ms.description() {
        dbg!((column.name(), column.value_type()));
    }

    // the sidecar file each data manager's column bytes actually live in
    for path in ms.sidecar_paths() {
        dbg!(path);
    }

    Ok(())
}
