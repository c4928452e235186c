use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use astro_source::{
    Angle, Artifact, Config, Container, Error, LoaderArgs, Registry, SkyPosition, Source, Table1D,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Registry with a `cube` loader that remembers the paths it was given.
fn cube_registry() -> (Registry, Arc<Mutex<Vec<PathBuf>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();
    let mut registry = Registry::with_builtins();
    registry.register(
        "cube",
        move |path: &Path, _: &LoaderArgs| -> anyhow::Result<Artifact> {
            seen.lock().unwrap().push(path.to_path_buf());
            Ok(Arc::new(vec![0.0_f32; 8]))
        },
    );
    (registry, calls)
}

const M1: &str = "\
[INFO]
name = M1
ra = 05h34m31.9s
dec = +22d00m52s

[cube]
type = cube
file = /tmp/x.fits
";

#[test]
fn position_and_single_cube_load() {
    init_logging();
    let (registry, calls) = cube_registry();
    let config: Config = M1.parse().unwrap();
    let mut source = Source::from_config("M1", config)
        .unwrap()
        .with_registry(registry.into_shared());

    let expected = SkyPosition::new(
        Angle::parse_ra("05h34m31.9s").unwrap(),
        Angle::parse_dec("+22d00m52s").unwrap(),
        "icrs",
    );
    assert_eq!(source.position().unwrap(), Some(expected));

    let first = source.get("cube").unwrap();
    let second = source.get("cube").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(*calls.lock().unwrap(), vec![PathBuf::from("/tmp/x.fits")]);
}

#[test]
fn source_from_file_loads_profile_and_writes_back() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("profile.csv");
    fs::write(&data, "r [arcsec],I [mJy/beam]\n0.1,12.0\n0.2,8.5\n0.3,3.1\n").unwrap();

    let cfg_path = dir.path().join("m1.cfg");
    fs::write(
        &cfg_path,
        format!(
            "[DEFAULT]\nname = M1\nroot = {}\n\n[INFO]\nra = 05h34m31.9s\ndec = +22d00m52s\n\
             distance = 2 kpc\n\n[radial]\ntype = profile\nfile = ${{root}}/profile.csv\n\
             loader_wlg = 1.3 mm\nloader_wlg_type = quantity\n\n[knot]\ntype = subsource\n\
             ra = 05h34m32.0s\ndec = +22d00m50s\nradius = 1 arcsec\n",
            dir.path().display()
        ),
    )
    .unwrap();

    let mut source = Source::from_file(&cfg_path).unwrap();
    assert_eq!(source.name(), Some("M1"));
    assert_eq!(source.subsources().len(), 1);

    source.load_all_data().unwrap();
    let table = source.get_as::<Table1D>("radial").unwrap().unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.column("I").unwrap().unit.as_deref(), Some("mJy/beam"));
    assert_eq!(table.path, data);

    let copy = dir.path().join("copy.cfg");
    source.write(Some(copy.as_path())).unwrap();
    let reread = Config::read(&copy).unwrap();
    assert_eq!(&reread, source.config());
    assert_eq!(
        reread.get_raw("radial", "file").unwrap(),
        Some("${root}/profile.csv")
    );
}

#[test]
fn constructor_rejects_two_config_inputs() {
    let err = Source::new(Some("M1"), Some(Path::new("m1.cfg")), Some(Config::new()))
        .err()
        .unwrap();
    assert!(matches!(err, Error::ConflictingInputs));
}

#[test]
fn broken_reference_in_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("bad.cfg");
    fs::write(&cfg_path, "[cube]\ntype = cube\nfile = ${nowhere:root}/x.fits\n").unwrap();
    let err = Source::from_file(&cfg_path).err().unwrap();
    assert!(matches!(err, Error::Interpolation { .. }));
}
