use apkres_rs::apk::{Apk, ApkOptions};
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let Some(apk_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: dump_values <apk> [virtual path]");
        std::process::exit(1)
    };
    let path = args.next().unwrap_or_else(|| "res/values/strings.xml".to_string());

    let mut apk = Apk::open(&apk_path, &ApkOptions::default())?;
    println!("{} {} ({})", apk.metadata().package_name, apk.metadata().package_version, apk.role());

    let mut resources = apk.resources();
    let file = resources.open_file(&path)?;
    if !file.exists() {
        println!("{} does not exist", path);
    } else {
        println!("{}", file.read_text());
    }
    file.close(&mut resources)?;
    Ok(())
}
