use apkres_rs::apk::{Apk, ApkOptions};
use apkres_rs::resource::value::Scalar;
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let [input, output, name, value, rest @ ..] = args.as_slice() else {
        eprintln!("usage: set_string <apk> <output apk> <name> <value> [qualifiers]");
        std::process::exit(1)
    };
    let qualifiers = rest.first().map(String::as_str).unwrap_or("");

    let mut apk = Apk::open(&PathBuf::from(input), &ApkOptions::default())?;
    let id = apk
        .resources()
        .set("string", name, &Scalar::string(value.as_str()).into(), qualifiers)?;
    println!("string/{} is {}", name, id);

    apk.finalize()?;
    apk.save(&PathBuf::from(output))?;
    Ok(())
}
