mod common;

use apkres_rs::apk::bundle::{ApkBundle, MemberId};
use apkres_rs::apk::{Apk, ApkError, ApkOptions, ApkRole, SplitKind};
use apkres_rs::resource::value::{Resource, Scalar};
use common::{base_apk, split_apk};

fn bundle(configs: &[&str]) -> Result<ApkBundle, Box<dyn std::error::Error>> {
    let options = ApkOptions::default();
    let base = Apk::from_bytes(&base_apk()?, &options)?;
    let splits = configs
        .iter()
        .map(|config| Ok(Apk::from_bytes(&split_apk(config)?, &options)?))
        .collect::<Result<Vec<_>, Box<dyn std::error::Error>>>()?;
    Ok(ApkBundle::new(base, splits)?)
}

#[test]
fn test_split_roles() -> Result<(), Box<dyn std::error::Error>> {
    let bundle = bundle(&["de", "xxhdpi", "arm64_v8a"])?;
    let de = bundle.split("de").ok_or("split missing")?;
    assert_eq!(
        de.role(),
        &ApkRole::Split {
            kind: SplitKind::Language,
            config: "de".to_string()
        }
    );
    assert_eq!(de.file_name(), "split_config.de.apk");
    assert_eq!(de.metadata().package_name, "unnamed split apk file");
    assert_eq!(de.metadata().package_version, "0.0.0");

    assert_eq!(
        bundle.members(),
        vec![
            MemberId::Base,
            MemberId::Split("de".to_string()),
            MemberId::Split("xxhdpi".to_string()),
            MemberId::Split("arm64_v8a".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn test_invalid_bundles() -> Result<(), Box<dyn std::error::Error>> {
    let options = ApkOptions::default();
    let base = || Apk::from_bytes(&base_apk()?, &options).map_err(Box::<dyn std::error::Error>::from);
    let split = || Apk::from_bytes(&split_apk("de")?, &options).map_err(Box::<dyn std::error::Error>::from);

    assert!(matches!(ApkBundle::new(base()?, [base()?]), Err(ApkError::InvalidBundle(_))));
    assert!(matches!(ApkBundle::new(split()?, []), Err(ApkError::InvalidBundle(_))));
    assert!(matches!(
        ApkBundle::new(base()?, [split()?, split()?]),
        Err(ApkError::InvalidBundle(_))
    ));

    let mut bundle = ApkBundle::new(base()?, [split()?])?;
    assert!(bundle.replace_split(split()?)?.is_some());
    assert_eq!(bundle.splits().count(), 1);
    Ok(())
}

#[test]
fn test_cross_split_ids() -> Result<(), Box<dyn std::error::Error>> {
    let mut bundle = bundle(&["de"])?;
    let base_foo = bundle.global().resolve("id", "foo")?;
    let split = MemberId::Split("de".to_string());

    let (label, created) = {
        let mut resources = bundle.resources(&split)?;
        let label = resources.set("string", "label", &Scalar::reference("@id/foo").into(), "de")?;
        let created = resources.set("string", "extra", &Scalar::reference("@+id/bar").into(), "de")?;
        // The base declares foo, the split does not get its own copy.
        assert_eq!(resources.package().and_then(|package| package.find("id", "foo")), None);
        (label, created)
    };
    assert_ne!(label, created);

    let global = bundle.global();
    assert_eq!(global.resolve("id", "foo")?, base_foo);
    let bar = global.resolve("id", "bar")?;
    assert_ne!(bar, base_foo);
    assert_eq!(bar.package(), base_foo.package());
    assert_eq!(global.declared_by(bar), vec![&split]);
    assert_eq!(
        global.get("string", "label", "de")?,
        Some(Resource::from(Scalar::reference("@id/foo")))
    );
    assert!(matches!(global.resolve("id", "nowhere"), Err(ApkError::Reference { .. })));
    Ok(())
}

#[test]
fn test_split_values_reference_base() -> Result<(), Box<dyn std::error::Error>> {
    let mut bundle = bundle(&["de"])?;
    let split = MemberId::Split("de".to_string());
    {
        let mut resources = bundle.resources(&split)?;
        let mut strings = resources.open_file("res/values-de/strings.xml")?;
        assert!(!strings.exists());
        strings.write_text(r#"<resources><string name="title">@string/app_name</string></resources>"#);
        strings.close(&mut resources)?;
        assert_eq!(
            resources.get("string", "title", "de")?,
            Some(Scalar::reference("@string/app_name").into())
        );
    }

    // Without the bundle the base's names are unknown.
    let mut standalone = Apk::from_bytes(&split_apk("de")?, &ApkOptions::default())?;
    assert!(matches!(
        standalone.resources().resolve("string", "app_name"),
        Err(ApkError::Reference { .. })
    ));
    Ok(())
}

#[test]
fn test_finalize_and_save() -> Result<(), Box<dyn std::error::Error>> {
    let mut bundle = bundle(&["de", "xxhdpi"])?;
    bundle
        .resources(&MemberId::Split("xxhdpi".to_string()))?
        .set("string", "density", &Scalar::string("xx").into(), "xxhdpi")?;
    bundle.finalize()?;
    assert!(bundle.base().is_finalized());
    assert!(matches!(bundle.finalize(), Err(ApkError::AlreadyFinalized)));

    let directory = tempfile::tempdir()?;
    let paths = bundle.save(directory.path())?;
    let names: Vec<_> = paths
        .iter()
        .filter_map(|path| path.file_name()?.to_str())
        .collect();
    assert_eq!(names, ["base.apk", "split_config.de.apk", "split_config.xxhdpi.apk"]);

    let mut reopened = ApkBundle::open(&paths[0], &paths[1..], &ApkOptions::default())?;
    let global = reopened.global();
    assert!(global.find("string", "density").is_some());
    assert_eq!(
        reopened
            .resources(&MemberId::Split("xxhdpi".to_string()))?
            .get("string", "density", "xxhdpi")?,
        Some(Scalar::string("xx").into())
    );
    Ok(())
}
