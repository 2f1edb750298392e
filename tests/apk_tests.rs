mod common;

use apkres_rs::apk::{Apk, ApkError, ApkOptions, ApkRole};
use apkres_rs::archive::{Archive, ArchiveEntry, MANIFEST_PATH, RESOURCE_TABLE_PATH};
use apkres_rs::resource::value::{Resource, Scalar};
use apkres_rs::resource::ResourceError;
use apkres_rs::xml::XmlElement;
use common::{base_apk, tableless_apk, ASSET, ICON};
use indexmap::IndexMap;

fn open_base() -> Result<Apk, Box<dyn std::error::Error>> {
    Ok(Apk::from_bytes(&base_apk()?, &ApkOptions::default())?)
}

/// Finalizes `apk` and loads the written archive again.
fn reload(mut apk: Apk) -> Result<Apk, Box<dyn std::error::Error>> {
    apk.finalize()?;
    Ok(Apk::from_bytes(&apk.to_bytes()?, &ApkOptions::default())?)
}

#[test]
fn test_manifest_metadata() -> Result<(), Box<dyn std::error::Error>> {
    let apk = open_base()?;
    assert_eq!(apk.role(), &ApkRole::Base);
    assert_eq!(apk.metadata().package_name, "com.example");
    assert_eq!(apk.metadata().package_version, "1.0");
    assert_eq!(apk.metadata().version_code, Some(7));
    assert_eq!(apk.file_name(), "base.apk");
    Ok(())
}

#[test]
fn test_untouched_files_are_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let original = Archive::from_bytes(&base_apk()?)?;
    let mut apk = open_base()?;
    {
        let mut resources = apk.resources();
        for path in ["assets/data.bin", "AndroidManifest.xml", "res/values/strings.xml"] {
            let file = resources.open_file(path)?;
            assert!(file.exists());
            file.close(&mut resources)?;
        }
    }

    let reloaded = reload(apk)?;
    for path in [MANIFEST_PATH, RESOURCE_TABLE_PATH, "assets/data.bin", "res/layout/main.xml"] {
        assert_eq!(reloaded.archive().bytes(path), original.bytes(path), "{path} changed");
    }
    Ok(())
}

#[test]
fn test_lock_is_exclusive() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    let mut resources = apk.resources();

    let file = resources.open_file("assets/data.bin")?;
    assert_eq!(file.contents(), ASSET);
    assert!(matches!(
        resources.open_file("./assets//data.bin"),
        Err(ApkError::Lock(_))
    ));
    assert!(matches!(resources.delete("assets/data.bin"), Err(ApkError::Lock(_))));

    file.close(&mut resources)?;
    resources.open_file("assets/data.bin")?.close(&mut resources)?;
    Ok(())
}

#[test]
fn test_lock_covers_every_path_to_an_entry() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    let mut resources = apk.resources();

    let mut icon = resources.open_file("res/drawable-hdpi/icon.png")?;
    assert!(matches!(resources.open_file("res/a0.png"), Err(ApkError::Lock(_))));
    assert!(matches!(resources.delete("res/a0.png"), Err(ApkError::Lock(_))));
    icon.set_contents(b"AAAA".to_vec());
    icon.close(&mut resources)?;

    let direct = resources.open_file("res/a0.png")?;
    assert_eq!(direct.contents(), b"AAAA");
    assert!(matches!(
        resources.open_file("res/drawable-hdpi/icon.png"),
        Err(ApkError::Lock(_))
    ));
    direct.close(&mut resources)?;
    assert!(!resources.archive().locks().is_locked("res/a0.png"));
    Ok(())
}

#[test]
fn test_leaked_file_is_not_written() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    {
        let mut resources = apk.resources();
        let mut file = resources.open_file("assets/data.bin")?;
        file.write_text("never saved");
    }
    assert!(apk.archive().locks().is_locked("assets/data.bin"));

    let reloaded = reload(apk)?;
    assert_eq!(reloaded.archive().bytes("assets/data.bin"), Some(ASSET));
    Ok(())
}

#[test]
fn test_renamed_file_resolves() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    let mut resources = apk.resources();

    let mut icon = resources.open_file("res/drawable-hdpi/icon.png")?;
    assert_eq!(icon.handle().archive_path, "res/a0.png");
    assert_eq!(icon.contents(), ICON);

    icon.set_contents(vec![1, 2, 3]);
    icon.close(&mut resources)?;
    assert_eq!(resources.archive().bytes("res/a0.png"), Some(&[1, 2, 3][..]));
    assert!(!resources.archive().contains("res/drawable-hdpi/icon.png"));
    Ok(())
}

#[test]
fn test_new_file_registration() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    {
        let mut resources = apk.resources();
        assert!(!resources.exists("res/drawable-xhdpi/logo.png")?);

        let mut logo = resources.open_file("res/drawable-xhdpi/logo.png")?;
        assert!(!logo.exists());
        assert!(logo.handle().registration.is_some());
        std::io::Write::write_all(&mut logo.writer(), &ICON)?;
        logo.close(&mut resources)?;

        assert!(resources.find("drawable", "logo").is_some());
        assert!(resources.exists("res/drawable-xhdpi/logo.png")?);
    }

    let mut reloaded = reload(apk)?;
    let mut resources = reloaded.resources();
    let logo = resources.open_file("res/drawable-xhdpi/logo.png")?;
    assert!(logo.exists());
    assert!(logo.handle().registration.is_none());
    assert_eq!(logo.contents(), ICON);
    logo.close(&mut resources)?;
    Ok(())
}

#[test]
fn test_values_file_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    {
        let mut resources = apk.resources();
        let mut strings = resources.open_file("res/values/strings.xml")?;
        let text = strings.read_text();
        assert!(text.contains(r#"<string name="app_name">Example</string>"#));

        strings.write_text(&text.replace(
            "</resources>",
            r#"<string name="greeting">Don\'t panic</string></resources>"#,
        ));
        strings.close(&mut resources)?;

        let mut german = resources.open_file("res/values-de/strings.xml")?;
        assert!(!german.exists());
        german.write_text(r#"<resources><string name="app_name">Beispiel</string></resources>"#);
        german.close(&mut resources)?;
    }

    let mut reloaded = reload(apk)?;
    let resources = reloaded.resources();
    assert_eq!(
        resources.get("string", "greeting", "")?,
        Some(Resource::Scalar(Scalar::string("Don't panic")))
    );
    assert_eq!(
        resources.get("string", "app_name", "de")?,
        Some(Resource::Scalar(Scalar::string("Beispiel")))
    );
    assert_eq!(
        resources.get("string", "app_name", "")?,
        Some(Resource::Scalar(Scalar::string("Example")))
    );
    Ok(())
}

#[test]
fn test_forward_reference_converges() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    let mut resources = apk.resources();

    let mut styles = resources.open_file("res/values/styles.xml")?;
    styles.write_text(
        r#"<resources>
            <style name="AppTheme" parent="@android:style/Theme.Light">
                <item name="android:textColor">@color/accent</item>
            </style>
        </resources>"#,
    );
    styles.close(&mut resources)?;

    // Not declared yet, the document waits for it.
    let reopened = resources.open_file("res/values/styles.xml")?;
    assert!(reopened.read_text().contains("@color/accent"));
    reopened.close(&mut resources)?;

    let mut colors = resources.open_file("res/values/colors.xml")?;
    colors.write_text(r##"<resources><color name="accent">#ff4081</color></resources>"##);
    colors.close(&mut resources)?;

    assert_eq!(
        resources.get("style", "AppTheme", "")?,
        Some(Resource::Style {
            parent: Some("@android:style/Theme.Light".to_string()),
            items: vec![("android:textColor".to_string(), Scalar::reference("@color/accent"))],
        })
    );
    assert_eq!(resources.get("color", "accent", "")?, Some(Scalar::color("#ff4081")?.into()));
    Ok(())
}

#[test]
fn test_unresolved_reference_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    {
        let mut resources = apk.resources();
        let mut strings = resources.open_file("res/values/strings.xml")?;
        strings.write_text(r#"<resources><string name="broken">@string/missing</string></resources>"#);
        strings.close(&mut resources)?;
    }

    match apk.finalize() {
        Err(ApkError::UnresolvedReferences(unresolved)) => {
            assert_eq!(unresolved.len(), 1);
            assert_eq!(unresolved[0].reference, "@string/missing");
            assert_eq!(unresolved[0].path, "res/values/strings.xml");
        }
        other => panic!("expected unresolved references, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_values_reference_inline_layout_id() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    {
        let mut resources = apk.resources();
        let mut layout = resources.open_file("res/layout/main.xml")?;
        let mut document = layout.document()?;
        document
            .root
            .push_child(XmlElement::new("Button").with_attribute("android:id", "@+id/confirm"));
        layout.set_document(&document)?;
        layout.close(&mut resources)?;

        let mut strings = resources.open_file("res/values/strings.xml")?;
        strings.write_text(r#"<resources><string name="alias">@id/confirm</string></resources>"#);
        strings.close(&mut resources)?;
    }

    let mut reloaded = reload(apk)?;
    let resources = reloaded.resources();
    assert!(resources.find("id", "confirm").is_some());
    assert_eq!(
        resources.get("string", "alias", "")?,
        Some(Scalar::reference("@id/confirm").into())
    );
    Ok(())
}

#[test]
fn test_binary_xml_edit() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    {
        let mut resources = apk.resources();
        let mut layout = resources.open_file("res/layout/main.xml")?;
        let mut document = layout.document()?;
        assert_eq!(document.root.attribute("android:orientation"), Some("vertical"));

        document.root.push_child(
            XmlElement::new("Button")
                .with_attribute("android:id", "@+id/confirm")
                .with_attribute("android:text", "@string/app_name"),
        );
        layout.set_document(&document)?;
        layout.close(&mut resources)?;

        assert!(matches!(
            resources.archive().entry("res/layout/main.xml"),
            Some(ArchiveEntry::Pending(_))
        ));
        // Reading it back returns the edited text, not a stale binary form.
        let reopened = resources.open_file("res/layout/main.xml")?;
        assert!(reopened.read_text().contains("@+id/confirm"));
        reopened.close(&mut resources)?;
    }

    let mut reloaded = reload(apk)?;
    let mut resources = reloaded.resources();
    assert!(resources.find("id", "confirm").is_some());
    let layout = resources.open_file("res/layout/main.xml")?;
    let document = layout.document()?;
    let button = document.root.child("Button").ok_or("button missing")?;
    assert_eq!(button.attribute("android:id"), Some("@id/confirm"));
    assert_eq!(button.attribute("android:text"), Some("@string/app_name"));
    layout.close(&mut resources)?;
    Ok(())
}

#[test]
fn test_set_and_get_resources() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    let mut resources = apk.resources();

    let planets = Resource::Array(vec!["Mercury".into(), "Venus".into()]);
    let songs = Resource::Plurals(IndexMap::from([
        ("one".to_string(), Scalar::string("%d song")),
        ("other".to_string(), Scalar::string("%d songs")),
    ]));
    resources.set("array", "planets", &planets, "")?;
    resources.set("plurals", "songs", &songs, "")?;
    let ids = resources.set_group(
        "dimen",
        [
            ("margin", &Scalar::dimension("16dp")?.into()),
            ("padding", &Resource::from(Scalar::reference("@dimen/margin"))),
        ],
        "land",
    )?;
    assert_eq!(ids.len(), 2);

    assert_eq!(resources.get("array", "planets", "")?, Some(planets));
    assert_eq!(resources.get("plurals", "songs", "")?, Some(songs));
    assert_eq!(
        resources.get("dimen", "padding", "land")?,
        Some(Scalar::reference("@dimen/margin").into())
    );
    assert_eq!(resources.get("dimen", "padding", "")?, None);
    assert_eq!(resources.resolve("dimen", "margin")?, ids[0]);
    assert!(matches!(
        resources.resolve("dimen", "nowhere"),
        Err(ApkError::Reference { reference }) if reference == "@dimen/nowhere"
    ));
    Ok(())
}

#[test]
fn test_array_reads_back_as_values_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    let mut resources = apk.resources();
    let planets = Resource::Array(vec!["Mercury".into(), "Venus".into(), "Earth".into()]);
    resources.set("array", "planets", &planets, "")?;

    let arrays = resources.open_file("res/values/arrays.xml")?;
    assert!(arrays.exists());
    let document = arrays.document()?;
    arrays.close(&mut resources)?;

    let array = document
        .root
        .elements()
        .find(|element| element.attribute("name") == Some("planets"))
        .ok_or("planets missing")?;
    let items: Vec<String> = array.elements().map(XmlElement::text).collect();
    assert_eq!(items, ["Mercury", "Venus", "Earth"]);
    Ok(())
}

#[test]
fn test_failed_set_leaves_no_entry() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    {
        let mut resources = apk.resources();
        assert!(matches!(
            resources.set("string", "bad", &Scalar::reference("@string/missing").into(), ""),
            Err(ApkError::Reference { reference }) if reference == "@string/missing"
        ));
        assert_eq!(resources.find("string", "bad"), None);
        assert_eq!(resources.get("string", "bad", "")?, None);

        let result = resources.set_group(
            "string",
            [
                ("first", &Resource::from(Scalar::string("fine"))),
                ("second", &Resource::from(Scalar::reference("@string/missing"))),
            ],
            "",
        );
        assert!(matches!(result, Err(ApkError::Reference { .. })));
        assert_eq!(resources.find("string", "first"), None);
        assert_eq!(resources.find("string", "second"), None);
    }
    assert!(!apk.container().is_dirty());

    let id = apk
        .resources()
        .set("string", "good", &Scalar::string("fine").into(), "")?;
    assert_eq!(apk.resources().resolve("string", "good")?, id);
    Ok(())
}

#[test]
fn test_reserved_and_tableless_paths() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    let mut resources = apk.resources();
    assert!(matches!(
        resources.open_file("res/values/public.xml"),
        Err(ApkError::Decode {
            source: ResourceError::ReservedPath(_),
            ..
        })
    ));

    let mut bare = Apk::from_bytes(&tableless_apk()?, &ApkOptions::default())?;
    assert_eq!(bare.metadata().package_name, "com.example.bare");
    let mut resources = bare.resources();
    assert!(matches!(
        resources.open_file("res/values/strings.xml"),
        Err(ApkError::Decode {
            source: ResourceError::NoResourceTable,
            ..
        })
    ));

    // The manifest stays editable without a table.
    let mut manifest = resources.open_file(MANIFEST_PATH)?;
    let mut document = manifest.document()?;
    document.root.set_attribute("android:versionName", "2.1");
    manifest.set_document(&document)?;
    manifest.close(&mut resources)?;

    let reloaded = reload(bare)?;
    assert_eq!(reloaded.metadata().package_version, "2.1");
    Ok(())
}

#[test]
fn test_delete() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    let mut resources = apk.resources();
    assert!(resources.delete("assets/data.bin")?);
    assert!(!resources.delete("assets/data.bin")?);

    let file = resources.open_file("assets/data.bin")?;
    assert!(!file.exists());
    assert!(file.contents().is_empty());
    file.close(&mut resources)?;
    Ok(())
}

#[test]
fn test_finalize_runs_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut apk = open_base()?;
    apk.finalize()?;
    assert!(matches!(apk.finalize(), Err(ApkError::AlreadyFinalized)));
    Ok(())
}

#[test]
fn test_save_and_open() -> Result<(), Box<dyn std::error::Error>> {
    let directory = tempfile::tempdir()?;
    let path = directory.path().join("base.apk");

    let mut apk = open_base()?;
    apk.resources()
        .set("string", "saved", &Scalar::string("yes").into(), "")?;
    apk.finalize()?;
    apk.save(&path)?;

    let mut opened = Apk::open(&path, &ApkOptions::default())?;
    assert_eq!(
        opened.resources().get("string", "saved", "")?,
        Some(Scalar::string("yes").into())
    );
    Ok(())
}
